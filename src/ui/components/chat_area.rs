use std::collections::VecDeque;

use eframe::egui::{self, Color32, RichText};

use crate::common::InboundRecord;

const OWN_COLOR: Color32 = Color32::from_rgb(80, 200, 120);
const PEER_COLOR: Color32 = Color32::from_rgb(90, 160, 255);

pub fn render(ui: &mut egui::Ui, messages: &VecDeque<InboundRecord>) {
    if messages.is_empty() {
        ui.label(RichText::new("No messages yet. Start chatting!").weak());
        return;
    }

    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .stick_to_bottom(true)
        .max_height(ui.available_height() - 40.0)
        .show(ui, |ui| {
            for record in messages {
                let color = if record.is_local() {
                    OWN_COLOR
                } else {
                    PEER_COLOR
                };
                ui.horizontal_wrapped(|ui| {
                    ui.label(RichText::new(format!("[{}]", record.clock_time())).weak());
                    ui.label(RichText::new(format!("{}:", record.username)).color(color).strong());
                    ui.label(&record.text);
                });
            }
        });
}
