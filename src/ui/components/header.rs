use eframe::egui::{self, RichText};

pub fn render(ui: &mut egui::Ui, room: &str, peer_count: usize, username: &str) {
    ui.heading(format!(
        "Room: {room} | Peers: {peer_count} | You: {username}"
    ));
    if peer_count == 0 {
        ui.label(RichText::new("Waiting for peers to connect...").italics());
    }
}
