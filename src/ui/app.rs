use std::time::Duration;

use eframe::egui;
use tokio::sync::mpsc;

use crate::common::SessionEvent;
use crate::network::Session;

use super::components::{chat_area, header, input_bar};
use super::state::AppState;

const REPAINT_INTERVAL: Duration = Duration::from_millis(100);

pub struct ChatApp {
    state: AppState,
    session: Session,
    event_receiver: mpsc::UnboundedReceiver<SessionEvent>,
    username: String,
}

impl ChatApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        session: Session,
        event_receiver: mpsc::UnboundedReceiver<SessionEvent>,
        username: String,
    ) -> Self {
        let mut state = AppState::new();
        state.peer_count = session.peer_count();
        Self {
            state,
            session,
            event_receiver,
            username,
        }
    }

    fn handle_session_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            self.state.apply(event);
        }
        self.state.peer_count = self.session.peer_count();
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_session_events();

        egui::TopBottomPanel::top("room_header").show(ctx, |ui| {
            header::render(
                ui,
                self.session.room_name(),
                self.state.peer_count,
                &self.username,
            );
        });

        egui::TopBottomPanel::bottom("input_bar").show(ctx, |ui| {
            if input_bar::render(ui, &mut self.state.input_text) {
                if let Some(text) = self.state.take_input() {
                    self.session.send(&text, &self.username);
                }
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            chat_area::render(ui, &self.state.messages);
        });

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }
}
