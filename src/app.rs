use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::machine::{BubbleAction, Notice, SelectionSessionStateMachine};
use crate::overlay::{BubbleState, TouchEvent};
use crate::selection::SelectionEvent;

/// Inputs delivered to the running service, one at a time.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    Selection(SelectionEvent),
    Touch {
        event: TouchEvent,
        on_tap: Option<BubbleAction>,
    },
    Action(BubbleAction),
    /// The OS interrupted the accessibility service.
    Interrupted,
    Shutdown,
}

pub struct SelectionBubbleApp {
    machine: SelectionSessionStateMachine,
    events_rx: mpsc::Receiver<ServiceEvent>,
    notices_tx: Option<mpsc::UnboundedSender<Notice>>,
}

impl SelectionBubbleApp {
    pub fn new(
        machine: SelectionSessionStateMachine,
        events_rx: mpsc::Receiver<ServiceEvent>,
    ) -> Self {
        Self {
            machine,
            events_rx,
            notices_tx: None,
        }
    }

    /// Forwards every raised [`Notice`] to `tx` in addition to logging it.
    pub fn with_notices(mut self, tx: mpsc::UnboundedSender<Notice>) -> Self {
        self.notices_tx = Some(tx);
        self
    }

    pub fn machine(&self) -> &SelectionSessionStateMachine {
        &self.machine
    }

    pub fn subscribe(&self) -> watch::Receiver<BubbleState> {
        self.machine.subscribe()
    }

    pub async fn run(mut self) -> Result<()> {
        info!(
            monitoring = self.machine.settings().monitoring_enabled,
            "🚀 Selection bubble running!"
        );
        if !self.machine.settings().monitoring_enabled {
            info!("🙈 Monitoring is disabled; selection events will be ignored");
        }

        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Some(ServiceEvent::Shutdown) => {
                            info!("Shutdown requested");
                            break;
                        }
                        Some(event) => self.handle_event(event),
                        None => {
                            info!("Event channel closed");
                            break;
                        }
                    }
                }
                notice = self.machine.step() => self.emit(notice),
            }
        }

        self.machine.shutdown();
        Ok(())
    }

    fn handle_event(&mut self, event: ServiceEvent) {
        debug!(?event, "Service event");
        let notice = match event {
            ServiceEvent::Selection(event) => {
                self.machine.handle_selection(event);
                None
            }
            ServiceEvent::Touch { event, on_tap } => self.machine.handle_touch(event, on_tap),
            ServiceEvent::Action(action) => self.machine.handle_action(action),
            ServiceEvent::Interrupted => {
                self.machine.handle_interrupt();
                None
            }
            ServiceEvent::Shutdown => None,
        };
        self.emit(notice);
    }

    fn emit(&self, notice: Option<Notice>) {
        let Some(notice) = notice else {
            return;
        };
        info!("💬 {}", notice.message());
        if let Some(tx) = &self.notices_tx {
            if tx.send(notice).is_err() {
                debug!("Notice receiver dropped");
            }
        }
    }
}
