mod drag;
mod window;

pub use drag::{DragState, GestureOutcome, TouchEvent};
pub use window::{HeadlessWindowSystem, PixelFormat, WindowId, WindowParams, WindowSystem};

use crate::enhance::{EnhancementSource, EnhancementStatus, EnhancementStyle};
use crate::selection::SelectionSession;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }
}

/// Immutable snapshot of the bubble. Every transition publishes a new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BubbleState {
    pub visible: bool,
    pub position: Position,
    pub session_id: Option<u64>,
    pub selected_text: String,
    pub enhanced_text: Option<String>,
    pub enhancement_style: EnhancementStyle,
    pub is_enhancing: bool,
    pub offline: bool,
    pub message: Option<String>,
}

impl BubbleState {
    pub fn hidden(position: Position) -> Self {
        Self {
            visible: false,
            position,
            session_id: None,
            selected_text: String::new(),
            enhanced_text: None,
            enhancement_style: EnhancementStyle::General,
            is_enhancing: false,
            offline: false,
            message: None,
        }
    }

    /// Fresh state for a new selection. Only the position carries over.
    pub fn for_session(session: &SelectionSession, position: Position) -> Self {
        Self {
            visible: true,
            session_id: Some(session.id),
            selected_text: session.trimmed_text.clone(),
            ..Self::hidden(position)
        }
    }

    pub fn with_position(&self, position: Position) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }

    pub fn with_style(&self, style: EnhancementStyle) -> Self {
        Self {
            enhancement_style: style,
            ..self.clone()
        }
    }

    pub fn with_status(&self, status: &EnhancementStatus) -> Self {
        match status {
            EnhancementStatus::Idle => Self {
                is_enhancing: false,
                ..self.clone()
            },
            EnhancementStatus::Loading => Self {
                is_enhancing: true,
                message: None,
                ..self.clone()
            },
            EnhancementStatus::Success { text, source, .. } => Self {
                is_enhancing: false,
                enhanced_text: Some(text.clone()),
                offline: *source == EnhancementSource::Offline,
                message: None,
                ..self.clone()
            },
            EnhancementStatus::Error(message) => Self {
                is_enhancing: false,
                message: Some(message.clone()),
                ..self.clone()
            },
        }
    }

    pub fn actions_enabled(&self) -> bool {
        self.enhanced_text.is_some() && !self.is_enhancing
    }
}

/// What the window shows, derived from a [`BubbleState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BubbleView {
    pub header: String,
    pub body: String,
    pub enhance_enabled: bool,
    pub copy_enabled: bool,
    pub replace_enabled: bool,
}

impl From<&BubbleState> for BubbleView {
    fn from(state: &BubbleState) -> Self {
        let body = if state.is_enhancing {
            "Enhancing...".to_string()
        } else if let Some(message) = &state.message {
            format!("Error: {message}")
        } else if let Some(enhanced) = &state.enhanced_text {
            if state.offline {
                format!("Enhanced (offline): {enhanced}")
            } else {
                format!("Enhanced: {enhanced}")
            }
        } else {
            "Tap 'Enhance' to improve this text".to_string()
        };

        Self {
            header: format!("Selected: {}", state.selected_text),
            body,
            enhance_enabled: !state.is_enhancing,
            copy_enabled: state.actions_enabled(),
            replace_enabled: state.actions_enabled(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPhase {
    Hidden,
    Showing,
    Visible,
    Dragging,
}

/// Owns the single bubble window.
///
/// Window-system failures are logged and leave the controller hidden.
pub struct OverlayController {
    windows: Box<dyn WindowSystem>,
    window: Option<WindowId>,
    phase: OverlayPhase,
    state: BubbleState,
    drag: Option<DragState>,
    drag_threshold: f32,
    state_tx: watch::Sender<BubbleState>,
}

impl OverlayController {
    pub fn new(windows: Box<dyn WindowSystem>, initial: Position, drag_threshold: f32) -> Self {
        let state = BubbleState::hidden(initial);
        let (state_tx, _) = watch::channel(state.clone());
        Self {
            windows,
            window: None,
            phase: OverlayPhase::Hidden,
            state,
            drag: None,
            drag_threshold,
            state_tx,
        }
    }

    pub fn phase(&self) -> OverlayPhase {
        self.phase
    }

    pub fn state(&self) -> &BubbleState {
        &self.state
    }

    pub fn is_visible(&self) -> bool {
        matches!(self.phase, OverlayPhase::Visible | OverlayPhase::Dragging)
    }

    pub fn subscribe(&self) -> watch::Receiver<BubbleState> {
        self.state_tx.subscribe()
    }

    pub fn show(&mut self, session: &SelectionSession) {
        if self.phase != OverlayPhase::Hidden {
            self.hide();
        }

        self.phase = OverlayPhase::Showing;
        let state = BubbleState::for_session(session, self.state.position);
        let view = BubbleView::from(&state);
        let params = WindowParams::bubble_at(state.position);

        match self.windows.add(&view, &params) {
            Ok(window) => {
                self.window = Some(window);
                self.phase = OverlayPhase::Visible;
                self.publish(state);
                debug!(session = session.id, "Bubble visible");
            }
            Err(err) => {
                error!("Failed to show bubble: {err}");
                self.force_hidden();
            }
        }
    }

    /// Removes the window if there is one. Safe to call in any phase.
    pub fn hide(&mut self) {
        self.drag = None;
        if let Some(window) = self.window.take() {
            if let Err(err) = self.windows.remove(window) {
                warn!("Error removing bubble window: {err}");
            }
        }

        self.phase = OverlayPhase::Hidden;
        if self.state.visible {
            self.publish(BubbleState::hidden(self.state.position));
        }
    }

    /// Moves the bubble to the drag anchor plus `(dx, dy)`. Only legal while
    /// dragging; returns whether the move was applied.
    pub fn update_position(&mut self, dx: i32, dy: i32) -> bool {
        if self.phase != OverlayPhase::Dragging {
            return false;
        }
        let Some(anchor) = self.drag.as_ref().map(DragState::anchor_position) else {
            return false;
        };

        let state = self.state.with_position(anchor.offset(dx, dy));
        self.render(state);
        self.is_visible()
    }

    pub fn on_touch(&mut self, event: TouchEvent) -> GestureOutcome {
        if !self.is_visible() {
            return GestureOutcome::Ignored;
        }

        match event {
            TouchEvent::Down { x, y } => {
                self.drag = Some(DragState::press(
                    x,
                    y,
                    self.state.position,
                    self.drag_threshold,
                ));
                GestureOutcome::Consumed
            }
            TouchEvent::Move { x, y } => {
                let Some(drag) = self.drag.as_mut() else {
                    return GestureOutcome::Ignored;
                };
                if let Some((dx, dy)) = drag.track(x, y) {
                    self.phase = OverlayPhase::Dragging;
                    self.update_position(dx, dy);
                }
                GestureOutcome::Consumed
            }
            TouchEvent::Up { .. } => match self.drag.take() {
                Some(drag) if drag.is_dragging() => {
                    self.phase = OverlayPhase::Visible;
                    info!(
                        "Bubble position saved: x={}, y={}",
                        self.state.position.x, self.state.position.y
                    );
                    GestureOutcome::DragEnd
                }
                Some(_) => GestureOutcome::Tap,
                None => GestureOutcome::Ignored,
            },
            TouchEvent::Cancel => {
                if self.drag.take().is_some() && self.phase == OverlayPhase::Dragging {
                    self.phase = OverlayPhase::Visible;
                }
                GestureOutcome::Consumed
            }
        }
    }

    pub fn set_style(&mut self, style: EnhancementStyle) {
        if self.is_visible() {
            let state = self.state.with_style(style);
            self.render(state);
        }
    }

    pub fn apply_status(&mut self, status: &EnhancementStatus) {
        if self.is_visible() {
            let state = self.state.with_status(status);
            self.render(state);
        }
    }

    fn render(&mut self, state: BubbleState) {
        let Some(window) = self.window else {
            return;
        };

        let view = BubbleView::from(&state);
        let params = WindowParams::bubble_at(state.position);
        match self.windows.update(window, &view, &params) {
            Ok(()) => self.publish(state),
            Err(err) => {
                error!("Failed to update bubble window: {err}");
                self.force_hidden();
            }
        }
    }

    fn force_hidden(&mut self) {
        if let Some(window) = self.window.take() {
            if let Err(err) = self.windows.remove(window) {
                debug!("Bubble window already gone: {err}");
            }
        }
        self.drag = None;
        self.phase = OverlayPhase::Hidden;
        self.publish(BubbleState::hidden(self.state.position));
    }

    fn publish(&mut self, state: BubbleState) {
        self.state = state;
        self.state_tx.send_replace(self.state.clone());
    }
}
