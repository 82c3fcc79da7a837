use crate::overlay::Position;
use serde::Deserialize;

/// Raw pointer event on the bubble, in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TouchEvent {
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up { x: f32, y: f32 },
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    /// Event belongs to an ongoing gesture.
    Consumed,
    /// Press and release without crossing the drag threshold.
    Tap,
    /// A drag finished; the bubble stays where it was dropped.
    DragEnd,
    /// No gesture in progress or bubble not visible.
    Ignored,
}

/// State of one touch gesture, dropped when the gesture ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragState {
    anchor_touch: (f32, f32),
    anchor_position: Position,
    dragging: bool,
    threshold: f32,
}

impl DragState {
    pub fn press(x: f32, y: f32, window_position: Position, threshold: f32) -> Self {
        Self {
            anchor_touch: (x, y),
            anchor_position: window_position,
            dragging: false,
            threshold,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn anchor_position(&self) -> Position {
        self.anchor_position
    }

    /// Tracks a move and returns the displacement from the press point once
    /// the gesture has become a drag.
    pub fn track(&mut self, x: f32, y: f32) -> Option<(i32, i32)> {
        let dx = x - self.anchor_touch.0;
        let dy = y - self.anchor_touch.1;

        if !self.dragging && (dx.abs() > self.threshold || dy.abs() > self.threshold) {
            self.dragging = true;
        }

        self.dragging.then_some((dx as i32, dy as i32))
    }
}
