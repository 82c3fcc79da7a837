use crate::error::WindowError;
use crate::overlay::{BubbleView, Position};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WindowId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Opaque,
    Translucent,
}

/// Layout parameters for the overlay window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowParams {
    pub position: Position,
    pub wrap_content: bool,
    pub focusable: bool,
    pub pixel_format: PixelFormat,
}

impl WindowParams {
    /// Bubble window anchored at the top-left corner offset by `position`.
    pub fn bubble_at(position: Position) -> Self {
        Self {
            position,
            wrap_content: true,
            focusable: false,
            pixel_format: PixelFormat::Translucent,
        }
    }
}

/// Draws windows above every other application.
pub trait WindowSystem: Send {
    fn add(&mut self, view: &BubbleView, params: &WindowParams) -> Result<WindowId, WindowError>;

    fn update(
        &mut self,
        window: WindowId,
        view: &BubbleView,
        params: &WindowParams,
    ) -> Result<(), WindowError>;

    fn remove(&mut self, window: WindowId) -> Result<(), WindowError>;
}

#[derive(Debug, Default)]
struct HeadlessWindows {
    next_id: u64,
    live: Vec<(WindowId, WindowParams)>,
    max_live: usize,
    added: usize,
    permission_revoked: bool,
}

/// Window system without a display. Logs every operation and tracks the
/// live windows; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct HeadlessWindowSystem {
    inner: Arc<Mutex<HeadlessWindows>>,
}

impl HeadlessWindowSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the user revoking the overlay permission. Every later call
    /// fails with [`WindowError::PermissionRevoked`].
    pub fn revoke_permission(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.permission_revoked = true;
        }
    }

    pub fn live_windows(&self) -> usize {
        self.inner.lock().map(|inner| inner.live.len()).unwrap_or(0)
    }

    /// Highest number of simultaneously live windows ever observed.
    pub fn max_live_windows(&self) -> usize {
        self.inner.lock().map(|inner| inner.max_live).unwrap_or(0)
    }

    pub fn windows_added(&self) -> usize {
        self.inner.lock().map(|inner| inner.added).unwrap_or(0)
    }

    pub fn live_position(&self) -> Option<Position> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.live.last().map(|(_, params)| params.position))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HeadlessWindows>, WindowError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| WindowError::Failed("headless window state poisoned".to_string()))?;
        if inner.permission_revoked {
            return Err(WindowError::PermissionRevoked);
        }
        Ok(inner)
    }
}

impl WindowSystem for HeadlessWindowSystem {
    fn add(&mut self, view: &BubbleView, params: &WindowParams) -> Result<WindowId, WindowError> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = WindowId(inner.next_id);
        inner.live.push((id, *params));
        inner.added += 1;
        inner.max_live = inner.max_live.max(inner.live.len());

        info!(
            window = id.0,
            x = params.position.x,
            y = params.position.y,
            "🫧 Bubble shown: {}",
            view.header
        );
        Ok(id)
    }

    fn update(
        &mut self,
        window: WindowId,
        view: &BubbleView,
        params: &WindowParams,
    ) -> Result<(), WindowError> {
        let mut inner = self.lock()?;
        let entry = inner
            .live
            .iter_mut()
            .find(|(id, _)| *id == window)
            .ok_or(WindowError::WindowGone)?;
        entry.1 = *params;

        debug!(
            window = window.0,
            x = params.position.x,
            y = params.position.y,
            body = view.body.as_str(),
            "Bubble updated"
        );
        Ok(())
    }

    fn remove(&mut self, window: WindowId) -> Result<(), WindowError> {
        let mut inner = self.lock()?;
        let before = inner.live.len();
        inner.live.retain(|(id, _)| *id != window);
        if inner.live.len() == before {
            return Err(WindowError::WindowGone);
        }

        debug!(window = window.0, "Bubble removed");
        Ok(())
    }
}
