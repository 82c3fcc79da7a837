use crate::config::Config;
use crate::enhance::{EnhancementOrchestrator, EnhancementSource, EnhancementStatus, EnhancementStyle};
use crate::input::{Clipboard, ReplacementStrategy};
use crate::overlay::{
    BubbleState, GestureOutcome, OverlayController, Position, TouchEvent, WindowSystem,
};
use crate::selection::{
    DebounceScheduler, SelectionEvent, SelectionExtractor, SelectionRules, SelectionSession,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Everything the machine reads from configuration, captured once.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineSettings {
    pub monitoring_enabled: bool,
    pub debounce: Duration,
    pub rules: SelectionRules,
    pub initial_position: Position,
    pub drag_threshold: f32,
    pub default_style: EnhancementStyle,
}

impl MachineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            monitoring_enabled: config.monitoring_enabled,
            debounce: config.selection.debounce(),
            rules: SelectionRules {
                min_trimmed_chars: config.selection.min_trimmed_chars,
                clipboard_fallback: config.selection.clipboard_fallback,
                clipboard_fallback_max_chars: config.selection.clipboard_fallback_max_chars,
            },
            initial_position: Position::new(config.bubble.initial_x, config.bubble.initial_y),
            drag_threshold: config.bubble.drag_threshold_px as f32,
            default_style: config.enhancement.default_style,
        }
    }
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    PendingShow,
    Shown,
}

/// Button presses on the bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BubbleAction {
    SelectStyle { style: EnhancementStyle },
    Enhance,
    Copy,
    Replace,
    Close,
}

/// Short user-facing message raised by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    Copied,
    Replaced,
    CopiedForManualPaste,
    LoginRequired,
    Enhanced { offline: bool },
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Copied => "Copied to clipboard",
            Self::Replaced => "Text replaced",
            Self::CopiedForManualPaste => "Text copied. Paste it manually",
            Self::LoginRequired => "Sign in to enhance text",
            Self::Enhanced { offline: false } => "Text enhanced",
            Self::Enhanced { offline: true } => "Enhanced offline",
        }
    }
}

/// Bubble message when another session's enhancement still holds the slot.
pub const ENHANCEMENT_BUSY: &str = "enhancement already running";

#[derive(Debug)]
struct EnhancementDone {
    session_id: u64,
    status: EnhancementStatus,
}

/// Top-level coordinator: selection events in, one bubble out.
///
/// Holds at most one [`SelectionSession`] and drives the only overlay
/// window. Every input is handled to completion before the next one; the
/// only suspension points are the debounce timer and enhancement results,
/// both consumed through [`step`](Self::step).
pub struct SelectionSessionStateMachine {
    settings: MachineSettings,
    extractor: SelectionExtractor,
    scheduler: DebounceScheduler<u64>,
    overlay: OverlayController,
    orchestrator: Arc<EnhancementOrchestrator>,
    replacer: ReplacementStrategy,
    clipboard: Arc<dyn Clipboard>,
    phase: SessionPhase,
    session: Option<SelectionSession>,
    style: EnhancementStyle,
    next_session_id: u64,
    done_tx: mpsc::UnboundedSender<EnhancementDone>,
    done_rx: mpsc::UnboundedReceiver<EnhancementDone>,
}

impl SelectionSessionStateMachine {
    pub fn new(
        settings: MachineSettings,
        windows: Box<dyn WindowSystem>,
        clipboard: Arc<dyn Clipboard>,
        orchestrator: Arc<EnhancementOrchestrator>,
    ) -> Self {
        let extractor =
            SelectionExtractor::new(settings.rules.clone()).with_clipboard(Arc::clone(&clipboard));
        let overlay =
            OverlayController::new(windows, settings.initial_position, settings.drag_threshold);
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        Self {
            scheduler: DebounceScheduler::new(settings.debounce),
            replacer: ReplacementStrategy::new(Arc::clone(&clipboard)),
            style: settings.default_style,
            settings,
            extractor,
            overlay,
            orchestrator,
            clipboard,
            phase: SessionPhase::Idle,
            session: None,
            next_session_id: 0,
            done_tx,
            done_rx,
        }
    }

    pub fn settings(&self) -> &MachineSettings {
        &self.settings
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn session(&self) -> Option<&SelectionSession> {
        self.session.as_ref()
    }

    pub fn overlay(&self) -> &OverlayController {
        &self.overlay
    }

    pub fn bubble(&self) -> &BubbleState {
        self.overlay.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<BubbleState> {
        self.overlay.subscribe()
    }

    pub fn is_show_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    pub fn handle_selection(&mut self, event: SelectionEvent) {
        if !self.settings.monitoring_enabled {
            return;
        }

        self.scheduler.cancel();
        self.next_session_id += 1;
        let id = self.next_session_id;

        match self.extractor.capture(&event, id) {
            Ok(session) => {
                debug!(
                    session = id,
                    chars = session.trimmed_text.chars().count(),
                    "Selection captured; bubble pending"
                );
                self.session = Some(session);
                self.scheduler.schedule_default(id);
                self.phase = SessionPhase::PendingShow;
            }
            Err(reason) => {
                debug!("Ignoring selection: {reason}");
                self.reset();
            }
        }
    }

    /// Waits for the next internal event and handles it. Never resolves
    /// while nothing is pending.
    pub async fn step(&mut self) -> Option<Notice> {
        tokio::select! {
            id = self.scheduler.fired() => {
                self.show_session(id);
                None
            }
            Some(done) = self.done_rx.recv() => {
                self.on_enhancement_finished(done.session_id, done.status)
            }
        }
    }

    /// Shows the bubble if the debounce deadline has passed. Returns whether
    /// it fired.
    pub fn fire_due(&mut self) -> bool {
        match self.scheduler.take_due(Instant::now()) {
            Some(id) => {
                self.show_session(id);
                true
            }
            None => false,
        }
    }

    pub fn handle_touch(
        &mut self,
        event: TouchEvent,
        on_tap: Option<BubbleAction>,
    ) -> Option<Notice> {
        if self.phase != SessionPhase::Shown {
            return None;
        }

        let outcome = self.overlay.on_touch(event);
        self.sync_with_overlay();

        match (outcome, on_tap) {
            (GestureOutcome::Tap, Some(action)) => self.handle_action(action),
            _ => None,
        }
    }

    pub fn handle_action(&mut self, action: BubbleAction) -> Option<Notice> {
        if self.phase != SessionPhase::Shown {
            debug!(?action, "Bubble not shown; ignoring action");
            return None;
        }

        let notice = match action {
            BubbleAction::SelectStyle { style } => {
                self.style = style;
                self.overlay.set_style(style);
                None
            }
            BubbleAction::Enhance => {
                self.start_enhancement();
                None
            }
            BubbleAction::Copy => self.copy_enhanced(),
            BubbleAction::Replace => self.replace_enhanced(),
            BubbleAction::Close => {
                self.reset();
                None
            }
        };

        self.sync_with_overlay();
        notice
    }

    /// The accessibility service was interrupted by the OS.
    pub fn handle_interrupt(&mut self) {
        info!("⏸️  Selection service interrupted");
        self.reset();
    }

    pub fn shutdown(&mut self) {
        self.reset();
        info!("🛑 Selection bubble stopped");
    }

    pub fn on_enhancement_finished(
        &mut self,
        session_id: u64,
        status: EnhancementStatus,
    ) -> Option<Notice> {
        let current = self.session.as_ref().map(|session| session.id);
        if self.phase != SessionPhase::Shown || current != Some(session_id) {
            debug!(session = session_id, "Dropping enhancement for a superseded session");
            return None;
        }

        self.overlay.apply_status(&status);
        self.sync_with_overlay();

        match status {
            EnhancementStatus::Success { source, .. } => Some(Notice::Enhanced {
                offline: source == EnhancementSource::Offline,
            }),
            EnhancementStatus::Error(_) => Some(Notice::LoginRequired),
            EnhancementStatus::Idle | EnhancementStatus::Loading => None,
        }
    }

    fn show_session(&mut self, id: u64) {
        let Some(session) = self.session.as_ref().filter(|session| session.id == id) else {
            debug!(session = id, "Stale show request");
            return;
        };
        if self.phase != SessionPhase::PendingShow {
            return;
        }

        self.overlay.show(session);
        if !self.overlay.is_visible() {
            self.reset();
            return;
        }

        self.phase = SessionPhase::Shown;
        self.style = self.settings.default_style;
        if self.style != EnhancementStyle::default() {
            self.overlay.set_style(self.style);
        }
        self.sync_with_overlay();
    }

    fn start_enhancement(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if self.overlay.state().is_enhancing {
            debug!("Enhancement already running; ignoring request");
            return;
        }
        if self.orchestrator.is_enhancing() {
            debug!("Earlier session still enhancing; ignoring request");
            self.overlay
                .apply_status(&EnhancementStatus::Error(ENHANCEMENT_BUSY.to_string()));
            return;
        }

        let session_id = session.id;
        let text = session.trimmed_text.clone();
        let style = self.style;
        self.overlay.apply_status(&EnhancementStatus::Loading);
        if !self.overlay.is_visible() {
            return;
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let status = orchestrator
                .enhance(&text, style)
                .await
                .unwrap_or(EnhancementStatus::Idle);
            let _ = done_tx.send(EnhancementDone { session_id, status });
        });
    }

    fn enhanced_text(&self) -> Option<String> {
        let state = self.overlay.state();
        if state.actions_enabled() {
            state.enhanced_text.clone()
        } else {
            None
        }
    }

    fn copy_enhanced(&mut self) -> Option<Notice> {
        let Some(text) = self.enhanced_text() else {
            debug!("Nothing enhanced yet; copy ignored");
            return None;
        };

        let notice = match self.clipboard.set_text(&text) {
            Ok(()) => {
                info!("📋 Enhanced text copied");
                Some(Notice::Copied)
            }
            Err(err) => {
                warn!("Failed to copy enhanced text: {err:#}");
                None
            }
        };
        self.reset();
        notice
    }

    fn replace_enhanced(&mut self) -> Option<Notice> {
        let Some(text) = self.enhanced_text() else {
            debug!("Nothing enhanced yet; replace ignored");
            return None;
        };
        let Some(session) = self.session.as_ref() else {
            return None;
        };

        let replaced = self
            .replacer
            .replace(session.source.as_ref(), session.range(), &text);
        self.reset();

        if replaced {
            Some(Notice::Replaced)
        } else {
            Some(Notice::CopiedForManualPaste)
        }
    }

    /// Back to `Idle`: no session, nothing pending, bubble hidden.
    fn reset(&mut self) {
        self.scheduler.cancel();
        self.overlay.hide();
        self.session = None;
        self.phase = SessionPhase::Idle;
    }

    /// A window-system failure can hide the bubble underneath us.
    fn sync_with_overlay(&mut self) {
        if self.phase == SessionPhase::Shown && !self.overlay.is_visible() {
            warn!("Bubble window lost; returning to idle");
            self.session = None;
            self.phase = SessionPhase::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enhance::{EnhanceResponse, EnhancementApi};
    use crate::error::ApiError;
    use crate::input::MemoryClipboard;
    use crate::node::{MemoryNode, NodeHandle};
    use crate::overlay::{BubbleView, HeadlessWindowSystem};
    use crate::session::MemorySessionStore;
    use async_trait::async_trait;
    use tokio::time;

    struct OfflineApi;

    #[async_trait]
    impl EnhancementApi for OfflineApi {
        async fn enhance(
            &self,
            _text: &str,
            _style: EnhancementStyle,
            _bearer_token: &str,
        ) -> Result<EnhanceResponse, ApiError> {
            Err(ApiError::Transport("offline".to_string()))
        }
    }

    struct SlowOfflineApi;

    #[async_trait]
    impl EnhancementApi for SlowOfflineApi {
        async fn enhance(
            &self,
            _text: &str,
            _style: EnhancementStyle,
            _bearer_token: &str,
        ) -> Result<EnhanceResponse, ApiError> {
            time::sleep(Duration::from_secs(2)).await;
            Err(ApiError::Transport("timed out".to_string()))
        }
    }

    struct Harness {
        machine: SelectionSessionStateMachine,
        windows: HeadlessWindowSystem,
        clipboard: Arc<MemoryClipboard>,
    }

    fn harness(settings: MachineSettings, signed_in: bool) -> Harness {
        harness_with_api(settings, signed_in, Arc::new(OfflineApi))
    }

    fn harness_with_api(
        settings: MachineSettings,
        signed_in: bool,
        api: Arc<dyn EnhancementApi>,
    ) -> Harness {
        let windows = HeadlessWindowSystem::new();
        let clipboard = Arc::new(MemoryClipboard::new());
        let sessions = if signed_in {
            MemorySessionStore::signed_in("token")
        } else {
            MemorySessionStore::new()
        };
        let orchestrator = Arc::new(EnhancementOrchestrator::new(api, Arc::new(sessions)));
        let machine = SelectionSessionStateMachine::new(
            settings,
            Box::new(windows.clone()),
            clipboard.clone(),
            orchestrator,
        );
        Harness {
            machine,
            windows,
            clipboard,
        }
    }

    fn select(node: &Arc<MemoryNode>, from: i64, to: i64) -> SelectionEvent {
        SelectionEvent::new(Some(NodeHandle::new(node)), from, to)
    }

    #[tokio::test(start_paused = true)]
    async fn valid_selection_shows_after_debounce() {
        let mut h = harness(MachineSettings::default(), true);
        let node = Arc::new(MemoryNode::new("hello world"));

        h.machine.handle_selection(select(&node, 0, 11));
        assert_eq!(h.machine.phase(), SessionPhase::PendingShow);
        assert_eq!(h.windows.live_windows(), 0);

        time::advance(Duration::from_millis(499)).await;
        assert!(!h.machine.fire_due());

        time::advance(Duration::from_millis(1)).await;
        assert!(h.machine.fire_due());
        assert_eq!(h.machine.phase(), SessionPhase::Shown);
        assert_eq!(h.machine.bubble().selected_text, "hello world");
        assert_eq!(h.windows.live_windows(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_selection_hides_visible_bubble() {
        let mut h = harness(MachineSettings::default(), true);
        let node = Arc::new(MemoryNode::new("hello world"));
        h.machine.handle_selection(select(&node, 0, 5));
        h.machine.step().await;
        assert_eq!(h.machine.phase(), SessionPhase::Shown);

        h.machine.handle_selection(select(&node, 5, 6));
        assert_eq!(h.machine.phase(), SessionPhase::Idle);
        assert!(h.machine.session().is_none());
        assert_eq!(h.windows.live_windows(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_monitoring_ignores_events() {
        let settings = MachineSettings {
            monitoring_enabled: false,
            ..MachineSettings::default()
        };
        let mut h = harness(settings, true);
        let node = Arc::new(MemoryNode::new("hello world"));
        h.machine.handle_selection(select(&node, 0, 11));
        assert_eq!(h.machine.phase(), SessionPhase::Idle);
        assert!(!h.machine.is_show_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn offline_enhancement_then_copy() {
        let mut h = harness(MachineSettings::default(), true);
        let node = Arc::new(MemoryNode::new("hello world"));
        h.machine.handle_selection(select(&node, 0, 11));
        h.machine.step().await;

        assert_eq!(h.machine.handle_action(BubbleAction::Copy), None);
        assert_eq!(h.machine.phase(), SessionPhase::Shown);

        h.machine.handle_action(BubbleAction::Enhance);
        assert!(h.machine.bubble().is_enhancing);
        let notice = h.machine.step().await;
        assert_eq!(notice, Some(Notice::Enhanced { offline: true }));
        assert_eq!(h.machine.bubble().enhanced_text.as_deref(), Some("Hello world."));

        assert_eq!(h.machine.handle_action(BubbleAction::Copy), Some(Notice::Copied));
        assert_eq!(h.clipboard.primary_text().unwrap().as_deref(), Some("Hello world."));
        assert_eq!(h.machine.phase(), SessionPhase::Idle);
        assert_eq!(h.windows.live_windows(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn signed_out_enhancement_asks_for_login() {
        let mut h = harness(MachineSettings::default(), false);
        let node = Arc::new(MemoryNode::new("hello world"));
        h.machine.handle_selection(select(&node, 0, 11));
        h.machine.step().await;

        h.machine.handle_action(BubbleAction::Enhance);
        assert_eq!(h.machine.step().await, Some(Notice::LoginRequired));
        assert_eq!(h.machine.bubble().message.as_deref(), Some("auth required"));
        assert!(!h.machine.bubble().actions_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn result_for_superseded_session_is_dropped() {
        let mut h = harness(MachineSettings::default(), true);
        let node = Arc::new(MemoryNode::new("hello world again"));
        h.machine.handle_selection(select(&node, 0, 5));
        h.machine.step().await;
        h.machine.handle_action(BubbleAction::Enhance);

        h.machine.handle_selection(select(&node, 6, 11));
        assert_eq!(h.machine.step().await, None);
        assert_eq!(h.machine.phase(), SessionPhase::PendingShow);

        h.machine.step().await;
        assert_eq!(h.machine.bubble().selected_text, "world");
        assert_eq!(h.machine.bubble().enhanced_text, None);
        assert_eq!(h.windows.max_live_windows(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tap_dispatches_action_and_drag_does_not() {
        let mut h = harness(MachineSettings::default(), true);
        let node = Arc::new(MemoryNode::new("hello world"));
        h.machine.handle_selection(select(&node, 0, 11));
        h.machine.step().await;

        h.machine
            .handle_touch(TouchEvent::Down { x: 0.0, y: 0.0 }, Some(BubbleAction::Close));
        h.machine
            .handle_touch(TouchEvent::Move { x: 30.0, y: 0.0 }, Some(BubbleAction::Close));
        h.machine
            .handle_touch(TouchEvent::Up { x: 30.0, y: 0.0 }, Some(BubbleAction::Close));
        assert_eq!(h.machine.phase(), SessionPhase::Shown);
        assert_eq!(h.machine.bubble().position, Position::new(130, 200));

        h.machine
            .handle_touch(TouchEvent::Down { x: 5.0, y: 5.0 }, Some(BubbleAction::Close));
        h.machine
            .handle_touch(TouchEvent::Up { x: 6.0, y: 5.0 }, Some(BubbleAction::Close));
        assert_eq!(h.machine.phase(), SessionPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_window_permission_returns_to_idle() {
        let mut h = harness(MachineSettings::default(), true);
        let node = Arc::new(MemoryNode::new("hello world"));
        h.machine.handle_selection(select(&node, 0, 11));
        h.windows.revoke_permission();
        h.machine.step().await;
        assert_eq!(h.machine.phase(), SessionPhase::Idle);
        assert!(h.machine.session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn enhance_while_earlier_session_runs_reports_busy() {
        let mut h = harness_with_api(MachineSettings::default(), true, Arc::new(SlowOfflineApi));
        let node = Arc::new(MemoryNode::new("hello world again"));
        h.machine.handle_selection(select(&node, 0, 5));
        h.machine.step().await;
        h.machine.handle_action(BubbleAction::Enhance);

        h.machine.handle_selection(select(&node, 6, 11));
        h.machine.step().await;
        assert_eq!(h.machine.phase(), SessionPhase::Shown);

        h.machine.handle_action(BubbleAction::Enhance);
        let bubble = h.machine.bubble();
        assert!(!bubble.is_enhancing);
        assert_eq!(bubble.message.as_deref(), Some(ENHANCEMENT_BUSY));
        assert_eq!(
            BubbleView::from(bubble).body,
            "Error: enhancement already running"
        );

        assert_eq!(h.machine.step().await, None);
        h.machine.handle_action(BubbleAction::Enhance);
        assert!(h.machine.bubble().is_enhancing);
        assert_eq!(h.machine.bubble().message, None);
    }

    #[test]
    fn actions_deserialize_from_tag() {
        let action: BubbleAction =
            serde_json::from_str(r#"{"action":"select_style","style":"casual"}"#).unwrap();
        assert_eq!(
            action,
            BubbleAction::SelectStyle {
                style: EnhancementStyle::Casual
            }
        );
    }
}
