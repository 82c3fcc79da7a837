//! Access to text nodes owned by other applications.
//!
//! A [`NodeHandle`] never keeps the node alive. Every use must upgrade it and
//! tolerate the node failing any call.

use crate::error::NodeError;
use crate::input::Clipboard;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAction {
    /// Replace the whole node text.
    SetText(String),
    /// Move the selection (or cursor when `start == end`).
    SetSelection { start: usize, end: usize },
    /// Paste the clipboard over the current selection.
    Paste,
}

impl NodeAction {
    pub fn name(&self) -> &'static str {
        match self {
            NodeAction::SetText(_) => "set_text",
            NodeAction::SetSelection { .. } => "set_selection",
            NodeAction::Paste => "paste",
        }
    }
}

pub trait ForeignNode: Send + Sync {
    /// Current text content. `Ok(None)` means the node exposes no text.
    fn text(&self) -> Result<Option<String>, NodeError>;

    /// Perform a native action. `Ok(false)` means the node refused it.
    fn perform_action(&self, action: NodeAction) -> Result<bool, NodeError>;
}

/// Non-owning reference to a foreign node.
#[derive(Clone)]
pub struct NodeHandle(Weak<dyn ForeignNode>);

impl NodeHandle {
    pub fn new<N: ForeignNode + 'static>(node: &Arc<N>) -> Self {
        let weak: Weak<N> = Arc::downgrade(node);
        Self(weak)
    }

    pub fn upgrade(&self) -> Option<Arc<dyn ForeignNode>> {
        self.0.upgrade()
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("alive", &(self.0.strong_count() > 0))
            .finish()
    }
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn byte_offset(text: &str, char_index: usize) -> Option<usize> {
    if char_index == 0 {
        return Some(0);
    }
    text.char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(text.len()))
        .nth(char_index)
}

/// Character-indexed substring `[start, end)`. `None` when out of bounds.
pub fn char_slice(text: &str, start: usize, end: usize) -> Option<&str> {
    if start > end {
        return None;
    }
    let from = byte_offset(text, start)?;
    let to = byte_offset(text, end)?;
    Some(&text[from..to])
}

/// `before + replacement + after` around the character range `[start, end)`.
pub fn splice_chars(text: &str, start: usize, end: usize, replacement: &str) -> Option<String> {
    if start > end {
        return None;
    }
    let from = byte_offset(text, start)?;
    let to = byte_offset(text, end)?;
    let mut spliced = String::with_capacity(text.len() - (to - from) + replacement.len());
    spliced.push_str(&text[..from]);
    spliced.push_str(replacement);
    spliced.push_str(&text[to..]);
    Some(spliced)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeCapabilities {
    pub paste: bool,
    pub set_text: bool,
    pub set_selection: bool,
}

impl Default for NodeCapabilities {
    fn default() -> Self {
        Self {
            paste: true,
            set_text: true,
            set_selection: true,
        }
    }
}

#[derive(Debug)]
struct MemoryNodeState {
    text: String,
    selection: (usize, usize),
    recycled: bool,
}

/// Editable text field living in this process.
///
/// Behaves like a foreign node: it can be recycled, after which every call
/// fails with [`NodeError::Stale`], and each action can be switched off.
pub struct MemoryNode {
    state: Mutex<MemoryNodeState>,
    capabilities: NodeCapabilities,
    clipboard: Option<Arc<dyn Clipboard>>,
}

impl MemoryNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MemoryNodeState {
                text: text.into(),
                selection: (0, 0),
                recycled: false,
            }),
            capabilities: NodeCapabilities::default(),
            clipboard: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: NodeCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Clipboard read when the node handles [`NodeAction::Paste`].
    pub fn with_clipboard(mut self, clipboard: Arc<dyn Clipboard>) -> Self {
        self.clipboard = Some(clipboard);
        self
    }

    pub fn select(&self, start: usize, end: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.selection = (start, end);
        }
    }

    /// Simulate the owning app editing the field.
    pub fn set_text_externally(&self, text: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.text = text.into();
        }
    }

    /// Simulate the OS recycling the node.
    pub fn recycle(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.recycled = true;
        }
    }

    pub fn current_text(&self) -> String {
        self.state
            .lock()
            .map(|state| state.text.clone())
            .unwrap_or_default()
    }

    pub fn selection(&self) -> (usize, usize) {
        self.state
            .lock()
            .map(|state| state.selection)
            .unwrap_or_default()
    }

    fn live_state(&self) -> Result<MutexGuard<'_, MemoryNodeState>, NodeError> {
        let state = self
            .state
            .lock()
            .map_err(|_| NodeError::Failed("node state poisoned".to_string()))?;
        if state.recycled {
            return Err(NodeError::Stale);
        }
        Ok(state)
    }

    fn paste(&self, state: &mut MemoryNodeState) -> Result<bool, NodeError> {
        let Some(clipboard) = self.clipboard.as_ref() else {
            return Ok(false);
        };
        let Some(pasted) = clipboard
            .primary_text()
            .map_err(|err| NodeError::Failed(err.to_string()))?
        else {
            return Ok(false);
        };

        let (start, end) = state.selection;
        let Some(updated) = splice_chars(&state.text, start, end, &pasted) else {
            return Ok(false);
        };
        state.text = updated;
        let cursor = start + char_len(&pasted);
        state.selection = (cursor, cursor);
        Ok(true)
    }
}

impl ForeignNode for MemoryNode {
    fn text(&self) -> Result<Option<String>, NodeError> {
        let state = self.live_state()?;
        if state.text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(state.text.clone()))
        }
    }

    fn perform_action(&self, action: NodeAction) -> Result<bool, NodeError> {
        let mut state = self.live_state()?;
        debug!(action = action.name(), "Memory node action");

        match action {
            NodeAction::SetText(text) => {
                if !self.capabilities.set_text {
                    return Err(NodeError::Unsupported("set_text"));
                }
                state.text = text;
                Ok(true)
            }
            NodeAction::SetSelection { start, end } => {
                if !self.capabilities.set_selection {
                    return Err(NodeError::Unsupported("set_selection"));
                }
                if start > end || end > char_len(&state.text) {
                    return Ok(false);
                }
                state.selection = (start, end);
                Ok(true)
            }
            NodeAction::Paste => {
                if !self.capabilities.paste {
                    return Err(NodeError::Unsupported("paste"));
                }
                self.paste(&mut state)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MemoryClipboard;

    #[test]
    fn char_slice_handles_multibyte_text() {
        let text = "héllo wörld";
        assert_eq!(char_slice(text, 0, 5), Some("héllo"));
        assert_eq!(char_slice(text, 6, 11), Some("wörld"));
        assert_eq!(char_slice(text, 6, 12), None);
        assert_eq!(char_slice(text, 4, 2), None);
    }

    #[test]
    fn splice_replaces_character_range() {
        assert_eq!(
            splice_chars("say hi there", 4, 6, "hello").as_deref(),
            Some("say hello there")
        );
        assert_eq!(splice_chars("abc", 1, 4, "x"), None);
    }

    #[test]
    fn handle_does_not_keep_node_alive() {
        let node = Arc::new(MemoryNode::new("text"));
        let handle = NodeHandle::new(&node);
        assert!(handle.upgrade().is_some());

        drop(node);
        assert!(handle.upgrade().is_none());
    }

    #[test]
    fn recycled_node_reports_stale() {
        let node = MemoryNode::new("text");
        node.recycle();
        assert_eq!(node.text(), Err(NodeError::Stale));
        assert_eq!(node.perform_action(NodeAction::Paste), Err(NodeError::Stale));
    }

    #[test]
    fn paste_replaces_current_selection() {
        let clipboard = Arc::new(MemoryClipboard::with_text("there"));
        let node = MemoryNode::new("hello world").with_clipboard(clipboard);
        node.select(6, 11);

        assert_eq!(node.perform_action(NodeAction::Paste), Ok(true));
        assert_eq!(node.current_text(), "hello there");
        assert_eq!(node.selection(), (11, 11));
    }
}
