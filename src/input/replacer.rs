use crate::input::Clipboard;
use crate::node::{char_len, splice_chars, ForeignNode, NodeAction, NodeHandle};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Character range of the original selection, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRange {
    pub start: usize,
    pub end: usize,
}

impl SelectionRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMethod {
    Paste,
    SpanSubstitution,
    ClipboardOnly,
}

/// Writes new text back into a foreign node.
///
/// Steps run in order, each only after the previous one was unavailable or
/// failed: paste over the live selection, splice the recorded range and set
/// the whole text, and finally leave the text on the clipboard for a manual
/// paste. The chain is not atomic; the splice step re-checks bounds against
/// the node's current text before writing.
pub struct ReplacementStrategy {
    clipboard: Arc<dyn Clipboard>,
    move_cursor: bool,
}

impl ReplacementStrategy {
    pub fn new(clipboard: Arc<dyn Clipboard>) -> Self {
        Self {
            clipboard,
            move_cursor: true,
        }
    }

    /// Skip repositioning the cursor after a successful splice.
    pub fn without_cursor_move(mut self) -> Self {
        self.move_cursor = false;
        self
    }

    /// Returns `true` when the text was replaced in place. On `false` the new
    /// text has been left on the clipboard.
    pub fn replace(
        &self,
        source: Option<&NodeHandle>,
        range: SelectionRange,
        new_text: &str,
    ) -> bool {
        self.replace_with_method(source, range, new_text) != ReplaceMethod::ClipboardOnly
    }

    pub fn replace_with_method(
        &self,
        source: Option<&NodeHandle>,
        range: SelectionRange,
        new_text: &str,
    ) -> ReplaceMethod {
        match source.and_then(NodeHandle::upgrade) {
            Some(node) => {
                if self.try_paste(node.as_ref(), new_text) {
                    info!("✅ Text replaced via paste");
                    return ReplaceMethod::Paste;
                }

                if self.try_span_substitution(node.as_ref(), range, new_text) {
                    info!("✅ Text replaced via span substitution");
                    return ReplaceMethod::SpanSubstitution;
                }
            }
            None => {
                debug!("Source node is gone; skipping in-place replacement");
            }
        }

        self.copy_for_manual_paste(new_text);
        ReplaceMethod::ClipboardOnly
    }

    fn try_paste(&self, node: &dyn ForeignNode, new_text: &str) -> bool {
        if let Err(err) = self.clipboard.set_text(new_text) {
            warn!("Clipboard unavailable for paste replacement: {err:#}");
            return false;
        }

        match node.perform_action(NodeAction::Paste) {
            Ok(true) => true,
            Ok(false) => {
                debug!("Node declined paste action");
                false
            }
            Err(err) => {
                warn!("Paste replacement failed: {err}");
                false
            }
        }
    }

    fn try_span_substitution(
        &self,
        node: &dyn ForeignNode,
        range: SelectionRange,
        new_text: &str,
    ) -> bool {
        let current = match node.text() {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("Node has no text; span substitution unavailable");
                return false;
            }
            Err(err) => {
                warn!("Failed to read node text for span substitution: {err}");
                return false;
            }
        };

        let len = char_len(&current);
        if range.start >= range.end || range.start >= len || range.end > len {
            debug!(
                start = range.start,
                end = range.end,
                len,
                "Recorded selection no longer fits the node text"
            );
            return false;
        }

        let Some(updated) = splice_chars(&current, range.start, range.end, new_text) else {
            return false;
        };

        match node.perform_action(NodeAction::SetText(updated)) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Node declined set-text action");
                return false;
            }
            Err(err) => {
                warn!("Span substitution failed: {err}");
                return false;
            }
        }

        if self.move_cursor {
            let cursor = range.start + char_len(new_text);
            match node.perform_action(NodeAction::SetSelection {
                start: cursor,
                end: cursor,
            }) {
                Ok(true) => {}
                Ok(false) => debug!("Node declined cursor move after replacement"),
                Err(err) => debug!("Cursor move after replacement failed: {err}"),
            }
        }

        true
    }

    fn copy_for_manual_paste(&self, new_text: &str) {
        match self.clipboard.set_text(new_text) {
            Ok(()) => info!("📋 In-place replacement unavailable; text copied for manual paste"),
            Err(err) => warn!("Failed to copy replacement text to clipboard: {err:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MemoryClipboard;
    use crate::node::{MemoryNode, NodeCapabilities};

    fn no_paste() -> NodeCapabilities {
        NodeCapabilities {
            paste: false,
            ..NodeCapabilities::default()
        }
    }

    #[test]
    fn paste_step_wins_when_node_accepts_it() {
        let clipboard: Arc<dyn Clipboard> = Arc::new(MemoryClipboard::new());
        let node = Arc::new(MemoryNode::new("fix teh typo").with_clipboard(clipboard.clone()));
        node.select(4, 7);
        let handle = NodeHandle::new(&node);

        let strategy = ReplacementStrategy::new(clipboard);
        let method =
            strategy.replace_with_method(Some(&handle), SelectionRange::new(4, 7), "the");

        assert_eq!(method, ReplaceMethod::Paste);
        assert_eq!(node.current_text(), "fix the typo");
    }

    #[test]
    fn span_substitution_moves_cursor_after_inserted_text() {
        let clipboard: Arc<dyn Clipboard> = Arc::new(MemoryClipboard::new());
        let node = Arc::new(MemoryNode::new("fix teh typo").with_capabilities(no_paste()));
        let handle = NodeHandle::new(&node);

        let strategy = ReplacementStrategy::new(clipboard);
        assert!(strategy.replace(Some(&handle), SelectionRange::new(4, 7), "the"));
        assert_eq!(node.current_text(), "fix the typo");
        assert_eq!(node.selection(), (7, 7));
    }

    #[test]
    fn span_substitution_declines_when_text_shrank() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let node = Arc::new(MemoryNode::new("short").with_capabilities(no_paste()));
        let handle = NodeHandle::new(&node);

        let strategy = ReplacementStrategy::new(clipboard.clone());
        let replaced = strategy.replace(Some(&handle), SelectionRange::new(2, 12), "longer text");

        assert!(!replaced);
        assert_eq!(node.current_text(), "short");
        assert_eq!(
            clipboard.primary_text().unwrap().as_deref(),
            Some("longer text")
        );
    }

    #[test]
    fn dropped_node_goes_straight_to_clipboard() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let node = Arc::new(MemoryNode::new("gone soon"));
        let handle = NodeHandle::new(&node);
        drop(node);

        let strategy = ReplacementStrategy::new(clipboard.clone());
        let method =
            strategy.replace_with_method(Some(&handle), SelectionRange::new(0, 4), "new");

        assert_eq!(method, ReplaceMethod::ClipboardOnly);
        assert_eq!(clipboard.primary_text().unwrap().as_deref(), Some("new"));
    }
}
