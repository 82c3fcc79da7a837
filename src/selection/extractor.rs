use crate::error::InvalidSelection;
use crate::input::Clipboard;
use crate::node::{char_len, char_slice};
use crate::selection::{SelectionEvent, SelectionOrigin, SelectionSession};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRules {
    /// Minimum character count of the trimmed selection.
    pub min_trimmed_chars: usize,
    pub clipboard_fallback: bool,
    pub clipboard_fallback_max_chars: usize,
}

impl Default for SelectionRules {
    fn default() -> Self {
        Self {
            min_trimmed_chars: 2,
            clipboard_fallback: false,
            clipboard_fallback_max_chars: 1000,
        }
    }
}

/// Turns selection notifications into validated selections.
///
/// Reads the source node once and never mutates it. Any fault from the node
/// is reported as an invalid selection.
pub struct SelectionExtractor {
    rules: SelectionRules,
    clipboard: Option<Arc<dyn Clipboard>>,
}

impl SelectionExtractor {
    pub fn new(rules: SelectionRules) -> Self {
        Self {
            rules,
            clipboard: None,
        }
    }

    /// Clipboard consulted by the degraded fallback, when it is enabled.
    pub fn with_clipboard(mut self, clipboard: Arc<dyn Clipboard>) -> Self {
        self.clipboard = Some(clipboard);
        self
    }

    pub fn rules(&self) -> &SelectionRules {
        &self.rules
    }

    /// The selected text, untrimmed.
    pub fn extract(&self, event: &SelectionEvent) -> Result<String, InvalidSelection> {
        let source = event.source.as_ref().ok_or(InvalidSelection::MissingSource)?;
        let from = event.from_index;
        let to = event.to_index;

        if from < 0 || to <= from {
            return Err(InvalidSelection::OutOfRange { from, to, len: 0 });
        }

        let node = source.upgrade().ok_or(InvalidSelection::StaleSource)?;
        let text = match node.text() {
            Ok(Some(text)) if !text.is_empty() => text,
            Ok(_) => return Err(InvalidSelection::EmptyText),
            Err(err) => {
                debug!("Selection source query failed: {err}");
                return Err(InvalidSelection::StaleSource);
            }
        };

        let len = char_len(&text);
        let (start, end) = (from as usize, to as usize);
        if start >= len || end > len {
            return Err(InvalidSelection::OutOfRange { from, to, len });
        }

        let selected = char_slice(&text, start, end)
            .ok_or(InvalidSelection::OutOfRange { from, to, len })?;

        if char_len(selected.trim()) < self.rules.min_trimmed_chars {
            return Err(InvalidSelection::TooShort);
        }

        Ok(selected.to_string())
    }

    /// Builds the session for a notification, falling back to the clipboard
    /// guess when enabled and the event carried no readable text. Collapsed,
    /// out-of-range and too-short selections stay invalid.
    pub fn capture(
        &self,
        event: &SelectionEvent,
        id: u64,
    ) -> Result<SelectionSession, InvalidSelection> {
        match self.extract(event) {
            Ok(raw_text) => Ok(SelectionSession {
                id,
                trimmed_text: raw_text.trim().to_string(),
                raw_text,
                source: event.source.clone(),
                start_offset: event.from_index as usize,
                end_offset: event.to_index as usize,
                origin: SelectionOrigin::Accessibility,
            }),
            Err(reason) if !reason.allows_clipboard_guess() => Err(reason),
            Err(reason) => match self.clipboard_candidate() {
                Some(candidate) => {
                    debug!("Direct extraction failed ({reason}); using clipboard guess");
                    let end_offset = char_len(&candidate);
                    Ok(SelectionSession {
                        id,
                        trimmed_text: candidate.trim().to_string(),
                        raw_text: candidate,
                        source: None,
                        start_offset: 0,
                        end_offset,
                        origin: SelectionOrigin::Clipboard,
                    })
                }
                None => Err(reason),
            },
        }
    }

    fn clipboard_candidate(&self) -> Option<String> {
        if !self.rules.clipboard_fallback {
            return None;
        }
        let clipboard = self.clipboard.as_ref()?;
        let text = match clipboard.primary_text() {
            Ok(text) => text?,
            Err(err) => {
                debug!("Clipboard fallback unavailable: {err:#}");
                return None;
            }
        };

        let trimmed_len = char_len(text.trim());
        if trimmed_len < self.rules.min_trimmed_chars
            || char_len(&text) >= self.rules.clipboard_fallback_max_chars
        {
            return None;
        }
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MemoryClipboard;
    use crate::node::{MemoryNode, NodeHandle};

    fn event_for(node: &Arc<MemoryNode>, from: i64, to: i64) -> SelectionEvent {
        SelectionEvent::new(Some(NodeHandle::new(node)), from, to)
    }

    #[test]
    fn extracts_selected_range() {
        let node = Arc::new(MemoryNode::new("hello brave world"));
        let extractor = SelectionExtractor::new(SelectionRules::default());
        assert_eq!(
            extractor.extract(&event_for(&node, 6, 11)).unwrap(),
            "brave"
        );
    }

    #[test]
    fn rejects_reversed_and_empty_ranges() {
        let node = Arc::new(MemoryNode::new("hello world"));
        let extractor = SelectionExtractor::new(SelectionRules::default());

        for (from, to) in [(5, 5), (6, 2), (-1, 4), (-1, -1)] {
            assert!(matches!(
                extractor.extract(&event_for(&node, from, to)),
                Err(InvalidSelection::OutOfRange { .. })
            ));
        }
    }

    #[test]
    fn rejects_offsets_beyond_text() {
        let node = Arc::new(MemoryNode::new("hello"));
        let extractor = SelectionExtractor::new(SelectionRules::default());
        assert!(matches!(
            extractor.extract(&event_for(&node, 2, 9)),
            Err(InvalidSelection::OutOfRange { len: 5, .. })
        ));
        assert!(matches!(
            extractor.extract(&event_for(&node, 5, 6)),
            Err(InvalidSelection::OutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_whitespace_and_single_character_selections() {
        let node = Arc::new(MemoryNode::new("a    b"));
        let extractor = SelectionExtractor::new(SelectionRules::default());
        assert_eq!(
            extractor.extract(&event_for(&node, 1, 5)),
            Err(InvalidSelection::TooShort)
        );
        assert_eq!(
            extractor.extract(&event_for(&node, 0, 3)),
            Err(InvalidSelection::TooShort)
        );
    }

    #[test]
    fn missing_or_recycled_source_is_invalid() {
        let extractor = SelectionExtractor::new(SelectionRules::default());
        assert_eq!(
            extractor.extract(&SelectionEvent::new(None, 0, 4)),
            Err(InvalidSelection::MissingSource)
        );

        let node = Arc::new(MemoryNode::new("hello world"));
        let event = event_for(&node, 0, 5);
        node.recycle();
        assert_eq!(extractor.extract(&event), Err(InvalidSelection::StaleSource));

        drop(node);
        assert_eq!(extractor.extract(&event), Err(InvalidSelection::StaleSource));
    }

    #[test]
    fn clipboard_fallback_is_opt_in() {
        let clipboard = Arc::new(MemoryClipboard::with_text("copied earlier"));
        let event = SelectionEvent::new(None, 0, 4);

        let disabled =
            SelectionExtractor::new(SelectionRules::default()).with_clipboard(clipboard.clone());
        assert!(disabled.capture(&event, 1).is_err());

        let enabled = SelectionExtractor::new(SelectionRules {
            clipboard_fallback: true,
            ..SelectionRules::default()
        })
        .with_clipboard(clipboard);
        let session = enabled.capture(&event, 2).unwrap();
        assert_eq!(session.origin, SelectionOrigin::Clipboard);
        assert_eq!(session.trimmed_text, "copied earlier");
        assert!(session.source.is_none());
    }

    #[test]
    fn clipboard_fallback_skips_collapsed_and_short_selections() {
        let clipboard = Arc::new(MemoryClipboard::with_text("old clipboard text"));
        let extractor = SelectionExtractor::new(SelectionRules {
            clipboard_fallback: true,
            ..SelectionRules::default()
        })
        .with_clipboard(clipboard);
        let node = Arc::new(MemoryNode::new("hello world"));

        assert!(matches!(
            extractor.capture(&event_for(&node, 3, 3), 1),
            Err(InvalidSelection::OutOfRange { .. })
        ));
        assert!(matches!(
            extractor.capture(&event_for(&node, 4, 1), 2),
            Err(InvalidSelection::OutOfRange { .. })
        ));
        assert_eq!(
            extractor.capture(&event_for(&node, 0, 1), 3),
            Err(InvalidSelection::TooShort)
        );

        let empty = Arc::new(MemoryNode::new(""));
        let session = extractor.capture(&event_for(&empty, 0, 4), 4).unwrap();
        assert_eq!(session.origin, SelectionOrigin::Clipboard);
    }

    #[test]
    fn clipboard_fallback_ignores_long_text() {
        let clipboard = Arc::new(MemoryClipboard::with_text("x".repeat(1000)));
        let extractor = SelectionExtractor::new(SelectionRules {
            clipboard_fallback: true,
            ..SelectionRules::default()
        })
        .with_clipboard(clipboard);
        assert!(extractor
            .capture(&SelectionEvent::new(None, 0, 4), 1)
            .is_err());
    }
}
