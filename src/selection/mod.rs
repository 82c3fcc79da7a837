mod debounce;
mod extractor;

pub use debounce::DebounceScheduler;
pub use extractor::{SelectionExtractor, SelectionRules};

use crate::input::SelectionRange;
use crate::node::NodeHandle;

/// Raw "selection changed" notification from the accessibility layer.
///
/// Offsets are signed because the platform reports `-1` when there is no
/// selection.
#[derive(Debug, Clone)]
pub struct SelectionEvent {
    pub source: Option<NodeHandle>,
    pub from_index: i64,
    pub to_index: i64,
}

impl SelectionEvent {
    pub fn new(source: Option<NodeHandle>, from_index: i64, to_index: i64) -> Self {
        Self {
            source,
            from_index,
            to_index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOrigin {
    Accessibility,
    /// Degraded guess taken from the clipboard; there is no node to write to.
    Clipboard,
}

/// The one live selection.
#[derive(Debug, Clone)]
pub struct SelectionSession {
    pub id: u64,
    pub raw_text: String,
    pub trimmed_text: String,
    pub source: Option<NodeHandle>,
    pub start_offset: usize,
    pub end_offset: usize,
    pub origin: SelectionOrigin,
}

impl SelectionSession {
    pub fn range(&self) -> SelectionRange {
        SelectionRange::new(self.start_offset, self.end_offset)
    }
}
