//! Error taxonomy for the selection bubble.
//!
//! None of these are fatal. Every path that produces one of them leaves the
//! state machine in a consistent `Idle`/`Hidden` state.

use thiserror::Error;

/// Why a selection-change notification did not produce a usable selection.
///
/// All variants are treated the same way by callers: hide any visible bubble
/// and show nothing to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSelection {
    #[error("selection event has no source node")]
    MissingSource,

    #[error("source node is no longer available")]
    StaleSource,

    #[error("source node has no text")]
    EmptyText,

    #[error("selection [{from}, {to}) is outside text of length {len}")]
    OutOfRange { from: i64, to: i64, len: usize },

    #[error("selected text is too short after trimming")]
    TooShort,
}

impl InvalidSelection {
    /// True when the event carried no readable text at all, as opposed to
    /// text that was read and rejected.
    pub fn allows_clipboard_guess(&self) -> bool {
        matches!(self, Self::MissingSource | Self::StaleSource | Self::EmptyText)
    }
}

/// Failure while talking to a node owned by another application.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// The OS recycled the node or the owning window went away.
    #[error("node handle is stale")]
    Stale,

    #[error("node does not support {0}")]
    Unsupported(&'static str),

    #[error("node action failed: {0}")]
    Failed(String),
}

/// Failure reported by the overlay window system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("overlay permission was revoked")]
    PermissionRevoked,

    #[error("overlay window no longer exists")]
    WindowGone,

    #[error("window system error: {0}")]
    Failed(String),
}

/// Failure from the remote enhancement API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("authorization rejected: {0}")]
    Unauthorized(String),

    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),
}
