mod clipboard;
mod replacer;

pub use clipboard::{Clipboard, MemoryClipboard, SystemClipboard};
pub use replacer::{ReplaceMethod, ReplacementStrategy, SelectionRange};
