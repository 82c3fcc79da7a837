use anyhow::{anyhow, Context, Result};
use std::sync::Mutex;
use tracing::debug;

/// System clipboard as seen by the bubble.
pub trait Clipboard: Send + Sync {
    fn set_text(&self, text: &str) -> Result<()>;

    /// Current plain-text clipboard contents, if any.
    fn primary_text(&self) -> Result<Option<String>>;
}

/// Clipboard backed by the desktop clipboard through `arboard`.
pub struct SystemClipboard {
    inner: Mutex<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let clipboard = arboard::Clipboard::new().context("Failed to initialize clipboard")?;
        Ok(Self {
            inner: Mutex::new(clipboard),
        })
    }
}

impl Clipboard for SystemClipboard {
    fn set_text(&self, text: &str) -> Result<()> {
        let mut clipboard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("Clipboard lock poisoned"))?;
        clipboard
            .set_text(text)
            .context("Failed to copy text to clipboard")?;
        debug!("Text copied to clipboard ({} chars)", text.chars().count());
        Ok(())
    }

    fn primary_text(&self) -> Result<Option<String>> {
        let mut clipboard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("Clipboard lock poisoned"))?;
        match clipboard.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(err) => Err(err).context("Failed to read clipboard"),
        }
    }
}

/// Process-local clipboard. Used when no desktop clipboard is reachable and
/// by the replay driver.
#[derive(Default)]
pub struct MemoryClipboard {
    text: Mutex<Option<String>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(Some(text.into())),
        }
    }
}

impl Clipboard for MemoryClipboard {
    fn set_text(&self, text: &str) -> Result<()> {
        let mut slot = self
            .text
            .lock()
            .map_err(|_| anyhow!("Clipboard lock poisoned"))?;
        *slot = Some(text.to_string());
        Ok(())
    }

    fn primary_text(&self) -> Result<Option<String>> {
        let slot = self
            .text
            .lock()
            .map_err(|_| anyhow!("Clipboard lock poisoned"))?;
        Ok(slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_clipboard_keeps_last_text() {
        let clipboard = MemoryClipboard::new();
        assert_eq!(clipboard.primary_text().unwrap(), None);

        clipboard.set_text("first").unwrap();
        clipboard.set_text("second").unwrap();
        assert_eq!(clipboard.primary_text().unwrap().as_deref(), Some("second"));
    }
}
