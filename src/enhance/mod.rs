mod client;
mod offline;

pub use client::HttpEnhancementClient;
pub use offline::{offline_transform, DETAILED_SUFFIX};

use crate::error::ApiError;
use crate::session::SessionStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum EnhancementStyle {
    #[default]
    General,
    Professional,
    Casual,
    Concise,
    Detailed,
}

impl EnhancementStyle {
    pub const ALL: [EnhancementStyle; 5] = [
        EnhancementStyle::General,
        EnhancementStyle::Professional,
        EnhancementStyle::Casual,
        EnhancementStyle::Concise,
        EnhancementStyle::Detailed,
    ];

    /// Wire value sent as `enhancement_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Professional => "professional",
            Self::Casual => "casual",
            Self::Concise => "concise",
            Self::Detailed => "detailed",
        }
    }
}

impl fmt::Display for EnhancementStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnhancementStyle {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|style| style.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| anyhow::anyhow!("Unknown enhancement style: {value}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub tokens_used_this_request: u32,
    pub tokens_used_today: u32,
    pub tokens_remaining_today: u32,
}

/// Successful reply of the enhancement endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhanceResponse {
    pub enhanced_text: String,
    #[serde(default)]
    pub original_text: Option<String>,
    #[serde(default)]
    pub enhancement_type: Option<String>,
    pub tokens_used_this_request: u32,
    pub tokens_used_today: u32,
    pub tokens_remaining_today: u32,
    #[serde(default)]
    pub daily_limit: Option<u32>,
    #[serde(default)]
    pub resets_at: Option<String>,
}

impl EnhanceResponse {
    pub fn usage(&self) -> UsageStats {
        UsageStats {
            tokens_used_this_request: self.tokens_used_this_request,
            tokens_used_today: self.tokens_used_today,
            tokens_remaining_today: self.tokens_remaining_today,
        }
    }
}

/// Remote text-enhancement service.
#[async_trait]
pub trait EnhancementApi: Send + Sync {
    async fn enhance(
        &self,
        text: &str,
        style: EnhancementStyle,
        bearer_token: &str,
    ) -> Result<EnhanceResponse, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhancementSource {
    Remote,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum EnhancementStatus {
    Idle,
    Loading,
    Success {
        text: String,
        usage: Option<UsageStats>,
        source: EnhancementSource,
    },
    Error(String),
}

pub const AUTH_REQUIRED: &str = "auth required";

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs one enhancement at a time.
///
/// Network, auth and server failures are answered with the deterministic
/// offline transform for the requested style. The network call itself is
/// never retried.
pub struct EnhancementOrchestrator {
    api: Arc<dyn EnhancementApi>,
    sessions: Arc<dyn SessionStore>,
    in_flight: AtomicBool,
    status_tx: watch::Sender<EnhancementStatus>,
}

impl EnhancementOrchestrator {
    pub fn new(api: Arc<dyn EnhancementApi>, sessions: Arc<dyn SessionStore>) -> Self {
        let (status_tx, _) = watch::channel(EnhancementStatus::Idle);
        Self {
            api,
            sessions,
            in_flight: AtomicBool::new(false),
            status_tx,
        }
    }

    pub fn is_enhancing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> watch::Receiver<EnhancementStatus> {
        self.status_tx.subscribe()
    }

    /// Returns `None` without doing anything when another enhancement is
    /// still running.
    pub async fn enhance(&self, text: &str, style: EnhancementStyle) -> Option<EnhancementStatus> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Enhancement already in flight; ignoring request");
            return None;
        }
        let _in_flight = InFlight(&self.in_flight);

        let Some(token) = self.sessions.access_token().await else {
            info!("🔒 Enhancement needs a signed-in session");
            let status = EnhancementStatus::Error(AUTH_REQUIRED.to_string());
            self.status_tx.send_replace(status.clone());
            return Some(status);
        };

        self.status_tx.send_replace(EnhancementStatus::Loading);
        info!(style = style.as_str(), "✨ Enhancing {} characters", text.chars().count());

        let status = match self.api.enhance(text, style, &token).await {
            Ok(response) => {
                let usage = response.usage();
                if let Err(err) = self
                    .sessions
                    .update_usage(usage.tokens_used_today, usage.tokens_remaining_today)
                    .await
                {
                    warn!("Failed to persist token usage: {err:#}");
                }
                info!(
                    used = usage.tokens_used_this_request,
                    remaining = usage.tokens_remaining_today,
                    "✅ Enhancement complete"
                );
                EnhancementStatus::Success {
                    text: response.enhanced_text,
                    usage: Some(usage),
                    source: EnhancementSource::Remote,
                }
            }
            Err(err) => {
                warn!("Enhancement API failed ({err}); using offline transform");
                EnhancementStatus::Success {
                    text: offline_transform(text, style),
                    usage: None,
                    source: EnhancementSource::Offline,
                }
            }
        };

        self.status_tx.send_replace(status.clone());
        Some(status)
    }
}
