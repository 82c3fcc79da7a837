//! JSON-lines driver that feeds a scripted session into the service.
//!
//! One step per line; blank lines and lines starting with `#` are skipped.
//!
//! ```text
//! {"step":"field","id":"note","text":"i can't make it tomorrow"}
//! {"step":"select","field":"note","from":0,"to":24}
//! {"step":"wait","ms":600}
//! {"step":"action","action":"select_style","style":"professional"}
//! {"step":"action","action":"enhance"}
//! {"step":"wait","ms":100}
//! {"step":"action","action":"replace"}
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::app::ServiceEvent;
use crate::input::Clipboard;
use crate::machine::{BubbleAction, Notice};
use crate::node::{MemoryNode, NodeHandle};
use crate::overlay::{BubbleState, BubbleView, TouchEvent};
use crate::selection::SelectionEvent;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ReplayStep {
    /// Defines (or redefines) an editable text field.
    Field { id: String, text: String },
    /// Selection change in a field. An unknown field yields an event without
    /// a source node.
    Select { field: String, from: i64, to: i64 },
    /// Invalidates a field the way the OS recycles nodes.
    Recycle { field: String },
    Wait { ms: u64 },
    Touch {
        event: TouchEvent,
        #[serde(default)]
        on_tap: Option<BubbleAction>,
    },
    Action(BubbleAction),
    Interrupt,
}

pub fn parse_script(content: &str) -> Result<Vec<ReplayStep>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !is_skippable(line))
        .map(|(index, line)| {
            serde_json::from_str(line.trim())
                .with_context(|| format!("Invalid replay step on line {}", index + 1))
        })
        .collect()
}

pub async fn read_script<R>(reader: R) -> Result<Vec<ReplayStep>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut steps = Vec::new();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.context("Failed to read replay script")? {
        line_no += 1;
        if is_skippable(&line) {
            continue;
        }
        let step = serde_json::from_str(line.trim())
            .with_context(|| format!("Invalid replay step on line {line_no}"))?;
        steps.push(step);
    }
    Ok(steps)
}

fn is_skippable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Line printed for every observed bubble change or notice.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayOutput {
    Bubble {
        state: BubbleState,
        view: BubbleView,
    },
    Notice {
        notice: Notice,
        message: &'static str,
    },
    Field {
        id: String,
        text: String,
    },
}

impl ReplayOutput {
    pub fn bubble(state: BubbleState) -> Self {
        let view = BubbleView::from(&state);
        Self::Bubble { state, view }
    }

    pub fn notice(notice: Notice) -> Self {
        Self::Notice {
            message: notice.message(),
            notice,
        }
    }
}

/// Sends each step to the service. Fields are kept alive here so that
/// selection events only ever hold weak handles to them.
pub struct ReplayDriver {
    events: mpsc::Sender<ServiceEvent>,
    clipboard: Arc<dyn Clipboard>,
    fields: HashMap<String, Arc<MemoryNode>>,
}

impl ReplayDriver {
    pub fn new(events: mpsc::Sender<ServiceEvent>, clipboard: Arc<dyn Clipboard>) -> Self {
        Self {
            events,
            clipboard,
            fields: HashMap::new(),
        }
    }

    pub async fn play(&mut self, steps: Vec<ReplayStep>) -> Result<()> {
        for step in steps {
            self.apply(step).await?;
        }
        Ok(())
    }

    async fn apply(&mut self, step: ReplayStep) -> Result<()> {
        debug!(?step, "Replay step");
        match step {
            ReplayStep::Field { id, text } => {
                let node = MemoryNode::new(text).with_clipboard(Arc::clone(&self.clipboard));
                self.fields.insert(id, Arc::new(node));
            }
            ReplayStep::Select { field, from, to } => {
                let source = match self.fields.get(&field) {
                    Some(node) => {
                        if from >= 0 && to >= from {
                            node.select(from as usize, to as usize);
                        }
                        Some(NodeHandle::new(node))
                    }
                    None => {
                        warn!("Unknown field '{field}'; sending selection without source");
                        None
                    }
                };
                self.send(ServiceEvent::Selection(SelectionEvent::new(source, from, to)))
                    .await?;
            }
            ReplayStep::Recycle { field } => match self.fields.get(&field) {
                Some(node) => node.recycle(),
                None => warn!("Unknown field '{field}'; nothing to recycle"),
            },
            ReplayStep::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
            ReplayStep::Touch { event, on_tap } => {
                self.send(ServiceEvent::Touch { event, on_tap }).await?;
            }
            ReplayStep::Action(action) => self.send(ServiceEvent::Action(action)).await?,
            ReplayStep::Interrupt => self.send(ServiceEvent::Interrupted).await?,
        }
        Ok(())
    }

    async fn send(&self, event: ServiceEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| anyhow!("Service stopped before the script finished"))
    }

    /// Final text of every field, sorted by id.
    pub fn field_texts(&self) -> Vec<(String, String)> {
        let mut texts: Vec<_> = self
            .fields
            .iter()
            .map(|(id, node)| (id.clone(), node.current_text()))
            .collect();
        texts.sort();
        texts
    }
}
