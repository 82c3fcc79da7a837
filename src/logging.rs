use owo_colors::OwoColorize;
use similar::{ChangeTag, TextDiff};
use std::fmt;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

pub const PIPELINE_TARGET: &str = "selection_bubble::pipeline";

/// One named rewrite applied to a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStepRecord {
    pub name: &'static str,
    pub before: String,
    pub after: String,
}

impl PipelineStepRecord {
    pub fn new(name: &'static str, before: String, after: String) -> Self {
        Self {
            name,
            before,
            after,
        }
    }

    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPipelineRecord {
    pub label: &'static str,
    pub input: String,
    pub output: String,
    pub steps: Vec<PipelineStepRecord>,
}

impl TextPipelineRecord {
    pub fn new(
        label: &'static str,
        input: String,
        output: String,
        steps: Vec<PipelineStepRecord>,
    ) -> Self {
        Self {
            label,
            input,
            output,
            steps,
        }
    }
}

/// Emits a debug event per changed step plus a summary line.
pub fn record_text_pipeline(record: TextPipelineRecord) {
    for step in record.steps.iter().filter(|step| step.changed()) {
        debug!(
            target: PIPELINE_TARGET,
            pipeline = record.label,
            step = step.name,
            "{}",
            render_diff(&step.before, &step.after)
        );
    }

    let changed = record.steps.iter().filter(|step| step.changed()).count();
    debug!(
        target: PIPELINE_TARGET,
        pipeline = record.label,
        changed_steps = changed,
        "{:?} -> {:?}",
        record.input,
        record.output
    );
}

/// Inline character diff: removals as `[-..-]`, insertions as `{+..+}`.
pub fn render_diff(before: &str, after: &str) -> String {
    let diff = TextDiff::from_chars(before, after);
    let mut out = String::with_capacity(before.len().max(after.len()) + 8);
    let mut open: Option<ChangeTag> = None;

    for change in diff.iter_all_changes() {
        let tag = change.tag();
        if open != Some(tag) {
            close_run(&mut out, open);
            match tag {
                ChangeTag::Delete => out.push_str("[-"),
                ChangeTag::Insert => out.push_str("{+"),
                ChangeTag::Equal => {}
            }
            open = Some(tag);
        }
        out.push_str(change.value());
    }
    close_run(&mut out, open);
    out
}

fn close_run(out: &mut String, tag: Option<ChangeTag>) {
    match tag {
        Some(ChangeTag::Delete) => out.push_str("-]"),
        Some(ChangeTag::Insert) => out.push_str("+}"),
        _ => {}
    }
}

/// Compact single-line event format: local time, colored level, target,
/// then the event fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct BubbleLogFormatter;

impl BubbleLogFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl<S, N> FormatEvent<S, N> for BubbleLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let timestamp = now
            .format(format_description!(
                "[hour]:[minute]:[second].[subsecond digits:3]"
            ))
            .map_err(|_| fmt::Error)?;

        let metadata = event.metadata();
        let level = *metadata.level();
        let ansi = writer.has_ansi_escapes();

        if ansi {
            write!(writer, "{} ", timestamp.dimmed())?;
            match level {
                Level::ERROR => write!(writer, "{:>5} ", "ERROR".red().bold())?,
                Level::WARN => write!(writer, "{:>5} ", "WARN".yellow().bold())?,
                Level::INFO => write!(writer, "{:>5} ", "INFO".green())?,
                Level::DEBUG => write!(writer, "{:>5} ", "DEBUG".blue())?,
                Level::TRACE => write!(writer, "{:>5} ", "TRACE".purple())?,
            }
            write!(writer, "{} ", metadata.target().dimmed())?;
        } else {
            write!(writer, "{timestamp} {level:>5} {} ", metadata.target())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_marks_insertions_and_removals() {
        assert_eq!(
            render_diff("hello world", "Hello world."),
            "[-h-]{+H+}ello world{+.+}"
        );
    }

    #[test]
    fn diff_of_identical_text_is_plain() {
        assert_eq!(render_diff("same", "same"), "same");
        assert_eq!(render_diff("", "new"), "{+new+}");
    }

    #[test]
    fn unchanged_steps_are_reported_as_such() {
        let step = PipelineStepRecord::new("trim", "a".to_string(), "a".to_string());
        assert!(!step.changed());
        let step = PipelineStepRecord::new("trim", " a".to_string(), "a".to_string());
        assert!(step.changed());
    }
}
