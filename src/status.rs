use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Row, Table};
use std::fmt;
use std::path::PathBuf;

use crate::config::Config;
use crate::session::SessionSnapshot;

const DASH: &str = "—";

/// Snapshot printed by `selection-bubble status`.
pub struct StatusSummary {
    pub config_path: PathBuf,
    pub config: Config,
    pub session: SessionSnapshot,
}

fn mask_token(token: Option<&str>) -> String {
    match token.map(str::trim).filter(|token| !token.is_empty()) {
        Some(token) if token.chars().count() > 8 => {
            let tail: String = token
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("••••{tail}")
        }
        Some(_) => "••••".to_string(),
        None => DASH.to_string(),
    }
}

fn value_cell(value: impl ToString) -> Cell {
    Cell::new(value.to_string()).set_alignment(CellAlignment::Right)
}

fn row(label: &str, value: impl ToString) -> Row {
    Row::from(vec![Cell::new(label), value_cell(value)])
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .force_no_tty();

        table.set_header(vec![Cell::new("Selection bubble"), Cell::new("Value")]);

        let config = &self.config;
        table.add_row(row("Config file", self.config_path.display()));
        table.add_row(row(
            "Monitoring",
            if config.monitoring_enabled { "on" } else { "off" },
        ));
        table.add_row(row(
            "Debounce",
            format!("{} ms", config.selection.debounce_ms),
        ));
        table.add_row(row(
            "Min selection",
            format!("{} chars", config.selection.min_trimmed_chars),
        ));
        table.add_row(row(
            "Clipboard fallback",
            if config.selection.clipboard_fallback { "on" } else { "off" },
        ));
        table.add_row(row(
            "Bubble start",
            format!("{}, {}", config.bubble.initial_x, config.bubble.initial_y),
        ));
        table.add_row(row("API", &config.enhancement.api_base_url));
        table.add_row(row("Default style", config.enhancement.default_style));

        let session = &self.session;
        table.add_row(row(
            "Signed in",
            session.email.as_deref().unwrap_or(if session.is_signed_in() {
                "yes"
            } else {
                "no"
            }),
        ));
        table.add_row(row("Token", mask_token(session.access_token.as_deref())));
        table.add_row(row("Tokens used today", session.tokens_used_today));
        table.add_row(row("Tokens remaining", session.tokens_remaining_today));
        table.add_row(row(
            "Last usage",
            session.last_usage_date.as_deref().unwrap_or(DASH),
        ));

        write!(f, "{table}")
    }
}
