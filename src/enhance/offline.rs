use crate::enhance::EnhancementStyle;
use crate::logging::{record_text_pipeline, PipelineStepRecord, TextPipelineRecord};
use regex::{Captures, Regex};
use std::sync::LazyLock;

pub const DETAILED_SUFFIX: &str =
    "Additional context and supporting details would further clarify this point.";

static CONTRACTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(can|won|don|isn|aren)['’]t\b").expect("valid contraction regex")
});
static EXPANDED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(cannot|will not|do not|is not|are not)\b").expect("valid expansion regex")
});
static INTENSIFIER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(very|really|quite|rather|somewhat|extremely)\b[ \t]*")
        .expect("valid intensifier regex")
});
static IN_ORDER_TO_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bin order to\b").expect("valid in-order-to regex"));
static DUE_TO_FACT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bdue to the fact that\b").expect("valid due-to-the-fact regex")
});
static SPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid space collapse regex"));
static SPACE_BEFORE_PUNCT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[ \t]+([,.;:!?])").expect("valid punctuation spacing cleanup regex")
});

const CONTRACTIONS: &[(&str, &str)] = &[
    ("can", "cannot"),
    ("won", "will not"),
    ("don", "do not"),
    ("isn", "is not"),
    ("aren", "are not"),
];

/// Deterministic local rewrite used when the enhancement API is unreachable.
pub fn offline_transform(text: &str, style: EnhancementStyle) -> String {
    let pipeline = Pipeline::new(text).step("trim", |t| t.trim().to_string());

    let pipeline = match style {
        EnhancementStyle::General => pipeline
            .step("capitalize_first", capitalize_first)
            .step("terminal_punctuation", ensure_terminal_punctuation),
        EnhancementStyle::Professional => pipeline
            .step("expand_contractions", expand_contractions)
            .step("capitalize_first", capitalize_first)
            .step("terminal_punctuation", ensure_terminal_punctuation),
        EnhancementStyle::Casual => pipeline
            .step("contract_phrases", contract_phrases)
            .step("casual_terminator", ensure_casual_terminator),
        EnhancementStyle::Concise => pipeline
            .step("strip_intensifiers", strip_intensifiers)
            .step("shorten_phrases", shorten_phrases)
            .step("tidy_spacing", tidy_spacing),
        EnhancementStyle::Detailed => pipeline
            .step("capitalize_first", capitalize_first)
            .step("terminal_punctuation", ensure_terminal_punctuation)
            .step("elaborate", |t| {
                if t.is_empty() {
                    DETAILED_SUFFIX.to_string()
                } else {
                    format!("{t} {DETAILED_SUFFIX}")
                }
            }),
    };

    pipeline.finish(style)
}

struct Pipeline {
    input: String,
    current: String,
    steps: Option<Vec<PipelineStepRecord>>,
}

impl Pipeline {
    fn new(text: &str) -> Self {
        let steps = if tracing::level_enabled!(tracing::Level::DEBUG) {
            Some(Vec::new())
        } else {
            None
        };
        Self {
            input: text.to_string(),
            current: text.to_string(),
            steps,
        }
    }

    fn step(mut self, name: &'static str, transform: impl FnOnce(&str) -> String) -> Self {
        let next = transform(&self.current);
        if let Some(ref mut steps) = self.steps {
            steps.push(PipelineStepRecord::new(name, self.current.clone(), next.clone()));
        }
        self.current = next;
        self
    }

    fn finish(self, style: EnhancementStyle) -> String {
        if let Some(steps) = self.steps {
            record_text_pipeline(TextPipelineRecord::new(
                style.as_str(),
                self.input,
                self.current.clone(),
                steps,
            ));
        }
        self.current
    }
}

/// Gives `replacement` the capitalization of the first letter of `matched`.
fn match_case(matched: &str, replacement: &str) -> String {
    if matched.chars().next().is_some_and(char::is_uppercase) {
        capitalize_first(replacement)
    } else {
        replacement.to_string()
    }
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_lowercase() => first.to_uppercase().chain(chars).collect(),
        _ => text.to_string(),
    }
}

fn ensure_terminal_punctuation(text: &str) -> String {
    if text.is_empty() || text.ends_with(['.', '!', '?']) {
        text.to_string()
    } else {
        format!("{text}.")
    }
}

fn ensure_casual_terminator(text: &str) -> String {
    if text.is_empty() || text.ends_with(['!', '?']) {
        text.to_string()
    } else if let Some(stripped) = text.strip_suffix('.') {
        format!("{stripped}!")
    } else {
        format!("{text}!")
    }
}

fn expand_contractions(text: &str) -> String {
    CONTRACTION_REGEX
        .replace_all(text, |caps: &Captures| {
            let stem = caps[1].to_ascii_lowercase();
            let Some((_, expansion)) = CONTRACTIONS.iter().find(|(short, _)| *short == stem)
            else {
                return caps[0].to_string();
            };
            match_case(&caps[0], expansion)
        })
        .into_owned()
}

fn contract_phrases(text: &str) -> String {
    EXPANDED_REGEX
        .replace_all(text, |caps: &Captures| {
            let phrase = caps[1].to_ascii_lowercase();
            let contraction = match phrase.as_str() {
                "cannot" => "can't",
                "will not" => "won't",
                "do not" => "don't",
                "is not" => "isn't",
                "are not" => "aren't",
                _ => return caps[0].to_string(),
            };
            match_case(&caps[0], contraction)
        })
        .into_owned()
}

fn strip_intensifiers(text: &str) -> String {
    INTENSIFIER_REGEX.replace_all(text, "").into_owned()
}

fn shorten_phrases(text: &str) -> String {
    let shortened = IN_ORDER_TO_REGEX.replace_all(text, |caps: &Captures| match_case(&caps[0], "to"));
    DUE_TO_FACT_REGEX
        .replace_all(&shortened, |caps: &Captures| match_case(&caps[0], "because"))
        .into_owned()
}

fn tidy_spacing(text: &str) -> String {
    let collapsed = SPACE_REGEX.replace_all(text, " ");
    SPACE_BEFORE_PUNCT_REGEX
        .replace_all(&collapsed, "$1")
        .trim()
        .to_string()
}
