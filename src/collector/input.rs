use crate::collector::tracker::UNKNOWN_LABEL;
use crate::db::{IntervalKind, IntervalWriter, NewInterval};
use anyhow::{Context, Result, bail};
use tracing::info;

pub const MIN_TEXT_LENGTH: usize = 5;
pub const MAX_DETAIL_CHARS: usize = 500;

const BROWSERS: [&str; 4] = ["firefox", "chrome", "chromium", "edge"];

/// A burst of typed text handed over by the keystroke capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextInputEvent {
    pub ts: i64,
    pub window: String,
    pub text: String,
    pub duration_seconds: i64,
}

/// Maps the window the text was typed into to an input kind.
pub fn classify_input_kind(window: &str) -> IntervalKind {
    let window = window.to_lowercase();

    if window.contains("whatsapp") {
        IntervalKind::Whatsapp
    } else if window.contains("telegram") {
        IntervalKind::Telegram
    } else if window.contains("discord") {
        IntervalKind::Discord
    } else if window.contains("slack") {
        IntervalKind::Slack
    } else if BROWSERS.iter().any(|browser| window.contains(browser)) {
        IntervalKind::BrowserInput
    } else {
        IntervalKind::TextInput
    }
}

impl TextInputEvent {
    pub fn to_interval(&self) -> Result<NewInterval> {
        if self.text.chars().count() < MIN_TEXT_LENGTH {
            bail!(
                "text input shorter than {MIN_TEXT_LENGTH} characters is not recorded"
            );
        }

        let window = self.window.trim();
        let label = if window.is_empty() {
            UNKNOWN_LABEL
        } else {
            window
        };

        Ok(NewInterval {
            started_at: self.ts,
            kind: classify_input_kind(label),
            label: label.to_string(),
            detail: self.text.chars().take(MAX_DETAIL_CHARS).collect(),
            duration_seconds: self.duration_seconds.max(0),
        })
    }
}

/// Stores a text-input burst as one closed interval of the input stream.
pub fn record_text_input<W>(store: &W, event: &TextInputEvent) -> Result<i64>
where
    W: IntervalWriter + ?Sized,
{
    let interval = event.to_interval()?;
    let id = store
        .append(&interval)
        .context("Failed to store text input event")?;

    info!(
        kind = %interval.kind,
        chars = event.text.chars().count(),
        window = %interval.label,
        "text input recorded"
    );

    Ok(id)
}
