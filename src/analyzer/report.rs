use crate::analyzer::categorizer::{ActivityTally, ActivityTime, CategoryBreakdown};
use crate::db::{IntervalKind, IntervalRecord};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, TimeZone};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const FALLBACK_TOP_ACTIVITIES: usize = 5;
const STATS_TOP_ACTIVITIES: usize = 10;

// Kinds that describe where time went, as opposed to typed-text bursts.
const ATTENTION_KINDS: [&str; 7] = [
    "window", "website", "whatsapp", "telegram", "facebook", "twitter", "youtube",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityStats {
    pub total_seconds: i64,
    pub by_kind: BTreeMap<String, i64>,
    pub top_activities: Vec<ActivityTime>,
}

pub fn no_activity_summary(date: NaiveDate) -> String {
    format!(
        "# No activity recorded for {}\n\nTracking may not be running or no activity was detected.\n",
        date.format("%Y-%m-%d")
    )
}

/// Deterministic summary used whenever no AI provider answers.
pub fn render_fallback_summary(date: NaiveDate, breakdown: &CategoryBreakdown) -> String {
    let total = breakdown.total_seconds.max(0);

    let mut ranked = breakdown
        .categories
        .iter()
        .filter(|summary| summary.seconds > 0)
        .collect::<Vec<_>>();
    ranked.sort_by(|left, right| right.seconds.cmp(&left.seconds));

    let category_rows = if ranked.is_empty() {
        "- No data".to_string()
    } else {
        ranked
            .iter()
            .map(|summary| {
                let percentage = if total == 0 {
                    0.0
                } else {
                    summary.seconds as f64 / total as f64 * 100.0
                };
                format!(
                    "- **{}**: {} ({:.1}%)",
                    display_category_name(summary.name),
                    format_hours_minutes(summary.seconds),
                    percentage
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let activity_rows = if breakdown.top_activities.is_empty() {
        "- No data".to_string()
    } else {
        breakdown
            .top_activities
            .iter()
            .take(FALLBACK_TOP_ACTIVITIES)
            .enumerate()
            .map(|(index, activity)| {
                format!(
                    "{}. {}: {}",
                    index + 1,
                    activity.title,
                    format_hours_minutes(activity.seconds)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut summary = format!(
        "# Daily Summary - {}\n\n**Total tracked time:** {}\n\n## Time by Category\n\n{}\n\n## Top Activities\n\n{}\n",
        date.format("%Y-%m-%d"),
        format_hours_minutes(total),
        category_rows,
        activity_rows
    );

    if breakdown.active_seconds() > 0 {
        let score = breakdown.productivity_score();
        let verdict = match score {
            7.. => "Excellent! You kept a strong focus on productive work.",
            4..=6 => "A moderate day. There is room to focus more on productive work.",
            _ => "A low-productivity day. Consider planning your time more deliberately.",
        };
        summary.push_str(&format!(
            "\n## Productivity Score: {score}/10\n\n{verdict}\n"
        ));
    }

    summary
}

/// One bullet per interval, oldest first.
pub fn render_logbook(date: NaiveDate, records: &[IntervalRecord]) -> String {
    let mut lines = vec![format!("# Daily logbook - {}\n", date.format("%Y-%m-%d"))];

    lines.extend(records.iter().map(|record| {
        format!(
            "- **{}** [{}] {} — {} — {}s",
            format_local_timestamp(record.started_at),
            record.kind,
            record.label,
            record.detail,
            record.duration_seconds
        )
    }));

    lines.join("\n")
}

pub fn build_stats(records: &[IntervalRecord]) -> ActivityStats {
    let mut by_kind = BTreeMap::new();
    let mut by_title = ActivityTally::default();

    for record in records {
        let seconds = record.duration_seconds.max(0);
        *by_kind.entry(record.kind.as_str().to_string()).or_insert(0_i64) += seconds;

        if !is_attention_kind(&record.kind) {
            continue;
        }

        by_title.add(&record.label, seconds);
    }

    ActivityStats {
        total_seconds: by_kind.values().sum(),
        by_kind,
        top_activities: by_title.into_top(STATS_TOP_ACTIVITIES),
    }
}

pub fn save_summary_file(summary: &str, date: NaiveDate, summary_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(summary_dir).with_context(|| {
        format!(
            "Failed to create summary directory: {}",
            summary_dir.display()
        )
    })?;

    let path = summary_dir.join(format!("summary_{}.md", date.format("%Y-%m-%d")));
    fs::write(&path, summary)
        .with_context(|| format!("Failed to write summary: {}", path.display()))?;

    Ok(path)
}

pub fn format_hours_minutes(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{}h {}min", seconds / 3600, (seconds % 3600) / 60)
}

fn is_attention_kind(kind: &IntervalKind) -> bool {
    ATTENTION_KINDS.contains(&kind.as_str())
}

fn format_local_timestamp(ts: i64) -> String {
    Local
        .timestamp_opt(ts, 0)
        .earliest()
        .map(|datetime| datetime.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn display_category_name(raw: &str) -> String {
    raw.split('_')
        .map(|word| {
            let mut chars = word.chars();
            chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join(" ")
}
