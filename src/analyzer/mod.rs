pub mod categorizer;
pub mod report;

use crate::ai::{self, SummaryInput};
use crate::config::{Config, SummaryProvider};
use crate::db::EventStore;
use anyhow::Result;
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{info, warn};

pub fn build_summary_input(store: &EventStore, date: NaiveDate) -> Result<SummaryInput> {
    let activities = store.intervals_for_date(date)?;
    let breakdown = categorizer::categorize(&activities);

    Ok(SummaryInput {
        date,
        activities,
        breakdown,
    })
}

/// Renders the summary for `date` and names the renderer that produced it.
///
/// Days without intervals never reach a provider. A provider that cannot be
/// built (for example a missing API key) degrades to the template like any
/// other provider failure.
pub fn generate_daily_summary(
    config: &Config,
    store: &EventStore,
    date: NaiveDate,
    provider: SummaryProvider,
) -> Result<(String, &'static str)> {
    let input = build_summary_input(store, date)?;

    if !input.breakdown.has_data() {
        return Ok((report::no_activity_summary(date), "none"));
    }

    let summarizer = ai::provider_for(config, provider)
        .map_err(|error| {
            warn!(provider = provider.as_str(), error = %error, "summary provider unavailable");
        })
        .ok();

    Ok(ai::summarize_with_fallback(summarizer.as_deref(), &input))
}

pub fn generate_and_store_summary(
    config: &Config,
    store: &EventStore,
    date: NaiveDate,
    provider: SummaryProvider,
) -> Result<(String, PathBuf)> {
    let (summary, renderer) = generate_daily_summary(config, store, date, provider)?;
    let path = report::save_summary_file(&summary, date, &config.summary_dir)?;

    info!(date = %date, renderer, path = %path.display(), "daily summary saved");

    Ok((summary, path))
}
