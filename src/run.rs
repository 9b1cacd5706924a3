//! One relay run, start to finish.
//!
//! ```text
//! load state -> check policy -> fetch -> normalize -> plan -> deliver -> cleanup
//! ```
//!
//! Every stage either hands its output to the next or ends the run with a
//! [`RunError`]. Nothing is retried within a run; the next scheduled run picks
//! up from whatever state was committed.

use crate::config::{Config, StateBackend, StateConfig, Policy};
use crate::deliver::{CommitTiming, execute};
use crate::error::{ConfigError, RunError};
use crate::normalize::normalize;
use crate::plan::plan;
use crate::sink::MessageSink;
use crate::sink::telegram::TelegramSink;
use crate::sources::Source;
use crate::store::seen_set::SqliteSeenSet;
use crate::store::watermark::WatermarkFile;
use crate::store::{SeenStore, check_policy};
use tracing::{info, instrument};

/// Counts reported at the end of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub fetched: usize,
    pub candidates: usize,
    pub delivered_items: usize,
    pub sent_units: usize,
    pub state: String,
}

/// Open the configured state backend.
pub fn open_store(state: &StateConfig, policy: Policy) -> Box<dyn SeenStore> {
    match state.backend {
        StateBackend::Watermark => Box::new(WatermarkFile::new(&state.path, policy)),
        StateBackend::SeenSet => {
            Box::new(SqliteSeenSet::new(&state.path, policy).with_retention_days(state.retention_days))
        }
    }
}

/// Run once against Telegram with the configured source and store.
pub async fn run(config: &Config) -> Result<RunSummary, RunError> {
    let sink = TelegramSink::new(&config.telegram, config.http_timeout).map_err(|e| ConfigError::Invalid {
        name: "TELEGRAM_API_BASE",
        reason: e.to_string(),
    })?;
    let source = Source::from_config(config)?;
    let mut store = open_store(&config.state, config.delivery.policy);
    run_with(config, &source, &sink, store.as_mut()).await
}

/// The run pipeline over an explicit source, sink and store.
#[instrument(level = "info", skip_all, fields(source = source.name(), policy = %config.delivery.policy))]
pub async fn run_with<S: MessageSink>(
    config: &Config,
    source: &Source,
    sink: &S,
    store: &mut dyn SeenStore,
) -> Result<RunSummary, RunError> {
    let state = store.load();
    check_policy(store, config.delivery.policy)?;
    info!(location = %store.location(), state = %state.describe(), "Loaded state");

    let raw = source.fetch().await?;
    let fetched = raw.len();
    let items = normalize(raw, source.rules());
    let candidates = items.len();

    let batch = plan(items, &state, &config.delivery);
    if batch.is_empty() {
        info!(state = %state.describe(), "No new items");
    }
    let delivered_items = batch.items.len();
    let timing = CommitTiming::for_grouping(batch.grouping);
    let report = execute(&batch, sink, store, state, timing).await.into_result()?;

    if report.total_count > 0 && report.sent_count == report.total_count {
        source.after_delivery().await.map_err(RunError::Cleanup)?;
    }

    let summary = RunSummary {
        fetched,
        candidates,
        delivered_items,
        sent_units: report.sent_count,
        state: report.state.describe(),
    };
    info!(
        fetched = summary.fetched,
        candidates = summary.candidates,
        delivered = summary.delivered_items,
        messages = summary.sent_units,
        state = %summary.state,
        "Run complete"
    );
    Ok(summary)
}
