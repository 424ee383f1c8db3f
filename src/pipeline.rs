// src/pipeline.rs
//! One monitor run: fetch -> normalize -> geo filter -> flag -> merge ->
//! render -> persist.

use chrono::NaiveDate;
use metrics::{counter, gauge};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::flag::apply_flags;
use crate::geo::GeoMatcher;
use crate::ingest::{ensure_metrics_described, fetch_all, types::SourceAdapter};
use crate::item::{Item, SourceKind};
use crate::merge::{age_cutoff, carry_forward, merge};
use crate::normalize::normalize_all;
use crate::report::{ReportInput, ReportRenderer};
use crate::state::StateStore;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub run_date: NaiveDate,
    /// Compute everything, write nothing.
    pub dry_run: bool,
    /// Keep out-of-scope items. Never persists state.
    pub no_filter: bool,
}

impl RunOptions {
    pub fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            dry_run: false,
            no_filter: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub fetched: usize,
    pub normalized: usize,
    pub malformed: usize,
    pub in_scope: usize,
    pub out_of_scope: usize,
    pub canonical: Vec<Item>,
    pub new_count: usize,
    pub flagged_count: usize,
    pub per_source: BTreeMap<SourceKind, usize>,
    pub failed: Vec<SourceKind>,
    /// One line per failed adapter, e.g. `adapter legistar failed: ...`.
    pub adapter_errors: Vec<String>,
    /// Persisted entries kept for enabled sources that did not run.
    pub carried: usize,
    pub rendered: bool,
    pub state_written: bool,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run summary:")?;
        writeln!(f, "  Fetched:     {}", self.fetched)?;
        writeln!(f, "  Normalized:  {} ({} malformed)", self.normalized, self.malformed)?;
        writeln!(f, "  In scope:    {}", self.in_scope)?;
        writeln!(f, "  Canonical:   {}", self.canonical.len())?;
        writeln!(f, "  New:         {}", self.new_count)?;
        write!(f, "  Flagged:     {}", self.flagged_count)?;
        if !self.failed.is_empty() {
            let names: Vec<&str> = self.failed.iter().map(|s| s.as_str()).collect();
            write!(f, "\n  Failed:      {}", names.join(", "))?;
            for e in &self.adapter_errors {
                write!(f, "\n    {e}")?;
            }
        }
        Ok(())
    }
}

/// Execute one run.
///
/// State is only written after the report rendered, and never for dry runs
/// or unfiltered runs. A render failure is returned as [`crate::Error::Render`];
/// with `state.commit_on_render_error` the state is saved first.
pub async fn run(
    config: &MonitorConfig,
    adapters: &[Arc<dyn SourceAdapter>],
    store: &dyn StateStore,
    renderer: &dyn ReportRenderer,
    opts: &RunOptions,
) -> Result<RunOutcome> {
    ensure_metrics_described();
    let run_date = opts.run_date;
    tracing::info!(
        target: "pipeline",
        %run_date,
        adapters = adapters.len(),
        dry_run = opts.dry_run,
        no_filter = opts.no_filter,
        "run started"
    );

    let persisted = store.load();

    let fetched = fetch_all(adapters).await;
    let mut outcome = RunOutcome {
        fetched: fetched.records.len(),
        per_source: fetched.per_source,
        failed: fetched.failed,
        adapter_errors: fetched.errors.iter().map(ToString::to_string).collect(),
        ..RunOutcome::default()
    };

    let (items, malformed) = normalize_all(&fetched.records, &config.sources);
    outcome.normalized = items.len();
    outcome.malformed = malformed;

    let scoped = filter_scope(items, config, opts.no_filter, &mut outcome);

    let flagged: Vec<Item> = scoped
        .into_iter()
        .map(|it| apply_flags(it, &config.flag_keywords))
        .collect();

    let (canonical, mut next_state) =
        merge(flagged, &persisted, config.max_item_age_days, run_date);
    let not_run: Vec<SourceKind> = config
        .sources
        .enabled()
        .into_iter()
        .filter(|k| !adapters.iter().any(|a| a.source() == *k))
        .collect();
    if !not_run.is_empty() {
        let cutoff = age_cutoff(run_date, config.max_item_age_days);
        outcome.carried = carry_forward(&mut next_state, &persisted, &not_run, cutoff);
        tracing::info!(
            target: "pipeline",
            sources = ?not_run,
            carried = outcome.carried,
            "state carried for sources not run"
        );
    }
    outcome.new_count = canonical.iter().filter(|i| i.is_new).count();
    outcome.flagged_count = canonical.iter().filter(|i| i.flagged).count();
    outcome.canonical = canonical;

    counter!("monitor_flagged_total").increment(outcome.flagged_count as u64);
    counter!("monitor_new_items_total").increment(outcome.new_count as u64);
    gauge!("monitor_canonical_items").set(outcome.canonical.len() as f64);
    gauge!("monitor_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

    if opts.dry_run {
        tracing::info!(target: "pipeline", "dry run; report and state not written");
        return Ok(outcome);
    }

    let input = ReportInput {
        items: &outcome.canonical,
        run_date,
        per_source: &outcome.per_source,
        failed: &outcome.failed,
        new_count: outcome.new_count,
        flagged_count: outcome.flagged_count,
    };
    let render_result = renderer.render(&input);
    outcome.rendered = render_result.is_ok();

    let commit = if opts.no_filter {
        tracing::info!(target: "pipeline", "unfiltered run; state not written");
        false
    } else {
        match &render_result {
            Ok(()) => true,
            Err(e) if config.state.commit_on_render_error => {
                tracing::warn!(target: "pipeline", error = %e, "report failed; committing state anyway");
                true
            }
            Err(e) => {
                tracing::error!(target: "pipeline", error = %e, "report failed; state left untouched");
                false
            }
        }
    };
    if commit {
        store.save(&next_state)?;
        outcome.state_written = true;
    }
    render_result?;

    tracing::info!(
        target: "pipeline",
        canonical = outcome.canonical.len(),
        new = outcome.new_count,
        flagged = outcome.flagged_count,
        failed = outcome.failed.len(),
        "run finished"
    );
    Ok(outcome)
}

/// Mark items in scope and drop the rest (unless `keep_all`).
fn filter_scope(
    items: Vec<Item>,
    config: &MonitorConfig,
    keep_all: bool,
    outcome: &mut RunOutcome,
) -> Vec<Item> {
    let matcher = GeoMatcher::new(&config.geo());
    let mut out = Vec::with_capacity(items.len());
    for mut item in items {
        item.in_scope = config.sources.passes_through(item.source, item.category)
            || matcher.is_in_scope(&item);
        if item.in_scope {
            outcome.in_scope += 1;
        } else {
            outcome.out_of_scope += 1;
            counter!("monitor_out_of_scope_total", "source" => item.source.as_str()).increment(1);
            tracing::debug!(target: "pipeline", id = %item.id, "out of scope");
            if !keep_all {
                continue;
            }
        }
        out.push(item);
    }
    tracing::info!(
        target: "pipeline",
        in_scope = outcome.in_scope,
        out_of_scope = outcome.out_of_scope,
        "geo filter applied"
    );
    out
}
