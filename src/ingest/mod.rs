// src/ingest/mod.rs
pub mod html;
pub mod providers;
pub mod types;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::ingest::providers::{
    granicus::GranicusAdapter, legistar::LegistarAdapter, mndot::MndotAdapter,
    ramsey_county::RamseyCountyAdapter, socrata_permits::SocrataPermitsAdapter,
};
use crate::ingest::types::{RawRecord, SourceAdapter};
use crate::item::SourceKind;

pub const USER_AGENT: &str =
    "Mozilla/5.0 (compatible; NeighborhoodMonitor/0.1; +https://github.com/neighborhood-monitor)";

/// One-time metrics registration (so series show up in the exposition).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_records_total", "Raw records fetched from adapters.");
        describe_counter!(
            "monitor_malformed_total",
            "Raw records dropped because required fields were missing."
        );
        describe_counter!(
            "monitor_adapter_errors_total",
            "Adapter fetch failures and timeouts."
        );
        describe_counter!(
            "monitor_out_of_scope_total",
            "Normalized items rejected by the geo filter."
        );
        describe_counter!("monitor_flagged_total", "Canonical items flagged by keywords.");
        describe_counter!("monitor_new_items_total", "Canonical items first seen this run.");
        describe_gauge!("monitor_canonical_items", "Size of the canonical item set.");
        describe_gauge!("monitor_last_run_ts", "Unix ts when the pipeline last ran.");
        describe_histogram!("monitor_fetch_ms", "Adapter fetch time in milliseconds.");
    });
}

/// Normalize text: decode entities, strip tags, fold quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. nbsp)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap: 2000 chars
    if out.chars().count() > 2000 {
        out = out.chars().take(2000).collect();
    }

    out
}

/// Shared HTTP client for adapters.
pub fn http_client(timeout: std::time::Duration) -> anyhow::Result<reqwest::Client> {
    use anyhow::Context;
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("building http client")
}

/// GET a page body, failing on non-2xx.
pub(crate) async fn fetch_text(client: &reqwest::Client, url: &str) -> anyhow::Result<String> {
    use anyhow::Context;
    client
        .get(url)
        .send()
        .await
        .context("http get()")?
        .error_for_status()
        .context("http status")?
        .text()
        .await
        .context("http .text()")
}

/// Fetch every configured page of a multi-page source. A page that fails is
/// logged and left out; the call only fails when no page could be read.
pub(crate) async fn fetch_pages(
    client: &reqwest::Client,
    source: SourceKind,
    urls: &[Option<&str>],
) -> anyhow::Result<Vec<Option<String>>> {
    let mut pages = Vec::with_capacity(urls.len());
    let mut last_err = None;
    for url in urls.iter().copied() {
        let Some(url) = url.filter(|u| !u.trim().is_empty()) else {
            pages.push(None);
            continue;
        };
        match fetch_text(client, url).await {
            Ok(body) => pages.push(Some(body)),
            Err(e) => {
                tracing::warn!(target: "ingest", %source, url = %url, error = %format!("{e:#}"), "page fetch failed; skipping");
                pages.push(None);
                last_err = Some(e.context(format!("fetching {url}")));
            }
        }
    }
    match last_err {
        Some(e) if pages.iter().all(Option::is_none) => Err(e),
        _ => Ok(pages),
    }
}

/// Everything the adapters produced this run.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<RawRecord>,
    pub per_source: BTreeMap<SourceKind, usize>,
    pub failed: Vec<SourceKind>,
    /// One [`Error::Adapter`] per failed adapter, in adapter order.
    pub errors: Vec<Error>,
}

/// Run every adapter concurrently, each bounded by its own timeout.
/// A failed, timed-out or panicked adapter contributes zero records.
/// Records come back grouped in adapter order, whatever the finish order.
pub async fn fetch_all(adapters: &[Arc<dyn SourceAdapter>]) -> FetchOutcome {
    ensure_metrics_described();

    let mut set = JoinSet::new();
    for (idx, adapter) in adapters.iter().enumerate() {
        let adapter = Arc::clone(adapter);
        set.spawn(async move {
            let t0 = std::time::Instant::now();
            let res = tokio::time::timeout(adapter.timeout(), adapter.fetch()).await;
            (idx, res, t0.elapsed())
        });
    }

    let mut results: Vec<Option<std::result::Result<Vec<RawRecord>, Error>>> =
        (0..adapters.len()).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (idx, res, elapsed) = match joined {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, "adapter task aborted");
                continue;
            }
        };
        let source = adapters[idx].source();
        histogram!("monitor_fetch_ms", "source" => source.as_str())
            .record(elapsed.as_secs_f64() * 1_000.0);
        results[idx] = Some(match res {
            Ok(Ok(mut records)) => {
                let before = records.len();
                records.retain(|r| r.shape.source() == source);
                if records.len() < before {
                    tracing::warn!(
                        target: "ingest",
                        %source,
                        dropped = before - records.len(),
                        "records of another source's shape dropped"
                    );
                }
                tracing::info!(target: "ingest", %source, records = records.len(), "adapter done");
                counter!("monitor_records_total", "source" => source.as_str())
                    .increment(records.len() as u64);
                Ok(records)
            }
            Ok(Err(e)) => Err(Error::Adapter {
                adapter: source,
                message: format!("{e:#}"),
            }),
            Err(_) => Err(Error::Adapter {
                adapter: source,
                message: format!(
                    "timed out after {} ms",
                    adapters[idx].timeout().as_millis()
                ),
            }),
        });
    }

    let mut out = FetchOutcome::default();
    for (idx, slot) in results.into_iter().enumerate() {
        let source = adapters[idx].source();
        let records = slot.unwrap_or_else(|| {
            Err(Error::Adapter {
                adapter: source,
                message: "adapter task aborted".to_string(),
            })
        });
        match records {
            Ok(records) => {
                *out.per_source.entry(source).or_default() += records.len();
                out.records.extend(records);
            }
            Err(err) => {
                tracing::warn!(target: "ingest", %source, error = %err, "source empty this run");
                counter!("monitor_adapter_errors_total", "source" => source.as_str()).increment(1);
                out.per_source.entry(source).or_default();
                if !out.failed.contains(&source) {
                    out.failed.push(source);
                }
                out.errors.push(err);
            }
        }
    }
    out
}

/// Build live adapters for every enabled source, or only for `only`.
pub fn build_adapters(
    cfg: &MonitorConfig,
    only: Option<SourceKind>,
) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let enabled = cfg.sources.enabled();
    let selected: Vec<SourceKind> = match only {
        Some(kind) if enabled.contains(&kind) => vec![kind],
        Some(kind) => {
            return Err(Error::config(format!(
                "source '{kind}' is not configured or not enabled"
            )))
        }
        None => enabled,
    };

    let mut out: Vec<Arc<dyn SourceAdapter>> = Vec::with_capacity(selected.len());
    for kind in selected {
        let adapter: Arc<dyn SourceAdapter> = match kind {
            SourceKind::StpaulPermits => {
                let pc = cfg
                    .sources
                    .stpaul_permits
                    .as_ref()
                    .ok_or_else(|| Error::config("sources.stpaul_permits missing"))?;
                Arc::new(
                    SocrataPermitsAdapter::from_config(pc, &cfg.zip_codes)
                        .map_err(|e| Error::config(format!("{e:#}")))?,
                )
            }
            SourceKind::Granicus => {
                let gc = cfg
                    .sources
                    .granicus
                    .as_ref()
                    .ok_or_else(|| Error::config("sources.granicus missing"))?;
                Arc::new(
                    GranicusAdapter::from_config(gc)
                        .map_err(|e| Error::config(format!("{e:#}")))?,
                )
            }
            SourceKind::Legistar => {
                let lc = cfg
                    .sources
                    .legistar
                    .as_ref()
                    .ok_or_else(|| Error::config("sources.legistar missing"))?;
                Arc::new(
                    LegistarAdapter::from_config(lc)
                        .map_err(|e| Error::config(format!("{e:#}")))?,
                )
            }
            SourceKind::RamseyCounty => {
                let rc = cfg
                    .sources
                    .ramsey_county
                    .as_ref()
                    .ok_or_else(|| Error::config("sources.ramsey_county missing"))?;
                Arc::new(
                    RamseyCountyAdapter::from_config(rc)
                        .map_err(|e| Error::config(format!("{e:#}")))?,
                )
            }
            SourceKind::Mndot => {
                let mc = cfg
                    .sources
                    .mndot
                    .as_ref()
                    .ok_or_else(|| Error::config("sources.mndot missing"))?;
                Arc::new(
                    MndotAdapter::from_config(mc).map_err(|e| Error::config(format!("{e:#}")))?,
                )
            }
        };
        out.push(adapter);
    }
    Ok(out)
}
