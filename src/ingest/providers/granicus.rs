// src/ingest/providers/granicus.rs
//! Planning Commission meetings on Granicus: the agenda RSS feed, plus the
//! listing page for upcoming meetings whose agenda is not in the feed yet.

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use crate::config::GranicusConfig;
use crate::ingest::html;
use crate::ingest::normalize_text;
use crate::ingest::types::{RawRecord, RecordShape, SourceAdapter};
use crate::item::SourceKind;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

static RE_CLIP_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"clip_id=(\d+)").unwrap());

/// The `clip_id` query parameter Granicus uses to identify a meeting.
pub fn clip_id_from_url(url: &str) -> Option<String> {
    RE_CLIP_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub struct GranicusAdapter {
    rss_url: String,
    listing_url: Option<String>,
    timeout: Duration,
    mode: Mode,
}

enum Mode {
    Fixture {
        rss: String,
        listing: Option<String>,
    },
    Http {
        client: reqwest::Client,
    },
}

impl GranicusAdapter {
    pub fn from_config(cfg: &GranicusConfig) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.common.timeout_secs);
        Ok(Self {
            rss_url: cfg.rss_url.clone(),
            listing_url: cfg.listing_url.clone(),
            timeout,
            mode: Mode::Http {
                client: crate::ingest::http_client(timeout)?,
            },
        })
    }

    /// Serve captured feed / listing content. `listing_url` is only used to
    /// resolve relative links.
    pub fn from_fixture(rss: &str, listing: Option<&str>, listing_url: &str) -> Self {
        Self {
            rss_url: String::new(),
            listing_url: Some(listing_url.to_string()),
            timeout: Duration::from_secs(30),
            mode: Mode::Fixture {
                rss: rss.to_string(),
                listing: listing.map(str::to_string),
            },
        }
    }

    fn parse_rss(xml: &str) -> Result<Vec<RawRecord>> {
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean).context("parsing granicus rss xml")?;
        let out = rss
            .channel
            .item
            .into_iter()
            .map(|it| {
                let mut r = RawRecord::new(RecordShape::GranicusRss);
                if let Some(t) = it.title {
                    r = r.with("title", t);
                }
                if let Some(l) = it.link {
                    r = r.with("link", l);
                }
                if let Some(p) = it.pub_date {
                    r = r.with("pub_date", p);
                }
                r
            })
            .collect();
        Ok(out)
    }

    /// Rows with an agenda link whose meeting is not already in `seen`.
    fn parse_listing(page: &str, base_url: &str, seen: &HashSet<String>) -> Vec<RawRecord> {
        let mut out = Vec::new();
        let mut taken: HashSet<String> = HashSet::new();
        for row in html::rows(page) {
            let Some(href) = html::hrefs(row)
                .into_iter()
                .find(|h| h.contains("AgendaViewer") || h.contains("clip_id"))
            else {
                continue;
            };
            let agenda_url = html::absolute_url(&href, base_url);
            let key = clip_id_from_url(&agenda_url).unwrap_or_else(|| agenda_url.clone());
            if seen.contains(&key) || !taken.insert(key) {
                continue;
            }
            let row_text: String = normalize_text(row).chars().take(200).collect();
            out.push(
                RawRecord::new(RecordShape::GranicusListing)
                    .with("agenda_url", agenda_url)
                    .with("row_text", row_text),
            );
        }
        out
    }

    fn combine(rss_records: Vec<RawRecord>, listing: Option<(&str, &str)>) -> Vec<RawRecord> {
        let seen: HashSet<String> = rss_records
            .iter()
            .filter_map(|r| r.text("link"))
            .filter_map(|l| clip_id_from_url(&l))
            .collect();
        let rss_count = rss_records.len();
        let mut out = rss_records;
        if let Some((page, base)) = listing {
            out.extend(Self::parse_listing(page, base, &seen));
        }
        tracing::debug!(
            target: "ingest",
            rss = rss_count,
            listing = out.len() - rss_count,
            "granicus records"
        );
        out
    }
}

#[async_trait]
impl SourceAdapter for GranicusAdapter {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        match &self.mode {
            Mode::Fixture { rss, listing } => {
                let recs = Self::parse_rss(rss)?;
                let base = self.listing_url.as_deref().unwrap_or_default();
                Ok(Self::combine(
                    recs,
                    listing.as_deref().map(|page| (page, base)),
                ))
            }
            Mode::Http { client } => {
                let body = client
                    .get(&self.rss_url)
                    .send()
                    .await
                    .context("granicus rss get()")?
                    .error_for_status()
                    .context("granicus rss status")?
                    .text()
                    .await
                    .context("granicus rss .text()")?;
                let recs = Self::parse_rss(&body)?;

                // The listing page only adds upcoming meetings; losing it is not fatal.
                let mut page = None;
                if let Some(url) = self.listing_url.as_deref() {
                    match crate::ingest::fetch_text(client, url).await {
                        Ok(text) => page = Some(text),
                        Err(e) => {
                            tracing::warn!(target: "ingest", error = ?e, "granicus listing page error")
                        }
                    }
                }
                let base = self.listing_url.as_deref().unwrap_or_default();
                Ok(Self::combine(
                    recs,
                    page.as_deref().map(|p| (p, base)),
                ))
            }
        }
    }

    fn source(&self) -> SourceKind {
        SourceKind::Granicus
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Agendas</title>
<item><title>Planning Commission Meeting - Feb 20, 2026</title>
<link>https://stpaul.granicus.com/AgendaViewer.php?view_id=56&amp;clip_id=901</link>
<pubDate>Fri, 06 Feb 2026 06:30:00 -0800</pubDate></item>
</channel></rss>"#;

    const LISTING: &str = r#"<table>
<tr class="listingRow"><td>Planning Commission</td><td>Feb 20, 2026</td>
<td><a href="//stpaul.granicus.com/AgendaViewer.php?view_id=56&clip_id=901">Agenda</a></td></tr>
<tr class="listingRow"><td>Planning Commission</td><td>Mar 06, 2026</td>
<td><a href="AgendaViewer.php?view_id=56&clip_id=915">Agenda</a></td></tr>
<tr><td>No agenda here</td></tr>
</table>"#;

    #[test]
    fn clip_id_extraction() {
        assert_eq!(
            clip_id_from_url("https://x/AgendaViewer.php?view_id=56&clip_id=901").as_deref(),
            Some("901")
        );
        assert_eq!(clip_id_from_url("https://x/AgendaViewer.php"), None);
    }

    #[tokio::test]
    async fn listing_skips_meetings_already_in_feed() {
        let a = GranicusAdapter::from_fixture(
            RSS,
            Some(LISTING),
            "https://stpaul.granicus.com/ViewPublisher.php?view_id=56",
        );
        let out = a.fetch().await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].shape, RecordShape::GranicusRss);
        assert_eq!(out[1].shape, RecordShape::GranicusListing);
        assert_eq!(
            out[1].text("agenda_url").as_deref(),
            Some("https://stpaul.granicus.com/AgendaViewer.php?view_id=56&clip_id=915")
        );
        assert!(out[1].text("row_text").unwrap().contains("Mar 06, 2026"));
    }

    #[tokio::test]
    async fn broken_feed_is_an_error() {
        let a = GranicusAdapter::from_fixture("<rss><channel>", None, "https://x/");
        assert!(a.fetch().await.is_err());
    }
}
