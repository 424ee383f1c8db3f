// src/report.rs
//! Static HTML dashboard for the canonical item set.

use chrono::NaiveDate;
use html_escape::{encode_double_quoted_attribute, encode_text};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::config::{ReportConfig, SourcesConfig};
use crate::error::{Error, Result};
use crate::item::{Category, Item, SourceKind};
use crate::state::write_atomic;

/// What a renderer gets: ordered canonical items plus run metadata.
#[derive(Debug, Clone)]
pub struct ReportInput<'a> {
    pub items: &'a [Item],
    pub run_date: NaiveDate,
    /// Raw records fetched per source; failed sources report 0.
    pub per_source: &'a BTreeMap<SourceKind, usize>,
    pub failed: &'a [SourceKind],
    pub new_count: usize,
    pub flagged_count: usize,
}

pub trait ReportRenderer: Send + Sync {
    fn render(&self, input: &ReportInput<'_>) -> Result<()>;
}

/// Writes a single self-contained HTML page.
pub struct HtmlReport {
    output: PathBuf,
    title: String,
    subtitle: Option<String>,
    labels: BTreeMap<SourceKind, String>,
}

impl HtmlReport {
    pub fn new(report: &ReportConfig, sources: &SourcesConfig) -> Self {
        let labels = SourceKind::ALL
            .into_iter()
            .map(|k| (k, sources.label(k)))
            .collect();
        Self {
            output: report.output.clone(),
            title: report.title.clone(),
            subtitle: report.subtitle.clone(),
            labels,
        }
    }

    pub fn output(&self) -> &std::path::Path {
        &self.output
    }

    fn label(&self, kind: SourceKind) -> &str {
        self.labels
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_label())
    }

    /// Full page markup.
    pub fn to_html(&self, input: &ReportInput<'_>) -> String {
        let mut html = String::with_capacity(4096 + input.items.len() * 512);
        let title = encode_text(&self.title);

        let _ = write!(
            html,
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
             <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<header>\n<h1>{title}</h1>\n"
        );
        if let Some(sub) = self.subtitle.as_deref() {
            let _ = writeln!(html, "<p class=\"subtitle\">{}</p>", encode_text(sub));
        }
        let _ = writeln!(
            html,
            "<p class=\"updated\">Updated {}</p>\n</header>",
            input.run_date.format("%B %-d, %Y")
        );

        self.write_stats(&mut html, input);
        self.write_sources(&mut html, input);

        let (flagged, rest): (Vec<&Item>, Vec<&Item>) =
            input.items.iter().partition(|i| i.flagged);
        if !flagged.is_empty() {
            self.write_section(&mut html, "attention", "Needs attention", &flagged);
        }
        self.write_section(&mut html, "items", "All other items", &rest);

        html.push_str("</body>\n</html>\n");
        html
    }

    fn write_stats(&self, html: &mut String, input: &ReportInput<'_>) {
        let mut by_category: BTreeMap<Category, usize> = BTreeMap::new();
        for item in input.items {
            *by_category.entry(item.category).or_default() += 1;
        }
        let _ = write!(
            html,
            "<section class=\"stats\">\n<p><strong>{}</strong> items, <strong>{}</strong> new, <strong>{}</strong> flagged</p>\n<ul>",
            input.items.len(),
            input.new_count,
            input.flagged_count
        );
        for (category, n) in &by_category {
            let _ = write!(html, "<li>{}: {n}</li>", category.as_str());
        }
        html.push_str("</ul>\n</section>\n");
    }

    fn write_sources(&self, html: &mut String, input: &ReportInput<'_>) {
        html.push_str("<section class=\"sources\">\n<h2>Sources</h2>\n<ul>\n");
        for (kind, n) in input.per_source {
            let label = encode_text(self.label(*kind));
            if input.failed.contains(kind) {
                let _ = writeln!(
                    html,
                    "<li class=\"failed\">{label}: unavailable this run</li>"
                );
            } else {
                let _ = writeln!(html, "<li>{label}: {n} records</li>");
            }
        }
        html.push_str("</ul>\n</section>\n");
    }

    fn write_section(&self, html: &mut String, class: &str, heading: &str, items: &[&Item]) {
        let _ = writeln!(
            html,
            "<section class=\"{class}\">\n<h2>{heading} ({})</h2>",
            items.len()
        );
        if items.is_empty() {
            html.push_str("<p class=\"empty\">Nothing to show.</p>\n");
        }
        for item in items {
            self.write_item(html, item);
        }
        html.push_str("</section>\n");
    }

    fn write_item(&self, html: &mut String, item: &Item) {
        let _ = write!(
            html,
            "<article class=\"item {}\">\n<h3>",
            item.category.as_str()
        );
        if item.url.is_empty() {
            html.push_str(&encode_text(&item.title));
        } else {
            let _ = write!(
                html,
                "<a href=\"{}\">{}</a>",
                encode_double_quoted_attribute(&item.url),
                encode_text(&item.title)
            );
        }
        if item.is_new {
            html.push_str(" <span class=\"badge new\">new</span>");
        }
        html.push_str("</h3>\n");

        let _ = write!(
            html,
            "<p class=\"meta\">{} &middot; {} &middot; {}",
            item.date.format("%Y-%m-%d"),
            encode_text(self.label(item.source)),
            item.category.as_str()
        );
        if !item.location_text.is_empty() {
            let _ = write!(html, " &middot; {}", encode_text(&item.location_text));
        }
        html.push_str("</p>\n");

        if !item.description.is_empty() {
            let _ = writeln!(html, "<p>{}</p>", encode_text(&item.description));
        }
        if !item.matched_keywords.is_empty() {
            let kws: Vec<&str> = item.matched_keywords.iter().map(String::as_str).collect();
            let _ = writeln!(
                html,
                "<p class=\"keywords\">Matched: {}</p>",
                encode_text(&kws.join(", "))
            );
        }
        html.push_str("</article>\n");
    }
}

impl ReportRenderer for HtmlReport {
    fn render(&self, input: &ReportInput<'_>) -> Result<()> {
        let html = self.to_html(input);
        write_atomic(&self.output, html.as_bytes())
            .map_err(|e| Error::Render(format!("writing {}: {e}", self.output.display())))?;
        tracing::info!(
            target: "pipeline",
            path = %self.output.display(),
            items = input.items.len(),
            "report written"
        );
        Ok(())
    }
}

const STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:60rem;margin:0 auto;padding:1rem;color:#222}\
h1{margin-bottom:.2rem}.subtitle,.updated,.meta{color:#666}\
.item{border-bottom:1px solid #ddd;padding:.5rem 0}\
.attention .item{border-left:4px solid #c0392b;padding-left:.75rem}\
.badge.new{background:#2e86de;color:#fff;border-radius:3px;padding:0 .3rem;font-size:.75rem}\
.failed{color:#c0392b}.keywords{font-size:.85rem;color:#a04000}";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;

    fn item(id: &str, title: &str, flagged: bool) -> Item {
        let mut it = Item::new(
            id.to_string(),
            SourceKind::Legistar,
            title.to_string(),
            NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
        );
        it.category = Category::Hearing;
        it.url = "https://example.org/a?x=1&y=2".to_string();
        if flagged {
            it.matched_keywords.insert("rezoning".to_string());
            it.flagged = true;
        }
        it
    }

    fn renderer(dir: &std::path::Path) -> HtmlReport {
        let report = ReportConfig {
            output: dir.join("docs/index.html"),
            ..ReportConfig::default()
        };
        HtmlReport::new(&report, &SourcesConfig::default())
    }

    #[test]
    fn flagged_section_first_and_text_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let items = vec![
            item("a", "Council <b>budget</b>", false),
            item("b", "Rezoning hearing", true),
        ];
        let per_source = BTreeMap::from([(SourceKind::Legistar, 2), (SourceKind::Granicus, 0)]);
        let failed = [SourceKind::Granicus];
        let input = ReportInput {
            items: &items,
            run_date: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
            per_source: &per_source,
            failed: &failed,
            new_count: 0,
            flagged_count: 1,
        };
        let html = renderer(dir.path()).to_html(&input);

        let attention = html.find("Needs attention").unwrap();
        let others = html.find("All other items").unwrap();
        assert!(attention < others);
        assert!(html.find("Rezoning hearing").unwrap() < others);
        assert!(html.contains("Council &lt;b&gt;budget&lt;/b&gt;"));
        assert!(html.contains("href=\"https://example.org/a?x=1&amp;y=2\""));
        assert!(html.contains("class=\"failed\""));
        assert!(html.contains("hearing: 2"));
    }

    #[test]
    fn render_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let r = renderer(dir.path());
        let mut it = item("a", "Meeting", false);
        it.is_new = true;
        let items = vec![it];
        let per_source = BTreeMap::new();
        let input = ReportInput {
            items: &items,
            run_date: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
            per_source: &per_source,
            failed: &[],
            new_count: 1,
            flagged_count: 0,
        };
        r.render(&input).unwrap();
        let written = std::fs::read_to_string(r.output()).unwrap();
        assert!(written.contains("badge new"));
        assert!(!written.contains("Needs attention"));
    }
}
