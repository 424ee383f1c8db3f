// src/ingest/html.rs
//! Just enough HTML table/link handling for the agenda pages we scrape.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").unwrap());
static RE_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<t([hd])\b[^>]*>(.*?)</t[hd]>").unwrap());
static RE_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#).unwrap());
static RE_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<table\b([^>]*)>(.*?)</table>").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap()
});
static RE_LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(?:li|tr)\b[^>]*>(.*?)</(?:li|tr)>").unwrap());
static RE_ARTICLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<article\b[^>]*>(.*?)</article>").unwrap());
static RE_CARD_DIV: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<div\b[^>]*\bclass\s*=\s*["'][^"']*(?:project|card|feature|item)[^"']*["'][^>]*>"#)
        .unwrap()
});
static RE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h([2-6])\b[^>]*>(.*?)</h[2-6]>").unwrap());
static RE_STRONG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<strong\b[^>]*>(.*?)</strong>").unwrap());
static RE_PARAGRAPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>").unwrap());

/// A table cell: header flag + inner HTML.
#[derive(Debug, Clone)]
pub struct Cell<'a> {
    pub header: bool,
    pub html: &'a str,
}

impl Cell<'_> {
    pub fn text(&self) -> String {
        super::normalize_text(self.html)
    }

    pub fn href(&self) -> Option<String> {
        hrefs(self.html).into_iter().next()
    }
}

/// `(attributes, inner HTML)` of every table.
pub fn tables(html: &str) -> Vec<(&str, &str)> {
    RE_TABLE
        .captures_iter(html)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect()
}

/// Inner HTML of every `<tr>`.
pub fn rows(html: &str) -> Vec<&str> {
    RE_ROW
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

pub fn cells(row: &str) -> Vec<Cell<'_>> {
    RE_CELL
        .captures_iter(row)
        .filter_map(|c| {
            Some(Cell {
                header: c.get(1)?.as_str().eq_ignore_ascii_case("h"),
                html: c.get(2)?.as_str(),
            })
        })
        .collect()
}

/// Every `href` in document order, entities decoded.
pub fn hrefs(fragment: &str) -> Vec<String> {
    RE_HREF
        .captures_iter(fragment)
        .filter_map(|c| c.get(1))
        .map(|m| html_escape::decode_html_entities(m.as_str().trim()).to_string())
        .collect()
}

/// An anchor with its target and visible text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub text: String,
}

/// Every anchor with an `href`, in document order.
pub fn links(fragment: &str) -> Vec<Link> {
    RE_LINK
        .captures_iter(fragment)
        .filter_map(|c| {
            Some(Link {
                href: html_escape::decode_html_entities(c.get(1)?.as_str().trim()).to_string(),
                text: super::normalize_text(c.get(2)?.as_str()),
            })
        })
        .collect()
}

/// Inner HTML of every `<li>` and `<tr>`, in document order.
pub fn list_items(html: &str) -> Vec<&str> {
    RE_LIST_ITEM
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Content blocks of a project listing: `<article>` elements, or failing that
/// the stretch after each project/card `<div>` up to the next one.
pub fn blocks(html: &str) -> Vec<&str> {
    let articles: Vec<&str> = RE_ARTICLE
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if !articles.is_empty() {
        return articles;
    }
    let starts: Vec<(usize, usize)> = RE_CARD_DIV
        .find_iter(html)
        .map(|m| (m.start(), m.end()))
        .collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, (_, body_start))| {
            let end = starts.get(i + 1).map(|(s, _)| *s).unwrap_or(html.len());
            &html[*body_start..end]
        })
        .collect()
}

/// Text of the first `<h2>`..`<h6>`, else of the first `<strong>`.
pub fn heading(fragment: &str) -> Option<String> {
    RE_HEADING
        .captures(fragment)
        .and_then(|c| c.get(2))
        .or_else(|| RE_STRONG.captures(fragment).and_then(|c| c.get(1)))
        .map(|m| super::normalize_text(m.as_str()))
        .filter(|t| !t.is_empty())
}

/// Text of the first `<p>`.
pub fn first_paragraph(fragment: &str) -> Option<String> {
    RE_PARAGRAPH
        .captures(fragment)
        .and_then(|c| c.get(1))
        .map(|m| super::normalize_text(m.as_str()))
        .filter(|t| !t.is_empty())
}

/// Resolve a link found on `base` into an absolute URL. Protocol-relative
/// links get `https:`. Unresolvable links are returned unchanged.
pub fn absolute_url(href: &str, base: &str) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{rest}");
    }
    reqwest::Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}
