// src/ingest/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::item::SourceKind;

/// Which upstream layout a raw record was read from. One normalizer exists
/// per shape; several shapes can belong to the same source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordShape {
    SocrataPermit,
    GranicusRss,
    GranicusListing,
    LegistarRow,
    RamseyBoard,
    RamseyRoad,
    MndotProject,
    MetroTransitProject,
}

impl RecordShape {
    pub fn source(self) -> SourceKind {
        match self {
            RecordShape::SocrataPermit => SourceKind::StpaulPermits,
            RecordShape::GranicusRss | RecordShape::GranicusListing => SourceKind::Granicus,
            RecordShape::LegistarRow => SourceKind::Legistar,
            RecordShape::RamseyBoard | RecordShape::RamseyRoad => SourceKind::RamseyCounty,
            RecordShape::MndotProject | RecordShape::MetroTransitProject => SourceKind::Mndot,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordShape::SocrataPermit => "socrata_permit",
            RecordShape::GranicusRss => "granicus_rss",
            RecordShape::GranicusListing => "granicus_listing",
            RecordShape::LegistarRow => "legistar_row",
            RecordShape::RamseyBoard => "ramsey_board",
            RecordShape::RamseyRoad => "ramsey_road",
            RecordShape::MndotProject => "mndot_project",
            RecordShape::MetroTransitProject => "metro_transit_project",
        }
    }
}

/// A record exactly as the upstream described it: a shape tag plus loose
/// key/value fields. Only the shape's normalizer interprets the fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub shape: RecordShape,
    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(shape: RecordShape) -> Self {
        Self {
            shape,
            fields: Map::new(),
        }
    }

    pub fn from_fields(shape: RecordShape, fields: Map<String, Value>) -> Self {
        Self { shape, fields }
    }

    /// Builder-style string field setter.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields
            .insert(key.to_string(), Value::String(value.into()));
        self
    }

    /// Trimmed, non-empty text of a field. Numbers and booleans are
    /// rendered as text; null, arrays and objects count as absent.
    pub fn text(&self, key: &str) -> Option<String> {
        let s = match self.fields.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!s.is_empty()).then_some(s)
    }

    /// First non-empty field among `keys`.
    pub fn first_text<S: AsRef<str>>(&self, keys: &[S]) -> Option<String> {
        keys.iter().find_map(|k| self.text(k.as_ref()))
    }
}

/// One upstream system.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawRecord>>;
    fn source(&self) -> SourceKind;
    /// Upper bound for one `fetch` call.
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_skips_blank_and_structured_values() {
        let fields = json!({
            "a": "  x ",
            "b": "   ",
            "c": 42,
            "d": null,
            "e": ["x"],
        });
        let Value::Object(map) = fields else {
            unreachable!()
        };
        let r = RawRecord::from_fields(RecordShape::SocrataPermit, map);
        assert_eq!(r.text("a").as_deref(), Some("x"));
        assert_eq!(r.text("b"), None);
        assert_eq!(r.text("c").as_deref(), Some("42"));
        assert_eq!(r.text("d"), None);
        assert_eq!(r.text("e"), None);
        assert_eq!(r.first_text(&["missing", "b", "c"]).as_deref(), Some("42"));
    }

    #[test]
    fn shapes_map_to_sources() {
        assert_eq!(RecordShape::GranicusListing.source(), SourceKind::Granicus);
        assert_eq!(RecordShape::GranicusRss.source(), SourceKind::Granicus);
        assert_eq!(RecordShape::SocrataPermit.source(), SourceKind::StpaulPermits);
        assert_eq!(RecordShape::RamseyRoad.source(), SourceKind::RamseyCounty);
        assert_eq!(RecordShape::MetroTransitProject.source(), SourceKind::Mndot);
    }
}
