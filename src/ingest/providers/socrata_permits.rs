// src/ingest/providers/socrata_permits.rs
//! Saint Paul DSI building permits from the Socrata open-data API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::config::PermitsConfig;
use crate::ingest::types::{RawRecord, RecordShape, SourceAdapter};
use crate::item::SourceKind;

pub struct SocrataPermitsAdapter {
    cfg: PermitsConfig,
    zip_codes: Vec<String>,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client },
}

impl SocrataPermitsAdapter {
    pub fn from_config(cfg: &PermitsConfig, zip_codes: &[String]) -> Result<Self> {
        let client = crate::ingest::http_client(Duration::from_secs(cfg.common.timeout_secs))?;
        Ok(Self {
            cfg: cfg.clone(),
            zip_codes: zip_codes.to_vec(),
            mode: Mode::Http { client },
        })
    }

    /// Serve a captured API response instead of calling the API.
    pub fn from_fixture(cfg: &PermitsConfig, json: &str) -> Self {
        Self {
            cfg: cfg.clone(),
            zip_codes: Vec::new(),
            mode: Mode::Fixture(json.to_string()),
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}.json",
            self.cfg.base_url.trim_end_matches('/'),
            self.cfg.dataset_id
        )
    }

    /// SoQL query: target ZIPs only, newest first, bounded.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(3);
        if !self.zip_codes.is_empty() {
            let zip_list = self
                .zip_codes
                .iter()
                .map(|z| format!("'{}'", z.replace('\'', "")))
                .collect::<Vec<_>>()
                .join(", ");
            params.push((
                "$where".to_string(),
                format!("{} in ({})", self.cfg.zip_field, zip_list),
            ));
        }
        params.push(("$order".to_string(), format!("{} DESC", self.cfg.date_field)));
        params.push(("$limit".to_string(), self.cfg.limit.to_string()));
        params
    }

    fn parse_records(body: &str) -> Result<Vec<RawRecord>> {
        let rows: Vec<Value> = serde_json::from_str(body).context("parsing socrata permits json")?;
        let out = rows
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .map(|map: Map<String, Value>| RawRecord::from_fields(RecordShape::SocrataPermit, map))
            .collect();
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for SocrataPermitsAdapter {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_records(s),
            Mode::Http { client } => {
                let url = self.endpoint();
                let body = client
                    .get(&url)
                    .query(&self.query_params())
                    .send()
                    .await
                    .context("socrata http get()")?
                    .error_for_status()
                    .context("socrata http status")?
                    .text()
                    .await
                    .context("socrata http .text()")?;
                Self::parse_records(&body)
            }
        }
    }

    fn source(&self) -> SourceKind {
        SourceKind::StpaulPermits
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.cfg.common.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PermitsConfig {
        PermitsConfig {
            dataset_id: "abcd-1234".into(),
            ..PermitsConfig::default()
        }
    }

    #[test]
    fn query_filters_zip_and_orders_by_date() {
        let a = SocrataPermitsAdapter {
            cfg: cfg(),
            zip_codes: vec!["55102".into(), "55104".into()],
            mode: Mode::Fixture(String::new()),
        };
        let params = a.query_params();
        assert_eq!(params[0].0, "$where");
        assert_eq!(params[0].1, "zip in ('55102', '55104')");
        assert_eq!(params[1].1, "issued_date DESC");
        assert_eq!(params[2].1, "500");
        assert_eq!(
            a.endpoint(),
            "https://information.stpaul.gov/resource/abcd-1234.json"
        );
    }

    #[tokio::test]
    async fn fixture_yields_one_record_per_object() {
        let a = SocrataPermitsAdapter::from_fixture(
            &cfg(),
            r#"[{"permit_number": "1", "address": "1 Main"}, 5, {"permit_number": "2"}]"#,
        );
        let out = a.fetch().await.unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.shape == RecordShape::SocrataPermit));
    }

    #[tokio::test]
    async fn non_array_body_is_an_error() {
        let a = SocrataPermitsAdapter::from_fixture(&cfg(), r#"{"error": "bad query"}"#);
        assert!(a.fetch().await.is_err());
    }
}
