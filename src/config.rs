// src/config.rs
//! Monitor configuration, loaded from TOML.
//!
//! Everything downstream receives plain immutable values derived from
//! [`MonitorConfig`]; nothing reads configuration from globals.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::geo::GeoConfig;
use crate::item::{Category, SourceKind};

pub const DEFAULT_CONFIG_PATH: &str = "config/monitor.toml";
pub const ENV_CONFIG_PATH: &str = "MONITOR_CONFIG_PATH";

fn default_max_age_days() -> u32 {
    45
}
fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_state_path() -> PathBuf {
    PathBuf::from("state/items.json")
}
fn default_report_output() -> PathBuf {
    PathBuf::from("docs/index.html")
}
fn default_report_title() -> String {
    "Neighborhood Monitor".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub neighborhoods: Vec<GeoTerm>,
    #[serde(default)]
    pub corridors: Vec<GeoTerm>,
    #[serde(default)]
    pub zip_codes: Vec<String>,
    #[serde(default)]
    pub flag_keywords: Vec<String>,
    #[serde(default = "default_max_age_days")]
    pub max_item_age_days: u32,
    #[serde(default)]
    pub geo: GeoOptions,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// How a neighborhood or corridor name is matched against item text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Whole-word match. Default, so short or ambiguous names stay precise.
    #[default]
    Token,
    /// Plain case-insensitive substring match for long, distinctive names.
    Substring,
}

/// A geographic term: either a plain string (token match) or
/// `{ name = "...", match = "substring" }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "TermSpec")]
pub struct GeoTerm {
    pub name: String,
    pub mode: MatchMode,
}

impl GeoTerm {
    pub fn token(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: MatchMode::Token,
        }
    }

    pub fn substring(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: MatchMode::Substring,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TermSpec {
    Plain(String),
    Detailed {
        name: String,
        #[serde(default, rename = "match")]
        mode: MatchMode,
    },
}

impl From<TermSpec> for GeoTerm {
    fn from(spec: TermSpec) -> Self {
        match spec {
            TermSpec::Plain(name) => GeoTerm::token(name.trim()),
            TermSpec::Detailed { name, mode } => GeoTerm {
                name: name.trim().to_string(),
                mode,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeoOptions {
    /// Also match terms against title and description (location text is
    /// always searched).
    #[serde(default = "default_true")]
    pub search_title_and_description: bool,
}

impl Default for GeoOptions {
    fn default() -> Self {
        Self {
            search_title_and_description: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
    /// Write the new state even when the report fails to render.
    #[serde(default)]
    pub commit_on_render_error: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
            commit_on_render_error: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_output")]
    pub output: PathBuf,
    #[serde(default = "default_report_title")]
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output: default_report_output(),
            title: default_report_title(),
            subtitle: None,
        }
    }
}

/// Settings shared by every source block.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceCommon {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upstream already scoped to the area; skip the geo filter for it.
    #[serde(default)]
    pub assume_in_scope: bool,
    /// Like `assume_in_scope`, but only for items of these categories.
    #[serde(default)]
    pub pass_through: Vec<Category>,
}

impl Default for SourceCommon {
    fn default() -> Self {
        Self {
            enabled: true,
            label: None,
            timeout_secs: default_timeout_secs(),
            assume_in_scope: false,
            pass_through: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub stpaul_permits: Option<PermitsConfig>,
    #[serde(default)]
    pub granicus: Option<GranicusConfig>,
    #[serde(default)]
    pub legistar: Option<LegistarConfig>,
    #[serde(default)]
    pub ramsey_county: Option<RamseyConfig>,
    #[serde(default)]
    pub mndot: Option<MndotConfig>,
}

impl SourcesConfig {
    pub fn common(&self, kind: SourceKind) -> Option<&SourceCommon> {
        match kind {
            SourceKind::StpaulPermits => self.stpaul_permits.as_ref().map(|c| &c.common),
            SourceKind::Granicus => self.granicus.as_ref().map(|c| &c.common),
            SourceKind::Legistar => self.legistar.as_ref().map(|c| &c.common),
            SourceKind::RamseyCounty => self.ramsey_county.as_ref().map(|c| &c.common),
            SourceKind::Mndot => self.mndot.as_ref().map(|c| &c.common),
        }
    }

    /// Configured and enabled sources, in tag order.
    pub fn enabled(&self) -> Vec<SourceKind> {
        SourceKind::ALL
            .into_iter()
            .filter(|k| self.common(*k).is_some_and(|c| c.enabled))
            .collect()
    }

    pub fn label(&self, kind: SourceKind) -> String {
        self.common(kind)
            .and_then(|c| c.label.clone())
            .unwrap_or_else(|| kind.default_label().to_string())
    }

    /// Whether items of `category` from `kind` skip the geo filter.
    pub fn passes_through(&self, kind: SourceKind, category: Category) -> bool {
        self.common(kind)
            .is_some_and(|c| c.assume_in_scope || c.pass_through.contains(&category))
    }
}

fn default_permits_base_url() -> String {
    "https://information.stpaul.gov/resource".to_string()
}
fn default_permits_limit() -> u32 {
    500
}
fn default_zip_field() -> String {
    "zip".to_string()
}
fn default_date_field() -> String {
    "issued_date".to_string()
}
fn default_address_field() -> String {
    "address".to_string()
}
fn default_type_field() -> String {
    "permit_type".to_string()
}
fn default_number_fields() -> Vec<String> {
    vec!["permit_number".into(), "permit_no".into(), "id".into()]
}
fn default_description_fields() -> Vec<String> {
    vec![
        "work_description".into(),
        "contractor_name".into(),
        "owner_name".into(),
        "status".into(),
    ]
}

/// Saint Paul DSI building permits (Socrata open-data API).
#[derive(Debug, Clone, Deserialize)]
pub struct PermitsConfig {
    #[serde(flatten)]
    pub common: SourceCommon,
    #[serde(default = "default_permits_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub dataset_id: String,
    #[serde(default = "default_permits_limit")]
    pub limit: u32,
    #[serde(default = "default_zip_field")]
    pub zip_field: String,
    #[serde(default = "default_date_field")]
    pub date_field: String,
    #[serde(default = "default_address_field")]
    pub address_field: String,
    #[serde(default = "default_type_field")]
    pub type_field: String,
    /// Candidate fields for the permit number, first non-empty wins.
    #[serde(default = "default_number_fields")]
    pub number_fields: Vec<String>,
    #[serde(default = "default_description_fields")]
    pub description_fields: Vec<String>,
}

impl Default for PermitsConfig {
    fn default() -> Self {
        Self {
            common: SourceCommon::default(),
            base_url: default_permits_base_url(),
            dataset_id: String::new(),
            limit: default_permits_limit(),
            zip_field: default_zip_field(),
            date_field: default_date_field(),
            address_field: default_address_field(),
            type_field: default_type_field(),
            number_fields: default_number_fields(),
            description_fields: default_description_fields(),
        }
    }
}

impl PermitsConfig {
    /// Human-facing dataset page, used as the item link.
    pub fn dataset_page(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let site = base.strip_suffix("/resource").unwrap_or(base);
        format!("{}/d/{}", site, self.dataset_id)
    }
}

/// Saint Paul Planning Commission on Granicus (RSS feed + listing page).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GranicusConfig {
    #[serde(flatten)]
    pub common: SourceCommon,
    #[serde(default)]
    pub rss_url: String,
    #[serde(default)]
    pub listing_url: Option<String>,
    /// Location text stamped on every meeting (the feed carries none).
    #[serde(default)]
    pub location: Option<String>,
}

fn default_legistar_base_url() -> String {
    "https://stpaul.legistar.com/".to_string()
}

/// Saint Paul Legistar meeting calendar (HTML table).
#[derive(Debug, Clone, Deserialize)]
pub struct LegistarConfig {
    #[serde(flatten)]
    pub common: SourceCommon,
    #[serde(default)]
    pub calendar_url: String,
    #[serde(default = "default_legistar_base_url")]
    pub base_url: String,
}

impl Default for LegistarConfig {
    fn default() -> Self {
        Self {
            common: SourceCommon::default(),
            calendar_url: String::new(),
            base_url: default_legistar_base_url(),
        }
    }
}

/// Ramsey County: board of commissioners agendas and public works road
/// projects. Either page may be left out.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RamseyConfig {
    #[serde(flatten)]
    pub common: SourceCommon,
    #[serde(default)]
    pub board_url: Option<String>,
    #[serde(default)]
    pub roads_url: Option<String>,
    /// Location text stamped on board meetings.
    #[serde(default)]
    pub board_location: Option<String>,
}

/// MnDOT Metro District projects and Metro Transit capital projects.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MndotConfig {
    #[serde(flatten)]
    pub common: SourceCommon,
    #[serde(default)]
    pub projects_url: Option<String>,
    #[serde(default)]
    pub metro_transit_url: Option<String>,
}

fn is_blank(url: Option<&str>) -> bool {
    url.map_or(true, |u| u.trim().is_empty())
}

impl MonitorConfig {
    /// Load from an explicit path and validate.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("reading config from {}: {}", path.display(), e))
        })?;
        let cfg = Self::from_toml_str(&content)?;
        tracing::info!(
            target: "config",
            path = %path.display(),
            zip_codes = cfg.zip_codes.len(),
            neighborhoods = cfg.neighborhoods.len(),
            corridors = cfg.corridors.len(),
            flag_keywords = cfg.flag_keywords.len(),
            "config loaded"
        );
        Ok(cfg)
    }

    /// Parse from a TOML string and validate.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let mut cfg: MonitorConfig =
            toml::from_str(toml_str).map_err(|e| Error::config(e.to_string()))?;
        cfg.zip_codes = clean_list(std::mem::take(&mut cfg.zip_codes));
        cfg.flag_keywords = clean_list(std::mem::take(&mut cfg.flag_keywords));
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations under which filtering is undefined.
    pub fn validate(&self) -> Result<()> {
        if self.neighborhoods.is_empty() && self.corridors.is_empty() && self.zip_codes.is_empty()
        {
            return Err(Error::config(
                "no geographic criteria: set at least one of neighborhoods, corridors, zip_codes",
            ));
        }
        if self.max_item_age_days == 0 {
            return Err(Error::config("max_item_age_days must be at least 1"));
        }
        if let Some(t) = self
            .neighborhoods
            .iter()
            .chain(self.corridors.iter())
            .find(|t| t.name.is_empty())
        {
            return Err(Error::config(format!(
                "empty geographic term name ({:?} match)",
                t.mode
            )));
        }
        if let Some(z) = self
            .zip_codes
            .iter()
            .find(|z| z.len() != 5 || !z.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(Error::config(format!("zip code '{z}' is not 5 digits")));
        }

        if let Some(p) = self.sources.stpaul_permits.as_ref() {
            if p.common.enabled && p.dataset_id.trim().is_empty() {
                return Err(Error::config("sources.stpaul_permits.dataset_id is required"));
            }
        }
        if let Some(g) = self.sources.granicus.as_ref() {
            if g.common.enabled && g.rss_url.trim().is_empty() {
                return Err(Error::config("sources.granicus.rss_url is required"));
            }
        }
        if let Some(l) = self.sources.legistar.as_ref() {
            if l.common.enabled && l.calendar_url.trim().is_empty() {
                return Err(Error::config("sources.legistar.calendar_url is required"));
            }
        }
        if let Some(r) = self.sources.ramsey_county.as_ref() {
            if r.common.enabled
                && is_blank(r.board_url.as_deref())
                && is_blank(r.roads_url.as_deref())
            {
                return Err(Error::config(
                    "sources.ramsey_county needs board_url or roads_url",
                ));
            }
        }
        if let Some(m) = self.sources.mndot.as_ref() {
            if m.common.enabled
                && is_blank(m.projects_url.as_deref())
                && is_blank(m.metro_transit_url.as_deref())
            {
                return Err(Error::config(
                    "sources.mndot needs projects_url or metro_transit_url",
                ));
            }
        }
        Ok(())
    }

    /// Immutable geo criteria for the filter.
    pub fn geo(&self) -> GeoConfig {
        GeoConfig {
            neighborhoods: self.neighborhoods.clone(),
            corridors: self.corridors.clone(),
            zip_codes: self.zip_codes.iter().cloned().collect(),
            search_title_and_description: self.geo.search_title_and_description,
        }
    }
}

/// Resolve the config path: explicit flag, then `$MONITOR_CONFIG_PATH`,
/// then `config/monitor.toml`.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() {
            set.insert(t.to_string());
        }
    }
    set.into_iter().collect()
}
