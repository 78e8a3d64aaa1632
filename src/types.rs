use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::astro;
use crate::constants;
use crate::error::Result;

/// Raw JSON payload as returned from a broker API.
pub type RawBrokerResponse = serde_json::Value;

/// ZTF object identifiers look like ZTF21abcdefg.
static ZTF_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^ZTF[0-9]{2}[a-z]{7}$").unwrap());

/// One object from the TNS public catalog.
///
/// Field names follow the CSV headers of the bulk export so records
/// deserialize straight out of cache files written by earlier versions.
/// Absent values serialize as explicit nulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub name: String,
    #[serde(default)]
    pub ra: Option<String>,
    #[serde(default)]
    pub declination: Option<String>,
    #[serde(rename = "type", default)]
    pub object_type: Option<String>,
    #[serde(default)]
    pub redshift: Option<String>,
    #[serde(rename = "discoverydate", default)]
    pub discovery_date: Option<String>,
    #[serde(rename = "discoverymag", default)]
    pub discovery_mag: Option<String>,
    #[serde(rename = "filter", default)]
    pub discovery_filter: Option<String>,
    #[serde(default)]
    pub reporting_group: Option<String>,
    #[serde(default)]
    pub source_group: Option<String>,
    #[serde(default)]
    pub internal_names: Option<String>,
    #[serde(rename = "Discovery_ADS_bibcode", default)]
    pub discovery_bibcode: Option<String>,
    #[serde(rename = "Class_ADS_bibcodes", default)]
    pub classification_bibcodes: Option<String>,
}

impl CatalogRecord {
    /// Survey designations from the comma or semicolon separated alias list.
    pub fn aliases(&self) -> Vec<&str> {
        self.internal_names
            .as_deref()
            .map(|names| {
                names
                    .split([',', ';'])
                    .map(str::trim)
                    .filter(|alias| !alias.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First alias that is a well-formed ZTF object identifier.
    pub fn ztf_id(&self) -> Option<String> {
        self.aliases()
            .into_iter()
            .find(|alias| ZTF_ID_RE.is_match(alias))
            .map(str::to_string)
    }

    /// Decimal-degree position parsed from the catalog's sexagesimal strings.
    pub fn coordinates(&self) -> Option<Coordinates> {
        let ra = self.ra.as_deref()?;
        let dec = self.declination.as_deref()?;
        astro::parse_coordinates(ra, dec).ok()
    }
}

/// Decimal-degree sky position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub ra: f64,
    pub dec: f64,
}

/// Cache document persisted by the catalog store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub last_updated: DateTime<Utc>,
    pub download_date: NaiveDate,
    pub total_objects: usize,
    pub data: Vec<CatalogRecord>,
}

/// Where a cache answer came from on this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheProvenance {
    Memory,
    File,
}

/// Freshness report for the catalog cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheInfo {
    pub exists: bool,
    pub is_current: bool,
    pub age_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_objects: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<CacheProvenance>,
}

impl CacheInfo {
    /// Report for a cache that has never been populated.
    pub fn missing() -> Self {
        Self {
            exists: false,
            is_current: false,
            age_days: None,
            total_objects: None,
            download_date: None,
            last_updated: None,
            source: None,
        }
    }
}

/// Outcome of a completed catalog refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub count: usize,
    pub timestamp: DateTime<Utc>,
    pub download_date: NaiveDate,
    /// True when this caller got the result of a refresh that was already
    /// in flight rather than triggering its own download.
    #[serde(default)]
    pub reused: bool,
}

/// TNS bot identity used for authenticated catalog downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TnsCredentials {
    pub tns_id: String,
    pub tns_username: String,
}

impl TnsCredentials {
    /// Identity header in the exact shape the TNS download endpoint expects.
    pub fn user_agent(&self) -> String {
        format!(
            r#"tns_marker{{"tns_id":{},"type": "user", "name":"{}"}}"#,
            self.tns_id, self.tns_username
        )
    }
}

/// The four alert brokers queried during a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerId {
    Alerce,
    Antares,
    Fink,
    Lasair,
}

impl BrokerId {
    pub const ALL: [BrokerId; 4] = [
        BrokerId::Alerce,
        BrokerId::Antares,
        BrokerId::Fink,
        BrokerId::Lasair,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerId::Alerce => constants::ALERCE,
            BrokerId::Antares => constants::ANTARES,
            BrokerId::Fink => constants::FINK,
            BrokerId::Lasair => constants::LASAIR,
        }
    }

    /// Human-facing broker name for messages and CLI output.
    pub fn display_name(&self) -> &'static str {
        match self {
            BrokerId::Alerce => constants::ALERCE_DISPLAY,
            BrokerId::Antares => constants::ANTARES_DISPLAY,
            BrokerId::Fink => constants::FINK_DISPLAY,
            BrokerId::Lasair => constants::LASAIR_DISPLAY,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            constants::ALERCE => Some(BrokerId::Alerce),
            constants::ANTARES => Some(BrokerId::Antares),
            constants::FINK => Some(BrokerId::Fink),
            constants::LASAIR => Some(BrokerId::Lasair),
            _ => None,
        }
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a broker query should run against: resolved identity plus position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransientTarget {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ztf_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

impl TransientTarget {
    pub fn from_record(record: &CatalogRecord) -> Self {
        Self {
            name: record.name.clone(),
            ztf_id: record.ztf_id(),
            coordinates: record.coordinates(),
        }
    }
}

/// One probability from a named classifier, expressed in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierScore {
    pub classifier: String,
    pub probability: f64,
}

/// Host association reported by a crossmatch service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostGalaxy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalogue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalogue_object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalogue_object_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separation_arcsec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_separation_kpc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_mpc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redshift: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl HostGalaxy {
    pub fn is_empty(&self) -> bool {
        self == &HostGalaxy::default()
    }
}

/// Normalized observation extracted from one broker's raw response.
///
/// Every field is optional because every broker supplies a different subset.
/// Absent fields are omitted from serialized output entirely, never invented.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ztf_object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detections: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_detections: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerts: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_detection: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_detection: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_days: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_magnitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faintest_magnitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_magnitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_magnitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_magnitude_error: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_color_gr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_color_gr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stellar: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classifier_scores: Vec<ClassifierScore>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<HostGalaxy>,
}

/// Per-broker result of a fan-out search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BrokerOutcome {
    /// The broker knows the object and returned usable data.
    Observation { observation: BrokerObservation },
    /// The broker answered but has no record of the object.
    NoMatch,
    /// The broker cannot be queried for this object at all.
    Unavailable { reason: String },
    /// The query was attempted and failed.
    Failed { error: String },
}

impl BrokerOutcome {
    pub fn observation(&self) -> Option<&BrokerObservation> {
        match self {
            BrokerOutcome::Observation { observation } => Some(observation),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, BrokerOutcome::Failed { .. })
    }
}

/// Aggregate of one fan-out across all brokers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSearchReport {
    pub search_id: Uuid,
    pub target: TransientTarget,
    pub outcomes: BTreeMap<BrokerId, BrokerOutcome>,
    pub elapsed_ms: u64,
}

impl BrokerSearchReport {
    pub fn observation_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|outcome| outcome.observation().is_some())
            .count()
    }
}

/// Core trait that all broker clients must implement.
#[async_trait::async_trait]
pub trait BrokerClient: Send + Sync {
    /// Which broker this client talks to.
    fn broker(&self) -> BrokerId;

    /// True for brokers that can only be queried by ZTF object id.
    fn requires_ztf_id(&self) -> bool {
        false
    }

    /// Run the broker's query chain for one target and return the raw body.
    async fn query(&self, target: &TransientTarget) -> Result<RawBrokerResponse>;
}
