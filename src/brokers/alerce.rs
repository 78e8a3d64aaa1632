use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{http_client, is_empty_result};
use crate::config::BrokersConfig;
use crate::constants::CONE_RADIUS_ARCSEC;
use crate::error::Result;
use crate::types::{BrokerClient, BrokerId, Coordinates, RawBrokerResponse, TransientTarget};

/// Default crossmatch radius in arcseconds. Wider than the object cone
/// because host galaxies sit well away from the transient position.
pub const CROSSMATCH_RADIUS_ARCSEC: f64 = 20.0;

/// ALeRCE ZTF API client. Object queries try the ZTF identifier first and
/// fall back to a small cone search around the catalog position.
pub struct AlerceClient {
    client: reqwest::Client,
    base_url: String,
    catshtm_url: String,
}

/// One detection row from the light curve endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightcurvePoint {
    pub mjd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mag: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e_mag: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fid: Option<i64>,
}

/// One upper limit row from the light curve endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonDetectionPoint {
    pub mjd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diffmaglim: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fid: Option<i64>,
}

/// Detections and upper limits for one ZTF object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lightcurve {
    pub detections: Vec<LightcurvePoint>,
    pub non_detections: Vec<NonDetectionPoint>,
}

impl AlerceClient {
    pub fn new(config: &BrokersConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.request_timeout_seconds)?,
            base_url: config.alerce_url.clone(),
            catshtm_url: config.alerce_catshtm_url.clone(),
        })
    }

    async fn query_objects(&self, params: &[(&str, String)]) -> Result<Value> {
        let body = self
            .client
            .get(format!("{}/objects", self.base_url))
            .query(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }

    async fn fetch_rows(&self, ztf_id: &str, endpoint: &str) -> Result<Vec<Value>> {
        let body: Value = self
            .client
            .get(format!("{}/objects/{}/{}", self.base_url, ztf_id, endpoint))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.as_array().cloned().unwrap_or_default())
    }

    /// Fetch detections and upper limits for one ZTF object, renamed to the
    /// field names the plotting layer expects.
    pub async fn lightcurve(&self, ztf_id: &str) -> Result<Lightcurve> {
        debug!(ztf_id, "fetching ALeRCE light curve");
        let detections = self
            .fetch_rows(ztf_id, "detections")
            .await?
            .iter()
            .filter_map(detection_point)
            .collect();
        let non_detections = self
            .fetch_rows(ztf_id, "non_detections")
            .await?
            .iter()
            .filter_map(limit_point)
            .collect();
        Ok(Lightcurve {
            detections,
            non_detections,
        })
    }

    /// Positional crossmatch against the catsHTM catalog collection.
    /// Values that are null, "nan", "None" or empty are dropped, and
    /// catalogs with nothing left are omitted entirely.
    pub async fn crossmatch(
        &self,
        coordinates: Coordinates,
        radius_arcsec: f64,
    ) -> Result<BTreeMap<String, BTreeMap<String, Value>>> {
        debug!(
            ra = coordinates.ra,
            dec = coordinates.dec,
            radius_arcsec,
            "querying catsHTM crossmatch"
        );
        let body: Value = self
            .client
            .get(format!("{}/crossmatch_all", self.catshtm_url))
            .query(&[
                ("ra", coordinates.ra.to_string()),
                ("dec", coordinates.dec.to_string()),
                ("radius", radius_arcsec.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut result = BTreeMap::new();
        if let Some(catalogs) = body.as_object() {
            for (catalog, attributes) in catalogs {
                let cleaned = clean_catalog(attributes);
                if !cleaned.is_empty() {
                    result.insert(catalog.clone(), cleaned);
                }
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl BrokerClient for AlerceClient {
    fn broker(&self) -> BrokerId {
        BrokerId::Alerce
    }

    async fn query(&self, target: &TransientTarget) -> Result<RawBrokerResponse> {
        let mut id_error = None;
        if let Some(ztf_id) = &target.ztf_id {
            debug!(ztf_id, "querying ALeRCE by object id");
            match self.query_objects(&[("oid", ztf_id.clone())]).await {
                Ok(body) if !page_is_empty(&body) => return Ok(body),
                Ok(_) => debug!(ztf_id, "no ALeRCE results for object id"),
                Err(e) => {
                    warn!(error = %e, "ALeRCE id query failed, trying coordinates");
                    id_error = Some(e);
                }
            }
        }
        if let Some(coordinates) = target.coordinates {
            debug!(
                ra = coordinates.ra,
                dec = coordinates.dec,
                "ALeRCE cone search"
            );
            // The objects endpoint takes its radius in degrees.
            let radius_deg = CONE_RADIUS_ARCSEC / 3600.0;
            return self
                .query_objects(&[
                    ("ra", coordinates.ra.to_string()),
                    ("dec", coordinates.dec.to_string()),
                    ("radius", radius_deg.to_string()),
                ])
                .await;
        }
        match id_error {
            Some(e) => Err(e),
            None => Ok(Value::Array(Vec::new())),
        }
    }
}

/// The objects endpoint pages its results, so an `items` list decides
/// emptiness when present.
fn page_is_empty(body: &Value) -> bool {
    if let Some(items) = body.get("items").and_then(Value::as_array) {
        return items.is_empty();
    }
    is_empty_result(body)
}

fn detection_point(row: &Value) -> Option<LightcurvePoint> {
    Some(LightcurvePoint {
        mjd: row.get("mjd").and_then(Value::as_f64)?,
        mag: row.get("magpsf").and_then(Value::as_f64),
        e_mag: row.get("sigmapsf").and_then(Value::as_f64),
        fid: row.get("fid").and_then(Value::as_i64),
    })
}

fn limit_point(row: &Value) -> Option<NonDetectionPoint> {
    Some(NonDetectionPoint {
        mjd: row.get("mjd").and_then(Value::as_f64)?,
        diffmaglim: row.get("diffmaglim").and_then(Value::as_f64),
        fid: row.get("fid").and_then(Value::as_i64),
    })
}

fn clean_catalog(attributes: &Value) -> BTreeMap<String, Value> {
    let mut cleaned = BTreeMap::new();
    if let Some(map) = attributes.as_object() {
        for (key, value) in map {
            if usable_value(value) {
                cleaned.insert(key.clone(), value.clone());
            }
        }
    }
    cleaned
}

fn usable_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !matches!(s.trim(), "" | "nan" | "None" | "null"),
        _ => true,
    }
}
