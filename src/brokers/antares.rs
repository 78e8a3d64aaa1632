use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::{http_client, is_empty_result};
use crate::config::BrokersConfig;
use crate::constants::CONE_RADIUS_ARCSEC;
use crate::error::Result;
use crate::types::{BrokerClient, BrokerId, RawBrokerResponse, TransientTarget};

/// ANTARES locus API client. Loci carry their alert statistics as a
/// `properties` map, which the normalizer unpacks.
pub struct AntaresClient {
    client: reqwest::Client,
    base_url: String,
}

impl AntaresClient {
    pub fn new(config: &BrokersConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.request_timeout_seconds)?,
            base_url: config.antares_url.clone(),
        })
    }

    async fn get_loci(&self, params: &[(&str, String)]) -> Result<Value> {
        let body: Value = self
            .client
            .get(format!("{}/loci", self.base_url))
            .query(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        // Responses wrap their payload in a JSON:API style data member.
        if let Value::Object(mut map) = body {
            if let Some(data) = map.remove("data") {
                return Ok(data);
            }
            return Ok(Value::Object(map));
        }
        Ok(body)
    }
}

#[async_trait]
impl BrokerClient for AntaresClient {
    fn broker(&self) -> BrokerId {
        BrokerId::Antares
    }

    async fn query(&self, target: &TransientTarget) -> Result<RawBrokerResponse> {
        let mut id_error = None;
        if let Some(ztf_id) = &target.ztf_id {
            debug!(ztf_id, "querying ANTARES by ZTF object id");
            match self.get_loci(&[("ztf_object_id", ztf_id.clone())]).await {
                Ok(body) if !is_empty_result(&body) => return Ok(body),
                Ok(_) => debug!(ztf_id, "no ANTARES locus for object id"),
                Err(e) => {
                    warn!(error = %e, "ANTARES id query failed, trying coordinates");
                    id_error = Some(e);
                }
            }
        }
        if let Some(coordinates) = target.coordinates {
            debug!(
                ra = coordinates.ra,
                dec = coordinates.dec,
                "ANTARES cone search"
            );
            return self
                .get_loci(&[
                    ("ra", coordinates.ra.to_string()),
                    ("dec", coordinates.dec.to_string()),
                    ("radius", CONE_RADIUS_ARCSEC.to_string()),
                ])
                .await;
        }
        match id_error {
            Some(e) => Err(e),
            None => Ok(Value::Array(Vec::new())),
        }
    }
}
