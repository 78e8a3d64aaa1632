use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::http_client;
use crate::config::BrokersConfig;
use crate::error::{MetabrokerError, Result};
use crate::types::{BrokerClient, BrokerId, RawBrokerResponse, TransientTarget};

/// Alert columns requested from the objects endpoint. The identifier column
/// comes first so every returned alert row names its object.
const OBJECT_COLUMNS: &str = "i:objectId,i:jd,i:magpsf,i:sigmapsf,i:fid,i:ra,i:dec,\
                              d:cdsxmatch,d:roid,d:mulens,d:snn_snia_vs_nonia,\
                              d:snn_sn_vs_all,d:rf_snia_vs_nonia,d:tag";

#[derive(Serialize)]
struct ObjectsRequest<'a> {
    #[serde(rename = "objectId")]
    object_id: &'a str,
    #[serde(rename = "output-format")]
    output_format: &'a str,
    columns: &'a str,
}

/// Fink REST client. Fink only answers ZTF identifier queries, so the
/// fan-out skips this broker for objects the catalog never matched to ZTF.
pub struct FinkClient {
    client: reqwest::Client,
    base_url: String,
}

impl FinkClient {
    pub fn new(config: &BrokersConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.request_timeout_seconds)?,
            base_url: config.fink_url.clone(),
        })
    }
}

#[async_trait]
impl BrokerClient for FinkClient {
    fn broker(&self) -> BrokerId {
        BrokerId::Fink
    }

    fn requires_ztf_id(&self) -> bool {
        true
    }

    async fn query(&self, target: &TransientTarget) -> Result<RawBrokerResponse> {
        let ztf_id = target.ztf_id.as_deref().ok_or_else(|| {
            MetabrokerError::BrokerUnavailableForObject {
                broker: BrokerId::Fink.display_name().to_string(),
                reason: "no ZTF identifier for this object".to_string(),
            }
        })?;
        debug!(ztf_id, "querying Fink objects endpoint");
        let body: Value = self
            .client
            .post(format!("{}/objects", self.base_url))
            .json(&ObjectsRequest {
                object_id: ztf_id,
                output_format: "json",
                columns: OBJECT_COLUMNS,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_api_field_names() {
        let request = ObjectsRequest {
            object_id: "ZTF21abcdefg",
            output_format: "json",
            columns: OBJECT_COLUMNS,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["objectId"], "ZTF21abcdefg");
        assert_eq!(value["output-format"], "json");
        assert!(value["columns"]
            .as_str()
            .unwrap()
            .starts_with("i:objectId,i:jd"));
    }

    #[test]
    fn fink_requires_a_ztf_identifier() {
        let client = FinkClient::new(&BrokersConfig::default()).unwrap();
        assert!(client.requires_ztf_id());
    }
}
