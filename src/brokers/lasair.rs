use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use super::http_client;
use crate::config::BrokersConfig;
use crate::constants::CONE_RADIUS_ARCSEC;
use crate::error::{MetabrokerError, Result};
use crate::types::{BrokerClient, BrokerId, Coordinates, RawBrokerResponse, TransientTarget};

/// Columns pulled from the sherlock_classifications table when enriching an
/// object hit with host context.
const SHERLOCK_COLUMNS: &str = "sherlock_classifications.objectId,\
    sherlock_classifications.classification,\
    sherlock_classifications.association_type,\
    sherlock_classifications.catalogue_table_name,\
    sherlock_classifications.catalogue_object_id,\
    sherlock_classifications.catalogue_object_type,\
    sherlock_classifications.separationArcsec,\
    sherlock_classifications.northSeparationArcsec,\
    sherlock_classifications.eastSeparationArcsec,\
    sherlock_classifications.physical_separation_kpc,\
    sherlock_classifications.direct_distance,\
    sherlock_classifications.distance,\
    sherlock_classifications.z,\
    sherlock_classifications.photoZ,\
    sherlock_classifications.photoZErr,\
    sherlock_classifications.Mag,\
    sherlock_classifications.MagFilter,\
    sherlock_classifications.MagErr,\
    sherlock_classifications.classificationReliability,\
    sherlock_classifications.major_axis_arcsec,\
    sherlock_classifications.description,\
    sherlock_classifications.summary";

/// How many cone search hits get hydrated with full object documents.
const CONE_DETAIL_LIMIT: usize = 3;

/// Lasair API client. Most endpoints want a token; without one the object
/// endpoint answers 401 and the query surfaces that as a broker failure
/// with a pointer at the token signup page.
pub struct LasairClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl LasairClient {
    pub fn new(config: &BrokersConfig, token: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(config.request_timeout_seconds)?,
            base_url: config.lasair_url.clone(),
            token,
        })
    }

    fn request(&self, url: String) -> reqwest::RequestBuilder {
        let builder = self.client.get(url);
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Token {token}")),
            None => builder,
        }
    }

    fn auth_required() -> MetabrokerError {
        MetabrokerError::BrokerQueryFailed {
            broker: BrokerId::Lasair.display_name().to_string(),
            message: "authentication required; get an API token at \
                      https://lasair-ztf.lsst.ac.uk/"
                .to_string(),
        }
    }

    async fn fetch_object(&self, object_id: &str) -> Result<Value> {
        let response = self
            .request(format!("{}/object/", self.base_url))
            .query(&[("objectId", object_id), ("format", "json")])
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(Self::auth_required());
        }
        Ok(response.error_for_status()?.json().await?)
    }

    /// Pull host context rows from the sherlock_classifications table and
    /// attach them to the object document. Enrichment failures are logged
    /// and otherwise ignored; the bare object is still a valid answer.
    async fn attach_sherlock(&self, object: &mut Value, object_id: &str) {
        let conditions = format!("sherlock_classifications.objectId='{object_id}'");
        let result = self
            .request(format!("{}/query/", self.base_url))
            .query(&[
                ("selected", SHERLOCK_COLUMNS),
                ("tables", "sherlock_classifications"),
                ("conditions", conditions.as_str()),
                ("format", "json"),
            ])
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                match response.json::<Value>().await {
                    Ok(rows) if rows.as_array().is_some_and(|r| !r.is_empty()) => {
                        debug!(object_id, "attached sherlock classifications");
                        if let Some(map) = object.as_object_mut() {
                            map.insert("sherlock_classifications".to_string(), rows);
                        }
                    }
                    Ok(_) => debug!(object_id, "no sherlock classifications found"),
                    Err(e) => debug!(error = %e, "sherlock response was not JSON"),
                }
            }
            Ok(response) => {
                debug!(status = %response.status(), "sherlock query not available")
            }
            Err(e) => debug!(error = %e, "sherlock query failed"),
        }
    }

    async fn cone_search(&self, coordinates: Coordinates) -> Result<Value> {
        debug!(
            ra = coordinates.ra,
            dec = coordinates.dec,
            "Lasair cone search"
        );
        let response = self
            .request(format!("{}/cone/", self.base_url))
            .query(&[
                ("ra", coordinates.ra.to_string()),
                ("dec", coordinates.dec.to_string()),
                ("radius", CONE_RADIUS_ARCSEC.to_string()),
                ("requestType", "all".to_string()),
                ("format", "json".to_string()),
            ])
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(Self::auth_required());
        }
        let hits: Value = response.error_for_status()?.json().await?;
        let Some(list) = hits.as_array() else {
            return Ok(Value::Array(Vec::new()));
        };
        if list.is_empty() {
            return Ok(Value::Array(Vec::new()));
        }

        // Hydrate the nearest hits with full object documents so the
        // normalizer sees the same shape as a direct object query.
        let mut detailed = Vec::new();
        for hit in list.iter().take(CONE_DETAIL_LIMIT) {
            let Some(object_id) = hit.get("object").and_then(Value::as_str) else {
                continue;
            };
            match self.fetch_object(object_id).await {
                Ok(mut object) if object.get("objectId").is_some() => {
                    if let (Some(map), Some(separation)) =
                        (object.as_object_mut(), hit.get("separation"))
                    {
                        map.insert("separation".to_string(), separation.clone());
                    }
                    detailed.push(object);
                }
                Ok(_) => detailed.push(hit.clone()),
                Err(e) => {
                    debug!(object_id, error = %e, "detail fetch failed, keeping cone hit");
                    detailed.push(hit.clone());
                }
            }
        }
        if detailed.is_empty() {
            return Ok(hits);
        }
        Ok(Value::Array(detailed))
    }
}

#[async_trait]
impl BrokerClient for LasairClient {
    fn broker(&self) -> BrokerId {
        BrokerId::Lasair
    }

    async fn query(&self, target: &TransientTarget) -> Result<RawBrokerResponse> {
        let mut id_error = None;
        if let Some(ztf_id) = &target.ztf_id {
            debug!(ztf_id, "querying Lasair object endpoint");
            match self.fetch_object(ztf_id).await {
                Ok(mut object) if object.get("objectId").is_some() => {
                    self.attach_sherlock(&mut object, ztf_id).await;
                    return Ok(object);
                }
                Ok(_) => debug!(ztf_id, "no Lasair object for id"),
                // Without a token there is no point falling back to the
                // cone endpoint, it wants the same credentials.
                Err(e @ MetabrokerError::BrokerQueryFailed { .. }) => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Lasair object query failed, trying coordinates");
                    id_error = Some(e);
                }
            }
        }
        if let Some(coordinates) = target.coordinates {
            return self.cone_search(coordinates).await;
        }
        match id_error {
            Some(e) => Err(e),
            None => Ok(Value::Array(Vec::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sherlock_column_list_is_fully_qualified() {
        for column in SHERLOCK_COLUMNS.split(',') {
            assert!(
                column.starts_with("sherlock_classifications."),
                "unqualified column: {column}"
            );
        }
        assert_eq!(SHERLOCK_COLUMNS.split(',').count(), 22);
    }

    #[test]
    fn auth_error_names_the_broker() {
        let error = LasairClient::auth_required();
        assert!(error.to_string().starts_with("Lasair:"));
        assert!(error.to_string().contains("token"));
    }
}
