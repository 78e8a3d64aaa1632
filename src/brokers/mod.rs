use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::BrokersConfig;
use crate::error::Result;
use crate::types::{BrokerClient, BrokerId};

pub mod alerce;
pub mod antares;
pub mod atlas;
pub mod fink;
pub mod lasair;

pub use alerce::AlerceClient;
pub use antares::AntaresClient;
pub use atlas::{AtlasClient, AtlasCredentials, PhotometryPoint, PhotometryResult};
pub use fink::FinkClient;
pub use lasair::LasairClient;

/// Factory function to create one client per supported broker.
pub fn create_clients(
    config: &BrokersConfig,
    lasair_token: Option<String>,
) -> Result<Vec<Arc<dyn BrokerClient>>> {
    Ok(vec![
        Arc::new(AlerceClient::new(config)?),
        Arc::new(AntaresClient::new(config)?),
        Arc::new(FinkClient::new(config)?),
        Arc::new(LasairClient::new(config, lasair_token)?),
    ])
}

/// Factory function to create a single client by broker id.
pub fn create_client(
    broker: BrokerId,
    config: &BrokersConfig,
    lasair_token: Option<String>,
) -> Result<Arc<dyn BrokerClient>> {
    Ok(match broker {
        BrokerId::Alerce => Arc::new(AlerceClient::new(config)?),
        BrokerId::Antares => Arc::new(AntaresClient::new(config)?),
        BrokerId::Fink => Arc::new(FinkClient::new(config)?),
        BrokerId::Lasair => Arc::new(LasairClient::new(config, lasair_token)?),
    })
}

pub(crate) fn http_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()?)
}

/// True when a raw body carries no usable object: null, an empty list, or
/// an empty map. Non-empty objects count as results even before the
/// normalizer has inspected them.
pub(crate) fn is_empty_result(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_shapes_are_recognized() {
        assert!(is_empty_result(&Value::Null));
        assert!(is_empty_result(&json!([])));
        assert!(is_empty_result(&json!({})));
        assert!(!is_empty_result(&json!([{"oid": "ZTF18abc"}])));
        assert!(!is_empty_result(&json!({"oid": "ZTF18abc"})));
    }

    #[test]
    fn factory_builds_all_supported_brokers() {
        let config = BrokersConfig::default();
        let clients = create_clients(&config, None).unwrap();
        let brokers: Vec<BrokerId> = clients.iter().map(|c| c.broker()).collect();
        assert_eq!(
            brokers,
            vec![
                BrokerId::Alerce,
                BrokerId::Antares,
                BrokerId::Fink,
                BrokerId::Lasair
            ]
        );
    }

    #[test]
    fn single_client_factory_matches_requested_broker() {
        let config = BrokersConfig::default();
        for broker in BrokerId::ALL {
            let client = create_client(broker, &config, None).unwrap();
            assert_eq!(client.broker(), broker);
        }
    }
}
