use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{MetabrokerError, Result};
use crate::normalize;
use crate::observability::metrics;
use crate::types::{
    BrokerClient, BrokerId, BrokerObservation, BrokerOutcome, BrokerSearchReport, TransientTarget,
};

const NO_ZTF_ID_REASON: &str = "no ZTF identifier for this object";

/// Fans a search out to every configured broker and folds the answers into
/// one report. Each broker runs on its own task under its own deadline, so
/// one slow or broken upstream never hides the others.
pub struct BrokerOrchestrator {
    clients: Vec<Arc<dyn BrokerClient>>,
    timeout: Duration,
}

impl BrokerOrchestrator {
    pub fn new(clients: Vec<Arc<dyn BrokerClient>>, timeout: Duration) -> Self {
        Self { clients, timeout }
    }

    /// Query every broker for one target. Always returns a report with an
    /// outcome per broker; failures are recorded, never propagated.
    #[instrument(skip(self, target), fields(name = %target.name))]
    pub async fn query_all(&self, target: &TransientTarget) -> BrokerSearchReport {
        let started = Instant::now();
        let mut outcomes = BTreeMap::new();
        let mut handles = Vec::new();

        for client in &self.clients {
            let broker = client.broker();
            if client.requires_ztf_id() && target.ztf_id.is_none() {
                debug!(%broker, "skipping broker, target has no ZTF identifier");
                metrics::brokers::skipped(broker.as_str());
                outcomes.insert(
                    broker,
                    BrokerOutcome::Unavailable {
                        reason: NO_ZTF_ID_REASON.to_string(),
                    },
                );
                continue;
            }
            let client = Arc::clone(client);
            let target = target.clone();
            let timeout = self.timeout;
            handles.push((
                broker,
                tokio::spawn(async move {
                    let query_started = Instant::now();
                    let result = tokio::time::timeout(timeout, client.query(&target)).await;
                    (result, query_started.elapsed())
                }),
            ));
        }

        for (broker, handle) in handles {
            let outcome = match handle.await {
                Ok((result, duration)) => {
                    metrics::brokers::query_duration(broker.as_str(), duration.as_secs_f64());
                    self.classify(broker, result)
                }
                Err(e) => {
                    warn!(%broker, error = %e, "broker query task panicked");
                    metrics::brokers::query_error(broker.as_str());
                    BrokerOutcome::Failed {
                        error: "query task panicked".to_string(),
                    }
                }
            };
            outcomes.insert(broker, outcome);
        }

        let report = BrokerSearchReport {
            search_id: Uuid::new_v4(),
            target: target.clone(),
            outcomes,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            search_id = %report.search_id,
            observations = report.observation_count(),
            elapsed_ms = report.elapsed_ms,
            "broker fan-out finished"
        );
        report
    }

    /// Query a single broker. Unlike the fan-out this propagates errors, so
    /// callers can tell an unreachable broker from an unknown object.
    pub async fn query_broker(
        &self,
        broker: BrokerId,
        target: &TransientTarget,
    ) -> Result<Option<BrokerObservation>> {
        let client = self
            .clients
            .iter()
            .find(|client| client.broker() == broker)
            .ok_or_else(|| {
                MetabrokerError::Config(format!("no client configured for broker {broker}"))
            })?;
        if client.requires_ztf_id() && target.ztf_id.is_none() {
            metrics::brokers::skipped(broker.as_str());
            return Err(MetabrokerError::BrokerUnavailableForObject {
                broker: broker.display_name().to_string(),
                reason: NO_ZTF_ID_REASON.to_string(),
            });
        }
        let query_started = Instant::now();
        let result = tokio::time::timeout(self.timeout, client.query(target)).await;
        metrics::brokers::query_duration(broker.as_str(), query_started.elapsed().as_secs_f64());
        match result {
            Ok(Ok(raw)) => {
                metrics::brokers::query_success(broker.as_str());
                Ok(normalize::normalize(broker, &raw))
            }
            Ok(Err(e)) => {
                metrics::brokers::query_error(broker.as_str());
                Err(e)
            }
            Err(_) => {
                metrics::brokers::query_error(broker.as_str());
                Err(MetabrokerError::BrokerQueryFailed {
                    broker: broker.display_name().to_string(),
                    message: format!("timed out after {} seconds", self.timeout.as_secs()),
                })
            }
        }
    }

    fn classify(
        &self,
        broker: BrokerId,
        result: std::result::Result<Result<serde_json::Value>, tokio::time::error::Elapsed>,
    ) -> BrokerOutcome {
        match result {
            Ok(Ok(raw)) => {
                metrics::brokers::query_success(broker.as_str());
                match normalize::normalize(broker, &raw) {
                    Some(observation) => BrokerOutcome::Observation { observation },
                    None => BrokerOutcome::NoMatch,
                }
            }
            Ok(Err(MetabrokerError::BrokerUnavailableForObject { reason, .. })) => {
                metrics::brokers::skipped(broker.as_str());
                BrokerOutcome::Unavailable { reason }
            }
            Ok(Err(e)) => {
                warn!(%broker, error = %e, "broker query failed");
                metrics::brokers::query_error(broker.as_str());
                BrokerOutcome::Failed {
                    error: e.to_string(),
                }
            }
            Err(_) => {
                warn!(%broker, timeout_seconds = self.timeout.as_secs(), "broker query timed out");
                metrics::brokers::query_error(broker.as_str());
                BrokerOutcome::Failed {
                    error: format!("timed out after {} seconds", self.timeout.as_secs()),
                }
            }
        }
    }
}
