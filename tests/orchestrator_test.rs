use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metabroker::error::MetabrokerError;
use metabroker::orchestrator::BrokerOrchestrator;
use metabroker::types::{BrokerClient, BrokerId, BrokerOutcome, TransientTarget};
use serde_json::{json, Value};

/// What a stub broker should do when queried.
enum Reply {
    Body(Value),
    Fail(String),
    Hang,
}

struct StubBroker {
    broker: BrokerId,
    requires_ztf: bool,
    reply: Reply,
    calls: AtomicUsize,
}

impl StubBroker {
    fn new(broker: BrokerId, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            broker,
            requires_ztf: false,
            reply,
            calls: AtomicUsize::new(0),
        })
    }

    fn requiring_ztf(broker: BrokerId, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            broker,
            requires_ztf: true,
            reply,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl BrokerClient for StubBroker {
    fn broker(&self) -> BrokerId {
        self.broker
    }

    fn requires_ztf_id(&self) -> bool {
        self.requires_ztf
    }

    async fn query(&self, _target: &TransientTarget) -> metabroker::error::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Body(value) => Ok(value.clone()),
            Reply::Fail(message) => Err(MetabrokerError::BrokerQueryFailed {
                broker: self.broker.display_name().to_string(),
                message: message.clone(),
            }),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Value::Null)
            }
        }
    }
}

fn target(ztf_id: Option<&str>) -> TransientTarget {
    TransientTarget {
        name: "2024abc".to_string(),
        ztf_id: ztf_id.map(str::to_string),
        coordinates: None,
    }
}

#[tokio::test]
async fn test_fanout_collects_one_outcome_per_broker() {
    let clients: Vec<Arc<dyn BrokerClient>> = vec![
        StubBroker::new(
            BrokerId::Alerce,
            Reply::Body(json!([{"oid": "ZTF21abcdefg", "ndet": 4}])),
        ),
        StubBroker::new(BrokerId::Antares, Reply::Body(json!([]))),
        StubBroker::new(BrokerId::Fink, Reply::Fail("boom".to_string())),
        StubBroker::new(
            BrokerId::Lasair,
            Reply::Body(json!({"objectId": "ZTF21abcdefg"})),
        ),
    ];
    let orchestrator = BrokerOrchestrator::new(clients, Duration::from_secs(5));

    let report = orchestrator.query_all(&target(Some("ZTF21abcdefg"))).await;

    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.observation_count(), 2);
    assert_eq!(report.target.name, "2024abc");

    let alerce = report.outcomes[&BrokerId::Alerce].observation().unwrap();
    assert_eq!(alerce.object_id.as_deref(), Some("ZTF21abcdefg"));
    assert!(matches!(
        report.outcomes[&BrokerId::Antares],
        BrokerOutcome::NoMatch
    ));
    match &report.outcomes[&BrokerId::Fink] {
        BrokerOutcome::Failed { error } => assert!(error.contains("boom")),
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_hanging_broker_fails_without_hiding_others() {
    let clients: Vec<Arc<dyn BrokerClient>> = vec![
        StubBroker::new(BrokerId::Alerce, Reply::Hang),
        StubBroker::new(
            BrokerId::Lasair,
            Reply::Body(json!({"objectId": "ZTF21abcdefg"})),
        ),
    ];
    let orchestrator = BrokerOrchestrator::new(clients, Duration::from_secs(2));

    let report = orchestrator.query_all(&target(None)).await;

    match &report.outcomes[&BrokerId::Alerce] {
        BrokerOutcome::Failed { error } => assert!(error.contains("timed out")),
        other => panic!("expected a timeout failure, got {other:?}"),
    }
    assert!(report.outcomes[&BrokerId::Lasair].observation().is_some());
    // The deadline bounds the whole fan-out; the 60 second hang never runs out.
    assert!(report.elapsed_ms < 30_000);
}

#[tokio::test]
async fn test_brokers_requiring_ztf_id_are_skipped_without_a_query() {
    let stub = StubBroker::requiring_ztf(BrokerId::Fink, Reply::Body(json!([])));
    let clients: Vec<Arc<dyn BrokerClient>> = vec![stub.clone()];
    let orchestrator = BrokerOrchestrator::new(clients, Duration::from_secs(5));

    let report = orchestrator.query_all(&target(None)).await;
    match &report.outcomes[&BrokerId::Fink] {
        BrokerOutcome::Unavailable { reason } => {
            assert!(reason.contains("no ZTF identifier"))
        }
        other => panic!("expected unavailable, got {other:?}"),
    }
    assert_eq!(stub.calls.load(Ordering::SeqCst), 0);

    // With an identifier the same broker is queried normally.
    let report = orchestrator.query_all(&target(Some("ZTF21abcdefg"))).await;
    assert!(matches!(
        report.outcomes[&BrokerId::Fink],
        BrokerOutcome::NoMatch
    ));
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_single_broker_query_distinguishes_miss_from_failure() {
    let clients: Vec<Arc<dyn BrokerClient>> = vec![
        StubBroker::new(
            BrokerId::Alerce,
            Reply::Body(json!([{"oid": "ZTF21abcdefg"}])),
        ),
        StubBroker::new(BrokerId::Antares, Reply::Body(json!([]))),
        StubBroker::new(BrokerId::Fink, Reply::Fail("service down".to_string())),
    ];
    let orchestrator = BrokerOrchestrator::new(clients, Duration::from_secs(5));
    let target = target(Some("ZTF21abcdefg"));

    let found = orchestrator
        .query_broker(BrokerId::Alerce, &target)
        .await
        .unwrap();
    assert!(found.is_some());

    let missed = orchestrator
        .query_broker(BrokerId::Antares, &target)
        .await
        .unwrap();
    assert!(missed.is_none());

    let err = orchestrator
        .query_broker(BrokerId::Fink, &target)
        .await
        .unwrap_err();
    assert!(matches!(err, MetabrokerError::BrokerQueryFailed { .. }));

    // No client configured for Lasair in this orchestrator.
    let err = orchestrator
        .query_broker(BrokerId::Lasair, &target)
        .await
        .unwrap_err();
    assert!(matches!(err, MetabrokerError::Config(_)));
}

#[tokio::test]
async fn test_single_broker_respects_ztf_requirement_and_timeout() {
    let clients: Vec<Arc<dyn BrokerClient>> = vec![
        StubBroker::requiring_ztf(BrokerId::Fink, Reply::Body(json!([]))),
        StubBroker::new(BrokerId::Alerce, Reply::Hang),
    ];
    let orchestrator = BrokerOrchestrator::new(clients, Duration::from_secs(2));

    let err = orchestrator
        .query_broker(BrokerId::Fink, &target(None))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MetabrokerError::BrokerUnavailableForObject { .. }
    ));

    let err = orchestrator
        .query_broker(BrokerId::Alerce, &target(None))
        .await
        .unwrap_err();
    match err {
        MetabrokerError::BrokerQueryFailed { message, .. } => {
            assert!(message.contains("timed out"))
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
}
