//! Rebalance Integration Tests
//!
//! Drives `Rebalancer` end to end against the in-memory fleet store.
//!
//! Run with: cargo test --test rebalance_test

use fleetbalance_core::{
    Agent, AvailabilityZone, Node, NodeState, RebalanceReport, Role, ZoneBinding,
};
use fleetbalance_metadata::{FleetData, FleetStore, MemoryFleetStore, StoreError};
use fleetbalance_rebalancer::{
    RebalanceError, RebalanceRequest, Rebalancer, RebalancerConfig, TrafficRebalancer,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const A: &str = "10.0.0.1";
const B: &str = "10.0.0.2";
const C: &str = "10.0.0.3";

fn make_node(ip: &str, state: NodeState, max_agents: u32) -> Node {
    Node {
        ip: ip.to_string(),
        state,
        max_agents,
    }
}

fn make_agent(id: u64, az: &str, controller_ip: &str, analyzer_ip: &str) -> Agent {
    Agent {
        id,
        name: format!("agent-{}", id),
        az: az.to_string(),
        controller_ip: controller_ip.to_string(),
        analyzer_ip: analyzer_ip.to_string(),
        enabled: true,
    }
}

/// z1 served by A, B and C (cap 4 each); agents 1..=4 all on A for both roles
fn make_spread_data() -> FleetData {
    let mut data = FleetData::default();
    data.add_az("z1", "r1");
    for role in Role::ALL {
        for ip in [A, B, C] {
            data.add_node(role, make_node(ip, NodeState::Complete, 4))
                .bind(role, ZoneBinding::az(ip, "z1"));
        }
    }
    for id in 1..=4 {
        data.add_agent(make_agent(id, "z1", A, A));
    }
    data
}

fn make_rebalancer(store: Arc<MemoryFleetStore>) -> Rebalancer {
    Rebalancer::new(store, RebalancerConfig::default())
}

fn before_after_sums(report: &RebalanceReport) -> BTreeMap<String, (u32, u32)> {
    let mut sums: BTreeMap<String, (u32, u32)> = BTreeMap::new();
    for entry in &report.details {
        let sum = sums.entry(entry.az.clone()).or_default();
        sum.0 += entry.before;
        sum.1 += entry.after;
    }
    sums
}

/// Traffic balancer stub that records how it was called
#[derive(Default)]
struct RecordingTraffic {
    calls: Mutex<Vec<(bool, Duration)>>,
    fail: bool,
}

#[async_trait::async_trait]
impl TrafficRebalancer for RecordingTraffic {
    async fn rebalance_by_traffic(
        &self,
        check: bool,
        data_duration: Duration,
    ) -> Result<RebalanceReport, Box<dyn std::error::Error + Send + Sync>> {
        self.calls
            .lock()
            .map_err(|e| e.to_string())?
            .push((check, data_duration));
        if self.fail {
            return Err("traffic metrics unavailable".into());
        }
        Ok(RebalanceReport {
            total_switched: 7,
            details: Vec::new(),
        })
    }
}

/// Store that refuses every read
struct UnreadableStore;

#[async_trait::async_trait]
impl FleetStore for UnreadableStore {
    async fn list_azs(&self) -> Result<Vec<AvailabilityZone>, StoreError> {
        Err(StoreError::Invalid("unexpected read".to_string()))
    }

    async fn list_nodes(&self, _role: Role) -> Result<Vec<Node>, StoreError> {
        Err(StoreError::Invalid("unexpected read".to_string()))
    }

    async fn list_zone_bindings(&self, _role: Role) -> Result<Vec<ZoneBinding>, StoreError> {
        Err(StoreError::Invalid("unexpected read".to_string()))
    }

    async fn list_agents(&self, _role: Role) -> Result<Vec<Agent>, StoreError> {
        Err(StoreError::Invalid("unexpected read".to_string()))
    }

    async fn update_agent_node(
        &self,
        _role: Role,
        _agent_id: u64,
        _node_ip: &str,
    ) -> Result<(), StoreError> {
        Err(StoreError::Invalid("unexpected write".to_string()))
    }
}

/// Memory store that hands control back to the scheduler after every call,
/// so concurrent runs interleave between snapshot and write
struct YieldingStore {
    inner: Arc<MemoryFleetStore>,
}

#[async_trait::async_trait]
impl FleetStore for YieldingStore {
    async fn list_azs(&self) -> Result<Vec<AvailabilityZone>, StoreError> {
        let azs = self.inner.list_azs().await;
        tokio::task::yield_now().await;
        azs
    }

    async fn list_nodes(&self, role: Role) -> Result<Vec<Node>, StoreError> {
        let nodes = self.inner.list_nodes(role).await;
        tokio::task::yield_now().await;
        nodes
    }

    async fn list_zone_bindings(&self, role: Role) -> Result<Vec<ZoneBinding>, StoreError> {
        let bindings = self.inner.list_zone_bindings(role).await;
        tokio::task::yield_now().await;
        bindings
    }

    async fn list_agents(&self, role: Role) -> Result<Vec<Agent>, StoreError> {
        let agents = self.inner.list_agents(role).await;
        tokio::task::yield_now().await;
        agents
    }

    async fn update_agent_node(
        &self,
        role: Role,
        agent_id: u64,
        node_ip: &str,
    ) -> Result<(), StoreError> {
        let result = self.inner.update_agent_node(role, agent_id, node_ip).await;
        tokio::task::yield_now().await;
        result
    }
}

#[tokio::test]
async fn test_spread_overloaded_node() {
    let store = Arc::new(MemoryFleetStore::from_data(make_spread_data()));
    let rebalancer = make_rebalancer(store.clone());

    let report = rebalancer
        .rebalance(RebalanceRequest::new(Role::Controller, false))
        .await
        .unwrap();

    assert_eq!(report.total_switched, 2);
    assert_eq!(report.details.len(), 3);

    let a = report.entry("z1", A).unwrap();
    assert_eq!((a.before, a.after, a.switched), (4, 2, 2));
    let b = report.entry("z1", B).unwrap();
    assert_eq!((b.before, b.after, b.switched), (0, 1, 1));
    let c = report.entry("z1", C).unwrap();
    assert_eq!((c.before, c.after, c.switched), (0, 1, 1));
    assert!(report
        .details
        .iter()
        .all(|e| e.before_weight == 1.0 && e.after_weight == 1.0));

    assert_eq!(store.agent(1).unwrap().controller_ip, A);
    assert_eq!(store.agent(2).unwrap().controller_ip, A);
    assert_eq!(store.agent(3).unwrap().controller_ip, B);
    assert_eq!(store.agent(4).unwrap().controller_ip, C);
    assert_eq!(store.writes(), 2);
}

#[tokio::test]
async fn test_check_mode_matches_commit_and_writes_nothing() {
    let check_store = Arc::new(MemoryFleetStore::from_data(make_spread_data()));
    let commit_store = Arc::new(MemoryFleetStore::from_data(make_spread_data()));

    let checked = make_rebalancer(check_store.clone())
        .rebalance(RebalanceRequest::new(Role::Controller, true))
        .await
        .unwrap();
    let committed = make_rebalancer(commit_store.clone())
        .rebalance(RebalanceRequest::new(Role::Controller, false))
        .await
        .unwrap();

    assert_eq!(checked, committed);
    assert_eq!(check_store.writes(), 0);
    assert_eq!(check_store.data(), make_spread_data());
    assert_eq!(commit_store.writes(), u64::from(committed.total_switched));
}

#[tokio::test]
async fn test_second_commit_is_a_no_op() {
    let store = Arc::new(MemoryFleetStore::from_data(make_spread_data()));
    let rebalancer = make_rebalancer(store.clone());

    let first = rebalancer
        .rebalance(RebalanceRequest::new(Role::Controller, false))
        .await
        .unwrap();
    assert_eq!(first.total_switched, 2);

    let second = rebalancer
        .rebalance(RebalanceRequest::new(Role::Controller, false))
        .await
        .unwrap();
    assert_eq!(second.total_switched, 0);
    assert!(second.details.iter().all(|e| e.before == e.after));
    assert_eq!(store.writes(), 2);
}

#[tokio::test]
async fn test_roles_are_independent() {
    let store = Arc::new(MemoryFleetStore::from_data(make_spread_data()));
    let rebalancer = make_rebalancer(store.clone());

    rebalancer
        .rebalance(RebalanceRequest::new(Role::Controller, false))
        .await
        .unwrap();
    assert!((1..=4).all(|id| store.agent(id).unwrap().analyzer_ip == A));

    let report = rebalancer
        .rebalance(RebalanceRequest::new(Role::Analyzer, false))
        .await
        .unwrap();
    assert_eq!(report.total_switched, 2);
    assert_eq!(store.agent(3).unwrap().analyzer_ip, B);
    assert_eq!(store.agent(4).unwrap().analyzer_ip, C);
}

#[tokio::test]
async fn test_unhealthy_nodes_never_receive_agents() {
    const D: &str = "10.0.0.4";

    let mut data = FleetData::default();
    data.add_az("z1", "r1")
        .add_node(Role::Controller, make_node(A, NodeState::Complete, 2))
        .add_node(Role::Controller, make_node(B, NodeState::Maintenance, 100))
        .add_node(Role::Controller, make_node(C, NodeState::Exception, 100))
        .add_node(Role::Controller, make_node(D, NodeState::Complete, 2));
    for ip in [A, B, C, D] {
        data.bind(Role::Controller, ZoneBinding::region(ip, "r1"));
    }
    for id in 1..=6 {
        data.add_agent(make_agent(id, "z1", A, ""));
    }
    let store = Arc::new(MemoryFleetStore::from_data(data));

    let report = make_rebalancer(store.clone())
        .rebalance(RebalanceRequest::new(Role::Controller, false))
        .await
        .unwrap();

    // target = ceil(6 / 2) = 3; D is the only healthy destination even past its cap
    assert_eq!(report.total_switched, 3);
    assert_eq!(report.entry("z1", B).unwrap().after, 0);
    assert_eq!(report.entry("z1", C).unwrap().after, 0);
    assert_eq!(report.entry("z1", D).unwrap().after, 3);
    assert!((4..=6).all(|id| store.agent(id).unwrap().controller_ip == D));
}

#[tokio::test]
async fn test_drains_unhealthy_node() {
    let mut data = FleetData::default();
    data.add_az("z1", "r1")
        .add_node(Role::Controller, make_node(A, NodeState::Maintenance, 10))
        .add_node(Role::Controller, make_node(B, NodeState::Complete, 10))
        .add_node(Role::Controller, make_node(C, NodeState::Complete, 10));
    for ip in [A, B, C] {
        data.bind(Role::Controller, ZoneBinding::az(ip, "z1"));
    }
    for id in 1..=6 {
        data.add_agent(make_agent(id, "z1", A, ""));
    }
    let store = Arc::new(MemoryFleetStore::from_data(data));

    let report = make_rebalancer(store.clone())
        .rebalance(RebalanceRequest::new(Role::Controller, false))
        .await
        .unwrap();

    // target = ceil(6 / 2) = 3; agents 4..=6 leave A
    assert_eq!(report.total_switched, 3);
    assert_eq!(report.entry("z1", A).unwrap().after, 3);
    assert!((4..=6).all(|id| store.agent(id).unwrap().controller_ip != A));
}

#[tokio::test]
async fn test_region_binding_serves_every_az_with_per_az_headroom() {
    let mut data = FleetData::default();
    data.add_az("z1", "r1")
        .add_az("z2", "r1")
        .add_az("z3", "r2")
        .add_node(Role::Controller, make_node(A, NodeState::Complete, 10))
        .add_node(Role::Controller, make_node(B, NodeState::Complete, 10))
        .bind(Role::Controller, ZoneBinding::az(A, "z1"))
        .bind(Role::Controller, ZoneBinding::region(B, "r1"));
    for id in 1..=6 {
        data.add_agent(make_agent(id, "z1", A, ""));
    }
    data.add_agent(make_agent(7, "z2", B, ""))
        .add_agent(make_agent(8, "z2", B, ""))
        // z3 has no serving node
        .add_agent(make_agent(9, "z3", A, ""));
    let store = Arc::new(MemoryFleetStore::from_data(data));

    let report = make_rebalancer(store.clone())
        .rebalance(RebalanceRequest::new(Role::Controller, false))
        .await
        .unwrap();

    assert_eq!(report.total_switched, 3);
    let keys: Vec<(&str, &str)> = report
        .details
        .iter()
        .map(|e| (e.az.as_str(), e.ip.as_str()))
        .collect();
    assert_eq!(keys, vec![("z1", A), ("z1", B), ("z2", B)]);

    // B's z2 agents do not count against its z1 headroom
    let z1_b = report.entry("z1", B).unwrap();
    assert_eq!((z1_b.before, z1_b.after), (0, 3));
    let z2_b = report.entry("z2", B).unwrap();
    assert_eq!((z2_b.before, z2_b.after, z2_b.switched), (2, 2, 0));

    assert_eq!(store.agent(9).unwrap().controller_ip, A);
}

#[tokio::test]
async fn test_agents_on_unknown_nodes_count_toward_target() {
    let mut data = FleetData::default();
    data.add_az("z1", "r1")
        .add_node(Role::Controller, make_node(A, NodeState::Complete, 10))
        .add_node(Role::Controller, make_node(B, NodeState::Complete, 10))
        .bind(Role::Controller, ZoneBinding::az(A, "z1"))
        .bind(Role::Controller, ZoneBinding::az(B, "z1"));
    for id in 1..=3 {
        data.add_agent(make_agent(id, "z1", A, ""));
    }
    data.add_agent(make_agent(4, "z1", "10.9.9.9", ""));
    let store = Arc::new(MemoryFleetStore::from_data(data));

    let report = make_rebalancer(store.clone())
        .rebalance(RebalanceRequest::new(Role::Controller, false))
        .await
        .unwrap();

    // target = ceil(4 / 2) = 2
    assert_eq!(report.total_switched, 1);
    assert_eq!(report.details.len(), 2);
    assert_eq!(store.agent(3).unwrap().controller_ip, B);
    assert_eq!(store.agent(4).unwrap().controller_ip, "10.9.9.9");
}

#[tokio::test]
async fn test_conservation_per_az() {
    let mut data = FleetData::default();
    data.add_az("z1", "r1").add_az("z2", "r1");
    for (ip, cap) in [(A, 3), (B, 20), (C, 5)] {
        data.add_node(Role::Controller, make_node(ip, NodeState::Complete, cap))
            .bind(Role::Controller, ZoneBinding::region(ip, "r1"));
    }
    for id in 1..=9 {
        data.add_agent(make_agent(id, "z1", A, ""));
    }
    for id in 10..=14 {
        data.add_agent(make_agent(id, "z2", C, ""));
    }
    let store = Arc::new(MemoryFleetStore::from_data(data));

    let report = make_rebalancer(store.clone())
        .rebalance(RebalanceRequest::new(Role::Controller, true))
        .await
        .unwrap();

    for (az, (before, after)) in before_after_sums(&report) {
        assert_eq!(before, after, "agent count changed in {}", az);
    }
    let switched: u32 = report.details.iter().map(|e| e.switched).sum();
    assert_eq!(switched, 2 * report.total_switched);
}

#[tokio::test]
async fn test_partial_commit_reports_every_failure() {
    let store = Arc::new(MemoryFleetStore::from_data(make_spread_data()));
    store.fail_writes_for(3);

    let err = make_rebalancer(store.clone())
        .rebalance(RebalanceRequest::new(Role::Controller, false))
        .await
        .unwrap_err();

    match err {
        RebalanceError::PartialCommit { applied, failures } => {
            assert_eq!(applied, 1);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].agent_id, 3);
            assert_eq!(failures[0].to, B);
        }
        other => panic!("unexpected error: {}", other),
    }

    // The remaining move still went through
    assert_eq!(store.agent(3).unwrap().controller_ip, A);
    assert_eq!(store.agent(4).unwrap().controller_ip, C);
}

#[tokio::test]
async fn test_no_usable_nodes() {
    let mut data = FleetData::default();
    data.add_az("z1", "r1")
        .add_node(Role::Analyzer, make_node(A, NodeState::Exception, 10))
        .add_node(Role::Analyzer, make_node(B, NodeState::Complete, 0))
        .bind(Role::Analyzer, ZoneBinding::az(A, "z1"))
        .add_agent(make_agent(1, "z1", "", A));
    let store = Arc::new(MemoryFleetStore::from_data(data));

    let err = make_rebalancer(store)
        .rebalance(RebalanceRequest::new(Role::Analyzer, false))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RebalanceError::NoHealthyNodes {
            role: Role::Analyzer
        }
    ));
}

#[tokio::test]
async fn test_unsupported_algorithm_fails_before_reading() {
    let mut config = RebalancerConfig::default();
    config.strategy.algorithm = "round-robin".to_string();
    let rebalancer = Rebalancer::new(Arc::new(UnreadableStore), config);

    let err = rebalancer
        .rebalance(RebalanceRequest::new(Role::Analyzer, true))
        .await
        .unwrap_err();
    assert!(matches!(err, RebalanceError::UnsupportedStrategy(ref name) if name == "round-robin"));

    // Controllers ignore the analyzer algorithm and go straight to the store
    let err = rebalancer
        .rebalance(RebalanceRequest::new(Role::Controller, true))
        .await
        .unwrap_err();
    assert!(matches!(err, RebalanceError::Store(StoreError::Invalid(_))));
}

#[tokio::test]
async fn test_traffic_strategy_without_implementation() {
    let mut config = RebalancerConfig::default();
    config.strategy.algorithm = "by-ingested-data".to_string();
    let rebalancer = Rebalancer::new(Arc::new(UnreadableStore), config);

    let err = rebalancer
        .rebalance(RebalanceRequest::new(Role::Analyzer, false))
        .await
        .unwrap_err();
    assert!(matches!(err, RebalanceError::StrategyUnavailable(_)));
}

#[tokio::test]
async fn test_traffic_strategy_is_delegated() {
    let mut config = RebalancerConfig::default();
    config.strategy.algorithm = "by-ingested-data".to_string();
    config.strategy.data_duration = Duration::from_secs(120);

    let traffic = Arc::new(RecordingTraffic::default());
    let rebalancer = Rebalancer::new(Arc::new(UnreadableStore), config)
        .with_traffic_rebalancer(traffic.clone());

    let report = rebalancer
        .rebalance(RebalanceRequest::new(Role::Analyzer, true))
        .await
        .unwrap();
    assert_eq!(report.total_switched, 7);
    assert_eq!(
        *traffic.calls.lock().unwrap(),
        vec![(true, Duration::from_secs(120))]
    );
}

#[tokio::test]
async fn test_traffic_strategy_failure() {
    let mut config = RebalancerConfig::default();
    config.strategy.algorithm = "by-ingested-data".to_string();

    let traffic = Arc::new(RecordingTraffic {
        fail: true,
        ..Default::default()
    });
    let rebalancer = Rebalancer::new(Arc::new(UnreadableStore), config)
        .with_traffic_rebalancer(traffic);

    let err = rebalancer
        .rebalance(RebalanceRequest::new(Role::Analyzer, false))
        .await
        .unwrap_err();
    assert!(matches!(err, RebalanceError::Traffic(ref msg) if msg == "traffic metrics unavailable"));
}

#[tokio::test]
async fn test_concurrent_runs_for_one_role_are_serialized() {
    let inner = Arc::new(MemoryFleetStore::from_data(make_spread_data()));
    let store = Arc::new(YieldingStore {
        inner: inner.clone(),
    });
    let rebalancer = Arc::new(Rebalancer::new(store, RebalancerConfig::default()));

    let first = tokio::spawn({
        let rebalancer = rebalancer.clone();
        async move {
            rebalancer
                .rebalance(RebalanceRequest::new(Role::Controller, false))
                .await
        }
    });
    let second = tokio::spawn({
        let rebalancer = rebalancer.clone();
        async move {
            rebalancer
                .rebalance(RebalanceRequest::new(Role::Controller, false))
                .await
        }
    });

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    // An unserialized second run would plan from the same stale snapshot and
    // write both moves again
    let mut switched = vec![first.total_switched, second.total_switched];
    switched.sort();
    assert_eq!(switched, vec![0, 2]);
    assert_eq!(inner.writes(), 2);
}

#[tokio::test]
async fn test_controller_and_analyzer_runs_overlap() {
    let inner = Arc::new(MemoryFleetStore::from_data(make_spread_data()));
    let store = Arc::new(YieldingStore {
        inner: inner.clone(),
    });
    let rebalancer = Rebalancer::new(store, RebalancerConfig::default());

    let (controller, analyzer) = tokio::join!(
        rebalancer.rebalance(RebalanceRequest::new(Role::Controller, false)),
        rebalancer.rebalance(RebalanceRequest::new(Role::Analyzer, false)),
    );

    assert_eq!(controller.unwrap().total_switched, 2);
    assert_eq!(analyzer.unwrap().total_switched, 2);
    assert_eq!(inner.writes(), 4);
    assert_eq!(inner.agent(4).unwrap().controller_ip, C);
    assert_eq!(inner.agent(4).unwrap().analyzer_ip, C);
}
