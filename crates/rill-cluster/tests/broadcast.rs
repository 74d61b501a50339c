use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use rill_cluster::{
    BroadcastController, ClusterError, ControlApi, LocalCluster, NodeMessage, NodeService,
    Transport, TransportError,
    ops::{
        ChangePeriod, ChangePeriodRequest, Lifecycle, LifecycleCommand, LifecycleRequest,
        ListInstances, ListInstancesRequest, PeriodOutcome,
    },
};
use rill_core::{
    InstanceRegistry, InstanceState, ManagedInstance, ManagerConfig,
    testkit::{RecordingSink, ScriptedSource, scripted_router, settings_doc},
};
use rill_model::NodeId;
use serde_json::Value;

struct Cluster {
    transport: LocalCluster,
    registries: Vec<InstanceRegistry>,
}

impl Cluster {
    fn new(nodes: usize) -> Self {
        let transport = LocalCluster::new();
        let registries = (1..=nodes)
            .map(|i| {
                let registry = InstanceRegistry::new();
                transport.join(NodeService::with_default_operations(
                    NodeId::from(format!("node-{i}")),
                    registry.clone(),
                ));
                registry
            })
            .collect();
        Self {
            transport,
            registries,
        }
    }

    fn api(&self) -> ControlApi {
        ControlApi::new(Arc::new(self.transport.clone()))
    }

    /// Configure and start `name` on node `node` (1-based).
    async fn host(&self, node: usize, name: &str, tasks: &[(&str, u64)]) -> Arc<ManagedInstance> {
        let source = ScriptedSource::ok("{}");
        let instance = ManagedInstance::builder(
            name,
            self.registries[node - 1].clone(),
            scripted_router(&source),
            Arc::new(RecordingSink::default()),
        )
        .build();
        instance.configure(&settings_doc(tasks)).await.unwrap();
        instance.start().await.unwrap();
        instance
    }
}

/// Counts deliveries on top of another transport.
struct Counting {
    inner: LocalCluster,
    delivered: AtomicUsize,
}

#[async_trait]
impl Transport for Counting {
    fn nodes(&self) -> Vec<NodeId> {
        self.inner.nodes()
    }

    async fn deliver(&self, node: &NodeId, msg: NodeMessage) -> Result<Value, TransportError> {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        self.inner.deliver(node, msg).await
    }
}

fn names(list: &[&str]) -> Option<Vec<String>> {
    Some(list.iter().map(|s| s.to_string()).collect())
}

#[tokio::test(start_paused = true)]
async fn list_instances_is_the_union_over_nodes() {
    let cluster = Cluster::new(3);
    cluster.host(1, "A", &[("ch", 30_000)]).await;
    cluster.host(1, "B", &[("ch", 30_000)]).await;
    cluster.host(2, "B", &[("ch", 30_000)]).await;
    cluster.host(2, "C", &[("ch", 30_000)]).await;

    let listed = cluster.api().list_instances().await.unwrap();
    let expected: BTreeSet<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
    assert_eq!(listed, expected);
}

#[tokio::test(start_paused = true)]
async fn every_node_answers_with_its_own_names() {
    let cluster = Cluster::new(2);
    cluster.host(2, "es", &[("ch", 30_000)]).await;

    let controller = BroadcastController::new(ListInstances, Arc::new(cluster.transport.clone()));
    let agg = controller.execute(ListInstancesRequest::default()).await.unwrap();

    assert!(agg.is_complete());
    assert_eq!(agg.responses.len(), 2);
    assert_eq!(agg.responses[0].node, NodeId::from("node-1"));
    assert!(agg.responses[0].instances.is_empty());
    assert!(agg.responses[1].instances.contains("es"));
}

#[tokio::test(start_paused = true)]
async fn change_period_reaches_the_hosting_node() {
    let cluster = Cluster::new(3);
    let es = cluster.host(2, "es", &[("ch", 30_000), ("ns", 30_000)]).await;

    cluster
        .api()
        .change_period("es", names(&["ch"]), Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(es.task("ch").await.unwrap().period(), Duration::from_secs(1));
    assert_eq!(es.task("ns").await.unwrap().period(), Duration::from_secs(30));
    assert_eq!(es.active_workers().await, 2);
}

#[tokio::test(start_paused = true)]
async fn change_period_from_raw_input() {
    let cluster = Cluster::new(2);
    let es = cluster.host(1, "es", &[("ch", 30_000), ("ns", 30_000)]).await;

    cluster.api().change_period_raw("es", "ch, ns", "2s").await.unwrap();

    for task in es.tasks().await {
        assert_eq!(task.period(), Duration::from_secs(2));
    }
}

#[tokio::test(start_paused = true)]
async fn missing_instance_and_missing_task_are_told_apart() {
    let cluster = Cluster::new(2);
    cluster.host(1, "es", &[("ch", 30_000)]).await;
    let api = cluster.api();

    let err = api
        .change_period("nope", names(&["ch"]), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::NotFound(ref m) if m == "instance 'nope' not found"));

    let err = api
        .change_period("es", names(&["other"]), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::NotFound(ref m) if m.contains("no task of instance 'es'")));
}

#[tokio::test(start_paused = true)]
async fn change_period_reduce_sees_every_node() {
    let cluster = Cluster::new(3);
    cluster.host(2, "es", &[("ch", 30_000)]).await;
    cluster.host(3, "es", &[("other", 30_000)]).await;

    let controller = BroadcastController::new(ChangePeriod, Arc::new(cluster.transport.clone()));
    let agg = controller
        .execute(ChangePeriodRequest::new("es", names(&["ch"]), Duration::from_secs(1)))
        .await
        .unwrap();

    let flags: Vec<(bool, bool)> = agg
        .responses
        .iter()
        .map(|r| (r.instance_found, r.task_found))
        .collect();
    assert_eq!(flags, vec![(false, false), (true, true), (true, false)]);
    assert_eq!(agg.outcome, PeriodOutcome::Changed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failure_on_the_hosting_node_is_not_reported_as_missing() {
    let cluster = Cluster::new(2);
    let source = ScriptedSource::ok("{}").with_blocking_fetch(Duration::from_millis(600));
    let es = ManagedInstance::builder(
        "es",
        cluster.registries[1].clone(),
        scripted_router(&source),
        Arc::new(RecordingSink::default()),
    )
    .with_config(ManagerConfig {
        task_restart_timeout_ms: 100,
        ..ManagerConfig::default()
    })
    .build();
    es.configure(&settings_doc(&[("ch", 5_000)])).await.unwrap();
    es.start().await.unwrap();
    // the loop is now inside a fetch that ignores cancellation
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = cluster
        .api()
        .change_period("es", names(&["ch"]), Duration::from_secs(1))
        .await
        .unwrap_err();
    match err {
        ClusterError::Rejected(detail) => {
            assert!(detail.contains("node-2"), "{detail}");
            assert!(detail.contains("did not terminate"), "{detail}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(es.task("ch").await.unwrap().period(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn no_task_names_succeeds_without_changes() {
    let cluster = Cluster::new(1);
    let es = cluster.host(1, "es", &[("ch", 30_000)]).await;

    cluster
        .api()
        .change_period("es", None, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(es.task("ch").await.unwrap().period(), Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn blank_target_fails_before_any_delivery() {
    let cluster = Cluster::new(2);
    let counting = Arc::new(Counting {
        inner: cluster.transport.clone(),
        delivered: AtomicUsize::new(0),
    });
    let api = ControlApi::new(counting.clone());

    let err = api
        .change_period("  ", names(&["ch"]), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::InvalidRequest(_)));

    let err = api.stop_instance("").await.unwrap_err();
    assert!(matches!(err, ClusterError::InvalidRequest(_)));

    let err = api
        .change_period("es", names(&["ch"]), Duration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::InvalidRequest(_)));

    assert_eq!(counting.delivered.load(Ordering::SeqCst), 0);

    api.list_instances().await.unwrap();
    assert_eq!(counting.delivered.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn unreachable_node_degrades_to_a_failure_entry() {
    let cluster = Cluster::new(3);
    cluster.host(1, "es", &[("ch", 30_000)]).await;
    cluster.host(3, "hidden", &[("ch", 30_000)]).await;
    cluster
        .transport
        .set_reachable(&NodeId::from("node-3"), false);
    let api = cluster.api();

    let controller = BroadcastController::new(ListInstances, Arc::new(cluster.transport.clone()));
    let agg = controller.execute(ListInstancesRequest::default()).await.unwrap();
    assert_eq!(agg.responses.len(), 2);
    assert_eq!(agg.failures.len(), 1);
    assert_eq!(agg.failures[0].node, NodeId::from("node-3"));
    assert!(!agg.outcome.contains("hidden"));

    api.change_period("es", names(&["ch"]), Duration::from_secs(1))
        .await
        .unwrap();

    let err = api
        .change_period("hidden", names(&["ch"]), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::Incomplete { failed: 1, .. }));

    cluster.transport.set_reachable(&NodeId::from("node-3"), true);
    api.change_period("hidden", names(&["ch"]), Duration::from_secs(1))
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn instance_hosted_twice_is_listed_once_and_changed_everywhere() {
    let cluster = Cluster::new(2);
    let first = cluster.host(1, "es", &[("ch", 30_000)]).await;
    let second = cluster.host(2, "es", &[("ch", 30_000)]).await;
    let api = cluster.api();

    assert_eq!(api.list_instances().await.unwrap().len(), 1);

    api.change_period("es", names(&["ch"]), Duration::from_secs(20))
        .await
        .unwrap();
    assert_eq!(first.task("ch").await.unwrap().period(), Duration::from_secs(20));
    assert_eq!(second.task("ch").await.unwrap().period(), Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn stop_and_restart_by_name() {
    let cluster = Cluster::new(2);
    let es = cluster.host(2, "es", &[("ch", 1_000)]).await;
    let api = cluster.api();

    api.stop_instance("es").await.unwrap();
    assert_eq!(es.state().await, InstanceState::Stopped);
    assert_eq!(es.active_workers().await, 0);
    assert!(api.list_instances().await.unwrap().contains("es"));

    api.restart_instance("es").await.unwrap();
    assert_eq!(es.state().await, InstanceState::Running);
    assert_eq!(es.active_workers().await, 1);

    let err = api.restart_instance("nope").await.unwrap_err();
    assert!(matches!(err, ClusterError::NotFound(ref m) if m == "instance 'nope' not found"));
}

#[tokio::test(start_paused = true)]
async fn node_side_errors_are_reported_as_failures() {
    let cluster = Cluster::new(2);
    let es = cluster.host(1, "es", &[("ch", 1_000)]).await;
    es.stop().await;
    // Unconfigured twin on node 2: restart there fails with an illegal-state error.
    let twin = ManagedInstance::builder(
        "es",
        cluster.registries[1].clone(),
        scripted_router(&ScriptedSource::ok("{}")),
        Arc::new(RecordingSink::default()),
    )
    .build();
    cluster.registries[1].add(twin);

    let api = cluster.api();
    api.restart_instance("es").await.unwrap();
    assert_eq!(es.state().await, InstanceState::Running);

    let controller = BroadcastController::new(Lifecycle, Arc::new(cluster.transport.clone()));
    let agg = controller
        .execute(LifecycleRequest {
            instance: "es".into(),
            command: LifecycleCommand::Restart,
        })
        .await
        .unwrap();
    assert!(agg.outcome);
    assert_eq!(agg.failures.len(), 1);
    assert_eq!(agg.failures[0].node, NodeId::from("node-2"));
}
