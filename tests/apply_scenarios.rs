//! End-to-end plan and apply scenarios against the simulated provider.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use strata::error::{GraphError, PlanError, StrataError};
use strata::planner::{Action, PlanOptions, cancellation};
use strata::provider::{Operation, SimulatedProvider};
use strata::resource::{Deployment, ResourceNode, Value, catalog};
use strata::state::{MemoryStateStore, StateStore};
use strata::topology::{TopologyParams, web_server};
use strata::{CancelSignal, Engine, EngineConfig};

type TestEngine = Engine<SimulatedProvider, MemoryStateStore>;

fn engine_with(provider: SimulatedProvider, config: EngineConfig) -> TestEngine {
    Engine::new(Arc::new(provider), Arc::new(MemoryStateStore::new()), config)
        .with_holder("integration-tests")
}

fn engine() -> TestEngine {
    engine_with(SimulatedProvider::new(), EngineConfig::new("scenarios"))
}

fn network() -> ResourceNode {
    ResourceNode::new("network", "net").with_property("cidr", "10.0.0.0/16")
}

fn subnet() -> ResourceNode {
    ResourceNode::new("subnet", "subnet")
        .with_property("network_id", Value::id_of("network"))
        .with_property("cidr", "10.0.1.0/24")
}

fn instance() -> ResourceNode {
    ResourceNode::new("instance", "instance").with_property("subnet_id", Value::id_of("subnet"))
}

fn three_tier() -> Deployment {
    Deployment::new("three-tier")
        .with_node(network())
        .with_node(subnet())
        .with_node(instance())
}

async fn apply(engine: &TestEngine, deployment: &Deployment) -> strata::ApplyReport {
    engine
        .apply(deployment, &PlanOptions::default(), &CancelSignal::never())
        .await
        .unwrap()
}

#[tokio::test]
async fn empty_state_creates_in_dependency_order() {
    let engine = engine();
    let changes = engine
        .plan(&three_tier(), &PlanOptions::default())
        .await
        .unwrap();

    assert_eq!(
        changes.actions(),
        vec![
            (Action::Create, "network"),
            (Action::Create, "subnet"),
            (Action::Create, "instance"),
        ]
    );

    let report = apply(&engine, &three_tier()).await;
    assert!(report.is_success());
    assert_eq!(report.applied_names(), vec!["network", "subnet", "instance"]);
    assert_eq!(engine.store().len().await, 3);
}

#[tokio::test]
async fn removed_declarations_delete_dependents_first() {
    let engine = engine();
    apply(&engine, &three_tier()).await;

    let remaining = Deployment::new("three-tier").with_node(network());
    let changes = engine
        .plan(&remaining, &PlanOptions::default())
        .await
        .unwrap();
    assert_eq!(
        changes.actions(),
        vec![(Action::Delete, "instance"), (Action::Delete, "subnet")]
    );

    let report = apply(&engine, &remaining).await;
    assert_eq!(report.applied_names(), vec!["instance", "subnet"]);
    assert_eq!(report.unchanged, vec!["network"]);

    let names: Vec<String> = engine
        .store()
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.logical_name)
        .collect();
    assert_eq!(names, vec!["network"]);
    assert_eq!(engine.provider().resource_count().await, 1);
}

#[tokio::test]
async fn root_failure_skips_everything_and_writes_no_state() {
    let provider = SimulatedProvider::new();
    provider.fail_on(Operation::Create, "net").await;
    let engine = engine_with(provider, EngineConfig::new("scenarios"));

    let report = apply(&engine, &three_tier()).await;

    assert_eq!(report.failed_names(), vec!["network"]);
    assert_eq!(report.skipped_names(), vec!["subnet", "instance"]);
    assert!(report.applied.is_empty());
    assert_eq!(engine.store().write_count(), 0);
    assert!(engine.store().is_empty().await);
}

#[tokio::test]
async fn failure_spares_ancestors_and_independent_branches() {
    let provider = SimulatedProvider::new();
    provider.fail_on(Operation::Create, "subnet").await;
    let engine = engine_with(provider, EngineConfig::new("scenarios"));
    let deployment = three_tier().with_node(ResourceNode::new("bucket", "bucket"));

    let report = apply(&engine, &deployment).await;

    assert_eq!(report.applied_names(), vec!["network", "bucket"]);
    assert_eq!(report.failed_names(), vec!["subnet"]);
    assert_eq!(report.skipped_names(), vec!["instance"]);
    assert!(report.skipped[0].reason.contains("subnet"));

    engine.provider().clear_failures().await;
    let retry = engine
        .plan(&deployment, &PlanOptions::default())
        .await
        .unwrap();
    assert_eq!(
        retry.actions(),
        vec![(Action::Create, "subnet"), (Action::Create, "instance")]
    );

    let report = apply(&engine, &deployment).await;
    assert!(report.is_success());
    assert_eq!(report.unchanged, vec!["network", "bucket"]);
}

#[tokio::test]
async fn apply_then_replan_is_empty() {
    let engine = engine().with_schema(catalog::network());
    let deployment = web_server(&TopologyParams::default());

    let report = apply(&engine, &deployment).await;
    assert!(report.is_success());
    assert_eq!(report.applied.len(), 7);

    let changes = engine
        .plan(&deployment, &PlanOptions::default())
        .await
        .unwrap();
    assert!(changes.is_empty());
    assert_eq!(changes.count(Action::NoOp), 7);

    let writes = engine.store().write_count();
    let again = apply(&engine, &deployment).await;
    assert!(again.applied.is_empty());
    assert_eq!(engine.store().write_count(), writes);
    assert_eq!(again.outputs, report.outputs);
}

#[tokio::test]
async fn property_change_updates_in_place() {
    let engine = engine();
    apply(&engine, &three_tier()).await;
    let before = engine.store().get("subnet").await.unwrap().unwrap();

    let changed = Deployment::new("three-tier")
        .with_node(network())
        .with_node(subnet().with_property("cidr", "10.0.2.0/24"))
        .with_node(instance());
    let changes = engine
        .plan(&changed, &PlanOptions::default())
        .await
        .unwrap();
    assert_eq!(changes.actions(), vec![(Action::Update, "subnet")]);
    assert_eq!(changes.changes()[0].details[0].field, "cidr");

    apply(&engine, &changed).await;
    let after = engine.store().get("subnet").await.unwrap().unwrap();
    assert_eq!(after.provider_id, before.provider_id);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.outputs["cidr"], json!("10.0.2.0/24"));
}

#[tokio::test]
async fn type_change_recreates_dependents_around_replacement() {
    let engine = engine();
    apply(&engine, &three_tier()).await;
    let old_network = engine.store().get("network").await.unwrap().unwrap();
    let old_subnet = engine.store().get("subnet").await.unwrap().unwrap();

    let mut replaced = network();
    replaced.resource_type = "net_v2".into();
    let deployment = Deployment::new("three-tier")
        .with_node(replaced)
        .with_node(subnet())
        .with_node(instance());

    let changes = engine
        .plan(&deployment, &PlanOptions::default())
        .await
        .unwrap();
    assert_eq!(
        changes.actions(),
        vec![
            (Action::Delete, "instance"),
            (Action::Delete, "subnet"),
            (Action::Delete, "network"),
            (Action::Create, "network"),
            (Action::Create, "subnet"),
            (Action::Create, "instance"),
        ]
    );

    let report = apply(&engine, &deployment).await;
    assert!(report.is_success());

    let new_network = engine.store().get("network").await.unwrap().unwrap();
    let new_subnet = engine.store().get("subnet").await.unwrap().unwrap();
    assert_ne!(new_network.provider_id, old_network.provider_id);
    assert_ne!(new_subnet.provider_id, old_subnet.provider_id);
    assert_eq!(new_network.resource_type.as_str(), "net_v2");
    assert_eq!(new_subnet.outputs["network_id"], json!(new_network.provider_id));
    assert!(
        engine
            .provider()
            .resource(&old_network.provider_id)
            .await
            .is_none()
    );
    assert_eq!(engine.provider().resource_count().await, 3);
}

#[tokio::test]
async fn added_depends_on_orders_later_destroy() {
    let engine = engine();
    let loose = Deployment::new("pair")
        .with_node(ResourceNode::new("alpha", "thing"))
        .with_node(ResourceNode::new("zeta", "thing"));
    apply(&engine, &loose).await;

    let pinned = Deployment::new("pair")
        .with_node(ResourceNode::new("alpha", "thing"))
        .with_node(ResourceNode::new("zeta", "thing").with_depends_on("alpha"));
    let changes = engine.plan(&pinned, &PlanOptions::default()).await.unwrap();
    assert!(changes.is_empty());

    let report = apply(&engine, &pinned).await;
    assert!(report.applied.is_empty());
    let zeta = engine.store().get("zeta").await.unwrap().unwrap();
    assert!(zeta.dependencies.contains("alpha"));

    let teardown = engine.destroy(&CancelSignal::never()).await.unwrap();
    assert_eq!(teardown.applied_names(), vec!["zeta", "alpha"]);
}

#[tokio::test]
async fn targeted_destroy() {
    let engine = engine();
    apply(&engine, &three_tier()).await;

    let err = engine
        .plan(&three_tier(), &PlanOptions::default().with_destroy("network"))
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::Plan(PlanError::Conflict { .. })));
    assert!(err.is_fatal_to_planning());

    let options = PlanOptions::default().with_destroy("instance");
    let changes = engine.plan(&three_tier(), &options).await.unwrap();
    assert_eq!(changes.actions(), vec![(Action::Delete, "instance")]);

    let report = engine
        .apply(&three_tier(), &options, &CancelSignal::never())
        .await
        .unwrap();
    assert_eq!(report.applied_names(), vec!["instance"]);
    assert!(engine.store().get("instance").await.unwrap().is_none());
}

#[tokio::test]
async fn cycles_and_unknown_references_are_rejected() {
    let engine = engine();

    let cyclic = Deployment::new("cyclic")
        .with_node(ResourceNode::new("a", "thing").with_property("b", Value::id_of("b")))
        .with_node(ResourceNode::new("b", "thing").with_property("a", Value::id_of("a")));
    let err = engine
        .plan(&cyclic, &PlanOptions::default())
        .await
        .unwrap_err();
    match err {
        StrataError::Graph(GraphError::Cycle { cycle }) => {
            assert_eq!(cycle, vec!["a", "b", "a"]);
        }
        other => panic!("expected cycle, got {other}"),
    }

    let dangling = Deployment::new("dangling")
        .with_node(ResourceNode::new("a", "thing").with_property("x", Value::id_of("ghost")));
    let err = engine
        .plan(&dangling, &PlanOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StrataError::Graph(GraphError::UnknownReference { ref target, .. }) if target == "ghost"
    ));
    assert_eq!(engine.provider().calls().await.len(), 0);
}

#[tokio::test]
async fn cancellation_lets_in_flight_calls_finish() {
    let provider = SimulatedProvider::new().with_latency(Duration::from_millis(150));
    let engine = engine_with(provider, EngineConfig::new("scenarios"));
    let (handle, signal) = cancellation();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.cancel();
    });

    let report = engine
        .apply(&three_tier(), &PlanOptions::default(), &signal)
        .await
        .unwrap();
    canceller.await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.applied_names(), vec!["network"]);
    assert_eq!(report.skipped_names(), vec!["subnet", "instance"]);
    assert!(report.skipped.iter().all(|s| s.reason == "run cancelled"));
    assert!(engine.store().get("network").await.unwrap().is_some());
    assert!(!engine.store().is_locked().await.unwrap());
}

#[tokio::test]
async fn state_write_failure_requires_reconciliation() {
    let engine = engine();
    engine.store().fail_writes_for("subnet").await;

    let err = engine
        .apply(&three_tier(), &PlanOptions::default(), &CancelSignal::never())
        .await
        .unwrap_err();

    assert!(err.requires_manual_reconciliation());
    assert!(err.to_string().contains("manual reconciliation may be needed"));
    assert!(err.to_string().contains("subnet"));
    assert!(engine.store().get("network").await.unwrap().is_some());
    assert!(engine.store().get("subnet").await.unwrap().is_none());
    assert_eq!(engine.provider().resource_count().await, 2);
    assert_eq!(engine.provider().call_count(Operation::Create).await, 2);
}

#[tokio::test]
async fn parallelism_is_bounded_by_config() {
    let provider = SimulatedProvider::new().with_latency(Duration::from_millis(25));
    let engine = engine_with(provider, EngineConfig::new("wide").with_parallelism(2));
    let mut deployment = Deployment::new("wide");
    for i in 0..10 {
        deployment = deployment.with_node(ResourceNode::new(format!("bucket-{i}"), "bucket"));
    }

    let report = apply(&engine, &deployment).await;

    assert_eq!(report.applied.len(), 10);
    assert!(engine.provider().max_concurrency() <= 2);
    assert!(engine.provider().max_concurrency() >= 1);
}

#[tokio::test]
async fn web_server_exports_public_ip_and_resolves_references() {
    let engine = engine().with_schema(catalog::network());
    let report = apply(&engine, &web_server(&TopologyParams::default())).await;

    let public_ip = report.outputs["public_ip"].as_str().unwrap();
    assert!(public_ip.starts_with("203.0.113."));

    let store = engine.store();
    let provider = engine.provider();
    let igw = store.get("igw").await.unwrap().unwrap();
    let sec_group = store.get("sec_group").await.unwrap().unwrap();
    let route_table = store.get("route_table").await.unwrap().unwrap();
    let instance = store.get("instance").await.unwrap().unwrap();

    let sent = provider.resource(&route_table.provider_id).await.unwrap();
    assert_eq!(
        sent.properties["routes"],
        json!([{ "cidr_block": "0.0.0.0/0", "gateway_id": igw.provider_id }])
    );

    let sent = provider.resource(&instance.provider_id).await.unwrap();
    assert_eq!(
        sent.properties["vpc_security_group_ids"],
        json!([sec_group.provider_id])
    );
    assert_eq!(sent.properties["instance_type"], json!("t2.micro"));
    assert_eq!(instance.attribute("public_ip"), Some(json!(public_ip)));
}

#[tokio::test]
async fn drift_reports_resources_deleted_outside_the_engine() {
    let engine = engine();
    apply(&engine, &three_tier()).await;
    assert!(engine.check_drift().await.unwrap().is_converged());

    let instance = engine.store().get("instance").await.unwrap().unwrap();
    assert!(engine.provider().forget(&instance.provider_id).await);

    let report = engine.check_drift().await.unwrap();
    assert!(report.has_drift());
    assert_eq!(report.missing, vec!["instance"]);
    assert!(report.changed.is_empty());
}

#[tokio::test]
async fn destroy_removes_everything_in_reverse_order() {
    let engine = engine().with_schema(catalog::network());
    apply(&engine, &web_server(&TopologyParams::default())).await;

    let report = engine.destroy(&CancelSignal::never()).await.unwrap();

    assert!(report.is_success());
    let order = report.applied_names();
    let position = |name: &str| order.iter().position(|n| *n == name).unwrap();
    assert!(position("instance") < position("subnet"));
    assert!(position("instance") < position("sec_group"));
    assert!(position("route_table_assoc") < position("route_table"));
    assert!(position("igw") < position("main"));
    assert_eq!(order.last(), Some(&"main"));
    assert!(engine.store().is_empty().await);
    assert_eq!(engine.provider().resource_count().await, 0);
}

#[tokio::test]
async fn lock_held_elsewhere_blocks_apply() {
    let engine = engine();
    let lock = engine.store().acquire_lock("other-host").await.unwrap();

    let err = engine
        .apply(&three_tier(), &PlanOptions::default(), &CancelSignal::never())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("other-host"));

    engine.store().release_lock(&lock.lock_id).await.unwrap();
    let report = apply(&engine, &three_tier()).await;
    assert!(report.is_success());
}
