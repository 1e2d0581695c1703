//! Integration scenarios from spec.md §8 (S1, S2, S3, S5, S6), driven
//! against `MemoryStore` plus hand-written fakes for the external
//! collaborators (robot state cache, POI resolver, vendor client) —
//! mirroring the teacher's `#[tokio::test]` style in
//! `kernel/stream_hub.rs`/`kernel/jobs/manager.rs`.

use async_trait::async_trait;
use fleet_orchestrator::auto_confirm::AutoConfirmDriver;
use fleet_orchestrator::clock::FixedClock;
use fleet_orchestrator::robots::{PoiResolver, RobotLookup, RobotStateCache};
use fleet_orchestrator::store::memory::MemoryStore;
use fleet_orchestrator::store::models::{NewTask, Position, RobotObservation, RunStatus, TaskKind, TaskStatus};
use fleet_orchestrator::store::Store;
use fleet_orchestrator::vendor::{CancelOutcome, NavigateSpec, VendorClient, VendorTaskState, VendorTaskStatus};
use fleet_orchestrator::Orchestrator;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct OnlineRobots;

#[async_trait]
impl RobotStateCache for OnlineRobots {
    async fn get(&self, _robot_id: &str) -> RobotLookup {
        RobotLookup::Known(RobotObservation {
            online: Some(true),
            charging: Some(false),
            emergency_stop: Some(false),
            position: None,
            fresh_as_of: None,
        })
    }
}

struct FixedPoi;

#[async_trait]
impl PoiResolver for FixedPoi {
    async fn resolve(&self, _target_kind: &str, _target_ref: &str) -> Option<Position> {
        Some(Position { area_id: "DINING".into(), x: 1.0, y: 1.0, yaw: 0.0 })
    }
}

/// Vendor whose `create`/`state` responses are scripted in advance, one
/// queued response per call; `cancel` just counts invocations.
#[derive(Default)]
struct ScriptedVendor {
    create_results: Mutex<VecDeque<Result<String, String>>>,
    state_results: Mutex<VecDeque<Result<VendorTaskStatus, String>>>,
    cancels: Mutex<Vec<String>>,
    refuse_create: bool,
}

#[async_trait]
impl VendorClient for ScriptedVendor {
    async fn create(&self, _spec: &NavigateSpec) -> Result<String, String> {
        if self.refuse_create {
            return Err("safe mode: vendor create refused".to_string());
        }
        self.create_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("vendor-task-default".to_string()))
    }

    async fn state(&self, _vendor_task_id: &str) -> Result<VendorTaskStatus, String> {
        self.state_results.lock().unwrap().pop_front().unwrap_or(Ok(VendorTaskStatus {
            state: VendorTaskState::Running,
            reason: None,
        }))
    }

    async fn cancel(&self, vendor_task_id: &str) -> CancelOutcome {
        self.cancels.lock().unwrap().push(vendor_task_id.to_string());
        CancelOutcome { ok: true, note: None }
    }
}

fn build_orchestrator(vendor: Arc<ScriptedVendor>) -> (Orchestrator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
    let orchestrator = Orchestrator::new(
        store.clone(),
        vendor,
        vec!["R1".to_string()],
        Arc::new(OnlineRobots),
        Arc::new(FixedPoi),
        clock,
    );
    (orchestrator, store)
}

#[tokio::test]
async fn s1_happy_path_delivery_reaches_done() {
    let vendor = Arc::new(ScriptedVendor {
        create_results: Mutex::new(VecDeque::from([Ok("vendor-1".to_string())])),
        state_results: Mutex::new(VecDeque::from([Ok(VendorTaskStatus {
            state: VendorTaskState::Done,
            reason: None,
        })])),
        cancels: Mutex::new(Vec::new()),
        refuse_create: false,
    });
    let (orchestrator, store) = build_orchestrator(vendor);

    let now = chrono::Utc::now();
    let task = store
        .insert_task(
            NewTask::builder().kind(TaskKind::Delivery).title("deliver").target_kind("TABLE").target_ref("5").build(),
            now,
        )
        .await
        .unwrap();

    let summary = orchestrator.tick(Some(1), None).await.unwrap();
    // The task has no `release_at`, so it is inserted straight into READY —
    // nothing for `promote_due` to do on this tick.
    assert_eq!(summary.promoted, 0);
    assert_eq!(summary.assigned, 1);

    let run = store.get_run_for_task(task.id).await.unwrap().expect("run exists");
    let run_id = run.id;
    assert_eq!(run.current_step_index, 0);

    let executor = orchestrator.executor();
    let auto_confirm = AutoConfirmDriver::new(store.clone(), executor, std::time::Duration::from_secs(1));

    // DELIVERY_LOADED
    auto_confirm.sweep().await.unwrap();
    // NAVIGATE: first advance creates the vendor task.
    orchestrator.tick(Some(0), None).await.unwrap();
    // NAVIGATE: second advance polls and observes DONE.
    orchestrator.tick(Some(0), None).await.unwrap();
    // DELIVERY_ARRIVED, then DELIVERY_HANDED_OFF.
    auto_confirm.sweep().await.unwrap();
    auto_confirm.sweep().await.unwrap();

    let still_running = store.get_run_for_task(task.id).await.unwrap();
    assert!(still_running.is_none(), "no RUNNING run remains once the workflow is DONE");
    let run = store.get_run(run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Done);
    let task = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Done);
    assert_eq!(
        task.assigned_robot_id, None,
        "a DONE task must not retain assigned_robot_id (spec §3 invariant i)"
    );
}

#[tokio::test]
async fn s2_raced_claim_only_one_side_wins() {
    let vendor = Arc::new(ScriptedVendor::default());
    let store = Arc::new(MemoryStore::new());
    let clock: Arc<dyn fleet_orchestrator::clock::Clock> = Arc::new(FixedClock::new(chrono::Utc::now()));
    let engine = Arc::new(fleet_orchestrator::assignment::AssignmentEngine::new(
        store.clone(),
        vec!["R1".to_string()],
        Arc::new(OnlineRobots),
        Arc::new(FixedPoi),
        clock,
        fleet_orchestrator::events::EventBus::new(),
    ));
    let now = chrono::Utc::now();
    store
        .insert_task(
            NewTask::builder().kind(TaskKind::Ordering).title("order").target_kind("TABLE").target_ref("2").build(),
            now,
        )
        .await
        .unwrap();

    // Two concurrent assignment attempts racing for the same single
    // ready task and the same single robot; the in-memory store's
    // atomic conditional claim must let exactly one side through.
    let a = engine.clone();
    let b = engine.clone();
    let (first, second) = tokio::join!(
        async move { a.assign_next(None).await.unwrap() },
        async move { b.assign_next(None).await.unwrap() }
    );

    let outcomes = [first, second];
    let assigned_count = outcomes.iter().filter(|o| o.assigned).count();
    assert_eq!(assigned_count, 1, "exactly one side should win the race");
    let loser = outcomes.iter().find(|o| !o.assigned).unwrap();
    assert!(loser.reason.as_deref() == Some("raced") || loser.reason.as_deref() == Some("no ready tasks"));
}

#[tokio::test]
async fn s3_vendor_failed_fails_run_and_keeps_task_assigned() {
    let vendor = Arc::new(ScriptedVendor {
        create_results: Mutex::new(VecDeque::from([Ok("vendor-1".to_string())])),
        state_results: Mutex::new(VecDeque::from([Ok(VendorTaskStatus {
            state: VendorTaskState::Failed,
            reason: Some("vendor gave up".to_string()),
        })])),
        cancels: Mutex::new(Vec::new()),
        refuse_create: false,
    });
    let (orchestrator, store) = build_orchestrator(vendor);
    let now = chrono::Utc::now();
    let task = store
        .insert_task(
            NewTask::builder().kind(TaskKind::Navigate).title("nav").target_kind("AREA").target_ref("DOCK").build(),
            now,
        )
        .await
        .unwrap();

    orchestrator.tick(Some(1), None).await.unwrap();
    orchestrator.tick(Some(0), None).await.unwrap(); // create
    orchestrator.tick(Some(0), None).await.unwrap(); // poll -> FAILED

    let task = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Assigned);
}

#[tokio::test]
async fn s5_safe_mode_fails_navigate_create_immediately() {
    let vendor = Arc::new(ScriptedVendor {
        create_results: Mutex::new(VecDeque::new()),
        state_results: Mutex::new(VecDeque::new()),
        cancels: Mutex::new(Vec::new()),
        refuse_create: true,
    });
    let (orchestrator, store) = build_orchestrator(vendor);
    let now = chrono::Utc::now();
    let task = store
        .insert_task(
            NewTask::builder().kind(TaskKind::Navigate).title("nav").target_kind("AREA").target_ref("DOCK").build(),
            now,
        )
        .await
        .unwrap();

    orchestrator.tick(Some(1), None).await.unwrap();
    orchestrator.tick(Some(0), None).await.unwrap(); // create refused -> FAILED

    let run = store.get_run_for_task(task.id).await.unwrap();
    assert!(run.is_none());
    let task = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Assigned);
}

#[tokio::test]
async fn s6_cancellation_preempts_in_flight_navigate() {
    let vendor = Arc::new(ScriptedVendor {
        create_results: Mutex::new(VecDeque::from([Ok("vendor-1".to_string())])),
        state_results: Mutex::new(VecDeque::from([Ok(VendorTaskStatus {
            state: VendorTaskState::Running,
            reason: None,
        })])),
        cancels: Mutex::new(Vec::new()),
        refuse_create: false,
    });
    let (orchestrator, store) = build_orchestrator(vendor.clone());
    let now = chrono::Utc::now();
    let task = store
        .insert_task(
            NewTask::builder().kind(TaskKind::Navigate).title("nav").target_kind("AREA").target_ref("DOCK").build(),
            now,
        )
        .await
        .unwrap();

    orchestrator.tick(Some(1), None).await.unwrap();
    orchestrator.tick(Some(0), None).await.unwrap(); // create -> vendor_task_id set

    let run = store.get_run_for_task(task.id).await.unwrap().expect("run exists");
    let canceled = orchestrator.cancel_run(run.id, Some("operator request".to_string())).await.unwrap();
    assert!(canceled);

    let run = store.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Canceled);
    let task = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Canceled);
    assert_eq!(
        task.assigned_robot_id, None,
        "a CANCELED task must not retain assigned_robot_id (spec §3 invariant i)"
    );
    assert_eq!(vendor.cancels.lock().unwrap().len(), 1);
}

/// `MemoryStore::update_task`/`cancel_task` assert the same
/// `assigned_robot_id`/`status` biconditional Postgres enforces via
/// `assigned_robot_requires_assigned_status` — a DONE/CANCELED task with a
/// dangling `assigned_robot_id` must panic here exactly as it would be
/// rejected by the real schema.
#[tokio::test]
#[should_panic(expected = "assigned_robot_requires_assigned_status")]
async fn done_task_with_dangling_robot_id_violates_the_store_invariant() {
    let store = MemoryStore::new();
    let now = chrono::Utc::now();
    let task = store
        .insert_task(
            NewTask::builder().kind(TaskKind::Navigate).title("nav").target_kind("AREA").target_ref("DOCK").build(),
            now,
        )
        .await
        .unwrap();
    store.claim_task(task.id, "R1", now).await.unwrap();

    let mut task = store.get_task(task.id).await.unwrap().unwrap();
    task.status = TaskStatus::Done; // deliberately leave assigned_robot_id set
    store.update_task(&task).await.unwrap();
}
