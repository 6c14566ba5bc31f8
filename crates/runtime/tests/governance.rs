use std::sync::Arc;
use std::time::Duration;

use sheet_core::{
    AttrPath, AttributeSet, Derivation, DerivationError, Entity, EntityId, EntityKind,
    MutationPlan, OwnedRecord, RecordId, RecordKind, Resolution,
};
use sheet_runtime::{
    CallerId, EntityStore, Event, GovernanceEvent, GuardMode, InMemoryEntityStore, MutationEvent,
    MutationKind, MutationStats, RuntimeConfig, SheetRuntime, StoreError, Topic,
};

fn p(raw: &str) -> AttrPath {
    AttrPath::parse(raw).unwrap()
}

fn freighter() -> Entity {
    Entity::new(EntityId(1), EntityKind::Vehicle, "Freighter")
        .with_base(AttributeSet::new().with(p("hull"), 40))
        .with_owned([OwnedRecord::new(RecordId(1), RecordKind::Subsystem, "Hyperdrive")])
}

async fn runtime(mode: GuardMode) -> SheetRuntime {
    SheetRuntime::builder()
        .store(InMemoryEntityStore::with_entities([freighter()]))
        .config(RuntimeConfig {
            guard_mode: mode,
            ..RuntimeConfig::default()
        })
        .build()
        .await
        .unwrap()
}

fn hull(runtime: &SheetRuntime) -> Option<f64> {
    runtime
        .store()
        .require(EntityId(1))
        .unwrap()
        .base
        .number(&p("hull"))
}

#[tokio::test]
async fn permissive_bypass_is_logged_as_unauthorized() {
    let runtime = runtime(GuardMode::Permissive).await;
    let mut governance = runtime.subscribe(Topic::Governance);

    let store = runtime.store();
    let mut edited = store.require(EntityId(1)).unwrap();
    edited.base.insert(p("hull"), 1);
    store.put(&edited).unwrap();

    // Permissive mode lets the write through.
    assert_eq!(hull(&runtime), Some(1.0));

    let violations = runtime.guard().recent_violations(10);
    assert_eq!(violations.len(), 1);
    let entry = &violations[0];
    assert!(!entry.authorized);
    assert_eq!(entry.entity_id, EntityId(1));
    assert_eq!(entry.mutation_kind, MutationKind::Update);
    assert_eq!(entry.caller_id, CallerId::direct());
    assert_eq!(entry.change_count, 1);

    match governance.recv().await.unwrap() {
        Event::Governance(GovernanceEvent::Violation {
            entity, enforced, ..
        }) => {
            assert_eq!(entity, EntityId(1));
            assert!(!enforced);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(runtime.metrics().violations(), 1);
}

#[tokio::test]
async fn strict_mode_rejects_raw_store_writes_without_effect() {
    let runtime = runtime(GuardMode::Strict).await;
    let store = runtime.store().clone().with_caller("debug-console");

    let mut edited = store.require(EntityId(1)).unwrap();
    edited.base.insert(p("hull"), 1);
    let error = store.put(&edited).unwrap_err();
    assert!(matches!(error, StoreError::Governance(_)));

    let error = store.erase(EntityId(1)).unwrap_err();
    assert!(matches!(error, StoreError::Governance(_)));

    let error = runtime
        .guard()
        .update(&CallerId::new("debug-console"), &edited)
        .unwrap_err();
    assert!(matches!(error, StoreError::Governance(_)));

    assert_eq!(hull(&runtime), Some(40.0));
    assert!(store.exists(EntityId(1)));

    let stats = runtime.guard().mutation_stats(EntityId(1));
    assert_eq!(
        stats,
        MutationStats {
            total: 3,
            authorized: 0,
            unauthorized: 3,
        }
    );
    assert!(
        runtime
            .guard()
            .recent_violations(10)
            .iter()
            .all(|entry| entry.caller_id.as_str() == "debug-console")
    );
}

#[tokio::test]
async fn owned_record_writes_are_governed() {
    let strict = runtime(GuardMode::Strict).await;
    let store = strict.store();
    let turret = OwnedRecord::new(RecordId(2), RecordKind::Subsystem, "Turret");

    assert!(matches!(
        store.upsert_owned(EntityId(1), &turret),
        Err(StoreError::Governance(_))
    ));
    assert!(matches!(
        store.remove_owned(EntityId(1), RecordId(1)),
        Err(StoreError::Governance(_))
    ));
    let untouched = store.require(EntityId(1)).unwrap();
    assert_eq!(untouched.owned().len(), 1);
    assert!(untouched.record(RecordId(1)).is_some());

    let permissive = runtime(GuardMode::Permissive).await;
    let store = permissive.store();
    store.upsert_owned(EntityId(1), &turret).unwrap();
    store.remove_owned(EntityId(1), RecordId(1)).unwrap();
    let changed = store.require(EntityId(1)).unwrap();
    assert!(changed.record(RecordId(1)).is_none());
    assert!(changed.record(RecordId(2)).is_some());

    let kinds: Vec<_> = permissive
        .guard()
        .recent_violations(10)
        .iter()
        .map(|entry| entry.mutation_kind)
        .collect();
    assert_eq!(kinds, vec![MutationKind::OwnedDelete, MutationKind::OwnedUpsert]);
}

#[tokio::test]
async fn coordinated_writes_are_authorized_in_strict_mode() {
    let runtime = runtime(GuardMode::Strict).await;
    let mut mutations = runtime.subscribe(Topic::Mutation);

    let plan = MutationPlan::new().with_set(EntityId(1), p("base.hull"), 35);
    runtime.coordinator().apply(plan).await.unwrap();

    assert_eq!(hull(&runtime), Some(35.0));
    assert!(runtime.guard().recent_violations(10).is_empty());

    let recent = runtime.guard().audit().recent(10);
    assert!(recent.iter().all(|entry| entry.authorized));
    assert!(
        recent
            .iter()
            .any(|entry| entry.mutation_kind == MutationKind::Derived)
    );
    assert!(recent.iter().all(|entry| entry.caller_id == CallerId::coordinator()));

    match mutations.recv().await.unwrap() {
        Event::Mutation(MutationEvent::Applied { touched, .. }) => {
            assert_eq!(touched, vec![EntityId(1)]);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn scope_outlives_nothing_after_apply() {
    let runtime = runtime(GuardMode::Strict).await;

    let plan = MutationPlan::new().with_set(EntityId(1), p("base.hull"), 30);
    runtime.coordinator().apply(plan).await.unwrap();
    assert_eq!(runtime.guard().active_scopes(), 0);

    // A write from the same task after the apply is no longer authorized.
    let entity = runtime.store().require(EntityId(1)).unwrap();
    let error = runtime
        .guard()
        .update(&CallerId::coordinator(), &entity)
        .unwrap_err();
    assert!(matches!(error, StoreError::Governance(_)));
}

/// Holds the entity lock long enough for another task to try a write.
struct SlowDerivation;

impl Derivation for SlowDerivation {
    fn derive(&self, _entity: &Entity) -> Result<Resolution, DerivationError> {
        std::thread::sleep(Duration::from_millis(300));
        Ok(Resolution::default())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn other_tasks_stay_unauthorized_while_an_apply_runs() {
    let runtime = SheetRuntime::builder()
        .store(InMemoryEntityStore::with_entities([freighter()]))
        .derivation(Arc::new(SlowDerivation))
        .config(RuntimeConfig {
            guard_mode: GuardMode::Strict,
            ..RuntimeConfig::default()
        })
        .build()
        .await
        .unwrap();

    let coordinator = runtime.coordinator().clone();
    let apply = tokio::spawn(async move {
        let plan = MutationPlan::new().with_set(EntityId(1), p("base.hull"), 20);
        coordinator.apply(plan).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(runtime.guard().active_scopes(), 1);

    // A live scope elsewhere does not authorize this task.
    let mut edited = runtime.store().require(EntityId(1)).unwrap();
    edited.base.insert(p("hull"), 2);
    let error = runtime.store().put(&edited).unwrap_err();
    assert!(matches!(error, StoreError::Governance(_)));
    assert!(!runtime.guard().is_authorized());

    apply.await.unwrap().unwrap();
    assert_eq!(hull(&runtime), Some(20.0));
    assert_eq!(runtime.guard().mutation_stats(EntityId(1)).unauthorized, 1);
}

#[tokio::test]
async fn audit_ring_keeps_only_the_newest_entries() {
    let runtime = SheetRuntime::builder()
        .store(InMemoryEntityStore::with_entities([freighter()]))
        .config(RuntimeConfig {
            audit_capacity: 3,
            ..RuntimeConfig::default()
        })
        .build()
        .await
        .unwrap();

    for hull in 1..=4 {
        let plan = MutationPlan::new().with_set(EntityId(1), p("base.hull"), hull);
        runtime.coordinator().apply(plan).await.unwrap();
    }

    // Each apply writes an update and a derived set.
    let audit = runtime.guard().audit();
    assert_eq!(audit.len(), 3);
    assert_eq!(audit.capacity(), 3);
    let recent = audit.recent(3);
    assert_eq!(recent[0].mutation_kind, MutationKind::Derived);
    assert_eq!(recent[1].mutation_kind, MutationKind::Update);
}

#[tokio::test]
async fn stats_of_deleted_entities_are_kept() {
    let runtime = runtime(GuardMode::Strict).await;

    let plan = MutationPlan::new().with_delete_entity(EntityId(1));
    runtime.coordinator().apply(plan).await.unwrap();

    assert!(!runtime.store().exists(EntityId(1)));
    let stats = runtime.guard().mutation_stats(EntityId(1));
    assert_eq!(stats.total, 1);
    assert_eq!(stats.authorized, 1);
}
