use sheet_core::{
    AttrPath, AttributeSet, CreateSpec, EntityKind, MutationPlan, RecordKind, RecordSpec,
    RuleElement,
};
use sheet_runtime::{EntityStore, FileEntityStore, SheetRuntime};
use tempfile::TempDir;

fn p(raw: &str) -> AttrPath {
    AttrPath::parse(raw).unwrap()
}

#[tokio::test]
async fn created_entity_survives_reopen_with_recomputed_derived() {
    let dir = TempDir::new().unwrap();

    let created = {
        let runtime = SheetRuntime::builder()
            .store(FileEntityStore::new(dir.path()).unwrap())
            .build()
            .await
            .unwrap();

        let plan = MutationPlan::new().with_create(
            CreateSpec::new("scout", EntityKind::Character, "Scout")
                .with_base(AttributeSet::new().with(p("stealth"), 6))
                .with_record(
                    RecordSpec::new(RecordKind::Ability, "Shadowstep")
                        .with_rule(RuleElement::add(p("stealth"), 2.0, "insight")),
                ),
        );
        let receipt = runtime.coordinator().apply(plan).await.unwrap();
        receipt.created_id("scout").unwrap()
    };

    let path = dir.path().join(format!("entity_{}.json", created.0));
    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    for key in ["id", "kind", "name", "base", "owned", "flags", "derived"] {
        assert!(raw.get(key).is_some(), "persisted record lacks '{key}'");
    }

    // Tamper with the persisted derived value; hydration must not trust it.
    let mut tampered = raw.clone();
    tampered["derived"]["stealth"] = serde_json::json!(100);
    std::fs::write(&path, serde_json::to_vec(&tampered).unwrap()).unwrap();

    let runtime = SheetRuntime::builder()
        .store(FileEntityStore::new(dir.path()).unwrap())
        .hydrate_on_build(true)
        .build()
        .await
        .unwrap();

    let entity = runtime.entity(created).await.unwrap().unwrap();
    assert_eq!(entity.name, "Scout");
    assert_eq!(entity.derived.number(&p("stealth")), Some(8.0));

    // Ids keep counting from the highest stored one.
    assert!(runtime.store().allocate_id().unwrap() > created);
}
