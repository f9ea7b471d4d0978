use std::sync::Arc;
use std::thread;

use submission_engine::{EngineError, FormRegistry};
use submission_model::{
    FieldKind, FieldSpec, FormDefinition, FormVersion, SchemaError, StoreLimits,
};
use submission_store::InMemoryStore;

fn inspection(version: i64) -> FormDefinition {
    FormDefinition::new(
        "inspection",
        FieldSpec::group(
            "data",
            vec![
                FieldSpec::leaf("site", FieldKind::String),
                FieldSpec::repeat("findings", vec![FieldSpec::leaf("note", FieldKind::String)]),
            ],
        ),
    )
    .with_versions(Some(version), Some(1))
}

fn version(model_version: i64) -> FormVersion {
    FormVersion {
        model_version: Some(model_version),
        ui_version: Some(1),
    }
}

#[test]
fn registering_twice_reuses_the_compiled_form() {
    let store = InMemoryStore::new();
    let registry = FormRegistry::new(StoreLimits::default());
    assert!(registry.is_empty());

    let first = registry.register(&inspection(1), &store).expect("first");
    let second = registry.register(&inspection(1), &store).expect("second");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 1);
    for table in first.schema.tables() {
        assert!(store.is_declared(&table.name), "{} not declared", table.name);
    }

    let cached = registry.get("inspection", version(1)).expect("cached");
    assert!(Arc::ptr_eq(&first, &cached));
    assert!(registry.get("inspection", version(2)).is_none());
    assert!(registry.get("audit", version(1)).is_none());
}

#[test]
fn each_version_compiles_separately() {
    let store = InMemoryStore::new();
    let registry = FormRegistry::new(StoreLimits::default());
    let first = registry.register(&inspection(1), &store).expect("v1");
    let second = registry.register(&inspection(2), &store).expect("v2");
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 2);
}

#[test]
fn concurrent_registrations_converge() {
    let store = InMemoryStore::new();
    let registry = FormRegistry::new(StoreLimits::default());
    let definition = inspection(7);
    let forms: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| registry.register(&definition, &store).expect("register")))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .collect()
    });
    assert!(forms.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(registry.len(), 1);
}

#[test]
fn invalid_definitions_are_not_cached() {
    let store = InMemoryStore::new();
    let registry = FormRegistry::new(StoreLimits::default());
    let leaf_root = FormDefinition::new("broken", FieldSpec::leaf("data", FieldKind::String));
    assert!(matches!(
        registry.register(&leaf_root, &store),
        Err(EngineError::Schema(SchemaError::RootNotGroup(name))) if name == "data"
    ));
    assert!(registry.is_empty());
    assert!(registry.get("broken", FormVersion::default()).is_none());
}

#[test]
fn zero_chunk_size_is_rejected_at_registration() {
    let store = InMemoryStore::new();
    let registry = FormRegistry::new(StoreLimits {
        blob_chunk_bytes: 0,
        ..StoreLimits::default()
    });
    assert!(matches!(
        registry.register(&inspection(1), &store),
        Err(EngineError::Schema(SchemaError::InvalidLimits(reason))) if reason.contains("blob_chunk_bytes")
    ));
    assert!(registry.is_empty());
    assert_eq!(store.total_rows(), 0);
}
