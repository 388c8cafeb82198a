use graphport_model::{FieldDef, FieldMap, FieldValue, FunctionalKey, LinkRef, RecordId, SchemaRegistry, TypeSchema};
use graphport_storage::{Repository, SqliteRepository, StorageError, TransactionScope};
use pretty_assertions::assert_eq;
use serde_json::json;

fn registry() -> SchemaRegistry {
    SchemaRegistry::builder()
        .add(
            TypeSchema::new("product")
                .key(["code"])
                .field(FieldDef::scalar("code"))
                .field(FieldDef::scalar("price"))
                .field(FieldDef::association("tags", "tag")),
        )
        .add(TypeSchema::new("tag").key(["label"]).field(FieldDef::scalar("label")))
        .build()
        .unwrap()
}

fn fields(pairs: Vec<(&str, FieldValue)>) -> FieldMap {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

// ── CRUD ─────────────────────────────────────────────────────────

#[test]
fn create_get_update_delete() {
    let mut repo = SqliteRepository::open_in_memory().unwrap();
    let tag = repo.create("tag", fields(vec![("label", FieldValue::scalar("red"))])).unwrap();
    let product = repo
        .create(
            "product",
            fields(vec![
                ("code", FieldValue::scalar("P1")),
                ("price", FieldValue::scalar(9.5)),
                ("tags", FieldValue::Links(vec![tag.link()])),
            ]),
        )
        .unwrap();

    let loaded = repo.get(&product.link()).unwrap().unwrap();
    assert_eq!(loaded, product);

    let updated = repo.update(&product, fields(vec![("price", FieldValue::scalar(12))])).unwrap();
    assert_eq!(updated.get_scalar("price"), Some(&json!(12)));
    assert_eq!(updated.get_links("tags"), &[tag.link()]);

    repo.delete(&[product.link()]).unwrap();
    assert!(repo.get(&product.link()).unwrap().is_none());
    assert_eq!(repo.count("product").unwrap(), 0);
    assert_eq!(repo.count("tag").unwrap(), 1);
}

#[test]
fn dangling_link_rejected() {
    let mut repo = SqliteRepository::open_in_memory().unwrap();
    let ghost = LinkRef::new("tag", RecordId::new());
    let result = repo.create("product", fields(vec![("tags", FieldValue::Links(vec![ghost]))]));
    assert!(matches!(result, Err(StorageError::InvalidData(_))));
}

#[test]
fn find_by_key_scans_type() {
    let reg = registry();
    let mut repo = SqliteRepository::open_in_memory().unwrap();
    let p1 = repo.create("product", fields(vec![("code", FieldValue::scalar("P1"))])).unwrap();
    repo.create("product", fields(vec![("code", FieldValue::scalar("P2"))])).unwrap();

    let key = FunctionalKey::new([("code", json!("P1"))]);
    assert_eq!(repo.find_by_key(&reg, "product", &key).unwrap(), vec![p1]);
}

// ── Transactions ─────────────────────────────────────────────────

#[test]
fn scope_dropped_without_commit_rolls_back() {
    let mut repo = SqliteRepository::open_in_memory().unwrap();
    {
        let mut scope = TransactionScope::begin(&mut repo).unwrap();
        scope.create("tag", FieldMap::new()).unwrap();
        assert_eq!(scope.count("tag").unwrap(), 1);
    }
    assert_eq!(repo.count("tag").unwrap(), 0);
}

#[test]
fn scope_commit_persists() {
    let mut repo = SqliteRepository::open_in_memory().unwrap();
    let scope = {
        let mut scope = TransactionScope::begin(&mut repo).unwrap();
        scope.create("tag", FieldMap::new()).unwrap();
        scope
    };
    scope.commit().unwrap();
    assert_eq!(repo.count("tag").unwrap(), 1);
}

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    let id = {
        let mut repo = SqliteRepository::open(&path).unwrap();
        repo.create("tag", fields(vec![("label", FieldValue::scalar("blue"))])).unwrap().id
    };

    let repo = SqliteRepository::open(&path).unwrap();
    let tag = repo.get(&LinkRef::new("tag", id)).unwrap().unwrap();
    assert_eq!(tag.get_str("label"), Some("blue"));
}
