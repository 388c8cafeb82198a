use graphport_model::{
    classify_field, composition_policy, compute_key, is_exportable, CompositionPolicy, Entity,
    EntityLoader, FieldClass, FieldDef, FieldMap, FieldValue, FunctionalKey, LinkRef, ModelError,
    ModelResult, RecordId, SchemaRegistry, TypeSchema,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;

#[derive(Default)]
struct MapLoader {
    records: HashMap<RecordId, Entity>,
}

impl MapLoader {
    fn put(&mut self, entity_type: &str, fields: Vec<(&str, FieldValue)>) -> Entity {
        let entity = Entity::new(
            RecordId::new(),
            entity_type,
            fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect::<FieldMap>(),
        );
        self.records.insert(entity.id, entity.clone());
        entity
    }
}

impl EntityLoader for MapLoader {
    fn load(&self, link: &LinkRef) -> ModelResult<Option<Entity>> {
        Ok(self.records.get(&link.id).cloned())
    }
}

fn registry() -> SchemaRegistry {
    SchemaRegistry::builder()
        .add(
            TypeSchema::new("party")
                .key(["name"])
                .field(FieldDef::scalar("name"))
                .field(FieldDef::scalar("vat")),
        )
        .add(
            TypeSchema::new("company")
                .key(["party.name"])
                .field(FieldDef::link("party", "party").required()),
        )
        .add(
            TypeSchema::new("employee")
                .key(["company", "code"])
                .field(FieldDef::scalar("code"))
                .field(FieldDef::link("company", "company"))
                .field(FieldDef::link("badge", "badge")),
        )
        .add(
            TypeSchema::new("sale")
                .key(["number"])
                .field(FieldDef::scalar("number"))
                .field(FieldDef::composition("lines", "sale_line")),
        )
        .add(TypeSchema::new("sale_line").field(FieldDef::scalar("qty")))
        .add(
            TypeSchema::new("move")
                .key(["origin", "ref"])
                .field(FieldDef::scalar("ref"))
                .field(FieldDef::reference("origin", ["sale", "party"])),
        )
        .add(
            TypeSchema::new("badge")
                .key(["serial"])
                .field(FieldDef::scalar("serial"))
                .not_exportable(),
        )
        .build()
        .unwrap()
}

// ── compute_key ──────────────────────────────────────────────────

#[test]
fn scalar_key() {
    let reg = registry();
    let mut loader = MapLoader::default();
    let party = loader.put("party", vec![("name", FieldValue::scalar("Acme")), ("vat", FieldValue::scalar("X"))]);

    let key = compute_key(&reg, &loader, &party).unwrap();
    assert_eq!(key, FunctionalKey::new([("name", json!("Acme"))]));
}

#[test]
fn missing_scalar_contributes_null() {
    let reg = registry();
    let mut loader = MapLoader::default();
    let party = loader.put("party", vec![]);
    let key = compute_key(&reg, &loader, &party).unwrap();
    assert_eq!(key.get("name"), Some(&json!(null)));
}

#[test]
fn dotted_path_key() {
    let reg = registry();
    let mut loader = MapLoader::default();
    let party = loader.put("party", vec![("name", FieldValue::scalar("Acme"))]);
    let company = loader.put("company", vec![("party", FieldValue::link(&party))]);

    let key = compute_key(&reg, &loader, &company).unwrap();
    assert_eq!(key, FunctionalKey::new([("party.name", json!("Acme"))]));
}

#[test]
fn link_key_embeds_target_key() {
    let reg = registry();
    let mut loader = MapLoader::default();
    let party = loader.put("party", vec![("name", FieldValue::scalar("Acme"))]);
    let company = loader.put("company", vec![("party", FieldValue::link(&party))]);
    let employee = loader.put(
        "employee",
        vec![("code", FieldValue::scalar("E1")), ("company", FieldValue::link(&company))],
    );

    let key = compute_key(&reg, &loader, &employee).unwrap();
    assert_eq!(
        key.to_value(),
        json!([["code", "E1"], ["company", [["party.name", "Acme"]]]])
    );
}

#[test]
fn polymorphic_key_is_type_tagged() {
    let reg = registry();
    let mut loader = MapLoader::default();
    let sale = loader.put("sale", vec![("number", FieldValue::scalar("S1"))]);
    let mv = loader.put("move", vec![("ref", FieldValue::scalar("M")), ("origin", FieldValue::link(&sale))]);

    let key = compute_key(&reg, &loader, &mv).unwrap();
    assert_eq!(key.get("origin"), Some(&json!(["sale", [["number", "S1"]]])));
}

#[test]
fn unset_key_link_fails() {
    let reg = registry();
    let mut loader = MapLoader::default();
    let employee = loader.put("employee", vec![("code", FieldValue::scalar("E1"))]);

    let err = compute_key(&reg, &loader, &employee).unwrap_err();
    assert!(matches!(err, ModelError::UnsetKeyLink { field, .. } if field == "company"));
}

#[test]
fn unset_hop_of_dotted_path_fails() {
    let reg = registry();
    let mut loader = MapLoader::default();
    let company = loader.put("company", vec![("party", FieldValue::Link(None))]);
    let err = compute_key(&reg, &loader, &company).unwrap_err();
    assert!(matches!(err, ModelError::UnsetKeyLink { field, .. } if field == "party"));
}

#[test]
fn dangling_key_link_fails() {
    let reg = registry();
    let loader = MapLoader::default();
    let ghost = LinkRef::new("party", RecordId::new());
    let mut fields = FieldMap::new();
    fields.insert("party".into(), FieldValue::Link(Some(ghost)));
    let company = Entity::new(RecordId::new(), "company", fields);

    assert!(matches!(
        compute_key(&reg, &loader, &company),
        Err(ModelError::DanglingLink { .. })
    ));
}

#[test]
fn keyless_type_has_no_key() {
    let reg = registry();
    let mut loader = MapLoader::default();
    let line = loader.put("sale_line", vec![("qty", FieldValue::scalar(1))]);
    assert!(matches!(
        compute_key(&reg, &loader, &line),
        Err(ModelError::MissingKeyDefinition(t)) if t == "sale_line"
    ));
}

// ── classify_field / is_exportable ───────────────────────────────

#[test]
fn classify_fields() {
    let reg = registry();
    assert_eq!(classify_field(reg.field("party", "name").unwrap()), FieldClass::Scalar);
    assert_eq!(classify_field(reg.field("company", "party").unwrap()), FieldClass::SingleLink);
    assert_eq!(classify_field(reg.field("move", "origin").unwrap()), FieldClass::SingleLink);
    assert_eq!(classify_field(reg.field("sale", "lines").unwrap()), FieldClass::MultiLink);
}

#[test]
fn exportable_fields() {
    let reg = registry();
    assert!(is_exportable(&reg, "party", "name").unwrap());
    assert!(is_exportable(&reg, "company", "party").unwrap());
    assert!(is_exportable(&reg, "sale", "lines").unwrap());
    assert!(is_exportable(&reg, "move", "origin").unwrap());
}

#[test]
fn link_to_non_exportable_type_fails() {
    let reg = registry();
    let err = is_exportable(&reg, "employee", "badge").unwrap_err();
    match err {
        ModelError::NotExportable { entity_type, field, target } => {
            assert_eq!(entity_type, "employee");
            assert_eq!(field, "badge");
            assert_eq!(target, "badge");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn skipped_field_is_not_exported() {
    let reg = SchemaRegistry::builder()
        .add(
            TypeSchema::new("doc")
                .key(["code"])
                .field(FieldDef::scalar("code"))
                .field(FieldDef::scalar("cache").skip_export()),
        )
        .build()
        .unwrap();
    assert!(!is_exportable(&reg, "doc", "cache").unwrap());
}

#[test]
fn unknown_field_is_error() {
    let reg = registry();
    assert!(matches!(
        is_exportable(&reg, "party", "nope"),
        Err(ModelError::UnknownField { .. })
    ));
}

// ── composition_policy ───────────────────────────────────────────

#[test]
fn keyless_members_force_recreate() {
    let reg = registry();
    assert_eq!(
        composition_policy(&reg, "sale", "lines").unwrap(),
        CompositionPolicy::ForceRecreate
    );
    assert!(composition_policy(&reg, "company", "party").is_err());
}
