//! Shared fixtures: a small catalog of business types and store helpers.

#![allow(dead_code)]

use graphport_model::{
    Entity, Exportable, FieldDef, FieldMap, FieldValue, FunctionalKey, SchemaRegistry, TypeSchema,
};
use graphport_storage::{MemoryRepository, Repository};
use graphport_transfer::{Document, ExportConfig, ImportConfig};
use serde_json::{json, Value};

/// `package{code, name, items: composition(item), lines: composition(line),
/// tags: association(tag), owner: link(party)}`
pub struct Package;

impl Exportable for Package {
    const ENTITY_TYPE: &'static str = "package";

    fn schema() -> TypeSchema {
        TypeSchema::new(Self::ENTITY_TYPE)
            .key(["code"])
            .field(FieldDef::scalar("code"))
            .field(FieldDef::scalar("name"))
            .field(FieldDef::composition("items", "item"))
            .field(FieldDef::composition("lines", "line"))
            .field(FieldDef::association("tags", "tag"))
            .field(FieldDef::link("owner", "party"))
            .field(FieldDef::link("vendor", "party").light())
            .field(FieldDef::scalar("cache").skip_export())
    }
}

pub fn registry() -> SchemaRegistry {
    SchemaRegistry::builder()
        .register::<Package>()
        // Keyless: members are always recreated.
        .add(
            TypeSchema::new("item")
                .field(FieldDef::scalar("code"))
                .field(FieldDef::scalar("qty"))
                .field(FieldDef::link("tag", "tag")),
        )
        // Keyed: members are reconciled by key.
        .add(
            TypeSchema::new("line")
                .key(["code"])
                .field(FieldDef::scalar("code"))
                .field(FieldDef::scalar("amount")),
        )
        .add(
            TypeSchema::new("tag")
                .key(["label"])
                .field(FieldDef::scalar("label"))
                .field(FieldDef::scalar("color")),
        )
        .add(
            TypeSchema::new("party")
                .key(["name"])
                .field(FieldDef::scalar("name"))
                .field(FieldDef::link("partner", "party")),
        )
        // Example 2: the parent cannot exist without its child.
        .add(
            TypeSchema::new("parent")
                .key(["name"])
                .field(FieldDef::scalar("name"))
                .field(FieldDef::link("child", "child").required()),
        )
        .add(TypeSchema::new("child").key(["name"]).field(FieldDef::scalar("name")))
        // Mutually required: never importable when both are new.
        .add(
            TypeSchema::new("alpha")
                .key(["name"])
                .field(FieldDef::scalar("name"))
                .field(FieldDef::link("beta", "beta").required()),
        )
        .add(
            TypeSchema::new("beta")
                .key(["name"])
                .field(FieldDef::scalar("name"))
                .field(FieldDef::link("alpha", "alpha").required()),
        )
        // Chain of required links.
        .add(
            TypeSchema::new("step")
                .key(["n"])
                .field(FieldDef::scalar("n"))
                .field(FieldDef::scalar("last"))
                .field(FieldDef::link("next", "step").required_when("last", false)),
        )
        // Polymorphic reference.
        .add(
            TypeSchema::new("note")
                .key(["title"])
                .field(FieldDef::scalar("title"))
                .field(FieldDef::reference("about", ["package", "party", "vault"])),
        )
        // Key through a link.
        .add(
            TypeSchema::new("address")
                .key(["party", "street"])
                .field(FieldDef::scalar("street"))
                .field(FieldDef::link("party", "party")),
        )
        // Links to a package and to a line that may also be one of its
        // members. `bundle` sorts before `favorite`, so the package (and
        // its members) is reached first.
        .add(
            TypeSchema::new("order")
                .key(["number"])
                .field(FieldDef::scalar("number"))
                .field(FieldDef::link("bundle", "package"))
                .field(FieldDef::link("favorite", "line")),
        )
        // Same links, but `line` sorts before `package`: the member is
        // reached through the link first.
        .add(
            TypeSchema::new("pick")
                .key(["name"])
                .field(FieldDef::scalar("name"))
                .field(FieldDef::link("line", "line"))
                .field(FieldDef::link("package", "package")),
        )
        // Export-restricted target.
        .add(
            TypeSchema::new("vault")
                .key(["name"])
                .field(FieldDef::scalar("name"))
                .not_exportable(),
        )
        .add(
            TypeSchema::new("safe")
                .key(["name"])
                .field(FieldDef::scalar("name"))
                .field(FieldDef::link("vault", "vault")),
        )
        .build()
        .unwrap()
}

/// Installs a test subscriber; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn fields(pairs: Vec<(&str, FieldValue)>) -> FieldMap {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

pub fn s(value: impl Into<Value>) -> FieldValue {
    FieldValue::scalar(value)
}

pub fn key1(field: &str, value: impl Into<Value>) -> FunctionalKey {
    FunctionalKey::new([(field, value.into())])
}

pub fn create(repo: &mut impl Repository, entity_type: &str, pairs: Vec<(&str, FieldValue)>) -> Entity {
    repo.create(entity_type, fields(pairs)).unwrap()
}

pub fn tag(repo: &mut impl Repository, label: &str) -> Entity {
    create(repo, "tag", vec![("label", s(label))])
}

pub fn item(repo: &mut impl Repository, code: &str) -> Entity {
    create(repo, "item", vec![("code", s(code)), ("qty", s(1))])
}

/// Package with keyless items built from `codes`.
pub fn package_with_items(repo: &mut impl Repository, code: &str, codes: &[&str]) -> Entity {
    let items: Vec<Entity> = codes.iter().map(|c| item(repo, c)).collect();
    create(
        repo,
        "package",
        vec![
            ("code", s(code)),
            ("name", s(format!("Package {code}"))),
            ("items", FieldValue::links(&items)),
        ],
    )
}

/// Codes of a package's items, in member order.
pub fn item_codes(repo: &MemoryRepository, package: &Entity) -> Vec<String> {
    let package = repo.get(&package.link()).unwrap().unwrap();
    package
        .get_links("items")
        .iter()
        .map(|l| {
            repo.get(l)
                .unwrap()
                .unwrap()
                .get_str("code")
                .unwrap()
                .to_string()
        })
        .collect()
}

pub fn export_config() -> ExportConfig {
    ExportConfig::default()
}

pub fn import_config() -> ImportConfig {
    ImportConfig::default()
}

pub fn doc(value: Value) -> Document {
    Document::from_value(&value).unwrap()
}

/// `[["field", value]]`
pub fn wire_key(field: &str, value: impl Into<Value>) -> Value {
    json!([[field, value.into()]])
}

/// Package P1 whose `lines` are keyed members `codes`.
pub fn package_with_lines(repo: &mut impl Repository, codes: &[&str]) -> (Entity, Vec<Entity>) {
    let lines: Vec<Entity> = codes
        .iter()
        .map(|c| create(repo, "line", vec![("code", s(*c)), ("amount", s(10))]))
        .collect();
    let package = create(
        repo,
        "package",
        vec![("code", s("P1")), ("lines", FieldValue::links(&lines))],
    );
    (package, lines)
}
