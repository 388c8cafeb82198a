//! Property tests: a document exported from one store and imported into
//! another exports back to the same document.

mod common;

use common::*;
use graphport_model::{compute_key, Entity, FieldValue};
use graphport_storage::{MemoryRepository, Repository};
use graphport_transfer::{export_record, import_document, Document};
use proptest::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone)]
struct Shape {
    items: Vec<(String, i64)>,
    lines: BTreeMap<String, i64>,
    tags: BTreeSet<String>,
    /// `Some(true)`: owner and partner point at each other.
    owner: Option<bool>,
    /// Root the package under a record that also links one of its lines:
    /// `(line reached before the package, line index)`.
    wrapper: Option<(bool, usize)>,
}

fn shape_strategy() -> impl Strategy<Value = Shape> {
    (
        prop::collection::vec(("[a-z]{1,6}", 0i64..100), 0..6),
        prop::collection::btree_map("L[0-9]{1,3}", 0i64..1000, 0..4),
        prop::collection::btree_set("[a-z]{1,8}", 0..4),
        prop::option::of(any::<bool>()),
        prop::option::of((any::<bool>(), 0usize..4)),
    )
        .prop_map(|(items, lines, tags, owner, wrapper)| Shape {
            items,
            lines,
            tags,
            owner,
            wrapper,
        })
}

fn build(repo: &mut MemoryRepository, shape: &Shape) -> Entity {
    let tags: Vec<Entity> = shape.tags.iter().map(|label| tag(repo, label)).collect();
    let items: Vec<Entity> = shape
        .items
        .iter()
        .enumerate()
        .map(|(i, (code, qty))| {
            let mut pairs = vec![("code", s(code.as_str())), ("qty", s(*qty))];
            if let Some(first) = tags.first().filter(|_| i % 2 == 0) {
                pairs.push(("tag", FieldValue::link(first)));
            }
            create(repo, "item", pairs)
        })
        .collect();
    let lines: Vec<Entity> = shape
        .lines
        .iter()
        .map(|(code, amount)| {
            create(repo, "line", vec![("code", s(code.as_str())), ("amount", s(*amount))])
        })
        .collect();

    let mut pairs = vec![
        ("code", s("P1")),
        ("name", s("Package")),
        ("items", FieldValue::links(&items)),
        ("lines", FieldValue::links(&lines)),
        ("tags", FieldValue::links(&tags)),
    ];
    if let Some(cyclic) = shape.owner {
        let acme = create(repo, "party", vec![("name", s("Acme"))]);
        if cyclic {
            let beta = create(
                repo,
                "party",
                vec![("name", s("Beta")), ("partner", FieldValue::link(&acme))],
            );
            repo.update(&acme, fields(vec![("partner", FieldValue::link(&beta))]))
                .unwrap();
        }
        pairs.push(("owner", FieldValue::link(&acme)));
    }
    let package = create(repo, "package", pairs);

    match shape.wrapper {
        Some((line_first, index)) if !lines.is_empty() => {
            let line = &lines[index % lines.len()];
            if line_first {
                create(
                    repo,
                    "pick",
                    vec![
                        ("name", s("pick")),
                        ("line", FieldValue::link(line)),
                        ("package", FieldValue::link(&package)),
                    ],
                )
            } else {
                create(
                    repo,
                    "order",
                    vec![
                        ("number", s("O1")),
                        ("bundle", FieldValue::link(&package)),
                        ("favorite", FieldValue::link(line)),
                    ],
                )
            }
        }
        _ => package,
    }
}

fn export(repo: &MemoryRepository, root: &Entity) -> Document {
    export_record(repo, &registry(), root, &export_config())
        .unwrap()
        .document
}

const TYPES: [&str; 7] = ["package", "item", "line", "tag", "party", "order", "pick"];

/// Every record in the document, nested composition members included,
/// that carries field values: `(type, key)` per full record.
fn full_records(document: &Document) -> Vec<(String, String)> {
    fn walk(value: &Value, out: &mut Vec<(String, String)>) {
        match value {
            Value::Object(map) => {
                if let Some(Value::String(entity_type)) = map.get("__type__") {
                    if map.keys().any(|k| k != "__type__" && k != "_key") {
                        let key = map.get("_key").map(Value::to_string).unwrap_or_default();
                        out.push((entity_type.clone(), key));
                    }
                }
                map.values().for_each(|v| walk(v, out));
            }
            Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(&document.to_value(), &mut out);
    out
}

fn counts(repo: &MemoryRepository) -> Vec<usize> {
    TYPES.iter().map(|t| repo.count(t)).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn export_import_export_is_stable(shape in shape_strategy()) {
        let mut source = MemoryRepository::new();
        let root = build(&mut source, &shape);
        let first = export(&source, &root);

        let root_key = compute_key(&registry(), &source, &root).unwrap();

        let mut target = MemoryRepository::new();
        let outcome = import_document(&mut target, &registry(), &first, &import_config()).unwrap();
        let imported = outcome.get(&root.entity_type, &root_key).unwrap().clone();

        prop_assert_eq!(export(&target, &imported), first);
        prop_assert_eq!(counts(&target), counts(&source));
    }

    #[test]
    fn records_appear_at_most_once(shape in shape_strategy()) {
        let mut source = MemoryRepository::new();
        let root = build(&mut source, &shape);
        let document = export(&source, &root);

        let mut seen = HashSet::new();
        for (entity_type, key) in full_records(&document) {
            prop_assert!(seen.insert((entity_type.clone(), key.clone())), "{} {} written twice", entity_type, key);
        }
        // Keyless members are always nested, never top-level.
        prop_assert!(document.records().iter().all(|r| r.entity_type != "item"));
        prop_assert_eq!(
            document.records().last().map(|r| r.entity_type.as_str()),
            Some(root.entity_type.as_str())
        );
    }

    #[test]
    fn reimport_is_idempotent(shape in shape_strategy()) {
        let mut source = MemoryRepository::new();
        let root = build(&mut source, &shape);
        let document = export(&source, &root);

        let mut target = MemoryRepository::new();
        import_document(&mut target, &registry(), &document, &import_config()).unwrap();
        let after_first = counts(&target);
        let second = import_document(&mut target, &registry(), &document, &import_config()).unwrap();

        prop_assert_eq!(&counts(&target), &after_first);
        prop_assert_eq!(&after_first, &counts(&source));
        // Only keyless members are recreated.
        prop_assert!(second.created.keys().all(|t| t == "item"));
    }

    #[test]
    fn json_text_round_trips(shape in shape_strategy(), pretty in any::<bool>()) {
        let mut source = MemoryRepository::new();
        let root = build(&mut source, &shape);
        let document = export(&source, &root);

        let text = document.to_json(pretty).unwrap();
        prop_assert_eq!(Document::from_json(&text).unwrap(), document);
    }
}
