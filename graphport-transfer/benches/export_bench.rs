use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use graphport_model::{Entity, FieldDef, FieldMap, FieldValue, SchemaRegistry, TypeSchema};
use graphport_storage::{MemoryRepository, Repository};
use graphport_transfer::{export_record, import_document, Document, ExportConfig, ImportConfig};
use serde_json::Value;

fn registry() -> SchemaRegistry {
    SchemaRegistry::builder()
        .add(
            TypeSchema::new("order")
                .key(["number"])
                .field(FieldDef::scalar("number"))
                .field(FieldDef::composition("lines", "line"))
                .field(FieldDef::association("labels", "label"))
                .field(FieldDef::link("customer", "customer")),
        )
        .add(
            TypeSchema::new("line")
                .field(FieldDef::scalar("sku"))
                .field(FieldDef::scalar("qty"))
                .field(FieldDef::link("label", "label")),
        )
        .add(
            TypeSchema::new("label")
                .key(["name"])
                .field(FieldDef::scalar("name")),
        )
        .add(
            TypeSchema::new("customer")
                .key(["name"])
                .field(FieldDef::scalar("name"))
                .field(FieldDef::link("referrer", "customer")),
        )
        .build()
        .unwrap()
}

fn scalar(value: impl Into<Value>) -> FieldValue {
    FieldValue::scalar(value)
}

fn create(repo: &mut MemoryRepository, entity_type: &str, fields: Vec<(&str, FieldValue)>) -> Entity {
    let fields: FieldMap = fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    repo.create(entity_type, fields).unwrap()
}

/// Order with `lines` lines spread over 50 labels and a referrer chain.
fn populate(lines: usize) -> (MemoryRepository, Entity) {
    let mut repo = MemoryRepository::new();
    let labels: Vec<Entity> = (0..50)
        .map(|i| create(&mut repo, "label", vec![("name", scalar(format!("label-{i}")))]))
        .collect();

    let mut referrer: Option<Entity> = None;
    for i in 0..20 {
        let mut fields = vec![("name", scalar(format!("customer-{i}")))];
        if let Some(r) = &referrer {
            fields.push(("referrer", FieldValue::link(r)));
        }
        referrer = Some(create(&mut repo, "customer", fields));
    }

    let members: Vec<Entity> = (0..lines)
        .map(|i| {
            create(
                &mut repo,
                "line",
                vec![
                    ("sku", scalar(format!("sku-{i}"))),
                    ("qty", scalar(i as u64)),
                    ("label", FieldValue::link(&labels[i % labels.len()])),
                ],
            )
        })
        .collect();

    let mut fields = vec![
        ("number", scalar("SO-1")),
        ("lines", FieldValue::links(&members)),
        ("labels", FieldValue::links(&labels)),
    ];
    if let Some(r) = &referrer {
        fields.push(("customer", FieldValue::link(r)));
    }
    let order = create(&mut repo, "order", fields);
    (repo, order)
}

fn export_benchmark(c: &mut Criterion) {
    let registry = registry();
    let config = ExportConfig::default();
    let mut group = c.benchmark_group("export");

    for lines in [100, 1_000] {
        let (repo, order) = populate(lines);
        group.bench_with_input(BenchmarkId::from_parameter(lines), &lines, |b, _| {
            b.iter(|| export_record(black_box(&repo), &registry, &order, &config).unwrap())
        });
    }
    group.finish();
}

fn import_benchmark(c: &mut Criterion) {
    let registry = registry();
    let mut group = c.benchmark_group("import");

    for lines in [100, 1_000] {
        let (repo, order) = populate(lines);
        let document: Document = export_record(&repo, &registry, &order, &ExportConfig::default())
            .unwrap()
            .document;
        group.bench_with_input(BenchmarkId::from_parameter(lines), &document, |b, document| {
            b.iter(|| {
                let mut target = MemoryRepository::new();
                import_document(&mut target, &registry, black_box(document), &ImportConfig::default())
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn reversed_document(len: usize) -> Document {
    // Every referrer appears after the customer pointing at it.
    let records: Vec<Value> = (0..len)
        .map(|i| {
            let referrer = if i + 1 < len {
                serde_json::json!([["name", format!("customer-{}", i + 1)]])
            } else {
                Value::Null
            };
            serde_json::json!({
                "__type__": "customer",
                "_key": [["name", format!("customer-{i}")]],
                "name": format!("customer-{i}"),
                "referrer": referrer
            })
        })
        .collect();
    Document::from_value(&Value::Array(records)).unwrap()
}

fn relink_benchmark(c: &mut Criterion) {
    let registry = registry();
    let document = reversed_document(500);
    c.bench_function("relink forward references", |b| {
        b.iter(|| {
            let mut target = MemoryRepository::new();
            import_document(&mut target, &registry, black_box(&document), &ImportConfig::default())
                .unwrap()
        })
    });
}

criterion_group!(benches, export_benchmark, import_benchmark, relink_benchmark);
criterion_main!(benches);
