use graphport_model::{Entity, FieldMap, FieldValue, ImportHandler, RecordId};

struct DefaultHandler;
impl ImportHandler for DefaultHandler {}

struct TotalHandler;

impl ImportHandler for TotalHandler {
    fn validate(&self, entity: &Entity) -> Result<(), String> {
        match entity.get_scalar("qty").and_then(|v| v.as_i64()) {
            Some(q) if q >= 0 => Ok(()),
            _ => Err("qty must be a non-negative integer".into()),
        }
    }

    fn recompute(&self, entity: &Entity) -> Option<FieldMap> {
        let qty = entity.get_scalar("qty")?.as_i64()?;
        let price = entity.get_scalar("price")?.as_i64()?;
        let mut out = FieldMap::new();
        out.insert("total".into(), FieldValue::scalar(qty * price));
        Some(out)
    }
}

fn line(qty: i64, price: i64) -> Entity {
    let mut fields = FieldMap::new();
    fields.insert("qty".into(), FieldValue::scalar(qty));
    fields.insert("price".into(), FieldValue::scalar(price));
    Entity::new(RecordId::new(), "line", fields)
}

#[test]
fn default_handler_accepts_everything() {
    let h = DefaultHandler;
    assert!(h.validate(&line(-1, 0)).is_ok());
    assert!(h.recompute(&line(1, 1)).is_none());
}

#[test]
fn custom_validation() {
    let h = TotalHandler;
    assert!(h.validate(&line(2, 5)).is_ok());
    assert_eq!(h.validate(&line(-2, 5)).unwrap_err(), "qty must be a non-negative integer");
}

#[test]
fn custom_recompute() {
    let h = TotalHandler;
    let derived = h.recompute(&line(3, 7)).unwrap();
    assert_eq!(derived.get("total"), Some(&FieldValue::scalar(21)));
}

#[test]
fn handler_is_object_safe() {
    let handlers: Vec<Box<dyn ImportHandler>> = vec![Box::new(DefaultHandler), Box::new(TotalHandler)];
    assert_eq!(handlers.len(), 2);
}
