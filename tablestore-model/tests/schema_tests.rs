use pretty_assertions::assert_eq;
use std::sync::Arc;
use tablestore_model::{
    EdmType, EntityKeys, EntityProperty, EntitySchema, ModelError, ModelResult, PropertyMap,
    SchemaCache, TableEntity, TypedEntity,
};

#[derive(Debug, Default, Clone, PartialEq)]
struct Customer {
    keys: EntityKeys,
    email: String,
    visits: i64,
    rating: Option<f64>,
    active: bool,
}

impl TypedEntity for Customer {
    fn keys(&self) -> &EntityKeys {
        &self.keys
    }

    fn keys_mut(&mut self) -> &mut EntityKeys {
        &mut self.keys
    }

    fn schema() -> ModelResult<EntitySchema<Self>> {
        EntitySchema::builder()
            .field("Email", |c: &Customer| &c.email, |c, v| c.email = v)
            .field("Visits", |c: &Customer| &c.visits, |c, v| c.visits = v)
            .field("Rating", |c: &Customer| &c.rating, |c, v| c.rating = v)
            .field("Active", |c: &Customer| &c.active, |c, v| c.active = v)
            .build()
    }
}

fn customer() -> Customer {
    Customer {
        keys: EntityKeys::new("smith", "john"),
        email: "john@example.com".to_string(),
        visits: 12,
        rating: None,
        active: true,
    }
}

// ── Builder ──────────────────────────────────────────────────────

#[test]
fn schema_lists_declared_types() {
    let schema = Customer::schema().unwrap();
    assert_eq!(schema.len(), 4);
    let types = schema.property_types();
    assert_eq!(types["Email"], EdmType::String);
    assert_eq!(types["Visits"], EdmType::Int64);
    assert_eq!(types["Rating"], EdmType::Double);
    assert_eq!(types["Active"], EdmType::Boolean);
}

#[test]
fn reserved_name_is_rejected() {
    let result = EntitySchema::<Customer>::builder()
        .field("PartitionKey", |c: &Customer| &c.email, |c, v| c.email = v)
        .build();
    assert_eq!(
        result.unwrap_err(),
        ModelError::ReservedName("PartitionKey".to_string())
    );
}

#[test]
fn duplicate_name_is_rejected() {
    let result = EntitySchema::<Customer>::builder()
        .field("Email", |c: &Customer| &c.email, |c, v| c.email = v)
        .field("Email", |c: &Customer| &c.email, |c, v| c.email = v)
        .build();
    assert_eq!(
        result.unwrap_err(),
        ModelError::DuplicateProperty("Email".to_string())
    );
}

#[test]
fn custom_accessor_pair() {
    let schema = EntitySchema::<Customer>::builder()
        .accessor(
            "EmailLength",
            EdmType::Int32,
            |c: &Customer| EntityProperty::from(c.email.len() as i32),
            |_c: &mut Customer, p: &EntityProperty| p.as_i32().map(|_| ()),
        )
        .build()
        .unwrap();
    let props = schema.write_properties(&customer());
    assert_eq!(props["EmailLength"].as_i32().unwrap(), 16);
}

// ── Conversions ──────────────────────────────────────────────────

#[test]
fn to_entity_copies_keys_and_properties() {
    let schema = Customer::schema().unwrap();
    let entity = schema.to_entity(&customer());
    assert_eq!(entity.partition_key, "smith");
    assert_eq!(entity.row_key, "john");
    assert_eq!(entity.properties["Visits"], EntityProperty::from(12i64));
    assert!(entity.properties["Rating"].is_null());
}

#[test]
fn from_entity_round_trips() {
    let schema = Customer::schema().unwrap();
    let original = customer();
    let back = schema.from_entity(schema.to_entity(&original)).unwrap();
    assert_eq!(back, original);
}

#[test]
fn from_entity_ignores_unknown_and_missing() {
    let schema = Customer::schema().unwrap();
    let entity = TableEntity::new("p", "r")
        .with_property("Email", "a@b.c")
        .with_property("Unrelated", 3i32);
    let c = schema.from_entity(entity).unwrap();
    assert_eq!(c.email, "a@b.c");
    assert_eq!(c.visits, 0);
    assert_eq!(c.keys.partition_key, "p");
}

#[test]
fn from_entity_reports_offending_property() {
    let schema = Customer::schema().unwrap();
    let mut props = PropertyMap::new();
    props.insert("Visits".to_string(), EntityProperty::from("many"));
    let mut c = Customer::default();
    let err = schema.read_properties(&mut c, &props).unwrap_err();
    match err {
        ModelError::Property { name, .. } => assert_eq!(name, "Visits"),
        other => panic!("expected Property error, got {other:?}"),
    }
}

#[test]
fn null_into_non_option_field_fails() {
    let schema = Customer::schema().unwrap();
    let entity = TableEntity::new("p", "r").with_property("Visits", None::<i64>);
    assert!(schema.from_entity(entity).is_err());
}

// ── Cache ────────────────────────────────────────────────────────

#[test]
fn cache_reuses_schema() {
    let cache = SchemaCache::new();
    let a = cache.schema::<Customer>().unwrap();
    let b = cache.schema::<Customer>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(cache.len(), 1);
}

#[test]
fn disabled_cache_rebuilds_every_time() {
    let cache = SchemaCache::disabled();
    let a = cache.schema::<Customer>().unwrap();
    let b = cache.schema::<Customer>().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert!(cache.is_empty());
}

#[test]
fn cache_clear_empties() {
    let cache = SchemaCache::new();
    cache.schema::<Customer>().unwrap();
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn cache_is_shareable_across_threads() {
    let cache = Arc::new(SchemaCache::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || cache.schema::<Customer>().unwrap().len())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), 4);
    }
    assert_eq!(cache.len(), 1);
}

#[test]
fn cache_conversions() {
    let cache = SchemaCache::new();
    let entity = cache.to_entity(&customer()).unwrap();
    let back: Customer = cache.from_entity(entity).unwrap();
    assert_eq!(back, customer());
    assert_eq!(
        cache.property_types::<Customer>().unwrap()["Email"],
        EdmType::String
    );
}
