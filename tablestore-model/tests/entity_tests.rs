use tablestore_model::{is_reserved, EntityProperty, TableEntity, RESERVED_NAMES};

// ── Construction ─────────────────────────────────────────────────

#[test]
fn new_entity_has_keys_and_timestamp() {
    let e = TableEntity::new("P1", "R1");
    assert_eq!(e.partition_key, "P1");
    assert_eq!(e.row_key, "R1");
    assert!(e.timestamp.is_some());
    assert!(e.etag.is_none());
    assert!(e.properties.is_empty());
}

#[test]
fn builder_sets_properties_and_etag() {
    let e = TableEntity::new("P", "R")
        .with_property("Count", 5i32)
        .with_etag("W/\"1\"");
    assert_eq!(e.property("Count"), Some(&EntityProperty::from(5i32)));
    assert_eq!(e.etag.as_deref(), Some("W/\"1\""));
}

#[test]
fn set_and_remove_property() {
    let mut e = TableEntity::new("P", "R");
    assert!(e.set_property("A", "x").is_none());
    let previous = e.set_property("A", 2i32).unwrap();
    assert_eq!(previous.as_str(), Some("x"));
    assert!(e.remove_property("A").is_some());
    assert!(e.property("A").is_none());
}

// ── Reserved names ───────────────────────────────────────────────

#[test]
fn reserved_names() {
    for name in RESERVED_NAMES {
        assert!(is_reserved(name));
    }
    assert!(!is_reserved("partitionkey"));
    assert!(!is_reserved("Count"));
}

#[test]
fn writable_properties_skip_reserved_names() {
    let e = TableEntity::new("real", "R")
        .with_property("PartitionKey", "spoofed")
        .with_property("Etag", "spoofed")
        .with_property("Count", 1i32);
    let names: Vec<&str> = e.writable_properties().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["Count"]);
}
