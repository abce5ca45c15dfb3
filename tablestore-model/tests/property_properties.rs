//! Property-based tests for typed values.
//!
//! Every native value must survive conversion to its wire string and back,
//! and re-parsing a wire string under its declared type must never fail.

use proptest::prelude::*;
use tablestore_model::{EdmType, EntityProperty};

fn reparse(p: &EntityProperty) -> EntityProperty {
    EntityProperty::from_wire(p.as_wire(), p.edm_type()).unwrap()
}

proptest! {
    #[test]
    fn int32_round_trips(v in any::<i32>()) {
        let p = EntityProperty::from(v);
        prop_assert_eq!(reparse(&p).as_i32().unwrap(), v);
    }

    #[test]
    fn int64_round_trips(v in any::<i64>()) {
        let p = EntityProperty::from(v);
        prop_assert_eq!(reparse(&p).as_i64().unwrap(), v);
    }

    #[test]
    fn double_round_trips_bit_exact(v in any::<f64>()) {
        let back = reparse(&EntityProperty::from(v)).as_f64().unwrap();
        if v.is_nan() {
            prop_assert!(back.is_nan());
        } else {
            prop_assert_eq!(back.to_bits(), v.to_bits());
        }
    }

    #[test]
    fn binary_round_trips(v in prop::collection::vec(any::<u8>(), 0..256)) {
        let p = EntityProperty::from(v.clone());
        prop_assert_eq!(reparse(&p).as_binary().unwrap(), Some(v));
    }

    #[test]
    fn string_round_trips(v in ".*") {
        let p = EntityProperty::from(v.clone());
        let reparsed = reparse(&p);
        prop_assert_eq!(reparsed.as_str(), Some(v.as_str()));
    }

    #[test]
    fn guid_round_trips(bytes in prop::array::uniform16(any::<u8>())) {
        let id = uuid::Uuid::from_bytes(bytes);
        let p = EntityProperty::from(id);
        prop_assert_eq!(p.edm_type(), EdmType::Guid);
        prop_assert_eq!(reparse(&p).as_guid().unwrap(), id);
    }
}
