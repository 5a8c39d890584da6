use kvmodel_model::{
    coerce, decode_stored, encode_field, encode_stored, score_of, BuiltinType, PropertyDef,
};
use proptest::prelude::*;
use serde_json::{json, Value};

// ── String ───────────────────────────────────────────────────────

#[test]
fn string_from_scalars() {
    assert_eq!(coerce(BuiltinType::String, &json!("abc")), json!("abc"));
    assert_eq!(coerce(BuiltinType::String, &json!(12)), json!("12"));
    assert_eq!(coerce(BuiltinType::String, &json!(true)), json!("true"));
}

#[test]
fn string_from_structures_is_empty() {
    assert_eq!(coerce(BuiltinType::String, &Value::Null), json!(""));
    assert_eq!(coerce(BuiltinType::String, &json!({"a": 1})), json!(""));
}

// ── Boolean ──────────────────────────────────────────────────────

#[test]
fn boolean_false_string() {
    assert_eq!(coerce(BuiltinType::Boolean, &json!("false")), json!(false));
    assert_eq!(coerce(BuiltinType::Boolean, &json!("")), json!(false));
    assert_eq!(coerce(BuiltinType::Boolean, &json!("true")), json!(true));
    assert_eq!(coerce(BuiltinType::Boolean, &json!("no")), json!(true));
}

#[test]
fn boolean_from_numbers() {
    assert_eq!(coerce(BuiltinType::Boolean, &json!(0)), json!(false));
    assert_eq!(coerce(BuiltinType::Boolean, &json!(2)), json!(true));
    assert_eq!(coerce(BuiltinType::Boolean, &Value::Null), json!(false));
}

// ── Integer ──────────────────────────────────────────────────────

#[test]
fn integer_parses_leading_digits() {
    assert_eq!(coerce(BuiltinType::Integer, &json!("42")), json!(42));
    assert_eq!(coerce(BuiltinType::Integer, &json!("  -7px")), json!(-7));
    assert_eq!(coerce(BuiltinType::Integer, &json!("3.9")), json!(3));
}

#[test]
fn integer_truncates_floats() {
    assert_eq!(coerce(BuiltinType::Integer, &json!(3.9)), json!(3));
    assert_eq!(coerce(BuiltinType::Integer, &json!(-3.9)), json!(-3));
}

#[test]
fn integer_falls_back_to_zero() {
    assert_eq!(coerce(BuiltinType::Integer, &json!("abc")), json!(0));
    assert_eq!(coerce(BuiltinType::Integer, &json!(true)), json!(0));
    assert_eq!(coerce(BuiltinType::Integer, &Value::Null), json!(0));
}

// ── Float ────────────────────────────────────────────────────────

#[test]
fn float_parses_prefix() {
    assert_eq!(coerce(BuiltinType::Float, &json!("1.5kg")), json!(1.5));
    assert_eq!(coerce(BuiltinType::Float, &json!("2e3")), json!(2000.0));
    assert_eq!(coerce(BuiltinType::Float, &json!("2e")), json!(2.0));
    assert_eq!(coerce(BuiltinType::Float, &json!(".5")), json!(0.5));
}

#[test]
fn float_from_integer_number() {
    assert_eq!(coerce(BuiltinType::Float, &json!(3)), json!(3.0));
}

#[test]
fn float_falls_back_to_zero() {
    assert_eq!(coerce(BuiltinType::Float, &json!("x")), json!(0.0));
}

// ── Timestamp ────────────────────────────────────────────────────

#[test]
fn timestamp_from_number_and_numeric_string() {
    assert_eq!(coerce(BuiltinType::Timestamp, &json!(1000)), json!(1000));
    assert_eq!(coerce(BuiltinType::Timestamp, &json!("1000")), json!(1000));
}

#[test]
fn timestamp_from_iso_with_offset() {
    assert_eq!(
        coerce(BuiltinType::Timestamp, &json!("1988-03-12T01:00:00+01:00")),
        json!(574_128_000_000i64)
    );
    assert_eq!(
        coerce(BuiltinType::Timestamp, &json!("1988-03-12T00:00:00Z")),
        json!(574_128_000_000i64)
    );
}

#[test]
fn timestamp_garbage_is_zero() {
    assert_eq!(coerce(BuiltinType::Timestamp, &json!("soon")), json!(0));
}

// ── Json ─────────────────────────────────────────────────────────

#[test]
fn json_passes_serialized_text_through() {
    assert_eq!(coerce(BuiltinType::Json, &json!("{\"a\":1}")), json!("{\"a\":1}"));
    assert_eq!(coerce(BuiltinType::Json, &json!("[1,2]")), json!("[1,2]"));
}

#[test]
fn json_serializes_structures() {
    assert_eq!(coerce(BuiltinType::Json, &json!({"a": 1})), json!("{\"a\":1}"));
    assert_eq!(coerce(BuiltinType::Json, &json!("plain")), json!("\"plain\""));
}

// ── Stored form ──────────────────────────────────────────────────

#[test]
fn encode_stored_forms() {
    assert_eq!(encode_stored(&json!("a")), "a");
    assert_eq!(encode_stored(&json!(5)), "5");
    assert_eq!(encode_stored(&json!(false)), "false");
    assert_eq!(encode_stored(&Value::Null), "");
}

#[test]
fn decode_stored_uses_property_type() {
    assert_eq!(decode_stored(&PropertyDef::integer("n"), "5"), json!(5));
    assert_eq!(decode_stored(&PropertyDef::boolean("b"), "false"), json!(false));
    assert_eq!(decode_stored(&PropertyDef::float("f"), "2.5"), json!(2.5));
    assert_eq!(decode_stored(&PropertyDef::string("s"), "5"), json!("5"));
}

#[test]
fn behavior_fields_keep_their_type() {
    let p = PropertyDef::behavior("b", |_, v, _, _| v);
    for value in [json!("02134"), json!("true"), json!(20), json!(1.5), json!(false), json!({"a": [1]})] {
        let stored = encode_field(&p, &value);
        assert_eq!(decode_stored(&p, &stored), value, "stored as {stored}");
    }
}

#[test]
fn behavior_plain_text_is_read_as_string() {
    let p = PropertyDef::behavior("b", |_, v, _, _| v);
    assert_eq!(decode_stored(&p, "salted$abc"), json!("salted$abc"));
    assert_eq!(decode_stored(&p, "20"), json!(20));
}

#[test]
fn builtin_fields_encode_as_plain_text() {
    assert_eq!(encode_field(&PropertyDef::string("s"), &json!("02134")), "02134");
    assert_eq!(encode_field(&PropertyDef::integer("n"), &json!(7)), "7");
}

#[test]
fn score_of_numbers() {
    assert_eq!(score_of(&json!(3)), Some(3.0));
    assert_eq!(score_of(&json!("4.5")), Some(4.5));
    assert_eq!(score_of(&json!(true)), None);
}

// ── Idempotence ──────────────────────────────────────────────────

fn builtin_strategy() -> impl Strategy<Value = BuiltinType> {
    prop_oneof![
        Just(BuiltinType::String),
        Just(BuiltinType::Boolean),
        Just(BuiltinType::Integer),
        Just(BuiltinType::Float),
        Just(BuiltinType::Timestamp),
        Just(BuiltinType::Json),
    ]
}

fn raw_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::from),
        "[a-z0-9 .:+-]{0,20}".prop_map(Value::from),
        Just(Value::Null),
        Just(json!({"k": [1, 2]})),
    ]
}

proptest! {
    #[test]
    fn coercion_is_idempotent(ty in builtin_strategy(), raw in raw_strategy()) {
        let once = coerce(ty, &raw);
        let twice = coerce(ty, &once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn stored_form_roundtrips_through_decode(ty in builtin_strategy(), raw in raw_strategy()) {
        let prop = PropertyDef::new("p", ty);
        let value = coerce(ty, &raw);
        prop_assert_eq!(decode_stored(&prop, &encode_stored(&value)), value);
    }
}
