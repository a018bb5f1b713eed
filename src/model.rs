//! The `Item` payload accepted by the item routes.
//!
//! Parsing either yields a fully typed [`Item`] or a [`ValidationError`]
//! listing every offending field. Coercion rules:
//!
//! | field | accepted | rejected |
//! |---|---|---|
//! | `name` | JSON string | anything else, or absent |
//! | `price` | JSON number, or a string holding a finite number (`"12.5"`) | non-numeric strings, `NaN`/`inf`, other types, absent |
//! | `is_offer` | bool, `0`/`1`, `"true"`/`"false"`/`"yes"`/`"no"`/`"on"`/`"off"`/`"1"`/`"0"`/`"t"`/`"f"`/`"y"`/`"n"` (any case); absent means `false` | anything else |
//!
//! Unknown fields are ignored.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{FieldError, ValidationError};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Item {
    pub name: String,
    pub price: f64,
    pub is_offer: bool,
}

impl Item {
    /// Parses and validates a raw JSON request body.
    pub fn parse(raw: &[u8]) -> Result<Self, ValidationError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(ValidationError::single(FieldError::new(&["body"], "missing", "Field required")));
        }

        let value: Value = serde_json::from_slice(raw).map_err(|e| {
            ValidationError::single(FieldError::new(&["body"], "json_invalid", format!("JSON decode error: {e}")))
        })?;

        match value {
            Value::Object(fields) => Self::from_fields(&fields),
            other => Err(ValidationError::single(
                FieldError::new(&["body"], "model_type", "Input should be a valid dictionary or object")
                    .with_input(other),
            )),
        }
    }

    fn from_fields(fields: &Map<String, Value>) -> Result<Self, ValidationError> {
        let mut errors = Vec::new();

        let name = collect(&mut errors, name(fields.get("name")));
        let price = collect(&mut errors, price(fields.get("price")));
        let is_offer = collect(&mut errors, is_offer(fields.get("is_offer")));

        match (name, price, is_offer) {
            (Some(name), Some(price), Some(is_offer)) if errors.is_empty() => {
                Ok(Self { name, price, is_offer })
            }
            _ => Err(ValidationError { errors }),
        }
    }
}

fn collect<T>(errors: &mut Vec<FieldError>, res: Result<T, FieldError>) -> Option<T> {
    res.map_err(|e| errors.push(e)).ok()
}

fn missing(field: &str) -> FieldError {
    FieldError::new(&["body", field], "missing", "Field required")
}

fn name(value: Option<&Value>) -> Result<String, FieldError> {
    match value {
        None => Err(missing("name")),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(FieldError::new(&["body", "name"], "string_type", "Input should be a valid string")
            .with_input(other.clone())),
    }
}

fn price(value: Option<&Value>) -> Result<f64, FieldError> {
    let invalid = |kind, msg: &str, input: &Value| {
        FieldError::new(&["body", "price"], kind, msg).with_input(input.clone())
    };

    let n = match value {
        None => return Err(missing("price")),
        Some(v @ Value::Number(n)) => n.as_f64().ok_or_else(|| {
            invalid("float_type", "Input should be a valid number", v)
        })?,
        Some(v @ Value::String(s)) => s.trim().parse::<f64>().map_err(|_| {
            invalid("float_parsing", "Input should be a valid number, unable to parse string as a number", v)
        })?,
        Some(v) => return Err(invalid("float_type", "Input should be a valid number", v)),
    };

    if n.is_finite() {
        Ok(n)
    } else {
        Err(FieldError::new(&["body", "price"], "finite_number", "Input should be a finite number")
            .with_input(value.cloned().unwrap_or(Value::Null)))
    }
}

fn is_offer(value: Option<&Value>) -> Result<bool, FieldError> {
    let invalid = |input: &Value| {
        FieldError::new(&["body", "is_offer"], "bool_parsing", "Input should be a valid boolean, unable to interpret input")
            .with_input(input.clone())
    };

    match value {
        None => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(v @ Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(invalid(v)),
        },
        Some(v @ Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
            "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
            _ => Err(invalid(v)),
        },
        Some(v) => Err(FieldError::new(&["body", "is_offer"], "bool_type", "Input should be a valid boolean")
            .with_input(v.clone())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(v: Value) -> Result<Item, ValidationError> {
        Item::parse(&serde_json::to_vec(&v).unwrap())
    }

    #[test]
    fn is_offer_defaults_to_false() {
        let item = parse(json!({ "name": "Foo", "price": 10.5 })).unwrap();
        assert_eq!(item, Item { name: "Foo".into(), price: 10.5, is_offer: false });
    }

    #[test]
    fn integer_price_becomes_float() {
        let item = parse(json!({ "name": "Foo", "price": 10, "is_offer": true })).unwrap();
        assert_eq!(item.price, 10.0);
        assert!(item.is_offer);
    }

    #[test]
    fn numeric_text_price_is_coerced() {
        let item = parse(json!({ "name": "Foo", "price": " 12.25 " })).unwrap();
        assert_eq!(item.price, 12.25);
    }

    #[test]
    fn non_numeric_price_is_rejected() {
        let err = parse(json!({ "name": "Foo", "price": "ten" })).unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert!(err.has(&["body", "price"]));
        assert_eq!(err.errors[0].kind, "float_parsing");
        assert_eq!(err.errors[0].input, Some(json!("ten")));
    }

    #[test]
    fn non_finite_price_is_rejected() {
        let err = parse(json!({ "name": "Foo", "price": "NaN" })).unwrap_err();
        assert_eq!(err.errors[0].kind, "finite_number");
    }

    #[test]
    fn every_bad_field_is_reported() {
        let err = parse(json!({ "name": 5, "is_offer": "maybe" })).unwrap_err();
        assert_eq!(err.errors.len(), 3);
        assert!(err.has(&["body", "name"]));
        assert!(err.has(&["body", "price"]));
        assert!(err.has(&["body", "is_offer"]));
    }

    #[test]
    fn boolean_like_values_are_coerced() {
        for (raw, expected) in [(json!("yes"), true), (json!("OFF"), false), (json!(1), true), (json!(0), false)] {
            let item = parse(json!({ "name": "x", "price": 1, "is_offer": raw })).unwrap();
            assert_eq!(item.is_offer, expected);
        }
        assert!(parse(json!({ "name": "x", "price": 1, "is_offer": 2 })).is_err());
    }

    #[test]
    fn body_level_failures() {
        assert_eq!(Item::parse(b"").unwrap_err().errors[0].kind, "missing");
        assert_eq!(Item::parse(b"{not json").unwrap_err().errors[0].kind, "json_invalid");
        assert_eq!(Item::parse(b"[1, 2]").unwrap_err().errors[0].kind, "model_type");
    }

    #[test]
    fn serialises_with_default_present() {
        let item = parse(json!({ "name": "Foo", "price": 3 })).unwrap();
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({ "name": "Foo", "price": 3.0, "is_offer": false })
        );
    }
}
