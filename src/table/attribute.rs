//! DynamoDB typed JSON (`{"id": {"S": "42"}}`) to SDK attribute values.
//!
//! This is the format the AWS CLI and the DynamoDB console export, and what
//! `--expression-attribute-values` and the put/delete input files contain.

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use serde::Deserialize;
use std::collections::HashMap;

use crate::Error;
use crate::table::types::Item;

/// A single typed value, externally tagged by its DynamoDB type descriptor
#[derive(Debug, Deserialize)]
enum TypedValue {
    S(String),
    N(String),
    B(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    M(HashMap<String, TypedValue>),
    L(Vec<TypedValue>),
    #[serde(rename = "SS")]
    Ss(Vec<String>),
    #[serde(rename = "NS")]
    Ns(Vec<String>),
    #[serde(rename = "BS")]
    Bs(Vec<String>),
}

impl TryFrom<TypedValue> for AttributeValue {
    type Error = Error;

    fn try_from(value: TypedValue) -> Result<Self, Self::Error> {
        Ok(match value {
            TypedValue::S(s) => AttributeValue::S(s),
            TypedValue::N(n) => AttributeValue::N(number(n)?),
            TypedValue::B(b) => AttributeValue::B(blob(&b)?),
            TypedValue::Bool(b) => AttributeValue::Bool(b),
            TypedValue::Null(n) => AttributeValue::Null(n),
            TypedValue::M(m) => AttributeValue::M(convert_map(m)?),
            TypedValue::L(l) => AttributeValue::L(
                l.into_iter()
                    .map(AttributeValue::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            TypedValue::Ss(ss) => AttributeValue::Ss(non_empty_set(ss, "SS")?),
            TypedValue::Ns(ns) => AttributeValue::Ns(
                non_empty_set(ns, "NS")?
                    .into_iter()
                    .map(number)
                    .collect::<Result<_, _>>()?,
            ),
            TypedValue::Bs(bs) => AttributeValue::Bs(
                non_empty_set(bs, "BS")?
                    .iter()
                    .map(|b| blob(b))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

fn number(n: String) -> Result<String, Error> {
    match n.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(n),
        _ => Err(Error::InvalidAttributeValue(format!("'{n}' is not a number"))),
    }
}

fn blob(encoded: &str) -> Result<Blob, Error> {
    aws_smithy_types::base64::decode(encoded)
        .map(Blob::new)
        .map_err(|e| Error::InvalidAttributeValue(format!("invalid base64 binary value: {e}")))
}

fn non_empty_set(values: Vec<String>, kind: &str) -> Result<Vec<String>, Error> {
    if values.is_empty() {
        return Err(Error::InvalidAttributeValue(format!(
            "{kind} sets cannot be empty"
        )));
    }
    Ok(values)
}

fn convert_map(map: HashMap<String, TypedValue>) -> Result<Item, Error> {
    map.into_iter()
        .map(|(key, value)| Ok((key, AttributeValue::try_from(value)?)))
        .collect()
}

/// Parse one typed-JSON object into an item
///
/// Used for expression attribute value maps such as
/// `{":cutoff": {"N": "1700000000"}}`.
pub fn parse_item(json: &str) -> Result<Item, Error> {
    let map: HashMap<String, TypedValue> = serde_json::from_str(json)?;
    convert_map(map)
}

/// Parse a typed-JSON array of objects into items
pub fn parse_items(json: &str) -> Result<Vec<Item>, Error> {
    let maps: Vec<HashMap<String, TypedValue>> = serde_json::from_str(json)?;
    maps.into_iter().map(convert_map).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalars() {
        let item = parse_item(
            r#"{
                ":s": {"S": "hello"},
                ":n": {"N": "42.5"},
                ":b": {"B": "aGVsbG8="},
                ":t": {"BOOL": true},
                ":z": {"NULL": true}
            }"#,
        )
        .unwrap();

        assert_eq!(item[":s"], AttributeValue::S("hello".into()));
        assert_eq!(item[":n"], AttributeValue::N("42.5".into()));
        assert_eq!(item[":b"], AttributeValue::B(Blob::new(b"hello".to_vec())));
        assert_eq!(item[":t"], AttributeValue::Bool(true));
        assert_eq!(item[":z"], AttributeValue::Null(true));
    }

    #[test]
    fn test_parse_nested_and_sets() {
        let item = parse_item(
            r#"{
                "m": {"M": {"inner": {"L": [{"S": "a"}, {"N": "1"}]}}},
                "ss": {"SS": ["a", "b"]},
                "ns": {"NS": ["1", "2.5"]},
                "bs": {"BS": ["aGk="]}
            }"#,
        )
        .unwrap();

        let expected_inner = AttributeValue::L(vec![
            AttributeValue::S("a".into()),
            AttributeValue::N("1".into()),
        ]);
        match &item["m"] {
            AttributeValue::M(m) => assert_eq!(m["inner"], expected_inner),
            other => panic!("unexpected value {other:?}"),
        }
        assert_eq!(item["ss"], AttributeValue::Ss(vec!["a".into(), "b".into()]));
        assert_eq!(item["ns"], AttributeValue::Ns(vec!["1".into(), "2.5".into()]));
        assert_eq!(item["bs"], AttributeValue::Bs(vec![Blob::new(b"hi".to_vec())]));
    }

    #[test]
    fn test_parse_items_array() {
        let items = parse_items(r#"[{"id": {"S": "1"}}, {"id": {"S": "2"}}]"#).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["id"], AttributeValue::S("2".into()));
    }

    #[test]
    fn test_rejects_unknown_type() {
        let err = parse_item(r#"{":x": {"X": "1"}}"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_rejects_bad_number() {
        let err = parse_item(r#"{":x": {"N": "one"}}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidAttributeValue(_)));
    }

    #[test]
    fn test_rejects_empty_set() {
        let err = parse_item(r#"{":x": {"SS": []}}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidAttributeValue(_)));
    }

    #[test]
    fn test_rejects_bad_base64() {
        let err = parse_item(r#"{":x": {"B": "***"}}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidAttributeValue(_)));
    }

    #[test]
    fn test_rejects_plain_json() {
        assert!(parse_item(r#"{":x": "plain"}"#).is_err());
    }
}
