//! JSON parser.
//!
//! Supported inputs:
//! - an array of objects (`keyed`): the first record emitted is the key list, followed by one
//!   record per object in key order
//! - an array of arrays: emitted as is
//! - newline-delimited JSON (NDJSON) of either shape
//!
//! `dialect.json.property` selects a nested array by dot path (e.g. `data.items`).

use std::io::Read;

use serde_json::{Map, Value as Json};

use crate::dialect::{Dialect, JsonControl};
use crate::error::{TableError, TableResult};
use crate::types::Cell;

use super::{ParserInput, Parser, RecordStream};

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn open(&self, input: ParserInput, dialect: &Dialect) -> TableResult<RecordStream> {
        let ParserInput::Stream(mut stream) = input else {
            return Err(TableError::source("json parser expects a byte stream"));
        };
        let mut text = String::new();
        stream.read_to_string(&mut text)?;
        let items = read_items(&text, &dialect.json)?;
        let records = to_records(items, &dialect.json)?;
        Ok(Box::new(records.into_iter().map(Ok)))
    }
}

fn read_items(text: &str, control: &JsonControl) -> TableResult<Vec<Json>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    // A single document first, NDJSON as fallback.
    match serde_json::from_str::<Json>(trimmed) {
        Ok(document) => {
            let target = match &control.property {
                Some(path) => get_by_dot_path(&document, path).ok_or_else(|| {
                    TableError::source(format!("json property \"{path}\" not found"))
                })?,
                None => &document,
            };
            match target {
                Json::Array(items) => Ok(items.clone()),
                Json::Object(_) if control.property.is_none() => Ok(vec![target.clone()]),
                _ => Err(TableError::source(
                    "json must be an array of objects or arrays, or NDJSON",
                )),
            }
        }
        Err(_) => trimmed
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str::<Json>(line.trim())
                    .map_err(|e| TableError::source(format!("invalid ndjson at line {}: {e}", i + 1)))
            })
            .collect(),
    }
}

fn get_by_dot_path<'a>(root: &'a Json, path: &str) -> Option<&'a Json> {
    path.split('.')
        .try_fold(root, |current, segment| match current {
            Json::Object(map) => map.get(segment),
            _ => None,
        })
}

fn to_records(items: Vec<Json>, control: &JsonControl) -> TableResult<Vec<Vec<Cell>>> {
    let keyed = control
        .keyed
        .unwrap_or_else(|| matches!(items.first(), Some(Json::Object(_))));
    if !keyed {
        return items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Json::Array(cells) => Ok(cells),
                _ => Err(TableError::source(format!("json item {} is not an array", i + 1))),
            })
            .collect();
    }

    let objects: Vec<Map<String, Json>> = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Json::Object(map) => Ok(map),
            _ => Err(TableError::source(format!("json item {} is not an object", i + 1))),
        })
        .collect::<TableResult<_>>()?;

    let keys: Vec<String> = match &control.keys {
        Some(keys) => keys.clone(),
        None => {
            let mut keys: Vec<String> = Vec::new();
            for object in &objects {
                for key in object.keys() {
                    if !keys.contains(key) {
                        keys.push(key.clone());
                    }
                }
            }
            keys
        }
    };

    let mut records = Vec::with_capacity(objects.len() + 1);
    records.push(keys.iter().cloned().map(Cell::String).collect());
    for object in objects {
        records.push(
            keys.iter()
                .map(|k| object.get(k).cloned().unwrap_or(Cell::Null))
                .collect(),
        );
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serde_json::json;

    use super::*;

    fn parse(text: &str, dialect: &Dialect) -> TableResult<Vec<Vec<Cell>>> {
        let input = ParserInput::Stream(Box::new(Cursor::new(text.as_bytes().to_vec())));
        JsonParser.open(input, dialect)?.collect()
    }

    #[test]
    fn keyed_objects_emit_header_first() {
        let rows = parse(r#"[{"id": 1, "name": "a"}, {"name": "b", "id": 2, "extra": true}]"#, &Dialect::default())
            .unwrap();
        assert_eq!(rows[0], vec![json!("id"), json!("name"), json!("extra")]);
        assert_eq!(rows[1], vec![json!(1), json!("a"), Cell::Null]);
        assert_eq!(rows[2], vec![json!(2), json!("b"), json!(true)]);
    }

    #[test]
    fn arrays_and_ndjson() {
        let rows = parse(r#"[["id", "name"], [1, "a"]]"#, &Dialect::default()).unwrap();
        assert_eq!(rows[1], vec![json!(1), json!("a")]);

        let rows = parse("{\"id\": 1}\n\n{\"id\": 2}\n", &Dialect::default()).unwrap();
        assert_eq!(rows, vec![vec![json!("id")], vec![json!(1)], vec![json!(2)]]);
    }

    #[test]
    fn property_path_and_explicit_keys() {
        let mut dialect = Dialect::default();
        dialect.json.property = Some("data.items".into());
        dialect.json.keys = Some(vec!["name".into()]);
        let rows = parse(r#"{"data": {"items": [{"id": 1, "name": "a"}]}}"#, &dialect).unwrap();
        assert_eq!(rows, vec![vec![json!("name")], vec![json!("a")]]);

        dialect.json.property = Some("missing".into());
        assert!(parse(r#"{"data": []}"#, &dialect).is_err());
    }

    #[test]
    fn rejects_scalars() {
        assert!(parse("[1, 2]", &Dialect::default()).is_err());
        assert!(parse("{oops", &Dialect::default()).is_err());
    }
}
