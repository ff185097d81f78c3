//! Loosely-typed structure records.
//!
//! Scripting callers hand structures over as JSON objects with the keys
//! `title`, `atoms`, `bonds` and `props`:
//!
//! ```json
//! {"title": "water",
//!  "props": {"r_m_energy": -76.4},
//!  "atoms": {"i_m_atomic_number": [8, 1, 1]},
//!  "bonds": {"i_m_from": [1, 1], "i_m_to": [2, 3]}}
//! ```
//!
//! Any other key is rejected before a [`Structure`] is built. JSON values are
//! converted under the type the property name's prefix declares, and `null`
//! stands for the undefined marker.

use serde_json::{Map, Number, Value as Json};

use crate::error::{MaeError, Result};
use crate::structure::Structure;
use crate::table::{ColumnTable, PropertyMap};
use crate::value::{PropertyName, Value, ValueKind};

pub const RECORD_KEYS: [&str; 4] = ["title", "atoms", "bonds", "props"];

/// Fail with a validation error naming every key outside [`RECORD_KEYS`].
pub fn check_record_keys<'a, I>(keys: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut extra: Vec<&str> = keys
        .into_iter()
        .filter(|key| !RECORD_KEYS.contains(key))
        .collect();
    if extra.is_empty() {
        return Ok(());
    }
    extra.sort_unstable();
    Err(MaeError::validation(format!(
        "unexpected keys in structure: {}",
        extra.join(", ")
    )))
}

/// Parse a JSON array of structure records.
pub fn structures_from_json(text: &str) -> Result<Vec<Structure>> {
    let json: Json = serde_json::from_str(text).map_err(|err| {
        MaeError::validation(format!("invalid structure records: {err}")).with_source(err)
    })?;
    let Json::Array(records) = json else {
        return Err(MaeError::validation("expected a JSON array of structure records"));
    };
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            structure_from_json_value(record).map_err(|err| err.context(format_args!("record {index}")))
        })
        .collect()
}

pub fn structure_from_json_value(record: Json) -> Result<Structure> {
    let Json::Object(mut fields) = record else {
        return Err(MaeError::validation("structure record must be a JSON object"));
    };
    check_record_keys(fields.keys().map(String::as_str))?;

    let title = match fields.remove("title") {
        None | Some(Json::Null) => None,
        Some(Json::String(title)) => Some(title),
        Some(other) => {
            return Err(MaeError::validation(format!(
                "title must be a string or null, got {other}"
            )))
        }
    };

    let mut properties = PropertyMap::new();
    for (key, value) in object_field(&mut fields, "props")? {
        let name: PropertyName = key.parse()?;
        let value = value_from_json(&name, value)?;
        properties.insert(name, value);
    }

    Ok(Structure {
        title,
        properties,
        atoms: table_from_json(object_field(&mut fields, "atoms")?)?,
        bonds: table_from_json(object_field(&mut fields, "bonds")?)?,
        ..Structure::default()
    })
}

pub fn structure_to_json_value(structure: &Structure) -> Result<Json> {
    let mut props = Map::new();
    for (name, value) in &structure.properties {
        props.insert(name.to_string(), value_to_json(value)?);
    }
    let mut record = Map::new();
    record.insert(
        "title".to_string(),
        structure.title.clone().map_or(Json::Null, Json::String),
    );
    record.insert("atoms".to_string(), table_to_json(&structure.atoms)?);
    record.insert("bonds".to_string(), table_to_json(&structure.bonds)?);
    record.insert("props".to_string(), Json::Object(props));
    Ok(Json::Object(record))
}

pub fn structures_to_json(structures: &[Structure]) -> Result<String> {
    let records = structures
        .iter()
        .map(structure_to_json_value)
        .collect::<Result<Vec<_>>>()?;
    serde_json::to_string_pretty(&records)
        .map_err(|err| MaeError::io(format!("failed to encode records: {err}")).with_source(err))
}

fn object_field(fields: &mut Map<String, Json>, key: &str) -> Result<Map<String, Json>> {
    match fields.remove(key) {
        None | Some(Json::Null) => Ok(Map::new()),
        Some(Json::Object(map)) => Ok(map),
        Some(other) => Err(MaeError::validation(format!(
            "'{key}' must be an object, got {other}"
        ))),
    }
}

fn table_from_json(columns: Map<String, Json>) -> Result<ColumnTable> {
    let mut table = ColumnTable::new();
    for (key, values) in columns {
        let name: PropertyName = key.parse()?;
        let Json::Array(values) = values else {
            return Err(MaeError::validation(format!(
                "column '{name}' must be a list of values"
            )));
        };
        let values = values
            .into_iter()
            .map(|value| value_from_json(&name, value))
            .collect::<Result<Vec<_>>>()?;
        table
            .push_column(name, values)
            .map_err(|err| MaeError::validation(err.message().to_string()))?;
    }
    Ok(table)
}

fn table_to_json(table: &ColumnTable) -> Result<Json> {
    let mut columns = Map::new();
    for (name, values) in table.iter() {
        let values = values.iter().map(value_to_json).collect::<Result<Vec<_>>>()?;
        columns.insert(name.to_string(), Json::Array(values));
    }
    Ok(Json::Object(columns))
}

/// Convert one JSON value under the kind `name` declares.
fn value_from_json(name: &PropertyName, json: Json) -> Result<Value> {
    let value = match (name.kind(), json) {
        (_, Json::Null) => Value::Undefined,
        (ValueKind::Boolean, Json::Bool(flag)) => Value::Boolean(flag),
        (ValueKind::String, Json::String(text)) => Value::String(text),
        (kind, Json::Number(number)) => match (kind, number.as_i64(), number.as_f64()) {
            (ValueKind::Boolean, Some(flag @ (0 | 1)), _) => Value::Integer(flag),
            (ValueKind::Integer, Some(integer), _) => Value::Integer(integer),
            (ValueKind::Real, _, Some(real)) => Value::Real(real),
            _ => return Err(mismatch(name, &Json::Number(number))),
        },
        (_, other) => return Err(mismatch(name, &other)),
    };
    Ok(value)
}

fn value_to_json(value: &Value) -> Result<Json> {
    let json = match value {
        Value::Undefined => Json::Null,
        Value::Boolean(flag) => Json::Bool(*flag),
        Value::Integer(number) => Json::Number((*number).into()),
        Value::Real(real) => Number::from_f64(*real).map(Json::Number).ok_or_else(|| {
            MaeError::type_error(format!("real value {real} has no JSON representation"))
        })?,
        Value::String(text) => Json::String(text.clone()),
    };
    Ok(json)
}

fn mismatch(name: &PropertyName, json: &Json) -> MaeError {
    MaeError::type_error(format!(
        "'{name}' is a {} property but got {json}",
        name.kind()
    ))
}
