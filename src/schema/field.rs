//! Typed column definition.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{TableError, TableResult};
use crate::types::{Cell, FieldType, Value};

use super::cast::{self, CastOptions, Format};

/// Serializable constraint block of a field descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintsDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Cell>>,
}

impl ConstraintsDescriptor {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Serializable field descriptor (`{"name": ..., "type": ..., ...}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(default, rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "ConstraintsDescriptor::is_empty")]
    pub constraints: ConstraintsDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bare_number: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_char: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimal_char: Option<String>,
}

/// One cast/constraint note produced by [`Field::read_cell`] or [`Field::write_cell`].
///
/// `key` is `"type"` for cast failures, otherwise the constraint name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub key: &'static str,
    pub message: String,
}

impl Note {
    pub fn is_type(&self) -> bool {
        self.key == "type"
    }
}

#[derive(Debug, Clone, Default)]
struct Constraints {
    required: bool,
    unique: bool,
    min_length: Option<usize>,
    max_length: Option<usize>,
    minimum: Option<Value>,
    maximum: Option<Value>,
    pattern: Option<Regex>,
    enum_values: Option<Vec<Value>>,
}

/// A single typed column definition.
///
/// Built once from a [`FieldDescriptor`] (constraint literals are cast with the field's own
/// type at build time) and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Field {
    descriptor: FieldDescriptor,
    format: Format,
    options: CastOptions,
    constraints: Constraints,
    missing_values: Vec<String>,
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor && self.missing_values == other.missing_values
    }
}

impl Field {
    /// Create a field with the default format and no constraints.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            descriptor: FieldDescriptor {
                name: name.into(),
                field_type,
                ..Default::default()
            },
            format: Format::Default,
            options: CastOptions::default(),
            constraints: Constraints::default(),
            missing_values: vec![String::new()],
        }
    }

    /// Build a field from a descriptor, validating and compiling its constraints.
    pub fn from_descriptor(descriptor: FieldDescriptor) -> TableResult<Self> {
        if descriptor.name.is_empty() {
            return Err(TableError::schema("field name must not be empty"));
        }
        let field_type = descriptor.field_type;
        let format = Format::parse(descriptor.format.as_deref());

        let defaults = CastOptions::default();
        let options = CastOptions {
            true_values: descriptor.true_values.clone().unwrap_or(defaults.true_values),
            false_values: descriptor.false_values.clone().unwrap_or(defaults.false_values),
            bare_number: descriptor.bare_number.unwrap_or(defaults.bare_number),
            group_char: descriptor.group_char.clone(),
            decimal_char: descriptor.decimal_char.clone().unwrap_or(defaults.decimal_char),
        };

        let c = &descriptor.constraints;
        let unsupported = |name: &str| {
            TableError::schema(format!(
                "field \"{}\": constraint \"{name}\" is not supported by type \"{field_type}\"",
                descriptor.name
            ))
        };
        if (c.minimum.is_some() || c.maximum.is_some()) && !field_type.is_ordered() {
            return Err(unsupported(if c.minimum.is_some() { "minimum" } else { "maximum" }));
        }
        if (c.min_length.is_some() || c.max_length.is_some()) && !field_type.is_sized() {
            return Err(unsupported(if c.min_length.is_some() { "minLength" } else { "maxLength" }));
        }
        if c.pattern.is_some() && field_type != FieldType::String {
            return Err(unsupported("pattern"));
        }

        let literal = |raw: &Cell, constraint: &str| {
            cast::read(field_type, &format, &options, raw).ok_or_else(|| {
                TableError::schema(format!(
                    "field \"{}\": constraint \"{constraint}\" value {raw} is not a valid \"{field_type}\"",
                    descriptor.name
                ))
            })
        };
        let minimum = c.minimum.as_ref().map(|raw| literal(raw, "minimum")).transpose()?;
        let maximum = c.maximum.as_ref().map(|raw| literal(raw, "maximum")).transpose()?;
        let enum_values = c
            .enum_values
            .as_ref()
            .map(|items| items.iter().map(|raw| literal(raw, "enum")).collect::<TableResult<Vec<_>>>())
            .transpose()?;
        let pattern = c
            .pattern
            .as_ref()
            .map(|p| {
                Regex::new(&format!("^(?:{p})$")).map_err(|e| {
                    TableError::schema(format!(
                        "field \"{}\": invalid pattern \"{p}\": {e}",
                        descriptor.name
                    ))
                })
            })
            .transpose()?;

        let constraints = Constraints {
            required: c.required.unwrap_or(false),
            unique: c.unique.unwrap_or(false),
            min_length: c.min_length,
            max_length: c.max_length,
            minimum,
            maximum,
            pattern,
            enum_values,
        };
        let missing_values = descriptor
            .missing_values
            .clone()
            .unwrap_or_else(|| vec![String::new()]);

        Ok(Self {
            descriptor,
            format,
            options,
            constraints,
            missing_values,
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn field_type(&self) -> FieldType {
        self.descriptor.field_type
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }

    pub fn required(&self) -> bool {
        self.constraints.required
    }

    pub fn unique(&self) -> bool {
        self.constraints.unique
    }

    pub fn missing_values(&self) -> &[String] {
        &self.missing_values
    }

    /// Apply the schema-level missing values unless this field declares its own.
    pub(crate) fn inherit_missing_values(&mut self, values: &[String]) {
        if self.descriptor.missing_values.is_none() {
            self.missing_values = values.to_vec();
        }
    }

    pub(crate) fn set_required(&mut self, required: bool) {
        self.constraints.required = required;
    }

    /// Whether a raw cell is one of the missing-value tokens.
    pub fn is_missing(&self, cell: &Cell) -> bool {
        match cell {
            Cell::Null => true,
            Cell::String(s) => self.missing_values.iter().any(|m| m == s),
            _ => false,
        }
    }

    /// Cast a raw cell and evaluate constraints.
    ///
    /// Missing-value tokens yield `Null` without notes. A failed cast yields `Null` with a
    /// single `type` note. `unique` is not evaluated here; it needs the whole stream.
    pub fn read_cell(&self, cell: &Cell) -> (Value, Vec<Note>) {
        let mut notes = Vec::new();
        let value = if self.is_missing(cell) {
            Value::Null
        } else {
            match cast::read(self.field_type(), &self.format, &self.options, cell) {
                Some(v) => v,
                None => {
                    notes.push(Note {
                        key: "type",
                        message: self.type_note(),
                    });
                    return (Value::Null, notes);
                }
            }
        };

        let c = &self.constraints;
        if value.is_null() {
            if c.required {
                notes.push(constraint_note("required", "true"));
            }
            return (value, notes);
        }
        if let (Some(min), Some(len)) = (c.min_length, value.len()) {
            if len < min {
                notes.push(constraint_note("minLength", &min.to_string()));
            }
        }
        if let (Some(max), Some(len)) = (c.max_length, value.len()) {
            if len > max {
                notes.push(constraint_note("maxLength", &max.to_string()));
            }
        }
        if let Some(min) = &c.minimum {
            if value.partial_cmp(min).is_some_and(|o| o.is_lt()) {
                notes.push(constraint_note("minimum", &min.to_string()));
            }
        }
        if let Some(max) = &c.maximum {
            if value.partial_cmp(max).is_some_and(|o| o.is_gt()) {
                notes.push(constraint_note("maximum", &max.to_string()));
            }
        }
        if let (Some(pattern), Value::String(s)) = (&c.pattern, &value) {
            if !pattern.is_match(s) {
                let raw = self.descriptor.constraints.pattern.as_deref().unwrap_or_default();
                notes.push(constraint_note("pattern", raw));
            }
        }
        if let Some(allowed) = &c.enum_values {
            if !allowed.contains(&value) {
                let shown: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                notes.push(constraint_note("enum", &format!("[{}]", shown.join(", "))));
            }
        }
        (value, notes)
    }

    /// Serialize a typed value back to raw text.
    ///
    /// `Null` yields `None` without notes; a value of the wrong type yields `None` with a
    /// `type` note.
    pub fn write_cell(&self, value: &Value) -> (Option<String>, Vec<Note>) {
        if value.is_null() {
            return (None, Vec::new());
        }
        match cast::write(self.field_type(), &self.format, &self.options, value) {
            Some(raw) => (Some(raw), Vec::new()),
            None => (
                None,
                vec![Note {
                    key: "type",
                    message: self.type_note(),
                }],
            ),
        }
    }

    /// Cast a raw cell with type rules only (no missing values, no constraints).
    pub(crate) fn cast_only(&self, cell: &Cell) -> Option<Value> {
        cast::read(self.field_type(), &self.format, &self.options, cell)
    }

    fn type_note(&self) -> String {
        format!("type is \"{}/{}\"", self.field_type(), self.format.as_str())
    }
}

impl TryFrom<FieldDescriptor> for Field {
    type Error = TableError;

    fn try_from(descriptor: FieldDescriptor) -> TableResult<Self> {
        Field::from_descriptor(descriptor)
    }
}

fn constraint_note(name: &'static str, expected: &str) -> Note {
    Note {
        key: name,
        message: format!("constraint \"{name}\" is \"{expected}\""),
    }
}
