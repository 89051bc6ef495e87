//! Table schema: ordered fields plus table-wide integrity declarations.
//!
//! A [`Schema`] is built once from a [`SchemaDescriptor`] (JSON or YAML, camelCase keys) and
//! validated on construction:
//!
//! - field names are unique
//! - every `primaryKey` name is a field
//! - every foreign key has as many local fields as referenced fields, and its local fields exist
//!
//! ```rust
//! use tabular_validate::schema::Schema;
//!
//! let schema = Schema::from_json_str(
//!     r#"{"fields": [{"name": "id", "type": "integer"}], "primaryKey": "id"}"#,
//! )
//! .unwrap();
//! assert_eq!(schema.primary_key(), ["id".to_string()]);
//! ```

pub mod cast;
pub mod field;
pub mod infer;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{TableError, TableResult};
use crate::types::FieldType;

pub use cast::{CastOptions, Format};
pub use field::{ConstraintsDescriptor, Field, FieldDescriptor, Note};
pub use infer::{InferOptions, infer_fields, normalize_names};

/// Target of a foreign key. An empty `resource` references the same table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub resource: String,
    #[serde(deserialize_with = "one_or_many")]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    #[serde(deserialize_with = "one_or_many")]
    pub fields: Vec<String>,
    pub reference: Reference,
}

impl ForeignKey {
    pub fn is_self_reference(&self) -> bool {
        self.reference.resource.is_empty()
    }
}

fn default_missing_values() -> Vec<String> {
    vec![String::new()]
}

/// Serializable schema descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDescriptor {
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default = "default_missing_values")]
    pub missing_values: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
}

impl Default for SchemaDescriptor {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            missing_values: default_missing_values(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }
}

/// Accept either `"id"` or `["id", "name"]`.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(name) => vec![name],
        OneOrMany::Many(names) => names,
    })
}

/// Ordered collection of fields; order drives positional cell alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Vec<Field>,
    missing_values: Vec<String>,
    primary_key: Vec<String>,
    foreign_keys: Vec<ForeignKey>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            missing_values: default_missing_values(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }
}

impl Schema {
    /// Build a schema from already constructed fields (no keys, default missing values).
    pub fn new(fields: Vec<Field>) -> TableResult<Self> {
        let schema = Self {
            fields,
            ..Default::default()
        };
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_descriptor(descriptor: SchemaDescriptor) -> TableResult<Self> {
        let mut fields = descriptor
            .fields
            .into_iter()
            .map(Field::from_descriptor)
            .collect::<TableResult<Vec<_>>>()?;
        for field in &mut fields {
            field.inherit_missing_values(&descriptor.missing_values);
        }
        let mut schema = Self {
            fields,
            missing_values: descriptor.missing_values,
            primary_key: descriptor.primary_key,
            foreign_keys: descriptor.foreign_keys,
        };
        schema.validate()?;
        schema.require_primary_key();
        Ok(schema)
    }

    pub fn from_json_str(input: &str) -> TableResult<Self> {
        Self::from_descriptor(serde_json::from_str(input)?)
    }

    pub fn from_yaml_str(input: &str) -> TableResult<Self> {
        Self::from_descriptor(serde_yaml::from_str(input)?)
    }

    /// Load a descriptor file; `.yaml`/`.yml` are read as YAML, anything else as JSON.
    pub fn from_path(path: impl AsRef<Path>) -> TableResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }

    /// Build from inferred or synthesized fields, applying schema-level missing values.
    pub(crate) fn from_fields(mut fields: Vec<Field>, missing_values: Vec<String>) -> Self {
        for field in &mut fields {
            field.inherit_missing_values(&missing_values);
        }
        Self {
            fields,
            missing_values,
            ..Default::default()
        }
    }

    pub fn to_descriptor(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            fields: self.fields.iter().map(|f| f.descriptor().clone()).collect(),
            missing_values: self.missing_values.clone(),
            primary_key: self.primary_key.clone(),
            foreign_keys: self.foreign_keys.clone(),
        }
    }

    pub fn to_json(&self) -> TableResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_descriptor())?)
    }

    pub fn to_yaml(&self) -> TableResult<String> {
        Ok(serde_yaml::to_string(&self.to_descriptor())?)
    }

    /// Check the schema invariants.
    pub fn validate(&self) -> TableResult<()> {
        let names = self.field_names();
        for (index, name) in names.iter().enumerate() {
            if names[..index].contains(name) {
                return Err(TableError::schema(format!("duplicate field name \"{name}\"")));
            }
        }
        for name in &self.primary_key {
            if !names.contains(&name.as_str()) {
                return Err(TableError::schema(format!(
                    "primary key field \"{name}\" does not exist"
                )));
            }
        }
        for fk in &self.foreign_keys {
            if fk.fields.len() != fk.reference.fields.len() {
                return Err(TableError::schema(format!(
                    "foreign key fields {:?} do not match reference fields {:?}",
                    fk.fields, fk.reference.fields
                )));
            }
            if let Some(name) = fk.fields.iter().find(|n| !names.contains(&n.as_str())) {
                return Err(TableError::schema(format!(
                    "foreign key field \"{name}\" does not exist"
                )));
            }
        }
        Ok(())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name() == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(Field::name).collect()
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    pub fn missing_values(&self) -> &[String] {
        &self.missing_values
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn set_primary_key(&mut self, names: Vec<String>) -> TableResult<()> {
        self.primary_key = names;
        self.validate()?;
        self.require_primary_key();
        Ok(())
    }

    /// Primary key fields never accept missing values.
    fn require_primary_key(&mut self) {
        for field in &mut self.fields {
            if self.primary_key.iter().any(|name| name == field.name()) {
                field.set_required(true);
            }
        }
    }

    pub fn add_foreign_key(&mut self, fk: ForeignKey) -> TableResult<()> {
        self.foreign_keys.push(fk);
        self.validate()
    }

    /// Apply a partial override and rebuild.
    ///
    /// `patch` has the descriptor shape except that `fields` is an object keyed by field name
    /// whose values are merged into the matching field descriptor:
    /// `{"fields": {"id": {"type": "string"}}, "primaryKey": ["id"]}`.
    pub fn patch(&self, patch: &serde_json::Value) -> TableResult<Self> {
        let serde_json::Value::Object(patch) = patch else {
            return Err(TableError::options("schema patch must be an object"));
        };
        let mut descriptor = serde_json::to_value(self.to_descriptor())?;
        for (key, value) in patch {
            if key == "fields" {
                let serde_json::Value::Object(by_name) = value else {
                    return Err(TableError::options(
                        "schema patch \"fields\" must be an object keyed by field name",
                    ));
                };
                let Some(fields) = descriptor.get_mut("fields").and_then(|f| f.as_array_mut()) else {
                    continue;
                };
                for field in fields.iter_mut() {
                    let update = field
                        .get("name")
                        .and_then(|n| n.as_str())
                        .and_then(|name| by_name.get(name))
                        .and_then(|u| u.as_object())
                        .cloned();
                    if let (Some(update), Some(target)) = (update, field.as_object_mut()) {
                        target.extend(update);
                    }
                }
            } else {
                descriptor[key] = value.clone();
            }
        }
        Self::from_descriptor(serde_json::from_value(descriptor)?)
    }

    /// Reorder and extend to match `names`: known fields follow the header order, unknown
    /// names get an `any` placeholder. Fields absent from `names` are dropped, and so are
    /// the primary and foreign keys naming them.
    pub(crate) fn synced_to(&self, names: &[String], case_sensitive: bool) -> Self {
        let fields = names
            .iter()
            .map(|name| {
                self.fields
                    .iter()
                    .find(|f| labels_match(f.name(), name, case_sensitive))
                    .cloned()
                    .unwrap_or_else(|| {
                        let mut field = Field::new(name.clone(), FieldType::Any);
                        field.inherit_missing_values(&self.missing_values);
                        field
                    })
            })
            .collect::<Vec<Field>>();
        let kept = |key: &[String]| key.iter().all(|name| fields.iter().any(|f| f.name() == name));
        let primary_key = if kept(&self.primary_key) {
            self.primary_key.clone()
        } else {
            log::debug!("dropping primary key {:?}: not all of its fields are in the header", self.primary_key);
            Vec::new()
        };
        let foreign_keys = self
            .foreign_keys
            .iter()
            .filter(|fk| kept(&fk.fields) && (!fk.is_self_reference() || kept(&fk.reference.fields)))
            .cloned()
            .collect();
        Self {
            fields,
            missing_values: self.missing_values.clone(),
            primary_key,
            foreign_keys,
        }
    }
}

pub(crate) fn labels_match(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive { a == b } else { a.to_lowercase() == b.to_lowercase() }
}

impl TryFrom<SchemaDescriptor> for Schema {
    type Error = TableError;

    fn try_from(descriptor: SchemaDescriptor) -> TableResult<Self> {
        Schema::from_descriptor(descriptor)
    }
}
