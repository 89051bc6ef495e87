//! Resource and package descriptors.
//!
//! A [`Resource`] bundles everything a [`crate::table::Table`] needs before it is opened:
//! the [`File`], [`Dialect`], [`Layout`], an optional [`Schema`], [`Detector`] settings and
//! the expected [`Stats`]. Descriptors are JSON or YAML with camelCase keys:
//!
//! ```yaml
//! name: countries
//! path: countries.csv
//! dialect: {csv: {delimiter: ";"}}
//! schema: countries.schema.json
//! stats: {rows: 3}
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::detector::Detector;
use crate::dialect::Dialect;
use crate::error::{TableError, TableResult};
use crate::file::{Compression, File, Hashing, Stats};
use crate::layout::{Layout, LayoutDescriptor};
use crate::schema::{Schema, SchemaDescriptor};
use crate::types::Cell;

/// A schema given inline or as a path to a descriptor file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaSource {
    Path(String),
    Inline(SchemaDescriptor),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Inline rows, header first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Vec<Cell>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<Compression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashing: Option<Hashing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<Dialect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
}

/// A table source with all of its pre-open settings.
#[derive(Debug, Clone)]
pub struct Resource {
    pub name: String,
    pub file: File,
    pub dialect: Dialect,
    pub layout: Layout,
    pub schema: Option<Schema>,
    pub detector: Detector,
    /// Expected stats compared by the integrity check.
    pub stats: Stats,
}

impl Resource {
    pub fn new(file: File) -> Self {
        Self {
            name: file.name(),
            file,
            dialect: Dialect::default(),
            layout: Layout::default(),
            schema: None,
            detector: Detector::default(),
            stats: Stats::default(),
        }
    }

    /// Build from a descriptor; relative paths resolve against `base`.
    pub fn from_descriptor(descriptor: ResourceDescriptor, base: Option<&Path>) -> TableResult<Self> {
        let resolve = |path: &str| -> PathBuf {
            match base {
                Some(dir) if Path::new(path).is_relative() => dir.join(path),
                _ => PathBuf::from(path),
            }
        };

        let mut file = match (&descriptor.path, descriptor.data) {
            (Some(path), None) => File::from_path(resolve(path)),
            (None, Some(rows)) => File::from_rows(rows),
            (Some(_), Some(_)) => {
                return Err(TableError::options("resource has both \"path\" and \"data\""));
            }
            (None, None) => return Err(TableError::options("resource needs \"path\" or \"data\"")),
        };
        if let Some(scheme) = descriptor.scheme {
            file = file.with_scheme(scheme);
        }
        if let Some(format) = descriptor.format {
            file = file.with_format(format);
        }
        if let Some(compression) = descriptor.compression {
            file = file.with_compression(Some(compression));
        }
        if let Some(member) = descriptor.compression_path {
            file = file.with_compression_path(member);
        }
        if let Some(encoding) = descriptor.encoding {
            file = file.with_encoding(encoding);
        }
        if let Some(hashing) = descriptor.hashing {
            file = file.with_hashing(hashing);
        }

        let dialect = descriptor.dialect.unwrap_or_default();
        dialect.validate()?;
        let layout = match &descriptor.layout {
            Some(layout) => Layout::try_from(layout)?,
            None => Layout::default(),
        };
        let schema = match descriptor.schema {
            Some(SchemaSource::Path(path)) => Some(Schema::from_path(resolve(&path))?),
            Some(SchemaSource::Inline(schema)) => Some(Schema::from_descriptor(schema)?),
            None => None,
        };

        let mut resource = Self::new(file);
        if let Some(name) = descriptor.name {
            resource.name = name;
        }
        resource.dialect = dialect;
        resource.layout = layout;
        resource.schema = schema;
        resource.stats = descriptor.stats.unwrap_or_default();
        Ok(resource)
    }

    pub fn from_json_str(input: &str) -> TableResult<Self> {
        Self::from_descriptor(serde_json::from_str(input)?, None)
    }

    pub fn from_yaml_str(input: &str) -> TableResult<Self> {
        Self::from_descriptor(serde_yaml::from_str(input)?, None)
    }

    /// Load a descriptor file (`.yaml`/`.yml` as YAML, otherwise JSON); data and schema
    /// paths are relative to the descriptor's directory.
    pub fn from_path(path: impl AsRef<Path>) -> TableResult<Self> {
        let path = path.as_ref();
        let descriptor: ResourceDescriptor = read_descriptor(path)?;
        Self::from_descriptor(descriptor, path.parent())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
}

/// A set of named resources validated together; foreign keys may reference siblings.
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub name: Option<String>,
    pub resources: Vec<Resource>,
}

impl Package {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self { name: None, resources }
    }

    pub fn from_descriptor(descriptor: PackageDescriptor, base: Option<&Path>) -> TableResult<Self> {
        let resources = descriptor
            .resources
            .into_iter()
            .map(|r| Resource::from_descriptor(r, base))
            .collect::<TableResult<Vec<_>>>()?;
        let mut names: Vec<&str> = resources.iter().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(TableError::options(format!("duplicate resource name \"{}\"", pair[0])));
        }
        Ok(Self {
            name: descriptor.name,
            resources,
        })
    }

    pub fn from_json_str(input: &str) -> TableResult<Self> {
        Self::from_descriptor(serde_json::from_str(input)?, None)
    }

    pub fn from_path(path: impl AsRef<Path>) -> TableResult<Self> {
        let path = path.as_ref();
        let descriptor: PackageDescriptor = read_descriptor(path)?;
        Self::from_descriptor(descriptor, path.parent())
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }
}

fn read_descriptor<T: serde::de::DeserializeOwned>(path: &Path) -> TableResult<T> {
    let text = fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => Ok(serde_yaml::from_str(&text)?),
        _ => Ok(serde_json::from_str(&text)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::Source;

    #[test]
    fn inline_resource_with_schema_and_stats() {
        let resource = Resource::from_json_str(
            r#"{
                "name": "people",
                "data": [["id", "name"], [1, "a"]],
                "schema": {"fields": [{"name": "id", "type": "integer"}, {"name": "name", "type": "string"}]},
                "stats": {"rows": 1},
                "layout": {"limitRows": 10}
            }"#,
        )
        .unwrap();
        assert_eq!(resource.name, "people");
        assert!(matches!(resource.file.source(), Source::Inline(_)));
        assert_eq!(resource.schema.unwrap().len(), 2);
        assert_eq!(resource.stats.rows, Some(1));
        assert_eq!(resource.layout.limit_rows, Some(10));
    }

    #[test]
    fn yaml_resource_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("s.yaml"), "fields:\n  - name: id\n    type: integer\n").unwrap();
        let descriptor = dir.path().join("r.yaml");
        fs::write(&descriptor, "path: data.csv.gz\nschema: s.yaml\ndialect: {header: false}\n").unwrap();

        let resource = Resource::from_path(&descriptor).unwrap();
        assert_eq!(resource.name, "data");
        assert_eq!(resource.file.format(), Some("csv"));
        assert_eq!(resource.file.compression(), Some(Compression::Gz));
        assert!(!resource.dialect.header);
        assert_eq!(resource.schema.unwrap().field_names(), vec!["id"]);
        assert!(matches!(resource.file.source(), Source::Path(p) if p.starts_with(dir.path())));
    }

    #[test]
    fn package_rejects_duplicate_names() {
        let err = Package::from_json_str(
            r#"{"resources": [{"name": "a", "data": [["x"]]}, {"name": "a", "data": [["y"]]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TableError::Options { .. }));
        assert!(Resource::from_json_str(r#"{"name": "x"}"#).is_err());
    }
}
