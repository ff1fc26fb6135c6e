//! Canonical schema and per-source field mappings.
//!
//! The [`SchemaRegistry`] owns the ordered catalog of canonical fields and,
//! for every configured source, a bidirectional mapping between canonical
//! names and the source's native names. It is built once at startup and is
//! read-only afterwards, so it can be shared across concurrent sync runs.

use crate::{error::Result, ConfigError, Error, FieldName, FieldValue, NativeName, SourceId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Value types a canonical field can declare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Integer,
    Bool,
    /// Calendar date without time of day
    Date,
    /// One of a closed set of variants
    Enum(Vec<String>),
    Binary,
    /// List of text items (multi-select picklists and the like)
    List,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Text => write!(f, "text"),
            FieldType::Integer => write!(f, "integer"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Date => write!(f, "date"),
            FieldType::Enum(variants) => write!(f, "enum({})", variants.join("|")),
            FieldType::Binary => write!(f, "binary"),
            FieldType::List => write!(f, "list"),
        }
    }
}

/// A logical attribute of a record, named independently of any source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalField {
    /// Canonical field name
    pub name: FieldName,
    /// Declared value type
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl CanonicalField {
    /// Create a new canonical field.
    pub fn new(name: impl Into<FieldName>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    /// Create a text field.
    pub fn text(name: impl Into<FieldName>) -> Self {
        Self::new(name, FieldType::Text)
    }

    /// Check that a value matches the declared type.
    pub fn check(&self, value: &FieldValue) -> Result<()> {
        match (&self.field_type, value) {
            (FieldType::Text, FieldValue::Text(_))
            | (FieldType::Integer, FieldValue::Integer(_))
            | (FieldType::Bool, FieldValue::Bool(_))
            | (FieldType::Date, FieldValue::Date(_))
            | (FieldType::Binary, FieldValue::Binary(_))
            | (FieldType::List, FieldValue::List(_)) => Ok(()),
            (FieldType::Enum(variants), FieldValue::Enum(v)) => {
                if variants.contains(v) {
                    Ok(())
                } else {
                    Err(self.mismatch(format!("enum variant '{}'", v)))
                }
            }
            (_, other) => Err(self.mismatch(other.type_name())),
        }
    }

    /// Convert a JSON value into a typed value. `null` means unset.
    pub fn value_from_json(&self, raw: &serde_json::Value) -> Result<Option<FieldValue>> {
        use serde_json::Value as Json;

        let value = match (&self.field_type, raw) {
            (_, Json::Null) => return Ok(None),
            (FieldType::Text, Json::String(s)) => FieldValue::Text(s.clone()),
            (FieldType::Integer, Json::Number(n)) => n
                .as_i64()
                .map(FieldValue::Integer)
                .ok_or_else(|| self.mismatch("float"))?,
            (FieldType::Bool, Json::Bool(b)) => FieldValue::Bool(*b),
            (FieldType::Date, Json::String(s)) => {
                FieldValue::Date(parse_date(s).ok_or_else(|| self.mismatch(format!("'{}'", s)))?)
            }
            (FieldType::Enum(_), Json::String(s)) => FieldValue::Enum(s.clone()),
            (FieldType::Binary, Json::String(s)) => FieldValue::Binary(
                hex::decode(s).map_err(|_| self.mismatch("non-hex string"))?,
            ),
            (FieldType::List, Json::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(FieldValue::List)
                .ok_or_else(|| self.mismatch("array with non-text items"))?,
            (_, other) => return Err(self.mismatch(json_type_name(other))),
        };

        self.check(&value)?;
        Ok(Some(value))
    }

    /// Parse the textual rendering of a value (as SQL text casts produce it).
    pub fn parse_text(&self, raw: &str) -> Result<FieldValue> {
        let bad = || self.mismatch(format!("'{}'", raw));

        let value = match &self.field_type {
            FieldType::Text => FieldValue::Text(raw.to_string()),
            FieldType::Integer => FieldValue::Integer(raw.trim().parse().map_err(|_| bad())?),
            FieldType::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "1" | "yes" => FieldValue::Bool(true),
                "f" | "false" | "0" | "no" => FieldValue::Bool(false),
                _ => return Err(bad()),
            },
            FieldType::Date => FieldValue::Date(parse_date(raw.trim()).ok_or_else(bad)?),
            FieldType::Enum(_) => FieldValue::Enum(raw.to_string()),
            FieldType::Binary => {
                let digits = raw.trim().trim_start_matches("\\x");
                FieldValue::Binary(hex::decode(digits).map_err(|_| bad())?)
            }
            FieldType::List => FieldValue::List(serde_json::from_str(raw).map_err(|_| bad())?),
        };

        self.check(&value)?;
        Ok(value)
    }

    fn mismatch(&self, got: impl Into<String>) -> Error {
        Error::TypeMismatch {
            field: self.name.clone(),
            expected: self.field_type.to_string(),
            got: got.into(),
        }
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        serde_json::Value::Number(_) => "float",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Declared configuration of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// Stable source identifier
    pub id: SourceId,
    /// Explicit priority rank; lower ranks win timestamp ties. Sources without
    /// a rank follow ranked ones, in declaration order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    /// Canonical field name to native field name
    pub mapping: BTreeMap<FieldName, NativeName>,
}

impl SourceConfig {
    /// Create a source with an empty mapping.
    pub fn new(id: impl Into<SourceId>) -> Self {
        Self {
            id: id.into(),
            priority: None,
            mapping: BTreeMap::new(),
        }
    }

    /// Set an explicit priority rank.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Map a canonical field onto a native field name.
    pub fn map(mut self, canonical: impl Into<FieldName>, native: impl Into<NativeName>) -> Self {
        self.mapping.insert(canonical.into(), native.into());
        self
    }
}

/// Serializable registry configuration: the catalog plus every source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaConfig {
    pub fields: Vec<CanonicalField>,
    pub sources: Vec<SourceConfig>,
}

impl SchemaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style method to add a canonical field.
    pub fn with_field(mut self, field: CanonicalField) -> Self {
        self.fields.push(field);
        self
    }

    /// Builder-style method to add a source.
    pub fn with_source(mut self, source: SourceConfig) -> Self {
        self.sources.push(source);
        self
    }
}

/// Validated, bidirectional mapping for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMapping {
    id: SourceId,
    rank: usize,
    to_native: HashMap<FieldName, NativeName>,
    to_canonical: HashMap<NativeName, FieldName>,
}

impl SourceMapping {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Position in priority order, 0 being the highest priority.
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn native_name(&self, field: &str) -> Option<&str> {
        self.to_native.get(field).map(String::as_str)
    }

    pub fn canonical_name(&self, native: &str) -> Option<&str> {
        self.to_canonical.get(native).map(String::as_str)
    }

    /// Whether this source participates in sync for a canonical field.
    pub fn maps(&self, field: &str) -> bool {
        self.to_native.contains_key(field)
    }
}

/// The canonical catalog plus every source mapping, in priority order.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    fields: Vec<CanonicalField>,
    field_index: HashMap<FieldName, usize>,
    sources: Vec<SourceMapping>,
    source_index: HashMap<SourceId, usize>,
}

impl SchemaRegistry {
    /// Validate a configuration and build the registry.
    ///
    /// Fails on the first problem found; a mapping that references a field
    /// outside the catalog is an error, never silently dropped.
    pub fn from_config(config: SchemaConfig) -> std::result::Result<Self, ConfigError> {
        if config.fields.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }

        let mut field_index = HashMap::with_capacity(config.fields.len());
        for (idx, field) in config.fields.iter().enumerate() {
            if matches!(&field.field_type, FieldType::Enum(v) if v.is_empty()) {
                return Err(ConfigError::EmptyEnum(field.name.clone()));
            }
            if field_index.insert(field.name.clone(), idx).is_some() {
                return Err(ConfigError::DuplicateField(field.name.clone()));
            }
        }

        if config.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        // Stable sort keeps declaration order among equal ranks.
        let mut ordered = config.sources;
        ordered.sort_by_key(|s| s.priority.unwrap_or(u32::MAX));

        let mut sources = Vec::with_capacity(ordered.len());
        let mut source_index = HashMap::with_capacity(ordered.len());

        for (rank, source) in ordered.into_iter().enumerate() {
            if source_index.insert(source.id.clone(), rank).is_some() {
                return Err(ConfigError::DuplicateSource(source.id));
            }
            if source.mapping.is_empty() {
                return Err(ConfigError::EmptyMapping(source.id));
            }

            let mut to_native = HashMap::with_capacity(source.mapping.len());
            let mut to_canonical = HashMap::with_capacity(source.mapping.len());
            for (canonical, native) in source.mapping {
                if !field_index.contains_key(&canonical) {
                    return Err(ConfigError::UnknownField {
                        source_id: source.id,
                        field: canonical,
                    });
                }
                if to_canonical.insert(native.clone(), canonical.clone()).is_some() {
                    return Err(ConfigError::DuplicateNativeName {
                        source_id: source.id,
                        native,
                    });
                }
                to_native.insert(canonical, native);
            }

            sources.push(SourceMapping {
                id: source.id,
                rank,
                to_native,
                to_canonical,
            });
        }

        Ok(Self {
            fields: config.fields,
            field_index,
            sources,
            source_index,
        })
    }

    /// Parse a JSON schema document and build the registry.
    pub fn from_json_str(json: &str) -> std::result::Result<Self, ConfigError> {
        let config: SchemaConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_config(config)
    }

    /// The canonical catalog, in declaration order.
    pub fn canonical_fields(&self) -> &[CanonicalField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&CanonicalField> {
        self.field_index.get(name).map(|&idx| &self.fields[idx])
    }

    /// All sources, highest priority first.
    pub fn sources(&self) -> &[SourceMapping] {
        &self.sources
    }

    pub fn source(&self, id: &str) -> Option<&SourceMapping> {
        self.source_index.get(id).map(|&idx| &self.sources[idx])
    }

    /// Priority rank of a source (0 is highest).
    pub fn priority_of(&self, source: &str) -> Option<usize> {
        self.source_index.get(source).copied()
    }

    pub fn native_name_for(&self, source: &str, field: &str) -> Option<&str> {
        self.source(source)?.native_name(field)
    }

    pub fn canonical_name_for(&self, source: &str, native: &str) -> Option<&str> {
        self.source(source)?.canonical_name(native)
    }

    /// Sources that participate in sync for a field, highest priority first.
    pub fn participants<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a SourceMapping> {
        self.sources.iter().filter(move |s| s.maps(field))
    }

    /// Canonical fields a source maps, with their native names, in catalog order.
    pub fn native_fields(&self, source: &str) -> Vec<(&CanonicalField, &str)> {
        let Some(mapping) = self.source(source) else {
            return Vec::new();
        };
        self.fields
            .iter()
            .filter_map(|f| mapping.native_name(&f.name).map(|native| (f, native)))
            .collect()
    }

    /// Check a value against the declared type of a canonical field.
    pub fn check_value(&self, field: &str, value: &FieldValue) -> Result<()> {
        self.field(field)
            .ok_or_else(|| Error::UnknownField(field.to_string()))?
            .check(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config() -> SchemaConfig {
        SchemaConfig::new()
            .with_field(CanonicalField::text("email"))
            .with_field(CanonicalField::text("name"))
            .with_field(CanonicalField::new(
                "language",
                FieldType::Enum(vec!["en".into(), "de".into()]),
            ))
            .with_source(
                SourceConfig::new("mysql")
                    .map("email", "email")
                    .map("name", "name"),
            )
            .with_source(
                SourceConfig::new("zoho")
                    .map("email", "Email")
                    .map("name", "Last_Name")
                    .map("language", "Language"),
            )
    }

    #[test]
    fn bidirectional_lookup() {
        let registry = SchemaRegistry::from_config(test_config()).unwrap();

        assert_eq!(registry.native_name_for("zoho", "name"), Some("Last_Name"));
        assert_eq!(registry.canonical_name_for("zoho", "Last_Name"), Some("name"));
        assert_eq!(registry.native_name_for("mysql", "language"), None);
        assert_eq!(registry.native_name_for("hubspot", "email"), None);
    }

    #[test]
    fn catalog_order_is_preserved() {
        let registry = SchemaRegistry::from_config(test_config()).unwrap();
        let names: Vec<_> = registry
            .canonical_fields()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["email", "name", "language"]);
    }

    #[test]
    fn declaration_order_is_priority() {
        let registry = SchemaRegistry::from_config(test_config()).unwrap();
        assert_eq!(registry.priority_of("mysql"), Some(0));
        assert_eq!(registry.priority_of("zoho"), Some(1));
    }

    #[test]
    fn explicit_priority_overrides_declaration_order() {
        let mut config = test_config();
        config.sources[1].priority = Some(1);
        let registry = SchemaRegistry::from_config(config).unwrap();

        let ids: Vec<_> = registry.sources().iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["zoho", "mysql"]);
        assert_eq!(registry.source("zoho").unwrap().rank(), 0);
    }

    #[test]
    fn participants_skip_unmapped_sources() {
        let registry = SchemaRegistry::from_config(test_config()).unwrap();
        let ids: Vec<_> = registry.participants("language").map(|s| s.id()).collect();
        assert_eq!(ids, vec!["zoho"]);
    }

    #[test]
    fn native_fields_in_catalog_order() {
        let registry = SchemaRegistry::from_config(test_config()).unwrap();
        let natives: Vec<_> = registry
            .native_fields("zoho")
            .into_iter()
            .map(|(_, native)| native)
            .collect();
        assert_eq!(natives, vec!["Email", "Last_Name", "Language"]);
        assert!(registry.native_fields("unknown").is_empty());
    }

    #[test]
    fn reject_mapping_outside_catalog() {
        // Bookkeeping columns are not canonical fields.
        let config = test_config().with_source(
            SourceConfig::new("legacy")
                .map("email", "email")
                .map("updated_at", "updated_at"),
        );
        let err = SchemaRegistry::from_config(config).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownField {
                source_id: "legacy".into(),
                field: "updated_at".into(),
            }
        );
    }

    #[test]
    fn reject_duplicate_native_name() {
        let config = test_config().with_source(
            SourceConfig::new("sheet")
                .map("email", "contact")
                .map("name", "contact"),
        );
        assert!(matches!(
            SchemaRegistry::from_config(config),
            Err(ConfigError::DuplicateNativeName { native, .. }) if native == "contact"
        ));
    }

    #[test]
    fn reject_invalid_catalogs() {
        assert_eq!(
            SchemaRegistry::from_config(SchemaConfig::new()).unwrap_err(),
            ConfigError::EmptyCatalog
        );

        let config = test_config().with_field(CanonicalField::text("email"));
        assert_eq!(
            SchemaRegistry::from_config(config).unwrap_err(),
            ConfigError::DuplicateField("email".into())
        );

        let config = test_config().with_field(CanonicalField::new("tier", FieldType::Enum(vec![])));
        assert_eq!(
            SchemaRegistry::from_config(config).unwrap_err(),
            ConfigError::EmptyEnum("tier".into())
        );
    }

    #[test]
    fn reject_invalid_sources() {
        let mut config = test_config();
        config.sources.clear();
        assert_eq!(
            SchemaRegistry::from_config(config).unwrap_err(),
            ConfigError::NoSources
        );

        let config = test_config().with_source(SourceConfig::new("mysql").map("email", "mail"));
        assert_eq!(
            SchemaRegistry::from_config(config).unwrap_err(),
            ConfigError::DuplicateSource("mysql".into())
        );

        let config = test_config().with_source(SourceConfig::new("empty"));
        assert_eq!(
            SchemaRegistry::from_config(config).unwrap_err(),
            ConfigError::EmptyMapping("empty".into())
        );
    }

    #[test]
    fn value_from_json_by_type() {
        let language = CanonicalField::new("language", FieldType::Enum(vec!["en".into()]));
        assert_eq!(
            language.value_from_json(&json!("en")).unwrap(),
            Some(FieldValue::Enum("en".into()))
        );
        assert_eq!(language.value_from_json(&json!(null)).unwrap(), None);
        assert!(matches!(
            language.value_from_json(&json!("fr")),
            Err(Error::TypeMismatch { field, .. }) if field == "language"
        ));

        let verified = CanonicalField::new("email_verified", FieldType::Bool);
        assert!(matches!(
            verified.value_from_json(&json!("yes")),
            Err(Error::TypeMismatch { got, .. }) if got == "string"
        ));

        let interests = CanonicalField::new("interests", FieldType::List);
        assert_eq!(
            interests.value_from_json(&json!(["hiking", "chess"])).unwrap(),
            Some(FieldValue::List(vec!["hiking".into(), "chess".into()]))
        );
        assert!(interests.value_from_json(&json!(["hiking", 3])).is_err());
    }

    #[test]
    fn parse_text_by_type() {
        let birth = CanonicalField::new("date_of_birth", FieldType::Date);
        assert_eq!(
            birth.parse_text("1990-04-12").unwrap(),
            FieldValue::Date(NaiveDate::from_ymd_opt(1990, 4, 12).unwrap())
        );
        assert!(birth.parse_text("12/04/1990").is_err());

        let verified = CanonicalField::new("email_verified", FieldType::Bool);
        assert_eq!(verified.parse_text("t").unwrap(), FieldValue::Bool(true));

        let photo = CanonicalField::new("photo", FieldType::Binary);
        assert_eq!(
            photo.parse_text("\\xcafe").unwrap(),
            FieldValue::Binary(vec![0xca, 0xfe])
        );

        let tags = CanonicalField::new("interests", FieldType::List);
        assert_eq!(
            tags.parse_text(r#"["a","b"]"#).unwrap(),
            FieldValue::List(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn check_value_against_catalog() {
        let registry = SchemaRegistry::from_config(test_config()).unwrap();
        assert!(registry.check_value("name", &FieldValue::from("Alice")).is_ok());
        assert!(registry.check_value("name", &FieldValue::Integer(1)).is_err());
        assert_eq!(
            registry.check_value("nickname", &FieldValue::from("Al")),
            Err(Error::UnknownField("nickname".into()))
        );
    }

    #[test]
    fn schema_document_parsing() {
        let doc = r#"{
            "fields": [
                {"name": "email", "type": "text"},
                {"name": "language", "type": {"enum": ["en", "de"]}}
            ],
            "sources": [
                {"id": "zoho", "priority": 2, "mapping": {"email": "Email", "language": "Language"}},
                {"id": "mysql", "priority": 1, "mapping": {"email": "email"}}
            ]
        }"#;
        let registry = SchemaRegistry::from_json_str(doc).unwrap();
        assert_eq!(registry.sources()[0].id(), "mysql");
        assert_eq!(
            registry.field("language").unwrap().field_type,
            FieldType::Enum(vec!["en".into(), "de".into()])
        );

        assert!(matches!(
            SchemaRegistry::from_json_str("{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn field_type_display() {
        assert_eq!(FieldType::Text.to_string(), "text");
        assert_eq!(
            FieldType::Enum(vec!["en".into(), "de".into()]).to_string(),
            "enum(en|de)"
        );
    }
}
