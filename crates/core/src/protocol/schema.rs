//! # Schema Registry
//!
//! Maps each data_type to its mandatory fields and their value kinds, which
//! turns "completeness" into a structural check over typed payloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::payload::{
    BrandData, DataType, FieldValue, MarketSize, Payload, Pricing, Resources, Taxonomy,
};

/// Value kind a field must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    List,
    PriceRange,
}

impl FieldKind {
    fn matches(&self, value: &FieldValue<'_>) -> bool {
        matches!(
            (self, value),
            (FieldKind::Text, FieldValue::Text(_))
                | (FieldKind::Number, FieldValue::Number(_))
                | (FieldKind::List, FieldValue::List(_))
                | (FieldKind::PriceRange, FieldValue::PriceRange(_))
        )
    }
}

/// One mandatory field of a data_type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// Why a mandatory field failed the structural check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    Missing(String),
    Empty(String),
    WrongKind { field: String, expected: FieldKind },
}

/// data_type → ordered mandatory fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaRegistry {
    schemas: BTreeMap<DataType, Vec<FieldSpec>>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        let mut schemas = BTreeMap::new();
        schemas.insert(
            DataType::MarketSize,
            vec![
                FieldSpec::new("value", FieldKind::Number),
                FieldSpec::new("year", FieldKind::Number),
            ],
        );
        schemas.insert(
            DataType::BrandData,
            vec![
                FieldSpec::new("brand_name", FieldKind::Text),
                FieldSpec::new("tier", FieldKind::Text),
            ],
        );
        schemas.insert(
            DataType::Pricing,
            vec![
                FieldSpec::new("products", FieldKind::List),
                FieldSpec::new("price_range", FieldKind::PriceRange),
            ],
        );
        schemas.insert(
            DataType::Resources,
            vec![
                FieldSpec::new("title", FieldKind::Text),
                FieldSpec::new("url", FieldKind::Text),
                FieldSpec::new("publisher", FieldKind::Text),
            ],
        );
        schemas.insert(
            DataType::Taxonomy,
            vec![FieldSpec::new("subcategories", FieldKind::List)],
        );
        Self { schemas }
    }
}

impl SchemaRegistry {
    /// Registry with no mandatory fields at all
    pub fn empty() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }

    /// Replace the mandatory fields of a data_type
    pub fn register(&mut self, data_type: DataType, fields: Vec<FieldSpec>) {
        self.schemas.insert(data_type, fields);
    }

    pub fn mandatory_fields(&self, data_type: DataType) -> &[FieldSpec] {
        self.schemas
            .get(&data_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Structural completeness of a payload against its schema, in schema order
    pub fn check(&self, payload: &Payload) -> Vec<FieldProblem> {
        self.check_fields(payload, self.mandatory_fields(payload.data_type()))
    }

    /// Check an arbitrary field list (used for requirement-level mandatory fields)
    pub fn check_fields(&self, payload: &Payload, fields: &[FieldSpec]) -> Vec<FieldProblem> {
        fields
            .iter()
            .filter_map(|spec| match payload.field(&spec.name) {
                None => Some(FieldProblem::Missing(spec.name.clone())),
                Some(value) if !spec.kind.matches(&value) => Some(FieldProblem::WrongKind {
                    field: spec.name.clone(),
                    expected: spec.kind,
                }),
                Some(value) if value.is_empty() => Some(FieldProblem::Empty(spec.name.clone())),
                Some(_) => None,
            })
            .collect()
    }

    /// Names from `names` that are absent or empty on the payload, any kind accepted
    pub fn missing_named(payload: &Payload, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|name| match payload.field(name) {
                None => true,
                Some(value) => value.is_empty(),
            })
            .cloned()
            .collect()
    }

    /// JSON schema of a data_type's payload
    pub fn json_schema(data_type: DataType) -> schemars::Schema {
        match data_type {
            DataType::MarketSize => schemars::schema_for!(MarketSize),
            DataType::BrandData => schemars::schema_for!(BrandData),
            DataType::Pricing => schemars::schema_for!(Pricing),
            DataType::Resources => schemars::schema_for!(Resources),
            DataType::Taxonomy => schemars::schema_for!(Taxonomy),
        }
    }
}

/// JSON schema of the whole tagged payload
pub fn payload_schema() -> schemars::Schema {
    schemars::schema_for!(Payload)
}
