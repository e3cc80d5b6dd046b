//! # Typed Payloads
//!
//! Each data_type carries its own payload struct. Fields that the schema
//! registry marks as mandatory are still `Option` here: a missing field is
//! a Quality finding, while a field of the wrong shape is a structural error.

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, Result};

static NUMBER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").ok());

static PRICE_RANGE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"\$?\s*(\d+(?:\.\d+)?)\s*-\s*\$?\s*(\d+(?:\.\d+)?)").ok()
});

/// Largest magnitude a float holds as an exact integer
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Kind of research data a submission carries
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    MarketSize,
    BrandData,
    Pricing,
    Resources,
    Taxonomy,
}

impl DataType {
    pub fn all() -> Vec<DataType> {
        vec![
            DataType::MarketSize,
            DataType::BrandData,
            DataType::Pricing,
            DataType::Resources,
            DataType::Taxonomy,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::MarketSize => "market_size",
            DataType::BrandData => "brand_data",
            DataType::Pricing => "pricing",
            DataType::Resources => "resources",
            DataType::Taxonomy => "taxonomy",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        DataType::all()
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EngineError::Structural(format!("unknown data_type: {}", s)))
    }
}

/// A value that should be numeric but may arrive as text ("$4.2B")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    /// First number found in the value, ignoring currency symbols and commas
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Numeric::Number(n) => Some(*n),
            Numeric::Text(s) => {
                let cleaned = s.replace(',', "");
                NUMBER
                    .as_ref()?
                    .find(&cleaned)
                    .and_then(|m| m.as_str().parse().ok())
            }
        }
    }

    /// Whole-number view (years, counts); `None` when the text is not a plain integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Numeric::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER => {
                Some(*n as i64)
            }
            Numeric::Number(_) => None,
            Numeric::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Numeric::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Number(n) => write!(f, "{}", n),
            Numeric::Text(s) => f.write_str(s),
        }
    }
}

/// Price range given either as bounds or as `"$10 - $50"` text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PriceRange {
    Bounds { min: Numeric, max: Numeric },
    Text(String),
}

impl PriceRange {
    /// `(min, max)` when both ends can be read
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            PriceRange::Bounds { min, max } => Some((min.as_f64()?, max.as_f64()?)),
            PriceRange::Text(s) => {
                let cleaned = s.replace(',', "");
                let caps = PRICE_RANGE.as_ref()?.captures(&cleaned)?;
                Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PriceRange::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for PriceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceRange::Bounds { min, max } => write!(f, "{} - {}", min, max),
            PriceRange::Text(s) => f.write_str(s),
        }
    }
}

/// A brand, product or resource entry: a bare name or a small record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ListItem {
    Name(String),
    Entry(ItemEntry),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ItemEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Numeric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retailer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ListItem {
    pub fn name(&self) -> &str {
        match self {
            ListItem::Name(n) => n,
            ListItem::Entry(e) => &e.name,
        }
    }

    /// Everything textual about the item, for relevance matching
    pub fn text(&self) -> String {
        match self {
            ListItem::Name(n) => n.clone(),
            ListItem::Entry(e) => [
                Some(e.name.as_str()),
                e.tier.as_deref(),
                e.retailer.as_deref(),
                e.url.as_deref(),
            ]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" "),
        }
    }

    /// Identity used for duplicate detection in the accepted dataset
    fn identity(&self) -> String {
        match self {
            ListItem::Entry(ItemEntry { url: Some(url), .. }) if !url.trim().is_empty() => {
                normalize(url)
            }
            _ => normalize(self.name()),
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MarketSize {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Numeric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<Numeric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth_rate: Option<Numeric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<String>,
    /// Fields outside the schema, kept so they are still scanned
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BrandData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brands: Option<Vec<ListItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_count: Option<Numeric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_share: Option<Numeric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<Numeric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<String>,
    /// Fields outside the schema, kept so they are still scanned
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Pricing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retailer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products: Option<Vec<ListItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_count: Option<Numeric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<PriceRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Numeric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<Numeric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<String>,
    /// Fields outside the schema, kept so they are still scanned
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<ListItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<Numeric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<String>,
    /// Fields outside the schema, kept so they are still scanned
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Taxonomy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<Numeric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<String>,
    /// Fields outside the schema, kept so they are still scanned
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Payload of a data submission, tagged by data_type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "data_type", rename_all = "snake_case")]
pub enum Payload {
    MarketSize(MarketSize),
    BrandData(BrandData),
    Pricing(Pricing),
    Resources(Resources),
    Taxonomy(Taxonomy),
}

/// Borrowed view of a single payload field, as seen by the schema registry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(&'a Numeric),
    List(usize),
    PriceRange(&'a PriceRange),
}

impl FieldValue<'_> {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Number(n) => n.is_empty(),
            FieldValue::List(len) => *len == 0,
            FieldValue::PriceRange(pr) => pr.is_empty(),
        }
    }
}

/// A reported count paired with the list it describes
#[derive(Debug, Clone, Copy)]
pub struct DeclaredCount<'a> {
    pub label: &'static str,
    pub reported: &'a Numeric,
    pub actual: usize,
}

fn text(v: &Option<String>) -> Option<FieldValue<'_>> {
    v.as_deref().map(FieldValue::Text)
}

fn number(v: &Option<Numeric>) -> Option<FieldValue<'_>> {
    v.as_ref().map(FieldValue::Number)
}

fn list<T>(v: &Option<Vec<T>>) -> Option<FieldValue<'_>> {
    v.as_ref().map(|l| FieldValue::List(l.len()))
}

impl Payload {
    /// Build a payload from an agent's raw data map.
    ///
    /// The data_type tag is taken from the task, never from the map.
    pub fn from_data(
        data_type: DataType,
        mut data: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self> {
        data.insert(
            "data_type".to_string(),
            serde_json::Value::String(data_type.as_str().to_string()),
        );
        serde_json::from_value(serde_json::Value::Object(data)).map_err(|e| {
            EngineError::Structural(format!("malformed {} payload: {}", data_type, e))
        })
    }

    /// An empty payload, the shape an agent returns when nothing was found
    pub fn empty(data_type: DataType) -> Self {
        match data_type {
            DataType::MarketSize => Payload::MarketSize(MarketSize::default()),
            DataType::BrandData => Payload::BrandData(BrandData::default()),
            DataType::Pricing => Payload::Pricing(Pricing::default()),
            DataType::Resources => Payload::Resources(Resources::default()),
            DataType::Taxonomy => Payload::Taxonomy(Taxonomy::default()),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Payload::MarketSize(_) => DataType::MarketSize,
            Payload::BrandData(_) => DataType::BrandData,
            Payload::Pricing(_) => DataType::Pricing,
            Payload::Resources(_) => DataType::Resources,
            Payload::Taxonomy(_) => DataType::Taxonomy,
        }
    }

    /// Look up a field by its schema name
    pub fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match (self, name) {
            (_, "category") => self.category().map(FieldValue::Text),
            (_, "year") => self.year().map(FieldValue::Number),
            (_, "confidence") => self.confidence_tag().map(FieldValue::Text),
            (_, "collected_at") => self.collected_at().map(FieldValue::Text),

            (Payload::MarketSize(p), "value") => number(&p.value),
            (Payload::MarketSize(p), "unit") => text(&p.unit),
            (Payload::MarketSize(p), "growth_rate") => number(&p.growth_rate),
            (Payload::MarketSize(p), "region") => text(&p.region),

            (Payload::BrandData(p), "brand_name") => text(&p.brand_name),
            (Payload::BrandData(p), "tier") => text(&p.tier),
            (Payload::BrandData(p), "brands") => list(&p.brands),
            (Payload::BrandData(p), "brand_count") => number(&p.brand_count),
            (Payload::BrandData(p), "market_share") => number(&p.market_share),

            (Payload::Pricing(p), "retailer") => text(&p.retailer),
            (Payload::Pricing(p), "products") => list(&p.products),
            (Payload::Pricing(p), "product_count") => number(&p.product_count),
            (Payload::Pricing(p), "price_range") => p.price_range.as_ref().map(FieldValue::PriceRange),
            (Payload::Pricing(p), "price") => number(&p.price),

            (Payload::Resources(p), "title") => text(&p.title),
            (Payload::Resources(p), "url") => text(&p.url),
            (Payload::Resources(p), "publisher") => text(&p.publisher),
            (Payload::Resources(p), "resources") => list(&p.resources),

            (Payload::Taxonomy(p), "subcategories") => list(&p.subcategories),

            _ => None,
        }
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            Payload::MarketSize(p) => p.category.as_deref(),
            Payload::BrandData(p) => p.category.as_deref(),
            Payload::Pricing(p) => p.category.as_deref(),
            Payload::Resources(p) => p.category.as_deref(),
            Payload::Taxonomy(p) => p.category.as_deref(),
        }
    }

    pub fn year(&self) -> Option<&Numeric> {
        match self {
            Payload::MarketSize(p) => p.year.as_ref(),
            Payload::BrandData(p) => p.year.as_ref(),
            Payload::Pricing(p) => p.year.as_ref(),
            Payload::Resources(p) => p.year.as_ref(),
            Payload::Taxonomy(p) => p.year.as_ref(),
        }
    }

    pub fn confidence_tag(&self) -> Option<&str> {
        match self {
            Payload::MarketSize(p) => p.confidence.as_deref(),
            Payload::BrandData(p) => p.confidence.as_deref(),
            Payload::Pricing(p) => p.confidence.as_deref(),
            Payload::Resources(p) => p.confidence.as_deref(),
            Payload::Taxonomy(p) => p.confidence.as_deref(),
        }
    }

    pub fn collected_at(&self) -> Option<&str> {
        match self {
            Payload::MarketSize(p) => p.collected_at.as_deref(),
            Payload::BrandData(p) => p.collected_at.as_deref(),
            Payload::Pricing(p) => p.collected_at.as_deref(),
            Payload::Resources(p) => p.collected_at.as_deref(),
            Payload::Taxonomy(p) => p.collected_at.as_deref(),
        }
    }

    /// Fields that must parse as numbers when present
    pub fn numeric_fields(&self) -> Vec<(&'static str, &Numeric)> {
        let fields: Vec<(&'static str, Option<&Numeric>)> = match self {
            Payload::MarketSize(p) => vec![
                ("value", p.value.as_ref()),
                ("growth_rate", p.growth_rate.as_ref()),
            ],
            Payload::BrandData(p) => vec![
                ("brand_count", p.brand_count.as_ref()),
                ("market_share", p.market_share.as_ref()),
            ],
            Payload::Pricing(p) => vec![
                ("product_count", p.product_count.as_ref()),
                ("price", p.price.as_ref()),
            ],
            Payload::Resources(_) | Payload::Taxonomy(_) => vec![],
        };
        fields
            .into_iter()
            .filter_map(|(name, v)| v.map(|v| (name, v)))
            .collect()
    }

    pub fn price_range(&self) -> Option<&PriceRange> {
        match self {
            Payload::Pricing(p) => p.price_range.as_ref(),
            _ => None,
        }
    }

    /// Core collection of the payload, when it has one, with its name
    pub fn core_list(&self) -> Option<(&'static str, usize)> {
        match self {
            Payload::BrandData(p) => p.brands.as_ref().map(|l| ("brands", l.len())),
            Payload::Pricing(p) => p.products.as_ref().map(|l| ("products", l.len())),
            Payload::Resources(p) => p.resources.as_ref().map(|l| ("resources", l.len())),
            Payload::Taxonomy(p) => p.subcategories.as_ref().map(|l| ("subcategories", l.len())),
            Payload::MarketSize(_) => None,
        }
    }

    /// Reported counts that must agree with the lists they describe
    pub fn declared_counts(&self) -> Vec<DeclaredCount<'_>> {
        let mut counts = Vec::new();
        match self {
            Payload::BrandData(BrandData {
                brands: Some(brands),
                brand_count: Some(reported),
                ..
            }) => counts.push(DeclaredCount {
                label: "Brand",
                reported,
                actual: brands.len(),
            }),
            Payload::Pricing(Pricing {
                products: Some(products),
                product_count: Some(reported),
                ..
            }) => counts.push(DeclaredCount {
                label: "Product",
                reported,
                actual: products.len(),
            }),
            _ => {}
        }
        counts
    }

    /// Texts of list-typed items (brands, products, resources) for relevance sampling
    pub fn sample_items(&self) -> Vec<String> {
        match self {
            Payload::BrandData(p) => match (&p.brands, &p.brand_name) {
                (Some(brands), _) if !brands.is_empty() => {
                    brands.iter().map(ListItem::text).collect()
                }
                (_, Some(name)) => vec![name.clone()],
                _ => Vec::new(),
            },
            Payload::Pricing(p) => p
                .products
                .as_ref()
                .map(|l| l.iter().map(ListItem::text).collect())
                .unwrap_or_default(),
            Payload::Resources(p) => p
                .resources
                .as_ref()
                .map(|l| l.iter().map(ListItem::text).collect())
                .unwrap_or_default(),
            Payload::MarketSize(_) | Payload::Taxonomy(_) => Vec::new(),
        }
    }

    /// Identities of the records this payload contributes to the dataset
    pub fn identities(&self) -> Vec<String> {
        let ids: Vec<String> = match self {
            Payload::MarketSize(p) => {
                if p.value.is_none() {
                    Vec::new()
                } else {
                    vec![format!(
                        "{}|{}",
                        p.year.as_ref().map(|y| y.to_string()).unwrap_or_default(),
                        p.region.as_deref().unwrap_or_default()
                    )]
                }
            }
            Payload::BrandData(p) => match (&p.brands, &p.brand_name) {
                (Some(brands), _) if !brands.is_empty() => {
                    brands.iter().map(ListItem::identity).collect()
                }
                (_, Some(name)) => vec![name.clone()],
                _ => Vec::new(),
            },
            Payload::Pricing(p) => p
                .products
                .as_ref()
                .map(|l| l.iter().map(ListItem::identity).collect())
                .unwrap_or_default(),
            Payload::Resources(p) => match (&p.resources, &p.url, &p.title) {
                (Some(items), _, _) if !items.is_empty() => {
                    items.iter().map(ListItem::identity).collect()
                }
                (_, Some(url), _) => vec![url.clone()],
                (_, None, Some(title)) => vec![title.clone()],
                _ => Vec::new(),
            },
            Payload::Taxonomy(p) => p.subcategories.clone().unwrap_or_default(),
        };

        let mut seen = std::collections::BTreeSet::new();
        ids.into_iter()
            .map(|id| normalize(&id))
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect()
    }

    /// Full payload text, as scanned for fabrication markers and keywords
    pub fn text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
