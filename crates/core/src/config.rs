//! # Engine Configuration
//!
//! Every threshold and penalty the engine uses, with documented defaults.
//! Loaded from `.sieve/config.toml` or built in code and injected at
//! orchestrator construction. Missing sections and keys fall back to the
//! defaults below.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::protocol::{DataType, Priority};

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub orchestrator: OrchestratorConfig,
    pub quality: QualityConfig,
    pub source: SourceConfig,
    pub relevance: RelevanceConfig,
    pub requirements: Requirements,
}

/// Decision thresholds, loop bounds and the worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Combined score at or above which a submission is accepted (default: 0.9)
    pub accept_threshold: f64,
    /// Lowest combined score that still earns a refine (default: 0.6)
    pub refine_threshold: f64,
    /// Refines allowed per logical task before forcing a reject (default: 2)
    pub max_refine_attempts: u32,
    /// Hard bound on orchestration iterations (default: 5)
    pub max_iterations: u32,
    /// Completeness at which the loop stops successfully (default: 0.95)
    pub completeness_target: f64,
    /// Gaps below this priority are not dispatched (default: medium)
    pub priority_cutoff: Priority,
    /// Global bound on in-flight agent calls (default: 4)
    pub max_concurrent_tasks: usize,
    /// Per-data_type bound on in-flight agent calls (default: 2)
    pub max_tasks_per_type: usize,
    /// Deadline given to every task assignment, in seconds (default: 60)
    pub task_deadline_secs: u64,
    /// Skip the Relevance validator once the Source validator scored 0 (default: true)
    pub short_circuit_on_fabrication: bool,
    /// Research category passed to agents and used for relevance keywords
    pub category: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.9,
            refine_threshold: 0.6,
            max_refine_attempts: 2,
            max_iterations: 5,
            completeness_target: 0.95,
            priority_cutoff: Priority::Medium,
            max_concurrent_tasks: 4,
            max_tasks_per_type: 2,
            task_deadline_secs: 60,
            short_circuit_on_fabrication: true,
            category: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn task_deadline(&self) -> Duration {
        Duration::from_secs(self.task_deadline_secs)
    }
}

/// Penalties of the Quality validator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub pass_threshold: f64,
    /// Mandatory field missing or blank
    pub missing_field_penalty: f64,
    /// Mandatory list present but empty (products, brands, ...)
    pub empty_collection_penalty: f64,
    /// Mandatory field holding the wrong kind of value
    pub wrong_kind_penalty: f64,
    /// Numeric field with no digits in it
    pub non_numeric_penalty: f64,
    pub year_min: i64,
    pub year_max: i64,
    pub year_out_of_range_penalty: f64,
    pub year_not_a_number_penalty: f64,
    /// Price range with min > max
    pub price_range_inverted_penalty: f64,
    /// Price range text that cannot be read as two bounds
    pub price_range_unreadable_penalty: f64,
    pub confidence_levels: Vec<String>,
    pub invalid_confidence_penalty: f64,
    /// Allowed difference between a reported count and the list length
    pub count_tolerance: usize,
    pub brand_count_mismatch_penalty: f64,
    pub product_count_mismatch_penalty: f64,
    /// Per-year decay applied as `decay^age`
    pub recency_decay: f64,
    /// Years of age tolerated before the decay applies
    pub recency_grace_years: i64,
    pub stale_timestamp_days: i64,
    pub stale_timestamp_penalty: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            pass_threshold: 0.9,
            missing_field_penalty: 0.8,
            empty_collection_penalty: 0.7,
            wrong_kind_penalty: 0.8,
            non_numeric_penalty: 0.9,
            year_min: 2020,
            year_max: 2030,
            year_out_of_range_penalty: 0.9,
            year_not_a_number_penalty: 0.8,
            price_range_inverted_penalty: 0.8,
            price_range_unreadable_penalty: 0.95,
            confidence_levels: ["high", "medium", "low", "medium-high", "medium-low"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            invalid_confidence_penalty: 0.95,
            count_tolerance: 2,
            brand_count_mismatch_penalty: 0.9,
            product_count_mismatch_penalty: 0.95,
            recency_decay: 0.95,
            recency_grace_years: 0,
            stale_timestamp_days: 30,
            stale_timestamp_penalty: 0.95,
        }
    }
}

/// Fabrication markers and penalties of the Source validator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Substrings that force the score to 0, matched case-insensitively
    pub fabrication_markers: Vec<String>,
    pub missing_scheme_penalty: f64,
    pub missing_host_penalty: f64,
    pub local_hosts: Vec<String>,
    pub local_host_penalty: f64,
    pub missing_publisher_penalty: f64,
    pub invalid_confidence_penalty: f64,
    /// Minimum number of sources before the single-domain check applies
    pub diversity_min_sources: usize,
    pub diversity_penalty: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            fabrication_markers: [
                "placeholder",
                "example.com",
                "test.com",
                "TODO",
                "TBD",
                "FIXME",
                "xxx",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            missing_scheme_penalty: 0.5,
            missing_host_penalty: 0.5,
            local_hosts: ["localhost", "127.0.0.1", "0.0.0.0"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            local_host_penalty: 0.0,
            missing_publisher_penalty: 0.95,
            invalid_confidence_penalty: 0.98,
            diversity_min_sources: 3,
            diversity_penalty: 0.9,
        }
    }
}

/// Keyword sets and allow-lists of the Relevance validator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceConfig {
    pub pass_threshold: f64,
    /// Category (lowercased) → keywords expected in relevant payloads
    pub keywords: BTreeMap<String, Vec<String>>,
    /// Known brands of the category
    pub brand_allow_list: Vec<String>,
    pub low_overlap_ratio: f64,
    pub low_overlap_penalty: f64,
    pub partial_overlap_ratio: f64,
    pub partial_overlap_penalty: f64,
    /// Maximum number of list items inspected per submission
    pub sample_cap: usize,
    pub irrelevant_items_penalty: f64,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            pass_threshold: 0.85,
            keywords: BTreeMap::new(),
            brand_allow_list: Vec::new(),
            low_overlap_ratio: 0.2,
            low_overlap_penalty: 0.7,
            partial_overlap_ratio: 0.4,
            partial_overlap_penalty: 0.85,
            sample_cap: 10,
            irrelevant_items_penalty: 0.8,
        }
    }
}

impl RelevanceConfig {
    pub fn keywords_for(&self, category: &str) -> &[String] {
        self.keywords
            .get(&category.trim().to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// What the accepted dataset must contain for one data_type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mandatory_fields: Vec<String>,
    pub priority: Priority,
    /// Share of this requirement in the completeness fraction
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Requirement {
    pub fn new(priority: Priority) -> Self {
        Self {
            min_count: None,
            mandatory_fields: Vec::new(),
            priority,
            weight: default_weight(),
        }
    }

    pub fn with_min_count(mut self, min_count: usize) -> Self {
        self.min_count = Some(min_count);
        self
    }

    pub fn with_mandatory_fields(mut self, fields: &[&str]) -> Self {
        self.mandatory_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Count that satisfies the requirement (at least one record)
    pub fn required_count(&self) -> usize {
        self.min_count.unwrap_or(1).max(1)
    }
}

/// data_type → requirement, keyed by the snake_case data_type name on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Requirement>",
    into = "BTreeMap<String, Requirement>"
)]
pub struct Requirements(BTreeMap<DataType, Requirement>);

impl Requirements {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, data_type: DataType, requirement: Requirement) -> Self {
        self.0.insert(data_type, requirement);
        self
    }

    pub fn get(&self, data_type: DataType) -> Option<&Requirement> {
        self.0.get(&data_type)
    }

    /// Requirements in data_type order
    pub fn iter(&self) -> impl Iterator<Item = (DataType, &Requirement)> {
        self.0.iter().map(|(dt, req)| (*dt, req))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// The category-report requirements: 50 brands, 120 priced products,
/// 30 resources, one market size and one taxonomy.
impl Default for Requirements {
    fn default() -> Self {
        Self::new()
            .with(
                DataType::MarketSize,
                Requirement::new(Priority::Critical)
                    .with_min_count(1)
                    .with_weight(0.20),
            )
            .with(
                DataType::BrandData,
                Requirement::new(Priority::High)
                    .with_min_count(50)
                    .with_mandatory_fields(&["tier"])
                    .with_weight(0.30),
            )
            .with(
                DataType::Pricing,
                Requirement::new(Priority::High)
                    .with_min_count(120)
                    .with_weight(0.25),
            )
            .with(
                DataType::Resources,
                Requirement::new(Priority::Medium)
                    .with_min_count(30)
                    .with_weight(0.15),
            )
            .with(
                DataType::Taxonomy,
                Requirement::new(Priority::Medium)
                    .with_min_count(1)
                    .with_weight(0.10),
            )
    }
}

impl TryFrom<BTreeMap<String, Requirement>> for Requirements {
    type Error = EngineError;

    fn try_from(raw: BTreeMap<String, Requirement>) -> Result<Self> {
        raw.into_iter()
            .map(|(name, req)| Ok((name.parse::<DataType>()?, req)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Self)
    }
}

impl From<Requirements> for BTreeMap<String, Requirement> {
    fn from(reqs: Requirements) -> Self {
        reqs.0
            .into_iter()
            .map(|(dt, req)| (dt.as_str().to_string(), req))
            .collect()
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(EngineError::Config(format!(
            "{} must lie in [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Reject settings the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        let o = &self.orchestrator;
        check_unit("orchestrator.accept_threshold", o.accept_threshold)?;
        check_unit("orchestrator.refine_threshold", o.refine_threshold)?;
        check_unit("orchestrator.completeness_target", o.completeness_target)?;
        if o.refine_threshold > o.accept_threshold {
            return Err(EngineError::Config(format!(
                "refine_threshold ({}) exceeds accept_threshold ({})",
                o.refine_threshold, o.accept_threshold
            )));
        }
        if o.max_iterations == 0 {
            return Err(EngineError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if o.max_concurrent_tasks == 0 || o.max_tasks_per_type == 0 {
            return Err(EngineError::Config(
                "worker pool sizes must be at least 1".to_string(),
            ));
        }

        let q = &self.quality;
        check_unit("quality.pass_threshold", q.pass_threshold)?;
        for (name, value) in [
            ("quality.missing_field_penalty", q.missing_field_penalty),
            ("quality.empty_collection_penalty", q.empty_collection_penalty),
            ("quality.wrong_kind_penalty", q.wrong_kind_penalty),
            ("quality.non_numeric_penalty", q.non_numeric_penalty),
            ("quality.year_out_of_range_penalty", q.year_out_of_range_penalty),
            ("quality.year_not_a_number_penalty", q.year_not_a_number_penalty),
            ("quality.price_range_inverted_penalty", q.price_range_inverted_penalty),
            ("quality.price_range_unreadable_penalty", q.price_range_unreadable_penalty),
            ("quality.invalid_confidence_penalty", q.invalid_confidence_penalty),
            ("quality.brand_count_mismatch_penalty", q.brand_count_mismatch_penalty),
            ("quality.product_count_mismatch_penalty", q.product_count_mismatch_penalty),
            ("quality.recency_decay", q.recency_decay),
            ("quality.stale_timestamp_penalty", q.stale_timestamp_penalty),
        ] {
            check_unit(name, value)?;
        }
        if q.year_min > q.year_max {
            return Err(EngineError::Config(format!(
                "quality.year_min ({}) exceeds year_max ({})",
                q.year_min, q.year_max
            )));
        }

        let s = &self.source;
        for (name, value) in [
            ("source.missing_scheme_penalty", s.missing_scheme_penalty),
            ("source.missing_host_penalty", s.missing_host_penalty),
            ("source.local_host_penalty", s.local_host_penalty),
            ("source.missing_publisher_penalty", s.missing_publisher_penalty),
            ("source.invalid_confidence_penalty", s.invalid_confidence_penalty),
            ("source.diversity_penalty", s.diversity_penalty),
        ] {
            check_unit(name, value)?;
        }
        if s.fabrication_markers.iter().any(|m| m.trim().is_empty()) {
            return Err(EngineError::Config(
                "fabrication markers must not be blank".to_string(),
            ));
        }

        let r = &self.relevance;
        for (name, value) in [
            ("relevance.pass_threshold", r.pass_threshold),
            ("relevance.low_overlap_ratio", r.low_overlap_ratio),
            ("relevance.low_overlap_penalty", r.low_overlap_penalty),
            ("relevance.partial_overlap_ratio", r.partial_overlap_ratio),
            ("relevance.partial_overlap_penalty", r.partial_overlap_penalty),
            ("relevance.irrelevant_items_penalty", r.irrelevant_items_penalty),
        ] {
            check_unit(name, value)?;
        }

        for (data_type, req) in self.requirements.iter() {
            if !req.weight.is_finite() || req.weight < 0.0 {
                return Err(EngineError::Config(format!(
                    "requirement weight for {} must be non-negative",
                    data_type
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.orchestrator.accept_threshold, 0.9);
        assert_eq!(config.orchestrator.refine_threshold, 0.6);
        assert_eq!(config.orchestrator.max_refine_attempts, 2);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [orchestrator]
            max_iterations = 3
            category = "garage storage"

            [requirements.brand_data]
            min_count = 50
            priority = "high"
            "#,
        )
        .unwrap();

        assert_eq!(config.orchestrator.max_iterations, 3);
        assert_eq!(config.orchestrator.accept_threshold, 0.9);
        assert_eq!(config.requirements.len(), 1);
        let req = config.requirements.get(DataType::BrandData).unwrap();
        assert_eq!(req.min_count, Some(50));
        assert_eq!(req.weight, 1.0);
    }

    #[test]
    fn test_unknown_requirement_key_is_rejected() {
        let err = EngineConfig::from_toml_str(
            r#"
            [requirements.reviews]
            priority = "low"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("reviews"));
    }

    #[test]
    fn test_inverted_thresholds_are_rejected() {
        let mut config = EngineConfig::default();
        config.orchestrator.refine_threshold = 0.95;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_zero_pool_is_rejected() {
        let mut config = EngineConfig::default();
        config.orchestrator.max_tasks_per_type = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let text = EngineConfig::default().to_toml_string().unwrap();
        let parsed = EngineConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.requirements, Requirements::default());
    }

    #[test]
    fn test_keywords_lookup_is_case_insensitive() {
        let mut config = RelevanceConfig::default();
        config
            .keywords
            .insert("garage storage".to_string(), vec!["garage".to_string()]);
        assert_eq!(config.keywords_for("Garage Storage"), ["garage".to_string()]);
        assert!(config.keywords_for("kitchen").is_empty());
    }
}
