//! # Validation Pipeline
//!
//! Quality → Source → Relevance, run strictly in that order over one
//! submission. The combined score is the product of the validator scores,
//! so one near-zero result dominates.

pub mod quality;
pub mod recommend;
pub mod relevance;
pub mod source;

pub use quality::QualityValidator;
pub use relevance::RelevanceValidator;
pub use source::SourceValidator;

use crate::config::EngineConfig;
use crate::protocol::{clamp_score, DataSubmission, SchemaRegistry, ValidationResult, ValidationType};

/// A single validation stage
pub trait Validator: Send + Sync {
    fn validation_type(&self) -> ValidationType;

    /// Judge one submission. Never fails: every defect is an issue with a penalty.
    fn validate(&self, submission: &DataSubmission) -> ValidationResult;
}

/// Running product of penalties plus the issues that caused them
#[derive(Debug, Clone)]
pub(crate) struct Findings {
    pub score: f64,
    pub issues: Vec<String>,
}

impl Findings {
    pub fn new() -> Self {
        Self {
            score: 1.0,
            issues: Vec::new(),
        }
    }

    /// Multiply in a penalty factor and record why
    pub fn penalize(&mut self, factor: f64, issue: impl Into<String>) {
        self.score *= clamp_score(factor);
        self.issues.push(issue.into());
    }

    pub fn zero(&mut self, issue: impl Into<String>) {
        self.score = 0.0;
        self.issues.push(issue.into());
    }

    pub fn score(&self) -> f64 {
        clamp_score(self.score)
    }
}

/// Results of one pipeline run over one submission
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub results: Vec<ValidationResult>,
    pub combined_score: f64,
    /// True when Relevance was skipped after a zero Source score
    pub short_circuited: bool,
}

impl PipelineOutcome {
    /// Every issue of every validator, in pipeline order
    pub fn issues(&self) -> Vec<String> {
        self.results
            .iter()
            .flat_map(|r| r.issues.iter().cloned())
            .collect()
    }

    pub fn result(&self, validation_type: ValidationType) -> Option<&ValidationResult> {
        self.results
            .iter()
            .find(|r| r.validation_type == validation_type)
    }
}

/// The ordered validators
pub struct ValidationPipeline {
    quality: QualityValidator,
    source: SourceValidator,
    relevance: RelevanceValidator,
    short_circuit_on_fabrication: bool,
}

impl ValidationPipeline {
    pub fn new(
        quality: QualityValidator,
        source: SourceValidator,
        relevance: RelevanceValidator,
    ) -> Self {
        Self {
            quality,
            source,
            relevance,
            short_circuit_on_fabrication: true,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_schema(config, SchemaRegistry::default())
    }

    pub fn with_schema(config: &EngineConfig, schema: SchemaRegistry) -> Self {
        Self {
            quality: QualityValidator::new(config.quality.clone(), schema),
            source: SourceValidator::new(config.source.clone()),
            relevance: RelevanceValidator::new(
                config.relevance.clone(),
                config.orchestrator.category.clone(),
            ),
            short_circuit_on_fabrication: config.orchestrator.short_circuit_on_fabrication,
        }
    }

    pub fn quality(&self) -> &QualityValidator {
        &self.quality
    }

    /// Run all validators in order and combine their scores
    pub fn run(&self, submission: &DataSubmission) -> PipelineOutcome {
        let stages: [&dyn Validator; 3] = [&self.quality, &self.source, &self.relevance];
        let mut results = Vec::with_capacity(stages.len());
        let mut short_circuited = false;

        for stage in stages {
            let result = stage.validate(submission);
            let zero_source =
                result.validation_type == ValidationType::Source && result.score == 0.0;
            results.push(result);

            if zero_source && self.short_circuit_on_fabrication {
                tracing::debug!(
                    submission_id = %submission.id,
                    "source score is 0, skipping relevance"
                );
                short_circuited = true;
                break;
            }
        }

        let combined_score = clamp_score(results.iter().map(|r| r.score).product());

        PipelineOutcome {
            results,
            combined_score,
            short_circuited,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::protocol::DataType;
    use serde_json::json;

    #[test]
    fn test_clean_submission_scores_one() {
        let pipeline = ValidationPipeline::from_config(&EngineConfig::default());
        let outcome = pipeline.run(&clean_brand());
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.combined_score, 1.0);
        assert!(outcome.issues().is_empty());
    }

    #[test]
    fn test_fabrication_short_circuits_relevance() {
        let pipeline = ValidationPipeline::from_config(&EngineConfig::default());
        let sub = submission(
            DataType::BrandData,
            json!({ "brand_name": "Gladiator", "tier": "TBD", "year": this_year() }),
        );
        let outcome = pipeline.run(&sub);
        assert!(outcome.short_circuited);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.combined_score, 0.0);
        assert!(outcome.result(ValidationType::Relevance).is_none());
    }

    #[test]
    fn test_without_short_circuit_all_three_run() {
        let mut config = EngineConfig::default();
        config.orchestrator.short_circuit_on_fabrication = false;
        let pipeline = ValidationPipeline::from_config(&config);
        let mut sub = clean_brand();
        sub.sources.clear();
        let outcome = pipeline.run(&sub);
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.combined_score, 0.0);
    }

    #[test]
    fn test_combined_score_is_product() {
        let pipeline = ValidationPipeline::from_config(&EngineConfig::default());
        let sub = submission(
            DataType::BrandData,
            json!({ "brand_name": "Gladiator", "year": this_year() }),
        );
        let outcome = pipeline.run(&sub);
        let product: f64 = outcome.results.iter().map(|r| r.score).product();
        assert!((outcome.combined_score - product).abs() < 1e-12);
        assert!((outcome.combined_score - 0.8).abs() < 1e-9);
    }
}
