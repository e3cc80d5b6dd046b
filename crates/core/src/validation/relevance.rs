//! Relevance validator: does the data belong to the research category?

use super::recommend;
use super::{Findings, Validator};
use crate::config::RelevanceConfig;
use crate::protocol::{DataSubmission, Payload, ValidationResult, ValidationType};

pub struct RelevanceValidator {
    config: RelevanceConfig,
    default_category: Option<String>,
}

impl RelevanceValidator {
    pub fn new(config: RelevanceConfig, default_category: Option<String>) -> Self {
        Self {
            config,
            default_category,
        }
    }

    /// Payload category first, then the configured research category
    fn category_of(&self, payload: &Payload) -> String {
        payload
            .category()
            .filter(|c| !c.trim().is_empty())
            .or(self.default_category.as_deref())
            .unwrap_or_default()
            .trim()
            .to_lowercase()
    }

    fn check_keywords(&self, payload: &Payload, keywords: &[String], findings: &mut Findings) {
        // No keyword set for the category: nothing to measure overlap against
        if keywords.is_empty() {
            return;
        }
        let text = payload.text().to_lowercase();
        let matches = keywords
            .iter()
            .filter(|kw| text.contains(&kw.to_lowercase()))
            .count();
        let ratio = matches as f64 / keywords.len() as f64;

        if ratio < self.config.low_overlap_ratio {
            findings.penalize(
                self.config.low_overlap_penalty,
                format!(
                    "Low keyword match: only {}/{} category keywords found",
                    matches,
                    keywords.len()
                ),
            );
        } else if ratio < self.config.partial_overlap_ratio {
            findings.penalize(
                self.config.partial_overlap_penalty,
                format!(
                    "Moderate keyword match: {}/{} category keywords found",
                    matches,
                    keywords.len()
                ),
            );
        }
    }

    fn check_items(
        &self,
        payload: &Payload,
        category: &str,
        keywords: &[String],
        findings: &mut Findings,
    ) {
        if keywords.is_empty() && self.config.brand_allow_list.is_empty() {
            return;
        }
        let sample: Vec<String> = payload
            .sample_items()
            .into_iter()
            .take(self.config.sample_cap)
            .collect();
        if sample.is_empty() {
            return;
        }

        let needles: Vec<String> = self
            .config
            .brand_allow_list
            .iter()
            .chain(keywords.iter())
            .map(|n| n.to_lowercase())
            .collect();
        let irrelevant = sample
            .iter()
            .filter(|item| {
                let item = item.to_lowercase();
                !needles.iter().any(|n| item.contains(n.as_str()))
            })
            .count();

        if irrelevant * 2 > sample.len() {
            findings.penalize(
                self.config.irrelevant_items_penalty,
                format!(
                    "{}/{} sampled items appear irrelevant to {}",
                    irrelevant,
                    sample.len(),
                    if category.is_empty() { "the category" } else { category }
                ),
            );
        }
    }
}

impl Validator for RelevanceValidator {
    fn validation_type(&self) -> ValidationType {
        ValidationType::Relevance
    }

    fn validate(&self, submission: &DataSubmission) -> ValidationResult {
        let category = self.category_of(&submission.payload);
        let keywords = self.config.keywords_for(&category);

        let mut findings = Findings::new();
        self.check_keywords(&submission.payload, keywords, &mut findings);
        self.check_items(&submission.payload, &category, keywords, &mut findings);

        let score = findings.score();
        let passed = score >= self.config.pass_threshold;
        let recommendations = recommend::RELEVANCE.derive(&findings.issues, &category);
        let reasoning = format!(
            "Relevance score: {:.2}. Data {} relevant to {}.",
            score,
            if passed { "is" } else { "may not be" },
            if category.is_empty() { "the category" } else { category.as_str() }
        );

        ValidationResult::new(
            &submission.id,
            ValidationType::Relevance,
            score,
            passed,
            findings.issues,
            recommendations,
            reasoning,
        )
    }
}
