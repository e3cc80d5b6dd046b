//! Quality validator: completeness, format, consistency and recency.
//!
//! Composite = completeness × format × consistency × recency; every check
//! only ever multiplies by a factor in [0, 1].

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

use super::recommend;
use super::{Findings, Validator};
use crate::config::QualityConfig;
use crate::protocol::{
    DataSubmission, FieldKind, FieldProblem, Numeric, Payload, SchemaRegistry, ValidationResult,
    ValidationType,
};

pub struct QualityValidator {
    config: QualityConfig,
    schema: SchemaRegistry,
}

impl QualityValidator {
    pub fn new(config: QualityConfig, schema: SchemaRegistry) -> Self {
        Self { config, schema }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    fn check_completeness(&self, payload: &Payload, findings: &mut Findings) {
        let fields = self.schema.mandatory_fields(payload.data_type());
        let mut reported_lists = Vec::new();

        for problem in self.schema.check(payload) {
            match problem {
                FieldProblem::Missing(field) => findings.penalize(
                    self.config.missing_field_penalty,
                    format!("Missing required field: {}", field),
                ),
                FieldProblem::Empty(field) => {
                    let is_list = fields
                        .iter()
                        .any(|f| f.name == field && f.kind == FieldKind::List);
                    if is_list {
                        findings.penalize(
                            self.config.empty_collection_penalty,
                            format!("Empty {} list - no items collected", field),
                        );
                        reported_lists.push(field);
                    } else {
                        findings.penalize(
                            self.config.missing_field_penalty,
                            format!("Missing required field: {} (blank)", field),
                        );
                    }
                }
                FieldProblem::WrongKind { field, expected } => findings.penalize(
                    self.config.wrong_kind_penalty,
                    format!("Field {} has the wrong kind: expected {:?}", field, expected),
                ),
            }
        }

        if let Some((name, 0)) = payload.core_list() {
            if !reported_lists.iter().any(|f| f == name) {
                findings.penalize(
                    self.config.empty_collection_penalty,
                    format!("Empty {} list - no items collected", name),
                );
            }
        }
    }

    fn check_format(&self, payload: &Payload, findings: &mut Findings) {
        for (name, value) in payload.numeric_fields() {
            if let Numeric::Text(text) = value {
                if !text.chars().any(|c| c.is_ascii_digit()) {
                    findings.penalize(
                        self.config.non_numeric_penalty,
                        format!("{} should be numeric, got: {}", name, text),
                    );
                }
            }
        }

        if let Some(year) = payload.year() {
            match year.as_integer() {
                Some(y) if y < self.config.year_min || y > self.config.year_max => {
                    findings.penalize(
                        self.config.year_out_of_range_penalty,
                        format!("Year out of expected range: {}", y),
                    )
                }
                Some(_) => {}
                None => findings.penalize(
                    self.config.year_not_a_number_penalty,
                    format!("Year is not a valid number: {}", year),
                ),
            }
        }

        if let Some(range) = payload.price_range().filter(|r| !r.is_empty()) {
            match range.bounds() {
                Some((min, max)) if min > max => findings.penalize(
                    self.config.price_range_inverted_penalty,
                    format!("Price range inconsistent: min ({}) > max ({})", min, max),
                ),
                Some(_) => {}
                None => findings.penalize(
                    self.config.price_range_unreadable_penalty,
                    format!("Price range format invalid: {}", range),
                ),
            }
        }

        if let Some(tag) = payload.confidence_tag() {
            let tag = tag.trim().to_lowercase();
            if !self.config.confidence_levels.iter().any(|l| *l == tag) {
                findings.penalize(
                    self.config.invalid_confidence_penalty,
                    format!("Invalid confidence level: {}", tag),
                );
            }
        }
    }

    fn check_consistency(&self, payload: &Payload, findings: &mut Findings) {
        for count in payload.declared_counts() {
            let penalty = match count.label {
                "Brand" => self.config.brand_count_mismatch_penalty,
                _ => self.config.product_count_mismatch_penalty,
            };
            match count.reported.as_integer() {
                Some(reported) => {
                    let actual = i64::try_from(count.actual).unwrap_or(i64::MAX);
                    let diff = reported.abs_diff(actual);
                    if diff > self.config.count_tolerance as u64 {
                        findings.penalize(
                            penalty,
                            format!(
                                "{} count mismatch: reported {}, actual {}",
                                count.label, reported, count.actual
                            ),
                        );
                    }
                }
                None => findings.penalize(
                    self.config.non_numeric_penalty,
                    format!(
                        "{} count should be numeric, got: {}",
                        count.label, count.reported
                    ),
                ),
            }
        }
    }

    fn check_recency(&self, payload: &Payload, now: DateTime<Utc>, findings: &mut Findings) {
        if let Some(year) = payload.year().and_then(Numeric::as_integer) {
            let age = i64::from(now.year()).saturating_sub(year);
            if age > self.config.recency_grace_years {
                let exponent = i32::try_from(age).unwrap_or(i32::MAX);
                findings.penalize(
                    self.config.recency_decay.powi(exponent),
                    format!("Data is {} years old (year: {})", age, year),
                );
            }
        }

        if let Some(collected_at) = payload.collected_at().and_then(parse_timestamp) {
            let age_days = (now - collected_at).num_days();
            if age_days > self.config.stale_timestamp_days {
                findings.penalize(
                    self.config.stale_timestamp_penalty,
                    format!("Data is {} days old", age_days),
                );
            }
        }
    }

    pub(crate) fn assess(&self, payload: &Payload, now: DateTime<Utc>) -> Findings {
        let mut findings = Findings::new();
        self.check_completeness(payload, &mut findings);
        self.check_format(payload, &mut findings);
        self.check_consistency(payload, &mut findings);
        self.check_recency(payload, now, &mut findings);
        findings
    }
}

/// RFC 3339, naive ISO date-time or plain date; anything else is ignored
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(ts.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

impl Validator for QualityValidator {
    fn validation_type(&self) -> ValidationType {
        ValidationType::Quality
    }

    fn validate(&self, submission: &DataSubmission) -> ValidationResult {
        let findings = self.assess(&submission.payload, Utc::now());
        let score = findings.score();
        let passed = score >= self.config.pass_threshold;
        let recommendations = recommend::QUALITY.derive(&findings.issues, "");
        let reasoning = format!(
            "Quality score: {:.2}. {}",
            score,
            if passed {
                "Data meets quality standards.".to_string()
            } else {
                format!("Quality issues found: {}", findings.issues.len())
            }
        );

        tracing::debug!(
            submission_id = %submission.id,
            score,
            passed,
            issues = findings.issues.len(),
            "quality validation completed"
        );

        ValidationResult::new(
            &submission.id,
            ValidationType::Quality,
            score,
            passed,
            findings.issues,
            recommendations,
            reasoning,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DataType;
    use crate::validation::fixtures::*;
    use serde_json::json;

    fn validator() -> QualityValidator {
        QualityValidator::new(QualityConfig::default(), SchemaRegistry::default())
    }

    fn payload(data_type: DataType, data: serde_json::Value) -> Payload {
        Payload::from_data(data_type, data.as_object().cloned().unwrap()).unwrap()
    }

    #[test]
    fn test_complete_current_data_scores_one() {
        let result = validator().validate(&clean_brand());
        assert_eq!(result.score, 1.0);
        assert!(result.passed);
        assert_eq!(
            result.recommendations,
            vec!["Quality is acceptable, no major issues"]
        );
    }

    #[test]
    fn test_missing_tier() {
        let sub = submission(
            DataType::BrandData,
            json!({ "brand_name": "Gladiator", "year": this_year() }),
        );
        let result = validator().validate(&sub);
        assert!((result.score - 0.8).abs() < 1e-9);
        assert!(!result.passed);
        assert_eq!(result.issues, vec!["Missing required field: tier"]);
    }

    #[test]
    fn test_empty_products_list() {
        let p = payload(
            DataType::Pricing,
            json!({ "products": [], "price_range": "$10 - $50", "year": this_year() }),
        );
        let findings = validator().assess(&p, Utc::now());
        assert!((findings.score() - 0.7).abs() < 1e-9);
        assert!(findings.issues[0].contains("Empty products list"));
    }

    #[test]
    fn test_format_violations() {
        let p = payload(
            DataType::MarketSize,
            json!({ "value": "unknown", "year": 2015, "confidence": "certain" }),
        );
        let findings = validator().assess(&p, Utc::now());
        assert!(findings.issues.iter().any(|i| i.contains("value should be numeric")));
        assert!(findings.issues.iter().any(|i| i.contains("Year out of expected range: 2015")));
        assert!(findings.issues.iter().any(|i| i.contains("Invalid confidence level: certain")));
        assert!(findings.issues.iter().any(|i| i.contains("years old")));
    }

    #[test]
    fn test_inverted_price_range() {
        let p = payload(
            DataType::Pricing,
            json!({ "products": ["Wall bin"], "price_range": { "min": 80, "max": 20 }, "year": this_year() }),
        );
        let findings = validator().assess(&p, Utc::now());
        assert_eq!(findings.issues, vec!["Price range inconsistent: min (80) > max (20)"]);
        assert!((findings.score() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_extreme_year_is_a_finding_not_a_crash() {
        let huge = payload(
            DataType::MarketSize,
            json!({ "value": 4.2, "year": -1e30 }),
        );
        let findings = validator().assess(&huge, Utc::now());
        assert!(findings.issues.iter().any(|i| i.contains("Year is not a valid number")));
        assert!(findings.score() < 1.0);

        let floor = payload(
            DataType::MarketSize,
            json!({ "value": 4.2, "year": i64::MIN.to_string() }),
        );
        let findings = validator().assess(&floor, Utc::now());
        assert!(findings.issues.iter().any(|i| i.contains("Year out of expected range")));
        assert!(findings.issues.iter().any(|i| i.contains("years old")));
        assert_eq!(findings.score(), 0.0);
    }

    #[test]
    fn test_extreme_brand_count_is_a_finding_not_a_crash() {
        let huge = payload(
            DataType::BrandData,
            json!({ "brand_name": "x", "tier": "mid", "brands": ["A"], "brand_count": -1e30, "year": this_year() }),
        );
        let findings = validator().assess(&huge, Utc::now());
        assert_eq!(findings.issues, vec!["Brand count should be numeric, got: -1000000000000000000000000000000"]);

        let floor = payload(
            DataType::BrandData,
            json!({ "brand_name": "x", "tier": "mid", "brands": ["A"], "brand_count": i64::MIN.to_string(), "year": this_year() }),
        );
        let findings = validator().assess(&floor, Utc::now());
        assert!(findings.issues[0].starts_with("Brand count mismatch"));
    }

    #[test]
    fn test_count_tolerance() {
        let within = payload(
            DataType::BrandData,
            json!({ "brand_name": "x", "tier": "mid", "brands": ["A", "B", "C"], "brand_count": 5, "year": this_year() }),
        );
        assert!(validator().assess(&within, Utc::now()).issues.is_empty());

        let beyond = payload(
            DataType::BrandData,
            json!({ "brand_name": "x", "tier": "mid", "brands": ["A", "B", "C"], "brand_count": 6, "year": this_year() }),
        );
        let findings = validator().assess(&beyond, Utc::now());
        assert_eq!(findings.issues, vec!["Brand count mismatch: reported 6, actual 3"]);
    }

    #[test]
    fn test_recency_decay() {
        let p = payload(
            DataType::MarketSize,
            json!({ "value": 4.2, "year": this_year() - 2 }),
        );
        let findings = validator().assess(&p, Utc::now());
        assert!((findings.score() - 0.95f64.powi(2)).abs() < 1e-9);
    }

    #[test]
    fn test_stale_timestamp() {
        let stale = (Utc::now() - chrono::Duration::days(45)).to_rfc3339();
        let p = payload(
            DataType::MarketSize,
            json!({ "value": 4.2, "year": this_year(), "collected_at": stale }),
        );
        let findings = validator().assess(&p, Utc::now());
        assert_eq!(findings.issues, vec!["Data is 45 days old"]);

        let garbled = payload(
            DataType::MarketSize,
            json!({ "value": 4.2, "year": this_year(), "collected_at": "last tuesday" }),
        );
        assert!(validator().assess(&garbled, Utc::now()).issues.is_empty());
    }

    #[test]
    fn test_score_never_increases_with_more_defects() {
        let steps = [
            json!({ "brand_name": "Gladiator", "tier": "premium", "year": this_year(), "confidence": "high" }),
            json!({ "brand_name": "Gladiator", "year": this_year(), "confidence": "high" }),
            json!({ "brand_name": "Gladiator", "year": this_year(), "confidence": "sure" }),
            json!({ "brand_name": "Gladiator", "year": this_year() - 3, "confidence": "sure" }),
            json!({ "brand_name": "Gladiator", "year": this_year() - 3, "confidence": "sure",
                    "brands": ["A"], "brand_count": 9 }),
            json!({ "year": this_year() - 3, "confidence": "sure", "brands": ["A"], "brand_count": 9,
                    "market_share": "n/a" }),
        ];
        let v = validator();
        let mut previous = 1.0;
        for step in steps {
            let score = v.assess(&payload(DataType::BrandData, step), Utc::now()).score();
            assert!(score <= previous, "{} > {}", score, previous);
            previous = score;
        }
        assert!(previous < 0.5);
    }
}
