//! Validation and gap analysis scenarios through the public API.

mod common;

use chrono::Utc;
use serde_json::json;

use common::*;
use sieve_core::config::{EngineConfig, Requirement, Requirements};
use sieve_core::dataset::{AcceptedDataset, AcceptedRecord, DatasetKey};
use sieve_core::gaps;
use sieve_core::orchestrator::{decide, Thresholds};
use sieve_core::protocol::{
    DataType, Decision, GapType, Payload, Priority, Source, SourceConfidence, ValidationType,
};
use sieve_core::validation::{QualityValidator, ValidationPipeline, Validator};

fn pipeline() -> ValidationPipeline {
    ValidationPipeline::from_config(&EngineConfig::default())
}

#[test]
fn scenario_a_clean_submission_is_accepted() {
    let sub = submission(DataType::BrandData, brand("Gladiator", Some("premium")), vec![reuters()]);
    let outcome = pipeline().run(&sub);

    assert_eq!(outcome.result(ValidationType::Quality).unwrap().score, 1.0);
    assert_eq!(outcome.result(ValidationType::Source).unwrap().score, 1.0);
    assert!(outcome.combined_score >= 0.9);
    assert_eq!(decide(outcome.combined_score, 2, Thresholds::default()), Decision::Accept);
}

#[test]
fn scenario_b_todo_marker_forces_reject() {
    let mut data = brand("Gladiator", Some("premium"));
    data["description"] = json!("TODO: confirm flagship product line");
    let sub = submission(DataType::BrandData, data, vec![reuters()]);
    let outcome = pipeline().run(&sub);

    assert_eq!(outcome.combined_score, 0.0);
    assert_eq!(decide(outcome.combined_score, 2, Thresholds::default()), Decision::Reject);
    let source = outcome.result(ValidationType::Source).unwrap();
    assert!(source.issues.iter().any(|i| i.contains("'TODO'")));
}

#[test]
fn scenario_c_missing_tier_is_refined() {
    let sub = submission(DataType::BrandData, brand("Gladiator", None), vec![reuters()]);
    let outcome = pipeline().run(&sub);

    let quality = outcome.result(ValidationType::Quality).unwrap().score;
    assert!(quality < 0.9 && quality >= 0.6, "quality {quality}");
    assert_eq!(decide(outcome.combined_score, 2, Thresholds::default()), Decision::Refine);

    let feedback = outcome.issues().join("; ");
    assert!(feedback.contains("tier"));
}

#[test]
fn scenario_d_insufficient_brand_count() {
    let mut dataset = AcceptedDataset::new();
    for n in 0..12 {
        let sub = submission(
            DataType::BrandData,
            brand(&format!("Brand {n}"), Some("budget")),
            vec![reuters()],
        );
        let key = DatasetKey::for_payload(&sub.payload, None);
        dataset.insert(AcceptedRecord::from_submission(&sub, key, 1.0));
    }
    let requirements = Requirements::new().with(
        DataType::BrandData,
        Requirement::new(Priority::High).with_min_count(50),
    );

    let found = gaps::analyze(&dataset, &requirements);
    assert_eq!(found.len(), 1);
    let gap = &found[0];
    assert_eq!(gap.gap_type, GapType::InsufficientCount);
    assert_eq!(gap.current_value, 12);
    assert_eq!(gap.required_value, 50);
    assert_eq!(gap.priority, Priority::High);
}

#[test]
fn zero_sources_never_accepted() {
    let payloads = [
        (DataType::BrandData, brand("Gladiator", Some("premium"))),
        (DataType::Taxonomy, json!({ "subcategories": ["Shelving", "Wall Systems"] })),
        (
            DataType::MarketSize,
            json!({ "value": 4.2e9, "year": this_year(), "currency": "USD" }),
        ),
    ];

    let pipeline = pipeline();
    for (data_type, data) in payloads {
        let sub = submission(data_type, data, Vec::new());
        let outcome = pipeline.run(&sub);
        assert_eq!(outcome.result(ValidationType::Source).unwrap().score, 0.0);
        assert_ne!(decide(outcome.combined_score, 2, Thresholds::default()), Decision::Accept);
    }
}

#[test]
fn every_marker_zeroes_the_combined_score() {
    let config = EngineConfig::default();
    let pipeline = ValidationPipeline::from_config(&config);

    for marker in &config.source.fabrication_markers {
        let mut in_payload = brand("Gladiator", Some("premium"));
        in_payload["notes"] = json!(format!("see {marker} later"));
        let sub = submission(DataType::BrandData, in_payload, vec![reuters()]);
        assert_eq!(pipeline.run(&sub).combined_score, 0.0, "payload marker {marker}");

        let url_source: Source = serde_json::from_value(json!({
            "url": format!("https://{marker}.org/brands"),
            "publisher": "Trade Journal",
            "confidence": "high"
        }))
        .unwrap();
        let sub = submission(DataType::BrandData, brand("Gladiator", Some("premium")), vec![url_source]);
        assert_eq!(pipeline.run(&sub).combined_score, 0.0, "url marker {marker}");
    }
}

#[test]
fn quality_score_never_rises_with_more_defects() {
    let validator = QualityValidator::new(Default::default(), Default::default());
    let mut data = brand("Gladiator", Some("premium"));
    let mut previous = validator
        .validate(&submission(DataType::BrandData, data.clone(), vec![reuters()]))
        .score;

    let defects = [
        ("tier", json!(null)),
        ("year", json!(2011)),
        ("confidence", json!("certain")),
        ("brand_name", json!(null)),
    ];
    for (field, value) in defects {
        data[field] = value;
        let score = validator
            .validate(&submission(DataType::BrandData, data.clone(), vec![reuters()]))
            .score;
        assert!(score <= previous, "{field}: {score} > {previous}");
        previous = score;
    }
}

#[test]
fn gap_analysis_is_idempotent() {
    let mut dataset = AcceptedDataset::new();
    let sub = submission(DataType::Taxonomy, json!({ "subcategories": ["Shelving"] }), vec![reuters()]);
    dataset.insert(AcceptedRecord::from_submission(
        &sub,
        DatasetKey::new(DataType::Taxonomy, "garage storage"),
        0.95,
    ));
    let requirements = Requirements::default();

    let first = gaps::analyze(&dataset, &requirements);
    let second = gaps::analyze(&dataset, &requirements);
    assert_eq!(first, second);
    assert!(first.windows(2).all(|w| w[0].priority >= w[1].priority));
}

#[test]
fn structural_defect_is_a_message_error() {
    let err = Payload::from_data(DataType::Pricing, object(json!({ "products": 12 }))).unwrap_err();
    assert!(err.to_string().starts_with("structural error"));
}

#[test]
fn guarded_source_construction() {
    let markers = EngineConfig::default().source.fabrication_markers;
    assert!(Source::try_new("https://www.example.com/a", "Blog", SourceConfidence::Low, &markers).is_err());
    assert!(Source::try_new("https://www.statista.com/a", " ", SourceConfidence::Low, &markers).is_err());
    let ok = Source::try_new("https://www.statista.com/a", "Statista", SourceConfidence::Medium, &markers)
        .unwrap();
    assert!(ok.access_date <= Utc::now());
}
