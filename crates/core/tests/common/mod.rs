#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Datelike;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

use sieve_core::agents::{CollectionAgent, CollectionResult};
use sieve_core::protocol::{DataSubmission, DataType, Payload, Source, SourceConfidence, TaskAssignment};

pub fn this_year() -> i32 {
    chrono::Utc::now().year()
}

pub fn object(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().unwrap()
}

pub fn reuters() -> Source {
    Source::try_new(
        "https://www.reuters.com/business/retail/garage-storage-market",
        "Reuters",
        SourceConfidence::High,
        &[],
    )
    .unwrap()
}

pub fn submission(data_type: DataType, data: Value, sources: Vec<Source>) -> DataSubmission {
    let payload = Payload::from_data(data_type, object(data)).unwrap();
    DataSubmission::new(payload, sources).with_scores(0.9, 0.9)
}

pub fn brand(name: &str, tier: Option<&str>) -> Value {
    let mut data = json!({
        "category": "garage storage",
        "brand_name": name,
        "year": this_year(),
        "confidence": "high"
    });
    if let Some(tier) = tier {
        data["tier"] = json!(tier);
    }
    data
}

/// Returns a new, clean brand on every call
pub struct BrandStream {
    calls: AtomicUsize,
}

impl BrandStream {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CollectionAgent for BrandStream {
    fn agent_id(&self) -> &str {
        "brand_stream"
    }

    fn data_type(&self) -> DataType {
        DataType::BrandData
    }

    async fn collect(&self, _task: &TaskAssignment) -> sieve_core::Result<CollectionResult> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CollectionResult {
            data: object(brand(&format!("Brand {n}"), Some("mid-range"))),
            sources: vec![reuters()],
            confidence: 0.85,
            quality_score: 0.85,
            reasoning: "manufacturer catalog".to_string(),
        })
    }
}

/// Never finds anything
pub struct Barren(pub DataType);

#[async_trait]
impl CollectionAgent for Barren {
    fn agent_id(&self) -> &str {
        "barren"
    }

    fn data_type(&self) -> DataType {
        self.0
    }

    async fn collect(&self, _task: &TaskAssignment) -> sieve_core::Result<CollectionResult> {
        Ok(CollectionResult::empty("no results for query"))
    }
}
