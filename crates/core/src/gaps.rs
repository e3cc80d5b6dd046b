//! # Gap Analysis
//!
//! Compares the accepted dataset against the declared requirements. The
//! output depends only on the two inputs: same dataset and requirements,
//! same gaps in the same order.

use crate::config::{Requirement, Requirements};
use crate::dataset::AcceptedDataset;
use crate::protocol::{DataType, Gap, GapType, SchemaRegistry};

/// Records of `data_type` that carry every mandatory field of the requirement
fn complete_records(dataset: &AcceptedDataset, data_type: DataType, req: &Requirement) -> (usize, usize) {
    let mut total = 0;
    let mut complete = 0;
    for record in dataset.records(data_type) {
        total += 1;
        if SchemaRegistry::missing_named(&record.payload, &req.mandatory_fields).is_empty() {
            complete += 1;
        }
    }
    (complete, total)
}

fn count_gap(data_type: DataType, req: &Requirement, count: usize) -> Option<Gap> {
    let required = req.required_count();
    if count == 0 {
        Some(Gap {
            data_type,
            gap_type: GapType::MissingData,
            description: format!("No {} data collected (required: {})", data_type, required),
            current_value: 0,
            required_value: required,
            priority: req.priority,
            suggested_action: format!("Dispatch {} collection for {} record(s)", data_type, required),
        })
    } else if count < required {
        Some(Gap {
            data_type,
            gap_type: GapType::InsufficientCount,
            description: format!(
                "Only {} of {} required {} records collected",
                count, required, data_type
            ),
            current_value: count,
            required_value: required,
            priority: req.priority,
            suggested_action: format!("Collect {} more {} records", required - count, data_type),
        })
    } else {
        None
    }
}

fn quality_gap(dataset: &AcceptedDataset, data_type: DataType, req: &Requirement) -> Option<Gap> {
    if req.mandatory_fields.is_empty() {
        return None;
    }
    let (complete, total) = complete_records(dataset, data_type, req);
    if total == 0 || complete == total {
        return None;
    }
    let fields = req.mandatory_fields.join(", ");
    Some(Gap {
        data_type,
        gap_type: GapType::LowQuality,
        description: format!(
            "{} of {} {} records lack mandatory fields: {}",
            total - complete,
            total,
            data_type,
            fields
        ),
        current_value: complete,
        required_value: total,
        priority: req.priority,
        suggested_action: format!("Re-collect {} records including {}", data_type, fields),
    })
}

/// Every unmet requirement as a gap, highest priority first, then by data_type
pub fn analyze(dataset: &AcceptedDataset, requirements: &Requirements) -> Vec<Gap> {
    let mut gaps: Vec<Gap> = requirements
        .iter()
        .flat_map(|(data_type, req)| {
            let count = dataset.count(data_type);
            [
                count_gap(data_type, req, count),
                quality_gap(dataset, data_type, req),
            ]
        })
        .flatten()
        .collect();
    // stable: ties keep data_type order
    gaps.sort_by(|a, b| b.priority.cmp(&a.priority));
    gaps
}

/// Weighted fraction of requirements currently satisfied, in [0, 1]
pub fn completeness(dataset: &AcceptedDataset, requirements: &Requirements) -> f64 {
    if requirements.is_empty() {
        return 1.0;
    }
    let total_weight: f64 = requirements.iter().map(|(_, r)| r.weight).sum();
    let uniform = total_weight <= 0.0;

    let satisfied: f64 = requirements
        .iter()
        .map(|(data_type, req)| {
            let weight = if uniform { 1.0 } else { req.weight };
            let count = dataset.count(data_type);
            let fill = (count as f64 / req.required_count() as f64).min(1.0);
            let quality = if req.mandatory_fields.is_empty() {
                1.0
            } else {
                match complete_records(dataset, data_type, req) {
                    (_, 0) => 1.0,
                    (complete, total) => complete as f64 / total as f64,
                }
            };
            weight * fill * quality
        })
        .sum();

    let denominator = if uniform {
        requirements.len() as f64
    } else {
        total_weight
    };
    (satisfied / denominator).clamp(0.0, 1.0)
}
