//! Source validator: the fabrication gate.
//!
//! Any fabrication marker in the payload text or a source URL forces the
//! score to exactly 0.0. Softer URL and metadata checks only run when no
//! marker was found. Passing requires a perfect 1.0.

use std::collections::BTreeSet;
use url::Url;

use super::recommend;
use super::{Findings, Validator};
use crate::config::SourceConfig;
use crate::error::EngineError;
use crate::protocol::{DataSubmission, Source, ValidationResult, ValidationType};

pub struct SourceValidator {
    config: SourceConfig,
}

impl SourceValidator {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    /// Markers found in `text`, in configured order
    fn markers_in<'a>(&'a self, text: &str) -> impl Iterator<Item = &'a String> {
        let lowered = text.to_lowercase();
        self.config
            .fabrication_markers
            .iter()
            .filter(move |m| lowered.contains(&m.to_lowercase()))
    }

    /// Returns true when at least one marker was found
    fn detect_fabrication(&self, submission: &DataSubmission, findings: &mut Findings) -> bool {
        let before = findings.issues.len();
        for marker in self.markers_in(&submission.payload.text()) {
            let err = EngineError::FabricationDetected {
                marker: marker.clone(),
                location: "payload".to_string(),
            };
            findings.zero(err.to_string());
        }

        for (i, source) in submission.sources.iter().enumerate() {
            for marker in self.markers_in(&source.url) {
                let err = EngineError::FabricationDetected {
                    marker: marker.clone(),
                    location: format!("source {} URL", i + 1),
                };
                findings.zero(err.to_string());
            }
        }
        findings.issues.len() > before
    }

    fn check_urls(&self, sources: &[Source], findings: &mut Findings) {
        for (i, source) in sources.iter().enumerate() {
            let n = i + 1;
            match Url::parse(source.url.trim()) {
                Ok(url) => match url.host_str().filter(|h| !h.is_empty()) {
                    None => findings.penalize(
                        self.config.missing_host_penalty,
                        format!("Source {}: Missing URL host", n),
                    ),
                    Some(host) => {
                        let host = host.to_lowercase();
                        if self.config.local_hosts.iter().any(|l| *l == host) {
                            findings.penalize(
                                self.config.local_host_penalty,
                                format!("Source {}: Local domain ({})", n, host),
                            );
                        }
                    }
                },
                Err(url::ParseError::RelativeUrlWithoutBase) => {
                    findings.penalize(
                        self.config.missing_scheme_penalty,
                        format!("Source {}: Missing URL scheme (http/https)", n),
                    );
                    findings.penalize(
                        self.config.missing_host_penalty,
                        format!("Source {}: Missing URL host", n),
                    );
                }
                Err(e) => findings.penalize(
                    self.config.missing_host_penalty,
                    format!("Source {}: Unparseable URL ({})", n, e),
                ),
            }
        }
    }

    fn check_metadata(&self, sources: &[Source], findings: &mut Findings) {
        for (i, source) in sources.iter().enumerate() {
            if source.publisher.trim().is_empty() {
                findings.penalize(
                    self.config.missing_publisher_penalty,
                    format!("Source {}: Missing publisher name", i + 1),
                );
            }
            if !source.confidence.is_recognized() {
                findings.penalize(
                    self.config.invalid_confidence_penalty,
                    format!("Source {}: Invalid confidence level", i + 1),
                );
            }
        }

        if sources.len() >= self.config.diversity_min_sources {
            let domains: BTreeSet<Option<String>> = sources.iter().map(Source::domain).collect();
            if domains.len() == 1 {
                findings.penalize(
                    self.config.diversity_penalty,
                    "All sources from same domain - diversity needed",
                );
            }
        }
    }
}

impl Validator for SourceValidator {
    fn validation_type(&self) -> ValidationType {
        ValidationType::Source
    }

    fn validate(&self, submission: &DataSubmission) -> ValidationResult {
        let mut findings = Findings::new();

        if submission.sources.is_empty() {
            findings.zero(EngineError::SourceUnavailable.to_string());
        }
        let fabricated = self.detect_fabrication(submission, &mut findings);
        if !submission.sources.is_empty() && !fabricated {
            self.check_urls(&submission.sources, &mut findings);
            self.check_metadata(&submission.sources, &mut findings);
        }

        let score = findings.score();
        let passed = score == 1.0;
        let recommendations = recommend::SOURCE.derive(&findings.issues, "");
        let reasoning = format!(
            "Source validation score: {:.2}. {}",
            score,
            if passed {
                "All data properly sourced.".to_string()
            } else {
                format!("Source issues detected: {} problems found.", findings.issues.len())
            }
        );

        if fabricated {
            tracing::warn!(
                submission_id = %submission.id,
                agent_id = %submission.agent_id,
                "fabrication marker detected"
            );
        }

        ValidationResult::new(
            &submission.id,
            ValidationType::Source,
            score,
            passed,
            findings.issues,
            recommendations,
            reasoning,
        )
    }
}
