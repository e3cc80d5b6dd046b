//! # Sources
//!
//! Citations attached to every data submission. A source is created when an
//! agent cites it and is never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{EngineError, Result};

/// Reliability of a source as judged by the citing agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceConfidence {
    High,
    #[default]
    Medium,
    Low,
    /// Anything else an agent sent; kept so the Source validator can penalise it
    #[serde(other)]
    Unrecognized,
}

impl SourceConfidence {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, SourceConfidence::Unrecognized)
    }
}

/// A cited source with full traceability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Raw URL as cited (validated by the Source validator, not at parse time)
    pub url: String,
    /// Publisher name (e.g. "Reuters")
    #[serde(default)]
    pub publisher: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_published: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default = "Utc::now")]
    pub access_date: DateTime<Utc>,
    #[serde(default)]
    pub confidence: SourceConfidence,
}

impl Source {
    /// Construct a source the way a collection agent should: the publisher
    /// must be non-empty and the URL must not contain a blacklisted marker.
    pub fn try_new(
        url: impl Into<String>,
        publisher: impl Into<String>,
        confidence: SourceConfidence,
        blacklist: &[String],
    ) -> Result<Self> {
        let source = Self {
            url: url.into(),
            publisher: publisher.into(),
            date_published: None,
            excerpt: None,
            access_date: Utc::now(),
            confidence,
        };
        source.guard(blacklist)?;
        Ok(source)
    }

    /// Check the construction invariants without building a new source
    pub fn guard(&self, blacklist: &[String]) -> Result<()> {
        if self.publisher.trim().is_empty() {
            return Err(EngineError::Structural(format!(
                "source {} has no publisher",
                self.url
            )));
        }
        let url = self.url.to_lowercase();
        if let Some(marker) = blacklist
            .iter()
            .find(|m| url.contains(&m.to_lowercase()))
        {
            return Err(EngineError::FabricationDetected {
                marker: marker.clone(),
                location: "source URL".to_string(),
            });
        }
        Ok(())
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    pub fn with_date_published(mut self, date: impl Into<String>) -> Self {
        self.date_published = Some(date.into());
        self
    }

    /// Host part of the URL, if it parses
    pub fn domain(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    }
}
