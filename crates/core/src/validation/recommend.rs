//! Issue → recommendation mapping.
//!
//! A fixed, ordered rule table per validator. Each rule fires when any issue
//! contains one of its needles (case-insensitive); the same issue text
//! always yields the same recommendations, in rule order.

/// One rule of a recommendation table
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub needles: &'static [&'static str],
    pub advice: &'static str,
}

/// Ordered rules plus an optional fallback for clean submissions
#[derive(Debug, Clone, Copy)]
pub struct RecommendationTable {
    pub rules: &'static [Rule],
    pub fallback: Option<&'static str>,
}

pub const QUALITY: RecommendationTable = RecommendationTable {
    rules: &[
        Rule {
            needles: &["missing"],
            advice: "Add all required fields before resubmitting",
        },
        Rule {
            needles: &["empty"],
            advice: "Collect at least one item for every required list",
        },
        Rule {
            needles: &["format", "numeric", "wrong kind", "not a valid number"],
            advice: "Verify data formatting matches expected schema",
        },
        Rule {
            needles: &["inconsistent", "mismatch"],
            advice: "Review data for internal consistency errors",
        },
        Rule {
            needles: &["out of expected range", "old"],
            advice: "Collect more recent data",
        },
        Rule {
            needles: &["confidence"],
            advice: "Tag data with a recognized confidence level",
        },
    ],
    fallback: Some("Quality is acceptable, no major issues"),
};

pub const SOURCE: RecommendationTable = RecommendationTable {
    rules: &[
        Rule {
            needles: &["no sources"],
            advice: "CRITICAL: Add source URLs for all data points",
        },
        Rule {
            needles: &["fabrication"],
            advice: "CRITICAL: Remove placeholder/fabricated data - use only real sources",
        },
        Rule {
            needles: &["url scheme", "url host", "unparseable url", "local domain"],
            advice: "Fix malformed URLs - ensure valid http/https URLs on public domains",
        },
        Rule {
            needles: &["publisher"],
            advice: "Add publisher names for all sources",
        },
        Rule {
            needles: &["confidence"],
            advice: "Set every source confidence to high, medium or low",
        },
        Rule {
            needles: &["diversity"],
            advice: "Add sources from multiple independent publishers",
        },
    ],
    fallback: None,
};

pub const RELEVANCE: RecommendationTable = RecommendationTable {
    rules: &[
        Rule {
            needles: &["keyword"],
            advice: "Focus search on {category}-specific terms",
        },
        Rule {
            needles: &["irrelevant"],
            advice: "Filter collected items to only those relevant to {category}",
        },
    ],
    fallback: None,
};

impl RecommendationTable {
    /// Recommendations for `issues`, with `{category}` substituted
    pub fn derive(&self, issues: &[String], category: &str) -> Vec<String> {
        let lowered: Vec<String> = issues.iter().map(|i| i.to_lowercase()).collect();
        let mut out: Vec<String> = self
            .rules
            .iter()
            .filter(|rule| {
                lowered
                    .iter()
                    .any(|issue| rule.needles.iter().any(|n| issue.contains(n)))
            })
            .map(|rule| rule.advice.replace("{category}", category))
            .collect();
        if out.is_empty() {
            if let Some(fallback) = self.fallback {
                out.push(fallback.to_string());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_issue_same_recommendation() {
        let issues = vec!["Missing required field: tier".to_string()];
        let first = QUALITY.derive(&issues, "");
        let second = QUALITY.derive(&issues, "");
        assert_eq!(first, second);
        assert_eq!(first, vec!["Add all required fields before resubmitting"]);
    }

    #[test]
    fn test_rule_order_not_issue_order() {
        let issues = vec![
            "Data is 3 years old (year: 2023)".to_string(),
            "Missing required field: value".to_string(),
        ];
        let recs = QUALITY.derive(&issues, "");
        assert_eq!(recs[0], "Add all required fields before resubmitting");
        assert_eq!(recs[1], "Collect more recent data");
    }

    #[test]
    fn test_fallback_only_when_nothing_fires() {
        assert_eq!(
            QUALITY.derive(&[], ""),
            vec!["Quality is acceptable, no major issues"]
        );
        assert!(SOURCE.derive(&[], "").is_empty());
    }

    #[test]
    fn test_category_substitution() {
        let issues = vec!["Low keyword match: only 1/10 category keywords found".to_string()];
        assert_eq!(
            RELEVANCE.derive(&issues, "garage storage"),
            vec!["Focus search on garage storage-specific terms"]
        );
    }
}
