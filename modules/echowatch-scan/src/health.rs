//! Health monitor — read-only observer over jobs and recent runs.
//!
//! Two checks: stuck jobs (heartbeat staleness) and citation-extraction
//! quality over a rolling window. Neither mutates anything; stuck is a
//! classification that prompts an operator or an automated resume, not an
//! exception.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::controller::staleness_threshold;
use crate::traits::{JobRepo, RunRepo};

/// Rolling sample window for the citation checks.
pub const SAMPLE_WINDOW_HOURS: i64 = 24;

/// Minimum sample size before the citation rate is trusted as healthy.
pub const HEALTHY_MIN_SAMPLE: usize = 10;

pub const HEALTHY_QUALITY_RATE: f64 = 0.5;
pub const DEGRADED_QUALITY_RATE: f64 = 0.3;

// ---------------------------------------------------------------------------
// Report types (wire shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CitationHealth {
    Healthy,
    Degraded,
    NeedsAttention,
    NoData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StuckJobDetail {
    pub job_id: Uuid,
    pub org_id: Uuid,
    pub elapsed_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StuckJobs {
    pub count: usize,
    pub job_ids: Vec<Uuid>,
    pub details: Vec<StuckJobDetail>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationStats {
    /// Runs with at least one citation / total sampled runs.
    pub extraction_rate: f64,
    /// Runs with at least one http(s) URL citation / total sampled runs.
    pub quality_rate: f64,
    pub health: CitationHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overall {
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub stuck_jobs: StuckJobs,
    pub citations: CitationStats,
    pub overall: Overall,
}

// ---------------------------------------------------------------------------
// HealthMonitor
// ---------------------------------------------------------------------------

pub struct HealthMonitor {
    jobs: Arc<dyn JobRepo>,
    runs: Arc<dyn RunRepo>,
}

impl HealthMonitor {
    pub fn new(jobs: Arc<dyn JobRepo>, runs: Arc<dyn RunRepo>) -> Self {
        Self { jobs, runs }
    }

    pub async fn check(&self) -> Result<HealthReport> {
        let now = Utc::now();

        let stale = self.jobs.stale_in_progress(staleness_threshold()).await?;
        let stuck_jobs = StuckJobs {
            count: stale.len(),
            job_ids: stale.iter().map(|j| j.id).collect(),
            details: stale
                .iter()
                .map(|j| StuckJobDetail {
                    job_id: j.id,
                    org_id: j.org_id,
                    elapsed_seconds: (now - j.last_heartbeat).num_seconds(),
                })
                .collect(),
        };

        let since = now - Duration::hours(SAMPLE_WINDOW_HOURS);
        let samples = self.runs.recent(since).await?;
        let citations = classify_citations(
            samples.len(),
            samples.iter().filter(|s| !s.citations.is_empty()).count(),
            samples
                .iter()
                .filter(|s| {
                    s.citations
                        .iter()
                        .any(|c| c.value.starts_with("http://") || c.value.starts_with("https://"))
                })
                .count(),
        );

        let healthy = stuck_jobs.count == 0
            && !matches!(citations.health, CitationHealth::NeedsAttention);
        let overall = Overall {
            status: if healthy { "ok" } else { "attention" }.to_string(),
        };

        Ok(HealthReport {
            timestamp: now,
            stuck_jobs,
            citations,
            overall,
        })
    }
}

fn classify_citations(total: usize, with_citation: usize, with_url: usize) -> CitationStats {
    if total == 0 {
        return CitationStats {
            extraction_rate: 0.0,
            quality_rate: 0.0,
            health: CitationHealth::NoData,
            alert: None,
        };
    }

    let extraction_rate = with_citation as f64 / total as f64;
    let quality_rate = with_url as f64 / total as f64;

    let health = if quality_rate >= HEALTHY_QUALITY_RATE && total >= HEALTHY_MIN_SAMPLE {
        CitationHealth::Healthy
    } else if quality_rate >= DEGRADED_QUALITY_RATE {
        CitationHealth::Degraded
    } else {
        CitationHealth::NeedsAttention
    };

    let alert = match health {
        CitationHealth::Degraded => Some(format!(
            "citation quality degraded: {:.0}% of recent runs carry a URL citation",
            quality_rate * 100.0
        )),
        CitationHealth::NeedsAttention => Some(format!(
            "citation extraction failing: only {:.0}% of recent runs carry a URL citation",
            quality_rate * 100.0
        )),
        _ => None,
    };

    CitationStats {
        extraction_rate,
        quality_rate,
        health,
        alert,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_runs_means_no_data() {
        let stats = classify_citations(0, 0, 0);
        assert_eq!(stats.health, CitationHealth::NoData);
        assert!(stats.alert.is_none());
    }

    #[test]
    fn healthy_needs_both_rate_and_sample_size() {
        // Strong rate but a thin sample is not yet healthy.
        let thin = classify_citations(5, 5, 5);
        assert_eq!(thin.health, CitationHealth::Degraded);

        let solid = classify_citations(20, 18, 15);
        assert_eq!(solid.health, CitationHealth::Healthy);
        assert!(solid.alert.is_none());
    }

    #[test]
    fn low_quality_rate_degrades() {
        let stats = classify_citations(20, 12, 7);
        assert_eq!(stats.health, CitationHealth::Degraded);
        assert!(stats.alert.is_some());
    }

    #[test]
    fn very_low_quality_needs_attention() {
        let stats = classify_citations(20, 4, 2);
        assert_eq!(stats.health, CitationHealth::NeedsAttention);
        assert!(stats.alert.is_some());
    }

    #[test]
    fn rates_are_computed_over_the_whole_sample() {
        let stats = classify_citations(10, 5, 4);
        assert_eq!(stats.extraction_rate, 0.5);
        assert_eq!(stats.quality_rate, 0.4);
    }
}
