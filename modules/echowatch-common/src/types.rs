use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Tenant Types ---

/// Subscription tier. Gates which answer engines an org may scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Starter,
    Growth,
    Enterprise,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Starter => "starter",
            SubscriptionTier::Growth => "growth",
            SubscriptionTier::Enterprise => "enterprise",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "starter" => Some(SubscriptionTier::Starter),
            "growth" => Some(SubscriptionTier::Growth),
            "enterprise" => Some(SubscriptionTier::Enterprise),
            _ => None,
        }
    }
}

/// A tenant organization whose brand visibility is being tracked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Org {
    pub id: Uuid,
    pub name: String,
    /// Primary web domain, e.g. "acme.com".
    pub domain: String,
    /// Brand name plus known variants. Seeds the extraction gazetteer and
    /// decides which mentions count as "ours" vs. competitors.
    pub brand_names: Vec<String>,
    pub tier: SubscriptionTier,
    /// Fixed UTC offset of the tenant's local clock, in minutes.
    /// Drives the daily execution window and the idempotency date.
    pub utc_offset_minutes: i32,
}

impl Org {
    /// Normalized brand-name set used to classify gazetteer hits.
    pub fn normalized_brand_names(&self) -> Vec<String> {
        self.brand_names
            .iter()
            .map(|n| n.trim().to_lowercase())
            .collect()
    }
}

/// A tracked prompt. Soft-deactivated, never hard-deleted while runs
/// reference it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub id: Uuid,
    pub org_id: Uuid,
    pub text: String,
    pub active: bool,
}

// --- Providers ---

/// The external answer engines a scan can fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Perplexity,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::OpenAi,
        ProviderKind::Gemini,
        ProviderKind::Perplexity,
    ];

    /// Wire name used in run rows and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Perplexity => "perplexity",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(ProviderKind::OpenAi),
            "gemini" => Some(ProviderKind::Gemini),
            "perplexity" => Some(ProviderKind::Perplexity),
            _ => None,
        }
    }

    /// Lowest subscription tier allowed to scan this provider.
    pub fn min_tier(&self) -> SubscriptionTier {
        match self {
            ProviderKind::OpenAi => SubscriptionTier::Starter,
            ProviderKind::Gemini => SubscriptionTier::Growth,
            ProviderKind::Perplexity => SubscriptionTier::Growth,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// --- Batch Jobs ---

/// Stored job states. "Stuck" is a derived classification
/// (in_progress + stale heartbeat), never written to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "in_progress" => Some(JobStatus::InProgress),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of scan work: a prompt executed against one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub prompt_id: Uuid,
    pub provider: ProviderKind,
}

/// One daily (or manually triggered) scan for a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: Uuid,
    pub org_id: Uuid,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    /// Progress metadata: pairs whose unit of work finished (success or error).
    pub completed_pairs: Vec<PairKey>,
    /// `{org_id}-{window_date}`. Unique while held; None once released by a
    /// replace trigger.
    pub idempotency_key: Option<String>,
}

// --- Runs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(RunStatus::Success),
            "error" => Some(RunStatus::Error),
            _ => None,
        }
    }
}

/// One attempt to execute one prompt against one provider within one job.
/// Unique per (batch_job_id, prompt_id, provider); a re-run replaces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub batch_job_id: Uuid,
    pub prompt_id: Uuid,
    pub provider: ProviderKind,
    pub status: RunStatus,
    pub token_in: i64,
    pub token_out: i64,
    pub run_at: DateTime<Utc>,
}

// --- Extraction Artifacts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    Url,
    Reference,
}

/// One reference extracted from a response, in capture-priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub kind: CitationKind,
    pub value: String,
    /// Present only for markdown-style `[title](url)` captures.
    pub title: Option<String>,
    /// URL host with a leading `www.` stripped, when the value parses.
    pub domain: Option<String>,
}

/// One gazetteer entry that matched at least once. Zero-count entries are
/// never emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub name: String,
    /// Lowercased, trimmed matching key.
    pub normalized: String,
    pub count: u32,
    /// Char offset of the first occurrence divided by text char length.
    /// 0 = mentioned at the very start, approaching 1 = at the very end.
    pub first_pos_ratio: f64,
}

/// Deterministic text-mining output for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    /// Ordered, URL-deduped, capped at 20.
    pub citations: Vec<Citation>,
    /// Gazetteer hits whose normalized form is in the org's brand-name set.
    pub brand_mentions: Vec<Mention>,
    /// All other gazetteer hits.
    pub competitor_mentions: Vec<Mention>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
            && self.brand_mentions.is_empty()
            && self.competitor_mentions.is_empty()
    }
}

/// Per-org, per-day spend counters. Incremented on every attempt, never
/// overwritten; a replaced run row still consumed tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub org_id: Uuid,
    pub day: chrono::NaiveDate,
    pub runs_executed: i64,
    pub tokens_in: i64,
    pub tokens_out: i64,
}

/// Derived visibility score for one run. Never hand-edited; manual
/// corrections recompute through the one scoring function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// In [0, 10], rounded to one decimal.
    pub score: f64,
    pub org_brand_present: bool,
    /// 1-based rank of the org brand's first mention among all mentions,
    /// ordered by first occurrence. None when the brand is absent.
    pub org_brand_prominence: Option<u32>,
    pub competitor_count: u32,
}
