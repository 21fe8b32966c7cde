//! Scheduler/trigger — decides whether a tenant's scan may start.
//!
//! One logical batch per tenant-day, enforced by the idempotency key
//! `{org_id}-{window_date}`. The scan "day" rolls over at the execution
//! window's reference hour in the tenant's local clock, so a job triggered
//! at 03:10 and a retry at 23:50 land on the same key.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use tracing::info;
use uuid::Uuid;

use echowatch_common::{BatchJob, EchowatchError, JobStatus, Org};

use crate::providers::ProviderSet;
use crate::traits::{Directory, JobRepo};

/// Daily execution window in the tenant's local clock: [start, end).
pub const WINDOW_START_HOUR: u32 = 3;
pub const WINDOW_END_HOUR: u32 = 5;

#[derive(Debug, Clone, Default)]
pub struct TriggerOpts {
    /// Bypass the window check (manual/test runs). Does NOT bypass the
    /// idempotency key.
    pub test: bool,
    /// Release a terminal job's key and start fresh.
    pub replace: bool,
    /// Resume this job if it is the one holding today's key.
    pub resume_job_id: Option<Uuid>,
}

/// What the caller should do next with the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    /// A new queued job was created; start it.
    Start,
    /// An existing job should be resumed.
    Resume,
    /// Nothing to run.
    None,
}

#[derive(Debug, Clone)]
pub struct TriggerOutcome {
    pub job_id: Option<Uuid>,
    pub accepted: bool,
    pub action: TriggerAction,
    pub reason: Option<String>,
}

impl TriggerOutcome {
    fn rejected(job_id: Option<Uuid>, reason: &str) -> Self {
        Self {
            job_id,
            accepted: false,
            action: TriggerAction::None,
            reason: Some(reason.to_string()),
        }
    }
}

pub struct Trigger {
    jobs: Arc<dyn JobRepo>,
    directory: Arc<dyn Directory>,
    providers: ProviderSet,
}

impl Trigger {
    pub fn new(
        jobs: Arc<dyn JobRepo>,
        directory: Arc<dyn Directory>,
        providers: ProviderSet,
    ) -> Self {
        Self {
            jobs,
            directory,
            providers,
        }
    }

    pub async fn trigger(
        &self,
        org_id: Uuid,
        opts: TriggerOpts,
    ) -> Result<TriggerOutcome, EchowatchError> {
        self.trigger_at(org_id, opts, Utc::now()).await
    }

    /// Clock-injected variant.
    pub async fn trigger_at(
        &self,
        org_id: Uuid,
        opts: TriggerOpts,
        now: DateTime<Utc>,
    ) -> Result<TriggerOutcome, EchowatchError> {
        // Trigger-time validation: errors here never create a job.
        let org = self
            .directory
            .get_org(org_id)
            .await
            .map_err(|e| EchowatchError::Database(e.to_string()))?
            .ok_or_else(|| EchowatchError::Validation(format!("unknown org: {org_id}")))?;

        if self.providers.enabled_for(&org).is_empty() {
            return Err(EchowatchError::Validation(format!(
                "no enabled providers for org {} (tier {})",
                org.id,
                org.tier.as_str()
            )));
        }

        if !opts.test && !in_window(now, &org) {
            return Ok(TriggerOutcome::rejected(
                None,
                "outside the daily execution window",
            ));
        }

        let key = idempotency_key(org_id, now, &org);

        if let Some(existing) = self
            .jobs
            .find_by_idempotency_key(&key)
            .await
            .map_err(|e| EchowatchError::Database(e.to_string()))?
        {
            return self.decide_existing(existing, &opts, &key, now).await;
        }

        self.create_job(org_id, key, now).await
    }

    /// Decision tree when today's key is already held.
    async fn decide_existing(
        &self,
        existing: BatchJob,
        opts: &TriggerOpts,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<TriggerOutcome, EchowatchError> {
        if !existing.status.is_terminal() {
            // Active job: only a matching resume request gets through.
            if opts.resume_job_id == Some(existing.id) {
                info!(job_id = %existing.id, "Trigger delegating to resume");
                return Ok(TriggerOutcome {
                    job_id: Some(existing.id),
                    accepted: true,
                    action: TriggerAction::Resume,
                    reason: None,
                });
            }
            return Ok(TriggerOutcome::rejected(
                Some(existing.id),
                "a scan is already active for this window",
            ));
        }

        // Terminal job holds the key.
        match existing.status {
            JobStatus::Completed if !opts.replace => Ok(TriggerOutcome::rejected(
                Some(existing.id),
                "already run today",
            )),
            JobStatus::Failed if opts.resume_job_id == Some(existing.id) => Ok(TriggerOutcome {
                job_id: Some(existing.id),
                accepted: true,
                action: TriggerAction::Resume,
                reason: None,
            }),
            JobStatus::Failed if !opts.replace => Ok(TriggerOutcome::rejected(
                Some(existing.id),
                "previous scan failed; resume or replace it",
            )),
            _ => {
                // replace=true: free the key, then create a fresh job.
                self.jobs
                    .release_idempotency_key(existing.id)
                    .await
                    .map_err(|e| EchowatchError::Database(e.to_string()))?;
                info!(job_id = %existing.id, "Idempotency key released for replace");
                self.create_job(existing.org_id, key.to_string(), now).await
            }
        }
    }

    async fn create_job(
        &self,
        org_id: Uuid,
        key: String,
        now: DateTime<Utc>,
    ) -> Result<TriggerOutcome, EchowatchError> {
        let job = BatchJob {
            id: Uuid::new_v4(),
            org_id,
            status: JobStatus::Queued,
            started_at: now,
            last_heartbeat: now,
            completed_pairs: Vec::new(),
            idempotency_key: Some(key.clone()),
        };

        let created = self
            .jobs
            .create(&job)
            .await
            .map_err(|e| EchowatchError::Database(e.to_string()))?;

        if !created {
            // A concurrent trigger inserted first. Not a failure.
            return Ok(TriggerOutcome::rejected(
                None,
                "a concurrent trigger created this window's scan",
            ));
        }

        info!(job_id = %job.id, org_id = %org_id, key = key.as_str(), "Scan job created");
        Ok(TriggerOutcome {
            job_id: Some(job.id),
            accepted: true,
            action: TriggerAction::Start,
            reason: None,
        })
    }
}

/// Calendar date of the scan window in the tenant's local clock, shifted so
/// the day rolls over at the window's reference hour rather than midnight.
pub fn window_date(now: DateTime<Utc>, org: &Org) -> NaiveDate {
    let local = now + Duration::minutes(org.utc_offset_minutes as i64);
    (local - Duration::hours(WINDOW_START_HOUR as i64)).date_naive()
}

pub fn idempotency_key(org_id: Uuid, now: DateTime<Utc>, org: &Org) -> String {
    format!("{}-{}", org_id, window_date(now, org).format("%Y-%m-%d"))
}

fn in_window(now: DateTime<Utc>, org: &Org) -> bool {
    let local = now + Duration::minutes(org.utc_offset_minutes as i64);
    (WINDOW_START_HOUR..WINDOW_END_HOUR).contains(&local.hour())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use echowatch_common::SubscriptionTier;

    fn org(offset_minutes: i32) -> Org {
        Org {
            id: Uuid::new_v4(),
            name: "Acme".to_string(),
            domain: "acme.com".to_string(),
            brand_names: vec!["Acme".to_string()],
            tier: SubscriptionTier::Growth,
            utc_offset_minutes: offset_minutes,
        }
    }

    #[test]
    fn window_date_rolls_over_at_reference_hour() {
        let org = org(0);
        // 02:59 local belongs to the previous scan day; 03:01 to the new one.
        let before = Utc.with_ymd_and_hms(2024, 6, 1, 2, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 6, 1, 3, 1, 0).unwrap();
        assert_eq!(window_date(before, &org), NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());
        assert_eq!(window_date(after, &org), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    }

    #[test]
    fn window_date_respects_tenant_offset() {
        // UTC 07:30 is 03:30 local for UTC-4, already the new scan day there.
        let org = org(-240);
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 7, 30, 0).unwrap();
        assert_eq!(window_date(now, &org), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    }

    #[test]
    fn in_window_is_half_open() {
        let org = org(0);
        let at_3 = Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap();
        let at_459 = Utc.with_ymd_and_hms(2024, 6, 1, 4, 59, 0).unwrap();
        let at_5 = Utc.with_ymd_and_hms(2024, 6, 1, 5, 0, 0).unwrap();
        assert!(in_window(at_3, &org));
        assert!(in_window(at_459, &org));
        assert!(!in_window(at_5, &org));
    }
}
