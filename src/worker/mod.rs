use std::time::{Duration, Instant};

use time::OffsetDateTime;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::credit::Charge;
use crate::models::job::{GenerationJob, GenerationResult, JobStatus};
use crate::models::message::NewMessage;
use crate::models::project::Project;
use crate::models::user::User;
use crate::services::allowance::AllowanceError;
use crate::state::AppState;

pub const PROJECT_OR_USER_MISSING: &str = "Project or user not found";
pub const INSUFFICIENT_ALLOWANCE: &str = "Insufficient allowance";
pub const ALLOWANCE_CONSUME_FAILED: &str = "Failed to use allowance";
pub const MESSAGE_SAVE_FAILED: &str = "Failed to save generated message";
pub const JOB_TIMED_OUT: &str = "Generation timed out";

const WORKER_TICK: Duration = Duration::from_secs(5);
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);
/// Pending jobs younger than this still have their own task running.
const PENDING_GRACE: time::Duration = time::Duration::seconds(30);
const DRAIN_BATCH: i64 = 10;

/// Runs one queued job in the background; the caller polls its status.
pub fn spawn_job(state: AppState, job_id: Uuid) {
    tokio::spawn(async move {
        process_job(&state, job_id).await;
    });
}

/// Drives a pending job to completed or failed.
pub async fn process_job(state: &AppState, job_id: Uuid) {
    let job = match state.jobs.claim_job(job_id, OffsetDateTime::now_utc()).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            debug!(%job_id, "job missing or already claimed");
            return;
        }
        Err(err) => {
            error!(?err, %job_id, "failed to claim job");
            return;
        }
    };

    run_claimed_job(state, &job).await;
}

async fn run_claimed_job(state: &AppState, job: &GenerationJob) {
    let (project, user) = match load_context(state, job).await {
        Ok(Some(context)) => context,
        Ok(None) => return fail_job(state, job, None, PROJECT_OR_USER_MISSING).await,
        Err(err) => {
            error!(?err, job_id = %job.id, "failed to load job context");
            return fail_job(state, job, None, PROJECT_OR_USER_MISSING).await;
        }
    };

    match state.allowance.remaining(user.id).await {
        Ok(allowance) if allowance.total_remaining <= 0 => {
            return fail_job(state, job, None, INSUFFICIENT_ALLOWANCE).await
        }
        Ok(_) => {}
        Err(err) => {
            error!(?err, job_id = %job.id, "failed to read allowance");
            return fail_job(state, job, None, ALLOWANCE_CONSUME_FAILED).await;
        }
    }

    let charge = match state.allowance.consume_one(user.id).await {
        Ok(charge) => charge,
        Err(AllowanceError::Exhausted) => {
            return fail_job(state, job, None, ALLOWANCE_CONSUME_FAILED).await
        }
        Err(err) => {
            error!(?err, job_id = %job.id, "failed to consume allowance");
            return fail_job(state, job, None, ALLOWANCE_CONSUME_FAILED).await;
        }
    };

    // An unrecorded charge is invisible to the lease sweep, so only this task can return it.
    if let Err(err) = state.jobs.record_charge(job.id, charge).await {
        error!(?err, job_id = %job.id, ?charge, "failed to record job charge");
        state.allowance.refund_one(user.id, charge).await;
        return fail_job(state, job, None, ALLOWANCE_CONSUME_FAILED).await;
    }

    let generated = match state
        .generator
        .generate(
            &job.username,
            &project.product_info,
            &project.offer_info,
            user.first_name(),
        )
        .await
    {
        Ok(generated) => generated,
        Err(err) => {
            warn!(job_id = %job.id, username = %job.username, error = %err, "generation failed");
            return fail_job(state, job, Some(charge), err.to_string()).await;
        }
    };

    let message = NewMessage {
        project_id: project.id,
        username: job.username.clone(),
        generated_message: generated.message,
        user_info: generated.profile,
    };
    match state
        .jobs
        .complete_job(job.id, &message, OffsetDateTime::now_utc())
        .await
    {
        Ok(Some(stored)) => {
            info!(job_id = %job.id, message_id = %stored.id, "generation job completed")
        }
        Ok(None) => warn!(
            job_id = %job.id,
            "job left processing before completion; generated message discarded"
        ),
        Err(err) => {
            error!(?err, job_id = %job.id, "failed to save generated message");
            fail_job(state, job, Some(charge), MESSAGE_SAVE_FAILED).await;
        }
    }
}

/// Fails a processing job and returns `charge` only if this call made the
/// transition. Losing means the sweep already failed the job and refunded it.
async fn fail_job(
    state: &AppState,
    job: &GenerationJob,
    charge: Option<Charge>,
    error: impl Into<String>,
) {
    let result = GenerationResult::failed(error);
    match state
        .jobs
        .finish_job(job.id, JobStatus::Failed, &result, OffsetDateTime::now_utc())
        .await
    {
        Ok(true) => {
            if let Some(charge) = charge {
                state.allowance.refund_one(job.user_id, charge).await;
            }
            info!(job_id = %job.id, error = ?result.error, "generation job failed");
        }
        Ok(false) => warn!(job_id = %job.id, "job was no longer processing when failed"),
        // Still processing with the charge recorded: the sweep refunds it.
        Err(err) => error!(?err, job_id = %job.id, "failed to store job failure"),
    }
}

async fn load_context(
    state: &AppState,
    job: &GenerationJob,
) -> Result<Option<(Project, User)>, sqlx::Error> {
    let project = state.projects.find_project(job.user_id, job.project_id).await?;
    let user = state.db.find_user_by_id(job.user_id).await?;
    Ok(project.zip(user))
}

/// Synchronous counterpart of a queued job: generates and stores one message
/// for an already charged unit, refunding it on every failure path.
pub async fn generate_charged(
    state: &AppState,
    user: &User,
    project: &Project,
    username: &str,
    charge: Charge,
) -> GenerationResult {
    let generated = match state
        .generator
        .generate(
            username,
            &project.product_info,
            &project.offer_info,
            user.first_name(),
        )
        .await
    {
        Ok(generated) => generated,
        Err(err) => {
            warn!(%username, project_id = %project.id, error = %err, "generation failed");
            state.allowance.refund_one(user.id, charge).await;
            return GenerationResult::failed(err.to_string());
        }
    };

    let saved = state
        .projects
        .insert_message(&NewMessage {
            project_id: project.id,
            username: username.to_string(),
            generated_message: generated.message.clone(),
            user_info: generated.profile.clone(),
        })
        .await;

    match saved {
        Ok(message) => {
            GenerationResult::completed(generated.message, generated.profile, message.id)
        }
        Err(err) => {
            error!(?err, %username, project_id = %project.id, "failed to save generated message");
            state.allowance.refund_one(user.id, charge).await;
            GenerationResult::failed(MESSAGE_SAVE_FAILED)
        }
    }
}

/// Fails jobs stuck in processing past the lease and refunds their charge.
pub async fn sweep_stale_jobs(state: &AppState, now: OffsetDateTime) -> Result<usize, sqlx::Error> {
    let cutoff = now - time::Duration::seconds(state.config.job_lease_seconds);
    let stale = state.jobs.list_stale_jobs(cutoff).await?;
    let mut swept = 0;

    for job in stale {
        let won = state
            .jobs
            .finish_job(
                job.id,
                JobStatus::Failed,
                &GenerationResult::failed(JOB_TIMED_OUT),
                now,
            )
            .await?;
        if !won {
            continue;
        }
        swept += 1;
        if let Some(charge) = job.charge() {
            state.allowance.refund_one(job.user_id, charge).await;
        }
        warn!(job_id = %job.id, user_id = %job.user_id, "failed job past its lease");
    }
    Ok(swept)
}

/// Spawns tasks for pending jobs created before `created_before`, oldest first.
pub async fn drain_pending_jobs(
    state: &AppState,
    created_before: OffsetDateTime,
) -> Result<usize, sqlx::Error> {
    let pending = state.jobs.list_pending_jobs(DRAIN_BATCH).await?;
    let mut drained = 0;
    for job in pending.into_iter().filter(|j| j.created_at < created_before) {
        spawn_job(state.clone(), job.id);
        drained += 1;
    }
    Ok(drained)
}

pub async fn purge_deleted_accounts(
    state: &AppState,
    now: OffsetDateTime,
) -> Result<u64, sqlx::Error> {
    let cutoff = now - time::Duration::days(state.config.account_retention_days);
    let purged = state.db.purge_deleted_accounts(cutoff).await?;
    if purged > 0 {
        info!(purged, "purged accounts past their retention window");
    }
    Ok(purged)
}

pub async fn start_background_workers(state: AppState) {
    tokio::spawn(async move {
        let mut last_purge: Option<Instant> = None;
        loop {
            let now = OffsetDateTime::now_utc();

            if let Err(err) = sweep_stale_jobs(&state, now).await {
                error!(?err, "worker: error sweeping stale jobs");
            }
            if let Err(err) = drain_pending_jobs(&state, now - PENDING_GRACE).await {
                error!(?err, "worker: error draining pending jobs");
            }
            if last_purge.map_or(true, |at| at.elapsed() > PURGE_INTERVAL) {
                if let Err(err) = purge_deleted_accounts(&state, now).await {
                    error!(?err, "worker: error purging deleted accounts");
                }
                last_purge = Some(Instant::now());
            }

            sleep(WORKER_TICK).await;
        }
    });
}
