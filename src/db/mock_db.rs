use async_trait::async_trait;
use sqlx::types::Json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

use super::job_repository::JobRepository;
use super::ledger_repository::LedgerRepository;
use super::payment_repository::PaymentRepository;
use super::project_repository::ProjectRepository;
use super::stripe_event_log_repository::StripeEventLogRepository;
use super::user_repository::UserRepository;
use crate::models::credit::{Charge, CreditBalance};
use crate::models::job::{GenerationJob, GenerationResult, JobStatus};
use crate::models::message::{Message, NewMessage};
use crate::models::payment::{NewPaymentTransaction, PaymentTransaction, TransactionStatus};
use crate::models::project::{CreateProject, Project, ProjectUpdate};
use crate::models::signup::SignupPayload;
use crate::models::subscription::{Subscription, SubscriptionStatus, SubscriptionSync};
use crate::models::user::User;

struct StoredCode {
    email: String,
    code: String,
    expires_at: OffsetDateTime,
    used: bool,
}

struct StoredReset {
    user_id: Uuid,
    expires_at: OffsetDateTime,
    used: bool,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    verification_codes: Vec<StoredCode>,
    password_resets: HashMap<String, StoredReset>,
    balances: HashMap<Uuid, CreditBalance>,
    subscriptions: Vec<Subscription>,
    projects: Vec<Project>,
    messages: Vec<Message>,
    jobs: Vec<GenerationJob>,
    transactions: Vec<PaymentTransaction>,
    events: HashSet<String>,
}

/// In-memory implementation of every repository trait.
///
/// All tables live behind one mutex so each method observes and mutates
/// state atomically, the same way a single conditional UPDATE does.
#[derive(Default)]
pub struct MockDb {
    tables: Mutex<Tables>,
    pub should_fail: bool,
    pub fail_message_insert: AtomicBool,
    pub fail_record_charge: AtomicBool,
    pub fail_add_credits: AtomicBool,
    pub fail_upsert_subscription: AtomicBool,
}

fn mock_failure() -> sqlx::Error {
    sqlx::Error::Protocol("Mock DB failure".into())
}

impl MockDb {
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    fn check(&self) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(mock_failure());
        }
        Ok(())
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_user(&self, user: User) {
        let mut tables = self.tables();
        tables
            .balances
            .entry(user.id)
            .or_insert_with(|| CreditBalance::empty(user.id));
        tables.users.insert(user.id, user);
    }

    /// Verified user with an unusable password hash.
    pub fn seed_user(&self, email: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            password_hash: String::new(),
            name: "Jane Doe".into(),
            email_verified: true,
            created_at: OffsetDateTime::now_utc(),
            deletion_requested_at: None,
        };
        self.insert_user(user.clone());
        user
    }

    pub fn user(&self, user_id: Uuid) -> Option<User> {
        self.tables().users.get(&user_id).cloned()
    }

    pub fn balance(&self, user_id: Uuid) -> CreditBalance {
        self.tables()
            .balances
            .get(&user_id)
            .copied()
            .unwrap_or_else(|| CreditBalance::empty(user_id))
    }

    pub fn seed_subscription(
        &self,
        user_id: Uuid,
        plan_id: &str,
        monthly_allowance: i64,
        used_this_month: i64,
    ) -> Subscription {
        let now = OffsetDateTime::now_utc();
        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id,
            external_subscription_id: format!("sub_{}", Uuid::new_v4().simple()),
            plan_id: plan_id.to_string(),
            status: SubscriptionStatus::Active,
            monthly_allowance,
            used_this_month,
            period_start: now,
            period_end: now + time::Duration::days(30),
            cancel_at_period_end: false,
        };
        self.tables().subscriptions.push(subscription.clone());
        subscription
    }

    pub fn subscription(&self, subscription_id: Uuid) -> Option<Subscription> {
        self.tables()
            .subscriptions
            .iter()
            .find(|s| s.id == subscription_id)
            .cloned()
    }

    pub fn seed_project(&self, user_id: Uuid) -> Project {
        let project = Project {
            id: Uuid::new_v4(),
            user_id,
            name: "Launch".into(),
            product_info: "Handmade candles".into(),
            offer_info: "20% off the first order".into(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables().projects.push(project.clone());
        project
    }

    pub fn jobs(&self) -> Vec<GenerationJob> {
        self.tables().jobs.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.tables().messages.clone()
    }

    pub fn transactions(&self) -> Vec<PaymentTransaction> {
        self.tables().transactions.clone()
    }

    pub fn latest_verification_code(&self, email: &str) -> Option<String> {
        self.tables()
            .verification_codes
            .iter()
            .rev()
            .find(|c| c.email == email.to_lowercase())
            .map(|c| c.code.clone())
    }

    pub fn latest_reset_token(&self, user_id: Uuid) -> Option<String> {
        self.tables()
            .password_resets
            .iter()
            .find(|(_, reset)| reset.user_id == user_id && !reset.used)
            .map(|(token, _)| token.clone())
    }

    /// Forces a job's `started_at`, for lease tests.
    pub fn backdate_job(&self, job_id: Uuid, started_at: OffsetDateTime) {
        if let Some(job) = self.tables().jobs.iter_mut().find(|j| j.id == job_id) {
            job.started_at = Some(started_at);
        }
    }
}

#[async_trait]
impl UserRepository for MockDb {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        self.check()?;
        Ok(self
            .tables()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        self.check()?;
        Ok(self.user(user_id))
    }

    async fn is_email_taken(&self, email: &str) -> Result<bool, sqlx::Error> {
        self.check()?;
        Ok(self
            .tables()
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email)))
    }

    async fn create_user(
        &self,
        payload: &SignupPayload,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        self.check()?;
        let user = User {
            id: Uuid::new_v4(),
            email: payload.email.trim().to_lowercase(),
            password_hash: password_hash.to_string(),
            name: payload.name.trim().to_string(),
            email_verified: false,
            created_at: OffsetDateTime::now_utc(),
            deletion_requested_at: None,
        };
        self.tables().users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn replace_verification_code(
        &self,
        email: &str,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        self.check()?;
        let email = email.to_lowercase();
        let mut tables = self.tables();
        tables.verification_codes.retain(|c| c.email != email);
        tables.verification_codes.push(StoredCode {
            email,
            code: code.to_string(),
            expires_at,
            used: false,
        });
        Ok(())
    }

    async fn consume_verification_code(
        &self,
        email: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        self.check()?;
        let email = email.to_lowercase();
        let mut tables = self.tables();
        match tables
            .verification_codes
            .iter_mut()
            .find(|c| c.email == email && c.code == code && !c.used && c.expires_at > now)
        {
            Some(stored) => {
                stored.used = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_user_verified(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        self.check()?;
        if let Some(user) = self.tables().users.get_mut(&user_id) {
            user.email_verified = true;
        }
        Ok(())
    }

    async fn insert_password_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        self.check()?;
        self.tables().password_resets.insert(
            token.to_string(),
            StoredReset {
                user_id,
                expires_at,
                used: false,
            },
        );
        Ok(())
    }

    async fn consume_password_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        match tables.password_resets.get_mut(token) {
            Some(reset) if !reset.used && reset.expires_at > now => {
                reset.used = true;
                Ok(Some(reset.user_id))
            }
            _ => Ok(None),
        }
    }

    async fn update_user_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        self.check()?;
        if let Some(user) = self.tables().users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn mark_account_for_deletion(
        &self,
        user_id: Uuid,
        at: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        self.check()?;
        match self.tables().users.get_mut(&user_id) {
            Some(user) if user.deletion_requested_at.is_none() => {
                user.deletion_requested_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_deleted_accounts(&self, cutoff: OffsetDateTime) -> Result<u64, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        let doomed: HashSet<Uuid> = tables
            .users
            .values()
            .filter(|u| u.deletion_requested_at.is_some_and(|at| at < cutoff))
            .map(|u| u.id)
            .collect();

        let doomed_projects: HashSet<Uuid> = tables
            .projects
            .iter()
            .filter(|p| doomed.contains(&p.user_id))
            .map(|p| p.id)
            .collect();

        tables.users.retain(|id, _| !doomed.contains(id));
        tables.balances.retain(|id, _| !doomed.contains(id));
        tables.subscriptions.retain(|s| !doomed.contains(&s.user_id));
        tables.projects.retain(|p| !doomed.contains(&p.user_id));
        tables
            .messages
            .retain(|m| !doomed_projects.contains(&m.project_id));
        tables.jobs.retain(|j| !doomed.contains(&j.user_id));
        tables.transactions.retain(|t| !doomed.contains(&t.user_id));
        tables.password_resets.retain(|_, r| !doomed.contains(&r.user_id));

        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl ProjectRepository for MockDb {
    async fn create_project(
        &self,
        user_id: Uuid,
        input: &CreateProject,
    ) -> Result<Project, sqlx::Error> {
        self.check()?;
        let project = Project {
            id: Uuid::new_v4(),
            user_id,
            name: input.name.trim().to_string(),
            product_info: input.product_info.trim().to_string(),
            offer_info: input.offer_info.trim().to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables().projects.push(project.clone());
        Ok(project)
    }

    async fn list_projects(&self, user_id: Uuid) -> Result<Vec<Project>, sqlx::Error> {
        self.check()?;
        let mut projects: Vec<Project> = self
            .tables()
            .projects
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        projects.reverse();
        Ok(projects)
    }

    async fn find_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<Project>, sqlx::Error> {
        self.check()?;
        Ok(self
            .tables()
            .projects
            .iter()
            .find(|p| p.id == project_id && p.user_id == user_id)
            .cloned())
    }

    async fn update_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        update: &ProjectUpdate,
    ) -> Result<Option<Project>, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        let Some(project) = tables
            .projects
            .iter_mut()
            .find(|p| p.id == project_id && p.user_id == user_id)
        else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            project.name = name.clone();
        }
        if let Some(product_info) = &update.product_info {
            project.product_info = product_info.clone();
        }
        if let Some(offer_info) = &update.offer_info {
            project.offer_info = offer_info.clone();
        }
        Ok(Some(project.clone()))
    }

    async fn delete_project(&self, user_id: Uuid, project_id: Uuid) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        let before = tables.projects.len();
        tables
            .projects
            .retain(|p| !(p.id == project_id && p.user_id == user_id));
        if tables.projects.len() == before {
            return Ok(false);
        }
        tables.messages.retain(|m| m.project_id != project_id);
        tables.jobs.retain(|j| j.project_id != project_id);
        Ok(true)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<Message, sqlx::Error> {
        self.check()?;
        if self.fail_message_insert.load(Ordering::SeqCst) {
            return Err(mock_failure());
        }
        let now = OffsetDateTime::now_utc();
        let stored = Message {
            id: Uuid::new_v4(),
            project_id: message.project_id,
            username: message.username.clone(),
            generated_message: message.generated_message.clone(),
            user_info: Json(message.user_info.clone()),
            created_at: now,
            updated_at: now,
        };
        self.tables().messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(&self, project_id: Uuid) -> Result<Vec<Message>, sqlx::Error> {
        self.check()?;
        let mut messages: Vec<Message> = self
            .tables()
            .messages
            .iter()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect();
        messages.reverse();
        Ok(messages)
    }

    async fn list_messages_for_user(&self, user_id: Uuid) -> Result<Vec<Message>, sqlx::Error> {
        self.check()?;
        let tables = self.tables();
        let owned: HashSet<Uuid> = tables
            .projects
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.id)
            .collect();
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| owned.contains(&m.project_id))
            .cloned()
            .collect();
        messages.reverse();
        Ok(messages)
    }

    async fn find_message(
        &self,
        project_id: Uuid,
        message_id: Uuid,
    ) -> Result<Option<Message>, sqlx::Error> {
        self.check()?;
        Ok(self
            .tables()
            .messages
            .iter()
            .find(|m| m.id == message_id && m.project_id == project_id)
            .cloned())
    }

    async fn update_message_text(
        &self,
        project_id: Uuid,
        message_id: Uuid,
        text: &str,
    ) -> Result<Option<Message>, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        Ok(tables
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.project_id == project_id)
            .map(|m| {
                m.generated_message = text.to_string();
                m.updated_at = OffsetDateTime::now_utc();
                m.clone()
            }))
    }

    async fn delete_message(
        &self,
        project_id: Uuid,
        message_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        let before = tables.messages.len();
        tables
            .messages
            .retain(|m| !(m.id == message_id && m.project_id == project_id));
        Ok(tables.messages.len() < before)
    }
}

#[async_trait]
impl LedgerRepository for MockDb {
    async fn ensure_balance(&self, user_id: Uuid) -> Result<CreditBalance, sqlx::Error> {
        self.check()?;
        Ok(*self
            .tables()
            .balances
            .entry(user_id)
            .or_insert_with(|| CreditBalance::empty(user_id)))
    }

    async fn add_credits(
        &self,
        user_id: Uuid,
        amount: i64,
    ) -> Result<CreditBalance, sqlx::Error> {
        self.check()?;
        if self.fail_add_credits.load(Ordering::SeqCst) {
            return Err(mock_failure());
        }
        let mut tables = self.tables();
        let balance = tables
            .balances
            .entry(user_id)
            .or_insert_with(|| CreditBalance::empty(user_id));
        balance.credits += amount;
        balance.total_earned += amount;
        Ok(*balance)
    }

    async fn consume_credit(&self, user_id: Uuid) -> Result<Option<CreditBalance>, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        match tables.balances.get_mut(&user_id) {
            Some(balance) if balance.credits > 0 => {
                balance.credits -= 1;
                balance.total_used += 1;
                Ok(Some(*balance))
            }
            _ => Ok(None),
        }
    }

    async fn refund_credit(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        match tables.balances.get_mut(&user_id) {
            Some(balance) if balance.total_used > 0 => {
                balance.credits += 1;
                balance.total_used -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn current_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        self.check()?;
        Ok(self
            .tables()
            .subscriptions
            .iter()
            .rev()
            .find(|s| s.user_id == user_id && s.status.is_current())
            .cloned())
    }

    async fn consume_subscription_unit(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        match tables
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id)
        {
            Some(sub) if sub.status.is_current() && sub.used_this_month < sub.monthly_allowance => {
                sub.used_this_month += 1;
                Ok(Some(sub.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn refund_subscription_unit(&self, subscription_id: Uuid) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        match tables
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id)
        {
            Some(sub) if sub.used_this_month > 0 => {
                sub.used_this_month -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_subscription(
        &self,
        sync: &SubscriptionSync,
    ) -> Result<Subscription, sqlx::Error> {
        self.check()?;
        if self.fail_upsert_subscription.load(Ordering::SeqCst) {
            return Err(mock_failure());
        }
        let mut tables = self.tables();
        if sync.status.is_current() {
            for other in tables.subscriptions.iter_mut().filter(|s| {
                s.user_id == sync.user_id
                    && s.external_subscription_id != sync.external_subscription_id
                    && s.status.is_current()
            }) {
                other.status = SubscriptionStatus::Canceled;
            }
        }

        if let Some(existing) = tables
            .subscriptions
            .iter_mut()
            .find(|s| s.external_subscription_id == sync.external_subscription_id)
        {
            existing.plan_id = sync.plan_id.clone();
            existing.status = sync.status;
            existing.monthly_allowance = sync.monthly_allowance;
            existing.period_start = sync.period_start;
            existing.period_end = sync.period_end;
            existing.cancel_at_period_end = sync.cancel_at_period_end;
            return Ok(existing.clone());
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: sync.user_id,
            external_subscription_id: sync.external_subscription_id.clone(),
            plan_id: sync.plan_id.clone(),
            status: sync.status,
            monthly_allowance: sync.monthly_allowance,
            used_this_month: 0,
            period_start: sync.period_start,
            period_end: sync.period_end,
            cancel_at_period_end: sync.cancel_at_period_end,
        };
        tables.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn find_subscription_by_external_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        self.check()?;
        Ok(self
            .tables()
            .subscriptions
            .iter()
            .find(|s| s.external_subscription_id == external_subscription_id)
            .cloned())
    }

    async fn reset_subscription_usage(
        &self,
        external_subscription_id: &str,
        period_start: OffsetDateTime,
        period_end: OffsetDateTime,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        Ok(tables
            .subscriptions
            .iter_mut()
            .find(|s| s.external_subscription_id == external_subscription_id)
            .map(|s| {
                s.used_this_month = 0;
                s.period_start = period_start;
                s.period_end = period_end;
                s.clone()
            }))
    }

    async fn set_subscription_status(
        &self,
        external_subscription_id: &str,
        status: SubscriptionStatus,
        cancel_at_period_end: bool,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        Ok(tables
            .subscriptions
            .iter_mut()
            .find(|s| s.external_subscription_id == external_subscription_id)
            .map(|s| {
                s.status = status;
                s.cancel_at_period_end = cancel_at_period_end;
                s.clone()
            }))
    }
}

#[async_trait]
impl JobRepository for MockDb {
    async fn create_job(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        username: &str,
    ) -> Result<GenerationJob, sqlx::Error> {
        self.check()?;
        let job = GenerationJob {
            id: Uuid::new_v4(),
            user_id,
            project_id,
            username: username.to_string(),
            status: JobStatus::Pending,
            result: None,
            charge_source: None,
            charge_subscription_id: None,
            created_at: OffsetDateTime::now_utc(),
            started_at: None,
            completed_at: None,
        };
        self.tables().jobs.push(job.clone());
        Ok(job)
    }

    async fn find_job(&self, job_id: Uuid) -> Result<Option<GenerationJob>, sqlx::Error> {
        self.check()?;
        Ok(self.tables().jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn find_job_for_user(
        &self,
        user_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<GenerationJob>, sqlx::Error> {
        self.check()?;
        Ok(self
            .tables()
            .jobs
            .iter()
            .find(|j| j.id == job_id && j.user_id == user_id)
            .cloned())
    }

    async fn list_jobs_for_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<GenerationJob>, sqlx::Error> {
        self.check()?;
        let mut jobs: Vec<GenerationJob> = self
            .tables()
            .jobs
            .iter()
            .filter(|j| j.project_id == project_id && j.user_id == user_id)
            .cloned()
            .collect();
        jobs.reverse();
        Ok(jobs)
    }

    async fn claim_job(
        &self,
        job_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<GenerationJob>, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        match tables.jobs.iter_mut().find(|j| j.id == job_id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Processing;
                job.started_at = Some(now);
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_charge(&self, job_id: Uuid, charge: Charge) -> Result<(), sqlx::Error> {
        self.check()?;
        if self.fail_record_charge.load(Ordering::SeqCst) {
            return Err(mock_failure());
        }
        if let Some(job) = self.tables().jobs.iter_mut().find(|j| j.id == job_id) {
            job.charge_source = Some(charge.source());
            job.charge_subscription_id = charge.subscription_id();
        }
        Ok(())
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: &GenerationResult,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        match tables.jobs.iter_mut().find(|j| j.id == job_id) {
            Some(job) if job.status == JobStatus::Processing => {
                job.status = status;
                job.result = Some(Json(result.clone()));
                job.completed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        message: &NewMessage,
        now: OffsetDateTime,
    ) -> Result<Option<Message>, sqlx::Error> {
        self.check()?;
        if self.fail_message_insert.load(Ordering::SeqCst) {
            return Err(mock_failure());
        }
        let mut tables = self.tables();
        let Some(job) = tables
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Processing)
        else {
            return Ok(None);
        };

        let stored = Message {
            id: Uuid::new_v4(),
            project_id: message.project_id,
            username: message.username.clone(),
            generated_message: message.generated_message.clone(),
            user_info: Json(message.user_info.clone()),
            created_at: now,
            updated_at: now,
        };
        job.status = JobStatus::Completed;
        job.result = Some(Json(GenerationResult::completed(
            stored.generated_message.clone(),
            message.user_info.clone(),
            stored.id,
        )));
        job.completed_at = Some(now);
        tables.messages.push(stored.clone());
        Ok(Some(stored))
    }

    async fn delete_pending_job(&self, user_id: Uuid, job_id: Uuid) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        let before = tables.jobs.len();
        tables.jobs.retain(|j| {
            !(j.id == job_id && j.user_id == user_id && j.status == JobStatus::Pending)
        });
        Ok(tables.jobs.len() < before)
    }

    async fn list_pending_jobs(&self, limit: i64) -> Result<Vec<GenerationJob>, sqlx::Error> {
        self.check()?;
        let mut pending: Vec<GenerationJob> = self
            .tables()
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|j| j.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn list_stale_jobs(
        &self,
        started_before: OffsetDateTime,
    ) -> Result<Vec<GenerationJob>, sqlx::Error> {
        self.check()?;
        Ok(self
            .tables()
            .jobs
            .iter()
            .filter(|j| {
                j.status == JobStatus::Processing
                    && j.started_at.is_some_and(|at| at < started_before)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentRepository for MockDb {
    async fn create_transaction(
        &self,
        transaction: &NewPaymentTransaction,
    ) -> Result<PaymentTransaction, sqlx::Error> {
        self.check()?;
        let now = OffsetDateTime::now_utc();
        let stored = PaymentTransaction {
            id: Uuid::new_v4(),
            user_id: transaction.user_id,
            external_session_id: transaction.external_session_id.clone(),
            plan_id: transaction.plan_id.clone(),
            amount: transaction.amount,
            quantity: transaction.quantity,
            status: TransactionStatus::Pending,
            transaction_type: transaction.transaction_type,
            created_at: now,
            updated_at: now,
        };
        self.tables().transactions.push(stored.clone());
        Ok(stored)
    }

    async fn find_transaction_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<PaymentTransaction>, sqlx::Error> {
        self.check()?;
        Ok(self
            .tables()
            .transactions
            .iter()
            .find(|t| t.external_session_id == session_id)
            .cloned())
    }

    async fn claim_transaction(
        &self,
        session_id: &str,
    ) -> Result<Option<PaymentTransaction>, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        match tables
            .transactions
            .iter_mut()
            .find(|t| t.external_session_id == session_id)
        {
            Some(tx) if tx.status == TransactionStatus::Pending => {
                tx.status = TransactionStatus::Completed;
                tx.updated_at = OffsetDateTime::now_utc();
                Ok(Some(tx.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn revert_transaction(&self, session_id: &str) -> Result<(), sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        if let Some(tx) = tables.transactions.iter_mut().find(|t| {
            t.external_session_id == session_id && t.status == TransactionStatus::Completed
        }) {
            tx.status = TransactionStatus::Pending;
            tx.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn mark_transaction_failed(&self, session_id: &str) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut tables = self.tables();
        match tables.transactions.iter_mut().find(|t| {
            t.external_session_id == session_id && t.status == TransactionStatus::Pending
        }) {
            Some(tx) => {
                tx.status = TransactionStatus::Failed;
                tx.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PaymentTransaction>, sqlx::Error> {
        self.check()?;
        let mut rows: Vec<PaymentTransaction> = self
            .tables()
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }
}

#[async_trait]
impl StripeEventLogRepository for MockDb {
    async fn has_processed_event(&self, event_id: &str) -> Result<bool, sqlx::Error> {
        self.check()?;
        Ok(self.tables().events.contains(event_id))
    }

    async fn record_event(&self, event_id: &str) -> Result<(), sqlx::Error> {
        self.check()?;
        self.tables().events.insert(event_id.to_string());
        Ok(())
    }
}
