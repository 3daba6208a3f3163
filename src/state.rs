use crate::config::Config;
use crate::db::{
    job_repository::JobRepository, ledger_repository::LedgerRepository,
    payment_repository::PaymentRepository, project_repository::ProjectRepository,
    stripe_event_log_repository::StripeEventLogRepository, user_repository::UserRepository,
};
use crate::models::plan::PlanCatalog;
use crate::services::allowance::AllowanceManager;
use crate::services::generation::Generator;
use crate::services::smtp_mailer::Mailer;
use crate::services::stripe::StripeService;
use crate::utils::jwt::{JwtKeyProvider, JwtKeys};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn UserRepository>,
    pub projects: Arc<dyn ProjectRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub stripe_events: Arc<dyn StripeEventLogRepository>,
    pub allowance: AllowanceManager,
    pub generator: Generator,
    pub mailer: Arc<dyn Mailer>,
    pub stripe: Arc<dyn StripeService>,
    pub plans: Arc<PlanCatalog>,
    pub config: Arc<Config>,
    pub jwt_keys: Arc<JwtKeys>,
}

impl JwtKeyProvider for AppState {
    fn jwt_keys(&self) -> &JwtKeys {
        self.jwt_keys.as_ref()
    }

    fn jwt_issuer(&self) -> &str {
        &self.config.jwt_issuer
    }

    fn jwt_audience(&self) -> &str {
        &self.config.jwt_audience
    }
}
