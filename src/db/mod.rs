pub mod job_repository;
pub mod ledger_repository;
pub mod mock_db;
pub mod payment_repository;
pub mod postgres_job_repository;
pub mod postgres_ledger_repository;
pub mod postgres_payment_repository;
pub mod postgres_project_repository;
pub mod postgres_stripe_event_log_repository;
pub mod postgres_user_repository;
pub mod project_repository;
pub mod stripe_event_log_repository;
pub mod user_repository;
