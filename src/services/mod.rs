pub mod allowance;
pub mod billing;
pub mod export;
pub mod generation;
pub mod smtp_mailer;
pub mod stripe;
