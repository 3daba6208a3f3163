use std::{env, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub per_second: u64,
    pub burst_size: u32,
    pub auth_per_second: u64,
    pub auth_burst_size: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub bind_addr: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub access_token_ttl_minutes: i64,
    pub cookie_secure: bool,
    pub stripe: StripeSettings,
    pub apify_api_token: String,
    pub openai_api_key: String,
    pub openai_model: String,
    /// How long a job may stay in `processing` before the sweeper fails it.
    pub job_lease_seconds: i64,
    pub account_retention_days: i64,
    pub rate_limit: RateLimitSettings,
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn or_default(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            value.trim().parse().map_err(|_| ConfigError::Invalid { key, value })
        }
        _ => Ok(default),
    }
}

/// Profile scrape (180s) plus the shared HTTP client timeout for the LLM call (120s).
pub const MIN_JOB_LEASE_SECONDS: i64 = 300;

fn job_lease_seconds() -> Result<i64, ConfigError> {
    let seconds = parsed("JOB_LEASE_SECONDS", 600)?;
    if seconds < MIN_JOB_LEASE_SECONDS {
        return Err(ConfigError::Invalid {
            key: "JOB_LEASE_SECONDS",
            value: seconds.to_string(),
        });
    }
    Ok(seconds)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            frontend_origin: required("FRONTEND_ORIGIN")?,
            bind_addr: or_default("BIND_ADDR", "0.0.0.0:8000"),
            jwt_issuer: or_default("JWT_ISSUER", "dmify"),
            jwt_audience: or_default("JWT_AUDIENCE", "dmify-app"),
            access_token_ttl_minutes: parsed("ACCESS_TOKEN_TTL_MINUTES", 30)?,
            cookie_secure: parsed("COOKIE_SECURE", true)?,
            stripe: StripeSettings {
                secret_key: required("STRIPE_SECRET_KEY")?,
                webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            },
            apify_api_token: required("APIFY_API_TOKEN")?,
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_model: or_default("OPENAI_MODEL", "gpt-4.1-mini"),
            job_lease_seconds: job_lease_seconds()?,
            account_retention_days: parsed("ACCOUNT_RETENTION_DAYS", 30)?,
            rate_limit: RateLimitSettings {
                per_second: parsed("RATE_LIMIT_PER_SECOND", 2)?,
                burst_size: parsed("RATE_LIMIT_BURST", 20)?,
                auth_per_second: parsed("AUTH_RATE_LIMIT_PER_SECOND", 6)?,
                auth_burst_size: parsed("AUTH_RATE_LIMIT_BURST", 5)?,
            },
        })
    }

    /// Fully populated config pointing nowhere, for handler tests.
    pub fn for_tests() -> Self {
        Config {
            database_url: String::new(),
            frontend_origin: "http://localhost:5173".into(),
            bind_addr: "127.0.0.1:0".into(),
            jwt_issuer: "dmify".into(),
            jwt_audience: "dmify-app".into(),
            access_token_ttl_minutes: 30,
            cookie_secure: false,
            stripe: StripeSettings {
                secret_key: "sk_test".into(),
                webhook_secret: "whsec_test".into(),
            },
            apify_api_token: "apify_test".into(),
            openai_api_key: "sk-test".into(),
            openai_model: "gpt-4.1-mini".into(),
            job_lease_seconds: 600,
            account_retention_days: 30,
            rate_limit: RateLimitSettings {
                per_second: 2,
                burst_size: 20,
                auth_per_second: 6,
                auth_burst_size: 5,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_falls_back_and_rejects_garbage() {
        env::remove_var("DMIFY_TEST_UNSET_NUMBER");
        assert_eq!(parsed("DMIFY_TEST_UNSET_NUMBER", 42i64), Ok(42));

        env::set_var("DMIFY_TEST_BAD_NUMBER", "forty");
        assert_eq!(
            parsed::<i64>("DMIFY_TEST_BAD_NUMBER", 1),
            Err(ConfigError::Invalid {
                key: "DMIFY_TEST_BAD_NUMBER",
                value: "forty".into()
            })
        );
    }

    #[test]
    fn job_lease_must_outlast_a_generation() {
        env::set_var("JOB_LEASE_SECONDS", "120");
        assert_eq!(
            job_lease_seconds(),
            Err(ConfigError::Invalid {
                key: "JOB_LEASE_SECONDS",
                value: "120".into()
            })
        );

        env::set_var("JOB_LEASE_SECONDS", "900");
        assert_eq!(job_lease_seconds(), Ok(900));
        env::remove_var("JOB_LEASE_SECONDS");
    }

    #[test]
    fn required_treats_blank_as_missing() {
        env::set_var("DMIFY_TEST_BLANK", "  ");
        assert_eq!(
            required("DMIFY_TEST_BLANK"),
            Err(ConfigError::Missing("DMIFY_TEST_BLANK"))
        );
    }
}
