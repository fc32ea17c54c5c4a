use serde::Deserialize;

/// Configuration for the API server and the settlement worker.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub signer_url: String,
    pub signer_shared_secret: Option<String>,
    pub settlement_provider: String,
    pub rail_network: String,
    pub hosted_rail_base_url: Option<String>,
    pub hosted_rail_api_key: Option<String>,
    pub confirmations_required: u32,
    pub custody_address: String,
    pub worker_poll_seconds: u64,
    pub retry_backoff_base_seconds: u64,
    pub retry_backoff_max_seconds: u64,
    pub worker_max_attempts: i32,
    pub job_lease_seconds: u64,
    pub intent_ttl_seconds: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/instant_refund".to_string()),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            signer_url: std::env::var("SIGNER_URL")
                .unwrap_or_else(|_| "http://localhost:8081/sign".to_string()),
            signer_shared_secret: std::env::var("SIGNER_SHARED_SECRET").ok(),
            settlement_provider: std::env::var("SETTLEMENT_PROVIDER")
                .unwrap_or_else(|_| "stub".to_string()),
            rail_network: std::env::var("RAIL_NETWORK")
                .unwrap_or_else(|_| "kaspa".to_string()),
            hosted_rail_base_url: std::env::var("HOSTED_RAIL_BASE_URL").ok(),
            hosted_rail_api_key: std::env::var("HOSTED_RAIL_API_KEY").ok(),
            confirmations_required: env_parse("CONFIRMATIONS_REQUIRED", 1)?,
            custody_address: std::env::var("CUSTODY_ADDRESS")
                .unwrap_or_else(|_| "kaspa:dev-custody".to_string()),
            worker_poll_seconds: env_parse("WORKER_POLL_SECONDS", 2)?,
            retry_backoff_base_seconds: env_parse("RETRY_BACKOFF_BASE_SECONDS", 10)?,
            retry_backoff_max_seconds: env_parse("RETRY_BACKOFF_MAX_SECONDS", 600)?,
            worker_max_attempts: env_parse("WORKER_MAX_ATTEMPTS", 8)?,
            job_lease_seconds: env_parse("JOB_LEASE_SECONDS", 300)?,
            intent_ttl_seconds: env_parse("INTENT_TTL_SECONDS", 120)?,
        })
    }
}

/// Configuration for the custody-isolated signer process.
///
/// The signing key and shared secret are only ever read here; the worker and
/// API processes never see them.
#[derive(Debug, Clone)]
pub struct SignerConfig {
    pub bind_address: String,
    pub shared_secret: Option<String>,
    pub custody_address: Option<String>,
    pub network: String,
    pub amount_ceiling_atomic: i64,
    pub rate_limit_per_minute: u32,
    pub private_key_b64: Option<String>,
}

impl SignerConfig {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            bind_address: std::env::var("SIGNER_BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8081".to_string()),
            shared_secret: std::env::var("SIGNER_SHARED_SECRET").ok(),
            custody_address: std::env::var("CUSTODY_ADDRESS").ok(),
            network: std::env::var("RAIL_NETWORK").unwrap_or_else(|_| "kaspa".to_string()),
            amount_ceiling_atomic: env_parse("SIGNER_AMOUNT_CEILING", 10_000_000_000)?,
            rate_limit_per_minute: env_parse("SIGNER_RATE_LIMIT_PER_MINUTE", 60)?,
            private_key_b64: std::env::var("SIGNER_PRIVATE_KEY").ok(),
        })
    }
}

/// Parse an optional env var, defaulting when unset. A value that is set
/// but malformed is a configuration error, not a silent fallback.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, config::ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| {
            config::ConfigError::Message(format!("{} has invalid value: {:?}", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse_defaults_when_unset() {
        assert_eq!(env_parse("INSTANT_REFUND_TEST_UNSET", 7u64).unwrap(), 7);
    }

    #[test]
    fn test_env_parse_reads_valid_value() {
        std::env::set_var("INSTANT_REFUND_TEST_VALID", "42");
        assert_eq!(env_parse("INSTANT_REFUND_TEST_VALID", 7u64).unwrap(), 42);
    }

    #[test]
    fn test_env_parse_rejects_malformed_value() {
        std::env::set_var("INSTANT_REFUND_TEST_MALFORMED", "eight");
        let err = env_parse("INSTANT_REFUND_TEST_MALFORMED", 8i32).unwrap_err();
        assert!(err.to_string().contains("INSTANT_REFUND_TEST_MALFORMED"));
    }
}
