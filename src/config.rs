use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::{
    constant::{
        ALGORITHM, COOKIE_NAME, GATEWAY_ADDR, ISSUER, LEEWAY_SECS,
        MAX_TTL_SECS, MIN_SECRET_LEN, MISMATCH_RETRY_SECS, SECRET_LEN, SECRET_TTL_SECS,
        STORE_ADDR, STORE_TIMEOUT_MILLIS, TOKEN_LIFETIME_SECS, VERIFIER_ADDR,
    },
    error::ConfigError,
};

/// Environment variable naming an optional JSON config file.
pub const CONFIG_ENV: &str = "TOKENAUTH_CONFIG";

/// Settings shared by the Authority, the Gateway and the services.
///
/// Built once at startup and passed around as `Arc<Config>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {

    /// Issuer claim stamped into tokens and required on verification.
    pub issuer: String,

    /// HMAC variant used to sign new tokens.
    pub algorithm: String,

    /// Lifetime of an issued token.
    pub token_lifetime_secs: u64,

    /// Rotation TTL of a secret, renewed on every issuance.
    pub secret_ttl_secs: u64,

    /// Length in bytes of a freshly created secret.
    pub secret_len: usize,

    /// Clock skew tolerated on `nbf` and `exp`.
    pub leeway_secs: u64,

    /// Window after issuance in which a signature mismatch triggers one
    /// re-read of the secret.
    pub mismatch_retry_secs: u64,

    /// Bound on a single store round trip.
    pub store_timeout_millis: u64,

    pub gateway_addr: String,
    pub store_addr: String,
    pub verifier_addr: String,

    /// Cookie that may carry the bearer token.
    pub cookie_name: String,

    /// Runtime worker threads. Defaults to the number of CPUs.
    pub worker_threads: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            issuer: ISSUER.to_owned(),
            algorithm: ALGORITHM.to_owned(),
            token_lifetime_secs: TOKEN_LIFETIME_SECS,
            secret_ttl_secs: SECRET_TTL_SECS,
            secret_len: SECRET_LEN,
            leeway_secs: LEEWAY_SECS,
            mismatch_retry_secs: MISMATCH_RETRY_SECS,
            store_timeout_millis: STORE_TIMEOUT_MILLIS,
            gateway_addr: GATEWAY_ADDR.to_owned(),
            store_addr: STORE_ADDR.to_owned(),
            verifier_addr: VERIFIER_ADDR.to_owned(),
            cookie_name: COOKIE_NAME.to_owned(),
            worker_threads: None,
        }
    }
}

impl Config {

    /// Load the configuration.
    ///
    /// Starts from the defaults or from the JSON file named by
    /// `TOKENAUTH_CONFIG`, then applies `TOKENAUTH_*` overrides from the
    /// environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_json(&std::fs::read_to_string(path)?)?,
            Err(_) => Config::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply overrides looked up by variable name.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where F: Fn(&str) -> Option<String> {
        if let Some(v) = lookup("TOKENAUTH_ISSUER") {
            self.issuer = v;
        }
        if let Some(v) = lookup("TOKENAUTH_ALGORITHM") {
            self.algorithm = v;
        }
        if let Some(v) = lookup("TOKENAUTH_TOKEN_LIFETIME_SECS") {
            self.token_lifetime_secs = parse("token_lifetime_secs", &v)?;
        }
        if let Some(v) = lookup("TOKENAUTH_SECRET_TTL_SECS") {
            self.secret_ttl_secs = parse("secret_ttl_secs", &v)?;
        }
        if let Some(v) = lookup("TOKENAUTH_LEEWAY_SECS") {
            self.leeway_secs = parse("leeway_secs", &v)?;
        }
        if let Some(v) = lookup("TOKENAUTH_STORE_TIMEOUT_MILLIS") {
            self.store_timeout_millis = parse("store_timeout_millis", &v)?;
        }
        if let Some(v) = lookup("TOKENAUTH_GATEWAY_ADDR") {
            self.gateway_addr = v;
        }
        if let Some(v) = lookup("TOKENAUTH_STORE_ADDR") {
            self.store_addr = v;
        }
        if let Some(v) = lookup("TOKENAUTH_VERIFIER_ADDR") {
            self.verifier_addr = v;
        }
        if let Some(v) = lookup("TOKENAUTH_WORKER_THREADS") {
            self.worker_threads = Some(parse("worker_threads", &v)?);
        }
        Ok(())
    }

    /// Check the configuration for values the Authority cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(invalid("issuer", "must not be empty"));
        }
        self.signing_algorithm()?;
        if self.token_lifetime_secs == 0 {
            return Err(invalid("token_lifetime_secs", "must be positive"));
        }
        if self.token_lifetime_secs > MAX_TTL_SECS {
            return Err(invalid(
                "token_lifetime_secs",
                &format!("must not exceed {} seconds", MAX_TTL_SECS),
            ));
        }
        if self.secret_ttl_secs > MAX_TTL_SECS {
            return Err(invalid(
                "secret_ttl_secs",
                &format!("must not exceed {} seconds", MAX_TTL_SECS),
            ));
        }
        // A secret must outlive every token it signed.
        if self.secret_ttl_secs < self.token_lifetime_secs.saturating_add(self.leeway_secs) {
            return Err(invalid(
                "secret_ttl_secs",
                "must cover the token lifetime plus leeway",
            ));
        }
        if self.secret_len < MIN_SECRET_LEN {
            return Err(invalid(
                "secret_len",
                &format!("must be at least {} bytes", MIN_SECRET_LEN),
            ));
        }
        if self.leeway_secs >= self.token_lifetime_secs {
            return Err(invalid("leeway_secs", "must be shorter than the token lifetime"));
        }
        if self.worker_threads == Some(0) {
            return Err(invalid("worker_threads", "must be positive"));
        }
        Ok(())
    }

    /// Return the configured algorithm, refusing anything but HMAC.
    pub fn signing_algorithm(&self) -> Result<Algorithm, ConfigError> {
        match self.algorithm.as_str() {
            "HS256" => Ok(Algorithm::HS256),
            "HS384" => Ok(Algorithm::HS384),
            "HS512" => Ok(Algorithm::HS512),
            other => Err(invalid(
                "algorithm",
                &format!("{} is not an HMAC algorithm", other),
            )),
        }
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::from_secs(self.token_lifetime_secs)
    }

    pub fn secret_ttl(&self) -> Duration {
        Duration::from_secs(self.secret_ttl_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_millis)
    }

    /// Number of runtime worker threads to start.
    pub fn worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(num_cpus::get)
    }
}

fn parse<T: std::str::FromStr>(
    field: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(field, &format!("cannot parse {:?}", value)))
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_owned(),
    }
}
