use std::env;

/// Service configuration, loaded once at startup from the environment.
///
/// Missing `ADMIN_KEY` is treated as fatal: the process refuses to start
/// rather than serving a sweep endpoint that can never authenticate.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub admin_key: String,

    pub mint_cost: i64,
    pub default_ttl_seconds: i64,
    pub min_ttl_seconds: i64,
    pub max_ttl_seconds: i64,

    pub sweep_default_limit: i64,
    pub sweep_max_limit: i64,
    pub sweep_interval_seconds: u64,

    /// If true, a SELLER_MISMATCH verify attempt burns the token. Default
    /// false: the source leaves the token live for the bound seller to
    /// redeem.
    pub seller_mismatch_burns_token: bool,
    /// If true, an expired-but-unswept token returns EXPIRED instead of
    /// collapsing into ALREADY_USED.
    pub distinguish_expired: bool,
    /// If true, a token that never existed returns NOT_FOUND instead of
    /// collapsing into ALREADY_USED.
    pub distinguish_not_found: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingRequired("DATABASE_URL"))?;

        let admin_key =
            env::var("ADMIN_KEY").map_err(|_| ConfigError::MissingRequired("ADMIN_KEY"))?;
        if admin_key.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "ADMIN_KEY",
                value: admin_key,
            });
        }

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        Ok(Self {
            database_url,
            bind_addr,
            admin_key,
            mint_cost: parse_env_or("MINT_COST", 10)?,
            default_ttl_seconds: parse_env_or("DEFAULT_TTL_SECONDS", 600)?,
            min_ttl_seconds: parse_env_or("MIN_TTL_SECONDS", 5)?,
            max_ttl_seconds: parse_env_or("MAX_TTL_SECONDS", 3600)?,
            sweep_default_limit: parse_env_or("SWEEP_DEFAULT_LIMIT", 500)?,
            sweep_max_limit: parse_env_or("SWEEP_MAX_LIMIT", 5000)?,
            sweep_interval_seconds: parse_env_or("SWEEP_INTERVAL_SECONDS", 60)?,
            seller_mismatch_burns_token: parse_bool_env_or("SELLER_MISMATCH_BURNS_TOKEN", false)?,
            distinguish_expired: parse_bool_env_or("DISTINGUISH_EXPIRED", false)?,
            distinguish_not_found: parse_bool_env_or("DISTINGUISH_NOT_FOUND", false)?,
        })
    }

    /// Clamp a client-requested TTL into the configured [min, max] window,
    /// falling back to the default when no TTL was requested.
    pub fn clamp_ttl(&self, requested: Option<i64>) -> i64 {
        match requested {
            Some(ttl) => ttl.clamp(self.min_ttl_seconds, self.max_ttl_seconds),
            None => self.default_ttl_seconds,
        }
    }
}

fn parse_env_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            name,
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn parse_bool_env_or(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { name, value: raw }),
        },
        Err(_) => Ok(default),
    }
}
