use std::env;

use auth::AuthenticationError;
use auth::AuthenticatorSettings;
use auth::PasswordHasher;
use auth::RateLimitPolicy;
use config::builder::ConfigBuilder;
use config::builder::DefaultState;
use config::Config as ConfigSource;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::domain::user::models::RateLimitPolicies;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// Postgres is used when present, the in-memory store otherwise.
    pub database: Option<DatabaseConfig>,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub sessions: SessionConfig,
    pub rate_limits: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: String,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
    pub leeway_secs: u64,
}

/// Argon2id work factor.
#[derive(Debug, Deserialize, Clone)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RateLimitConfig {
    pub register: RateLimitPolicy,
    pub login: RateLimitPolicy,
    pub admin_listing: RateLimitPolicy,
}

impl Config {
    /// Load configuration from files with environment variable overrides
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (JWT__SECRET, SERVER__HTTP_PORT, etc.)
    /// 2. Environment-specific config file (config/{environment}.toml)
    /// 3. Default config file (config/default.toml)
    /// 4. Built-in defaults
    ///
    /// There is no default signing secret; loading fails without one.
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let configuration = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Example: JWT__SECRET=... overrides jwt.secret
            .add_source(Environment::default().separator("__"))
            .build()?;

        configuration.try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let register = RateLimitPolicy::register();
        let login = RateLimitPolicy::login();
        let admin_listing = RateLimitPolicy::admin_listing();

        ConfigSource::builder()
            .set_default("server.http_port", 3000_i64)?
            .set_default("jwt.algorithm", "HS256")?
            .set_default("jwt.access_token_ttl_secs", 3600_i64)?
            .set_default("jwt.refresh_token_ttl_secs", 604_800_i64)?
            .set_default("jwt.leeway_secs", 0_i64)?
            .set_default("password.memory_kib", 19_456_i64)?
            .set_default("password.iterations", 2_i64)?
            .set_default("password.parallelism", 1_i64)?
            .set_default("sessions.sweep_interval_secs", 300_i64)?
            .set_default("rate_limits.register.max_requests", i64::from(register.max_requests))?
            .set_default("rate_limits.register.window_secs", register.window_secs as i64)?
            .set_default("rate_limits.login.max_requests", i64::from(login.max_requests))?
            .set_default("rate_limits.login.window_secs", login.window_secs as i64)?
            .set_default(
                "rate_limits.admin_listing.max_requests",
                i64::from(admin_listing.max_requests),
            )?
            .set_default(
                "rate_limits.admin_listing.window_secs",
                admin_listing.window_secs as i64,
            )
    }

    /// Translate the `jwt` and `password` sections into authenticator settings.
    ///
    /// # Errors
    /// * `JwtError::UnsupportedAlgorithm` - Algorithm is not HS256/HS384/HS512
    /// * `PasswordError::InvalidParams` - Work factor rejected by Argon2
    pub fn authenticator_settings(&self) -> Result<AuthenticatorSettings, AuthenticationError> {
        Ok(AuthenticatorSettings {
            algorithm: auth::parse_algorithm(&self.jwt.algorithm)?,
            leeway_secs: self.jwt.leeway_secs,
            access_token_ttl: seconds(self.jwt.access_token_ttl_secs),
            refresh_token_ttl: seconds(self.jwt.refresh_token_ttl_secs),
            password_hasher: PasswordHasher::with_params(
                self.password.memory_kib,
                self.password.iterations,
                self.password.parallelism,
            )?,
        })
    }
}

impl From<RateLimitConfig> for RateLimitPolicies {
    fn from(config: RateLimitConfig) -> Self {
        Self {
            register: config.register,
            login: config.login,
            admin_listing: config.admin_listing,
        }
    }
}

/// Token lifetimes are capped at ten years.
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_TTL_SECS) as i64)
}
