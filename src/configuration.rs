use config::ConfigError;
use std::time::Duration;

const MIN_SECRET_LENGTH: usize = 32;
const MAX_CLOCK_SKEW_SECONDS: u64 = 300;
// bcrypt's accepted work factor range
const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    pub password: PasswordSettings,
    pub timeouts: TimeoutSettings,
    pub housekeeping: HousekeepingSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    /// Server address without a database, for creating one
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT signing settings
///
/// `secret` is the process-wide HMAC key. Changing it invalidates every
/// token issued under the previous value.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub access_token_expiry: i64,  // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: i64, // seconds (e.g., 1209600 for 14 days)
    #[serde(default)]
    pub clock_skew_seconds: u64,
}

#[derive(serde::Deserialize, Clone)]
pub struct PasswordSettings {
    pub bcrypt_cost: u32,
}

#[derive(serde::Deserialize, Clone)]
pub struct TimeoutSettings {
    pub store_millis: u64,
    pub hashing_millis: u64,
}

impl TimeoutSettings {
    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_millis)
    }

    pub fn hashing(&self) -> Duration {
        Duration::from_millis(self.hashing_millis)
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct HousekeepingSettings {
    pub purge_interval_seconds: u64,
}

impl Settings {
    /// Reject settings the service cannot run safely with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let jwt = &self.jwt;
        if jwt.secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::Message(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if jwt.access_token_expiry <= 0 || jwt.access_token_expiry >= jwt.refresh_token_expiry {
            return Err(ConfigError::Message(
                "jwt.access_token_expiry must be positive and shorter than jwt.refresh_token_expiry"
                    .to_string(),
            ));
        }
        if jwt.clock_skew_seconds > MAX_CLOCK_SKEW_SECONDS {
            return Err(ConfigError::Message(format!(
                "jwt.clock_skew_seconds must not exceed {}",
                MAX_CLOCK_SKEW_SECONDS
            )));
        }
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.password.bcrypt_cost) {
            return Err(ConfigError::Message(format!(
                "password.bcrypt_cost must be between {} and {}",
                MIN_BCRYPT_COST,
                MAX_BCRYPT_COST
            )));
        }
        if self.timeouts.store_millis == 0 || self.timeouts.hashing_millis == 0 {
            return Err(ConfigError::Message("timeouts must be non-zero".to_string()));
        }
        if self.housekeeping.purge_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "housekeeping.purge_interval_seconds must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load settings from `configuration.{yaml,toml,json}` (optional) and
/// `APP__SECTION__KEY` environment variables, then validate them.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;
    settings.validate()?;
    Ok(settings)
}
