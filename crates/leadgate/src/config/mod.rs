use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub admission: AdmissionConfig,
    pub postback: PostbackConfig,
    pub autopilot: AutoPilotConfig,
    pub stores: StoreBackend,
    pub admin: AdminConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let admission = AdmissionConfig {
            hash_secret: env::var("HASH_SECRET").unwrap_or_else(|_| "change-me".to_string()),
            decision_deadline: Duration::from_millis(parse_var("DECISION_DEADLINE_MS", 8_000)?),
        };

        let postback = PostbackConfig {
            endpoint: optional_var("POSTBACK_URL"),
            timeout: Duration::from_millis(parse_var("POSTBACK_TIMEOUT_MS", 4_000)?),
            max_attempts: parse_var("POSTBACK_MAX_ATTEMPTS", 3)?,
            initial_backoff: Duration::from_millis(parse_var("POSTBACK_BACKOFF_MS", 300)?),
        };

        let autopilot = AutoPilotConfig {
            step: parse_var("AUTOPILOT_STEP", 10)?,
            min_accept: parse_var("AUTOPILOT_MIN_ACCEPT", 5)?,
            emergency_margin: parse_var("AUTOPILOT_EMERGENCY_MARGIN", -50.0)?,
            default_target_margin: parse_var("AUTOPILOT_DEFAULT_TARGET_MARGIN", 15.0)?,
            default_min_volume: parse_var("AUTOPILOT_DEFAULT_MIN_VOLUME", 20)?,
            margin_buffer: parse_var("AUTOPILOT_MARGIN_BUFFER", 5.0)?,
        };
        if autopilot.min_accept > 100 {
            return Err(ConfigError::InvalidValue {
                key: "AUTOPILOT_MIN_ACCEPT",
                value: autopilot.min_accept.to_string(),
            });
        }

        let stores = StoreBackend::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            admission,
            postback,
            autopilot,
            stores,
            admin: AdminConfig {
                token: optional_var("ADMIN_UI_TOKEN"),
            },
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Inputs of the admission decision: the bucketing secret and the per-lead deadline.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    pub hash_secret: String,
    pub decision_deadline: Duration,
}

/// Outbound acceptance notification. No endpoint means postbacks are not required.
#[derive(Debug, Clone)]
pub struct PostbackConfig {
    pub endpoint: Option<String>,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

/// Step controller tuning shared by every auto-pilot rule.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoPilotConfig {
    pub step: u8,
    pub min_accept: u8,
    pub emergency_margin: f64,
    pub default_target_margin: f64,
    pub default_min_volume: u32,
    pub margin_buffer: f64,
}

impl Default for AutoPilotConfig {
    fn default() -> Self {
        Self {
            step: 10,
            min_accept: 5,
            emergency_margin: -50.0,
            default_target_margin: 15.0,
            default_min_volume: 20,
            margin_buffer: 5.0,
        }
    }
}

/// Which collaborators back the rule, counter and analytics stores.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    InMemory,
    Rest(RestStoreConfig),
}

impl StoreBackend {
    fn from_env() -> Result<Self, ConfigError> {
        let rule_url = optional_var("RULE_STORE_URL");
        let analytics_url = optional_var("ANALYTICS_URL");

        let (rule_store_url, analytics_url) = match (rule_url, analytics_url) {
            (None, None) => return Ok(Self::InMemory),
            (Some(rules), Some(analytics)) => (rules, analytics),
            (Some(_), None) => return Err(ConfigError::MissingVar("ANALYTICS_URL")),
            (None, Some(_)) => return Err(ConfigError::MissingVar("RULE_STORE_URL")),
        };

        Ok(Self::Rest(RestStoreConfig {
            rule_store_url,
            rule_store_token: optional_var("RULE_STORE_TOKEN")
                .ok_or(ConfigError::MissingVar("RULE_STORE_TOKEN"))?,
            rule_collection: optional_var("RULE_COLLECTION")
                .unwrap_or_else(|| "Optimization_rules".to_string()),
            analytics_url,
            analytics_key: optional_var("ANALYTICS_KEY")
                .ok_or(ConfigError::MissingVar("ANALYTICS_KEY"))?,
            counter_table: optional_var("COUNTER_TABLE")
                .unwrap_or_else(|| "lead_counters".to_string()),
            traffic_table: optional_var("TRAFFIC_TABLE")
                .unwrap_or_else(|| "tool_performance_stats".to_string()),
            performance_view: optional_var("PERFORMANCE_VIEW")
                .unwrap_or_else(|| "offer_performance_v2".to_string()),
            timeout: Duration::from_millis(parse_var("STORE_TIMEOUT_MS", 3_000)?),
        }))
    }
}

/// Connection details for the REST-backed stores.
#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    pub rule_store_url: String,
    pub rule_store_token: String,
    pub rule_collection: String,
    pub analytics_url: String,
    pub analytics_key: String,
    pub counter_table: String,
    pub traffic_table: String,
    pub performance_view: String,
    pub timeout: Duration,
}

/// Administration surface. Without a token the admin routes refuse every request.
#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    pub token: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
    MissingVar(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an invalid value '{value}'")
            }
            ConfigError::MissingVar(key) => write!(f, "{key} must be set"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidValue { .. }
            | ConfigError::MissingVar(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "HASH_SECRET",
            "DECISION_DEADLINE_MS",
            "POSTBACK_URL",
            "POSTBACK_TIMEOUT_MS",
            "POSTBACK_MAX_ATTEMPTS",
            "POSTBACK_BACKOFF_MS",
            "AUTOPILOT_STEP",
            "AUTOPILOT_MIN_ACCEPT",
            "AUTOPILOT_EMERGENCY_MARGIN",
            "AUTOPILOT_DEFAULT_TARGET_MARGIN",
            "AUTOPILOT_DEFAULT_MIN_VOLUME",
            "AUTOPILOT_MARGIN_BUFFER",
            "RULE_STORE_URL",
            "RULE_STORE_TOKEN",
            "RULE_COLLECTION",
            "ANALYTICS_URL",
            "ANALYTICS_KEY",
            "COUNTER_TABLE",
            "TRAFFIC_TABLE",
            "PERFORMANCE_VIEW",
            "STORE_TIMEOUT_MS",
            "ADMIN_UI_TOKEN",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.admission.hash_secret, "change-me");
        assert_eq!(config.postback.endpoint, None);
        assert_eq!(config.postback.max_attempts, 3);
        assert_eq!(config.postback.initial_backoff, Duration::from_millis(300));
        assert_eq!(config.autopilot, AutoPilotConfig::default());
        assert!(matches!(config.stores, StoreBackend::InMemory));
        assert!(config.admin.token.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn rejects_non_numeric_controller_step() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("AUTOPILOT_STEP", "ten");
        let error = AppConfig::load().expect_err("step must be numeric");
        assert!(matches!(
            error,
            ConfigError::InvalidValue {
                key: "AUTOPILOT_STEP",
                ..
            }
        ));
    }

    #[test]
    fn rest_backend_requires_both_endpoints() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("RULE_STORE_URL", "https://rules.example.test");
        let error = AppConfig::load().expect_err("analytics url is required");
        assert!(matches!(error, ConfigError::MissingVar("ANALYTICS_URL")));

        env::set_var("RULE_STORE_TOKEN", "rules-token");
        env::set_var("ANALYTICS_URL", "https://analytics.example.test");
        env::set_var("ANALYTICS_KEY", "service-key");
        let config = AppConfig::load().expect("rest config loads");
        match config.stores {
            StoreBackend::Rest(rest) => {
                assert_eq!(rest.rule_collection, "Optimization_rules");
                assert_eq!(rest.counter_table, "lead_counters");
                assert_eq!(rest.timeout, Duration::from_millis(3_000));
            }
            StoreBackend::InMemory => panic!("expected rest backend"),
        }
        reset_env();
    }
}
