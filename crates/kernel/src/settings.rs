use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use serde::Deserialize;

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "BOOKWISH_ENV";
const CONFIG_DIR_ENV: &str = "BOOKWISH_CONFIG_DIR";
const ENV_PREFIX: &str = "BOOKWISH";

/// Unprefixed variables honored as defaults, mapped to their settings key.
const LEGACY_ENV_DEFAULTS: &[(&str, &str)] = &[
    ("ADMIN_PASSWORD", "auth.admin_password"),
    ("PERPLEXITY_API_KEY", "enrichment.api_key"),
    ("GOOGLE_BOOKS_API_KEY", "catalog.api_key"),
    ("REFERER_URL", "catalog.referer"),
    ("DATABASE_URL", "database.url"),
];

/// Deployment environment the application is running in.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

/// Top-level configuration structure loaded from layered sources.
///
/// Loaded once at startup and handed to components by reference; nothing
/// reads configuration from the environment after [`Settings::load`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub catalog: CatalogSettings,
    #[serde(default)]
    pub enrichment: EnrichmentSettings,
}

impl Settings {
    /// Load configuration by layering `.env`, legacy variables, base file,
    /// environment overlay, and `BOOKWISH__*` variables.
    pub fn load() -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let environment = std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let config_dir = std::env::var(CONFIG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                // Default to repo root `config` directory.
                std::env::current_dir()
                    .map(|cwd| cwd.join("config"))
                    .unwrap_or_else(|_| PathBuf::from("config"))
            });

        let base_path = config_dir.join("base.toml");
        let environment_filename = format!("{}.toml", environment);
        let environment_path = config_dir.join(environment_filename);

        let mut builder = config::Config::builder();
        for (var, key) in LEGACY_ENV_DEFAULTS {
            if let Ok(value) = std::env::var(var) {
                builder = builder
                    .set_default(*key, value)
                    .with_context(|| format!("failed to apply {var}"))?;
            }
        }

        let builder = builder
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"));

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        // Override environment field with parsed enum variant.
        settings.environment = match environment.as_str() {
            "local" => Environment::Local,
            "staging" => Environment::Staging,
            "production" => Environment::Production,
            other => {
                return Err(anyhow!(
                    "unsupported environment '{}'; expected local/staging/production",
                    other
                ));
            }
        };

        Ok(settings)
    }
}

/// A configured credential. Never printed by `Debug`.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_host")]
    pub host: String,
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
    #[serde(default = "ServerSettings::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerSettings {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }

    // Enrichment calls dominate request latency.
    fn default_request_timeout_ms() -> u64 {
        60000
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "DatabaseSettings::default_url")]
    pub url: String,
    #[serde(default = "DatabaseSettings::default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseSettings {
    fn default_url() -> String {
        "sqlite://bookwish.db".to_string()
    }

    fn default_max_connections() -> u32 {
        5
    }

    /// Settings for a private in-memory database.
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            max_connections: Self::default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub log_format: LogFormat,
    /// `EnvFilter` directives, overridden by `RUST_LOG` when set.
    #[serde(default = "TelemetrySettings::default_filter")]
    pub filter: String,
}

impl TelemetrySettings {
    // Provider URLs may carry API keys; keep HTTP client internals quiet.
    fn default_filter() -> String {
        "info,hyper=warn,reqwest=warn".to_string()
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            filter: Self::default_filter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthSettings {
    /// Shared secret expected in `X-Admin-Password`. Privileged operations
    /// are refused while unset.
    #[serde(default)]
    pub admin_password: Option<Secret>,
}

/// External bibliographic search provider.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CatalogProvider {
    #[default]
    GoogleBooks,
    OpenLibrary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSettings {
    #[serde(default)]
    pub provider: CatalogProvider,
    /// Overrides the provider's public endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<Secret>,
    #[serde(default = "CatalogSettings::default_referer")]
    pub referer: String,
    #[serde(default = "CatalogSettings::default_page_size")]
    pub page_size: u32,
    #[serde(default = "CatalogSettings::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl CatalogSettings {
    fn default_referer() -> String {
        "http://127.0.0.1:8080/".to_string()
    }

    fn default_page_size() -> u32 {
        20
    }

    fn default_timeout_secs() -> u64 {
        10
    }
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            provider: CatalogProvider::default(),
            base_url: None,
            api_key: None,
            referer: Self::default_referer(),
            page_size: Self::default_page_size(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentSettings {
    #[serde(default)]
    pub api_key: Option<Secret>,
    #[serde(default = "EnrichmentSettings::default_base_url")]
    pub base_url: String,
    #[serde(default = "EnrichmentSettings::default_model")]
    pub model: String,
    #[serde(default = "EnrichmentSettings::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl EnrichmentSettings {
    fn default_base_url() -> String {
        "https://api.perplexity.ai".to_string()
    }

    fn default_model() -> String {
        "sonar".to_string()
    }

    fn default_timeout_secs() -> u64 {
        45
    }
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Self::default_base_url(),
            model: Self::default_model(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_environment_is_local() {
        let settings = Settings::default();
        assert_eq!(settings.environment, Environment::Local);
    }

    #[test]
    fn default_database_is_local_sqlite_file() {
        let settings = Settings::default();
        assert_eq!(settings.database.url, "sqlite://bookwish.db");
    }

    #[test]
    fn default_catalog_is_google_books() {
        let settings = Settings::default();
        assert_eq!(settings.catalog.provider, CatalogProvider::GoogleBooks);
        assert_eq!(settings.catalog.page_size, 20);
        assert!(settings.auth.admin_password.is_none());
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let auth = AuthSettings {
            admin_password: Some(Secret::new("hunter2")),
        };
        let rendered = format!("{auth:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn sections_deserialize_from_layered_sources() {
        let cfg = config::Config::builder()
            .set_default("auth.admin_password", "s3cret")
            .unwrap()
            .add_source(config::File::from_str(
                r#"
                [catalog]
                provider = "open_library"
                page_size = 5

                [telemetry]
                log_format = "json"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let settings: Settings = cfg.try_deserialize().unwrap();
        assert_eq!(settings.catalog.provider, CatalogProvider::OpenLibrary);
        assert_eq!(settings.catalog.page_size, 5);
        assert_eq!(settings.telemetry.log_format, LogFormat::Json);
        assert_eq!(
            settings.auth.admin_password.as_ref().map(Secret::expose),
            Some("s3cret")
        );
        assert_eq!(settings.enrichment.model, "sonar");
    }
}
