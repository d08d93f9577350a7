use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{key} must be set when EXAMHALL_ENV=production")]
    MissingRequired { key: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }

    pub(crate) fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
}

#[derive(Debug, Clone)]
pub(crate) struct ServerSettings {
    pub(crate) host: String,
    pub(crate) port: u16,
}

#[derive(Debug, Clone)]
pub(crate) struct ApiSettings {
    pub(crate) api_v1_str: String,
    pub(crate) cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct DatabaseSettings {
    database_url: Option<String>,
    postgres_server: String,
    postgres_port: u16,
    postgres_user: String,
    postgres_password: String,
    postgres_db: String,
}

impl DatabaseSettings {
    pub(crate) fn database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => format!(
                "postgresql://{}:{}@{}:{}/{}",
                self.postgres_user,
                self.postgres_password,
                self.postgres_server,
                self.postgres_port,
                self.postgres_db
            ),
        }
    }
}

/// Settings for verifying tokens minted by the external identity provider.
#[derive(Debug, Clone)]
pub(crate) struct IdentitySettings {
    pub(crate) secret_key: String,
    pub(crate) algorithm: String,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    runtime: RuntimeSettings,
    server: ServerSettings,
    api: ApiSettings,
    database: DatabaseSettings,
    identity: IdentitySettings,
    telemetry: TelemetrySettings,
}

const DEV_SECRET_KEY: &str = "examhall-dev-secret";

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let environment =
            parse_environment(env_optional("EXAMHALL_ENV").or_else(|| env_optional("ENVIRONMENT")));

        let host = env_or_default("EXAMHALL_HOST", "0.0.0.0");
        let port = parse_u16("EXAMHALL_PORT", env_or_default("EXAMHALL_PORT", "8000"))?;

        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");
        let cors_origins = parse_string_list(env_optional("BACKEND_CORS_ORIGINS"));

        let database_url = env_optional("DATABASE_URL");
        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "examhall");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "examhall_db");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None if environment.is_production() => {
                return Err(ConfigError::MissingRequired { key: "SECRET_KEY" });
            }
            None => DEV_SECRET_KEY.to_string(),
        };
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let log_level = env_or_default("LOG_LEVEL", "info");
        let json = env_optional("LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);

        Ok(Settings {
            runtime: RuntimeSettings { environment },
            server: ServerSettings { host, port },
            api: ApiSettings { api_v1_str, cors_origins },
            database: DatabaseSettings {
                database_url,
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
            },
            identity: IdentitySettings { secret_key, algorithm },
            telemetry: TelemetrySettings { log_level, json },
        })
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn identity(&self) -> &IdentitySettings {
        &self.identity
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref() {
        Some("production") | Some("prod") => Environment::Production,
        Some("test") => Environment::Test,
        _ => Environment::Development,
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_u16(key: &'static str, value: String) -> Result<u16, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue { key, value })
}

fn parse_string_list(value: Option<String>) -> Vec<String> {
    value
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_truthy_values() {
        assert!(parse_bool("1"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("nope"));
    }

    #[test]
    fn parse_string_list_splits_and_trims() {
        let parsed =
            parse_string_list(Some("http://localhost:3000, http://localhost:5173 ,".to_string()));
        assert_eq!(parsed, vec!["http://localhost:3000", "http://localhost:5173"]);
    }

    #[test]
    fn parse_environment_defaults_to_development() {
        assert_eq!(parse_environment(None), Environment::Development);
        assert_eq!(parse_environment(Some("production".to_string())), Environment::Production);
        assert_eq!(parse_environment(Some("test".to_string())), Environment::Test);
    }
}
