//! Configuración central de la aplicación.
//! Carga variables de entorno (.env una sola vez) y las valida en un
//! `AppConfig` inmutable. Los secretos faltantes son error; el resto tiene
//! valores por defecto.

use std::collections::HashMap;
use std::time::Duration;

use chrono_tz::Tz;
use once_cell::sync::Lazy;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("variable requerida ausente: {0}")]
    Missing(&'static str),
    #[error("valor inválido para {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

static DOTENV: Lazy<()> = Lazy::new(|| {
    let _ = dotenvy::dotenv();
});

/// Parámetros de conexión a la base de datos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// URL completa (postgres://...). Sin URL se usa el backend en memoria.
    pub url: Option<String>,
    pub min_connections: u32,
    pub max_connections: u32,
}

#[derive(Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub password_iterations: u32,
}

// los secretos no se imprimen
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
         .field("access_ttl", &self.access_ttl)
         .field("refresh_ttl", &self.refresh_ttl)
         .field("password_iterations", &self.password_iterations)
         .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub default_tz: Tz,
    pub cors_origins: Vec<String>,
    pub eval_prefix: String,
    pub request_timeout: Duration,
}

impl AppConfig {
    /// Lee el entorno del proceso (tras cargar `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Lazy::force(&DOTENV);
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|k| vars.get(k).cloned())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database = DatabaseConfig { url: get("DB_URL").or_else(|| get("DATABASE_URL")),
                                        min_connections: parse_or(&get, "DATABASE_MIN_CONNECTIONS", 2)?,
                                        max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 16)? };

        let auth = AuthConfig { jwt_secret: get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
                                refresh_secret: get("REFRESH_SECRET").ok_or(ConfigError::Missing("REFRESH_SECRET"))?,
                                access_ttl: duration_or(&get, "ACCESS_TTL", Duration::from_secs(24 * 3600))?,
                                refresh_ttl: duration_or(&get, "REFRESH_TTL", Duration::from_secs(30 * 86400))?,
                                password_iterations: parse_or(&get, "PASSWORD_ITERATIONS", 100_000)? };

        let default_tz = match get("DEFAULT_TZ") {
            Some(v) => v.parse::<Tz>().map_err(|_| ConfigError::Invalid { var: "DEFAULT_TZ", value: v })?,
            None => chrono_tz::Asia::Shanghai,
        };

        let cors_origins = get("CORS_ORIGINS").map(|v| {
                                                  v.split(',')
                                                   .map(str::trim)
                                                   .filter(|s| !s.is_empty())
                                                   .map(String::from)
                                                   .collect()
                                              })
                                              .unwrap_or_default();

        let eval_prefix = get("EVAL_PREFIX").unwrap_or_else(|| "EVAL".to_string());
        if !eval_prefix.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::Invalid { var: "EVAL_PREFIX", value: eval_prefix });
        }

        let request_timeout = Duration::from_millis(parse_or(&get, "REQUEST_TIMEOUT_MS", 30_000u64)?);

        Ok(Self { database, auth, default_tz, cors_origins, eval_prefix, request_timeout })
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
    where T: std::str::FromStr,
          G: Fn(&str) -> Option<String>
{
    match get(var) {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { var, value: v }),
        None => Ok(default),
    }
}

fn duration_or<G>(get: &G, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
    where G: Fn(&str) -> Option<String>
{
    match get(var) {
        Some(v) => parse_duration(&v).ok_or(ConfigError::Invalid { var, value: v }),
        None => Ok(default),
    }
}

/// `90s`, `15m`, `24h`, `30d` o segundos sin sufijo.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let (digits, unit) = match text.char_indices().last()? {
        (i, c) if c.is_ascii_alphabetic() => (&text[..i], c),
        _ => (text, 's'),
    };
    let n: u64 = digits.parse().ok()?;
    let secs = match unit {
        's' => n,
        'm' => n.checked_mul(60)?,
        'h' => n.checked_mul(3600)?,
        'd' => n.checked_mul(86_400)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("15m"), Some(Duration::from_secs(900)));
        assert_eq!(parse_duration("24h"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("30d"), Some(Duration::from_secs(2_592_000)));
        assert_eq!(parse_duration("3600"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("h"), None);
        assert_eq!(parse_duration("10w"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn defaults_apply() {
        let cfg = AppConfig::from_map(&vars(&[("JWT_SECRET", "a"), ("REFRESH_SECRET", "b")])).unwrap();
        assert_eq!(cfg.database.url, None);
        assert_eq!(cfg.database.min_connections, 2);
        assert_eq!(cfg.database.max_connections, 16);
        assert_eq!(cfg.auth.access_ttl, Duration::from_secs(86_400));
        assert_eq!(cfg.auth.refresh_ttl, Duration::from_secs(30 * 86_400));
        assert_eq!(cfg.auth.password_iterations, 100_000);
        assert_eq!(cfg.default_tz, chrono_tz::Asia::Shanghai);
        assert_eq!(cfg.eval_prefix, "EVAL");
        assert_eq!(cfg.request_timeout, Duration::from_millis(30_000));
        assert!(cfg.cors_origins.is_empty());
    }

    #[test]
    fn db_url_wins_over_database_url() {
        let cfg = AppConfig::from_map(&vars(&[("JWT_SECRET", "a"),
                                              ("REFRESH_SECRET", "b"),
                                              ("DB_URL", "postgres://one"),
                                              ("DATABASE_URL", "postgres://two"),
                                              ("CORS_ORIGINS", "http://a, http://b,")])).unwrap();
        assert_eq!(cfg.database.url.as_deref(), Some("postgres://one"));
        assert_eq!(cfg.cors_origins, vec!["http://a".to_string(), "http://b".to_string()]);
    }

    #[test]
    fn missing_secret_and_bad_values() {
        assert_eq!(AppConfig::from_map(&vars(&[("JWT_SECRET", "a")])).unwrap_err(),
                   ConfigError::Missing("REFRESH_SECRET"));
        let err = AppConfig::from_map(&vars(&[("JWT_SECRET", "a"), ("REFRESH_SECRET", "b"), ("EVAL_PREFIX", "ev")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "EVAL_PREFIX", .. }));
        let err = AppConfig::from_map(&vars(&[("JWT_SECRET", "a"), ("REFRESH_SECRET", "b"), ("DEFAULT_TZ", "Mars/Base")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DEFAULT_TZ", .. }));
    }
}
