//! Process configuration, read once at startup.

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;
use thiserror::Error;

use campusstay_auth::SigningAlgorithm;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub secret_key: String,
    pub algorithm: SigningAlgorithm,
    pub access_token_ttl: Duration,
    pub bcrypt_cost: u32,
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub frontend_url: String,
    pub upload_dir: Option<PathBuf>,
    pub public_upload_url: String,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub log_format: LogFormat,
}

// Keeps the signing key and admin password out of logs.
impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("algorithm", &self.algorithm)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("bind_addr", &self.bind_addr)
            .field("database", &self.database_url.as_ref().map(|_| "<set>"))
            .field("frontend_url", &self.frontend_url)
            .field("upload_dir", &self.upload_dir)
            .field("public_upload_url", &self.public_upload_url)
            .field(
                "bootstrap_admin",
                &self.bootstrap_admin.as_ref().map(|a| a.email.as_str()),
            )
            .field("log_format", &self.log_format)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let secret_key = get("SECRET_KEY").ok_or(ConfigError::Missing("SECRET_KEY"))?;

        let algorithm = match get("ALGORITHM") {
            Some(raw) => raw.parse::<SigningAlgorithm>().map_err(|reason| ConfigError::Invalid {
                var: "ALGORITHM",
                reason,
            })?,
            None => SigningAlgorithm::Hs256,
        };

        let minutes = parse_or(&get, "ACCESS_TOKEN_EXPIRE_MINUTES", 60i64)?;
        if minutes <= 0 {
            return Err(ConfigError::Invalid {
                var: "ACCESS_TOKEN_EXPIRE_MINUTES",
                reason: "must be positive".into(),
            });
        }

        let bcrypt_cost = parse_or(&get, "BCRYPT_COST", 12u32)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                var: "BCRYPT_COST",
                reason: "must be between 4 and 31".into(),
            });
        }

        let bind_addr = parse_or(
            &get,
            "BIND_ADDR",
            SocketAddr::from(([0, 0, 0, 0], 8080)),
        )?;

        let bootstrap_admin = match (get("BOOTSTRAP_ADMIN_EMAIL"), get("BOOTSTRAP_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(BootstrapAdmin {
                email,
                password,
                full_name: get("BOOTSTRAP_ADMIN_NAME").unwrap_or_else(|| "Super Admin".into()),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("BOOTSTRAP_ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("BOOTSTRAP_ADMIN_EMAIL")),
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    reason: format!("expected 'json' or 'pretty', got '{other}'"),
                });
            }
        };

        Ok(Self {
            secret_key,
            algorithm,
            access_token_ttl: Duration::minutes(minutes),
            bcrypt_cost,
            bind_addr,
            database_url: get("DATABASE_URL"),
            frontend_url: trim_slash(get("FRONTEND_URL").unwrap_or_else(|| "http://localhost:5173".into())),
            upload_dir: get("UPLOAD_DIR").map(PathBuf::from),
            public_upload_url: trim_slash(
                get("PUBLIC_UPLOAD_URL").unwrap_or_else(|| "http://localhost:8080/uploads".into()),
            ),
            bootstrap_admin,
            log_format,
        })
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn secret_key_is_required() {
        assert_eq!(load(&[]), Err(ConfigError::Missing("SECRET_KEY")));
        assert_eq!(
            load(&[("SECRET_KEY", "  ")]),
            Err(ConfigError::Missing("SECRET_KEY"))
        );
    }

    #[test]
    fn defaults_apply() {
        let cfg = load(&[("SECRET_KEY", "s")]).unwrap();
        assert_eq!(cfg.algorithm, SigningAlgorithm::Hs256);
        assert_eq!(cfg.access_token_ttl, Duration::minutes(60));
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.frontend_url, "http://localhost:5173");
        assert_eq!(cfg.public_upload_url, "http://localhost:8080/uploads");
        assert!(cfg.database_url.is_none());
        assert!(cfg.bootstrap_admin.is_none());
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn unsupported_algorithm_fails() {
        let err = load(&[("SECRET_KEY", "s"), ("ALGORITHM", "RS256")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "ALGORITHM", .. }));
    }

    #[test]
    fn bad_ttl_names_the_variable() {
        let err = load(&[("SECRET_KEY", "s"), ("ACCESS_TOKEN_EXPIRE_MINUTES", "soon")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { var: "ACCESS_TOKEN_EXPIRE_MINUTES", .. }
        ));
    }

    #[test]
    fn bootstrap_admin_needs_both_halves() {
        let err = load(&[("SECRET_KEY", "s"), ("BOOTSTRAP_ADMIN_EMAIL", "a@b.com")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("BOOTSTRAP_ADMIN_PASSWORD"));

        let cfg = load(&[
            ("SECRET_KEY", "s"),
            ("BOOTSTRAP_ADMIN_EMAIL", "a@b.com"),
            ("BOOTSTRAP_ADMIN_PASSWORD", "pw1234"),
        ])
        .unwrap();
        assert_eq!(cfg.bootstrap_admin.unwrap().full_name, "Super Admin");
    }

    #[test]
    fn debug_hides_secrets() {
        let cfg = load(&[("SECRET_KEY", "top-secret")]).unwrap();
        assert!(!format!("{cfg:?}").contains("top-secret"));
    }
}
