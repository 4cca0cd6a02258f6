// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment at startup (after loading an
//! optional `.env` file with `dotenvy`).
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Root directory for the database and audit logs | `./data` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `CORS_ALLOWED_ORIGINS` | Comma-separated origins; unset allows any | unset |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `AUTH_JWT_SECRET` | HS256 signing secret (at least 32 bytes) | Required |
//! | `AUTH_ISSUER` | Issued/expected `iss` claim | `cleanslate` |
//! | `AUTH_TOKEN_TTL_SECS` | Token lifetime | `86400` |
//! | `PASSWORD_HASH_ITERATIONS` | PBKDF2 work factor | `600000` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; both set enables HTTPS | unset |
//! | `BOOTSTRAP_ADMIN_EMAIL` / `BOOTSTRAP_ADMIN_PASSWORD` | Superuser seeded at start | unset |
//! | `FREE_WIPES_ON_REGISTRATION` | Wipes granted on sign-up | `3` |
//! | `GREEN_CREDITS_PER_FREE_WIPE` | Credits per free wipe | `10` |
//! | `GREEN_CREDITS_PER_PAID_WIPE` | Credits per completed wipe | `20` |

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::auth::password::DEFAULT_ITERATIONS;
use crate::auth::tokens::{DEFAULT_ISSUER, DEFAULT_TOKEN_TTL_SECS};
use crate::ledger::LedgerPolicy;
use crate::logging::LogFormat;
use crate::storage::paths::DATA_ROOT;

/// Minimum accepted length of `AUTH_JWT_SECRET`.
const MIN_SECRET_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// TLS certificate and key locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Superuser created at startup when absent.
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Application configuration.
#[derive(Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub log_format: LogFormat,
    /// Empty means any origin
    pub cors_origins: Vec<String>,
    pub jwt_secret: String,
    pub issuer: String,
    pub token_ttl_secs: i64,
    pub password_iterations: u32,
    pub tls: Option<TlsPaths>,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub policy: LedgerPolicy,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("data_dir", &self.data_dir)
            .field("log_format", &self.log_format)
            .field("cors_origins", &self.cors_origins)
            .field("issuer", &self.issuer)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("tls", &self.tls)
            .field("bootstrap_admin", &self.bootstrap_admin)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_or(&var, "PORT", 8080)?;
        let bind_addr = format!("{host}:{port}")
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                name: "HOST",
                reason: format!("{e}"),
            })?;

        let log_format = match var("LOG_FORMAT") {
            Some(v) => v.parse().map_err(|reason| ConfigError::InvalidValue {
                name: "LOG_FORMAT",
                reason,
            })?,
            None => LogFormat::default(),
        };

        let cors_origins = var("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let jwt_secret = var("AUTH_JWT_SECRET").ok_or(ConfigError::MissingEnvVar("AUTH_JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::InvalidValue {
                name: "AUTH_JWT_SECRET",
                reason: format!("must be at least {MIN_SECRET_LEN} bytes"),
            });
        }

        let token_ttl_secs: i64 = parse_or(&var, "AUTH_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?;
        if token_ttl_secs <= 0 {
            return Err(ConfigError::InvalidValue {
                name: "AUTH_TOKEN_TTL_SECS",
                reason: "must be positive".to_string(),
            });
        }
        let password_iterations: u32 = parse_or(&var, "PASSWORD_HASH_ITERATIONS", DEFAULT_ITERATIONS)?;
        if password_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                name: "PASSWORD_HASH_ITERATIONS",
                reason: "must be positive".to_string(),
            });
        }

        let tls = match (var("TLS_CERT_PATH"), var("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingEnvVar("TLS_KEY_PATH")),
            (None, Some(_)) => return Err(ConfigError::MissingEnvVar("TLS_CERT_PATH")),
        };

        let bootstrap_admin = match (var("BOOTSTRAP_ADMIN_EMAIL"), var("BOOTSTRAP_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingEnvVar("BOOTSTRAP_ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::MissingEnvVar("BOOTSTRAP_ADMIN_EMAIL")),
        };

        let defaults = LedgerPolicy::default();
        let policy = LedgerPolicy {
            free_wipes_on_registration: parse_or(
                &var,
                "FREE_WIPES_ON_REGISTRATION",
                defaults.free_wipes_on_registration,
            )?,
            green_credits_per_free_wipe: non_negative(
                "GREEN_CREDITS_PER_FREE_WIPE",
                parse_or(&var, "GREEN_CREDITS_PER_FREE_WIPE", defaults.green_credits_per_free_wipe)?,
            )?,
            green_credits_per_paid_wipe: non_negative(
                "GREEN_CREDITS_PER_PAID_WIPE",
                parse_or(&var, "GREEN_CREDITS_PER_PAID_WIPE", defaults.green_credits_per_paid_wipe)?,
            )?,
        };

        Ok(Config {
            bind_addr,
            data_dir: var("DATA_DIR").unwrap_or_else(|| DATA_ROOT.to_string()).into(),
            log_format,
            cors_origins,
            jwt_secret,
            issuer: var("AUTH_ISSUER").unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
            token_ttl_secs,
            password_iterations,
            tls,
            bootstrap_admin,
            policy,
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn non_negative(name: &'static str, value: i64) -> Result<i64, ConfigError> {
    if value < 0 {
        Err(ConfigError::InvalidValue {
            name,
            reason: "must not be negative".to_string(),
        })
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("AUTH_JWT_SECRET", SECRET)]).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.issuer, "cleanslate");
        assert_eq!(config.policy, LedgerPolicy::default());
        assert!(config.tls.is_none());
        assert!(config.bootstrap_admin.is_none());
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn cors_origins_are_split() {
        let config = load(&[
            ("AUTH_JWT_SECRET", SECRET),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
        ])
        .unwrap();
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn secret_is_required_and_long() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingEnvVar("AUTH_JWT_SECRET"))));
        assert!(matches!(
            load(&[("AUTH_JWT_SECRET", "short")]),
            Err(ConfigError::InvalidValue { name: "AUTH_JWT_SECRET", .. })
        ));
    }

    #[test]
    fn policy_overrides_are_parsed() {
        let config = load(&[
            ("AUTH_JWT_SECRET", SECRET),
            ("FREE_WIPES_ON_REGISTRATION", "5"),
            ("GREEN_CREDITS_PER_PAID_WIPE", "40"),
        ])
        .unwrap();
        assert_eq!(config.policy.free_wipes_on_registration, 5);
        assert_eq!(config.policy.green_credits_per_paid_wipe, 40);
        assert_eq!(config.policy.green_credits_per_free_wipe, 10);
    }

    #[test]
    fn invalid_numbers_are_errors() {
        assert!(matches!(
            load(&[("AUTH_JWT_SECRET", SECRET), ("PORT", "eighty")]),
            Err(ConfigError::InvalidValue { name: "PORT", .. })
        ));
        assert!(matches!(
            load(&[("AUTH_JWT_SECRET", SECRET), ("GREEN_CREDITS_PER_FREE_WIPE", "-1")]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn tls_needs_both_paths() {
        assert!(matches!(
            load(&[("AUTH_JWT_SECRET", SECRET), ("TLS_CERT_PATH", "/tmp/cert.pem")]),
            Err(ConfigError::MissingEnvVar("TLS_KEY_PATH"))
        ));
        let config = load(&[
            ("AUTH_JWT_SECRET", SECRET),
            ("TLS_CERT_PATH", "/tmp/cert.pem"),
            ("TLS_KEY_PATH", "/tmp/key.pem"),
        ])
        .unwrap();
        assert!(config.tls.is_some());
    }
}
