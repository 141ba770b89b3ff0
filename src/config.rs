use std::{env, net::SocketAddr, path::PathBuf, str::FromStr};

use anyhow::{Context, Result, anyhow};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_STATIC_DIR: &str = "web/static";
const DEFAULT_IMAGES_DIR: &str = "web/images";

/// Where the Postgres pool should connect to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseTarget {
    /// A complete DSN from `DATABASE_URL` or `POSTGRES_DSN`.
    Url(String),
    /// Discrete `POSTGRES_*` settings.
    Parts(DatabaseParts),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseParts {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub ssl_mode: String,
}

impl DatabaseTarget {
    /// Connection options for the `sqlx` pool.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        match self {
            DatabaseTarget::Url(url) => {
                PgConnectOptions::from_str(url).context("DATABASE_URL is not a valid Postgres URL")
            }
            DatabaseTarget::Parts(parts) => {
                let ssl_mode = PgSslMode::from_str(&parts.ssl_mode)
                    .with_context(|| format!("unknown POSTGRES_SSLMODE `{}`", parts.ssl_mode))?;
                let mut options = PgConnectOptions::new()
                    .host(&parts.host)
                    .port(parts.port)
                    .username(&parts.user)
                    .database(&parts.database)
                    .ssl_mode(ssl_mode);
                if let Some(password) = &parts.password {
                    options = options.password(password);
                }
                Ok(options)
            }
        }
    }

    /// Human readable target for logs. Never contains the password.
    pub fn safe_label(&self) -> String {
        match self {
            DatabaseTarget::Url(_) => "DATABASE_URL provided".to_string(),
            DatabaseTarget::Parts(parts) => format!(
                "host={} user={} db={}",
                parts.host, parts.user, parts.database
            ),
        }
    }
}

/// Credentials used to create the first administrator on an empty table.
#[derive(Clone, Debug)]
pub struct SeedAdmin {
    pub login: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseTarget,
    pub listen_addr: SocketAddr,
    pub session_secret: String,
    pub https: bool,
    pub upload_dir: PathBuf,
    pub static_dir: PathBuf,
    pub images_dir: PathBuf,
    pub seed_admin: Option<SeedAdmin>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let session_secret = get("SESSION_SECRET").ok_or_else(|| {
            anyhow!("SESSION_SECRET env var is missing; refusing to start with forgeable sessions")
        })?;

        let database = match get("DATABASE_URL").or_else(|| get("POSTGRES_DSN")) {
            Some(url) => DatabaseTarget::Url(url),
            None => DatabaseTarget::Parts(DatabaseParts {
                host: get_or("POSTGRES_HOST", "127.0.0.1"),
                port: get_or("POSTGRES_PORT", "5432")
                    .parse()
                    .context("POSTGRES_PORT must be a port number")?,
                user: get_or("POSTGRES_USER", "postgres"),
                password: get("POSTGRES_PASSWORD"),
                database: get_or("POSTGRES_DB", "BookCollect"),
                ssl_mode: get_or("POSTGRES_SSLMODE", "disable"),
            }),
        };

        let host = get_or("HOST", DEFAULT_HOST);
        let port: u16 = match get("PORT") {
            Some(port) => port.parse().context("PORT must be a port number")?,
            None => DEFAULT_PORT,
        };
        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid listen address {host}:{port}"))?;

        let https = get("APP_HTTPS")
            .map(|value| matches!(value.trim(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        let seed_admin = match (get("ADMIN_LOGIN"), get("ADMIN_PASSWORD")) {
            (Some(login), Some(password)) => Some(SeedAdmin { login, password }),
            _ => None,
        };

        Ok(Self {
            database,
            listen_addr,
            session_secret,
            https,
            upload_dir: PathBuf::from(get_or("UPLOAD_DIR", DEFAULT_UPLOAD_DIR)),
            static_dir: PathBuf::from(get_or("STATIC_DIR", DEFAULT_STATIC_DIR)),
            images_dir: PathBuf::from(get_or("IMAGES_DIR", DEFAULT_IMAGES_DIR)),
            seed_admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn refuses_to_start_without_session_secret() {
        let err = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://x")]))
            .expect_err("secret is required");
        assert!(err.to_string().contains("SESSION_SECRET"));

        let blank = AppConfig::from_lookup(lookup(&[("SESSION_SECRET", "   ")]));
        assert!(blank.is_err());
    }

    #[test]
    fn applies_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("SESSION_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8080".parse().unwrap());
        assert!(!config.https);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert!(config.seed_admin.is_none());
        let DatabaseTarget::Parts(parts) = &config.database else {
            panic!("expected discrete database settings");
        };
        assert_eq!(parts.host, "127.0.0.1");
        assert_eq!(parts.port, 5432);
        assert_eq!(parts.database, "BookCollect");
        assert_eq!(parts.ssl_mode, "disable");
        assert!(config.database.connect_options().is_ok());
    }

    #[test]
    fn database_url_takes_priority_over_dsn_and_parts() {
        let config = AppConfig::from_lookup(lookup(&[
            ("SESSION_SECRET", "s"),
            ("DATABASE_URL", "postgres://a"),
            ("POSTGRES_DSN", "postgres://b"),
            ("POSTGRES_HOST", "db"),
        ]))
        .unwrap();
        assert_eq!(config.database, DatabaseTarget::Url("postgres://a".into()));

        let config = AppConfig::from_lookup(lookup(&[
            ("SESSION_SECRET", "s"),
            ("POSTGRES_DSN", "postgres://b"),
        ]))
        .unwrap();
        assert_eq!(config.database, DatabaseTarget::Url("postgres://b".into()));
    }

    #[test]
    fn safe_label_hides_password() {
        let config = AppConfig::from_lookup(lookup(&[
            ("SESSION_SECRET", "s"),
            ("POSTGRES_PASSWORD", "hunter2"),
            ("POSTGRES_HOST", "db.internal"),
        ]))
        .unwrap();
        let label = config.database.safe_label();
        assert!(!label.contains("hunter2"));
        assert!(label.contains("db.internal"));
    }

    #[test]
    fn parses_https_flag_and_listen_address() {
        let config = AppConfig::from_lookup(lookup(&[
            ("SESSION_SECRET", "s"),
            ("APP_HTTPS", "1"),
            ("HOST", "0.0.0.0"),
            ("PORT", "9000"),
            ("ADMIN_LOGIN", "admin"),
            ("ADMIN_PASSWORD", "pw"),
        ]))
        .unwrap();
        assert!(config.https);
        assert_eq!(config.listen_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.seed_admin.map(|s| s.login), Some("admin".to_string()));

        let bad_port = AppConfig::from_lookup(lookup(&[("SESSION_SECRET", "s"), ("PORT", "x")]));
        assert!(bad_port.is_err());

        let bad_ssl = AppConfig::from_lookup(lookup(&[
            ("SESSION_SECRET", "s"),
            ("POSTGRES_SSLMODE", "sometimes"),
        ]))
        .unwrap();
        assert!(bad_ssl.database.connect_options().is_err());
    }
}
