//! Centralized configuration for storefront-api.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use domain::order::ShippingPolicy;
use domain::UserEmail;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite file-based storage
    Sqlite,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("sqlite") {
            Self::Sqlite
        } else {
            Self::Memory
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Used only when `AUTH_DEBUG_HEADER` is on and no secret was given.
const DEV_JWT_SECRET: &str = "storefront-dev-secret-do-not-deploy";
const MIN_SECRET_LEN: usize = 16;

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3001)
    pub port: u16,
    pub storage_provider: StorageProvider,
    /// SQLite database path (default: data/storefront.db)
    pub db_path: PathBuf,
    /// HMAC secret for access and refresh tokens
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    /// Google sign-in is disabled when unset
    pub google_oauth_client_id: Option<String>,
    /// Restrict Google sign-in to one Workspace domain
    pub google_hosted_domain: Option<String>,
    /// Whether to skip Google signature verification (dev only)
    pub insecure_skip_signature: bool,
    pub cors_allow_origin: HeaderValue,
    pub log_format: LogFormat,
    /// Accounts promoted to admin when they first register
    pub admin_emails: Vec<UserEmail>,
    pub shipping: ShippingPolicy,
    pub low_stock_threshold: u32,
    /// Accept `X-Debug-User: <user id>` instead of a bearer token (dev only)
    pub auth_debug_header: bool,
    /// Buffered frames per chat room before slow listeners start skipping
    pub chat_room_capacity: usize,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but reads variables through `get`.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or("PORT", get("PORT"), 3001)?;

        let storage_provider =
            StorageProvider::from_str(&get("STORAGE_PROVIDER").unwrap_or_else(|| "memory".into()));
        let db_path = get("DB_PATH")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data/storefront.db"));

        let auth_debug_header = get("AUTH_DEBUG_HEADER")
            .map(|s| http_common::is_truthy(&s))
            .unwrap_or(false);

        // JWT secret: required unless running with the debug header
        let jwt_secret = match get("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(s) if s.len() < MIN_SECRET_LEN => {
                return Err(ConfigError {
                    field: "JWT_SECRET",
                    message: format!("Must be at least {} bytes", MIN_SECRET_LEN),
                })
            }
            Some(s) => s,
            None if auth_debug_header => DEV_JWT_SECRET.to_string(),
            None => {
                return Err(ConfigError {
                    field: "JWT_SECRET",
                    message: "Required unless AUTH_DEBUG_HEADER is enabled".into(),
                })
            }
        };

        let access_token_ttl =
            Duration::from_secs(parse_or("ACCESS_TOKEN_TTL_SECS", get("ACCESS_TOKEN_TTL_SECS"), 900)?);
        let refresh_token_ttl = Duration::from_secs(parse_or(
            "REFRESH_TOKEN_TTL_SECS",
            get("REFRESH_TOKEN_TTL_SECS"),
            7 * 24 * 3600,
        )?);
        if access_token_ttl.is_zero() || refresh_token_ttl <= access_token_ttl {
            return Err(ConfigError {
                field: "REFRESH_TOKEN_TTL_SECS",
                message: "Token lifetimes must be positive and refresh must outlive access".into(),
            });
        }

        let google_oauth_client_id = get("GOOGLE_OAUTH_CLIENT_ID").filter(|s| !s.is_empty());
        let google_hosted_domain = get("GOOGLE_HOSTED_DOMAIN").filter(|s| !s.is_empty());
        let insecure_skip_signature = get("GOOGLE_AUTH_INSECURE_SKIP_SIGNATURE")
            .map(|s| http_common::is_truthy(&s))
            .unwrap_or(false);

        // CORS allow origin
        let cors_origin_str = get("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        let log_format =
            LogFormat::from_str(&get("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        let admin_emails = http_common::split_csv(&get("ADMIN_EMAILS").unwrap_or_default())
            .into_iter()
            .map(|e| {
                UserEmail::new(e.clone()).map_err(|_| ConfigError {
                    field: "ADMIN_EMAILS",
                    message: format!("Invalid email '{}'", e),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let defaults = ShippingPolicy::default();
        let shipping = ShippingPolicy {
            flat_fee: parse_or("SHIPPING_FLAT_FEE", get("SHIPPING_FLAT_FEE"), defaults.flat_fee)?,
            free_shipping_threshold: parse_or(
                "FREE_SHIPPING_THRESHOLD",
                get("FREE_SHIPPING_THRESHOLD"),
                defaults.free_shipping_threshold,
            )?,
        };

        let low_stock_threshold = parse_or("LOW_STOCK_THRESHOLD", get("LOW_STOCK_THRESHOLD"), 5)?;

        let chat_room_capacity: usize =
            parse_or("CHAT_ROOM_CAPACITY", get("CHAT_ROOM_CAPACITY"), 64)?;
        if chat_room_capacity == 0 {
            return Err(ConfigError {
                field: "CHAT_ROOM_CAPACITY",
                message: "Must be greater than zero".into(),
            });
        }

        Ok(Self {
            port,
            storage_provider,
            db_path,
            jwt_secret,
            access_token_ttl,
            refresh_token_ttl,
            google_oauth_client_id,
            google_hosted_domain,
            insecure_skip_signature,
            cors_allow_origin,
            log_format,
            admin_emails,
            shipping,
            low_stock_threshold,
            auth_debug_header,
            chat_room_capacity,
        })
    }

    /// Log warnings about insecure configuration.
    pub fn warn_if_insecure(&self) {
        if self.auth_debug_header {
            tracing::warn!(
                "AUTH_DEBUG_HEADER is set: requests may authenticate via X-Debug-User. \
                 DO NOT USE IN PRODUCTION."
            );
        }
        if self.jwt_secret == DEV_JWT_SECRET {
            tracing::warn!("JWT_SECRET not set: signing tokens with a built-in development secret");
        }
        if self.insecure_skip_signature {
            tracing::warn!(
                "GOOGLE_AUTH_INSECURE_SKIP_SIGNATURE is set: ID token signature verification \
                 is DISABLED. DO NOT USE IN PRODUCTION."
            );
        }
        if self.admin_emails.is_empty() {
            tracing::warn!("ADMIN_EMAILS is empty: no account will be promoted to admin");
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    field: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw.filter(|s| !s.trim().is_empty()) {
        None => Ok(default),
        Some(s) => s.trim().parse().map_err(|_| ConfigError {
            field,
            message: format!("Invalid value '{}'", s),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn storage_provider_parsing() {
        assert_eq!(StorageProvider::from_str("memory"), StorageProvider::Memory);
        assert_eq!(StorageProvider::from_str("sqlite"), StorageProvider::Sqlite);
        assert_eq!(StorageProvider::from_str("SQLITE"), StorageProvider::Sqlite);
        assert_eq!(StorageProvider::from_str("anything"), StorageProvider::Memory);
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::from_str("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("anything"), LogFormat::Pretty);
    }

    #[test]
    fn defaults_apply_in_debug_mode() {
        let cfg = load(&[("AUTH_DEBUG_HEADER", "1")]).unwrap();
        assert_eq!(cfg.port, 3001);
        assert_eq!(cfg.storage_provider, StorageProvider::Memory);
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(cfg.access_token_ttl, Duration::from_secs(900));
        assert_eq!(cfg.shipping, ShippingPolicy::default());
        assert_eq!(cfg.low_stock_threshold, 5);
        assert_eq!(cfg.chat_room_capacity, 64);
        assert!(cfg.google_oauth_client_id.is_none());
    }

    #[test]
    fn secret_is_required_outside_debug_mode() {
        let err = load(&[]).unwrap_err();
        assert_eq!(err.field, "JWT_SECRET");
        let err = load(&[("JWT_SECRET", "short")]).unwrap_err();
        assert_eq!(err.field, "JWT_SECRET");
        assert!(load(&[("JWT_SECRET", "0123456789abcdef0123")]).is_ok());
    }

    #[test]
    fn numeric_fields_are_validated() {
        let err = load(&[("AUTH_DEBUG_HEADER", "yes"), ("PORT", "eighty")]).unwrap_err();
        assert_eq!(err.field, "PORT");
        let err = load(&[("AUTH_DEBUG_HEADER", "yes"), ("CHAT_ROOM_CAPACITY", "0")]).unwrap_err();
        assert_eq!(err.field, "CHAT_ROOM_CAPACITY");
        let err = load(&[
            ("AUTH_DEBUG_HEADER", "yes"),
            ("ACCESS_TOKEN_TTL_SECS", "600"),
            ("REFRESH_TOKEN_TTL_SECS", "60"),
        ])
        .unwrap_err();
        assert_eq!(err.field, "REFRESH_TOKEN_TTL_SECS");
    }

    #[test]
    fn admin_emails_and_shipping_are_parsed() {
        let cfg = load(&[
            ("AUTH_DEBUG_HEADER", "true"),
            ("ADMIN_EMAILS", " Boss@Shop.vn , ,ops@shop.vn"),
            ("SHIPPING_FLAT_FEE", "25000"),
            ("FREE_SHIPPING_THRESHOLD", "0"),
        ])
        .unwrap();
        let emails: Vec<&str> = cfg.admin_emails.iter().map(|e| e.as_str()).collect();
        assert_eq!(emails, vec!["boss@shop.vn", "ops@shop.vn"]);
        assert_eq!(cfg.shipping.flat_fee, 25_000);
        assert_eq!(cfg.shipping.free_shipping_threshold, 0);

        let err = load(&[("AUTH_DEBUG_HEADER", "1"), ("ADMIN_EMAILS", "nobody")]).unwrap_err();
        assert_eq!(err.field, "ADMIN_EMAILS");
    }

    #[test]
    fn bad_cors_origin_is_rejected() {
        let err = load(&[("AUTH_DEBUG_HEADER", "1"), ("CORS_ALLOW_ORIGIN", "bad\norigin")])
            .unwrap_err();
        assert_eq!(err.field, "CORS_ALLOW_ORIGIN");
    }
}
