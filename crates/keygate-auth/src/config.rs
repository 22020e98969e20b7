//! Filter configuration.
//!
//! All knobs of the authentication filter live here: the enable toggle, the
//! expected issuer and audience, the JWKS endpoint and cache behavior, the
//! exempt-path set, the admin allow-list and the clock-skew leeway.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! enabled = true
//! issuer = "https://idp.example.com/oauth2/default"
//! audience = "api://keygate"
//! jwks_url = "https://idp.example.com/oauth2/default/v1/keys"
//! jwks_ttl = "10m"
//!
//! [auth.exempt]
//! paths = ["/health", "/login"]
//! prefixes = ["/static/"]
//!
//! [auth.admin]
//! subjects = ["00u1qxtc5yC3HcIe90h8"]
//! emails = ["ops@example.com"]
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::keyset::KeySetConfig;

/// Errors produced by configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required field is missing or empty.
    #[error("missing configuration: {0}")]
    Missing(&'static str),

    /// A field is present but invalid.
    #[error("invalid configuration for {field}: {message}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },
}

/// Configuration for the token authentication filter.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthFilterConfig {
    /// Enable/disable the filter entirely.
    /// When disabled, all requests pass through unauthenticated.
    pub enabled: bool,

    /// Expected token issuer (`iss` claim).
    pub issuer: String,

    /// Expected token audience (`aud` claim).
    pub audience: String,

    /// The issuer's published JWKS endpoint.
    pub jwks_url: String,

    /// How long a fetched key set stays fresh.
    #[serde(with = "humantime_serde")]
    pub jwks_ttl: Duration,

    /// Timeout for the JWKS fetch, after which the request fails closed.
    #[serde(with = "humantime_serde")]
    pub jwks_fetch_timeout: Duration,

    /// Allow an HTTP (non-HTTPS) JWKS endpoint. Testing only.
    pub allow_insecure_jwks: bool,

    /// Clock-skew tolerance for time-based claims.
    #[serde(with = "humantime_serde")]
    pub clock_skew_leeway: Duration,

    /// Endpoints that bypass authentication entirely.
    pub exempt: ExemptPaths,

    /// Static allow-list for administrative privilege elevation.
    pub admin: AdminAllowList,

    /// Name of an optional legacy identity header to cross-check against
    /// the token's email claim. `None` disables the check. The header is
    /// never trusted on its own.
    pub identity_hint_header: Option<String>,
}

impl Default for AuthFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            issuer: String::new(),
            audience: String::new(),
            jwks_url: String::new(),
            jwks_ttl: Duration::from_secs(600),          // 10 minutes
            jwks_fetch_timeout: Duration::from_secs(10), // 10 seconds
            allow_insecure_jwks: false,
            clock_skew_leeway: Duration::from_secs(60), // 1 minute
            exempt: ExemptPaths::default(),
            admin: AdminAllowList::default(),
            identity_hint_header: None,
        }
    }
}

impl AuthFilterConfig {
    /// Validates the configuration.
    ///
    /// A disabled filter needs no further configuration; an enabled one must
    /// name an issuer, an audience and a parseable JWKS endpoint.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        if self.issuer.trim().is_empty() {
            return Err(ConfigError::Missing("issuer"));
        }
        if self.audience.trim().is_empty() {
            return Err(ConfigError::Missing("audience"));
        }
        if self.jwks_url.trim().is_empty() {
            return Err(ConfigError::Missing("jwks_url"));
        }
        Url::parse(&self.jwks_url).map_err(|e| ConfigError::Invalid {
            field: "jwks_url",
            message: e.to_string(),
        })?;

        if let Some(header) = &self.identity_hint_header
            && header.trim().is_empty()
        {
            return Err(ConfigError::Invalid {
                field: "identity_hint_header",
                message: "header name must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// The parsed JWKS endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the URL does not parse.
    pub fn jwks_endpoint(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.jwks_url).map_err(|e| ConfigError::Invalid {
            field: "jwks_url",
            message: e.to_string(),
        })
    }

    /// Key-set cache settings derived from this configuration.
    #[must_use]
    pub fn keyset_config(&self) -> KeySetConfig {
        KeySetConfig::new()
            .with_ttl(self.jwks_ttl)
            .with_request_timeout(self.jwks_fetch_timeout)
            .with_allow_http(self.allow_insecure_jwks)
    }
}

/// Endpoint patterns that skip authentication.
///
/// Matching is evaluated before anything else in the filter, independent of
/// HTTP method: first exact paths, then prefixes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExemptPaths {
    /// Exact path matches (e.g. `/health`).
    pub paths: Vec<String>,

    /// Path prefix matches (e.g. `/static/`).
    pub prefixes: Vec<String>,
}

impl Default for ExemptPaths {
    fn default() -> Self {
        Self {
            paths: vec!["/health".to_string(), "/healthz".to_string()],
            prefixes: Vec::new(),
        }
    }
}

impl ExemptPaths {
    /// An empty set: nothing bypasses authentication.
    #[must_use]
    pub fn none() -> Self {
        Self {
            paths: Vec::new(),
            prefixes: Vec::new(),
        }
    }

    /// Returns `true` if requests to `path` bypass authentication.
    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        if self.paths.iter().any(|p| p == path) {
            return true;
        }
        self.prefixes.iter().any(|prefix| path.starts_with(prefix))
    }
}

/// Static allow-list for administrative privilege elevation.
///
/// Privilege is granted only on an exact match of the *verified* subject or
/// email claim — never on anything supplied in request headers.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminAllowList {
    /// Allow-listed subject identifiers (byte-exact match).
    pub subjects: Vec<String>,

    /// Allow-listed email addresses (ASCII case-insensitive match).
    pub emails: Vec<String>,
}

impl AdminAllowList {
    /// Returns `true` if the verified subject or email is allow-listed.
    #[must_use]
    pub fn matches(&self, subject: &str, email: Option<&str>) -> bool {
        if self.subjects.iter().any(|s| s == subject) {
            return true;
        }
        match email {
            Some(email) => self
                .emails
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(email)),
            None => false,
        }
    }

    /// Returns `true` if the allow-list grants nobody anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty() && self.emails.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AuthFilterConfig {
        AuthFilterConfig {
            issuer: "https://idp.example.com/oauth2/default".to_string(),
            audience: "api://keygate".to_string(),
            jwks_url: "https://idp.example.com/oauth2/default/v1/keys".to_string(),
            ..AuthFilterConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = AuthFilterConfig::default();
        assert!(config.enabled);
        assert_eq!(config.jwks_ttl, Duration::from_secs(600));
        assert_eq!(config.jwks_fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.clock_skew_leeway, Duration::from_secs(60));
        assert!(!config.allow_insecure_jwks);
        assert!(config.identity_hint_header.is_none());
        assert!(config.exempt.is_exempt("/health"));
    }

    #[test]
    fn test_validate() {
        assert!(valid_config().validate().is_ok());

        let mut config = valid_config();
        config.issuer = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("issuer"))));

        let mut config = valid_config();
        config.audience = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("audience"))
        ));

        let mut config = valid_config();
        config.jwks_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "jwks_url",
                ..
            })
        ));

        let mut config = valid_config();
        config.identity_hint_header = Some(String::new());
        assert!(config.validate().is_err());

        // A disabled filter needs nothing else.
        let config = AuthFilterConfig {
            enabled: false,
            ..AuthFilterConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_from_toml_shape() {
        let json = serde_json::json!({
            "issuer": "https://idp.example.com",
            "audience": "api://keygate",
            "jwks_url": "https://idp.example.com/v1/keys",
            "jwks_ttl": "5m",
            "clock_skew_leeway": "30s",
            "exempt": { "paths": ["/login"], "prefixes": ["/assets/"] },
            "admin": { "subjects": ["sub-1"] }
        });

        let config: AuthFilterConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.jwks_ttl, Duration::from_secs(300));
        assert_eq!(config.clock_skew_leeway, Duration::from_secs(30));
        assert!(config.exempt.is_exempt("/login"));
        assert!(config.exempt.is_exempt("/assets/app.css"));
        assert!(config.admin.matches("sub-1", None));
        // Unset sections keep their defaults.
        assert!(config.enabled);
        assert_eq!(config.jwks_fetch_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_exempt_matching() {
        let exempt = ExemptPaths {
            paths: vec!["/health".to_string(), "/login".to_string()],
            prefixes: vec!["/static/".to_string()],
        };

        assert!(exempt.is_exempt("/health"));
        assert!(exempt.is_exempt("/login"));
        assert!(exempt.is_exempt("/static/css/site.css"));
        assert!(!exempt.is_exempt("/healthcheck"));
        assert!(!exempt.is_exempt("/api/users"));
        assert!(!exempt.is_exempt("/statics"));

        assert!(!ExemptPaths::none().is_exempt("/health"));
    }

    #[test]
    fn test_admin_allowlist() {
        let admin = AdminAllowList {
            subjects: vec!["sub-1".to_string()],
            emails: vec!["Ops@Example.com".to_string()],
        };

        assert!(admin.matches("sub-1", None));
        assert!(!admin.matches("sub-2", None));
        assert!(admin.matches("sub-2", Some("ops@example.com")));
        assert!(!admin.matches("sub-2", Some("dev@example.com")));
        // Subject matching is exact, not case-folded.
        assert!(!admin.matches("SUB-1", None));

        assert!(AdminAllowList::default().is_empty());
        assert!(!admin.is_empty());
    }

    #[test]
    fn test_keyset_config_mapping() {
        let mut config = valid_config();
        config.jwks_ttl = Duration::from_secs(120);
        config.jwks_fetch_timeout = Duration::from_secs(2);
        config.allow_insecure_jwks = true;

        let keyset = config.keyset_config();
        assert_eq!(keyset.ttl, Duration::from_secs(120));
        assert_eq!(keyset.request_timeout, Duration::from_secs(2));
        assert!(keyset.allow_http);
    }
}
