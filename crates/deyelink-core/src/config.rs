//! Configuration types for Deyelink

use crate::error::{Error, Result};
use tracing::warn;

/// Default Deye Cloud developer API endpoint (EU region)
pub const DEFAULT_DEYE_BASE_URL: &str = "https://eu1-developer.deyecloud.com";

/// Subject bound to every linked account when no identity provider is configured
pub const DEFAULT_SUBJECT: &str = "deye-user";

/// Client id used when none is configured
pub const DEFAULT_CLIENT_ID: &str = "deye-google-home";

/// Client secret used when none is configured
pub const DEFAULT_CLIENT_SECRET: &str = "default-secret";

/// Default refresh token lifetime in days
pub const DEFAULT_REFRESH_TOKEN_TTL_DAYS: u32 = 180;

/// Main configuration for Deyelink
#[derive(Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// OAuth client id registered with the smart-home platform
    pub client_id: String,
    /// OAuth client secret registered with the smart-home platform
    pub client_secret: String,
    /// Deye developer application id
    pub deye_app_id: String,
    /// Deye developer application secret
    pub deye_app_secret: String,
    /// Deye account email
    pub deye_email: String,
    /// Deye account password (plain text, hashed before it leaves the process)
    pub deye_password: String,
    /// Deye API base URL
    pub deye_base_url: String,
    /// Subject identifier bound to linked accounts
    pub subject: String,
    /// Refresh token lifetime in days, 0 disables expiry
    pub refresh_token_ttl_days: u32,
    /// Expose development routes such as `/test/devices`
    pub debug_routes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_secret: DEFAULT_CLIENT_SECRET.to_string(),
            deye_app_id: String::new(),
            deye_app_secret: String::new(),
            deye_email: String::new(),
            deye_password: String::new(),
            deye_base_url: DEFAULT_DEYE_BASE_URL.to_string(),
            subject: DEFAULT_SUBJECT.to_string(),
            refresh_token_ttl_days: DEFAULT_REFRESH_TOKEN_TTL_DAYS,
            debug_routes: false,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("deye_app_id", &self.deye_app_id)
            .field("deye_email", &self.deye_email)
            .field("deye_base_url", &self.deye_base_url)
            .field("subject", &self.subject)
            .field("refresh_token_ttl_days", &self.refresh_token_ttl_days)
            .field("debug_routes", &self.debug_routes)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder pattern: set the registered OAuth client pair
    pub fn with_client(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self
    }

    /// Builder pattern: set Deye developer app credentials
    pub fn with_deye_app(mut self, app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        self.deye_app_id = app_id.into();
        self.deye_app_secret = app_secret.into();
        self
    }

    /// Builder pattern: set Deye account credentials
    pub fn with_deye_account(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.deye_email = email.into();
        self.deye_password = password.into();
        self
    }

    /// Builder pattern: set Deye API base URL
    pub fn with_deye_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.deye_base_url = base_url.into();
        self
    }

    /// Builder pattern: set linked subject
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Builder pattern: set refresh token lifetime in days
    pub fn with_refresh_token_ttl_days(mut self, days: u32) -> Self {
        self.refresh_token_ttl_days = days;
        self
    }

    /// Builder pattern: enable development routes
    pub fn with_debug_routes(mut self, enabled: bool) -> Self {
        self.debug_routes = enabled;
        self
    }

    /// Refresh token lifetime in seconds, `None` when refresh tokens never expire
    pub fn refresh_token_ttl_seconds(&self) -> Option<i64> {
        match self.refresh_token_ttl_days {
            0 => None,
            days => Some(i64::from(days) * 24 * 60 * 60),
        }
    }

    /// Check that every required setting is present
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("client id", &self.client_id),
            ("client secret", &self.client_secret),
            ("Deye app id", &self.deye_app_id),
            ("Deye app secret", &self.deye_app_secret),
            ("Deye email", &self.deye_email),
            ("Deye password", &self.deye_password),
            ("subject", &self.subject),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::MissingSetting(name));
            }
        }

        if !self.deye_base_url.starts_with("http://") && !self.deye_base_url.starts_with("https://") {
            return Err(Error::config(format!(
                "Invalid Deye base URL: {}",
                self.deye_base_url
            )));
        }

        if self.client_secret == DEFAULT_CLIENT_SECRET {
            warn!("OAuth client secret is the built-in default; set OAUTH_CLIENT_SECRET");
        }

        Ok(())
    }
}
