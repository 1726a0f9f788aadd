//! Server configuration from environment variables.

use std::time::Duration;

use careline_core::{defaults, Error, Result};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Scheme of app URLs handed out for non-media attachments.
    pub app_url_scheme: String,
    pub media_url_expiration: Duration,
}

impl ServerConfig {
    /// Load configuration.
    ///
    /// Environment variables:
    ///   DATABASE_URL              - required
    ///   HOST                      - bind address (default: "0.0.0.0")
    ///   PORT                      - bind port (default: 3000)
    ///   APP_URL_SCHEME            - app URL scheme (default: "careline")
    ///   MEDIA_URL_EXPIRATION_SECS - lifetime of media URLs (default: 900)
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| Error::Config("DATABASE_URL must be set".to_string()))?;

        let port = match std::env::var("PORT") {
            Ok(v) => v
                .parse()
                .map_err(|_| Error::Config(format!("invalid PORT: {}", v)))?,
            Err(_) => defaults::SERVER_PORT,
        };

        let media_url_expiration_secs = std::env::var("MEDIA_URL_EXPIRATION_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults::MEDIA_URL_EXPIRATION_SECS);

        Ok(Self {
            database_url,
            host: std::env::var("HOST").unwrap_or_else(|_| defaults::SERVER_HOST.to_string()),
            port,
            app_url_scheme: std::env::var("APP_URL_SCHEME")
                .unwrap_or_else(|_| defaults::APP_URL_SCHEME.to_string()),
            media_url_expiration: Duration::from_secs(media_url_expiration_secs),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let config = ServerConfig {
            database_url: "postgres://localhost/careline".into(),
            host: "127.0.0.1".into(),
            port: 8080,
            app_url_scheme: "careline".into(),
            media_url_expiration: Duration::from_secs(60),
        };
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }
}
