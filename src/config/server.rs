//! Server configuration types
//!
//! Defines the main configuration structures for the socksd server.

use super::UdpConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default listen address
fn default_listen_addr() -> String {
    "0.0.0.0:1080".to_string()
}

/// Default request timeout in seconds
fn default_request_timeout() -> u64 {
    10
}

/// Default UDP associate setting
fn default_allow_udp() -> bool {
    true
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// SOCKS5 server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:1080")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// CONNECT dial timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Allow UDP associate command
    #[serde(default = "default_allow_udp")]
    pub allow_udp: bool,

    /// Username/password credentials; no-auth when absent
    #[serde(default)]
    pub auth: Option<AuthConfig>,

    /// UDP relay configuration
    #[serde(default)]
    pub udp: UdpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: default_listen_addr(),
            request_timeout: default_request_timeout(),
            allow_udp: default_allow_udp(),
            auth: None,
            udp: UdpConfig::default(),
        }
    }
}

impl ServerConfig {
    /// CONNECT dial timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Configured username and password, if both are present
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let auth = self.auth.as_ref()?;
        match (&auth.username, &auth.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Some(auth) = &self.auth {
            auth.validate()?;
        }
        if self.request_timeout == 0 {
            return Err("request_timeout must be greater than 0".to_string());
        }
        self.udp.validate()
    }
}

/// Username/password credentials
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// Username for SOCKS5 auth
    #[serde(default)]
    pub username: Option<String>,

    /// Password for SOCKS5 auth
    #[serde(default)]
    pub password: Option<String>,
}

impl AuthConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) if user.len() > 255 || pass.len() > 255 => {
                Err("username and password must be at most 255 bytes".to_string())
            }
            (Some(_), Some(_)) => Ok(()),
            (Some(_), None) => Err("username configured without password".to_string()),
            (None, Some(_)) => Err("password configured without username".to_string()),
            (None, None) => Err("auth section requires username and password".to_string()),
        }
    }
}
