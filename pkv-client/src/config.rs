//! # Client Configuration
//!
//! Connection target, credentials and tuning knobs, built directly, from a
//! `redis://` / `rediss://` URL, or deserialized with serde.

use std::time::Duration;

use pkv_common::Arg;
use serde::Deserialize;
use url::Url;

use crate::connector::{ConnectOptions, Target};
use crate::error::{ClientError, ClientResult};

/// Port used when the URL or config does not name one.
pub const DEFAULT_PORT: u16 = 6379;

/// Initial capacity of the per-connection read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Configuration for the async client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// ACL user name sent with `AUTH`.
    pub username: Option<String>,
    /// Password sent with `AUTH`.
    pub password: Option<String>,
    /// Database selected with `SELECT` after connecting.
    pub database: Option<String>,
    /// Request a secure transport from the connector.
    pub tls: bool,
    /// Optional connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Initial capacity of the read buffer.
    pub read_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            database: None,
            tls: false,
            connect_timeout_ms: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ClientConfig {
    /// Parses `redis://[user[:password]@]host[:port][/database]`.
    ///
    /// `rediss://` selects a secure transport.
    pub fn from_url(raw: &str) -> ClientResult<Self> {
        Self::from_url_with_tls(raw, None)
    }

    /// Like [`ClientConfig::from_url`], with an explicit TLS choice that wins
    /// over the scheme when set.
    pub fn from_url_with_tls(raw: &str, tls: Option<bool>) -> ClientResult<Self> {
        let url = Url::parse(raw).map_err(|err| ClientError::InvalidUrl(format!("{raw}: {err}")))?;

        let scheme_tls = match url.scheme() {
            "redis" => false,
            "rediss" => true,
            other => return Err(ClientError::InvalidUrl(format!("unsupported scheme {other:?}"))),
        };

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ClientError::InvalidUrl(format!("{raw}: missing host")))?;
        // IPv6 literals come back bracketed.
        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();

        let username = Some(url.username()).filter(|name| !name.is_empty()).map(str::to_string);
        let password = url.password().map(str::to_string);
        let database = Some(url.path().trim_start_matches('/'))
            .filter(|path| !path.is_empty())
            .map(str::to_string);

        Ok(ClientConfig {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            username,
            password,
            database,
            tls: tls.unwrap_or(scheme_tls),
            ..ClientConfig::default()
        })
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub(crate) fn target(&self) -> Target {
        Target {
            host: self.host.clone(),
            port: self.port,
        }
    }

    pub(crate) fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            secure_transport: self.tls,
            half_open: false,
        }
    }

    /// Commands sent once per connection, ahead of the first caller command.
    pub(crate) fn handshake_commands(&self) -> Vec<Vec<Arg>> {
        let mut commands = Vec::new();

        if let Some(password) = &self.password {
            match &self.username {
                Some(username) => commands.push(vec![
                    Arg::from("AUTH"),
                    Arg::from(username.as_str()),
                    Arg::from(password.as_str()),
                ]),
                None => commands.push(vec![Arg::from("AUTH"), Arg::from(password.as_str())]),
            }
        }

        if let Some(database) = &self.database {
            commands.push(vec![Arg::from("SELECT"), Arg::from(database.as_str())]);
        }

        commands
    }
}
