use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
};

use anyhow::{Context, bail};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

/// Server settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    /// `None` accepts any origin.
    pub cors_origin: Option<HeaderValue>,
    /// Events queued per connection before further ones are dropped.
    pub outbound_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
            cors_origin: None,
            outbound_buffer: 64,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let cors_origin = match lookup("CORS_ORIGIN") {
            None => None,
            Some(origin) if origin == "*" => None,
            Some(origin) => Some(
                HeaderValue::from_str(&origin)
                    .with_context(|| format!("invalid CORS_ORIGIN {origin:?}"))?,
            ),
        };

        let outbound_buffer = parse_or(&lookup, "OUTBOUND_BUFFER", defaults.outbound_buffer)?;
        if outbound_buffer == 0 {
            bail!("OUTBOUND_BUFFER must be greater than zero");
        }

        Ok(Self {
            host: parse_or(&lookup, "HOST", defaults.host)?,
            port: parse_or(&lookup, "PORT", defaults.port)?,
            cors_origin,
            outbound_buffer,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn cors_layer(&self) -> CorsLayer {
        let cors = CorsLayer::new().allow_methods([Method::GET, Method::POST]);
        match &self.cors_origin {
            Some(origin) => cors.allow_origin(origin.clone()),
            None => cors.allow_origin(Any),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key} {raw:?}")),
        None => Ok(default),
    }
}
