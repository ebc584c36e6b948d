use anyhow::{Context, Result};
use std::env;
use std::net::{IpAddr, SocketAddr};

use crate::gemini::{DEFAULT_ENDPOINT, DEFAULT_MODEL};

pub const DEFAULT_PORT: u16 = 8000;

pub struct Config {
    /// Path of the verdict database
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_endpoint: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gemini_api_key = lookup("GEMINI_API_KEY")
            .filter(|key| !key.is_empty())
            .context("GEMINI_API_KEY must be set")?;

        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| "uprising.db".to_string());

        let port: u16 = match lookup("PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("PORT must be a port number, got '{}'", port))?,
            None => DEFAULT_PORT,
        };

        let host: IpAddr = match lookup("HOST") {
            Some(host) => host
                .parse()
                .with_context(|| format!("HOST must be an IP address, got '{}'", host))?,
            None => IpAddr::from([0, 0, 0, 0]),
        };

        let gemini_model = lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let gemini_endpoint =
            lookup("GEMINI_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            database_url,
            host,
            port,
            gemini_api_key,
            gemini_model,
            gemini_endpoint,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
