use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};

use parley_push::VapidKeys;

pub const DEFAULT_ROOMS: &str = "General,Random,Tech Talk,Off Topic";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub default_rooms: Vec<String>,
    pub vapid: VapidKeys,
    pub push_cleanup_secs: u64,
    pub push_retention_days: i64,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_var(&lookup, "PARLEY_PORT", 8080u16)?;
        let db_path = PathBuf::from(
            lookup("PARLEY_DB_PATH").unwrap_or_else(|| "storage/chat.db".into()),
        );

        let default_rooms = lookup("PARLEY_DEFAULT_ROOMS")
            .unwrap_or_else(|| DEFAULT_ROOMS.into())
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();

        let vapid = match (
            lookup("PARLEY_VAPID_PUBLIC_KEY"),
            lookup("PARLEY_VAPID_PRIVATE_KEY"),
        ) {
            (Some(public), Some(private)) => VapidKeys::new(public, private),
            (None, None) => VapidKeys::development(),
            _ => bail!("PARLEY_VAPID_PUBLIC_KEY and PARLEY_VAPID_PRIVATE_KEY must be set together"),
        };

        let push_cleanup_secs = parse_var(&lookup, "PARLEY_PUSH_CLEANUP_SECS", 3600u64)?;
        let push_retention_days = parse_var(&lookup, "PARLEY_PUSH_RETENTION_DAYS", 30i64)?;

        Ok(Self {
            host,
            port,
            db_path,
            default_rooms,
            vapid,
            push_cleanup_secs,
            push_retention_days,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {key}={raw:?}: {e}")),
        None => Ok(default),
    }
}
