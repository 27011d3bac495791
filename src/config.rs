use std::{net::SocketAddr, time::Duration};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite URL. Without one everything lives in memory.
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub narrator_url: Option<String>,
    pub narrator_timeout: Duration,
    /// Events queued per connection before it counts as dead.
    pub room_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            narrator_url: None,
            narrator_timeout: Duration::from_millis(1500),
            room_buffer: 32,
        }
    }
}

fn var(key: &str) -> Option<String> {
    dotenv::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Reads the environment, with `.env` loaded on top when present.
    pub fn from_env() -> anyhow::Result<Config> {
        let defaults = Config::default();

        let bind_addr = match var("BIND_ADDR") {
            Some(addr) => addr.parse().with_context(|| format!("BIND_ADDR={addr}"))?,
            None => defaults.bind_addr,
        };
        let narrator_timeout = match var("NARRATOR_TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(ms.parse().with_context(|| format!("NARRATOR_TIMEOUT_MS={ms}"))?),
            None => defaults.narrator_timeout,
        };
        let room_buffer = match var("ROOM_BUFFER") {
            Some(n) => n.parse().with_context(|| format!("ROOM_BUFFER={n}"))?,
            None => defaults.room_buffer,
        };

        Ok(Config {
            database_url: var("DATABASE_URL"),
            bind_addr,
            narrator_url: var("NARRATOR_URL"),
            narrator_timeout,
            room_buffer,
        })
    }
}
