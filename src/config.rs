use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

/// Runtime knobs for the room engine. Everything here has a sane default so
/// the server boots from a bare environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Interval of the per-room housekeeping tick, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Lifetime of an in-memory room ban, in seconds. Bans are never
    /// persisted; the legacy behaviour is a 15 minute lapse checked lazily.
    #[serde(default = "default_ban_ttl_secs")]
    pub ban_ttl_secs: i64,

    /// Ticks of inactivity before a human occupant falls asleep.
    #[serde(default = "default_idle_sleep_ticks")]
    pub idle_sleep_ticks: u32,

    /// Ticks a room may sit empty before the manager unloads it.
    #[serde(default = "default_room_unload_ticks")]
    pub room_unload_ticks: u32,
}

fn default_tick_interval_ms() -> u64 {
    500
}
fn default_ban_ttl_secs() -> i64 {
    15 * 60
}
fn default_idle_sleep_ticks() -> u32 {
    1200
}
fn default_room_unload_ticks() -> u32 {
    120
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            ban_ttl_secs: default_ban_ttl_secs(),
            idle_sleep_ticks: default_idle_sleep_ticks(),
            room_unload_ticks: default_room_unload_ticks(),
        }
    }
}

impl Config {
    #[allow(unused)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::from_filename(".env");

        fn env_num<T: std::str::FromStr>(key: &str, default: T) -> T {
            std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }

        Ok(Self {
            tick_interval_ms: env_num("TICK_INTERVAL_MS", default_tick_interval_ms()),
            ban_ttl_secs: env_num("BAN_TTL_SECS", default_ban_ttl_secs()),
            idle_sleep_ticks: env_num("IDLE_SLEEP_TICKS", default_idle_sleep_ticks()),
            room_unload_ticks: env_num("ROOM_UNLOAD_TICKS", default_room_unload_ticks()),
        })
    }
}
