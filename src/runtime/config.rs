//! Configuration Management
use config::File;
use config::Source;
use config::Value;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

/// Get global configuration
pub fn config() -> Config {
    get_config().clone()
}

// helper to deal with poisoned Mutex
fn get_config() -> MutexGuard<'static, Config> {
    CONFIG.lock().unwrap_or_else(|poison| {
        warn!("config poisoned, restoring initial config");
        let mut c = poison.into_inner();
        *c = init_config();
        CONFIG.clear_poison();
        c
    })
}

/// Set config value
pub fn set<V: Into<config::Value>>(name: impl Into<String>, value: V) {
    get_config().set_value(name, value);
}

/// Get value from config
pub fn get_value(name: &str) -> Option<Value> {
    get_config().misc.get(name).cloned()
}

/// Try to parse value from config string
pub fn get<T: FromStr>(name: &str) -> Option<T> {
    get_config()
        .misc
        .get(name)
        .and_then(|v| v.clone().into_string().ok())
        .and_then(|v| v.parse::<T>().ok())
}

fn init_config() -> Config {
    let mut settings = ::config::Config::builder();

    // user config
    if let Some(mut path) = dirs::config_dir() {
        path.push("futuresdr");
        path.push("config.toml");

        settings = settings.add_source(File::from(path.clone()).required(false));
    }

    // project config
    settings =
        settings.add_source(File::new("config.toml", config::FileFormat::Toml).required(false));

    // env config
    settings = settings.add_source(config::Environment::with_prefix("futuresdr"));

    // start from default config
    let mut c = Config::default();

    match settings.build() {
        Ok(settings) => match settings.collect() {
            Ok(config) => {
                for (k, v) in config.into_iter() {
                    c.set_value(k, v);
                }
            }
            Err(e) => warn!("error parsing config {e:?}"),
        },
        Err(e) => warn!("error reading config {e:?}"),
    }
    c
}

static CONFIG: Lazy<Mutex<Config>> = Lazy::new(|| Mutex::new(init_config()));

/// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level
    pub log_level: LevelFilter,
    /// Interval at which blocked barrier waits check for interrupts (us)
    pub barrier_poll_interval_us: u64,
    /// Timeout of TX send calls (ms)
    pub send_timeout_ms: u64,
    /// Timeout of steady-state RX receive calls (ms)
    pub recv_timeout_ms: u64,
    /// Timeout of a single receive while flushing RX streamers (ms)
    pub flush_timeout_ms: u64,
    /// Scratch buffer size per channel used to flush RX streamers
    pub flush_bytes: usize,
    misc: HashMap<String, Value>,
}

impl Config {
    /// Barrier polling interval
    pub fn barrier_poll_interval(&self) -> Duration {
        Duration::from_micros(self.barrier_poll_interval_us)
    }
    /// TX send timeout
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
    /// Steady-state RX receive timeout
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
    /// Receive timeout used while flushing
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    fn set_value<V: Into<config::Value>>(&mut self, name: impl Into<String>, value: V) {
        let name = name.into();
        let value = value.into();

        let parsed = match name.as_str() {
            "log_level" => config_parse::<LevelFilter>(&value).map(|v| self.log_level = v),
            "barrier_poll_interval_us" => {
                config_parse::<u64>(&value).map(|v| self.barrier_poll_interval_us = v.max(1))
            }
            "send_timeout_ms" => config_parse::<u64>(&value).map(|v| self.send_timeout_ms = v),
            "recv_timeout_ms" => config_parse::<u64>(&value).map(|v| self.recv_timeout_ms = v),
            "flush_timeout_ms" => config_parse::<u64>(&value).map(|v| self.flush_timeout_ms = v),
            "flush_bytes" => config_parse::<usize>(&value).map(|v| self.flush_bytes = v.max(1)),
            _ => {
                self.misc.insert(name, value);
                return;
            }
        };

        if parsed.is_none() {
            warn!("invalid config value for {name}: {value:?}, keeping previous value");
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            #[cfg(debug_assertions)]
            log_level: LevelFilter::DEBUG,
            #[cfg(not(debug_assertions))]
            log_level: LevelFilter::INFO,
            barrier_poll_interval_us: 1000,
            send_timeout_ms: 1000,
            recv_timeout_ms: 100,
            flush_timeout_ms: 0,
            flush_bytes: 4096,
            misc: HashMap::new(),
        }
    }
}

fn config_parse<T: FromStr>(v: &Value) -> Option<T> {
    v.clone().into_string().ok()?.parse::<T>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_keys() {
        let mut c = Config::default();
        c.set_value("recv_timeout_ms", 250);
        c.set_value("flush_bytes", "8192");
        c.set_value("log_level", "warn");
        assert_eq!(c.recv_timeout(), Duration::from_millis(250));
        assert_eq!(c.flush_bytes, 8192);
        assert_eq!(c.log_level, LevelFilter::WARN);
    }

    #[test]
    fn invalid_value_keeps_default() {
        let mut c = Config::default();
        c.set_value("send_timeout_ms", "soon");
        assert_eq!(c.send_timeout_ms, 1000);
    }

    #[test]
    fn unknown_keys_go_to_misc() {
        let mut c = Config::default();
        c.set_value("my_key", "42");
        let v = c.misc.get("my_key").cloned().and_then(|v| v.into_string().ok());
        assert_eq!(v.as_deref(), Some("42"));
    }
}
