use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_QUOTES_URL: &str = "http://quotes-service:8080/api/quote?strength=4";
pub const DEFAULT_IMAGES_URL: &str = "http://imageservice:7777/accounts/";
pub const DEFAULT_CIRCUITS: &str = "quotes-service,account-to-image";

/// Process level settings read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub service_name: String,
    /// Address announced on the discovery channel; resolved at startup when unset
    pub advertised_address: Option<String>,
    /// Base URL of the message broker HTTP bridge; discovery tokens are only logged when unset
    pub broker_url: Option<String>,
    pub discovery_interval: Duration,
    pub quotes_url: String,
    pub images_url: String,
    /// Circuits configured at startup
    pub circuits: Vec<String>,
    pub json_logs: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "accountservice".to_string()),
            advertised_address: non_empty_var("ADVERTISED_ADDRESS"),
            broker_url: non_empty_var("BROKER_URL"),
            discovery_interval: Duration::from_secs(
                std::env::var("DISCOVERY_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(30),
            ),
            quotes_url: std::env::var("QUOTES_URL")
                .unwrap_or_else(|_| DEFAULT_QUOTES_URL.to_string()),
            images_url: std::env::var("IMAGES_URL")
                .unwrap_or_else(|_| DEFAULT_IMAGES_URL.to_string()),
            circuits: parse_list(
                &std::env::var("CIRCUITS").unwrap_or_else(|_| DEFAULT_CIRCUITS.to_string()),
            ),
            json_logs: std::env::var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Key-value settings store, populated once before the resilient core starts.
///
/// Keys are case-insensitive and `-` is interchangeable with `_`, so
/// `circuit.quotes-service.timeout_ms` and `CIRCUIT.QUOTES_SERVICE.TIMEOUT_MS`
/// address the same entry.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every `CIRCUIT__<NAME>__<PROP>` variable from the environment
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build settings from `(name, value)` pairs shaped like environment variables.
    /// Segments separated by `__` become dotted key segments; other variables are ignored.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut settings = Self::new();
        for (name, value) in vars {
            let segments: Vec<&str> = name.split("__").collect();
            if segments.len() < 3 || !segments[0].eq_ignore_ascii_case("circuit") {
                continue;
            }
            settings.set(&segments.join("."), value);
        }
        settings
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(normalize_key(key), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&normalize_key(key)).map(String::as_str)
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.values.contains_key(&normalize_key(key))
    }

    /// Numeric lookup; values that do not parse are treated as unset
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase().replace('-', "_")
}
