use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::store::{KvStore, StoreResult};

pub const URL_KEY: &str = "url";
pub const INTERVAL_KEY: &str = "intervalSeconds";
pub const BUTTON_ID_KEY: &str = "buttonId";

pub const DEFAULT_INTERVAL_SECONDS: u64 = 5;

/// Upper bound for a coerced interval. Keeps `Instant + period` from
/// overflowing inside the timer.
const MAX_INTERVAL_SECONDS: u64 = u32::MAX as u64;

/// Persisted auto-click settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Configuration {
    /// Pages whose URL starts with this prefix are clicked; empty matches all.
    #[serde(rename = "url")]
    pub target_url_prefix: String,
    #[serde(rename = "intervalSeconds")]
    pub interval_seconds: u64,
    /// `id` attribute of the element to click; empty disables clicking.
    #[serde(rename = "buttonId")]
    pub element_id: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            target_url_prefix: String::new(),
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            element_id: String::new(),
        }
    }
}

impl Configuration {
    /// Build a configuration from raw popup field text.
    ///
    /// String fields are trimmed; the interval goes through [`parse_interval`].
    pub fn from_form(url: &str, interval: &str, element_id: &str) -> Self {
        Self {
            target_url_prefix: url.trim().to_string(),
            interval_seconds: parse_interval(interval),
            element_id: element_id.trim().to_string(),
        }
    }
}

/// Coerce interval text to a positive number of seconds.
///
/// Reads an optional sign and the leading run of digits after any leading
/// whitespace, ignoring whatever follows (`"12s"` is 12). A `0x` prefix reads
/// hexadecimal digits. No digits, zero, or a negative value gives
/// [`DEFAULT_INTERVAL_SECONDS`].
pub fn parse_interval(input: &str) -> u64 {
    let text = input.trim_start();
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = match rest.get(..2) {
        Some("0x") | Some("0X") => (16, &rest[2..]),
        _ => (10, rest),
    };

    let mut value: u64 = 0;
    let mut seen_digit = false;
    for c in digits.chars() {
        let Some(digit) = c.to_digit(radix) else {
            break;
        };
        seen_digit = true;
        value = value
            .saturating_mul(u64::from(radix))
            .saturating_add(u64::from(digit));
    }

    if !seen_digit || negative || value == 0 {
        return DEFAULT_INTERVAL_SECONDS;
    }
    value.min(MAX_INTERVAL_SECONDS)
}

/// Coerce a stored interval value, whatever its JSON type.
pub fn coerce_interval(value: &Value) -> u64 {
    match value {
        Value::Number(number) => {
            if let Some(n) = number.as_u64() {
                if n == 0 {
                    DEFAULT_INTERVAL_SECONDS
                } else {
                    n.min(MAX_INTERVAL_SECONDS)
                }
            } else if let Some(f) = number.as_f64() {
                if f.is_finite() && f >= 1.0 {
                    (f.trunc() as u64).min(MAX_INTERVAL_SECONDS)
                } else {
                    DEFAULT_INTERVAL_SECONDS
                }
            } else {
                DEFAULT_INTERVAL_SECONDS
            }
        }
        Value::String(text) => parse_interval(text),
        _ => DEFAULT_INTERVAL_SECONDS,
    }
}

fn coerce_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        _ => String::new(),
    }
}

/// Reads and writes [`Configuration`] through a [`KvStore`].
///
/// Store failures never reach the caller; they are logged and the
/// configuration falls back to its defaults.
#[derive(Clone)]
pub struct ConfigStore {
    store: Arc<dyn KvStore>,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> Configuration {
        match self.try_load().await {
            Ok(config) => {
                log::info!("Config loaded: {config:?}");
                config
            }
            Err(err) => {
                log::error!("Error loading config: {err}");
                Configuration::default()
            }
        }
    }

    pub async fn save(&self, config: &Configuration) {
        match self.try_save(config).await {
            Ok(()) => log::info!("Config saved: {config:?}"),
            Err(err) => log::error!("Error saving config: {err}"),
        }
    }

    /// Like [`ConfigStore::load`], but reports store failures.
    pub async fn try_load(&self) -> StoreResult<Configuration> {
        let url = self.store.get(URL_KEY, Value::from("")).await?;
        let interval = self
            .store
            .get(INTERVAL_KEY, Value::from(DEFAULT_INTERVAL_SECONDS))
            .await?;
        let element_id = self.store.get(BUTTON_ID_KEY, Value::from("")).await?;

        Ok(Configuration {
            target_url_prefix: coerce_text(url),
            interval_seconds: coerce_interval(&interval),
            element_id: coerce_text(element_id),
        })
    }

    /// Like [`ConfigStore::save`], but reports store failures.
    pub async fn try_save(&self, config: &Configuration) -> StoreResult<()> {
        self.store
            .set(URL_KEY, Value::from(config.target_url_prefix.clone()))
            .await?;
        self.store
            .set(INTERVAL_KEY, Value::from(config.interval_seconds))
            .await?;
        self.store
            .set(BUTTON_ID_KEY, Value::from(config.element_id.clone()))
            .await?;
        Ok(())
    }
}
