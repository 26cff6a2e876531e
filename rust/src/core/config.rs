use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub(crate) const CONFIG_FILE_NAME: &str = "socio_config.json";

const DEFAULT_API_BASE_URL: &str = "https://api.socio.app/api";
const DEFAULT_TYPING_EXPIRY_MS: u64 = 5_000;
const DEFAULT_STOP_TYPING_DEBOUNCE_MS: u64 = 3_000;
const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;
const DEFAULT_MESSAGES_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) api_base_url: Option<String>,
    pub(crate) typing_expiry_ms: Option<u64>,
    pub(crate) stop_typing_debounce_ms: Option<u64>,
    pub(crate) reconnect_base_delay_ms: Option<u64>,
    pub(crate) max_reconnect_attempts: Option<u32>,
    pub(crate) messages_page_size: Option<u32>,
    pub(crate) emit_read_receipts: Option<bool>,
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    serde_json::from_slice::<AppConfig>(&bytes).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), %e, "invalid config, using defaults");
        AppConfig::default()
    })
}

pub(crate) fn default_app_config_json() -> String {
    let v = AppConfig {
        api_base_url: Some(DEFAULT_API_BASE_URL.to_string()),
        typing_expiry_ms: Some(DEFAULT_TYPING_EXPIRY_MS),
        stop_typing_debounce_ms: Some(DEFAULT_STOP_TYPING_DEBOUNCE_MS),
        reconnect_base_delay_ms: Some(DEFAULT_RECONNECT_BASE_DELAY_MS),
        max_reconnect_attempts: Some(DEFAULT_MAX_RECONNECT_ATTEMPTS),
        messages_page_size: Some(DEFAULT_MESSAGES_PAGE_SIZE),
        emit_read_receipts: Some(true),
    };
    serde_json::to_string_pretty(&v).unwrap_or_else(|_| "{}".to_string())
}

impl AppConfig {
    pub(crate) fn api_base_url(&self) -> String {
        if let Ok(url) = std::env::var("SOCIO_API_URL") {
            if !url.trim().is_empty() {
                return url.trim().to_string();
            }
        }
        self.api_base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_API_BASE_URL)
            .to_string()
    }

    pub(crate) fn typing_expiry(&self) -> Duration {
        Duration::from_millis(self.typing_expiry_ms.unwrap_or(DEFAULT_TYPING_EXPIRY_MS))
    }

    pub(crate) fn stop_typing_debounce(&self) -> Duration {
        Duration::from_millis(
            self.stop_typing_debounce_ms
                .unwrap_or(DEFAULT_STOP_TYPING_DEBOUNCE_MS),
        )
    }

    pub(crate) fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(
            self.reconnect_base_delay_ms
                .unwrap_or(DEFAULT_RECONNECT_BASE_DELAY_MS),
        )
    }

    pub(crate) fn max_reconnect_attempts(&self) -> u32 {
        self.max_reconnect_attempts
            .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS)
    }

    pub(crate) fn messages_page_size(&self) -> u32 {
        self.messages_page_size
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MESSAGES_PAGE_SIZE)
    }

    pub(crate) fn emit_read_receipts(&self) -> bool {
        self.emit_read_receipts.unwrap_or(true)
    }
}
