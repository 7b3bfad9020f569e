//! Layered bridge settings.
//!
//! Precedence, lowest to highest:
//! 1. Programmed defaults
//! 2. TOML file (explicit path, else `./manpower-bridge.toml` if present)
//! 3. Environment (`MANPOWER_BROKER_URL`, `MANPOWER_REPLY_QUEUE`,
//!    `MANPOWER_REQUEST_TIMEOUT_MS`)

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::{CallTimeout, OUTBOUND_QUEUE_CAPACITY};
use crate::error::ConfigError;

/// File looked up in the working directory when no path is given.
pub const CONFIG_FILE_NAME: &str = "manpower-bridge.toml";

pub const ENV_BROKER_URL: &str = "MANPOWER_BROKER_URL";
pub const ENV_REPLY_QUEUE: &str = "MANPOWER_REPLY_QUEUE";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "MANPOWER_REQUEST_TIMEOUT_MS";

/// Everything the bridge needs to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeSettings {
    pub broker_url: String,
    /// Prefix of the reply queue; each bridge appends its own instance ID
    pub reply_queue: String,
    /// Default deadline for every call
    pub request_timeout_ms: u64,
    pub outbound_queue_capacity: usize,
    pub queues: RemoteQueues,
    /// Deadline overrides keyed by message type
    pub timeouts: BTreeMap<String, u64>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            broker_url: "nats://localhost:4222".to_string(),
            reply_queue: "manpower.replies".to_string(),
            request_timeout_ms: CallTimeout::default().as_duration().as_millis() as u64,
            outbound_queue_capacity: OUTBOUND_QUEUE_CAPACITY,
            queues: RemoteQueues::default(),
            timeouts: BTreeMap::new(),
        }
    }
}

/// Request queues of the remote services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteQueues {
    pub organization: String,
    pub employee: String,
    pub user: String,
}

impl Default for RemoteQueues {
    fn default() -> Self {
        Self {
            organization: "organization.requests".to_string(),
            employee: "employee.requests".to_string(),
            user: "user.requests".to_string(),
        }
    }
}

impl BridgeSettings {
    /// Deadline for `message_type`: its override if configured, else the default.
    pub fn timeout_for(&self, message_type: &str) -> Duration {
        let millis = self
            .timeouts
            .get(message_type)
            .copied()
            .unwrap_or(self.request_timeout_ms);
        Duration::from_millis(millis)
    }

    /// Check every value against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_empty("broker_url", &self.broker_url)?;
        non_empty("reply_queue", &self.reply_queue)?;
        non_empty("queues.organization", &self.queues.organization)?;
        non_empty("queues.employee", &self.queues.employee)?;
        non_empty("queues.user", &self.queues.user)?;

        CallTimeout::from_millis(self.request_timeout_ms)
            .map_err(|message| ConfigError::invalid("request_timeout_ms", message))?;
        for (message_type, millis) in &self.timeouts {
            CallTimeout::from_millis(*millis).map_err(|message| {
                ConfigError::invalid(format!("timeouts.{message_type}"), message)
            })?;
        }

        if self.outbound_queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "outbound_queue_capacity",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

fn non_empty(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(key, "must not be empty"));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsEventKind {
    Info,
    Warning,
}

/// Something worth logging that happened while loading settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingsEvent {
    pub kind: SettingsEventKind,
    pub message: String,
}

impl SettingsEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: SettingsEventKind::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: SettingsEventKind::Warning,
            message: message.into(),
        }
    }

    /// Emit the event through `log`.
    pub fn log(&self) {
        match self.kind {
            SettingsEventKind::Info => {
                log::info!(target: "manpower_bridge::config", "{}", self.message)
            }
            SettingsEventKind::Warning => {
                log::warn!(target: "manpower_bridge::config", "{}", self.message)
            }
        }
    }
}

#[derive(Debug)]
pub struct SettingsLoadOutcome {
    pub settings: BridgeSettings,
    pub events: Vec<SettingsEvent>,
}

/// Load settings from all layers and validate the result.
///
/// An explicit `path` must exist. Without one, `./manpower-bridge.toml` is
/// used when present and skipped otherwise.
pub fn load_settings(path: Option<&Path>) -> Result<SettingsLoadOutcome, ConfigError> {
    load_settings_with_env(path, |key| std::env::var(key).ok())
}

fn load_settings_with_env(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SettingsLoadOutcome, ConfigError> {
    let mut events = Vec::new();

    // Layers 1 and 2: missing keys in the file keep their defaults
    let mut settings = match path {
        Some(path) => load_toml_settings(path, &mut events)?,
        None => {
            let default_path = Path::new(CONFIG_FILE_NAME);
            if default_path.exists() {
                load_toml_settings(default_path, &mut events)?
            } else {
                events.push(SettingsEvent::info(format!(
                    "No {CONFIG_FILE_NAME} found, using defaults"
                )));
                BridgeSettings::default()
            }
        }
    };

    // Layer 3: environment
    apply_env_overrides(&mut settings, env, &mut events)?;

    settings.validate()?;
    Ok(SettingsLoadOutcome { settings, events })
}

fn load_toml_settings(
    path: &Path,
    events: &mut Vec<SettingsEvent>,
) -> Result<BridgeSettings, ConfigError> {
    let display = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;
    let settings = toml::from_str::<BridgeSettings>(&contents).map_err(|source| {
        ConfigError::Parse {
            path: display.clone(),
            source,
        }
    })?;

    events.push(SettingsEvent::info(format!("Loaded settings from {display}")));
    Ok(settings)
}

fn apply_env_overrides(
    settings: &mut BridgeSettings,
    env: impl Fn(&str) -> Option<String>,
    events: &mut Vec<SettingsEvent>,
) -> Result<(), ConfigError> {
    if let Some(url) = env(ENV_BROKER_URL) {
        events.push(SettingsEvent::info(format!(
            "{ENV_BROKER_URL} overrides broker_url"
        )));
        settings.broker_url = url;
    }

    if let Some(queue) = env(ENV_REPLY_QUEUE) {
        events.push(SettingsEvent::info(format!(
            "{ENV_REPLY_QUEUE} overrides reply_queue"
        )));
        settings.reply_queue = queue;
    }

    if let Some(raw) = env(ENV_REQUEST_TIMEOUT_MS) {
        let millis = raw.trim().parse::<u64>().map_err(|e| {
            ConfigError::invalid(ENV_REQUEST_TIMEOUT_MS, format!("{raw:?} is not a number: {e}"))
        })?;
        events.push(SettingsEvent::info(format!(
            "{ENV_REQUEST_TIMEOUT_MS} overrides request_timeout_ms"
        )));
        settings.request_timeout_ms = millis;
    }

    if !settings.timeouts.is_empty() && env(ENV_REQUEST_TIMEOUT_MS).is_some() {
        events.push(SettingsEvent::warning(format!(
            "{ENV_REQUEST_TIMEOUT_MS} does not change per message type overrides: {}",
            settings
                .timeouts
                .keys()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    Ok(())
}
