//! Error handling types for manpower-bridge
//!
//! This module provides the failure taxonomy surfaced by remote lookups and
//! by settings loading.

use std::sync::PoisonError;
use std::time::Duration;

use thiserror::Error;

/// Failure of a remote call made through the bridge.
///
/// Every variant means the same thing to a usecase: the external dependency
/// is unavailable and the enclosing request fails with a server error.
/// No variant is retried by the bridge itself.
#[derive(Debug, Error)]
pub enum RpcError {
    /// No reply correlated with the call arrived before the deadline
    #[error("{message_type}: no reply within {timeout:?}")]
    Timeout {
        message_type: String,
        timeout: Duration,
    },

    /// The remote service answered with an explicit error payload
    #[error("{message_type}: remote error: {message}")]
    Remote {
        message_type: String,
        message: String,
    },

    /// The reply lacked a required field or had the wrong shape
    #[error("{message_type}: malformed reply: {source}")]
    Decode {
        message_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// The call parameters could not be encoded as a JSON object
    #[error("{message_type}: cannot encode parameters: {message}")]
    Encode {
        message_type: String,
        message: String,
    },

    /// The outbound queue is full; the call was rejected without publishing
    #[error("{message_type}: outbound queue full")]
    QueueFull { message_type: String },

    /// The publisher could not hand the request to the broker
    #[error("{message_type}: publish failed: {reason}")]
    Publish {
        message_type: String,
        reason: String,
    },

    /// The bridge is not running (shut down, or reply consumer gone)
    #[error("{message_type}: bridge closed: {reason}")]
    BridgeClosed {
        message_type: String,
        reason: String,
    },

    /// The caller cancelled the wait
    #[error("{message_type}: cancelled")]
    Cancelled { message_type: String },

    /// A freshly generated correlation ID was already pending
    #[error("{message_type}: correlation id collision")]
    DuplicateCorrelation { message_type: String },
}

impl RpcError {
    /// The operation tag of the call that failed.
    pub fn message_type(&self) -> &str {
        match self {
            RpcError::Timeout { message_type, .. }
            | RpcError::Remote { message_type, .. }
            | RpcError::Decode { message_type, .. }
            | RpcError::Encode { message_type, .. }
            | RpcError::QueueFull { message_type }
            | RpcError::Publish { message_type, .. }
            | RpcError::BridgeClosed { message_type, .. }
            | RpcError::Cancelled { message_type }
            | RpcError::DuplicateCorrelation { message_type } => message_type,
        }
    }

    /// Whether the failure should be reported as "dependency unavailable".
    ///
    /// Constant: every variant maps to the same server-side error, so this
    /// never branches. Do not use it to tell failures apart; match on the
    /// variant or use [`RpcError::is_retryable`] for that.
    pub fn is_unavailable(&self) -> bool {
        true
    }

    /// Whether the caller may reasonably retry the same call later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RpcError::Timeout { .. } | RpcError::QueueFull { .. } | RpcError::Publish { .. }
        )
    }
}

/// Result type for remote calls
pub type RpcResult<T> = Result<T, RpcError>;

/// Failure while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Settings file could not be read
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid TOML for the settings schema
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of its allowed range
    #[error("invalid setting {key}: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Helper trait to recover from poisoned locks
pub trait LockResultExt<T> {
    /// Take the guard even if another thread panicked while holding it.
    ///
    /// The context parameter identifies which structure triggered lock recovery,
    /// helping developers debug thread safety issues.
    fn recover_poison(self, context: &str) -> T;
}

impl<T> LockResultExt<T> for Result<T, PoisonError<T>> {
    fn recover_poison(self, context: &str) -> T {
        match self {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!(
                    target: "manpower_bridge::lock_recovery",
                    "Recovered from poisoned lock in {}",
                    context
                );
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn timeout_message_names_the_call() {
        let err = RpcError::Timeout {
            message_type: "find_job_by_id".to_string(),
            timeout: Duration::from_millis(100),
        };
        assert_eq!(err.to_string(), "find_job_by_id: no reply within 100ms");
        assert_eq!(err.message_type(), "find_job_by_id");
        assert!(err.is_retryable());
    }

    #[test]
    fn remote_error_keeps_remote_text() {
        let err = RpcError::Remote {
            message_type: "find_user_by_id".to_string(),
            message: "not found".to_string(),
        };
        assert!(err.to_string().contains("not found"));
        assert!(err.is_unavailable());
        assert!(!err.is_retryable());
    }

    #[test]
    fn every_variant_reports_unavailable() {
        let message_type = || "find_job_by_id".to_string();
        let decode_source = serde_json::from_str::<u8>("x").unwrap_err();
        let errors = [
            RpcError::Timeout {
                message_type: message_type(),
                timeout: Duration::from_millis(1),
            },
            RpcError::Remote {
                message_type: message_type(),
                message: "not found".to_string(),
            },
            RpcError::Decode {
                message_type: message_type(),
                source: decode_source,
            },
            RpcError::Encode {
                message_type: message_type(),
                message: "not an object".to_string(),
            },
            RpcError::QueueFull {
                message_type: message_type(),
            },
            RpcError::Publish {
                message_type: message_type(),
                reason: "broker down".to_string(),
            },
            RpcError::BridgeClosed {
                message_type: message_type(),
                reason: "shut down".to_string(),
            },
            RpcError::Cancelled {
                message_type: message_type(),
            },
            RpcError::DuplicateCorrelation {
                message_type: message_type(),
            },
        ];

        for err in &errors {
            assert!(err.is_unavailable(), "{err}");
            assert_eq!(err.message_type(), "find_job_by_id");
        }
        let retryable = errors.iter().filter(|err| err.is_retryable()).count();
        assert_eq!(retryable, 3);
    }

    #[test]
    fn recover_poison_returns_inner_guard() {
        let lock = Arc::new(Mutex::new(7));
        let poisoner = Arc::clone(&lock);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(lock.is_poisoned());
        let guard = lock.lock().recover_poison("test");
        assert_eq!(*guard, 7);
    }
}
