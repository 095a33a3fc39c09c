// Delivery Handler Port
// Abstraction over channel adapters (email, push, SMS, in-app, webhook)

use crate::domain::Notification;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error codes that are never retried
pub const NON_RETRYABLE_CODES: [&str; 3] = ["INVALID_RECIPIENT", "UNSUBSCRIBED", "BLOCKED"];

/// Code used when a handler error carries no code of its own
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN";

/// Failure of one delivery attempt, produced by a handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl DeliveryError {
    /// Classify retryability from the fixed non-retryable code set.
    /// An empty code becomes `UNKNOWN` and is retryable.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let code = if code.trim().is_empty() {
            UNKNOWN_ERROR_CODE.to_string()
        } else {
            code
        };
        let retryable = !NON_RETRYABLE_CODES.contains(&code.as_str());
        Self {
            code,
            message: message.into(),
            retryable,
        }
    }

    /// Error without a code (defaults to retryable)
    pub fn uncoded(message: impl Into<String>) -> Self {
        Self::new(UNKNOWN_ERROR_CODE, message)
    }

    pub fn timeout(after_ms: u64) -> Self {
        Self::new("TIMEOUT", format!("delivery timed out after {}ms", after_ms))
    }
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for DeliveryError {}

/// Delivery handler trait
///
/// Implementations attempt exactly one delivery of one notification and are
/// treated as untrusted with respect to latency. Idempotency is left to the
/// implementation (delivery is at-least-once).
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    /// Mock handler behavior for a single call
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Succeed
        Success,
        /// Fail with code and message
        Fail(String, String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
        /// Sleep before succeeding
        Delay(Duration),
    }

    /// Scripted handler: per-notification scripts, then a default behavior
    pub struct ScriptedHandler {
        default: MockBehavior,
        scripts: Mutex<HashMap<String, VecDeque<MockBehavior>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedHandler {
        pub fn new(default: MockBehavior) -> Self {
            Self {
                default,
                scripts: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail(code: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(code.into(), "mock failure".to_string()))
        }

        /// Queue behaviors for one notification id, consumed in order
        pub fn script(&self, notification_id: &str, behaviors: Vec<MockBehavior>) {
            self.scripts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(notification_id.to_string(), behaviors.into());
        }

        /// Notification ids in call order
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
        }
    }

    #[async_trait]
    impl DeliveryHandler for ScriptedHandler {
        async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(notification.id.clone());

            let behavior = self
                .scripts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_mut(&notification.id)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| self.default.clone());

            match behavior {
                MockBehavior::Success => Ok(()),
                MockBehavior::Fail(code, msg) => Err(DeliveryError::new(code, msg)),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
                MockBehavior::Delay(d) => {
                    tokio::time::sleep(d).await;
                    Ok(())
                }
            }
        }
    }
}
