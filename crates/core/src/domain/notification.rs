// Notification Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Notification ID (supplied by the producer, used for deduplication)
pub type NotificationId = String;

/// Delivery medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Push,
    Sms,
    InApp,
    Webhook,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Email,
        Channel::Push,
        Channel::Sms,
        Channel::InApp,
        Channel::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Push => "push",
            Channel::Sms => "sms",
            Channel::InApp => "in_app",
            Channel::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(Channel::Email),
            "push" => Ok(Channel::Push),
            "sms" => Ok(Channel::Sms),
            "in_app" | "inapp" | "in-app" => Ok(Channel::InApp),
            "webhook" => Ok(Channel::Webhook),
            _ => Err(DomainError::UnknownChannel(s.to_string())),
        }
    }
}

/// Priority class, mapped to a numeric weight for ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    Critical,
    High,
    Medium,
    Low,
}

impl PriorityClass {
    pub const ALL: [PriorityClass; 4] = [
        PriorityClass::Critical,
        PriorityClass::High,
        PriorityClass::Medium,
        PriorityClass::Low,
    ];

    /// Numeric weight (higher = dispatched first)
    pub fn weight(&self) -> i32 {
        match self {
            PriorityClass::Critical => 4,
            PriorityClass::High => 3,
            PriorityClass::Medium => 2,
            PriorityClass::Low => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityClass::Critical => "critical",
            PriorityClass::High => "high",
            PriorityClass::Medium => "medium",
            PriorityClass::Low => "low",
        }
    }
}

impl std::fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityClass {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(PriorityClass::Critical),
            "high" => Ok(PriorityClass::High),
            "medium" | "normal" => Ok(PriorityClass::Medium),
            "low" => Ok(PriorityClass::Low),
            _ => Err(DomainError::UnknownPriority(s.to_string())),
        }
    }
}

/// Channel-specific content, tagged by channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum ChannelPayload {
    Email {
        to: String,
        subject: String,
        body: String,
    },
    Push {
        device_token: String,
        title: String,
        body: String,
    },
    Sms {
        phone_number: String,
        text: String,
    },
    InApp {
        user_id: String,
        title: String,
        body: String,
    },
    Webhook {
        url: String,
        body: serde_json::Value,
    },
}

impl ChannelPayload {
    pub fn channel(&self) -> Channel {
        match self {
            ChannelPayload::Email { .. } => Channel::Email,
            ChannelPayload::Push { .. } => Channel::Push,
            ChannelPayload::Sms { .. } => Channel::Sms,
            ChannelPayload::InApp { .. } => Channel::InApp,
            ChannelPayload::Webhook { .. } => Channel::Webhook,
        }
    }
}

/// A fully built notification, ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub priority: PriorityClass,
    pub payload: ChannelPayload,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: i64, // epoch ms
}

impl Notification {
    pub fn new(
        id: impl Into<String>,
        priority: PriorityClass,
        payload: ChannelPayload,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            priority,
            payload,
            metadata: serde_json::Value::Null,
            created_at,
        }
    }

    pub fn channel(&self) -> Channel {
        self.payload.channel()
    }

    /// Name of the live queue this notification routes to
    pub fn queue_name(&self) -> String {
        crate::domain::queue::queue_name(self.channel(), self.priority)
    }

    /// Build an email notification (test helper)
    pub fn email_test(id: impl Into<String>, priority: PriorityClass) -> Self {
        Self::new(
            id,
            priority,
            ChannelPayload::Email {
                to: "user@example.com".to_string(),
                subject: "Hello".to_string(),
                body: "Body".to_string(),
            },
            0,
        )
    }

    /// Build an SMS notification (test helper)
    pub fn sms_test(id: impl Into<String>, priority: PriorityClass) -> Self {
        Self::new(
            id,
            priority,
            ChannelPayload::Sms {
                phone_number: "+15550100".to_string(),
                text: "Hello".to_string(),
            },
            0,
        )
    }
}
