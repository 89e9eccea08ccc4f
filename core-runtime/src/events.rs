//! # Event Bus System
//!
//! Broadcasts typed events between core modules using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! ```text
//! ┌───────────────────┐   emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ CredentialManager ├─────────>│           ├────────────>│ Subscriber │
//! └───────────────────┘          │ EventBus  │             └────────────┘
//! ┌───────────────────┐   emit   │           │  subscribe  ┌────────────┐
//! │   MetadataCache   ├─────────>│           ├────────────>│ Subscriber │
//! └───────────────────┘          └───────────┘             └────────────┘
//! ```
//!
//! Emitting never blocks. Subscribers that fall behind receive
//! `RecvError::Lagged`, and emitting with no subscribers is not an error the
//! emitters care about.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Auth(AuthEvent::TokenRefreshing {
//!         user_id: "user-123".to_string(),
//!     }))
//!     .ok();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Credential lifecycle events
    Auth(AuthEvent),
    /// Metadata cache events
    Cache(CacheEvent),
    /// Remote file mutations
    File(FileEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
            CoreEvent::File(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Cache(CacheEvent::ResyncFailed { .. }) => EventSeverity::Error,
            CoreEvent::Auth(AuthEvent::TokenRefreshed { .. }) => EventSeverity::Info,
            CoreEvent::Cache(CacheEvent::ResyncCompleted { .. }) => EventSeverity::Info,
            CoreEvent::File(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

/// Events related to credential refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// A credential was stored for a user for the first time (or replaced).
    CredentialRegistered { user_id: String },
    /// Access token is being refreshed.
    TokenRefreshing { user_id: String },
    /// Token refresh completed and was persisted.
    TokenRefreshed {
        user_id: String,
        /// Unix epoch seconds at which the new access token expires.
        expires_at: i64,
    },
    /// Authentication error occurred.
    AuthError {
        user_id: Option<String>,
        message: String,
        /// Whether retrying could succeed without re-authorization.
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::CredentialRegistered { .. } => "Credential registered",
            AuthEvent::TokenRefreshing { .. } => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

// ============================================================================
// Cache Events
// ============================================================================

/// Events emitted while the metadata cache resynchronizes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    ResyncStarted { user_id: String },
    ResyncCompleted { user_id: String, file_count: u64 },
    /// The cache for this user was left empty.
    ResyncFailed { user_id: String, message: String },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::ResyncStarted { .. } => "Cache resync started",
            CacheEvent::ResyncCompleted { .. } => "Cache resync completed",
            CacheEvent::ResyncFailed { .. } => "Cache resync failed",
        }
    }
}

// ============================================================================
// File Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum FileEvent {
    Uploaded {
        user_id: String,
        remote_file_id: String,
        file_name: String,
    },
    Deleted {
        user_id: String,
        remote_file_id: String,
        /// Whether a cached record was removed as well.
        was_cached: bool,
    },
}

impl FileEvent {
    fn description(&self) -> &str {
        match self {
            FileEvent::Uploaded { .. } => "File uploaded",
            FileEvent::Deleted { .. } => "File deleted",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls behind by more than `capacity` events receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
