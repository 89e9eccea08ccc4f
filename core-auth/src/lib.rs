//! # Authentication Module
//!
//! Credential lifecycle for users of the remote file service.
//!
//! ## Overview
//!
//! This module keeps one OAuth 2.0 credential per user in the shared SQLite
//! database and makes sure callers only ever receive an access token that is
//! still valid, refreshing it through the provider's token endpoint when it
//! is about to expire.
//!
//! ## Features
//!
//! - Single-flight refresh per user
//! - Refresh-token grant over the host's HTTP client
//! - Durable storage via [`SqliteTokenStore`]
//! - Auth event emission on the core event bus

pub mod error;
pub mod manager;
pub mod oauth;
pub mod token_store;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::{CredentialManager, CredentialManagerConfig};
pub use oauth::{OAuthRefreshClient, RemoteAuthClient};
pub use token_store::{SqliteTokenStore, TokenStore};
pub use types::{Credential, OAuthClientCredentials, RefreshedAccessToken, UserId};
