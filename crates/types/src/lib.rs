//! Core types and traits for the grantstore workspace.
//!
//! This crate defines the shared abstractions used by every store backend:
//! access and refresh tokens, the authentication context a token was issued
//! under, authentication key derivation, the error type, and the async
//! [`TokenStore`] contract.

pub mod auth;
pub mod error;
pub mod key;
pub mod token;
pub mod traits;

pub use auth::{AuthenticationContext, AuthorizationRequest};
pub use error::StoreError;
pub use key::{AuthenticationKey, DefaultKeyGenerator, KeyGenerator};
pub use token::{AccessToken, RefreshToken, TokenKind, unix_now};
pub use traits::{PurgeReport, StoreStats, TokenStore};
