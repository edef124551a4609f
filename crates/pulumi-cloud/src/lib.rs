//! `pulumi-cloud`: async client for the stack management API.
//!
//! # Architecture
//!
//! ```text
//! ManagementApi (trait)   ← what the reconciler depends on
//!     │
//!     ▼
//! ManagementClient        ← reqwest, bounded timeout, explicit AccessToken
//!     │
//!     ▼
//! RetryPolicy             ← exponential backoff for 5xx / 429 / transport errors
//! ```
//!
//! Every write is a full-document `PUT`, so a retried request can never leave
//! a remote resource half-updated.

pub mod api;
pub mod client;
pub mod error;
pub mod retry;
pub mod types;

pub use api::ManagementApi;
pub use client::{ClientOptions, ManagementClient};
pub use error::ApiError;
pub use retry::RetryPolicy;
pub use types::{DriftSchedule, PermissionScope, StackTag, TeamStackPermission, TtlSchedule};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ApiError>;
