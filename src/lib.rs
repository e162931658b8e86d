//! coursecache - client-side data and session layer for an e-learning
//! storefront.
//!
//! The crate mediates between UI collaborators and a remote REST API
//! through a set of cooperating stores:
//!
//! - [`SessionStore`]: authentication-token lifecycle and identity
//! - [`CourseCache`]: time-boxed catalog cache with stale fallback
//! - [`CartSyncStore`]: server-authoritative cart/enrollment state
//! - [`ProgressCache`]: per-user progress with upsert-on-write merge
//!
//! All remote traffic routes through [`HttpGateway`], which owns the
//! error normalization, bearer-token attachment, and the process-wide
//! loading signal. Every store exposes its observable state as a
//! `tokio::sync::watch` channel: synchronous re-emission on change,
//! last-value replay for late subscribers.

pub mod api;
pub mod auth;
pub mod cache;
pub mod cart;
pub mod client;
pub mod config;
pub mod models;

pub use api::{ApiError, CommentsApi, HttpGateway};
pub use auth::{SessionShared, SessionStore};
pub use cache::{CacheEnvelope, CourseCache, ProgressCache, Storage};
pub use cart::CartSyncStore;
pub use client::Client;
pub use config::Config;
