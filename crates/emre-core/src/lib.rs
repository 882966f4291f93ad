//! EmRe client core.
//!
//! This crate is shared by every EmRe front end and provides:
//! - `models`: the wire contract for organizations, teams, resources and incidents
//! - `api`: the request executor and the declared queries and mutations
//! - `cache`: the tag-invalidated result-set cache
//! - `lifecycle`: incident and resource-assignment rules checked before any request
//! - `auth`: session state and credential storage
//! - `EmreClient`: a typed facade tying them together

pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;

pub use client::EmreClient;
pub use config::Config;
pub use error::{Error, Result};
