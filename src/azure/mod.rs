//! Azure API interaction module
//!
//! Everything needed to talk to Azure: AD authentication, the ARM HTTP
//! client, typed response models and the resource directory the janitor
//! scans through.
//!
//! # Module Structure
//!
//! - [`auth`] - Azure AD client-credentials authentication
//! - [`client`] - ARM HTTP client with nextLink pagination
//! - [`directory`] - `ResourceDirectory` trait and its ARM implementation
//! - [`model`] - Typed ARM response models

pub mod auth;
pub mod client;
pub mod directory;
pub mod model;
