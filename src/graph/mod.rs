//! Directory API plumbing
//!
//! This module provides the HTTP layer shared by both backend generations.
//!
//! # Module Structure
//!
//! - [`uri`] - Request URI composition
//! - [`auth`] - Bearer token providers
//! - [`http`] - Authenticated transport and response validation
//! - [`client`] - Base client combining the three, with pagination
//!
//! # Example
//!
//! ```ignore
//! use dirrecon::graph::{client::BaseClient, http::{Acceptance, Transport}};
//!
//! async fn example(transport: Transport) -> dirrecon::Result<()> {
//!     let client = BaseClient::new(transport, "https://graph.microsoft.com", "v1.0", "", false);
//!     let url = client.uri("users/u1", &[])?;
//!     let user = client.get(&url, &Acceptance::codes(&[200])).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod uri;
