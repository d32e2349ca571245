//! # API Shared
//!
//! Wire types and small helpers shared by the clinic's HTTP surface and tooling.
//!
//! Contains:
//! - Request bodies and query parameters ([`requests`])
//! - Response envelopes and resource representations ([`responses`])
//! - Bearer header parsing ([`auth`])
//! - The health check ([`HealthService`])
//!
//! Every response body carries `ok`; failures are `{"ok": false, "error": "<code>"}`.

pub mod auth;
pub mod health;
pub mod requests;
pub mod responses;

pub use health::{HealthRes, HealthService};
pub use requests::*;
pub use responses::*;
