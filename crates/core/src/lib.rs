//! # Clinic Core
//!
//! Core business logic for the multi-tenant clinic backend.
//!
//! This crate contains:
//! - Runtime configuration resolved once at startup ([`ClinicConfig`])
//! - Principals, bearer tokens and password hashing ([`auth`], [`password`])
//! - Treatment lifecycle rules and group status derivation ([`lifecycle`])
//! - Timeline event types, rendering and cursors ([`timeline`])
//! - Postgres-backed services for every entity ([`repositories`])
//!
//! **No HTTP concerns**: routing, extractors and JSON envelopes belong in `api-rest` and
//! `api-shared`.

pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod lifecycle;
pub mod password;
pub mod permissions;
pub mod repositories;
pub mod timeline;
pub mod validation;

pub use auth::{Claims, Principal, Role, TokenService};
pub use clinic_types::{ClinicCode, EmailAddress, Icd10Code, NonEmptyText, TextError, ToothNumber};
pub use config::ClinicConfig;
pub use constants::*;
pub use error::{ClinicError, ClinicResult};
pub use lifecycle::{GroupStatus, TreatmentStatus};
pub use permissions::DoctorPermissions;
pub use timeline::{EventType, NewTimelineEvent, TimelineCursor, TimelineEvent, TimelinePage};

/// Embedded schema migrations, applied by the server at startup and by `clinic migrate`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
