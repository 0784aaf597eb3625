//! Core types and the authorization-aware engine of the Warden back-office.
//!
//! This crate has no HTTP or database dependencies. It holds the domain
//! model, the visibility scope, the policy engine, the list-query DSL, the
//! bulk coordinator, the invitation lifecycle and the traits that storage
//! backends implement.

// Native `async fn` in traits; the returned futures are declared `Send`
// explicitly where it matters.
#![allow(async_fn_in_trait)]

pub mod activity;
pub mod bulk;
pub mod error;
pub mod identity;
pub mod invitation;
pub mod mail;
pub mod permission;
pub mod policy;
pub mod query;
pub mod service;
pub mod store;
pub mod validate;
pub mod visibility;

pub use error::{Error, InvitationError, Result, ValidationErrors};
pub use service::{AdminService, ServiceConfig};
