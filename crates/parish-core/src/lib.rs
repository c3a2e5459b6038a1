//! Core types and trait definitions for the parish site.
//!
//! This crate is free of HTTP and database dependencies. Records, the
//! listing engine and the session gate are written against the capability
//! traits in [`store`]; backends implement them elsewhere.

// Native `async fn` in traits; the Send-bound advisory lint is suppressed.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod listing;
pub mod query;
pub mod record;
pub mod session;
pub mod store;
pub mod video;

pub use error::{Error, Result};
