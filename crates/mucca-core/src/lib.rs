//! Core types, store traits and consistency-critical operations for Mucca.
//!
//! This crate is deliberately free of HTTP and database dependencies. Storage
//! backends implement [`store::EntityStore`] and [`store::ChangeFeed`]; the
//! metadata source implements [`enrichment::MetadataFetcher`]. The operations
//! in [`engagement`] and [`enrichment`] receive those capabilities explicitly.

// Native `async fn` in traits; the `Send` bounds are spelled out where needed.
#![allow(async_fn_in_trait)]

pub mod article;
pub mod clap;
pub mod engagement;
pub mod enrichment;
pub mod error;
pub mod event;
pub mod key;
pub mod store;

pub use error::{Error, Result};
