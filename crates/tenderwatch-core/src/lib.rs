//! Core types, reconciliation engine, and trait definitions for tenderwatch.
//!
//! Storage, task execution and upstream fetching are reached only through the
//! traits in [`store`], [`task`] and [`source`]; backends live in sibling
//! crates.

pub mod aggregate;
pub mod annotate;
pub mod change;
pub mod collection;
pub mod crawl;
pub mod entity;
pub mod error;
pub mod field;
pub mod payload;
pub mod reconcile;
pub mod report;
pub mod score;
pub mod source;
pub mod store;
pub mod task;
pub mod transaction;
pub mod update;

pub use error::{Error, Result};
