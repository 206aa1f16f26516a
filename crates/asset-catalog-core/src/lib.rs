//! # Asset Catalog Core
//!
//! Backend-independent logic for the cloud asset catalog: asset models,
//! query shaping types, the store error taxonomy, the [`DocumentStore`]
//! trait, and an in-memory store.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies.
//!
//! [`DocumentStore`]: store::DocumentStore

pub mod error;
pub mod models;
pub mod query;
pub mod store;
