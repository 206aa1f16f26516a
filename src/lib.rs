//! # Cloud Asset Catalog
//!
//! A local inventory of cloud service metadata.
//!
//! The catalog walks a directory of service models (botocore layout), turns
//! each service and each API operation into an asset record, and stores the
//! records as JSON documents in SQLite. Every store call runs under a retry
//! policy with linear backoff, and records are soft-expired rather than
//! deleted.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Model repo   │──▶│   Ingest     │──▶│ AssetClient  │──▶│  SQLite  │
//! │ service-2.json│  │   driver     │   │ + retry      │   │ JSON docs│
//! └──────────────┘   └──────────────┘   └──────────────┘   └────┬─────┘
//!                                                               │
//!                                                        ┌──────┴─────┐
//!                                                        │ CLI        │
//!                                                        │ (assetctl) │
//!                                                        └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! assetctl init                       # create indexes
//! assetctl services                   # list services in ./models
//! assetctl ingest                     # store services and operations
//! assetctl get aws.product s3_2006-03-01
//! assetctl list aws.product_action --page 2 --page-size 50
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | YAML/TOML settings with environment overrides |
//! | [`db`] | Lazily established SQLite connection pool |
//! | [`retry`] | Linear-backoff retry for single results and streams |
//! | [`sqlite_store`] | JSON document store over SQLite |
//! | [`documents`] | Retry-governed document operations and timestamps |
//! | [`asset`] | Asset identity, upserts, soft expiry |
//! | [`catalog`] | Service model repository |
//! | [`ingest`] | Ingestion driver |
//! | [`init`] | Store initialization command |
//! | [`get`] | Asset retrieval commands |
//! | [`services`] | Service listing command |
//! | [`logging`] | Log subscriber setup |

pub mod asset;
pub mod catalog;
pub mod config;
pub mod db;
pub mod documents;
pub mod get;
pub mod ingest;
pub mod init;
pub mod logging;
pub mod retry;
pub mod services;
pub mod sqlite_store;
