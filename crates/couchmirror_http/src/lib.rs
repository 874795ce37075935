//! # couchmirror http
//!
//! Network and archive collaborators for `couchmirror_core`:
//!
//! - [`CouchStore`]: a [`DocumentStore`](couchmirror_core::DocumentStore)
//!   over the CouchDB HTTP API
//! - [`HttpCatalog`]: a [`CatalogClient`](couchmirror_core::CatalogClient)
//!   for the catalog platform and its CDN
//! - [`ZipSqliteOpener`]: an [`ArchiveOpener`](couchmirror_core::ArchiveOpener)
//!   for zip-packed SQLite snapshots
//!
//! Retry and timeout policy lives here, not in the engine. Requests are not
//! retried; each client applies a single per-request timeout.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod archive;
mod catalog;
mod config;
mod couch;

pub use archive::{extract_single_member, SqliteTables, ZipSqliteOpener};
pub use catalog::{check_status, HttpCatalog, MANIFEST_PATH};
pub use config::{CatalogConfig, CouchConfig, DEFAULT_CATALOG_ROOT};
pub use couch::{split_bookkeeping, CouchStore};
