//! # flow
//!
//! AWS session resolution and bulk DynamoDB mutation behind the `flow` CLI.
//!
//! - [`session`]: fallback-chained credential resolution. Static credentials
//!   (environment, then the shared credentials file) are used when present;
//!   otherwise the profile's assume-role configuration is honored, prompting
//!   for an MFA code when the profile requires one.
//! - [`table`]: a concurrent, paginated, batched and retrying write pipeline.
//!   Pages are split into batches of at most 25 write requests, page-workers
//!   run under a concurrency ceiling, and each batch resubmits its unprocessed
//!   subset with quadratic backoff until the table accepts it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flow::session::Session;
//! use flow::table::{BulkWriter, DynamoStore, ScanRequest, WriteConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), flow::Error> {
//!     let session = Session::from_profile("dev").await?;
//!     let store = Arc::new(DynamoStore::new(session.dynamodb_client()));
//!
//!     let output = BulkWriter::new(store, "sessions")
//!         .with_config(WriteConfig {
//!             max_concurrent_pages: 10,
//!             ..Default::default()
//!         })
//!         .purge(ScanRequest::new("sessions"))
//!         .await?;
//!
//!     println!("deleted {} items in {} batches", output.items, output.batches);
//!     Ok(())
//! }
//! ```
#![deny(
    warnings,
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    deprecated,
    unreachable_code,
    unused_mut
)]

mod error;
pub use error::Error;

/// Credential resolution and authenticated sessions
pub mod session;

/// Bulk write pipeline
pub mod table;

pub use session::{Session, SessionBuilder};
pub use table::{BulkWriteOutput, BulkWriter, DynamoStore, Store};
