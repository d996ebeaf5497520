//! Bulk mutation of a DynamoDB table: scan, batch, throttle, retry.

mod attribute;
mod batch;
mod helpers;
mod pipeline;
mod progress;
mod store;
mod types;

pub use attribute::{parse_item, parse_items};
pub use pipeline::BulkWriter;
pub use progress::{CountingProgress, DotProgress, NoProgress, Progress};
pub use store::{DynamoStore, Store};
pub use types::{BulkWriteOutput, Item, Page, RetryConfig, ScanRequest, WriteConfig};

/// Maximum number of write requests DynamoDB accepts in one BatchWriteItem call
pub const BATCH_WRITE_SIZE: usize = helpers::batch_processor::BATCH_WRITE_SIZE;

/// Default ceiling on concurrently running page-workers
pub const DEFAULT_MAX_CONCURRENT_PAGES: usize = helpers::batch_processor::DEFAULT_MAX_CONCURRENT_PAGES;
