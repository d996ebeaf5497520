use aws_sdk_dynamodb::operation::scan::ScanOutput;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use std::ops::AddAssign;
use std::time::Duration;

use crate::table::helpers::batch_processor::DEFAULT_MAX_CONCURRENT_PAGES;

/// A raw DynamoDB record: attribute name to attribute value
pub type Item = HashMap<String, AttributeValue>;

/// One page of scan results
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    /// The records returned for this page
    pub items: Vec<Item>,
    /// Continuation key; `None` exactly on the terminal page
    pub last_evaluated_key: Option<Item>,
}

impl Page {
    /// Build a page from its records and continuation key
    pub fn new(items: Vec<Item>, last_evaluated_key: Option<Item>) -> Self {
        Self {
            items,
            last_evaluated_key,
        }
    }

    /// Whether this is the last page of the scan
    pub fn is_last(&self) -> bool {
        self.last_evaluated_key.is_none()
    }
}

impl From<ScanOutput> for Page {
    fn from(output: ScanOutput) -> Self {
        Self {
            items: output.items.unwrap_or_default(),
            last_evaluated_key: output.last_evaluated_key.filter(|key| !key.is_empty()),
        }
    }
}

/// Parameters of a table scan
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanRequest {
    /// Table to scan
    pub table_name: String,
    /// Optional filter expression, e.g. `created < :cutoff`
    pub filter_expression: Option<String>,
    /// Values referenced by the filter expression
    pub expression_attribute_values: Option<Item>,
    /// Optional page size passed as the scan `Limit`
    pub page_size: Option<i32>,
}

impl ScanRequest {
    /// Scan the whole table
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    /// Only return items matching `expression`
    pub fn with_filter(mut self, expression: impl Into<String>, values: Option<Item>) -> Self {
        self.filter_expression = Some(expression.into());
        self.expression_attribute_values = values;
        self
    }

    /// Limit the number of items evaluated per page
    pub fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

/// Retry configuration for batch writes
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of write calls per batch; `None` retries until accepted
    pub max_attempts: Option<usize>,
    /// Backoff unit; the wait after attempt `n` is `n² × base_delay`
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Configuration of the bulk write pipeline
#[derive(Clone, Debug)]
pub struct WriteConfig {
    /// Ceiling on page-workers running at the same time
    pub max_concurrent_pages: usize,
    /// Pause before each batch write to avoid immediate throttling
    pub batch_delay: Duration,
    /// Per-batch retry behaviour
    pub retry: RetryConfig,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            max_concurrent_pages: DEFAULT_MAX_CONCURRENT_PAGES,
            batch_delay: Duration::from_millis(10),
            retry: RetryConfig::default(),
        }
    }
}

/// Summary of a bulk write run
#[must_use = "bulk write results carry the counters of what was written"]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BulkWriteOutput {
    /// Pages pulled from the source
    pub pages_scanned: usize,
    /// Non-empty pages handed to a page-worker
    pub pages_dispatched: usize,
    /// Batches fully accepted by the store
    pub batches: usize,
    /// Write requests accepted by the store
    pub items: usize,
    /// BatchWriteItem calls issued, retries included
    pub write_calls: usize,
    /// Write calls that were retries of a partially accepted or failed batch
    pub retries: usize,
    /// Wall-clock duration of the run
    pub total_duration: Duration,
}

/// Counters produced by a single page-worker
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PageStats {
    pub(crate) batches: usize,
    pub(crate) items: usize,
    pub(crate) write_calls: usize,
    pub(crate) retries: usize,
}

impl AddAssign for PageStats {
    fn add_assign(&mut self, other: Self) {
        self.batches += other.batches;
        self.items += other.items;
        self.write_calls += other.write_calls;
        self.retries += other.retries;
    }
}

impl AddAssign<PageStats> for BulkWriteOutput {
    fn add_assign(&mut self, stats: PageStats) {
        self.batches += stats.batches;
        self.items += stats.items;
        self.write_calls += stats.write_calls;
        self.retries += stats.retries;
    }
}
