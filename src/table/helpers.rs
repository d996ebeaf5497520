use crate::Error;
use crate::table::types::Item;

/// Retry configuration for batch operations
pub(crate) mod retry_config {
    use std::time::Duration;

    /// Calculate retry delay with quadratic backoff
    ///
    /// # Arguments
    /// * `attempt` - The attempt that just failed (1-based)
    /// * `base` - Delay unit multiplied by `attempt²`
    /// * `max` - Maximum delay duration
    ///
    /// # Returns
    /// Duration to wait before retrying
    pub(crate) fn retry_delay(attempt: usize, base: Duration, max: Duration) -> Duration {
        let factor = (attempt as u64).saturating_mul(attempt as u64);
        let delay_ms = (base.as_millis() as u64).saturating_mul(factor);
        let capped_delay = delay_ms.min(max.as_millis() as u64);
        Duration::from_millis(capped_delay)
    }
}

/// Batch processing utilities
pub(crate) mod batch_processor {
    /// Maximum number of write requests DynamoDB accepts in one BatchWriteItem call
    pub(crate) const BATCH_WRITE_SIZE: usize = 25;

    /// Default ceiling on concurrently running page-workers
    pub(crate) const DEFAULT_MAX_CONCURRENT_PAGES: usize = 50;

    /// Split `items` into consecutive batches of at most `size` elements
    ///
    /// Order is preserved, only the last batch may be shorter and an empty input
    /// produces no batches.
    pub(crate) fn partition<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
        let size = size.max(1);
        let mut batches = Vec::with_capacity(items.len().div_ceil(size));
        let mut items = items.into_iter().peekable();

        while items.peek().is_some() {
            batches.push(items.by_ref().take(size).collect());
        }

        batches
    }
}

/// Keep only the table's key attributes of `item`
///
/// DeleteRequest keys must contain exactly the key schema attributes.
pub(crate) fn project_key(item: &Item, key_schema: &[String]) -> Result<Item, Error> {
    key_schema
        .iter()
        .map(|name| {
            item.get(name)
                .map(|value| (name.clone(), value.clone()))
                .ok_or_else(|| Error::MissingKeyAttribute(name.clone()))
        })
        .collect()
}
