use aws_sdk_dynamodb::types::WriteRequest;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::Error;
use crate::table::helpers::{batch_processor, retry_config};
use crate::table::progress::Progress;
use crate::table::store::Store;
use crate::table::types::{PageStats, RetryConfig, WriteConfig};

/// Write one batch, resubmitting its unprocessed subset until the store accepts everything
///
/// Each attempt sends only what the previous attempt left unprocessed (or, when
/// the attempt failed with a retryable error, the same subset again). The wait
/// after attempt `n` is `n² × base_delay`. Non-retryable errors are returned
/// immediately; with `max_attempts` set, a batch still unprocessed after that
/// many calls fails with [`Error::RetryExhausted`].
pub(crate) async fn write_batch<S>(
    store: &S,
    table_name: &str,
    batch: Vec<WriteRequest>,
    retries: &RetryConfig,
) -> Result<PageStats, Error>
where
    S: Store,
{
    let mut stats = PageStats {
        batches: 1,
        items: batch.len(),
        ..Default::default()
    };

    let mut pending = batch;
    let mut attempt = 1;

    loop {
        stats.write_calls += 1;

        let result = store.batch_write(table_name, &pending).await;
        let unprocessed = match result {
            Ok(unprocessed) => unprocessed,
            Err(e) if e.is_retryable() => {
                warn!(table = table_name, attempt, error = %e, "batch write failed, retrying");
                pending
            }
            Err(e) => return Err(e),
        };

        if unprocessed.is_empty() {
            debug!(table = table_name, attempt, items = stats.items, "batch written");
            return Ok(stats);
        }

        if retries.max_attempts.is_some_and(|max| attempt >= max) {
            return Err(Error::RetryExhausted {
                attempts: attempt,
                unprocessed: unprocessed.len(),
            });
        }

        let delay = retry_config::retry_delay(attempt, retries.base_delay, retries.max_delay);
        debug!(
            table = table_name,
            attempt,
            unprocessed = unprocessed.len(),
            delay_ms = delay.as_millis() as u64,
            "unprocessed items, backing off"
        );
        sleep(delay).await;

        attempt += 1;
        stats.retries += 1;
        pending = unprocessed;
    }
}

/// Page-worker: split one page into batches and write them in page order
///
/// Emits one progress marker per fully accepted batch.
pub(crate) async fn write_page<S>(
    store: Arc<S>,
    table_name: Arc<str>,
    requests: Vec<WriteRequest>,
    config: Arc<WriteConfig>,
    progress: Arc<dyn Progress>,
) -> Result<PageStats, Error>
where
    S: Store,
{
    let mut stats = PageStats::default();

    for batch in batch_processor::partition(requests, batch_processor::BATCH_WRITE_SIZE) {
        if !config.batch_delay.is_zero() {
            sleep(config.batch_delay).await;
        }

        let written = batch.len();
        stats += write_batch(store.as_ref(), &table_name, batch, &config.retry).await?;
        progress.batch_written(written);
    }

    Ok(stats)
}
