use aws_sdk_dynamodb::types::{DeleteRequest, PutRequest, WriteRequest};
use futures_util::{Stream, StreamExt};
use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::Error;
use crate::table::batch::write_page;
use crate::table::helpers::{batch_processor, project_key};
use crate::table::progress::{NoProgress, Progress};
use crate::table::store::Store;
use crate::table::types::{BulkWriteOutput, Item, PageStats, ScanRequest, WriteConfig};

/// Concurrent, throttled bulk delete/put against one table
///
/// Pages of write requests are handed to page-workers. At most
/// [`WriteConfig::max_concurrent_pages`] workers run at once: the dispatcher
/// waits for a free slot before pulling the next page from its source. Each
/// worker splits its page into batches of 25 and retries every batch until the
/// store has accepted all of it.
///
/// # Example
///
/// ```rust,no_run
/// use flow::table::{BulkWriter, DynamoStore, ScanRequest};
/// use std::sync::Arc;
///
/// # async fn example(client: aws_sdk_dynamodb::Client) -> Result<(), flow::Error> {
/// let writer = BulkWriter::new(Arc::new(DynamoStore::new(client)), "sessions");
/// let output = writer
///     .purge(ScanRequest::new("sessions").with_filter("expired = :t", None))
///     .await?;
/// println!("deleted {} items", output.items);
/// # Ok(())
/// # }
/// ```
pub struct BulkWriter<S> {
    store: Arc<S>,
    table_name: Arc<str>,
    config: Arc<WriteConfig>,
    progress: Arc<dyn Progress>,
}

impl<S> fmt::Debug for BulkWriter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkWriter")
            .field("table_name", &self.table_name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S> BulkWriter<S>
where
    S: Store,
{
    /// Create a writer for `table_name` with the default configuration
    pub fn new(store: Arc<S>, table_name: impl Into<String>) -> Self {
        Self {
            store,
            table_name: Arc::from(table_name.into()),
            config: Arc::new(WriteConfig::default()),
            progress: Arc::new(NoProgress),
        }
    }

    /// Replace the pipeline configuration
    pub fn with_config(mut self, config: WriteConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Report completed batches to `progress`
    pub fn with_progress(mut self, progress: impl Progress + 'static) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    /// The table this writer mutates
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Delete every item matched by `request`
    ///
    /// Looks up the table's key schema, scans the table (applying the optional
    /// filter) and deletes each scanned item by its key. A scan error aborts
    /// the run; nothing is checkpointed, so a rerun starts over, which is safe
    /// because deletes are idempotent.
    pub async fn purge(&self, request: ScanRequest) -> Result<BulkWriteOutput, Error> {
        let key_schema = self.store.key_schema(&request.table_name).await?;
        info!(
            table = %request.table_name,
            keys = ?key_schema,
            filter = request.filter_expression.as_deref().unwrap_or(""),
            "purging table"
        );

        let pages = self.store.scan(&request).map(move |page| {
            let page = page?;
            debug!(items = page.items.len(), last = page.is_last(), "scanned page");
            page.items
                .iter()
                .map(|item| project_key(item, &key_schema).and_then(delete_request))
                .collect::<Result<Vec<_>, Error>>()
        });

        self.dispatch(pages).await
    }

    /// Put (insert or replace) `items`
    pub async fn put_items(&self, items: Vec<Item>) -> Result<BulkWriteOutput, Error> {
        info!(table = %self.table_name, items = items.len(), "writing items");

        let requests = items
            .into_iter()
            .map(|item| {
                let put = PutRequest::builder().set_item(Some(item)).build()?;
                Ok(WriteRequest::builder().put_request(put).build())
            })
            .collect::<Result<Vec<_>, Error>>()?;

        self.dispatch(chunked(requests)).await
    }

    /// Delete the items identified by `keys`
    ///
    /// Each key must contain exactly the table's key attributes.
    pub async fn delete_keys(&self, keys: Vec<Item>) -> Result<BulkWriteOutput, Error> {
        info!(table = %self.table_name, keys = keys.len(), "deleting items");

        let requests = keys
            .into_iter()
            .map(delete_request)
            .collect::<Result<Vec<_>, Error>>()?;

        self.dispatch(chunked(requests)).await
    }

    /// Run page-workers over `pages` and join them all
    async fn dispatch<P>(&self, pages: P) -> Result<BulkWriteOutput, Error>
    where
        P: Stream<Item = Result<Vec<WriteRequest>, Error>>,
    {
        let start_time = Instant::now();
        let ceiling = self.config.max_concurrent_pages.max(1);
        let semaphore = Arc::new(Semaphore::new(ceiling));
        let mut workers: JoinSet<Result<PageStats, Error>> = JoinSet::new();
        let mut output = BulkWriteOutput::default();
        let mut pages = pin!(pages);

        loop {
            // Blocks while `ceiling` page-workers are still running.
            let permit = Arc::clone(&semaphore).acquire_owned().await?;

            let Some(page) = pages.next().await else {
                break;
            };
            output.pages_scanned += 1;

            let requests = match page {
                Ok(requests) => requests,
                Err(e) => {
                    workers.abort_all();
                    return Err(e);
                }
            };

            if requests.is_empty() {
                continue;
            }

            while let Some(joined) = workers.try_join_next() {
                output += settle(joined, &mut workers)?;
            }

            let store = Arc::clone(&self.store);
            let table_name = Arc::clone(&self.table_name);
            let config = Arc::clone(&self.config);
            let progress = Arc::clone(&self.progress);

            let _ = workers.spawn(async move {
                let _permit = permit;
                write_page(store, table_name, requests, config, progress).await
            });
            output.pages_dispatched += 1;
        }

        while let Some(joined) = workers.join_next().await {
            output += settle(joined, &mut workers)?;
        }

        output.total_duration = start_time.elapsed();
        info!(
            table = %self.table_name,
            pages = output.pages_dispatched,
            batches = output.batches,
            items = output.items,
            retries = output.retries,
            elapsed_ms = output.total_duration.as_millis() as u64,
            "bulk write complete"
        );

        Ok(output)
    }
}

/// Unwrap a finished page-worker, aborting the others on failure
fn settle(
    joined: Result<Result<PageStats, Error>, tokio::task::JoinError>,
    workers: &mut JoinSet<Result<PageStats, Error>>,
) -> Result<PageStats, Error> {
    match joined.map_err(Error::from).and_then(|result| result) {
        Ok(stats) => Ok(stats),
        Err(e) => {
            workers.abort_all();
            Err(e)
        }
    }
}

fn delete_request(key: Item) -> Result<WriteRequest, Error> {
    let delete = DeleteRequest::builder().set_key(Some(key)).build()?;
    Ok(WriteRequest::builder().delete_request(delete).build())
}

/// Present an in-memory list of requests as pages of one batch each
fn chunked(
    requests: Vec<WriteRequest>,
) -> impl Stream<Item = Result<Vec<WriteRequest>, Error>> {
    tokio_stream::iter(
        batch_processor::partition(requests, batch_processor::BATCH_WRITE_SIZE)
            .into_iter()
            .map(Ok),
    )
}
