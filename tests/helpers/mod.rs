/// Test helpers for pipeline integration tests
///
/// [`MockStore`] is an in-memory table that records every call the pipeline
/// makes and can be scripted to throttle, fail or stall.
pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{KEY, is_delete, item, key, pages, request_id};

use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemError;
use aws_sdk_dynamodb::types::error::ProvisionedThroughputExceededException;
use aws_sdk_dynamodb::types::{AttributeValue, WriteRequest};
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::{Response, StatusCode};
use aws_smithy_types::body::SdkBody;
use flow::Error;
use flow::table::{Item, Page, ScanRequest, Store};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// One recorded BatchWriteItem call
#[derive(Clone, Debug)]
#[allow(dead_code)]
pub struct WriteCall {
    /// Key values of the submitted requests, in order
    pub ids: Vec<String>,
    /// How many of the submitted requests were deletes
    pub deletes: usize,
    /// When the call started
    pub at: Instant,
}

#[derive(Debug, Default)]
struct State {
    table: HashMap<String, Item>,
    calls: Vec<WriteCall>,
    scans: Vec<ScanRequest>,
    rejections: HashMap<String, usize>,
    in_flight: usize,
    max_in_flight: usize,
}

/// In-memory [`Store`] with scripted misbehavior
#[derive(Debug, Default)]
pub struct MockStore {
    key_schema: Vec<String>,
    pages: Vec<Page>,
    scan_error_after: Option<usize>,
    reject_last: usize,
    reject_rounds: usize,
    failing_calls: usize,
    throttled_calls: usize,
    never_accept: bool,
    fatal: bool,
    latency: Duration,
    state: Mutex<State>,
}

#[allow(dead_code)]
impl MockStore {
    /// A table keyed on [`KEY`] whose scan returns `pages`
    pub fn new(pages: Vec<Page>) -> Self {
        let table = pages
            .iter()
            .flat_map(|page| page.items.iter().cloned())
            .filter_map(|item| Some((id_of(&item)?, item)))
            .collect();

        Self {
            key_schema: vec![KEY.to_string()],
            pages,
            state: Mutex::new(State {
                table,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// An empty table
    pub fn empty() -> Self {
        Self::new(vec![])
    }

    /// Leave the last `count` requests of each batch unprocessed, `rounds` times per request
    pub fn rejecting_last(mut self, count: usize, rounds: usize) -> Self {
        self.reject_last = count;
        self.reject_rounds = rounds;
        self
    }

    /// Fail the first `count` write calls with a timeout
    pub fn failing_first(mut self, count: usize) -> Self {
        self.failing_calls = count;
        self
    }

    /// Reject the first `count` write calls with ProvisionedThroughputExceeded
    pub fn throttling_first(mut self, count: usize) -> Self {
        self.throttled_calls = count;
        self
    }

    /// Never accept anything
    pub fn never_accepting(mut self) -> Self {
        self.never_accept = true;
        self
    }

    /// Fail every write call with a non-retryable error
    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    /// Fail the scan after yielding `pages` pages
    pub fn scan_error_after(mut self, pages: usize) -> Self {
        self.scan_error_after = Some(pages);
        self
    }

    /// Make every write call take `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// All write calls so far
    pub fn calls(&self) -> Vec<WriteCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// All scans so far
    pub fn scans(&self) -> Vec<ScanRequest> {
        self.state.lock().unwrap().scans.clone()
    }

    /// Highest number of write calls that were in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }

    /// Number of items currently stored
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().table.len()
    }

    /// The stored item with key value `id`
    pub fn get(&self, id: &str) -> Option<Item> {
        self.state.lock().unwrap().table.get(id).cloned()
    }

    /// Whether the item with key value `id` is stored
    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().unwrap().table.contains_key(id)
    }

    fn apply(&self, requests: &[WriteRequest]) -> Result<Vec<WriteRequest>, Error> {
        let mut state = self.state.lock().unwrap();
        let call = state.calls.len();
        state.calls.push(WriteCall {
            ids: requests.iter().map(request_id).collect(),
            deletes: requests.iter().filter(|r| is_delete(r)).count(),
            at: Instant::now(),
        });

        if self.fatal {
            return Err(Error::Config("table is read-only".to_string()));
        }
        if call < self.throttled_calls {
            let throttled = BatchWriteItemError::ProvisionedThroughputExceededException(
                ProvisionedThroughputExceededException::builder()
                    .message("throughput exceeded")
                    .build(),
            );
            let raw = Response::new(StatusCode::try_from(400u16).unwrap(), SdkBody::empty());
            return Err(Error::DynamoBatchWriteItemError(SdkError::service_error(
                throttled, raw,
            )));
        }
        if call < self.failing_calls {
            return Err(Error::DynamoBatchWriteItemError(SdkError::timeout_error(
                "request timed out",
            )));
        }
        if self.never_accept {
            return Ok(requests.to_vec());
        }

        let first_rejected = requests.len().saturating_sub(self.reject_last);
        let mut unprocessed = Vec::new();

        for (i, request) in requests.iter().enumerate() {
            let id = request_id(request);
            if i >= first_rejected {
                let rejected = state.rejections.entry(id.clone()).or_default();
                if *rejected < self.reject_rounds {
                    *rejected += 1;
                    unprocessed.push(request.clone());
                    continue;
                }
            }

            if let Some(put) = request.put_request() {
                let _ = state.table.insert(id, put.item().clone());
            } else {
                let _ = state.table.remove(&id);
            }
        }

        Ok(unprocessed)
    }
}

fn id_of(item: &Item) -> Option<String> {
    match item.get(KEY) {
        Some(AttributeValue::S(id)) => Some(id.clone()),
        _ => None,
    }
}

impl Store for MockStore {
    fn key_schema(&self, _table_name: &str) -> impl Future<Output = Result<Vec<String>, Error>> + Send {
        let key_schema = self.key_schema.clone();
        async move { Ok(key_schema) }
    }

    fn scan(&self, request: &ScanRequest) -> BoxStream<'static, Result<Page, Error>> {
        self.state.lock().unwrap().scans.push(request.clone());

        let mut pages: Vec<Result<Page, Error>> = self.pages.iter().cloned().map(Ok).collect();
        if let Some(after) = self.scan_error_after {
            pages.truncate(after);
            pages.push(Err(Error::DynamoScanError(SdkError::timeout_error(
                "scan timed out",
            ))));
        }

        stream::iter(pages).boxed()
    }

    fn batch_write(
        &self,
        _table_name: &str,
        requests: &[WriteRequest],
    ) -> impl Future<Output = Result<Vec<WriteRequest>, Error>> + Send {
        async move {
            {
                let mut state = self.state.lock().unwrap();
                state.in_flight += 1;
                state.max_in_flight = state.max_in_flight.max(state.in_flight);
            }

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            let result = self.apply(requests);
            self.state.lock().unwrap().in_flight -= 1;
            result
        }
    }
}
