use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::WriteRequest;
use aws_smithy_types_convert::stream::PaginationStreamExt;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use std::future::Future;

use crate::error::Error;
use crate::table::types::{Page, ScanRequest};

/// The remote key-value store the bulk pipeline mutates
///
/// [`DynamoStore`] is the production implementation; tests substitute an
/// in-memory double.
pub trait Store: Send + Sync + 'static {
    /// Names of the table's key attributes (partition key first)
    fn key_schema(&self, table_name: &str) -> impl Future<Output = Result<Vec<String>, Error>> + Send;

    /// Lazily scan the table page by page, in scan order
    ///
    /// The stream ends after the page whose `last_evaluated_key` is `None`.
    /// An `Err` item aborts the scan.
    fn scan(&self, request: &ScanRequest) -> BoxStream<'static, Result<Page, Error>>;

    /// Submit one batch of at most 25 write requests
    ///
    /// Returns the requests the store did not process; an empty vector means
    /// the whole batch was accepted.
    fn batch_write(
        &self,
        table_name: &str,
        requests: &[WriteRequest],
    ) -> impl Future<Output = Result<Vec<WriteRequest>, Error>> + Send;
}

/// [`Store`] backed by the DynamoDB SDK client
#[derive(Clone, Debug)]
pub struct DynamoStore {
    client: Client,
}

impl DynamoStore {
    /// Wrap an existing DynamoDB client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The underlying DynamoDB client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Store for DynamoStore {
    fn key_schema(&self, table_name: &str) -> impl Future<Output = Result<Vec<String>, Error>> + Send {
        async move {
            let output = self
                .client
                .describe_table()
                .table_name(table_name)
                .send()
                .await?;

            let key_schema: Vec<String> = output
                .table()
                .map(|table| {
                    table
                        .key_schema()
                        .iter()
                        .map(|element| element.attribute_name().to_string())
                        .collect()
                })
                .unwrap_or_default();

            if key_schema.is_empty() {
                return Err(Error::MissingKeySchema(table_name.to_string()));
            }

            Ok(key_schema)
        }
    }

    fn scan(&self, request: &ScanRequest) -> BoxStream<'static, Result<Page, Error>> {
        self.client
            .scan()
            .table_name(&request.table_name)
            .set_filter_expression(request.filter_expression.clone())
            .set_expression_attribute_values(request.expression_attribute_values.clone())
            .set_limit(request.page_size)
            .into_paginator()
            .send()
            .into_stream_03x()
            .map_ok(Page::from)
            .map_err(Error::from)
            .boxed()
    }

    fn batch_write(
        &self,
        table_name: &str,
        requests: &[WriteRequest],
    ) -> impl Future<Output = Result<Vec<WriteRequest>, Error>> + Send {
        let builder = self
            .client
            .batch_write_item()
            .request_items(table_name, requests.to_vec());

        async move {
            let output = builder.send().await?;

            Ok(output
                .unprocessed_items
                .map(|unprocessed| unprocessed.into_values().flatten().collect())
                .unwrap_or_default())
        }
    }
}
