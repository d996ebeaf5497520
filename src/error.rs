use aws_credential_types::provider::error::CredentialsError;
use aws_sdk_dynamodb::error::{BuildError, ProvideErrorMetadata};
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemError;
use aws_sdk_dynamodb::operation::describe_table::DescribeTableError;
use aws_sdk_dynamodb::operation::scan::ScanError;
use aws_sdk_sts::operation::assume_role::AssumeRoleError;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use serde_json::Error as JsonError;
use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;
use tokio::sync::AcquireError;
use tokio::task::JoinError;

type DynamoScanError = SdkError<ScanError, Response>;
type DynamoDescribeTableError = SdkError<DescribeTableError, Response>;
type DynamoBatchWriteItemError = SdkError<BatchWriteItemError, Response>;
type StsAssumeRoleError = SdkError<AssumeRoleError, Response>;

/// Throttling-class codes BatchWriteItem has no typed variant for
const RETRYABLE_CODES: [&str; 3] = [
    "ThrottlingException",
    "ServiceUnavailable",
    "LimitExceededException",
];

/// Error returned by session resolution and the bulk write pipeline
#[derive(Debug)]
pub enum Error {
    /// Invalid or missing configuration (flags, files, settings)
    Config(String),
    /// No credential provider could produce credentials
    Credentials(CredentialsError),
    /// A DynamoDB typed-JSON value could not be converted into an attribute value
    InvalidAttributeValue(String),
    /// JSON decoding error
    Json(JsonError),
    /// I/O error
    Io(IoError),
    /// A scanned item lacks one of the table's key attributes
    MissingKeyAttribute(String),
    /// DescribeTable returned no key schema for the table
    MissingKeySchema(String),
    /// A batch still had unprocessed items when the attempt ceiling was reached
    RetryExhausted {
        /// Number of write calls made for the batch
        attempts: usize,
        /// Number of write requests the store never accepted
        unprocessed: usize,
    },
    /// DynamoDB request builder error
    BuildError(BuildError),
    /// DynamoDB Scan operation error
    DynamoScanError(DynamoScanError),
    /// DynamoDB DescribeTable operation error
    DynamoDescribeTableError(DynamoDescribeTableError),
    /// DynamoDB BatchWriteItem operation error
    DynamoBatchWriteItemError(DynamoBatchWriteItemError),
    /// STS AssumeRole operation error
    StsAssumeRoleError(StsAssumeRoleError),
    /// A page-worker task panicked or was cancelled
    Join(JoinError),
    /// The worker pool's semaphore was closed
    Acquire(AcquireError),
}

impl Error {
    /// Check if the error is transient and the failed batch should be resubmitted
    ///
    /// Timeouts, dispatch failures, unparseable responses and throttling-class
    /// service errors are retryable. Everything else (validation errors,
    /// missing tables, access denied) is fatal for the run.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::DynamoBatchWriteItemError(e) => match e {
                SdkError::TimeoutError(_)
                | SdkError::DispatchFailure(_)
                | SdkError::ResponseError(_) => true,
                SdkError::ServiceError(_) => match e.as_service_error() {
                    Some(
                        BatchWriteItemError::ProvisionedThroughputExceededException(_)
                        | BatchWriteItemError::RequestLimitExceeded(_)
                        | BatchWriteItemError::InternalServerError(_),
                    ) => true,
                    _ => e
                        .code()
                        .is_some_and(|code| RETRYABLE_CODES.contains(&code)),
                },
                _ => false,
            },
            _ => false,
        }
    }

    /// Check if the error came from credential resolution
    pub fn is_credentials_error(&self) -> bool {
        matches!(self, Error::Credentials(_))
    }

    /// Check if the error is a DynamoDB-related error
    pub fn is_dynamodb_error(&self) -> bool {
        matches!(
            self,
            Error::BuildError(_)
                | Error::DynamoScanError(_)
                | Error::DynamoDescribeTableError(_)
                | Error::DynamoBatchWriteItemError(_)
        )
    }
}

macro_rules! impl_from_error {
    ($name:ident, $variant:ident) => {
        impl From<$name> for Error {
            fn from(e: $name) -> Self {
                Error::$variant(e)
            }
        }
    };
    ($name:ident) => {
        impl From<$name> for Error {
            fn from(e: $name) -> Self {
                Error::$name(e)
            }
        }
    };
}

impl_from_error!(CredentialsError, Credentials);
impl_from_error!(JsonError, Json);
impl_from_error!(IoError, Io);
impl_from_error!(JoinError, Join);
impl_from_error!(AcquireError, Acquire);
impl_from_error!(BuildError);
impl_from_error!(DynamoScanError);
impl_from_error!(DynamoDescribeTableError);
impl_from_error!(DynamoBatchWriteItemError);
impl_from_error!(StsAssumeRoleError);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::Credentials(e) => write!(f, "unable to resolve AWS credentials: {}", e),
            Error::InvalidAttributeValue(msg) => {
                write!(f, "invalid DynamoDB attribute value: {}", msg)
            }
            Error::Json(e) => write!(f, "JSON error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::MissingKeyAttribute(name) => {
                write!(f, "item is missing key attribute '{}'", name)
            }
            Error::MissingKeySchema(table) => {
                write!(f, "no key schema returned for table '{}'", table)
            }
            Error::RetryExhausted {
                attempts,
                unprocessed,
            } => write!(
                f,
                "batch write gave up after {} attempts with {} unprocessed items",
                attempts, unprocessed
            ),
            Error::BuildError(e) => write!(f, "DynamoDB request builder error: {}", e),
            Error::DynamoScanError(e) => {
                write!(f, "DynamoDB Scan operation failed: {}", e)
            }
            Error::DynamoDescribeTableError(e) => {
                write!(f, "DynamoDB DescribeTable operation failed: {}", e)
            }
            Error::DynamoBatchWriteItemError(e) => {
                write!(f, "DynamoDB BatchWriteItem operation failed: {}", e)
            }
            Error::StsAssumeRoleError(e) => write!(f, "STS AssumeRole operation failed: {}", e),
            Error::Join(e) => write!(f, "page worker failed: {}", e),
            Error::Acquire(e) => write!(f, "worker pool closed: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Credentials(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::BuildError(e) => Some(e),
            Error::DynamoScanError(e) => Some(e),
            Error::DynamoDescribeTableError(e) => Some(e),
            Error::DynamoBatchWriteItemError(e) => Some(e),
            Error::StsAssumeRoleError(e) => Some(e),
            Error::Join(e) => Some(e),
            Error::Acquire(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::error::ErrorMetadata;
    use aws_sdk_dynamodb::types::error::{
        ProvisionedThroughputExceededException, ResourceNotFoundException,
    };
    use aws_smithy_runtime_api::http::StatusCode;
    use aws_smithy_types::body::SdkBody;

    fn service_error(err: BatchWriteItemError) -> Error {
        let raw = Response::new(StatusCode::try_from(400u16).unwrap(), SdkBody::empty());
        Error::DynamoBatchWriteItemError(SdkError::service_error(err, raw))
    }

    fn coded(code: &str) -> Error {
        service_error(BatchWriteItemError::generic(
            ErrorMetadata::builder().code(code).message("test").build(),
        ))
    }

    #[test]
    fn test_throughput_exceeded_is_retryable() {
        let typed = service_error(BatchWriteItemError::ProvisionedThroughputExceededException(
            ProvisionedThroughputExceededException::builder()
                .message("slow down")
                .build(),
        ));
        assert!(typed.is_retryable());
        assert!(coded("ProvisionedThroughputExceededException").is_retryable());
    }

    #[test]
    fn test_throttling_codes_are_retryable() {
        for code in ["ThrottlingException", "ServiceUnavailable", "LimitExceededException"] {
            assert!(coded(code).is_retryable(), "{code}");
        }
    }

    #[test]
    fn test_validation_error_is_fatal() {
        assert!(!coded("ValidationException").is_retryable());
        assert!(!coded("AccessDeniedException").is_retryable());

        let missing = service_error(BatchWriteItemError::ResourceNotFoundException(
            ResourceNotFoundException::builder().message("no table").build(),
        ));
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = Error::DynamoBatchWriteItemError(SdkError::timeout_error("slow"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_construction_failure_is_not_retryable() {
        let err = Error::DynamoBatchWriteItemError(SdkError::construction_failure("bad input"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_scan_error_is_not_retryable() {
        let err = Error::DynamoScanError(SdkError::timeout_error("slow"));
        assert!(!err.is_retryable());
        assert!(err.is_dynamodb_error());
    }

    #[test]
    fn test_retry_exhausted_display() {
        let err = Error::RetryExhausted {
            attempts: 3,
            unprocessed: 7,
        };
        assert_eq!(
            err.to_string(),
            "batch write gave up after 3 attempts with 7 unprocessed items"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_conversion() {
        let build_err = BuildError::other("test");
        let err: Error = build_err.into();
        assert!(matches!(err, Error::BuildError(_)));
        assert!(err.is_dynamodb_error());
    }

    #[test]
    fn test_credentials_error_conversion() {
        let err: Error = CredentialsError::not_loaded("nothing configured").into();
        assert!(err.is_credentials_error());
        assert!(!err.is_dynamodb_error());
    }
}
