//! Error types for the change feed service.
//!
//! The `Error` enum covers failures of the service layer itself and wraps
//! errors raised by the pipeline runtime. `From<Error>` for `tonic::Status`
//! picks the gRPC code a client sees, which in turn decides whether a
//! frontend counts the answer as healthy.
//!
//! ## Error Cases
//! - `Pipeline`: The record store, change stream or frontend failed.
//! - `Serialization`: A broadcast body could not be rendered.
//! - `ServiceShutdown`: A request arrived while the service was shutting down.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the change feed service.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// Failure inside the pipeline runtime.
    #[error(transparent)]
    Pipeline(#[from] changefeed::Error),

    /// A broadcast body could not be serialized.
    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization {
            reason: err.to_string(),
        }
    }
}

fn pipeline_status(err: changefeed::Error) -> Status {
    use changefeed::Error as E;

    let message = err.to_string();
    match err {
        E::Configuration { .. } => Status::failed_precondition(message),
        E::GrantComputation { .. } => Status::internal(message),
        E::Provisioning { .. } => Status::unavailable(message),
        E::AccessDenied { .. } => Status::permission_denied(message),
        E::NoHealthyTargets { .. } => Status::unavailable(message),
        E::UnknownTarget { .. } | E::ItemNotFound { .. } | E::UnknownShard { .. } => {
            Status::not_found(message)
        }
        E::InvalidItem { .. } | E::InvalidHealthCodes { .. } => Status::invalid_argument(message),
        E::StreamAlreadyAttached { .. } => Status::already_exists(message),
        E::ExpiredIterator { .. } => Status::out_of_range(message),
        E::MalformedRecord { .. } => Status::data_loss(message),
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Pipeline(e) => pipeline_status(e),
            Error::Serialization { reason } => {
                Status::internal(format!("Serialization error: {}", reason))
            }
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
