//! Error types for topology assembly and the emulated pipeline runtime.
//!
//! Every fallible operation in this crate returns [`Result`], whose error side
//! is the single [`Error`] enum below. Assembly-time errors
//! ([`Error::Configuration`], [`Error::GrantComputation`],
//! [`Error::Provisioning`]) are fatal to the whole assembly. The remaining
//! variants are raised by the in-process store, stream and frontend.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the change-capture pipeline.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A required precondition is missing or malformed. Raised before any
    /// resource is created.
    #[error("Configuration error: {reason}\n{remediation}")]
    Configuration { reason: String, remediation: String },

    /// A wiring edge has no entry in the permission rule table, or references
    /// a resource that is not part of the topology.
    #[error("No grant rule for principal `{principal}` as {role} on {kind} `{resource}`")]
    GrantComputation {
        principal: String,
        role: String,
        resource: String,
        kind: String,
    },

    /// The platform rejected a resource. Surfaced as is, never retried.
    #[error("Provisioning of `{resource}` failed: {reason}")]
    Provisioning { resource: String, reason: String },

    /// A principal attempted an action it holds no grant for.
    #[error("`{principal}` is not authorized to perform `{action}` on `{resource}`")]
    AccessDenied {
        principal: String,
        action: String,
        resource: String,
    },

    /// The target group has no member eligible for traffic.
    #[error("No healthy targets in `{target_group}`")]
    NoHealthyTargets { target_group: String },

    /// The target is not registered with the target group.
    #[error("Unknown target `{target}`")]
    UnknownTarget { target: String },

    /// No item exists under the requested key.
    #[error("Item not found: {key}")]
    ItemNotFound { key: String },

    /// The item does not satisfy the store's key schema.
    #[error("Invalid item: {reason}")]
    InvalidItem { reason: String },

    /// A change stream is already attached to the record store.
    #[error("Record store `{store}` already captures into `{stream}`")]
    StreamAlreadyAttached { store: String, stream: String },

    /// The shard does not exist in the change stream.
    #[error("Unknown shard `{shard}`")]
    UnknownShard { shard: String },

    /// The iterator points at records already trimmed by retention.
    #[error("Iterator for shard `{shard}` at sequence {sequence} has expired")]
    ExpiredIterator { shard: String, sequence: u64 },

    /// A stream record payload is not a change record.
    #[error("Malformed record {sequence} in shard `{shard}`: {reason}")]
    MalformedRecord {
        shard: String,
        sequence: u64,
        reason: String,
    },

    /// The healthy status code specification could not be parsed.
    #[error("Invalid healthy code specification `{spec}`: {reason}")]
    InvalidHealthCodes { spec: String, reason: String },
}

impl Error {
    pub(crate) fn configuration(reason: impl Into<String>, remediation: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
            remediation: remediation.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_carries_remediation() {
        let err = Error::configuration("CERT_ARN is not set", "export CERT_ARN=...");
        let rendered = err.to_string();
        assert!(rendered.contains("CERT_ARN is not set"));
        assert!(rendered.contains("export CERT_ARN=..."));
    }

    #[test]
    fn error_display_variants() {
        let errors = vec![
            Error::GrantComputation {
                principal: "p".into(),
                role: "ingest".into(),
                resource: "r".into(),
                kind: "change-stream".into(),
            },
            Error::Provisioning {
                resource: "Table".into(),
                reason: "limit exceeded".into(),
            },
            Error::AccessDenied {
                principal: "p".into(),
                action: "store:GetItem".into(),
                resource: "Table".into(),
            },
            Error::NoHealthyTargets {
                target_group: "tg".into(),
            },
            Error::UnknownTarget { target: "t".into() },
            Error::ItemNotFound { key: "k".into() },
            Error::InvalidItem { reason: "r".into() },
            Error::StreamAlreadyAttached {
                store: "s".into(),
                stream: "k".into(),
            },
            Error::UnknownShard { shard: "0".into() },
            Error::ExpiredIterator {
                shard: "0".into(),
                sequence: 4,
            },
            Error::MalformedRecord {
                shard: "0".into(),
                sequence: 1,
                reason: "eof".into(),
            },
            Error::InvalidHealthCodes {
                spec: "x".into(),
                reason: "y".into(),
            },
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
