use thiserror::Error;

/// Top-level error type for the kubegraph platform.
#[derive(Error, Debug)]
pub enum KubegraphError {
    #[error("Unknown entity kind: {0}")]
    UnknownKind(String),

    #[error("Invalid timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}
