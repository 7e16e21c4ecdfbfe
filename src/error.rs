//! Error taxonomy for line ingestion and transports
//!
//! Parse and transport errors are handled where they occur. Subscribers only
//! ever see valid, diffed move events.

use std::io;

use thiserror::Error;

/// A device line that could not be decoded into slider readings.
///
/// Logged and dropped by the controller; ingestion continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedLineError {
    #[error("empty line")]
    Empty,

    #[error("field {index} is not a non-negative number: {field:?}")]
    InvalidField { index: usize, field: String },
}

/// Connection or listener failure of a line source.
///
/// Triggers teardown of the active transport; the controller goes back to idle.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {address}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind local endpoint {address}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("read from transport failed")]
    Read(#[source] io::Error),

    #[error("local endpoint stopped serving")]
    Serve(#[source] io::Error),

    #[error("line consumer closed")]
    Closed,
}

/// Errors returned by the bridge controller's public API.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge is already running")]
    AlreadyRunning,
}
