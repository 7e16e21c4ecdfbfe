//! Line sources - transports delivering device lines to the controller
//!
//! Two interchangeable variants feed the same line channel:
//! - `StreamLineSource`: a persistent byte stream, read line by line
//! - `HttpLineSource`: a local `POST /serial` endpoint, one line per request
//!
//! Both strip the line terminator before handing a line over.

pub mod http;
pub mod stream;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::TransportError;

pub use http::HttpLineSource;
pub use stream::StreamLineSource;

/// Sending half of the controller's line channel
pub type LineSender = mpsc::Sender<Line>;

/// Receiving half, owned by the controller loop
pub type LineReceiver = mpsc::Receiver<Line>;

/// One device line on its way to the controller loop
#[derive(Debug)]
pub struct Line {
    text: String,
    receipt: Option<oneshot::Sender<()>>,
}

impl Line {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            receipt: None,
        }
    }

    /// A line whose sender wants to know when the controller has taken it.
    ///
    /// The receiver resolves with `Ok` once the loop takes the line for
    /// processing, and with `Err` if the line is dropped unprocessed.
    pub fn with_receipt(text: impl Into<String>) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let line = Self {
            text: text.into(),
            receipt: Some(tx),
        };
        (line, rx)
    }

    /// Take the line for processing, confirming receipt to its sender
    pub fn accept(self) -> String {
        if let Some(receipt) = self.receipt {
            let _ = receipt.send(());
        }
        self.text
    }
}

/// A transport delivering device lines into the controller's line channel.
///
/// Each variant strips the line terminator before sending, and returns the
/// transport error that ends it.
#[async_trait]
pub trait LineSource: Send + 'static {
    fn name(&self) -> &str;

    async fn run(self: Box<Self>, lines: LineSender) -> Result<(), TransportError>;
}
