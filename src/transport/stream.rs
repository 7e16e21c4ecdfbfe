//! Persistent stream transport
//!
//! Holds a long-lived read/write connection to the device (or a device proxy)
//! and forwards every newline-terminated line it reads.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::{Line, LineSender, LineSource};
use crate::error::TransportError;
use crate::slider::strip_line_terminator;

/// Longest accepted line, terminator included. Longer lines are discarded.
pub const MAX_LINE_BYTES: u64 = 1024;

/// Any bidirectional byte stream the source can own
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

enum Target {
    Connect(String),
    Attached(Box<dyn ByteStream>),
}

pub struct StreamLineSource {
    name: String,
    target: Target,
}

impl StreamLineSource {
    /// Connect to `address` (`host:port`) when the bridge starts
    pub fn connect(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            name: format!("stream:{}", address),
            target: Target::Connect(address),
        }
    }

    /// Use an already-open stream
    pub fn attached(stream: impl ByteStream + 'static) -> Self {
        Self {
            name: "stream:attached".to_string(),
            target: Target::Attached(Box::new(stream)),
        }
    }

    async fn open(target: Target) -> Result<Box<dyn ByteStream>, TransportError> {
        match target {
            Target::Connect(address) => {
                info!("Connecting to slider device at {}", address);
                let stream = TcpStream::connect(&address)
                    .await
                    .map_err(|source| TransportError::Connect { address, source })?;
                Ok(Box::new(stream))
            }
            Target::Attached(stream) => Ok(stream),
        }
    }
}

#[async_trait]
impl LineSource for StreamLineSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(self: Box<Self>, lines: LineSender) -> Result<(), TransportError> {
        let this = *self;
        let stream = Self::open(this.target).await?;
        info!("{} connected", this.name);

        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        // Set while skipping the rest of an overlong line
        let mut discarding = false;
        loop {
            buf.clear();
            let read = (&mut reader)
                .take(MAX_LINE_BYTES)
                .read_until(b'\n', &mut buf)
                .await
                .map_err(TransportError::Read)?;
            if read == 0 {
                info!("{} closed by peer", this.name);
                return Ok(());
            }

            let overlong = read as u64 == MAX_LINE_BYTES && buf.last() != Some(&b'\n');
            if overlong || discarding {
                if overlong && !discarding {
                    warn!(
                        "{} sent a line longer than {} bytes, discarding it",
                        this.name, MAX_LINE_BYTES
                    );
                }
                discarding = overlong;
                continue;
            }

            // Garbage bytes become a malformed line, not a dead connection
            let text = String::from_utf8_lossy(&buf);
            let line = strip_line_terminator(&text).to_string();
            debug!("{} line: {:?}", this.name, line);

            if lines.send(Line::new(line)).await.is_err() {
                return Err(TransportError::Closed);
            }
        }
    }
}
