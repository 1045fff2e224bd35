//! Record relay pump.
//!
//! # Responsibilities
//! - Move records one at a time from a typed source into a pipe sink
//! - Apply an injected transform between read and write
//! - Settle the sink exactly once on EOF, failure, or discard
//!
//! The pump is an explicit iterative loop: read, transform, write, await the
//! write acknowledgment, read again. At most one record is in flight, so a
//! slow consumer stalls the producer instead of growing a buffer.

use bytes::Bytes;
use thiserror::Error;

use super::pipe::Writer;
use super::recordio::{RecordError, RecordReader};

/// Terminal outcome of a relay that did not finish cleanly.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Read(#[from] RecordError),

    #[error("failed to transform record: {0}")]
    Transform(String),

    #[error("relay sink closed by its reader")]
    SinkClosed,
}

/// Pump every record from `source` through `transform` into `sink`.
///
/// On clean EOF the sink is closed; on any read, transform, or write failure
/// the sink is failed with the error. The sink is consumed, so it is settled
/// on every path (a dropped pump surfaces as a discard failure downstream).
pub async fn pump<T, F>(
    mut source: RecordReader<T>,
    transform: F,
    mut sink: Writer,
) -> Result<(), RelayError>
where
    F: Fn(T) -> Result<Bytes, String> + Send,
{
    loop {
        match source.read().await {
            Ok(Some(record)) => {
                let frame = match transform(record) {
                    Ok(frame) => frame,
                    Err(message) => {
                        sink.fail(message.clone());
                        return Err(RelayError::Transform(message));
                    }
                };

                if sink.write(frame).await.is_err() {
                    // The downstream reader is gone; nothing left to settle.
                    return Err(RelayError::SinkClosed);
                }
            }
            Ok(None) => {
                sink.close();
                return Ok(());
            }
            Err(error) => {
                sink.fail(error.to_string());
                return Err(error.into());
            }
        }
    }
}
