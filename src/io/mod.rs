//! Streaming I/O primitives.
//!
//! # Data Flow
//! ```text
//! client request body
//!     → pipe.rs (duplex byte channel, exactly-once close/fail)
//!     → recordio.rs (frame decoding, typed record reader)
//!     → relay.rs (one-record-at-a-time pump with injected transform)
//!     → pipe.rs (outbound channel)
//!     → client response body / switchboard connection
//! ```

pub mod pipe;
pub mod recordio;
pub mod relay;

pub use pipe::{pipe, PipeError, Reader, Writer};
pub use recordio::{encode_frame, FrameDecoder, RecordError, RecordReader};
pub use relay::{pump, RelayError};
