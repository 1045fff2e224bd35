//! Record framing for streaming bodies.
//!
//! # Responsibilities
//! - Encode one serialized message into a self-delimiting frame
//! - Split a raw chunk stream back into frames, incrementally
//! - Layer a typed record reader over a pipe and a deserializer
//!
//! Wire format: `<decimal length>\n<payload>`. Frames are self-delimiting so
//! a streaming body is simply a concatenation of frames of the same schema.

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::pipe::{PipeError, Reader};

/// Largest accepted record, guarding against absurd length headers.
const MAX_RECORD_LENGTH: usize = 4 * 1024 * 1024;

/// Frame decoding failure. Once a decoder fails it stays failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed record length: {0:?}")]
    MalformedLength(String),

    #[error("record length {0} exceeds maximum {MAX_RECORD_LENGTH}")]
    ExcessiveLength(u64),

    #[error("stream ended inside a record")]
    Truncated,

    #[error("decoder previously failed")]
    Failed,
}

/// Encode one payload into a self-delimiting frame.
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let header = payload.len().to_string();
    let mut frame = BytesMut::with_capacity(header.len() + 1 + payload.len());
    frame.put_slice(header.as_bytes());
    frame.put_u8(b'\n');
    frame.put_slice(payload);
    frame.freeze()
}

#[derive(Clone, Copy)]
enum DecoderState {
    /// Accumulating decimal length digits until the `\n` delimiter.
    Header,
    /// Accumulating `remaining` payload bytes.
    Record { remaining: usize },
    Failed,
}

/// Incremental frame decoder.
///
/// Feed raw chunks in arrival order; each call returns the frames completed
/// by that chunk. Restartable only from the start of a stream.
pub struct FrameDecoder {
    state: DecoderState,
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Header,
            buffer: BytesMut::new(),
        }
    }

    /// True when the decoder sits exactly on a frame boundary.
    pub fn at_boundary(&self) -> bool {
        matches!(self.state, DecoderState::Header) && self.buffer.is_empty()
    }

    /// Feed one chunk, returning any frames it completed.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, DecodeError> {
        if matches!(self.state, DecoderState::Failed) {
            return Err(DecodeError::Failed);
        }

        let mut frames = Vec::new();
        let mut input = chunk;

        while !input.is_empty() {
            match self.state {
                DecoderState::Header => match input.iter().position(|b| *b == b'\n') {
                    Some(at) => {
                        self.buffer.extend_from_slice(&input[..at]);
                        input = &input[at + 1..];
                        let remaining = self.parse_header()?;
                        if remaining == 0 {
                            frames.push(Bytes::new());
                        } else {
                            self.state = DecoderState::Record { remaining };
                        }
                    }
                    None => {
                        self.buffer.extend_from_slice(input);
                        input = &[];
                    }
                },
                DecoderState::Record { remaining } => {
                    let take = remaining.min(input.len());
                    self.buffer.extend_from_slice(&input[..take]);
                    input = &input[take..];

                    if take == remaining {
                        frames.push(self.buffer.split().freeze());
                        self.state = DecoderState::Header;
                    } else {
                        self.state = DecoderState::Record {
                            remaining: remaining - take,
                        };
                    }
                }
                DecoderState::Failed => unreachable!("checked on entry"),
            }
        }

        Ok(frames)
    }

    fn parse_header(&mut self) -> Result<usize, DecodeError> {
        let header = self.buffer.split();

        let text = std::str::from_utf8(&header)
            .map_err(|_| self.fail_malformed(&header))?;
        let length: u64 = text
            .parse()
            .map_err(|_| self.fail_malformed(&header))?;

        if length > MAX_RECORD_LENGTH as u64 {
            self.state = DecoderState::Failed;
            return Err(DecodeError::ExcessiveLength(length));
        }

        Ok(length as usize)
    }

    fn fail_malformed(&mut self, header: &[u8]) -> DecodeError {
        self.state = DecoderState::Failed;
        DecodeError::MalformedLength(String::from_utf8_lossy(header).into_owned())
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Failure while reading typed records from a stream.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Frame(#[from] DecodeError),

    #[error(transparent)]
    Pipe(#[from] PipeError),

    #[error("failed to deserialize record: {0}")]
    Deserialize(String),
}

/// Lazy typed record source over a pipe reader.
///
/// Yields one decoded record at a time; the next chunk is only pulled from
/// the pipe once the buffered frames are drained.
pub struct RecordReader<T> {
    reader: Reader,
    decoder: FrameDecoder,
    pending: VecDeque<Bytes>,
    #[allow(clippy::type_complexity)]
    deserialize: Box<dyn Fn(&[u8]) -> Result<T, String> + Send>,
    eof: bool,
}

impl<T> RecordReader<T> {
    pub fn new(
        reader: Reader,
        deserialize: impl Fn(&[u8]) -> Result<T, String> + Send + 'static,
    ) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            deserialize: Box::new(deserialize),
            eof: false,
        }
    }

    /// Read the next record. `Ok(None)` is a clean end-of-stream.
    pub async fn read(&mut self) -> Result<Option<T>, RecordError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return (self.deserialize)(&frame)
                    .map(Some)
                    .map_err(RecordError::Deserialize);
            }

            if self.eof {
                return Ok(None);
            }

            match self.reader.read().await {
                Some(Ok(chunk)) => {
                    self.pending.extend(self.decoder.decode(&chunk)?);
                }
                Some(Err(error)) => return Err(error.into()),
                None => {
                    self.eof = true;
                    if !self.decoder.at_boundary() {
                        return Err(DecodeError::Truncated.into());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::pipe::pipe;

    fn encode_all(records: &[&[u8]]) -> Bytes {
        let mut body = BytesMut::new();
        for record in records {
            body.extend_from_slice(&encode_frame(record));
        }
        body.freeze()
    }

    #[test]
    fn encode_produces_length_prefixed_frame() {
        assert_eq!(encode_frame(b"hello"), Bytes::from_static(b"5\nhello"));
        assert_eq!(encode_frame(b""), Bytes::from_static(b"0\n"));
    }

    #[test]
    fn round_trip_preserves_record_sequences() {
        for records in [
            vec![],
            vec![b"one".as_slice()],
            vec![b"one".as_slice(), b"".as_slice(), b"three\nwith\nnewlines".as_slice()],
        ] {
            let body = encode_all(&records);
            let mut decoder = FrameDecoder::new();
            let frames = decoder.decode(&body).unwrap();
            assert_eq!(
                frames.iter().map(|f| f.as_ref()).collect::<Vec<_>>(),
                records
            );
            assert!(decoder.at_boundary());
        }
    }

    #[test]
    fn decoding_survives_arbitrary_chunking() {
        let body = encode_all(&[b"alpha", b"beta", b"gamma"]);

        for chunk_size in 1..=body.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = Vec::new();
            for chunk in body.chunks(chunk_size) {
                frames.extend(decoder.decode(chunk).unwrap());
            }
            assert_eq!(frames.len(), 3);
            assert_eq!(frames[2], Bytes::from_static(b"gamma"));
        }
    }

    #[test]
    fn malformed_length_fails_and_stays_failed() {
        let mut decoder = FrameDecoder::new();
        assert!(matches!(
            decoder.decode(b"5x\nhello"),
            Err(DecodeError::MalformedLength(_))
        ));
        assert_eq!(decoder.decode(b"5\nhello"), Err(DecodeError::Failed));
    }

    #[test]
    fn excessive_length_is_rejected() {
        let mut decoder = FrameDecoder::new();
        assert!(matches!(
            decoder.decode(b"99999999999\n"),
            Err(DecodeError::ExcessiveLength(_))
        ));
    }

    #[tokio::test]
    async fn record_reader_yields_typed_records_then_eof() {
        let (mut writer, reader) = pipe();
        let mut records = RecordReader::new(reader, |bytes| {
            String::from_utf8(bytes.to_vec()).map_err(|e| e.to_string())
        });

        let body = encode_all(&[b"first", b"second"]);
        writer.write(body).await.unwrap();
        writer.close();

        assert_eq!(records.read().await.unwrap(), Some("first".to_string()));
        assert_eq!(records.read().await.unwrap(), Some("second".to_string()));
        assert_eq!(records.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn eof_inside_a_record_is_an_error() {
        let (mut writer, reader) = pipe();
        let mut records: RecordReader<String> =
            RecordReader::new(reader, |bytes| {
                String::from_utf8(bytes.to_vec()).map_err(|e| e.to_string())
            });

        writer.write(Bytes::from_static(b"10\npart")).await.unwrap();
        writer.close();

        assert!(matches!(
            records.read().await,
            Err(RecordError::Frame(DecodeError::Truncated))
        ));
    }
}
