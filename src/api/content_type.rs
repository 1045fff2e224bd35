//! Content types and response encoding negotiation.

use std::fmt;

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_PROTOBUF: &str = "application/x-protobuf";
pub const APPLICATION_RECORDIO_JSON: &str = "application/recordio+json";
pub const APPLICATION_RECORDIO_PROTOBUF: &str = "application/recordio+protobuf";

/// Body encoding of an API request or response.
///
/// The streaming variants mean the body is a concatenation of
/// independently-framed records of the same schema, not one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    Protobuf,
    StreamingJson,
    StreamingProtobuf,
}

impl ContentType {
    /// Parse a `Content-Type` header value; parameters after `;` are ignored.
    pub fn from_media_type(value: &str) -> Option<Self> {
        let media_type = value.split(';').next().unwrap_or("").trim();
        match media_type {
            APPLICATION_JSON => Some(ContentType::Json),
            APPLICATION_PROTOBUF => Some(ContentType::Protobuf),
            APPLICATION_RECORDIO_JSON => Some(ContentType::StreamingJson),
            APPLICATION_RECORDIO_PROTOBUF => Some(ContentType::StreamingProtobuf),
            _ => None,
        }
    }

    pub fn as_media_type(&self) -> &'static str {
        match self {
            ContentType::Json => APPLICATION_JSON,
            ContentType::Protobuf => APPLICATION_PROTOBUF,
            ContentType::StreamingJson => APPLICATION_RECORDIO_JSON,
            ContentType::StreamingProtobuf => APPLICATION_RECORDIO_PROTOBUF,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, ContentType::StreamingJson | ContentType::StreamingProtobuf)
    }

    /// The schema used for each individual record of a body in this
    /// content type. Identity for the non-streaming variants.
    pub fn record_type(&self) -> ContentType {
        match self {
            ContentType::StreamingJson => ContentType::Json,
            ContentType::StreamingProtobuf => ContentType::Protobuf,
            other => *other,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_media_type())
    }
}

/// Select the response encoding from an `Accept` header.
///
/// Candidates are tested in strict precedence order: streaming protobuf,
/// streaming json, json, protobuf. A missing header accepts anything, per
/// HTTP semantics. Returns `None` when no supported encoding is acceptable.
pub fn negotiate_accept(accept: Option<&str>) -> Option<ContentType> {
    const PRECEDENCE: [ContentType; 4] = [
        ContentType::StreamingProtobuf,
        ContentType::StreamingJson,
        ContentType::Json,
        ContentType::Protobuf,
    ];

    PRECEDENCE
        .into_iter()
        .find(|candidate| accepts(accept, candidate.as_media_type()))
}

/// Whether the `Accept` header value admits the given media type,
/// honoring `*/*` and `type/*` ranges. Quality parameters are ignored.
fn accepts(accept: Option<&str>, media_type: &str) -> bool {
    let header = match accept {
        Some(header) => header,
        None => return true,
    };

    let (kind, subkind) = match media_type.split_once('/') {
        Some(parts) => parts,
        None => return false,
    };

    header.split(',').any(|range| {
        let range = range.split(';').next().unwrap_or("").trim();
        match range.split_once('/') {
            Some(("*", "*")) => true,
            Some((r_kind, "*")) => r_kind == kind,
            Some((r_kind, r_subkind)) => r_kind == kind && r_subkind == subkind,
            None => false,
        }
    })
}
