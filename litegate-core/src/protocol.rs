//! Wire codec
//!
//! Every message on the socket is one *frame*: a MessagePack payload,
//! base64-encoded (standard alphabet, padded) and terminated by `\n`. The
//! base64 alphabet never contains a newline, so a reader can split the
//! stream on `\n` without looking inside the payload.
//!
//! ```text
//! +-------------------------------------+------+
//! | base64( msgpack( envelope ) )       | '\n' |
//! +-------------------------------------+------+
//! ```
//!
//! The first frame a client sends is special: its payload is the raw
//! credential bytes, not MessagePack. Every later client frame is a
//! [`Request`]. The server answers each frame with exactly one [`Response`],
//! laid out on the wire as
//!
//! ```text
//! { "status_code": 1, "content": [ {col: value, ...}, ... ] }   rows
//! { "status_code": 1, "content": nil }                           handshake accepted
//! { "status_code": 0, "content": [ kind, message ] }             failure
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{CodecError, CodecResult, ErrorKind};
use crate::value::{Map, Row, Value};

/// Frame terminator
pub const FRAME_DELIMITER: u8 = b'\n';

const STATUS_FAILURE: u8 = 0;
const STATUS_SUCCESS: u8 = 1;

/// A statement with its bound parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub statement: String,
    pub positional_args: Vec<Value>,
    pub keyword_args: Map,
}

impl Request {
    /// Creates a request without parameters
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            ..Default::default()
        }
    }

    /// Appends a positional argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional_args.push(value.into());
        self
    }

    /// Sets a keyword argument
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword_args.insert(name, value);
        self
    }
}

/// Server reply to one frame
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Handshake succeeded
    Accepted,
    /// Statement succeeded, with its rows (possibly none)
    Rows(Vec<Row>),
    /// Anything failed
    Error { kind: String, message: String },
}

impl Response {
    /// Creates a failure response with a known kind
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind: kind.as_str().to_string(),
            message: message.into(),
        }
    }

    /// The response sent when an authenticated frame cannot be decoded
    pub fn bad_request() -> Self {
        Self::error(ErrorKind::BadRequest, "Unable to deserialize data.")
    }

    /// The response sent before closing an unauthenticated connection
    pub fn authentication_failed() -> Self {
        Self::error(ErrorKind::IntegrityError, "Authentication Failed.")
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Response::Error { .. })
    }

    /// Wire status code: 1 for success, 0 for failure
    pub fn status_code(&self) -> u8 {
        if self.is_success() {
            STATUS_SUCCESS
        } else {
            STATUS_FAILURE
        }
    }
}

impl From<crate::error::StoreError> for Response {
    fn from(err: crate::error::StoreError) -> Self {
        Response::error(err.kind, err.message)
    }
}

// ---------------------------------------------------------------------------
// Response wire layout
// ---------------------------------------------------------------------------

enum Content<'a> {
    Empty,
    Rows(&'a [Row]),
    Failure(&'a str, &'a str),
}

impl Serialize for Content<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Content::Empty => serializer.serialize_unit(),
            Content::Rows(rows) => rows.serialize(serializer),
            Content::Failure(kind, message) => [*kind, *message].serialize(serializer),
        }
    }
}

#[derive(Serialize)]
struct WireResponseRef<'a> {
    status_code: u8,
    content: Content<'a>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireResponse {
    status_code: u8,
    content: Value,
}

impl TryFrom<WireResponse> for Response {
    type Error = CodecError;

    fn try_from(wire: WireResponse) -> CodecResult<Self> {
        match (wire.status_code, wire.content) {
            (STATUS_SUCCESS, Value::Null) => Ok(Response::Accepted),
            (STATUS_SUCCESS, Value::Sequence(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::Map(row) => Ok(row),
                    other => Err(CodecError::malformed(format!(
                        "expected row map, found {}",
                        other.type_name()
                    ))),
                })
                .collect::<CodecResult<Vec<Row>>>()
                .map(Response::Rows),
            (STATUS_FAILURE, Value::Sequence(items)) => match <[Value; 2]>::try_from(items) {
                Ok([Value::Text(kind), Value::Text(message)]) => {
                    Ok(Response::Error { kind, message })
                }
                _ => Err(CodecError::malformed(
                    "failure content must be [kind, message]",
                )),
            },
            (status, content) => Err(CodecError::malformed(format!(
                "unexpected status_code {status} with {} content",
                content.type_name()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = BASE64.encode(payload).into_bytes();
    out.push(FRAME_DELIMITER);
    out
}

fn unframe(frame: &[u8]) -> CodecResult<Vec<u8>> {
    let mut end = frame.len();
    while end > 0 && matches!(frame[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    BASE64
        .decode(&frame[..end])
        .map_err(|e| CodecError::malformed(format!("invalid base64: {e}")))
}

fn encode<T: Serialize>(envelope: &T) -> CodecResult<Vec<u8>> {
    let payload =
        rmp_serde::to_vec_named(envelope).map_err(|e| CodecError::encode(e.to_string()))?;
    Ok(frame(&payload))
}

fn decode<T: DeserializeOwned>(frame: &[u8]) -> CodecResult<T> {
    let payload = unframe(frame)?;
    rmp_serde::from_slice(&payload).map_err(|e| CodecError::malformed(e.to_string()))
}

/// Encodes a request into a frame
pub fn encode_request(request: &Request) -> CodecResult<Vec<u8>> {
    encode(request)
}

/// Decodes a request frame
pub fn decode_request(frame: &[u8]) -> CodecResult<Request> {
    decode(frame)
}

/// Encodes a response into a frame
pub fn encode_response(response: &Response) -> CodecResult<Vec<u8>> {
    let content = match response {
        Response::Accepted => Content::Empty,
        Response::Rows(rows) => Content::Rows(rows),
        Response::Error { kind, message } => Content::Failure(kind, message),
    };
    encode(&WireResponseRef {
        status_code: response.status_code(),
        content,
    })
}

/// Decodes a response frame
pub fn decode_response(frame: &[u8]) -> CodecResult<Response> {
    decode::<WireResponse>(frame)?.try_into()
}

/// Encodes the handshake frame carrying a raw credential
pub fn encode_credential(credential: &[u8]) -> Vec<u8> {
    frame(credential)
}

/// Decodes a handshake frame back into raw credential bytes
pub fn decode_credential(frame: &[u8]) -> CodecResult<Vec<u8>> {
    unframe(frame)
}
