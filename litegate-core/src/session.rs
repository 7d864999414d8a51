//! Per-connection session
//!
//! A session is a small state machine driven by incoming frames:
//!
//! ```text
//!                 credential frame
//!                 (matched / bootstrap)
//! Unauthenticated ─────────────────────► Authenticated ──┐
//!        │                                     ▲         │ request frame
//!        │ credential rejected,                └─────────┘ (any outcome)
//!        │ store failure
//!        ▼
//!     Closed ◄──── EOF, oversized frame, write failure (from any state)
//! ```
//!
//! Every frame gets exactly one response. Only a failed handshake or an
//! oversized frame closes the connection from the server side; a request
//! that cannot be decoded is answered with `BadRequest` and the session
//! keeps going.

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use crate::config::ServerConfig;
use crate::error::{ErrorKind, GateError, GateResult};
use crate::executor;
use crate::keys;
use crate::protocol::{decode_credential, decode_request, encode_response, Response};
use crate::store::{authenticate, AuthOutcome, PermissionStore, SharedStore};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Closed,
}

/// One frame read from the peer
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Line(Vec<u8>),
    TooLong,
    Eof,
}

/// Reads one `\n`-terminated frame of at most `max_len` bytes
///
/// A trailing fragment without a delimiter at end of stream is discarded.
async fn read_frame<R>(reader: &mut R, max_len: usize) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = u64::try_from(max_len).unwrap_or(u64::MAX).saturating_add(1);
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;

    if n == 0 {
        Ok(Frame::Eof)
    } else if buf.len() > max_len {
        Ok(Frame::TooLong)
    } else if buf.last() != Some(&b'\n') {
        Ok(Frame::Eof)
    } else {
        Ok(Frame::Line(buf))
    }
}

/// Serves one client connection
pub struct Session<S> {
    store: SharedStore<S>,
    max_frame_len: usize,
    peer: String,
    state: SessionState,
}

impl<S: PermissionStore> Session<S> {
    pub fn new(store: SharedStore<S>, config: &ServerConfig) -> Self {
        Self {
            store,
            max_frame_len: config.max_frame_len,
            peer: "unknown peer".to_string(),
            state: SessionState::Unauthenticated,
        }
    }

    /// Sets the peer label used in log lines
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session until the peer disconnects or the session closes
    ///
    /// The write half is shut down before returning.
    ///
    /// # Errors
    /// Returns an error if reading a frame or writing a response fails.
    pub async fn run<T>(mut self, stream: T) -> GateResult<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);

        let result = self.serve(&mut reader, &mut writer).await;
        self.state = SessionState::Closed;
        let _ = writer.shutdown().await;

        #[cfg(feature = "tracing")]
        match &result {
            Ok(()) => tracing::debug!("Session with {} closed", self.peer),
            Err(e) => tracing::debug!("Session with {} ended: {}", self.peer, e),
        }

        result
    }

    async fn serve<R, W>(&mut self, reader: &mut R, writer: &mut W) -> GateResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let frame = read_frame(reader, self.max_frame_len)
                .await
                .map_err(|e| GateError::io("Failed to read frame", e))?;

            let frame = match frame {
                Frame::Line(line) => line,
                Frame::Eof => return Ok(()),
                Frame::TooLong => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        "Frame from {} exceeds {} bytes, closing",
                        self.peer,
                        self.max_frame_len
                    );
                    let response =
                        Response::error(ErrorKind::BadRequest, "Frame exceeds maximum length.");
                    send_response(writer, &response).await?;
                    return Ok(());
                }
            };

            match self.state {
                SessionState::Unauthenticated => {
                    let (response, admitted) = self.handshake(&frame).await;
                    send_response(writer, &response).await?;
                    if !admitted {
                        return Ok(());
                    }
                    self.state = SessionState::Authenticated;
                }
                SessionState::Authenticated => {
                    let response = self.handle_request(&frame).await;
                    send_response(writer, &response).await?;
                }
                SessionState::Closed => return Ok(()),
            }
        }
    }

    /// Checks a credential frame; returns the reply and whether it admits
    async fn handshake(&self, frame: &[u8]) -> (Response, bool) {
        // A frame that is not base64 carries no usable credential.
        let digest = decode_credential(frame).ok().map(|raw| keys::digest(&raw));

        let outcome = self
            .store
            .with(move |store| authenticate(store, digest.as_deref()))
            .await;

        match outcome {
            Ok(AuthOutcome::Matched) => {
                #[cfg(feature = "tracing")]
                tracing::info!("{} authenticated", self.peer);
                (Response::Accepted, true)
            }
            Ok(AuthOutcome::Bootstrap) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "{} admitted without a stored access key: no keys are provisioned",
                    self.peer
                );
                (Response::Accepted, true)
            }
            Ok(AuthOutcome::Rejected) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Authentication failed for {}", self.peer);
                (Response::authentication_failed(), false)
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Credential lookup failed for {}: {}", self.peer, e);
                (e.into(), false)
            }
        }
    }

    async fn handle_request(&self, frame: &[u8]) -> Response {
        match decode_request(frame) {
            Ok(request) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("{} executing: {}", self.peer, request.statement);
                executor::execute(&self.store, request).await
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Undecodable request from {}: {}", self.peer, _e);
                Response::bad_request()
            }
        }
    }
}

async fn send_response<W>(writer: &mut W, response: &Response) -> GateResult<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_response(response)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|e| GateError::io("Failed to write response", e))?;
    writer
        .flush()
        .await
        .map_err(|e| GateError::io("Failed to flush response", e))?;
    Ok(())
}
