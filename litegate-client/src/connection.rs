//! litegate client connection
//!
//! Async client for a litegate server over TCP.

use crate::error::{ClientError, ClientResult};
use litegate_core::protocol::{decode_response, encode_credential, encode_request};
use litegate_core::{Map, Request, Response, Row, Value};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Timeout for connection operations
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// litegate protocol client
pub struct GateClient {
    addr: String,
    stream: OwnedWriteHalf,
    reader: BufReader<OwnedReadHalf>,
}

impl GateClient {
    /// Connects and authenticates
    ///
    /// `credential` is the hex string printed by `litegate keygen`. `None`
    /// sends an empty credential, which a server only admits while it has no
    /// credentials stored.
    ///
    /// # Errors
    /// Fails if the server is unreachable or rejects the credential.
    pub async fn connect(addr: impl Into<String>, credential: Option<&str>) -> ClientResult<Self> {
        let addr = addr.into();

        // Connect with timeout
        let stream = tokio::time::timeout(CONNECTION_TIMEOUT, TcpStream::connect(addr.as_str()))
            .await
            .map_err(|_| ClientError::connection_failed(addr.as_str(), "connection timeout"))?
            .map_err(|e| ClientError::connection_failed(addr.as_str(), e.to_string()))?;
        let _ = stream.set_nodelay(true);

        let (reader_stream, writer_stream) = stream.into_split();
        let mut client = Self {
            addr,
            stream: writer_stream,
            reader: BufReader::new(reader_stream),
        };

        client.handshake(credential.unwrap_or_default()).await?;

        Ok(client)
    }

    async fn handshake(&mut self, credential: &str) -> ClientResult<()> {
        self.write_frame(&encode_credential(credential.as_bytes()))
            .await?;

        match self.read_response().await? {
            Response::Accepted => Ok(()),
            Response::Error { kind, message } => Err(ClientError::remote(kind, message)),
            Response::Rows(_) => Err(ClientError::UnexpectedResponse(
                "rows in reply to the handshake".to_string(),
            )),
        }
    }

    /// Address this client is connected to
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Runs a statement with positional and keyword arguments
    ///
    /// # Errors
    /// Server-side failures come back as [`ClientError::Remote`] (or
    /// [`ClientError::UnknownRemote`]) and leave the connection usable.
    pub async fn execute(
        &mut self,
        statement: &str,
        positional_args: Vec<Value>,
        keyword_args: Map,
    ) -> ClientResult<Vec<Row>> {
        let request = Request {
            statement: statement.to_string(),
            positional_args,
            keyword_args,
        };
        self.send(&request).await
    }

    /// Runs a statement without parameters
    pub async fn query(&mut self, statement: &str) -> ClientResult<Vec<Row>> {
        self.send(&Request::new(statement)).await
    }

    /// Sends a prepared request
    pub async fn send(&mut self, request: &Request) -> ClientResult<Vec<Row>> {
        self.write_frame(&encode_request(request)?).await?;

        match self.read_response().await? {
            Response::Rows(rows) => Ok(rows),
            Response::Error { kind, message } => Err(ClientError::remote(kind, message)),
            Response::Accepted => Err(ClientError::UnexpectedResponse(
                "handshake acknowledgement in reply to a statement".to_string(),
            )),
        }
    }

    /// Closes the connection
    pub async fn close(mut self) -> ClientResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Write a frame to the stream
    async fn write_frame(&mut self, frame: &[u8]) -> ClientResult<()> {
        self.stream.write_all(frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one response frame from the stream
    async fn read_response(&mut self) -> ClientResult<Response> {
        let mut line = Vec::new();
        self.reader.read_until(b'\n', &mut line).await?;

        if line.last() != Some(&b'\n') {
            return Err(ClientError::ConnectionClosed);
        }

        Ok(decode_response(&line)?)
    }
}
