//! Client side of the padrelay wire protocol
//!
//! Connects to the relay daemon over TCP, answers the connection handshake and
//! then forwards macro identifiers. Names never leave the client: only their
//! 256-bit digest is written to the socket.

use crate::{digest, expected_response, MacroId, HANDSHAKE_MAGIC};

use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Errors that can occur while talking to the relay daemon
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("failed to connect to daemon at {0}")]
    DaemonNotRunning(String),

    #[error("connection timeout")]
    ConnectionTimeout,

    #[error("handshake failed: {0}")]
    Handshake(io::Error),

    #[error("failed to send macro: {0}")]
    Send(io::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Default daemon address
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:6969";

/// Default timeout for connect and handshake (in milliseconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Maximum number of reconnection attempts
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay between reconnection attempts (in milliseconds)
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Connection factory with retry and timeout settings
#[derive(Debug, Clone)]
pub struct RelayClient {
    address: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl Default for RelayClient {
    fn default() -> Self {
        Self::with_address(DEFAULT_ADDRESS)
    }
}

impl RelayClient {
    /// Create a new client for the given `host:port`
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }

    /// Set the timeout for connect and handshake
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Duration::from_millis(timeout_ms);
        self
    }

    /// Set reconnection parameters
    pub fn with_retry_params(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = Duration::from_millis(retry_delay_ms);
        self
    }

    /// Connect and complete the handshake, retrying failed attempts
    pub async fn connect(&self) -> Result<RelayConnection, RelayError> {
        let mut attempts = 0;

        loop {
            match self.try_connect().await {
                Ok(connection) => return Ok(connection),
                Err(e) => {
                    if attempts >= self.max_retries {
                        return Err(e);
                    }
                    tracing::warn!("Connection attempt {} failed: {}, retrying...", attempts + 1, e);
                    tokio::time::sleep(self.retry_delay).await;
                    attempts += 1;
                }
            }
        }
    }

    async fn try_connect(&self) -> Result<RelayConnection, RelayError> {
        let mut stream = match timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(_)) => return Err(RelayError::DaemonNotRunning(self.address.clone())),
            Err(_) => return Err(RelayError::ConnectionTimeout),
        };

        match timeout(self.timeout, client_handshake(&mut stream)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(RelayError::ConnectionTimeout),
        }

        tracing::info!("Connected to relay at {}", self.address);
        Ok(RelayConnection { stream })
    }
}

/// Perform the client half of the handshake on an already-open stream
pub async fn client_handshake<S>(stream: &mut S) -> Result<(), RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&HANDSHAKE_MAGIC.to_be_bytes())
        .await
        .map_err(RelayError::Handshake)?;

    let mut challenge = [0u8; 8];
    stream
        .read_exact(&mut challenge)
        .await
        .map_err(RelayError::Handshake)?;
    let challenge = u64::from_be_bytes(challenge);
    tracing::debug!("Received challenge {:#018x}", challenge);

    let response = expected_response(challenge);
    stream
        .write_all(&response.to_be_bytes())
        .await
        .map_err(RelayError::Handshake)?;
    stream.flush().await.map_err(RelayError::Handshake)?;

    tracing::debug!("Handshake completed successfully");
    Ok(())
}

/// An authenticated connection to the relay daemon
#[derive(Debug)]
pub struct RelayConnection {
    stream: TcpStream,
}

impl RelayConnection {
    /// Digest `name` and send the resulting identifier
    pub async fn send_macro(&mut self, name: &str) -> Result<MacroId, RelayError> {
        let id = digest(name);
        tracing::info!("Sending macro with code: '{}' (hash '{}') to server", name, id);
        self.send_id(id).await?;
        Ok(id)
    }

    /// Send a raw macro identifier
    pub async fn send_id(&mut self, id: MacroId) -> Result<(), RelayError> {
        self.stream
            .write_all(id.as_bytes())
            .await
            .map_err(RelayError::Send)?;
        self.stream.flush().await.map_err(RelayError::Send)
    }

    /// Close the write half; the daemon sees end-of-stream and tears the session down
    pub async fn close(mut self) -> Result<(), RelayError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MACRO_ID_LEN;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_relay_client_creation() {
        let client = RelayClient::default();
        assert_eq!(client.address, DEFAULT_ADDRESS);
        assert_eq!(client.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert_eq!(client.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(client.retry_delay, Duration::from_millis(DEFAULT_RETRY_DELAY_MS));

        let custom = RelayClient::with_address("10.0.0.2:7000")
            .with_timeout(10000)
            .with_retry_params(5, 2000);
        assert_eq!(custom.address, "10.0.0.2:7000");
        assert_eq!(custom.timeout, Duration::from_millis(10000));
        assert_eq!(custom.max_retries, 5);
        assert_eq!(custom.retry_delay, Duration::from_millis(2000));
    }

    #[test]
    fn test_client_handshake_bytes() {
        let challenge: u64 = 70;
        let mut mock = tokio_test::io::Builder::new()
            .write(&HANDSHAKE_MAGIC.to_be_bytes())
            .read(&challenge.to_be_bytes())
            .write(&expected_response(challenge).to_be_bytes())
            .build();

        tokio_test::block_on(client_handshake(&mut mock)).unwrap();
    }

    #[test]
    fn test_client_handshake_server_hangup() {
        let mut mock = tokio_test::io::Builder::new()
            .write(&HANDSHAKE_MAGIC.to_be_bytes())
            .build();

        let result = tokio_test::block_on(client_handshake(&mut mock));
        assert!(matches!(result, Err(RelayError::Handshake(_))));
    }

    #[tokio::test]
    async fn test_send_macro_writes_digest() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut magic = [0u8; 4];
            stream.read_exact(&mut magic).await.unwrap();
            assert_eq!(u32::from_be_bytes(magic), HANDSHAKE_MAGIC);

            let challenge: u64 = 0x0123_4567_89ab_cdef;
            stream.write_all(&challenge.to_be_bytes()).await.unwrap();
            let mut response = [0u8; 8];
            stream.read_exact(&mut response).await.unwrap();
            assert_eq!(u64::from_be_bytes(response), expected_response(challenge));

            let mut id = [0u8; MACRO_ID_LEN];
            stream.read_exact(&mut id).await.unwrap();
            MacroId::from_bytes(id)
        });

        let client = RelayClient::with_address(address).with_retry_params(0, 10);
        let mut connection = client.connect().await.unwrap();
        let sent = connection.send_macro("jump").await.unwrap();
        connection.close().await.unwrap();

        assert_eq!(server.await.unwrap(), sent);
        assert_eq!(sent, digest("jump"));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Grab a free port and release it so nothing is listening there
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = RelayClient::with_address(address)
            .with_timeout(200)
            .with_retry_params(1, 10);

        match client.connect().await {
            Err(RelayError::DaemonNotRunning(_)) | Err(RelayError::ConnectionTimeout) => {}
            other => panic!("Expected connection failure, got {:?}", other),
        }
    }
}
