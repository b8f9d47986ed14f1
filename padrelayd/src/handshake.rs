//! Server side of the connection handshake
//!
//! ```text
//! client -> server   u32  0xDEADBEEF
//! server -> client   u64  challenge
//! client -> server   u64  response
//! ```
//!
//! All integers are big-endian.
//!
//! The response must equal `expected_response(challenge)`. Any short read,
//! write failure or mismatch rejects the connection.

use padrelay_common::{expected_response, tracing, HANDSHAKE_MAGIC};
use rand::rngs::OsRng;
use rand::RngCore;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("failed to read magic number: {0}")]
    ReadMagic(#[source] io::Error),

    #[error("wrong magic number: {0:#010x}")]
    BadMagic(u32),

    #[error("failed to send challenge: {0}")]
    SendChallenge(#[source] io::Error),

    #[error("failed to read challenge response: {0}")]
    ReadResponse(#[source] io::Error),

    #[error("wrong challenge response: expected {expected:#018x}, got {got:#018x}")]
    BadResponse { expected: u64, got: u64 },
}

/// Authenticate a freshly accepted peer with a random challenge
pub async fn server_handshake<S>(stream: &mut S) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let challenge = OsRng.next_u64();
    server_handshake_with_challenge(stream, challenge).await
}

/// Run the handshake with a caller-chosen challenge
pub async fn server_handshake_with_challenge<S>(
    stream: &mut S,
    challenge: u64,
) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let magic = stream.read_u32().await.map_err(HandshakeError::ReadMagic)?;
    if magic != HANDSHAKE_MAGIC {
        warn!("Wrong magic number {:#010x}", magic);
        return Err(HandshakeError::BadMagic(magic));
    }

    stream
        .write_u64(challenge)
        .await
        .map_err(HandshakeError::SendChallenge)?;
    stream.flush().await.map_err(HandshakeError::SendChallenge)?;

    let got = stream.read_u64().await.map_err(HandshakeError::ReadResponse)?;

    let expected = expected_response(challenge);
    if got != expected {
        warn!("Wrong challenge response");
        return Err(HandshakeError::BadResponse { expected, got });
    }

    debug!("Handshake complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use padrelay_common::relay_client::client_handshake;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_handshake_succeeds() {
        let (mut server, mut client) = duplex(64);
        let (server_result, client_result) =
            tokio::join!(server_handshake(&mut server), client_handshake(&mut client));
        server_result.unwrap();
        client_result.unwrap();
    }

    #[tokio::test]
    async fn test_bad_magic_rejected_before_challenge() {
        let (mut server, mut client) = duplex(64);
        client.write_u32(0xCAFE_BABE).await.unwrap();

        match server_handshake(&mut server).await {
            Err(HandshakeError::BadMagic(magic)) => assert_eq!(magic, 0xCAFE_BABE),
            other => panic!("Expected bad magic, got {:?}", other),
        }

        // Nothing was written back
        drop(server);
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_response_rejected() {
        let (mut server, mut client) = duplex(64);
        let challenge = 70;

        let peer = async move {
            client.write_u32(HANDSHAKE_MAGIC).await.unwrap();
            let received = client.read_u64().await.unwrap();
            assert_eq!(received, challenge);
            // Echoing the challenge back is not a valid answer
            client.write_u64(received).await.unwrap();
            client
        };

        let (result, _client) = tokio::join!(server_handshake_with_challenge(&mut server, challenge), peer);
        match result {
            Err(HandshakeError::BadResponse { expected, got }) => {
                assert_eq!(got, challenge);
                assert_eq!(expected, expected_response(challenge));
            }
            other => panic!("Expected bad response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_short_magic_fails() {
        let (mut server, mut client) = duplex(64);
        client.write_all(&[0xDE, 0xAD]).await.unwrap();
        drop(client);

        assert!(matches!(
            server_handshake(&mut server).await,
            Err(HandshakeError::ReadMagic(_))
        ));
    }
}
