use sha2::{Digest, Sha256};
use std::fmt;

// Re-export common dependencies
pub use tokio;
pub use tracing;

// Relay client module
pub mod relay_client;

/// Width in bytes of a macro identifier on the wire
pub const MACRO_ID_LEN: usize = 32;

/// Magic value a client opens every connection with (sent big-endian)
pub const HANDSHAKE_MAGIC: u32 = 0xDEAD_BEEF;

/// The challenge is mixed `challenge % MIX_ROUNDS_MODULUS` times
pub const MIX_ROUNDS_MODULUS: u64 = 69;

/// Out-of-range 16-bit code older clients send to announce a disconnect
pub const DISCONNECT_FLAG: u16 = u16::MAX;

/// Default TCP port of the relay daemon
pub const DEFAULT_PORT: u16 = 6969;

/// Content-derived 256-bit macro identifier.
///
/// Both sides derive it independently from a name, so only the digest ever
/// crosses the wire. Ordering and equality are plain byte-wise comparisons.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacroId([u8; MACRO_ID_LEN]);

impl MacroId {
    /// Wrap raw identifier bytes received from the wire
    pub const fn from_bytes(bytes: [u8; MACRO_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw identifier bytes, ready to be written to the wire
    pub fn as_bytes(&self) -> &[u8; MACRO_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for MacroId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for MacroId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MacroId({})", self)
    }
}

/// Derive the identifier of a macro from its name (or source filename)
pub fn digest(bytes: impl AsRef<[u8]>) -> MacroId {
    let hash = Sha256::digest(bytes.as_ref());
    let mut id = [0u8; MACRO_ID_LEN];
    id.copy_from_slice(&hash);
    MacroId(id)
}

/// 64-bit avalanche step used by the connection handshake
pub fn mix(u: u64) -> u64 {
    let mut v = u
        .wrapping_mul(3_935_559_000_370_003_845)
        .wrapping_add(2_691_343_689_449_507_681);

    v ^= v >> 21;
    v ^= v << 37;
    v ^= v >> 4;

    v = v.wrapping_mul(4_768_777_513_237_032_717);

    v ^= v << 20;
    v ^= v >> 41;
    v ^= v << 5;

    v
}

/// Response both peers compute for a challenge: `mix` applied `challenge % 69` times
pub fn expected_response(challenge: u64) -> u64 {
    let rounds = challenge % MIX_ROUNDS_MODULUS;
    (0..rounds).fold(challenge, |acc, _| mix(acc))
}

/// Which analog stick a joystick action targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Side::Left => write!(f, "L"),
            Side::Right => write!(f, "R"),
        }
    }
}
