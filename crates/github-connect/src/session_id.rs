//! Session identifier generation.

use crate::{ConnectError, ConnectResult};
use rand::rngs::OsRng;
use rand::RngCore;

/// Number of random bytes in a session id.
pub const SESSION_ID_BYTES: usize = 32;

/// Generate an opaque session id: 32 bytes from the OS random source,
/// hex-encoded to 64 lowercase characters.
pub fn generate_session_id() -> ConnectResult<String> {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| ConnectError::Entropy(e.to_string()))?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_session_id_shape() {
        let id = generate_session_id().unwrap();
        assert_eq!(id.len(), 64);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_session_ids_are_unique() {
        let ids: HashSet<String> = (0..10_000)
            .map(|_| generate_session_id().unwrap())
            .collect();
        assert_eq!(ids.len(), 10_000);
    }
}
