//! Random token and secret generation
//!
//! Both values are 32 bytes from the thread-local CSPRNG, hex encoded.
//! Callers must treat the output as opaque.

use rand::RngExt;

/// Number of random bytes behind every generated value (256 bits).
const RANDOM_BYTES: usize = 32;

fn random_hex() -> String {
    let mut bytes = [0u8; RANDOM_BYTES];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Generate a secret for signing session cookies.
///
/// Consumed by the host's session layer; this crate never reads it back.
pub fn generate_secret() -> String {
    random_hex()
}

/// Generate an opaque bearer token identifier.
pub fn generate_token() -> String {
    random_hex()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn token_is_64_lowercase_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()),
            "token must be lowercase hex: {token}"
        );
    }

    #[test]
    fn secret_is_64_hex_chars() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(hex::decode(&secret).is_ok());
    }

    #[test]
    fn tokens_do_not_collide() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 1000, "generated tokens must be unique");
    }

    #[test]
    fn secret_and_token_are_independent() {
        assert_ne!(generate_secret(), generate_token());
    }
}
