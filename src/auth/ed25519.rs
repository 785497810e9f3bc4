use ed25519_dalek::hazmat::{ExpandedSecretKey, raw_sign};
use ed25519_dalek::VerifyingKey;
use sha2::{Digest, Sha512};

use crate::auth::{AuthCtx, AuthPlugin, AuthReply};
use crate::error::{Error, Result};

/// `client_ed25519`: MariaDB's signature scheme. The signing key is the
/// Ed25519 expansion of `SHA512(password)`, so the password itself plays
/// the role of the seed.
pub struct Ed25519;

/// Sign the server challenge; the 64-byte signature is the whole response.
pub fn ed25519_response(challenge: &[u8], password: &str) -> [u8; 64] {
    let hash: [u8; 64] = Sha512::digest(password.as_bytes()).into();
    let expanded = ExpandedSecretKey::from_bytes(&hash);
    let verifying_key = VerifyingKey::from(&expanded);
    raw_sign::<Sha512>(&expanded, challenge, &verifying_key).to_bytes()
}

impl AuthPlugin for Ed25519 {
    fn name(&self) -> &'static str {
        "client_ed25519"
    }

    fn init(&self, challenge: &[u8], ctx: &mut AuthCtx<'_>) -> Result<Vec<u8>> {
        Ok(ed25519_response(challenge, ctx.password()).to_vec())
    }

    fn more_data(&self, _: &[u8], _: &[u8], _: &mut AuthCtx<'_>) -> Result<AuthReply> {
        Err(Error::MalformedPacket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};

    #[test]
    fn signature_verifies_under_the_derived_key() {
        let challenge = [0x5Au8; 32];
        let response = ed25519_response(&challenge, "secret");

        let hash: [u8; 64] = Sha512::digest(b"secret").into();
        let expanded = ExpandedSecretKey::from_bytes(&hash);
        let verifying_key = VerifyingKey::from(&expanded);
        let signature = Signature::from_bytes(&response);
        verifying_key.verify(&challenge, &signature).unwrap();
    }

    #[test]
    fn signature_depends_on_challenge_and_password() {
        let challenge = [1u8; 32];
        assert_ne!(
            ed25519_response(&challenge, "a"),
            ed25519_response(&challenge, "b")
        );
        assert_ne!(
            ed25519_response(&[1u8; 32], "a"),
            ed25519_response(&[2u8; 32], "a")
        );
    }
}
