use ed25519_dalek::{Signer, SigningKey};
use rand::RngCore;
use sha2::Sha512;

use crate::auth::{AuthCtx, AuthPlugin, AuthReply};
use crate::error::{Error, Result};

/// `parsec`: MariaDB 11.6+ PBKDF2 + Ed25519 scheme.
///
/// The server sends an extended salt (`'P'`, an iteration factor, then the
/// raw salt); the client derives an Ed25519 seed with PBKDF2-HMAC-SHA512
/// and signs `challenge ++ client_nonce`. The response is
/// `client_nonce(32) ++ signature(64)`.
pub struct Parsec;

const NONCE_LEN: usize = 32;

/// Compute the 96-byte parsec response for a validated extended salt.
pub fn parsec_response(
    ext_salt: &[u8],
    challenge: &[u8],
    password: &str,
    client_nonce: [u8; NONCE_LEN],
) -> Result<[u8; 96]> {
    let (factor, salt) = match ext_salt {
        [b'P', factor @ 0..=3, salt @ ..] => (*factor, salt),
        _ => return Err(Error::MalformedPacket),
    };
    let iterations = 1024u32 << factor;

    let mut seed = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, iterations, &mut seed);
    let signing_key = SigningKey::from_bytes(&seed);

    let mut message = Vec::with_capacity(challenge.len() + NONCE_LEN);
    message.extend_from_slice(challenge);
    message.extend_from_slice(&client_nonce);
    let signature = signing_key.sign(&message);

    let mut response = [0u8; 96];
    response[..NONCE_LEN].copy_from_slice(&client_nonce);
    response[NONCE_LEN..].copy_from_slice(&signature.to_bytes());
    Ok(response)
}

impl AuthPlugin for Parsec {
    fn name(&self) -> &'static str {
        "parsec"
    }

    fn init(&self, _challenge: &[u8], _ctx: &mut AuthCtx<'_>) -> Result<Vec<u8>> {
        // An empty first reply asks the server for the extended salt.
        Ok(Vec::new())
    }

    fn more_data(
        &self,
        data: &[u8],
        challenge: &[u8],
        ctx: &mut AuthCtx<'_>,
    ) -> Result<AuthReply> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let response = parsec_response(data, challenge, ctx.password(), nonce)?;
        Ok(AuthReply::Packet(response.to_vec()))
    }
}
