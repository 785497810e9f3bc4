use sha2::{Digest, Sha256};

use crate::auth::{AuthCtx, AuthPlugin, AuthReply, rsa_key};
use crate::error::{Error, Result};
use crate::registry;

/// `caching_sha2_password`: the MySQL 8.0+ default.
///
/// Fast path: the scrambled token alone when the server has the account
/// cached. Full path: cleartext over a secure channel, or RSA-OAEP over a
/// plain one, fetching the server's public key on demand.
pub struct CachingSha2;

/// Extra-data byte: the cached fast path succeeded, an OK packet follows.
const FAST_AUTH_OK: u8 = 0x03;
/// Extra-data byte: full authentication is required.
const FULL_AUTH: u8 = 0x04;
/// Request byte asking the server for its RSA public key.
const REQUEST_PUBLIC_KEY: u8 = 0x02;

/// `SHA256(password) XOR SHA256(SHA256(SHA256(password)) ++ challenge)`
pub fn sha256_scramble(challenge: &[u8], password: &str) -> [u8; 32] {
    // A 20-byte scramble often arrives with a trailing NUL.
    let challenge = match challenge {
        [head @ .., 0] if head.len() == 20 => head,
        other => other,
    };

    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    let stage1 = hasher.finalize();

    let mut hasher = Sha256::new();
    hasher.update(stage1);
    let stage2 = hasher.finalize();

    let mut hasher = Sha256::new();
    hasher.update(stage2);
    hasher.update(challenge);
    let scramble = hasher.finalize();

    let mut result = [0u8; 32];
    for (out, (a, b)) in result.iter_mut().zip(stage1.iter().zip(scramble.iter())) {
        *out = a ^ b;
    }
    result
}

fn cleartext(password: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(password.len() + 1);
    out.extend_from_slice(password.as_bytes());
    out.push(0);
    out
}

impl AuthPlugin for CachingSha2 {
    fn name(&self) -> &'static str {
        "caching_sha2_password"
    }

    fn init(&self, challenge: &[u8], ctx: &mut AuthCtx<'_>) -> Result<Vec<u8>> {
        if ctx.password().is_empty() {
            return Ok(Vec::new());
        }
        Ok(sha256_scramble(challenge, ctx.password()).to_vec())
    }

    fn more_data(
        &self,
        data: &[u8],
        challenge: &[u8],
        ctx: &mut AuthCtx<'_>,
    ) -> Result<AuthReply> {
        if ctx.pubkey_requested {
            ctx.pubkey_requested = false;
            let key = rsa_key::parse_public_key(data)?;
            let encrypted = rsa_key::encrypt_password(ctx.password(), challenge, &key)?;
            return Ok(AuthReply::Packet(encrypted));
        }

        match data.first() {
            Some(&FAST_AUTH_OK) => Ok(AuthReply::Await),
            Some(&FULL_AUTH) => {
                if ctx.secure {
                    // TLS or a Unix socket: the cleartext password is safe.
                    return Ok(AuthReply::Packet(cleartext(ctx.password())));
                }
                if let Some(name) = &ctx.opts.server_pub_key {
                    let key = registry::server_pub_key(name)?;
                    let encrypted =
                        rsa_key::encrypt_password(ctx.password(), challenge, &key)?;
                    return Ok(AuthReply::Packet(encrypted));
                }
                ctx.pubkey_requested = true;
                Ok(AuthReply::Packet(vec![REQUEST_PUBLIC_KEY]))
            }
            _ => Err(Error::MalformedPacket),
        }
    }
}
