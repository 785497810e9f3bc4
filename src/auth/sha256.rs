use crate::auth::{AuthCtx, AuthPlugin, AuthReply, rsa_key};
use crate::error::{Error, Result};
use crate::registry;

/// `sha256_password`: RSA-encrypted password exchange. Cleartext is only
/// ever sent over an already-secure channel.
pub struct Sha256Password;

/// Request byte asking the server for its RSA public key.
const REQUEST_PUBLIC_KEY: u8 = 0x01;

fn cleartext(password: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(password.len() + 1);
    out.extend_from_slice(password.as_bytes());
    out.push(0);
    out
}

impl AuthPlugin for Sha256Password {
    fn name(&self) -> &'static str {
        "sha256_password"
    }

    fn init(&self, challenge: &[u8], ctx: &mut AuthCtx<'_>) -> Result<Vec<u8>> {
        if ctx.password().is_empty() {
            return Ok(vec![0]);
        }
        if ctx.secure {
            return Ok(cleartext(ctx.password()));
        }
        if let Some(name) = &ctx.opts.server_pub_key {
            let key = registry::server_pub_key(name)?;
            return rsa_key::encrypt_password(ctx.password(), challenge, &key);
        }
        ctx.pubkey_requested = true;
        Ok(vec![REQUEST_PUBLIC_KEY])
    }

    fn more_data(
        &self,
        data: &[u8],
        challenge: &[u8],
        ctx: &mut AuthCtx<'_>,
    ) -> Result<AuthReply> {
        if !ctx.pubkey_requested {
            return Err(Error::MalformedPacket);
        }
        ctx.pubkey_requested = false;
        let key = rsa_key::parse_public_key(data)?;
        let encrypted = rsa_key::encrypt_password(ctx.password(), challenge, &key)?;
        Ok(AuthReply::Packet(encrypted))
    }
}
