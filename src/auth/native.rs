use sha1::{Digest, Sha1};

use crate::auth::{AuthCtx, AuthPlugin, AuthReply};
use crate::error::{Error, Result};

/// `mysql_native_password`: the SHA1 challenge/response scheme that was the
/// server default before 8.0.
pub struct NativePassword;

/// `SHA1(password) XOR SHA1(challenge ++ SHA1(SHA1(password)))`
pub fn native_scramble(challenge: &[u8], password: &str) -> [u8; 20] {
    let challenge = challenge.get(..20).unwrap_or(challenge);

    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    let stage1 = hasher.finalize();

    let mut hasher = Sha1::new();
    hasher.update(stage1);
    let stage2 = hasher.finalize();

    let mut hasher = Sha1::new();
    hasher.update(challenge);
    hasher.update(stage2);
    let token = hasher.finalize();

    let mut result = [0u8; 20];
    for (out, (a, b)) in result.iter_mut().zip(stage1.iter().zip(token.iter())) {
        *out = a ^ b;
    }
    result
}

impl AuthPlugin for NativePassword {
    fn name(&self) -> &'static str {
        "mysql_native_password"
    }

    fn init(&self, challenge: &[u8], ctx: &mut AuthCtx<'_>) -> Result<Vec<u8>> {
        if !ctx.opts.allow_native_passwords {
            return Err(Error::AuthPolicyRefused("mysql_native_password"));
        }
        if ctx.password().is_empty() {
            return Ok(Vec::new());
        }
        Ok(native_scramble(challenge, ctx.password()).to_vec())
    }

    fn more_data(&self, _: &[u8], _: &[u8], _: &mut AuthCtx<'_>) -> Result<AuthReply> {
        Err(Error::MalformedPacket)
    }
}
