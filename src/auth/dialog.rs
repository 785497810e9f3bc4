use crate::auth::{AuthCtx, AuthPlugin, AuthReply};
use crate::error::{Error, Result};

/// `dialog`: MariaDB's PAM-style conversation. The server sends prompts as
/// extra-data packets; each is answered with the next queued password from
/// [`Opts::passwords`](crate::Opts::passwords), or an empty reply once the
/// queue is exhausted. Gated behind `allow_dialog_passwords`.
pub struct Dialog;

fn reply(password: Option<&str>) -> Vec<u8> {
    let password = password.unwrap_or("");
    let mut out = Vec::with_capacity(password.len() + 1);
    out.extend_from_slice(password.as_bytes());
    out.push(0);
    out
}

impl Dialog {
    /// Answer one prompt with the next queued password.
    fn prompt(&self, _prompt: &[u8], ctx: &mut AuthCtx<'_>) -> Vec<u8> {
        let password = ctx.opts.passwords.get(ctx.dialog_password_index);
        ctx.dialog_password_index += 1;
        reply(password.map(String::as_str))
    }
}

impl AuthPlugin for Dialog {
    fn name(&self) -> &'static str {
        "dialog"
    }

    fn init(&self, _challenge: &[u8], ctx: &mut AuthCtx<'_>) -> Result<Vec<u8>> {
        if !ctx.opts.allow_dialog_passwords {
            return Err(Error::AuthPolicyRefused("dialog"));
        }
        Ok(reply(Some(ctx.password())))
    }

    fn more_data(
        &self,
        data: &[u8],
        _challenge: &[u8],
        ctx: &mut AuthCtx<'_>,
    ) -> Result<AuthReply> {
        Ok(AuthReply::Packet(self.prompt(data, ctx)))
    }
}
