use crate::auth::{AuthCtx, AuthPlugin, AuthReply};
use crate::error::{Error, Result};

/// `mysql_clear_password`: the password in the clear, NUL-terminated.
/// Used by PAM/LDAP setups; gated behind `allow_cleartext_passwords`
/// because it trusts the transport completely.
pub struct ClearPassword;

impl AuthPlugin for ClearPassword {
    fn name(&self) -> &'static str {
        "mysql_clear_password"
    }

    fn init(&self, _challenge: &[u8], ctx: &mut AuthCtx<'_>) -> Result<Vec<u8>> {
        if !ctx.opts.allow_cleartext_passwords {
            return Err(Error::AuthPolicyRefused("mysql_clear_password"));
        }
        let mut out = Vec::with_capacity(ctx.password().len() + 1);
        out.extend_from_slice(ctx.password().as_bytes());
        out.push(0);
        Ok(out)
    }

    fn more_data(&self, _: &[u8], _: &[u8], _: &mut AuthCtx<'_>) -> Result<AuthReply> {
        Err(Error::MalformedPacket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opts::Opts;

    #[test]
    fn nul_terminated_password() {
        let opts = Opts {
            password: Some("secret".to_owned()),
            allow_cleartext_passwords: true,
            ..Opts::default()
        };
        let mut ctx = AuthCtx::new(&opts, true);
        assert_eq!(ClearPassword.init(&[], &mut ctx).unwrap(), b"secret\0");
    }

    #[test]
    fn refused_without_opt_in() {
        let opts = Opts::default();
        let mut ctx = AuthCtx::new(&opts, true);
        assert!(matches!(
            ClearPassword.init(&[], &mut ctx),
            Err(Error::AuthPolicyRefused(_))
        ));
    }
}
