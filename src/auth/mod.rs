//! Pluggable authentication.
//!
//! A process-wide registry maps plugin names to handlers. Each handler
//! produces the initial handshake response for a challenge and processes
//! any follow-up packets of its scheme (extra-data rounds, RSA key
//! exchange, PAM prompts).

mod caching_sha2;
mod clear;
mod dialog;
mod ed25519;
mod native;
mod old_password;
mod parsec;
mod rsa_key;
mod sha256;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

pub use caching_sha2::{CachingSha2, sha256_scramble};
pub use clear::ClearPassword;
pub use dialog::Dialog;
pub use ed25519::{Ed25519, ed25519_response};
pub use native::{NativePassword, native_scramble};
pub use old_password::{OldPassword, old_scramble};
pub use parsec::{Parsec, parsec_response};
pub use rsa_key::{encrypt_password, parse_public_key};
pub use sha256::Sha256Password;

use crate::error::{Error, Result};
use crate::opts::Opts;

/// Per-connection authentication state shared across the auth loop.
pub struct AuthCtx<'a> {
    pub opts: &'a Opts,
    /// TLS is active or the transport is a Unix socket.
    pub secure: bool,
    /// Cursor into [`Opts::passwords`] for `dialog` prompts.
    pub dialog_password_index: usize,
    /// A `caching_sha2`/`sha256` public-key request is in flight; the next
    /// extra-data packet carries the PEM key.
    pub pubkey_requested: bool,
}

impl<'a> AuthCtx<'a> {
    pub fn new(opts: &'a Opts, secure: bool) -> Self {
        Self {
            opts,
            secure,
            dialog_password_index: 0,
            pubkey_requested: false,
        }
    }

    pub(crate) fn password(&self) -> &str {
        self.opts.password.as_deref().unwrap_or("")
    }
}

/// Reply of a plugin's continuation step.
pub enum AuthReply {
    /// Send these bytes as the next packet.
    Packet(Vec<u8>),
    /// Nothing to send; wait for the server's next packet.
    Await,
}

/// A challenge-response authentication scheme.
///
/// Everything the server sends after the handshake response arrives as one
/// of the four auth-loop markers; scheme-specific rounds (RSA key exchange,
/// PAM prompts) all travel inside `0x01` extra-data packets and land in
/// [`AuthPlugin::more_data`].
pub trait AuthPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// First response bytes for a fresh challenge (handshake response or
    /// auth-switch reply).
    fn init(&self, challenge: &[u8], ctx: &mut AuthCtx<'_>) -> Result<Vec<u8>>;

    /// Process a `0x01` extra-data packet from the server.
    fn more_data(&self, data: &[u8], challenge: &[u8], ctx: &mut AuthCtx<'_>)
    -> Result<AuthReply>;
}

type Registry = RwLock<HashMap<String, Arc<dyn AuthPlugin>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let builtin: [Arc<dyn AuthPlugin>; 8] = [
            Arc::new(NativePassword),
            Arc::new(OldPassword),
            Arc::new(CachingSha2),
            Arc::new(Sha256Password),
            Arc::new(ClearPassword),
            Arc::new(Dialog),
            Arc::new(Ed25519),
            Arc::new(Parsec),
        ];
        RwLock::new(
            builtin
                .into_iter()
                .map(|plugin| (plugin.name().to_owned(), plugin))
                .collect(),
        )
    })
}

/// Register an authentication plugin, replacing any plugin of the same name.
/// The registry owns the plugin from this point on.
pub fn register_auth_plugin(plugin: Arc<dyn AuthPlugin>) {
    let mut map = registry().write().unwrap_or_else(|e| e.into_inner());
    map.insert(plugin.name().to_owned(), plugin);
}

/// Remove a registered plugin.
pub fn deregister_auth_plugin(name: &str) {
    let mut map = registry().write().unwrap_or_else(|e| e.into_inner());
    map.remove(name);
}

/// Look up a plugin by the name a server announced.
pub fn lookup_auth_plugin(name: &str) -> Result<Arc<dyn AuthPlugin>> {
    let map = registry().read().unwrap_or_else(|e| e.into_inner());
    map.get(name)
        .map(Arc::clone)
        .ok_or_else(|| Error::UnknownAuthPlugin(name.to_owned()))
}

pub(crate) fn xor_bytes(lhs: &mut [u8], rhs: &[u8]) {
    for (l, r) in lhs.iter_mut().zip(rhs.iter().cycle()) {
        *l ^= *r;
    }
}
