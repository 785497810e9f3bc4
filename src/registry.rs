//! Process-wide registries: TLS configurations, dial functions, and server
//! RSA public keys. Registration is a brief exclusive write; lookups are
//! concurrent reads. Registered values are owned by the driver from the
//! moment of registration.

use std::collections::HashMap;
use std::io;
use std::net::TcpStream;
use std::sync::{Arc, OnceLock, RwLock};

use rsa::RsaPublicKey;

use crate::error::{Error, Result};

/// A custom dialer for a network name: receives the configured address and
/// returns a connected TCP stream.
pub type DialFunc = Arc<dyn Fn(&str) -> io::Result<TcpStream> + Send + Sync>;

fn tls_configs() -> &'static RwLock<HashMap<String, native_tls::TlsConnector>> {
    static MAP: OnceLock<RwLock<HashMap<String, native_tls::TlsConnector>>> = OnceLock::new();
    MAP.get_or_init(Default::default)
}

fn dial_funcs() -> &'static RwLock<HashMap<String, DialFunc>> {
    static MAP: OnceLock<RwLock<HashMap<String, DialFunc>>> = OnceLock::new();
    MAP.get_or_init(Default::default)
}

fn server_pub_keys() -> &'static RwLock<HashMap<String, RsaPublicKey>> {
    static MAP: OnceLock<RwLock<HashMap<String, RsaPublicKey>>> = OnceLock::new();
    MAP.get_or_init(Default::default)
}

/// Register a TLS connector usable via `tls=<name>`.
pub fn register_tls_config(name: impl Into<String>, connector: native_tls::TlsConnector) {
    let mut map = tls_configs().write().unwrap_or_else(|e| e.into_inner());
    map.insert(name.into(), connector);
}

pub fn deregister_tls_config(name: &str) {
    let mut map = tls_configs().write().unwrap_or_else(|e| e.into_inner());
    map.remove(name);
}

pub(crate) fn tls_config(name: &str) -> Result<native_tls::TlsConnector> {
    let map = tls_configs().read().unwrap_or_else(|e| e.into_inner());
    map.get(name)
        .cloned()
        .ok_or_else(|| Error::BadConfig(format!("no TLS config registered under {name:?}")))
}

/// Build the connector for a configured TLS mode.
pub(crate) fn tls_connector_for(mode: &crate::opts::TlsMode) -> Result<native_tls::TlsConnector> {
    use crate::opts::TlsMode;
    match mode {
        TlsMode::Disabled => Err(Error::Bug(crate::error::eyre!(
            "TLS connector requested with TLS disabled"
        ))),
        TlsMode::Preferred | TlsMode::Required => Ok(native_tls::TlsConnector::new()?),
        TlsMode::SkipVerify => Ok(native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?),
        TlsMode::Custom(name) => tls_config(name),
    }
}

/// Register a dial function for a network name (e.g. a proxy dialer).
/// The built-in `tcp` and `unix` networks cannot be replaced.
pub fn register_dial_func(net: impl Into<String>, dial: DialFunc) {
    let mut map = dial_funcs().write().unwrap_or_else(|e| e.into_inner());
    map.insert(net.into(), dial);
}

pub(crate) fn dial_func(net: &str) -> Option<DialFunc> {
    let map = dial_funcs().read().unwrap_or_else(|e| e.into_inner());
    map.get(net).cloned()
}

/// Register a server RSA public key usable via `serverPubKey=<name>`,
/// skipping the in-band key request of `caching_sha2`/`sha256`.
pub fn register_server_pub_key(name: impl Into<String>, key: RsaPublicKey) {
    let mut map = server_pub_keys().write().unwrap_or_else(|e| e.into_inner());
    map.insert(name.into(), key);
}

pub fn deregister_server_pub_key(name: &str) {
    let mut map = server_pub_keys().write().unwrap_or_else(|e| e.into_inner());
    map.remove(name);
}

pub(crate) fn server_pub_key(name: &str) -> Result<RsaPublicKey> {
    let map = server_pub_keys().read().unwrap_or_else(|e| e.into_inner());
    map.get(name)
        .cloned()
        .ok_or_else(|| Error::BadConfig(format!("no server public key registered under {name:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_config_round_trip() {
        let connector = native_tls::TlsConnector::new().unwrap();
        register_tls_config("registry-test-tls", connector);
        assert!(tls_config("registry-test-tls").is_ok());
        deregister_tls_config("registry-test-tls");
        assert!(tls_config("registry-test-tls").is_err());
    }

    #[test]
    fn dial_func_lookup() {
        assert!(dial_func("registry-test-net").is_none());
        register_dial_func(
            "registry-test-net",
            Arc::new(|addr| TcpStream::connect(addr)),
        );
        assert!(dial_func("registry-test-net").is_some());
    }
}
