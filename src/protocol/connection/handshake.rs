use crate::auth::{self, AuthCtx, AuthPlugin, AuthReply};
use crate::buffer::BufferSet;
use crate::constant::{CapabilityFlags, MAX_PAYLOAD_LENGTH, ServerStatusFlags};
use crate::error::{Error, Result, eyre};
use crate::opts::{Opts, TlsMode};
use crate::protocol::primitive::*;
use crate::protocol::response::{ErrPayloadBytes, OkPayload, OkPayloadBytes};
use std::sync::Arc;

/// The fallback plugin when a server announces one this build has never
/// heard of; the server will issue an auth switch if it disagrees.
const DEFAULT_AUTH_PLUGIN: &str = "mysql_native_password";

// ============================================================================
// Initial Handshake Packet (Server -> Client)
// ============================================================================

/// Initial handshake packet from server (Protocol::HandshakeV10)
///
/// Packet format:
/// ```text
/// 1   [0a] protocol version (must be >= 10)
/// n   server version (null-terminated string)
/// 4   connection id
/// 8   auth-plugin-data-part-1 (first 8 bytes of the challenge)
/// 1   [00] filler
/// 2   capability flags (lower 2 bytes)
/// 1   character set
/// 2   status flags
/// 2   capability flags (upper 2 bytes)
/// 1   auth plugin data length
/// 10  reserved (all 0x00)
/// n   auth-plugin-data-part-2 (>= 12 more bytes, trailing NUL tolerated)
/// n   auth plugin name (not strictly null-terminated on all versions)
/// ```
#[derive(Debug, Clone)]
pub struct InitialHandshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    /// The full challenge (part 1 ++ part 2), trailing NUL stripped.
    pub auth_data: Vec<u8>,
    pub capability_flags: CapabilityFlags,
    pub charset: u8,
    pub status_flags: ServerStatusFlags,
    pub auth_plugin_name: String,
}

/// Read the initial handshake packet from the server.
pub fn read_initial_handshake(payload: &[u8]) -> Result<InitialHandshake> {
    // A server that refuses the connection outright sends an ERR packet
    // in place of the handshake.
    if payload.first() == Some(&0xFF) {
        return Err(ErrPayloadBytes(payload).into());
    }

    let (protocol_version, data) = read_int_1(payload)?;
    if protocol_version < 10 {
        return Err(Error::MalformedPacket);
    }

    let (server_version, data) = read_string_null(data)?;
    let server_version = String::from_utf8_lossy(server_version).to_string();

    let (connection_id, data) = read_int_4(data)?;

    let (auth_data_1, data) = read_string_fix(data, 8)?;
    let (_filler, data) = read_int_1(data)?;

    let (cap_lower, data) = read_int_2(data)?;
    let (charset, data) = read_int_1(data)?;
    let (status_flags, data) = read_int_2(data)?;
    let (cap_upper, data) = read_int_2(data)?;

    let cap_bits = ((cap_upper as u32) << 16) | (cap_lower as u32);
    let capability_flags = CapabilityFlags::from_bits_retain(cap_bits);

    let (auth_data_len, data) = read_int_1(data)?;
    let (_reserved, data) = read_string_fix(data, 10)?;

    // Part 2 of the challenge: at least 12 bytes; length byte counts part 1
    // plus a trailing NUL on servers that send one.
    let part2_len = (auth_data_len as usize).saturating_sub(9).max(12);
    let part2_len = part2_len.min(data.len());
    let (auth_data_2, data) = read_string_fix(data, part2_len)?;

    let mut auth_data = Vec::with_capacity(8 + part2_len);
    auth_data.extend_from_slice(auth_data_1);
    auth_data.extend_from_slice(auth_data_2);
    if auth_data.last() == Some(&0) {
        auth_data.pop();
    }

    // Plugin name: null-terminated on most servers, but some versions run
    // it to the packet boundary. Consume up to whichever comes first.
    let auth_plugin_name = if capability_flags.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) {
        let data = data.strip_prefix(&[0u8][..]).unwrap_or(data);
        let name = match memchr::memchr(0, data) {
            Some(end) => &data[..end],
            None => data,
        };
        String::from_utf8_lossy(name).to_string()
    } else {
        String::new()
    };

    Ok(InitialHandshake {
        protocol_version,
        server_version,
        connection_id,
        auth_data,
        capability_flags,
        charset,
        status_flags: ServerStatusFlags::from_bits_truncate(status_flags),
        auth_plugin_name,
    })
}

// ============================================================================
// Handshake Response Packet (Client -> Server)
// ============================================================================

/// Write the short-form response announcing only the SSL capability; the
/// full response follows through the TLS channel.
fn write_ssl_request(out: &mut Vec<u8>, capabilities: CapabilityFlags, collation: u8) {
    write_int_4(out, capabilities.bits());
    write_int_4(out, MAX_PAYLOAD_LENGTH as u32);
    write_int_1(out, collation);
    out.extend_from_slice(&[0u8; 23]);
}

/// Write the full handshake response (HandshakeResponse41).
fn write_handshake_response(
    out: &mut Vec<u8>,
    capabilities: CapabilityFlags,
    opts: &Opts,
    auth_response: &[u8],
    plugin_name: &str,
) {
    write_int_4(out, capabilities.bits());
    write_int_4(out, MAX_PAYLOAD_LENGTH as u32);
    write_int_1(out, opts.collation_byte());
    out.extend_from_slice(&[0u8; 23]);

    write_string_null(out, &opts.user);

    if capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA) {
        write_bytes_lenenc(out, auth_response);
    } else {
        write_int_1(out, auth_response.len() as u8);
        out.extend_from_slice(auth_response);
    }

    if capabilities.contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB)
        && let Some(db) = &opts.db
    {
        write_string_null(out, db);
    }

    if capabilities.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) {
        write_string_null(out, plugin_name);
    }

    if capabilities.contains(CapabilityFlags::CLIENT_CONNECT_ATTRS) {
        write_connect_attrs(out);
    }
}

fn write_connect_attrs(out: &mut Vec<u8>) {
    let program = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default();
    let pid = std::process::id().to_string();
    let attrs: [(&str, &str); 6] = [
        ("_client_name", "keel-mysql"),
        ("_client_version", env!("CARGO_PKG_VERSION")),
        ("_os", std::env::consts::OS),
        ("_platform", std::env::consts::ARCH),
        ("_pid", &pid),
        ("program_name", &program),
    ];

    let mut block = Vec::new();
    for (key, value) in attrs {
        write_string_lenenc(&mut block, key);
        write_string_lenenc(&mut block, value);
    }
    write_bytes_lenenc(out, &block);
}

// ============================================================================
// Handshake driver
// ============================================================================

/// I/O the connection must perform before stepping the handshake again.
pub enum HandshakeAction<'buf> {
    /// Read the next payload into this buffer.
    ReadPacket(&'buf mut Vec<u8>),
    /// Send the pending payload in the write buffer.
    WritePacket,
    /// Establish TLS on the socket, then step again.
    UpgradeTls,
    /// Authentication succeeded.
    Finished,
}

enum HandshakeState {
    Start,
    ReadInitial,
    /// SSL request written; the socket upgrades next.
    SslRequestSent,
    /// TLS established; the full response goes out next.
    WriteResponse,
    /// A response packet was written; read the server's verdict.
    ResponseSent,
    AuthResult,
    Done,
}

/// What a completed handshake hands to the connection.
#[derive(Debug, Clone)]
pub struct HandshakeOutcome {
    pub server_version: String,
    pub connection_id: u32,
    /// Effective capabilities: announced ∩ server.
    pub capabilities: CapabilityFlags,
    pub status_flags: ServerStatusFlags,
    /// The OK packet that closed authentication.
    pub ok: OkPayload,
}

/// Sans-io driver for connection setup: initial packet, optional TLS
/// upgrade, handshake response, and the auth-switch loop.
pub struct Handshake<'a> {
    state: HandshakeState,
    ctx: AuthCtx<'a>,
    initial: Option<InitialHandshake>,
    capabilities: CapabilityFlags,
    use_tls: bool,
    plugin: Option<Arc<dyn AuthPlugin>>,
    plugin_name: String,
    challenge: Vec<u8>,
    outcome: Option<HandshakeOutcome>,
}

impl<'a> Handshake<'a> {
    /// `secure_transport` is true for Unix sockets, where cleartext schemes
    /// are acceptable without TLS.
    pub fn new(opts: &'a Opts, secure_transport: bool) -> Self {
        Self {
            state: HandshakeState::Start,
            ctx: AuthCtx::new(opts, secure_transport),
            initial: None,
            capabilities: CapabilityFlags::empty(),
            use_tls: false,
            plugin: None,
            plugin_name: String::new(),
            challenge: Vec::new(),
            outcome: None,
        }
    }

    /// Whether the negotiation settled on TLS.
    pub fn tls_negotiated(&self) -> bool {
        self.use_tls
    }

    /// Consume the driver after [`HandshakeAction::Finished`].
    pub fn finish(self) -> Result<HandshakeOutcome> {
        self.outcome
            .ok_or_else(|| Error::Bug(eyre!("Handshake::finish before completion")))
    }

    fn decide_tls(&self, server: CapabilityFlags) -> Result<bool> {
        let offered = server.contains(CapabilityFlags::CLIENT_SSL);
        match &self.ctx.opts.tls {
            TlsMode::Disabled => Ok(false),
            TlsMode::Preferred => Ok(offered),
            TlsMode::Required | TlsMode::SkipVerify | TlsMode::Custom(_) => {
                if offered {
                    Ok(true)
                } else if self.ctx.opts.allow_fallback_to_plaintext {
                    Ok(false)
                } else {
                    Err(Error::NoTls)
                }
            }
        }
    }

    fn select_plugin(&mut self, name: &str) -> Result<Arc<dyn AuthPlugin>> {
        let plugin = match auth::lookup_auth_plugin(name) {
            Ok(plugin) => plugin,
            // Unknown default plugin in the initial packet: answer with our
            // default and let the server switch. Unknown plugins in an
            // auth-switch are fatal.
            Err(err) => {
                if self.initial.as_ref().is_some_and(|i| i.auth_plugin_name == name)
                    && !matches!(self.state, HandshakeState::AuthResult)
                {
                    auth::lookup_auth_plugin(DEFAULT_AUTH_PLUGIN).map_err(|_| err)?
                } else {
                    return Err(err);
                }
            }
        };
        self.plugin_name = plugin.name().to_owned();
        self.plugin = Some(Arc::clone(&plugin));
        Ok(plugin)
    }

    fn write_full_response(&mut self, buffer_set: &mut BufferSet) -> Result<()> {
        let initial = self
            .initial
            .as_ref()
            .ok_or_else(|| Error::Bug(eyre!("response before initial packet")))?
            .clone();
        let plugin = self.select_plugin(&initial.auth_plugin_name)?;
        self.challenge = initial.auth_data.clone();
        let auth_response = plugin.init(&self.challenge, &mut self.ctx)?;
        let plugin_name = self.plugin_name.clone();
        write_handshake_response(
            buffer_set.new_write_buffer(),
            self.capabilities,
            self.ctx.opts,
            &auth_response,
            &plugin_name,
        );
        Ok(())
    }

    pub fn step<'buf>(&mut self, buffer_set: &'buf mut BufferSet) -> Result<HandshakeAction<'buf>> {
        match self.state {
            HandshakeState::Start => {
                self.state = HandshakeState::ReadInitial;
                Ok(HandshakeAction::ReadPacket(&mut buffer_set.read_buffer))
            }

            HandshakeState::ReadInitial => {
                let initial = read_initial_handshake(&buffer_set.read_buffer)?;
                tracing::debug!(
                    server_version = %initial.server_version,
                    connection_id = initial.connection_id,
                    plugin = %initial.auth_plugin_name,
                    "received initial handshake"
                );

                let client = self.ctx.opts.client_capabilities();
                self.use_tls = self.decide_tls(initial.capability_flags)?;
                let mut effective = client & initial.capability_flags;
                effective.set(CapabilityFlags::CLIENT_SSL, self.use_tls);
                self.capabilities = effective;
                self.initial = Some(initial);

                if self.use_tls {
                    let collation = self.ctx.opts.collation_byte();
                    write_ssl_request(
                        buffer_set.new_write_buffer(),
                        self.capabilities,
                        collation,
                    );
                    self.state = HandshakeState::SslRequestSent;
                    Ok(HandshakeAction::WritePacket)
                } else {
                    self.write_full_response(buffer_set)?;
                    self.state = HandshakeState::ResponseSent;
                    Ok(HandshakeAction::WritePacket)
                }
            }

            HandshakeState::SslRequestSent => {
                self.state = HandshakeState::WriteResponse;
                Ok(HandshakeAction::UpgradeTls)
            }

            HandshakeState::WriteResponse => {
                // The channel is encrypted from here on.
                self.ctx.secure = true;
                self.write_full_response(buffer_set)?;
                self.state = HandshakeState::ResponseSent;
                Ok(HandshakeAction::WritePacket)
            }

            HandshakeState::ResponseSent => {
                self.state = HandshakeState::AuthResult;
                Ok(HandshakeAction::ReadPacket(&mut buffer_set.read_buffer))
            }

            HandshakeState::AuthResult => self.auth_result(buffer_set),

            HandshakeState::Done => {
                Err(Error::Bug(eyre!("Handshake::step called after finished")))
            }
        }
    }

    fn auth_result<'buf>(
        &mut self,
        buffer_set: &'buf mut BufferSet,
    ) -> Result<HandshakeAction<'buf>> {
        let payload = std::mem::take(&mut buffer_set.read_buffer);
        let action = self.auth_result_inner(&payload, buffer_set);
        buffer_set.read_buffer = payload;
        match action? {
            PendingAction::Read => {
                Ok(HandshakeAction::ReadPacket(&mut buffer_set.read_buffer))
            }
            PendingAction::Write => Ok(HandshakeAction::WritePacket),
            PendingAction::Finished => Ok(HandshakeAction::Finished),
        }
    }

    fn auth_result_inner(
        &mut self,
        payload: &[u8],
        buffer_set: &mut BufferSet,
    ) -> Result<PendingAction> {
        match payload.first() {
            None => Err(Error::MalformedPacket),

            Some(0x00) => {
                let initial = self
                    .initial
                    .as_ref()
                    .ok_or_else(|| Error::Bug(eyre!("auth result before initial packet")))?;
                let ok = OkPayload::parse(OkPayloadBytes(payload), self.capabilities)?;
                self.outcome = Some(HandshakeOutcome {
                    server_version: initial.server_version.clone(),
                    connection_id: initial.connection_id,
                    capabilities: self.capabilities,
                    status_flags: ok.status_flags,
                    ok,
                });
                self.state = HandshakeState::Done;
                Ok(PendingAction::Finished)
            }

            Some(0xFF) => Err(ErrPayloadBytes(payload).into()),

            Some(0xFE) => {
                // Auth switch request: plugin name and a fresh challenge.
                // The one-byte legacy form asks for the pre-4.1 scheme with
                // the original seed.
                let (plugin_name, challenge) = if payload.len() == 1 {
                    let seed = self
                        .initial
                        .as_ref()
                        .map(|i| i.auth_data.clone())
                        .unwrap_or_default();
                    ("mysql_old_password".to_owned(), seed)
                } else {
                    let (name, data) = read_string_null(&payload[1..])?;
                    let challenge = match data.split_last() {
                        Some((0, head)) => head.to_vec(),
                        _ => data.to_vec(),
                    };
                    (String::from_utf8_lossy(name).to_string(), challenge)
                };
                tracing::debug!(plugin = %plugin_name, "auth switch requested");

                let plugin = auth::lookup_auth_plugin(&plugin_name)?;
                self.plugin_name = plugin.name().to_owned();
                self.plugin = Some(Arc::clone(&plugin));
                self.challenge = challenge;
                let response = plugin.init(&self.challenge, &mut self.ctx)?;
                buffer_set.new_write_buffer().extend_from_slice(&response);
                self.state = HandshakeState::ResponseSent;
                Ok(PendingAction::Write)
            }

            Some(0x01) => {
                let plugin = self
                    .plugin
                    .as_ref()
                    .map(Arc::clone)
                    .ok_or(Error::MalformedPacket)?;
                match plugin.more_data(&payload[1..], &self.challenge, &mut self.ctx)? {
                    AuthReply::Packet(packet) => {
                        buffer_set.new_write_buffer().extend_from_slice(&packet);
                        self.state = HandshakeState::ResponseSent;
                        Ok(PendingAction::Write)
                    }
                    AuthReply::Await => Ok(PendingAction::Read),
                }
            }

            // The auth loop knows exactly four markers; anything else is a
            // protocol violation.
            Some(_) => Err(Error::MalformedPacket),
        }
    }
}

enum PendingAction {
    Read,
    Write,
    Finished,
}

#[cfg(test)]
#[path = "handshake_test.rs"]
mod handshake_test;
