use pretty_assertions::assert_eq;

use crate::buffer::BufferSet;
use crate::constant::{CAPABILITIES_ALWAYS_ENABLED, CapabilityFlags};
use crate::error::Error;
use crate::opts::{Opts, TlsMode};
use crate::protocol::connection::{Handshake, HandshakeAction, read_initial_handshake};

const SEED: [u8; 20] = [
    10, 47, 74, 111, 75, 73, 34, 48, 88, 76, 114, 74, 37, 13, 3, 80, 82, 2, 23, 21,
];

fn server_caps() -> CapabilityFlags {
    CAPABILITIES_ALWAYS_ENABLED
        | CapabilityFlags::CLIENT_CONNECT_WITH_DB
        | CapabilityFlags::CLIENT_SSL
}

fn initial_packet(caps: CapabilityFlags, plugin: &str) -> Vec<u8> {
    let mut out = vec![10];
    out.extend_from_slice(b"8.0.36\0");
    out.extend_from_slice(&99u32.to_le_bytes());
    out.extend_from_slice(&SEED[..8]);
    out.push(0);
    out.extend_from_slice(&(caps.bits() as u16).to_le_bytes());
    out.push(45);
    out.extend_from_slice(&0x0002u16.to_le_bytes());
    out.extend_from_slice(&((caps.bits() >> 16) as u16).to_le_bytes());
    out.push(21);
    out.extend_from_slice(&[0u8; 10]);
    out.extend_from_slice(&SEED[8..]);
    out.push(0);
    out.extend_from_slice(plugin.as_bytes());
    out.push(0);
    out
}

fn ok_packet() -> Vec<u8> {
    vec![0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00]
}

#[derive(Debug, PartialEq)]
enum Event {
    Write(Vec<u8>),
    UpgradeTls,
}

/// Drive a handshake against scripted server payloads, recording what the
/// client would put on the wire.
fn drive(
    opts: &Opts,
    payloads: Vec<Vec<u8>>,
) -> Result<(Vec<Event>, crate::protocol::connection::HandshakeOutcome), Error> {
    let mut buffer_set = BufferSet::new();
    let mut payloads = payloads.into_iter();
    let mut events = Vec::new();
    let mut handshake = Handshake::new(opts, false);
    loop {
        match handshake.step(&mut buffer_set)? {
            HandshakeAction::ReadPacket(buffer) => {
                buffer.clear();
                buffer.extend_from_slice(&payloads.next().expect("script exhausted"));
            }
            HandshakeAction::WritePacket => {
                events.push(Event::Write(buffer_set.payload().to_vec()));
            }
            HandshakeAction::UpgradeTls => events.push(Event::UpgradeTls),
            HandshakeAction::Finished => {
                return Ok((events, handshake.finish()?));
            }
        }
    }
}

fn opts_with_password() -> Opts {
    Opts {
        user: "app".to_owned(),
        password: Some("secret".to_owned()),
        host: Some("localhost".to_owned()),
        db: Some("appdb".to_owned()),
        ..Opts::default()
    }
}

#[test]
fn initial_packet_parses() {
    let packet = initial_packet(server_caps(), "caching_sha2_password");
    let initial = read_initial_handshake(&packet).unwrap();
    assert_eq!(initial.protocol_version, 10);
    assert_eq!(initial.server_version, "8.0.36");
    assert_eq!(initial.connection_id, 99);
    assert_eq!(initial.auth_data, SEED);
    assert_eq!(initial.auth_plugin_name, "caching_sha2_password");
    assert!(initial.capability_flags.contains(CapabilityFlags::CLIENT_SSL));
}

#[test]
fn initial_packet_without_name_terminator() {
    let packet = initial_packet(server_caps(), "mysql_native_password");
    let truncated = &packet[..packet.len() - 1];
    let initial = read_initial_handshake(truncated).unwrap();
    assert_eq!(initial.auth_plugin_name, "mysql_native_password");
}

#[test]
fn old_protocol_version_is_refused() {
    let mut packet = initial_packet(server_caps(), "mysql_native_password");
    packet[0] = 9;
    assert!(read_initial_handshake(&packet).is_err());
}

#[test]
fn err_instead_of_initial_packet() {
    let mut packet = vec![0xFF];
    packet.extend_from_slice(&1130u16.to_le_bytes());
    packet.extend_from_slice(b"#HY000Host not allowed");
    assert!(matches!(
        read_initial_handshake(&packet),
        Err(Error::Server(_))
    ));
}

#[test]
fn caching_sha2_fast_auth() {
    // Scenario: handshake response carries the 32-byte token, the server
    // answers AuthMoreData(3) then OK; no extra client packet in between.
    let opts = opts_with_password();
    let (events, outcome) = drive(
        &opts,
        vec![
            initial_packet(server_caps() - CapabilityFlags::CLIENT_SSL, "caching_sha2_password"),
            vec![0x01, 0x03],
            ok_packet(),
        ],
    )
    .unwrap();

    assert_eq!(events.len(), 1, "only the handshake response is written");
    let Event::Write(response) = &events[0] else {
        panic!("expected a write");
    };
    // token appears length-prefixed in the response
    let token = crate::auth::sha256_scramble(&SEED, "secret");
    let mut needle = vec![32u8];
    needle.extend_from_slice(&token);
    assert!(
        response.windows(needle.len()).any(|w| w == needle),
        "auth token missing from handshake response"
    );
    assert_eq!(outcome.connection_id, 99);
    assert_eq!(outcome.server_version, "8.0.36");
}

#[test]
fn caching_sha2_full_auth_over_tls() {
    // Scenario: AuthMoreData(4) with TLS active; the client answers with
    // the cleartext password and a NUL in one packet.
    let opts = Opts {
        tls: TlsMode::Required,
        ..opts_with_password()
    };
    let (events, _) = drive(
        &opts,
        vec![
            initial_packet(server_caps(), "caching_sha2_password"),
            vec![0x01, 0x04],
            ok_packet(),
        ],
    )
    .unwrap();

    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], Event::Write(_))); // SSL request
    assert_eq!(events[1], Event::UpgradeTls);
    assert!(matches!(events[2], Event::Write(_))); // full response
    assert_eq!(events[3], Event::Write(b"secret\0".to_vec()));
}

#[test]
fn tls_required_but_not_offered() {
    let opts = Opts {
        tls: TlsMode::Required,
        ..opts_with_password()
    };
    let err = drive(
        &opts,
        vec![initial_packet(
            server_caps() - CapabilityFlags::CLIENT_SSL,
            "mysql_native_password",
        )],
    )
    .unwrap_err();
    assert!(matches!(err, Error::NoTls));
}

#[test]
fn tls_required_with_plaintext_fallback() {
    let opts = Opts {
        tls: TlsMode::Required,
        allow_fallback_to_plaintext: true,
        ..opts_with_password()
    };
    let (events, _) = drive(
        &opts,
        vec![
            initial_packet(
                server_caps() - CapabilityFlags::CLIENT_SSL,
                "mysql_native_password",
            ),
            ok_packet(),
        ],
    )
    .unwrap();
    assert!(events.iter().all(|e| !matches!(e, Event::UpgradeTls)));
}

#[test]
fn auth_switch_to_native() {
    // Server starts with caching_sha2, then switches to native with a
    // fresh challenge.
    let fresh: [u8; 20] = [9; 20];
    let mut switch = vec![0xFE];
    switch.extend_from_slice(b"mysql_native_password\0");
    switch.extend_from_slice(&fresh);
    switch.push(0);

    let opts = opts_with_password();
    let (events, _) = drive(
        &opts,
        vec![
            initial_packet(server_caps() - CapabilityFlags::CLIENT_SSL, "caching_sha2_password"),
            switch,
            ok_packet(),
        ],
    )
    .unwrap();

    assert_eq!(events.len(), 2);
    let Event::Write(reply) = &events[1] else {
        panic!("expected a write");
    };
    assert_eq!(
        reply,
        &crate::auth::native_scramble(&fresh, "secret").to_vec()
    );
}

#[test]
fn legacy_empty_auth_switch_uses_old_password_with_original_seed() {
    let opts = Opts {
        allow_old_passwords: true,
        ..opts_with_password()
    };
    let (events, _) = drive(
        &opts,
        vec![
            initial_packet(server_caps() - CapabilityFlags::CLIENT_SSL, "mysql_native_password"),
            vec![0xFE],
            ok_packet(),
        ],
    )
    .unwrap();

    let Event::Write(reply) = &events[1] else {
        panic!("expected a write");
    };
    let mut expected = crate::auth::old_scramble(&SEED, "secret").unwrap().to_vec();
    expected.push(0);
    assert_eq!(reply, &expected);
}

#[test]
fn unknown_plugin_in_auth_switch_is_fatal() {
    let mut switch = vec![0xFE];
    switch.extend_from_slice(b"quantum_password\0");
    switch.extend_from_slice(&[1, 2, 3, 4, 0]);

    let opts = opts_with_password();
    let err = drive(
        &opts,
        vec![
            initial_packet(server_caps() - CapabilityFlags::CLIENT_SSL, "mysql_native_password"),
            switch,
        ],
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnknownAuthPlugin(name) if name == "quantum_password"));
}
