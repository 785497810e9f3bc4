mod handshake;

pub use handshake::{
    Handshake, HandshakeAction, HandshakeOutcome, InitialHandshake, read_initial_handshake,
};
