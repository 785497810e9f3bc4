use std::io::{BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use native_tls::TlsStream;

use crate::error::{Error, Result};
use crate::opts::TlsMode;
use crate::registry;

pub enum Stream {
    Tcp(BufReader<TcpStream>),
    Tls(BufReader<TlsStream<TcpStream>>),
    Unix(BufReader<UnixStream>),
}

impl Stream {
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(BufReader::new(stream))
    }

    pub fn unix(stream: UnixStream) -> Self {
        Self::Unix(BufReader::new(stream))
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, Self::Unix(_))
    }

    pub fn upgrade_to_tls(self, mode: &TlsMode, host: &str) -> Result<Self> {
        let tcp = match self {
            Self::Tcp(buf_reader) => buf_reader.into_inner(),
            Self::Tls(_) => {
                return Err(Error::Bug(crate::error::eyre!("already using TLS")));
            }
            Self::Unix(_) => {
                return Err(Error::BadConfig(
                    "TLS is not supported over Unix sockets".to_owned(),
                ));
            }
        };

        let connector = registry::tls_connector_for(mode)?;
        let tls_stream = connector
            .connect(host, tcp)
            .map_err(|e| match e {
                native_tls::HandshakeError::Failure(e) => Error::Tls(e),
                native_tls::HandshakeError::WouldBlock(_) => Error::Io(std::io::Error::new(
                    std::io::ErrorKind::WouldBlock,
                    "TLS handshake would block",
                )),
            })?;

        Ok(Self::Tls(BufReader::new(tls_stream)))
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        match self {
            Self::Tcp(r) => r.read_exact(buf),
            Self::Tls(r) => r.read_exact(buf),
            Self::Unix(r) => r.read_exact(buf),
        }
    }

    pub fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Tcp(r) => r.get_mut().write_all(buf),
            Self::Tls(r) => r.get_mut().write_all(buf),
            Self::Unix(r) => r.get_mut().write_all(buf),
        }
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Tcp(r) => r.get_mut().flush(),
            Self::Tls(r) => r.get_mut().flush(),
            Self::Unix(r) => r.get_mut().flush(),
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        match self {
            Self::Tcp(r) => r.get_ref().set_read_timeout(timeout),
            Self::Tls(r) => r.get_ref().get_ref().set_read_timeout(timeout),
            Self::Unix(r) => r.get_ref().set_read_timeout(timeout),
        }
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        match self {
            Self::Tcp(r) => r.get_ref().set_write_timeout(timeout),
            Self::Tls(r) => r.get_ref().get_ref().set_write_timeout(timeout),
            Self::Unix(r) => r.get_ref().set_write_timeout(timeout),
        }
    }

    /// A duplicated raw handle for the watcher and the liveness probe.
    /// For TLS streams this is the underlying TCP socket.
    pub(crate) fn watch_handle(&self) -> std::io::Result<WatchHandle> {
        match self {
            Self::Tcp(r) => Ok(WatchHandle::Tcp(r.get_ref().try_clone()?)),
            Self::Tls(r) => Ok(WatchHandle::Tcp(r.get_ref().get_ref().try_clone()?)),
            Self::Unix(r) => Ok(WatchHandle::Unix(r.get_ref().try_clone()?)),
        }
    }
}

/// A cloned socket handle. The watcher's only permitted mutation is the
/// shutdown that unblocks in-flight I/O; the probe only peeks.
pub(crate) enum WatchHandle {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl WatchHandle {
    pub(crate) fn shutdown(&self) {
        let _ = match self {
            Self::Tcp(s) => s.shutdown(Shutdown::Both),
            Self::Unix(s) => s.shutdown(Shutdown::Both),
        };
    }

    /// Zero-timeout probe of an idle connection. The server has nothing to
    /// say between commands, so any readable byte, EOF, or socket error
    /// means the connection is dead or out of sync.
    pub(crate) fn check_liveness(&self) -> Result<()> {
        let mut probe = [0u8; 1];
        let outcome = match self {
            Self::Tcp(s) => {
                s.set_nonblocking(true)?;
                let peeked = s.peek(&mut probe);
                let restore = s.set_nonblocking(false);
                restore?;
                peeked
            }
            Self::Unix(s) => {
                s.set_nonblocking(true)?;
                let mut probe = [std::mem::MaybeUninit::new(0u8)];
                let peeked = socket2::SockRef::from(s).peek(&mut probe).map(|_| 0);
                let restore = s.set_nonblocking(false);
                restore?;
                peeked
            }
        };
        match outcome {
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Ok(_) | Err(_) => Err(Error::BadConnection),
        }
    }
}
