use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};
use tokio_native_tls::TlsStream;

use crate::error::{Error, Result};
use crate::opts::TlsMode;

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

    pub async fn upgrade_to_tls(self, mode: &TlsMode, host: &str) -> Result<Self> {
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

        let connector = crate::registry::tls_connector_for(mode)?;
        let connector = tokio_native_tls::TlsConnector::from(connector);
        let tls_stream = connector
            .connect(host, tcp)
            .await
            .map_err(Error::Tls)?;

        Ok(Self::Tls(BufReader::new(tls_stream)))
    }

    pub async fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        match self {
            Self::Tcp(r) => r.read_exact(buf).await.map(|_| ()),
            Self::Tls(r) => r.read_exact(buf).await.map(|_| ()),
            Self::Unix(r) => r.read_exact(buf).await.map(|_| ()),
        }
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Tcp(r) => r.get_mut().write_all(buf).await,
            Self::Tls(r) => r.get_mut().write_all(buf).await,
            Self::Unix(r) => r.get_mut().write_all(buf).await,
        }
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Tcp(r) => r.get_mut().flush().await,
            Self::Tls(r) => r.get_mut().flush().await,
            Self::Unix(r) => r.get_mut().flush().await,
        }
    }

    /// Zero-timeout probe of an idle connection: any readable byte, EOF, or
    /// error means the connection is dead or out of sync. Consuming a byte
    /// is fine because a positive probe discards the connection anyway.
    pub(crate) fn check_liveness(&self) -> Result<()> {
        let mut probe = [0u8; 1];
        let outcome = match self {
            Self::Tcp(r) => r.get_ref().try_read(&mut probe),
            Self::Tls(r) => r.get_ref().get_ref().get_ref().get_ref().try_read(&mut probe),
            Self::Unix(r) => r.get_ref().try_read(&mut probe),
        };
        match outcome {
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Ok(_) | Err(_) => Err(Error::BadConnection),
        }
    }
}
