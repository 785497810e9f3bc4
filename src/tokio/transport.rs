use std::time::Duration;

use tokio::time::Instant;
use zerocopy::{FromBytes, FromZeros, IntoBytes};

use crate::cancel::CancelContext;
use crate::constant::MAX_PAYLOAD_LENGTH;
use crate::error::{Error, Result, eyre};
use crate::protocol::compress::{compress_frames, decompress_frame};
use crate::protocol::packet::{CompressedHeader, PacketHeader};

use super::stream::Stream;

/// Which composed limit fires first for an I/O op.
#[derive(Clone, Copy)]
enum OpLimit {
    None,
    /// Configured read/write timeout.
    Timeout(Instant),
    /// The armed command deadline.
    Deadline(Instant),
}

/// Async framed, sequence-checked transport.
///
/// Deadlines and cancellation are composed around each socket operation:
/// every op races the configured per-op timeout, the armed command
/// deadline, and the armed cancellation signal.
pub(crate) struct Transport {
    stream: Option<Stream>,
    sequence: u8,
    compress_sequence: u8,
    compression: Option<Decompressed>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    command_deadline: Option<Instant>,
    cancel: Option<CancelContext>,
    pub(crate) max_allowed_packet: usize,
}

#[derive(Default)]
struct Decompressed {
    data: Vec<u8>,
    pos: usize,
}

impl Transport {
    pub(crate) fn new(
        stream: Stream,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
        max_allowed_packet: usize,
    ) -> Self {
        Self {
            stream: Some(stream),
            sequence: 0,
            compress_sequence: 0,
            compression: None,
            read_timeout,
            write_timeout,
            command_deadline: None,
            cancel: None,
            max_allowed_packet,
        }
    }

    pub(crate) fn stream_ref(&self) -> Result<&Stream> {
        self.stream.as_ref().ok_or(Error::InvalidConnection)
    }

    pub(crate) fn enable_compression(&mut self) {
        self.compression = Some(Decompressed::default());
        self.sequence = 0;
        self.compress_sequence = 0;
    }

    pub(crate) fn reset_sequence(&mut self) {
        self.sequence = 0;
        self.compress_sequence = 0;
    }

    /// Arm the transport for one command.
    pub(crate) fn arm(&mut self, ctx: Option<&CancelContext>) {
        self.command_deadline = ctx
            .and_then(CancelContext::deadline)
            .map(Instant::from_std);
        self.cancel = ctx.cloned();
    }

    pub(crate) fn disarm(&mut self) {
        self.command_deadline = None;
        self.cancel = None;
    }

    pub(crate) async fn upgrade_to_tls(
        &mut self,
        mode: &crate::opts::TlsMode,
        host: &str,
    ) -> Result<()> {
        let stream = self.stream.take().ok_or(Error::InvalidConnection)?;
        self.stream = Some(stream.upgrade_to_tls(mode, host).await?);
        Ok(())
    }

    fn op_limit(&self, configured: Option<Duration>) -> OpLimit {
        let timeout = configured.map(|t| Instant::now() + t);
        match (timeout, self.command_deadline) {
            (Some(t), Some(d)) if d <= t => OpLimit::Deadline(d),
            (Some(t), _) => OpLimit::Timeout(t),
            (None, Some(d)) => OpLimit::Deadline(d),
            (None, None) => OpLimit::None,
        }
    }

    /// Race an I/O future against the op limit and the cancel signal.
    async fn guard<T>(
        limit: OpLimit,
        cancel: Option<&CancelContext>,
        io: impl Future<Output = std::io::Result<T>>,
    ) -> Result<T> {
        Self::guard_result(limit, cancel, async { Ok(io.await?) }).await
    }

    async fn guard_result<T>(
        limit: OpLimit,
        cancel: Option<&CancelContext>,
        io: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let cancelled = async {
            match cancel {
                Some(ctx) => ctx.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match limit {
                OpLimit::None => std::future::pending().await,
                OpLimit::Timeout(at) => {
                    tokio::time::sleep_until(at).await;
                    Error::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "i/o timeout",
                    ))
                }
                OpLimit::Deadline(at) => {
                    tokio::time::sleep_until(at).await;
                    Error::ContextDeadlineExceeded
                }
            }
        };
        tokio::select! {
            result = io => result,
            () = cancelled => Err(Error::ContextCanceled),
            err = expired => Err(err),
        }
    }

    /// Run a blocking step (filesystem access, a registered INFILE reader)
    /// on the blocking pool, raced against the armed deadline and cancel
    /// signal like any other suspension point.
    pub(crate) async fn run_blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let limit = self.op_limit(self.read_timeout);
        let cancel = self.cancel.clone();
        Self::guard_result(limit, cancel.as_ref(), async {
            match tokio::task::spawn_blocking(work).await {
                Ok(result) => result,
                Err(join) => Err(Error::Bug(eyre!("blocking task failed: {join}"))),
            }
        })
        .await
    }

    async fn read_plain(&mut self, offset: usize, buffer: &mut Vec<u8>) -> Result<()> {
        if self.compression.is_none() {
            let limit = self.op_limit(self.read_timeout);
            let cancel = self.cancel.clone();
            let stream = self.stream.as_mut().ok_or(Error::InvalidConnection)?;
            return Self::guard(limit, cancel.as_ref(), stream.read_exact(&mut buffer[offset..]))
                .await;
        }

        let mut filled = offset;
        while filled < buffer.len() {
            let available = {
                let decompressed = self.compression.as_ref().ok_or(Error::InvalidConnection)?;
                decompressed.data.len() - decompressed.pos
            };
            if available == 0 {
                self.fill_decompressed().await?;
                continue;
            }
            let take = available.min(buffer.len() - filled);
            let decompressed = self.compression.as_mut().ok_or(Error::InvalidConnection)?;
            buffer[filled..filled + take]
                .copy_from_slice(&decompressed.data[decompressed.pos..decompressed.pos + take]);
            decompressed.pos += take;
            filled += take;
        }
        Ok(())
    }

    async fn fill_decompressed(&mut self) -> Result<()> {
        let limit = self.op_limit(self.read_timeout);
        let cancel = self.cancel.clone();
        let stream = self.stream.as_mut().ok_or(Error::InvalidConnection)?;

        let mut header = CompressedHeader::new_zeroed();
        Self::guard(limit, cancel.as_ref(), stream.read_exact(header.as_mut_bytes())).await?;

        if header.sequence_id != self.compress_sequence {
            return Err(if header.sequence_id < self.compress_sequence {
                Error::OutOfSync
            } else {
                Error::OutOfSyncMultiStatements
            });
        }
        self.compress_sequence = self.compress_sequence.wrapping_add(1);

        let mut body = vec![0u8; header.compressed_length()];
        Self::guard(limit, cancel.as_ref(), stream.read_exact(&mut body)).await?;

        let decompressed = self.compression.as_mut().ok_or(Error::InvalidConnection)?;
        if decompressed.pos == decompressed.data.len() {
            decompressed.data.clear();
            decompressed.pos = 0;
        }
        decompress_frame(&header, &body, &mut decompressed.data)?;
        Ok(())
    }

    /// Read one logical payload, reassembling split frames.
    pub(crate) async fn read_packet(&mut self, buffer: &mut Vec<u8>) -> Result<()> {
        buffer.clear();
        let mut header_buf = vec![0u8; 4];

        loop {
            self.read_plain(0, &mut header_buf).await?;
            let header =
                PacketHeader::ref_from_bytes(&header_buf).map_err(|_| Error::MalformedPacket)?;

            if header.sequence_id != self.sequence {
                return Err(if header.sequence_id < self.sequence {
                    Error::OutOfSync
                } else {
                    Error::OutOfSyncMultiStatements
                });
            }
            self.sequence = self.sequence.wrapping_add(1);

            let length = header.length();
            let start = buffer.len();
            buffer.resize(start + length, 0);
            self.read_plain(start, buffer).await?;

            if length < MAX_PAYLOAD_LENGTH {
                return Ok(());
            }
        }
    }

    /// Send one logical payload from `[4-byte header space][payload]`.
    pub(crate) async fn write_packet(&mut self, buffer: &mut Vec<u8>) -> Result<()> {
        let payload_len = buffer.len().saturating_sub(4);
        if payload_len > self.max_allowed_packet {
            return Err(Error::PacketTooLarge);
        }

        if self.compression.is_some() {
            return self.write_packet_compressed(buffer).await;
        }

        let limit = self.op_limit(self.write_timeout);
        let cancel = self.cancel.clone();

        let mut offset = 0usize;
        loop {
            let chunk_size = (buffer.len() - offset - 4).min(MAX_PAYLOAD_LENGTH);
            PacketHeader::mut_from_bytes(&mut buffer[offset..offset + 4])?
                .encode_in_place(chunk_size, self.sequence);
            self.sequence = self.sequence.wrapping_add(1);
            {
                let stream = self.stream.as_mut().ok_or(Error::InvalidConnection)?;
                let frame = &buffer[offset..offset + 4 + chunk_size];
                Self::guard(
                    limit,
                    cancel.as_ref(),
                    stream.write_all(frame),
                )
                .await?;
            }

            if chunk_size < MAX_PAYLOAD_LENGTH {
                break;
            }
            offset += chunk_size;
        }
        let stream = self.stream.as_mut().ok_or(Error::InvalidConnection)?;
        Self::guard(limit, cancel.as_ref(), stream.flush()).await?;
        Ok(())
    }

    async fn write_packet_compressed(&mut self, buffer: &mut Vec<u8>) -> Result<()> {
        let mut plain = Vec::with_capacity(buffer.len() + 8);
        let payload = &buffer[4..];
        let mut offset = 0;
        loop {
            let chunk_size = (payload.len() - offset).min(MAX_PAYLOAD_LENGTH);
            let header = PacketHeader::encode(chunk_size, self.sequence);
            self.sequence = self.sequence.wrapping_add(1);
            plain.extend_from_slice(header.as_bytes());
            plain.extend_from_slice(&payload[offset..offset + chunk_size]);
            offset += chunk_size;
            if chunk_size < MAX_PAYLOAD_LENGTH {
                break;
            }
        }

        let frames = compress_frames(&plain, &mut self.compress_sequence)?;
        let limit = self.op_limit(self.write_timeout);
        let cancel = self.cancel.clone();
        let stream = self.stream.as_mut().ok_or(Error::InvalidConnection)?;
        for frame in &frames {
            Self::guard(
                limit,
                cancel.as_ref(),
                stream.write_all(frame.header.as_bytes()),
            )
            .await?;
            Self::guard(limit, cancel.as_ref(), stream.write_all(&frame.body))
                .await?;
        }
        Self::guard(limit, cancel.as_ref(), stream.flush()).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;
