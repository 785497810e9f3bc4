use std::time::Duration;

use tokio::time::Instant;

use super::{OpLimit, Transport};
use crate::cancel::CancelContext;
use crate::error::Error;

#[tokio::test]
async fn guard_lets_ready_io_through() {
    let result: crate::error::Result<u8> =
        Transport::guard(OpLimit::None, None, async { Ok(7u8) }).await;
    assert_eq!(result.unwrap(), 7);
}

#[tokio::test]
async fn guard_cancel_beats_pending_io() {
    let ctx = CancelContext::new();
    let trigger = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            ctx.cancel();
        })
    };

    let result: crate::error::Result<()> = Transport::guard(
        OpLimit::None,
        Some(&ctx),
        std::future::pending::<std::io::Result<()>>(),
    )
    .await;
    assert!(matches!(result, Err(Error::ContextCanceled)));
    trigger.await.unwrap();
}

#[tokio::test]
async fn guard_already_cancelled_context_fires_immediately() {
    let ctx = CancelContext::new();
    ctx.cancel();
    let result: crate::error::Result<()> = Transport::guard(
        OpLimit::None,
        Some(&ctx),
        std::future::pending::<std::io::Result<()>>(),
    )
    .await;
    assert!(matches!(result, Err(Error::ContextCanceled)));
}

#[tokio::test]
async fn guard_timeout_maps_to_io_timeout() {
    let at = Instant::now() + Duration::from_millis(10);
    let result: crate::error::Result<()> = Transport::guard(
        OpLimit::Timeout(at),
        None,
        std::future::pending::<std::io::Result<()>>(),
    )
    .await;
    match result {
        Err(Error::Io(err)) => assert_eq!(err.kind(), std::io::ErrorKind::TimedOut),
        other => panic!("expected an i/o timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn guard_deadline_maps_to_deadline_error() {
    let at = Instant::now() + Duration::from_millis(10);
    let result: crate::error::Result<()> = Transport::guard(
        OpLimit::Deadline(at),
        None,
        std::future::pending::<std::io::Result<()>>(),
    )
    .await;
    assert!(matches!(result, Err(Error::ContextDeadlineExceeded)));
}

#[tokio::test]
async fn guard_io_error_passes_through_unmapped() {
    let ctx = CancelContext::new();
    let result: crate::error::Result<()> = Transport::guard(
        OpLimit::None,
        Some(&ctx),
        async {
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "peer reset",
            ))
        },
    )
    .await;
    match result {
        Err(Error::Io(err)) => assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset),
        other => panic!("expected the io error, got {other:?}"),
    }
}

#[tokio::test]
async fn run_blocking_completes_off_the_worker() {
    let (mut transport, _server) = pair().await;
    transport.arm(None);
    let value = transport
        .run_blocking(|| Ok::<_, Error>(40 + 2))
        .await
        .unwrap();
    assert_eq!(value, 42);
}

#[tokio::test]
async fn run_blocking_raced_by_cancel() {
    let (mut transport, _server) = pair().await;
    let ctx = CancelContext::new();
    transport.arm(Some(&ctx));

    let trigger = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            ctx.cancel();
        })
    };

    // a reader that never produces data: the race must resolve via cancel
    let result = transport
        .run_blocking(|| -> crate::error::Result<()> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .await;
    assert!(matches!(result, Err(Error::ContextCanceled)));
    trigger.await.unwrap();
}

async fn pair() -> (Transport, std::net::TcpStream) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = tokio::net::TcpStream::connect(addr).await.unwrap();
    let (server, _) = listener.accept().unwrap();
    (
        Transport::new(
            super::super::stream::Stream::tcp(client),
            None,
            None,
            crate::constant::DEFAULT_MAX_ALLOWED_PACKET,
        ),
        server,
    )
}
