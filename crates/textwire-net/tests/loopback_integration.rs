//! Loopback integration tests for sender and listener together.
//!
//! Every test listens on a loopback port the OS reported free a moment
//! earlier, so tests can run in parallel.  Raw `TcpStream` writers are used where a test needs
//! control over how bytes are split or batched on the wire.
//!
//! ```text
//! FramedSender / raw TcpStream ══ loopback ══> FramedReceiver ──> channel
//! ```

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use textwire_core::encode_frame;
use textwire_net::domain::{MessageEvent, ReceiverConfig, SenderConfig, TransportError};
use textwire_net::infrastructure::{FramedReceiver, FramedSender};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// A loopback port that was free a moment ago.
fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn loopback_config() -> ReceiverConfig {
    ReceiverConfig::bound_to("127.0.0.1", free_port())
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 1s");
}

async fn start_receiver(
    config: ReceiverConfig,
) -> (FramedReceiver, mpsc::UnboundedReceiver<MessageEvent>, u16) {
    let (mut receiver, rx) = FramedReceiver::with_channel(config);
    let addr = receiver.start().await.expect("bind loopback");
    (receiver, rx, addr.port())
}

async fn next_text(rx: &mut mpsc::UnboundedReceiver<MessageEvent>) -> String {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("message within 2s")
        .expect("listener alive")
        .text
}

// ── Round trips ───────────────────────────────────────────────────────────────

/// Full session: a message arrives intact, an empty message is refused
/// without producing an event, and once the receiver is closed the next send
/// fails.
#[tokio::test]
async fn test_session_hello_empty_then_closed_receiver() {
    let (mut receiver, mut rx, port) = start_receiver(loopback_config()).await;
    let sender = FramedSender::new(SenderConfig::targeting("127.0.0.1", port));

    sender.send("hello").await.unwrap();
    assert_eq!(next_text(&mut rx).await, "hello");

    let empty = sender.send("").await;
    assert!(matches!(empty, Err(TransportError::InvalidArgument(_))));

    receiver.shutdown().await;
    wait_for(|| receiver.active_connections() == 0).await;
    assert!(rx.try_recv().is_err(), "empty text must not produce an event");

    // Let the receiver's FIN reach the sender's socket.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = sender.send("x").await;
    assert!(matches!(result, Err(TransportError::ConnectionFailure { .. })));
}

#[tokio::test]
async fn test_multibyte_text_round_trips() {
    let (mut receiver, mut rx, port) =
        start_receiver(loopback_config()).await;
    let sender = FramedSender::new(SenderConfig::targeting("127.0.0.1", port));
    let text = "héllo wörld ✓ 日本語 🚀";

    sender.send(text).await.unwrap();

    assert_eq!(next_text(&mut rx).await, text);
    receiver.shutdown().await;
}

#[tokio::test]
async fn test_sequential_sends_arrive_in_order() {
    let (mut receiver, mut rx, port) =
        start_receiver(loopback_config()).await;
    let sender = FramedSender::new(SenderConfig::targeting("127.0.0.1", port));

    for i in 0..100 {
        sender.send(&format!("message {i}")).await.unwrap();
    }

    for i in 0..100 {
        assert_eq!(next_text(&mut rx).await, format!("message {i}"));
    }
    assert_eq!(receiver.active_connections(), 1);
    receiver.shutdown().await;
}

#[tokio::test]
async fn test_empty_message_is_rejected_without_connecting() {
    let (mut receiver, _rx, port) =
        start_receiver(loopback_config()).await;
    let sender = FramedSender::new(SenderConfig::targeting("127.0.0.1", port));

    let result = sender.send("").await;

    assert!(matches!(result, Err(TransportError::InvalidArgument(_))));
    assert!(!sender.is_connected().await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(receiver.active_connections(), 0);
    receiver.shutdown().await;
}

// ── Wire-level batching ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_frames_in_one_write_are_all_delivered() {
    let (mut receiver, mut rx, port) =
        start_receiver(loopback_config()).await;
    let mut raw = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let mut batch = Vec::new();
    for text in ["alpha", "beta", "gamma"] {
        batch.extend(encode_frame(text).unwrap());
    }
    raw.write_all(&batch).await.unwrap();

    assert_eq!(next_text(&mut rx).await, "alpha");
    assert_eq!(next_text(&mut rx).await, "beta");
    assert_eq!(next_text(&mut rx).await, "gamma");
    receiver.shutdown().await;
}

#[tokio::test]
async fn test_frame_trickled_byte_by_byte_is_delivered_once() {
    let (mut receiver, mut rx, port) =
        start_receiver(loopback_config()).await;
    let mut raw = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    raw.set_nodelay(true).unwrap();

    for byte in encode_frame("slow").unwrap() {
        raw.write_all(&[byte]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(next_text(&mut rx).await, "slow");
    assert!(rx.try_recv().is_err());
    receiver.shutdown().await;
}

#[tokio::test]
async fn test_body_larger_than_read_chunk_is_reassembled() {
    let (mut receiver, mut rx, port) =
        start_receiver(loopback_config()).await;
    let sender = FramedSender::new(SenderConfig::targeting("127.0.0.1", port));
    let text = "x".repeat(64 * 1024);

    sender.send(&text).await.unwrap();

    assert_eq!(next_text(&mut rx).await, text);
    receiver.shutdown().await;
}

// ── Concurrency and isolation ─────────────────────────────────────────────────

/// Several senders at once: every message arrives, and messages from one
/// connection keep their order.
#[tokio::test]
async fn test_concurrent_peers_preserve_per_connection_order() {
    const PEERS: usize = 5;
    const PER_PEER: usize = 20;

    let (mut receiver, mut rx, port) =
        start_receiver(loopback_config()).await;

    let mut tasks = Vec::new();
    for peer in 0..PEERS {
        tasks.push(tokio::spawn(async move {
            let sender = FramedSender::new(SenderConfig::targeting("127.0.0.1", port));
            for seq in 0..PER_PEER {
                sender.send(&format!("{peer}:{seq}")).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut per_connection: HashMap<_, Vec<String>> = HashMap::new();
    for _ in 0..PEERS * PER_PEER {
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        per_connection
            .entry(event.connection.id)
            .or_default()
            .push(event.text);
    }

    assert_eq!(per_connection.len(), PEERS);
    for texts in per_connection.values() {
        let (peer, _) = texts[0].split_once(':').unwrap();
        let expected: Vec<String> = (0..PER_PEER).map(|seq| format!("{peer}:{seq}")).collect();
        assert_eq!(texts, &expected);
    }
    receiver.shutdown().await;
}

#[tokio::test]
async fn test_oversized_frame_drops_only_that_connection() {
    let config = ReceiverConfig {
        max_body_len: Some(16),
        ..loopback_config()
    };
    let (mut receiver, mut rx, port) = start_receiver(config).await;

    let mut offender = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    offender.write_all(&1000u32.to_le_bytes()).await.unwrap();
    offender.write_all(b"ab").await.unwrap();

    // The listener closes the offending socket.
    let mut buf = [0u8; 8];
    let closed = timeout(Duration::from_secs(2), offender.read(&mut buf))
        .await
        .expect("offending connection closed");
    assert!(matches!(closed, Ok(0) | Err(_)));

    let sender = FramedSender::new(SenderConfig::targeting("127.0.0.1", port));
    sender.send("still fine").await.unwrap();
    assert_eq!(next_text(&mut rx).await, "still fine");
    receiver.shutdown().await;
}

#[tokio::test]
async fn test_panicking_handler_keeps_connection_alive() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut receiver = FramedReceiver::new(
        loopback_config(),
        move |event: &MessageEvent| -> anyhow::Result<()> {
            if event.text == "boom" {
                panic!("handler bug");
            }
            tx.send(event.text.clone())?;
            Ok(())
        },
    );
    let port = receiver.start().await.unwrap().port();
    let sender = FramedSender::new(SenderConfig::targeting("127.0.0.1", port));

    sender.send("before").await.unwrap();
    sender.send("boom").await.unwrap();
    sender.send("after").await.unwrap();

    for expected in ["before", "after"] {
        let text = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text, expected);
    }
    assert_eq!(receiver.active_connections(), 1);
    receiver.shutdown().await;
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// A sender outlives the receiver it was talking to: after a new receiver
/// binds the same port, the next send reconnects transparently.
#[tokio::test]
async fn test_sender_reconnects_to_restarted_receiver() {
    let (mut first, mut rx1, port) =
        start_receiver(loopback_config()).await;
    let sender = FramedSender::new(SenderConfig::targeting("127.0.0.1", port));

    sender.send("to first").await.unwrap();
    assert_eq!(next_text(&mut rx1).await, "to first");
    first.shutdown().await;

    let (mut second, mut rx2, _) =
        start_receiver(ReceiverConfig::bound_to("127.0.0.1", port)).await;
    // Let the first receiver's FIN reach the sender's socket.
    tokio::time::sleep(Duration::from_millis(50)).await;

    sender.send("to second").await.unwrap();
    assert_eq!(next_text(&mut rx2).await, "to second");
    second.shutdown().await;
}

#[tokio::test]
async fn test_stopped_receiver_refuses_new_senders() {
    let (mut receiver, mut rx, port) =
        start_receiver(loopback_config()).await;
    let existing = FramedSender::new(SenderConfig::targeting("127.0.0.1", port));
    existing.send("connected").await.unwrap();
    assert_eq!(next_text(&mut rx).await, "connected");

    receiver.stop();

    existing.send("still draining").await.unwrap();
    assert_eq!(next_text(&mut rx).await, "still draining");

    let newcomer = FramedSender::new(SenderConfig::targeting("127.0.0.1", port));
    let result = newcomer.send("late").await;
    assert!(matches!(result, Err(TransportError::ConnectionFailure { .. })));

    receiver.shutdown().await;
}
