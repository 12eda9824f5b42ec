//! Integration tests — full handshake and streaming lifecycle over
//! real loopback UDP sockets.

use std::sync::Arc;
use std::time::Duration;

use avo_core::{
    frame_len, ClientConfig, FrameSink, RgbFrame, ServerConfig, StreamClient, StreamServer,
};
use tokio::sync::mpsc;

// ── Helpers ──────────────────────────────────────────────────────

type ReceivedFrame = (Vec<u8>, u32, u32, bool);

/// Start a server on an OS-assigned loopback port.
async fn ephemeral_server(config: ServerConfig) -> (StreamServer, u16) {
    let server = StreamServer::start("127.0.0.1:0".parse().unwrap(), config)
        .await
        .unwrap();
    let port = server.local_addr().unwrap().port();
    (server, port)
}

/// A frame sink that forwards every published frame into a channel.
fn channel_sink() -> (FrameSink, mpsc::UnboundedReceiver<ReceivedFrame>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink: FrameSink = Arc::new(move |data: &[u8], w, h, full| {
        let _ = tx.send((data.to_vec(), w, h, full));
    });
    (sink, rx)
}

async fn recv_frame(rx: &mut mpsc::UnboundedReceiver<ReceivedFrame>) -> ReceivedFrame {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout waiting for frame")
        .expect("sink channel closed")
}

fn solid_frame(w: u32, h: u32, rgb: [u8; 3]) -> RgbFrame {
    let data: Vec<u8> = rgb.iter().copied().cycle().take(frame_len(w, h)).collect();
    RgbFrame::new(w, h, data)
}

/// Worst case for the run-length codec: no two adjacent pixels share a
/// color, so every record covers a single pixel (8 bytes per pixel).
fn alternating_frame(w: u32, h: u32) -> RgbFrame {
    let mut data = Vec::with_capacity(frame_len(w, h));
    for pixel in 0..(w as usize * h as usize) {
        if pixel % 2 == 0 {
            data.extend_from_slice(&[230, 20, 20]);
        } else {
            data.extend_from_slice(&[20, 230, 20]);
        }
    }
    RgbFrame::new(w, h, data)
}

/// Poll until `predicate` holds or the deadline expires.
async fn wait_for(mut predicate: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !predicate() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ── Handshake ────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_registers_client() {
    let (server, port) = ephemeral_server(ServerConfig::default()).await;
    assert!(!server.has_client());

    let client = StreamClient::connect("127.0.0.1", port, ClientConfig::default())
        .await
        .unwrap();

    wait_for(|| server.has_client()).await;

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn dns_name_resolves_for_connect() {
    let (server, port) = ephemeral_server(ServerConfig::default()).await;
    let client = StreamClient::connect("localhost", port, ClientConfig::default())
        .await
        .unwrap();
    client.disconnect().await;
    server.stop().await;
}

// ── Streaming ────────────────────────────────────────────────────

#[tokio::test]
async fn single_frame_round_trip() {
    let (server, port) = ephemeral_server(ServerConfig::default()).await;
    let mut client = StreamClient::connect("127.0.0.1", port, ClientConfig::default())
        .await
        .unwrap();

    let (sink, mut rx) = channel_sink();
    client.start_receiver(sink);

    let frame = solid_frame(32, 24, [200, 40, 90]);
    server.submit(frame.clone()).unwrap();

    let (data, w, h, _) = recv_frame(&mut rx).await;
    assert_eq!((w, h), (32, 24));
    assert_eq!(data, frame.data);

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn consecutive_deltas_track_the_source() {
    let (server, port) = ephemeral_server(ServerConfig::default()).await;
    let mut client = StreamClient::connect("127.0.0.1", port, ClientConfig::default())
        .await
        .unwrap();

    let (sink, mut rx) = channel_sink();
    client.start_receiver(sink);

    let first = solid_frame(16, 16, [200, 0, 0]);
    server.submit(first.clone()).unwrap();
    let (data, ..) = recv_frame(&mut rx).await;
    assert_eq!(data, first.data);

    // Second frame diffs against the first on both ends.
    let second = solid_frame(16, 16, [0, 0, 220]);
    server.submit(second.clone()).unwrap();
    let (data, ..) = recv_frame(&mut rx).await;
    assert_eq!(data, second.data);

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn no_change_frame_is_counted_but_not_displayed() {
    let (server, port) = ephemeral_server(ServerConfig::default()).await;
    let mut client = StreamClient::connect("127.0.0.1", port, ClientConfig::default())
        .await
        .unwrap();

    let (sink, mut rx) = channel_sink();
    client.start_receiver(sink);

    let frame = solid_frame(16, 16, [150, 150, 30]);
    server.submit(frame.clone()).unwrap();
    let _ = recv_frame(&mut rx).await;

    // Identical frame → the 1-byte sentinel travels the wire.
    server.submit(frame).unwrap();
    wait_for(|| client.stats().frames_decoded >= 2).await;
    assert!(rx.try_recv().is_err(), "sentinel must not reach the sink");

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn fragmented_frame_reassembles_into_one_callback() {
    let (server, port) = ephemeral_server(ServerConfig::default()).await;
    let mut client = StreamClient::connect("127.0.0.1", port, ClientConfig::default())
        .await
        .unwrap();

    let (sink, mut rx) = channel_sink();
    client.start_receiver(sink);

    // 320×240 single-pixel runs → 614 400 payload bytes → 11 chunks.
    let frame = alternating_frame(320, 240);
    server.submit(frame.clone()).unwrap();

    let (data, w, h, _) = recv_frame(&mut rx).await;
    assert_eq!((w, h), (320, 240));
    assert_eq!(data, frame.data);
    assert!(client.stats().packets_received >= 11);

    client.disconnect().await;
    server.stop().await;
}

// ── Handshake race ───────────────────────────────────────────────

#[tokio::test]
async fn most_recent_connector_wins() {
    let (server, port) = ephemeral_server(ServerConfig::default()).await;

    let mut early = StreamClient::connect("127.0.0.1", port, ClientConfig::default())
        .await
        .unwrap();
    let (early_sink, mut early_rx) = channel_sink();
    early.start_receiver(early_sink);

    let mut late = StreamClient::connect("127.0.0.1", port, ClientConfig::default())
        .await
        .unwrap();
    let (late_sink, mut late_rx) = channel_sink();
    late.start_receiver(late_sink);

    let frame = solid_frame(16, 16, [90, 200, 40]);
    server.submit(frame.clone()).unwrap();

    let (data, ..) = recv_frame(&mut late_rx).await;
    assert_eq!(data, frame.data);
    assert!(
        early_rx.try_recv().is_err(),
        "only the most recent connector receives frames"
    );

    early.disconnect().await;
    late.disconnect().await;
    server.stop().await;
}
