//! Server List Ping against in-process mock servers

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use gamectl::core::codec::{SlpCodec, SlpPacket};
use gamectl::core::varint::{decode_varint, encode_varint};
use gamectl::protocol::slp::ServerListPing;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::codec::Framed;

const STATUS: &str = r#"{"version":{"name":"1.21.1","protocol":767},"players":{"online":3,"max":20,"sample":[{"name":"steve","id":"0"}]},"description":{"text":"Welcome"}}"#;

fn status_packet(json: &str) -> SlpPacket {
    let mut data = encode_varint(json.len() as i32);
    data.extend_from_slice(json.as_bytes());
    SlpPacket::new(0, data)
}

/// Serve one status exchange, optionally preceded by an unrelated frame.
/// The handshake's announced port is reported through the returned receiver.
async fn spawn_server(noise_first: bool) -> (u16, oneshot::Receiver<u16>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, SlpCodec::new(64 * 1024));

        let handshake = framed.next().await.unwrap().unwrap();
        assert_eq!(handshake.id, 0);

        // [proto][host len][host][port u16 BE][next state]
        let (proto, used) = decode_varint(&handshake.data).unwrap().unwrap();
        assert_eq!(proto, -1);
        let (host_len, host_used) = decode_varint(&handshake.data[used..]).unwrap().unwrap();
        let port_at = used + host_used + host_len as usize;
        let announced = u16::from_be_bytes([handshake.data[port_at], handshake.data[port_at + 1]]);
        assert_eq!(handshake.data[port_at + 2], 1);

        let request = framed.next().await.unwrap().unwrap();
        assert_eq!(request.id, 0);
        assert!(request.data.is_empty());

        if noise_first {
            framed
                .send(SlpPacket::new(0x7F, Bytes::from_static(b"noise")))
                .await
                .unwrap();
        }
        framed.send(status_packet(STATUS)).await.unwrap();
        let _ = tx.send(announced);
    });

    (port, rx)
}

#[tokio::test]
async fn test_ping_parses_status() {
    let (port, announced) = spawn_server(false).await;

    let status = ServerListPing::new("127.0.0.1", port)
        .with_timeout(Duration::from_secs(2))
        .ping()
        .await
        .expect("server should be online");

    assert_eq!(status.version.name, "1.21.1");
    assert_eq!(status.version.protocol, 767);
    assert_eq!(status.players.online, 3);
    assert_eq!(status.players.max, 20);
    assert_eq!(status.players.sample[0].name, "steve");
    assert_eq!(status.motd(), "Welcome");
    assert_eq!(announced.await.unwrap(), port);
}

#[tokio::test]
async fn test_unrelated_frames_are_skipped() {
    let (port, _announced) = spawn_server(true).await;

    let status = ServerListPing::new("127.0.0.1", port)
        .with_timeout(Duration::from_secs(2))
        .try_ping()
        .await
        .unwrap();
    assert_eq!(status.players.online, 3);
}

#[tokio::test]
async fn test_closed_port_is_offline_within_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let timeout = Duration::from_millis(300);
    let started = Instant::now();
    let status = ServerListPing::new("127.0.0.1", port)
        .with_timeout(timeout)
        .ping()
        .await;

    assert!(status.is_none());
    assert!(started.elapsed() < timeout + Duration::from_secs(1));
}

#[tokio::test]
async fn test_silent_server_is_offline_within_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let timeout = Duration::from_millis(300);
    let started = Instant::now();
    let status = ServerListPing::new("127.0.0.1", port)
        .with_timeout(timeout)
        .ping()
        .await;

    assert!(status.is_none());
    assert!(started.elapsed() < timeout * 2 + Duration::from_secs(1));
}

#[tokio::test]
async fn test_truncated_response_is_offline() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // Declares 200 bytes, sends three, then hangs up
        stream.write_all(&[0xC8, 0x01, 0x00, 0x10, b'{']).await.unwrap();
        stream.shutdown().await.unwrap();
    });

    let status = ServerListPing::new("127.0.0.1", port)
        .with_timeout(Duration::from_secs(1))
        .ping()
        .await;
    assert!(status.is_none());
}
