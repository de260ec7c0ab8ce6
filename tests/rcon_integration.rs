//! RCON client against an in-process mock server

#![allow(clippy::expect_used, clippy::unwrap_used)]

use futures::{SinkExt, StreamExt};
use gamectl::core::codec::RconCodec;
use gamectl::core::packet::{PacketType, RconPacket, AUTH_FAILED_ID};
use gamectl::protocol::rcon::{rcon_command, RconClient, RconState};
use gamectl::ProtocolError;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::codec::Framed;

const PASSWORD: &str = "secret";

/// Accept one connection and serve it until the client hangs up.
///
/// Commands are echoed back as `echo: <payload>`. The returned receiver fires
/// once the client has closed the socket.
async fn spawn_server() -> (u16, oneshot::Receiver<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (closed_tx, closed_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, RconCodec::default());
        let mut commands = 0usize;

        while let Some(Ok(packet)) = framed.next().await {
            match packet.kind {
                PacketType::Auth => {
                    if packet.payload == PASSWORD.as_bytes() {
                        framed
                            .send(RconPacket::new(packet.request_id, PacketType::ResponseValue, ""))
                            .await
                            .unwrap();
                        framed
                            .send(RconPacket::new(packet.request_id, PacketType::AUTH_RESPONSE, ""))
                            .await
                            .unwrap();
                    } else {
                        framed
                            .send(RconPacket::new(AUTH_FAILED_ID, PacketType::AUTH_RESPONSE, ""))
                            .await
                            .unwrap();
                    }
                }
                _ => {
                    commands += 1;
                    let mut reply = b"echo: ".to_vec();
                    reply.extend_from_slice(&packet.payload);
                    framed
                        .send(RconPacket::new(packet.request_id, PacketType::ResponseValue, reply))
                        .await
                        .unwrap();
                }
            }
        }

        let _ = closed_tx.send(commands);
    });

    (port, closed_rx)
}

#[tokio::test]
async fn test_authenticated_command_round_trip() {
    let (port, closed) = spawn_server().await;

    let mut client = RconClient::new("127.0.0.1", port, PASSWORD).with_timeout(Duration::from_secs(2));
    client.connect().await.unwrap();
    assert!(client.is_authenticated());
    assert_eq!(client.state(), RconState::Ready);

    let response = client.command("list").await;
    assert_eq!(response.as_deref(), Some("echo: list"));

    let response = client.command("say hello").await;
    assert_eq!(response.as_deref(), Some("echo: say hello"));

    client.disconnect();
    assert_eq!(client.state(), RconState::Disconnected);

    let commands = tokio::time::timeout(Duration::from_secs(2), closed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(commands, 2);
}

#[tokio::test]
async fn test_multibyte_payload_is_byte_exact() {
    let (port, _closed) = spawn_server().await;
    let mut client = RconClient::new("127.0.0.1", port, PASSWORD).with_timeout(Duration::from_secs(2));

    let text = "\u{a7}aPlayers: 0 \u{2713}";
    let response = client.try_command(text).await.unwrap();
    assert_eq!(response, format!("echo: {text}"));

    let raw = client.try_command_raw(text.as_bytes()).await.unwrap();
    let mut expected = b"echo: ".to_vec();
    expected.extend_from_slice(text.as_bytes());
    assert_eq!(raw, expected);

    // legacy colour codes outside UTF-8 survive the raw path only
    let latin1 = b"\xa7aPlayers: 0";
    let raw = client.try_command_raw(latin1).await.unwrap();
    assert_eq!(&raw[6..], latin1);
    assert!(String::from_utf8_lossy(&raw).contains('\u{FFFD}'));
    assert_eq!(client.state(), RconState::Ready);
}

#[tokio::test]
async fn test_wrong_password_closes_socket() {
    let (port, closed) = spawn_server().await;

    let mut client = RconClient::new("127.0.0.1", port, "wrong").with_timeout(Duration::from_secs(2));
    let result = client.connect().await;

    assert!(matches!(result, Err(ProtocolError::AuthError(_))));
    assert!(!client.is_connected());
    assert!(!client.is_authenticated());

    // The server must observe the hang-up without any command having run
    let commands = tokio::time::timeout(Duration::from_secs(2), closed)
        .await
        .expect("server should see EOF")
        .unwrap();
    assert_eq!(commands, 0);
}

#[tokio::test]
async fn test_command_connects_on_demand() {
    let (port, _closed) = spawn_server().await;

    let mut client = RconClient::new("127.0.0.1", port, PASSWORD).with_timeout(Duration::from_secs(2));
    assert!(!client.is_connected());

    let response = client.try_command("time query daytime").await.unwrap();
    assert_eq!(response, "echo: time query daytime");
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_unreachable_server_yields_none() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut client = RconClient::new("127.0.0.1", port, PASSWORD).with_timeout(Duration::from_millis(500));
    assert!(client.command("list").await.is_none());
    assert_eq!(client.state(), RconState::Disconnected);
}

#[tokio::test]
async fn test_one_shot_helper_disconnects() {
    let (port, closed) = spawn_server().await;

    let response = rcon_command("127.0.0.1", port, PASSWORD, "seed", Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(response, "echo: seed");

    let commands = tokio::time::timeout(Duration::from_secs(2), closed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(commands, 1);
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let mut client = RconClient::new("127.0.0.1", port, PASSWORD).with_timeout(Duration::from_millis(200));
    let result = client.connect().await;
    assert!(matches!(result, Err(ProtocolError::AuthError(_))));
    assert!(!client.is_connected());
}
