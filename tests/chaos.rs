//! Chaos tests
//!
//! Control-channel behavior against misbehaving peers: servers that drip
//! bytes, hang up mid-response, lie about lengths or never answer.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use gamectl::core::packet::{PacketType, RconPacket};
use gamectl::docker::cli::ExecMode;
use gamectl::hook::progress::ProgressReporter;
use gamectl::hook::HookContext;
use gamectl::lifecycle::lifecycle_dispatcher;
use gamectl::protocol::rcon::{RconClient, RconState};
use gamectl::protocol::slp::ServerListPing;
use gamectl::ControlConfig;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;

/// Read one raw RCON packet from the client
async fn read_packet(stream: &mut TcpStream) -> Option<RconPacket> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await.ok()?;
    let mut body = vec![0u8; i32::from_le_bytes(len) as usize];
    stream.read_exact(&mut body).await.ok()?;
    RconPacket::from_body(&body).ok()
}

/// Accept connections forever, handing each to `serve`
async fn spawn<F, Fut>(serve: F) -> u16
where
    F: Fn(TcpStream, usize) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut connection = 0;
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream, connection));
            connection += 1;
        }
    });
    port
}

/// Authenticate without a password check, then answer commands byte by byte
async fn dripping_server(mut stream: TcpStream, _connection: usize) {
    while let Some(packet) = read_packet(&mut stream).await {
        let kind = match packet.kind {
            PacketType::Auth => PacketType::AUTH_RESPONSE,
            _ => PacketType::ResponseValue,
        };
        let reply = RconPacket::new(packet.request_id, kind, packet.payload.clone()).to_bytes();
        for byte in reply {
            if stream.write_all(&[byte]).await.is_err() {
                return;
            }
            sleep(Duration::from_millis(2)).await;
        }
    }
}

#[tokio::test]
async fn test_response_dripped_byte_by_byte() {
    let port = spawn(dripping_server).await;

    let mut client = RconClient::new("127.0.0.1", port, "pw").with_timeout(Duration::from_secs(2));
    let response = client.command("list").await;
    assert_eq!(response.as_deref(), Some("list"));
}

#[tokio::test]
async fn test_hang_up_mid_response_then_recover() {
    // First connection dies halfway through its first response; later ones behave
    let port = spawn(|mut stream: TcpStream, connection: usize| async move {
        while let Some(packet) = read_packet(&mut stream).await {
            if packet.kind == PacketType::Auth {
                let ok = RconPacket::new(packet.request_id, PacketType::AUTH_RESPONSE, "");
                stream.write_all(&ok.to_bytes()).await.unwrap();
                continue;
            }
            let reply = RconPacket::new(packet.request_id, PacketType::ResponseValue, "There are 0 players").to_bytes();
            if connection == 0 {
                let _ = stream.write_all(&reply[..reply.len() / 2]).await;
                return;
            }
            stream.write_all(&reply).await.unwrap();
        }
    })
    .await;

    let mut client = RconClient::new("127.0.0.1", port, "pw").with_timeout(Duration::from_secs(2));
    assert!(client.command("list").await.is_none());
    assert_eq!(client.state(), RconState::Disconnected);
    assert!(!client.is_connected());

    // The caller decides to retry; the client reconnects on demand
    let response = client.command("list").await;
    assert_eq!(response.as_deref(), Some("There are 0 players"));
}

#[tokio::test]
async fn test_negative_length_tears_session_down() {
    let port = spawn(|mut stream: TcpStream, _| async move {
        while let Some(packet) = read_packet(&mut stream).await {
            if packet.kind == PacketType::Auth {
                let ok = RconPacket::new(packet.request_id, PacketType::AUTH_RESPONSE, "");
                stream.write_all(&ok.to_bytes()).await.unwrap();
            } else {
                let _ = stream.write_all(&(-1i32).to_le_bytes()).await;
            }
        }
    })
    .await;

    let mut client = RconClient::new("127.0.0.1", port, "pw").with_timeout(Duration::from_secs(2));
    client.connect().await.unwrap();
    assert!(client.try_command("list").await.is_err());
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_oversized_response_rejected() {
    let port = spawn(|mut stream: TcpStream, _| async move {
        while let Some(packet) = read_packet(&mut stream).await {
            let kind = match packet.kind {
                PacketType::Auth => PacketType::AUTH_RESPONSE,
                _ => PacketType::ResponseValue,
            };
            let payload = if kind == PacketType::ResponseValue { vec![b'x'; 8192] } else { Vec::new() };
            let _ = stream
                .write_all(&RconPacket::new(packet.request_id, kind, payload).to_bytes())
                .await;
        }
    })
    .await;

    let mut client = RconClient::new("127.0.0.1", port, "pw")
        .with_timeout(Duration::from_secs(2))
        .with_max_payload(4096);
    assert!(client.command("dump").await.is_none());
}

#[tokio::test]
async fn test_slp_peer_sending_garbage() {
    let port = spawn(|mut stream: TcpStream, _| async move {
        let mut buf = [0u8; 256];
        let _ = stream.read(&mut buf).await;
        let _ = stream.write_all(&[0xFF; 8]).await;
        sleep(Duration::from_secs(2)).await;
    })
    .await;

    let status = ServerListPing::new("127.0.0.1", port)
        .with_timeout(Duration::from_millis(500))
        .ping()
        .await;
    assert!(status.is_none());
}

fn hook() -> HookContext {
    HookContext::new(ControlConfig::default())
        .with_progress(ProgressReporter::disabled())
        .with_exec_mode(ExecMode::Local)
}

#[tokio::test]
async fn test_command_hook_delivers_over_rcon() {
    let port = spawn(dripping_server).await;
    let stdin = json!({
        "command": "say",
        "args": {"message": "restart in 5"},
        "rcon_port": port,
        "rcon_password": "pw"
    })
    .to_string();

    let inv = lifecycle_dispatcher().dispatch(Some("command"), &stdin, hook()).await;

    assert_eq!(inv.exit_code, 0);
    assert_eq!(inv.output["success"], json!(true));
    assert_eq!(inv.output["channel"], json!("rcon"));
    assert_eq!(inv.output["command"], json!("say restart in 5"));
    assert_eq!(inv.output["response"], json!("say restart in 5"));
    assert_eq!(inv.output["acknowledged_only"], json!(false));
}

#[tokio::test]
async fn test_command_hook_falls_back_when_everything_is_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap().port();
    drop(listener);

    let stdin = json!({
        "command": "weather",
        "args": {"type": "rain"},
        "rest_port": dead,
        "rcon_port": dead,
        "rcon_password": "pw"
    })
    .to_string();

    let inv = lifecycle_dispatcher().dispatch(Some("command"), &stdin, hook()).await;

    assert_eq!(inv.exit_code, 0);
    assert_eq!(inv.output["success"], json!(true));
    assert_eq!(inv.output["channel"], json!("acknowledge"));
    assert_eq!(inv.output["acknowledged_only"], json!(true));
    assert_eq!(inv.output["command"], json!("weather rain 1000"));
}
