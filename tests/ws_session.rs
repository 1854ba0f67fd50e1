//! End-to-end session behavior over a real socket.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use gantry::config::CommandRegistry;
use gantry::messages::OutputFrame;
use gantry::server::{self, AppState};

const SAMPLE_CONFIG: &str = r#"
command:
  - shortname: greet
    path: /bin/echo
    args: "-n hello"
remoteCommand:
  - shortname: shell
    path: /bin/sh
    cwd: /
"#;

async fn start_server() -> String {
    let mut registry = CommandRegistry::from_config(SAMPLE_CONFIG.as_bytes()).unwrap();
    registry.set_default("/bin/echo", "/");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(Arc::new(AppState { registry }));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("127.0.0.1:{}", addr.port())
}

async fn connect(addr: &str) -> WebSocketStream<MaybeTlsStream<TcpStream>> {
    let url = format!("ws://{addr}/exec");
    let (socket, _) = connect_async(url.as_str()).await.unwrap();
    socket
}

fn control(kind: &str, content: &str, args: &[&str]) -> Message {
    let json = serde_json::json!({"Type": kind, "Content": content, "Args": args});
    Message::Text(json.to_string().into())
}

#[tokio::test]
async fn exec_streams_log_frames_then_closes() {
    let addr = start_server().await;
    let mut socket = connect(&addr).await;
    socket
        .send(control("exec", "", &["first", "second"]))
        .await
        .unwrap();

    let mut lines = Vec::new();
    let mut closed = false;
    while let Some(msg) = socket.next().await {
        match msg.unwrap() {
            Message::Text(text) => {
                let frame: OutputFrame = serde_json::from_str(&text).unwrap();
                assert_eq!(frame.kind, "log");
                assert_eq!(frame.prefix.as_deref(), Some("stdout"));
                lines.push(frame.content);
            }
            Message::Close(_) => {
                closed = true;
                break;
            }
            _ => {}
        }
    }
    assert!(closed, "expected a close frame after the command exited");
    assert_eq!(lines, vec!["first second\n"]);
}

#[tokio::test]
async fn log_frames_preserve_stream_order() {
    let addr = start_server().await;
    let mut socket = connect(&addr).await;
    socket
        .send(control("exec", "shell", &["-c", "printf 'a\\nb\\nc\\n'"]))
        .await
        .unwrap();

    let mut lines = Vec::new();
    while let Some(msg) = socket.next().await {
        match msg.unwrap() {
            Message::Text(text) => {
                let frame: OutputFrame = serde_json::from_str(&text).unwrap();
                lines.push(frame.content);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    assert_eq!(lines, vec!["a\n", "b\n", "c\n"]);
}

#[tokio::test]
async fn unknown_command_falls_back_to_default() {
    let addr = start_server().await;
    let mut socket = connect(&addr).await;
    socket
        .send(control("exec", "no-such-command", &["fallback"]))
        .await
        .unwrap();

    let msg = socket.next().await.unwrap().unwrap();
    let frame: OutputFrame = match msg {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected message: {other:?}"),
    };
    assert_eq!(frame.content, "fallback\n");
}

#[tokio::test]
async fn kill_before_exec_keeps_the_session_open() {
    let addr = start_server().await;
    let mut socket = connect(&addr).await;
    socket.send(control("kill", "", &[])).await.unwrap();

    // The session must still answer a query afterwards.
    socket.send(control("args", "greet", &[])).await.unwrap();
    let msg = socket.next().await.unwrap().unwrap();
    let frame: OutputFrame = match msg {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected message: {other:?}"),
    };
    assert_eq!(frame.kind, "args");
    assert_eq!(frame.content, "-n hello");

    match socket.next().await.unwrap().unwrap() {
        Message::Close(_) => {}
        other => panic!("expected close after args reply, got {other:?}"),
    }
}

#[tokio::test]
async fn kill_stops_a_running_command() {
    let addr = start_server().await;
    let mut socket = connect(&addr).await;
    socket
        .send(control("exec", "shell", &["-c", "sleep 10"]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    socket.send(control("kill", "shell", &[])).await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .expect("kill did not close the session promptly");
    match msg.unwrap().unwrap() {
        Message::Close(_) => {}
        other => panic!("expected close after kill, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_frame_ends_the_session() {
    let addr = start_server().await;
    let mut socket = connect(&addr).await;
    socket
        .send(Message::Text("not json".into()))
        .await
        .unwrap();

    match tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .expect("session was not torn down")
    {
        None | Some(Err(_)) | Some(Ok(Message::Close(_))) => {}
        Some(Ok(other)) => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test]
async fn healthz_returns_ok() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
}
