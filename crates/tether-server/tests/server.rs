//! End-to-end tests over a real TCP listener.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http::{header, HeaderMap, Request, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tether_config::TetherConfig;
use tether_server::{Server, ShutdownSignal};
use tether_ws::{Client, Endpoint, EndpointBuilder, COOKIE_NAME, SET_COOKIE_TYPE};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

const KNOWN_CID: &str = "abcdefghijABCDEFGHIJ";

struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownSignal,
    handle: JoinHandle<tether_server::ServerResult<()>>,
}

impl TestServer {
    async fn start(client_script: PathBuf, builder: EndpointBuilder) -> Self {
        let mut config = TetherConfig::default();
        config.server.client_script = client_script;
        config.server.shutdown_timeout_secs = 2;

        let server = Server::from_config(config, builder).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownSignal::new();
        let handle = tokio::spawn(server.run_with_listener(listener, shutdown.clone()));

        Self {
            addr,
            shutdown,
            handle,
        }
    }

    async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server should stop")
            .unwrap()
            .unwrap();
    }
}

fn counter_endpoint() -> EndpointBuilder {
    let counter = Arc::new(AtomicI64::new(0));
    Endpoint::builder().on_json("request", move |client: Arc<Client>, _data: Value| {
        let counter = Arc::clone(&counter);
        async move {
            let value = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = client.send_json("answer", &json!({ "value": value })).await;
        }
    })
}

async fn get(addr: SocketAddr, path: &str, cookie: Option<&str>) -> (http::response::Parts, Bytes) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(conn);

    let mut request = Request::builder()
        .uri(path)
        .header(header::HOST, format!("localhost:{}", addr.port()));
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }

    let response = sender
        .send_request(request.body(Empty::<Bytes>::new()).unwrap())
        .await
        .unwrap();
    let (parts, body) = response.into_parts();
    (parts, body.collect().await.unwrap().to_bytes())
}

async fn connect_ws(
    addr: SocketAddr,
    cookie: Option<&str>,
) -> (WebSocketStream<TcpStream>, HeaderMap) {
    let mut request = format!("ws://{addr}/__ws").into_client_request().unwrap();
    if let Some(cookie) = cookie {
        request
            .headers_mut()
            .insert(header::COOKIE, cookie.parse().unwrap());
    }
    let stream = TcpStream::connect(addr).await.unwrap();
    let (ws, response) = tokio_tungstenite::client_async(request, stream)
        .await
        .unwrap();
    (ws, response.headers().clone())
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .unwrap();
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

fn cookie_value(headers: &HeaderMap) -> Option<String> {
    let set_cookie = headers.get(header::SET_COOKIE)?.to_str().ok()?;
    let pair = set_cookie.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    (name == COOKIE_NAME).then(|| value.to_owned())
}

#[tokio::test]
async fn test_init_script_issues_identity() {
    let server = TestServer::start(PathBuf::from("missing.js"), Endpoint::builder()).await;

    let (parts, body) = get(server.addr, "/__ax_init.js", None).await;
    assert_eq!(parts.status, StatusCode::OK);
    assert_eq!(parts.headers[header::CONTENT_TYPE], "text/javascript");

    let cid = cookie_value(&parts.headers).expect("identity cookie");
    assert_eq!(cid.len(), 20);

    let body = String::from_utf8(body.to_vec()).unwrap();
    assert_eq!(
        body,
        format!("var __state = {{cid:\"{cid}\",conn_timeout:300,host:\"localhost\",port:2000,secure:false}};\n")
    );

    server.stop().await;
}

#[tokio::test]
async fn test_init_script_reuses_identity() {
    let server = TestServer::start(PathBuf::from("missing.js"), Endpoint::builder()).await;
    let cookie = format!("{COOKIE_NAME}={KNOWN_CID}");

    let (parts, body) = get(server.addr, "/__ax_init.js", Some(&cookie)).await;
    assert_eq!(parts.status, StatusCode::OK);
    assert!(parts.headers.get(header::SET_COOKIE).is_none());
    assert!(String::from_utf8(body.to_vec()).unwrap().contains(KNOWN_CID));

    server.stop().await;
}

#[tokio::test]
async fn test_client_script_routes() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("ax.js");
    std::fs::write(&script, "window.ax = {};").unwrap();

    let server = TestServer::start(script.clone(), Endpoint::builder()).await;

    let (parts, body) = get(server.addr, "/__ax.js", None).await;
    assert_eq!(parts.status, StatusCode::OK);
    assert_eq!(parts.headers[header::CONTENT_TYPE], "text/javascript");
    assert_eq!(&body[..], b"window.ax = {};");

    std::fs::remove_file(&script).unwrap();
    let (parts, _) = get(server.addr, "/__ax.js", None).await;
    assert_eq!(parts.status, StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let server = TestServer::start(PathBuf::from("missing.js"), Endpoint::builder()).await;

    let (parts, body) = get(server.addr, "/static/app.css", None).await;
    assert_eq!(parts.status, StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({ "error": "Not Found", "path": "/static/app.css" }));

    server.stop().await;
}

#[tokio::test]
async fn test_plain_get_on_ws_path_is_rejected() {
    let server = TestServer::start(PathBuf::from("missing.js"), Endpoint::builder()).await;

    let (parts, _) = get(server.addr, "/__ws", None).await;
    assert_eq!(parts.status, StatusCode::BAD_REQUEST);

    server.stop().await;
}

#[tokio::test]
async fn test_session_keeps_cookie_identity() {
    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let builder = counter_endpoint().on_enter(move |client, _parts| {
        let _ = entered_tx.send(client.id().to_owned());
    });
    let server = TestServer::start(PathBuf::from("missing.js"), builder).await;

    let cookie = format!("{COOKIE_NAME}={KNOWN_CID}");
    let (mut ws, headers) = connect_ws(server.addr, Some(&cookie)).await;
    assert!(headers.get(header::SET_COOKIE).is_none());

    let refresh = next_json(&mut ws).await;
    assert_eq!(refresh["type"], SET_COOKIE_TYPE);
    assert_eq!(refresh["data"]["value"], KNOWN_CID);

    let entered = tokio::time::timeout(Duration::from_secs(5), entered_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entered, KNOWN_CID);

    for expected in 1..=2 {
        ws.send(WsMessage::text(r#"{"type":"request","data":{"n":1}}"#.to_owned()))
            .await
            .unwrap();
        let answer = next_json(&mut ws).await;
        assert_eq!(answer, json!({ "type": "answer", "data": { "value": expected } }));
    }

    ws.close(None).await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_session_without_cookie_gets_new_identity() {
    let server = TestServer::start(PathBuf::from("missing.js"), counter_endpoint()).await;

    let (mut ws, headers) = connect_ws(server.addr, None).await;
    let issued = cookie_value(&headers).expect("identity cookie on upgrade");

    let refresh = next_json(&mut ws).await;
    assert_eq!(refresh["type"], SET_COOKIE_TYPE);
    assert_eq!(refresh["data"]["value"], issued.as_str());

    ws.close(None).await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let (left_tx, mut left_rx) = mpsc::unbounded_channel();
    let builder = counter_endpoint().on_leave(move |client| {
        let _ = left_tx.send(client.id().to_owned());
    });
    let server = TestServer::start(PathBuf::from("missing.js"), builder).await;

    let cookie = format!("{COOKIE_NAME}={KNOWN_CID}");
    let (mut ws, _) = connect_ws(server.addr, Some(&cookie)).await;
    let _refresh = next_json(&mut ws).await;

    server.shutdown.trigger();

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(WsMessage::Close(_)) | Err(_) => return,
                Ok(_) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "session should close on shutdown");

    let left = tokio::time::timeout(Duration::from_secs(5), left_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(left, KNOWN_CID);

    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server should stop")
        .unwrap()
        .unwrap();
}
