//! Behavioural tests for serving RPC over the daemon socket listener.

use std::cell::RefCell;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rpcd_config::{SocketEndpoint, WireProtocol};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use super::support::{RecordingHealthReporter, TestConfigLoader};
use crate::bootstrap::{ConfigLoader, Daemon, bootstrap_with};
use crate::transport::{ListenerHandle, RpcConnectionHandler, SocketListener};

struct ListenerWorld {
    loader: TestConfigLoader,
    endpoint: SocketEndpoint,
    daemon: Option<Daemon>,
    listener: Option<ListenerHandle>,
    address: Option<SocketAddr>,
    bind_error: Option<String>,
    reserved: Option<TcpListener>,
    response: String,
}

impl ListenerWorld {
    fn new() -> Self {
        Self {
            loader: TestConfigLoader::tcp(),
            endpoint: SocketEndpoint::tcp("127.0.0.1", 0),
            daemon: None,
            listener: None,
            address: None,
            bind_error: None,
            reserved: None,
            response: String::new(),
        }
    }

    fn configure(&mut self, protocol: WireProtocol, user: Option<(&str, &str)>) {
        let loader = TestConfigLoader::tcp().with_protocol(protocol);
        self.loader = match user {
            Some((name, password)) => loader.with_user(name, password),
            None => loader,
        };
    }

    fn start_listener(&mut self) {
        let reporter = Arc::new(RecordingHealthReporter::default());
        let loader: &dyn ConfigLoader = &self.loader;
        let daemon = bootstrap_with(loader, reporter).expect("bootstrap daemon");
        let handler = Arc::new(RpcConnectionHandler::new(
            Arc::clone(daemon.dispatcher()),
            daemon.codec(),
        ));
        self.daemon = Some(daemon);
        match SocketListener::bind(&self.endpoint) {
            Ok(listener) => {
                self.address = listener.local_addr();
                match listener.start(handler) {
                    Ok(handle) => self.listener = Some(handle),
                    Err(error) => self.bind_error = Some(error.to_string()),
                }
            }
            Err(error) => self.bind_error = Some(error.to_string()),
        }
    }

    fn reserve_port(&mut self) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind reserved port");
        let port = listener.local_addr().expect("local addr").port();
        self.endpoint = SocketEndpoint::tcp("127.0.0.1", port);
        self.reserved = Some(listener);
    }

    fn connect(&self) -> TcpStream {
        let addr = self.address.expect("listener address should be set");
        let stream = TcpStream::connect(addr).expect("connect client");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("set read timeout");
        stream
    }

    /// Sends one JSON request and keeps the first reply line.
    fn send_json(&mut self, request: &str) {
        let mut stream = self.connect();
        stream.write_all(request.as_bytes()).expect("write request");
        stream.write_all(b"\n").expect("write terminator");
        let mut line = String::new();
        BufReader::new(stream)
            .read_line(&mut line)
            .expect("read reply");
        self.response = line;
    }

    /// Sends one HTTP request asking the server to close afterwards.
    fn send_http(&mut self, body: &str, credentials: Option<(&str, &str)>) {
        let mut stream = self.connect();
        let mut head = format!(
            "POST / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: {}\r\n",
            body.len()
        );
        if let Some((user, password)) = credentials {
            let token = STANDARD.encode(format!("{user}:{password}"));
            head.push_str(&format!("Authorization: Basic {token}\r\n"));
        }
        head.push_str("\r\n");
        stream.write_all(head.as_bytes()).expect("write head");
        stream.write_all(body.as_bytes()).expect("write body");
        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .expect("read response");
        self.response = response;
    }

    fn json_reply(&self) -> serde_json::Value {
        let body = self
            .response
            .split_once("\r\n\r\n")
            .map_or(self.response.as_str(), |(_, body)| body);
        serde_json::from_str(body.trim()).expect("json reply")
    }
}

impl Drop for ListenerWorld {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.shutdown();
            handle.join().ok();
        }
        if let Some(daemon) = self.daemon.take() {
            daemon.release();
        }
        self.reserved = None;
    }
}

#[fixture]
fn world() -> RefCell<ListenerWorld> {
    RefCell::new(ListenerWorld::new())
}

#[given("a daemon speaking JSON")]
fn given_json_daemon(world: &RefCell<ListenerWorld>) {
    world.borrow_mut().configure(WireProtocol::Json, None);
}

#[given("a daemon speaking HTTP for user \"{user}\" with password \"{password}\"")]
fn given_http_daemon(world: &RefCell<ListenerWorld>, user: String, password: String) {
    world
        .borrow_mut()
        .configure(WireProtocol::Http, Some((&user, &password)));
}

#[given("a TCP socket is already bound")]
fn given_tcp_in_use(world: &RefCell<ListenerWorld>) {
    world.borrow_mut().reserve_port();
}

#[given("the socket listener is running")]
fn given_listener_running(world: &RefCell<ListenerWorld>) {
    world.borrow_mut().start_listener();
    assert!(
        world.borrow().bind_error.is_none(),
        "listener start failed: {:?}",
        world.borrow().bind_error
    );
}

#[when("the listener starts on the same socket")]
fn when_listener_starts_same_socket(world: &RefCell<ListenerWorld>) {
    world.borrow_mut().start_listener();
}

#[when("a client sends a JSON request for \"{method}\"")]
fn when_json_request(world: &RefCell<ListenerWorld>, method: String) {
    let request = serde_json::json!({"jsonrpc": "2.0", "id": 5, "method": method});
    world.borrow_mut().send_json(&request.to_string());
}

#[when("a client posts a request for \"{method}\" without credentials")]
fn when_http_anonymous(world: &RefCell<ListenerWorld>, method: String) {
    let request = serde_json::json!({"jsonrpc": "2.0", "id": 5, "method": method});
    world.borrow_mut().send_http(&request.to_string(), None);
}

#[when("a client posts a request for \"{method}\" as \"{user}\" with password \"{password}\"")]
fn when_http_authenticated(
    world: &RefCell<ListenerWorld>,
    method: String,
    user: String,
    password: String,
) {
    let request = serde_json::json!({"jsonrpc": "2.0", "id": 5, "method": method});
    world
        .borrow_mut()
        .send_http(&request.to_string(), Some((&user, &password)));
}

#[then("the client receives result {result}")]
fn then_client_result(world: &RefCell<ListenerWorld>, result: String) {
    let expected: serde_json::Value = serde_json::from_str(&result).expect("expected json");
    let reply = world.borrow().json_reply();
    assert_eq!(reply["result"], expected, "reply: {reply}");
    assert_eq!(reply["id"], 5);
}

#[then("the client receives error code {code}")]
fn then_client_error(world: &RefCell<ListenerWorld>, code: i64) {
    let reply = world.borrow().json_reply();
    assert_eq!(reply["error"]["code"], code, "reply: {reply}");
}

#[then("the HTTP status is {status}")]
fn then_http_status(world: &RefCell<ListenerWorld>, status: u16) {
    let state = world.borrow();
    let prefix = format!("HTTP/1.1 {status} ");
    assert!(
        state.response.starts_with(&prefix),
        "unexpected response: {}",
        state.response
    );
}

#[then("the response challenges for basic credentials")]
fn then_http_challenge(world: &RefCell<ListenerWorld>) {
    let state = world.borrow();
    assert!(
        state.response.contains("WWW-Authenticate: Basic realm=\"rpcd\"\r\n"),
        "missing challenge: {}",
        state.response
    );
}

#[then("starting the listener fails")]
fn then_listener_fails(world: &RefCell<ListenerWorld>) {
    assert!(
        world.borrow().bind_error.is_some(),
        "expected listener start to fail"
    );
}

#[scenario(path = "tests/features/rpc_socket.feature")]
fn rpc_socket(#[from(world)] world: RefCell<ListenerWorld>) {
    drop(world);
}
