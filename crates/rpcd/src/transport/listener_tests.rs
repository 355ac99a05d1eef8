//! Tests for the socket listener.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rpcd_config::SocketEndpoint;
use rpcd_core::{AuthGate, Dispatcher, Registry};
use rstest::{fixture, rstest};

use super::{ConnectionHandler, CountingHandler, ListenerError, RpcConnectionHandler, SocketListener};
use crate::codec::JsonCodec;

#[derive(Clone)]
struct CountingFixture {
    count: Arc<AtomicUsize>,
    handler: Arc<CountingHandler>,
}

#[fixture]
fn counting_fixture() -> CountingFixture {
    let (count, handler) = CountingHandler::new();
    CountingFixture { count, handler }
}

#[fixture]
fn tcp_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", 0)
}

fn wait_for_count(count: &AtomicUsize, expected: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if count.load(Ordering::SeqCst) >= expected {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[rstest]
fn tcp_listener_accepts_connections(
    tcp_endpoint: SocketEndpoint,
    counting_fixture: CountingFixture,
) {
    let listener = SocketListener::bind(&tcp_endpoint).expect("bind tcp listener");
    let addr = listener
        .local_addr()
        .expect("listener should report local address");
    let CountingFixture { count, handler } = counting_fixture;
    let shared: Arc<dyn ConnectionHandler> = handler;
    let handle = listener.start(shared).expect("start listener");

    TcpStream::connect(addr).expect("connect first client");
    TcpStream::connect(addr).expect("connect second client");

    assert!(wait_for_count(&count, 2), "expected two connections");
    handle.shutdown();
    handle.join().expect("join listener");
}

#[rstest]
fn connections_are_served_concurrently(tcp_endpoint: SocketEndpoint) {
    let listener = SocketListener::bind(&tcp_endpoint).expect("bind tcp listener");
    let addr = listener.local_addr().expect("local address");
    let dispatcher = Arc::new(Dispatcher::new(Registry::new(), AuthGate::disabled()));
    let handler = Arc::new(RpcConnectionHandler::new(dispatcher, Arc::new(JsonCodec)));
    let handle = listener.start(handler).expect("start listener");

    // The idle client keeps its worker busy; the second must still be served.
    let _idle = TcpStream::connect(addr).expect("connect idle client");
    let mut active = TcpStream::connect(addr).expect("connect active client");
    active
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("set timeout");
    active
        .write_all(b"{\"method\":\"missing\",\"id\":7}\n")
        .expect("write request");
    let mut line = String::new();
    BufReader::new(&active)
        .read_line(&mut line)
        .expect("read reply");
    let reply: serde_json::Value = serde_json::from_str(&line).expect("json reply");
    assert_eq!(reply["id"], 7);
    assert_eq!(reply["error"]["code"], -32601);

    handle.shutdown();
    handle.join().expect("join listener");
}

#[cfg(unix)]
#[fixture]
fn unix_tempdir() -> tempfile::TempDir {
    tempfile::tempdir().expect("temp dir")
}

#[cfg(unix)]
fn socket_endpoint(dir: &tempfile::TempDir) -> (std::path::PathBuf, SocketEndpoint) {
    let path = dir.path().join("rpcd.sock");
    let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
    (path, endpoint)
}

#[cfg(unix)]
#[rstest]
fn unix_listener_cleans_stale_socket_files(unix_tempdir: tempfile::TempDir) {
    let (path, endpoint) = socket_endpoint(&unix_tempdir);
    {
        let _stale = std::os::unix::net::UnixListener::bind(&path).expect("bind stale listener");
    }
    assert!(path.exists(), "stale socket should remain");

    let listener = SocketListener::bind(&endpoint).expect("bind new listener");
    let (count, handler) = CountingHandler::new();
    let handle = listener.start(handler).expect("start listener");

    let stream = std::os::unix::net::UnixStream::connect(&path).expect("connect unix client");
    let mut greeting = String::new();
    BufReader::new(stream)
        .read_line(&mut greeting)
        .expect("read greeting");
    assert_eq!(greeting, "connection 0\n");
    assert_eq!(count.load(Ordering::SeqCst), 1);

    handle.shutdown();
    handle.join().expect("join listener");
    assert!(
        !path.exists(),
        "listener should remove unix socket on shutdown"
    );
}

#[cfg(unix)]
#[rstest]
fn unix_listener_rejects_in_use_socket(unix_tempdir: tempfile::TempDir) {
    let (path, endpoint) = socket_endpoint(&unix_tempdir);
    let _existing = std::os::unix::net::UnixListener::bind(&path).expect("bind existing listener");

    let error = SocketListener::bind(&endpoint).expect_err("should fail bind");
    assert!(matches!(error, ListenerError::UnixInUse { .. }));
}

#[cfg(unix)]
#[rstest]
fn unix_listener_refuses_to_replace_regular_files(unix_tempdir: tempfile::TempDir) {
    let (path, endpoint) = socket_endpoint(&unix_tempdir);
    std::fs::write(&path, "not a socket").expect("write file");

    let error = SocketListener::bind(&endpoint).expect_err("should fail bind");
    assert!(matches!(error, ListenerError::UnixNotSocket { .. }));
    assert!(path.exists());
}
