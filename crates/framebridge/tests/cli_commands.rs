#![cfg(all(unix, feature = "cli"))]

use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use framebridge::frame::{Frame, FrameConfig, FrameStream, FramedStream};
use framebridge::transport::Endpoint;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/fbcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_connect(path: &Path, timeout: Duration) -> io::Result<FramedStream> {
    let endpoint = Endpoint::Unix(path.to_path_buf());
    let config = FrameConfig {
        read_timeout: Some(Duration::from_secs(5)),
        ..FrameConfig::default()
    };
    let start = Instant::now();
    loop {
        match endpoint.connect() {
            Ok(stream) => {
                return FramedStream::with_config(stream, config).map_err(io::Error::other);
            }
            Err(err) => {
                if start.elapsed() >= timeout {
                    return Err(io::Error::other(format!("connect timeout: {err}")));
                }
                thread::sleep(Duration::from_millis(25));
            }
        }
    }
}

#[test]
fn listen_prints_received_frame_as_json() {
    let dir = unique_temp_dir("listen");
    let sock_path = dir.join("listen.sock");

    let child = Command::new(env!("CARGO_BIN_EXE_framebridge"))
        .args(["--log-level", "error", "--format", "json", "listen"])
        .arg(format!("unix:{}", sock_path.display()))
        .args(["--count", "1", "--name", "sensor"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("listen command should start");

    let stream = wait_for_connect(&sock_path, Duration::from_secs(3))
        .expect("client should connect to listener");
    stream
        .write(&Frame::new("hello"))
        .expect("frame should be written");

    let output = child.wait_with_output().expect("listen should exit");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"node\":\"sensor\""), "stdout: {stdout}");
    assert!(stdout.contains("\"payload\":\"hello\""), "stdout: {stdout}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bridge_forwards_frames_between_nodes() {
    let dir = unique_temp_dir("bridge");
    let a_path = dir.join("a.sock");
    let b_path = dir.join("b.sock");

    let mut child = Command::new(env!("CARGO_BIN_EXE_framebridge"))
        .args(["--log-level", "error", "--format", "json", "bridge"])
        .arg("--node")
        .arg(format!("a=listen:unix:{}", a_path.display()))
        .arg("--node")
        .arg(format!("b=listen:unix:{}", b_path.display()))
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("bridge command should start");

    let a = wait_for_connect(&a_path, Duration::from_secs(3)).expect("a should connect");
    let b = wait_for_connect(&b_path, Duration::from_secs(3)).expect("b should connect");

    // One summary line per node once both are attached.
    let stdout = child.stdout.take().expect("stdout should be piped");
    let mut lines = BufReader::new(stdout).lines();
    for _ in 0..2 {
        let line = lines
            .next()
            .expect("bridge should print node summary")
            .expect("summary should be readable");
        assert!(line.contains("\"mode\":\"listen\""), "line: {line}");
    }

    a.write(&Frame::new("ping")).expect("a should send");
    assert_eq!(b.read().expect("b should receive"), Frame::new("ping"));

    b.write(&Frame::new("pong")).expect("b should send");
    assert_eq!(a.read().expect("a should receive"), Frame::new("pong"));

    let _ = child.kill();
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bridge_exits_when_every_node_disconnects() {
    let dir = unique_temp_dir("bridge-exit");
    let sock_path = dir.join("only.sock");

    let child = Command::new(env!("CARGO_BIN_EXE_framebridge"))
        .args(["--log-level", "error", "--format", "json", "bridge"])
        .arg("--node")
        .arg(format!("only=listen:{}", sock_path.display()))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("bridge command should start");

    let stream = wait_for_connect(&sock_path, Duration::from_secs(3)).expect("should connect");
    drop(stream);

    let output = child.wait_with_output().expect("bridge should exit");
    assert_eq!(output.status.code(), Some(0));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bridge_interrupted_while_accepting_removes_socket_files() {
    let dir = unique_temp_dir("bridge-int");
    let a_path = dir.join("a.sock");
    let b_path = dir.join("b.sock");

    let child = Command::new(env!("CARGO_BIN_EXE_framebridge"))
        .args(["--log-level", "error", "bridge"])
        .arg("--node")
        .arg(format!("a=listen:unix:{}", a_path.display()))
        .arg("--node")
        .arg(format!("b=listen:unix:{}", b_path.display()))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("bridge command should start");

    // Both sockets are bound once the handler is installed; nobody connects.
    let start = Instant::now();
    while !(a_path.exists() && b_path.exists()) {
        assert!(start.elapsed() < Duration::from_secs(3), "sockets never bound");
        thread::sleep(Duration::from_millis(25));
    }

    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("kill should run");
    assert!(status.success());

    let output = child.wait_with_output().expect("bridge should exit");
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(!a_path.exists(), "a.sock should be cleaned up");
    assert!(!b_path.exists(), "b.sock should be cleaned up");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_to_missing_socket_returns_transport_error() {
    let missing = unique_temp_dir("missing").join("nobody.sock");

    let output = Command::new(env!("CARGO_BIN_EXE_framebridge"))
        .args(["--log-level", "error", "send"])
        .arg(&missing)
        .args(["--data", "x"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}

#[test]
fn send_with_wait_prints_reply() {
    let dir = unique_temp_dir("send-wait");
    let sock_path = dir.join("peer.sock");
    let acceptor = Endpoint::Unix(sock_path.clone())
        .bind()
        .expect("test listener should bind");

    let peer = thread::spawn(move || {
        let stream = FramedStream::new(acceptor.accept().expect("accept")).expect("framed");
        let request = stream.read().expect("request should arrive");
        stream
            .write(&Frame::new(format!("ack:{}", String::from_utf8_lossy(request.payload()))))
            .expect("reply should be written");
        // Keep the acceptor (and its socket file) alive until the reply is read.
        thread::sleep(Duration::from_millis(200));
        drop(acceptor);
    });

    let output = Command::new(env!("CARGO_BIN_EXE_framebridge"))
        .args(["--log-level", "error", "--format", "json", "send"])
        .arg(format!("unix:{}", sock_path.display()))
        .args(["--data", "hi", "--wait", "--wait-timeout", "5s", "--name", "peer"])
        .output()
        .expect("send should run");

    peer.join().expect("peer thread should finish");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"payload\":\"ack:hi\""), "stdout: {stdout}");
    assert!(stdout.contains("\"node\":\"peer\""), "stdout: {stdout}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_package_name() {
    let output = Command::new(env!("CARGO_BIN_EXE_framebridge"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("framebridge "));
}
