//! Integration tests for the `mq` binary entry point.
//!
//! Covers usage errors and the exit statuses seen by shell callers when the
//! reply comes from a scripted socket peer.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::thread::{self, JoinHandle};

use assert_cmd::cargo::cargo_bin_cmd;
use mq_protocol::Response;
use predicates::str::contains;
use rstest::rstest;

/// Answers exactly one request with `reply` and returns the raw request.
fn answer_once(socket: &Path, reply: Response) -> JoinHandle<Vec<u8>> {
    let listener = UnixListener::bind(socket).expect("bind");
    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut request = Vec::new();
        BufReader::new(&stream)
            .read_until(b'\n', &mut request)
            .expect("read request");
        (&stream).write_all(&reply.encode()).expect("write reply");
        request
    })
}

#[test]
fn missing_verb_is_a_usage_error() {
    let mut command = cargo_bin_cmd!("mq");
    command.assert().code(2).stderr(contains("Usage"));
}

#[test]
fn help_goes_to_stdout() {
    let mut command = cargo_bin_cmd!("mq");
    command.arg("--help");
    command.assert().success().stdout(contains("VERB"));
}

#[rstest]
#[case(Response::ok(), 0)]
#[case(Response::failure("no such job: 3"), 1)]
fn exit_status_follows_the_terminal_code(#[case] reply: Response, #[case] expected: i32) {
    let dir = tempfile::tempdir().expect("temp dir");
    let socket = dir.path().join("mqd.sock");
    let peer = answer_once(&socket, reply);

    let mut command = cargo_bin_cmd!("mq");
    command.env("MQ_DAEMON_SOCKET", &socket).args(["kill", "3"]);
    command.assert().code(expected);
    assert_eq!(peer.join().expect("peer thread"), b"kill\x003\x00\n");
}

#[test]
fn listing_lines_reach_stdout() {
    let dir = tempfile::tempdir().expect("temp dir");
    let socket = dir.path().join("mqd.sock");
    let mut reply = Response::ok();
    reply.push_out("UID STAT EXIT CMD");
    reply.push_out("0   C    0    true");
    let peer = answer_once(&socket, reply);

    let mut command = cargo_bin_cmd!("mq");
    command.arg("--daemon-socket").arg(&socket).arg("list");
    command
        .assert()
        .success()
        .stdout("UID STAT EXIT CMD\n0   C    0    true\n");
    drop(peer.join());
}

#[test]
fn unspawnable_daemon_fails_cleanly() {
    let dir = tempfile::tempdir().expect("temp dir");
    let socket = dir.path().join("run").join("mqd.sock");

    let mut command = cargo_bin_cmd!("mq");
    command
        .env("MQ_DAEMON_SOCKET", &socket)
        .env("MQ_DAEMON_BIN", "/nonexistent/mqd")
        .arg("list");
    command
        .assert()
        .code(1)
        .stderr(contains("failed to spawn daemon binary"));
}
