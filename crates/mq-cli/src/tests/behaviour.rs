//! Behavioural coverage for request delivery, reply relaying and auto-start.

use std::cell::RefCell;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use crate::Client;
use crate::tests::support::{FakeDaemon, canned_reply};

struct Run {
    code: ExitCode,
    stdout: String,
    stderr: String,
}

struct ClientWorld {
    dir: TempDir,
    daemon: Option<FakeDaemon>,
    binary: OsString,
    run: Option<Run>,
}

impl ClientWorld {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("temp dir"),
            daemon: None,
            binary: OsString::from("/nonexistent/mqd"),
            run: None,
        }
    }

    fn socket(&self) -> PathBuf {
        self.dir.path().join("mqd.sock")
    }

    fn run(&self) -> &Run {
        self.run.as_ref().expect("the client should have run")
    }

    fn daemon(&self) -> &FakeDaemon {
        self.daemon.as_ref().expect("a daemon should be scripted")
    }
}

#[fixture]
fn world() -> RefCell<ClientWorld> {
    RefCell::new(ClientWorld::new())
}

#[given("a daemon replying \"{reply}\"")]
fn given_daemon_replying(world: &RefCell<ClientWorld>, reply: String) {
    let mut state = world.borrow_mut();
    let socket = state.socket();
    state.daemon = Some(FakeDaemon::listening(socket, vec![canned_reply(&reply)]));
}

#[given("no daemon is running")]
fn given_no_daemon(world: &RefCell<ClientWorld>) {
    assert!(!world.borrow().socket().exists());
}

#[given("a daemon binary that brings the socket up replying \"{reply}\"")]
fn given_daemon_on_demand(world: &RefCell<ClientWorld>, reply: String) {
    let mut state = world.borrow_mut();
    let socket = state.socket();
    // `true` stands in for a launcher that detaches immediately.
    state.binary = OsString::from("true");
    state.daemon = Some(FakeDaemon::after(
        socket,
        Duration::from_millis(200),
        vec![canned_reply(&reply)],
    ));
}

#[when("the user runs \"{line}\"")]
fn when_user_runs(world: &RefCell<ClientWorld>, line: String) {
    let mut state = world.borrow_mut();
    let socket = state.socket();
    let mut args: Vec<OsString> = line.split_whitespace().map(OsString::from).collect();
    let flags = [OsString::from("--daemon-socket"), socket.into_os_string()];
    args.splice(1..1, flags);

    let client = Client::new()
        .with_daemon_binary(state.binary.clone())
        .with_startup_timeout(Duration::from_secs(5));
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = client.run(args, &mut stdout, &mut stderr);
    state.run = Some(Run {
        code,
        stdout: String::from_utf8(stdout).expect("utf8 stdout"),
        stderr: String::from_utf8(stderr).expect("utf8 stderr"),
    });
}

#[then("the exit status is {code}")]
fn then_exit_status(world: &RefCell<ClientWorld>, code: u8) {
    let state = world.borrow();
    let run = state.run();
    assert_eq!(run.code, ExitCode::from(code), "stderr: {}", run.stderr);
}

#[then("stdout contains \"{text}\"")]
fn then_stdout_contains(world: &RefCell<ClientWorld>, text: String) {
    let state = world.borrow();
    assert!(state.run().stdout.contains(&text), "{:?}", state.run().stdout);
}

#[then("stdout is empty")]
fn then_stdout_empty(world: &RefCell<ClientWorld>) {
    assert!(world.borrow().run().stdout.is_empty());
}

#[then("stderr contains \"{text}\"")]
fn then_stderr_contains(world: &RefCell<ClientWorld>, text: String) {
    let state = world.borrow();
    assert!(state.run().stderr.contains(&text), "{:?}", state.run().stderr);
}

#[then("stderr does not contain \"{text}\"")]
fn then_stderr_lacks(world: &RefCell<ClientWorld>, text: String) {
    let state = world.borrow();
    assert!(!state.run().stderr.contains(&text), "{:?}", state.run().stderr);
}

#[then("the daemon received \"{request}\"")]
fn then_daemon_received(world: &RefCell<ClientWorld>, request: String) {
    let expected: Vec<String> = request.split_whitespace().map(str::to_owned).collect();
    assert_eq!(world.borrow().daemon().requests(), vec![expected]);
}

#[scenario(
    path = "tests/features/client.feature",
    name = "Output lines go to stdout and OK exits successfully"
)]
fn output_lines_go_to_stdout(#[from(world)] world: RefCell<ClientWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/client.feature",
    name = "Error lines go to stderr and KO fails"
)]
fn error_lines_go_to_stderr(#[from(world)] world: RefCell<ClientWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/client.feature",
    name = "Job arguments reach the daemon untouched"
)]
fn job_arguments_untouched(#[from(world)] world: RefCell<ClientWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/client.feature",
    name = "A reply without a status is an error"
)]
fn reply_without_status(#[from(world)] world: RefCell<ClientWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/client.feature",
    name = "A hang-up after exit counts as success"
)]
fn hang_up_after_exit(#[from(world)] world: RefCell<ClientWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/client.feature",
    name = "A missing daemon is started on demand"
)]
fn missing_daemon_started(#[from(world)] world: RefCell<ClientWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/client.feature",
    name = "A daemon that cannot be spawned is reported"
)]
fn unspawnable_daemon_reported(#[from(world)] world: RefCell<ClientWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/client.feature",
    name = "Exit never starts a daemon"
)]
fn exit_never_starts_daemon(#[from(world)] world: RefCell<ClientWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/client.feature", name = "A verb is required")]
fn verb_required(#[from(world)] world: RefCell<ClientWorld>) {
    drop(world);
}
