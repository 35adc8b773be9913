//! A scripted stand-in for `mqd` listening on a real Unix socket.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use mq_protocol::{Response, decode_request};

/// Canned replies, one per accepted connection, in order.
pub(crate) type Replies = Vec<Vec<u8>>;

/// Records each decoded request and answers with the next canned reply.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeDaemon {
    requests: Arc<Mutex<Vec<Vec<String>>>>,
}

impl FakeDaemon {
    /// Binds `socket` now and serves `replies` in the background.
    pub(crate) fn listening(socket: PathBuf, replies: Replies) -> Self {
        let listener = UnixListener::bind(socket).expect("bind fake daemon");
        let daemon = Self::default();
        let served = daemon.clone();
        thread::spawn(move || served.serve(&listener, replies));
        daemon
    }

    /// Binds `socket` only after `delay`, as a freshly spawned daemon would.
    pub(crate) fn after(socket: PathBuf, delay: Duration, replies: Replies) -> Self {
        let daemon = Self::default();
        let served = daemon.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            let listener = UnixListener::bind(socket).expect("bind fake daemon");
            served.serve(&listener, replies);
        });
        daemon
    }

    pub(crate) fn requests(&self) -> Vec<Vec<String>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Answers each request with the next reply. Connections that close
    /// without sending anything, such as reachability checks, are skipped
    /// and keep their reply for the next caller.
    fn serve(&self, listener: &UnixListener, replies: Replies) {
        let mut pending = replies.into_iter().peekable();
        while pending.peek().is_some() {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(&stream);
            let mut request = Vec::new();
            match reader.read_until(b'\n', &mut request) {
                Ok(0) => continue,
                Ok(_) => {}
                Err(_) => return,
            }
            if let Ok(arguments) = decode_request(&request) {
                self.requests
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(arguments);
            }
            if let Some(reply) = pending.next() {
                drop((&stream).write_all(&reply));
            }
        }
    }
}

/// Reply named by a scenario step.
pub(crate) fn canned_reply(name: &str) -> Vec<u8> {
    match name {
        "listing" => {
            let mut response = Response::ok();
            response.push_out("UID STAT EXIT CMD");
            response.push_out("0   R*        sleep 30");
            response.encode()
        }
        "unknown job" => Response::failure("no such job: 9").encode(),
        "ok" => Response::ok().encode(),
        "nothing" => Vec::new(),
        other => panic!("no canned reply named '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixStream;

    #[test]
    fn silent_connections_do_not_use_up_replies() {
        let dir = tempfile::tempdir().expect("temp dir");
        let socket = dir.path().join("mqd.sock");
        let daemon = FakeDaemon::listening(socket.clone(), vec![canned_reply("ok")]);

        drop(UnixStream::connect(&socket).expect("reachability check"));

        let mut stream = UnixStream::connect(&socket).expect("connect");
        stream.write_all(b"list\0\n").expect("send request");
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).expect("read reply");
        assert_eq!(reply, Response::ok().encode());
        assert_eq!(daemon.requests(), vec![vec!["list".to_owned()]]);
    }
}
