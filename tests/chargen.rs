//! Chargen seed scenario: the server pushes data continuously via the
//! write-complete callback chain, and must tolerate the client disappearing
//! mid-stream (a broken pipe) without taking the process down with it — the
//! reason `EventLoop::new` installs `SIGPIPE` ignoring at construction.

mod common;

use std::io::Read;
use std::net::TcpStream;
use std::rc::Rc;
use std::time::{Duration, Instant};

const LINE_LEN: usize = 72;

fn pattern(total: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(total);
    let mut start = 33u8;
    while buf.len() < total {
        for c in 0..LINE_LEN as u8 {
            buf.push(33 + (start + c - 33) % (126 - 33));
        }
        buf.push(b'\n');
        start = start.wrapping_add(1);
        if start >= 126 {
            start = 33;
        }
    }
    buf.truncate(total);
    buf
}

#[test]
fn chargen_survives_a_client_that_stops_reading() {
    let message = pattern(8192);

    let server = common::RunningServer::new(move |srv| {
        let m1 = message.clone();
        srv.set_connection_callback(Rc::new(move |conn| {
            if conn.connected() {
                reactorio::TcpConnection::send(conn, &m1);
            }
        }));
        let m2 = message.clone();
        srv.set_write_complete_callback(Rc::new(move |conn| {
            reactorio::TcpConnection::send(conn, &m2);
        }));
    });

    let mut stream = TcpStream::connect(server.addr).expect("connect");
    stream.set_read_timeout(Some(Duration::from_millis(200))).unwrap();

    let deadline = Instant::now() + Duration::from_millis(300);
    let mut sink = [0u8; 4096];
    let mut total = 0usize;
    while Instant::now() < deadline {
        match stream.read(&mut sink) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                break
            }
            Err(e) => panic!("unexpected read error: {e}"),
        }
    }

    // Drop the client without reading any more; the server keeps writing
    // into a connection whose peer is gone until a `write(2)` reports
    // `EPIPE`, which must surface as an ordinary I/O error and not a
    // process-terminating signal.
    drop(stream);

    assert!(total > 0, "expected to receive at least one chargen burst before disconnecting");

    // Give the server a moment to notice the broken pipe and tear the
    // connection down; the real assertion is that dropping `server` below
    // (which quits and joins the I/O thread) completes at all.
    std::thread::sleep(Duration::from_millis(150));
    drop(server);
}
