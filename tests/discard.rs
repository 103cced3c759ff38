//! A connection that reads and immediately discards everything it receives,
//! the simplest possible seed scenario: a large write must drain without the
//! server's input buffer growing unbounded or the connection ever stalling.

mod common;

use std::io::Write;
use std::net::TcpStream;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn discard_drains_a_large_write_without_echoing() {
    let connects = Arc::new(AtomicUsize::new(0));
    let disconnects = Arc::new(AtomicUsize::new(0));
    let bytes_seen = Arc::new(AtomicUsize::new(0));

    let c1 = Arc::clone(&connects);
    let d1 = Arc::clone(&disconnects);
    let b1 = Arc::clone(&bytes_seen);

    let server = common::RunningServer::new(move |srv| {
        let c2 = Arc::clone(&c1);
        let d2 = Arc::clone(&d1);
        srv.set_connection_callback(Rc::new(move |conn| {
            if conn.connected() {
                c2.fetch_add(1, Ordering::SeqCst);
            } else {
                d2.fetch_add(1, Ordering::SeqCst);
            }
        }));
        let b2 = Arc::clone(&b1);
        srv.set_message_callback(Rc::new(move |_conn, buf, _now| {
            b2.fetch_add(buf.readable_bytes(), Ordering::SeqCst);
            buf.retrieve_all();
        }));
    });

    let mut stream = TcpStream::connect(server.addr).expect("connect");
    stream.set_write_timeout(Some(Duration::from_secs(5))).unwrap();

    let payload = vec![0x5au8; 1024 * 1024];
    stream.write_all(&payload).expect("write 1 MiB");
    drop(stream);

    for _ in 0..500 {
        if disconnects.load(Ordering::SeqCst) >= 1 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(bytes_seen.load(Ordering::SeqCst), payload.len());
}
