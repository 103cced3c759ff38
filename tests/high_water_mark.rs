//! High-water-mark seed scenario: the callback must fire on the rising edge
//! of the threshold and then stay silent while the output buffer remains
//! above it, even as more data is queued.
//!
//! Exercised by echoing data back to a client that never reads its socket,
//! so the server's output buffer backs up past the (deliberately small)
//! configured mark.

mod common;

use std::io::Write;
use std::net::TcpStream;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MARK: usize = 64 * 1024;

#[test]
fn high_water_mark_fires_once_on_the_rising_edge() {
    let fires = Arc::new(AtomicUsize::new(0));
    let f1 = Arc::clone(&fires);

    let server = common::RunningServer::new(move |srv| {
        srv.set_message_callback(Rc::new(|conn, buf, _now| {
            let data = buf.retrieve_all_as_vec();
            reactorio::TcpConnection::send(conn, &data);
        }));
        let f2 = Arc::clone(&f1);
        srv.set_high_water_mark_callback(
            Rc::new(move |_conn, _len| {
                f2.fetch_add(1, Ordering::SeqCst);
            }),
            MARK,
        );
    });

    let mut stream = TcpStream::connect(server.addr).expect("connect");
    stream.set_write_timeout(Some(Duration::from_secs(5))).unwrap();

    // Several times the mark, written without ever reading the echoed
    // reply: the kernel's send buffer on the server side fills quickly,
    // after which every further echoed byte piles up in the connection's
    // user-space output buffer.
    let chunk = vec![0x42u8; 64 * 1024];
    for _ in 0..32 {
        if stream.write_all(&chunk).is_err() {
            break;
        }
    }

    std::thread::sleep(Duration::from_millis(200));

    assert_eq!(
        fires.load(Ordering::SeqCst),
        1,
        "high-water callback must fire exactly once while the buffer stays above the mark"
    );
}
