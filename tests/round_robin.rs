//! Round-robin assignment seed scenario: with a 3-thread I/O pool, 7
//! sequential connections land on loops 0, 1, 2, 0, 1, 2, 0.

mod common;

use std::net::TcpStream;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

#[test]
fn connections_are_assigned_round_robin_across_io_threads() {
    let thread_ids: Arc<Mutex<Vec<ThreadId>>> = Arc::new(Mutex::new(Vec::new()));
    let t1 = Arc::clone(&thread_ids);

    let server = common::RunningServer::with_thread_num(3, move |srv| {
        let t2 = Arc::clone(&t1);
        srv.set_connection_callback(Rc::new(move |conn| {
            if conn.connected() {
                t2.lock().unwrap().push(std::thread::current().id());
            }
        }));
    });

    let mut clients = Vec::new();
    for _ in 0..7 {
        let stream = TcpStream::connect(server.addr).expect("connect");
        clients.push(stream);
        // Connections must be accepted (and their connection callback
        // fired) strictly in sequence for the round-robin mapping below
        // to be observable in order.
        std::thread::sleep(Duration::from_millis(30));
    }

    let ids = thread_ids.lock().unwrap();
    assert_eq!(ids.len(), 7);
    assert_eq!(ids[0], ids[3]);
    assert_eq!(ids[3], ids[6]);
    assert_eq!(ids[1], ids[4]);
    assert_eq!(ids[2], ids[5]);
    assert_ne!(ids[0], ids[1]);
    assert_ne!(ids[1], ids[2]);
    assert_ne!(ids[0], ids[2]);
}
