//! Echo seed scenario: whatever a client sends comes back byte-for-byte, in
//! order, across several large frames on the same connection.

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::rc::Rc;
use std::time::Duration;

use rand::Rng;

#[test]
fn echo_round_trips_bytes_in_order() {
    let server = common::RunningServer::new(|srv| {
        srv.set_message_callback(Rc::new(|conn, buf, _now| {
            let data = buf.retrieve_all_as_vec();
            reactorio::TcpConnection::send(conn, &data);
        }));
    });

    let mut stream = TcpStream::connect(server.addr).expect("connect");
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.set_write_timeout(Some(Duration::from_secs(5))).unwrap();

    let mut rng = rand::rng();
    for frame in 0..10 {
        let mut payload = vec![0u8; 64 * 1024];
        rng.fill(payload.as_mut_slice());

        stream.write_all(&payload).unwrap_or_else(|e| panic!("write frame {frame}: {e}"));

        let mut received = vec![0u8; payload.len()];
        stream
            .read_exact(&mut received)
            .unwrap_or_else(|e| panic!("read frame {frame}: {e}"));
        assert_eq!(received, payload, "frame {frame} mismatch");
    }
}
