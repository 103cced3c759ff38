#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Once;

use reactorio::{Address, LoopThread, TcpServer};

static INIT: Once = Once::new();

pub fn init() {
    INIT.call_once(|| {
        let _ = env_logger::try_init();
    });
}

/// Builds a `TcpServer` bound to an OS-assigned port on a freshly spawned
/// I/O thread, runs it, and tears both down on drop (via `LoopThread`'s own
/// `Drop`, which quits the loop and joins the thread).
pub struct RunningServer {
    pub server: TcpServer,
    pub addr: SocketAddr,
    _thread: LoopThread,
}

impl RunningServer {
    pub fn new(setup: impl FnOnce(&TcpServer)) -> RunningServer {
        RunningServer::with_thread_num(0, setup)
    }

    pub fn with_thread_num(thread_num: usize, setup: impl FnOnce(&TcpServer)) -> RunningServer {
        init();
        let thread = LoopThread::new();
        let loop_ = thread.start_loop();
        let server = TcpServer::new(loop_, Address::new(0)).expect("TcpServer::new");
        server.set_thread_num(thread_num);
        setup(&server);
        let addr = server.local_addr().expect("local_addr").to_socket_addr();
        server.start();
        RunningServer {
            server,
            addr,
            _thread: thread,
        }
    }
}
