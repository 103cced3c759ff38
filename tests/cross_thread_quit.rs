//! Cross-thread quit seed scenario: a loop running on its own thread
//! (via `LoopThread`) must notice `quit()` called from a different thread
//! promptly, not only after its next scheduled wake-up.

mod common;

use std::time::{Duration, Instant};

use reactorio::LoopThread;

#[test]
fn quit_from_another_thread_stops_the_loop_promptly() {
    common::init();

    let thread = LoopThread::new();
    let loop_ = thread.start_loop();

    // Give the loop a moment to enter its first `poll` block.
    std::thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    loop_.quit();
    drop(thread); // joins the spawned thread

    assert!(
        start.elapsed() < Duration::from_secs(2),
        "quit() should wake the loop promptly via the waker, not wait out the poll timeout"
    );
}
