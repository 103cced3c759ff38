//! Timer ordering seed scenario, run directly on a standalone `EventLoop`
//! (no `TcpServer` involved) — `EventLoop::new()` and `EventLoop::run()` are
//! called on this test thread so the owning-thread assertion inside `run()`
//! is satisfied without spawning anything.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reactorio::EventLoop;

#[test]
fn run_after_fires_in_deadline_order() {
    let loop_ = EventLoop::new().expect("EventLoop::new");
    let fired: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let f1 = Arc::clone(&fired);
    loop_.run_after(Duration::from_millis(100), move || {
        f1.lock().unwrap().push("p1");
    });

    let f2 = Arc::clone(&fired);
    loop_.run_after(Duration::from_millis(150), move || {
        f2.lock().unwrap().push("p2");
    });

    let f3 = Arc::clone(&fired);
    let quitter = Arc::clone(&loop_);
    loop_.run_after(Duration::from_millis(260), move || {
        f3.lock().unwrap().push("done");
        quitter.quit();
    });

    loop_.run();

    let order = fired.lock().unwrap().clone();
    assert_eq!(order, vec!["p1", "p2", "done"]);
}

#[test]
fn run_every_fires_repeatedly() {
    let loop_ = EventLoop::new().expect("EventLoop::new");
    let ticks = Arc::new(Mutex::new(0u32));

    let t1 = Arc::clone(&ticks);
    let quitter = Arc::clone(&loop_);
    loop_.run_every(Duration::from_millis(50), move || {
        let mut n = t1.lock().unwrap();
        *n += 1;
        if *n >= 3 {
            quitter.quit();
        }
    });

    loop_.run();

    assert_eq!(*ticks.lock().unwrap(), 3);
}

#[test]
fn a_cancelled_timer_never_fires() {
    let loop_ = EventLoop::new().expect("EventLoop::new");
    let fired = Arc::new(Mutex::new(false));

    let f1 = Arc::clone(&fired);
    let id = loop_.run_after(Duration::from_millis(50), move || {
        *f1.lock().unwrap() = true;
    });
    loop_.cancel_timer(id);

    let quitter = Arc::clone(&loop_);
    loop_.run_after(Duration::from_millis(150), move || {
        quitter.quit();
    });

    loop_.run();

    assert!(!*fired.lock().unwrap());
}
