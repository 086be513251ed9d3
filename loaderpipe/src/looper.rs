//! Consumer-thread event loop
//!
//! `MainLooper` is owned by the one designated consumer thread and is not
//! `Send`. Other threads reach it through cloneable `MainHandler`s, which post
//! tasks onto an unbounded channel. The looper runs posted tasks one at a
//! time, in posting order, on its own thread.
//!
//! Waiting uses a private current-thread tokio runtime; the tasks themselves
//! run outside `block_on`, so a panicking task unwinds straight into the
//! consumer thread and leaves the looper usable.
//!
//! Do not pump a looper from inside an async context: `block_on` would panic.

use std::marker::PhantomData;
use std::rc::Rc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::trace;

type Task = Box<dyn FnOnce() + Send>;

/// Posts tasks to the consumer thread
#[derive(Clone)]
pub struct MainHandler {
    tx: mpsc::UnboundedSender<Task>,
    thread: ThreadId,
}

impl MainHandler {
    /// Queue `task` for the consumer thread
    ///
    /// Returns `false` if the looper is gone; the task is dropped unrun.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(task)).is_ok()
    }

    #[must_use]
    pub fn consumer_thread(&self) -> ThreadId {
        self.thread
    }

    #[must_use]
    pub fn is_consumer_thread(&self) -> bool {
        std::thread::current().id() == self.thread
    }
}

/// The consumer thread's task loop
pub struct MainLooper {
    rx: mpsc::UnboundedReceiver<Task>,
    runtime: tokio::runtime::Runtime,
    _pinned: PhantomData<Rc<()>>,
}

impl MainLooper {
    /// Create a looper owned by the calling thread, plus a handler for it
    ///
    /// # Errors
    /// Fails if the private wait runtime cannot be built
    pub fn new() -> std::io::Result<(Self, MainHandler)> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = MainHandler {
            tx,
            thread: std::thread::current().id(),
        };
        let looper = Self {
            rx,
            runtime,
            _pinned: PhantomData,
        };
        Ok((looper, handler))
    }

    /// Run up to `max` tasks, waiting at most `timeout` in total
    ///
    /// Returns how many tasks ran.
    pub fn pump(&mut self, max: usize, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut ran = 0;
        while ran < max {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let rx = &mut self.rx;
            // The timer must be created inside the runtime
            let next = self
                .runtime
                .block_on(async { tokio::time::timeout(remaining, rx.recv()).await });
            match next {
                Ok(Some(task)) => {
                    task();
                    ran += 1;
                }
                Ok(None) | Err(_) => break,
            }
        }
        trace!(ran, "looper pumped");
        ran
    }

    /// Run every task that is already queued, without waiting
    pub fn drain(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Run tasks until every handler has been dropped
    pub fn run(&mut self) -> usize {
        let mut ran = 0;
        loop {
            let rx = &mut self.rx;
            match self.runtime.block_on(rx.recv()) {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn tasks_posted_elsewhere_run_on_the_looper_thread() {
        let (mut looper, handler) = MainLooper::new().unwrap();
        let consumer = std::thread::current().id();

        let poster = handler.clone();
        std::thread::spawn(move || {
            assert!(!poster.is_consumer_thread());
            let check = poster.clone();
            poster.post(move || assert!(check.is_consumer_thread()));
        })
        .join()
        .unwrap();

        assert_eq!(handler.consumer_thread(), consumer);
        assert_eq!(looper.pump(1, Duration::from_secs(5)), 1);
    }

    #[test]
    fn tasks_run_in_posting_order() {
        let (mut looper, handler) = MainLooper::new().unwrap();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for n in 0..5 {
            let order = Arc::clone(&order);
            handler.post(move || order.lock().push(n));
        }
        assert_eq!(looper.drain(), 5);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn pump_waits_for_a_task_posted_later() {
        let (mut looper, handler) = MainLooper::new().unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        let count = Arc::clone(&ran);
        let poster = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handler.post(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        });

        assert_eq!(looper.pump(1, Duration::from_secs(5)), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(poster.join().unwrap());
    }

    #[test]
    fn pump_gives_up_after_timeout() {
        let (mut looper, _handler) = MainLooper::new().unwrap();
        let started = Instant::now();
        assert_eq!(looper.pump(1, Duration::from_millis(50)), 0);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn run_returns_once_handlers_are_gone() {
        let (mut looper, handler) = MainLooper::new().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = Arc::clone(&count);
            handler.post(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(handler);
        assert_eq!(looper.run(), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn post_fails_once_looper_is_dropped() {
        let (looper, handler) = MainLooper::new().unwrap();
        drop(looper);
        assert!(!handler.post(|| {}));
    }

    #[test]
    fn looper_survives_a_panicking_task() {
        let (mut looper, handler) = MainLooper::new().unwrap();
        handler.post(|| panic!("boom"));
        handler.post(|| {});

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            looper.pump(1, Duration::from_secs(1))
        }));
        assert!(result.is_err());
        assert_eq!(looper.pump(1, Duration::from_secs(1)), 1);
    }
}
