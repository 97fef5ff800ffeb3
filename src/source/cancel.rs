use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative stop flag, checked by the generator once per block.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Awaitable end-of-thread signal.
///
/// The generator thread holds the sending half and never sends; the channel
/// disconnects when the thread drops it, on normal exit or while unwinding.
pub struct Termination {
    rx: Receiver<()>,
}

impl Termination {
    pub fn pair() -> (Sender<()>, Termination) {
        let (tx, rx) = bounded(0);
        (tx, Termination { rx })
    }

    /// Returns true once the thread has exited.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) | Ok(()) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn token_is_shared() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn termination_fires_on_drop() {
        let (alive, termination) = Termination::pair();
        assert!(!termination.wait(Duration::from_millis(5)));

        let handle = thread::spawn(move || drop(alive));
        assert!(termination.wait(Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
