//! Signal handling (spec.md §5 "Signals"). Handlers post an intent onto a
//! channel the event loop drains each iteration, rather than mutating
//! `Server` state from inside a signal handler -- the loop is the only
//! thing ever allowed to touch it (spec.md §5 "Scheduling model").

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalIntent {
    /// Close the log, reopen it, re-read configuration, fire `OnRehash`.
    Rehash,
    /// Exit gracefully.
    Terminate,
}

/// Installs the handlers named in spec.md §5 and returns the receiving end
/// of the channel the event loop polls once per iteration.
///
/// `SIGPIPE` and `SIGALRM` are ignored outright (no-op handlers, never
/// posted to the loop). `SIGSEGV`'s optional diagnostic handler is a
/// deployment concern left to the binary entry point, not this core.
pub fn install() -> std::io::Result<mpsc::UnboundedReceiver<SignalIntent>> {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut hangup = signal(SignalKind::hangup())?;
    let tx_hup = tx.clone();
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            let _ = tx_hup.send(SignalIntent::Rehash);
        }
    });

    let mut terminate = signal(SignalKind::terminate())?;
    let tx_term = tx.clone();
    tokio::spawn(async move {
        while terminate.recv().await.is_some() {
            let _ = tx_term.send(SignalIntent::Terminate);
        }
    });

    // Ignored per spec.md §5; still must be reaped so a write to a closed
    // socket or a lingering itimer doesn't default to killing the process.
    if let Ok(mut pipe) = signal(SignalKind::pipe()) {
        tokio::spawn(async move { while pipe.recv().await.is_some() {} });
    }
    if let Ok(mut alarm) = signal(SignalKind::alarm()) {
        tokio::spawn(async move { while alarm.recv().await.is_some() {} });
    }

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sigterm_posts_a_terminate_intent() {
        let mut rx = install().expect("signal handlers install");
        unsafe {
            libc_raise_sigterm();
        }
        let intent = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv()).await;
        assert_eq!(intent.unwrap(), Some(SignalIntent::Terminate));
    }

    /// Raises `SIGTERM` against the current process, the only way to
    /// exercise `install()`'s handler registration without a subprocess.
    unsafe fn libc_raise_sigterm() {
        extern "C" {
            fn raise(sig: i32) -> i32;
        }
        const SIGTERM: i32 = 15;
        raise(SIGTERM);
    }
}
