//! Bridge from async callers onto the rayon pool.
//!
//! Archive reads and image decoding block, so they never run on a tokio
//! worker. The closure runs on rayon and its result comes back over a oneshot.
//! A panic in the closure is caught and reported as [`Error::WorkerPanicked`];
//! an uncaught panic inside `rayon::spawn` aborts the process.

use std::panic::{self, AssertUnwindSafe};

use tokio::sync::oneshot;

use crate::{Error, Result};

pub(crate) async fn offload<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    rayon::spawn(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(Error::WorkerPanicked(message))
        });
        // Receiver may be gone if the caller was dropped; nothing to do then.
        let _ = tx.send(result);
    });
    rx.await.map_err(|_| Error::WorkerGone)?
}
