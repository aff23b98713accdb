//! Worker pool
//!
//! A fixed set of threads pulls items from a pending queue that is
//! filled once up front, prepares them and pushes one result per item.
//! The wake callback tells the controller a result is waiting.

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, trace};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use super::{ImageResult, InputItem, Preparer};

/// Wake callback invoked after every pushed result
pub type WakeFn = Arc<dyn Fn() + Send + Sync>;

/// Number of workers for `items` inputs on `parallelism` cores
pub fn pool_size(items: usize, parallelism: usize) -> usize {
    items.min(parallelism).max(1)
}

/// Detected parallelism, optionally capped (0 = no cap)
pub fn parallelism(cap: usize) -> usize {
    let n = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    if cap == 0 {
        n
    } else {
        n.min(cap)
    }
}

pub struct WorkerPool {
    keep_going: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Queue `items` and start `size` workers
    pub fn spawn(
        items: Vec<InputItem>,
        size: usize,
        preparer: Arc<dyn Preparer>,
        results: Sender<ImageResult>,
        wake: WakeFn,
    ) -> io::Result<Self> {
        let (pending_tx, pending_rx) = bounded(items.len().max(1));
        for item in items {
            // Capacity covers every item
            let _ = pending_tx.try_send(item);
        }
        drop(pending_tx);

        let keep_going = Arc::new(AtomicBool::new(true));
        let size = size.max(1);
        for n in 0..size {
            let worker = Worker {
                pending: pending_rx.clone(),
                results: results.clone(),
                preparer: Arc::clone(&preparer),
                wake: Arc::clone(&wake),
                keep_going: Arc::clone(&keep_going),
            };
            thread::Builder::new()
                .name(format!("worker-{}", n))
                .spawn(move || worker.run())?;
        }
        debug!("Started {} workers", size);

        Ok(Self { keep_going })
    }

    /// Stop taking new items. Conversions in progress still finish.
    pub fn stop(&self) {
        self.keep_going.store(false, Ordering::SeqCst);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    pending: Receiver<InputItem>,
    results: Sender<ImageResult>,
    preparer: Arc<dyn Preparer>,
    wake: WakeFn,
    keep_going: Arc<AtomicBool>,
}

impl Worker {
    fn run(self) {
        while self.keep_going.load(Ordering::SeqCst) {
            let Ok(item) = self.pending.try_recv() else {
                break;
            };
            let source = item.source.to_string();
            trace!("Preparing {}", source);
            let outcome = self.preparer.prepare(&item);
            if self.results.send(ImageResult { source, outcome }).is_err() {
                break;
            }
            (self.wake)();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrepareError;
    use crate::pipeline::{ImagePayload, InputSource, PixelFormat};
    use crossbeam_channel::unbounded;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct NameCheck;

    impl Preparer for NameCheck {
        fn prepare(&self, item: &InputItem) -> Result<ImagePayload, PrepareError> {
            if item.source.to_string().contains("bad") {
                return Err(PrepareError::Other("bad input".to_string()));
            }
            Ok(ImagePayload {
                width: 1,
                height: 1,
                format: PixelFormat::Rgb,
                data: vec![0, 0, 0],
                placement: None,
            })
        }
    }

    fn items(names: &[&str]) -> Vec<InputItem> {
        names
            .iter()
            .map(|n| InputItem::new(InputSource::Path(PathBuf::from(n))))
            .collect()
    }

    #[test]
    fn test_pool_size() {
        assert_eq!(pool_size(0, 8), 1);
        assert_eq!(pool_size(3, 8), 3);
        assert_eq!(pool_size(20, 8), 8);
        assert_eq!(pool_size(5, 0), 1);
        assert!(parallelism(0) >= 1);
        assert_eq!(parallelism(1), 1);
    }

    #[test]
    fn test_one_result_per_item() {
        let (tx, rx) = unbounded();
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&wakes);
        let _pool = WorkerPool::spawn(
            items(&["a.png", "bad.png", "c.png", "d.png"]),
            2,
            Arc::new(NameCheck),
            tx,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        let mut results: Vec<ImageResult> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        results.sort_by(|a, b| a.source.cmp(&b.source));
        assert!(results[0].outcome.is_ok());
        assert!(results[1].outcome.is_err());
        assert_eq!(results[1].source, "bad.png");

        // All senders are gone once the workers exit
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_err());
        assert_eq!(wakes.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_stopped_pool_takes_nothing_new() {
        struct Slow;
        impl Preparer for Slow {
            fn prepare(&self, item: &InputItem) -> Result<ImagePayload, PrepareError> {
                std::thread::sleep(Duration::from_millis(100));
                NameCheck.prepare(item)
            }
        }

        let (tx, rx) = unbounded();
        let pool = WorkerPool::spawn(
            items(&["a", "b", "c", "d", "e", "f"]),
            1,
            Arc::new(Slow),
            tx,
            Arc::new(|| {}),
        )
        .unwrap();
        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(first.outcome.is_ok());
        pool.stop();

        let mut rest = 0;
        while rx.recv_timeout(Duration::from_secs(2)).is_ok() {
            rest += 1;
        }
        // At most the conversion in progress when stopped
        assert!(rest <= 1);
    }
}
