use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives a notification each time a batch is fully accepted by the store
pub trait Progress: Send + Sync {
    /// Called once per completed batch with the number of write requests it held
    fn batch_written(&self, items: usize);
}

/// Prints one `.` on stdout per completed batch
#[derive(Debug, Default)]
pub struct DotProgress;

impl Progress for DotProgress {
    fn batch_written(&self, _items: usize) {
        let mut stdout = io::stdout().lock();
        // progress markers are best effort
        let _ = stdout.write_all(b".");
        let _ = stdout.flush();
    }
}

/// Discards progress notifications
#[derive(Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn batch_written(&self, _items: usize) {}
}

/// Counts completed batches and items
#[derive(Debug, Default)]
pub struct CountingProgress {
    batches: AtomicUsize,
    items: AtomicUsize,
}

impl CountingProgress {
    /// Batches reported so far
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Items reported so far
    pub fn items(&self) -> usize {
        self.items.load(Ordering::SeqCst)
    }
}

impl Progress for CountingProgress {
    fn batch_written(&self, items: usize) {
        let _ = self.batches.fetch_add(1, Ordering::SeqCst);
        let _ = self.items.fetch_add(items, Ordering::SeqCst);
    }
}

impl<P: Progress + ?Sized> Progress for std::sync::Arc<P> {
    fn batch_written(&self, items: usize) {
        (**self).batch_written(items)
    }
}
