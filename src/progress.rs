//! Progress reporting for commit uploads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Progress snapshot delivered to observers after each update.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Repository path of the file that advanced.
    pub path: String,
    /// That file's own fraction complete, in `[0, 1]`.
    pub fraction: f64,
    /// Byte-weighted fraction across every registered file.
    pub overall: f64,
}

/// Observer interface for progress updates.
///
/// Implementations must not block: updates are delivered from the transfer
/// control flow between suspension points.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &TransferProgress);
}

#[derive(Debug, Clone, Copy)]
struct FileProgress {
    fraction: f64,
    size: u64,
}

/// Tracks per-file fractional progress and aggregates it into an overall
/// fraction weighted by file size: `Σ(fraction_i × size_i) / Σ(size_i)`.
///
/// Skipped files are reported as complete so server-side dedup does not
/// make the bar stall short of 100%.
pub struct ProgressAggregator {
    files: Mutex<HashMap<String, FileProgress>>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl ProgressAggregator {
    pub fn new(observer: Option<Arc<dyn ProgressObserver>>) -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            observer,
        }
    }

    /// Register a file before its transfer starts. Registration at 0.0 lets
    /// the overall fraction account for pending bytes from the beginning.
    pub fn register(&self, path: &str, size: u64) {
        let mut files = self.files.lock().unwrap();
        files.insert(
            path.to_string(),
            FileProgress {
                fraction: 0.0,
                size,
            },
        );
    }

    /// Record a file's current fraction and notify the observer.
    pub fn update(&self, path: &str, fraction: f64) {
        let snapshot = {
            let mut files = self.files.lock().unwrap();
            let Some(entry) = files.get_mut(path) else {
                return;
            };
            entry.fraction = fraction.clamp(0.0, 1.0);
            TransferProgress {
                path: path.to_string(),
                fraction: entry.fraction,
                overall: overall_of(&files),
            }
        };
        if let Some(observer) = &self.observer {
            observer.on_progress(&snapshot);
        }
    }

    /// Mark a file fully transferred (or skipped).
    pub fn complete(&self, path: &str) {
        self.update(path, 1.0);
    }

    /// Current overall fraction across all registered files.
    pub fn overall(&self) -> f64 {
        overall_of(&self.files.lock().unwrap())
    }
}

fn overall_of(files: &HashMap<String, FileProgress>) -> f64 {
    let total: u64 = files.values().map(|f| f.size).sum();
    if total == 0 {
        return 0.0;
    }
    let done: f64 = files.values().map(|f| f.fraction * f.size as f64).sum();
    done / total as f64
}
