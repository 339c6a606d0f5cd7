//! Per-path debouncing of change notifications.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::{Instant, sleep_until};
use tracing::trace;

/// Quiescence interval after the last event before the action runs.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Entry {
    deadline: Instant,
    running: bool,
    rearmed: bool,
    task: Option<AbortHandle>,
}

#[derive(Debug, Default)]
struct Table {
    entries: HashMap<PathBuf, Entry>,
    closed: bool,
}

/// Collapses bursts of triggers for the same path into one action run.
///
/// The first trigger for a path schedules the action after the window; later triggers
/// push the deadline back. Once the action has run the entry is removed, so the next
/// trigger starts a fresh cycle. A trigger that arrives while the action is running
/// schedules exactly one more run after it, so runs for one path never overlap.
///
/// # Examples
///
/// ```rust
/// use reconfy::watch::{DEBOUNCE_WINDOW, Debouncer};
/// use std::path::PathBuf;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let debouncer = Debouncer::new(DEBOUNCE_WINDOW, |path: PathBuf| async move {
///     println!("{} settled", path.display());
/// });
///
/// debouncer.trigger(PathBuf::from("/templates/app.tmpl"));
/// debouncer.trigger(PathBuf::from("/templates/app.tmpl"));
/// assert_eq!(debouncer.pending(), 1);
/// # }
/// ```
pub struct Debouncer<F> {
    window: Duration,
    table: Arc<Mutex<Table>>,
    action: Arc<F>,
}

impl<F, Fut> Debouncer<F>
where
    F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Create a debouncer running `action` once per settled burst.
    pub fn new(window: Duration, action: F) -> Self {
        Self {
            window,
            table: Arc::new(Mutex::new(Table::default())),
            action: Arc::new(action),
        }
    }

    /// Record an occurrence for `path`. Must be called inside a tokio runtime.
    ///
    /// Returns `false` once the debouncer is closed.
    pub fn trigger(&self, path: PathBuf) -> bool {
        let mut table = self.table.lock();
        if table.closed {
            return false;
        }

        let deadline = Instant::now() + self.window;
        if let Some(entry) = table.entries.get_mut(&path) {
            entry.deadline = deadline;
            if entry.running {
                entry.rearmed = true;
            }
            trace!(path = %path.display(), rearmed = entry.rearmed, "debounce deadline reset");
            return true;
        }

        let task = tokio::spawn(fire(
            Arc::clone(&self.table),
            path.clone(),
            Arc::clone(&self.action),
        ));
        table.entries.insert(
            path,
            Entry {
                deadline,
                running: false,
                rearmed: false,
                task: Some(task.abort_handle()),
            },
        );
        true
    }
}

impl<F> Debouncer<F> {
    /// Number of paths with a scheduled or running action.
    pub fn pending(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Stop accepting triggers and abandon every action that has not started.
    ///
    /// Actions already running are left to finish.
    pub fn close(&self) {
        let mut table = self.table.lock();
        table.closed = true;
        table.entries.retain(|_, entry| {
            if entry.running {
                return true;
            }
            if let Some(task) = entry.task.take() {
                task.abort();
            }
            false
        });
    }
}

impl<F> Drop for Debouncer<F> {
    fn drop(&mut self) {
        self.close();
    }
}

async fn fire<F, Fut>(table: Arc<Mutex<Table>>, path: PathBuf, action: Arc<F>)
where
    F: Fn(PathBuf) -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        // Sleep until the deadline stops moving.
        loop {
            let Some(deadline) = table.lock().entries.get(&path).map(|e| e.deadline) else {
                return;
            };
            sleep_until(deadline).await;

            let mut guard = table.lock();
            let Some(entry) = guard.entries.get_mut(&path) else {
                return;
            };
            if entry.deadline <= Instant::now() {
                entry.running = true;
                break;
            }
        }

        action(path.clone()).await;

        let mut guard = table.lock();
        let table = &mut *guard;
        match table.entries.get_mut(&path) {
            Some(entry) if entry.rearmed && !table.closed => {
                entry.rearmed = false;
                entry.running = false;
            }
            _ => {
                table.entries.remove(&path);
                return;
            }
        }
    }
}
