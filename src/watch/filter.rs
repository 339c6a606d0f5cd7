//! Filesystem event filtering.

use notify::Event;
use notify::event::{EventKind, ModifyKind, RenameMode};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Decides which raw filesystem events are content changes to a monitored path.
///
/// Monitored paths are the input files plus every direct child of the extra watch
/// directories. Presence of each path is tracked so that a create event for a path
/// that already exists (a create without a write) is not treated as a change.
///
/// | event                                  | effect                          |
/// |----------------------------------------|---------------------------------|
/// | `Modify(Data/Any)`, `Any`              | accepted                        |
/// | `Create`                               | accepted unless already present |
/// | `Modify(Name(To))`, `Name(Both)` target | accepted (replaced by rename)  |
/// | `Modify(Name(Any/Other))`              | accepted if the path exists     |
/// | `Remove`, `Modify(Name(From))`         | marked absent                   |
/// | metadata, access, other                | ignored                         |
#[derive(Debug, Clone)]
pub struct EventFilter {
    files: HashSet<PathBuf>,
    dirs: HashSet<PathBuf>,
    present: HashSet<PathBuf>,
}

impl EventFilter {
    /// Create a filter for `files` and the children of `dirs`. Nothing is assumed to
    /// exist yet.
    pub fn new(
        files: impl IntoIterator<Item = PathBuf>,
        dirs: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        Self {
            files: files.into_iter().collect(),
            dirs: dirs.into_iter().collect(),
            present: HashSet::new(),
        }
    }

    /// Mark the monitored paths that currently exist on disk as present.
    pub fn seed_from_disk(mut self) -> Self {
        let existing_files: Vec<PathBuf> =
            self.files.iter().filter(|p| p.exists()).cloned().collect();
        self.present.extend(existing_files);

        for dir in &self.dirs {
            if let Ok(entries) = std::fs::read_dir(dir) {
                self.present
                    .extend(entries.filter_map(|e| e.ok()).map(|e| e.path()));
            }
        }
        self
    }

    /// Mark a path as existing.
    pub fn mark_present(&mut self, path: impl Into<PathBuf>) {
        self.present.insert(path.into());
    }

    /// Whether `path` is one of the monitored paths.
    pub fn is_monitored(&self, path: &Path) -> bool {
        self.files.contains(path) || path.parent().is_some_and(|dir| self.dirs.contains(dir))
    }

    /// Whether `path` is known to exist.
    pub fn is_present(&self, path: &Path) -> bool {
        self.present.contains(path)
    }

    /// Apply `event` and return the monitored paths whose content it changed.
    pub fn accept(&mut self, event: &Event) -> Vec<PathBuf> {
        let mut accepted = Vec::new();

        match event.kind {
            EventKind::Any | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
                for path in self.monitored(&event.paths) {
                    self.present.insert(path.clone());
                    accepted.push(path);
                }
            }
            EventKind::Create(_) => {
                for path in self.monitored(&event.paths) {
                    if self.present.insert(path.clone()) {
                        accepted.push(path);
                    }
                }
            }
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in &event.paths {
                    self.present.remove(path);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in self.monitored(&event.paths) {
                    self.present.insert(path.clone());
                    accepted.push(path);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to] = event.paths.as_slice() {
                    self.present.remove(from);
                    if self.is_monitored(to) {
                        self.present.insert(to.clone());
                        accepted.push(to.clone());
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                for path in self.monitored(&event.paths) {
                    if path.exists() {
                        self.present.insert(path.clone());
                        accepted.push(path);
                    } else {
                        self.present.remove(&path);
                    }
                }
            }
            EventKind::Modify(ModifyKind::Metadata(_) | ModifyKind::Other)
            | EventKind::Access(_)
            | EventKind::Other => {}
        }

        accepted
    }

    fn monitored(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        paths
            .iter()
            .filter(|p| self.is_monitored(p))
            .cloned()
            .collect()
    }
}
