use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, DebouncedEventKind};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

/// Events emitted by the file watcher
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// A file under the watched directory was written
    Saved(PathBuf),
    /// The watcher reported an error and may have stopped delivering events
    Failed(String),
}

/// Saved paths from one debounced batch, editor swap and backup files skipped
fn saved_paths(events: &[DebouncedEvent]) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = events
        .iter()
        .filter(|e| e.kind == DebouncedEventKind::Any)
        .map(|e| e.path.clone())
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            !(name.ends_with('~') || name.ends_with(".swp") || name.starts_with(".#"))
        })
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

/// Debounced watcher over the directory holding the open source file.
/// Stands in for the editor's save notifications.
pub struct FileWatcher {
    _watcher: notify_debouncer_mini::Debouncer<RecommendedWatcher>,
}

impl FileWatcher {
    /// Start watching `dir` (not recursively). Events are debounced by
    /// `debounce_ms` milliseconds and sent to `tx`.
    pub fn new(dir: &Path, debounce_ms: u64, tx: mpsc::Sender<WatchEvent>) -> Result<Self> {
        let mut debouncer = new_debouncer(
            Duration::from_millis(debounce_ms),
            move |result: std::result::Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    for path in saved_paths(&events) {
                        if tx.send(WatchEvent::Saved(path)).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    log::warn!("file watcher error: {}", e);
                    let _ = tx.send(WatchEvent::Failed(e.to_string()));
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        log::info!("watching {} (debounce {}ms)", dir.display(), debounce_ms);

        Ok(FileWatcher {
            _watcher: debouncer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(path: &str, kind: DebouncedEventKind) -> DebouncedEvent {
        DebouncedEvent {
            path: PathBuf::from(path),
            kind,
        }
    }

    #[test]
    fn keeps_real_saves_once() {
        let events = vec![
            event("/ws/src/code.c", DebouncedEventKind::Any),
            event("/ws/src/code.c", DebouncedEventKind::Any),
            event("/ws/src/.code.c.swp", DebouncedEventKind::Any),
            event("/ws/src/code.c~", DebouncedEventKind::Any),
            event("/ws/src/other.c", DebouncedEventKind::AnyContinuous),
        ];
        assert_eq!(saved_paths(&events), vec![PathBuf::from("/ws/src/code.c")]);
    }

    #[test]
    fn reports_writes_in_watched_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("code.c");
        std::fs::write(&file, "int x;\n").unwrap();

        let (tx, rx) = mpsc::channel();
        let _watcher = FileWatcher::new(dir.path(), 20, tx).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        std::fs::write(&file, "int y;\n").unwrap();

        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        match event {
            WatchEvent::Saved(path) => {
                assert_eq!(path.file_name(), file.file_name());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
