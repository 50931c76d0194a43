//! File system watcher feeding change notifications to the analyzer
//!
//! Events are debounced per file: every new event for a path replaces the
//! pending deadline of that path, so a burst of saves to one file reaches the
//! analyzer as a single change once the file has been quiet for the debounce
//! delay. Different files are debounced independently.
//!
//! Example timeline with a 300ms delay:
//! ```text
//! t=0ms:   a.ts changed  [a due at 300]
//! t=100ms: a.ts changed  [a due at 400]
//! t=150ms: b.ts changed  [b due at 450]
//! t=400ms: a.ts processed
//! t=450ms: b.ts processed
//! ```

use anyhow::{Context, Result};
use globset::GlobSet;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::analyzer::Analyzer;
use crate::config::AnalyzerConfig;
use crate::parsers::is_source_file;
use crate::workspace::{build_globset, ChangeKind, FileChange};

/// Per-path debouncing of change notifications
#[derive(Debug)]
pub struct PathDebouncer {
    delay: Duration,
    pending: HashMap<PathBuf, (ChangeKind, Instant)>,
}

impl PathDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
        }
    }

    /// Schedule `change`, replacing any pending change for the same path
    pub fn record(&mut self, change: FileChange, now: Instant) {
        self.pending
            .insert(change.path, (change.kind, now + self.delay));
    }

    /// Remove and return every change whose deadline has passed, ordered by path
    pub fn drain_due(&mut self, now: Instant) -> Vec<FileChange> {
        let due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();

        let mut changes: Vec<FileChange> = due
            .into_iter()
            .filter_map(|path| {
                let (kind, _) = self.pending.remove(&path)?;
                Some(FileChange::new(path, kind))
            })
            .collect();
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        changes
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|(_, deadline)| *deadline).min()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Watch `root` and forward debounced source-file changes to `analyzer`
///
/// Runs until the event channel closes; callers usually race it against
/// Ctrl+C.
pub async fn watch(root: &Path, analyzer: Arc<Analyzer>, config: &AnalyzerConfig) -> Result<()> {
    log::info!(
        "Starting file watcher for {:?} with {}ms debounce",
        root,
        config.debounce_ms
    );

    let excludes = build_globset(&config.exclude_patterns)?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut watcher = RecommendedWatcher::new(
        move |event: notify::Result<Event>| {
            // The receiver is gone only when the watch loop has ended
            let _ = tx.send(event);
        },
        Config::default(),
    )
    .context("Failed to create file watcher")?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .context("Failed to start watching directory")?;

    let mut debouncer = PathDebouncer::new(Duration::from_millis(config.debounce_ms));

    loop {
        let received = match debouncer.next_deadline() {
            Some(deadline) => {
                let deadline = tokio::time::Instant::from_std(deadline);
                tokio::time::timeout_at(deadline, rx.recv()).await.ok()
            }
            None => Some(rx.recv().await),
        };

        match received {
            Some(Some(Ok(event))) => {
                for change in process_event(&event) {
                    if should_watch_file(root, &change.path, &excludes) {
                        log::debug!("Detected change: {:?}", change.path);
                        debouncer.record(change, Instant::now());
                    }
                }
            }
            Some(Some(Err(e))) => {
                log::warn!("Watch error: {}", e);
            }
            Some(None) => {
                log::info!("Watcher channel disconnected, stopping...");
                break;
            }
            None => {}
        }

        for change in debouncer.drain_due(Instant::now()) {
            match analyzer.handle_file_change(&change).await {
                Ok(()) => log::info!("Processed {:?} {}", change.kind, change.path.display()),
                Err(e) => log::warn!("Failed to apply change to {}: {:#}", change.path.display(), e),
            }
        }
    }

    Ok(())
}

/// Changes described by a file system event
///
/// Access and other metadata-only events are ignored.
fn process_event(event: &Event) -> Vec<FileChange> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Changed,
        EventKind::Remove(_) => ChangeKind::Deleted,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|path| FileChange::new(path.clone(), kind))
        .collect()
}

/// Check if a changed path is an analyzable source file
///
/// Hidden files, anything below a hidden directory, directories and excluded
/// paths are skipped.
fn should_watch_file(root: &Path, path: &Path, excludes: &GlobSet) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);

    let hidden = relative.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    });
    if hidden {
        return false;
    }

    if path.is_dir() {
        return false;
    }

    is_source_file(path) && !excludes.is_match(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn default_excludes() -> GlobSet {
        build_globset(&AnalyzerConfig::default().exclude_patterns).unwrap()
    }

    #[test]
    fn test_should_watch_typescript_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("app.service.ts");
        fs::write(&file, "export class AppService {}").unwrap();

        assert!(should_watch_file(temp.path(), &file, &default_excludes()));
    }

    #[test]
    fn test_deleted_file_is_still_watched() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("gone.module.ts");
        assert!(should_watch_file(temp.path(), &file, &default_excludes()));
    }

    #[test]
    fn test_should_not_watch_unsupported_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("notes.txt");
        fs::write(&file, "plain text").unwrap();

        assert!(!should_watch_file(temp.path(), &file, &default_excludes()));
    }

    #[test]
    fn test_should_not_watch_hidden_paths() {
        let temp = TempDir::new().unwrap();
        let excludes = default_excludes();

        assert!(!should_watch_file(temp.path(), &temp.path().join(".hidden.ts"), &excludes));
        assert!(!should_watch_file(
            temp.path(),
            &temp.path().join(".modscope/cache.ts"),
            &excludes
        ));
    }

    #[test]
    fn test_should_not_watch_excluded_or_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("src.ts");
        fs::create_dir(&dir).unwrap();
        let excludes = default_excludes();

        assert!(!should_watch_file(temp.path(), &dir, &excludes));
        assert!(!should_watch_file(
            temp.path(),
            &temp.path().join("node_modules/pkg/index.ts"),
            &excludes
        ));
    }

    #[test]
    fn test_process_event_kinds() {
        let event = |kind| Event {
            kind,
            paths: vec![PathBuf::from("/ws/a.ts")],
            attrs: Default::default(),
        };

        let created = process_event(&event(EventKind::Create(notify::event::CreateKind::File)));
        assert_eq!(created, vec![FileChange::new("/ws/a.ts", ChangeKind::Created)]);

        let modified = process_event(&event(EventKind::Modify(notify::event::ModifyKind::Data(
            notify::event::DataChange::Any,
        ))));
        assert_eq!(modified, vec![FileChange::new("/ws/a.ts", ChangeKind::Changed)]);

        let removed = process_event(&event(EventKind::Remove(notify::event::RemoveKind::File)));
        assert_eq!(removed, vec![FileChange::new("/ws/a.ts", ChangeKind::Deleted)]);

        let accessed = process_event(&event(EventKind::Access(notify::event::AccessKind::Read)));
        assert!(accessed.is_empty());
    }

    #[test]
    fn test_debouncer_collapses_bursts_per_path() {
        let start = Instant::now();
        let ms = Duration::from_millis;
        let mut debouncer = PathDebouncer::new(ms(300));

        debouncer.record(FileChange::new("/ws/a.ts", ChangeKind::Changed), start);
        debouncer.record(FileChange::new("/ws/a.ts", ChangeKind::Changed), start + ms(100));
        debouncer.record(FileChange::new("/ws/b.ts", ChangeKind::Created), start + ms(150));

        // the second event for a.ts pushed its deadline to 400ms
        assert!(debouncer.drain_due(start + ms(300)).is_empty());
        assert_eq!(debouncer.next_deadline(), Some(start + ms(400)));

        let first = debouncer.drain_due(start + ms(400));
        assert_eq!(first, vec![FileChange::new("/ws/a.ts", ChangeKind::Changed)]);

        let second = debouncer.drain_due(start + ms(450));
        assert_eq!(second, vec![FileChange::new("/ws/b.ts", ChangeKind::Created)]);
        assert!(debouncer.is_empty());
    }

    #[test]
    fn test_debouncer_keeps_latest_kind_and_orders_by_path() {
        let start = Instant::now();
        let mut debouncer = PathDebouncer::new(Duration::from_millis(10));

        debouncer.record(FileChange::new("/ws/z.ts", ChangeKind::Changed), start);
        debouncer.record(FileChange::new("/ws/a.ts", ChangeKind::Created), start);
        debouncer.record(FileChange::new("/ws/a.ts", ChangeKind::Deleted), start);

        let due = debouncer.drain_due(start + Duration::from_secs(1));
        assert_eq!(
            due,
            vec![
                FileChange::new("/ws/a.ts", ChangeKind::Deleted),
                FileChange::new("/ws/z.ts", ChangeKind::Changed),
            ]
        );
    }
}
