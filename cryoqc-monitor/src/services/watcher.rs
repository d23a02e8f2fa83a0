//! Watched-directory notifications
//!
//! Wraps a non-recursive `notify` watcher. File creations and rename targets are
//! forwarded as paths on an unbounded channel; everything else is dropped. The
//! watcher stops when the [`DirectoryWatcher`] is dropped.

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    dir: PathBuf,
}

impl DirectoryWatcher {
    /// Start watching `dir`; new file paths arrive on the returned receiver
    pub fn start(
        dir: &Path,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PathBuf>), notify::Error> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for path in arrived_paths(event) {
                        debug!(path = %path.display(), "File arrived");
                        if tx.send(path).is_err() {
                            // Receiver gone, monitor is shutting down
                            return;
                        }
                    }
                }
                Err(e) => error!("Watch error: {:?}", e),
            },
            Config::default(),
        )?;

        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!(dir = %dir.display(), "Watching directory");

        Ok((
            Self {
                _watcher: watcher,
                dir: dir.to_path_buf(),
            },
            rx,
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Paths that may be new files: creations and rename targets
fn arrived_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) => event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths,
        // Both carries [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.into_iter().skip(1).collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::time::Duration;
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut e = Event::new(kind);
        for p in paths {
            e = e.add_path(PathBuf::from(p));
        }
        e
    }

    #[test]
    fn test_only_arrivals_forwarded() {
        assert_eq!(
            arrived_paths(event(EventKind::Create(CreateKind::File), &["/in/a.mrc"])),
            vec![PathBuf::from("/in/a.mrc")]
        );
        assert_eq!(
            arrived_paths(event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/in/a.tmp", "/in/a.mrc"]
            )),
            vec![PathBuf::from("/in/a.mrc")]
        );
        assert!(arrived_paths(event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/in/a.mrc"]
        ))
        .is_empty());
        assert!(arrived_paths(event(EventKind::Remove(RemoveKind::File), &["/in/a.mrc"])).is_empty());
    }

    #[tokio::test]
    async fn test_new_file_reported() {
        let temp = TempDir::new().unwrap();
        let (_watcher, mut rx) = DirectoryWatcher::start(temp.path()).unwrap();

        let path = temp.path().join("movie.mrcs");
        std::fs::write(&path, b"frames").unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no watch event within 5s")
            .unwrap();
        assert_eq!(received.file_name(), path.file_name());
    }
}
