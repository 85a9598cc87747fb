use crate::error::SidecarError;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Emitted when an agent's session state file changes, so the supervisor can
/// poll that worktree immediately instead of waiting for the next tick.
#[derive(Debug)]
pub struct SessionFileChanged {
    pub worktree_name: String,
}

/// Watches the per-agent session files registered for running agents. The
/// session file is the authoritative "idle at prompt" signal; reacting to
/// its writes keeps the Waiting upgrade prompt-fast.
pub struct SessionFileWatcher {
    watcher: RecommendedWatcher,
    /// Watched session file → owning worktree. Shared with the notify
    /// callback, which runs on notify's own thread.
    watched: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl SessionFileWatcher {
    pub fn start(tx: mpsc::UnboundedSender<SessionFileChanged>) -> Result<Self, SidecarError> {
        let watched: Arc<Mutex<HashMap<PathBuf, String>>> = Arc::new(Mutex::new(HashMap::new()));
        let watched_cb = watched.clone();

        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let Ok(event) = res else { return };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                let map = watched_cb.lock().unwrap_or_else(|p| p.into_inner());
                for path in &event.paths {
                    if let Some(worktree_name) = map.get(path) {
                        let _ = tx.send(SessionFileChanged {
                            worktree_name: worktree_name.clone(),
                        });
                    }
                }
            },
            Config::default(),
        )?;

        Ok(Self { watcher, watched })
    }

    /// Register a session file for a worktree's running agent. The parent
    /// directory is watched because the file may not exist yet.
    pub fn watch(&mut self, worktree_name: &str, path: PathBuf) {
        {
            let map = self.watched.lock().unwrap_or_else(|p| p.into_inner());
            if map.contains_key(&path) {
                return;
            }
        }
        if let Some(dir) = path.parent() {
            if let Err(e) = self.watcher.watch(dir, RecursiveMode::NonRecursive) {
                debug!(error = %e, dir = %dir.display(), "session-file watch failed");
                return;
            }
        }
        info!(worktree = worktree_name, path = %path.display(), "watching session file");
        self.watched
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(path, worktree_name.to_string());
    }

    pub fn unwatch(&mut self, worktree_name: &str) {
        let mut map = self.watched.lock().unwrap_or_else(|p| p.into_inner());
        let stale: Vec<PathBuf> = map
            .iter()
            .filter(|(_, name)| name.as_str() == worktree_name)
            .map(|(path, _)| path.clone())
            .collect();
        for path in stale {
            if let Some(dir) = path.parent() {
                let _ = self.watcher.unwatch(dir);
            }
            map.remove(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn change_to_watched_file_emits_event() {
        let dir = tempdir().unwrap();
        let session_file = dir.path().join(".sidecar-session.json");

        let (tx, mut rx) = unbounded_channel();
        let mut watcher = SessionFileWatcher::start(tx).unwrap();
        watcher.watch("feat-x", session_file.clone());

        std::fs::write(&session_file, r#"{"state":"idle"}"#).unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher should fire")
            .expect("channel open");
        assert_eq!(event.worktree_name, "feat-x");
    }

    #[tokio::test]
    async fn unwatched_files_are_ignored() {
        let dir = tempdir().unwrap();
        let (tx, mut rx) = unbounded_channel();
        let mut watcher = SessionFileWatcher::start(tx).unwrap();
        watcher.watch("feat-x", dir.path().join(".sidecar-session.json"));
        watcher.unwatch("feat-x");

        std::fs::write(dir.path().join(".sidecar-session.json"), "{}").unwrap();

        let res =
            tokio::time::timeout(std::time::Duration::from_millis(300), rx.recv()).await;
        assert!(res.is_err(), "no event expected after unwatch");
    }
}
