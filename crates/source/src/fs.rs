use futures::StreamExt;
use futures::stream::BoxStream;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::sync::mpsc;
use tracing::debug;

use crate::store::{ObjectContent, ObjectEvent, ObjectMeta, ObjectStore, Result, SourceError};

/// Object store backed by a local directory tree.
///
/// Keys are `/`-separated paths relative to the root. The version token is
/// derived from `(len, mtime)`; equal tokens mean the file was not rewritten
/// since the last observation.
pub struct FsObjectStore {
  root: PathBuf,
}

impl FsObjectStore {
  pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
    let root = root.into();
    std::fs::create_dir_all(&root)?;
    // canonicalize so watcher paths strip back to keys reliably
    let root = root.canonicalize()?;
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn path_for(&self, key: &str) -> PathBuf {
    let mut path = self.root.clone();
    for part in key.split('/').filter(|p| !p.is_empty() && *p != "..") {
      path.push(part);
    }
    path
  }

  fn key_for(&self, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(&self.root).ok()?;
    let parts: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect();
    if parts.is_empty() { None } else { Some(parts.join("/")) }
  }

  fn version_of(meta: &std::fs::Metadata) -> String {
    let mtime = meta
      .modified()
      .ok()
      .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
      .map(|d| d.as_nanos())
      .unwrap_or(0);
    format!("{}-{}", meta.len(), mtime)
  }

  fn stat_meta(&self, key: &str) -> Option<ObjectMeta> {
    let meta = std::fs::metadata(self.path_for(key)).ok()?;
    if !meta.is_file() {
      return None;
    }
    Some(ObjectMeta {
      key: key.to_string(),
      version: Self::version_of(&meta),
    })
  }
}

#[async_trait::async_trait]
impl ObjectStore for FsObjectStore {
  async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
    let mut objects = Vec::new();
    for entry in ignore::WalkBuilder::new(&self.root).standard_filters(false).build() {
      let entry = match entry {
        Ok(e) => e,
        Err(e) => {
          debug!("skipping unreadable entry: {e}");
          continue;
        }
      };
      if !entry.file_type().is_some_and(|t| t.is_file()) {
        continue;
      }
      let Some(key) = self.key_for(entry.path()) else { continue };
      if !key.starts_with(prefix) {
        continue;
      }
      if let Some(meta) = self.stat_meta(&key) {
        objects.push(meta);
      }
    }
    objects.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(objects)
  }

  async fn get(&self, key: &str) -> Result<Option<ObjectContent>> {
    let path = self.path_for(key);
    let meta = match std::fs::metadata(&path) {
      Ok(m) if m.is_file() => m,
      Ok(_) => return Ok(None),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };
    let bytes = match std::fs::read(&path) {
      Ok(b) => b,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };
    Ok(Some(ObjectContent {
      bytes,
      version: Self::version_of(&meta),
    }))
  }

  async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
    let path = self.path_for(key);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    match std::fs::remove_file(self.path_for(key)) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  async fn watch(&self, prefix: &str) -> Result<BoxStream<'static, Result<ObjectEvent>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
      let _ = tx.send(res);
    })?;
    watcher.watch(&self.root, RecursiveMode::Recursive)?;

    let state = WatchState {
      _watcher: watcher,
      rx,
      root: self.root.clone(),
      prefix: prefix.to_string(),
      pending: VecDeque::new(),
    };
    let stream = futures::stream::unfold(state, |mut state| async move {
      loop {
        if let Some(event) = state.pending.pop_front() {
          return Some((Ok(event), state));
        }
        match state.rx.recv().await {
          None => return None,
          Some(Err(e)) => return Some((Err(SourceError::Watch(e)), state)),
          Some(Ok(event)) => state.enqueue(event),
        }
      }
    });
    Ok(stream.boxed())
  }
}

struct WatchState {
  // keeps the notify watcher alive for the lifetime of the stream
  _watcher: RecommendedWatcher,
  rx: mpsc::UnboundedReceiver<std::result::Result<Event, notify::Error>>,
  root: PathBuf,
  prefix: String,
  pending: VecDeque<ObjectEvent>,
}

impl WatchState {
  fn enqueue(&mut self, event: Event) {
    let deleted = match event.kind {
      EventKind::Create(_) | EventKind::Modify(_) => false,
      EventKind::Remove(_) => true,
      _ => return,
    };
    for path in &event.paths {
      let Some(key) = key_under(&self.root, path) else { continue };
      if !key.starts_with(&self.prefix) {
        continue;
      }
      if deleted {
        self.pending.push_back(ObjectEvent::Deleted { key });
      } else {
        // stat may fail when the file vanished again; the matching remove
        // event follows shortly, so the upsert is simply skipped
        match std::fs::metadata(path) {
          Ok(meta) if meta.is_file() => self.pending.push_back(ObjectEvent::Created(ObjectMeta {
            key,
            version: FsObjectStore::version_of(&meta),
          })),
          _ => {}
        }
      }
    }
  }
}

fn key_under(root: &Path, path: &Path) -> Option<String> {
  let rel = path.strip_prefix(root).ok()?;
  let parts: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect();
  if parts.is_empty() { None } else { Some(parts.join("/")) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[tokio::test]
  async fn test_put_get_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = FsObjectStore::new(dir.path()).unwrap();

    store.put("drive/notes/a.md", b"# hello").await.unwrap();
    let content = store.get("drive/notes/a.md").await.unwrap().unwrap();
    assert_eq!(content.bytes, b"# hello");
    assert!(!content.version.is_empty());
  }

  #[tokio::test]
  async fn test_get_missing_is_none() {
    let dir = TempDir::new().unwrap();
    let store = FsObjectStore::new(dir.path()).unwrap();
    assert!(store.get("drive/missing.md").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_list_respects_prefix() {
    let dir = TempDir::new().unwrap();
    let store = FsObjectStore::new(dir.path()).unwrap();
    store.put("drive/a.md", b"a").await.unwrap();
    store.put("drive/sub/b.md", b"bb").await.unwrap();
    store.put("private/c.md", b"c").await.unwrap();

    let listed = store.list("drive/").await.unwrap();
    let keys: Vec<_> = listed.iter().map(|m| m.key.as_str()).collect();
    assert_eq!(keys, vec!["drive/a.md", "drive/sub/b.md"]);
  }

  #[tokio::test]
  async fn test_version_changes_with_content_length() {
    let dir = TempDir::new().unwrap();
    let store = FsObjectStore::new(dir.path()).unwrap();
    store.put("drive/a.md", b"one").await.unwrap();
    let v1 = store.get("drive/a.md").await.unwrap().unwrap().version;
    store.put("drive/a.md", b"longer content").await.unwrap();
    let v2 = store.get("drive/a.md").await.unwrap().unwrap().version;
    assert_ne!(v1, v2);
  }

  #[tokio::test]
  async fn test_delete_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = FsObjectStore::new(dir.path()).unwrap();
    store.put("drive/a.md", b"a").await.unwrap();
    store.delete("drive/a.md").await.unwrap();
    store.delete("drive/a.md").await.unwrap();
    assert!(store.get("drive/a.md").await.unwrap().is_none());
  }
}
