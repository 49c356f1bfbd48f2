use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use seemantic_core::content_hash;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::store::{ObjectContent, ObjectEvent, ObjectMeta, ObjectStore, Result};

/// In-process object store.
///
/// Version tokens are derived from content, so re-putting identical bytes
/// yields an equal token. Watch subscribers each get an unbounded channel;
/// closed subscribers are pruned on the next publish.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
  inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
  objects: BTreeMap<String, Vec<u8>>,
  watchers: Vec<mpsc::UnboundedSender<ObjectEvent>>,
}

impl MemoryObjectStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn publish(inner: &mut Inner, event: ObjectEvent) {
    inner.watchers.retain(|tx| tx.send(event.clone()).is_ok());
  }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
  async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
    let inner = self.inner.lock().expect("memory store lock");
    Ok(
      inner
        .objects
        .range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, bytes)| ObjectMeta {
          key: key.clone(),
          version: content_hash(bytes),
        })
        .collect(),
    )
  }

  async fn get(&self, key: &str) -> Result<Option<ObjectContent>> {
    let inner = self.inner.lock().expect("memory store lock");
    Ok(inner.objects.get(key).map(|bytes| ObjectContent {
      bytes: bytes.clone(),
      version: content_hash(bytes),
    }))
  }

  async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
    let mut inner = self.inner.lock().expect("memory store lock");
    inner.objects.insert(key.to_string(), bytes.to_vec());
    let meta = ObjectMeta {
      key: key.to_string(),
      version: content_hash(bytes),
    };
    Self::publish(&mut inner, ObjectEvent::Created(meta));
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    let mut inner = self.inner.lock().expect("memory store lock");
    if inner.objects.remove(key).is_some() {
      Self::publish(&mut inner, ObjectEvent::Deleted { key: key.to_string() });
    }
    Ok(())
  }

  async fn watch(&self, prefix: &str) -> Result<BoxStream<'static, Result<ObjectEvent>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.inner.lock().expect("memory store lock").watchers.push(tx);
    let prefix = prefix.to_string();
    let stream = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|ev| (ev, rx)) })
      .filter(move |event| {
        let key = match event {
          ObjectEvent::Created(meta) => &meta.key,
          ObjectEvent::Deleted { key } => key,
        };
        futures::future::ready(key.starts_with(&prefix))
      })
      .map(Ok);
    Ok(stream.boxed())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_list_filters_by_prefix() {
    let store = MemoryObjectStore::new();
    store.put("drive/a.md", b"a").await.unwrap();
    store.put("drive/sub/b.md", b"b").await.unwrap();
    store.put("other/c.md", b"c").await.unwrap();

    let listed = store.list("drive/").await.unwrap();
    let keys: Vec<_> = listed.iter().map(|m| m.key.as_str()).collect();
    assert_eq!(keys, vec!["drive/a.md", "drive/sub/b.md"]);
  }

  #[tokio::test]
  async fn test_version_tracks_content() {
    let store = MemoryObjectStore::new();
    store.put("k", b"one").await.unwrap();
    let v1 = store.get("k").await.unwrap().unwrap().version;

    store.put("k", b"one").await.unwrap();
    assert_eq!(store.get("k").await.unwrap().unwrap().version, v1);

    store.put("k", b"two").await.unwrap();
    assert_ne!(store.get("k").await.unwrap().unwrap().version, v1);
  }

  #[tokio::test]
  async fn test_get_missing_is_none() {
    let store = MemoryObjectStore::new();
    assert!(store.get("nope").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_watch_sees_put_and_delete() {
    let store = MemoryObjectStore::new();
    let mut events = store.watch("drive/").await.unwrap();

    store.put("drive/x.md", b"x").await.unwrap();
    store.put("elsewhere/y.md", b"y").await.unwrap();
    store.delete("drive/x.md").await.unwrap();

    match events.next().await.unwrap().unwrap() {
      ObjectEvent::Created(meta) => assert_eq!(meta.key, "drive/x.md"),
      other => panic!("expected create, got {other:?}"),
    }
    // the out-of-prefix put is filtered out
    match events.next().await.unwrap().unwrap() {
      ObjectEvent::Deleted { key } => assert_eq!(key, "drive/x.md"),
      other => panic!("expected delete, got {other:?}"),
    }
  }
}
