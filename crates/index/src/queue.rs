use source::DocumentReference;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Error, Debug)]
#[error("work queue closed")]
pub struct QueueClosed;

/// One unit of indexing work.
#[derive(Debug, Clone)]
pub struct WorkItem {
  pub doc_ref: DocumentReference,
  pub indexed_document_id: Uuid,
}

/// Bounded FIFO work queue with per-uri duplicate suppression.
///
/// While a uri is enqueued, further enqueues for it are no-ops; membership
/// is released at dequeue start so a concurrent upsert re-enqueues cleanly
/// while the previous unit is still being processed.
pub fn work_queue(capacity: usize) -> (WorkQueue, WorkReceiver) {
  let (tx, rx) = mpsc::channel(capacity);
  let in_queue = Arc::new(Mutex::new(HashSet::new()));
  (
    WorkQueue {
      tx,
      in_queue: in_queue.clone(),
    },
    WorkReceiver { rx, in_queue },
  )
}

#[derive(Clone)]
pub struct WorkQueue {
  tx: mpsc::Sender<WorkItem>,
  in_queue: Arc<Mutex<HashSet<String>>>,
}

impl WorkQueue {
  /// Enqueue a unit, blocking while the queue is full (backpressure on the
  /// producer). Returns `false` when the uri is already enqueued.
  pub async fn enqueue(&self, item: WorkItem) -> Result<bool, QueueClosed> {
    {
      let mut in_queue = self.in_queue.lock().expect("in-queue lock");
      if !in_queue.insert(item.doc_ref.uri.clone()) {
        return Ok(false);
      }
    }
    let uri = item.doc_ref.uri.clone();
    if self.tx.send(item).await.is_err() {
      self.in_queue.lock().expect("in-queue lock").remove(&uri);
      return Err(QueueClosed);
    }
    Ok(true)
  }

  pub fn is_enqueued(&self, uri: &str) -> bool {
    self.in_queue.lock().expect("in-queue lock").contains(uri)
  }
}

pub struct WorkReceiver {
  rx: mpsc::Receiver<WorkItem>,
  in_queue: Arc<Mutex<HashSet<String>>>,
}

impl WorkReceiver {
  /// Wait for the next unit. The uri leaves the in-queue set here, at
  /// dequeue start.
  pub async fn dequeue(&mut self) -> Option<WorkItem> {
    let item = self.rx.recv().await?;
    self.in_queue.lock().expect("in-queue lock").remove(&item.doc_ref.uri);
    Some(item)
  }

  /// Non-blocking variant used to drain deterministically in tests and
  /// shutdown paths.
  pub fn try_dequeue(&mut self) -> Option<WorkItem> {
    let item = self.rx.try_recv().ok()?;
    self.in_queue.lock().expect("in-queue lock").remove(&item.doc_ref.uri);
    Some(item)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(uri: &str) -> WorkItem {
    WorkItem {
      doc_ref: DocumentReference {
        uri: uri.to_string(),
        source_version: "v1".to_string(),
      },
      indexed_document_id: Uuid::now_v7(),
    }
  }

  #[tokio::test]
  async fn test_duplicate_uri_is_suppressed() {
    let (queue, mut rx) = work_queue(16);
    assert!(queue.enqueue(item("a.md")).await.unwrap());
    assert!(!queue.enqueue(item("a.md")).await.unwrap());
    assert!(queue.is_enqueued("a.md"));

    let first = rx.dequeue().await.unwrap();
    assert_eq!(first.doc_ref.uri, "a.md");
    // released at dequeue start: the same uri can be enqueued again
    assert!(!queue.is_enqueued("a.md"));
    assert!(queue.enqueue(item("a.md")).await.unwrap());
  }

  #[tokio::test]
  async fn test_fifo_order() {
    let (queue, mut rx) = work_queue(16);
    queue.enqueue(item("a.md")).await.unwrap();
    queue.enqueue(item("b.md")).await.unwrap();

    assert_eq!(rx.dequeue().await.unwrap().doc_ref.uri, "a.md");
    assert_eq!(rx.dequeue().await.unwrap().doc_ref.uri, "b.md");
  }

  #[tokio::test]
  async fn test_enqueue_blocks_when_full() {
    let (queue, mut rx) = work_queue(1);
    queue.enqueue(item("a.md")).await.unwrap();

    let blocked = {
      let queue = queue.clone();
      tokio::spawn(async move { queue.enqueue(item("b.md")).await })
    };
    // give the spawned enqueue a chance to block on the full queue
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(!blocked.is_finished());

    rx.dequeue().await.unwrap();
    assert!(blocked.await.unwrap().unwrap());
  }

  #[tokio::test]
  async fn test_try_dequeue_empty() {
    let (_queue, mut rx) = work_queue(4);
    assert!(rx.try_dequeue().is_none());
  }
}
