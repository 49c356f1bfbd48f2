//! Change-notification fan-out.
//!
//! Database triggers publish every `indexed_document` mutation as JSON on
//! the `table_changes` channel. One process-wide listener feeds all
//! subscribers; it is opened when the first subscriber arrives and closed
//! when the last one leaves. Events are never dropped: a full subscriber
//! queue blocks the publisher instead.

use chrono::{DateTime, Utc};
use seemantic_core::IndexingStatus;
use serde::Deserialize;
use sqlx::postgres::{PgListener, PgPool};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::model::DocumentView;

pub const CHANGE_CHANNEL: &str = "table_changes";

const SUBSCRIBER_QUEUE: usize = 256;
const PUBLISH_STALL_WARNING: Duration = Duration::from_secs(1);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum BusError {
  #[error("Malformed payload: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("Unknown operation {0:?}")]
  UnknownOperation(String),
  #[error("Unknown status {0:?}")]
  UnknownStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEventKind {
  Insert,
  Update,
  Delete,
}

/// A catalog mutation, as observed through the notification channel.
///
/// The payload carries the `indexed_document` row only, so
/// `document.indexed_content` is never populated here; consumers needing
/// content hashes re-query the catalog.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
  pub kind: ChangeEventKind,
  pub document: DocumentView,
}

#[derive(Debug, Deserialize)]
struct NotificationPayload {
  operation: String,
  data: NotificationRow,
}

#[derive(Debug, Deserialize)]
struct NotificationRow {
  id: Uuid,
  uri: String,
  indexer_version: i32,
  status: String,
  last_status_change: DateTime<Utc>,
  #[serde(default)]
  last_indexing: Option<DateTime<Utc>>,
  #[serde(default)]
  error_message: Option<String>,
  #[serde(default)]
  indexed_source_version: Option<String>,
}

pub(crate) fn parse_notification(payload: &str) -> Result<ChangeEvent, BusError> {
  let parsed: NotificationPayload = serde_json::from_str(payload)?;
  let kind = match parsed.operation.as_str() {
    "insert" => ChangeEventKind::Insert,
    "update" => ChangeEventKind::Update,
    "delete" => ChangeEventKind::Delete,
    other => return Err(BusError::UnknownOperation(other.to_string())),
  };
  let row = parsed.data;
  let status = IndexingStatus::parse(&row.status).ok_or(BusError::UnknownStatus(row.status.clone()))?;
  Ok(ChangeEvent {
    kind,
    document: DocumentView {
      uri: row.uri,
      indexed_document_id: row.id,
      indexer_version: row.indexer_version,
      status,
      last_status_change: row.last_status_change,
      error_message: row.error_message,
      indexed_source_version: row.indexed_source_version,
      last_indexing: row.last_indexing,
      indexed_content: None,
    },
  })
}

struct Inner {
  next_id: u64,
  subscribers: HashMap<u64, mpsc::Sender<ChangeEvent>>,
  listener: Option<CancellationToken>,
}

/// Fan-out of catalog change events to in-process subscribers.
#[derive(Clone)]
pub struct ChangeBus {
  pool: PgPool,
  inner: Arc<Mutex<Inner>>,
}

impl ChangeBus {
  pub fn new(pool: PgPool) -> Self {
    Self {
      pool,
      inner: Arc::new(Mutex::new(Inner {
        next_id: 0,
        subscribers: HashMap::new(),
        listener: None,
      })),
    }
  }

  /// Register a subscriber with its own bounded queue. The DB listener is
  /// opened lazily on the first subscription.
  pub fn subscribe(&self) -> Subscription {
    let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
    let mut inner = self.inner.lock().expect("change bus lock");
    let id = inner.next_id;
    inner.next_id += 1;
    inner.subscribers.insert(id, tx);

    if inner.listener.is_none() {
      let cancel = CancellationToken::new();
      inner.listener = Some(cancel.clone());
      tokio::spawn(listen_task(self.pool.clone(), self.inner.clone(), cancel));
    }

    Subscription {
      id,
      rx,
      inner: self.inner.clone(),
    }
  }

  pub fn subscriber_count(&self) -> usize {
    self.inner.lock().expect("change bus lock").subscribers.len()
  }
}

/// A subscriber handle; dropping it unsubscribes, and the last drop closes
/// the DB listener.
pub struct Subscription {
  id: u64,
  rx: mpsc::Receiver<ChangeEvent>,
  inner: Arc<Mutex<Inner>>,
}

impl Subscription {
  pub async fn recv(&mut self) -> Option<ChangeEvent> {
    self.rx.recv().await
  }

  /// Adapt the subscription into a stream; dropping the stream
  /// unsubscribes.
  pub fn into_stream(self) -> impl futures::Stream<Item = ChangeEvent> + Unpin {
    Box::pin(futures::stream::unfold(self, |mut sub| async move {
      sub.recv().await.map(|event| (event, sub))
    }))
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    let mut inner = self.inner.lock().expect("change bus lock");
    inner.subscribers.remove(&self.id);
    if inner.subscribers.is_empty()
      && let Some(cancel) = inner.listener.take()
    {
      cancel.cancel();
    }
  }
}

async fn listen_task(pool: PgPool, inner: Arc<Mutex<Inner>>, cancel: CancellationToken) {
  loop {
    let mut listener = tokio::select! {
      _ = cancel.cancelled() => return,
      connected = PgListener::connect_with(&pool) => match connected {
        Ok(listener) => listener,
        Err(e) => {
          warn!("change listener connection failed: {e}, retrying in {RECONNECT_DELAY:?}");
          tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
          }
        }
      }
    };
    if let Err(e) = listener.listen(CHANGE_CHANNEL).await {
      warn!("LISTEN {CHANGE_CHANNEL} failed: {e}");
      continue;
    }
    info!("catalog change listener opened");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("catalog change listener closed");
          return;
        }
        notification = listener.recv() => match notification {
          Ok(notification) => match parse_notification(notification.payload()) {
            // a malformed payload terminates only this event
            Err(e) => warn!("ignoring malformed change notification: {e}"),
            Ok(event) => {
              let subscribers: Vec<_> = {
                let inner = inner.lock().expect("change bus lock");
                inner.subscribers.iter().map(|(id, tx)| (*id, tx.clone())).collect()
              };
              fan_out(subscribers, event).await;
            }
          },
          Err(e) => {
            warn!("change listener lost: {e}, reconnecting");
            break;
          }
        }
      }
    }
  }
}

/// Deliver one event to every subscriber. Dropping is forbidden: a full
/// queue logs a warning and blocks publishing until the subscriber drains.
pub(crate) async fn fan_out(subscribers: Vec<(u64, mpsc::Sender<ChangeEvent>)>, event: ChangeEvent) {
  for (id, tx) in subscribers {
    match tx.try_send(event.clone()) {
      Ok(()) => {}
      Err(mpsc::error::TrySendError::Closed(_)) => {}
      Err(mpsc::error::TrySendError::Full(_)) => {
        warn!(subscriber = id, "change bus queue full, blocking publisher");
        if tokio::time::timeout(PUBLISH_STALL_WARNING, tx.send(event.clone())).await.is_err() {
          error!(subscriber = id, "change bus subscriber stalled, still waiting");
          let _ = tx.send(event.clone()).await;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn payload(operation: &str, status: &str) -> String {
    format!(
      r#"{{"operation": "{operation}", "data": {{
        "id": "0191f6a0-1234-7000-8000-000000000001",
        "document_id": "0191f6a0-1234-7000-8000-000000000002",
        "uri": "test/path/to/file.md",
        "indexer_version": 1,
        "indexed_source_version": null,
        "indexed_content_id": null,
        "status": "{status}",
        "last_status_change": "2025-01-01T12:00:00.123456+00:00",
        "last_indexing": null,
        "error_message": null,
        "creation_time": "2025-01-01T12:00:00+00:00"
      }}}}"#
    )
  }

  #[test]
  fn test_parse_update_notification() {
    let event = parse_notification(&payload("update", "indexing_success")).unwrap();
    assert_eq!(event.kind, ChangeEventKind::Update);
    assert_eq!(event.document.uri, "test/path/to/file.md");
    assert_eq!(event.document.status, IndexingStatus::IndexingSuccess);
    assert!(event.document.indexed_content.is_none());
  }

  #[test]
  fn test_parse_insert_and_delete() {
    assert_eq!(
      parse_notification(&payload("insert", "pending")).unwrap().kind,
      ChangeEventKind::Insert
    );
    assert_eq!(
      parse_notification(&payload("delete", "pending")).unwrap().kind,
      ChangeEventKind::Delete
    );
  }

  #[test]
  fn test_parse_rejects_garbage() {
    assert!(parse_notification("not json at all").is_err());
    assert!(matches!(
      parse_notification(&payload("truncate", "pending")),
      Err(BusError::UnknownOperation(_))
    ));
    assert!(matches!(
      parse_notification(&payload("update", "done")),
      Err(BusError::UnknownStatus(_))
    ));
  }

  fn event() -> ChangeEvent {
    parse_notification(&payload("update", "pending")).unwrap()
  }

  #[tokio::test]
  async fn test_fan_out_blocks_instead_of_dropping() {
    let (tx, mut rx) = mpsc::channel(1);
    // fill the queue so the next publish must block
    tx.try_send(event()).unwrap();

    let publisher = tokio::spawn(fan_out(vec![(0, tx)], event()));

    // drain after a delay; the blocked publish must complete, not drop
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.recv().await.is_some());
    publisher.await.unwrap();
    assert!(rx.recv().await.is_some());
  }

  #[tokio::test]
  async fn test_fan_out_skips_closed_subscribers() {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    // must not hang or panic
    fan_out(vec![(0, tx)], event()).await;
  }

  #[tokio::test]
  async fn test_subscription_lifecycle() {
    // lazy pool: no connection is made until the listener task runs, so
    // subscribe/unsubscribe bookkeeping is testable without a database
    let pool = sqlx::postgres::PgPoolOptions::new().connect_lazy("postgresql://invalid-host:1/none");
    let bus = ChangeBus::new(pool.unwrap());

    let first = bus.subscribe();
    let second = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 2);

    drop(first);
    assert_eq!(bus.subscriber_count(), 1);
    drop(second);
    assert_eq!(bus.subscriber_count(), 0);
  }
}
