use catalog::DocumentView;
use source::DocumentReference;
use std::collections::HashSet;

/// How a source reference relates to the catalog's view of the same uri.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
  /// Unknown uri: create an IndexedDocument and enqueue.
  New,
  /// Known but never successfully indexed, or the source version moved:
  /// reset to pending and enqueue.
  Changed,
  /// Exact source-version match with a prior success: skip.
  Unchanged,
}

pub fn classify(existing: Option<&DocumentView>, reference: &DocumentReference) -> Classification {
  let Some(db) = existing else {
    return Classification::New;
  };
  if db.last_indexing.is_none() {
    return Classification::Changed;
  }
  match &db.indexed_source_version {
    Some(version) if *version == reference.source_version => Classification::Unchanged,
    _ => Classification::Changed,
  }
}

/// Uris present in the catalog but absent from the source snapshot.
pub fn deleted_uris(db: &[DocumentView], refs: &[DocumentReference]) -> Vec<String> {
  let live: HashSet<&str> = refs.iter().map(|r| r.uri.as_str()).collect();
  db.iter()
    .filter(|view| !live.contains(view.uri.as_str()))
    .map(|view| view.uri.clone())
    .collect()
}
