use seemantic_core::{Chunk, ChunkHit, header_offsets};
use std::collections::BTreeMap;

/// A section-aligned contiguous span of markdown handed to the generator.
///
/// `distance` is the best distance of the chunk hits inside the section; it
/// ranks passages for display and is not used to re-filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
  pub chunk: Chunk,
  pub distance: f32,
}

/// Expand chunk hits to section-level passages.
///
/// Each section containing at least one hit yields exactly one passage
/// spanning the whole section, scored with the minimum distance of its
/// hits. Adjacent sections with hits stay separate passages.
pub fn assemble_passages(markdown: &str, hits: &[ChunkHit]) -> Vec<Passage> {
  if markdown.is_empty() || hits.is_empty() {
    return Vec::new();
  }

  let mut starts = header_offsets(markdown);
  if starts.first() != Some(&0) {
    starts.insert(0, 0);
  }
  // sentinel section starting past the end simplifies the span lookup
  starts.push(markdown.len());

  let mut best_by_section: BTreeMap<usize, f32> = BTreeMap::new();
  for hit in hits {
    let section = starts
      .partition_point(|&offset| offset <= hit.chunk.start)
      .saturating_sub(1)
      .min(starts.len() - 2);
    best_by_section
      .entry(section)
      .and_modify(|d| *d = d.min(hit.distance))
      .or_insert(hit.distance);
  }

  best_by_section
    .into_iter()
    .map(|(section, distance)| Passage {
      chunk: Chunk::new(starts[section], starts[section + 1]),
      distance,
    })
    .collect()
}
