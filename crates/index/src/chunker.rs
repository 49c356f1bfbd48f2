use seemantic_core::{Chunk, header_offsets};

/// Splits markdown into bounded chunks aligned to section headers.
///
/// The document is partitioned by ATX headers; the prefix before the first
/// header is one section. Sections longer than `max_chars` are split into
/// consecutive fixed windows that never cross a section boundary. Chunks
/// are contiguous and cover the whole document.
pub struct Chunker {
  max_chars: usize,
}

impl Chunker {
  pub fn new(max_chars: usize) -> Self {
    Self {
      max_chars: max_chars.max(1),
    }
  }

  pub fn chunk(&self, markdown: &str) -> Vec<Chunk> {
    if markdown.is_empty() {
      return vec![Chunk::new(0, 0)];
    }

    let mut boundaries = header_offsets(markdown);
    if boundaries.first() != Some(&0) {
      boundaries.insert(0, 0);
    }
    boundaries.push(markdown.len());

    let mut chunks = Vec::new();
    for window in boundaries.windows(2) {
      let (section_start, section_end) = (window[0], window[1]);
      let mut pos = section_start;
      while pos < section_end {
        let mut end = (pos + self.max_chars).min(section_end);
        // windows are sized in bytes; stretch to the next char boundary
        while !markdown.is_char_boundary(end) {
          end += 1;
        }
        chunks.push(Chunk::new(pos, end));
        pos = end;
      }
    }
    chunks
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn assert_covering(markdown: &str, chunks: &[Chunk]) {
    assert_eq!(chunks[0].start, 0);
    assert_eq!(chunks.last().unwrap().end, markdown.len());
    for pair in chunks.windows(2) {
      assert_eq!(pair[0].end, pair[1].start, "chunks must be contiguous");
    }
  }

  #[test]
  fn test_empty_document_yields_single_empty_chunk() {
    let chunks = Chunker::new(64).chunk("");
    assert_eq!(chunks, vec![Chunk::new(0, 0)]);
  }

  #[test]
  fn test_sections_become_chunks() {
    let md = "intro\n# One\nbody one\n## Two\nbody two";
    let chunks = Chunker::new(1000).chunk(md);
    assert_covering(md, &chunks);
    assert_eq!(chunks.len(), 3);
    assert_eq!(&md[chunks[0].start..chunks[0].end], "intro\n");
    assert!(md[chunks[1].start..].starts_with("# One"));
    assert!(md[chunks[2].start..].starts_with("## Two"));
  }

  #[test]
  fn test_document_starting_with_header_has_no_empty_prefix() {
    let md = "# Title\nbody";
    let chunks = Chunker::new(1000).chunk(md);
    assert_covering(md, &chunks);
    assert_eq!(chunks.len(), 1);
  }

  #[test]
  fn test_no_headers_single_section() {
    let md = "plain text without any header";
    let chunks = Chunker::new(1000).chunk(md);
    assert_covering(md, &chunks);
    assert_eq!(chunks.len(), 1);
  }

  #[test]
  fn test_long_section_splits_into_windows() {
    let md = format!("# H\n{}", "x".repeat(100));
    let chunks = Chunker::new(32).chunk(&md);
    assert_covering(&md, &chunks);
    assert!(chunks.len() > 1);
    for chunk in &chunks {
      assert!(chunk.len() <= 32);
    }
  }

  #[test]
  fn test_windows_never_cross_section_boundaries() {
    let md = format!("# A\n{}\n# B\n{}", "a".repeat(50), "b".repeat(50));
    let chunks = Chunker::new(32).chunk(&md);
    assert_covering(&md, &chunks);

    let second_header = md.find("# B").unwrap();
    for chunk in &chunks {
      let crosses = chunk.start < second_header && chunk.end > second_header;
      assert!(!crosses, "chunk {chunk:?} crosses the section boundary at {second_header}");
    }
    // one chunk starts exactly at the second header
    assert!(chunks.iter().any(|c| c.start == second_header));
  }

  #[test]
  fn test_every_chunk_starts_at_header_or_window_offset() {
    let md = "prefix\n# One\nshort\n# Two\nalso short";
    let chunks = Chunker::new(1000).chunk(md);
    let headers = header_offsets(md);
    for chunk in &chunks {
      assert!(chunk.start == 0 || headers.contains(&chunk.start));
    }
  }

  #[test]
  fn test_multibyte_content_stays_on_char_boundaries() {
    let md = format!("# H\n{}", "é".repeat(40));
    let chunks = Chunker::new(7).chunk(&md);
    assert_covering(&md, &chunks);
    for chunk in &chunks {
      // slicing must not panic
      let _ = &md[chunk.start..chunk.end];
    }
  }
}
