//! Markdown structure shared by the chunker and the passage assembler.

/// Byte offsets of ATX headers (`#` through `######` at line start,
/// followed by whitespace and some content), ascending.
///
/// Both chunking and passage assembly derive section boundaries from this,
/// so a chunk that starts at a header always maps back to the same section.
pub fn header_offsets(markdown: &str) -> Vec<usize> {
  let mut offsets = Vec::new();
  let mut line_start = 0;
  for line in markdown.split_inclusive('\n') {
    if is_atx_header(line) {
      offsets.push(line_start);
    }
    line_start += line.len();
  }
  offsets
}

fn is_atx_header(line: &str) -> bool {
  let hashes = line.bytes().take_while(|b| *b == b'#').count();
  if !(1..=6).contains(&hashes) {
    return false;
  }
  if !matches!(line.as_bytes().get(hashes), Some(b' ' | b'\t')) {
    return false;
  }
  !line[hashes + 1..].trim().is_empty()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_header_offsets() {
    let md = "intro\n# One\nbody\n## Two\nmore";
    assert_eq!(header_offsets(md), vec![6, 17]);
  }

  #[test]
  fn test_header_at_start() {
    assert_eq!(header_offsets("# Title\nbody"), vec![0]);
  }

  #[test]
  fn test_no_headers() {
    assert!(header_offsets("just text\nno headers here").is_empty());
  }

  #[test]
  fn test_seven_hashes_is_not_a_header() {
    assert!(header_offsets("####### too deep").is_empty());
  }

  #[test]
  fn test_hash_without_space_is_not_a_header() {
    assert!(header_offsets("#hashtag").is_empty());
  }

  #[test]
  fn test_hash_without_content_is_not_a_header() {
    assert!(header_offsets("# \ntext").is_empty());
  }

  #[test]
  fn test_header_mid_line_is_ignored() {
    assert!(header_offsets("text with # hash inside").is_empty());
  }
}
