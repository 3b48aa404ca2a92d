//! Chunking strategy computation and chunk materialization.
//!
//! [`compute_spec`] turns a document's structural facts into a [`ChunkSpec`]:
//! which strategy to use, how big the chunks are, how much they overlap, and
//! the anchors/bridges that label them. [`materialize`] then walks the body
//! in word strides and emits the actual [`Chunk`] windows. Materialization
//! behaves identically whether the spec came from the chunking agent or from
//! the structural fallback.

use tracing::debug;

use docforge_shared::{Chunk, ChunkSpec, ChunkStrategy, Document};

/// Chunk size bounds in words.
pub const MIN_CHUNK_SIZE: usize = 200;
pub const MAX_CHUNK_SIZE: usize = 800;

/// Overlap bounds in words.
pub const MIN_OVERLAP: usize = 20;
pub const MAX_OVERLAP: usize = 150;

/// Target words per chunk for technical prose; drives the desired chunk
/// count so sizes land in the 300–600 band for typical documents.
const TARGET_CHUNK_WORDS: usize = 450;

/// Keywords carried per chunk for vector-store hints.
const MAX_VECTOR_KEYWORDS: usize = 5;

// ---------------------------------------------------------------------------
// Spec computation
// ---------------------------------------------------------------------------

/// Compute segmentation parameters from a document's structure.
pub fn compute_spec(document: &Document) -> ChunkSpec {
    let strategy = select_strategy(document);
    let (size, overlap) = size_and_overlap(document.word_count, strategy);

    let anchors: Vec<String> = document
        .headings
        .iter()
        .map(|h| slugify_heading(&h.text))
        .collect();

    let major: Vec<String> = document
        .headings
        .iter()
        .filter(|h| h.level <= 2)
        .map(|h| slugify_heading(&h.text))
        .collect();
    let bridges: Vec<String> = major
        .windows(2)
        .map(|pair| format!("{}-to-{}", pair[0], pair[1]))
        .collect();

    let mut boundaries = Vec::new();
    if !document.headings.is_empty() {
        boundaries.push("heading".to_string());
    }
    if document.code_block_count > 0 {
        boundaries.push("code_block".to_string());
    }
    if document.list_item_count > 0 {
        boundaries.push("list".to_string());
    }
    boundaries.push("paragraph".to_string());

    let total_chunks = total_chunks(document.word_count, size, overlap);

    debug!(
        doc = %document.id,
        strategy = %strategy,
        size,
        overlap,
        total_chunks,
        "computed chunk spec"
    );

    ChunkSpec {
        strategy,
        size,
        overlap,
        boundaries,
        anchors,
        bridges,
        total_chunks,
    }
}

/// Structural fallback: a spec derived from heading and word counts alone,
/// with no strategy analysis. Used when AI output is unusable.
pub fn structural_spec(document: &Document) -> ChunkSpec {
    let (size, overlap) = size_and_overlap(document.word_count, ChunkStrategy::Structural);

    ChunkSpec {
        strategy: ChunkStrategy::Structural,
        size,
        overlap,
        boundaries: vec!["heading".to_string(), "paragraph".to_string()],
        anchors: document
            .headings
            .iter()
            .map(|h| slugify_heading(&h.text))
            .collect(),
        bridges: Vec::new(),
        total_chunks: total_chunks(document.word_count, size, overlap),
    }
}

/// `max(1, ceil(word_count / (size - overlap)))`.
pub fn total_chunks(word_count: usize, size: usize, overlap: usize) -> usize {
    let stride = size.saturating_sub(overlap).max(1);
    std::cmp::max(1, word_count.div_ceil(stride))
}

/// Strategy from section shape: structural for regular, evenly sized
/// sections; semantic when section lengths swing hard (or there is no
/// heading structure at all); hybrid otherwise.
fn select_strategy(document: &Document) -> ChunkStrategy {
    let sections: Vec<f64> = document
        .headings
        .iter()
        .map(|h| h.word_count as f64)
        .collect();

    if sections.is_empty() {
        return ChunkStrategy::Semantic;
    }
    if sections.len() < 2 {
        return ChunkStrategy::Hybrid;
    }

    let cv = coefficient_of_variation(&sections);
    if sections.len() >= 3 && cv < 0.5 {
        ChunkStrategy::Structural
    } else if cv > 1.0 {
        ChunkStrategy::Semantic
    } else {
        ChunkStrategy::Hybrid
    }
}

/// Standard deviation over mean. Zero-mean sections count as maximally
/// irregular.
fn coefficient_of_variation(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean == 0.0 {
        return f64::MAX;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt() / mean
}

/// Size from the word count, overlap as a strategy-dependent fraction of
/// size, both clamped to their bounds.
pub fn size_and_overlap(word_count: usize, strategy: ChunkStrategy) -> (usize, usize) {
    let desired = std::cmp::max(1, (word_count as f64 / TARGET_CHUNK_WORDS as f64).round() as usize);
    let size = (word_count / desired).clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);

    let fraction = match strategy {
        ChunkStrategy::Structural => 0.15,
        ChunkStrategy::Hybrid => 0.18,
        ChunkStrategy::Semantic => 0.20,
    };
    let overlap = ((size as f64 * fraction).round() as usize).clamp(MIN_OVERLAP, MAX_OVERLAP);

    (size, overlap)
}

/// Slug for a heading: lowercase, alphanumerics and dashes only.
pub fn slugify_heading(text: &str) -> String {
    let slug: String = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect();

    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}

// ---------------------------------------------------------------------------
// Materialization
// ---------------------------------------------------------------------------

/// Walk the body in strides of `size - overlap` words, emitting
/// `[start, start + size)` windows clipped to the body, mapped back to byte
/// offsets. Consecutive chunks overlap by exactly `spec.overlap` words
/// except the final one.
pub fn materialize(document: &Document, spec: &ChunkSpec) -> Vec<Chunk> {
    let spans = word_spans(&document.body);
    if spans.is_empty() {
        return Vec::new();
    }

    let stride = spec.size.saturating_sub(spec.overlap).max(1);
    let heading_marks = heading_word_offsets(&document.body);
    let keywords: Vec<String> = document
        .metadata
        .get_list("keywords")
        .iter()
        .map(|k| k.to_lowercase())
        .collect();

    let major: Vec<&HeadingMark> = heading_marks.iter().filter(|m| m.level <= 2).collect();

    let mut chunks = Vec::new();
    let mut start_word = 0;
    let mut ordinal = 0;

    while start_word < spans.len() {
        let end_word = std::cmp::min(start_word + spec.size, spans.len());
        let start_byte = spans[start_word].0;
        let end_byte = spans[end_word - 1].1;
        let content = document.body[start_byte..end_byte].to_string();

        let anchor = heading_marks
            .iter()
            .take_while(|m| m.word_offset <= start_word)
            .last()
            .map(|m| m.slug.clone())
            .unwrap_or_else(|| document.id.clone());

        // A chunk opening a new major section carries the bridge from the
        // previous one.
        let bridge = major
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, m)| m.word_offset >= start_word && m.word_offset < end_word)
            .map(|(j, m)| format!("{}-to-{}", major[j - 1].slug, m.slug));

        let content_lower = content.to_lowercase();
        let vector_keywords: Vec<String> = keywords
            .iter()
            .filter(|k| content_lower.contains(k.as_str()))
            .take(MAX_VECTOR_KEYWORDS)
            .cloned()
            .collect();

        chunks.push(Chunk {
            id: format!("{}-{}", document.id, ordinal),
            content,
            start_offset: start_byte,
            end_offset: end_byte,
            anchor,
            bridge,
            vector_keywords,
        });

        if end_word == spans.len() {
            break;
        }
        start_word += stride;
        ordinal += 1;
    }

    chunks
}

/// Byte span of every whitespace-separated token in `body`.
fn word_spans(body: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in body.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, body.len()));
    }

    spans
}

struct HeadingMark {
    word_offset: usize,
    level: u8,
    slug: String,
}

/// Word offsets of each heading line, counted over the same tokenization
/// [`materialize`] walks. Fenced code lines still count as words here; they
/// are part of the chunk windows.
fn heading_word_offsets(body: &str) -> Vec<HeadingMark> {
    let mut marks = Vec::new();
    let mut in_fence = false;
    let mut word_offset = 0;

    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            word_offset += line.split_whitespace().count();
            continue;
        }

        if !in_fence {
            let trimmed = line.trim_start();
            let hashes = trimmed.chars().take_while(|c| *c == '#').count();
            if (1..=6).contains(&hashes) && trimmed[hashes..].starts_with(' ') {
                marks.push(HeadingMark {
                    word_offset,
                    level: hashes as u8,
                    slug: slugify_heading(trimmed[hashes..].trim()),
                });
            }
        }

        word_offset += line.split_whitespace().count();
    }

    marks
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use docforge_shared::{Heading, Metadata, content_hash};

    fn make_document(body: &str, headings: Vec<Heading>) -> Document {
        let word_count = body.split_whitespace().count();
        Document {
            id: "test-doc".into(),
            title: "Test Doc".into(),
            source_path: "test-doc.md".into(),
            body: body.to_string(),
            metadata: Metadata::new(),
            word_count,
            headings,
            code_block_count: 0,
            list_item_count: 0,
            content_hash: content_hash(body),
            modified_at: None,
        }
    }

    fn heading(level: u8, text: &str, word_count: usize) -> Heading {
        Heading {
            level,
            text: text.into(),
            word_count,
        }
    }

    fn synthetic_body(words: usize) -> String {
        (0..words)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    // --- Strategy selection ---

    #[test]
    fn even_sections_choose_structural() {
        let doc = make_document(
            &synthetic_body(1200),
            vec![
                heading(2, "Alpha", 300),
                heading(2, "Beta", 310),
                heading(2, "Gamma", 295),
                heading(2, "Delta", 305),
            ],
        );
        assert_eq!(compute_spec(&doc).strategy, ChunkStrategy::Structural);
    }

    #[test]
    fn wild_sections_choose_semantic() {
        let doc = make_document(
            &synthetic_body(1200),
            vec![
                heading(2, "Tiny", 10),
                heading(2, "Huge", 1100),
                heading(2, "Small", 30),
            ],
        );
        assert_eq!(compute_spec(&doc).strategy, ChunkStrategy::Semantic);
    }

    #[test]
    fn no_headings_choose_semantic() {
        let doc = make_document(&synthetic_body(600), vec![]);
        assert_eq!(compute_spec(&doc).strategy, ChunkStrategy::Semantic);
    }

    #[test]
    fn middling_variance_chooses_hybrid() {
        let doc = make_document(
            &synthetic_body(900),
            vec![heading(2, "One", 200), heading(2, "Two", 700)],
        );
        assert_eq!(compute_spec(&doc).strategy, ChunkStrategy::Hybrid);
    }

    // --- Size / overlap / count ---

    #[test]
    fn size_and_overlap_respect_bounds() {
        for words in [50, 180, 450, 900, 5000, 20000] {
            let doc = make_document(&synthetic_body(words), vec![]);
            let spec = compute_spec(&doc);
            assert!(
                (MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&spec.size),
                "size {} out of bounds for {words} words",
                spec.size
            );
            assert!(
                (MIN_OVERLAP..=MAX_OVERLAP).contains(&spec.overlap),
                "overlap {} out of bounds for {words} words",
                spec.overlap
            );
            assert!(spec.overlap < spec.size);
        }
    }

    #[test]
    fn typical_prose_lands_in_target_band() {
        for words in [900, 1800, 4500] {
            let doc = make_document(&synthetic_body(words), vec![]);
            let spec = compute_spec(&doc);
            assert!(
                (300..=600).contains(&spec.size),
                "size {} outside 300-600 for {words} words",
                spec.size
            );
        }
    }

    #[test]
    fn total_chunks_formula() {
        assert_eq!(total_chunks(0, 400, 60), 1);
        assert_eq!(total_chunks(340, 400, 60), 1);
        assert_eq!(total_chunks(341, 400, 60), 2);
        assert_eq!(total_chunks(1000, 400, 60), 3);
    }

    // --- Anchors and bridges ---

    #[test]
    fn anchors_and_bridges_from_headings() {
        let doc = make_document(
            &synthetic_body(600),
            vec![
                heading(1, "Getting Started", 200),
                heading(2, "Install & Run", 200),
                heading(3, "Minor Detail", 50),
                heading(2, "Configure", 150),
            ],
        );
        let spec = compute_spec(&doc);
        assert_eq!(
            spec.anchors,
            vec!["getting-started", "install--run", "minor-detail", "configure"]
        );
        // Bridges only span major (level <= 2) sections.
        assert_eq!(
            spec.bridges,
            vec![
                "getting-started-to-install--run",
                "install--run-to-configure"
            ]
        );
    }

    // --- Materialization invariants ---

    #[test]
    fn chunks_cover_body_with_exact_overlap() {
        let body = synthetic_body(1000);
        let doc = make_document(&body, vec![]);
        let spec = ChunkSpec {
            strategy: ChunkStrategy::Structural,
            size: 300,
            overlap: 50,
            boundaries: vec![],
            anchors: vec![],
            bridges: vec![],
            total_chunks: total_chunks(1000, 300, 50),
        };

        let chunks = materialize(&doc, &spec);
        assert!(!chunks.is_empty());

        for window in chunks.windows(2) {
            // Monotonic offsets.
            assert!(window[0].start_offset < window[1].start_offset);
            assert!(window[0].end_offset <= window[1].end_offset);
            // Exact overlap in words.
            let prev_words: Vec<&str> = window[0].content.split_whitespace().collect();
            let next_words: Vec<&str> = window[1].content.split_whitespace().collect();
            let overlap_words = &prev_words[prev_words.len() - 50..];
            assert_eq!(overlap_words, &next_words[..50]);
        }

        for chunk in &chunks {
            assert!(chunk.end_offset <= doc.body.len());
            assert!(chunk.content.split_whitespace().count() <= 300);
        }

        // Every word appears: last chunk reaches the end of the body.
        assert_eq!(chunks.last().unwrap().end_offset, doc.body.len());
        // Ids carry the ordinal.
        assert_eq!(chunks[0].id, "test-doc-0");
        assert_eq!(chunks[1].id, "test-doc-1");
    }

    #[test]
    fn single_chunk_when_body_fits() {
        let body = synthetic_body(120);
        let doc = make_document(&body, vec![]);
        let spec = compute_spec(&doc);

        let chunks = materialize(&doc, &spec);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].end_offset, body.len());
        assert_eq!(chunks[0].anchor, "test-doc");
        assert!(chunks[0].bridge.is_none());
    }

    #[test]
    fn empty_body_yields_no_chunks() {
        let doc = make_document("", vec![]);
        let spec = compute_spec(&doc);
        assert!(materialize(&doc, &spec).is_empty());
    }

    #[test]
    fn chunks_anchor_to_nearest_heading() {
        let mut body = String::from("# Alpha\n\n");
        body.push_str(&synthetic_body(300));
        body.push_str("\n\n## Beta\n\n");
        body.push_str(&synthetic_body(300));

        let doc = make_document(&body, vec![heading(1, "Alpha", 300), heading(2, "Beta", 300)]);
        let spec = ChunkSpec {
            strategy: ChunkStrategy::Structural,
            size: 250,
            overlap: 30,
            boundaries: vec![],
            anchors: vec!["alpha".into(), "beta".into()],
            bridges: vec!["alpha-to-beta".into()],
            total_chunks: 3,
        };

        let chunks = materialize(&doc, &spec);
        assert_eq!(chunks[0].anchor, "alpha");
        let last = chunks.last().unwrap();
        assert_eq!(last.anchor, "beta");
        // Some chunk crosses into Beta and carries the bridge.
        assert!(chunks.iter().any(|c| c.bridge.as_deref() == Some("alpha-to-beta")));
    }

    #[test]
    fn vector_keywords_come_from_document_keywords() {
        let mut doc = make_document("The authentication flow uses rotating tokens daily.", vec![]);
        doc.metadata.insert(
            "keywords",
            vec![
                "authentication".to_string(),
                "tokens".to_string(),
                "unrelated".to_string(),
            ],
        );
        let spec = compute_spec(&doc);

        let chunks = materialize(&doc, &spec);
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].vector_keywords,
            vec!["authentication".to_string(), "tokens".to_string()]
        );
    }

    #[test]
    fn fallback_spec_is_structural_and_bounded() {
        let doc = make_document(&synthetic_body(900), vec![heading(1, "Only", 900)]);
        let spec = structural_spec(&doc);
        assert_eq!(spec.strategy, ChunkStrategy::Structural);
        assert!((MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&spec.size));
        assert_eq!(spec.anchors, vec!["only"]);
        assert_eq!(spec.total_chunks, total_chunks(900, spec.size, spec.overlap));
    }

    #[test]
    fn slugify_heading_basics() {
        assert_eq!(slugify_heading("Getting Started"), "getting-started");
        assert_eq!(slugify_heading("API (v2) Reference!"), "api-v2-reference");
        assert_eq!(slugify_heading("???"), "section");
    }
}
