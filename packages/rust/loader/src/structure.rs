//! Structural facts about a markdown body: headings with per-section word
//! counts, total word count, code blocks, list items.

use std::sync::LazyLock;

use regex::Regex;

use docforge_shared::Heading;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("valid regex"));

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([-*+]|\d+\.)\s+\S").expect("valid regex"));

/// Everything the pipeline needs to know about a body's shape.
#[derive(Debug, Clone, Default)]
pub struct DocumentStructure {
    /// First H1 text, if any.
    pub title: Option<String>,
    /// Words outside fenced code blocks.
    pub word_count: usize,
    /// Headings in order, each with the word count of its section
    /// (text between it and the next heading).
    pub headings: Vec<Heading>,
    /// Words before the first heading.
    pub preamble_word_count: usize,
    /// Fenced code blocks.
    pub code_block_count: usize,
    /// Bulleted and numbered list items.
    pub list_item_count: usize,
}

/// Scan a body line by line. Fenced code is excluded from word counts and
/// never mistaken for headings or list items.
pub fn scan_structure(body: &str) -> DocumentStructure {
    let mut structure = DocumentStructure::default();
    let mut in_fence = false;
    // (index into headings, running section word count)
    let mut current_section: Option<usize> = None;

    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            if !in_fence {
                structure.code_block_count += 1;
            }
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        if let Some(caps) = HEADING_RE.captures(line) {
            let level = caps[1].len() as u8;
            let text = caps[2].trim().to_string();
            if level == 1 && structure.title.is_none() {
                structure.title = Some(text.clone());
            }
            let heading_words = text.split_whitespace().count();
            structure.word_count += heading_words;
            structure.headings.push(Heading {
                level,
                text,
                word_count: 0,
            });
            current_section = Some(structure.headings.len() - 1);
            continue;
        }

        if LIST_ITEM_RE.is_match(line) {
            structure.list_item_count += 1;
        }

        let words = line.split_whitespace().count();
        structure.word_count += words;
        match current_section {
            Some(i) => structure.headings[i].word_count += words,
            None => structure.preamble_word_count += words,
        }
    }

    structure
}
