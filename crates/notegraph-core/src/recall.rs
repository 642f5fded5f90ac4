//! # Recall
//!
//! Picks the older notes worth showing the extractor's fusion pass. A note
//! is a candidate when it is linked to an entity the new extraction names;
//! candidates are ranked by a per-mille score:
//!
//! ```text
//! score = 650 * overlap / query_tokens
//!       + 250 * entity_hits / entity_terms
//!       + 100 * min(seed_hits, 3) / 3
//! ```
//!
//! `overlap` counts shared tokens, `entity_hits` counts named entities whose
//! name appears in the candidate's text, and `seed_hits` counts the named
//! entities the candidate is linked to. Integer arithmetic only.

use crate::config::RecallLimits;
use crate::extraction::{Extraction, RecalledNote};
use crate::query;
use crate::storage::GraphView;
use crate::{MemoryId, NotegraphError};
use std::collections::{BTreeMap, BTreeSet};

const OVERLAP_WEIGHT: u32 = 650;
const ENTITY_WEIGHT: u32 = 250;
const SEED_WEIGHT: u32 = 100;
const SEED_SATURATION: usize = 3;

/// Relevant older notes for `text`, best first, clipped to `limits`.
pub fn recall(
    view: &GraphView,
    extraction: &Extraction,
    text: &str,
    exclude: Option<MemoryId>,
    limits: &RecallLimits,
) -> Result<Vec<RecalledNote>, NotegraphError> {
    let mut seeds: BTreeMap<MemoryId, usize> = BTreeMap::new();
    let mut looked_up = BTreeSet::new();
    for mention in &extraction.entities {
        let Some(entity) = query::lookup(view, &mention.name)? else {
            continue;
        };
        if !looked_up.insert(entity) {
            continue;
        }
        let linked = view.memories_of(entity)?;
        for memory in linked.into_iter().rev().take(limits.candidates_per_entity) {
            if Some(memory) != exclude {
                *seeds.entry(memory).or_default() += 1;
            }
        }
    }
    if seeds.is_empty() {
        return Ok(Vec::new());
    }

    let query_tokens = tokenize(text);
    let entity_terms: Vec<String> = extraction
        .entities
        .iter()
        .map(|mention| mention.name.trim().to_lowercase())
        .filter(|term| term.chars().count() >= 2)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut scored = Vec::with_capacity(seeds.len());
    for (memory, seed_hits) in seeds {
        let Some(note) = view.memory(memory)? else {
            continue;
        };
        let score = score(&query_tokens, &entity_terms, &note.content, seed_hits);
        scored.push((memory, note.content, score));
    }
    // Best score first; newer notes win ties.
    scored.sort_by(|a, b| b.2.permille.cmp(&a.2.permille).then(b.0.cmp(&a.0)));

    let mut selected = Vec::new();
    let mut budget = limits.max_context_chars;
    for (memory, content, score) in scored.into_iter().take(limits.top_k) {
        let relevant = score.permille >= limits.min_score_permille
            || score.entity_hits > 0
            || score.overlap >= limits.min_token_overlap;
        if !relevant {
            continue;
        }
        if budget == 0 {
            break;
        }
        let excerpt = clip(content.trim(), budget.min(limits.max_note_chars));
        let used = excerpt.chars().count();
        if used == 0 {
            continue;
        }
        budget = budget.saturating_sub(used);
        selected.push(RecalledNote {
            memory,
            excerpt,
            score_permille: score.permille,
            entity_hits: score.entity_hits,
        });
    }

    tracing::debug!(recalled = selected.len(), "recall finished");
    Ok(selected)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Score {
    permille: u32,
    overlap: usize,
    entity_hits: usize,
}

fn score(
    query_tokens: &BTreeSet<String>,
    entity_terms: &[String],
    content: &str,
    seed_hits: usize,
) -> Score {
    let overlap = if query_tokens.is_empty() {
        0
    } else {
        tokenize(content).intersection(query_tokens).count()
    };
    let lowered = content.to_lowercase();
    let entity_hits = entity_terms
        .iter()
        .filter(|term| lowered.contains(term.as_str()))
        .count();

    let permille = ratio(OVERLAP_WEIGHT, overlap, query_tokens.len())
        + ratio(ENTITY_WEIGHT, entity_hits, entity_terms.len())
        + ratio(SEED_WEIGHT, seed_hits.min(SEED_SATURATION), SEED_SATURATION);
    Score {
        permille,
        overlap,
        entity_hits,
    }
}

fn ratio(weight: u32, hits: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let scaled = u64::from(weight) * hits as u64 / total as u64;
    u32::try_from(scaled).unwrap_or(weight)
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Lowercase alphanumeric runs of two or more characters, plus overlapping
/// bigrams of CJK runs (a lone CJK character is its own token).
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    let mut word = String::new();
    let mut cjk: Vec<char> = Vec::new();

    for ch in text.chars() {
        if is_cjk(ch) {
            flush_word(&mut word, &mut tokens);
            cjk.push(ch);
        } else if ch.is_alphanumeric() {
            flush_cjk(&mut cjk, &mut tokens);
            word.extend(ch.to_lowercase());
        } else {
            flush_word(&mut word, &mut tokens);
            flush_cjk(&mut cjk, &mut tokens);
        }
    }
    flush_word(&mut word, &mut tokens);
    flush_cjk(&mut cjk, &mut tokens);
    tokens
}

fn flush_word(word: &mut String, tokens: &mut BTreeSet<String>) {
    if word.chars().count() >= 2 {
        tokens.insert(std::mem::take(word));
    } else {
        word.clear();
    }
}

fn flush_cjk(run: &mut Vec<char>, tokens: &mut BTreeSet<String>) {
    match run.len() {
        0 => {}
        1 => {
            tokens.insert(run[0].to_string());
        }
        _ => {
            for pair in run.windows(2) {
                tokens.insert(pair.iter().collect());
            }
        }
    }
    run.clear();
}

fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{3040}'..='\u{30ff}'   // kana
        | '\u{3400}'..='\u{4dbf}' // ext A
        | '\u{4e00}'..='\u{9fff}' // unified
        | '\u{ac00}'..='\u{d7af}' // hangul
        | '\u{f900}'..='\u{faff}')
}
