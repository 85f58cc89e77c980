//! BIO tag decoding for token-classification output.

use tracing::warn;

use super::{EntityLabel, Span};

/// Per-class tag, resolved once from the model's `id2label` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Outside,
    Begin(EntityLabel),
    Inside(EntityLabel),
}

impl Tag {
    /// Parse a model label such as `B-DRUG`, `I-DOSAGE`, `O` or a bare
    /// `ROUTE` (treated as inside). Labels outside the MED7 set map to
    /// `Outside`.
    pub fn parse(raw: &str) -> Tag {
        let raw = raw.trim();
        if raw.is_empty() || raw == "O" {
            return Tag::Outside;
        }
        let (begin, name) = match raw.split_once('-') {
            Some(("B", name)) => (true, name),
            Some(("I", name)) => (false, name),
            _ => (false, raw),
        };
        match name.parse::<EntityLabel>() {
            Ok(label) if begin => Tag::Begin(label),
            Ok(label) => Tag::Inside(label),
            Err(_) => {
                warn!("Model label '{}' is not a MED7 category, treating as O", raw);
                Tag::Outside
            }
        }
    }
}

/// Fold per-token tags into spans.
///
/// `offsets` are byte ranges per token and `word_ids` group word pieces of
/// the same word; a piece that continues the previous token's word extends
/// the open span whatever its own tag says.
pub fn decode(tags: &[Tag], offsets: &[(usize, usize)], word_ids: &[Option<u32>]) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut current: Option<Span> = None;
    let mut prev_word: Option<u32> = None;

    for (i, tag) in tags.iter().enumerate() {
        let Some(&(start, end)) = offsets.get(i) else {
            break;
        };
        let word = word_ids.get(i).copied().flatten();
        let continues_word = word.is_some() && word == prev_word;
        prev_word = word;

        if continues_word {
            if let Some(span) = current.as_mut() {
                span.end = end;
            }
            continue;
        }

        match *tag {
            Tag::Begin(label) => {
                spans.extend(current.take());
                current = Some(Span::new(label, start, end));
            }
            Tag::Inside(label) => match current.as_mut() {
                Some(span) if span.label == label => span.end = end,
                _ => {
                    spans.extend(current.take());
                    current = Some(Span::new(label, start, end));
                }
            },
            Tag::Outside => spans.extend(current.take()),
        }
    }

    spans.extend(current);
    spans
}
