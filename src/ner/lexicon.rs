//! Rule-based recognizer: a drug gazetteer matched with Aho-Corasick plus
//! regular expressions for the numeric and phrase categories.
//!
//! It needs no model files, which makes it the backend for offline runs
//! and tests. Matching is linear in the text length.

use aho_corasick::{AhoCorasick, MatchKind};
use regex::Regex;
use tracing::info;

use super::{EntityLabel, EntityRecognizer, Span};
use crate::error::{NerError, Result};

const DRUGS: &[&str] = &[
    "acetaminophen", "amitriptyline", "amlodipine", "amoxicillin", "apixaban", "aspirin",
    "atenolol", "atorvastatin", "azithromycin", "bendroflumethiazide", "bisoprolol",
    "cefalexin", "ceftriaxone", "ciprofloxacin", "citalopram", "clarithromycin",
    "clopidogrel", "co-amoxiclav", "codeine", "dexamethasone", "diazepam", "digoxin",
    "doxycycline", "enoxaparin", "fentanyl", "flucloxacillin", "fluoxetine", "furosemide",
    "gabapentin", "gentamicin", "gliclazide", "haloperidol", "heparin", "hydrocortisone",
    "ibuprofen", "insulin", "lactulose", "lansoprazole", "levothyroxine", "lisinopril",
    "lorazepam", "losartan", "metformin", "metoclopramide", "metronidazole", "morphine",
    "naproxen", "nitrofurantoin", "omeprazole", "ondansetron", "oxycodone", "pantoprazole",
    "paracetamol", "penicillin", "prednisolone", "pregabalin", "quetiapine", "ramipril",
    "ranitidine", "rivaroxaban", "rosuvastatin", "salbutamol", "senna", "sertraline",
    "simvastatin", "spironolactone", "tramadol", "trimethoprim", "vancomycin", "warfarin",
];

const NUMBER: &str = r"\d+(?:\.\d+)?";

fn rules() -> Vec<(EntityLabel, String)> {
    let mass = r"(?:mg|mcg|µg|g|ml|units?|iu)";
    vec![
        (
            EntityLabel::Strength,
            format!(r"(?i)\b{NUMBER}\s?{mass}\s?/\s?(?:{NUMBER}\s?)?(?:ml|l|g|kg|tab|tablet|dose|hr|h)\b"),
        ),
        (
            EntityLabel::Dosage,
            format!(
                r"(?i)\b{NUMBER}\s?(?:{mass}|tablets?|tabs?|capsules?|caps?|puffs?|drops?|sachets?)\b"
            ),
        ),
        (
            EntityLabel::Duration,
            format!(
                r"(?i)\b(?:for\s+)?(?:{NUMBER}|one|two|three|four|five|six|seven|ten|fourteen)\s+(?:days?|weeks?|months?)\b"
            ),
        ),
        (
            EntityLabel::Frequency,
            concat!(
                r"(?i)\b(?:once|twice|three times|four times)\s+(?:a|per)\s+(?:day|week)\b",
                r"|\b(?:once|twice|three times|four times)\s+daily\b",
                r"|\bevery\s+\d+(?:\s*-\s*\d+)?\s+hours?\b",
                r"|\bq\d+h\b",
                r"|\bas\s+(?:needed|required)\b",
                r"|\bat\s+night\b",
                r"|\bin\s+the\s+morning\b",
                r"|\b(?:daily|nightly|weekly|monthly|hourly|bd|bid|tds|tid|qds|qid|od|nocte|mane|prn|stat)\b",
            )
            .to_string(),
        ),
        (
            EntityLabel::Route,
            concat!(
                r"(?i)\b(?:by mouth|orally|oral|po|intravenously|intravenous|iv|intramuscularly|intramuscular",
                r"|subcutaneously|subcutaneous|sublingually|sublingual|topically|topical|inhaled",
                r"|nebulised|nebulized|rectally|per rectum|transdermal|nasally|nasal)\b",
            )
            .to_string(),
        ),
        (
            EntityLabel::Form,
            concat!(
                r"(?i)\b(?:tablets?|tabs?|capsules?|caps|syrup|suspension|solution|injections?|infusion",
                r"|inhalers?|cream|ointment|gel|patch(?:es)?|drops|spray|suppositor(?:y|ies)|lozenges?",
                r"|sachets?|elixir)\b",
            )
            .to_string(),
        ),
    ]
}

pub struct LexiconRecognizer {
    drugs: AhoCorasick,
    rules: Vec<(EntityLabel, Regex)>,
}

impl LexiconRecognizer {
    pub fn new() -> Result<Self> {
        Self::with_drugs(DRUGS)
    }

    /// Build with a custom drug gazetteer; the regex rules are fixed.
    pub fn with_drugs<S: AsRef<str>>(drugs: &[S]) -> Result<Self> {
        let drugs = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .ascii_case_insensitive(true)
            .build(drugs.iter().map(|d| d.as_ref()))
            .map_err(|e| NerError::ModelLoad(format!("drug gazetteer: {}", e)))?;

        let rules = rules()
            .into_iter()
            .map(|(label, pattern)| {
                Regex::new(&pattern)
                    .map(|re| (label, re))
                    .map_err(|e| NerError::ModelLoad(format!("{} rule: {}", label, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        info!("Lexicon recognizer ready: {} drugs, {} rules", drugs.patterns_len(), rules.len());
        Ok(Self { drugs, rules })
    }
}

impl EntityRecognizer for LexiconRecognizer {
    fn name(&self) -> &str {
        "lexicon"
    }

    fn recognize(&self, text: &str) -> Result<Vec<Span>> {
        let mut candidates: Vec<(Span, usize)> = self
            .drugs
            .find_iter(text)
            .filter(|m| is_word_bounded(text, m.start(), m.end()))
            .map(|m| (Span::new(EntityLabel::Drug, m.start(), m.end()), 0))
            .collect();

        for (priority, (label, re)) in self.rules.iter().enumerate() {
            candidates.extend(
                re.find_iter(text)
                    .map(|m| (Span::new(*label, m.start(), m.end()), priority + 1)),
            );
        }

        Ok(leftmost_longest(candidates))
    }
}

fn is_word_bounded(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

/// Keep non-overlapping spans, preferring the earliest start, then the
/// longest match, then the lowest priority number.
fn leftmost_longest(mut candidates: Vec<(Span, usize)>) -> Vec<Span> {
    candidates.sort_by(|(a, pa), (b, pb)| {
        a.start
            .cmp(&b.start)
            .then(b.len().cmp(&a.len()))
            .then(pa.cmp(pb))
    });

    let mut spans: Vec<Span> = Vec::with_capacity(candidates.len());
    for (span, _) in candidates {
        if span.is_empty() {
            continue;
        }
        if spans.last().is_none_or(|last| span.start >= last.end) {
            spans.push(span);
        }
    }
    spans
}
