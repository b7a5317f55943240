//! Archaic hyphen removal (English, Russian)
//!
//! Old typesetting hyphenated compounds that are now closed ("every-one",
//! "bed-room"), and text pulled from page layouts keeps line-break hyphens
//! ("exam- ple"). Compounds are joined when the closed form is in the
//! dictionary; line-break hyphens are joined unless the second word is a
//! conjunction ("pre- and post-war").

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::{is_verbatim, map_text_within, Budget, BudgetExhausted, ProcessingContext, TextProcessor};

const CLOSED_COMPOUNDS: &[&str] = &[
    "anyone", "anything", "anybody", "anywhere", "everyone", "everything", "everybody",
    "everywhere", "someone", "something", "somebody", "somewhere", "nobody", "nothing",
    "nowhere", "bedroom", "bathroom", "bookcase", "fireplace", "footstep", "footsteps",
    "hillside", "lamplight", "moonlight", "sunlight", "sunset", "sunrise", "staircase",
    "doorway", "gateway", "highway", "railway", "newspaper", "pocketbook", "schoolroom",
    "shopkeeper", "drawingroom", "meanwhile", "nevertheless", "notwithstanding",
    "whereupon", "hereafter", "hitherto", "forthwith", "today", "tonight", "tomorrow",
    "cannot", "outside", "inside", "upstairs", "downstairs", "afterwards",
    "чтобы", "оттого", "потому", "поэтому", "зачем", "почему",
];

const CONJUNCTIONS: &[&str] = &["and", "or", "nor", "to", "и", "или", "либо"];

static COMPOUNDS: Lazy<HashSet<&'static str>> = Lazy::new(|| CLOSED_COMPOUNDS.iter().copied().collect());

/// `word-word` inside one token
static COMPOUND_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\p{L}+)-(\p{L}+)\b").unwrap());

/// `word- word` left by a line break, second half lowercase
static LINE_BREAK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\p{L}+)- (\p{Ll}+)\b").unwrap());

pub struct ArchaicHyphenProcessor;

impl TextProcessor for ArchaicHyphenProcessor {
    fn name(&self) -> &'static str {
        "archaic_hyphens"
    }

    fn order(&self) -> i32 {
        50
    }

    fn applies_to(&self, ctx: &ProcessingContext) -> bool {
        ctx.language_in(&["en", "ru"])
    }

    fn process(&self, html: &str, _ctx: &ProcessingContext, budget: &Budget) -> Result<String, BudgetExhausted> {
        map_text_within(html, |name, _| is_verbatim(name), budget, dehyphenate)
    }
}

fn dehyphenate(text: &str) -> String {
    if !text.contains('-') {
        return text.to_string();
    }

    let joined = LINE_BREAK_RE.replace_all(text, |caps: &Captures<'_>| {
        let second = &caps[2];
        if CONJUNCTIONS.contains(&second) {
            caps[0].to_string()
        } else {
            format!("{}{}", &caps[1], second)
        }
    });

    COMPOUND_RE
        .replace_all(&joined, |caps: &Captures<'_>| {
            let closed = format!("{}{}", &caps[1], &caps[2]);
            if COMPOUNDS.contains(closed.to_lowercase().as_str()) {
                closed
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}
