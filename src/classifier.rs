//! Heuristic outcome and sentiment classification over call transcripts.
//!
//! Pure keyword scoring, no external calls. This is the designed behavior,
//! not a stand-in for an NLP model: the thresholds and tie-break rules below
//! are the contract, and the tests pin them exactly.

use crate::types::{Sentiment, Speaker, TranscriptTurn};

/// Raw classifier outcome tag, before mapping onto [`crate::types::CallOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeTag {
    Interested,
    NotInterested,
    Callback,
    Voicemail,
    NoAnswer,
    Inconclusive,
}

const INTERESTED_KEYWORDS: [&str; 10] = [
    "interested",
    "yes",
    "sounds good",
    "let's do it",
    "schedule",
    "when can",
    "what time",
    "sign up",
    "demo",
    "more information",
];

const NOT_INTERESTED_KEYWORDS: [&str; 7] = [
    "not interested",
    "no thanks",
    "not right now",
    "remove me",
    "stop calling",
    "don't call",
    "unsubscribe",
];

const CALLBACK_KEYWORDS: [&str; 7] = [
    "call back",
    "later",
    "next week",
    "next month",
    "email me",
    "send information",
    "busy right now",
];

const POSITIVE_WORDS: [&str; 11] = [
    "yes",
    "great",
    "interested",
    "good",
    "sounds",
    "help",
    "definitely",
    "perfect",
    "wonderful",
    "excellent",
    "thank",
];

const NEGATIVE_WORDS: [&str; 12] = [
    "no",
    "not",
    "busy",
    "don't",
    "won't",
    "can't",
    "sorry",
    "annoyed",
    "stop",
    "never",
    "bad",
    "terrible",
];

/// Number of case-insensitive substring matches of `keywords` in `text`.
/// Each keyword counts at most once, however often it repeats.
fn count_matches(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| text.contains(*k)).count()
}

/// Lowercased concatenation of the dialed party's turns.
fn lead_text(turns: &[TranscriptTurn]) -> String {
    turns
        .iter()
        .filter(|t| t.speaker == Speaker::Lead)
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Classify the call outcome from an ordered transcript.
///
/// Decision order:
/// - empty transcript → `NoAnswer`
/// - at most 2 turns mentioning "voicemail" anywhere → `Voicemail`
/// - interested matches present and strictly above not-interested → `Interested`
/// - any not-interested match → `NotInterested`
/// - any callback match → `Callback`
/// - otherwise → `Inconclusive`
pub fn classify_outcome(turns: &[TranscriptTurn]) -> OutcomeTag {
    if turns.is_empty() {
        return OutcomeTag::NoAnswer;
    }

    let full_text = turns
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if turns.len() <= 2 && full_text.contains("voicemail") {
        return OutcomeTag::Voicemail;
    }

    let lead = lead_text(turns);

    let interested = count_matches(&lead, &INTERESTED_KEYWORDS);
    let not_interested = count_matches(&lead, &NOT_INTERESTED_KEYWORDS);
    let callback = count_matches(&lead, &CALLBACK_KEYWORDS);

    if interested > 0 && interested > not_interested {
        OutcomeTag::Interested
    } else if not_interested > 0 {
        OutcomeTag::NotInterested
    } else if callback > 0 {
        OutcomeTag::Callback
    } else {
        OutcomeTag::Inconclusive
    }
}

/// Classify sentiment of the dialed party.
///
/// `Positive` iff positive matches exceed negative by more than one;
/// `Negative` by the symmetric rule; `Neutral` otherwise or when the
/// dialed party never spoke.
pub fn classify_sentiment(turns: &[TranscriptTurn]) -> Sentiment {
    if turns.is_empty() {
        return Sentiment::Neutral;
    }

    let lead = lead_text(turns);
    if lead.is_empty() {
        return Sentiment::Neutral;
    }

    let positive = count_matches(&lead, &POSITIVE_WORDS);
    let negative = count_matches(&lead, &NEGATIVE_WORDS);

    if positive > negative + 1 {
        Sentiment::Positive
    } else if negative > positive + 1 {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}
