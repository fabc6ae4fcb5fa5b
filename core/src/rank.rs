use crate::client::ChatModel;
use crate::store::DescriptionStore;
use serde::Serialize;
use thiserror::Error;

/// One ranked match. Transient: produced per query, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedResult {
    pub identifier: String,
    pub description: String,
    /// Model-reported relevance on a 0-100 scale, clamped to 100.
    pub confidence: u32,
}

/// Operation-level precondition failures, distinct from "no matches".
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RankError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("no images indexed yet")]
    EmptyStore,
}

/// Build the single ranking prompt: every indexed description, numbered, plus
/// the query and the requested result count and line format.
pub fn build_ranking_prompt(query: &str, snapshot: &DescriptionStore, top_k: usize) -> String {
    let descriptions_text = snapshot
        .iter()
        .enumerate()
        .map(|(i, (identifier, description))| format!("{}. {identifier}: {description}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Given this search query: '{query}', rank these screenshot descriptions by relevance. \
Return the top {top_k} matches with confidence scores (0-100).\n\n\
Format your response as:\n1. filename: confidence_score\n2. filename: confidence_score\n...\n\n\
Screenshot descriptions:\n{descriptions_text}\n"
    )
}

/// Parse the model's free-text reply into ranked results.
///
/// The reply is a pseudo-protocol at best, so every line is handled
/// independently: any line that cannot be turned into a `(known identifier,
/// confidence)` pair is dropped and the rest of the reply still parses. Reply
/// order is preserved and the result is truncated to `top_k`; no re-sorting by
/// confidence happens here.
pub fn parse_ranking_reply(reply: &str, snapshot: &DescriptionStore, top_k: usize) -> Vec<RankedResult> {
    reply
        .lines()
        .filter_map(|line| parse_line(line, snapshot))
        .take(top_k)
        .collect()
}

/// Tolerant parse of one reply line, expected as `N. identifier: confidence`.
/// Returns `None` for prose, unknown identifiers, and anything else that does
/// not fit.
fn parse_line(line: &str, snapshot: &DescriptionStore) -> Option<RankedResult> {
    // Candidate lines need a separator and at least one digit somewhere;
    // this alone disqualifies most header/prose lines.
    if !line.contains(':') || !line.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let (left, right) = line.split_once(':')?;

    // Strip the ordinal prefix the requested format carries ("1. foo.png" -> "foo.png").
    let left = left.trim();
    let identifier = match left.split_once(". ") {
        Some((_, rest)) => rest.trim(),
        None => left,
    };

    // The confidence is whatever digits the right side carries, concatenated.
    // "87%", "confidence: 87" and "score 87/100" all reduce to digits; a right
    // side with none is unparseable and the line is dropped.
    let digits: String = right.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let raw: u64 = digits.parse().ok()?;

    // The prompt asks for 0-100; anything above is clamped rather than trusted.
    let confidence = if raw > 100 {
        tracing::debug!(line, raw, "confidence above 100, clamping");
        100
    } else {
        raw as u32
    };

    // Only identifiers that exactly match a store key survive; this guards
    // against the model inventing or mistyping filenames.
    let description = snapshot.get(identifier)?;
    Some(RankedResult {
        identifier: identifier.to_string(),
        description: description.to_string(),
        confidence,
    })
}

/// Rank the indexed descriptions against `query` with one text-model call.
///
/// Empty query and empty store are precondition failures. A transport or
/// model failure degrades to an empty result list and is logged, so one flaky
/// call reads as "no results" rather than an aborted operation.
pub async fn rank(
    model: &dyn ChatModel,
    query: &str,
    snapshot: &DescriptionStore,
    top_k: usize,
) -> Result<Vec<RankedResult>, RankError> {
    if query.trim().is_empty() {
        return Err(RankError::EmptyQuery);
    }
    if snapshot.is_empty() {
        return Err(RankError::EmptyStore);
    }

    let prompt = build_ranking_prompt(query, snapshot, top_k);
    let reply = match model.complete_text(&prompt).await {
        Ok(reply) => reply,
        Err(err) => {
            tracing::warn!(query, %err, "ranking model call failed");
            return Ok(vec![]);
        }
    };

    Ok(parse_ranking_reply(&reply, snapshot, top_k))
}
