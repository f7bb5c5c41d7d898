//! Classify-before-write
//!
//! When a model is configured, a candidate fact is compared against its
//! structurally closest existing facts and classified into one of four
//! actions. Candidate selection is deterministic: same entity and key
//! first, then same entity, then a text match.

use serde::{Deserialize, Serialize};

use crate::memory::{Fact, FactInput, QueryOptions};
use crate::storage::{Result as StoreResult, Store};

/// What to do with a candidate utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// New information; store it
    Add,
    /// Replaces an existing fact
    Update { old_id: String },
    /// Retracts an existing fact without a successor
    Delete { old_id: String },
    /// Already known; drop the utterance
    Noop { existing_id: String },
}

/// Outcome of a facade write, for callers that care how it landed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteDecision {
    Added,
    Superseded { old_id: String },
    Retracted { old_id: String },
    Noop { existing_id: String },
    Deduplicated { existing_id: String },
}

/// How many existing facts the model sees
const MAX_CANDIDATES: usize = 5;

/// Structurally similar existing facts, strongest signal first
pub(crate) fn structural_candidates(store: &Store, input: &FactInput) -> StoreResult<Vec<Fact>> {
    let opts = QueryOptions::default();
    let mut out: Vec<Fact> = Vec::new();

    if let (Some(entity), Some(key)) = (&input.entity, &input.key) {
        out.extend(store.lookup(entity, Some(key), &opts)?);
    }
    if out.len() < MAX_CANDIDATES {
        if let Some(entity) = &input.entity {
            for fact in store.lookup(entity, None, &opts)? {
                if !out.iter().any(|f| f.id == fact.id) {
                    out.push(fact);
                }
            }
        }
    }
    if out.len() < MAX_CANDIDATES {
        for (fact, _) in store.search(&input.text, MAX_CANDIDATES, &opts)? {
            if !out.iter().any(|f| f.id == fact.id) {
                out.push(fact);
            }
        }
    }

    out.truncate(MAX_CANDIDATES);
    Ok(out)
}

/// The classification prompt. Kept short and mechanical; the response
/// grammar is a single line.
pub(crate) fn build_prompt(input: &FactInput, candidates: &[Fact]) -> String {
    let mut prompt = String::from(
        "You maintain a fact store. Given a NEW statement and EXISTING facts, \
         answer with exactly one line:\n\
         ADD | UPDATE <n> | DELETE <n> | NOOP <n>\n\
         UPDATE when the new statement replaces fact <n>; DELETE when it \
         retracts fact <n> without a replacement; NOOP when fact <n> already \
         says this; ADD otherwise.\n\nNEW: ",
    );
    prompt.push_str(&input.text);
    prompt.push_str("\n\nEXISTING:\n");
    for (i, fact) in candidates.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, fact.text));
    }
    prompt
}

/// Parse the one-line response; anything unrecognized degrades to ADD
pub(crate) fn parse_response(response: &str, candidates: &[Fact]) -> Classification {
    let line = response.trim().lines().next().unwrap_or("").trim();
    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or("").to_uppercase();
    let index = parts
        .next()
        .and_then(|n| n.trim_matches(|c: char| !c.is_ascii_digit()).parse::<usize>().ok())
        .and_then(|n| n.checked_sub(1));

    let resolve = |index: Option<usize>| index.and_then(|i| candidates.get(i));

    match verb.as_str() {
        "UPDATE" => match resolve(index) {
            Some(fact) => Classification::Update {
                old_id: fact.id.clone(),
            },
            None => Classification::Add,
        },
        "DELETE" => match resolve(index) {
            Some(fact) => Classification::Delete {
                old_id: fact.id.clone(),
            },
            None => Classification::Add,
        },
        "NOOP" => match resolve(index).or_else(|| candidates.first()) {
            Some(fact) => Classification::Noop {
                existing_id: fact.id.clone(),
            },
            None => Classification::Add,
        },
        _ => Classification::Add,
    }
}
