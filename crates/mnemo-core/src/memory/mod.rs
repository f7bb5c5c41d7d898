//! Memory Model
//!
//! The persistent entities of the engine:
//! - Facts with bi-temporal validity, decay classes, tiers, and scopes
//! - Procedures with outcome-derived confidence
//! - Typed memory links between facts

mod fact;
mod link;
mod procedure;

pub use fact::{
    DecayClass, Fact, FactInput, IdPrefixMatch, MatchKind, MemoryStats, QueryOptions, Scope,
    ScopeFilter, SearchHit, Tier, DEFAULT_CONFIDENCE, DEFAULT_IMPORTANCE,
};
pub use link::{canonical_pair, LinkType, MemoryLink, HEBBIAN_DELTA};
pub use procedure::{
    derived_confidence, Procedure, ProcedureHit, ProcedureInput, ProcedureType,
    DEFAULT_PROCEDURE_TTL_DAYS,
};
