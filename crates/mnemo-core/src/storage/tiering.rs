//! Tiering & Compaction
//!
//! Hot facts are candidates for session context; warm is the searchable
//! default; cold is archival. Compaction migrates rows between tiers under
//! a token budget so the hot set stays small enough to inject.

use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::memory::Fact;
use crate::tagger::tag_needle;
use crate::telemetry::estimate_stored_tokens;

use super::store::{row_to_fact, Result, Store};

// ============================================================================
// OPTIONS & REPORT
// ============================================================================

/// Knobs for one compaction run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionOptions {
    /// Preferences untouched for this long leave the hot tier
    pub inactive_preference_days: i64,
    /// Token ceiling for blocker promotion
    pub hot_max_tokens: usize,
    /// Row ceiling for blocker promotion
    pub hot_max_facts: usize,
}

impl Default for CompactionOptions {
    fn default() -> Self {
        Self {
            inactive_preference_days: 14,
            hot_max_tokens: 2_000,
            hot_max_facts: 20,
        }
    }
}

/// What one compaction run did
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionReport {
    pub archived_to_cold: usize,
    pub preferences_demoted: usize,
    pub blockers_promoted: usize,
    pub hot_demoted: usize,
}

// ============================================================================
// COMPACTION
// ============================================================================

impl Store {
    /// Run the compaction passes in order:
    /// 1. decisions and task-tagged facts move to cold
    /// 2. inactive preferences leave hot
    /// 3. blockers are promoted to hot under the row/token budget
    /// 4. hot facts that are not tagged blockers fall back to warm
    pub fn run_compaction(&self, opts: &CompactionOptions) -> Result<CompactionReport> {
        let mut report = CompactionReport::default();
        let now = chrono::Utc::now();

        {
            let writer = self.lock_writer()?;
            report.archived_to_cold = writer.execute(
                "UPDATE facts SET tier = 'cold'
                 WHERE tier != 'cold'
                   AND (tags LIKE ?1 OR tags LIKE ?2)",
                params![tag_needle("decision"), tag_needle("task")],
            )?;

            let cutoff = (now - chrono::Duration::days(opts.inactive_preference_days)).timestamp();
            report.preferences_demoted = writer.execute(
                "UPDATE facts SET tier = 'warm'
                 WHERE tier = 'hot'
                   AND tags LIKE ?1
                   AND COALESCE(last_accessed, created_at) < ?2",
                params![tag_needle("preference"), cutoff],
            )?;
        }

        // Blocker promotion packs under a rolling token budget
        let blockers: Vec<Fact> = {
            let reader = self.lock_reader()?;
            let mut stmt = reader.prepare(
                "SELECT * FROM facts
                 WHERE tags LIKE ?1
                   AND superseded_at IS NULL
                   AND (expires_at IS NULL OR expires_at > ?2)
                 ORDER BY COALESCE(last_accessed, created_at) DESC",
            )?;
            let rows = stmt
                .query_map(params![tag_needle("blocker"), now.timestamp()], row_to_fact)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut promoted_ids = Vec::new();
        let mut spent_tokens = 0usize;
        for fact in &blockers {
            if promoted_ids.len() >= opts.hot_max_facts {
                break;
            }
            let tokens = estimate_stored_tokens(fact.budget_text());
            if spent_tokens + tokens > opts.hot_max_tokens {
                continue;
            }
            spent_tokens += tokens;
            promoted_ids.push(fact.id.clone());
        }

        {
            let writer = self.lock_writer()?;
            for id in &promoted_ids {
                report.blockers_promoted += writer.execute(
                    "UPDATE facts SET tier = 'hot' WHERE id = ?1 AND tier != 'hot'",
                    params![id],
                )?;
            }

            report.hot_demoted = writer.execute(
                "UPDATE facts SET tier = 'warm'
                 WHERE tier = 'hot' AND tags NOT LIKE ?1",
                params![tag_needle("blocker")],
            )?;
        }

        Ok(report)
    }

    /// Hot-tier facts packed into `max_tokens`, most recently accessed
    /// first. Oversized facts are skipped, not truncated.
    pub fn get_hot_facts(&self, max_tokens: usize) -> Result<Vec<Fact>> {
        let candidates: Vec<Fact> = {
            let reader = self.lock_reader()?;
            let mut stmt = reader.prepare(
                "SELECT * FROM facts
                 WHERE tier = 'hot'
                   AND superseded_at IS NULL
                   AND (expires_at IS NULL OR expires_at > ?1)
                 ORDER BY COALESCE(last_accessed, created_at) DESC",
            )?;
            let rows = stmt
                .query_map(params![chrono::Utc::now().timestamp()], row_to_fact)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut packed = Vec::new();
        let mut spent = 0usize;
        for fact in candidates {
            let tokens = estimate_stored_tokens(fact.budget_text());
            if spent + tokens > max_tokens {
                continue;
            }
            spent += tokens;
            packed.push(fact);
        }
        Ok(packed)
    }
}
