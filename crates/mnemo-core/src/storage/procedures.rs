//! Procedures Store
//!
//! Recipes mirror the fact store with their own FTS index over the task
//! pattern. Outcome recording is deduplicated per session, confidence is
//! derived from the counters, and ranked retrieval penalizes recent
//! failures and never-validated entries.

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};

use crate::memory::{
    derived_confidence, Procedure, ProcedureHit, ProcedureInput, ProcedureType, Scope,
    ScopeFilter, DEFAULT_PROCEDURE_TTL_DAYS,
};
use crate::search::{bm25_normalize, build_match_query, procedure_score, ProcedureSignals};
use uuid::Uuid;

use super::scope::scope_condition;
use super::store::{parse_or_default, Result, Store, StoreError};

/// Reinforcements needed before confidence auto-promotes
pub const DEFAULT_REINFORCE_PROMOTION_THRESHOLD: i64 = 3;

/// Successes needed before a procedure is skill-ready
pub const DEFAULT_SKILL_READY_SUCCESSES: i64 = 3;

fn ts_opt(seconds: Option<i64>) -> Option<chrono::DateTime<Utc>> {
    seconds.and_then(|s| chrono::DateTime::from_timestamp(s, 0))
}

fn row_to_procedure(row: &rusqlite::Row) -> rusqlite::Result<Procedure> {
    let procedure_type: String = row.get("procedure_type")?;
    let scope: String = row.get("scope")?;
    let quotes_raw: String = row.get("reinforced_quotes")?;
    let source_sessions_raw: String = row.get("source_sessions")?;
    let evidence_raw: String = row.get("evidence_sessions")?;
    let created_at: i64 = row.get("created_at")?;
    let updated_at: i64 = row.get("updated_at")?;

    Ok(Procedure {
        id: row.get("id")?,
        task_pattern: row.get("task_pattern")?,
        recipe_json: row.get("recipe_json")?,
        procedure_type: ProcedureType::parse_name(&procedure_type),
        success_count: row.get("success_count")?,
        failure_count: row.get("failure_count")?,
        last_validated: ts_opt(row.get("last_validated")?),
        last_failed: ts_opt(row.get("last_failed")?),
        confidence: row.get("confidence")?,
        ttl_days: row.get("ttl_days")?,
        promoted_to_skill: row.get::<_, i64>("promoted_to_skill")? != 0,
        skill_path: row.get("skill_path")?,
        promoted_at: ts_opt(row.get("promoted_at")?),
        auto_publish: row.get::<_, i64>("auto_publish")? != 0,
        notify: row.get::<_, i64>("notify")? != 0,
        reinforced_count: row.get("reinforced_count")?,
        last_reinforced_at: ts_opt(row.get("last_reinforced_at")?),
        reinforced_quotes: parse_or_default(&quotes_raw, "reinforced_quotes"),
        scope: Scope::parse_name(&scope),
        scope_target: row.get("scope_target")?,
        source_sessions: parse_or_default(&source_sessions_raw, "source_sessions"),
        evidence_sessions: parse_or_default(&evidence_raw, "evidence_sessions"),
        created_at: chrono::DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
        updated_at: chrono::DateTime::from_timestamp(updated_at, 0).unwrap_or_else(Utc::now),
    })
}

impl Store {
    /// Insert or refresh a recipe keyed by its exact task pattern. The
    /// confidence defaults to the counter-derived value unless the caller
    /// overrides it.
    pub fn upsert_procedure(&self, input: ProcedureInput) -> Result<Procedure> {
        if input.task_pattern.trim().is_empty() {
            return Err(StoreError::InvalidInput("task pattern cannot be empty".into()));
        }

        let now = Utc::now().timestamp();
        let confidence = input
            .confidence
            .unwrap_or_else(|| derived_confidence(input.success_count, input.failure_count));

        let existing: Option<String> = {
            let reader = self.lock_reader()?;
            reader
                .query_row(
                    "SELECT id FROM procedures WHERE task_pattern = ?1 LIMIT 1",
                    params![input.task_pattern],
                    |row| row.get(0),
                )
                .optional()?
        };

        let id = match existing {
            Some(id) => {
                let writer = self.lock_writer()?;
                writer.execute(
                    "UPDATE procedures SET
                         recipe_json = ?1, procedure_type = ?2,
                         success_count = ?3, failure_count = ?4,
                         confidence = ?5, ttl_days = ?6, updated_at = ?7
                     WHERE id = ?8",
                    params![
                        input.recipe_json,
                        input.procedure_type.as_str(),
                        input.success_count,
                        input.failure_count,
                        confidence.clamp(0.0, 1.0),
                        input.ttl_days.unwrap_or(DEFAULT_PROCEDURE_TTL_DAYS),
                        now,
                        id
                    ],
                )?;
                id
            }
            None => {
                let id = Uuid::new_v4().simple().to_string();
                let writer = self.lock_writer()?;
                writer.execute(
                    "INSERT INTO procedures (
                        id, task_pattern, recipe_json, procedure_type,
                        success_count, failure_count, confidence, ttl_days,
                        scope, scope_target, source_sessions, evidence_sessions,
                        created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, '[]', ?12, ?12)",
                    params![
                        id,
                        input.task_pattern,
                        input.recipe_json,
                        input.procedure_type.as_str(),
                        input.success_count,
                        input.failure_count,
                        confidence.clamp(0.0, 1.0),
                        input.ttl_days.unwrap_or(DEFAULT_PROCEDURE_TTL_DAYS),
                        input.scope.unwrap_or_default().as_str(),
                        input.scope_target,
                        serde_json::to_string(&input.source_sessions)
                            .unwrap_or_else(|_| "[]".into()),
                        now
                    ],
                )?;
                id
            }
        };

        self.get_procedure(&id)?
            .ok_or_else(|| StoreError::NotFound(id))
    }

    pub fn get_procedure(&self, id: &str) -> Result<Option<Procedure>> {
        let reader = self.lock_reader()?;
        let procedure = reader
            .query_row(
                "SELECT * FROM procedures WHERE id = ?1",
                params![id],
                row_to_procedure,
            )
            .optional()?;
        Ok(procedure)
    }

    /// Raw FTS candidates over the task pattern, with their BM25 rank
    pub fn search_procedures(&self, query: &str, limit: usize) -> Result<Vec<(Procedure, f64)>> {
        let Some(match_query) = build_match_query(query) else {
            return Ok(vec![]);
        };

        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(
            "SELECT p.*, bm25(procedures_fts) AS rank
             FROM procedures p JOIN procedures_fts ON p.id = procedures_fts.id
             WHERE procedures_fts MATCH ?1
             ORDER BY rank LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![match_query, limit as i64], |row| {
                let procedure = row_to_procedure(row)?;
                let rank: f64 = row.get("rank")?;
                Ok((procedure, rank))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Ranked retrieval. Sorted by score descending; ties break positive
    /// before negative, then most recently validated first.
    pub fn search_procedures_ranked(
        &self,
        query: &str,
        limit: usize,
        reinforcement_boost: f64,
        scope: &ScopeFilter,
    ) -> Result<Vec<ProcedureHit>> {
        let Some(match_query) = build_match_query(query) else {
            return Ok(vec![]);
        };

        let mut sql = String::from(
            "SELECT p.*, bm25(procedures_fts) AS rank
             FROM procedures p JOIN procedures_fts ON p.id = procedures_fts.id
             WHERE procedures_fts MATCH ?",
        );
        let mut values: Vec<Value> = vec![Value::Text(match_query)];
        let (scope_sql, scope_values) = scope_condition(scope, "p");
        sql.push_str(&scope_sql);
        values.extend(scope_values);
        sql.push_str(" ORDER BY rank LIMIT ?");
        values.push(Value::Integer((limit * 3) as i64));

        let candidates: Vec<(Procedure, f64)> = {
            let reader = self.lock_reader()?;
            let mut stmt = reader.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), |row| {
                    let procedure = row_to_procedure(row)?;
                    let rank: f64 = row.get("rank")?;
                    Ok((procedure, rank))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        if candidates.is_empty() {
            return Ok(vec![]);
        }

        let now = Utc::now();
        let min_rank = candidates.iter().map(|(_, r)| *r).fold(f64::INFINITY, f64::min);
        let max_rank = candidates
            .iter()
            .map(|(_, r)| *r)
            .fold(f64::NEG_INFINITY, f64::max);

        let mut hits: Vec<ProcedureHit> = candidates
            .into_iter()
            .map(|(procedure, rank)| {
                let fts_norm = bm25_normalize(rank, min_rank, max_rank);
                let signals = ProcedureSignals {
                    fts_rank: rank,
                    confidence: procedure.confidence,
                    success_count: procedure.success_count,
                    failure_count: procedure.failure_count,
                    last_validated: procedure.last_validated,
                    last_failed: procedure.last_failed,
                    reinforced_count: procedure.reinforced_count,
                    created_at: procedure.created_at,
                };
                let score = procedure_score(fts_norm, &signals, now, reinforcement_boost);
                ProcedureHit { procedure, score }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    // positive outranks negative on ties
                    let type_order = |p: &Procedure| match p.procedure_type {
                        ProcedureType::Positive => 0,
                        ProcedureType::Negative => 1,
                    };
                    type_order(&a.procedure).cmp(&type_order(&b.procedure))
                })
                .then_with(|| b.procedure.last_validated.cmp(&a.procedure.last_validated))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Negative recipes matching a task, for do-not-do warnings
    pub fn get_negative_procedures_matching(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Procedure>> {
        let Some(match_query) = build_match_query(query) else {
            return Ok(vec![]);
        };

        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(
            "SELECT p.*, bm25(procedures_fts) AS rank
             FROM procedures p JOIN procedures_fts ON p.id = procedures_fts.id
             WHERE procedures_fts MATCH ?1 AND p.procedure_type = 'negative'
             ORDER BY rank LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![match_query, limit as i64], |row| row_to_procedure(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Record a successful application. A session id already counted is a
    /// no-op; otherwise the counter bumps, confidence re-derives, and the
    /// type flips positive.
    pub fn record_procedure_success(
        &self,
        id: &str,
        recipe_json: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<Procedure> {
        self.record_outcome(id, recipe_json, session_id, true)
    }

    /// Record a failed application; mirror image of success recording
    pub fn record_procedure_failure(
        &self,
        id: &str,
        recipe_json: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<Procedure> {
        self.record_outcome(id, recipe_json, session_id, false)
    }

    fn record_outcome(
        &self,
        id: &str,
        recipe_json: Option<&str>,
        session_id: Option<&str>,
        success: bool,
    ) -> Result<Procedure> {
        let procedure = self
            .get_procedure(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut evidence = procedure.evidence_sessions.clone();
        if let Some(session) = session_id {
            if evidence.iter().any(|s| s == session) {
                tracing::debug!("Session {} already counted for {}", session, id);
                return Ok(procedure);
            }
            evidence.push(session.to_string());
        }

        let (success_count, failure_count) = if success {
            (procedure.success_count + 1, procedure.failure_count)
        } else {
            (procedure.success_count, procedure.failure_count + 1)
        };
        let confidence = derived_confidence(success_count, failure_count);
        let now = Utc::now().timestamp();

        {
            let writer = self.lock_writer()?;
            if success {
                writer.execute(
                    "UPDATE procedures SET
                         success_count = ?1, failure_count = ?2, confidence = ?3,
                         last_validated = ?4, procedure_type = 'positive',
                         recipe_json = COALESCE(?5, recipe_json),
                         evidence_sessions = ?6, updated_at = ?4
                     WHERE id = ?7",
                    params![
                        success_count,
                        failure_count,
                        confidence,
                        now,
                        recipe_json,
                        serde_json::to_string(&evidence).unwrap_or_else(|_| "[]".into()),
                        id
                    ],
                )?;
            } else {
                writer.execute(
                    "UPDATE procedures SET
                         success_count = ?1, failure_count = ?2, confidence = ?3,
                         last_failed = ?4, procedure_type = 'negative',
                         recipe_json = COALESCE(?5, recipe_json),
                         evidence_sessions = ?6, updated_at = ?4
                     WHERE id = ?7",
                    params![
                        success_count,
                        failure_count,
                        confidence,
                        now,
                        recipe_json,
                        serde_json::to_string(&evidence).unwrap_or_else(|_| "[]".into()),
                        id
                    ],
                )?;
            }
        }

        self.get_procedure(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Praise a recipe. Reaching the threshold with sub-0.8 confidence
    /// auto-promotes confidence to 0.8 and stamps the promotion time.
    pub fn reinforce_procedure(&self, id: &str, quote: &str, threshold: i64) -> Result<Procedure> {
        let procedure = self
            .get_procedure(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut quotes = procedure.reinforced_quotes;
        quotes.push(quote.chars().take(200).collect());
        let start = quotes.len().saturating_sub(10);
        let quotes = &quotes[start..];

        let new_count = procedure.reinforced_count + 1;
        let now = Utc::now().timestamp();
        let auto_promote = new_count >= threshold && procedure.confidence < 0.8;

        {
            let writer = self.lock_writer()?;
            writer.execute(
                "UPDATE procedures SET
                     reinforced_count = ?1, last_reinforced_at = ?2, reinforced_quotes = ?3,
                     confidence = CASE WHEN ?4 THEN MAX(confidence, 0.8) ELSE confidence END,
                     promoted_at = CASE WHEN ?4 THEN ?2 ELSE promoted_at END,
                     updated_at = ?2
                 WHERE id = ?5",
                params![
                    new_count,
                    now,
                    serde_json::to_string(quotes).unwrap_or_else(|_| "[]".into()),
                    auto_promote,
                    id
                ],
            )?;
        }

        self.get_procedure(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Record that a recipe was distilled into a standalone skill.
    /// `auto_publish` and `notify` are carried for downstream tooling only.
    pub fn mark_procedure_promoted(
        &self,
        id: &str,
        skill_path: &str,
        auto_publish: bool,
        notify: bool,
    ) -> Result<Procedure> {
        {
            let writer = self.lock_writer()?;
            let changed = writer.execute(
                "UPDATE procedures SET
                     promoted_to_skill = 1, skill_path = ?1, promoted_at = ?2,
                     auto_publish = ?3, notify = ?4, updated_at = ?2
                 WHERE id = ?5",
                params![skill_path, Utc::now().timestamp(), auto_publish, notify, id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id.to_string()));
            }
        }
        self.get_procedure(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Recipes whose last validation is past their TTL (or that were never
    /// validated and have aged past it)
    pub fn get_stale_procedures(&self) -> Result<Vec<Procedure>> {
        let now = Utc::now().timestamp();
        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM procedures
             WHERE COALESCE(last_validated, created_at) < ?1 - ttl_days * 86400
             ORDER BY COALESCE(last_validated, created_at) ASC",
        )?;
        let rows = stmt
            .query_map(params![now], row_to_procedure)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Validated, confident, not-yet-promoted recipes ready to become skills
    pub fn get_ready_for_skill(&self, min_successes: i64) -> Result<Vec<Procedure>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM procedures
             WHERE success_count >= ?1
               AND confidence >= 0.8
               AND promoted_to_skill = 0
               AND procedure_type = 'positive'
             ORDER BY success_count DESC",
        )?;
        let rows = stmt
            .query_map(params![min_successes], row_to_procedure)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete a recipe; returns true when a row was removed
    pub fn delete_procedure(&self, id: &str) -> Result<bool> {
        let writer = self.lock_writer()?;
        let deleted = writer.execute("DELETE FROM procedures WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}
