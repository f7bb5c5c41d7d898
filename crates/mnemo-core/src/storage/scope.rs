//! Scope Isolation
//!
//! Compiles a [`ScopeFilter`] into a reusable SQL fragment and provides the
//! scope maintenance operations. Identity values are always bound as
//! parameters, never interpolated into SQL text.

use rusqlite::params;
use rusqlite::types::Value;

use crate::memory::{Scope, ScopeFilter};

use super::store::{Result, Store, StoreError};

/// Build the scope restriction clause for rows aliased as `alias`. Absent
/// identity fields contribute no branches, so an empty filter admits only
/// global rows.
pub(crate) fn scope_condition(filter: &ScopeFilter, alias: &str) -> (String, Vec<Value>) {
    let mut branches = vec![format!("{}.scope = 'global'", alias)];
    let mut values = Vec::new();

    if let Some(user_id) = &filter.user_id {
        branches.push(format!(
            "({a}.scope = 'user' AND {a}.scope_target = ?)",
            a = alias
        ));
        values.push(Value::Text(user_id.clone()));
    }
    if let Some(agent_id) = &filter.agent_id {
        branches.push(format!(
            "({a}.scope = 'agent' AND {a}.scope_target = ?)",
            a = alias
        ));
        values.push(Value::Text(agent_id.clone()));
    }
    if let Some(session_id) = &filter.session_id {
        branches.push(format!(
            "({a}.scope = 'session' AND {a}.scope_target = ?)",
            a = alias
        ));
        values.push(Value::Text(session_id.clone()));
    }

    (format!(" AND ({})", branches.join(" OR ")), values)
}

impl Store {
    /// Delete every session-scoped row belonging to `session_id`; returns
    /// the number of facts removed (procedures are swept too).
    pub fn prune_session_scope(&self, session_id: &str) -> Result<usize> {
        let writer = self.lock_writer()?;
        let facts = writer.execute(
            "DELETE FROM facts WHERE scope = 'session' AND scope_target = ?1",
            params![session_id],
        )?;
        writer.execute(
            "DELETE FROM procedures WHERE scope = 'session' AND scope_target = ?1",
            params![session_id],
        )?;
        Ok(facts)
    }

    /// Re-scope a fact, e.g. promoting a session discovery to user scope
    pub fn promote_scope(
        &self,
        fact_id: &str,
        new_scope: Scope,
        new_target: Option<&str>,
    ) -> Result<()> {
        match (new_scope, new_target) {
            (Scope::Global, Some(_)) => {
                return Err(StoreError::InvalidScope(
                    "global scope takes no target".into(),
                ));
            }
            (Scope::Global, None) => {}
            (_, Some(t)) if !t.is_empty() => {}
            (scope, _) => {
                return Err(StoreError::InvalidScope(format!(
                    "{} scope requires a target",
                    scope
                )));
            }
        }

        let writer = self.lock_writer()?;
        let changed = writer.execute(
            "UPDATE facts SET scope = ?1, scope_target = ?2 WHERE id = ?3",
            params![new_scope.as_str(), new_target, fact_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(fact_id.to_string()));
        }
        Ok(())
    }

    /// Distinct (scope, scope_target) pairs present in the store
    pub fn unique_scopes(&self) -> Result<Vec<(Scope, Option<String>)>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(
            "SELECT DISTINCT scope, scope_target FROM facts ORDER BY scope, scope_target",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let scope: String = row.get(0)?;
                Ok((Scope::parse_name(&scope), row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
