//! Link Graph
//!
//! Typed, weighted edges between facts. Symmetric `RELATED_TO` edges are
//! canonicalized by lexicographic id order so each pair stores at most one;
//! co-recall strengthens them Hebbian-style. Directional types may coexist
//! with each other and with the symmetric edge.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::collections::{HashSet, VecDeque};

use crate::memory::{canonical_pair, LinkType, MemoryLink, HEBBIAN_DELTA};

use super::store::{Result, Store, StoreError};

fn row_to_link(row: &rusqlite::Row) -> rusqlite::Result<MemoryLink> {
    let link_type: String = row.get("link_type")?;
    let created_at: i64 = row.get("created_at")?;
    let last_strengthened: i64 = row.get("last_strengthened")?;
    Ok(MemoryLink {
        from_id: row.get("from_id")?,
        to_id: row.get("to_id")?,
        link_type: LinkType::parse_name(&link_type).unwrap_or(LinkType::RelatedTo),
        strength: row.get("strength")?,
        created_at: chrono::DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
        last_strengthened: chrono::DateTime::from_timestamp(last_strengthened, 0)
            .unwrap_or_else(Utc::now),
    })
}

impl Store {
    /// Create (or bump) a typed edge. Symmetric types are canonicalized
    /// before writing; creating an existing edge raises its strength by the
    /// Hebbian delta, saturating at 1.
    pub fn create_link(
        &self,
        from_id: &str,
        to_id: &str,
        link_type: LinkType,
        strength: f64,
    ) -> Result<MemoryLink> {
        if from_id == to_id {
            return Err(StoreError::InvalidInput("self-links are not allowed".into()));
        }

        let (from_id, to_id) = if link_type.is_symmetric() {
            canonical_pair(from_id, to_id)
        } else {
            (from_id, to_id)
        };

        let now = Utc::now().timestamp();
        {
            let writer = self.lock_writer()?;
            writer.execute(
                "INSERT INTO memory_links (from_id, to_id, link_type, strength, created_at, last_strengthened)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(from_id, to_id, link_type) DO UPDATE SET
                     strength = MIN(1.0, memory_links.strength + ?6),
                     last_strengthened = ?5",
                params![
                    from_id,
                    to_id,
                    link_type.as_str(),
                    strength.clamp(0.0, 1.0),
                    now,
                    HEBBIAN_DELTA
                ],
            )?;
        }

        self.get_link(from_id, to_id, link_type)?
            .ok_or_else(|| StoreError::NotFound(format!("{} -> {}", from_id, to_id)))
    }

    /// Strengthen the `RELATED_TO` edge for a co-recalled pair, creating it
    /// at the Hebbian delta on first co-occurrence.
    pub fn strengthen_related(&self, a: &str, b: &str) -> Result<()> {
        if a == b {
            return Ok(());
        }
        let (from_id, to_id) = canonical_pair(a, b);
        let now = Utc::now().timestamp();

        let writer = self.lock_writer()?;
        writer.execute(
            "INSERT INTO memory_links (from_id, to_id, link_type, strength, created_at, last_strengthened)
             VALUES (?1, ?2, 'RELATED_TO', ?3, ?4, ?4)
             ON CONFLICT(from_id, to_id, link_type) DO UPDATE SET
                 strength = MIN(1.0, memory_links.strength + ?3),
                 last_strengthened = ?4",
            params![from_id, to_id, HEBBIAN_DELTA, now],
        )?;
        Ok(())
    }

    pub fn get_link(
        &self,
        from_id: &str,
        to_id: &str,
        link_type: LinkType,
    ) -> Result<Option<MemoryLink>> {
        let reader = self.lock_reader()?;
        let link = reader
            .query_row(
                "SELECT * FROM memory_links
                 WHERE from_id = ?1 AND to_id = ?2 AND link_type = ?3",
                params![from_id, to_id, link_type.as_str()],
                row_to_link,
            )
            .optional()?;
        Ok(link)
    }

    /// Outgoing edges of a fact
    pub fn get_links_from(&self, fact_id: &str) -> Result<Vec<MemoryLink>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM memory_links WHERE from_id = ?1 ORDER BY strength DESC",
        )?;
        let links = stmt
            .query_map(params![fact_id], row_to_link)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(links)
    }

    /// Incoming edges of a fact
    pub fn get_links_to(&self, fact_id: &str) -> Result<Vec<MemoryLink>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM memory_links WHERE to_id = ?1 ORDER BY strength DESC",
        )?;
        let links = stmt
            .query_map(params![fact_id], row_to_link)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(links)
    }

    /// Symmetric BFS over in- and out-edges up to `max_depth` hops.
    /// Returns the closed set including the seeds.
    pub fn get_connected_fact_ids(
        &self,
        seed_ids: &[String],
        max_depth: usize,
    ) -> Result<HashSet<String>> {
        let mut visited: HashSet<String> = seed_ids.iter().cloned().collect();
        let mut frontier: VecDeque<(String, usize)> =
            seed_ids.iter().map(|id| (id.clone(), 0)).collect();

        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(
            "SELECT to_id AS other FROM memory_links WHERE from_id = ?1
             UNION
             SELECT from_id AS other FROM memory_links WHERE to_id = ?1",
        )?;

        while let Some((id, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let neighbors: Vec<String> = stmt
                .query_map(params![id], |row| row.get(0))?
                .filter_map(|r| r.ok())
                .collect();
            for neighbor in neighbors {
                if visited.insert(neighbor.clone()) {
                    frontier.push_back((neighbor, depth + 1));
                }
            }
        }
        Ok(visited)
    }

    /// Multiply every edge strength by `factor`; returns the edge count
    pub fn decay_links(&self, factor: f64) -> Result<usize> {
        let writer = self.lock_writer()?;
        let changed = writer.execute(
            "UPDATE memory_links SET strength = strength * ?1",
            params![factor.clamp(0.0, 1.0)],
        )?;
        Ok(changed)
    }

    /// Drop edges below `min_strength`; returns the removed count
    pub fn prune_weak_links(&self, min_strength: f64) -> Result<usize> {
        let writer = self.lock_writer()?;
        let removed = writer.execute(
            "DELETE FROM memory_links WHERE strength < ?1",
            params![min_strength],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FactInput;
    use crate::storage::store::StoreConfig;
    use tempfile::tempdir;

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("facts.db"), StoreConfig::default()).unwrap();
        (dir, store)
    }

    fn seed(store: &Store, text: &str) -> String {
        store.store(FactInput::new(text)).unwrap().id
    }

    #[test]
    fn test_create_and_fetch_link() {
        let (_dir, store) = test_store();
        let a = seed(&store, "cause");
        let b = seed(&store, "effect");

        let link = store.create_link(&b, &a, LinkType::CausedBy, 0.8).unwrap();
        assert_eq!(link.from_id, b);
        assert_eq!(link.strength, 0.8);

        assert_eq!(store.get_links_from(&b).unwrap().len(), 1);
        assert_eq!(store.get_links_to(&a).unwrap().len(), 1);
        assert!(store.get_links_from(&a).unwrap().is_empty());
    }

    #[test]
    fn test_self_link_rejected() {
        let (_dir, store) = test_store();
        let a = seed(&store, "narcissus");
        assert!(store.create_link(&a, &a, LinkType::RelatedTo, 0.5).is_err());
    }

    #[test]
    fn test_related_to_canonical_direction() {
        let (_dir, store) = test_store();
        let a = seed(&store, "first");
        let b = seed(&store, "second");
        let (lo, hi) = canonical_pair(&a, &b);

        // Both argument orders land on the same stored edge
        store.strengthen_related(&a, &b).unwrap();
        store.strengthen_related(&b, &a).unwrap();

        let link = store.get_link(lo, hi, LinkType::RelatedTo).unwrap().unwrap();
        assert!((link.strength - 2.0 * HEBBIAN_DELTA).abs() < 1e-9);

        let reversed = store.get_link(hi, lo, LinkType::RelatedTo).unwrap();
        assert!(reversed.is_none());
    }

    #[test]
    fn test_hebbian_saturates_at_one() {
        let (_dir, store) = test_store();
        let a = seed(&store, "left");
        let b = seed(&store, "right");

        for _ in 0..15 {
            store.strengthen_related(&a, &b).unwrap();
        }
        let (lo, hi) = canonical_pair(&a, &b);
        let link = store.get_link(lo, hi, LinkType::RelatedTo).unwrap().unwrap();
        assert!((link.strength - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_directional_types_coexist() {
        let (_dir, store) = test_store();
        let a = seed(&store, "module");
        let b = seed(&store, "system");

        store.create_link(&a, &b, LinkType::PartOf, 0.5).unwrap();
        store.create_link(&a, &b, LinkType::DependsOn, 0.5).unwrap();
        store.strengthen_related(&a, &b).unwrap();

        let from_a = store.get_links_from(&a).unwrap();
        let types: Vec<LinkType> = from_a.iter().map(|l| l.link_type).collect();
        assert!(types.contains(&LinkType::PartOf));
        assert!(types.contains(&LinkType::DependsOn));
    }

    #[test]
    fn test_bfs_expansion() {
        let (_dir, store) = test_store();
        let a = seed(&store, "a");
        let b = seed(&store, "b");
        let c = seed(&store, "c");
        let d = seed(&store, "d");

        store.create_link(&a, &b, LinkType::DependsOn, 0.5).unwrap();
        store.create_link(&c, &b, LinkType::DependsOn, 0.5).unwrap();
        store.create_link(&c, &d, LinkType::PartOf, 0.5).unwrap();

        // Depth 1 from a: a itself plus b (in/out symmetric)
        let one_hop = store
            .get_connected_fact_ids(&[a.clone()], 1)
            .unwrap();
        assert_eq!(one_hop.len(), 2);
        assert!(one_hop.contains(&b));

        // Depth 2 reaches c through b's incoming edge
        let two_hops = store
            .get_connected_fact_ids(&[a.clone()], 2)
            .unwrap();
        assert!(two_hops.contains(&c));
        assert!(!two_hops.contains(&d));

        // Depth 3 closes over the whole chain
        let three_hops = store.get_connected_fact_ids(&[a], 3).unwrap();
        assert_eq!(three_hops.len(), 4);
    }

    #[test]
    fn test_links_cascade_with_fact() {
        let (_dir, store) = test_store();
        let a = seed(&store, "doomed");
        let b = seed(&store, "survivor");
        store.create_link(&a, &b, LinkType::RelatedTo, 0.5).unwrap();

        store.delete(&a).unwrap();
        assert!(store.get_links_to(&b).unwrap().is_empty());
        assert!(store.get_links_from(&b).unwrap().is_empty());
    }

    #[test]
    fn test_decay_and_prune_links() {
        let (_dir, store) = test_store();
        let a = seed(&store, "a");
        let b = seed(&store, "b");
        let c = seed(&store, "c");
        store.create_link(&a, &b, LinkType::DependsOn, 0.9).unwrap();
        store.create_link(&a, &c, LinkType::DependsOn, 0.2).unwrap();

        store.decay_links(0.5).unwrap();
        let pruned = store.prune_weak_links(0.2).unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(store.get_links_from(&a).unwrap().len(), 1);
    }
}
