use std::collections::HashMap;
use std::collections::hash_map::Entry;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;

#[derive(Debug, Clone, Copy)]
pub struct ConsolidateOptions {
    /// Also merge groups linked by reviewer-confirmed candidates at or above
    /// `min_score`. Off by default: automatic consolidation only trusts exact
    /// normalized-name equality.
    pub use_confirmed: bool,
    pub min_score: f64,
}

impl Default for ConsolidateOptions {
    fn default() -> Self {
        Self {
            use_confirmed: false,
            min_score: 0.85,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationSummary {
    pub profiles_processed: usize,
    pub groups_created: usize,
    pub profiles_consolidated: usize,
    pub multi_profile_groups: usize,
}

/// Partitions all profiles into identity groups and writes the representative
/// id (smallest member `profile_id`) onto every member. Runs reset and
/// write-back inside one transaction, so readers never observe a half-cleared
/// profile set. Deterministic for an unchanged profile set.
///
/// Profiles with an empty normalized name are left unconsolidated unless a
/// confirmed candidate ties them to a group (and `use_confirmed` is set).
pub fn consolidate(
    conn: &mut Connection,
    opts: ConsolidateOptions,
) -> Result<ConsolidationSummary> {
    let tx = conn.transaction().context("begin consolidation transaction")?;

    tx.execute(
        "UPDATE player_profiles SET consolidated_player_id = NULL, is_consolidated = 0",
        [],
    )
    .context("reset consolidation fields")?;

    let profiles = {
        let mut stmt = tx
            .prepare("SELECT profile_id, name_normalized FROM player_profiles ORDER BY profile_id")
            .context("prepare consolidation profile query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .context("query profiles for consolidation")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode consolidation profile row")?);
        }
        out
    };
    let profiles_processed = profiles.len();

    let mut dsu = DisjointSet::new(profiles.len());
    let mut by_name: HashMap<&str, usize> = HashMap::new();
    for (idx, (_, name)) in profiles.iter().enumerate() {
        if name.is_empty() {
            continue;
        }
        match by_name.entry(name.as_str()) {
            Entry::Occupied(entry) => dsu.union(*entry.get(), idx),
            Entry::Vacant(entry) => {
                entry.insert(idx);
            }
        }
    }

    if opts.use_confirmed {
        let index = profiles
            .iter()
            .enumerate()
            .map(|(idx, (id, _))| (*id, idx))
            .collect::<HashMap<_, _>>();
        let mut stmt = tx
            .prepare(
                "SELECT profile_id_1, profile_id_2 FROM player_identity_candidates \
                 WHERE validation_status = 'confirmed' AND candidate_score >= ?1",
            )
            .context("prepare confirmed candidate query")?;
        let rows = stmt
            .query_map(params![opts.min_score], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .context("query confirmed candidates")?;
        for row in rows {
            let (id1, id2) = row.context("decode confirmed candidate row")?;
            if let (Some(&a), Some(&b)) = (index.get(&id1), index.get(&id2)) {
                dsu.union(a, b);
            }
        }
    }

    let mut component_size = vec![0usize; profiles.len()];
    for idx in 0..profiles.len() {
        component_size[dsu.find(idx)] += 1;
    }

    let mut groups: HashMap<usize, Vec<i64>> = HashMap::new();
    for (idx, (profile_id, name)) in profiles.iter().enumerate() {
        let root = dsu.find(idx);
        // Empty-name singletons stay out of the partition.
        if name.is_empty() && component_size[root] == 1 {
            continue;
        }
        groups.entry(root).or_default().push(*profile_id);
    }

    let mut profiles_consolidated = 0usize;
    let mut multi_profile_groups = 0usize;
    {
        let mut stmt = tx
            .prepare(
                "UPDATE player_profiles \
                 SET consolidated_player_id = ?1, is_consolidated = 1 \
                 WHERE profile_id = ?2",
            )
            .context("prepare consolidation write-back")?;
        for members in groups.values() {
            if members.len() > 1 {
                multi_profile_groups += 1;
            }
            let representative = members.iter().copied().min().unwrap_or_default();
            for profile_id in members {
                stmt.execute(params![representative, profile_id])
                    .context("write consolidated id")?;
                profiles_consolidated += 1;
            }
        }
    }

    let groups_created = groups.len();
    tx.commit().context("commit consolidation transaction")?;

    Ok(ConsolidationSummary {
        profiles_processed,
        groups_created,
        profiles_consolidated,
        multi_profile_groups,
    })
}

// Vec-backed union-find with path halving; unions toward the smaller index so
// roots stay deterministic regardless of input order.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            let (lo, hi) = if root_a < root_b {
                (root_a, root_b)
            } else {
                (root_b, root_a)
            };
            self.parent[hi] = lo;
        }
    }
}
