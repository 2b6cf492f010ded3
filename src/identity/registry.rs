// The authoritative mapping between external identifier namespaces and
// internal player keys.
//
// The registry is rebuilt wholesale from a crosswalk snapshot (replace, not
// merge) so stale partial loads can never drift into the live mapping. Reads
// are `&self` and reload is `&mut self`: the borrow checker enforces the
// stop-the-world replace the concurrency model requires.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::{debug, warn};

use crate::identity::names;
use crate::record::{Namespace, PlayerKey};

// ---------------------------------------------------------------------------
// Crosswalk input
// ---------------------------------------------------------------------------

/// One row of the ID-crosswalk table: a person key plus that person's
/// identifier in each namespace that knows them. Namespaces the snapshot has
/// not scraped are simply absent.
#[derive(Debug, Clone)]
pub struct CrosswalkRow {
    pub key: PlayerKey,
    pub name_last: String,
    pub name_first: String,
    pub ids: BTreeMap<Namespace, String>,
}

// ---------------------------------------------------------------------------
// Errors and load reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Too many crosswalk rows were rejected; the load is aborted and the
    /// previous mapping remains in place. Proceeding with a registry this
    /// damaged would fragment joins downstream.
    #[error(
        "crosswalk integrity failure: {rejected} of {total} rows rejected \
         (max fraction {max_fraction})"
    )]
    IntegrityThreshold {
        rejected: usize,
        total: usize,
        max_fraction: f64,
    },
}

/// Why a single crosswalk row was rejected during load.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectedRowReason {
    /// The row claims a (namespace, id) pair that an earlier row already
    /// assigned to a different internal key.
    AmbiguousIdentity {
        namespace: Namespace,
        id: String,
        existing_key: PlayerKey,
    },
}

/// A rejected crosswalk row with enough context to diagnose it without
/// re-running the load.
#[derive(Debug, Clone)]
pub struct CrosswalkRejection {
    pub row_index: usize,
    pub key: PlayerKey,
    pub reason: RejectedRowReason,
}

/// Outcome of a successful (possibly partial) crosswalk load.
#[derive(Debug)]
pub struct LoadReport {
    pub loaded: usize,
    pub rejected: Vec<CrosswalkRejection>,
}

// ---------------------------------------------------------------------------
// Name search results
// ---------------------------------------------------------------------------

/// A candidate identity returned by name search. `score` is 1.0 for exact
/// matches and the Jaro-Winkler similarity for fuzzy ones.
#[derive(Debug, Clone)]
pub struct NameMatch {
    pub key: PlayerKey,
    pub name_last: String,
    pub name_first: String,
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Bidirectional identity mapping: (namespace, id) -> key, plus
/// key -> {namespace: id} with the first-seen id per namespace as canonical.
#[derive(Debug)]
pub struct IdentityRegistry {
    forward: HashMap<(Namespace, String), PlayerKey>,
    reverse: HashMap<PlayerKey, BTreeMap<Namespace, String>>,
    player_names: Vec<(PlayerKey, String, String)>,
    fuzzy_threshold: f64,
    next_anon: u64,
}

impl IdentityRegistry {
    /// An empty registry with the default fuzzy-match threshold.
    pub fn new() -> Self {
        Self::with_fuzzy_threshold(0.85)
    }

    /// An empty registry that reports fuzzy name matches at or above
    /// `threshold` (Jaro-Winkler, 0.0 to 1.0).
    pub fn with_fuzzy_threshold(threshold: f64) -> Self {
        IdentityRegistry {
            forward: HashMap::new(),
            reverse: HashMap::new(),
            player_names: Vec::new(),
            fuzzy_threshold: threshold,
            next_anon: 0,
        }
    }

    /// Replace the current mapping set wholesale from a crosswalk snapshot.
    ///
    /// A row whose (namespace, id) pair is already claimed by a different
    /// key is rejected individually: none of its pairs are applied, the
    /// rejection is logged and reported, and the load continues. If the
    /// rejected fraction exceeds `max_reject_fraction` the whole load fails
    /// and the previous mapping is left untouched (the new maps are built on
    /// the side and swapped in only on success).
    ///
    /// Re-stating a pair with the same key is idempotent. A second id in the
    /// same namespace for the same key (a mid-career ID change) is accepted:
    /// both ids resolve to the key, and the reverse map keeps the first-seen
    /// id as canonical.
    pub fn load(
        &mut self,
        rows: &[CrosswalkRow],
        max_reject_fraction: f64,
    ) -> Result<LoadReport, RegistryError> {
        let mut forward: HashMap<(Namespace, String), PlayerKey> = HashMap::new();
        let mut reverse: HashMap<PlayerKey, BTreeMap<Namespace, String>> = HashMap::new();
        let mut player_names: Vec<(PlayerKey, String, String)> = Vec::new();
        let mut rejected = Vec::new();

        for (row_index, row) in rows.iter().enumerate() {
            // Reject the whole row on the first conflicting pair so a bad
            // row can never half-apply.
            let conflict = row.ids.iter().find_map(|(ns, id)| {
                match forward.get(&(*ns, id.clone())) {
                    Some(existing) if *existing != row.key => Some(RejectedRowReason::AmbiguousIdentity {
                        namespace: *ns,
                        id: id.clone(),
                        existing_key: existing.clone(),
                    }),
                    _ => None,
                }
            });

            if let Some(reason) = conflict {
                warn!(
                    row_index,
                    key = %row.key,
                    ?reason,
                    "rejecting ambiguous crosswalk row"
                );
                rejected.push(CrosswalkRejection {
                    row_index,
                    key: row.key.clone(),
                    reason,
                });
                continue;
            }

            for (ns, id) in &row.ids {
                forward.insert((*ns, id.clone()), row.key.clone());
                // First-seen id per namespace stays canonical.
                reverse
                    .entry(row.key.clone())
                    .or_default()
                    .entry(*ns)
                    .or_insert_with(|| id.clone());
            }
            if !reverse.contains_key(&row.key) {
                reverse.insert(row.key.clone(), BTreeMap::new());
            }
            player_names.push((row.key.clone(), row.name_last.clone(), row.name_first.clone()));
        }

        let total = rows.len();
        if total > 0 {
            let fraction = rejected.len() as f64 / total as f64;
            if fraction > max_reject_fraction {
                return Err(RegistryError::IntegrityThreshold {
                    rejected: rejected.len(),
                    total,
                    max_fraction: max_reject_fraction,
                });
            }
        }

        let loaded = total - rejected.len();
        debug!(loaded, rejected = rejected.len(), "crosswalk load complete");

        self.forward = forward;
        self.reverse = reverse;
        self.player_names = player_names;
        // Wholesale replacement starts anon minting over, so the keys a
        // given snapshot produces are deterministic.
        self.next_anon = 0;
        Ok(LoadReport { loaded, rejected })
    }

    /// Pure lookup: the internal key for an external identifier, if known.
    pub fn resolve(&self, namespace: Namespace, external_id: &str) -> Option<&PlayerKey> {
        self.forward.get(&(namespace, external_id.to_string()))
    }

    /// Resolve an identifier, minting a fresh `anon-N` key if it is unknown.
    ///
    /// Only for initial registry construction. Joiners hold `&IdentityRegistry`
    /// and therefore cannot reach this: an unresolved id during a join stays
    /// unresolved rather than fragmenting a real player into duplicates.
    pub fn resolve_or_create(&mut self, namespace: Namespace, external_id: &str) -> PlayerKey {
        if let Some(key) = self.forward.get(&(namespace, external_id.to_string())) {
            return key.clone();
        }
        let key = PlayerKey::new(format!("anon-{}", self.next_anon));
        self.next_anon += 1;
        self.forward
            .insert((namespace, external_id.to_string()), key.clone());
        self.reverse
            .entry(key.clone())
            .or_default()
            .insert(namespace, external_id.to_string());
        key
    }

    /// All known external identifiers for an internal key (canonical id per
    /// namespace).
    pub fn ids_for(&self, key: &PlayerKey) -> Option<&BTreeMap<Namespace, String>> {
        self.reverse.get(key)
    }

    /// Number of distinct internal keys in the registry.
    pub fn player_count(&self) -> usize {
        self.reverse.len()
    }

    /// Search registered players by name.
    ///
    /// Exact mode (`fuzzy = false`) requires folded case-insensitive equality
    /// on both fields when `first` is given, else last-name-only equality.
    /// All matches are returned: distinct players can share a name and callers
    /// must disambiguate, so collisions are never silently deduplicated.
    ///
    /// Fuzzy mode scores every player's folded full name with Jaro-Winkler
    /// against the query, keeps scores at or above the registry threshold,
    /// and sorts descending by score with a stable key tiebreak.
    pub fn search_by_name(&self, last: &str, first: Option<&str>, fuzzy: bool) -> Vec<NameMatch> {
        if fuzzy {
            return self.search_fuzzy(last, first);
        }

        let want_last = names::fold(last);
        let want_first = first.map(names::fold);

        self.player_names
            .iter()
            .filter(|(_, name_last, name_first)| {
                if names::fold(name_last) != want_last {
                    return false;
                }
                match &want_first {
                    Some(want) => names::fold(name_first) == *want,
                    None => true,
                }
            })
            .map(|(key, name_last, name_first)| NameMatch {
                key: key.clone(),
                name_last: name_last.clone(),
                name_first: name_first.clone(),
                score: 1.0,
            })
            .collect()
    }

    fn search_fuzzy(&self, last: &str, first: Option<&str>) -> Vec<NameMatch> {
        let query = names::folded_full(last, first.unwrap_or(""));
        let mut matches: Vec<NameMatch> = self
            .player_names
            .iter()
            .filter_map(|(key, name_last, name_first)| {
                let candidate = names::folded_full(name_last, name_first);
                let score = strsim::jaro_winkler(&query, &candidate);
                (score >= self.fuzzy_threshold).then(|| NameMatch {
                    key: key.clone(),
                    name_last: name_last.clone(),
                    name_first: name_first.clone(),
                    score,
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        matches
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
