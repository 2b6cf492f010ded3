// Multi-source record reconciliation: merges heterogeneous per-player-season
// records into one row per (player, year, role).
//
// Conflicts resolve through an explicit precedence-ordered overlay rather
// than ad hoc column overwrites: contributors are sorted ascending by
// (source class precedence, ingest sequence) and applied upward, so the
// highest class wins each stat and the most recently ingested source breaks
// ties. The winner of every column is recorded for auditing.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::identity::IdentityRegistry;
use crate::record::{Namespace, PlayerKey, Role, SeasonRecord, UnifiedSeasonRecord};

// ---------------------------------------------------------------------------
// Rejection channel
// ---------------------------------------------------------------------------

/// Why a season record could not be merged. Rejections are surfaced, never
/// dropped: the caller decides whether unresolved players are acceptable
/// (e.g. very recent debuts missing from the crosswalk snapshot).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// The record's native identifier has no entry in the registry. The
    /// joiner never mints identities; a transient crosswalk gap must not
    /// fragment a real player into duplicates.
    UnresolvedIdentity {
        namespace: Namespace,
        external_id: String,
    },
    /// More than one role was claimed for a single (player, year). Two-way
    /// players need caller-level disambiguation, not a guessed merge.
    RoleConflict {
        key: PlayerKey,
        year: u16,
        roles: Vec<Role>,
    },
}

/// A record that failed identity resolution or the role-conflict check,
/// paired with the reason, for external logging and alerting.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRecord {
    pub record: SeasonRecord,
    pub reason: RejectReason,
}

/// The joiner's full output: unified records plus the rejected channel.
#[derive(Debug)]
pub struct MergeOutcome {
    pub unified: Vec<UnifiedSeasonRecord>,
    pub rejected: Vec<RejectedRecord>,
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge season records from all sources into one unified record per
/// (player, year, role), resolving native identifiers through the registry.
///
/// Deterministic for a fixed input order and precedence table: re-running on
/// the same input always yields the same winners. Unified output is sorted
/// by (key, year, role); rejected output follows input order.
pub fn merge(records: Vec<SeasonRecord>, registry: &IdentityRegistry) -> MergeOutcome {
    let total = records.len();

    // Resolve every record first; group the resolvable ones by (key, year).
    // Original input position rides along so rejections can be re-sorted
    // into input order at the end.
    let mut groups: BTreeMap<(PlayerKey, u16), Vec<(usize, SeasonRecord)>> = BTreeMap::new();
    let mut rejected: Vec<(usize, RejectedRecord)> = Vec::new();

    for (index, record) in records.into_iter().enumerate() {
        match registry.resolve(record.namespace, &record.external_id) {
            Some(key) => {
                groups
                    .entry((key.clone(), record.year))
                    .or_default()
                    .push((index, record));
            }
            None => {
                warn!(
                    namespace = %record.namespace,
                    external_id = %record.external_id,
                    year = record.year,
                    source = %record.source.name,
                    "rejecting record with unresolved identifier"
                );
                let reason = RejectReason::UnresolvedIdentity {
                    namespace: record.namespace,
                    external_id: record.external_id.clone(),
                };
                rejected.push((index, RejectedRecord { record, reason }));
            }
        }
    }

    let mut unified = Vec::with_capacity(groups.len());
    for ((key, year), members) in groups {
        let mut roles: Vec<Role> = members.iter().map(|(_, r)| r.role).collect();
        roles.sort();
        roles.dedup();

        if roles.len() > 1 {
            warn!(
                key = %key,
                year,
                ?roles,
                "rejecting role-conflicted player-year group"
            );
            for (index, record) in members {
                rejected.push((
                    index,
                    RejectedRecord {
                        record,
                        reason: RejectReason::RoleConflict {
                            key: key.clone(),
                            year,
                            roles: roles.clone(),
                        },
                    },
                ));
            }
            continue;
        }

        unified.push(overlay_group(key, year, roles[0], members));
    }

    rejected.sort_by_key(|(index, _)| *index);
    let rejected: Vec<RejectedRecord> = rejected.into_iter().map(|(_, r)| r).collect();

    debug!(
        input = total,
        unified = unified.len(),
        rejected = rejected.len(),
        "merge complete"
    );

    MergeOutcome { unified, rejected }
}

/// Apply the precedence-ordered overlay within one (key, year, role) group.
fn overlay_group(
    key: PlayerKey,
    year: u16,
    role: Role,
    mut members: Vec<(usize, SeasonRecord)>,
) -> UnifiedSeasonRecord {
    // Ascending overlay order: lowest precedence first, so later (higher
    // precedence, then more recently ingested) entries win each column.
    members.sort_by_key(|(_, r)| (r.source.class.precedence(), r.source.ingest_seq));

    let mut stats: BTreeMap<String, f64> = BTreeMap::new();
    let mut stat_sources: BTreeMap<String, String> = BTreeMap::new();
    let mut sources: Vec<String> = Vec::new();
    let mut position: Option<String> = None;

    for (_, record) in &members {
        for (stat, value) in &record.stats {
            stats.insert(stat.clone(), *value);
            stat_sources.insert(stat.clone(), record.source.name.clone());
        }
        if record.position.is_some() {
            position = record.position.clone();
        }
        if !sources.contains(&record.source.name) {
            sources.push(record.source.name.clone());
        }
    }

    UnifiedSeasonRecord {
        key,
        year,
        role,
        position,
        stats,
        stat_sources,
        sources,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::CrosswalkRow;
    use crate::record::{SourceClass, SourceTag};

    // ------------------------------------------------------------------
    // Test helpers
    // ------------------------------------------------------------------

    fn registry() -> IdentityRegistry {
        let rows = vec![
            CrosswalkRow {
                key: PlayerKey::new("K1"),
                name_last: "One".into(),
                name_first: "Player".into(),
                ids: [
                    (Namespace::Fangraphs, "100".to_string()),
                    (Namespace::Mlbam, "7".to_string()),
                ]
                .into_iter()
                .collect(),
            },
            CrosswalkRow {
                key: PlayerKey::new("K2"),
                name_last: "Two".into(),
                name_first: "Player".into(),
                ids: [(Namespace::Mlbam, "8".to_string())].into_iter().collect(),
            },
        ];
        let mut reg = IdentityRegistry::new();
        reg.load(&rows, 0.0).unwrap();
        reg
    }

    fn tag(name: &str, class: SourceClass, seq: u64) -> SourceTag {
        SourceTag {
            name: name.to_string(),
            class,
            ingest_seq: seq,
        }
    }

    fn record(
        ns: Namespace,
        id: &str,
        year: u16,
        role: Role,
        stats: &[(&str, f64)],
        source: SourceTag,
    ) -> SeasonRecord {
        SeasonRecord {
            namespace: ns,
            external_id: id.to_string(),
            year,
            role,
            position: None,
            stats: stats.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            source,
        }
    }

    // ------------------------------------------------------------------
    // Cross-namespace join
    // ------------------------------------------------------------------

    #[test]
    fn records_from_two_namespaces_unify_under_one_key() {
        // The end-to-end crosswalk property: a fangraphs-keyed row and an
        // mlbam-keyed row for the same player-year produce exactly one
        // unified record with the union of both stat sets.
        let reg = registry();
        let records = vec![
            record(
                Namespace::Fangraphs,
                "100",
                2023,
                Role::Batter,
                &[("HR", 30.0), ("PA", 600.0)],
                tag("fangraphs_batting", SourceClass::SeasonAggregate, 1),
            ),
            record(
                Namespace::Mlbam,
                "7",
                2023,
                Role::Batter,
                &[("xBA", 0.285)],
                tag("statcast_batting", SourceClass::PitchLevel, 2),
            ),
        ];

        let outcome = merge(records, &reg);
        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.unified.len(), 1);

        let u = &outcome.unified[0];
        assert_eq!(u.key, PlayerKey::new("K1"));
        assert_eq!(u.year, 2023);
        assert_eq!(u.stats.len(), 3);
        assert_eq!(u.stats.get("HR"), Some(&30.0));
        assert_eq!(u.stats.get("xBA"), Some(&0.285));
        assert_eq!(u.sources, vec!["statcast_batting", "fangraphs_batting"]);
    }

    #[test]
    fn same_player_different_years_stay_separate() {
        let reg = registry();
        let records = vec![
            record(
                Namespace::Mlbam,
                "7",
                2022,
                Role::Batter,
                &[("HR", 25.0)],
                tag("fg", SourceClass::SeasonAggregate, 1),
            ),
            record(
                Namespace::Mlbam,
                "7",
                2023,
                Role::Batter,
                &[("HR", 30.0)],
                tag("fg", SourceClass::SeasonAggregate, 1),
            ),
        ];
        let outcome = merge(records, &reg);
        assert_eq!(outcome.unified.len(), 2);
        assert_eq!(outcome.unified[0].year, 2022);
        assert_eq!(outcome.unified[1].year, 2023);
    }

    // ------------------------------------------------------------------
    // Conflict rule
    // ------------------------------------------------------------------

    #[test]
    fn higher_precedence_class_wins_stat_conflict() {
        let reg = registry();
        let records = vec![
            record(
                Namespace::Mlbam,
                "7",
                2023,
                Role::Batter,
                &[("AVG", 0.250)],
                tag("statcast", SourceClass::PitchLevel, 5),
            ),
            record(
                Namespace::Fangraphs,
                "100",
                2023,
                Role::Batter,
                &[("AVG", 0.260)],
                tag("fangraphs", SourceClass::SeasonAggregate, 1),
            ),
        ];
        let outcome = merge(records, &reg);
        let u = &outcome.unified[0];
        // SeasonAggregate outranks PitchLevel even though it was ingested earlier.
        assert_eq!(u.stats.get("AVG"), Some(&0.260));
        assert_eq!(u.stat_sources.get("AVG").map(String::as_str), Some("fangraphs"));
    }

    #[test]
    fn precedence_tie_goes_to_most_recent_ingest() {
        let reg = registry();
        let records = vec![
            record(
                Namespace::Mlbam,
                "7",
                2023,
                Role::Batter,
                &[("HR", 28.0)],
                tag("fg_march", SourceClass::SeasonAggregate, 1),
            ),
            record(
                Namespace::Fangraphs,
                "100",
                2023,
                Role::Batter,
                &[("HR", 31.0)],
                tag("fg_october", SourceClass::SeasonAggregate, 2),
            ),
        ];
        let outcome = merge(records, &reg);
        let u = &outcome.unified[0];
        assert_eq!(u.stats.get("HR"), Some(&31.0));
        assert_eq!(u.stat_sources.get("HR").map(String::as_str), Some("fg_october"));
    }

    #[test]
    fn merge_is_deterministic_across_runs() {
        let reg = registry();
        let build = || {
            vec![
                record(
                    Namespace::Mlbam,
                    "7",
                    2023,
                    Role::Batter,
                    &[("AVG", 0.250), ("xBA", 0.270)],
                    tag("statcast", SourceClass::PitchLevel, 2),
                ),
                record(
                    Namespace::Fangraphs,
                    "100",
                    2023,
                    Role::Batter,
                    &[("AVG", 0.260), ("HR", 30.0)],
                    tag("fangraphs", SourceClass::SeasonAggregate, 1),
                ),
            ]
        };
        let a = merge(build(), &reg);
        let b = merge(build(), &reg);
        assert_eq!(a.unified.len(), b.unified.len());
        for (ua, ub) in a.unified.iter().zip(&b.unified) {
            assert_eq!(ua.stats, ub.stats);
            assert_eq!(ua.stat_sources, ub.stat_sources);
        }
    }

    // ------------------------------------------------------------------
    // Rejection channel
    // ------------------------------------------------------------------

    #[test]
    fn unresolved_identifier_goes_to_rejected_channel() {
        let reg = registry();
        let records = vec![
            record(
                Namespace::Mlbam,
                "7",
                2023,
                Role::Batter,
                &[("HR", 30.0)],
                tag("fg", SourceClass::SeasonAggregate, 1),
            ),
            record(
                Namespace::Bbref,
                "unknown99",
                2023,
                Role::Batter,
                &[("HR", 12.0)],
                tag("fg", SourceClass::SeasonAggregate, 1),
            ),
        ];
        let outcome = merge(records, &reg);
        assert_eq!(outcome.unified.len(), 1);
        assert_eq!(outcome.rejected.len(), 1);
        match &outcome.rejected[0].reason {
            RejectReason::UnresolvedIdentity {
                namespace,
                external_id,
            } => {
                assert_eq!(*namespace, Namespace::Bbref);
                assert_eq!(external_id, "unknown99");
            }
            other => panic!("expected UnresolvedIdentity, got {other:?}"),
        }
    }

    #[test]
    fn role_conflict_rejects_the_whole_group_with_context() {
        let reg = registry();
        let records = vec![
            record(
                Namespace::Mlbam,
                "7",
                2023,
                Role::Batter,
                &[("PA", 600.0)],
                tag("fg_bat", SourceClass::SeasonAggregate, 1),
            ),
            record(
                Namespace::Fangraphs,
                "100",
                2023,
                Role::Pitcher,
                &[("IP", 130.0)],
                tag("fg_pit", SourceClass::SeasonAggregate, 1),
            ),
            // A different player in the same year is unaffected.
            record(
                Namespace::Mlbam,
                "8",
                2023,
                Role::Batter,
                &[("PA", 500.0)],
                tag("fg_bat", SourceClass::SeasonAggregate, 1),
            ),
        ];
        let outcome = merge(records, &reg);

        assert_eq!(outcome.unified.len(), 1);
        assert_eq!(outcome.unified[0].key, PlayerKey::new("K2"));

        assert_eq!(outcome.rejected.len(), 2);
        for rejection in &outcome.rejected {
            match &rejection.reason {
                RejectReason::RoleConflict { key, year, roles } => {
                    assert_eq!(*key, PlayerKey::new("K1"));
                    assert_eq!(*year, 2023);
                    assert_eq!(roles, &[Role::Batter, Role::Pitcher]);
                }
                other => panic!("expected RoleConflict, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejected_output_follows_input_order() {
        let reg = registry();
        let records = vec![
            record(
                Namespace::Bbref,
                "gone1",
                2023,
                Role::Batter,
                &[("HR", 1.0)],
                tag("fg", SourceClass::SeasonAggregate, 1),
            ),
            record(
                Namespace::Mlbam,
                "7",
                2023,
                Role::Batter,
                &[("PA", 600.0)],
                tag("fg_bat", SourceClass::SeasonAggregate, 1),
            ),
            record(
                Namespace::Fangraphs,
                "100",
                2023,
                Role::Pitcher,
                &[("IP", 130.0)],
                tag("fg_pit", SourceClass::SeasonAggregate, 1),
            ),
            record(
                Namespace::Bbref,
                "gone2",
                2023,
                Role::Batter,
                &[("HR", 2.0)],
                tag("fg", SourceClass::SeasonAggregate, 1),
            ),
        ];
        let outcome = merge(records, &reg);
        assert!(outcome.unified.is_empty());
        assert_eq!(outcome.rejected.len(), 4);
        assert_eq!(outcome.rejected[0].record.external_id, "gone1");
        assert_eq!(outcome.rejected[3].record.external_id, "gone2");
    }

    #[test]
    fn unified_output_sorted_by_key_year_role() {
        let reg = registry();
        let records = vec![
            record(
                Namespace::Mlbam,
                "8",
                2022,
                Role::Batter,
                &[("HR", 5.0)],
                tag("fg", SourceClass::SeasonAggregate, 1),
            ),
            record(
                Namespace::Mlbam,
                "7",
                2023,
                Role::Batter,
                &[("HR", 30.0)],
                tag("fg", SourceClass::SeasonAggregate, 1),
            ),
            record(
                Namespace::Mlbam,
                "7",
                2021,
                Role::Batter,
                &[("HR", 20.0)],
                tag("fg", SourceClass::SeasonAggregate, 1),
            ),
        ];
        let outcome = merge(records, &reg);
        let keys: Vec<(String, u16)> = outcome
            .unified
            .iter()
            .map(|u| (u.key.to_string(), u.year))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("K1".to_string(), 2021),
                ("K1".to_string(), 2023),
                ("K2".to_string(), 2022),
            ]
        );
    }

    #[test]
    fn position_comes_from_highest_precedence_contributor() {
        let reg = registry();
        let mut low = record(
            Namespace::Mlbam,
            "7",
            2023,
            Role::Batter,
            &[("xBA", 0.270)],
            tag("statcast", SourceClass::PitchLevel, 2),
        );
        low.position = Some("DH".to_string());
        let mut high = record(
            Namespace::Fangraphs,
            "100",
            2023,
            Role::Batter,
            &[("HR", 30.0)],
            tag("fangraphs", SourceClass::SeasonAggregate, 1),
        );
        high.position = Some("RF".to_string());

        let outcome = merge(vec![low, high], &reg);
        assert_eq!(outcome.unified[0].position.as_deref(), Some("RF"));
    }
}
