//! Global greedy assignment of reference icons to candidate boxes.
//!
//! Per-icon independent argmax is not enough: two icons frequently share a
//! best box. Assignment is therefore a single greedy auction over all
//! icons, claiming one box per round, so the globally strongest pairing
//! always wins its box and weaker icons are displaced to their next
//! choice.

use std::collections::HashSet;

use crate::models::{AssignedTarget, Assignment, GlobalMatch, ScoredMatch, ICON_COUNT};

/// Resolve the final icon → target mapping.
///
/// `per_icon[i]` holds icon `i+1`'s candidates sorted by descending
/// similarity (as produced by [`crate::vision::score::score_pairs`]);
/// `global[i]` is the whole-image template match for the same icon.
///
/// Rounds proceed while some icon's best unused candidate clears `floor`.
/// When the floor stops assignment early, remaining icons are filled from
/// their top candidate regardless of score or reuse, a deliberate
/// low-confidence fallback, since the remote service allows retries and a
/// weak submission beats none. Whole-image matches override a per-box
/// result only when strictly stronger.
pub fn resolve_targets(
    per_icon: &[Vec<ScoredMatch>],
    global: &[Option<GlobalMatch>],
    floor: f64,
) -> Assignment {
    let mut chosen: Vec<Option<AssignedTarget>> = vec![None; ICON_COUNT];
    let mut used_boxes: HashSet<usize> = HashSet::new();

    loop {
        let assigned = chosen.iter().filter(|c| c.is_some()).count();
        if assigned == ICON_COUNT {
            break;
        }

        // Each unassigned icon bids its best unused candidate; the single
        // highest bid across icons wins this round.
        let mut best: Option<&ScoredMatch> = None;
        for (slot, candidates) in per_icon.iter().enumerate().take(ICON_COUNT) {
            if chosen[slot].is_some() {
                continue;
            }
            let bid = candidates
                .iter()
                .find(|m| !used_boxes.contains(&m.candidate_id));
            if let Some(m) = bid {
                if best.map_or(true, |b| m.similarity > b.similarity) {
                    best = Some(m);
                }
            }
        }

        let best = match best {
            Some(m) if m.similarity >= floor => m,
            Some(m) => {
                tracing::warn!(
                    best = m.similarity,
                    floor,
                    "no candidate clears the similarity floor, switching to low-confidence fill"
                );
                break;
            }
            None => break,
        };

        used_boxes.insert(best.candidate_id);
        chosen[best.icon_index - 1] = Some(AssignedTarget {
            icon_index: best.icon_index,
            similarity: best.similarity,
            center: best.center,
            candidate_id: Some(best.candidate_id),
            low_confidence: false,
        });
    }

    // Fill what the floor left open from each icon's top candidate, even
    // if that reuses a box.
    for (slot, candidates) in per_icon.iter().enumerate().take(ICON_COUNT) {
        if chosen[slot].is_none() {
            if let Some(m) = candidates.first() {
                chosen[slot] = Some(AssignedTarget {
                    icon_index: m.icon_index,
                    similarity: m.similarity,
                    center: m.center,
                    candidate_id: Some(m.candidate_id),
                    low_confidence: true,
                });
            }
        }
    }

    // A whole-image match that beats the per-box result takes over; this
    // recovers icons whose true region the detector never proposed.
    for (slot, g) in global.iter().enumerate().take(ICON_COUNT) {
        if let Some(g) = g {
            let replace = match &chosen[slot] {
                Some(t) => g.similarity > t.similarity,
                None => true,
            };
            if replace {
                chosen[slot] = Some(AssignedTarget {
                    icon_index: slot + 1,
                    similarity: g.similarity,
                    center: g.center,
                    candidate_id: None,
                    low_confidence: g.similarity < floor,
                });
            }
        }
    }

    Assignment {
        targets: chosen.into_iter().flatten().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(icon: usize, cand: usize, sim: f64) -> ScoredMatch {
        ScoredMatch {
            icon_index: icon,
            candidate_id: cand,
            similarity: sim,
            center: (cand as u32 * 10 + 5, cand as u32 * 10 + 5),
        }
    }

    fn sorted(mut v: Vec<ScoredMatch>) -> Vec<ScoredMatch> {
        v.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        v
    }

    /// Box ids: C = 2, D = 3, E = 4.
    fn displacement_matrix() -> Vec<Vec<ScoredMatch>> {
        vec![
            sorted(vec![m(1, 2, 0.9), m(1, 3, 0.2), m(1, 4, 0.1)]),
            sorted(vec![m(2, 2, 0.85), m(2, 3, 0.6), m(2, 4, 0.15)]),
            sorted(vec![m(3, 4, 0.4), m(3, 2, 0.1), m(3, 3, 0.05)]),
        ]
    }

    #[test]
    fn greedy_displaces_weaker_claim() {
        let a = resolve_targets(&displacement_matrix(), &[None, None, None], 0.35);
        assert!(a.is_complete());
        let by_icon: Vec<(usize, Option<usize>)> = a
            .targets
            .iter()
            .map(|t| (t.icon_index, t.candidate_id))
            .collect();
        // Icon 1 claims C with the globally highest score; icon 2 is
        // displaced to D; icon 3 keeps E.
        assert_eq!(by_icon, vec![(1, Some(2)), (2, Some(3)), (3, Some(4))]);
        assert!(!a.is_degenerate());
    }

    #[test]
    fn assignment_uniqueness() {
        let a = resolve_targets(&displacement_matrix(), &[None, None, None], 0.35);
        let ids: Vec<usize> = a.targets.iter().filter_map(|t| t.candidate_id).collect();
        let unique: HashSet<usize> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());
    }

    #[test]
    fn no_pairwise_swap_improves_total() {
        let matrix = displacement_matrix();
        let a = resolve_targets(&matrix, &[None, None, None], 0.35);
        let score_of = |icon: usize, cand: usize| -> f64 {
            matrix[icon - 1]
                .iter()
                .find(|m| m.candidate_id == cand)
                .map(|m| m.similarity)
                .unwrap_or(0.0)
        };
        let total: f64 = a.targets.iter().map(|t| t.similarity).sum();
        for i in 0..a.targets.len() {
            for j in i + 1..a.targets.len() {
                let (ti, tj) = (&a.targets[i], &a.targets[j]);
                let (ci, cj) = (ti.candidate_id.unwrap(), tj.candidate_id.unwrap());
                let swapped: f64 = total - ti.similarity - tj.similarity
                    + score_of(ti.icon_index, cj)
                    + score_of(tj.icon_index, ci);
                assert!(
                    swapped <= total + 1e-9,
                    "swap of icons {} and {} improves the total",
                    ti.icon_index,
                    tj.icon_index
                );
            }
        }
    }

    #[test]
    fn floor_triggers_low_confidence_fill() {
        let matrix = vec![
            sorted(vec![m(1, 0, 0.2), m(1, 1, 0.1)]),
            sorted(vec![m(2, 1, 0.15)]),
            sorted(vec![m(3, 2, 0.3)]),
        ];
        let a = resolve_targets(&matrix, &[None, None, None], 0.5);
        assert!(a.is_complete());
        assert!(a.targets.iter().all(|t| t.low_confidence));
    }

    #[test]
    fn exhausted_candidates_duplicate_as_explicit_fallback() {
        // One box, three icons: the fill step reuses it rather than
        // leaving icons unassigned.
        let matrix = vec![
            sorted(vec![m(1, 0, 0.9)]),
            sorted(vec![m(2, 0, 0.7)]),
            sorted(vec![m(3, 0, 0.6)]),
        ];
        let a = resolve_targets(&matrix, &[None, None, None], 0.35);
        assert!(a.is_complete());
        assert!(a.is_degenerate());
        let dup_count = a.targets.iter().filter(|t| t.low_confidence).count();
        assert_eq!(dup_count, 2);
    }

    #[test]
    fn global_match_overrides_weaker_candidate() {
        let matrix = vec![
            sorted(vec![m(1, 0, 0.4)]),
            sorted(vec![m(2, 1, 0.5)]),
            sorted(vec![m(3, 2, 0.6)]),
        ];
        let global = [
            Some(GlobalMatch {
                similarity: 0.95,
                center: (200, 100),
            }),
            None,
            None,
        ];
        let a = resolve_targets(&matrix, &global, 0.35);
        let icon1 = a.targets.iter().find(|t| t.icon_index == 1).unwrap();
        assert_eq!(icon1.center, (200, 100));
        assert_eq!(icon1.candidate_id, None);
        assert!((icon1.similarity - 0.95).abs() < 1e-9);
    }

    #[test]
    fn global_match_does_not_override_stronger_candidate() {
        let matrix = vec![
            sorted(vec![m(1, 0, 0.8)]),
            sorted(vec![m(2, 1, 0.5)]),
            sorted(vec![m(3, 2, 0.6)]),
        ];
        let global = [
            Some(GlobalMatch {
                similarity: 0.3,
                center: (200, 100),
            }),
            None,
            None,
        ];
        let a = resolve_targets(&matrix, &global, 0.35);
        let icon1 = a.targets.iter().find(|t| t.icon_index == 1).unwrap();
        assert_eq!(icon1.candidate_id, Some(0));
    }

    #[test]
    fn empty_candidates_yield_partial_assignment() {
        let matrix = vec![Vec::new(), Vec::new(), Vec::new()];
        let a = resolve_targets(&matrix, &[None, None, None], 0.35);
        assert!(a.targets.is_empty());
        assert!(!a.is_complete());
    }
}
