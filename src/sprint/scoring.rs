//! Words-per-minute and ranking math. Everything here is pure.

use crate::types::UserId;

/// XP for finishing a sprint.
pub const XP_COMPLETE_SPRINT: i64 = 25;

/// Bonus pool for the top finishers, divided by effective position.
pub const XP_WIN_SPRINT: i64 = 100;

/// Only the top positions earn a bonus.
pub const BONUS_POSITIONS: usize = 5;

/// Words per minute, rounded to one decimal place. Non-positive durations
/// yield `0.0` instead of dividing by zero.
pub fn calculate_wpm(words: i64, seconds: i64) -> f64 {
    if seconds <= 0 {
        return 0.0;
    }
    let minutes = seconds as f64 / 60.0;
    (words as f64 / minutes * 10.0).round() / 10.0
}

/// Seconds a participant spent sprinting, falling back to the nominal length
/// when either reference point is unusable.
pub fn elapsed_seconds(end_reference: i64, time_joined: i64, length_minutes: i64) -> i64 {
    let elapsed = end_reference - time_joined;
    if end_reference <= 0 || time_joined <= 0 || elapsed <= 0 {
        length_minutes * 60
    } else {
        elapsed
    }
}

/// A participant's place in the final standings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub user_id: UserId,
    pub written: i64,
    /// Sequential position in the sorted standings, from 1.
    pub position: usize,
    /// `1` for anyone tied at the top, otherwise `position`.
    pub effective_position: usize,
    pub bonus_xp: i64,
    pub won: bool,
}

/// Rank scored participants by words written.
///
/// The sort is stable, so equal counts keep their input order. Bonus XP is
/// only handed out when more than one participant scored.
pub fn rank(scored: &[(UserId, i64)]) -> Vec<Placement> {
    let mut sorted: Vec<(UserId, i64)> = scored.to_vec();
    sorted.sort_by(|a, b| b.1.cmp(&a.1));

    let contested = sorted.len() > 1;
    let mut highest = i64::MIN;

    sorted
        .into_iter()
        .enumerate()
        .map(|(index, (user_id, written))| {
            let position = index + 1;
            highest = highest.max(written);
            let tied_at_top = written == highest;
            let effective_position = if tied_at_top { 1 } else { position };

            let bonus_xp = if contested && position <= BONUS_POSITIONS {
                ceil_div(XP_WIN_SPRINT, effective_position as i64)
            } else {
                0
            };

            Placement {
                user_id,
                written,
                position,
                effective_position,
                bonus_xp,
                won: position == 1 || tied_at_top,
            }
        })
        .collect()
}

fn ceil_div(a: i64, b: i64) -> i64 {
    (a + b - 1) / b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wpm_basic_cases() {
        assert_eq!(calculate_wpm(1000, 600), 100.0);
        assert_eq!(calculate_wpm(0, 600), 0.0);
        assert_eq!(calculate_wpm(500, 0), 0.0);
        assert_eq!(calculate_wpm(500, -30), 0.0);
        assert_eq!(calculate_wpm(100, 180), 33.3);
    }

    #[test]
    fn elapsed_falls_back_on_bad_references() {
        assert_eq!(elapsed_seconds(2_000, 1_400, 20), 600);
        // Clock skew: joined after the reference point.
        assert_eq!(elapsed_seconds(1_000, 1_600, 20), 1_200);
        assert_eq!(elapsed_seconds(0, 1_000, 15), 900);
        assert_eq!(elapsed_seconds(2_000, 0, 15), 900);
        assert_eq!(calculate_wpm(1_000, elapsed_seconds(1_000, 1_600, 10)), 100.0);
    }

    #[test]
    fn ties_at_the_top_share_first_place() {
        let placements = rank(&[(1, 500), (2, 500), (3, 300)]);

        assert_eq!(placements[0].user_id, 1);
        assert_eq!(placements[1].user_id, 2);
        assert!(placements[0].won);
        assert!(placements[1].won);
        assert!(!placements[2].won);

        assert_eq!(placements[0].effective_position, 1);
        assert_eq!(placements[1].effective_position, 1);
        assert_eq!(placements[0].bonus_xp, 100);
        assert_eq!(placements[1].bonus_xp, 100);
        assert_eq!(placements[2].effective_position, 3);
        assert_eq!(placements[2].bonus_xp, 34);
    }

    #[test]
    fn sole_participant_gets_no_bonus_but_wins() {
        let placements = rank(&[(9, 750)]);
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].bonus_xp, 0);
        assert!(placements[0].won);
    }

    #[test]
    fn bonus_stops_after_fifth_place() {
        let scored: Vec<(UserId, i64)> = (1..=7).map(|u| (u, 1_000 - u * 10)).collect();
        let placements = rank(&scored);
        let bonuses: Vec<i64> = placements.iter().map(|p| p.bonus_xp).collect();
        assert_eq!(bonuses, vec![100, 50, 34, 25, 20, 0, 0]);
        assert_eq!(placements.iter().filter(|p| p.won).count(), 1);
    }

    #[test]
    fn input_order_is_kept_for_equal_counts() {
        let placements = rank(&[(3, 200), (1, 400), (2, 200)]);
        let order: Vec<UserId> = placements.iter().map(|p| p.user_id).collect();
        assert_eq!(order, vec![1, 3, 2]);
        assert_eq!(placements[2].effective_position, 3);
    }
}
