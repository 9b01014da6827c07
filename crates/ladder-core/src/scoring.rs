//! End-of-round ranking and points.
//!
//! Teams that finished are ranked in completion order. Unfinished teams follow,
//! ordered by how much of the ladder they revealed; teams within
//! [`RATIO_TIE_EPSILON`] of each other share a placement.

use serde::{Deserialize, Serialize};

use crate::lobby::TeamId;

/// Completion ratios closer than this are treated as a tie.
pub const RATIO_TIE_EPSILON: f64 = 0.001;

/// Share of the worst finisher's points an unfinished team can earn at most.
pub const UNFINISHED_POINTS_CAP: f64 = 0.75;

/// A team that did not finish, with the fraction of its ladder revealed.
#[derive(Debug, Clone, PartialEq)]
pub struct Unfinished {
    pub team_id: TeamId,
    pub team_name: String,
    pub completion_ratio: f64,
}

/// One team's line in the round results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    pub team_id: TeamId,
    pub team_name: String,
    pub placement: u32,
    pub points: u32,
    pub completed: bool,
    /// Revealed share of the ladder, rounded down to whole percent.
    pub completion_percent: u8,
}

/// Points for one team.
///
/// Finishers earn `total_teams - placement + 1`. Unfinished teams earn their
/// completion ratio of `unfinished_base`, capped at 75% of it, rounded up and
/// never below one.
pub fn points_for(
    placement: u32,
    total_teams: usize,
    completed: bool,
    completion_ratio: f64,
    unfinished_base: usize,
) -> u32 {
    if completed {
        return (total_teams as u32 + 1).saturating_sub(placement);
    }
    let base = unfinished_base as f64;
    let earned = (base * completion_ratio.clamp(0.0, 1.0)).min(base * UNFINISHED_POINTS_CAP);
    (earned.ceil() as u32).max(1)
}

/// Rank a finished round. `finishers` are in completion order.
pub fn rank_round(finishers: &[(TeamId, String)], unfinished: &[Unfinished]) -> Vec<RoundResult> {
    let total_teams = finishers.len() + unfinished.len();
    // The worst finisher's points, or every team's worth when nobody finished
    let unfinished_base = if finishers.is_empty() {
        total_teams
    } else {
        total_teams - finishers.len() + 1
    };

    let mut results = Vec::with_capacity(total_teams);
    for (i, (team_id, team_name)) in finishers.iter().enumerate() {
        let placement = i as u32 + 1;
        results.push(RoundResult {
            team_id: *team_id,
            team_name: team_name.clone(),
            placement,
            points: points_for(placement, total_teams, true, 1.0, unfinished_base),
            completed: true,
            completion_percent: 100,
        });
    }

    let mut rest: Vec<&Unfinished> = unfinished.iter().collect();
    rest.sort_by(|a, b| {
        b.completion_ratio
            .total_cmp(&a.completion_ratio)
            .then(a.team_id.cmp(&b.team_id))
    });

    let mut placement = 0;
    let mut previous: Option<f64> = None;
    for (i, team) in rest.into_iter().enumerate() {
        let ratio = team.completion_ratio;
        if previous.is_none_or(|p| (p - ratio).abs() > RATIO_TIE_EPSILON) {
            placement = (finishers.len() + i) as u32 + 1;
            previous = Some(ratio);
        }
        results.push(RoundResult {
            team_id: team.team_id,
            team_name: team.team_name.clone(),
            placement,
            points: points_for(placement, total_teams, false, ratio, unfinished_base),
            completed: false,
            completion_percent: (ratio.clamp(0.0, 1.0) * 100.0).floor() as u8,
        });
    }
    results
}
