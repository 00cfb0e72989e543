//! Trophy tier derivation from a completion's move count and the challenge par.

use crate::dao::models::{ChallengeEntity, Difficulty, TrophyTier};

/// Par used when a challenge carries no explicit estimate.
pub fn default_par(difficulty: Difficulty) -> u8 {
    match difficulty {
        Difficulty::Easy => 2,
        Difficulty::Normal => 4,
        Difficulty::Hard => 6,
    }
}

/// Par for a challenge: its estimate when present, else the difficulty default.
pub fn par_for(challenge: &ChallengeEntity) -> u8 {
    challenge
        .estimated_moves
        .unwrap_or_else(|| default_par(challenge.difficulty))
}

/// Tier earned for finishing in `moves` against `par`.
///
/// Callers clamp `moves` to the allowed range beforehand; every input maps to a tier.
pub fn evaluate(moves: u8, par: u8) -> TrophyTier {
    if moves == 1 {
        return TrophyTier::WalkOfFame;
    }

    match i16::from(moves) - i16::from(par) {
        ..=-2 => TrophyTier::Oscar,
        -1 => TrophyTier::GoldenGlobe,
        0 => TrophyTier::Emmy,
        1 => TrophyTier::Sag,
        _ => TrophyTier::Popcorn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_move_is_always_walk_of_fame() {
        for par in 0..=10 {
            assert_eq!(evaluate(1, par), TrophyTier::WalkOfFame);
        }
    }

    #[test]
    fn matching_par_is_emmy() {
        for par in 2..=6 {
            assert_eq!(evaluate(par, par), TrophyTier::Emmy);
        }
    }

    #[test]
    fn two_or_more_over_par_is_popcorn() {
        assert_eq!(evaluate(4, 2), TrophyTier::Popcorn);
        assert_eq!(evaluate(6, 2), TrophyTier::Popcorn);
        assert_eq!(evaluate(6, 4), TrophyTier::Popcorn);
    }

    #[test]
    fn tiers_around_par() {
        assert_eq!(evaluate(2, 4), TrophyTier::Oscar);
        assert_eq!(evaluate(2, 6), TrophyTier::Oscar);
        assert_eq!(evaluate(3, 4), TrophyTier::GoldenGlobe);
        assert_eq!(evaluate(5, 4), TrophyTier::Sag);
    }

    #[test]
    fn default_par_by_difficulty() {
        assert_eq!(default_par(Difficulty::Easy), 2);
        assert_eq!(default_par(Difficulty::Normal), 4);
        assert_eq!(default_par(Difficulty::Hard), 6);
    }
}
