//! Testing-strategy selection (§4.10): picks shadow, replay, synthetic, or
//! manual review for a given tool based on its declared characteristics and
//! the history available for it.

use crate::tools::ToolCharacteristics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStrategy {
    Shadow,
    Replay,
    Synthetic,
    Manual,
}

/// Chooses a strategy in priority order: shadow (if declared safe),
/// replay (if enough history exists), synthetic (if the tool ships test
/// cases), else manual review.
pub fn select_strategy(
    characteristics: &ToolCharacteristics,
    historical_success_count: usize,
    has_synthetic_cases: bool,
) -> TestStrategy {
    if is_shadow_safe(characteristics) {
        return TestStrategy::Shadow;
    }

    const MIN_HISTORY_FOR_REPLAY: usize = 5;
    if historical_success_count >= MIN_HISTORY_FOR_REPLAY {
        return TestStrategy::Replay;
    }

    if has_synthetic_cases {
        return TestStrategy::Synthetic;
    }

    TestStrategy::Manual
}

fn is_shadow_safe(characteristics: &ToolCharacteristics) -> bool {
    characteristics.safe_for_shadow
        || characteristics
            .side_effects
            .iter()
            .any(|e| e == "none" || e == "read_only")
        || characteristics.idempotent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(safe: bool, idempotent: bool, side_effects: &[&str]) -> ToolCharacteristics {
        ToolCharacteristics {
            safe_for_shadow: safe,
            idempotent,
            side_effects: side_effects.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_shadow_chosen_when_marked_safe() {
        let c = chars(true, false, &["writes_db"]);
        assert_eq!(select_strategy(&c, 0, false), TestStrategy::Shadow);
    }

    #[test]
    fn test_shadow_chosen_when_read_only() {
        let c = chars(false, false, &["read_only"]);
        assert_eq!(select_strategy(&c, 0, false), TestStrategy::Shadow);
    }

    #[test]
    fn test_replay_chosen_with_enough_history() {
        let c = chars(false, false, &["writes_db"]);
        assert_eq!(select_strategy(&c, 10, false), TestStrategy::Replay);
    }

    #[test]
    fn test_synthetic_chosen_when_cases_declared() {
        let c = chars(false, false, &["writes_db"]);
        assert_eq!(select_strategy(&c, 0, true), TestStrategy::Synthetic);
    }

    #[test]
    fn test_manual_fallback() {
        let c = chars(false, false, &["writes_db"]);
        assert_eq!(select_strategy(&c, 0, false), TestStrategy::Manual);
    }
}
