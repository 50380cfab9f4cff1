//! Round progression.
//!
//! Round timing is owned by an external collaborator. The engine only asks
//! which round is current and whether it has been initialized.

use bondline_types::Round;

/// Source of the current round.
pub trait RoundsManager {
    /// The current round.
    fn current_round(&self) -> Round;

    /// Whether `round` has been initialized. State-changing operations
    /// require the current round to be initialized.
    fn round_started(&self, round: Round) -> bool;
}

/// Rounds advanced explicitly by the caller.
#[derive(Clone, Debug)]
pub struct ManualRounds {
    current: Round,
    initialized: bool,
}

impl ManualRounds {
    /// Start at `round`, already initialized.
    pub fn new(round: Round) -> Self {
        Self {
            current: round,
            initialized: true,
        }
    }

    /// Move to the next round and initialize it.
    pub fn advance(&mut self) -> Round {
        self.current += 1;
        self.initialized = true;
        self.current
    }

    /// Move to the next round without initializing it.
    pub fn advance_uninitialized(&mut self) -> Round {
        self.current += 1;
        self.initialized = false;
        self.current
    }

    /// Advance until `round` is current. Does nothing if it already is or is past.
    pub fn advance_to(&mut self, round: Round) -> Round {
        while self.current < round {
            self.advance();
        }
        self.current
    }
}

impl Default for ManualRounds {
    fn default() -> Self {
        Self::new(1)
    }
}

impl RoundsManager for ManualRounds {
    fn current_round(&self) -> Round {
        self.current
    }

    fn round_started(&self, round: Round) -> bool {
        round < self.current || (round == self.current && self.initialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_rounds() {
        let mut rounds = ManualRounds::new(1);
        assert_eq!(rounds.current_round(), 1);
        assert!(rounds.round_started(1));

        rounds.advance_uninitialized();
        assert_eq!(rounds.current_round(), 2);
        assert!(!rounds.round_started(2));
        assert!(rounds.round_started(1));

        rounds.advance();
        assert!(rounds.round_started(3));
        assert!(!rounds.round_started(4));
    }

    #[test]
    fn test_advance_to() {
        let mut rounds = ManualRounds::default();
        assert_eq!(rounds.advance_to(5), 5);
        assert_eq!(rounds.advance_to(3), 5);
    }
}
