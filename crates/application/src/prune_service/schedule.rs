/// Lifecycle of one namespace pruner.
///
/// A pruner starts in [`PruneState::Pruning`]: the first run happens as soon
/// as the loop starts, later runs on every interval tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneState {
    /// Waiting for the next tick.
    Idle,
    /// One prune run is in flight.
    Pruning,
}

impl PruneState {
    /// State entered when the loop starts.
    #[must_use]
    pub fn initial() -> Self {
        Self::Pruning
    }

    /// Transition taken when the interval timer fires.
    #[must_use]
    pub fn on_tick(self) -> Self {
        Self::Pruning
    }

    /// Transition taken when a run completes, successfully or not.
    #[must_use]
    pub fn on_run_finished(self) -> Self {
        Self::Idle
    }

    /// Returns a stable label for log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pruning => "pruning",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PruneState;

    #[test]
    fn starts_pruning_and_alternates() {
        let state = PruneState::initial();
        assert_eq!(state, PruneState::Pruning);

        let state = state.on_run_finished();
        assert_eq!(state, PruneState::Idle);

        assert_eq!(state.on_tick(), PruneState::Pruning);
    }
}
