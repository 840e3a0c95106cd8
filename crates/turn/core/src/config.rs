use std::time::Duration;

/// Turn coordination constants and tunable parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TurnConfig {
    /// Action points granted to the player at the start of every turn.
    ///
    /// Only one point is ever spent per turn: an accepted command closes the
    /// input window and any later command for the same turn is rejected as a
    /// duplicate. Values above 1 are kept in the flow snapshot but go unused.
    pub action_points_per_turn: u32,
    /// Delay before the advance guard re-evaluates a blocked end of phase.
    pub retry_delay: Duration,
    /// Number of epoch ledgers the barrier keeps (current epoch included).
    pub retained_epochs: u64,
}

impl TurnConfig {
    // ===== scalar encoding bounds =====
    /// Smallest grid coordinate representable in an absolute-cell code.
    pub const MIN_GRID_COORD: i32 = -1024;
    /// Largest grid coordinate representable in an absolute-cell code.
    pub const MAX_GRID_COORD: i32 = 1023;

    // ===== runtime-tunable defaults =====
    pub const DEFAULT_ACTION_POINTS: u32 = 1;
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
    pub const DEFAULT_RETAINED_EPOCHS: u64 = 2;

    pub fn new() -> Self {
        Self {
            action_points_per_turn: Self::DEFAULT_ACTION_POINTS,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
            retained_epochs: Self::DEFAULT_RETAINED_EPOCHS,
        }
    }

    #[must_use]
    pub fn with_action_points(mut self, points: u32) -> Self {
        self.action_points_per_turn = points;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets how many epochs the barrier retains. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_retained_epochs(mut self, epochs: u64) -> Self {
        self.retained_epochs = epochs.max(1);
        self
    }
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self::new()
    }
}
