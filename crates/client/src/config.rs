//! Client configuration loaded from the process environment.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use turn_core::TurnConfig;
use turn_runtime::RuntimeConfig;

/// Settings for one headless `turnsync` run.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Turns to play before printing the summary.
    pub turns: u32,
    pub retry_delay: Duration,
    pub action_points: u32,
    pub log_dir: Option<PathBuf>,
    /// ASCII map to load instead of the built-in arena.
    pub map_path: Option<PathBuf>,
    /// Player moves, e.g. `n,n,e,wait`. Empty means the built-in script.
    pub script: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            turns: 6,
            retry_delay: TurnConfig::DEFAULT_RETRY_DELAY,
            action_points: TurnConfig::DEFAULT_ACTION_POINTS,
            log_dir: None,
            map_path: None,
            script: None,
        }
    }
}

impl ClientConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `TURNSYNC_TURNS` - Turns to play (default: 6)
    /// - `TURNSYNC_RETRY_DELAY_MS` - Advance guard retry delay (default: 500)
    /// - `TURNSYNC_ACTION_POINTS` - Action points granted per turn (default: 1).
    ///   One command is accepted per turn, so values above 1 are never spent.
    /// - `TURNSYNC_LOG_DIR` - Log directory (default: platform cache dir)
    /// - `TURNSYNC_MAP` - Path to an ASCII map file
    /// - `TURNSYNC_SCRIPT` - Comma separated player moves
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(turns) = read_env::<u32>("TURNSYNC_TURNS") {
            config.turns = turns.max(1);
        }
        if let Some(delay) = read_env::<u64>("TURNSYNC_RETRY_DELAY_MS") {
            config.retry_delay = Duration::from_millis(delay);
        }
        if let Some(points) = read_env::<u32>("TURNSYNC_ACTION_POINTS") {
            config.action_points = points.max(1);
        }

        config.log_dir = env::var("TURNSYNC_LOG_DIR").ok().map(PathBuf::from);
        config.map_path = env::var("TURNSYNC_MAP").ok().map(PathBuf::from);
        config.script = env::var("TURNSYNC_SCRIPT")
            .ok()
            .filter(|script| !script.trim().is_empty());

        config
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            turn: TurnConfig::default()
                .with_action_points(self.action_points)
                .with_retry_delay(self.retry_delay),
            ..RuntimeConfig::default()
        }
    }
}

fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_config_carries_turn_settings() {
        let config = ClientConfig {
            retry_delay: Duration::from_millis(120),
            action_points: 2,
            ..ClientConfig::default()
        };
        let runtime = config.runtime_config();
        assert_eq!(runtime.turn.retry_delay, Duration::from_millis(120));
        assert_eq!(runtime.turn.action_points_per_turn, 2);
        assert_eq!(runtime.max_input_attempts, 4);
    }
}
