//! Demo arena and player script parsing.
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use turn_core::{CommandKind, Controller, Direction, UnitId, UnitRoster, UnitState};
use turn_runtime::{GridMap, ScriptStep};

/// Built-in arena: the player (`@`) and three goblins (`g`) around a pillar.
pub const DEFAULT_MAP: &str = "\
##########
#g......g#
#........#
#...##...#
#...##...#
#........#
#...@....#
#......g.#
##########";

/// Short walk along the south side of the pillar.
pub const DEFAULT_SCRIPT: &str = "n,turn_facing:e,e,e,wait,s";

/// Builds the roster from the map's spawn tiles.
///
/// `@` is the player; every other letter spawns an AI unit, numbered in
/// reading order from 1.
pub fn roster_from_map(map: &GridMap) -> Result<UnitRoster> {
    let mut units = UnitRoster::new();
    let mut next_ai = 1;
    for &(tile, cell) in map.spawns() {
        let unit = if tile == '@' {
            if units.contains(UnitId::PLAYER) {
                bail!("map has more than one player spawn");
            }
            UnitState::new(UnitId::PLAYER, Controller::Player, cell)
        } else {
            let id = UnitId(next_ai);
            next_ai += 1;
            UnitState::new(id, Controller::Ai, cell)
        };
        units.insert(unit);
    }
    if !units.contains(UnitId::PLAYER) {
        bail!("map has no player spawn '@'");
    }
    Ok(units)
}

/// Parses `move`-style tokens such as `n,ne,wait,turn_facing:w,attack:s`.
///
/// A bare compass token is a move; `kind:dir` picks the command kind.
pub fn parse_script(script: &str) -> Result<Vec<ScriptStep>> {
    script
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(parse_step)
        .collect()
}

fn parse_step(token: &str) -> Result<ScriptStep> {
    if let Some(direction) = parse_direction(token) {
        return Ok(ScriptStep::Input {
            kind: CommandKind::Move,
            direction,
        });
    }

    let (kind, direction) = match token.split_once(':') {
        Some((kind, dir)) => {
            let direction = parse_direction(dir)
                .with_context(|| format!("unknown direction {dir:?} in {token:?}"))?;
            (kind, direction)
        }
        None => (token, Direction::ZERO),
    };
    let kind = CommandKind::from_str(kind)
        .map_err(|_| anyhow!("unknown command kind in {token:?}"))?;
    Ok(ScriptStep::Input { kind, direction })
}

fn parse_direction(token: &str) -> Option<Direction> {
    let (dx, dy) = match token.to_ascii_lowercase().as_str() {
        "n" => (0, 1),
        "s" => (0, -1),
        "e" => (1, 0),
        "w" => (-1, 0),
        "ne" => (1, 1),
        "nw" => (-1, 1),
        "se" => (1, -1),
        "sw" => (-1, -1),
        _ => return None,
    };
    Some(Direction::clamped(dx, dy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use turn_core::Cell;

    #[test]
    fn default_map_spawns_player_and_goblins() {
        let map = GridMap::parse(DEFAULT_MAP).expect("built-in map parses");
        let units = roster_from_map(&map).expect("roster");
        assert_eq!(units.len(), 4);
        let player = units.get(UnitId::PLAYER).expect("player");
        assert_eq!(player.cell, Cell::new(4, 2));
        assert!(units.iter().filter(|u| !u.is_player_controlled()).count() == 3);
    }

    #[test]
    fn map_without_player_is_rejected() {
        let map = GridMap::parse("###\n#g#\n###").expect("map parses");
        assert!(roster_from_map(&map).is_err());
    }

    #[test]
    fn script_tokens() {
        let steps = parse_script("n, se ,wait,turn_facing:w,").expect("script parses");
        assert_eq!(
            steps,
            vec![
                ScriptStep::Input { kind: CommandKind::Move, direction: Direction::NORTH },
                ScriptStep::Input {
                    kind: CommandKind::Move,
                    direction: Direction::clamped(1, -1),
                },
                ScriptStep::Input { kind: CommandKind::Wait, direction: Direction::ZERO },
                ScriptStep::Input { kind: CommandKind::TurnFacing, direction: Direction::WEST },
            ]
        );
        assert!(parse_script("fly").is_err());
        assert!(parse_script("move:up").is_err());
    }
}
