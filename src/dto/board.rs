use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnNull, serde_as};

use crate::dto::TaskId;

/// Number of ordered tile slots on every gameboard.
pub const BOARD_SLOTS: usize = 40;

/// Record of a completed task occupying one gameboard slot.
///
/// Tiles are immutable once placed; the client never clears a set slot on
/// its own, only a wholesale server payload replaces board state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub task_id: TaskId,
    #[serde(default)]
    pub title: Option<String>,
    /// Value score the task was worth when it completed.
    #[serde(default)]
    pub value_score: u32,
}

/// Fixed 40-slot board of nullable tiles for one project.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gameboard {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub tiles: Vec<Option<Tile>>,
}

impl Gameboard {
    /// Board with all 40 slots unfilled.
    pub fn empty() -> Self {
        Self {
            tiles: vec![None; BOARD_SLOTS],
        }
    }

    /// Number of slots currently holding a tile.
    pub fn fill_count(&self) -> usize {
        self.tiles.iter().filter(|slot| slot.is_some()).count()
    }
}

impl Default for Gameboard {
    fn default() -> Self {
        Self::empty()
    }
}
