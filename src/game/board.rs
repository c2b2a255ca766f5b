use serde::{Deserialize, Serialize};

use crate::models::{Multiplier, PlayToken, Position, Square, Tile, BOARD_SIZE};

/// The 15x15 playing surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    rows: Vec<Vec<Square>>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// Square every first word has to cover
    pub const CENTER: Position = Position {
        row: BOARD_SIZE / 2,
        col: BOARD_SIZE / 2,
    };

    /// Build an empty board with the standard premium layout
    pub fn new() -> Self {
        let rows = (0..BOARD_SIZE)
            .map(|row| {
                (0..BOARD_SIZE)
                    .map(|col| Square::new(Self::classify(row, col)))
                    .collect()
            })
            .collect();

        Self { rows }
    }

    /// Premium for a square. The layout is folded into one octant by mirroring
    /// across both centre lines and the diagonal, so only distances from the
    /// nearest edges matter.
    pub fn classify(row: usize, col: usize) -> Option<Multiplier> {
        let last = BOARD_SIZE - 1;
        let r = row.min(last - row);
        let c = col.min(last - col);
        let (near, far) = (r.min(c), r.max(c));

        match (near, far) {
            (0, 0) | (0, 7) => Some(Multiplier::TripleWord),
            (7, 7) => Some(Multiplier::DoubleWord),
            (n, f) if n == f && (1..=4).contains(&n) => Some(Multiplier::DoubleWord),
            (1, 5) | (5, 5) => Some(Multiplier::TripleLetter),
            (0, 3) | (2, 6) | (3, 7) | (6, 6) => Some(Multiplier::DoubleLetter),
            _ => None,
        }
    }

    pub fn get(&self, pos: Position) -> Option<&Square> {
        self.rows.get(pos.row).and_then(|row| row.get(pos.col))
    }

    fn get_mut(&mut self, pos: Position) -> Option<&mut Square> {
        self.rows.get_mut(pos.row).and_then(|row| row.get_mut(pos.col))
    }

    /// True for an on-board square without a letter
    pub fn is_empty(&self, pos: Position) -> bool {
        self.get(pos).is_some_and(Square::is_empty)
    }

    pub fn letter_at(&self, pos: Position) -> Option<char> {
        self.get(pos).and_then(|square| square.letter)
    }

    pub fn place(&mut self, pos: Position, token: PlayToken) {
        if let Some(square) = self.get_mut(pos) {
            square.place(token);
        }
    }

    /// Lift the tile off a square, returning what goes back to the rack
    pub fn clear(&mut self, pos: Position) -> Option<Tile> {
        self.get_mut(pos).and_then(Square::clear)
    }

    /// Remove every last-played marker, returning where they were
    pub fn clear_last_played(&mut self) -> Vec<Position> {
        let mut cleared = Vec::new();
        for (row, squares) in self.rows.iter_mut().enumerate() {
            for (col, square) in squares.iter_mut().enumerate() {
                if square.last_played {
                    square.last_played = false;
                    cleared.push(Position { row, col });
                }
            }
        }
        cleared
    }

    pub fn mark_last_played(&mut self, positions: &[Position]) {
        for pos in positions {
            if let Some(square) = self.get_mut(*pos) {
                if !square.is_empty() {
                    square.last_played = true;
                }
            }
        }
    }

    pub fn placed_tile_count(&self) -> usize {
        self.rows
            .iter()
            .flatten()
            .filter(|square| !square.is_empty())
            .count()
    }

    pub fn rows(&self) -> &[Vec<Square>] {
        &self.rows
    }
}
