pub mod game;

pub use game::{
    // Board and tiles
    Multiplier, PlayToken, Position, Square, Tile,
    // Moves and their results
    LogAction, LogEntry, Move, MoveTile, PlacedTile, RackTransfer, ScoreEntry, TurnState,
    // Rules constants
    BINGO_BONUS, BOARD_SIZE, RACK_SIZE,
};
