use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a game action is refused. Every variant leaves the game untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum GameError {
    #[error("malformed move: {0}")]
    MalformedMove(String),

    #[error("those tiles are not on your rack")]
    RackMismatch,

    #[error("{0} is not in the dictionary")]
    IllegalWord(String),

    #[error("tiles must form one word connected to the board (the first word must cross the centre)")]
    Disconnected,

    #[error("it is not your turn")]
    OutOfTurn,

    #[error("there is nothing to undo")]
    NothingToUndo,

    #[error("a game needs 1 to 4 players, got {0}")]
    PlayerCount(usize),
}
