// Word-placement game engine

pub mod bag;
pub mod board;
pub mod engine;
pub mod error;
pub mod scorer;
pub mod validator;

pub use board::Board;
pub use engine::{Game, UndoReport, UndoVote};
pub use error::GameError;
pub use scorer::Scorer;

/// Source of legal words
pub trait Lexicon {
    /// True if `word` (uppercase letters) is a legal word of exactly its length
    fn contains(&self, word: &str) -> bool;
}
