use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::GameError;

/// Side length of the square board
pub const BOARD_SIZE: usize = 15;
/// Tiles a rack holds when full
pub const RACK_SIZE: usize = 7;
/// Flat bonus for placing a full rack in one move
pub const BINGO_BONUS: i32 = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    pub fn in_bounds(&self) -> bool {
        self.row < BOARD_SIZE && self.col < BOARD_SIZE
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Multiplier {
    #[serde(rename = "DL")]
    DoubleLetter,
    #[serde(rename = "TL")]
    TripleLetter,
    #[serde(rename = "DW")]
    DoubleWord,
    #[serde(rename = "TW")]
    TripleWord,
}

impl Multiplier {
    /// Factor applied to the letter on this square
    pub fn letter_factor(self) -> i32 {
        match self {
            Multiplier::DoubleLetter => 2,
            Multiplier::TripleLetter => 3,
            _ => 1,
        }
    }

    /// Factor applied to every word running through this square
    pub fn word_factor(self) -> i32 {
        match self {
            Multiplier::DoubleWord => 2,
            Multiplier::TripleWord => 3,
            _ => 1,
        }
    }
}

/// A physical tile, as it sits in the bag or in a rack
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum Tile {
    Letter(char),
    Blank,
}

/// A tile as it is played onto the board. A blank carries the letter it stands for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PlayToken {
    Letter(char),
    Blank(char),
}

impl PlayToken {
    /// Letter shown on the board
    pub fn letter(self) -> char {
        match self {
            PlayToken::Letter(letter) | PlayToken::Blank(letter) => letter,
        }
    }

    /// The rack tile this token consumes
    pub fn rack_tile(self) -> Tile {
        match self {
            PlayToken::Letter(letter) => Tile::Letter(letter),
            PlayToken::Blank(_) => Tile::Blank,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Square {
    multiplier: Option<Multiplier>,
    pub letter: Option<char>,
    pub is_blank: bool,
    pub last_played: bool,
}

impl Square {
    pub fn new(multiplier: Option<Multiplier>) -> Self {
        Self {
            multiplier,
            letter: None,
            is_blank: false,
            last_played: false,
        }
    }

    /// Premium printed on the square. Fixed for the lifetime of the board.
    pub fn multiplier(&self) -> Option<Multiplier> {
        self.multiplier
    }

    pub fn is_empty(&self) -> bool {
        self.letter.is_none()
    }

    /// Tile that would go back to a rack if this square were cleared
    pub fn tile(&self) -> Option<Tile> {
        self.letter.map(|letter| {
            if self.is_blank {
                Tile::Blank
            } else {
                Tile::Letter(letter)
            }
        })
    }

    pub fn place(&mut self, token: PlayToken) {
        self.letter = Some(token.letter());
        self.is_blank = matches!(token, PlayToken::Blank(_));
        self.last_played = true;
    }

    pub fn clear(&mut self) -> Option<Tile> {
        let tile = self.tile();
        self.letter = None;
        self.is_blank = false;
        self.last_played = false;
        tile
    }
}

/// One tile of a move as sent by a client. `target` is absent for exchanges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveTile {
    pub tile: Tile,
    #[serde(default)]
    pub letter: Option<char>,
    #[serde(default)]
    pub target: Option<Position>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlacedTile {
    pub position: Position,
    pub token: PlayToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Move {
    /// Tiles laid on empty squares
    Placement(Vec<PlacedTile>),
    /// Tiles swapped with the bag. An empty exchange is a pass.
    Exchange(Vec<Tile>),
}

impl Move {
    pub fn pass() -> Self {
        Move::Exchange(Vec::new())
    }

    /// Rack tiles the move needs
    pub fn rack_tiles(&self) -> Vec<Tile> {
        match self {
            Move::Placement(placed) => placed.iter().map(|p| p.token.rack_tile()).collect(),
            Move::Exchange(tiles) => tiles.clone(),
        }
    }
}

fn normalize_letter(letter: char) -> Result<char, GameError> {
    let upper = letter.to_ascii_uppercase();
    if upper.is_ascii_uppercase() {
        Ok(upper)
    } else {
        Err(GameError::MalformedMove(format!("'{}' is not a letter", letter)))
    }
}

impl TryFrom<Vec<MoveTile>> for Move {
    type Error = GameError;

    fn try_from(tiles: Vec<MoveTile>) -> Result<Self, Self::Error> {
        let targeted = tiles.iter().filter(|t| t.target.is_some()).count();

        if targeted == 0 {
            let exchanged = tiles
                .into_iter()
                .map(|t| match t.tile {
                    Tile::Letter(letter) => normalize_letter(letter).map(Tile::Letter),
                    Tile::Blank => Ok(Tile::Blank),
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Move::Exchange(exchanged));
        }

        if targeted != tiles.len() {
            return Err(GameError::MalformedMove(
                "either every tile or no tile must have a target".to_string(),
            ));
        }

        let placed = tiles
            .into_iter()
            .map(|t| {
                let Some(position) = t.target else {
                    return Err(GameError::MalformedMove("missing target".to_string()));
                };
                let token = match (t.tile, t.letter) {
                    (Tile::Letter(letter), None) => PlayToken::Letter(normalize_letter(letter)?),
                    (Tile::Letter(letter), Some(declared)) => {
                        let letter = normalize_letter(letter)?;
                        if normalize_letter(declared)? != letter {
                            return Err(GameError::MalformedMove(format!(
                                "tile {} cannot be played as {}",
                                letter, declared
                            )));
                        }
                        PlayToken::Letter(letter)
                    }
                    (Tile::Blank, Some(declared)) => PlayToken::Blank(normalize_letter(declared)?),
                    (Tile::Blank, None) => {
                        return Err(GameError::MalformedMove(
                            "a blank needs a designated letter".to_string(),
                        ))
                    }
                };
                Ok(PlacedTile { position, token })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Move::Placement(placed))
    }
}

/// One line of a move's score breakdown
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreEntry {
    Word {
        word: String,
        positions: Vec<Position>,
        points: i32,
    },
    Bingo {
        points: i32,
    },
}

impl ScoreEntry {
    pub fn points(&self) -> i32 {
        match self {
            ScoreEntry::Word { points, .. } | ScoreEntry::Bingo { points } => *points,
        }
    }
}

/// Points one player lost to the player who went out
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RackTransfer {
    pub seat: usize,
    pub points: i32,
}

/// What a committed entry did, with just enough detail to reverse it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogAction {
    Placement {
        words: Vec<ScoreEntry>,
        total: i32,
        placed: Vec<PlacedTile>,
        /// Squares that carried the last-played marker before this move
        previous_last_played: Vec<Position>,
        /// Tiles drawn from the bag to refill the rack
        drawn: Vec<Tile>,
    },
    Exchange {
        exchanged: Vec<Tile>,
        drawn: Vec<Tile>,
    },
    FinalTally {
        transfers: Vec<RackTransfer>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub seat: usize,
    pub action: LogAction,
    pub at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(seat: usize, action: LogAction) -> Self {
        Self {
            seat,
            action,
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TurnState {
    AwaitingMove { seat: usize },
    Ended,
}
