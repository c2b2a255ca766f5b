use std::collections::HashSet;

use crate::{
    game::{bag::Rack, scorer::ScoreResult, Board, GameError, Lexicon, Scorer},
    models::{Move, PlacedTile, Position, Tile, BOARD_SIZE},
};

/// Outcome of a move that passed every check. Nothing here has been applied
/// to the live game yet.
#[derive(Debug, Clone)]
pub enum Evaluation {
    Placement {
        /// Board with the move's tiles laid and marked last-played
        board: Board,
        score: ScoreResult,
        placed: Vec<PlacedTile>,
        /// Where the last-played markers sat before this move
        previous_last_played: Vec<Position>,
        /// Rack left after removing the played tiles
        remaining: Rack,
    },
    Exchange {
        tiles: Vec<Tile>,
        remaining: Rack,
    },
}

pub struct MoveValidator<'a, L: Lexicon + ?Sized> {
    lexicon: &'a L,
}

impl<'a, L: Lexicon + ?Sized> MoveValidator<'a, L> {
    pub fn new(lexicon: &'a L) -> Self {
        Self { lexicon }
    }

    /// Decide whether `mv` is legal for a player holding `rack`, and what it
    /// would score. Works on copies only.
    pub fn evaluate(&self, board: &Board, rack: &Rack, mv: &Move) -> Result<Evaluation, GameError> {
        if let Move::Placement(placed) = mv {
            Self::check_shape(board, placed)?;
        }

        let remaining = rack.fit(&mv.rack_tiles())?;

        let placed = match mv {
            Move::Exchange(tiles) => {
                return Ok(Evaluation::Exchange {
                    tiles: tiles.clone(),
                    remaining,
                })
            }
            Move::Placement(placed) => placed,
        };

        let mut scratch = board.clone();
        let previous_last_played = scratch.clear_last_played();
        for tile in placed {
            scratch.place(tile.position, tile.token);
        }

        let words = Self::candidate_words(&scratch);
        self.check_dictionary(&scratch, &words)?;
        Self::check_connectivity(&scratch, &words, placed)?;

        let score = Scorer::score_move(&scratch, &words, placed.len());

        Ok(Evaluation::Placement {
            board: scratch,
            score,
            placed: placed.clone(),
            previous_last_played,
            remaining,
        })
    }

    /// Every target must be a distinct empty square on the board
    fn check_shape(board: &Board, placed: &[PlacedTile]) -> Result<(), GameError> {
        if placed.is_empty() {
            return Err(GameError::MalformedMove("no tiles placed".to_string()));
        }

        let mut seen = HashSet::new();
        for tile in placed {
            let pos = tile.position;
            if !pos.in_bounds() {
                return Err(GameError::MalformedMove(format!(
                    "({}, {}) is off the board",
                    pos.row, pos.col
                )));
            }
            if !board.is_empty(pos) {
                return Err(GameError::MalformedMove(format!(
                    "({}, {}) is already taken",
                    pos.row, pos.col
                )));
            }
            if !seen.insert(pos) {
                return Err(GameError::MalformedMove(format!(
                    "({}, {}) is used twice",
                    pos.row, pos.col
                )));
            }
        }

        Ok(())
    }

    /// Maximal horizontal and vertical runs of two or more letters that include
    /// at least one last-played square. Horizontal runs come first.
    pub fn candidate_words(board: &Board) -> Vec<Vec<Position>> {
        let mut words = Vec::new();

        for (dr, dc) in [(0, 1), (1, 0)] {
            for row in 0..BOARD_SIZE {
                for col in 0..BOARD_SIZE {
                    let start = Position::new(row, col);
                    if board.letter_at(start).is_none() {
                        continue;
                    }
                    if row >= dr
                        && col >= dc
                        && board.letter_at(Position::new(row - dr, col - dc)).is_some()
                    {
                        continue;
                    }

                    let mut run = Vec::new();
                    let mut pos = start;
                    while board.letter_at(pos).is_some() {
                        run.push(pos);
                        pos = Position::new(pos.row + dr, pos.col + dc);
                    }

                    let touches_new = run
                        .iter()
                        .any(|p| board.get(*p).is_some_and(|square| square.last_played));
                    if run.len() >= 2 && touches_new {
                        words.push(run);
                    }
                }
            }
        }

        words
    }

    fn check_dictionary(&self, board: &Board, words: &[Vec<Position>]) -> Result<(), GameError> {
        for positions in words {
            let word: String = positions.iter().filter_map(|p| board.letter_at(*p)).collect();
            if !self.lexicon.contains(&word) {
                return Err(GameError::IllegalWord(word));
            }
        }
        Ok(())
    }

    /// One word must hold every placed tile. If no word reaches an older tile
    /// the move is the opening one and must cover the centre.
    fn check_connectivity(
        board: &Board,
        words: &[Vec<Position>],
        placed: &[PlacedTile],
    ) -> Result<(), GameError> {
        let main_word = words
            .iter()
            .find(|word| placed.iter().all(|tile| word.contains(&tile.position)))
            .ok_or(GameError::Disconnected)?;

        let touches_existing = words.iter().flatten().any(|pos| {
            board
                .get(*pos)
                .is_some_and(|square| !square.is_empty() && !square.last_played)
        });

        if !touches_existing && !main_word.contains(&Board::CENTER) {
            return Err(GameError::Disconnected);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dictionary::Dictionary,
        models::{PlayToken, ScoreEntry},
    };

    fn dictionary() -> Dictionary {
        Dictionary::from_words(["CAT", "CATS", "AT", "TA", "ACT", "SCAT"])
    }

    fn rack(s: &str) -> Rack {
        Rack::from_tiles(s.chars().map(|c| if c == '?' { Tile::Blank } else { Tile::Letter(c) }).collect())
    }

    fn across(row: usize, col: usize, word: &str) -> Move {
        Move::Placement(
            word.chars()
                .enumerate()
                .map(|(i, letter)| PlacedTile {
                    position: Position::new(row, col + i),
                    token: PlayToken::Letter(letter),
                })
                .collect(),
        )
    }

    fn commit(board: &Board, rack_tiles: &str, mv: &Move) -> Board {
        let dict = dictionary();
        match MoveValidator::new(&dict).evaluate(board, &rack(rack_tiles), mv).unwrap() {
            Evaluation::Placement { board, .. } => board,
            Evaluation::Exchange { .. } => panic!("expected placement"),
        }
    }

    #[test]
    fn test_first_word_scores_centre_premium() {
        let dict = dictionary();
        let result = MoveValidator::new(&dict)
            .evaluate(&Board::new(), &rack("CATXYZQ"), &across(7, 6, "CAT"))
            .unwrap();

        let Evaluation::Placement { score, remaining, .. } = result else {
            panic!("expected placement");
        };
        assert_eq!(score.total, 10);
        assert_eq!(remaining.sorted(), rack("QXYZ").sorted());
    }

    #[test]
    fn test_first_word_must_cover_centre() {
        let dict = dictionary();
        let result = MoveValidator::new(&dict).evaluate(&Board::new(), &rack("CAT"), &across(3, 3, "CAT"));
        assert_eq!(result.unwrap_err(), GameError::Disconnected);
    }

    #[test]
    fn test_unknown_word_rejected() {
        let dict = dictionary();
        let result = MoveValidator::new(&dict).evaluate(&Board::new(), &rack("TAC"), &across(7, 6, "TCA"));
        assert_eq!(result.unwrap_err(), GameError::IllegalWord("TCA".to_string()));
    }

    #[test]
    fn test_rack_mismatch() {
        let dict = dictionary();
        let result = MoveValidator::new(&dict).evaluate(&Board::new(), &rack("CAX"), &across(7, 6, "CAT"));
        assert_eq!(result.unwrap_err(), GameError::RackMismatch);
    }

    #[test]
    fn test_occupied_target_is_malformed() {
        let board = commit(&Board::new(), "CAT", &across(7, 6, "CAT"));
        let dict = dictionary();
        let result = MoveValidator::new(&dict).evaluate(&board, &rack("A"), &across(7, 7, "A"));
        assert!(matches!(result, Err(GameError::MalformedMove(_))));
    }

    #[test]
    fn test_duplicate_target_is_malformed() {
        let dict = dictionary();
        let mv = Move::Placement(vec![
            PlacedTile { position: Position::new(7, 7), token: PlayToken::Letter('A') },
            PlacedTile { position: Position::new(7, 7), token: PlayToken::Letter('T') },
        ]);
        let result = MoveValidator::new(&dict).evaluate(&Board::new(), &rack("AT"), &mv);
        assert!(matches!(result, Err(GameError::MalformedMove(_))));
    }

    #[test]
    fn test_extending_a_word_uses_face_value_for_old_tiles() {
        let board = commit(&Board::new(), "CAT", &across(7, 6, "CAT"));
        let dict = dictionary();
        let result = MoveValidator::new(&dict)
            .evaluate(&board, &rack("S"), &across(7, 9, "S"))
            .unwrap();

        let Evaluation::Placement { score, previous_last_played, .. } = result else {
            panic!("expected placement");
        };
        // C3 A1 T1 S1, centre DW already used
        assert_eq!(score.total, 6);
        assert_eq!(previous_last_played.len(), 3);
    }

    #[test]
    fn test_gapped_tiles_are_disconnected() {
        let board = commit(&Board::new(), "CAT", &across(7, 6, "CAT"));
        let mv = Move::Placement(vec![
            PlacedTile { position: Position::new(6, 6), token: PlayToken::Letter('A') },
            PlacedTile { position: Position::new(6, 8), token: PlayToken::Letter('A') },
        ]);
        // forms AC and AT downwards, which are separate words
        let dict = Dictionary::from_words(["CAT", "AC", "AT"]);
        let result = MoveValidator::new(&dict).evaluate(&board, &rack("AA"), &mv);
        assert_eq!(result.unwrap_err(), GameError::Disconnected);
    }

    #[test]
    fn test_isolated_tiles_are_disconnected() {
        let board = commit(&Board::new(), "CAT", &across(7, 6, "CAT"));
        let dict = dictionary();
        let result = MoveValidator::new(&dict).evaluate(&board, &rack("AT"), &across(2, 2, "AT"));
        assert_eq!(result.unwrap_err(), GameError::Disconnected);
    }

    #[test]
    fn test_single_tile_hooks_existing_word() {
        let board = commit(&Board::new(), "CAT", &across(7, 6, "CAT"));
        let dict = dictionary();
        // A under the T forms TA downwards
        let mv = Move::Placement(vec![PlacedTile {
            position: Position::new(8, 8),
            token: PlayToken::Letter('A'),
        }]);
        let result = MoveValidator::new(&dict).evaluate(&board, &rack("A"), &mv).unwrap();
        let Evaluation::Placement { score, .. } = result else {
            panic!("expected placement");
        };
        assert_eq!(score.entries.len(), 1);
        // (8,8) is DL: T1 + A2
        assert_eq!(score.total, 3);
    }

    #[test]
    fn test_parallel_play_scores_main_word_and_cross_words() {
        let board = commit(&Board::new(), "CAT", &across(7, 6, "CAT"));
        let dict = dictionary();
        // TA under the A and T of CAT also forms AT and TA downwards
        let result = MoveValidator::new(&dict)
            .evaluate(&board, &rack("TA"), &across(8, 7, "TA"))
            .unwrap();
        let Evaluation::Placement { score, .. } = result else {
            panic!("expected placement");
        };

        let points: Vec<i32> = score.entries.iter().map(ScoreEntry::points).collect();
        // (8,8) is DL: TA across 1+2, AT down 1+1, TA down 1+2
        assert_eq!(points, vec![3, 2, 3]);
        assert_eq!(score.total, 8);
        assert_eq!(
            score.entries[0],
            ScoreEntry::Word {
                word: "TA".to_string(),
                positions: vec![Position::new(8, 7), Position::new(8, 8)],
                points: 3,
            }
        );
    }

    #[test]
    fn test_main_word_connected_only_through_cross_word() {
        let board = commit(&Board::new(), "CAT", &across(7, 6, "CAT"));
        let dict = dictionary();
        // AT on row 8 touches nothing old itself; its A hangs under the T as TA
        let result = MoveValidator::new(&dict)
            .evaluate(&board, &rack("AT"), &across(8, 8, "AT"))
            .unwrap();
        let Evaluation::Placement { score, .. } = result else {
            panic!("expected placement");
        };

        let words: Vec<&str> = score
            .entries
            .iter()
            .map(|entry| match entry {
                ScoreEntry::Word { word, .. } => word.as_str(),
                ScoreEntry::Bingo { .. } => "bingo",
            })
            .collect();
        assert_eq!(words, vec!["AT", "TA"]);
        // AT across A2+T1, TA down T1+A2
        assert_eq!(score.total, 6);
    }

    #[test]
    fn test_blank_placement_scores_zero_for_blank() {
        let dict = dictionary();
        let mv = Move::Placement(vec![
            PlacedTile { position: Position::new(7, 6), token: PlayToken::Letter('C') },
            PlacedTile { position: Position::new(7, 7), token: PlayToken::Blank('A') },
            PlacedTile { position: Position::new(7, 8), token: PlayToken::Letter('T') },
        ]);
        let result = MoveValidator::new(&dict).evaluate(&Board::new(), &rack("C?T"), &mv).unwrap();
        let Evaluation::Placement { score, board, .. } = result else {
            panic!("expected placement");
        };
        assert_eq!(score.total, 8);
        assert!(board.get(Position::new(7, 7)).unwrap().is_blank);
        assert!(matches!(&score.entries[0], ScoreEntry::Word { word, .. } if word == "CAT"));
    }

    #[test]
    fn test_blank_letter_does_not_match_lettered_tile() {
        let dict = dictionary();
        let mv = Move::Placement(vec![
            PlacedTile { position: Position::new(7, 7), token: PlayToken::Blank('A') },
            PlacedTile { position: Position::new(7, 8), token: PlayToken::Letter('T') },
        ]);
        let result = MoveValidator::new(&dict).evaluate(&Board::new(), &rack("AT"), &mv);
        assert_eq!(result.unwrap_err(), GameError::RackMismatch);
    }

    #[test]
    fn test_exchange_skips_board_checks() {
        let dict = Dictionary::empty();
        let mv = Move::Exchange(vec![Tile::Letter('Q')]);
        let result = MoveValidator::new(&dict).evaluate(&Board::new(), &rack("QA"), &mv).unwrap();
        let Evaluation::Exchange { tiles, remaining } = result else {
            panic!("expected exchange");
        };
        assert_eq!(tiles, vec![Tile::Letter('Q')]);
        assert_eq!(remaining.tiles(), &[Tile::Letter('A')]);
    }

    #[test]
    fn test_candidate_words_ignore_old_runs() {
        let mut board = commit(&Board::new(), "CAT", &across(7, 6, "CAT"));
        board.clear_last_played();
        assert!(MoveValidator::<Dictionary>::candidate_words(&board).is_empty());
    }
}
