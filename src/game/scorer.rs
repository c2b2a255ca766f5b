use crate::{
    game::Board,
    models::{Position, ScoreEntry, BINGO_BONUS, RACK_SIZE},
    utils::letters::get_letter_value,
};

/// Score breakdown for one move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreResult {
    /// One entry per word, plus a bingo entry when earned
    pub entries: Vec<ScoreEntry>,
    /// Sum of all entries
    pub total: i32,
}

pub struct Scorer;

impl Scorer {
    /// Score every word formed by a move on a board that already carries the
    /// move's tiles (marked last-played).
    ///
    /// Scoring rules:
    /// - Each letter has a base value; blanks are worth 0
    /// - DL / TL multiply that letter's value by 2 / 3
    /// - DW / TW multiply the whole word by 2 / 3, and compound with each other
    /// - Premiums only count under tiles placed this move
    /// - +50 flat bonus when all seven tiles of a full rack are placed
    pub fn score_move(board: &Board, words: &[Vec<Position>], tiles_placed: usize) -> ScoreResult {
        let mut entries: Vec<ScoreEntry> = words
            .iter()
            .map(|positions| ScoreEntry::Word {
                word: Self::spell(board, positions),
                positions: positions.clone(),
                points: Self::score_word(board, positions),
            })
            .collect();

        if tiles_placed == RACK_SIZE {
            entries.push(ScoreEntry::Bingo {
                points: BINGO_BONUS,
            });
        }

        let total = entries.iter().map(ScoreEntry::points).sum();

        ScoreResult { entries, total }
    }

    /// Score a single word
    pub fn score_word(board: &Board, positions: &[Position]) -> i32 {
        let mut letter_score_total = 0;
        let mut word_multiplier = 1;

        for pos in positions {
            let Some(square) = board.get(*pos) else {
                continue;
            };
            let Some(letter) = square.letter else {
                continue;
            };

            let base_value = if square.is_blank {
                0
            } else {
                get_letter_value(letter) as i32
            };

            // A premium is spent by the tile that first covers it
            match square.multiplier().filter(|_| square.last_played) {
                Some(multiplier) => {
                    letter_score_total += base_value * multiplier.letter_factor();
                    word_multiplier *= multiplier.word_factor();
                }
                None => letter_score_total += base_value,
            }
        }

        letter_score_total * word_multiplier
    }

    fn spell(board: &Board, positions: &[Position]) -> String {
        positions
            .iter()
            .filter_map(|pos| board.letter_at(*pos))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlayToken;

    fn row_word(row: usize, cols: std::ops::Range<usize>) -> Vec<Position> {
        cols.map(|col| Position::new(row, col)).collect()
    }

    fn lay(board: &mut Board, row: usize, col: usize, word: &str) {
        for (i, letter) in word.chars().enumerate() {
            board.place(Position::new(row, col + i), PlayToken::Letter(letter));
        }
    }

    #[test]
    fn test_cat_across_centre() {
        // C at (7,6), A on the centre DW, T at (7,8)
        let mut board = Board::new();
        lay(&mut board, 7, 6, "CAT");

        let positions = row_word(7, 6..9);
        assert_eq!(Scorer::score_word(&board, &positions), 10);
    }

    #[test]
    fn test_letter_premium() {
        // (0,3) is DL
        let mut board = Board::new();
        lay(&mut board, 0, 3, "AX");

        let positions = row_word(0, 3..5);
        assert_eq!(Scorer::score_word(&board, &positions), 2 + 8);
    }

    #[test]
    fn test_word_premiums_compound() {
        // Row 0 runs from TW (0,0) to TW (0,7): two triple words
        let mut board = Board::new();
        lay(&mut board, 0, 0, "ABSENTS");
        board.place(Position::new(0, 7), PlayToken::Letter('S'));

        let positions = row_word(0, 0..8);
        // A1 B3 S1 E2 (DL) N1 T1 S1 S1 = 11
        assert_eq!(Scorer::score_word(&board, &positions), 11 * 3 * 3);
    }

    #[test]
    fn test_used_premium_scores_face_value() {
        let mut board = Board::new();
        lay(&mut board, 7, 6, "CAT");
        board.clear_last_played();

        let positions = row_word(7, 6..9);
        assert_eq!(Scorer::score_word(&board, &positions), 5);
    }

    #[test]
    fn test_blank_scores_zero_even_on_premium() {
        let mut board = Board::new();
        board.place(Position::new(7, 6), PlayToken::Letter('C'));
        board.place(Position::new(7, 7), PlayToken::Blank('A'));
        board.place(Position::new(7, 8), PlayToken::Letter('T'));

        let positions = row_word(7, 6..9);
        assert_eq!(Scorer::score_word(&board, &positions), (3 + 0 + 1) * 2);
    }

    #[test]
    fn test_bingo_adds_fifty() {
        let mut board = Board::new();
        lay(&mut board, 7, 4, "RETAINS");

        let words = vec![row_word(7, 4..11)];
        let with_bingo = Scorer::score_move(&board, &words, 7);
        let without = Scorer::score_move(&board, &words, 6);

        assert_eq!(with_bingo.total - without.total, 50);
        assert_eq!(with_bingo.entries.last(), Some(&ScoreEntry::Bingo { points: 50 }));
        assert!(matches!(
            &with_bingo.entries[0],
            ScoreEntry::Word { word, .. } if word == "RETAINS"
        ));
    }
}
