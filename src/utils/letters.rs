use std::collections::HashMap;
use once_cell::sync::Lazy;

use crate::models::Tile;

/// Number of blank tiles in a fresh bag
pub const BLANK_COUNT: usize = 2;

/// Point value of a tile in a player's rack or on the board
pub static LETTER_VALUES: Lazy<HashMap<char, u8>> = Lazy::new(|| {
    let mut map = HashMap::new();

    for ch in ['A', 'E', 'I', 'O', 'U', 'L', 'N', 'R', 'S', 'T'] {
        map.insert(ch, 1);
    }

    for ch in ['D', 'G'] {
        map.insert(ch, 2);
    }

    for ch in ['B', 'C', 'M', 'P'] {
        map.insert(ch, 3);
    }

    for ch in ['F', 'H', 'V', 'W', 'Y'] {
        map.insert(ch, 4);
    }

    map.insert('K', 5);

    for ch in ['J', 'X'] {
        map.insert(ch, 8);
    }

    for ch in ['Q', 'Z'] {
        map.insert(ch, 10);
    }

    map
});

/// How many copies of each letter go into a fresh bag (blanks excluded)
pub static LETTER_DISTRIBUTION: Lazy<Vec<(char, usize)>> = Lazy::new(|| {
    vec![
        ('A', 9),
        ('B', 2),
        ('C', 2),
        ('D', 4),
        ('E', 12),
        ('F', 2),
        ('G', 3),
        ('H', 2),
        ('I', 9),
        ('J', 1),
        ('K', 1),
        ('L', 4),
        ('M', 2),
        ('N', 6),
        ('O', 8),
        ('P', 2),
        ('Q', 1),
        ('R', 6),
        ('S', 4),
        ('T', 6),
        ('U', 4),
        ('V', 2),
        ('W', 2),
        ('X', 1),
        ('Y', 2),
        ('Z', 1),
    ]
});

/// Get the point value for a letter. Unknown characters are worth nothing.
pub fn get_letter_value(letter: char) -> u8 {
    let upper = letter.to_ascii_uppercase();
    LETTER_VALUES.get(&upper).copied().unwrap_or(0)
}

/// Point value of a tile as held in a rack. Blanks are always worth 0.
pub fn tile_value(tile: Tile) -> u8 {
    match tile {
        Tile::Letter(letter) => get_letter_value(letter),
        Tile::Blank => 0,
    }
}

/// Full starting composition of the bag, unshuffled
pub fn initial_tiles() -> Vec<Tile> {
    let mut tiles: Vec<Tile> = LETTER_DISTRIBUTION
        .iter()
        .flat_map(|(letter, count)| std::iter::repeat(Tile::Letter(*letter)).take(*count))
        .collect();
    tiles.extend(std::iter::repeat(Tile::Blank).take(BLANK_COUNT));
    tiles
}

/// Total number of tiles in play for one game
pub fn total_tile_count() -> usize {
    LETTER_DISTRIBUTION.iter().map(|(_, count)| count).sum::<usize>() + BLANK_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_values() {
        assert_eq!(get_letter_value('E'), 1);
        assert_eq!(get_letter_value('q'), 10);
        assert_eq!(get_letter_value('X'), 8);
        assert_eq!(get_letter_value('C'), 3);
        assert_eq!(get_letter_value('?'), 0);
    }

    #[test]
    fn test_blank_is_worthless() {
        assert_eq!(tile_value(Tile::Blank), 0);
        assert_eq!(tile_value(Tile::Letter('Z')), 10);
    }

    #[test]
    fn test_bag_composition() {
        assert_eq!(LETTER_DISTRIBUTION.len(), 26);
        assert_eq!(total_tile_count(), 100);

        let tiles = initial_tiles();
        assert_eq!(tiles.len(), 100);
        assert_eq!(tiles.iter().filter(|t| **t == Tile::Blank).count(), 2);
        assert_eq!(tiles.iter().filter(|t| **t == Tile::Letter('E')).count(), 12);
    }

    #[test]
    fn test_every_distributed_letter_has_a_value() {
        for (letter, _) in LETTER_DISTRIBUTION.iter() {
            assert!(get_letter_value(*letter) > 0, "{} has no value", letter);
        }
    }
}
