use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::{
    game::GameError,
    models::{Tile, RACK_SIZE},
    utils::letters::{initial_tiles, tile_value, total_tile_count},
};

/// Tiles not yet drawn by anyone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bag {
    tiles: Vec<Tile>,
}

impl Bag {
    /// A full bag in random order
    pub fn new_shuffled() -> Self {
        let mut bag = Self::from_tiles(initial_tiles());
        debug_assert_eq!(bag.len(), total_tile_count());
        bag.shuffle();
        bag
    }

    /// A bag holding exactly these tiles. Draws take from the end.
    pub fn from_tiles(tiles: Vec<Tile>) -> Self {
        Self { tiles }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Remove up to `n` tiles. Returns fewer when the bag runs out.
    pub fn draw(&mut self, n: usize) -> Vec<Tile> {
        let keep = self.tiles.len().saturating_sub(n);
        self.tiles.split_off(keep)
    }

    /// Put tiles back and mix them in
    pub fn return_and_shuffle(&mut self, tiles: impl IntoIterator<Item = Tile>) {
        self.tiles.extend(tiles);
        self.shuffle();
    }

    /// Pull these exact tiles out of the bag, or nothing if any is missing
    pub fn take_exact(&mut self, wanted: &[Tile]) -> Option<Vec<Tile>> {
        let remaining = take_matching(&self.tiles, wanted)?;
        self.tiles = remaining;
        Some(wanted.to_vec())
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    fn shuffle(&mut self) {
        self.tiles.shuffle(&mut rand::rng());
    }
}

/// Tiles held by one player
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rack {
    tiles: Vec<Tile>,
}

impl Rack {
    pub fn from_tiles(tiles: Vec<Tile>) -> Self {
        Self { tiles }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Top the rack up to seven tiles, returning what was drawn
    pub fn refill(&mut self, bag: &mut Bag) -> Vec<Tile> {
        let drawn = bag.draw(RACK_SIZE.saturating_sub(self.tiles.len()));
        self.tiles.extend(drawn.iter().copied());
        drawn
    }

    /// Check that every wanted tile can be matched to its own rack tile.
    /// Returns the rack that would remain.
    pub fn fit(&self, wanted: &[Tile]) -> Result<Rack, GameError> {
        take_matching(&self.tiles, wanted)
            .map(Rack::from_tiles)
            .ok_or(GameError::RackMismatch)
    }

    /// Remove these tiles from the rack
    pub fn remove(&mut self, tiles: &[Tile]) -> Result<(), GameError> {
        *self = self.fit(tiles)?;
        Ok(())
    }

    pub fn add(&mut self, tiles: impl IntoIterator<Item = Tile>) {
        self.tiles.extend(tiles);
    }

    /// Sum of face values still on the rack
    pub fn point_value(&self) -> i32 {
        self.tiles.iter().map(|t| tile_value(*t) as i32).sum()
    }

    /// Rack contents in a stable order, for comparing racks as multisets
    pub fn sorted(&self) -> Vec<Tile> {
        let mut tiles = self.tiles.clone();
        tiles.sort();
        tiles
    }
}

/// Greedy multiset match: each wanted tile consumes one distinct pool entry
fn take_matching(pool: &[Tile], wanted: &[Tile]) -> Option<Vec<Tile>> {
    let mut remaining = pool.to_vec();
    for tile in wanted {
        let idx = remaining.iter().position(|t| t == tile)?;
        remaining.swap_remove(idx);
    }
    Some(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letters(s: &str) -> Vec<Tile> {
        s.chars().map(Tile::Letter).collect()
    }

    #[test]
    fn test_new_bag_is_full() {
        let bag = Bag::new_shuffled();
        assert_eq!(bag.len(), 100);
    }

    #[test]
    fn test_draw_stops_at_empty() {
        let mut bag = Bag::from_tiles(letters("ABC"));
        assert_eq!(bag.draw(2).len(), 2);
        assert_eq!(bag.draw(5).len(), 1);
        assert!(bag.draw(1).is_empty());
        assert!(bag.is_empty());
    }

    #[test]
    fn test_refill_tops_up_to_seven() {
        let mut bag = Bag::from_tiles(letters("ABCDEFGHIJ"));
        let mut rack = Rack::from_tiles(letters("XY"));
        let drawn = rack.refill(&mut bag);
        assert_eq!(drawn.len(), 5);
        assert_eq!(rack.len(), 7);
        assert_eq!(bag.len(), 5);

        assert!(rack.refill(&mut bag).is_empty());
    }

    #[test]
    fn test_refill_with_short_bag() {
        let mut bag = Bag::from_tiles(letters("AB"));
        let mut rack = Rack::default();
        rack.refill(&mut bag);
        assert_eq!(rack.len(), 2);
        assert!(bag.is_empty());
    }

    #[test]
    fn test_fit_counts_duplicates() {
        let rack = Rack::from_tiles(letters("AAB"));
        assert!(rack.fit(&letters("AA")).is_ok());
        assert_eq!(rack.fit(&letters("AAA")), Err(GameError::RackMismatch));
        assert_eq!(rack.fit(&letters("AB")).unwrap().tiles(), &letters("A")[..]);
    }

    #[test]
    fn test_blank_only_matches_blank() {
        let rack = Rack::from_tiles(vec![Tile::Letter('A'), Tile::Blank]);
        assert!(rack.fit(&[Tile::Blank]).is_ok());
        assert_eq!(rack.fit(&[Tile::Blank, Tile::Blank]), Err(GameError::RackMismatch));
        assert_eq!(rack.fit(&[Tile::Letter('B')]), Err(GameError::RackMismatch));
    }

    #[test]
    fn test_take_exact_from_bag() {
        let mut bag = Bag::from_tiles(letters("QUIZ"));
        assert_eq!(bag.take_exact(&letters("ZQ")), Some(letters("ZQ")));
        assert_eq!(bag.len(), 2);
        assert_eq!(bag.take_exact(&letters("Z")), None);
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn test_return_and_shuffle_keeps_tiles() {
        let mut bag = Bag::from_tiles(letters("AB"));
        bag.return_and_shuffle(letters("CD"));
        let mut tiles = bag.tiles().to_vec();
        tiles.sort();
        assert_eq!(tiles, letters("ABCD"));
    }

    #[test]
    fn test_point_value() {
        let rack = Rack::from_tiles(vec![Tile::Letter('Q'), Tile::Letter('A'), Tile::Blank]);
        assert_eq!(rack.point_value(), 11);
    }
}
