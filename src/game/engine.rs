use std::collections::BTreeSet;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::{
    game::{
        bag::{Bag, Rack},
        validator::{Evaluation, MoveValidator},
        Board, GameError, Lexicon,
    },
    models::{LogAction, LogEntry, Move, RackTransfer, ScoreEntry, TurnState},
};

/// Fewest and most seats a game can have
pub const MIN_PLAYERS: usize = 1;
pub const MAX_PLAYERS: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub rack: Rack,
    pub score: i32,
}

/// Result of casting or withdrawing an undo vote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoVote {
    /// Agreement is not complete yet
    Pending { votes: Vec<usize> },
    /// Everyone connected agreed and the last move was reversed
    Undone(UndoReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoReport {
    /// Seat whose move was reversed, and who now moves again
    pub seat: usize,
    /// Log entries removed, oldest first
    pub undone: Vec<LogEntry>,
}

/// Authoritative state of one word-placement game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    board: Board,
    bag: Bag,
    players: Vec<PlayerState>,
    turn: TurnState,
    log: Vec<LogEntry>,
    undo_votes: BTreeSet<usize>,
}

impl Game {
    /// Start a game with a freshly shuffled bag
    pub fn new(player_count: usize) -> Result<Self, GameError> {
        Self::with_bag(player_count, Bag::new_shuffled())
    }

    /// Start a game drawing from `bag`. Seats fill their racks in seating order.
    pub fn with_bag(player_count: usize, mut bag: Bag) -> Result<Self, GameError> {
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&player_count) {
            return Err(GameError::PlayerCount(player_count));
        }

        let players = (0..player_count)
            .map(|_| {
                let mut rack = Rack::default();
                rack.refill(&mut bag);
                PlayerState { rack, score: 0 }
            })
            .collect();

        tracing::info!("Started game with {} players", player_count);

        Ok(Self {
            board: Board::new(),
            bag,
            players,
            turn: TurnState::AwaitingMove { seat: 0 },
            log: Vec::new(),
            undo_votes: BTreeSet::new(),
        })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn bag(&self) -> &Bag {
        &self.bag
    }

    pub fn players(&self) -> &[PlayerState] {
        &self.players
    }

    pub fn turn(&self) -> TurnState {
        self.turn
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn undo_votes(&self) -> Vec<usize> {
        self.undo_votes.iter().copied().collect()
    }

    pub fn current_seat(&self) -> Option<usize> {
        match self.turn {
            TurnState::AwaitingMove { seat } => Some(seat),
            TurnState::Ended => None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.turn == TurnState::Ended
    }

    /// Tiles in the bag, on every rack, and on the board
    pub fn tile_count(&self) -> usize {
        self.bag.len()
            + self.players.iter().map(|p| p.rack.len()).sum::<usize>()
            + self.board.placed_tile_count()
    }

    fn check_turn(&self, seat: usize) -> Result<(), GameError> {
        match self.turn {
            TurnState::AwaitingMove { seat: current } if current == seat => Ok(()),
            _ => Err(GameError::OutOfTurn),
        }
    }

    /// Validate and commit a move. Returns the log entries it appended.
    pub fn submit_move<L: Lexicon + ?Sized>(
        &mut self,
        seat: usize,
        mv: &Move,
        lexicon: &L,
    ) -> Result<Vec<LogEntry>, GameError> {
        self.check_turn(seat)?;

        let evaluation = MoveValidator::new(lexicon)
            .evaluate(&self.board, &self.players[seat].rack, mv)
            .inspect_err(|e| tracing::debug!("Rejected move from seat {}: {}", seat, e))?;

        let first_new = self.log.len();
        let player = &mut self.players[seat];

        match evaluation {
            Evaluation::Placement {
                board,
                score,
                placed,
                previous_last_played,
                remaining,
            } => {
                self.board = board;
                player.rack = remaining;
                let drawn = player.rack.refill(&mut self.bag);
                player.score += score.total;

                tracing::info!(
                    "Seat {} placed {} tiles for {} points",
                    seat,
                    placed.len(),
                    score.total
                );

                self.log.push(LogEntry::new(
                    seat,
                    LogAction::Placement {
                        words: score.entries,
                        total: score.total,
                        placed,
                        previous_last_played,
                        drawn,
                    },
                ));

                if self.players[seat].rack.is_empty() && self.bag.is_empty() {
                    self.finish(seat);
                }
            }
            Evaluation::Exchange { tiles, remaining } => {
                player.rack = remaining;
                self.bag.return_and_shuffle(tiles.iter().copied());
                let drawn = self.bag.draw(tiles.len());
                player.rack.add(drawn.iter().copied());

                tracing::info!("Seat {} exchanged {} tiles", seat, tiles.len());

                self.log.push(LogEntry::new(
                    seat,
                    LogAction::Exchange {
                        exchanged: tiles,
                        drawn,
                    },
                ));
            }
        }

        if !self.is_ended() {
            self.turn = TurnState::AwaitingMove {
                seat: (seat + 1) % self.players.len(),
            };
        }
        self.undo_votes.clear();

        Ok(self.log[first_new..].to_vec())
    }

    /// Score a move without committing it. `None` means it would be rejected.
    pub fn preview<L: Lexicon + ?Sized>(
        &self,
        seat: usize,
        mv: &Move,
        lexicon: &L,
    ) -> Option<Vec<ScoreEntry>> {
        self.check_turn(seat).ok()?;

        match MoveValidator::new(lexicon)
            .evaluate(&self.board, &self.players[seat].rack, mv)
            .ok()?
        {
            Evaluation::Placement { score, .. } => Some(score.entries),
            Evaluation::Exchange { .. } => Some(Vec::new()),
        }
    }

    /// The mover went out: everyone else pays the value of their rack to them
    fn finish(&mut self, mover: usize) {
        let transfers: Vec<RackTransfer> = self
            .players
            .iter()
            .enumerate()
            .filter(|(seat, _)| *seat != mover)
            .map(|(seat, player)| RackTransfer {
                seat,
                points: player.rack.point_value(),
            })
            .collect();

        for transfer in &transfers {
            self.players[transfer.seat].score -= transfer.points;
            self.players[mover].score += transfer.points;
        }

        tracing::info!("Game over: seat {} went out", mover);

        self.log
            .push(LogEntry::new(mover, LogAction::FinalTally { transfers }));
        self.turn = TurnState::Ended;
    }

    /// Flip `seat`'s undo vote, then reverse the last move if every connected
    /// seat now agrees.
    pub fn toggle_undo(&mut self, seat: usize, connected: &[usize]) -> Result<UndoVote, GameError> {
        if seat >= self.players.len() {
            return Err(GameError::OutOfTurn);
        }
        if self.log.is_empty() {
            return Err(GameError::NothingToUndo);
        }

        if !self.undo_votes.remove(&seat) {
            self.undo_votes.insert(seat);
        }

        Ok(match self.resolve_undo(connected) {
            Some(report) => UndoVote::Undone(report),
            None => UndoVote::Pending {
                votes: self.undo_votes(),
            },
        })
    }

    /// Reverse the last move if the current votes cover every connected seat.
    /// Also called when someone disconnects, since that can complete agreement.
    pub fn resolve_undo(&mut self, connected: &[usize]) -> Option<UndoReport> {
        let agreed = !connected.is_empty()
            && connected.iter().all(|seat| self.undo_votes.contains(seat));
        if !agreed || self.log.is_empty() {
            return None;
        }

        let mut restored = self.clone();
        match restored.undo_last() {
            Ok(report) => {
                debug_assert_eq!(restored.tile_count(), self.tile_count());
                *self = restored;
                tracing::info!("Undid last move of seat {}", report.seat);
                Some(report)
            }
            Err(e) => {
                tracing::error!("Failed to undo last move: {:#}", e);
                None
            }
        }
    }

    /// Pop and invert the most recent move. A final tally is reversed together
    /// with the placement that ended the game.
    fn undo_last(&mut self) -> anyhow::Result<UndoReport> {
        let ends_game = matches!(
            self.log.last().map(|entry| &entry.action),
            Some(LogAction::FinalTally { .. })
        );
        let count = (if ends_game { 2 } else { 1 }).min(self.log.len());
        let undone = self.log.split_off(self.log.len() - count);

        for entry in undone.iter().rev() {
            self.invert(entry)?;
        }

        let seat = undone.first().map(|entry| entry.seat).context("no entry to undo")?;
        self.turn = TurnState::AwaitingMove { seat };
        self.undo_votes.clear();

        Ok(UndoReport { seat, undone })
    }

    fn invert(&mut self, entry: &LogEntry) -> anyhow::Result<()> {
        let seat = entry.seat;
        if seat >= self.players.len() {
            bail!("log entry refers to unknown seat {}", seat);
        }

        match &entry.action {
            LogAction::Placement {
                total,
                placed,
                previous_last_played,
                drawn,
                ..
            } => {
                let player = &mut self.players[seat];
                player
                    .rack
                    .remove(drawn)
                    .context("refill tiles missing from rack")?;
                self.bag.return_and_shuffle(drawn.iter().copied());

                for tile in placed {
                    let lifted = self.board.clear(tile.position);
                    if lifted != Some(tile.token.rack_tile()) {
                        bail!(
                            "square ({}, {}) does not hold the placed tile",
                            tile.position.row,
                            tile.position.col
                        );
                    }
                    player.rack.add([tile.token.rack_tile()]);
                }

                self.board.clear_last_played();
                self.board.mark_last_played(previous_last_played);
                player.score -= *total;
            }
            LogAction::Exchange { exchanged, drawn } => {
                let player = &mut self.players[seat];
                player
                    .rack
                    .remove(drawn)
                    .context("exchanged-in tiles missing from rack")?;
                self.bag.return_and_shuffle(drawn.iter().copied());
                let returned = self
                    .bag
                    .take_exact(exchanged)
                    .context("exchanged tiles missing from bag")?;
                player.rack.add(returned);
            }
            LogAction::FinalTally { transfers } => {
                for transfer in transfers {
                    if transfer.seat >= self.players.len() {
                        bail!("rack transfer refers to unknown seat {}", transfer.seat);
                    }
                    self.players[transfer.seat].score += transfer.points;
                    self.players[seat].score -= transfer.points;
                }
            }
        }

        Ok(())
    }
}
