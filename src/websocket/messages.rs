use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    game::GameError,
    models::{LogAction, LogEntry, MoveTile, PlacedTile, RackTransfer, ScoreEntry, Square, Tile, TurnState},
};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateLobby,
    JoinLobby {
        lobby_code: String,
    },
    LeaveLobby,
    StartGame,
    SubmitMove {
        tiles: Vec<MoveTile>,
    },
    PreviewMove {
        tiles: Vec<MoveTile>,
    },
    ToggleUndo,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    LobbyJoined {
        lobby_id: String,
        lobby_code: String,
    },
    LobbyPlayerList {
        players: Vec<LobbyPlayerInfo>,
    },
    GameState {
        game_id: Uuid,
        board: Vec<Vec<Square>>,
        players: Vec<PlayerInfo>,
        bag_count: usize,
        turn: TurnState,
        undo_votes: Vec<usize>,
        /// Seat of the recipient, absent for spectators
        your_seat: Option<usize>,
    },
    MoveLogged {
        entry: LoggedMove,
    },
    MoveUndone {
        seat: usize,
        entries: usize,
    },
    UndoVotes {
        votes: Vec<usize>,
    },
    /// Live scoring for a move that has not been submitted. `None` means the
    /// move would be rejected.
    MovePreview {
        entries: Option<Vec<ScoreEntry>>,
    },
    MoveRejected {
        reason: GameError,
        message: String,
    },
    GameOver {
        final_scores: Vec<ScoreInfo>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LobbyPlayerInfo {
    pub user_id: String,
    pub username: String,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub seat: usize,
    pub user_id: i64,
    pub username: String,
    pub score: i32,
    pub rack_count: usize,
    /// Only present for the rack's owner and for spectators
    pub rack: Option<Vec<Tile>>,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreInfo {
    pub user_id: i64,
    pub username: String,
    pub score: i32,
}

/// Public view of a log entry. Tiles drawn from the bag and tiles exchanged
/// stay private.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoggedMove {
    Placement {
        seat: usize,
        words: Vec<ScoreEntry>,
        total: i32,
        placed: Vec<PlacedTile>,
        at: DateTime<Utc>,
    },
    Exchange {
        seat: usize,
        count: usize,
        at: DateTime<Utc>,
    },
    FinalTally {
        seat: usize,
        transfers: Vec<RackTransfer>,
        at: DateTime<Utc>,
    },
}

impl From<&LogEntry> for LoggedMove {
    fn from(entry: &LogEntry) -> Self {
        let seat = entry.seat;
        let at = entry.at;
        match &entry.action {
            LogAction::Placement {
                words,
                total,
                placed,
                ..
            } => LoggedMove::Placement {
                seat,
                words: words.clone(),
                total: *total,
                placed: placed.clone(),
                at,
            },
            LogAction::Exchange { exchanged, .. } => LoggedMove::Exchange {
                seat,
                count: exchanged.len(),
                at,
            },
            LogAction::FinalTally { transfers } => LoggedMove::FinalTally {
                seat,
                transfers: transfers.clone(),
                at,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;

    #[test]
    fn test_submit_move_deserialization() {
        let json = r#"{
            "type": "submit_move",
            "tiles": [
                {"tile": {"letter": "C"}, "target": {"row": 7, "col": 6}},
                {"tile": "blank", "letter": "A", "target": {"row": 7, "col": 7}}
            ]
        }"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        let ClientMessage::SubmitMove { tiles } = msg else {
            panic!("expected submit_move");
        };
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[1].tile, Tile::Blank);
        assert_eq!(tiles[1].letter, Some('A'));
        assert_eq!(tiles[0].target, Some(Position::new(7, 6)));
    }

    #[test]
    fn test_unit_messages_deserialize() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type": "toggle_undo"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::ToggleUndo));
        let msg: ClientMessage = serde_json::from_str(r#"{"type": "start_game"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::StartGame));
    }

    #[test]
    fn test_exchange_hides_tiles() {
        let entry = LogEntry::new(
            1,
            LogAction::Exchange {
                exchanged: vec![Tile::Letter('Q'), Tile::Letter('Z')],
                drawn: vec![Tile::Letter('E'), Tile::Blank],
            },
        );
        let logged = LoggedMove::from(&entry);
        assert!(matches!(logged, LoggedMove::Exchange { seat: 1, count: 2, .. }));

        let json = serde_json::to_string(&logged).unwrap();
        assert!(!json.contains("\"Q\""));
        assert!(!json.contains("blank"));
    }

    #[test]
    fn test_rejection_serialization() {
        let msg = ServerMessage::MoveRejected {
            reason: GameError::Disconnected,
            message: GameError::Disconnected.to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "move_rejected");
        assert_eq!(json["reason"]["reason"], "disconnected");
    }
}
