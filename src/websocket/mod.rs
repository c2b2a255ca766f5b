pub mod handler;
pub mod messages;

pub use handler::{broadcast_lobby_player_list, handle_websocket, reevaluate_undo};
