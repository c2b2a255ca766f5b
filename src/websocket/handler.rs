use crate::{
    auth::AuthenticatedUser,
    game::{Game, GameError, UndoReport, UndoVote},
    lobby_id_for,
    models::{Move, MoveTile},
    websocket::messages::{
        ClientMessage, LobbyPlayerInfo, LoggedMove, PlayerInfo, ScoreInfo, ServerMessage,
    },
    AppState, GameSession, Lobby, LobbyPlayer, PlayerConnectionState, Seat,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::{collections::HashSet, sync::Arc, time::Instant};
use tokio::sync::mpsc;

type Recipients = Vec<(i64, mpsc::Sender<ServerMessage>)>;

/// WebSocket upgrade handler with authentication
pub async fn handle_websocket(
    user: AuthenticatedUser,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!(
        "WebSocket connection authenticated for user: {} ({})",
        user.username,
        user.user_id
    );
    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user: AuthenticatedUser) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(100);

    tracing::info!(
        "WebSocket connection established for user: {} ({})",
        user.username,
        user.user_id
    );

    // A user still inside their grace period picks up where they left off
    resume_membership(&state, &user, &tx).await;

    // Spawn a task to send messages to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                }
            }
        }
    });

    // Handle incoming messages from the client
    let user_for_recv = user.clone();
    let state_for_recv = state.clone();
    let tx_for_recv = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        if let Err(e) = handle_client_message(
                            client_msg,
                            &state_for_recv,
                            &tx_for_recv,
                            &user_for_recv,
                        )
                        .await
                        {
                            tracing::error!("Error handling message: {:#}", e);
                            let error_msg = ServerMessage::Error {
                                message: e.to_string(),
                            };
                            let _ = tx_for_recv.send(error_msg).await;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to parse message: {}", e);
                        let error_msg = ServerMessage::Error {
                            message: format!("Invalid message format: {}", e),
                        };
                        let _ = tx_for_recv.send(error_msg).await;
                    }
                },
                Message::Close(_) => {
                    tracing::info!(
                        "Client disconnected: {} ({})",
                        user_for_recv.username,
                        user_for_recv.user_id
                    );
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    mark_disconnected(&state, &user, &tx).await;

    tracing::info!(
        "WebSocket connection closed for user: {} ({})",
        user.username,
        user.user_id
    );
}

/// Reattach a returning user to the lobby they were in
async fn resume_membership(
    state: &Arc<AppState>,
    user: &AuthenticatedUser,
    tx: &mpsc::Sender<ServerMessage>,
) {
    let Some(lobby_id) = state.player_lobbies.get(&user.user_id).map(|id| id.clone()) else {
        return;
    };

    let lobby_code = match state.lobbies.get(&lobby_id) {
        Some(lobby) => match lobby.players.get_mut(&user.user_id) {
            Some(mut player) => {
                player.tx = tx.clone();
                player.connection_state = PlayerConnectionState::Connected;
                Some(lobby.lobby_code.clone())
            }
            None => None,
        },
        None => None,
    };

    let Some(lobby_code) = lobby_code else {
        state.player_lobbies.remove(&user.user_id);
        return;
    };

    tracing::info!("User {} reconnected to lobby {}", user.user_id, lobby_id);

    let _ = tx
        .send(ServerMessage::LobbyJoined {
            lobby_id: lobby_id.clone(),
            lobby_code,
        })
        .await;
    broadcast_lobby_player_list(state, &lobby_id).await;
    send_game_state(state, &lobby_id, user.user_id, tx).await;
}

/// Start the grace period for a dropped connection. A newer connection for
/// the same user replaces the sender, in which case nothing changes.
async fn mark_disconnected(
    state: &Arc<AppState>,
    user: &AuthenticatedUser,
    tx: &mpsc::Sender<ServerMessage>,
) {
    let Some(lobby_id) = state.player_lobbies.get(&user.user_id).map(|id| id.clone()) else {
        return;
    };

    let marked = match state.lobbies.get(&lobby_id) {
        Some(lobby) => match lobby.players.get_mut(&user.user_id) {
            Some(mut player) if player.tx.same_channel(tx) => {
                player.connection_state = PlayerConnectionState::AwaitingReconnect {
                    since: Instant::now(),
                };
                true
            }
            _ => false,
        },
        None => false,
    };

    if marked {
        tracing::info!(
            "User {} awaiting reconnect in lobby {}",
            user.user_id,
            lobby_id
        );
        broadcast_lobby_player_list(state, &lobby_id).await;
        reevaluate_undo(state, &lobby_id).await;
    }
}

/// Broadcast the current player list to everyone in a lobby
pub async fn broadcast_lobby_player_list(state: &AppState, lobby_id: &str) {
    let (players, recipients) = {
        let Some(lobby) = state.lobbies.get(lobby_id) else {
            return;
        };
        let mut members: Vec<LobbyPlayer> =
            lobby.players.iter().map(|p| p.value().clone()).collect();
        members.sort_by_key(|p| p.joined_at);

        let players: Vec<LobbyPlayerInfo> = members
            .iter()
            .map(|p| LobbyPlayerInfo {
                user_id: p.user_id.to_string(),
                username: p.username.clone(),
                connected: p.is_connected(),
            })
            .collect();
        let recipients: Vec<_> = members
            .into_iter()
            .filter(|p| p.is_connected())
            .map(|p| p.tx)
            .collect();
        (players, recipients)
    };

    let message = ServerMessage::LobbyPlayerList { players };

    for tx in recipients {
        let _ = tx.send(message.clone()).await;
    }
}

/// Complete a pending undo if the remaining connected seats all agree
pub async fn reevaluate_undo(state: &AppState, lobby_id: &str) {
    let (connected, recipients) = lobby_audience(state, lobby_id);

    let outgoing = {
        let Some(mut session) = state.active_games.get_mut(lobby_id) else {
            return;
        };
        let seats = connected_seats(&session, &connected);
        match session.game.resolve_undo(&seats) {
            Some(report) => {
                let messages = undo_messages(&session, &report, &connected, &recipients);
                Some((messages, state.stamp_snapshot(&mut session)))
            }
            None => None,
        }
    };

    if let Some((messages, snapshot)) = outgoing {
        deliver(messages).await;
        save_snapshot(state, lobby_id, &snapshot).await;
    }
}

/// Handle individual client messages
async fn handle_client_message(
    msg: ClientMessage,
    state: &Arc<AppState>,
    tx: &mpsc::Sender<ServerMessage>,
    user: &AuthenticatedUser,
) -> anyhow::Result<()> {
    match msg {
        ClientMessage::CreateLobby => {
            tracing::info!("User {} ({}) creating lobby", user.username, user.user_id);
            create_lobby(state, tx, user).await?;
        }
        ClientMessage::JoinLobby { lobby_code } => {
            tracing::info!(
                "User {} ({}) joining lobby: {}",
                user.username,
                user.user_id,
                lobby_code
            );
            join_lobby(state, tx, user, &lobby_code).await?;
        }
        ClientMessage::LeaveLobby => {
            tracing::info!("User {} ({}) leaving lobby", user.username, user.user_id);
            leave_current_lobby(state, user.user_id).await;
        }
        ClientMessage::StartGame => {
            tracing::info!("User {} ({}) starting game", user.username, user.user_id);
            start_game(state, user).await?;
        }
        ClientMessage::SubmitMove { tiles } => {
            tracing::debug!(
                "User {} ({}) submitting move with {} tiles",
                user.username,
                user.user_id,
                tiles.len()
            );
            submit_move(state, tx, user, tiles).await?;
        }
        ClientMessage::PreviewMove { tiles } => {
            preview_move(state, tx, user, tiles).await?;
        }
        ClientMessage::ToggleUndo => {
            tracing::info!("User {} ({}) toggling undo", user.username, user.user_id);
            toggle_undo(state, tx, user).await?;
        }
    }

    Ok(())
}

async fn create_lobby(
    state: &Arc<AppState>,
    tx: &mpsc::Sender<ServerMessage>,
    user: &AuthenticatedUser,
) -> anyhow::Result<()> {
    leave_current_lobby(state, user.user_id).await;

    // Retry on the rare code collision
    let lobby = loop {
        let lobby = Lobby::new_custom();
        if !state.lobby_code_index.contains_key(&lobby.lobby_code) {
            break lobby;
        }
    };
    let lobby_id = lobby.lobby_id.clone();
    let lobby_code = lobby.lobby_code.clone();

    lobby.players.insert(
        user.user_id,
        LobbyPlayer::new(user.user_id, user.username.clone(), tx.clone()),
    );
    state
        .lobby_code_index
        .insert(lobby_code.clone(), lobby_id.clone());
    state.lobbies.insert(lobby_id.clone(), lobby);
    state.player_lobbies.insert(user.user_id, lobby_id.clone());

    tracing::info!("Created lobby {} for user {}", lobby_id, user.user_id);

    tx.send(ServerMessage::LobbyJoined {
        lobby_id: lobby_id.clone(),
        lobby_code,
    })
    .await?;
    broadcast_lobby_player_list(state, &lobby_id).await;
    Ok(())
}

async fn join_lobby(
    state: &Arc<AppState>,
    tx: &mpsc::Sender<ServerMessage>,
    user: &AuthenticatedUser,
    lobby_code: &str,
) -> anyhow::Result<()> {
    let lobby_code = lobby_code.trim().to_uppercase();

    let indexed = state.lobby_code_index.get(&lobby_code).map(|id| id.clone());
    let lobby_id = match indexed {
        Some(lobby_id) => lobby_id,
        None => match restore_lobby(state, &lobby_code).await? {
            Some(lobby_id) => lobby_id,
            None => {
                tx.send(ServerMessage::Error {
                    message: format!("Lobby {} not found", lobby_code),
                })
                .await?;
                return Ok(());
            }
        },
    };

    let already_member = state.player_lobbies.get(&user.user_id).map(|id| id.clone());
    if already_member.as_deref() != Some(lobby_id.as_str()) {
        leave_current_lobby(state, user.user_id).await;
    }

    let joined = match state.lobbies.get_mut(&lobby_id) {
        Some(mut lobby) => {
            match lobby.players.get_mut(&user.user_id) {
                Some(mut player) => {
                    player.tx = tx.clone();
                    player.connection_state = PlayerConnectionState::Connected;
                }
                None => {
                    lobby.players.insert(
                        user.user_id,
                        LobbyPlayer::new(user.user_id, user.username.clone(), tx.clone()),
                    );
                }
            }
            lobby.empty_since = None;
            true
        }
        None => false,
    };

    if !joined {
        tx.send(ServerMessage::Error {
            message: format!("Lobby {} not found", lobby_code),
        })
        .await?;
        return Ok(());
    }

    state.player_lobbies.insert(user.user_id, lobby_id.clone());

    tx.send(ServerMessage::LobbyJoined {
        lobby_id: lobby_id.clone(),
        lobby_code,
    })
    .await?;
    broadcast_lobby_player_list(state, &lobby_id).await;
    send_game_state(state, &lobby_id, user.user_id, tx).await;
    Ok(())
}

/// Recreate a lobby from its saved game, if one exists
async fn restore_lobby(state: &AppState, lobby_code: &str) -> anyhow::Result<Option<String>> {
    let lobby_id = lobby_id_for(lobby_code);
    let Some(session) = state.snapshots.load(&lobby_id).await? else {
        return Ok(None);
    };

    tracing::info!(
        "Restoring game {} into lobby {}",
        session.game_id,
        lobby_id
    );

    state
        .lobbies
        .entry(lobby_id.clone())
        .or_insert_with(|| Lobby::with_code(lobby_code.to_string()));
    state
        .lobby_code_index
        .insert(lobby_code.to_string(), lobby_id.clone());
    state.active_games.entry(lobby_id.clone()).or_insert(session);

    Ok(Some(lobby_id))
}

/// Remove a user from whatever lobby they are in. Their seat, if any, stays.
async fn leave_current_lobby(state: &AppState, user_id: i64) {
    let Some((_, lobby_id)) = state.player_lobbies.remove(&user_id) else {
        return;
    };

    if let Some(mut lobby) = state.lobbies.get_mut(&lobby_id) {
        lobby.players.remove(&user_id);
        if !lobby.has_any_players() {
            lobby.empty_since = Some(Instant::now());
        }
    }

    tracing::info!("User {} left lobby {}", user_id, lobby_id);

    broadcast_lobby_player_list(state, &lobby_id).await;
    reevaluate_undo(state, &lobby_id).await;
}

async fn start_game(state: &Arc<AppState>, user: &AuthenticatedUser) -> anyhow::Result<()> {
    let lobby_id = current_lobby(state, user.user_id)?;

    if let Some(session) = state.active_games.get(&lobby_id) {
        if !session.game.is_ended() {
            anyhow::bail!("A game is already in progress");
        }
    }

    let seats: Vec<Seat> = {
        let lobby = state
            .lobbies
            .get(&lobby_id)
            .ok_or_else(|| anyhow::anyhow!("Lobby {} no longer exists", lobby_id))?;
        lobby
            .connected_players()
            .into_iter()
            .take(state.config.game.max_players)
            .map(|p| Seat {
                user_id: p.user_id,
                username: p.username,
            })
            .collect()
    };

    let mut session = GameSession::new(seats.clone(), Game::new(seats.len())?);
    let snapshot = state.stamp_snapshot(&mut session);
    tracing::info!(
        "Starting game {} in lobby {} with {} seats",
        session.game_id,
        lobby_id,
        seats.len()
    );

    state.active_games.insert(lobby_id.clone(), session);
    save_snapshot(state, &lobby_id, &snapshot).await;
    broadcast_game_state(state, &lobby_id).await;
    Ok(())
}

async fn submit_move(
    state: &Arc<AppState>,
    tx: &mpsc::Sender<ServerMessage>,
    user: &AuthenticatedUser,
    tiles: Vec<MoveTile>,
) -> anyhow::Result<()> {
    let lobby_id = current_lobby(state, user.user_id)?;

    let mv = match Move::try_from(tiles) {
        Ok(mv) => mv,
        Err(e) => {
            reject(tx, e).await?;
            return Ok(());
        }
    };

    let (connected, recipients) = lobby_audience(state, &lobby_id);

    let result = {
        let mut session = state
            .active_games
            .get_mut(&lobby_id)
            .ok_or_else(|| anyhow::anyhow!("No game in progress"))?;
        // spectators hold no seat, so it is never their turn
        let committed = match session.seat_of(user.user_id) {
            Some(seat) => session.game.submit_move(seat, &mv, &state.dictionary),
            None => Err(GameError::OutOfTurn),
        };

        match committed {
            Ok(entries) => {
                let mut messages = Vec::new();
                for entry in &entries {
                    push_to_all(
                        &mut messages,
                        &recipients,
                        ServerMessage::MoveLogged {
                            entry: LoggedMove::from(entry),
                        },
                    );
                }
                push_game_states(&mut messages, &session, &connected, &recipients);
                if session.game.is_ended() {
                    push_to_all(&mut messages, &recipients, game_over(&session));
                }
                Ok((messages, state.stamp_snapshot(&mut session)))
            }
            Err(e) => Err(e),
        }
    };

    match result {
        Ok((messages, snapshot)) => {
            deliver(messages).await;
            save_snapshot(state, &lobby_id, &snapshot).await;
        }
        Err(e) => reject(tx, e).await?,
    }
    Ok(())
}

async fn preview_move(
    state: &Arc<AppState>,
    tx: &mpsc::Sender<ServerMessage>,
    user: &AuthenticatedUser,
    tiles: Vec<MoveTile>,
) -> anyhow::Result<()> {
    let lobby_id = current_lobby(state, user.user_id)?;

    let entries = match Move::try_from(tiles) {
        Ok(mv) => state.active_games.get(&lobby_id).and_then(|session| {
            let seat = session.seat_of(user.user_id)?;
            session.game.preview(seat, &mv, &state.dictionary)
        }),
        Err(_) => None,
    };

    tx.send(ServerMessage::MovePreview { entries }).await?;
    Ok(())
}

async fn toggle_undo(
    state: &Arc<AppState>,
    tx: &mpsc::Sender<ServerMessage>,
    user: &AuthenticatedUser,
) -> anyhow::Result<()> {
    let lobby_id = current_lobby(state, user.user_id)?;
    let (connected, recipients) = lobby_audience(state, &lobby_id);

    let result = {
        let mut session = state
            .active_games
            .get_mut(&lobby_id)
            .ok_or_else(|| anyhow::anyhow!("No game in progress"))?;
        let seats = connected_seats(&session, &connected);
        let vote = match session.seat_of(user.user_id) {
            Some(seat) => session.game.toggle_undo(seat, &seats),
            None => Err(GameError::OutOfTurn),
        };

        match vote {
            Ok(UndoVote::Pending { votes }) => {
                let mut messages = Vec::new();
                push_to_all(&mut messages, &recipients, ServerMessage::UndoVotes { votes });
                Ok((messages, state.stamp_snapshot(&mut session)))
            }
            Ok(UndoVote::Undone(report)) => {
                let messages = undo_messages(&session, &report, &connected, &recipients);
                Ok((messages, state.stamp_snapshot(&mut session)))
            }
            Err(e) => Err(e),
        }
    };

    match result {
        Ok((messages, snapshot)) => {
            deliver(messages).await;
            save_snapshot(state, &lobby_id, &snapshot).await;
        }
        Err(e) => reject(tx, e).await?,
    }
    Ok(())
}

fn current_lobby(state: &AppState, user_id: i64) -> anyhow::Result<String> {
    state
        .player_lobbies
        .get(&user_id)
        .map(|id| id.clone())
        .ok_or_else(|| anyhow::anyhow!("You are not in a lobby"))
}

/// Connected user ids and their senders, read before any game entry is locked
fn lobby_audience(state: &AppState, lobby_id: &str) -> (HashSet<i64>, Recipients) {
    let Some(lobby) = state.lobbies.get(lobby_id) else {
        return (HashSet::new(), Vec::new());
    };
    let recipients: Recipients = lobby
        .players
        .iter()
        .filter(|p| p.is_connected())
        .map(|p| (p.user_id, p.tx.clone()))
        .collect();
    let connected = recipients.iter().map(|(user_id, _)| *user_id).collect();
    (connected, recipients)
}

fn connected_seats(session: &GameSession, connected: &HashSet<i64>) -> Vec<usize> {
    session
        .seats
        .iter()
        .enumerate()
        .filter(|(_, seat)| connected.contains(&seat.user_id))
        .map(|(index, _)| index)
        .collect()
}

/// What `viewer` is allowed to see of the game. Opponents' racks are hidden
/// from seated players; spectators see every rack.
pub(crate) fn game_state_view(
    session: &GameSession,
    viewer: i64,
    connected: &HashSet<i64>,
) -> ServerMessage {
    let your_seat = session.seat_of(viewer);
    let game = &session.game;

    let players = session
        .seats
        .iter()
        .zip(game.players())
        .enumerate()
        .map(|(index, (seat, player))| PlayerInfo {
            seat: index,
            user_id: seat.user_id,
            username: seat.username.clone(),
            score: player.score,
            rack_count: player.rack.len(),
            rack: match your_seat {
                Some(own) if own != index => None,
                _ => Some(player.rack.sorted()),
            },
            connected: connected.contains(&seat.user_id),
        })
        .collect();

    ServerMessage::GameState {
        game_id: session.game_id,
        board: game.board().rows().to_vec(),
        players,
        bag_count: game.bag().len(),
        turn: game.turn(),
        undo_votes: game.undo_votes(),
        your_seat,
    }
}

fn game_over(session: &GameSession) -> ServerMessage {
    let final_scores = session
        .seats
        .iter()
        .zip(session.game.players())
        .map(|(seat, player)| ScoreInfo {
            user_id: seat.user_id,
            username: seat.username.clone(),
            score: player.score,
        })
        .collect();
    ServerMessage::GameOver { final_scores }
}

fn undo_messages(
    session: &GameSession,
    report: &UndoReport,
    connected: &HashSet<i64>,
    recipients: &Recipients,
) -> Vec<(mpsc::Sender<ServerMessage>, ServerMessage)> {
    let mut messages = Vec::new();
    push_to_all(
        &mut messages,
        recipients,
        ServerMessage::MoveUndone {
            seat: report.seat,
            entries: report.undone.len(),
        },
    );
    push_game_states(&mut messages, session, connected, recipients);
    messages
}

fn push_to_all(
    messages: &mut Vec<(mpsc::Sender<ServerMessage>, ServerMessage)>,
    recipients: &Recipients,
    message: ServerMessage,
) {
    for (_, tx) in recipients {
        messages.push((tx.clone(), message.clone()));
    }
}

fn push_game_states(
    messages: &mut Vec<(mpsc::Sender<ServerMessage>, ServerMessage)>,
    session: &GameSession,
    connected: &HashSet<i64>,
    recipients: &Recipients,
) {
    for (user_id, tx) in recipients {
        messages.push((tx.clone(), game_state_view(session, *user_id, connected)));
    }
}

/// Send prepared messages once no game entry is held
async fn deliver(messages: Vec<(mpsc::Sender<ServerMessage>, ServerMessage)>) {
    for (tx, message) in messages {
        let _ = tx.send(message).await;
    }
}

async fn broadcast_game_state(state: &AppState, lobby_id: &str) {
    let (connected, recipients) = lobby_audience(state, lobby_id);
    let messages = {
        let Some(session) = state.active_games.get(lobby_id) else {
            return;
        };
        let mut messages = Vec::new();
        push_game_states(&mut messages, &session, &connected, &recipients);
        messages
    };
    deliver(messages).await;
}

async fn send_game_state(
    state: &AppState,
    lobby_id: &str,
    user_id: i64,
    tx: &mpsc::Sender<ServerMessage>,
) {
    let (connected, _) = lobby_audience(state, lobby_id);
    let view = state
        .active_games
        .get(lobby_id)
        .map(|session| game_state_view(&session, user_id, &connected));
    if let Some(view) = view {
        let _ = tx.send(view).await;
    }
}

async fn reject(tx: &mpsc::Sender<ServerMessage>, error: GameError) -> anyhow::Result<()> {
    tx.send(ServerMessage::MoveRejected {
        message: error.to_string(),
        reason: error,
    })
    .await?;
    Ok(())
}

async fn save_snapshot(state: &AppState, lobby_id: &str, session: &GameSession) {
    if let Err(e) = state.snapshots.save(lobby_id, session).await {
        tracing::warn!("Failed to save snapshot for lobby {}: {:#}", lobby_id, e);
    }
}
