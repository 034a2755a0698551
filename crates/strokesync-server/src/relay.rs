//! Stroke broadcaster: one task per connection, fan-out over a shared
//! broadcast channel.
//!
//! Every broadcast is tagged with the sending connection id so it is never
//! echoed back to its sender. Inbound frames of one connection are handled
//! strictly in order.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use strokesync_core::{
    ClientMessage, DrawingRepository, RepositoryError, ServerMessage, StrokeGroup,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::identity::{Identity, IdentityProvider};
use crate::presence::PresenceTracker;

/// A broadcast event and the connection it came from.
pub type Envelope = (Uuid, ServerMessage);

/// Shared application state
pub struct AppState {
    pub repository: Arc<dyn DrawingRepository>,
    pub identity: Arc<dyn IdentityProvider>,
    pub presence: PresenceTracker,
    tx: broadcast::Sender<Envelope>,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn DrawingRepository>,
        identity: Arc<dyn IdentityProvider>,
        capacity: usize,
    ) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            repository,
            identity,
            presence: PresenceTracker::new(),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Send to every connection except `from`.
    pub fn broadcast(&self, from: Uuid, msg: ServerMessage) {
        // No receivers just means nobody else is connected.
        let _ = self.tx.send((from, msg));
    }
}

/// Handle one inbound message. Peers are reached through the broadcast
/// channel; the returned messages go back to the sender only.
pub async fn process_message(
    state: &AppState,
    conn: Uuid,
    identity: &Identity,
    msg: ClientMessage,
) -> Vec<ServerMessage> {
    let author = &identity.author_id;
    let mut replies = Vec::new();

    match msg {
        ClientMessage::Draw(mut point) => {
            point.author_id = author.clone();
            state.broadcast(conn, ServerMessage::Draw(point));
        }
        ClientMessage::PersistGroups { groups } => {
            for group in groups {
                match store(state, identity, group).await {
                    Ok(group) => state.broadcast(conn, ServerMessage::StrokeGroupPersisted(group)),
                    Err(e) => replies.push(persistence_fault(identity, "append", e)),
                }
            }
        }
        ClientMessage::RestoreGroup { group } => match store(state, identity, group).await {
            Ok(group) => state.broadcast(conn, ServerMessage::GroupRestored(group)),
            Err(e) => replies.push(persistence_fault(identity, "restore", e)),
        },
        ClientMessage::RemoveGroup { group_id } => {
            match state.repository.get(&group_id).await {
                Ok(stored) if &stored.author_id != author => {
                    warn!("{} tried to remove group {} of {}", author, group_id, stored.author_id);
                    replies.push(ServerMessage::Error {
                        message: format!("Group {} belongs to another author", group_id),
                    });
                    return replies;
                }
                Ok(_) => {
                    if let Err(e) = state.repository.remove_one(&group_id).await {
                        replies.push(persistence_fault(identity, "remove", e));
                    }
                }
                // Not stored yet; peers may still hold it.
                Err(RepositoryError::NotFound(_)) => {
                    debug!("Removing group {} not yet stored", group_id);
                }
                Err(e) => replies.push(persistence_fault(identity, "remove", e)),
            }
            state.broadcast(
                conn,
                ServerMessage::RemoveGroup {
                    group_id,
                    author_id: author.clone(),
                },
            );
        }
        ClientMessage::ClearAll => {
            if let Err(e) = state.repository.remove_all().await {
                replies.push(persistence_fault(identity, "clear", e));
            }
            info!("{} cleared the surface", author);
            state.broadcast(conn, ServerMessage::ClearAll);
        }
    }

    replies
}

/// Attribute, timestamp and append one group.
async fn store(
    state: &AppState,
    identity: &Identity,
    mut group: StrokeGroup,
) -> Result<StrokeGroup, RepositoryError> {
    group.attribute_to(&identity.author_id);
    group.mark_created();
    state.repository.append(group.clone()).await?;
    debug!("Stored group {} ({} points) for {}", group.id, group.len(), identity.author_id);
    Ok(group)
}

fn persistence_fault(identity: &Identity, op: &str, e: RepositoryError) -> ServerMessage {
    warn!("Repository {} failed for {}: {}", op, identity.author_id, e);
    ServerMessage::Error {
        message: format!("Failed to {} drawing: {}", op, e),
    }
}

async fn send_json(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> bool {
    match msg.to_json() {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode {:?}: {}", msg, e);
            true
        }
    }
}

/// Drive one admitted connection until it closes.
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let conn = Uuid::new_v4();
    info!("New connection {} for {}", conn, identity.author_id);

    // Subscribe before announcing so nothing sent after the welcome is missed.
    let mut rx = state.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let came_online = state.presence.connect(&identity);
    let welcome = ServerMessage::Welcome {
        author_id: identity.author_id.clone(),
        display_name: identity.display_name.clone(),
        online: state.presence.online(),
    };
    let mut open = send_json(&mut sender, &welcome).await;
    if let Some(entry) = came_online {
        state.broadcast(conn, ServerMessage::PresenceChanged(entry));
    }

    while open {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let replies = match ClientMessage::from_json(&text) {
                            Ok(client_msg) => process_message(&state, conn, &identity, client_msg).await,
                            Err(e) => {
                                warn!("Invalid message from {}: {}", identity.author_id, e);
                                vec![ServerMessage::Error { message: e.to_string() }]
                            }
                        };
                        for reply in &replies {
                            if !send_json(&mut sender, reply).await {
                                open = false;
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore binary, ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", identity.author_id, e);
                        break;
                    }
                }
            }

            event = rx.recv() => {
                match event {
                    Ok((from, msg)) => {
                        // Don't echo back to sender
                        if from != conn && !send_json(&mut sender, &msg).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Connection {} lagged, dropped {} events", conn, missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    if let Some(entry) = state.presence.disconnect(&identity.author_id) {
        state.broadcast(conn, ServerMessage::PresenceChanged(entry));
    }
    info!("Connection closed: {} ({})", conn, identity.author_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::TokenIdentityProvider;
    use strokesync_core::{AuthorId, GroupId, MemoryRepository, Phase, StrokePoint};
    use tokio::sync::broadcast::error::TryRecvError;

    fn state() -> AppState {
        AppState::new(
            Arc::new(MemoryRepository::new()),
            Arc::new(TokenIdentityProvider::new()),
            16,
        )
    }

    fn identity(id: &str) -> Identity {
        Identity {
            author_id: AuthorId::from(id),
            display_name: id.to_uppercase(),
        }
    }

    fn point(author: &str, x: f64, phase: Phase) -> StrokePoint {
        StrokePoint {
            x,
            y: 0.0,
            phase,
            width: 2.0,
            color: "#000".to_string(),
            author_id: AuthorId::from(author),
            group_id: None,
        }
    }

    fn group(author: &str) -> StrokeGroup {
        let mut group = StrokeGroup::new(GroupId::new(), AuthorId::from(author));
        group.push(point(author, 0.0, Phase::Begin));
        group.push(point(author, 9.0, Phase::End));
        group
    }

    #[tokio::test]
    async fn test_draw_is_stamped_with_sender() {
        let state = state();
        let mut rx = state.subscribe();
        let conn = Uuid::new_v4();

        let forged = point("mallory", 1.0, Phase::Begin);
        let replies = process_message(&state, conn, &identity("ann"), ClientMessage::Draw(forged)).await;
        assert!(replies.is_empty());

        let (from, msg) = rx.try_recv().unwrap();
        assert_eq!(from, conn);
        match msg {
            ServerMessage::Draw(p) => assert_eq!(p.author_id, AuthorId::from("ann")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_persist_appends_and_announces_each_group() {
        let state = state();
        let mut rx = state.subscribe();
        let ann = identity("ann");
        let groups = vec![group("ann"), group("mallory")];

        let replies = process_message(
            &state,
            Uuid::new_v4(),
            &ann,
            ClientMessage::PersistGroups { groups: groups.clone() },
        )
        .await;
        assert!(replies.is_empty());

        let stored = state.repository.list_all().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|g| g.author_id == ann.author_id));
        assert!(stored.iter().all(|g| g.created_at.is_some()));
        assert_eq!(stored[0].id, groups[0].id);

        for expected in &groups {
            match rx.try_recv().unwrap().1 {
                ServerMessage::StrokeGroupPersisted(g) => {
                    assert_eq!(g.id, expected.id);
                    assert!(g.points.iter().all(|p| p.group_id == Some(g.id)));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_remove_own_group() {
        let state = state();
        let ann = identity("ann");
        let conn = Uuid::new_v4();
        let g = group("ann");
        process_message(&state, conn, &ann, ClientMessage::PersistGroups { groups: vec![g.clone()] }).await;

        let mut rx = state.subscribe();
        let replies = process_message(&state, conn, &ann, ClientMessage::RemoveGroup { group_id: g.id }).await;
        assert!(replies.is_empty());
        assert!(state.repository.list_all().await.unwrap().is_empty());
        assert_eq!(
            rx.try_recv().unwrap().1,
            ServerMessage::RemoveGroup {
                group_id: g.id,
                author_id: ann.author_id.clone()
            }
        );
    }

    #[tokio::test]
    async fn test_remove_foreign_group_is_refused() {
        let state = state();
        let g = group("bob");
        process_message(
            &state,
            Uuid::new_v4(),
            &identity("bob"),
            ClientMessage::PersistGroups { groups: vec![g.clone()] },
        )
        .await;

        let mut rx = state.subscribe();
        let replies = process_message(
            &state,
            Uuid::new_v4(),
            &identity("ann"),
            ClientMessage::RemoveGroup { group_id: g.id },
        )
        .await;

        assert!(matches!(replies.as_slice(), [ServerMessage::Error { .. }]));
        assert_eq!(state.repository.list_all().await.unwrap().len(), 1);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_remove_unknown_group_is_still_relayed() {
        let state = state();
        let mut rx = state.subscribe();
        let id = GroupId::new();
        let replies = process_message(
            &state,
            Uuid::new_v4(),
            &identity("ann"),
            ClientMessage::RemoveGroup { group_id: id },
        )
        .await;

        assert!(replies.is_empty());
        assert!(matches!(
            rx.try_recv().unwrap().1,
            ServerMessage::RemoveGroup { group_id, .. } if group_id == id
        ));
    }

    #[tokio::test]
    async fn test_restore_and_clear() {
        let state = state();
        let mut rx = state.subscribe();
        let ann = identity("ann");
        let conn = Uuid::new_v4();

        process_message(&state, conn, &ann, ClientMessage::RestoreGroup { group: group("ann") }).await;
        assert!(matches!(rx.try_recv().unwrap().1, ServerMessage::GroupRestored(_)));
        assert_eq!(state.repository.list_all().await.unwrap().len(), 1);

        process_message(&state, conn, &ann, ClientMessage::ClearAll).await;
        assert_eq!(rx.try_recv().unwrap().1, ServerMessage::ClearAll);
        assert!(state.repository.list_all().await.unwrap().is_empty());
    }
}
