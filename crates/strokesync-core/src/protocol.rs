//! Event Channel wire messages.
//!
//! Messages are JSON objects tagged by `"type"`:
//! ```json
//! { "type": "draw", "x": 10, "y": 20, "phase": "begin", "width": 2, "color": "#000", "authorId": "ann" }
//! { "type": "persistGroups", "groups": [ ... ] }
//! { "type": "removeGroup", "groupId": "..." }
//! { "type": "clearAll" }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::presence::PresenceEntry;
use crate::stroke::{AuthorId, GroupId, StrokeGroup, StrokePoint};

/// Errors encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),
}

/// A message sent by a client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// One live point.
    Draw(StrokePoint),
    /// Completed, simplified groups to store and announce.
    PersistGroups { groups: Vec<StrokeGroup> },
    /// A redone group to store and announce as a whole.
    RestoreGroup { group: StrokeGroup },
    /// Undo of one of the sender's own groups.
    RemoveGroup { group_id: GroupId },
    /// Erase everything for everyone.
    ClearAll,
}

/// A message sent by the relay to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// First message after admission.
    Welcome {
        author_id: AuthorId,
        display_name: String,
        online: Vec<PresenceEntry>,
    },
    /// A peer's live point.
    Draw(StrokePoint),
    /// A peer's group was stored.
    StrokeGroupPersisted(StrokeGroup),
    /// A peer redid a group.
    GroupRestored(StrokeGroup),
    /// A peer undid one of their groups.
    RemoveGroup { group_id: GroupId, author_id: AuthorId },
    /// A peer cleared the surface.
    ClearAll,
    /// An author came online or went offline.
    PresenceChanged(PresenceEntry),
    /// The relay refused or failed a request.
    Error { message: String },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::PresenceState;
    use crate::stroke::Phase;
    use kurbo::Point;

    #[test]
    fn test_draw_is_flat_on_the_wire() {
        let point = StrokePoint::new(Point::new(10.0, 20.0), Phase::Begin, 2.0, "#000", AuthorId::from("ann"));
        let json: serde_json::Value =
            serde_json::from_str(&ClientMessage::Draw(point).to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "draw");
        assert_eq!(json["x"], 10.0);
        assert_eq!(json["phase"], "begin");
        assert_eq!(json["authorId"], "ann");
    }

    #[test]
    fn test_client_message_tags() {
        let json = ClientMessage::ClearAll.to_json().unwrap();
        assert_eq!(json, r#"{"type":"clearAll"}"#);

        let id = GroupId::new();
        let json = ClientMessage::RemoveGroup { group_id: id }.to_json().unwrap();
        assert!(json.contains(r#""type":"removeGroup""#));
        assert!(json.contains(&format!(r#""groupId":"{id}""#)));
    }

    #[test]
    fn test_server_message_deserialize() {
        let json = r#"{"type":"presenceChanged","authorId":"bob","displayName":"Bob","state":"offline"}"#;
        match ServerMessage::from_json(json).unwrap() {
            ServerMessage::PresenceChanged(entry) => {
                assert_eq!(entry.author_id, AuthorId::from("bob"));
                assert_eq!(entry.state, PresenceState::Offline);
            }
            other => panic!("Wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_persisted_group_carries_group_fields() {
        let mut group = StrokeGroup::new(GroupId::new(), AuthorId::from("ann"));
        group.mark_created();
        let json: serde_json::Value = serde_json::from_str(
            &ServerMessage::StrokeGroupPersisted(group.clone()).to_json().unwrap(),
        )
        .unwrap();

        assert_eq!(json["type"], "strokeGroupPersisted");
        assert_eq!(json["groupId"], group.id.to_string());
        assert_eq!(json["authorId"], "ann");
        assert!(json["points"].is_array());
        assert!(json["createdAt"].is_string());
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"teleport"}"#),
            Err(ProtocolError::Json(_))
        ));
    }
}
