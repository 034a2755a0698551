//! Stroke points and stroke groups.
//!
//! A [`StrokePoint`] is one pointer sample emitted while an author draws. A
//! [`StrokeGroup`] is the ordered run of points from a single gesture, from
//! its `Begin` to its `End`.

use chrono::{DateTime, Utc};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identity of a connected author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(String);

impl AuthorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AuthorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identity of a stroke group, assigned by the drawing client at gesture start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(Uuid);

impl GroupId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a point sits within its gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Begin,
    Draw,
    End,
}

/// A single drawing sample. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokePoint {
    pub x: f64,
    pub y: f64,
    pub phase: Phase,
    /// Stroke width in surface units.
    pub width: f64,
    /// RGB color string, e.g. `#1e90ff`.
    pub color: String,
    /// Stamped by the relay; clients may leave it out.
    #[serde(default)]
    pub author_id: AuthorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

impl StrokePoint {
    pub fn new(
        position: Point,
        phase: Phase,
        width: f64,
        color: impl Into<String>,
        author_id: AuthorId,
    ) -> Self {
        Self {
            x: position.x,
            y: position.y,
            phase,
            width,
            color: color.into(),
            author_id,
            group_id: None,
        }
    }

    /// Attach the point to a group.
    pub fn in_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// One continuous gesture of one author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeGroup {
    /// Generated on deserialization when the sender left it out.
    #[serde(rename = "groupId", default)]
    pub id: GroupId,
    #[serde(default)]
    pub author_id: AuthorId,
    pub points: Vec<StrokePoint>,
    /// Set by the relay when the group is stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl StrokeGroup {
    /// Create an empty, open group.
    pub fn new(id: GroupId, author_id: AuthorId) -> Self {
        Self {
            id,
            author_id,
            points: Vec::new(),
            created_at: None,
        }
    }

    pub fn push(&mut self, point: StrokePoint) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// A group is closed once its last point is an `End`.
    pub fn is_closed(&self) -> bool {
        self.points.last().is_some_and(|p| p.phase == Phase::End)
    }

    /// Re-attribute every point to `author_id` and this group's id.
    ///
    /// The relay calls this so a client can never store points under another
    /// author's name.
    pub fn attribute_to(&mut self, author_id: &AuthorId) {
        self.author_id = author_id.clone();
        for point in &mut self.points {
            point.author_id = author_id.clone();
            point.group_id = Some(self.id);
        }
    }

    /// Stamp the storage time.
    pub fn mark_created(&mut self) {
        self.created_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, y: f64, phase: Phase) -> StrokePoint {
        StrokePoint::new(Point::new(x, y), phase, 2.0, "#000000", AuthorId::from("ann"))
    }

    #[test]
    fn test_group_closed_only_after_end() {
        let mut group = StrokeGroup::new(GroupId::new(), AuthorId::from("ann"));
        assert!(!group.is_closed());
        group.push(point(0.0, 0.0, Phase::Begin));
        group.push(point(1.0, 1.0, Phase::Draw));
        assert!(!group.is_closed());
        group.push(point(2.0, 2.0, Phase::End));
        assert!(group.is_closed());
        assert_eq!(group.len(), 3);
    }

    #[test]
    fn test_attribute_to_overrides_author_and_group() {
        let mut group = StrokeGroup::new(GroupId::new(), AuthorId::from("mallory"));
        group.push(point(0.0, 0.0, Phase::Begin));
        group.push(point(1.0, 0.0, Phase::End));

        let bob = AuthorId::from("bob");
        group.attribute_to(&bob);

        assert_eq!(group.author_id, bob);
        assert!(group.points.iter().all(|p| p.author_id == bob));
        assert!(group.points.iter().all(|p| p.group_id == Some(group.id)));
    }

    #[test]
    fn test_point_wire_shape() {
        let p = point(3.0, 4.0, Phase::Draw);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["phase"], "draw");
        assert_eq!(json["authorId"], "ann");
        assert!(json.get("groupId").is_none());
    }

    #[test]
    fn test_group_id_serializes_as_group_id() {
        let group = StrokeGroup::new(GroupId::new(), AuthorId::from("ann"));
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(json["groupId"], group.id.to_string());
        assert!(json.get("createdAt").is_none());
    }

    #[test]
    fn test_missing_group_id_and_author_are_filled() {
        let json = r##"{"points":[{"x":1,"y":2,"phase":"begin","width":2,"color":"#000"}]}"##;
        let group: StrokeGroup = serde_json::from_str(json).unwrap();
        assert!(!group.id.as_uuid().is_nil());
        assert_eq!(group.author_id.as_str(), "");
        assert_eq!(group.points[0].position(), Point::new(1.0, 2.0));
    }
}
