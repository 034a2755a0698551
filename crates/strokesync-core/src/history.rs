//! Per-author drawing history and peer reconciliation.
//!
//! [`HistoryManager`] is the client-side engine. It turns pointer input into
//! live points, closes each gesture into a simplified [`StrokeGroup`], keeps
//! the local author's undo/redo stacks, mirrors what peers have stored, and
//! queues [`ClientMessage`]s for the transport to drain with
//! [`HistoryManager::take_outgoing`].
//!
//! Nothing here blocks or reads the clock. Callers pass `now` with every input
//! and call [`HistoryManager::tick`] from their event loop so the persistence
//! debounce can fire.

use std::time::{Duration, Instant};

use kurbo::Point;

use crate::debounce::{DEFAULT_DEBOUNCE, Debounce};
use crate::peers::PeerDrawingIndex;
use crate::presence::{PresenceEntry, PresenceRoster};
use crate::protocol::{ClientMessage, ProtocolError, ServerMessage};
use crate::render::Surface;
use crate::simplify::{DEFAULT_TOLERANCE, simplify_group};
use crate::stroke::{AuthorId, GroupId, Phase, StrokeGroup, StrokePoint};

/// How a redone group is announced to peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedoMode {
    /// Re-emit every point as live `draw` events, then persist again.
    #[default]
    Replay,
    /// Send the whole group once as `restoreGroup`.
    Restore,
}

/// Tunables for a [`HistoryManager`].
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Simplification tolerance applied to every completed gesture.
    pub tolerance: f64,
    /// Quiet period before completed groups are sent for persistence.
    pub debounce: Duration,
    pub redo_mode: RedoMode,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            debounce: DEFAULT_DEBOUNCE,
            redo_mode: RedoMode::default(),
        }
    }
}

/// Current brush settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Pen {
    pub width: f64,
    pub color: String,
}

impl Default for Pen {
    fn default() -> Self {
        Self {
            width: 2.0,
            color: "#000000".to_string(),
        }
    }
}

/// Pointer or touch input in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerInput {
    Down(Point),
    Move(Point),
    Up(Point),
}

/// Local author's gesture state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawState {
    Idle,
    Drawing,
}

/// What a handled server message did to local state.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEvent {
    /// The relay admitted us.
    Welcomed { author_id: AuthorId, display_name: String },
    /// A peer's live point was painted.
    PeerPainted { author_id: AuthorId },
    /// A peer's group was recorded.
    PeerGroupStored { author_id: AuthorId, group_id: GroupId },
    /// The surface was rebuilt from known groups.
    Repainted,
    /// Everything was erased.
    Cleared,
    PresenceChanged(PresenceEntry),
    Error { message: String },
}

/// Client-side stroke history for one local author.
pub struct HistoryManager {
    author_id: AuthorId,
    config: HistoryConfig,
    pen: Pen,
    /// Gesture in progress, if any.
    open: Option<StrokeGroup>,
    undo_stack: Vec<StrokeGroup>,
    redo_stack: Vec<StrokeGroup>,
    peers: PeerDrawingIndex,
    surface: Surface,
    roster: PresenceRoster,
    /// Completed groups waiting for the debounce to expire.
    pending: Vec<StrokeGroup>,
    debounce: Debounce,
    outgoing: Vec<ClientMessage>,
}

impl HistoryManager {
    pub fn new(author_id: AuthorId, config: HistoryConfig) -> Self {
        let debounce = Debounce::new(config.debounce);
        Self {
            author_id,
            config,
            pen: Pen::default(),
            open: None,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            peers: PeerDrawingIndex::new(),
            surface: Surface::new(),
            roster: PresenceRoster::new(),
            pending: Vec::new(),
            debounce,
            outgoing: Vec::new(),
        }
    }

    pub fn author_id(&self) -> &AuthorId {
        &self.author_id
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn pen(&self) -> &Pen {
        &self.pen
    }

    /// Change the brush. Takes effect from the next point.
    pub fn set_pen(&mut self, width: f64, color: impl Into<String>) {
        self.pen = Pen {
            width,
            color: color.into(),
        };
    }

    pub fn state(&self) -> DrawState {
        if self.open.is_some() {
            DrawState::Drawing
        } else {
            DrawState::Idle
        }
    }

    pub fn is_drawing(&self) -> bool {
        self.state() == DrawState::Drawing
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Local groups, oldest first.
    pub fn undo_stack(&self) -> &[StrokeGroup] {
        &self.undo_stack
    }

    /// Undone groups; the last one is redone next.
    pub fn redo_stack(&self) -> &[StrokeGroup] {
        &self.redo_stack
    }

    pub fn peers(&self) -> &PeerDrawingIndex {
        &self.peers
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn roster(&self) -> &PresenceRoster {
        &self.roster
    }

    /// Groups completed but not yet sent for persistence.
    pub fn pending(&self) -> &[StrokeGroup] {
        &self.pending
    }

    // --- Local input ---

    pub fn handle_input(&mut self, input: PointerInput, now: Instant) {
        match input {
            PointerInput::Down(position) => self.begin_stroke(position),
            PointerInput::Move(position) => self.extend_stroke(position),
            PointerInput::Up(position) => self.end_stroke(position, now),
        }
    }

    fn begin_stroke(&mut self, position: Point) {
        if let Some(abandoned) = self.open.take() {
            // Lost pointer-up: the unfinished gesture never enters history.
            log::warn!(
                "Discarding unfinished stroke {} ({} points)",
                abandoned.id,
                abandoned.len()
            );
        }

        let group = StrokeGroup::new(GroupId::new(), self.author_id.clone());
        let point = self.point(position, Phase::Begin, group.id);
        self.open = Some(group);
        self.emit(point);
    }

    fn extend_stroke(&mut self, position: Point) {
        let Some(group_id) = self.open.as_ref().map(|g| g.id) else {
            return;
        };
        let point = self.point(position, Phase::Draw, group_id);
        self.emit(point);
    }

    fn end_stroke(&mut self, position: Point, now: Instant) {
        let Some(group_id) = self.open.as_ref().map(|g| g.id) else {
            return;
        };
        let point = self.point(position, Phase::End, group_id);
        self.emit(point);

        let Some(group) = self.open.take() else {
            return;
        };
        let simplified = simplify_group(&group, self.config.tolerance);
        log::debug!(
            "Stroke {} closed: {} points, {} after simplification",
            group.id,
            group.len(),
            simplified.len()
        );

        self.undo_stack.push(simplified.clone());
        self.redo_stack.clear();
        self.schedule_persist(simplified, now);
    }

    fn point(&self, position: Point, phase: Phase, group_id: GroupId) -> StrokePoint {
        StrokePoint::new(
            position,
            phase,
            self.pen.width,
            self.pen.color.clone(),
            self.author_id.clone(),
        )
        .in_group(group_id)
    }

    /// Render, accumulate and broadcast one local point.
    fn emit(&mut self, point: StrokePoint) {
        self.surface.apply(&point);
        if let Some(group) = &mut self.open {
            group.push(point.clone());
        }
        self.outgoing.push(ClientMessage::Draw(point));
    }

    // --- Persistence ---

    fn schedule_persist(&mut self, group: StrokeGroup, now: Instant) {
        self.pending.push(group);
        self.debounce.schedule(now);
    }

    /// Drive the debounce timer. Returns true if a persistence call was queued.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.debounce.fire(now) && self.flush_pending()
    }

    /// When the pending persistence call will fire, if one is scheduled.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    /// Queue any pending groups immediately.
    pub fn flush(&mut self) -> bool {
        self.debounce.cancel();
        self.flush_pending()
    }

    fn flush_pending(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let groups = std::mem::take(&mut self.pending);
        log::debug!("Persisting {} stroke group(s)", groups.len());
        self.outgoing.push(ClientMessage::PersistGroups { groups });
        true
    }

    // --- Undo / redo / clear ---

    /// Undo the local author's most recent group.
    /// Returns false if there is nothing to undo or a gesture is in progress.
    pub fn undo(&mut self) -> bool {
        if self.is_drawing() {
            return false;
        }
        let Some(group) = self.undo_stack.pop() else {
            return false;
        };

        self.pending.retain(|g| g.id != group.id);
        if self.pending.is_empty() {
            self.debounce.cancel();
        }

        self.outgoing.push(ClientMessage::RemoveGroup { group_id: group.id });
        self.redo_stack.push(group);
        self.repaint_local();
        true
    }

    /// Redo the most recently undone group.
    /// Returns false if there is nothing to redo or a gesture is in progress.
    pub fn redo(&mut self, now: Instant) -> bool {
        if self.is_drawing() {
            return false;
        }
        let Some(group) = self.redo_stack.pop() else {
            return false;
        };

        match self.config.redo_mode {
            RedoMode::Replay => {
                for point in &group.points {
                    self.surface.apply(point);
                    self.outgoing.push(ClientMessage::Draw(point.clone()));
                }
                self.schedule_persist(group.clone(), now);
            }
            RedoMode::Restore => {
                self.surface.paint_group(&group);
                self.outgoing.push(ClientMessage::RestoreGroup {
                    group: group.clone(),
                });
            }
        }

        self.undo_stack.push(group);
        true
    }

    /// Erase everything locally and tell every peer to do the same.
    pub fn clear_all(&mut self) {
        self.reset();
        self.outgoing.push(ClientMessage::ClearAll);
    }

    fn reset(&mut self) {
        self.open = None;
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.peers.clear();
        self.pending.clear();
        self.debounce.cancel();
        self.surface.clear();
    }

    /// Redraw only the local author's strokes from the undo stack.
    fn repaint_local(&mut self) {
        self.surface.erase_author(&self.author_id);
        for group in &self.undo_stack {
            self.surface.paint_group(group);
        }
        if let Some(open) = &self.open {
            for point in &open.points {
                self.surface.apply(point);
            }
        }
    }

    /// Rebuild every finished stroke from known groups. Open paths, local or
    /// peer, stay bound and keep drawing.
    fn repaint_all(&mut self) {
        self.surface.clear_painted();
        for group in self.peers.iter() {
            self.surface.paint_group(group);
        }
        for group in &self.undo_stack {
            self.surface.paint_group(group);
        }
    }

    /// Store a peer group and make sure it is visible. A live stroke already
    /// on the surface is not painted twice.
    fn store_peer_group(&mut self, group: StrokeGroup) -> HistoryEvent {
        let event = HistoryEvent::PeerGroupStored {
            author_id: group.author_id.clone(),
            group_id: group.id,
        };
        if !self.surface.contains_group(group.id) {
            self.surface.paint_group(&group);
        }
        self.peers.append(group);
        event
    }

    // --- Session load ---

    /// Seed history from the bulk load endpoint and repaint.
    ///
    /// Groups by the local author become the undo stack; everyone else's go to
    /// the peer index. Groups still waiting for persistence are kept.
    pub fn load_history(&mut self, groups: Vec<StrokeGroup>) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.peers.clear();

        for group in groups {
            if group.author_id == self.author_id {
                self.undo_stack.push(group);
            } else {
                self.peers.append(group);
            }
        }
        for group in &self.pending {
            if !self.undo_stack.iter().any(|g| g.id == group.id) {
                self.undo_stack.push(group.clone());
            }
        }

        log::info!(
            "Loaded {} own and {} peer stroke group(s)",
            self.undo_stack.len(),
            self.peers.len()
        );
        self.repaint_all();
    }

    // --- Outgoing ---

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    // --- Incoming ---

    /// Decode and handle one server message.
    pub fn handle_json(&mut self, json: &str) -> Result<Option<HistoryEvent>, ProtocolError> {
        let msg = ServerMessage::from_json(json)?;
        Ok(self.handle_message(msg))
    }

    /// Apply a server message to local state.
    pub fn handle_message(&mut self, msg: ServerMessage) -> Option<HistoryEvent> {
        match msg {
            ServerMessage::Welcome {
                author_id,
                display_name,
                online,
            } => {
                if author_id != self.author_id {
                    log::warn!(
                        "Admitted as {} but history belongs to {}",
                        author_id,
                        self.author_id
                    );
                }
                self.roster.seed(online);
                Some(HistoryEvent::Welcomed {
                    author_id,
                    display_name,
                })
            }
            ServerMessage::Draw(point) => {
                if point.author_id == self.author_id {
                    log::debug!("Ignoring relayed point of local author");
                    return None;
                }
                self.surface.apply(&point);
                Some(HistoryEvent::PeerPainted {
                    author_id: point.author_id,
                })
            }
            ServerMessage::StrokeGroupPersisted(group) | ServerMessage::GroupRestored(group) => {
                if group.author_id == self.author_id {
                    return None;
                }
                Some(self.store_peer_group(group))
            }
            ServerMessage::RemoveGroup {
                group_id,
                author_id,
            } => {
                if author_id == self.author_id {
                    return None;
                }
                if self.peers.remove(&author_id, group_id).is_none() {
                    log::debug!("Removing group {} not yet known for {}", group_id, author_id);
                }
                self.repaint_all();
                Some(HistoryEvent::Repainted)
            }
            ServerMessage::ClearAll => {
                self.reset();
                Some(HistoryEvent::Cleared)
            }
            ServerMessage::PresenceChanged(entry) => {
                if !entry.is_online() {
                    self.surface.release(&entry.author_id);
                }
                self.roster.upsert(entry.clone());
                Some(HistoryEvent::PresenceChanged(entry))
            }
            ServerMessage::Error { message } => {
                log::warn!("Relay error: {}", message);
                Some(HistoryEvent::Error { message })
            }
        }
    }
}
