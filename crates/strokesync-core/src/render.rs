//! Per-author render bindings and the retained drawing surface.
//!
//! Every author draws through their own [`PathHandle`], so two authors whose
//! `Draw` events arrive interleaved can never splice segments into one line.

use std::collections::HashMap;

use kurbo::{BezPath, Point, Rect, Shape};
use peniko::Color;
use peniko::color::{Srgb, parse_color};

use crate::stroke::{AuthorId, GroupId, Phase, StrokeGroup, StrokePoint};

/// Parse a stroke color string. Unparseable colors render black.
pub fn parse_stroke_color(color: &str) -> Color {
    match parse_color(color) {
        Ok(parsed) => parsed.to_alpha_color::<Srgb>(),
        Err(e) => {
            log::warn!("Unparseable stroke color {:?}: {}", color, e);
            Color::from_rgba8(0, 0, 0, 255)
        }
    }
}

/// A finished or in-progress line on the surface.
#[derive(Debug, Clone)]
pub struct PaintedStroke {
    pub author_id: AuthorId,
    /// Group the stroke was drawn for, when the points carried one.
    pub group_id: Option<GroupId>,
    pub path: BezPath,
    pub width: f64,
    pub color: Color,
}

impl PaintedStroke {
    fn start(point: &StrokePoint) -> Self {
        let mut path = BezPath::new();
        path.move_to(point.position());
        Self {
            author_id: point.author_id.clone(),
            group_id: point.group_id,
            path,
            width: point.width,
            color: parse_stroke_color(&point.color),
        }
    }

    /// Extend to `position` unless it repeats the last vertex.
    fn extend(&mut self, position: Point) {
        let last = self.path.elements().last().and_then(|el| el.end_point());
        if last != Some(position) {
            self.path.line_to(position);
        }
    }

    /// Number of line segments in the path.
    pub fn segment_count(&self) -> usize {
        self.path.elements().len().saturating_sub(1)
    }

    /// Vertices of the polyline in drawing order.
    pub fn vertices(&self) -> Vec<Point> {
        self.path
            .elements()
            .iter()
            .filter_map(|el| el.end_point())
            .collect()
    }

    pub fn bounds(&self) -> Rect {
        self.path.bounding_box()
    }
}

/// Path state for one author.
#[derive(Debug, Clone, Default)]
pub struct PathHandle {
    current: Option<PaintedStroke>,
}

impl PathHandle {
    /// Whether a path is currently open.
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// The open path, if any.
    pub fn path(&self) -> Option<&BezPath> {
        self.current.as_ref().map(|s| &s.path)
    }

    /// Open a new path at `point`, handing back any path left open.
    fn begin(&mut self, point: &StrokePoint) -> Option<PaintedStroke> {
        self.current.replace(PaintedStroke::start(point))
    }

    /// Extend the open path. Opens one if the `Begin` was lost.
    fn line_to(&mut self, point: &StrokePoint) {
        match &mut self.current {
            Some(stroke) => {
                stroke.path.line_to(point.position());
                stroke.width = point.width;
            }
            None => self.current = Some(PaintedStroke::start(point)),
        }
    }

    /// Close the open path at `point`, drawing the final segment if the
    /// end lies elsewhere.
    fn end(&mut self, point: &StrokePoint) -> Option<PaintedStroke> {
        if let Some(stroke) = &mut self.current {
            stroke.extend(point.position());
        }
        self.finish()
    }

    fn finish(&mut self) -> Option<PaintedStroke> {
        self.current.take()
    }
}

/// Owned mapping from author to their path handle.
#[derive(Debug, Clone, Default)]
pub struct RenderBinding {
    handles: HashMap<AuthorId, PathHandle>,
}

impl RenderBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// The author's handle, created on first use.
    pub fn bind(&mut self, author_id: &AuthorId) -> &mut PathHandle {
        self.handles.entry(author_id.clone()).or_default()
    }

    pub fn get(&self, author_id: &AuthorId) -> Option<&PathHandle> {
        self.handles.get(author_id)
    }

    /// Drop the author's handle, returning whatever path it had open.
    pub fn reset(&mut self, author_id: &AuthorId) -> Option<PaintedStroke> {
        self.handles.remove(author_id).and_then(|mut h| h.finish())
    }

    pub fn reset_all(&mut self) {
        self.handles.clear();
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    fn open_strokes(&self) -> impl Iterator<Item = &PaintedStroke> {
        self.handles.values().filter_map(|h| h.current.as_ref())
    }
}

/// Retained display list of everything drawn in this session.
#[derive(Debug, Clone, Default)]
pub struct Surface {
    painted: Vec<PaintedStroke>,
    bindings: RenderBinding,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one point through its author's binding.
    pub fn apply(&mut self, point: &StrokePoint) {
        let handle = self.bindings.bind(&point.author_id);
        match point.phase {
            Phase::Begin => {
                if let Some(abandoned) = handle.begin(point) {
                    log::debug!("Force-closing open path of {}", point.author_id);
                    Self::commit(&mut self.painted, abandoned);
                }
            }
            Phase::Draw => handle.line_to(point),
            Phase::End => {
                if let Some(done) = handle.end(point) {
                    Self::commit(&mut self.painted, done);
                }
            }
        }
    }

    /// Paint a closed group as one finished stroke. Bindings are left alone,
    /// so an author's live path survives.
    pub fn paint_group(&mut self, group: &StrokeGroup) {
        let Some((first, rest)) = group.points.split_first() else {
            return;
        };
        let mut stroke = PaintedStroke::start(first);
        stroke.group_id = Some(group.id);
        for point in rest {
            stroke.extend(point.position());
        }
        Self::commit(&mut self.painted, stroke);
    }

    /// Whether any finished or open stroke was drawn for `group_id`.
    pub fn contains_group(&self, group_id: GroupId) -> bool {
        self.strokes().any(|s| s.group_id == Some(group_id))
    }

    /// Finish and forget one author's binding, keeping what they drew.
    pub fn release(&mut self, author_id: &AuthorId) {
        if let Some(open) = self.bindings.reset(author_id) {
            Self::commit(&mut self.painted, open);
        }
    }

    /// Remove everything one author drew, including their open path.
    pub fn erase_author(&mut self, author_id: &AuthorId) {
        self.painted.retain(|s| &s.author_id != author_id);
        self.bindings.reset(author_id);
    }

    /// Drop finished strokes but keep every open path and binding.
    pub fn clear_painted(&mut self) {
        self.painted.clear();
    }

    /// Wipe the surface and invalidate every binding.
    pub fn clear(&mut self) {
        self.painted.clear();
        self.bindings.reset_all();
    }

    /// Finished strokes followed by strokes still being drawn.
    pub fn strokes(&self) -> impl Iterator<Item = &PaintedStroke> {
        self.painted.iter().chain(self.bindings.open_strokes())
    }

    pub fn strokes_by<'a>(
        &'a self,
        author_id: &'a AuthorId,
    ) -> impl Iterator<Item = &'a PaintedStroke> + 'a {
        self.strokes().filter(move |s| &s.author_id == author_id)
    }

    pub fn bindings(&self) -> &RenderBinding {
        &self.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.strokes().next().is_none()
    }

    fn commit(painted: &mut Vec<PaintedStroke>, stroke: PaintedStroke) {
        // A lone move-to draws nothing.
        if stroke.segment_count() > 0 {
            painted.push(stroke);
        }
    }
}
