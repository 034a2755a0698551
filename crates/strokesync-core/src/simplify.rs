//! Point reduction for completed strokes.
//!
//! Runs once per gesture, after the `End` point, before the group is stored.
//! Live points are never simplified.

use kurbo::Point;

use crate::stroke::{Phase, StrokeGroup, StrokePoint};

/// Tolerance used when none is configured, in surface units.
pub const DEFAULT_TOLERANCE: f64 = 0.75;

/// Simplify a closed group, returning a new group with the same identity.
pub fn simplify_group(group: &StrokeGroup, tolerance: f64) -> StrokeGroup {
    StrokeGroup {
        id: group.id,
        author_id: group.author_id.clone(),
        points: simplify(&group.points, tolerance),
        created_at: group.created_at,
    }
}

/// Ramer-Douglas-Peucker reduction of a point run.
///
/// The first and last points are always kept. Every dropped point lies within
/// `tolerance` of the line through the kept points on either side of it.
/// Phases are reassigned afterwards: first `Begin`, last `End`, the rest `Draw`.
/// A lone point is both first and last and is marked `End`, so the group still
/// closes whatever a replay of it opens.
pub fn simplify(points: &[StrokePoint], tolerance: f64) -> Vec<StrokePoint> {
    let tolerance = tolerance.max(0.0);

    let mut kept: Vec<StrokePoint> = if points.len() < 3 {
        points.to_vec()
    } else {
        let positions: Vec<Point> = points.iter().map(StrokePoint::position).collect();
        let mut keep = vec![false; points.len()];
        keep[0] = true;
        keep[points.len() - 1] = true;
        mark_kept(&positions, 0, points.len() - 1, tolerance, &mut keep);

        points
            .iter()
            .zip(keep)
            .filter_map(|(p, k)| k.then(|| p.clone()))
            .collect()
    };

    assign_phases(&mut kept);
    kept
}

/// Mark the point farthest from the `first..last` chord if it is out of
/// tolerance, then recurse on both halves.
fn mark_kept(points: &[Point], first: usize, last: usize, tolerance: f64, keep: &mut [bool]) {
    if last <= first + 1 {
        return;
    }

    let mut max_dist = 0.0;
    let mut max_index = first;

    for (i, point) in points.iter().enumerate().take(last).skip(first + 1) {
        let dist = perpendicular_distance(*point, points[first], points[last]);
        if dist > max_dist {
            max_dist = dist;
            max_index = i;
        }
    }

    if max_dist > tolerance {
        keep[max_index] = true;
        mark_kept(points, first, max_index, tolerance, keep);
        mark_kept(points, max_index, last, tolerance, keep);
    }
}

fn assign_phases(points: &mut [StrokePoint]) {
    let len = points.len();
    for (i, point) in points.iter_mut().enumerate() {
        point.phase = if i == len - 1 {
            Phase::End
        } else if i == 0 {
            Phase::Begin
        } else {
            Phase::Draw
        };
    }
}

/// Perpendicular distance from `point` to the line through `line_start` and
/// `line_end`. Falls back to point distance when the line is degenerate.
pub fn perpendicular_distance(point: Point, line_start: Point, line_end: Point) -> f64 {
    let dx = line_end.x - line_start.x;
    let dy = line_end.y - line_start.y;

    let line_len_sq = dx * dx + dy * dy;
    if line_len_sq < f64::EPSILON {
        return point.distance(line_start);
    }

    // Area of triangle * 2 / base = height
    let area2 = ((point.x - line_start.x) * dy - (point.y - line_start.y) * dx).abs();
    area2 / line_len_sq.sqrt()
}
