//! Force-directed placement of the displayed graph.
//!
//! Bodies survive between runs keyed by node id, so re-running after an
//! expansion only nudges nodes that were already on screen while new nodes are
//! seeded next to a displayed neighbour. The simulation runs a fixed number of
//! ticks with a cooling factor, which keeps output deterministic for the same
//! input.

use std::collections::HashMap;
use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::{Density, DensityParams};
use crate::graph::DisplayedGraph;
use crate::{NODE_RADIUS, SELF_LOOP_RADIUS};

const FRESH_ALPHA: f32 = 1.0;
const REHEAT_ALPHA: f32 = 0.3;
const MIN_ALPHA: f32 = 0.001;
const TICKS: usize = 300;
const VELOCITY_DECAY: f32 = 0.4;
const MAX_VELOCITY: f32 = 60.0;
const MIN_DISTANCE: f32 = 1.0;
const LINK_STRENGTH: f32 = 0.7;
const COLLISION_STRENGTH: f32 = 0.7;
const GOLDEN_ANGLE: f32 = 2.399_963;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Body {
    pub position: Point,
    velocity: Point,
}

#[derive(Debug, Clone, Default)]
pub struct LayoutState {
    bodies: HashMap<String, Body>,
}

impl LayoutState {
    pub fn position(&self, id: &str) -> Option<Point> {
        self.bodies.get(id).map(|body| body.position)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
    }

    /// Places every displayed node, keeping bodies that were already placed.
    pub fn run(&mut self, graph: &DisplayedGraph, density: Density) {
        self.bodies.retain(|id, _| graph.contains_node(id));

        let had_bodies = !self.bodies.is_empty();
        let params = density.params();
        self.seed_new_bodies(graph, &params);

        let ids: Vec<&str> = graph.nodes().iter().map(String::as_str).collect();
        if ids.is_empty() {
            return;
        }

        let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let springs: Vec<(usize, usize)> = graph
            .links()
            .iter()
            .filter(|link| !link.is_self_loop())
            .filter_map(|link| Some((*index.get(link.source.as_str())?, *index.get(link.target.as_str())?)))
            .collect();

        let mut bodies: Vec<Body> = ids
            .iter()
            .map(|id| self.bodies.get(*id).copied().unwrap_or_default())
            .collect();

        let mut alpha = if had_bodies { REHEAT_ALPHA } else { FRESH_ALPHA };
        let alpha_decay = 1.0 - MIN_ALPHA.powf(1.0 / TICKS as f32);
        for _ in 0..TICKS {
            tick(&mut bodies, &springs, &params, alpha);
            alpha += (0.0 - alpha) * alpha_decay;
        }

        for (id, body) in ids.iter().zip(bodies) {
            self.bodies.insert((*id).to_string(), body);
        }
    }

    fn seed_new_bodies(&mut self, graph: &DisplayedGraph, params: &DensityParams) {
        for (ordinal, id) in graph.nodes().iter().enumerate() {
            if self.bodies.contains_key(id) {
                continue;
            }

            let anchor = graph
                .links()
                .iter()
                .filter(|link| link.touches(id) && !link.is_self_loop())
                .find_map(|link| {
                    let other = if link.source == *id { &link.target } else { &link.source };
                    self.bodies.get(other).map(|body| body.position)
                });

            let angle = ordinal as f32 * GOLDEN_ANGLE;
            let position = match anchor {
                Some(anchor) => Point::new(
                    anchor.x + angle.cos() * params.link_distance,
                    anchor.y + angle.sin() * params.link_distance,
                ),
                None => {
                    let radius = params.collision_radius * (0.5 + ordinal as f32).sqrt();
                    Point::new(angle.cos() * radius, angle.sin() * radius)
                }
            };

            self.bodies.insert(
                id.clone(),
                Body {
                    position,
                    velocity: Point::default(),
                },
            );
        }
    }
}

fn tick(bodies: &mut [Body], springs: &[(usize, usize)], params: &DensityParams, alpha: f32) {
    let n = bodies.len();

    // Repulsion between all pairs (inverse square).
    for i in 0..n {
        for j in (i + 1)..n {
            let (dx, dy, dist) = separation(bodies[i].position, bodies[j].position, i, j);
            let force = params.repulsion * alpha / (dist * dist);
            let (fx, fy) = (dx / dist * force, dy / dist * force);
            bodies[i].velocity.x -= fx;
            bodies[i].velocity.y -= fy;
            bodies[j].velocity.x += fx;
            bodies[j].velocity.y += fy;
        }
    }

    for &(source, target) in springs {
        let (dx, dy, dist) = separation(bodies[source].position, bodies[target].position, source, target);
        let stretch = (dist - params.link_distance) / dist * alpha * LINK_STRENGTH * 0.5;
        bodies[source].velocity.x += dx * stretch;
        bodies[source].velocity.y += dy * stretch;
        bodies[target].velocity.x -= dx * stretch;
        bodies[target].velocity.y -= dy * stretch;
    }

    for body in bodies.iter_mut() {
        body.velocity.x *= 1.0 - VELOCITY_DECAY;
        body.velocity.y *= 1.0 - VELOCITY_DECAY;
        let speed = (body.velocity.x * body.velocity.x + body.velocity.y * body.velocity.y).sqrt();
        if speed > MAX_VELOCITY {
            body.velocity.x *= MAX_VELOCITY / speed;
            body.velocity.y *= MAX_VELOCITY / speed;
        }
        body.position.x += body.velocity.x;
        body.position.y += body.velocity.y;
    }

    // Collision resolves overlap on positions directly.
    let min_gap = params.collision_radius * 2.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let (dx, dy, dist) = separation(bodies[i].position, bodies[j].position, i, j);
            if dist >= min_gap {
                continue;
            }
            let push = (min_gap - dist) / dist * 0.5 * COLLISION_STRENGTH;
            bodies[i].position.x -= dx * push;
            bodies[i].position.y -= dy * push;
            bodies[j].position.x += dx * push;
            bodies[j].position.y += dy * push;
        }
    }

    // Keep the centroid at the origin.
    let (sum_x, sum_y) = bodies
        .iter()
        .fold((0.0, 0.0), |(x, y), body| (x + body.position.x, y + body.position.y));
    let (cx, cy) = (sum_x / n as f32, sum_y / n as f32);
    for body in bodies.iter_mut() {
        body.position.x -= cx;
        body.position.y -= cy;
    }
}

/// Vector from `a` to `b` and its length; coincident points get a fixed
/// per-pair jitter so they can separate.
fn separation(a: Point, b: Point, i: usize, j: usize) -> (f32, f32, f32) {
    let mut dx = b.x - a.x;
    let mut dy = b.y - a.y;
    if dx.abs() < f32::EPSILON && dy.abs() < f32::EPSILON {
        let angle = (i * 31 + j * 17) as f32 * GOLDEN_ANGLE;
        dx = angle.cos() * MIN_DISTANCE;
        dy = angle.sin() * MIN_DISTANCE;
    }
    let dist = (dx * dx + dy * dy).sqrt().max(MIN_DISTANCE);
    (dx, dy, dist)
}

/// Arc drawn for an edge whose source and target are the same node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelfLoop {
    pub start: Point,
    pub end: Point,
    pub radius: f32,
    pub apex: Point,
}

pub fn self_loop(center: Point) -> SelfLoop {
    // Anchor points sit 30 degrees either side of the top of the node circle.
    let offset = (PI / 6.0).sin() * NODE_RADIUS;
    let rise = (PI / 6.0).cos() * NODE_RADIUS;
    let start = Point::new(center.x - offset, center.y - rise);
    let end = Point::new(center.x + offset, center.y - rise);
    let half_chord = offset;
    let arc_center_y = start.y - (SELF_LOOP_RADIUS * SELF_LOOP_RADIUS - half_chord * half_chord).sqrt();
    SelfLoop {
        start,
        end,
        radius: SELF_LOOP_RADIUS,
        apex: Point::new(center.x, arc_center_y - SELF_LOOP_RADIUS),
    }
}

/// Where an edge label sits: the arc apex for self loops, else the midpoint.
pub fn label_anchor(source: Point, target: Point, is_self_loop: bool) -> Point {
    if is_self_loop {
        self_loop(source).apex
    } else {
        source.midpoint(target)
    }
}
