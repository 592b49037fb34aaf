// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Node placement data for the root genome and root-instance layouts.
//!
//! Subset instances draw with their root instance's layout, so there is one
//! layout per root instance plus one for the root genome.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Add;

use crate::ids::{LayoutId, ModelRef};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Right,
    Left,
    Up,
    Down,
}

/// Where and how a node is drawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePlacement {
    pub position: Point,
    pub color: String,
    pub orientation: Orientation,
}

impl NodePlacement {
    pub fn at(position: Point) -> Self {
        Self {
            position,
            color: "black".to_string(),
            orientation: Orientation::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub id: LayoutId,
    pub target: ModelRef,
    placements: BTreeMap<String, NodePlacement>,
}

impl Layout {
    pub fn new(id: LayoutId, target: ModelRef) -> Self {
        Self {
            id,
            target,
            placements: BTreeMap::new(),
        }
    }

    /// Placement keyed by the node's id string (base id or composite id)
    pub fn placement(&self, node_key: &str) -> Option<&NodePlacement> {
        self.placements.get(node_key)
    }

    /// Set a placement, returning the one it replaced
    pub fn set_placement(
        &mut self,
        node_key: impl Into<String>,
        placement: NodePlacement,
    ) -> Option<NodePlacement> {
        self.placements.insert(node_key.into(), placement)
    }

    pub fn remove_placement(&mut self, node_key: &str) -> Option<NodePlacement> {
        self.placements.remove(node_key)
    }

    pub fn placement_count(&self) -> usize {
        self.placements.len()
    }
}
