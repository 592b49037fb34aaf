// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Identifier types for root elements, their per-model instances, and regions.
//!
//! Instance-level elements are addressed by `<base>:<instance>` composite keys.
//! The base id is always recoverable from the composite, which is what lets a
//! subset model share ids with its parent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StructureError;

/// Separator between a base id and its instance number or generation.
pub const ID_SEPARATOR: char = ':';

macro_rules! define_base_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

define_base_id!(
    /// Id of a node (gene or generic node) in the root genome
    NodeId
);
define_base_id!(
    /// Id of a linkage in the root genome
    LinkId
);
define_base_id!(
    /// Id of a layout
    LayoutId
);
define_base_id!(
    /// Id of a network overlay
    OverlayId
);
define_base_id!(
    /// Id of a module within a network overlay
    ModuleId
);

macro_rules! define_instance_id {
    ($(#[$meta:meta])* $name:ident, $base:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name {
            base: $base,
            instance: u32,
        }

        impl $name {
            pub fn new(base: $base, instance: u32) -> Self {
                Self { base, instance }
            }

            pub fn base(&self) -> &$base {
                &self.base
            }

            pub fn instance(&self) -> u32 {
                self.instance
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}{}", self.base, ID_SEPARATOR, self.instance)
            }
        }

        impl FromStr for $name {
            type Err = StructureError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let (base, instance) = s
                    .rsplit_once(ID_SEPARATOR)
                    .ok_or_else(|| StructureError::InvalidId(s.to_string()))?;
                if base.is_empty() {
                    return Err(StructureError::InvalidId(s.to_string()));
                }
                let instance = instance
                    .parse::<u32>()
                    .map_err(|_| StructureError::InvalidId(s.to_string()))?;
                Ok(Self::new($base::new(base), instance))
            }
        }
    };
}

define_instance_id!(
    /// Composite id `<node>:<instance>` of a node inside a genome instance
    NodeInstanceId,
    NodeId
);
define_instance_id!(
    /// Composite id `<link>:<instance>` of a linkage inside a genome instance
    LinkInstanceId,
    LinkId
);

/// Id of a group (region) inside a genome instance.
///
/// Groups defined in a root instance carry their base id. Copies inherited by
/// subset instances append the generation: `region_a` becomes `region_a:1`
/// one level down, `region_a:2` two levels down.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the id a group with base id `base` carries at `generation`
    pub fn inherited(base: &GroupId, generation: u32) -> Self {
        let base = base.base();
        if generation == 0 {
            base
        } else {
            Self(format!("{}{}{}", base.0, ID_SEPARATOR, generation))
        }
    }

    /// Strip any generation suffix
    pub fn base(&self) -> GroupId {
        match self.0.rsplit_once(ID_SEPARATOR) {
            Some((base, gen)) if gen.parse::<u32>().is_ok() => GroupId(base.to_string()),
            _ => self.clone(),
        }
    }

    pub fn generation(&self) -> u32 {
        self.0
            .rsplit_once(ID_SEPARATOR)
            .and_then(|(_, gen)| gen.parse::<u32>().ok())
            .unwrap_or(0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Arena index of a genome instance inside a [`crate::GenomeHierarchy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceIdx(pub usize);

impl fmt::Display for InstanceIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Either the root genome or one of the genome instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModelRef {
    Root,
    Instance(InstanceIdx),
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelRef::Root => f.write_str("root"),
            ModelRef::Instance(idx) => write!(f, "instance{}", idx),
        }
    }
}

/// A pair of (source group, target group) a link instance can connect
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupTuple {
    pub source: GroupId,
    pub target: GroupId,
}

impl GroupTuple {
    pub fn new(source: GroupId, target: GroupId) -> Self {
        Self { source, target }
    }

    /// Tuple with both ends in the same group
    pub fn within(group: GroupId) -> Self {
        Self {
            source: group.clone(),
            target: group,
        }
    }
}

impl fmt::Display for GroupTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} -> {})", self.source, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_instance_id_round_trip() {
        let id = NodeInstanceId::new(NodeId::new("G12"), 3);
        assert_eq!(id.to_string(), "G12:3");
        let parsed: NodeInstanceId = "G12:3".parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.base().as_str(), "G12");
    }

    #[test]
    fn test_instance_id_rejects_garbage() {
        assert!("G12".parse::<NodeInstanceId>().is_err());
        assert!(":4".parse::<LinkInstanceId>().is_err());
        assert!("L1:x".parse::<LinkInstanceId>().is_err());
    }

    #[test]
    fn test_group_inheritance() {
        let base = GroupId::new("region_a");
        assert_eq!(GroupId::inherited(&base, 0), base);

        let gen2 = GroupId::inherited(&base, 2);
        assert_eq!(gen2.as_str(), "region_a:2");
        assert_eq!(gen2.base(), base);
        assert_eq!(gen2.generation(), 2);

        // Re-inheriting from an inherited id starts from the base
        assert_eq!(GroupId::inherited(&gen2, 1).as_str(), "region_a:1");
    }

    #[test]
    fn test_group_id_serializes_as_string() {
        let json = serde_json::to_string(&GroupId::new("r1:1")).unwrap();
        assert_eq!(json, "\"r1:1\"");
    }
}
