// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

/*!
GenomeHierarchy - arena holding the root genome and its instance tree.

Instances are stored in a vector and refer to their parent by index, so bulk
mutation never juggles live references between models.
*/

use ahash::AHashMap;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{StructureError, StructureResult};
use crate::genomic::genome::{DbGenome, GenomeInstance};
use crate::ids::{InstanceIdx, LayoutId, ModelRef};
use crate::layout::Layout;

/// Arena of genome models.
///
/// # Design Notes
///
/// - The root genome is held directly; instances live in `instances`
/// - A root instance has `parent() == None`
/// - Children are indexed for descendant walks; cycles are impossible since a
///   parent must exist before its child is created
/// - Each root instance owns a layout; subsets share it
#[derive(Debug, Clone)]
pub struct GenomeHierarchy {
    root: DbGenome,
    instances: Vec<GenomeInstance>,
    children_map: AHashMap<InstanceIdx, BTreeSet<InstanceIdx>>,
    layouts: BTreeMap<LayoutId, Layout>,
}

impl GenomeHierarchy {
    /// Create a hierarchy around a root genome
    pub fn new(root: DbGenome) -> Self {
        let root_layout = Self::layout_id_for_root(&root);
        let mut layouts = BTreeMap::new();
        layouts.insert(root_layout.clone(), Layout::new(root_layout, ModelRef::Root));
        Self {
            root,
            instances: Vec::new(),
            children_map: AHashMap::new(),
            layouts,
        }
    }

    fn layout_id_for_root(root: &DbGenome) -> LayoutId {
        LayoutId::new(format!("{}__layout", root.id))
    }

    pub fn root(&self) -> &DbGenome {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut DbGenome {
        &mut self.root
    }

    /// Add a root instance (VfA) under the root genome
    pub fn add_root_instance(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> StructureResult<InstanceIdx> {
        let id = id.into();
        self.check_unique_id(&id)?;
        let idx = InstanceIdx(self.instances.len());
        let layout_id = LayoutId::new(format!("{}__layout", id));
        self.instances.push(GenomeInstance::new(id, name, None, 0));
        self.layouts.insert(
            layout_id.clone(),
            Layout::new(layout_id, ModelRef::Instance(idx)),
        );
        Ok(idx)
    }

    /// Add a subset instance (VfN) under an existing instance
    pub fn add_subset_instance(
        &mut self,
        parent: InstanceIdx,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> StructureResult<InstanceIdx> {
        let id = id.into();
        self.check_unique_id(&id)?;
        let generation = self.instance(parent)?.generation() + 1;
        let idx = InstanceIdx(self.instances.len());
        self.instances
            .push(GenomeInstance::new(id, name, Some(parent), generation));
        self.children_map.entry(parent).or_default().insert(idx);
        Ok(idx)
    }

    fn check_unique_id(&self, id: &str) -> StructureResult<()> {
        if id == self.root.id || self.instances.iter().any(|inst| inst.id == id) {
            return Err(StructureError::DuplicateElement(id.to_string()));
        }
        Ok(())
    }

    pub fn instance(&self, idx: InstanceIdx) -> StructureResult<&GenomeInstance> {
        self.instances
            .get(idx.0)
            .ok_or(StructureError::UnknownInstance(idx))
    }

    pub fn instance_mut(&mut self, idx: InstanceIdx) -> StructureResult<&mut GenomeInstance> {
        self.instances
            .get_mut(idx.0)
            .ok_or(StructureError::UnknownInstance(idx))
    }

    /// Instance index by model id string
    pub fn find_instance(&self, id: &str) -> Option<InstanceIdx> {
        self.instances
            .iter()
            .position(|inst| inst.id == id)
            .map(InstanceIdx)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn instance_indices(&self) -> impl Iterator<Item = InstanceIdx> {
        (0..self.instances.len()).map(InstanceIdx)
    }

    pub fn root_instances(&self) -> impl Iterator<Item = InstanceIdx> + '_ {
        self.instances
            .iter()
            .enumerate()
            .filter(|(_, inst)| inst.is_root_instance())
            .map(|(idx, _)| InstanceIdx(idx))
    }

    pub fn parent_of(&self, idx: InstanceIdx) -> StructureResult<Option<InstanceIdx>> {
        Ok(self.instance(idx)?.parent())
    }

    /// Parent model of an instance: the root genome for root instances
    pub fn parent_model(&self, idx: InstanceIdx) -> StructureResult<ModelRef> {
        Ok(match self.instance(idx)?.parent() {
            Some(parent) => ModelRef::Instance(parent),
            None => ModelRef::Root,
        })
    }

    /// The root instance at the top of `idx`'s ancestry
    pub fn root_instance_of(&self, idx: InstanceIdx) -> StructureResult<InstanceIdx> {
        let mut current = idx;
        while let Some(parent) = self.instance(current)?.parent() {
            current = parent;
        }
        Ok(current)
    }

    pub fn children_of(&self, idx: InstanceIdx) -> Vec<InstanceIdx> {
        self.children_map
            .get(&idx)
            .map(|children| children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All descendants of `idx` (not including itself), in index order
    pub fn descendants_of(&self, idx: InstanceIdx) -> Vec<InstanceIdx> {
        let mut descendants = Vec::new();
        let mut to_visit = vec![idx];

        while let Some(current) = to_visit.pop() {
            if let Some(children) = self.children_map.get(&current) {
                for child in children {
                    descendants.push(*child);
                    to_visit.push(*child);
                }
            }
        }

        descendants.sort();
        descendants
    }

    /// Whether `ancestor` is `idx` or lies above it
    pub fn is_ancestor_or_self(&self, ancestor: InstanceIdx, idx: InstanceIdx) -> bool {
        let mut current = Some(idx);
        while let Some(inst) = current {
            if inst == ancestor {
                return true;
            }
            current = self.instances.get(inst.0).and_then(|i| i.parent());
        }
        false
    }

    /// Human-readable model name for messages
    pub fn model_name(&self, model: ModelRef) -> String {
        match model {
            ModelRef::Root => self.root.id.clone(),
            ModelRef::Instance(idx) => self
                .instances
                .get(idx.0)
                .map(|inst| inst.id.clone())
                .unwrap_or_else(|| idx.to_string()),
        }
    }

    //region Layouts

    /// Layout used to draw `model`
    pub fn layout_id_for(&self, model: ModelRef) -> StructureResult<LayoutId> {
        match model {
            ModelRef::Root => Ok(Self::layout_id_for_root(&self.root)),
            ModelRef::Instance(idx) => {
                let root_instance = self.root_instance_of(idx)?;
                let id = &self.instance(root_instance)?.id;
                Ok(LayoutId::new(format!("{}__layout", id)))
            }
        }
    }

    pub fn layout(&self, id: &LayoutId) -> Option<&Layout> {
        self.layouts.get(id)
    }

    pub fn layout_mut(&mut self, id: &LayoutId) -> Option<&mut Layout> {
        self.layouts.get_mut(id)
    }

    pub fn layout_for(&self, model: ModelRef) -> StructureResult<&Layout> {
        let id = self.layout_id_for(model)?;
        self.layouts
            .get(&id)
            .ok_or_else(|| StructureError::InvalidId(id.to_string()))
    }

    pub fn layout_for_mut(&mut self, model: ModelRef) -> StructureResult<&mut Layout> {
        let id = self.layout_id_for(model)?;
        self.layouts
            .get_mut(&id)
            .ok_or_else(|| StructureError::InvalidId(id.to_string()))
    }

    //endregion
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> GenomeHierarchy {
        GenomeHierarchy::new(DbGenome::new("db", "Full genome"))
    }

    #[test]
    fn test_root_instance_creation() {
        let mut h = hierarchy();
        let vfa = h.add_root_instance("vfa", "Embryo").unwrap();
        assert_eq!(h.instance_count(), 1);
        assert!(h.instance(vfa).unwrap().is_root_instance());
        assert_eq!(h.parent_model(vfa).unwrap(), ModelRef::Root);
        assert!(h.layout_for(ModelRef::Instance(vfa)).is_ok());
    }

    #[test]
    fn test_subset_shares_root_layout() {
        let mut h = hierarchy();
        let vfa = h.add_root_instance("vfa", "Embryo").unwrap();
        let vf1 = h.add_subset_instance(vfa, "vf1", "6h").unwrap();
        let vf2 = h.add_subset_instance(vf1, "vf2", "6h detail").unwrap();

        assert_eq!(h.instance(vf2).unwrap().generation(), 2);
        assert_eq!(h.root_instance_of(vf2).unwrap(), vfa);
        assert_eq!(
            h.layout_id_for(ModelRef::Instance(vf2)).unwrap(),
            h.layout_id_for(ModelRef::Instance(vfa)).unwrap()
        );
    }

    #[test]
    fn test_descendants_and_ancestry() {
        let mut h = hierarchy();
        let vfa = h.add_root_instance("vfa", "Embryo").unwrap();
        let a = h.add_subset_instance(vfa, "a", "A").unwrap();
        let b = h.add_subset_instance(vfa, "b", "B").unwrap();
        let a1 = h.add_subset_instance(a, "a1", "A1").unwrap();

        assert_eq!(h.descendants_of(vfa), vec![a, b, a1]);
        assert_eq!(h.descendants_of(a), vec![a1]);
        assert_eq!(h.children_of(vfa), vec![a, b]);
        assert!(h.is_ancestor_or_self(vfa, a1));
        assert!(h.is_ancestor_or_self(a1, a1));
        assert!(!h.is_ancestor_or_self(b, a1));
    }

    #[test]
    fn test_duplicate_model_ids_rejected() {
        let mut h = hierarchy();
        let vfa = h.add_root_instance("vfa", "Embryo").unwrap();
        assert!(h.add_root_instance("vfa", "Again").is_err());
        assert!(h.add_subset_instance(vfa, "db", "Clash").is_err());
        assert!(h.add_subset_instance(InstanceIdx(42), "x", "Orphan").is_err());
    }
}
