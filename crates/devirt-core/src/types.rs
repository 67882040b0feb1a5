use crate::hierarchy::{ClassId, HierarchyModel};
use itertools::Itertools;
use std::collections::BTreeSet;

/// The concrete runtime classes a value may have at one program point.
///
/// Iteration follows registration order, which is what keeps generated tag
/// switches stable between compilations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConcreteTypeSet {
    classes: BTreeSet<ClassId>,
}

impl ConcreteTypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(class: ClassId) -> Self {
        Self {
            classes: BTreeSet::from([class]),
        }
    }

    pub fn insert(&mut self, class: ClassId) -> bool {
        self.classes.insert(class)
    }

    pub fn contains(&self, class: ClassId) -> bool {
        self.classes.contains(&class)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The only member, when the set is monomorphic.
    pub fn as_single(&self) -> Option<ClassId> {
        if self.classes.len() == 1 {
            self.classes.iter().next().copied()
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.classes.iter().copied()
    }

    pub fn union(&self, other: &ConcreteTypeSet) -> ConcreteTypeSet {
        Self {
            classes: self.classes.union(&other.classes).copied().collect(),
        }
    }

    pub fn extend(&mut self, other: &ConcreteTypeSet) {
        self.classes.extend(other.classes.iter().copied());
    }

    pub fn intersection(&self, other: &ConcreteTypeSet) -> ConcreteTypeSet {
        Self {
            classes: self.classes.intersection(&other.classes).copied().collect(),
        }
    }

    pub fn display<'a>(&'a self, hierarchy: &'a HierarchyModel) -> impl std::fmt::Display + 'a {
        DisplaySet {
            set: self,
            hierarchy,
        }
    }
}

impl FromIterator<ClassId> for ConcreteTypeSet {
    fn from_iter<I: IntoIterator<Item = ClassId>>(iter: I) -> Self {
        Self {
            classes: iter.into_iter().collect(),
        }
    }
}

struct DisplaySet<'a> {
    set: &'a ConcreteTypeSet,
    hierarchy: &'a HierarchyModel,
}

impl std::fmt::Display for DisplaySet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.set
                .iter()
                .map(|id| self.hierarchy.class(id).name.as_str())
                .join(", ")
        )
    }
}
