//! Lowering of free functions parameterized over a base class.
//!
//! Under [`GenericPolicy::TagDispatch`] such a function is emitted once and
//! every call on a class-typed parameter becomes a tag switch over the
//! parameter's concrete subclasses. Under [`GenericPolicy::Monomorphize`] the
//! function is cloned per tuple of concrete argument classes observed at call
//! sites; clones are discovered by a worklist while the callers are lowered.

use std::collections::{HashSet, VecDeque};

use devirt_core::ast::{FunctionDecl, Ident};
use devirt_core::config::{GenericPolicy, NarrowingPolicy};
use devirt_core::error::{Error, Result};
use devirt_core::hierarchy::{ClassId, HierarchyModel};
use devirt_core::lir::Symbol;
use devirt_core::types::ConcreteTypeSet;
use tracing::debug;

use crate::passes::self_type::declared_classes;

/// A function index in the module plus the concrete class chosen for each
/// class-typed parameter, in parameter order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecializationKey {
    pub function: usize,
    pub classes: Vec<ClassId>,
}

/// Worklist of clones still to be emitted. Discovery order is emission order.
#[derive(Debug, Default)]
pub struct Monomorphizer {
    queue: VecDeque<SpecializationKey>,
    seen: HashSet<SpecializationKey>,
}

impl Monomorphizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `key` unless it was requested before.
    pub fn request(&mut self, key: SpecializationKey) -> bool {
        if self.seen.insert(key.clone()) {
            self.queue.push_back(key);
            true
        } else {
            false
        }
    }

    pub fn next(&mut self) -> Option<SpecializationKey> {
        self.queue.pop_front()
    }

    pub fn requested(&self) -> usize {
        self.seen.len()
    }
}

/// Whether calls to `function` are subject to the generic lowering policy.
pub fn is_generic(function: &FunctionDecl) -> bool {
    function.class_params().next().is_some()
}

/// Whether `function` is emitted as-is (once) under `policy`.
pub fn emitted_once(function: &FunctionDecl, policy: GenericPolicy) -> bool {
    policy == GenericPolicy::TagDispatch || !is_generic(function)
}

pub fn specialization_symbol(
    hierarchy: &HierarchyModel,
    function: &FunctionDecl,
    key: &SpecializationKey,
) -> Symbol {
    let names: Vec<Ident> = key
        .classes
        .iter()
        .map(|class| hierarchy.class(*class).name.clone())
        .collect();
    Symbol::specialization(&function.name, &names)
}

/// Concrete sets of the parameters of a function body, `None` for scalars.
///
/// Without a key every class-typed parameter may hold any class that can
/// arrive under its declared type; with a key each one holds exactly the
/// keyed class.
pub fn parameter_sets(
    hierarchy: &HierarchyModel,
    function: &FunctionDecl,
    key: Option<&SpecializationKey>,
    policy: NarrowingPolicy,
) -> Result<Vec<Option<ConcreteTypeSet>>> {
    let mut keyed = key.map(|key| key.classes.iter());
    let mut sets = Vec::with_capacity(function.params.len());
    for param in &function.params {
        let Some(class_name) = param.ty.as_class() else {
            sets.push(None);
            continue;
        };
        let declared = hierarchy.require(class_name, function.span)?;
        let set = match keyed.as_mut().and_then(|classes| classes.next()) {
            Some(class) => ConcreteTypeSet::single(*class),
            None => declared_classes(hierarchy, declared, policy),
        };
        if set.is_empty() {
            return Err(Error::UnregisteredSubclass {
                class: class_name.clone(),
                span: function.span,
            });
        }
        sets.push(Some(set));
    }
    if let Some(key) = key {
        debug!(
            "specializing {} for {:?}",
            function.name,
            key.classes
                .iter()
                .map(|class| hierarchy.class(*class).name.as_str())
                .collect::<Vec<_>>()
        );
    }
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worklist_deduplicates_and_keeps_discovery_order() {
        let mut mono = Monomorphizer::new();
        let b = SpecializationKey {
            function: 0,
            classes: vec![ClassId(1)],
        };
        let c = SpecializationKey {
            function: 0,
            classes: vec![ClassId(2)],
        };
        assert!(mono.request(b.clone()));
        assert!(mono.request(c.clone()));
        assert!(!mono.request(b.clone()));
        assert_eq!(mono.next(), Some(b));
        assert_eq!(mono.next(), Some(c));
        assert_eq!(mono.next(), None);
        assert_eq!(mono.requested(), 2);
    }
}
