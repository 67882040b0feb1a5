use crate::ast::Ident;
use crate::error::{Error, Result};
use crate::span::Span;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Runtime identifier of a concrete class. Stored in every instance and read
/// by tag switches.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize,
)]
#[display("#{_0}")]
pub struct TypeTag(pub u32);

impl TypeTag {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Bijection between concrete class names and tags for one compilation unit.
/// Tags are handed out in registration order and never reused.
#[derive(Debug, Default, Clone)]
pub struct TypeTagRegistry {
    by_class: HashMap<Ident, TypeTag>,
    classes: Vec<Ident>,
}

impl TypeTagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_class(&mut self, class: &Ident, span: Span) -> Result<TypeTag> {
        if self.by_class.contains_key(class) {
            return Err(Error::DuplicateClass {
                class: class.clone(),
                span,
            });
        }
        let tag = TypeTag(self.classes.len() as u32);
        self.by_class.insert(class.clone(), tag);
        self.classes.push(class.clone());
        tracing::trace!("registered class {} with tag {}", class, tag);
        Ok(tag)
    }

    pub fn tag_of(&self, class: &Ident) -> Option<TypeTag> {
        self.by_class.get(class).copied()
    }

    pub fn class_of(&self, tag: TypeTag) -> Option<&Ident> {
        self.classes.get(tag.index())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// All `(tag, class)` pairs in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (TypeTag, &Ident)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(idx, class)| (TypeTag(idx as u32), class))
    }
}
