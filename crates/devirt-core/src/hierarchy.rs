//! Class hierarchy model used for static method resolution.
//!
//! Classes live in an arena owned by [`HierarchyModel`]; base links,
//! subclass links and method owners are indices into it. Single inheritance
//! only: every class has at most one base and the base graph is acyclic.

use crate::ast::{Block, ClassDecl, FieldDecl, Ident, MethodDecl, Param, Ty};
use crate::error::{Error, Result};
use crate::runtime::ClassRelation;
use crate::span::Span;
use crate::tags::{TypeTag, TypeTagRegistry};
use crate::types::ConcreteTypeSet;
use derive_more::Display;
use std::collections::{HashMap, HashSet};

/// Arena index of a class. Ordering is registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("class{_0}")]
pub struct ClassId(pub u32);

impl ClassId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{class}.m{index}")]
pub struct MethodId {
    pub class: ClassId,
    pub index: u32,
}

#[derive(Debug, Clone)]
pub struct MethodDef {
    pub id: MethodId,
    pub owner: ClassId,
    pub name: Ident,
    pub params: Vec<Param>,
    pub ret: Ty,
    pub body: Block,
    pub span: Span,
}

impl MethodDef {
    pub fn returns_self(&self) -> bool {
        self.ret.is_self_type()
    }

    pub fn param_types(&self) -> impl Iterator<Item = &Ty> {
        self.params.iter().map(|param| &param.ty)
    }
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub id: ClassId,
    pub name: Ident,
    pub base: Option<ClassId>,
    pub is_abstract: bool,
    pub tag: Option<TypeTag>,
    /// Fields declared by this class only; see [`HierarchyModel::field_layout`].
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDef>,
    method_index: HashMap<Ident, usize>,
    /// Direct subclasses in registration order.
    pub subclasses: Vec<ClassId>,
    pub span: Span,
}

impl ClassDef {
    /// Method declared (or overridden) directly in this class.
    pub fn own_method(&self, name: &str) -> Option<&MethodDef> {
        self.method_index
            .get(name)
            .map(|&index| &self.methods[index])
    }
}

#[derive(Debug, Default, Clone)]
pub struct HierarchyModel {
    classes: Vec<ClassDef>,
    by_name: HashMap<Ident, ClassId>,
    tags: TypeTagRegistry,
}

impl HierarchyModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a model from declarations in any order. Declarations are added
    /// base-first; among classes whose base is already present the earliest
    /// declared goes first, so base-before-subclass input keeps its order.
    pub fn from_decls(decls: &[ClassDecl]) -> Result<Self> {
        let mut seen = HashSet::new();
        for decl in decls {
            if !seen.insert(&decl.name) {
                return Err(Error::DuplicateClass {
                    class: decl.name.clone(),
                    span: decl.span,
                });
            }
        }
        for decl in decls {
            if let Some(base) = &decl.base {
                if !seen.contains(base) {
                    return Err(Error::UnknownBase {
                        class: decl.name.clone(),
                        base: base.clone(),
                        span: decl.span,
                    });
                }
            }
        }

        let mut model = Self::new();
        let mut pending: Vec<&ClassDecl> = decls.iter().collect();
        while !pending.is_empty() {
            let ready = pending.iter().position(|decl| match &decl.base {
                Some(base) => model.lookup(base.as_str()).is_some(),
                None => true,
            });
            match ready {
                Some(idx) => {
                    let decl = pending.remove(idx);
                    model.add_class(decl)?;
                }
                None => {
                    let first = pending[0];
                    return Err(Error::CyclicInheritance {
                        classes: pending.iter().map(|decl| decl.name.clone()).collect(),
                        span: first.span,
                    });
                }
            }
        }
        Ok(model)
    }

    /// Adds one class whose base (if any) is already registered.
    pub fn add_class(&mut self, decl: &ClassDecl) -> Result<ClassId> {
        if self.by_name.contains_key(&decl.name) {
            return Err(Error::DuplicateClass {
                class: decl.name.clone(),
                span: decl.span,
            });
        }
        let base = match &decl.base {
            Some(base_name) => Some(self.lookup(base_name.as_str()).ok_or_else(|| {
                Error::UnknownBase {
                    class: decl.name.clone(),
                    base: base_name.clone(),
                    span: decl.span,
                }
            })?),
            None => None,
        };
        if let Some(base) = base {
            self.check_self_type_overrides(base, decl)?;
        }

        let tag = if decl.is_abstract {
            None
        } else {
            Some(self.tags.register_class(&decl.name, decl.span)?)
        };

        let id = ClassId(self.classes.len() as u32);
        let mut methods = Vec::with_capacity(decl.methods.len());
        let mut method_index = HashMap::new();
        for method in &decl.methods {
            if method_index.contains_key(&method.name) {
                tracing::warn!(
                    "method {}.{} declared twice; keeping the first declaration",
                    decl.name,
                    method.name
                );
                continue;
            }
            let index = methods.len();
            method_index.insert(method.name.clone(), index);
            methods.push(MethodDef {
                id: MethodId {
                    class: id,
                    index: index as u32,
                },
                owner: id,
                name: method.name.clone(),
                params: method.params.clone(),
                ret: method.ret.clone(),
                body: method.body.clone(),
                span: method.span,
            });
        }

        self.classes.push(ClassDef {
            id,
            name: decl.name.clone(),
            base,
            is_abstract: decl.is_abstract,
            tag,
            fields: decl.fields.clone(),
            methods,
            method_index,
            subclasses: Vec::new(),
            span: decl.span,
        });
        if let Some(base) = base {
            self.classes[base.index()].subclasses.push(id);
        }
        self.by_name.insert(decl.name.clone(), id);
        tracing::debug!(
            "hierarchy: added {} (base {:?}, tag {:?})",
            decl.name,
            decl.base.as_ref().map(Ident::as_str),
            tag
        );
        Ok(id)
    }

    fn check_self_type_overrides(&self, base: ClassId, decl: &ClassDecl) -> Result<()> {
        for method in &decl.methods {
            let Ok(inherited) = self.resolve_method(base, method.name.as_str(), method.span) else {
                continue;
            };
            if !inherited.returns_self() {
                continue;
            }
            if !keeps_self_contract(method, &decl.name) {
                return Err(Error::InconsistentOverride {
                    class: decl.name.clone(),
                    method: method.name.clone(),
                    span: method.span,
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn class(&self, id: ClassId) -> &ClassDef {
        &self.classes[id.index()]
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.iter()
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn require(&self, name: &Ident, span: Span) -> Result<ClassId> {
        self.lookup(name.as_str()).ok_or_else(|| Error::UnknownClass {
            class: name.clone(),
            span,
        })
    }

    pub fn method(&self, id: MethodId) -> &MethodDef {
        &self.class(id.class).methods[id.index as usize]
    }

    pub fn tags(&self) -> &TypeTagRegistry {
        &self.tags
    }

    pub fn tag_of(&self, id: ClassId) -> Option<TypeTag> {
        self.class(id).tag
    }

    pub fn class_of_tag(&self, tag: TypeTag) -> Option<ClassId> {
        self.tags
            .class_of(tag)
            .and_then(|name| self.lookup(name.as_str()))
    }

    /// `id` followed by its base chain up to the root.
    pub fn ancestors(&self, id: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        std::iter::successors(Some(id), move |current| self.class(*current).base)
    }

    pub fn root_of(&self, id: ClassId) -> ClassId {
        self.ancestors(id).last().unwrap_or(id)
    }

    pub fn is_subclass_of(&self, class: ClassId, ancestor: ClassId) -> bool {
        self.ancestors(class).any(|candidate| candidate == ancestor)
    }

    /// Every concrete class reachable downward from `id`, itself included.
    pub fn concrete_subclasses_of(&self, id: ClassId) -> ConcreteTypeSet {
        let mut set = ConcreteTypeSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let class = self.class(current);
            if !class.is_abstract {
                set.insert(current);
            }
            stack.extend(class.subclasses.iter().copied());
        }
        set
    }

    /// Nearest definition of `name` walking from `id` up the base chain.
    pub fn resolve_method(&self, id: ClassId, name: &str, span: Span) -> Result<&MethodDef> {
        self.ancestors(id)
            .find_map(|class| self.class(class).own_method(name))
            .ok_or_else(|| Error::NoSuchMethod {
                class: self.class(id).name.clone(),
                method: Ident::new(name),
                span,
            })
    }

    /// Concrete classes whose resolution of the method's name lands on it.
    pub fn inheritors(&self, method: MethodId) -> ConcreteTypeSet {
        let def = self.method(method);
        self.concrete_subclasses_of(def.owner)
            .iter()
            .filter(|class| {
                self.resolve_method(*class, def.name.as_str(), def.span)
                    .map(|resolved| resolved.id == method)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Most specific class that every member of `set` derives from.
    pub fn common_ancestor(&self, set: &ConcreteTypeSet) -> Option<ClassId> {
        let mut members = set.iter();
        let first = members.next()?;
        let rest: Vec<ClassId> = members.collect();
        self.ancestors(first)
            .find(|candidate| rest.iter().all(|other| self.is_subclass_of(*other, *candidate)))
    }

    /// Full field layout: base fields first, in declaration order. A field
    /// redeclared by a subclass keeps its slot and takes the new default.
    pub fn field_layout(&self, id: ClassId) -> Vec<FieldDecl> {
        let chain: Vec<ClassId> = self.ancestors(id).collect();
        let mut layout: Vec<FieldDecl> = Vec::new();
        for class in chain.into_iter().rev() {
            for field in &self.class(class).fields {
                match layout.iter_mut().find(|slot| slot.name == field.name) {
                    Some(slot) => {
                        if field.default.is_some() {
                            slot.default = field.default.clone();
                        }
                    }
                    None => layout.push(field.clone()),
                }
            }
        }
        layout
    }

    pub fn field(&self, id: ClassId, name: &str) -> Option<FieldDecl> {
        self.field_layout(id)
            .into_iter()
            .find(|field| field.name.as_str() == name)
    }
}

fn keeps_self_contract(method: &MethodDecl, class: &Ident) -> bool {
    match &method.ret {
        Ty::SelfType => true,
        Ty::Class(name) => name == class,
        _ => false,
    }
}

impl ClassRelation for HierarchyModel {
    fn class_name(&self, tag: TypeTag) -> Option<&str> {
        self.tags.class_of(tag).map(Ident::as_str)
    }

    fn derives_from(&self, tag: TypeTag, target: &str) -> bool {
        match (self.class_of_tag(tag), self.lookup(target)) {
            (Some(class), Some(target)) => self.is_subclass_of(class, target),
            _ => false,
        }
    }
}
