//! Tag-switch synthesis for values whose concrete class is ambiguous.

use devirt_core::ast::Ident;
use devirt_core::error::{Error, Result};
use devirt_core::hierarchy::{ClassId, HierarchyModel};
use devirt_core::lir::{LirExpr, LirTy, SwitchArm, TagSwitch};
use devirt_core::span::Span;
use devirt_core::types::ConcreteTypeSet;
use itertools::Itertools;
use tracing::debug;

/// Names for one dispatch site, deterministic per function.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSite {
    /// `function#n`, used in faults and validation messages.
    pub label: String,
    /// Local the scrutinee is bound to inside the arms.
    pub binding: Ident,
}

impl DispatchSite {
    pub fn new(function: &str, index: u32) -> Self {
        Self {
            label: format!("{}#{}", function, index),
            binding: Ident::new(format!("__dispatch{}", index)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchArm {
    pub class: ClassId,
    pub ty: LirTy,
    pub body: LirExpr,
}

/// One arm per concrete class, in registration order.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchPlan {
    pub arms: Vec<DispatchArm>,
}

impl DispatchPlan {
    pub fn classes(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.arms.iter().map(|arm| arm.class)
    }
}

pub struct DispatchSynthesizer<'h> {
    hierarchy: &'h HierarchyModel,
}

impl<'h> DispatchSynthesizer<'h> {
    pub fn new(hierarchy: &'h HierarchyModel) -> Self {
        Self { hierarchy }
    }

    /// Builds the plan for `set`. `specialize` receives each class together
    /// with the switch binding relabeled to that class, and returns the arm
    /// body and its type.
    pub fn plan<F>(
        &self,
        site: &DispatchSite,
        set: &ConcreteTypeSet,
        declared: &Ident,
        span: Span,
        mut specialize: F,
    ) -> Result<DispatchPlan>
    where
        F: FnMut(ClassId, LirExpr) -> Result<(LirExpr, LirTy)>,
    {
        if set.is_empty() {
            return Err(Error::UnregisteredSubclass {
                class: declared.clone(),
                span,
            });
        }
        let mut arms = Vec::with_capacity(set.len());
        for class in set.iter() {
            let narrowed = LirExpr::Narrow {
                value: Box::new(LirExpr::Local(site.binding.clone())),
                target: self.hierarchy.class(class).name.clone(),
                checked: false,
            };
            let (body, ty) = specialize(class, narrowed)?;
            arms.push(DispatchArm { class, ty, body });
        }
        Ok(DispatchPlan { arms })
    }

    /// Turns a plan into the lowered switch construct.
    pub fn emit(&self, site: &DispatchSite, scrutinee: LirExpr, plan: DispatchPlan, span: Span) -> Result<(LirExpr, LirTy)> {
        let ty = self.join_types(plan.arms.iter().map(|arm| &arm.ty), span)?;
        let mut arms = Vec::with_capacity(plan.arms.len());
        for arm in plan.arms {
            let class = self.hierarchy.class(arm.class);
            let tag = class.tag.ok_or_else(|| Error::UnregisteredSubclass {
                class: class.name.clone(),
                span,
            })?;
            arms.push(SwitchArm {
                class: class.name.clone(),
                tag,
                ty: arm.ty,
                body: arm.body,
            });
        }
        debug!(
            "dispatch {}: {} arms [{}]",
            site.label,
            arms.len(),
            arms.iter().map(|arm| arm.class.as_str()).join(", ")
        );
        Ok((
            LirExpr::TagSwitch(TagSwitch {
                site: site.label.clone(),
                scrutinee: Box::new(scrutinee),
                binding: site.binding.clone(),
                arms,
                ty: ty.clone(),
            }),
            ty,
        ))
    }

    /// Specializes a consumer of `scrutinee` for every class in `set`. With a
    /// single class the consumer is applied in place and no switch is emitted.
    pub fn synthesize<F>(
        &self,
        site: &DispatchSite,
        scrutinee: LirExpr,
        set: &ConcreteTypeSet,
        declared: &Ident,
        span: Span,
        mut specialize: F,
    ) -> Result<(LirExpr, LirTy)>
    where
        F: FnMut(ClassId, LirExpr) -> Result<(LirExpr, LirTy)>,
    {
        if let Some(class) = set.as_single() {
            debug!(
                "dispatch {}: monomorphic on {}",
                site.label,
                self.hierarchy.class(class).name
            );
            return specialize(class, scrutinee);
        }
        let plan = self.plan(site, set, declared, span, specialize)?;
        self.emit(site, scrutinee, plan, span)
    }

    /// Common type of the arms: identical types stay as they are, differing
    /// class types widen to the tagged root of their hierarchy.
    fn join_types<'a>(&self, mut tys: impl Iterator<Item = &'a LirTy>, span: Span) -> Result<LirTy> {
        let Some(first) = tys.next() else {
            return Ok(LirTy::Unit);
        };
        let mut joined = first.clone();
        for ty in tys {
            if *ty == joined {
                continue;
            }
            joined = match (class_of(&joined), class_of(ty)) {
                (Some(left), Some(right)) => {
                    let left = self.hierarchy.require(left, span)?;
                    let right = self.hierarchy.require(right, span)?;
                    let root = self.hierarchy.root_of(left);
                    if root != self.hierarchy.root_of(right) {
                        return Err(Error::type_mismatch(
                            "switch arms produce classes from different hierarchies",
                            span,
                        ));
                    }
                    LirTy::Tagged(self.hierarchy.class(root).name.clone())
                }
                _ => {
                    return Err(Error::type_mismatch(
                        format!("switch arms disagree: {} vs {}", joined, ty),
                        span,
                    ))
                }
            };
        }
        Ok(joined)
    }
}

fn class_of(ty: &LirTy) -> Option<&Ident> {
    match ty {
        LirTy::Record(name) | LirTy::Tagged(name) => Some(name),
        _ => None,
    }
}
