//! Self-type resolution.
//!
//! A method declared to return the self type may hand back the receiver, a
//! narrowed parameter, a fresh instance, or the result of another self-typed
//! call. Each method body is summarized once into the origins of its exit
//! paths; a call site then instantiates that summary with what it knows about
//! its receiver and arguments. Conditions are never evaluated: every exit
//! path contributes, and the tag switch downstream picks the real class.

use std::collections::{HashMap, HashSet};

use devirt_core::ast::{Block, ExprKind, Expr, Ident, NarrowTarget, Stmt, Ty};
use devirt_core::config::NarrowingPolicy;
use devirt_core::error::{Error, Result};
use devirt_core::hierarchy::{ClassId, HierarchyModel, MethodDef, MethodId};
use devirt_core::types::ConcreteTypeSet;
use tracing::{debug, trace};

/// Where the value returned on one exit path comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnOrigin {
    Receiver,
    Param(usize),
    /// A freshly constructed instance of exactly this class.
    Exact(ClassId),
    /// `inner` passed through the runtime narrowing primitive.
    Narrowed {
        inner: Box<ReturnOrigin>,
        target: ClassId,
    },
    /// Result of a further method call, resolved per receiver class.
    Call {
        receiver: Box<ReturnOrigin>,
        method: Ident,
        args: Vec<ReturnOrigin>,
    },
    /// Anything else of class type; widened to the whole hierarchy.
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodSummary {
    pub method: MethodId,
    pub exits: Vec<ReturnOrigin>,
}

/// What a call site knows about the values flowing into the method.
#[derive(Debug, Clone)]
pub struct CallSite<'a> {
    pub receiver: &'a ConcreteTypeSet,
    /// Static type of the receiver expression.
    pub receiver_static: ClassId,
    /// Concrete sets of the arguments; `None` for non-class arguments.
    pub args: &'a [Option<ConcreteTypeSet>],
}

pub struct SelfTypeResolver {
    policy: NarrowingPolicy,
    summaries: HashMap<MethodId, MethodSummary>,
    in_progress: HashSet<MethodId>,
}

impl SelfTypeResolver {
    pub fn new(policy: NarrowingPolicy) -> Self {
        Self {
            policy,
            summaries: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    pub fn policy(&self) -> NarrowingPolicy {
        self.policy
    }

    /// Summary of a method's exit paths, computed once per method.
    pub fn summarize(&mut self, hierarchy: &HierarchyModel, method: MethodId) -> Result<MethodSummary> {
        if let Some(summary) = self.summaries.get(&method) {
            return Ok(summary.clone());
        }
        let def = hierarchy.method(method);
        let mut collector = ExitCollector {
            hierarchy,
            method: def,
            exits: Vec::new(),
        };
        let params: HashMap<Ident, ReturnOrigin> = def
            .params
            .iter()
            .enumerate()
            .map(|(idx, param)| (param.name.clone(), ReturnOrigin::Param(idx)))
            .collect();
        let terminates = collector.scan_block(&def.body, params);
        if !terminates {
            return Err(Error::UnresolvableSelfType {
                class: hierarchy.class(def.owner).name.clone(),
                method: def.name.clone(),
                span: def.span,
            });
        }
        let summary = MethodSummary {
            method,
            exits: collector.exits,
        };
        debug!(
            "self-type summary for {}.{}: {:?}",
            hierarchy.class(def.owner).name,
            def.name,
            summary.exits
        );
        self.summaries.insert(method, summary.clone());
        Ok(summary)
    }

    /// ConcreteTypeSet of the value returned by a self-typed method at one call site.
    pub fn resolve_call(
        &mut self,
        hierarchy: &HierarchyModel,
        method: MethodId,
        site: &CallSite<'_>,
    ) -> Result<ConcreteTypeSet> {
        let def = hierarchy.method(method);
        if !def.returns_self() {
            return declared_set(hierarchy, &def.ret, def.owner, self.policy);
        }
        let summary = self.summarize(hierarchy, method)?;

        if !self.in_progress.insert(method) {
            trace!("recursive self-typed call of {}, widening", def.name);
            return Ok(hierarchy.concrete_subclasses_of(hierarchy.root_of(def.owner)));
        }
        let mut result = ConcreteTypeSet::new();
        let mut outcome = Ok(());
        for exit in &summary.exits {
            match self.instantiate(hierarchy, def, exit, site) {
                Ok(set) => result.extend(&set),
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }
        self.in_progress.remove(&method);
        outcome?;

        if result.is_empty() {
            result = declared_classes(hierarchy, site.receiver_static, self.policy);
        }
        if result.is_empty() {
            return Err(Error::UnregisteredSubclass {
                class: hierarchy.class(site.receiver_static).name.clone(),
                span: def.span,
            });
        }
        debug!(
            "self-type of {}.{} at call site: {}",
            hierarchy.class(def.owner).name,
            def.name,
            result.display(hierarchy)
        );
        Ok(result)
    }

    fn instantiate(
        &mut self,
        hierarchy: &HierarchyModel,
        def: &MethodDef,
        origin: &ReturnOrigin,
        site: &CallSite<'_>,
    ) -> Result<ConcreteTypeSet> {
        Ok(match origin {
            ReturnOrigin::Receiver => site.receiver.clone(),
            ReturnOrigin::Param(idx) => match site.args.get(*idx).cloned().flatten() {
                Some(set) => set,
                None => match def.params.get(*idx) {
                    Some(param) => declared_set(hierarchy, &param.ty, def.owner, self.policy)?,
                    None => ConcreteTypeSet::new(),
                },
            },
            ReturnOrigin::Exact(class) => ConcreteTypeSet::single(*class),
            ReturnOrigin::Narrowed { inner, target } => {
                // the tag never changes; only the checked policy removes the
                // classes whose narrowing would fault
                let inner = self.instantiate(hierarchy, def, inner, site)?;
                match self.policy {
                    NarrowingPolicy::Permissive => inner,
                    NarrowingPolicy::Checked => {
                        inner.intersection(&hierarchy.concrete_subclasses_of(*target))
                    }
                }
            }
            ReturnOrigin::Call {
                receiver,
                method,
                args,
            } => {
                let receivers = self.instantiate(hierarchy, def, receiver, site)?;
                let arg_sets = args
                    .iter()
                    .map(|arg| match arg {
                        ReturnOrigin::Opaque => Ok(None),
                        other => self.instantiate(hierarchy, def, other, site).map(Some),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let mut result = ConcreteTypeSet::new();
                for class in receivers.iter() {
                    let callee = hierarchy.resolve_method(class, method.as_str(), def.span)?;
                    let single = ConcreteTypeSet::single(class);
                    let nested = CallSite {
                        receiver: &single,
                        receiver_static: class,
                        args: &arg_sets,
                    };
                    let callee_id = callee.id;
                    result.extend(&self.resolve_call(hierarchy, callee_id, &nested)?);
                }
                result
            }
            ReturnOrigin::Opaque => hierarchy.concrete_subclasses_of(hierarchy.root_of(def.owner)),
        })
    }
}

/// Concrete classes that may arrive under the static type `class`.
///
/// Permissive narrowing relabels a value without looking at its tag, so a
/// value of any class in the same hierarchy can carry the name `class`.
pub fn declared_classes(
    hierarchy: &HierarchyModel,
    class: ClassId,
    policy: NarrowingPolicy,
) -> ConcreteTypeSet {
    match policy {
        NarrowingPolicy::Checked => hierarchy.concrete_subclasses_of(class),
        NarrowingPolicy::Permissive => hierarchy.concrete_subclasses_of(hierarchy.root_of(class)),
    }
}

/// Concrete set implied by a declared type alone.
pub fn declared_set(
    hierarchy: &HierarchyModel,
    ty: &Ty,
    owner: ClassId,
    policy: NarrowingPolicy,
) -> Result<ConcreteTypeSet> {
    Ok(match ty {
        Ty::Class(name) => {
            let class = hierarchy.require(name, hierarchy.class(owner).span)?;
            declared_classes(hierarchy, class, policy)
        }
        Ty::SelfType => declared_classes(hierarchy, owner, policy),
        Ty::Int | Ty::Bool | Ty::Unit => ConcreteTypeSet::new(),
    })
}

struct ExitCollector<'a> {
    hierarchy: &'a HierarchyModel,
    method: &'a MethodDef,
    exits: Vec<ReturnOrigin>,
}

impl ExitCollector<'_> {
    /// Records the exits of `block`; returns whether every path through it returns.
    fn scan_block(&mut self, block: &Block, mut env: HashMap<Ident, ReturnOrigin>) -> bool {
        for stmt in &block.stmts {
            match stmt {
                Stmt::Let { name, init, .. } => {
                    let origin = self.origin_of(init, &env);
                    env.insert(name.clone(), origin);
                }
                Stmt::Return { value, .. } => {
                    let origin = match value {
                        Some(value) => self.origin_of(value, &env),
                        None => ReturnOrigin::Opaque,
                    };
                    self.exits.push(origin);
                    return true;
                }
                Stmt::If { then, elze, .. } => {
                    let then_returns = self.scan_block(then, env.clone());
                    let else_returns = match elze {
                        Some(elze) => self.scan_block(elze, env.clone()),
                        None => false,
                    };
                    if then_returns && else_returns {
                        return true;
                    }
                }
                Stmt::Expr(_) | Stmt::Assert { .. } => {}
            }
        }
        false
    }

    fn origin_of(&self, expr: &Expr, env: &HashMap<Ident, ReturnOrigin>) -> ReturnOrigin {
        match expr.kind() {
            ExprKind::SelfRef => ReturnOrigin::Receiver,
            ExprKind::Var(name) => env.get(name).cloned().unwrap_or(ReturnOrigin::Opaque),
            ExprKind::New { class, .. } => self
                .hierarchy
                .lookup(class.as_str())
                .map(ReturnOrigin::Exact)
                .unwrap_or(ReturnOrigin::Opaque),
            ExprKind::Narrow { value, target } => {
                let target = match target {
                    NarrowTarget::Receiver => Some(self.method.owner),
                    NarrowTarget::Class(name) => self.hierarchy.lookup(name.as_str()),
                };
                match target {
                    Some(target) => ReturnOrigin::Narrowed {
                        inner: Box::new(self.origin_of(value, env)),
                        target,
                    },
                    None => ReturnOrigin::Opaque,
                }
            }
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => ReturnOrigin::Call {
                receiver: Box::new(self.origin_of(receiver, env)),
                method: method.clone(),
                args: args.iter().map(|arg| self.origin_of(arg, env)).collect(),
            },
            ExprKind::Value(_)
            | ExprKind::Field { .. }
            | ExprKind::BinOp { .. }
            | ExprKind::Call { .. } => ReturnOrigin::Opaque,
        }
    }
}
