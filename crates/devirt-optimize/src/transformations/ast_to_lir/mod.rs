//! AST -> LIR lowering.
//!
//! Walks the type-checked input fragment and produces records, one function
//! per method definition that some concrete class dispatches to, and the free
//! functions according to the generic lowering policy. Every method call is
//! devirtualized here: monomorphic receivers become direct calls, ambiguous
//! ones become tag switches built by the dispatch synthesizer.

mod calls;
mod expressions;

use std::collections::HashMap;

use devirt_core::ast::{Block, Ident, Module, Stmt, Ty};
use devirt_core::config::{GenericPolicy, LoweringOptions, NarrowingPolicy};
use devirt_core::diagnostics::{Diagnostic, DiagnosticManager};
use devirt_core::error::{Error, Result};
use devirt_core::hierarchy::{ClassId, HierarchyModel, MethodId};
use devirt_core::lir::{
    FunctionOrigin, LirExpr, LirField, LirFunction, LirModule, LirParam, LirRecord, LirStmt, LirTy,
    Symbol,
};
use devirt_core::span::Span;
use devirt_core::types::ConcreteTypeSet;
use tracing::{debug, info, trace};

use crate::lower_ensure;
use crate::passes::dispatch::DispatchSite;
use crate::passes::generic::{
    emitted_once, parameter_sets, specialization_symbol, Monomorphizer, SpecializationKey,
};
use crate::passes::self_type::{declared_classes, declared_set, SelfTypeResolver};

/// Result of lowering one expression: the lowered tree plus what is known
/// statically about its value.
#[derive(Debug, Clone)]
pub struct Lowered {
    pub expr: LirExpr,
    /// Static type; never the self type.
    pub ty: Ty,
    /// Concrete classes the value may have, for class-typed values.
    pub set: Option<ConcreteTypeSet>,
}

#[derive(Debug, Clone)]
struct Local {
    ty: Ty,
    set: Option<ConcreteTypeSet>,
}

#[derive(Debug, Clone, Default)]
struct Scope {
    locals: HashMap<Ident, Local>,
}

impl Scope {
    fn insert(&mut self, name: Ident, ty: Ty, set: Option<ConcreteTypeSet>) {
        self.locals.insert(name, Local { ty, set });
    }

    fn get(&self, name: &str) -> Option<&Local> {
        self.locals.get(name)
    }
}

/// Per-function naming state; keeps generated names stable across runs.
#[derive(Debug)]
struct FnCtx {
    symbol: Symbol,
    self_class: Option<ClassId>,
    sites: u32,
    temps: u32,
}

impl FnCtx {
    fn new(symbol: Symbol, self_class: Option<ClassId>) -> Self {
        Self {
            symbol,
            self_class,
            sites: 0,
            temps: 0,
        }
    }
}

pub struct AstToLir<'a> {
    hierarchy: &'a HierarchyModel,
    module: &'a Module,
    options: LoweringOptions,
    resolver: SelfTypeResolver,
    mono: Monomorphizer,
    ctx: FnCtx,
    warnings: Vec<Diagnostic>,
}

impl<'a> AstToLir<'a> {
    pub fn new(hierarchy: &'a HierarchyModel, module: &'a Module, options: LoweringOptions) -> Self {
        Self {
            hierarchy,
            module,
            options,
            resolver: SelfTypeResolver::new(options.narrowing_policy),
            mono: Monomorphizer::new(),
            ctx: FnCtx::new(Symbol::from("<module>"), None),
            warnings: Vec::new(),
        }
    }

    /// Lowers the module; warnings found on the way go to `diagnostics`,
    /// also when lowering fails.
    pub fn lower(mut self, diagnostics: &mut DiagnosticManager) -> Result<LirModule> {
        let lowered = self.lower_module();
        for warning in self.warnings.drain(..) {
            diagnostics.add(warning);
        }
        lowered
    }

    fn lower_module(&mut self) -> Result<LirModule> {
        let hierarchy = self.hierarchy;
        let module = self.module;
        let records = self.lower_records()?;

        let mut functions = Vec::new();
        for class in hierarchy.classes() {
            for method in &class.methods {
                if let Some(function) = self.lower_method(method.id)? {
                    functions.push(function);
                }
            }
        }
        for (idx, function) in module.functions.iter().enumerate() {
            if emitted_once(function, self.options.generic_policy) {
                functions.push(self.lower_function(idx, None)?);
            }
        }
        while let Some(key) = self.mono.next() {
            functions.push(self.lower_function(key.function, Some(&key))?);
        }
        info!(
            "lowered {} records and {} functions ({:?}, {:?})",
            records.len(),
            functions.len(),
            self.options.generic_policy,
            self.options.narrowing_policy
        );
        Ok(LirModule { records, functions })
    }

    fn lower_records(&self) -> Result<Vec<LirRecord>> {
        let hierarchy = self.hierarchy;
        let mut records = Vec::new();
        for class in hierarchy.classes() {
            let Some(tag) = class.tag else {
                continue;
            };
            let fields = hierarchy
                .field_layout(class.id)
                .into_iter()
                .map(|field| {
                    Ok(LirField {
                        ty: self.lir_ty(&field.ty, Some(class.id), class.span)?,
                        name: field.name,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            records.push(LirRecord {
                name: class.name.clone(),
                tag,
                ancestors: hierarchy
                    .ancestors(class.id)
                    .skip(1)
                    .map(|ancestor| hierarchy.class(ancestor).name.clone())
                    .collect(),
                fields,
            });
        }
        Ok(records)
    }

    /// Lowers a method definition once for all the classes that dispatch to it.
    fn lower_method(&mut self, method: MethodId) -> Result<Option<LirFunction>> {
        let hierarchy = self.hierarchy;
        let def = hierarchy.method(method);
        let owner = hierarchy.class(def.owner);
        if def.returns_self() {
            // every exit path must return, whether or not anything calls it
            self.resolver.summarize(hierarchy, method)?;
        }
        let receivers = hierarchy.inheritors(method);
        if receivers.is_empty() {
            trace!("{}.{} is never dispatched to, skipping", owner.name, def.name);
            return Ok(None);
        }
        let symbol = Symbol::method(&owner.name, &def.name);
        self.ctx = FnCtx::new(symbol.clone(), Some(def.owner));

        let mut scope = Scope::default();
        let mut params = vec![LirParam {
            name: Ident::new("self"),
            ty: self.lir_ty_of_set(&receivers, def.owner),
        }];
        scope.insert(
            Ident::new("self"),
            Ty::Class(owner.name.clone()),
            Some(receivers),
        );
        for param in &def.params {
            let set = match param.ty {
                Ty::Class(_) => {
                    let set = declared_set(hierarchy, &param.ty, def.owner, self.narrowing_policy())?;
                    lower_ensure!(
                        !set.is_empty(),
                        def.span,
                        "parameter `{}` of `{}` has no concrete class",
                        param.name,
                        symbol
                    );
                    Some(set)
                }
                _ => None,
            };
            params.push(LirParam {
                name: param.name.clone(),
                ty: self.lir_ty(&param.ty, Some(def.owner), def.span)?,
            });
            scope.insert(param.name.clone(), self.static_ty(&param.ty, Some(def.owner), def.span)?, set);
        }
        let ret = self.lir_ty(&def.ret, Some(def.owner), def.span)?;
        let body = self.lower_block(&def.body, &mut scope)?;
        debug!("lowered method {}", symbol);
        Ok(Some(LirFunction {
            symbol,
            origin: FunctionOrigin::Method {
                class: owner.name.clone(),
                method: def.name.clone(),
            },
            params,
            ret,
            body,
        }))
    }

    /// Lowers a free function, either as-is or as the clone named by `key`.
    fn lower_function(&mut self, idx: usize, key: Option<&SpecializationKey>) -> Result<LirFunction> {
        let hierarchy = self.hierarchy;
        let module = self.module;
        let decl = &module.functions[idx];
        let (symbol, origin) = match key {
            Some(key) => {
                let symbol = specialization_symbol(hierarchy, decl, key);
                let classes = key
                    .classes
                    .iter()
                    .map(|class| hierarchy.class(*class).name.clone())
                    .collect();
                (
                    symbol,
                    FunctionOrigin::Specialization {
                        function: decl.name.clone(),
                        classes,
                    },
                )
            }
            None => (
                Symbol::function(&decl.name),
                FunctionOrigin::Function {
                    name: decl.name.clone(),
                },
            ),
        };
        lower_ensure!(
            !decl.ret.is_self_type(),
            decl.span,
            "free function `{}` cannot return the self type",
            decl.name
        );
        self.ctx = FnCtx::new(symbol.clone(), None);

        let sets = parameter_sets(hierarchy, decl, key, self.narrowing_policy())?;
        let mut scope = Scope::default();
        let mut params = Vec::with_capacity(decl.params.len());
        for (param, set) in decl.params.iter().zip(sets) {
            let ty = match (&set, &param.ty) {
                (Some(set), Ty::Class(name)) => {
                    self.lir_ty_of_set(set, hierarchy.require(name, decl.span)?)
                }
                _ => self.lir_ty(&param.ty, None, decl.span)?,
            };
            params.push(LirParam {
                name: param.name.clone(),
                ty,
            });
            scope.insert(param.name.clone(), param.ty.clone(), set);
        }
        let ret = self.lir_ty(&decl.ret, None, decl.span)?;
        let body = self.lower_block(&decl.body, &mut scope)?;
        debug!("lowered function {}", symbol);
        Ok(LirFunction {
            symbol,
            origin,
            params,
            ret,
            body,
        })
    }

    fn lower_block(&mut self, block: &Block, scope: &mut Scope) -> Result<Vec<LirStmt>> {
        block
            .stmts
            .iter()
            .map(|stmt| self.lower_stmt(stmt, scope))
            .collect()
    }

    fn lower_stmt(&mut self, stmt: &Stmt, scope: &mut Scope) -> Result<LirStmt> {
        Ok(match stmt {
            Stmt::Let {
                name,
                ty,
                init,
                span,
            } => {
                let value = self.lower_expr(init, scope)?;
                let static_ty = match ty {
                    Some(declared) => {
                        let declared = self.static_ty(declared, self.ctx.self_class, *span)?;
                        self.check_assignable(&declared, &value, *span)?;
                        declared
                    }
                    None => value.ty.clone(),
                };
                scope.insert(name.clone(), static_ty, value.set);
                LirStmt::Let {
                    name: name.clone(),
                    value: value.expr,
                }
            }
            Stmt::Return { value, .. } => LirStmt::Return(
                value
                    .as_ref()
                    .map(|value| self.lower_expr(value, scope).map(|lowered| lowered.expr))
                    .transpose()?,
            ),
            Stmt::If {
                cond,
                then,
                elze,
                span,
            } => {
                let cond = self.lower_expr(cond, scope)?;
                lower_ensure!(cond.ty == Ty::Bool, *span, "condition must be bool, found {}", cond.ty);
                let then = self.lower_block(then, &mut scope.clone())?;
                let elze = match elze {
                    Some(elze) => self.lower_block(elze, &mut scope.clone())?,
                    None => Vec::new(),
                };
                LirStmt::If {
                    cond: cond.expr,
                    then,
                    elze,
                }
            }
            Stmt::Expr(expr) => LirStmt::Expr(self.lower_expr(expr, scope)?.expr),
            Stmt::Assert { cond, span } => {
                let cond = self.lower_expr(cond, scope)?;
                lower_ensure!(cond.ty == Ty::Bool, *span, "assertion must be bool, found {}", cond.ty);
                LirStmt::Assert(cond.expr)
            }
        })
    }

    fn check_assignable(&self, declared: &Ty, value: &Lowered, span: Span) -> Result<()> {
        let ok = match (declared, &value.ty) {
            (Ty::Class(target), Ty::Class(actual)) => {
                let target = self.hierarchy.require(target, span)?;
                let actual = self.hierarchy.require(actual, span)?;
                self.hierarchy.is_subclass_of(actual, target)
            }
            (declared, actual) => declared == actual,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::type_mismatch(
                format!("cannot bind {} to a variable of type {}", value.ty, declared),
                span,
            ))
        }
    }

    /// Declared type with the self type replaced by the enclosing class.
    fn static_ty(&self, ty: &Ty, owner: Option<ClassId>, span: Span) -> Result<Ty> {
        match ty {
            Ty::SelfType => match owner {
                Some(owner) => Ok(Ty::Class(self.hierarchy.class(owner).name.clone())),
                None => Err(Error::type_mismatch("self type outside of a class", span)),
            },
            other => Ok(other.clone()),
        }
    }

    fn lir_ty(&self, ty: &Ty, owner: Option<ClassId>, span: Span) -> Result<LirTy> {
        Ok(match ty {
            Ty::Int => LirTy::Int,
            Ty::Bool => LirTy::Bool,
            Ty::Unit => LirTy::Unit,
            Ty::Class(name) => {
                let class = self.hierarchy.require(name, span)?;
                self.lir_ty_of_set(&self.declared_classes(class), class)
            }
            Ty::SelfType => match owner {
                Some(owner) => self.lir_ty_of_set(&self.declared_classes(owner), owner),
                None => return Err(Error::type_mismatch("self type outside of a class", span)),
            },
        })
    }

    /// A record when the class is known exactly, the tagged root otherwise.
    fn lir_ty_of_set(&self, set: &ConcreteTypeSet, fallback: ClassId) -> LirTy {
        match set.as_single() {
            Some(class) => LirTy::Record(self.hierarchy.class(class).name.clone()),
            None => LirTy::Tagged(
                self.hierarchy
                    .class(self.hierarchy.root_of(fallback))
                    .name
                    .clone(),
            ),
        }
    }

    fn lir_ty_of_lowered(&self, lowered: &Lowered, span: Span) -> Result<LirTy> {
        match (&lowered.ty, &lowered.set) {
            (Ty::Class(name), Some(set)) => {
                let class = self.hierarchy.require(name, span)?;
                Ok(self.lir_ty_of_set(set, class))
            }
            (ty, _) => self.lir_ty(ty, self.ctx.self_class, span),
        }
    }

    /// Site names for a dispatch over `set`. Only sets that need a switch
    /// consume a number, so numbering counts emitted switches.
    fn site_for(&mut self, set: &ConcreteTypeSet) -> DispatchSite {
        if set.len() > 1 {
            self.next_site()
        } else {
            DispatchSite::new(self.ctx.symbol.as_str(), self.ctx.sites)
        }
    }

    /// Site of a switch that is certainly emitted.
    fn next_site(&mut self) -> DispatchSite {
        let site = DispatchSite::new(self.ctx.symbol.as_str(), self.ctx.sites);
        self.ctx.sites += 1;
        site
    }

    fn next_temp(&mut self) -> Ident {
        let name = Ident::new(format!("__arg{}", self.ctx.temps));
        self.ctx.temps += 1;
        name
    }

    fn generic_policy(&self) -> GenericPolicy {
        self.options.generic_policy
    }

    fn narrowing_policy(&self) -> NarrowingPolicy {
        self.options.narrowing_policy
    }

    /// Classes a value whose static type is `class` may hold.
    fn declared_classes(&self, class: ClassId) -> ConcreteTypeSet {
        declared_classes(self.hierarchy, class, self.narrowing_policy())
    }
}
