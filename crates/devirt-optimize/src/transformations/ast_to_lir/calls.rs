//! Method and free-function calls.
//!
//! A receiver known to hold exactly one concrete class becomes a direct call
//! to the resolved implementation. Otherwise the call is placed in every arm
//! of a tag switch over the receiver's classes, where the receiver is
//! relabeled to the arm's class and the call is resolved for that class.

use devirt_core::ast::{Expr, Ident, Ty};
use devirt_core::error::{Error, Result};
use devirt_core::hierarchy::ClassId;
use devirt_core::lir::{LirExpr, LirStmt, LirTy, Symbol};
use devirt_core::span::Span;
use devirt_core::types::ConcreteTypeSet;
use tracing::debug;

use super::{AstToLir, Lowered, Scope};
use crate::passes::dispatch::DispatchSynthesizer;
use crate::passes::generic::{emitted_once, specialization_symbol, SpecializationKey};
use crate::passes::self_type::CallSite;
use crate::{lower_bail, lower_ensure};

fn is_trivial(expr: &LirExpr) -> bool {
    matches!(expr, LirExpr::Local(_) | LirExpr::Value(_))
}

/// Clone of a generic function still to be selected, one class parameter at a time.
struct PendingSpecialization<'s> {
    function: usize,
    positions: Vec<usize>,
    sets: Vec<ConcreteTypeSet>,
    declared: Vec<Ident>,
    ret: &'s LirTy,
    span: Span,
}

impl AstToLir<'_> {
    pub(super) fn lower_method_call(
        &mut self,
        receiver: &Expr,
        method: &Ident,
        args: &[Expr],
        scope: &Scope,
        span: Span,
    ) -> Result<Lowered> {
        let hierarchy = self.hierarchy;
        let receiver = self.lower_expr(receiver, scope)?;
        let Ty::Class(static_name) = receiver.ty.clone() else {
            lower_bail!(span, "method `{}` called on a value of type {}", method, receiver.ty);
        };
        let static_class = hierarchy.require(&static_name, span)?;
        let declared = hierarchy.resolve_method(static_class, method.as_str(), span)?;
        lower_ensure!(
            declared.params.len() == args.len(),
            span,
            "`{}.{}` takes {} arguments, {} given",
            static_name,
            method,
            declared.params.len(),
            args.len()
        );
        let args = args
            .iter()
            .map(|arg| self.lower_expr(arg, scope))
            .collect::<Result<Vec<_>>>()?;
        let set = receiver
            .set
            .clone()
            .unwrap_or_else(|| self.declared_classes(static_class));
        // classes outside the static type's subtree only reach here through
        // permissive narrowing; those without the method get no arm, and the
        // tag is still checked when that leaves a single class
        let answering: ConcreteTypeSet = set
            .iter()
            .filter(|class| hierarchy.resolve_method(*class, method.as_str(), span).is_ok())
            .collect();
        let partial = !answering.is_empty() && answering.len() < set.len();
        let set = if answering.is_empty() { set } else { answering };

        if let (Some(class), false) = (set.as_single(), partial) {
            let arg_exprs = args.iter().map(|arg| arg.expr.clone()).collect();
            return self.lower_resolved_call(class, receiver.expr, method, arg_exprs, &args, span);
        }

        let mut prelude = Vec::new();
        let scrutinee = if args.iter().any(|arg| !is_trivial(&arg.expr)) {
            self.materialize(receiver.expr, &mut prelude)
        } else {
            receiver.expr
        };
        let arg_exprs: Vec<LirExpr> = args
            .iter()
            .map(|arg| self.materialize(arg.expr.clone(), &mut prelude))
            .collect();

        let site = self.next_site();
        let synth = DispatchSynthesizer::new(hierarchy);
        let mut joined_set: Option<ConcreteTypeSet> = None;
        let mut result_ty: Option<Ty> = None;
        let plan = synth.plan(&site, &set, &static_name, span, |class, narrowed| {
            let lowered =
                self.lower_resolved_call(class, narrowed, method, arg_exprs.clone(), &args, span)?;
            let ty = self.lir_ty_of_lowered(&lowered, span)?;
            if let Some(set) = &lowered.set {
                joined_set.get_or_insert_with(ConcreteTypeSet::new).extend(set);
            }
            result_ty.get_or_insert(lowered.ty);
            Ok((lowered.expr, ty))
        })?;
        let (switch, _) = synth.emit(&site, scrutinee, plan, span)?;

        let ty = match (&result_ty, &joined_set) {
            (Some(Ty::Class(_)), Some(set)) => {
                let ancestor = hierarchy.common_ancestor(set).unwrap_or(static_class);
                Ty::Class(hierarchy.class(ancestor).name.clone())
            }
            (Some(ty), _) => ty.clone(),
            (None, _) => Ty::Unit,
        };
        let expr = if prelude.is_empty() {
            switch
        } else {
            LirExpr::Block {
                stmts: prelude,
                value: Box::new(switch),
            }
        };
        Ok(Lowered {
            expr,
            ty,
            set: joined_set,
        })
    }

    /// Direct call of `method` on a receiver of exactly `class`.
    fn lower_resolved_call(
        &mut self,
        class: ClassId,
        receiver: LirExpr,
        method: &Ident,
        arg_exprs: Vec<LirExpr>,
        args: &[Lowered],
        span: Span,
    ) -> Result<Lowered> {
        let hierarchy = self.hierarchy;
        let def = hierarchy.resolve_method(class, method.as_str(), span)?;
        lower_ensure!(
            def.params.len() == args.len(),
            span,
            "`{}` takes {} arguments, {} given",
            def.name,
            def.params.len(),
            args.len()
        );
        for (param_ty, arg) in def.param_types().zip(args) {
            let declared = self.static_ty(param_ty, Some(def.owner), span)?;
            self.check_assignable(&declared, arg, span)?;
        }

        let symbol = Symbol::method(&hierarchy.class(def.owner).name, &def.name);
        let mut call_args = Vec::with_capacity(arg_exprs.len() + 1);
        call_args.push(receiver);
        call_args.extend(arg_exprs);

        let (ty, set) = match &def.ret {
            Ty::SelfType => {
                let receiver_set = ConcreteTypeSet::single(class);
                let arg_sets: Vec<Option<ConcreteTypeSet>> =
                    args.iter().map(|arg| arg.set.clone()).collect();
                let site = CallSite {
                    receiver: &receiver_set,
                    receiver_static: class,
                    args: &arg_sets,
                };
                let set = self.resolver.resolve_call(hierarchy, def.id, &site)?;
                let ancestor = hierarchy.common_ancestor(&set).unwrap_or(class);
                (Ty::Class(hierarchy.class(ancestor).name.clone()), Some(set))
            }
            Ty::Class(name) => {
                let declared = hierarchy.require(name, span)?;
                (Ty::Class(name.clone()), Some(self.declared_classes(declared)))
            }
            other => (other.clone(), None),
        };
        debug!("{}: direct call of {}", self.ctx.symbol, symbol);
        Ok(Lowered {
            expr: LirExpr::call(symbol, call_args),
            ty,
            set,
        })
    }

    pub(super) fn lower_call(
        &mut self,
        function: &Ident,
        args: &[Expr],
        scope: &Scope,
        span: Span,
    ) -> Result<Lowered> {
        let hierarchy = self.hierarchy;
        let module = self.module;
        let (idx, decl) = module
            .functions
            .iter()
            .enumerate()
            .find(|(_, decl)| decl.name == *function)
            .ok_or_else(|| Error::UnknownFunction {
                function: function.clone(),
                span,
            })?;
        lower_ensure!(
            decl.params.len() == args.len(),
            span,
            "`{}` takes {} arguments, {} given",
            function,
            decl.params.len(),
            args.len()
        );
        let args = args
            .iter()
            .map(|arg| self.lower_expr(arg, scope))
            .collect::<Result<Vec<_>>>()?;
        for (param, arg) in decl.params.iter().zip(&args) {
            let declared = self.static_ty(&param.ty, None, span)?;
            self.check_assignable(&declared, arg, span)?;
        }
        let (ty, set) = match &decl.ret {
            Ty::Class(name) => {
                let declared = hierarchy.require(name, span)?;
                (decl.ret.clone(), Some(self.declared_classes(declared)))
            }
            other => (other.clone(), None),
        };

        if emitted_once(decl, self.generic_policy()) {
            let arg_exprs = args.into_iter().map(|arg| arg.expr).collect();
            return Ok(Lowered {
                expr: LirExpr::call(Symbol::function(&decl.name), arg_exprs),
                ty,
                set,
            });
        }

        let ret = self.lir_ty(&decl.ret, None, span)?;
        let mut pending = PendingSpecialization {
            function: idx,
            positions: Vec::new(),
            sets: Vec::new(),
            declared: Vec::new(),
            ret: &ret,
            span,
        };
        for (position, class_name) in decl.class_params() {
            let declared = hierarchy.require(class_name, span)?;
            let arg_set = args[position]
                .set
                .clone()
                .unwrap_or_else(|| self.declared_classes(declared));
            pending.positions.push(position);
            pending.sets.push(arg_set);
            pending.declared.push(class_name.clone());
        }

        let mut prelude = Vec::new();
        let ambiguous = pending.sets.iter().any(|set| set.len() > 1);
        let arg_exprs: Vec<LirExpr> = args
            .into_iter()
            .map(|arg| {
                if ambiguous {
                    self.materialize(arg.expr, &mut prelude)
                } else {
                    arg.expr
                }
            })
            .collect();
        let (call, _) = self.specialize_from(&pending, Vec::new(), arg_exprs)?;
        let expr = if prelude.is_empty() {
            call
        } else {
            LirExpr::Block {
                stmts: prelude,
                value: Box::new(call),
            }
        };
        Ok(Lowered { expr, ty, set })
    }

    /// Chooses the class of the next class-typed argument, switching on its
    /// tag when more than one class is possible, and calls the clone once
    /// every argument is fixed.
    fn specialize_from(
        &mut self,
        pending: &PendingSpecialization<'_>,
        chosen: Vec<ClassId>,
        args: Vec<LirExpr>,
    ) -> Result<(LirExpr, LirTy)> {
        let hierarchy = self.hierarchy;
        let depth = chosen.len();
        let Some(&position) = pending.positions.get(depth) else {
            let decl = &self.module.functions[pending.function];
            let key = SpecializationKey {
                function: pending.function,
                classes: chosen,
            };
            let symbol = specialization_symbol(hierarchy, decl, &key);
            if self.mono.request(key) {
                debug!("{}: requested clone {}", self.ctx.symbol, symbol);
            }
            return Ok((LirExpr::call(symbol, args), pending.ret.clone()));
        };

        let site = self.site_for(&pending.sets[depth]);
        let synth = DispatchSynthesizer::new(hierarchy);
        let scrutinee = args[position].clone();
        synth.synthesize(
            &site,
            scrutinee,
            &pending.sets[depth],
            &pending.declared[depth],
            pending.span,
            |class, narrowed| {
                let mut args = args.clone();
                args[position] = narrowed;
                let mut chosen = chosen.clone();
                chosen.push(class);
                self.specialize_from(pending, chosen, args)
            },
        )
    }

    /// Binds a non-trivial expression to a fresh local so it is evaluated
    /// once even when it appears in several switch arms.
    fn materialize(&mut self, expr: LirExpr, prelude: &mut Vec<LirStmt>) -> LirExpr {
        if is_trivial(&expr) {
            return expr;
        }
        let name = self.next_temp();
        prelude.push(LirStmt::Let {
            name: name.clone(),
            value: expr,
        });
        LirExpr::Local(name)
    }
}
