use devirt_core::ast::{BinOpKind, Expr, ExprKind, FieldInit, Ident, NarrowTarget, Ty};
use devirt_core::config::NarrowingPolicy;
use devirt_core::diagnostics::Diagnostic;
use devirt_core::error::{Error, Result};
use devirt_core::lir::{LirExpr, LirFieldInit};
use devirt_core::span::Span;
use devirt_core::types::ConcreteTypeSet;
use tracing::warn;

use super::{AstToLir, Lowered, Scope};
use crate::{lower_bail, lower_ensure};

impl AstToLir<'_> {
    pub(super) fn lower_expr(&mut self, expr: &Expr, scope: &Scope) -> Result<Lowered> {
        let span = expr.span;
        match expr.kind() {
            ExprKind::Value(value) => Ok(Lowered {
                expr: LirExpr::Value(value.clone()),
                ty: value.ty(),
                set: None,
            }),
            ExprKind::Var(name) => self.lower_local(name, scope, span),
            ExprKind::SelfRef => {
                lower_ensure!(
                    self.ctx.self_class.is_some(),
                    span,
                    "`self` used outside of a method"
                );
                self.lower_local(&Ident::new("self"), scope, span)
            }
            ExprKind::Field { obj, field } => self.lower_field(obj, field, scope, span),
            ExprKind::BinOp { op, lhs, rhs } => self.lower_binop(*op, lhs, rhs, scope, span),
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => self.lower_method_call(receiver, method, args, scope, span),
            ExprKind::Call { function, args } => self.lower_call(function, args, scope, span),
            ExprKind::New { class, args } => self.lower_new(class, args, scope, span),
            ExprKind::Narrow { value, target } => self.lower_narrow(value, target, scope, span),
        }
    }

    fn lower_local(&self, name: &Ident, scope: &Scope, span: Span) -> Result<Lowered> {
        let local = scope.get(name.as_str()).ok_or_else(|| Error::UnknownVariable {
            name: name.clone(),
            span,
        })?;
        Ok(Lowered {
            expr: LirExpr::Local(name.clone()),
            ty: local.ty.clone(),
            set: local.set.clone(),
        })
    }

    fn lower_field(&mut self, obj: &Expr, field: &Ident, scope: &Scope, span: Span) -> Result<Lowered> {
        let hierarchy = self.hierarchy;
        let obj = self.lower_expr(obj, scope)?;
        let Ty::Class(class_name) = &obj.ty else {
            lower_bail!(span, "field `{}` accessed on a value of type {}", field, obj.ty);
        };
        let class = hierarchy.require(class_name, span)?;
        let decl = hierarchy
            .field(class, field.as_str())
            .ok_or_else(|| Error::UnknownField {
                class: class_name.clone(),
                field: field.clone(),
                span,
            })?;
        let ty = self.static_ty(&decl.ty, Some(class), span)?;
        let set = match &ty {
            Ty::Class(name) => Some(self.declared_classes(hierarchy.require(name, span)?)),
            _ => None,
        };
        Ok(Lowered {
            expr: LirExpr::Field {
                obj: Box::new(obj.expr),
                field: field.clone(),
            },
            ty,
            set,
        })
    }

    fn lower_binop(
        &mut self,
        op: BinOpKind,
        lhs: &Expr,
        rhs: &Expr,
        scope: &Scope,
        span: Span,
    ) -> Result<Lowered> {
        let lhs = self.lower_expr(lhs, scope)?;
        let rhs = self.lower_expr(rhs, scope)?;
        let ty = match op {
            BinOpKind::Add | BinOpKind::Sub | BinOpKind::Mul => {
                lower_ensure!(
                    lhs.ty == Ty::Int && rhs.ty == Ty::Int,
                    span,
                    "`{}` expects int operands, found {} and {}",
                    op.symbol(),
                    lhs.ty,
                    rhs.ty
                );
                Ty::Int
            }
            BinOpKind::Lt => {
                lower_ensure!(
                    lhs.ty == Ty::Int && rhs.ty == Ty::Int,
                    span,
                    "`<` expects int operands, found {} and {}",
                    lhs.ty,
                    rhs.ty
                );
                Ty::Bool
            }
            BinOpKind::Eq | BinOpKind::Ne => {
                lower_ensure!(
                    lhs.ty == rhs.ty && !matches!(lhs.ty, Ty::Class(_)),
                    span,
                    "cannot compare {} with {}",
                    lhs.ty,
                    rhs.ty
                );
                Ty::Bool
            }
            BinOpKind::And | BinOpKind::Or => {
                lower_ensure!(
                    lhs.ty == Ty::Bool && rhs.ty == Ty::Bool,
                    span,
                    "`{}` expects bool operands, found {} and {}",
                    op.symbol(),
                    lhs.ty,
                    rhs.ty
                );
                Ty::Bool
            }
        };
        Ok(Lowered {
            expr: LirExpr::BinOp {
                op,
                lhs: Box::new(lhs.expr),
                rhs: Box::new(rhs.expr),
            },
            ty,
            set: None,
        })
    }

    fn lower_new(&mut self, class_name: &Ident, args: &[FieldInit], scope: &Scope, span: Span) -> Result<Lowered> {
        let hierarchy = self.hierarchy;
        let class = hierarchy.require(class_name, span)?;
        let def = hierarchy.class(class);
        lower_ensure!(!def.is_abstract, span, "cannot instantiate abstract class `{}`", class_name);
        let tag = def.tag.ok_or_else(|| Error::UnregisteredSubclass {
            class: class_name.clone(),
            span,
        })?;

        let layout = hierarchy.field_layout(class);
        if let Some(unknown) = args
            .iter()
            .find(|arg| !layout.iter().any(|field| field.name == arg.name))
        {
            return Err(Error::UnknownField {
                class: class_name.clone(),
                field: unknown.name.clone(),
                span,
            });
        }

        let mut fields = Vec::with_capacity(layout.len());
        for field in &layout {
            let value = match args.iter().find(|arg| arg.name == field.name) {
                Some(arg) => {
                    let value = self.lower_expr(&arg.value, scope)?;
                    let declared = self.static_ty(&field.ty, Some(class), span)?;
                    self.check_assignable(&declared, &value, span)?;
                    value.expr
                }
                None => match &field.default {
                    Some(default) => LirExpr::Value(default.clone()),
                    None => lower_bail!(
                        span,
                        "field `{}` of `{}` needs a value",
                        field.name,
                        class_name
                    ),
                },
            };
            fields.push(LirFieldInit {
                name: field.name.clone(),
                value,
            });
        }
        Ok(Lowered {
            expr: LirExpr::Construct {
                record: class_name.clone(),
                tag,
                fields,
            },
            ty: Ty::Class(class_name.clone()),
            set: Some(ConcreteTypeSet::single(class)),
        })
    }

    fn lower_narrow(&mut self, value: &Expr, target: &NarrowTarget, scope: &Scope, span: Span) -> Result<Lowered> {
        let hierarchy = self.hierarchy;
        let value = self.lower_expr(value, scope)?;
        let Ty::Class(source_name) = &value.ty else {
            lower_bail!(span, "cannot narrow a value of type {}", value.ty);
        };
        let source = hierarchy.require(source_name, span)?;
        let target = match target {
            NarrowTarget::Class(name) => hierarchy.require(name, span)?,
            NarrowTarget::Receiver => match self.ctx.self_class {
                Some(class) => class,
                None => lower_bail!(span, "narrowing to the receiver type outside of a method"),
            },
        };
        let target_name = hierarchy.class(target).name.clone();
        lower_ensure!(
            hierarchy.root_of(source) == hierarchy.root_of(target),
            span,
            "`{}` and `{}` are unrelated",
            source_name,
            target_name
        );

        let incoming = value
            .set
            .clone()
            .unwrap_or_else(|| self.declared_classes(source));
        let policy = self.options.narrowing_policy;
        let set = match policy {
            NarrowingPolicy::Permissive => incoming,
            NarrowingPolicy::Checked => {
                let subtree = hierarchy.concrete_subclasses_of(target);
                let kept = incoming.intersection(&subtree);
                if kept.is_empty() {
                    let message = format!(
                        "narrowing {} to `{}` can never succeed",
                        incoming.display(hierarchy),
                        target_name
                    );
                    warn!("{} ({})", message, span);
                    self.warnings.push(Diagnostic::warning(message).with_span(span));
                    subtree
                } else {
                    kept
                }
            }
        };
        Ok(Lowered {
            expr: LirExpr::Narrow {
                value: Box::new(value.expr),
                target: target_name.clone(),
                checked: policy == NarrowingPolicy::Checked,
            },
            ty: Ty::Class(target_name),
            set: Some(set),
        })
    }
}
