use std::rc::Rc;

use devirt_core::ast::{BinOpKind, Value};
use devirt_core::config::NarrowingPolicy;
use devirt_core::lir::{LirExpr, LirFunction, TagSwitch};
use devirt_core::runtime::{narrow, Instance, RtValue, RuntimeFault};
use tracing::trace;

use super::{Env, Flow, LirInterpreter};

impl<'m> LirInterpreter<'m> {
    pub(super) fn eval(
        &mut self,
        function: &'m LirFunction,
        expr: &'m LirExpr,
        env: &mut Env,
    ) -> Result<RtValue, RuntimeFault> {
        match expr {
            LirExpr::Value(value) => Ok(match value {
                Value::Int(value) => RtValue::Int(*value),
                Value::Bool(value) => RtValue::Bool(*value),
                Value::Unit => RtValue::Unit,
            }),
            LirExpr::Local(name) => env
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeFault::Invalid(format!("unbound local `{}`", name))),
            LirExpr::Field { obj, field } => {
                let obj = self.eval(function, obj, env)?;
                let instance = obj.as_instance()?;
                instance.field(field.as_str()).cloned().ok_or_else(|| {
                    RuntimeFault::Invalid(format!(
                        "instance {} has no field `{}`",
                        instance.tag(),
                        field
                    ))
                })
            }
            LirExpr::BinOp { op, lhs, rhs } => self.eval_binop(function, *op, lhs, rhs, env),
            LirExpr::Call { symbol, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(function, arg, env))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(symbol.as_str(), args)
            }
            LirExpr::Construct { tag, fields, .. } => {
                let fields = fields
                    .iter()
                    .map(|field| -> Result<_, RuntimeFault> {
                        Ok((field.name.clone(), self.eval(function, &field.value, env)?))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RtValue::Object(Rc::new(Instance::new(*tag, fields))))
            }
            LirExpr::Narrow {
                value,
                target,
                checked,
            } => {
                let value = self.eval(function, value, env)?;
                let policy = if *checked {
                    NarrowingPolicy::Checked
                } else {
                    NarrowingPolicy::Permissive
                };
                let handle = narrow(value.as_instance()?, target, self.module, policy)?;
                Ok(RtValue::Object(handle.instance))
            }
            LirExpr::Block { stmts, value } => {
                let mut inner = env.clone();
                match self.exec_block(function, stmts, &mut inner)? {
                    Flow::Continue => self.eval(function, value, &mut inner),
                    Flow::Return(_) => Err(RuntimeFault::Invalid(format!(
                        "return inside an expression block of `{}`",
                        function.symbol
                    ))),
                }
            }
            LirExpr::TagSwitch(switch) => self.eval_switch(function, switch, env),
        }
    }

    fn eval_switch(
        &mut self,
        function: &'m LirFunction,
        switch: &'m TagSwitch,
        env: &mut Env,
    ) -> Result<RtValue, RuntimeFault> {
        let scrutinee = self.eval(function, &switch.scrutinee, env)?;
        let tag = scrutinee.as_instance()?.tag();
        let arm = switch
            .arms
            .iter()
            .find(|arm| arm.tag == tag)
            .ok_or_else(|| RuntimeFault::DispatchExhaustion {
                site: switch.site.clone(),
                tag,
            })?;
        trace!("{}: tag {} -> {}", switch.site, tag, arm.class);
        let mut arm_env = env.clone();
        arm_env.insert(switch.binding.clone(), scrutinee);
        self.eval(function, &arm.body, &mut arm_env)
    }

    fn eval_binop(
        &mut self,
        function: &'m LirFunction,
        op: BinOpKind,
        lhs: &'m LirExpr,
        rhs: &'m LirExpr,
        env: &mut Env,
    ) -> Result<RtValue, RuntimeFault> {
        let lhs = self.eval(function, lhs, env)?;
        match (op, lhs.as_bool()) {
            (BinOpKind::And, Some(false)) => return Ok(RtValue::Bool(false)),
            (BinOpKind::Or, Some(true)) => return Ok(RtValue::Bool(true)),
            _ => {}
        }
        let rhs = self.eval(function, rhs, env)?;
        let mismatch = || {
            RuntimeFault::Invalid(format!("`{}` applied to {} and {}", op.symbol(), lhs, rhs))
        };
        let value = match op {
            BinOpKind::Add | BinOpKind::Sub | BinOpKind::Mul | BinOpKind::Lt => {
                let (Some(l), Some(r)) = (lhs.as_int(), rhs.as_int()) else {
                    return Err(mismatch());
                };
                match op {
                    BinOpKind::Add => RtValue::Int(l.checked_add(r).ok_or_else(mismatch)?),
                    BinOpKind::Sub => RtValue::Int(l.checked_sub(r).ok_or_else(mismatch)?),
                    BinOpKind::Mul => RtValue::Int(l.checked_mul(r).ok_or_else(mismatch)?),
                    _ => RtValue::Bool(l < r),
                }
            }
            BinOpKind::Eq => RtValue::Bool(lhs == rhs),
            BinOpKind::Ne => RtValue::Bool(lhs != rhs),
            BinOpKind::And | BinOpKind::Or => match rhs.as_bool() {
                Some(value) => RtValue::Bool(value),
                None => return Err(mismatch()),
            },
        };
        Ok(value)
    }
}
