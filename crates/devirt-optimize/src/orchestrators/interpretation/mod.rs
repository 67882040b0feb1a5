mod expressions;

use std::collections::HashMap;

use devirt_core::ast::Ident;
use devirt_core::lir::{LirFunction, LirModule, LirStmt, Symbol};
use devirt_core::runtime::{RtValue, RuntimeFault};
use tracing::{debug, trace};

const MAX_CALL_DEPTH: usize = 512;

type Env = HashMap<Ident, RtValue>;

enum Flow {
    Continue,
    Return(RtValue),
}

/// Reference executor for lowered fragments.
///
/// Runs the LIR exactly as an emitter would translate it: calls are direct,
/// tag switches read the instance tag, and narrowing follows the `checked`
/// flag the lowering recorded. Used to check that devirtualized code keeps
/// the behavior of the virtual-dispatch source.
pub struct LirInterpreter<'m> {
    module: &'m LirModule,
    functions: HashMap<&'m str, &'m LirFunction>,
    calls: Vec<Symbol>,
    depth: usize,
}

impl<'m> LirInterpreter<'m> {
    pub fn new(module: &'m LirModule) -> Self {
        let functions = module
            .functions
            .iter()
            .map(|function| (function.symbol.as_str(), function))
            .collect();
        Self {
            module,
            functions,
            calls: Vec::new(),
            depth: 0,
        }
    }

    /// Every function entered so far, in call order.
    pub fn calls(&self) -> &[Symbol] {
        &self.calls
    }

    pub fn call(&mut self, symbol: &str, args: Vec<RtValue>) -> Result<RtValue, RuntimeFault> {
        let function = *self
            .functions
            .get(symbol)
            .ok_or_else(|| RuntimeFault::UnknownSymbol(symbol.to_string()))?;
        if function.params.len() != args.len() {
            return Err(RuntimeFault::ArityMismatch {
                symbol: symbol.to_string(),
                expected: function.params.len(),
                actual: args.len(),
            });
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeFault::Invalid(format!(
                "call depth exceeded entering `{}`",
                symbol
            )));
        }
        trace!("enter {}", symbol);
        self.calls.push(function.symbol.clone());

        let mut env: Env = function
            .params
            .iter()
            .map(|param| param.name.clone())
            .zip(args)
            .collect();
        self.depth += 1;
        let flow = self.exec_block(function, &function.body, &mut env);
        self.depth -= 1;
        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Continue => Ok(RtValue::Unit),
        }
    }

    fn exec_block(
        &mut self,
        function: &'m LirFunction,
        stmts: &'m [LirStmt],
        env: &mut Env,
    ) -> Result<Flow, RuntimeFault> {
        for stmt in stmts {
            match stmt {
                LirStmt::Let { name, value } => {
                    let value = self.eval(function, value, env)?;
                    env.insert(name.clone(), value);
                }
                LirStmt::Return(value) => {
                    let value = match value {
                        Some(value) => self.eval(function, value, env)?,
                        None => RtValue::Unit,
                    };
                    return Ok(Flow::Return(value));
                }
                LirStmt::If { cond, then, elze } => {
                    let cond = self.eval(function, cond, env)?;
                    let branch = match cond.as_bool() {
                        Some(true) => then,
                        Some(false) => elze,
                        None => {
                            return Err(RuntimeFault::Invalid(format!(
                                "condition evaluated to {}",
                                cond
                            )))
                        }
                    };
                    // bindings made inside a branch end with it
                    let mut inner = env.clone();
                    if let Flow::Return(value) = self.exec_block(function, branch, &mut inner)? {
                        return Ok(Flow::Return(value));
                    }
                }
                LirStmt::Expr(expr) => {
                    self.eval(function, expr, env)?;
                }
                LirStmt::Assert(cond) => {
                    let cond = self.eval(function, cond, env)?;
                    if cond.as_bool() != Some(true) {
                        debug!("assertion failed in {}", function.symbol);
                        return Err(RuntimeFault::AssertionFailed {
                            function: function.symbol.to_string(),
                        });
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }
}
