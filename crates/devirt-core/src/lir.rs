//! Lowered fragment handed to the external emitter.
//!
//! There is no method call and no virtual dispatch in this tree: every call
//! names a resolved symbol, and every place where the concrete class of a
//! value was ambiguous is an explicit [`TagSwitch`] whose arms carry the
//! concrete class they were specialized for.

use crate::ast::{BinOpKind, Ident, Value};
use crate::runtime::ClassRelation;
use crate::tags::TypeTag;
use derive_more::{Display, From};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// Name of a lowered function: `Class.method`, `function`, or a
/// specialization `function__ClassA_ClassB`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
#[display("{_0}")]
pub struct Symbol(pub String);

impl Symbol {
    pub fn method(class: &Ident, method: &Ident) -> Self {
        Symbol(format!("{}.{}", class, method))
    }

    pub fn function(name: &Ident) -> Self {
        Symbol(name.to_string())
    }

    pub fn specialization(name: &Ident, classes: &[Ident]) -> Self {
        Symbol(format!("{}__{}", name, classes.iter().join("_")))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol(name.to_string())
    }
}

common_enum! {
    pub enum LirTy {
        Int,
        Bool,
        Unit,
        /// Exactly this class; the tag is known statically.
        Record(Ident),
        /// Any concrete class of the hierarchy rooted at this class.
        Tagged(Ident),
    }
}

impl fmt::Display for LirTy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LirTy::Int => write!(f, "int"),
            LirTy::Bool => write!(f, "bool"),
            LirTy::Unit => write!(f, "()"),
            LirTy::Record(name) => write!(f, "{}", name),
            LirTy::Tagged(root) => write!(f, "tagged {}", root),
        }
    }
}

common_struct! {
    pub struct LirField {
        pub name: Ident,
        pub ty: LirTy,
    }
}

common_struct! {
    pub struct LirRecord {
        pub name: Ident,
        pub tag: TypeTag,
        /// Base chain, nearest first.
        pub ancestors: Vec<Ident>,
        pub fields: Vec<LirField>,
    }
}

common_enum! {
    pub enum FunctionOrigin {
        Method { class: Ident, method: Ident },
        Function { name: Ident },
        Specialization { function: Ident, classes: Vec<Ident> },
    }
}

common_struct! {
    pub struct LirParam {
        pub name: Ident,
        pub ty: LirTy,
    }
}

common_struct! {
    pub struct LirFunction {
        pub symbol: Symbol,
        pub origin: FunctionOrigin,
        pub params: Vec<LirParam>,
        pub ret: LirTy,
        pub body: Vec<LirStmt>,
    }
}

common_enum! {
    pub enum LirStmt {
        Let { name: Ident, value: LirExpr },
        Return(Option<LirExpr>),
        If { cond: LirExpr, then: Vec<LirStmt>, elze: Vec<LirStmt> },
        Expr(LirExpr),
        Assert(LirExpr),
    }
}

common_struct! {
    pub struct LirFieldInit {
        pub name: Ident,
        pub value: LirExpr,
    }
}

common_enum! {
    pub enum LirExpr {
        Value(Value),
        Local(Ident),
        Field { obj: Box<LirExpr>, field: Ident },
        BinOp { op: BinOpKind, lhs: Box<LirExpr>, rhs: Box<LirExpr> },
        Call { symbol: Symbol, args: Vec<LirExpr> },
        Construct { record: Ident, tag: TypeTag, fields: Vec<LirFieldInit> },
        /// Relabels `value` as `target`; `checked` narrowings verify the tag.
        Narrow { value: Box<LirExpr>, target: Ident, checked: bool },
        Block { stmts: Vec<LirStmt>, value: Box<LirExpr> },
        TagSwitch(TagSwitch),
    }
}

common_struct! {
    /// Branch-per-concrete-class construct. The scrutinee is evaluated once
    /// and bound to `binding`; the arm whose tag equals the runtime tag runs.
    /// A tag matching no arm is a dispatch-exhaustion fault.
    pub struct TagSwitch {
        pub site: String,
        pub scrutinee: Box<LirExpr>,
        pub binding: Ident,
        pub arms: Vec<SwitchArm>,
        pub ty: LirTy,
    }
}

common_struct! {
    pub struct SwitchArm {
        pub class: Ident,
        pub tag: TypeTag,
        /// Result type of this arm after specialization.
        pub ty: LirTy,
        pub body: LirExpr,
    }
}

impl LirExpr {
    pub fn local(name: impl Into<Ident>) -> Self {
        LirExpr::Local(name.into())
    }

    pub fn call(symbol: Symbol, args: Vec<LirExpr>) -> Self {
        LirExpr::Call { symbol, args }
    }

    /// Visits this expression and every nested expression, statements included.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a LirExpr)) {
        visit(self);
        match self {
            LirExpr::Value(_) | LirExpr::Local(_) => {}
            LirExpr::Field { obj, .. } => obj.walk(visit),
            LirExpr::BinOp { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            LirExpr::Call { args, .. } => args.iter().for_each(|arg| arg.walk(visit)),
            LirExpr::Construct { fields, .. } => {
                fields.iter().for_each(|field| field.value.walk(visit))
            }
            LirExpr::Narrow { value, .. } => value.walk(visit),
            LirExpr::Block { stmts, value } => {
                walk_stmts(stmts, visit);
                value.walk(visit);
            }
            LirExpr::TagSwitch(switch) => {
                switch.scrutinee.walk(visit);
                switch.arms.iter().for_each(|arm| arm.body.walk(visit));
            }
        }
    }
}

pub fn walk_stmts<'a>(stmts: &'a [LirStmt], visit: &mut dyn FnMut(&'a LirExpr)) {
    for stmt in stmts {
        match stmt {
            LirStmt::Let { value, .. } => value.walk(visit),
            LirStmt::Return(value) => {
                if let Some(value) = value {
                    value.walk(visit);
                }
            }
            LirStmt::If { cond, then, elze } => {
                cond.walk(visit);
                walk_stmts(then, visit);
                walk_stmts(elze, visit);
            }
            LirStmt::Expr(expr) | LirStmt::Assert(expr) => expr.walk(visit),
        }
    }
}

common_struct! {
    #[derive(Default)]
    pub struct LirModule {
        pub records: Vec<LirRecord>,
        pub functions: Vec<LirFunction>,
    }
}

impl LirModule {
    pub fn function(&self, symbol: &str) -> Option<&LirFunction> {
        self.functions
            .iter()
            .find(|function| function.symbol.as_str() == symbol)
    }

    pub fn record(&self, name: &str) -> Option<&LirRecord> {
        self.records.iter().find(|record| record.name.as_str() == name)
    }

    pub fn record_by_tag(&self, tag: TypeTag) -> Option<&LirRecord> {
        self.records.iter().find(|record| record.tag == tag)
    }

    /// Every tag switch in the module, in emission order.
    pub fn tag_switches(&self) -> Vec<&TagSwitch> {
        let mut switches = Vec::new();
        for function in &self.functions {
            walk_stmts(&function.body, &mut |expr| {
                if let LirExpr::TagSwitch(switch) = expr {
                    switches.push(switch);
                }
            });
        }
        switches
    }
}

impl ClassRelation for LirModule {
    fn class_name(&self, tag: TypeTag) -> Option<&str> {
        self.record_by_tag(tag).map(|record| record.name.as_str())
    }

    fn derives_from(&self, tag: TypeTag, target: &str) -> bool {
        self.record_by_tag(tag).is_some_and(|record| {
            record.name.as_str() == target
                || record.ancestors.iter().any(|base| base.as_str() == target)
        })
    }
}

impl fmt::Display for LirModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = LirPrinter::default();
        printer.print_module(self)?;
        f.write_str(&printer.out)
    }
}

#[derive(Default)]
struct LirPrinter {
    out: String,
    indent: usize,
}

impl LirPrinter {
    fn line(&mut self, text: &str) -> fmt::Result {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
        Ok(())
    }

    fn print_module(&mut self, module: &LirModule) -> fmt::Result {
        for record in &module.records {
            let base = match record.ancestors.first() {
                Some(base) => format!(" : {}", base),
                None => String::new(),
            };
            let fields = record
                .fields
                .iter()
                .map(|field| format!("{}: {}", field.name, field.ty))
                .join(", ");
            self.line(&format!(
                "record {}{}{} {{ {} }}",
                record.name, record.tag, base, fields
            ))?;
        }
        for function in &module.functions {
            let params = function
                .params
                .iter()
                .map(|param| format!("{}: {}", param.name, param.ty))
                .join(", ");
            self.line(&format!(
                "fn {}({}) -> {} {{",
                function.symbol, params, function.ret
            ))?;
            self.indent += 1;
            self.print_stmts(&function.body)?;
            self.indent -= 1;
            self.line("}")?;
        }
        Ok(())
    }

    fn print_stmts(&mut self, stmts: &[LirStmt]) -> fmt::Result {
        for stmt in stmts {
            match stmt {
                LirStmt::Let { name, value } => {
                    let value = self.expr(value)?;
                    self.line(&format!("let {} = {};", name, value))?;
                }
                LirStmt::Return(Some(value)) => {
                    let value = self.expr(value)?;
                    self.line(&format!("return {};", value))?;
                }
                LirStmt::Return(None) => self.line("return;")?,
                LirStmt::If { cond, then, elze } => {
                    let cond = self.expr(cond)?;
                    self.line(&format!("if {} {{", cond))?;
                    self.indent += 1;
                    self.print_stmts(then)?;
                    self.indent -= 1;
                    if elze.is_empty() {
                        self.line("}")?;
                    } else {
                        self.line("} else {")?;
                        self.indent += 1;
                        self.print_stmts(elze)?;
                        self.indent -= 1;
                        self.line("}")?;
                    }
                }
                LirStmt::Expr(expr) => {
                    let expr = self.expr(expr)?;
                    self.line(&format!("{};", expr))?;
                }
                LirStmt::Assert(expr) => {
                    let expr = self.expr(expr)?;
                    self.line(&format!("assert {};", expr))?;
                }
            }
        }
        Ok(())
    }

    /// Renders an expression inline; switches and blocks nest with their own
    /// indentation relative to the current line.
    fn expr(&mut self, expr: &LirExpr) -> Result<String, fmt::Error> {
        let mut out = String::new();
        match expr {
            LirExpr::Value(value) => write!(out, "{}", value)?,
            LirExpr::Local(name) => write!(out, "{}", name)?,
            LirExpr::Field { obj, field } => write!(out, "{}.{}", self.expr(obj)?, field)?,
            LirExpr::BinOp { op, lhs, rhs } => write!(
                out,
                "({} {} {})",
                self.expr(lhs)?,
                op.symbol(),
                self.expr(rhs)?
            )?,
            LirExpr::Call { symbol, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.expr(arg))
                    .collect::<Result<Vec<_>, fmt::Error>>()?;
                write!(out, "{}({})", symbol, args.join(", "))?
            }
            LirExpr::Construct {
                record,
                tag,
                fields,
            } => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|field| -> Result<String, fmt::Error> {
                        Ok(format!("{}: {}", field.name, self.expr(&field.value)?))
                    })
                    .collect::<Result<_, _>>()?;
                write!(out, "new {}{} {{ {} }}", record, tag, fields.join(", "))?
            }
            LirExpr::Narrow {
                value,
                target,
                checked,
            } => {
                let kind = if *checked { "narrow" } else { "relabel" };
                write!(out, "{}<{}>({})", kind, target, self.expr(value)?)?
            }
            LirExpr::Block { stmts, value } => {
                let pad = "    ".repeat(self.indent + 1);
                let mut nested = LirPrinter {
                    out: String::new(),
                    indent: self.indent + 1,
                };
                nested.print_stmts(stmts)?;
                let value = nested.expr(value)?;
                write!(out, "{{\n{}{}{}\n{}}}", nested.out, pad, value, "    ".repeat(self.indent))?
            }
            LirExpr::TagSwitch(switch) => {
                let scrutinee = self.expr(&switch.scrutinee)?;
                writeln!(
                    out,
                    "switch[{}] tag({} = {}) {{",
                    switch.site, switch.binding, scrutinee
                )?;
                self.indent += 1;
                for arm in &switch.arms {
                    let body = self.expr(&arm.body)?;
                    writeln!(
                        out,
                        "{}{}{} => {}: {},",
                        "    ".repeat(self.indent),
                        arm.class,
                        arm.tag,
                        body,
                        arm.ty
                    )?;
                }
                writeln!(out, "{}_ => fault dispatch_exhaustion,", "    ".repeat(self.indent))?;
                self.indent -= 1;
                write!(out, "{}}}", "    ".repeat(self.indent))?
            }
        }
        Ok(out)
    }
}
