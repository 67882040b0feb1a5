use crate::ast::{Ident, Ty, Value};
use crate::span::Span;

pub type BExpr = Box<Expr>;

common_struct! {
    pub struct Expr {
        pub kind: ExprKind,
        #[serde(default)]
        pub span: Span,
    }
}

common_enum! {
    pub enum ExprKind {
        Value(Value),
        Var(Ident),
        SelfRef,
        Field { obj: BExpr, field: Ident },
        BinOp { op: BinOpKind, lhs: BExpr, rhs: BExpr },
        MethodCall { receiver: BExpr, method: Ident, args: Vec<Expr> },
        Call { function: Ident, args: Vec<Expr> },
        New { class: Ident, args: Vec<FieldInit> },
        /// Runtime type assertion of `value` to `target`.
        Narrow { value: BExpr, target: NarrowTarget },
    }
}

common_enum! {
    pub enum NarrowTarget {
        Class(Ident),
        /// The static type of `self` in the enclosing method.
        Receiver,
    }
}

common_struct! {
    pub struct FieldInit {
        pub name: Ident,
        pub value: Expr,
    }
}

common_enum! {
    #[derive(Copy, Eq, Hash)]
    pub enum BinOpKind {
        Add,
        Sub,
        Mul,
        Eq,
        Ne,
        Lt,
        And,
        Or,
    }
}

impl BinOpKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOpKind::Add => "+",
            BinOpKind::Sub => "-",
            BinOpKind::Mul => "*",
            BinOpKind::Eq => "==",
            BinOpKind::Ne => "!=",
            BinOpKind::Lt => "<",
            BinOpKind::And => "&&",
            BinOpKind::Or => "||",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self, BinOpKind::Eq | BinOpKind::Ne | BinOpKind::Lt)
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinOpKind::And | BinOpKind::Or)
    }
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            span: Span::dummy(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::Value(Value::Int(value)))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::Value(Value::Bool(value)))
    }

    pub fn var(name: impl Into<Ident>) -> Self {
        Self::new(ExprKind::Var(name.into()))
    }

    pub fn self_ref() -> Self {
        Self::new(ExprKind::SelfRef)
    }

    pub fn field(obj: Expr, field: impl Into<Ident>) -> Self {
        Self::new(ExprKind::Field {
            obj: Box::new(obj),
            field: field.into(),
        })
    }

    pub fn binop(op: BinOpKind, lhs: Expr, rhs: Expr) -> Self {
        Self::new(ExprKind::BinOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn method_call(receiver: Expr, method: impl Into<Ident>, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::MethodCall {
            receiver: Box::new(receiver),
            method: method.into(),
            args,
        })
    }

    pub fn call(function: impl Into<Ident>, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call {
            function: function.into(),
            args,
        })
    }

    pub fn new_object(class: impl Into<Ident>, args: Vec<(&str, Expr)>) -> Self {
        Self::new(ExprKind::New {
            class: class.into(),
            args: args
                .into_iter()
                .map(|(name, value)| FieldInit {
                    name: name.into(),
                    value,
                })
                .collect(),
        })
    }

    pub fn narrow(value: Expr, target: NarrowTarget) -> Self {
        Self::new(ExprKind::Narrow {
            value: Box::new(value),
            target,
        })
    }
}

common_struct! {
    #[derive(Default)]
    pub struct Block {
        pub stmts: Vec<Stmt>,
    }
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }
}

common_enum! {
    pub enum Stmt {
        Let {
            name: Ident,
            ty: Option<Ty>,
            init: Expr,
            #[serde(default)]
            span: Span,
        },
        Return {
            value: Option<Expr>,
            #[serde(default)]
            span: Span,
        },
        If {
            cond: Expr,
            then: Block,
            elze: Option<Block>,
            #[serde(default)]
            span: Span,
        },
        Expr(Expr),
        /// Runtime check that faults when `cond` is false.
        Assert {
            cond: Expr,
            #[serde(default)]
            span: Span,
        },
    }
}

impl Stmt {
    pub fn let_(name: impl Into<Ident>, init: Expr) -> Self {
        Stmt::Let {
            name: name.into(),
            ty: None,
            init,
            span: Span::dummy(),
        }
    }

    pub fn ret(value: Expr) -> Self {
        Stmt::Return {
            value: Some(value),
            span: Span::dummy(),
        }
    }

    pub fn if_else(cond: Expr, then: Vec<Stmt>, elze: Option<Vec<Stmt>>) -> Self {
        Stmt::If {
            cond,
            then: Block::new(then),
            elze: elze.map(Block::new),
            span: Span::dummy(),
        }
    }

    pub fn expr(expr: Expr) -> Self {
        Stmt::Expr(expr)
    }

    pub fn assert(cond: Expr) -> Self {
        Stmt::Assert {
            cond,
            span: Span::dummy(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Stmt::Let { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::If { span, .. }
            | Stmt::Assert { span, .. } => *span,
            Stmt::Expr(expr) => expr.span,
        }
    }
}
