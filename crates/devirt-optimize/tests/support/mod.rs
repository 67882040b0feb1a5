// Shared fixtures for the optimizer integration tests
#![allow(dead_code)]

use devirt_core::ast::*;
use devirt_core::config::{GenericPolicy, LoweringOptions, NarrowingPolicy};

pub const ALL_POLICIES: [(GenericPolicy, NarrowingPolicy); 4] = [
    (GenericPolicy::TagDispatch, NarrowingPolicy::Checked),
    (GenericPolicy::TagDispatch, NarrowingPolicy::Permissive),
    (GenericPolicy::Monomorphize, NarrowingPolicy::Checked),
    (GenericPolicy::Monomorphize, NarrowingPolicy::Permissive),
];

pub fn options(generic: GenericPolicy, narrowing: NarrowingPolicy) -> LoweringOptions {
    LoweringOptions::new(generic, narrowing)
}

fn self_field(name: &str) -> Expr {
    Expr::field(Expr::self_ref(), name)
}

fn add(lhs: Expr, rhs: Expr) -> Expr {
    Expr::binop(BinOpKind::Add, lhs, rhs)
}

fn eq(lhs: Expr, rhs: Expr) -> Expr {
    Expr::binop(BinOpKind::Eq, lhs, rhs)
}

fn int_field(name: &str, default: Option<i64>) -> FieldDecl {
    FieldDecl::new(name, Ty::Int, default.map(Value::Int))
}

fn bar(body: Expr) -> MethodDecl {
    MethodDecl::new("bar", vec![], Ty::Int, Block::new(vec![Stmt::ret(body)]))
}

/// `some_subclass(o, s)` returns `o` narrowed to the receiver's type when
/// `s` holds, the receiver itself otherwise.
fn some_subclass() -> MethodDecl {
    MethodDecl::new(
        "some_subclass",
        vec![Param::new("o", Ty::class("A")), Param::new("s", Ty::Bool)],
        Ty::SelfType,
        Block::new(vec![Stmt::if_else(
            Expr::var("s"),
            vec![Stmt::ret(Expr::narrow(Expr::var("o"), NarrowTarget::Receiver))],
            Some(vec![Stmt::ret(Expr::self_ref())]),
        )]),
    )
}

/// A(x, z = 0) with `bar = x`; B(x = 10, z = 1) with `bar = x + z`;
/// C(x = 100, z = 100, w = 1) with `bar = x + z + w`.
pub fn abc_classes() -> Vec<ClassDecl> {
    vec![
        ClassDecl::new("A", None)
            .with_field(int_field("x", None))
            .with_field(int_field("z", Some(0)))
            .with_method(some_subclass())
            .with_method(bar(self_field("x"))),
        ClassDecl::new("B", Some("A"))
            .with_field(int_field("x", Some(10)))
            .with_field(int_field("z", Some(1)))
            .with_method(bar(add(self_field("x"), self_field("z")))),
        ClassDecl::new("C", Some("A"))
            .with_field(int_field("x", Some(100)))
            .with_field(int_field("z", Some(100)))
            .with_field(int_field("w", Some(1)))
            .with_method(bar(add(add(self_field("x"), self_field("z")), self_field("w")))),
    ]
}

pub fn my_generic() -> FunctionDecl {
    FunctionDecl::new(
        "my_generic",
        vec![Param::new("g", Ty::class("A"))],
        Ty::Int,
        Block::new(vec![Stmt::ret(Expr::method_call(Expr::var("g"), "bar", vec![]))]),
    )
}

fn call_some_subclass(receiver: &str, other: &str, narrow: bool) -> Expr {
    Expr::method_call(
        Expr::var(receiver),
        "some_subclass",
        vec![Expr::var(other), Expr::bool(narrow)],
    )
}

fn bar_of(name: &str) -> Expr {
    Expr::method_call(Expr::var(name), "bar", vec![])
}

/// Entry point asserting every dispatch result of the fixture.
pub fn mainx() -> FunctionDecl {
    let stmts = vec![
        Stmt::let_("a", Expr::new_object("A", vec![("x", Expr::int(1000))])),
        Stmt::let_("b", Expr::new_object("B", vec![])),
        Stmt::let_("c", Expr::new_object("C", vec![])),
        Stmt::assert(eq(Expr::field(Expr::var("a"), "x"), bar_of("a"))),
        Stmt::let_("x", Expr::call("my_generic", vec![Expr::var("a")])),
        Stmt::assert(eq(Expr::field(Expr::var("a"), "x"), Expr::var("x"))),
        Stmt::let_("y", Expr::call("my_generic", vec![Expr::var("b")])),
        Stmt::assert(eq(Expr::var("y"), Expr::int(11))),
        Stmt::let_("z", Expr::call("my_generic", vec![Expr::var("c")])),
        Stmt::assert(eq(Expr::var("z"), Expr::int(201))),
        // returning the receiver
        Stmt::let_("bb", call_some_subclass("b", "b", false)),
        Stmt::let_("w", bar_of("bb")),
        Stmt::assert(eq(Expr::var("w"), Expr::var("y"))),
        Stmt::let_("cc", call_some_subclass("c", "b", false)),
        Stmt::let_("w", bar_of("cc")),
        Stmt::assert(eq(Expr::var("w"), Expr::var("z"))),
        // returning the narrowed argument
        Stmt::let_("ccc", call_some_subclass("b", "c", true)),
        Stmt::let_("w", bar_of("ccc")),
        Stmt::assert(eq(Expr::var("w"), Expr::var("z"))),
        Stmt::let_("bbb", call_some_subclass("c", "b", true)),
        Stmt::let_("w", bar_of("bbb")),
        Stmt::assert(eq(Expr::var("w"), Expr::var("y"))),
        Stmt::assert(eq(
            Expr::call("my_generic", vec![Expr::var("bbb")]),
            Expr::var("y"),
        )),
    ];
    FunctionDecl::new("mainx", vec![], Ty::Unit, Block::new(stmts))
}

/// Wraps a single call of `my_generic` on a fresh instance of `class`.
pub fn probe(class: &str) -> FunctionDecl {
    FunctionDecl::new(
        format!("probe_{}", class.to_lowercase()),
        vec![],
        Ty::Int,
        Block::new(vec![
            Stmt::let_("v", Expr::new_object(class, fixture_args(class))),
            Stmt::ret(Expr::call("my_generic", vec![Expr::var("v")])),
        ]),
    )
}

fn fixture_args(class: &str) -> Vec<(&'static str, Expr)> {
    match class {
        "A" => vec![("x", Expr::int(1000))],
        _ => vec![],
    }
}

pub fn fixture_module() -> Module {
    Module::new(
        abc_classes(),
        vec![my_generic(), mainx(), probe("A"), probe("B"), probe("C")],
    )
}
