// Self-type resolution tests
// Focus: concrete sets computed for calls of methods returning the self type

mod support;

use devirt_core::ast::*;
use devirt_core::config::NarrowingPolicy;
use devirt_core::error::Error;
use devirt_core::span::Span;
use devirt_core::{ConcreteTypeSet, HierarchyModel, MethodId, Result};
use devirt_optimize::{CallSite, DispatchPipeline, ReturnOrigin, SelfTypeResolver};
use pretty_assertions::assert_eq;

struct Fixture {
    model: HierarchyModel,
    some_subclass: MethodId,
}

impl Fixture {
    fn new() -> Result<Self> {
        let model = HierarchyModel::from_decls(&support::abc_classes())?;
        let a = model.lookup("A").expect("A registered");
        let some_subclass = model.resolve_method(a, "some_subclass", Span::dummy())?.id;
        Ok(Self {
            model,
            some_subclass,
        })
    }

    fn set(&self, names: &[&str]) -> ConcreteTypeSet {
        names
            .iter()
            .map(|name| self.model.lookup(name).expect("registered"))
            .collect()
    }

    /// Set of `receiver.some_subclass(other, _)` with both sides known exactly.
    fn resolve(&self, policy: NarrowingPolicy, receiver: &str, other: &str) -> Result<Vec<String>> {
        let mut resolver = SelfTypeResolver::new(policy);
        let receiver_set = self.set(&[receiver]);
        let args = vec![Some(self.set(&[other])), None];
        let site = CallSite {
            receiver: &receiver_set,
            receiver_static: self.model.lookup(receiver).expect("registered"),
            args: &args,
        };
        let set = resolver.resolve_call(&self.model, self.some_subclass, &site)?;
        Ok(set
            .iter()
            .map(|id| self.model.class(id).name.to_string())
            .collect())
    }
}

#[test]
fn test_summary_records_both_exit_paths() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut resolver = SelfTypeResolver::new(NarrowingPolicy::Checked);
    let summary = resolver.summarize(&fixture.model, fixture.some_subclass)?;
    let a = fixture.model.lookup("A").expect("A registered");
    assert_eq!(
        summary.exits,
        vec![
            ReturnOrigin::Narrowed {
                inner: Box::new(ReturnOrigin::Param(0)),
                target: a,
            },
            ReturnOrigin::Receiver,
        ]
    );
    Ok(())
}

#[test]
fn test_fixture_call_sites() -> Result<()> {
    let fixture = Fixture::new()?;
    for policy in [NarrowingPolicy::Checked, NarrowingPolicy::Permissive] {
        assert_eq!(fixture.resolve(policy, "B", "B")?, vec!["B"]);
        assert_eq!(fixture.resolve(policy, "C", "B")?, vec!["B", "C"]);
        assert_eq!(fixture.resolve(policy, "B", "C")?, vec!["B", "C"]);
    }
    Ok(())
}

#[test]
fn test_unknown_argument_widens_to_declared_subtree() -> Result<()> {
    // Narrowing to the receiver's own static type does not say which
    // subclass occupies it, so every concrete subclass stays possible.
    let fixture = Fixture::new()?;
    let mut resolver = SelfTypeResolver::new(NarrowingPolicy::Checked);
    let receiver = fixture.set(&["A"]);
    let args: Vec<Option<ConcreteTypeSet>> = vec![None, None];
    let site = CallSite {
        receiver: &receiver,
        receiver_static: fixture.model.lookup("A").expect("A registered"),
        args: &args,
    };
    let set = resolver.resolve_call(&fixture.model, fixture.some_subclass, &site)?;
    assert_eq!(set, fixture.set(&["A", "B", "C"]));
    Ok(())
}

/// `pick(o)` always returns `o` narrowed to `B`.
fn pick_module() -> Result<(HierarchyModel, MethodId)> {
    let pick = MethodDecl::new(
        "pick",
        vec![Param::new("o", Ty::class("A"))],
        Ty::SelfType,
        Block::new(vec![Stmt::ret(Expr::narrow(
            Expr::var("o"),
            NarrowTarget::Class(Ident::new("B")),
        ))]),
    );
    let model = HierarchyModel::from_decls(&[
        ClassDecl::new("A", None).with_method(pick),
        ClassDecl::new("B", Some("A")),
        ClassDecl::new("C", Some("A")),
    ])?;
    let a = model.lookup("A").expect("A registered");
    let pick = model.resolve_method(a, "pick", Span::dummy())?.id;
    Ok((model, pick))
}

#[test]
fn test_checked_narrowing_drops_impossible_classes() -> Result<()> {
    let (model, pick) = pick_module()?;
    let id = |name: &str| model.lookup(name).expect("registered");
    let receiver = ConcreteTypeSet::single(id("C"));

    let args: Vec<Option<ConcreteTypeSet>> = vec![Some([id("B"), id("C")].into_iter().collect())];
    let site = CallSite {
        receiver: &receiver,
        receiver_static: id("C"),
        args: &args,
    };
    let checked = SelfTypeResolver::new(NarrowingPolicy::Checked).resolve_call(&model, pick, &site)?;
    assert_eq!(checked, ConcreteTypeSet::single(id("B")));

    let permissive =
        SelfTypeResolver::new(NarrowingPolicy::Permissive).resolve_call(&model, pick, &site)?;
    assert_eq!(permissive.len(), 2);
    Ok(())
}

#[test]
fn test_empty_result_falls_back_to_receiver_subtree() -> Result<()> {
    let (model, pick) = pick_module()?;
    let id = |name: &str| model.lookup(name).expect("registered");
    let receiver = ConcreteTypeSet::single(id("C"));
    let args = vec![Some(ConcreteTypeSet::single(id("C")))];
    let site = CallSite {
        receiver: &receiver,
        receiver_static: id("C"),
        args: &args,
    };
    let set = SelfTypeResolver::new(NarrowingPolicy::Checked).resolve_call(&model, pick, &site)?;
    assert_eq!(set, ConcreteTypeSet::single(id("C")));
    Ok(())
}

#[test]
fn test_missing_return_path_is_unresolvable() -> Result<()> {
    let half = MethodDecl::new(
        "half",
        vec![Param::new("s", Ty::Bool)],
        Ty::SelfType,
        Block::new(vec![Stmt::if_else(
            Expr::var("s"),
            vec![Stmt::ret(Expr::self_ref())],
            None,
        )]),
    );
    let model = HierarchyModel::from_decls(&[ClassDecl::new("A", None).with_method(half)])?;
    let a = model.lookup("A").expect("A registered");
    let half = model.resolve_method(a, "half", Span::dummy())?.id;
    let err = SelfTypeResolver::new(NarrowingPolicy::Checked)
        .summarize(&model, half)
        .unwrap_err();
    assert!(matches!(err, Error::UnresolvableSelfType { ref method, .. } if method.as_str() == "half"));
    Ok(())
}

#[test]
fn test_chained_self_calls_resolve_per_receiver() -> Result<()> {
    // again() returns self.some_subclass(o, true)
    let again = MethodDecl::new(
        "again",
        vec![Param::new("o", Ty::class("A"))],
        Ty::SelfType,
        Block::new(vec![Stmt::ret(Expr::method_call(
            Expr::self_ref(),
            "some_subclass",
            vec![Expr::var("o"), Expr::bool(true)],
        ))]),
    );
    let mut classes = support::abc_classes();
    classes[0] = classes[0].clone().with_method(again);
    let model = HierarchyModel::from_decls(&classes)?;
    let id = |name: &str| model.lookup(name).expect("registered");
    let again = model.resolve_method(id("A"), "again", Span::dummy())?.id;

    let receiver = ConcreteTypeSet::single(id("B"));
    let args = vec![Some(ConcreteTypeSet::single(id("C")))];
    let site = CallSite {
        receiver: &receiver,
        receiver_static: id("B"),
        args: &args,
    };
    let set = SelfTypeResolver::new(NarrowingPolicy::Checked).resolve_call(&model, again, &site)?;
    assert_eq!(set, [id("B"), id("C")].into_iter().collect::<ConcreteTypeSet>());
    Ok(())
}

#[test]
fn test_uncalled_method_missing_a_return_fails_the_unit() {
    let half = MethodDecl::new(
        "half",
        vec![Param::new("s", Ty::Bool)],
        Ty::SelfType,
        Block::new(vec![Stmt::if_else(
            Expr::var("s"),
            vec![Stmt::ret(Expr::self_ref())],
            None,
        )]),
    );
    let mut classes = support::abc_classes();
    classes[0] = classes[0].clone().with_method(half);
    let module = Module::new(classes, vec![support::my_generic()]);

    let mut pipeline = DispatchPipeline::default();
    let err = pipeline.run(&module).unwrap_err();
    assert!(matches!(err, Error::UnresolvableSelfType { ref method, .. } if method.as_str() == "half"));
    assert!(pipeline.diagnostics().has_errors());
}
