// Dispatch synthesis tests
// Focus: tag switch shape, monomorphic fast path, stability, exhaustion faults

mod support;

use std::rc::Rc;

use devirt_core::ast::{Ident, Value};
use devirt_core::config::{GenericPolicy, NarrowingPolicy};
use devirt_core::error::Error;
use devirt_core::lir::*;
use devirt_core::runtime::{Instance, RtValue, RuntimeFault};
use devirt_core::span::Span;
use devirt_core::{ConcreteTypeSet, HierarchyModel, Result, TypeTag};
use devirt_optimize::{validate, DispatchPipeline, DispatchSite, DispatchSynthesizer, LirInterpreter};
use pretty_assertions::assert_eq;

fn lower(generic: GenericPolicy) -> Result<LirModule> {
    let mut pipeline = DispatchPipeline::new(support::options(generic, NarrowingPolicy::Checked));
    Ok(pipeline.run(&support::fixture_module())?.module)
}

fn switches_in(function: &LirFunction) -> Vec<&TagSwitch> {
    let mut switches = Vec::new();
    walk_stmts(&function.body, &mut |expr| {
        if let LirExpr::TagSwitch(switch) = expr {
            switches.push(switch);
        }
    });
    switches
}

fn calls_in(expr: &LirExpr) -> Vec<String> {
    let mut calls = Vec::new();
    expr.walk(&mut |expr| {
        if let LirExpr::Call { symbol, .. } = expr {
            calls.push(symbol.to_string());
        }
    });
    calls
}

fn function<'m>(module: &'m LirModule, symbol: &str) -> &'m LirFunction {
    module
        .function(symbol)
        .unwrap_or_else(|| panic!("`{symbol}` was not emitted"))
}

// ===== SWITCH SHAPE =====

#[test]
fn test_generic_body_switches_over_every_subclass() -> Result<()> {
    let module = lower(GenericPolicy::TagDispatch)?;
    let switches = switches_in(function(&module, "my_generic"));
    assert_eq!(switches.len(), 1);

    let switch = switches[0];
    assert_eq!(switch.site, "my_generic#0");
    assert_eq!(switch.binding, Ident::new("__dispatch0"));
    assert_eq!(*switch.scrutinee, LirExpr::Local(Ident::new("g")));

    let arms: Vec<(String, TypeTag)> = switch
        .arms
        .iter()
        .map(|arm| (arm.class.to_string(), arm.tag))
        .collect();
    assert_eq!(
        arms,
        vec![
            ("A".to_string(), TypeTag(0)),
            ("B".to_string(), TypeTag(1)),
            ("C".to_string(), TypeTag(2)),
        ]
    );
    let targets: Vec<Vec<String>> = switch.arms.iter().map(|arm| calls_in(&arm.body)).collect();
    assert_eq!(
        targets,
        vec![vec!["A.bar"], vec!["B.bar"], vec!["C.bar"]]
    );
    assert_eq!(switch.ty, LirTy::Int);
    Ok(())
}

#[test]
fn test_arm_receiver_is_relabeled_without_check() -> Result<()> {
    let module = lower(GenericPolicy::TagDispatch)?;
    let switch = switches_in(function(&module, "my_generic"))[0];
    let LirExpr::Call { args, .. } = &switch.arms[1].body else {
        panic!("arm body should be a direct call");
    };
    assert_eq!(
        args[0],
        LirExpr::Narrow {
            value: Box::new(LirExpr::Local(Ident::new("__dispatch0"))),
            target: Ident::new("B"),
            checked: false,
        }
    );
    Ok(())
}

#[test]
fn test_known_receivers_call_directly() -> Result<()> {
    let module = lower(GenericPolicy::TagDispatch)?;
    let mainx = function(&module, "mainx");
    // cc, ccc and bbb each hold B or C; a, b, c and bb are known exactly
    let sites: Vec<&str> = switches_in(mainx).iter().map(|switch| switch.site.as_str()).collect();
    assert_eq!(sites, vec!["mainx#0", "mainx#1", "mainx#2"]);
    for switch in switches_in(mainx) {
        let classes: Vec<&str> = switch.arms.iter().map(|arm| arm.class.as_str()).collect();
        assert_eq!(classes, vec!["B", "C"]);
    }

    let mut direct = Vec::new();
    walk_stmts(&mainx.body, &mut |expr| {
        if let LirExpr::Call { symbol, .. } = expr {
            direct.push(symbol.to_string());
        }
    });
    assert!(direct.contains(&"A.bar".to_string()));
    assert!(direct.contains(&"B.bar".to_string()));
    assert_eq!(direct.iter().filter(|symbol| *symbol == "A.some_subclass").count(), 4);
    Ok(())
}

#[test]
fn test_unreachable_definitions_are_not_emitted() -> Result<()> {
    let module = lower(GenericPolicy::TagDispatch)?;
    let symbols: Vec<&str> = module
        .functions
        .iter()
        .map(|function| function.symbol.as_str())
        .collect();
    assert_eq!(
        &symbols[..4],
        &["A.some_subclass", "A.bar", "B.bar", "C.bar"]
    );
    let self_param = &function(&module, "A.some_subclass").params[0];
    assert_eq!(self_param.ty, LirTy::Tagged(Ident::new("A")));
    let b_self = &function(&module, "B.bar").params[0];
    assert_eq!(b_self.ty, LirTy::Record(Ident::new("B")));
    Ok(())
}

#[test]
fn test_lowering_is_deterministic() -> Result<()> {
    for generic in [GenericPolicy::TagDispatch, GenericPolicy::Monomorphize] {
        let first = lower(generic)?;
        let second = lower(generic)?;
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(serde_json::to_string(&first)?, serde_json::to_string(&second)?);
    }
    Ok(())
}

#[test]
fn test_printed_switch_lists_arms_in_tag_order() -> Result<()> {
    let module = lower(GenericPolicy::TagDispatch)?;
    let printed = module.to_string();
    let start = printed
        .find("switch[my_generic#0]")
        .expect("switch printed");
    let rest = &printed[start..];
    let a = rest.find("A#0").expect("A arm");
    let b = rest.find("B#1").expect("B arm");
    let c = rest.find("C#2").expect("C arm");
    assert!(a < b && b < c);
    Ok(())
}

// ===== SYNTHESIZER =====

fn abc() -> Result<HierarchyModel> {
    HierarchyModel::from_decls(&support::abc_classes())
}

#[test]
fn test_single_class_needs_no_switch() -> Result<()> {
    let model = abc()?;
    let b = model.lookup("B").expect("B registered");
    let synth = DispatchSynthesizer::new(&model);
    let site = DispatchSite::new("f", 0);
    let (expr, ty) = synth.synthesize(
        &site,
        LirExpr::local("x"),
        &ConcreteTypeSet::single(b),
        &Ident::new("A"),
        Span::dummy(),
        |class, receiver| {
            let name = &model.class(class).name;
            Ok((LirExpr::call(Symbol::method(name, &Ident::new("bar")), vec![receiver]), LirTy::Int))
        },
    )?;
    assert_eq!(expr, LirExpr::call(Symbol::from("B.bar"), vec![LirExpr::local("x")]));
    assert_eq!(ty, LirTy::Int);
    Ok(())
}

#[test]
fn test_arm_types_widen_to_tagged_root() -> Result<()> {
    let model = abc()?;
    let set: ConcreteTypeSet = ["B", "C"]
        .iter()
        .map(|name| model.lookup(name).expect("registered"))
        .collect();
    let synth = DispatchSynthesizer::new(&model);
    let (_, ty) = synth.synthesize(
        &DispatchSite::new("f", 3),
        LirExpr::local("x"),
        &set,
        &Ident::new("A"),
        Span::dummy(),
        |class, receiver| Ok((receiver, LirTy::Record(model.class(class).name.clone()))),
    )?;
    assert_eq!(ty, LirTy::Tagged(Ident::new("A")));
    Ok(())
}

#[test]
fn test_empty_set_is_unregistered_subclass() -> Result<()> {
    let model = abc()?;
    let synth = DispatchSynthesizer::new(&model);
    let err = synth
        .plan(
            &DispatchSite::new("f", 0),
            &ConcreteTypeSet::new(),
            &Ident::new("A"),
            Span::dummy(),
            |_, receiver| Ok((receiver, LirTy::Unit)),
        )
        .unwrap_err();
    assert!(matches!(err, Error::UnregisteredSubclass { ref class, .. } if class.as_str() == "A"));
    Ok(())
}

// ===== RUNTIME =====

/// `pick(x)` switches on `x` but only covers `A`.
fn partial_switch_module() -> LirModule {
    let records = vec![
        LirRecord {
            name: Ident::new("A"),
            tag: TypeTag(0),
            ancestors: vec![],
            fields: vec![],
        },
        LirRecord {
            name: Ident::new("B"),
            tag: TypeTag(1),
            ancestors: vec![Ident::new("A")],
            fields: vec![],
        },
    ];
    let switch = TagSwitch {
        site: "pick#0".to_string(),
        scrutinee: Box::new(LirExpr::local("x")),
        binding: Ident::new("__dispatch0"),
        arms: vec![SwitchArm {
            class: Ident::new("A"),
            tag: TypeTag(0),
            ty: LirTy::Int,
            body: LirExpr::Value(Value::Int(1)),
        }],
        ty: LirTy::Int,
    };
    LirModule {
        records,
        functions: vec![LirFunction {
            symbol: Symbol::from("pick"),
            origin: FunctionOrigin::Function {
                name: Ident::new("pick"),
            },
            params: vec![LirParam {
                name: Ident::new("x"),
                ty: LirTy::Tagged(Ident::new("A")),
            }],
            ret: LirTy::Int,
            body: vec![LirStmt::Return(Some(LirExpr::TagSwitch(switch)))],
        }],
    }
}

#[test]
fn test_uncovered_tag_faults_with_site() -> Result<()> {
    let module = partial_switch_module();
    validate(&module)?;
    let mut interpreter = LirInterpreter::new(&module);

    let a = RtValue::Object(Rc::new(Instance::new(TypeTag(0), vec![])));
    assert_eq!(interpreter.call("pick", vec![a]), Ok(RtValue::Int(1)));

    let b = RtValue::Object(Rc::new(Instance::new(TypeTag(1), vec![])));
    assert_eq!(
        interpreter.call("pick", vec![b]),
        Err(RuntimeFault::DispatchExhaustion {
            site: "pick#0".to_string(),
            tag: TypeTag(1),
        })
    );
    Ok(())
}

#[test]
fn test_validation_rejects_duplicate_arms() {
    let mut module = partial_switch_module();
    let LirStmt::Return(Some(LirExpr::TagSwitch(switch))) = &mut module.functions[0].body[0] else {
        panic!("fixture shape changed");
    };
    let duplicate = switch.arms[0].clone();
    switch.arms.push(duplicate);
    let err = validate(&module).unwrap_err();
    assert!(matches!(err, Error::InvalidLir(ref message) if message.contains("two arms")));
}

#[test]
fn test_validation_rejects_mislabeled_arm() {
    let mut module = partial_switch_module();
    let LirStmt::Return(Some(LirExpr::TagSwitch(switch))) = &mut module.functions[0].body[0] else {
        panic!("fixture shape changed");
    };
    switch.arms[0].class = Ident::new("B");
    assert!(validate(&module).is_err());
}
