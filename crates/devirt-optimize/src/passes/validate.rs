//! Structural checks on a lowered fragment before it is handed to codegen.

use std::collections::{HashMap, HashSet};

use devirt_core::error::{Error, Result};
use devirt_core::lir::{walk_stmts, LirExpr, LirModule};
use devirt_core::tags::TypeTag;
use tracing::debug;

/// Verifies record tags are unique, every call targets an emitted function
/// with the right arity, and every tag switch has distinct arms that name
/// existing records with matching tags.
pub fn validate(module: &LirModule) -> Result<()> {
    let mut tags: HashMap<TypeTag, &str> = HashMap::new();
    for record in &module.records {
        if let Some(previous) = tags.insert(record.tag, record.name.as_str()) {
            return Err(Error::InvalidLir(format!(
                "records `{}` and `{}` share tag {}",
                previous, record.name, record.tag
            )));
        }
    }

    let arity: HashMap<&str, usize> = module
        .functions
        .iter()
        .map(|function| (function.symbol.as_str(), function.params.len()))
        .collect();
    if arity.len() != module.functions.len() {
        return Err(Error::InvalidLir("duplicate function symbols".to_string()));
    }

    let mut switches = 0usize;
    for function in &module.functions {
        let mut problem: Option<String> = None;
        walk_stmts(&function.body, &mut |expr| {
            if problem.is_some() {
                return;
            }
            problem = match expr {
                LirExpr::Call { symbol, args } => match arity.get(symbol.as_str()) {
                    None => Some(format!("call of unknown function `{}`", symbol)),
                    Some(expected) if *expected != args.len() => Some(format!(
                        "`{}` called with {} arguments, expects {}",
                        symbol,
                        args.len(),
                        expected
                    )),
                    Some(_) => None,
                },
                LirExpr::Construct { record, tag, .. } => match module.record(record.as_str()) {
                    Some(found) if found.tag == *tag => None,
                    Some(found) => Some(format!(
                        "`{}` constructed with tag {}, record has {}",
                        record, tag, found.tag
                    )),
                    None => Some(format!("construction of unknown record `{}`", record)),
                },
                LirExpr::TagSwitch(switch) => {
                    switches += 1;
                    check_switch(module, switch)
                }
                _ => None,
            };
        });
        if let Some(problem) = problem {
            return Err(Error::InvalidLir(format!("in `{}`: {}", function.symbol, problem)));
        }
    }
    debug!(
        "validated {} functions, {} tag switches",
        module.functions.len(),
        switches
    );
    Ok(())
}

fn check_switch(module: &LirModule, switch: &devirt_core::lir::TagSwitch) -> Option<String> {
    if switch.arms.is_empty() {
        return Some(format!("switch {} has no arms", switch.site));
    }
    let mut seen = HashSet::new();
    for arm in &switch.arms {
        if !seen.insert(arm.tag) {
            return Some(format!("switch {} has two arms for tag {}", switch.site, arm.tag));
        }
        match module.record_by_tag(arm.tag) {
            Some(record) if record.name == arm.class => {}
            Some(record) => {
                return Some(format!(
                    "switch {} arm `{}` carries the tag of `{}`",
                    switch.site, arm.class, record.name
                ))
            }
            None => {
                return Some(format!(
                    "switch {} arm `{}` has unregistered tag {}",
                    switch.site, arm.class, arm.tag
                ))
            }
        }
    }
    None
}
