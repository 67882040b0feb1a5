//! Runtime side of the dispatch model: tagged instances and narrowing.

use crate::ast::Ident;
use crate::config::NarrowingPolicy;
use crate::tags::TypeTag;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use thiserror::Error;

/// Answers subclass questions about runtime tags. Implemented by the
/// hierarchy model at compile time and by the record table of a lowered
/// module at run time.
pub trait ClassRelation {
    fn class_name(&self, tag: TypeTag) -> Option<&str>;

    /// Whether the class carrying `tag` is `target` or one of its subclasses.
    fn derives_from(&self, tag: TypeTag, target: &str) -> bool;
}

/// Faults raised while executing lowered code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeFault {
    /// A tag switch met a tag none of its arms covers. Only reachable when
    /// the concrete type set computed at compile time was unsound.
    #[error("dispatch exhaustion at {site}: no arm for tag {tag}")]
    DispatchExhaustion { site: String, tag: TypeTag },
    #[error("cannot narrow instance of `{actual}` to `{target}`")]
    NarrowingFailed { actual: String, target: Ident },
    #[error("assertion failed in `{function}`")]
    AssertionFailed { function: String },
    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),
    #[error("`{symbol}` expects {expected} arguments, got {actual}")]
    ArityMismatch {
        symbol: String,
        expected: usize,
        actual: usize,
    },
    #[error("expected an instance, found {0}")]
    NotAnInstance(String),
    #[error("{0}")]
    Invalid(String),
}

/// A heap object. The tag is fixed at construction.
#[derive(Debug, PartialEq)]
pub struct Instance {
    tag: TypeTag,
    fields: Vec<(Ident, RtValue)>,
}

impl Instance {
    pub fn new(tag: TypeTag, fields: Vec<(Ident, RtValue)>) -> Self {
        Self { tag, fields }
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn field(&self, name: &str) -> Option<&RtValue> {
        self.fields
            .iter()
            .find(|(field, _)| field.as_str() == name)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> &[(Ident, RtValue)] {
        &self.fields
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RtValue {
    Int(i64),
    Bool(bool),
    Unit,
    Object(Rc<Instance>),
}

impl RtValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RtValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RtValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Result<&Rc<Instance>, RuntimeFault> {
        match self {
            RtValue::Object(instance) => Ok(instance),
            other => Err(RuntimeFault::NotAnInstance(other.to_string())),
        }
    }
}

impl Display for RtValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RtValue::Int(value) => write!(f, "{}", value),
            RtValue::Bool(value) => write!(f, "{}", value),
            RtValue::Unit => write!(f, "()"),
            RtValue::Object(instance) => write!(f, "<instance {}>", instance.tag),
        }
    }
}

/// An instance viewed through a declared class. The view is a static label
/// only; dispatch always re-reads the instance tag.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrowedHandle {
    pub instance: Rc<Instance>,
    pub view: Ident,
}

/// Narrows `instance` to `target` according to `policy`.
pub fn narrow(
    instance: &Rc<Instance>,
    target: &Ident,
    relation: &dyn ClassRelation,
    policy: NarrowingPolicy,
) -> Result<NarrowedHandle, RuntimeFault> {
    if policy == NarrowingPolicy::Checked && !relation.derives_from(instance.tag, target.as_str()) {
        return Err(RuntimeFault::NarrowingFailed {
            actual: relation
                .class_name(instance.tag)
                .map(str::to_string)
                .unwrap_or_else(|| instance.tag.to_string()),
            target: target.clone(),
        });
    }
    Ok(NarrowedHandle {
        instance: instance.clone(),
        view: target.clone(),
    })
}
