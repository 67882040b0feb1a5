use crate::ast::Ident;
use crate::span::Span;
use miette::Diagnostic;
use std::result;
use thiserror::Error;

/// Compile-time failures. Every variant is fatal to the compilation unit and
/// names the offending class, method or function together with the span the
/// parser attached to it.
#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
pub enum Error {
    #[error("class `{class}` is declared more than once ({span})")]
    #[diagnostic(
        code(devirt::duplicate_class),
        help("every class in a compilation unit needs a unique name")
    )]
    DuplicateClass { class: Ident, span: Span },

    #[error("class `{class}` extends unknown base `{base}` ({span})")]
    #[diagnostic(
        code(devirt::unknown_base),
        help("declare the base class in the same compilation unit")
    )]
    UnknownBase { class: Ident, base: Ident, span: Span },

    #[error("inheritance cycle through {}", .classes.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(" -> "))]
    #[diagnostic(code(devirt::cyclic_inheritance))]
    CyclicInheritance { classes: Vec<Ident>, span: Span },

    #[error("no method `{method}` on `{class}` or any of its bases ({span})")]
    #[diagnostic(code(devirt::no_such_method))]
    NoSuchMethod {
        class: Ident,
        method: Ident,
        span: Span,
    },

    #[error("override `{class}.{method}` must return the self type or a subclass of `{class}` ({span})")]
    #[diagnostic(
        code(devirt::inconsistent_override),
        help("a method returning the self type keeps that contract in every override")
    )]
    InconsistentOverride {
        class: Ident,
        method: Ident,
        span: Span,
    },

    #[error("cannot resolve the self type of `{class}.{method}`: a path falls off the end without returning ({span})")]
    #[diagnostic(
        code(devirt::unresolvable_self_type),
        help("make every control-flow path of the method end in a return")
    )]
    UnresolvableSelfType {
        class: Ident,
        method: Ident,
        span: Span,
    },

    #[error("no concrete subclass of `{class}` to dispatch over ({span})")]
    #[diagnostic(code(devirt::unregistered_subclass))]
    UnregisteredSubclass { class: Ident, span: Span },

    #[error("unknown class `{class}` ({span})")]
    #[diagnostic(code(devirt::unknown_class))]
    UnknownClass { class: Ident, span: Span },

    #[error("unknown function `{function}` ({span})")]
    #[diagnostic(code(devirt::unknown_function))]
    UnknownFunction { function: Ident, span: Span },

    #[error("class `{class}` has no field `{field}` ({span})")]
    #[diagnostic(code(devirt::unknown_field))]
    UnknownField {
        class: Ident,
        field: Ident,
        span: Span,
    },

    #[error("unknown variable `{name}` ({span})")]
    #[diagnostic(code(devirt::unknown_variable))]
    UnknownVariable { name: Ident, span: Span },

    #[error("type mismatch: {message} ({span})")]
    #[diagnostic(code(devirt::type_mismatch))]
    TypeMismatch { message: String, span: Span },

    #[error("invalid lowered fragment: {0}")]
    #[diagnostic(code(devirt::invalid_lir))]
    InvalidLir(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl Error {
    /// Span carried by the error, if the variant has one.
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::DuplicateClass { span, .. }
            | Error::UnknownBase { span, .. }
            | Error::CyclicInheritance { span, .. }
            | Error::NoSuchMethod { span, .. }
            | Error::InconsistentOverride { span, .. }
            | Error::UnresolvableSelfType { span, .. }
            | Error::UnregisteredSubclass { span, .. }
            | Error::UnknownClass { span, .. }
            | Error::UnknownFunction { span, .. }
            | Error::UnknownField { span, .. }
            | Error::UnknownVariable { span, .. }
            | Error::TypeMismatch { span, .. } => Some(*span),
            Error::InvalidLir(_) | Error::Generic(_) => None,
        }
    }

    pub fn type_mismatch(message: impl Into<String>, span: Span) -> Self {
        Error::TypeMismatch {
            message: message.into(),
            span,
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Generic(e.to_string())
    }
}
