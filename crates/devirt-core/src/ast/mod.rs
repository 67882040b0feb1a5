//! Input fragment handed over by the external parser and type checker.
//!
//! The tree only covers what dispatch resolution needs: class declarations
//! with fields and methods, free functions, and a small statement/expression
//! language around method calls, construction and narrowing.

use serde::{Deserialize, Serialize};

mod expr;
mod item;

pub use expr::*;
pub use item::*;

/// A simple identifier - a single name like `bar` or `MyClass`
#[derive(Debug, Clone, Serialize, Deserialize, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct Ident {
    pub name: String,
}

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn as_str(&self) -> &str {
        self.name.as_str()
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl std::borrow::Borrow<str> for Ident {
    fn borrow(&self) -> &str {
        self.name.as_str()
    }
}

impl From<String> for Ident {
    fn from(name: String) -> Self {
        Ident::new(name)
    }
}

impl From<&str> for Ident {
    fn from(name: &str) -> Self {
        Ident::new(name)
    }
}

impl From<&Ident> for String {
    fn from(ident: &Ident) -> Self {
        ident.name.clone()
    }
}

common_enum! {
    /// Declared types as the type checker wrote them down.
    pub enum Ty {
        Int,
        Bool,
        Unit,
        Class(Ident),
        /// The receiver's own runtime type.
        SelfType,
    }
}

impl Ty {
    pub fn class(name: impl Into<Ident>) -> Self {
        Ty::Class(name.into())
    }

    pub fn as_class(&self) -> Option<&Ident> {
        match self {
            Ty::Class(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_self_type(&self) -> bool {
        matches!(self, Ty::SelfType)
    }
}

impl std::fmt::Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ty::Int => write!(f, "int"),
            Ty::Bool => write!(f, "bool"),
            Ty::Unit => write!(f, "()"),
            Ty::Class(name) => write!(f, "{}", name),
            Ty::SelfType => write!(f, "Self"),
        }
    }
}

common_enum! {
    pub enum Value {
        Int(i64),
        Bool(bool),
        Unit,
    }
}

impl Value {
    pub fn ty(&self) -> Ty {
        match self {
            Value::Int(_) => Ty::Int,
            Value::Bool(_) => Ty::Bool,
            Value::Unit => Ty::Unit,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Unit => write!(f, "()"),
        }
    }
}

common_struct! {
    /// One compilation unit: a single class hierarchy plus the free functions using it.
    pub struct Module {
        pub classes: Vec<ClassDecl>,
        pub functions: Vec<FunctionDecl>,
    }
}

impl Module {
    pub fn new(classes: Vec<ClassDecl>, functions: Vec<FunctionDecl>) -> Self {
        Self { classes, functions }
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.iter().find(|f| f.name.as_str() == name)
    }
}
