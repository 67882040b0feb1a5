use crate::ast::{Block, Ident, Ty, Value};
use crate::span::Span;

common_struct! {
    pub struct ClassDecl {
        pub name: Ident,
        pub base: Option<Ident>,
        #[serde(default)]
        pub is_abstract: bool,
        #[serde(default)]
        pub fields: Vec<FieldDecl>,
        #[serde(default)]
        pub methods: Vec<MethodDecl>,
        #[serde(default)]
        pub span: Span,
    }
}

impl ClassDecl {
    pub fn new(name: impl Into<Ident>, base: Option<&str>) -> Self {
        Self {
            name: name.into(),
            base: base.map(Ident::from),
            is_abstract: false,
            fields: Vec::new(),
            methods: Vec::new(),
            span: Span::dummy(),
        }
    }

    pub fn with_field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn into_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }
}

common_struct! {
    /// A field declaration. Redeclaring a base field in a subclass replaces
    /// its default without changing its slot.
    pub struct FieldDecl {
        pub name: Ident,
        pub ty: Ty,
        pub default: Option<Value>,
    }
}

impl FieldDecl {
    pub fn new(name: impl Into<Ident>, ty: Ty, default: Option<Value>) -> Self {
        Self {
            name: name.into(),
            ty,
            default,
        }
    }
}

common_struct! {
    pub struct Param {
        pub name: Ident,
        pub ty: Ty,
    }
}

impl Param {
    pub fn new(name: impl Into<Ident>, ty: Ty) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

common_struct! {
    /// A method; `self` is implicit and not part of `params`.
    pub struct MethodDecl {
        pub name: Ident,
        pub params: Vec<Param>,
        pub ret: Ty,
        pub body: Block,
        #[serde(default)]
        pub span: Span,
    }
}

impl MethodDecl {
    pub fn new(name: impl Into<Ident>, params: Vec<Param>, ret: Ty, body: Block) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            body,
            span: Span::dummy(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

common_struct! {
    pub struct FunctionDecl {
        pub name: Ident,
        pub params: Vec<Param>,
        pub ret: Ty,
        pub body: Block,
        #[serde(default)]
        pub span: Span,
    }
}

impl FunctionDecl {
    pub fn new(name: impl Into<Ident>, params: Vec<Param>, ret: Ty, body: Block) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            body,
            span: Span::dummy(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Parameters typed with a class, i.e. the ones dispatch cares about.
    pub fn class_params(&self) -> impl Iterator<Item = (usize, &Ident)> {
        self.params
            .iter()
            .enumerate()
            .filter_map(|(idx, param)| param.ty.as_class().map(|class| (idx, class)))
    }
}
