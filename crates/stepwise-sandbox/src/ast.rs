//! Syntax tree of the script language.

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Declare {
        kind: DeclKind,
        declarations: Vec<(Pattern, Option<Expr>)>,
    },
    Function(Arc<FunctionDef>),
    Return(Option<Expr>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForOf {
        kind: Option<DeclKind>,
        pattern: Pattern,
        iterable: Expr,
        body: Box<Stmt>,
    },
    ForIn {
        kind: Option<DeclKind>,
        pattern: Pattern,
        object: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    /// `break` / `continue`, optionally naming an enclosing label.
    Break(Option<String>),
    Continue(Option<String>),
    Labeled {
        label: String,
        body: Box<Stmt>,
    },
    Class(Arc<ClassDef>),
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        param: Option<Pattern>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for `default:`.
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

/// A binding target with an optional default (`x = 1` in a parameter list).
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub pattern: Pattern,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Ident(String),
    Array {
        elements: Vec<Option<Binding>>,
        rest: Option<Box<Pattern>>,
    },
    Object {
        properties: Vec<(PropKey, Binding)>,
        rest: Option<String>,
    },
    /// Only valid as an assignment target: `obj.key = ...` inside a pattern.
    Member(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<Binding>,
    pub rest: Option<Pattern>,
    pub body: FunctionBody,
    pub is_async: bool,
    pub is_arrow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: Option<String>,
    pub extends: Option<Expr>,
    pub constructor: Option<Arc<FunctionDef>>,
    pub members: Vec<ClassMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMember {
    pub key: PropKey,
    pub is_static: bool,
    pub kind: ClassMemberKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassMemberKind {
    Method(Arc<FunctionDef>),
    /// A field with its optional initializer, evaluated per instance.
    Field(Option<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    Named(String),
    Computed(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectProp {
    KeyValue(PropKey, Expr),
    Spread(Expr),
    /// `{ a = 1 }`: only meaningful once converted to a pattern.
    ShorthandDefault(String, Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayElem {
    Item(Expr),
    Spread(Expr),
    Hole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
    Typeof,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Arith(BinaryOp),
    Logical(LogicalOp),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberProp {
    Named(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Template(Vec<TemplatePart>),
    Bool(bool),
    Null,
    Ident(String),
    This,
    Array(Vec<ArrayElem>),
    Object(Vec<ObjectProp>),
    Function(Arc<FunctionDef>),
    Class(Arc<ClassDef>),
    Regex {
        pattern: String,
        flags: String,
    },
    /// `super(...)` inside a derived constructor.
    SuperCall(Vec<ArrayElem>),
    SuperMember(MemberProp),
    Member {
        object: Box<Expr>,
        property: MemberProp,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<ArrayElem>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        args: Vec<ArrayElem>,
    },
    /// Boundary of a chain containing `?.`; a nullish link yields `undefined` here.
    OptionalChain(Box<Expr>),
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Pattern>,
        value: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Await(Box<Expr>),
    Sequence(Vec<Expr>),
}
