use std::borrow::Cow;
use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::lexer::Span;
use crate::value::Value;

/// Container for nodes with location info.
///
/// This container fulfills two purposes: it adds location information to
/// nodes, but it also ensures the node is heap allocated.  The latter is
/// useful to ensure that enum variants do not cause the enum to become too
/// large.
pub struct Spanned<T> {
    node: Box<T>,
    span: Span,
}

impl<T> Spanned<T> {
    /// Creates a new spanned node.
    pub fn new(node: T, span: Span) -> Spanned<T> {
        Spanned {
            node: Box::new(node),
            span,
        }
    }

    /// Accesses the span.
    pub fn span(&self) -> Span {
        self.span
    }

    /// Consumes the container and returns the node.
    pub fn into_inner(self) -> T {
        *self.node
    }
}

impl<T> Deref for Spanned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

impl<T> DerefMut for Spanned<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.node
    }
}

impl<T: fmt::Debug> fmt::Debug for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ok!(fmt::Debug::fmt(&self.node, f));
        write!(f, "{:?}", self.span)
    }
}

/// A statement node.
#[derive(Debug)]
pub enum Stmt<'a> {
    EmitExpr(Spanned<EmitExpr<'a>>),
    EmitRaw(Spanned<EmitRaw<'a>>),
    ForLoop(Spanned<ForLoop<'a>>),
    IfCond(Spanned<IfCond<'a>>),
    WithBlock(Spanned<WithBlock<'a>>),
    Set(Spanned<Set<'a>>),
    SetBlock(Spanned<SetBlock<'a>>),
    AutoEscape(Spanned<AutoEscape<'a>>),
    FilterBlock(Spanned<FilterBlock<'a>>),
    Block(Spanned<Block<'a>>),
    Extends(Spanned<Extends<'a>>),
    Include(Spanned<Include<'a>>),
    Import(Spanned<Import<'a>>),
    FromImport(Spanned<FromImport<'a>>),
    Macro(Spanned<Macro<'a>>),
    CallBlock(Spanned<CallBlock<'a>>),
    Do(Spanned<Do<'a>>),
    Continue(Spanned<Continue>),
    Break(Spanned<Break>),
}

impl<'a> Stmt<'a> {
    pub fn span(&self) -> Span {
        match self {
            Stmt::EmitExpr(s) => s.span(),
            Stmt::EmitRaw(s) => s.span(),
            Stmt::ForLoop(s) => s.span(),
            Stmt::IfCond(s) => s.span(),
            Stmt::WithBlock(s) => s.span(),
            Stmt::Set(s) => s.span(),
            Stmt::SetBlock(s) => s.span(),
            Stmt::AutoEscape(s) => s.span(),
            Stmt::FilterBlock(s) => s.span(),
            Stmt::Block(s) => s.span(),
            Stmt::Extends(s) => s.span(),
            Stmt::Include(s) => s.span(),
            Stmt::Import(s) => s.span(),
            Stmt::FromImport(s) => s.span(),
            Stmt::Macro(s) => s.span(),
            Stmt::CallBlock(s) => s.span(),
            Stmt::Do(s) => s.span(),
            Stmt::Continue(s) => s.span(),
            Stmt::Break(s) => s.span(),
        }
    }
}

/// An expression node.
#[allow(clippy::enum_variant_names)]
#[derive(Debug)]
pub enum Expr<'a> {
    Var(Spanned<Var<'a>>),
    Const(Spanned<Const>),
    Slice(Spanned<Slice<'a>>),
    UnaryOp(Spanned<UnaryOp<'a>>),
    BinOp(Spanned<BinOp<'a>>),
    IfExpr(Spanned<IfExpr<'a>>),
    Filter(Spanned<Filter<'a>>),
    Test(Spanned<Test<'a>>),
    GetAttr(Spanned<GetAttr<'a>>),
    GetItem(Spanned<GetItem<'a>>),
    Call(Spanned<Call<'a>>),
    List(Spanned<List<'a>>),
    Map(Spanned<Map<'a>>),
}

impl<'a> Expr<'a> {
    pub fn description(&self) -> &'static str {
        match self {
            Expr::Var(_) => "variable",
            Expr::Const(_) => "constant",
            Expr::Slice(_) => "slice",
            Expr::UnaryOp(_) => "unary operator",
            Expr::BinOp(_) => "binary operator",
            Expr::IfExpr(_) => "if expression",
            Expr::Filter(_) => "filter expression",
            Expr::Test(_) => "test expression",
            Expr::GetAttr(_) => "attribute lookup",
            Expr::GetItem(_) => "subscript",
            Expr::Call(_) => "call",
            Expr::List(_) => "list literal",
            Expr::Map(_) => "map literal",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Expr::Var(s) => s.span(),
            Expr::Const(s) => s.span(),
            Expr::Slice(s) => s.span(),
            Expr::UnaryOp(s) => s.span(),
            Expr::BinOp(s) => s.span(),
            Expr::IfExpr(s) => s.span(),
            Expr::Filter(s) => s.span(),
            Expr::Test(s) => s.span(),
            Expr::GetAttr(s) => s.span(),
            Expr::GetItem(s) => s.span(),
            Expr::Call(s) => s.span(),
            Expr::List(s) => s.span(),
            Expr::Map(s) => s.span(),
        }
    }
}

/// A for loop.
#[derive(Debug)]
pub struct ForLoop<'a> {
    pub target: Expr<'a>,
    pub iter: Expr<'a>,
    pub filter_expr: Option<Expr<'a>>,
    pub recursive: bool,
    pub body: Vec<Stmt<'a>>,
    pub else_body: Vec<Stmt<'a>>,
}

/// An if/else condition.
#[derive(Debug)]
pub struct IfCond<'a> {
    pub expr: Expr<'a>,
    pub true_body: Vec<Stmt<'a>>,
    pub false_body: Vec<Stmt<'a>>,
}

/// A with block.
#[derive(Debug)]
pub struct WithBlock<'a> {
    pub assignments: Vec<(Expr<'a>, Expr<'a>)>,
    pub body: Vec<Stmt<'a>>,
}

/// A set statement.
#[derive(Debug)]
pub struct Set<'a> {
    pub target: Expr<'a>,
    pub expr: Expr<'a>,
}

/// A set capture statement.
#[derive(Debug)]
pub struct SetBlock<'a> {
    pub target: Expr<'a>,
    pub filter: Option<Expr<'a>>,
    pub body: Vec<Stmt<'a>>,
}

/// A block for inheritance elements.
#[derive(Debug)]
pub struct Block<'a> {
    pub name: &'a str,
    pub body: Vec<Stmt<'a>>,
}

/// An extends statement.
#[derive(Debug)]
pub struct Extends<'a> {
    pub name: Expr<'a>,
}

/// An include statement.
#[derive(Debug)]
pub struct Include<'a> {
    pub name: Expr<'a>,
    pub ignore_missing: bool,
    pub with_context: bool,
}

/// An auto escape control block.
#[derive(Debug)]
pub struct AutoEscape<'a> {
    pub enabled: Expr<'a>,
    pub body: Vec<Stmt<'a>>,
}

/// Applies filters to a block.
#[derive(Debug)]
pub struct FilterBlock<'a> {
    pub filter: Expr<'a>,
    pub body: Vec<Stmt<'a>>,
}

/// Declares a macro.
#[derive(Debug)]
pub struct Macro<'a> {
    pub name: &'a str,
    pub args: Vec<Expr<'a>>,
    pub defaults: Vec<Expr<'a>>,
    pub body: Vec<Stmt<'a>>,
}

/// A call block (`{% call ... %}`).
#[derive(Debug)]
pub struct CallBlock<'a> {
    pub call: Spanned<Call<'a>>,
    pub macro_decl: Spanned<Macro<'a>>,
}

/// A `{% do %}` statement evaluating an expression for its side effects.
#[derive(Debug)]
pub struct Do<'a> {
    pub call: Spanned<Call<'a>>,
}

/// A "from" import.
#[derive(Debug)]
pub struct FromImport<'a> {
    pub expr: Expr<'a>,
    pub names: Vec<(Expr<'a>, Option<Expr<'a>>)>,
}

/// A full module import.
#[derive(Debug)]
pub struct Import<'a> {
    pub expr: Expr<'a>,
    pub name: Expr<'a>,
}

/// Continues a loop.
#[derive(Debug)]
pub struct Continue;

/// Breaks out of a loop.
#[derive(Debug)]
pub struct Break;

/// Outputs the expression.
#[derive(Debug)]
pub struct EmitExpr<'a> {
    pub expr: Expr<'a>,
}

/// Outputs raw template code.
///
/// The raw data is a `Cow` so that the optimizer can merge adjacent nodes
/// without copying in the common single-chunk case.
#[derive(Debug)]
pub struct EmitRaw<'a> {
    pub raw: Cow<'a, str>,
}

/// Looks up a variable.
#[derive(Debug)]
pub struct Var<'a> {
    pub id: &'a str,
}

/// Loads a constant.
#[derive(Debug)]
pub struct Const {
    pub value: Value,
}

/// Represents a slice.
#[derive(Debug)]
pub struct Slice<'a> {
    pub expr: Expr<'a>,
    pub start: Option<Expr<'a>>,
    pub stop: Option<Expr<'a>>,
    pub step: Option<Expr<'a>>,
}

/// A kind of unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Not,
    Neg,
}

/// An unary operator expression.
#[derive(Debug)]
pub struct UnaryOp<'a> {
    pub op: UnaryOpKind,
    pub expr: Expr<'a>,
}

/// A kind of binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    ScAnd,
    ScOr,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
    Concat,
    In,
}

/// A binary operator expression.
#[derive(Debug)]
pub struct BinOp<'a> {
    pub op: BinOpKind,
    pub left: Expr<'a>,
    pub right: Expr<'a>,
}

/// An if expression.
#[derive(Debug)]
pub struct IfExpr<'a> {
    pub test_expr: Expr<'a>,
    pub true_expr: Expr<'a>,
    pub false_expr: Option<Expr<'a>>,
}

/// A filter expression.
#[derive(Debug)]
pub struct Filter<'a> {
    pub name: &'a str,
    pub expr: Option<Expr<'a>>,
    pub args: Vec<CallArg<'a>>,
}

/// A test expression.
#[derive(Debug)]
pub struct Test<'a> {
    pub name: &'a str,
    pub expr: Expr<'a>,
    pub args: Vec<CallArg<'a>>,
}

/// An attribute lookup expression.
#[derive(Debug)]
pub struct GetAttr<'a> {
    pub expr: Expr<'a>,
    pub name: &'a str,
}

/// An item lookup expression.
#[derive(Debug)]
pub struct GetItem<'a> {
    pub expr: Expr<'a>,
    pub subscript_expr: Expr<'a>,
}

/// A call argument.
#[derive(Debug)]
pub enum CallArg<'a> {
    Pos(Expr<'a>),
    Kwarg(&'a str, Expr<'a>),
}

/// Calls something.
#[derive(Debug)]
pub struct Call<'a> {
    pub expr: Expr<'a>,
    pub args: Vec<CallArg<'a>>,
}

/// Defines the specific type of call.
#[derive(Debug)]
pub enum CallType<'ast, 'source> {
    Function(&'source str),
    Method(&'ast Expr<'source>, &'source str),
    Block(&'source str),
    Object(&'ast Expr<'source>),
}

impl<'a> Call<'a> {
    /// Try to isolate a method call.
    ///
    /// Name + call and attribute lookup + call are really method calls which
    /// are easier to handle for the evaluator as a separate thing.
    pub fn identify_call(&self) -> CallType<'_, 'a> {
        match self.expr {
            Expr::Var(ref var) => CallType::Function(var.id),
            Expr::GetAttr(ref attr) => {
                if let Expr::Var(ref var) = attr.expr {
                    if var.id == "self" {
                        return CallType::Block(attr.name);
                    }
                }
                CallType::Method(&attr.expr, attr.name)
            }
            _ => CallType::Object(&self.expr),
        }
    }
}

/// Creates a list of values.
#[derive(Debug)]
pub struct List<'a> {
    pub items: Vec<Expr<'a>>,
}

impl<'a> List<'a> {
    pub fn as_const(&self) -> Option<Value> {
        if !self.items.iter().all(|x| matches!(x, Expr::Const(_))) {
            return None;
        }

        let mut rv = Vec::new();
        for expr in &self.items {
            if let Expr::Const(val) = expr {
                rv.push(val.value.clone());
            }
        }

        Some(Value::from(rv))
    }
}

/// Creates a map of values.
#[derive(Debug)]
pub struct Map<'a> {
    pub keys: Vec<Expr<'a>>,
    pub values: Vec<Expr<'a>>,
}

impl<'a> Map<'a> {
    pub fn as_const(&self) -> Option<Value> {
        if !self.keys.iter().all(|x| matches!(x, Expr::Const(_)))
            || !self.values.iter().all(|x| matches!(x, Expr::Const(_)))
        {
            return None;
        }

        let mut rv = crate::value::ValueMap::new();
        for (key, value) in self.keys.iter().zip(self.values.iter()) {
            if let (Expr::Const(key), Expr::Const(value)) = (key, value) {
                rv.insert(key.value.to_string(), value.value.clone());
            }
        }

        Some(Value::from_map(rv))
    }
}
