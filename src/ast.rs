pub mod estree;
pub mod ops;

use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::ast::ops::{AssignOp, BinaryOp, LogicalOp, UnaryOp, UpdateOp};

/// Shared handle to an AST node. Children are `NodeRef`s so continuations,
/// closures and exception packets can hold onto subtrees without copying them.
pub type NodeRef = Rc<Node>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Node {
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<Loc>,
}

impl Node {
    pub fn new(kind: NodeKind) -> NodeRef {
        Rc::new(Node { kind, loc: None })
    }

    pub fn with_loc(kind: NodeKind, loc: Option<Loc>) -> NodeRef {
        Rc::new(Node { kind, loc })
    }

    /// The surface name of the node kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    /// The function payload of `FunctionExpression`, `FunctionDeclaration` and
    /// `ArrowFunctionExpression` nodes.
    pub fn function(&self) -> Option<&FunctionNode> {
        match &self.kind {
            NodeKind::FunctionExpression(f)
            | NodeKind::FunctionDeclaration(f)
            | NodeKind::ArrowFunctionExpression(f) => Some(f),
            _ => None,
        }
    }
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Program { .. } => "Program",
            NodeKind::Literal { .. } => "Literal",
            NodeKind::Identifier { .. } => "Identifier",
            NodeKind::ThisExpression => "ThisExpression",
            NodeKind::BinaryExpression { .. } => "BinaryExpression",
            NodeKind::LogicalExpression { .. } => "LogicalExpression",
            NodeKind::UnaryExpression { .. } => "UnaryExpression",
            NodeKind::UpdateExpression { .. } => "UpdateExpression",
            NodeKind::AssignmentExpression { .. } => "AssignmentExpression",
            NodeKind::MemberExpression { .. } => "MemberExpression",
            NodeKind::CallExpression { .. } => "CallExpression",
            NodeKind::NewExpression { .. } => "NewExpression",
            NodeKind::ArrayExpression { .. } => "ArrayExpression",
            NodeKind::ObjectExpression { .. } => "ObjectExpression",
            NodeKind::FunctionExpression(_) => "FunctionExpression",
            NodeKind::FunctionDeclaration(_) => "FunctionDeclaration",
            NodeKind::ArrowFunctionExpression(_) => "ArrowFunctionExpression",
            NodeKind::BlockStatement { .. } => "BlockStatement",
            NodeKind::ExpressionStatement { .. } => "ExpressionStatement",
            NodeKind::VariableDeclaration { .. } => "VariableDeclaration",
            NodeKind::VariableDeclarator { .. } => "VariableDeclarator",
            NodeKind::IfStatement { .. } => "IfStatement",
            NodeKind::ConditionalExpression { .. } => "ConditionalExpression",
            NodeKind::WhileStatement { .. } => "WhileStatement",
            NodeKind::DoWhileStatement { .. } => "DoWhileStatement",
            NodeKind::ForStatement { .. } => "ForStatement",
            NodeKind::ForOfStatement { .. } => "ForOfStatement",
            NodeKind::ForInStatement { .. } => "ForInStatement",
            NodeKind::BreakStatement { .. } => "BreakStatement",
            NodeKind::ContinueStatement { .. } => "ContinueStatement",
            NodeKind::ReturnStatement { .. } => "ReturnStatement",
            NodeKind::ThrowStatement { .. } => "ThrowStatement",
            NodeKind::TryStatement { .. } => "TryStatement",
            NodeKind::CatchClause { .. } => "CatchClause",
            NodeKind::Unknown { .. } => "Unknown",
        }
    }
}

/// The closed set of node kinds the evaluator understands. The post-parse
/// validator in [`estree`] maps anything else onto `Unknown`, which fails
/// explicitly at evaluation time.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    Program {
        body: Vec<NodeRef>,
    },
    Literal {
        value: LiteralValue,
    },
    Identifier {
        name: String,
    },
    ThisExpression,
    BinaryExpression {
        operator: BinaryOp,
        left: NodeRef,
        right: NodeRef,
    },
    LogicalExpression {
        operator: LogicalOp,
        left: NodeRef,
        right: NodeRef,
    },
    UnaryExpression {
        operator: UnaryOp,
        argument: NodeRef,
    },
    UpdateExpression {
        operator: UpdateOp,
        prefix: bool,
        argument: NodeRef,
    },
    AssignmentExpression {
        operator: AssignOp,
        left: NodeRef,
        right: NodeRef,
    },
    MemberExpression {
        object: NodeRef,
        property: NodeRef,
        computed: bool,
    },
    CallExpression {
        callee: NodeRef,
        arguments: Vec<NodeRef>,
    },
    NewExpression {
        callee: NodeRef,
        arguments: Vec<NodeRef>,
    },
    ArrayExpression {
        /// `None` marks an elision; it evaluates to `undefined`.
        elements: Vec<Option<NodeRef>>,
    },
    ObjectExpression {
        properties: Vec<Property>,
    },
    FunctionExpression(FunctionNode),
    FunctionDeclaration(FunctionNode),
    ArrowFunctionExpression(FunctionNode),
    BlockStatement {
        body: Vec<NodeRef>,
    },
    ExpressionStatement {
        expression: NodeRef,
    },
    VariableDeclaration {
        kind: String,
        declarations: Vec<NodeRef>,
    },
    VariableDeclarator {
        id: Pattern,
        init: Option<NodeRef>,
    },
    IfStatement {
        test: NodeRef,
        consequent: NodeRef,
        alternate: Option<NodeRef>,
    },
    ConditionalExpression {
        test: NodeRef,
        consequent: NodeRef,
        alternate: NodeRef,
    },
    WhileStatement {
        test: NodeRef,
        body: NodeRef,
    },
    DoWhileStatement {
        body: NodeRef,
        test: NodeRef,
    },
    ForStatement {
        init: Option<NodeRef>,
        test: Option<NodeRef>,
        update: Option<NodeRef>,
        body: NodeRef,
    },
    ForOfStatement {
        left: NodeRef,
        right: NodeRef,
        body: NodeRef,
    },
    ForInStatement {
        left: NodeRef,
        right: NodeRef,
        body: NodeRef,
    },
    BreakStatement {
        label: Option<String>,
    },
    ContinueStatement {
        label: Option<String>,
    },
    ReturnStatement {
        argument: Option<NodeRef>,
    },
    ThrowStatement {
        argument: NodeRef,
    },
    TryStatement {
        block: NodeRef,
        handler: Option<NodeRef>,
        finalizer: Option<NodeRef>,
    },
    CatchClause {
        param: Option<Pattern>,
        body: NodeRef,
    },
    Unknown {
        kind: String,
    },
}

/// Shared payload of the three function node kinds.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunctionNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub params: Vec<Pattern>,
    pub body: NodeRef,
}

/// Binding patterns in parameter and declarator position. Only plain
/// identifiers and a trailing rest element are bindable; everything else is
/// carried as `Unsupported` and rejected when an invocation reaches it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Pattern {
    Identifier { name: String },
    RestElement { argument: Box<Pattern> },
    Unsupported { kind: String },
}

/// One `key: value` entry of an object literal.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Property {
    pub key: NodeRef,
    pub value: NodeRef,
    pub computed: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Loc {
    pub start: Pos,
    pub end: Pos,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.start.line, self.start.column)
    }
}
