//! Arena storage for parse-tree nodes.
//!
//! Index-based nodes with parent pointers instead of shared ownership:
//! the parent/child graph is cyclic, and integer indices keep nodes
//! `Copy`-cheap to pass around.

use pyty_common::{Atom, Interner, Span};
use serde::Serialize;

/// Index into the node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    pub const NONE: NodeIndex = NodeIndex(u32::MAX);

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    #[inline]
    pub fn is_some(self) -> bool {
        self.0 != u32::MAX
    }
}

/// Argument category at a call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgCategory {
    Simple,
    UnpackedList,
    UnpackedDict,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Is,
    IsNot,
    Equals,
    NotEquals,
    In,
    NotIn,
    And,
    Or,
    Add,
    Subtract,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstantKind {
    None,
    True,
    False,
}

/// Node payload. Child links are `NodeIndex` values into the same arena.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    // Expressions
    Name(Atom),
    MemberAccess {
        receiver: NodeIndex,
        member: Atom,
    },
    Index {
        base: NodeIndex,
        index: NodeIndex,
    },
    Call {
        callee: NodeIndex,
        args: Vec<NodeIndex>,
    },
    Argument {
        category: ArgCategory,
        name: Option<Atom>,
        value: NodeIndex,
    },
    BinaryOp {
        op: BinaryOperator,
        left: NodeIndex,
        right: NodeIndex,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: NodeIndex,
    },
    Number(i64),
    Str(Atom),
    Bytes(Atom),
    Constant(ConstantKind),
    TupleExpr(Vec<NodeIndex>),
    ListExpr(Vec<NodeIndex>),
    /// Walrus: `target := value`.
    AssignmentExpr {
        target: NodeIndex,
        value: NodeIndex,
    },

    // Statements
    Assignment {
        target: NodeIndex,
        value: NodeIndex,
    },
    AnnotatedAssignment {
        target: NodeIndex,
        annotation: NodeIndex,
        value: Option<NodeIndex>,
    },
    AugAssignment {
        target: NodeIndex,
        op: BinaryOperator,
        value: NodeIndex,
    },
    Del {
        targets: Vec<NodeIndex>,
    },
    Return {
        value: Option<NodeIndex>,
    },
    ExpressionStmt {
        value: NodeIndex,
    },
    If {
        test: NodeIndex,
        body: Vec<NodeIndex>,
        orelse: Vec<NodeIndex>,
    },
    /// `import module as alias`; `alias` is a `Name` node and a binding.
    ImportAs {
        module: Vec<Atom>,
        alias: NodeIndex,
    },

    // Scope-bearing nodes
    Module {
        body: Vec<NodeIndex>,
    },
    Function {
        name: Atom,
        params: Vec<NodeIndex>,
        return_annotation: Option<NodeIndex>,
        decorators: Vec<NodeIndex>,
        body: Vec<NodeIndex>,
    },
    Lambda {
        params: Vec<NodeIndex>,
        expr: NodeIndex,
    },
    Class {
        name: Atom,
        bases: Vec<NodeIndex>,
        decorators: Vec<NodeIndex>,
        body: Vec<NodeIndex>,
    },
    ListComprehension {
        element: NodeIndex,
        clauses: Vec<NodeIndex>,
    },
    ComprehensionFor {
        target: NodeIndex,
        iterable: NodeIndex,
    },
    ComprehensionIf {
        test: NodeIndex,
    },
    Parameter {
        name: Atom,
        category: ArgCategory,
        annotation: Option<NodeIndex>,
        default: Option<NodeIndex>,
    },

    // Other binding constructs
    For {
        target: NodeIndex,
        iterable: NodeIndex,
        body: Vec<NodeIndex>,
    },
    Try {
        body: Vec<NodeIndex>,
        handlers: Vec<NodeIndex>,
        orelse: Vec<NodeIndex>,
        finally: Vec<NodeIndex>,
    },
    ExceptHandler {
        exc_type: Option<NodeIndex>,
        name: Option<NodeIndex>,
        body: Vec<NodeIndex>,
    },
    With {
        items: Vec<NodeIndex>,
        body: Vec<NodeIndex>,
    },
    WithItem {
        context: NodeIndex,
        target: Option<NodeIndex>,
    },
}

bitflags::bitflags! {
    /// Scope kinds accepted by `tree_utils::enclosing_scope`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ScopeKinds: u8 {
        const FUNCTION      = 1 << 0;
        const LAMBDA        = 1 << 1;
        const CLASS         = 1 << 2;
        const MODULE        = 1 << 3;
        const COMPREHENSION = 1 << 4;
    }
}

impl NodeKind {
    pub fn scope_kind(&self) -> Option<ScopeKinds> {
        match self {
            NodeKind::Function { .. } => Some(ScopeKinds::FUNCTION),
            NodeKind::Lambda { .. } => Some(ScopeKinds::LAMBDA),
            NodeKind::Class { .. } => Some(ScopeKinds::CLASS),
            NodeKind::Module { .. } => Some(ScopeKinds::MODULE),
            NodeKind::ListComprehension { .. } => Some(ScopeKinds::COMPREHENSION),
            _ => None,
        }
    }

    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            NodeKind::Assignment { .. }
                | NodeKind::AnnotatedAssignment { .. }
                | NodeKind::AugAssignment { .. }
                | NodeKind::Del { .. }
                | NodeKind::Return { .. }
                | NodeKind::ExpressionStmt { .. }
                | NodeKind::If { .. }
                | NodeKind::ImportAs { .. }
                | NodeKind::Function { .. }
                | NodeKind::Class { .. }
                | NodeKind::For { .. }
                | NodeKind::Try { .. }
                | NodeKind::With { .. }
        )
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub parent: NodeIndex,
}

/// Arena of parse-tree nodes plus the shared string interner.
///
/// Constructor methods allocate a node and wire up the parent pointers of
/// the children passed in; trees are therefore built bottom-up.
#[derive(Clone, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
    pub interner: Interner,
}

impl NodeArena {
    pub fn new(interner: Interner) -> Self {
        NodeArena {
            nodes: Vec::new(),
            interner,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: NodeIndex) -> Option<&Node> {
        if index.is_none() {
            return None;
        }
        self.nodes.get(index.0 as usize)
    }

    pub fn kind(&self, index: NodeIndex) -> Option<&NodeKind> {
        self.get(index).map(|node| &node.kind)
    }

    pub fn span(&self, index: NodeIndex) -> Span {
        self.get(index).map_or(Span::dummy(), |node| node.span)
    }

    pub fn parent(&self, index: NodeIndex) -> NodeIndex {
        self.get(index).map_or(NodeIndex::NONE, |node| node.parent)
    }

    /// Allocate a node, claiming every child listed in its payload.
    pub fn alloc(&mut self, kind: NodeKind, span: Span) -> NodeIndex {
        let index = NodeIndex(self.nodes.len() as u32);
        let children = Self::children_of(&kind);
        self.nodes.push(Node {
            kind,
            span,
            parent: NodeIndex::NONE,
        });
        for child in children {
            self.set_parent(child, index);
        }
        index
    }

    /// Re-point a child's parent. Used when composing trees by hand.
    pub fn attach(&mut self, child: NodeIndex, parent: NodeIndex) {
        self.set_parent(child, parent);
    }

    /// Direct children of a node, in payload order.
    pub fn children(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.kind(index).map_or_else(Vec::new, Self::children_of)
    }

    fn set_parent(&mut self, child: NodeIndex, parent: NodeIndex) {
        if let Some(node) = self.nodes.get_mut(child.0 as usize) {
            node.parent = parent;
        }
    }

    fn children_of(kind: &NodeKind) -> Vec<NodeIndex> {
        let mut children = Vec::new();
        let mut push = |index: NodeIndex| {
            if index.is_some() {
                children.push(index);
            }
        };
        match kind {
            NodeKind::Name(_)
            | NodeKind::Number(_)
            | NodeKind::Str(_)
            | NodeKind::Bytes(_)
            | NodeKind::Constant(_) => {}
            NodeKind::MemberAccess { receiver, .. } => push(*receiver),
            NodeKind::Index { base, index } => {
                push(*base);
                push(*index);
            }
            NodeKind::Call { callee, args } => {
                push(*callee);
                args.iter().copied().for_each(&mut push);
            }
            NodeKind::Argument { value, .. } => push(*value),
            NodeKind::BinaryOp { left, right, .. } => {
                push(*left);
                push(*right);
            }
            NodeKind::UnaryOp { operand, .. } => push(*operand),
            NodeKind::TupleExpr(items) | NodeKind::ListExpr(items) => {
                items.iter().copied().for_each(&mut push);
            }
            NodeKind::AssignmentExpr { target, value }
            | NodeKind::Assignment { target, value } => {
                push(*target);
                push(*value);
            }
            NodeKind::AnnotatedAssignment {
                target,
                annotation,
                value,
            } => {
                push(*target);
                push(*annotation);
                value.iter().copied().for_each(&mut push);
            }
            NodeKind::AugAssignment { target, value, .. } => {
                push(*target);
                push(*value);
            }
            NodeKind::Del { targets } => targets.iter().copied().for_each(&mut push),
            NodeKind::Return { value } => value.iter().copied().for_each(&mut push),
            NodeKind::ExpressionStmt { value } => push(*value),
            NodeKind::If { test, body, orelse } => {
                push(*test);
                body.iter().copied().for_each(&mut push);
                orelse.iter().copied().for_each(&mut push);
            }
            NodeKind::ImportAs { alias, .. } => push(*alias),
            NodeKind::Module { body } => body.iter().copied().for_each(&mut push),
            NodeKind::Function {
                params,
                return_annotation,
                decorators,
                body,
                ..
            } => {
                params.iter().copied().for_each(&mut push);
                return_annotation.iter().copied().for_each(&mut push);
                decorators.iter().copied().for_each(&mut push);
                body.iter().copied().for_each(&mut push);
            }
            NodeKind::Lambda { params, expr } => {
                params.iter().copied().for_each(&mut push);
                push(*expr);
            }
            NodeKind::Class {
                bases,
                decorators,
                body,
                ..
            } => {
                bases.iter().copied().for_each(&mut push);
                decorators.iter().copied().for_each(&mut push);
                body.iter().copied().for_each(&mut push);
            }
            NodeKind::ListComprehension { element, clauses } => {
                push(*element);
                clauses.iter().copied().for_each(&mut push);
            }
            NodeKind::ComprehensionFor { target, iterable } => {
                push(*target);
                push(*iterable);
            }
            NodeKind::ComprehensionIf { test } => push(*test),
            NodeKind::Parameter {
                annotation, default, ..
            } => {
                annotation.iter().copied().for_each(&mut push);
                default.iter().copied().for_each(&mut push);
            }
            NodeKind::For {
                target,
                iterable,
                body,
            } => {
                push(*target);
                push(*iterable);
                body.iter().copied().for_each(&mut push);
            }
            NodeKind::Try {
                body,
                handlers,
                orelse,
                finally,
            } => {
                body.iter().copied().for_each(&mut push);
                handlers.iter().copied().for_each(&mut push);
                orelse.iter().copied().for_each(&mut push);
                finally.iter().copied().for_each(&mut push);
            }
            NodeKind::ExceptHandler {
                exc_type,
                name,
                body,
            } => {
                exc_type.iter().copied().for_each(&mut push);
                name.iter().copied().for_each(&mut push);
                body.iter().copied().for_each(&mut push);
            }
            NodeKind::With { items, body } => {
                items.iter().copied().for_each(&mut push);
                body.iter().copied().for_each(&mut push);
            }
            NodeKind::WithItem { context, target } => {
                push(*context);
                target.iter().copied().for_each(&mut push);
            }
        }
        children
    }

    // Convenience constructors. Spans default to dummy; tests that need
    // offsets (statement ranges, active arguments) pass explicit spans
    // through `alloc`.

    pub fn name(&mut self, text: &str) -> NodeIndex {
        let atom = self.interner.intern(text);
        self.alloc(NodeKind::Name(atom), Span::dummy())
    }

    pub fn member(&mut self, receiver: NodeIndex, member: &str) -> NodeIndex {
        let atom = self.interner.intern(member);
        self.alloc(
            NodeKind::MemberAccess {
                receiver,
                member: atom,
            },
            Span::dummy(),
        )
    }

    pub fn index(&mut self, base: NodeIndex, index: NodeIndex) -> NodeIndex {
        self.alloc(NodeKind::Index { base, index }, Span::dummy())
    }

    pub fn number(&mut self, value: i64) -> NodeIndex {
        self.alloc(NodeKind::Number(value), Span::dummy())
    }

    pub fn string(&mut self, text: &str) -> NodeIndex {
        let atom = self.interner.intern(text);
        self.alloc(NodeKind::Str(atom), Span::dummy())
    }

    pub fn constant(&mut self, kind: ConstantKind) -> NodeIndex {
        self.alloc(NodeKind::Constant(kind), Span::dummy())
    }

    pub fn none(&mut self) -> NodeIndex {
        self.constant(ConstantKind::None)
    }

    pub fn unary(&mut self, op: UnaryOperator, operand: NodeIndex) -> NodeIndex {
        self.alloc(NodeKind::UnaryOp { op, operand }, Span::dummy())
    }

    pub fn binary(&mut self, op: BinaryOperator, left: NodeIndex, right: NodeIndex) -> NodeIndex {
        self.alloc(NodeKind::BinaryOp { op, left, right }, Span::dummy())
    }

    pub fn call(&mut self, callee: NodeIndex, arg_values: Vec<NodeIndex>) -> NodeIndex {
        let args = arg_values
            .into_iter()
            .map(|value| {
                self.alloc(
                    NodeKind::Argument {
                        category: ArgCategory::Simple,
                        name: None,
                        value,
                    },
                    Span::dummy(),
                )
            })
            .collect();
        self.alloc(NodeKind::Call { callee, args }, Span::dummy())
    }

    pub fn call_name(&mut self, callee: &str, arg_values: Vec<NodeIndex>) -> NodeIndex {
        let callee = self.name(callee);
        self.call(callee, arg_values)
    }

    pub fn walrus(&mut self, target: NodeIndex, value: NodeIndex) -> NodeIndex {
        self.alloc(NodeKind::AssignmentExpr { target, value }, Span::dummy())
    }

    pub fn assign(&mut self, target: NodeIndex, value: NodeIndex) -> NodeIndex {
        self.alloc(NodeKind::Assignment { target, value }, Span::dummy())
    }

    pub fn expr_stmt(&mut self, value: NodeIndex) -> NodeIndex {
        self.alloc(NodeKind::ExpressionStmt { value }, Span::dummy())
    }

    pub fn tuple_expr(&mut self, items: Vec<NodeIndex>) -> NodeIndex {
        self.alloc(NodeKind::TupleExpr(items), Span::dummy())
    }

    pub fn list_expr(&mut self, items: Vec<NodeIndex>) -> NodeIndex {
        self.alloc(NodeKind::ListExpr(items), Span::dummy())
    }

    pub fn module(&mut self, body: Vec<NodeIndex>) -> NodeIndex {
        self.alloc(NodeKind::Module { body }, Span::dummy())
    }
}
