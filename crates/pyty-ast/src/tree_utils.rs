//! Pure predicates and queries over the parse tree.
//!
//! Every query is a single bounded walk up or down the tree; nothing here
//! mutates the arena or consults a cache. These are consumed by the
//! narrowing engine, the constraint solver's callers, and the surrounding
//! checker.

use pyty_common::{Atom, Span};

use crate::arena::{NodeArena, NodeIndex, NodeKind, ScopeKinds, UnaryOperator};

/// Nearest ancestor whose kind is in `kinds`. The starting node itself is
/// not considered.
///
/// A decorator is not "inside" the function or class it decorates: when
/// the walk enters a `Function`/`Class` from one of its decorator
/// children, that scope is skipped.
pub fn enclosing_scope(arena: &NodeArena, node: NodeIndex, kinds: ScopeKinds) -> Option<NodeIndex> {
    let mut child = node;
    let mut current = arena.parent(node);
    while current.is_some() {
        let node_ref = arena.get(current)?;
        if let Some(kind) = node_ref.kind.scope_kind() {
            if kinds.contains(kind) && !is_decorator_of(arena, current, child) {
                return Some(current);
            }
        }
        child = current;
        current = node_ref.parent;
    }
    None
}

pub fn enclosing_function(arena: &NodeArena, node: NodeIndex) -> Option<NodeIndex> {
    enclosing_scope(arena, node, ScopeKinds::FUNCTION)
}

pub fn enclosing_lambda(arena: &NodeArena, node: NodeIndex) -> Option<NodeIndex> {
    enclosing_scope(arena, node, ScopeKinds::LAMBDA)
}

pub fn enclosing_class(arena: &NodeArena, node: NodeIndex) -> Option<NodeIndex> {
    enclosing_scope(arena, node, ScopeKinds::CLASS)
}

pub fn enclosing_module(arena: &NodeArena, node: NodeIndex) -> Option<NodeIndex> {
    enclosing_scope(arena, node, ScopeKinds::MODULE)
}

pub fn enclosing_comprehension(arena: &NodeArena, node: NodeIndex) -> Option<NodeIndex> {
    enclosing_scope(arena, node, ScopeKinds::COMPREHENSION)
}

/// Nearest scope that can own type variables: a function or class, never a
/// lambda or comprehension.
pub fn enclosing_type_var_scope(arena: &NodeArena, node: NodeIndex) -> Option<NodeIndex> {
    enclosing_scope(arena, node, ScopeKinds::FUNCTION | ScopeKinds::CLASS)
}

fn is_decorator_of(arena: &NodeArena, scope: NodeIndex, child: NodeIndex) -> bool {
    match arena.kind(scope) {
        Some(NodeKind::Function { decorators, .. }) | Some(NodeKind::Class { decorators, .. }) => {
            decorators.contains(&child)
        }
        _ => false,
    }
}

/// The lexical scope whose symbol table resolves free references at
/// `node`.
///
/// The iterable of the outermost `for` clause of a comprehension is
/// evaluated in the scope *enclosing* the comprehension (the
/// comprehension-leakage rule); everything else inside a comprehension
/// resolves in the comprehension scope.
pub fn evaluation_scope(arena: &NodeArena, node: NodeIndex) -> Option<NodeIndex> {
    let mut child = node;
    let mut current = arena.parent(node);
    while current.is_some() {
        let node_ref = arena.get(current)?;
        match &node_ref.kind {
            NodeKind::ListComprehension { clauses, .. } => {
                if !is_outermost_iterable(arena, clauses, child, node) {
                    return Some(current);
                }
                // Leaked iterable: keep climbing past the comprehension.
            }
            kind if kind.scope_kind().is_some() => {
                if !is_decorator_of(arena, current, child) {
                    return Some(current);
                }
            }
            _ => {}
        }
        child = current;
        current = node_ref.parent;
    }
    None
}

/// Like [`evaluation_scope`], but class bodies are transparent: code in a
/// class body executes in the enclosing function or module frame.
pub fn execution_scope(arena: &NodeArena, node: NodeIndex) -> Option<NodeIndex> {
    let mut scope = evaluation_scope(arena, node)?;
    while let Some(NodeKind::Class { .. }) = arena.kind(scope) {
        scope = evaluation_scope(arena, scope)?;
    }
    Some(scope)
}

fn is_outermost_iterable(
    arena: &NodeArena,
    clauses: &[NodeIndex],
    child_of_comprehension: NodeIndex,
    origin: NodeIndex,
) -> bool {
    let Some(&first) = clauses.first() else {
        return false;
    };
    if first != child_of_comprehension {
        return false;
    }
    let Some(NodeKind::ComprehensionFor { iterable, .. }) = arena.kind(first) else {
        return false;
    };
    // `origin` must sit inside the iterable, not the target.
    let mut current = origin;
    while current.is_some() {
        if current == *iterable {
            return true;
        }
        if current == first {
            return false;
        }
        current = arena.parent(current);
    }
    false
}

/// The key forms an `Index` reference expression may use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IndexKey {
    Int(i64),
    Str(Atom),
}

fn index_key(arena: &NodeArena, node: NodeIndex) -> Option<IndexKey> {
    match arena.kind(node)? {
        NodeKind::Number(value) => Some(IndexKey::Int(*value)),
        NodeKind::Str(atom) => Some(IndexKey::Str(*atom)),
        NodeKind::UnaryOp {
            op: UnaryOperator::Minus,
            operand,
        } => match arena.kind(*operand)? {
            NodeKind::Number(value) => Some(IndexKey::Int(-value)),
            _ => None,
        },
        _ => None,
    }
}

/// Structural equality over the reference-expression grammar: `Name`,
/// `MemberAccess`, and `Index` with an integer-literal, negated
/// integer-literal, or string-literal subscript. Any other index shape is
/// non-matching.
pub fn is_matching_expression(arena: &NodeArena, reference: NodeIndex, candidate: NodeIndex) -> bool {
    match (arena.kind(reference), arena.kind(candidate)) {
        (Some(NodeKind::Name(a)), Some(NodeKind::Name(b))) => a == b,
        (
            Some(NodeKind::MemberAccess {
                receiver: recv_a,
                member: member_a,
            }),
            Some(NodeKind::MemberAccess {
                receiver: recv_b,
                member: member_b,
            }),
        ) => member_a == member_b && is_matching_expression(arena, *recv_a, *recv_b),
        (
            Some(NodeKind::Index {
                base: base_a,
                index: index_a,
            }),
            Some(NodeKind::Index {
                base: base_b,
                index: index_b,
            }),
        ) => {
            let (Some(key_a), Some(key_b)) = (index_key(arena, *index_a), index_key(arena, *index_b))
            else {
                return false;
            };
            key_a == key_b && is_matching_expression(arena, *base_a, *base_b)
        }
        _ => false,
    }
}

/// True when `candidate` is a strict prefix of `reference` under
/// member-access / index chains: `a.b` partially matches `a.b.c` and
/// `a.b[0]`, but not itself.
pub fn is_partial_matching_expression(
    arena: &NodeArena,
    reference: NodeIndex,
    candidate: NodeIndex,
) -> bool {
    let mut current = reference;
    loop {
        current = match arena.kind(current) {
            Some(NodeKind::MemberAccess { receiver, .. }) => *receiver,
            Some(NodeKind::Index { base, .. }) => *base,
            _ => return false,
        };
        if is_matching_expression(arena, current, candidate) {
            return true;
        }
    }
}

/// Whether this `Name` node occupies a binding (write) position.
pub fn is_write_access(arena: &NodeArena, name: NodeIndex) -> bool {
    if !matches!(arena.kind(name), Some(NodeKind::Name(_))) {
        return false;
    }
    let mut child = name;
    let mut current = arena.parent(name);
    while current.is_some() {
        match arena.kind(current) {
            // Tuple/list unpacking keeps the walk going; the tuple itself
            // may be the binding target.
            Some(NodeKind::TupleExpr(_)) | Some(NodeKind::ListExpr(_)) => {}
            Some(NodeKind::Assignment { target, .. })
            | Some(NodeKind::AnnotatedAssignment { target, .. })
            | Some(NodeKind::AugAssignment { target, .. })
            | Some(NodeKind::AssignmentExpr { target, .. }) => return *target == child,
            Some(NodeKind::For { target, .. }) | Some(NodeKind::ComprehensionFor { target, .. }) => {
                return *target == child
            }
            Some(NodeKind::ExceptHandler { name: as_name, .. }) => return *as_name == Some(child),
            Some(NodeKind::WithItem { target, .. }) => return *target == Some(child),
            Some(NodeKind::Del { targets }) => return targets.contains(&child),
            Some(NodeKind::ImportAs { alias, .. }) => return *alias == child,
            _ => return false,
        }
        child = current;
        current = arena.parent(current);
    }
    false
}

/// Whether `stmt` is the docstring of its enclosing module, class, or
/// function: the first body statement, and a plain string expression.
pub fn is_docstring(arena: &NodeArena, stmt: NodeIndex) -> bool {
    let Some(NodeKind::ExpressionStmt { value }) = arena.kind(stmt) else {
        return false;
    };
    if !matches!(arena.kind(*value), Some(NodeKind::Str(_))) {
        return false;
    }
    let body = match arena.kind(arena.parent(stmt)) {
        Some(NodeKind::Module { body })
        | Some(NodeKind::Function { body, .. })
        | Some(NodeKind::Class { body, .. }) => body,
        _ => return false,
    };
    body.first() == Some(&stmt)
}

/// Source range of a statement, widened to cover its decorators.
pub fn statement_range(arena: &NodeArena, stmt: NodeIndex) -> Span {
    let mut span = arena.span(stmt);
    let decorators = match arena.kind(stmt) {
        Some(NodeKind::Function { decorators, .. }) | Some(NodeKind::Class { decorators, .. }) => {
            decorators.as_slice()
        }
        _ => &[],
    };
    for &decorator in decorators {
        let decorator_span = arena.span(decorator);
        if !decorator_span.is_dummy() {
            span = span.merge(decorator_span);
        }
    }
    span
}

/// Decompose `a.b.c` into `[a, b, c]`. Returns `None` for anything other
/// than a `Name` or a member-access chain over names.
pub fn dotted_name(arena: &NodeArena, expr: NodeIndex) -> Option<Vec<Atom>> {
    match arena.kind(expr)? {
        NodeKind::Name(atom) => Some(vec![*atom]),
        NodeKind::MemberAccess { receiver, member } => {
            let mut parts = dotted_name(arena, *receiver)?;
            parts.push(*member);
            Some(parts)
        }
        _ => None,
    }
}

/// Whether `expr` spells exactly the dotted name `parts`.
pub fn dotted_name_matches(arena: &NodeArena, expr: NodeIndex, parts: &[&str]) -> bool {
    let Some(atoms) = dotted_name(arena, expr) else {
        return false;
    };
    atoms.len() == parts.len()
        && atoms
            .iter()
            .zip(parts)
            .all(|(atom, part)| &*arena.interner.resolve(*atom) == *part)
}

/// Map a byte offset within a call expression to the zero-based index of
/// the argument under the cursor. The `bool` is true when the offset sits
/// past every argument and the index addresses a not-yet-written ("fake")
/// trailing argument.
pub fn call_argument_at_offset(
    arena: &NodeArena,
    call: NodeIndex,
    offset: u32,
) -> Option<(usize, bool)> {
    let NodeKind::Call { args, .. } = arena.kind(call)? else {
        return None;
    };
    if !arena.span(call).contains(offset) {
        return None;
    }
    for (i, &arg) in args.iter().enumerate() {
        // An offset in the gap before an argument addresses that argument.
        if offset <= arena.span(arg).end {
            return Some((i, false));
        }
    }
    Some((args.len(), true))
}

/// Whether `node` sits inside a type-annotation context: a parameter
/// annotation, an annotated-assignment annotation, or a function return
/// annotation.
pub fn is_within_annotation(arena: &NodeArena, node: NodeIndex) -> bool {
    let mut child = node;
    let mut current = arena.parent(node);
    while current.is_some() {
        match arena.kind(current) {
            Some(NodeKind::Parameter { annotation, .. }) => return *annotation == Some(child),
            Some(NodeKind::AnnotatedAssignment { annotation, .. }) => return *annotation == child,
            Some(NodeKind::Function {
                return_annotation, ..
            }) => return *return_annotation == Some(child),
            Some(kind) if kind.scope_kind().is_some() => return false,
            _ => {}
        }
        child = current;
        current = arena.parent(current);
    }
    false
}

/// The statement that contains `node`, within the body of its evaluation
/// scope. Used by alias-condition narrowing to order statements.
pub fn enclosing_statement(arena: &NodeArena, node: NodeIndex) -> Option<NodeIndex> {
    let mut current = node;
    while current.is_some() {
        if arena
            .kind(current)
            .is_some_and(NodeKind::is_statement)
        {
            return Some(current);
        }
        current = arena.parent(current);
    }
    None
}

#[cfg(test)]
#[path = "tests/tree_utils_tests.rs"]
mod tests;
