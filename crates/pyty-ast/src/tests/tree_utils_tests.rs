use pyty_common::Span;

use crate::arena::{ArgCategory, ConstantKind, NodeArena, NodeIndex, NodeKind, ScopeKinds};
use crate::tree_utils::*;

fn arena() -> NodeArena {
    NodeArena::default()
}

#[test]
fn matching_names() {
    let mut arena = arena();
    let a = arena.name("x");
    let b = arena.name("x");
    let c = arena.name("y");
    assert!(is_matching_expression(&arena, a, b));
    assert!(!is_matching_expression(&arena, a, c));
}

#[test]
fn matching_member_chains() {
    let mut arena = arena();
    let recv_a = arena.name("x");
    let a = arena.member(recv_a, "kind");
    let recv_b = arena.name("x");
    let b = arena.member(recv_b, "kind");
    let recv_c = arena.name("x");
    let c = arena.member(recv_c, "value");
    assert!(is_matching_expression(&arena, a, b));
    assert!(!is_matching_expression(&arena, a, c));
}

#[test]
fn matching_index_forms() {
    let mut arena = arena();

    let base = arena.name("t");
    let zero = arena.number(0);
    let a = arena.index(base, zero);

    let base = arena.name("t");
    let zero = arena.number(0);
    let b = arena.index(base, zero);

    let base = arena.name("t");
    let one = arena.number(1);
    let c = arena.index(base, one);

    assert!(is_matching_expression(&arena, a, b));
    assert!(!is_matching_expression(&arena, a, c));
}

#[test]
fn matching_negative_index() {
    let mut arena = arena();

    let base = arena.name("t");
    let one = arena.number(1);
    let neg = arena.unary(crate::arena::UnaryOperator::Minus, one);
    let a = arena.index(base, neg);

    let base = arena.name("t");
    let one = arena.number(1);
    let neg = arena.unary(crate::arena::UnaryOperator::Minus, one);
    let b = arena.index(base, neg);

    assert!(is_matching_expression(&arena, a, b));
}

#[test]
fn non_literal_index_never_matches() {
    let mut arena = arena();
    let base = arena.name("t");
    let i = arena.name("i");
    let a = arena.index(base, i);
    let base = arena.name("t");
    let i = arena.name("i");
    let b = arena.index(base, i);
    assert!(!is_matching_expression(&arena, a, b));
}

#[test]
fn string_key_index_matches() {
    let mut arena = arena();
    let base = arena.name("d");
    let key = arena.string("director");
    let a = arena.index(base, key);
    let base = arena.name("d");
    let key = arena.string("director");
    let b = arena.index(base, key);
    assert!(is_matching_expression(&arena, a, b));
}

#[test]
fn partial_matching_is_strict_prefix() {
    let mut arena = arena();
    let x = arena.name("x");
    let xb = arena.member(x, "b");
    let xbc = arena.member(xb, "c");

    let candidate_x = arena.name("x");
    let candidate_recv = arena.name("x");
    let candidate_xb = arena.member(candidate_recv, "b");

    assert!(is_partial_matching_expression(&arena, xbc, candidate_x));
    assert!(is_partial_matching_expression(&arena, xbc, candidate_xb));
    // Not a *strict* prefix of itself.
    let full_recv = arena.name("x");
    let full_b = arena.member(full_recv, "b");
    let full = arena.member(full_b, "c");
    assert!(!is_partial_matching_expression(&arena, xbc, full));
}

#[test]
fn write_access_positions() {
    let mut arena = arena();

    let target = arena.name("x");
    let value = arena.number(1);
    arena.assign(target, value);
    assert!(is_write_access(&arena, target));

    let read = arena.name("x");
    let len = arena.call_name("len", vec![read]);
    let _ = len;
    assert!(!is_write_access(&arena, read));

    let walrus_target = arena.name("y");
    let walrus_value = arena.number(2);
    arena.walrus(walrus_target, walrus_value);
    assert!(is_write_access(&arena, walrus_target));
}

#[test]
fn write_access_through_tuple_target() {
    let mut arena = arena();
    let a = arena.name("a");
    let b = arena.name("b");
    let target = arena.tuple_expr(vec![a, b]);
    let value = arena.name("pair");
    arena.assign(target, value);
    assert!(is_write_access(&arena, a));
    assert!(is_write_access(&arena, b));
    assert!(!is_write_access(&arena, value));
}

#[test]
fn write_access_for_and_with_and_except() {
    let mut arena = arena();

    let for_target = arena.name("item");
    let iterable = arena.name("items");
    arena.alloc(
        NodeKind::For {
            target: for_target,
            iterable,
            body: vec![],
        },
        Span::dummy(),
    );
    assert!(is_write_access(&arena, for_target));
    assert!(!is_write_access(&arena, iterable));

    let ctx = arena.name("open_file");
    let as_name = arena.name("f");
    arena.alloc(
        NodeKind::WithItem {
            context: ctx,
            target: Some(as_name),
        },
        Span::dummy(),
    );
    assert!(is_write_access(&arena, as_name));

    let exc_name = arena.name("e");
    arena.alloc(
        NodeKind::ExceptHandler {
            exc_type: None,
            name: Some(exc_name),
            body: vec![],
        },
        Span::dummy(),
    );
    assert!(is_write_access(&arena, exc_name));

    let del_target = arena.name("gone");
    arena.alloc(
        NodeKind::Del {
            targets: vec![del_target],
        },
        Span::dummy(),
    );
    assert!(is_write_access(&arena, del_target));
}

#[test]
fn enclosing_scope_walks_to_function() {
    let mut arena = arena();
    let x = arena.name("x");
    let stmt = arena.expr_stmt(x);
    let func_name = arena.interner.intern("f");
    let func = arena.alloc(
        NodeKind::Function {
            name: func_name,
            params: vec![],
            return_annotation: None,
            decorators: vec![],
            body: vec![stmt],
        },
        Span::dummy(),
    );
    let module = arena.module(vec![func]);

    assert_eq!(enclosing_function(&arena, x), Some(func));
    assert_eq!(enclosing_module(&arena, x), Some(module));
    assert_eq!(enclosing_class(&arena, x), None);
}

#[test]
fn decorator_is_outside_decorated_function() {
    let mut arena = arena();
    let decorator = arena.name("cached");
    let func_name = arena.interner.intern("f");
    let func = arena.alloc(
        NodeKind::Function {
            name: func_name,
            params: vec![],
            return_annotation: None,
            decorators: vec![decorator],
            body: vec![],
        },
        Span::dummy(),
    );
    let outer_name = arena.interner.intern("outer");
    let outer = arena.alloc(
        NodeKind::Function {
            name: outer_name,
            params: vec![],
            return_annotation: None,
            decorators: vec![],
            body: vec![func],
        },
        Span::dummy(),
    );
    let _module = arena.module(vec![outer]);

    // The decorator expression resolves in the outer function's scope.
    assert_eq!(enclosing_function(&arena, decorator), Some(outer));
}

#[test]
fn comprehension_outermost_iterable_leaks() {
    let mut arena = arena();
    // [y for y in items if y] inside a function
    let target = arena.name("y");
    let iterable = arena.name("items");
    let for_clause = arena.alloc(
        NodeKind::ComprehensionFor { target, iterable },
        Span::dummy(),
    );
    let cond = arena.name("y");
    let if_clause = arena.alloc(NodeKind::ComprehensionIf { test: cond }, Span::dummy());
    let element = arena.name("y");
    let comp = arena.alloc(
        NodeKind::ListComprehension {
            element,
            clauses: vec![for_clause, if_clause],
        },
        Span::dummy(),
    );
    let stmt = arena.expr_stmt(comp);
    let func_name = arena.interner.intern("f");
    let func = arena.alloc(
        NodeKind::Function {
            name: func_name,
            params: vec![],
            return_annotation: None,
            decorators: vec![],
            body: vec![stmt],
        },
        Span::dummy(),
    );
    let _module = arena.module(vec![func]);

    // The outermost iterable resolves in the enclosing function.
    assert_eq!(evaluation_scope(&arena, iterable), Some(func));
    // The element and the condition resolve in the comprehension scope.
    assert_eq!(evaluation_scope(&arena, element), Some(comp));
    assert_eq!(evaluation_scope(&arena, cond), Some(comp));
    // The for target binds in the comprehension scope.
    assert_eq!(evaluation_scope(&arena, target), Some(comp));
}

#[test]
fn execution_scope_skips_class_bodies() {
    let mut arena = arena();
    let x = arena.name("x");
    let stmt = arena.expr_stmt(x);
    let class_name = arena.interner.intern("C");
    let class = arena.alloc(
        NodeKind::Class {
            name: class_name,
            bases: vec![],
            decorators: vec![],
            body: vec![stmt],
        },
        Span::dummy(),
    );
    let module = arena.module(vec![class]);

    assert_eq!(evaluation_scope(&arena, x), Some(class));
    assert_eq!(execution_scope(&arena, x), Some(module));
}

#[test]
fn docstring_recognition() {
    let mut arena = arena();
    let doc = arena.string("Frobnicates the quux.");
    let doc_stmt = arena.expr_stmt(doc);
    let other = arena.number(1);
    let other_stmt = arena.expr_stmt(other);
    let _module = arena.module(vec![doc_stmt, other_stmt]);

    assert!(is_docstring(&arena, doc_stmt));
    assert!(!is_docstring(&arena, other_stmt));
}

#[test]
fn dotted_names() {
    let mut arena = arena();
    let a = arena.name("os");
    let ab = arena.member(a, "path");
    let abc = arena.member(ab, "join");
    assert!(dotted_name_matches(&arena, abc, &["os", "path", "join"]));
    assert!(!dotted_name_matches(&arena, abc, &["os", "path"]));

    let call = arena.call_name("f", vec![]);
    let on_call = arena.member(call, "attr");
    assert_eq!(dotted_name(&arena, on_call), None);
}

#[test]
fn active_argument_for_offset() {
    let mut arena = arena();
    let callee = arena.alloc(NodeKind::Name(arena.interner.intern("f")), Span::new(0, 1));
    let first_value = arena.alloc(NodeKind::Number(1), Span::new(2, 3));
    let first = arena.alloc(
        NodeKind::Argument {
            category: ArgCategory::Simple,
            name: None,
            value: first_value,
        },
        Span::new(2, 3),
    );
    let second_value = arena.alloc(NodeKind::Number(2), Span::new(5, 6));
    let second = arena.alloc(
        NodeKind::Argument {
            category: ArgCategory::Simple,
            name: None,
            value: second_value,
        },
        Span::new(5, 6),
    );
    let call = arena.alloc(
        NodeKind::Call {
            callee,
            args: vec![first, second],
        },
        Span::new(0, 9),
    );

    assert_eq!(call_argument_at_offset(&arena, call, 2), Some((0, false)));
    assert_eq!(call_argument_at_offset(&arena, call, 5), Some((1, false)));
    // Past the last argument: fake trailing index.
    assert_eq!(call_argument_at_offset(&arena, call, 8), Some((2, true)));
    // Outside the call entirely.
    assert_eq!(call_argument_at_offset(&arena, call, 20), None);
}

#[test]
fn annotation_context() {
    let mut arena = arena();
    let annotation = arena.name("int");
    let param = arena.alloc(
        NodeKind::Parameter {
            name: arena.interner.intern("x"),
            category: ArgCategory::Simple,
            annotation: Some(annotation),
            default: None,
        },
        Span::dummy(),
    );
    let _ = param;
    assert!(is_within_annotation(&arena, annotation));

    let value = arena.number(3);
    assert!(!is_within_annotation(&arena, value));
}

#[test]
fn statement_range_includes_decorators() {
    let mut arena = arena();
    let decorator = arena.alloc(
        NodeKind::Name(arena.interner.intern("cached")),
        Span::new(0, 7),
    );
    let func = arena.alloc(
        NodeKind::Function {
            name: arena.interner.intern("f"),
            params: vec![],
            return_annotation: None,
            decorators: vec![decorator],
            body: vec![],
        },
        Span::new(8, 30),
    );
    assert_eq!(statement_range(&arena, func), Span::new(0, 30));
}

#[test]
fn enclosing_scope_ignores_constant_nodes() {
    let mut arena = arena();
    let c = arena.constant(ConstantKind::None);
    assert_eq!(enclosing_scope(&arena, c, ScopeKinds::all()), None);
    assert_eq!(arena.parent(c), NodeIndex::NONE);
}
