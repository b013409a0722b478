//! Narrowing-callback construction.
//!
//! `FlowAnalyzer::narrowing_callback_for` dispatches on the syntactic
//! shape of the test expression and produces a `NarrowingCallback`, or
//! `None` when the test says nothing about the reference. The callback is
//! built once per predicate and applied once per control-flow edge.

use pyty_ast::tree_utils::{
    enclosing_statement, execution_scope, is_matching_expression, is_write_access,
};
use pyty_ast::{BinaryOperator, ConstantKind, NodeArena, NodeIndex, NodeKind, UnaryOperator};
use pyty_common::{Atom, CancellationToken};
use rustc_hash::FxHashMap;
use pyty_solver::limits::MAX_NARROWING_RECURSION;
use pyty_solver::narrow::NarrowOrigin;
use pyty_solver::queries::{class_shape_of, is_instantiable, literal_of, typevar_shape_of, union_members};
use pyty_solver::types::{ClassFlags, TypeKey};
use pyty_solver::{Builtins, NarrowOp, NarrowingCallback, TypeDatabase, TypeId};
use tracing::trace;

/// Checker-inferred types for expression nodes. Literal operands are
/// derived syntactically where possible; everything else (enum members,
/// container operands, guard callees) comes through this capability.
pub trait ExprTypes {
    fn type_of(&self, node: NodeIndex) -> Option<TypeId>;
}

/// A plain map of node types; enough for tests and simple embedders.
#[derive(Default)]
pub struct NodeTypeMap(pub FxHashMap<NodeIndex, TypeId>);

impl NodeTypeMap {
    pub fn insert(&mut self, node: NodeIndex, ty: TypeId) {
        self.0.insert(node, ty);
    }
}

impl ExprTypes for NodeTypeMap {
    fn type_of(&self, node: NodeIndex) -> Option<TypeId> {
        self.0.get(&node).copied()
    }
}

pub struct FlowAnalyzer<'a> {
    pub db: &'a dyn TypeDatabase,
    pub builtins: &'a Builtins,
    pub cancel: &'a CancellationToken,
    pub arena: &'a NodeArena,
    pub types: &'a dyn ExprTypes,
    /// Module of the file under analysis; part of the identity of
    /// synthesized intersection classes.
    pub module_name: Atom,
}

impl<'a> FlowAnalyzer<'a> {
    /// Build the narrowing callback for `(reference, test, is_positive)`.
    pub fn narrowing_callback_for(
        &self,
        reference: NodeIndex,
        test: NodeIndex,
        is_positive: bool,
        recursion: u32,
    ) -> Option<NarrowingCallback> {
        if recursion > MAX_NARROWING_RECURSION || self.cancel.is_cancelled() {
            return None;
        }

        match self.arena.kind(test)? {
            // Walrus: the test's truthiness applies to the target, and
            // the assigned expression may itself be a narrowing test.
            NodeKind::AssignmentExpr { target, value } => {
                if is_matching_expression(self.arena, reference, *target) {
                    return Some(NarrowingCallback::new(NarrowOp::Truthy, is_positive));
                }
                self.narrowing_callback_for(reference, *value, is_positive, recursion + 1)
            }

            NodeKind::UnaryOp {
                op: UnaryOperator::Not,
                operand,
            } => self.narrowing_callback_for(reference, *operand, !is_positive, recursion + 1),

            NodeKind::BinaryOp { op, left, right } => {
                self.callback_for_comparison(reference, *op, *left, *right, is_positive)
            }

            NodeKind::Call { callee, args } => {
                self.callback_for_call(reference, test, *callee, args, is_positive)
            }

            NodeKind::Name(test_name) => {
                if is_matching_expression(self.arena, reference, test) {
                    return Some(NarrowingCallback::new(NarrowOp::Truthy, is_positive));
                }
                // Aliased condition: a local name bound to a test
                // expression earlier in the same scope.
                let source = self.alias_condition_source(reference, test, *test_name)?;
                self.narrowing_callback_for(reference, source, is_positive, recursion + 1)
            }

            _ => {
                if is_matching_expression(self.arena, reference, test) {
                    Some(NarrowingCallback::new(NarrowOp::Truthy, is_positive))
                } else {
                    None
                }
            }
        }
    }

    fn callback_for_comparison(
        &self,
        reference: NodeIndex,
        op: BinaryOperator,
        left: NodeIndex,
        right: NodeIndex,
        is_positive: bool,
    ) -> Option<NarrowingCallback> {
        match op {
            BinaryOperator::Is | BinaryOperator::IsNot
            | BinaryOperator::Equals | BinaryOperator::NotEquals => {
                let is_operator = matches!(op, BinaryOperator::Is | BinaryOperator::IsNot);
                let sense = match op {
                    BinaryOperator::Is | BinaryOperator::Equals => is_positive,
                    _ => !is_positive,
                };
                self.callback_for_equality(reference, left, right, is_operator, sense)
                    .or_else(|| {
                        self.callback_for_equality(reference, right, left, is_operator, sense)
                    })
            }
            BinaryOperator::In | BinaryOperator::NotIn => {
                let sense = if op == BinaryOperator::In {
                    is_positive
                } else {
                    !is_positive
                };
                self.callback_for_in(reference, left, right, sense)
            }
            _ => None,
        }
    }

    /// Equality/identity with `subject` on the reference side and
    /// `comparand` on the other.
    fn callback_for_equality(
        &self,
        reference: NodeIndex,
        subject: NodeIndex,
        comparand: NodeIndex,
        is_operator: bool,
        sense: bool,
    ) -> Option<NarrowingCallback> {
        // `... is None` family.
        if matches!(
            self.arena.kind(comparand),
            Some(NodeKind::Constant(ConstantKind::None))
        ) {
            if is_matching_expression(self.arena, reference, subject) {
                return Some(NarrowingCallback::new(
                    NarrowOp::IsNone { is_operator },
                    sense,
                ));
            }
            if let Some(NodeKind::Index { base, index }) = self.arena.kind(subject) {
                if is_matching_expression(self.arena, reference, *base) {
                    if let Some(i) = self.non_negative_int(*index) {
                        return Some(NarrowingCallback::new(
                            NarrowOp::TupleEntryIsNone { index: i },
                            sense,
                        ));
                    }
                }
            }
            if let Some(NodeKind::MemberAccess { receiver, member }) = self.arena.kind(subject) {
                if is_operator && is_matching_expression(self.arena, reference, *receiver) {
                    return Some(NarrowingCallback::new(
                        NarrowOp::MemberIsNone { member: *member },
                        sense,
                    ));
                }
            }
            return None;
        }

        // `type(x) is Y`.
        if is_operator {
            if let Some(arg) = self.single_call_arg(subject, "type") {
                if is_matching_expression(self.arena, reference, arg) {
                    let class = self.types.type_of(comparand)?;
                    if is_instantiable(self.db, class) {
                        return Some(NarrowingCallback::new(NarrowOp::ClassIs { class }, sense));
                    }
                }
            }
        }

        // `len(x) == n`.
        if !is_operator {
            if let Some(arg) = self.single_call_arg(subject, "len") {
                if is_matching_expression(self.arena, reference, arg) {
                    if let Some(length) = self.non_negative_int(comparand) {
                        return Some(NarrowingCallback::new(NarrowOp::LenEq { length }, sense));
                    }
                }
            }
        }

        // Literal comparisons.
        let literal = self.literal_from_expr(comparand)?;
        if is_operator && !self.is_identity_comparable_literal(literal) {
            // `is` narrows only against singleton-identity literals
            // (bools and enum members).
            return None;
        }

        if is_matching_expression(self.arena, reference, subject) {
            return Some(NarrowingCallback::new(
                NarrowOp::LiteralEq {
                    literal,
                    is_operator,
                },
                sense,
            ));
        }
        match self.arena.kind(subject) {
            Some(NodeKind::Index { base, index })
                if is_matching_expression(self.arena, reference, *base) && !is_operator =>
            {
                if let Some(NodeKind::Str(key)) = self.arena.kind(*index) {
                    return Some(NarrowingCallback::new(
                        NarrowOp::TdKeyEq { key: *key, literal },
                        sense,
                    ));
                }
                if let Some(i) = self.non_negative_int(*index) {
                    return Some(NarrowingCallback::new(
                        NarrowOp::TupleEntryEq { index: i, literal },
                        sense,
                    ));
                }
                None
            }
            Some(NodeKind::MemberAccess { receiver, member })
                if is_matching_expression(self.arena, reference, *receiver) =>
            {
                Some(NarrowingCallback::new(
                    NarrowOp::MemberEq {
                        member: *member,
                        literal,
                    },
                    sense,
                ))
            }
            _ => None,
        }
    }

    fn callback_for_in(
        &self,
        reference: NodeIndex,
        left: NodeIndex,
        right: NodeIndex,
        sense: bool,
    ) -> Option<NarrowingCallback> {
        // `x in container`
        if is_matching_expression(self.arena, reference, left) {
            let container = self.types.type_of(right)?;
            return Some(NarrowingCallback::new(NarrowOp::In { container }, sense));
        }
        // `"key" in td`
        if is_matching_expression(self.arena, reference, right) {
            if let Some(NodeKind::Str(key)) = self.arena.kind(left) {
                let subject = self.types.type_of(right)?;
                if self.mentions_typed_dict(subject) {
                    return Some(NarrowingCallback::new(NarrowOp::TdHasKey { key: *key }, sense));
                }
            }
        }
        None
    }

    fn callback_for_call(
        &self,
        reference: NodeIndex,
        call: NodeIndex,
        callee: NodeIndex,
        args: &[NodeIndex],
        is_positive: bool,
    ) -> Option<NarrowingCallback> {
        let arg_values: Vec<NodeIndex> = args
            .iter()
            .filter_map(|&arg| match self.arena.kind(arg) {
                Some(NodeKind::Argument { value, .. }) => Some(*value),
                _ => None,
            })
            .collect();

        if let Some(NodeKind::Name(name)) = self.arena.kind(callee) {
            let name = self.db.resolve_atom(*name);
            match &*name {
                "isinstance" | "issubclass" if arg_values.len() == 2 => {
                    if is_matching_expression(self.arena, reference, arg_values[0]) {
                        let filters = self.filter_types(arg_values[1])?;
                        trace!(count = filters.len(), "isinstance filter list");
                        return Some(NarrowingCallback::new(
                            NarrowOp::IsInstance {
                                filters,
                                instantiable_check: &*name == "issubclass",
                                origin: self.origin(call),
                            },
                            is_positive,
                        ));
                    }
                    return None;
                }
                "callable" if arg_values.len() == 1 => {
                    if is_matching_expression(self.arena, reference, arg_values[0]) {
                        return Some(NarrowingCallback::new(
                            NarrowOp::IsCallable {
                                origin: self.origin(call),
                            },
                            is_positive,
                        ));
                    }
                    return None;
                }
                "bool" if arg_values.len() == 1 => {
                    if is_matching_expression(self.arena, reference, arg_values[0]) {
                        return Some(NarrowingCallback::new(NarrowOp::Truthy, is_positive));
                    }
                    return None;
                }
                _ => {}
            }
        }

        // User-defined type guard: the callee's declared return type is
        // TypeGuard[G] / StrictTypeGuard[G] and the reference is the
        // first argument.
        let callee_type = self.types.type_of(callee)?;
        let guard = self.type_guard_of(callee_type)?;
        if arg_values
            .first()
            .is_some_and(|&arg| is_matching_expression(self.arena, reference, arg))
        {
            return Some(NarrowingCallback::new(
                NarrowOp::TypeGuard {
                    guarded: guard.guarded,
                    is_strict: guard.is_strict,
                },
                is_positive,
            ));
        }
        None
    }

    /// Pattern 20: the test is a plain name assigned a condition earlier
    /// in the same execution scope, with no intervening writes to either
    /// the alias or the reference.
    fn alias_condition_source(
        &self,
        reference: NodeIndex,
        test: NodeIndex,
        alias: Atom,
    ) -> Option<NodeIndex> {
        let scope = execution_scope(self.arena, test)?;
        let body = self.scope_body(scope)?;
        let test_stmt = enclosing_statement(self.arena, test)?;
        let test_index = body.iter().position(|&stmt| stmt == test_stmt)?;

        let reference_root = self.root_name(reference)?;

        let mut source: Option<(usize, NodeIndex)> = None;
        for (index, &stmt) in body.iter().enumerate().take(test_index) {
            if let Some(NodeKind::Assignment { target, value }) = self.arena.kind(stmt) {
                if matches!(self.arena.kind(*target), Some(NodeKind::Name(name)) if *name == alias)
                {
                    source = Some((index, *value));
                }
            }
        }
        let (source_index, source_value) = source?;

        // A write to the alias or the reference between the alias
        // definition and the test invalidates the alias.
        for &stmt in &body[source_index + 1..test_index] {
            if self.writes_name(stmt, alias) || self.writes_name(stmt, reference_root) {
                return None;
            }
        }
        Some(source_value)
    }

    fn scope_body(&self, scope: NodeIndex) -> Option<&[NodeIndex]> {
        match self.arena.kind(scope)? {
            NodeKind::Module { body }
            | NodeKind::Function { body, .. }
            | NodeKind::Class { body, .. } => Some(body),
            _ => None,
        }
    }

    fn root_name(&self, expr: NodeIndex) -> Option<Atom> {
        match self.arena.kind(expr)? {
            NodeKind::Name(name) => Some(*name),
            NodeKind::MemberAccess { receiver, .. } => self.root_name(*receiver),
            NodeKind::Index { base, .. } => self.root_name(*base),
            _ => None,
        }
    }

    /// Whether any binding position inside `stmt` writes `name`.
    fn writes_name(&self, stmt: NodeIndex, name: Atom) -> bool {
        let mut stack = vec![stmt];
        while let Some(node) = stack.pop() {
            if let Some(NodeKind::Name(atom)) = self.arena.kind(node) {
                if *atom == name && is_write_access(self.arena, node) {
                    return true;
                }
            }
            stack.extend(self.arena.children(node));
        }
        false
    }

    fn origin(&self, node: NodeIndex) -> NarrowOrigin {
        NarrowOrigin {
            module: self.module_name,
            span: self.arena.span(node),
        }
    }

    fn single_call_arg(&self, node: NodeIndex, function: &str) -> Option<NodeIndex> {
        let NodeKind::Call { callee, args } = self.arena.kind(node)? else {
            return None;
        };
        let NodeKind::Name(name) = self.arena.kind(*callee)? else {
            return None;
        };
        if &*self.db.resolve_atom(*name) != function || args.len() != 1 {
            return None;
        }
        match self.arena.kind(args[0])? {
            NodeKind::Argument { value, .. } => Some(*value),
            _ => None,
        }
    }

    fn non_negative_int(&self, node: NodeIndex) -> Option<usize> {
        match self.arena.kind(node)? {
            NodeKind::Number(value) if *value >= 0 => Some(*value as usize),
            _ => None,
        }
    }

    /// A literal type for a comparison operand: syntactic literals first,
    /// then checker-inferred literal instances (enum members).
    fn literal_from_expr(&self, node: NodeIndex) -> Option<TypeId> {
        match self.arena.kind(node)? {
            NodeKind::Number(value) => Some(self.db.literal_int(*value)),
            NodeKind::UnaryOp {
                op: UnaryOperator::Minus,
                operand,
            } => match self.arena.kind(*operand)? {
                NodeKind::Number(value) => Some(self.db.literal_int(-value)),
                _ => None,
            },
            NodeKind::Str(atom) => {
                let text = self.db.resolve_atom(*atom);
                Some(self.db.literal_str(&text))
            }
            NodeKind::Constant(ConstantKind::True) => Some(self.db.literal_bool(true)),
            NodeKind::Constant(ConstantKind::False) => Some(self.db.literal_bool(false)),
            _ => {
                let ty = self.types.type_of(node)?;
                literal_of(self.db, ty).map(|_| ty)
            }
        }
    }

    fn is_identity_comparable_literal(&self, literal: TypeId) -> bool {
        matches!(
            literal_of(self.db, literal),
            Some(pyty_solver::types::LiteralValue::Bool(_))
                | Some(pyty_solver::types::LiteralValue::EnumMember(_))
        )
    }

    /// The class filters of an isinstance/issubclass second argument: a
    /// single class expression, a tuple of class expressions, or `None`.
    fn filter_types(&self, node: NodeIndex) -> Option<Vec<TypeId>> {
        match self.arena.kind(node)? {
            NodeKind::TupleExpr(items) | NodeKind::ListExpr(items) => {
                let mut filters = Vec::with_capacity(items.len());
                for &item in items {
                    filters.extend(self.filter_types(item)?);
                }
                Some(filters)
            }
            NodeKind::Constant(ConstantKind::None) => Some(vec![TypeId::NONE_TYPE]),
            _ => {
                let ty = self.types.type_of(node)?;
                // Accept class objects, type[T] TypeVars, and Any.
                if is_instantiable(self.db, ty)
                    || ty.is_any_or_unknown()
                    || union_members(self.db, ty)
                        .iter()
                        .all(|&member| is_instantiable(self.db, member))
                    || typevar_shape_of(self.db, ty).is_some()
                {
                    Some(union_members(self.db, ty))
                } else if class_shape_of(self.db, ty)
                    .is_some_and(|shape| shape.flags.contains(ClassFlags::PROTOCOL))
                {
                    Some(vec![ty])
                } else {
                    None
                }
            }
        }
    }

    fn mentions_typed_dict(&self, ty: TypeId) -> bool {
        union_members(self.db, ty)
            .iter()
            .any(|&member| pyty_solver::queries::is_typed_dict(self.db, member))
    }

    fn type_guard_of(&self, callee: TypeId) -> Option<pyty_solver::types::TypeGuardInfo> {
        match self.db.lookup(callee)? {
            TypeKey::Function(shape_id) => self.db.function_shape(shape_id).type_guard,
            TypeKey::Overloaded(list) => self
                .db
                .type_list(list)
                .iter()
                .find_map(|&signature| self.type_guard_of(signature)),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "tests/flow_tests.rs"]
mod tests;
