//! Type database abstraction.
//!
//! This trait isolates the solver and narrowing engines from concrete
//! storage; they only see a query surface. `TypeInterner` is the
//! in-memory implementation.

use std::sync::Arc;

use pyty_common::Atom;

use crate::types::{
    ClassShape, ClassShapeId, Condition, ConditionListId, DefId, FunctionShape, FunctionShapeId,
    TypeId, TypeKey, TypeListId, TypeVarShape, TypeVarShapeId,
};

/// Query interface for the evaluator's engines.
pub trait TypeDatabase {
    fn intern(&self, key: TypeKey) -> TypeId;
    fn lookup(&self, id: TypeId) -> Option<TypeKey>;

    fn intern_string(&self, s: &str) -> Atom;
    fn resolve_atom(&self, atom: Atom) -> Arc<str>;

    fn type_list(&self, id: TypeListId) -> Arc<[TypeId]>;
    fn class_shape(&self, id: ClassShapeId) -> Arc<ClassShape>;
    fn function_shape(&self, id: FunctionShapeId) -> Arc<FunctionShape>;
    fn typevar_shape(&self, id: TypeVarShapeId) -> Arc<TypeVarShape>;
    fn condition_list(&self, id: ConditionListId) -> Arc<[Condition]>;

    /// Intern a class shape. Rejects literal-valued instantiable shapes
    /// by stripping the literal.
    fn class(&self, shape: ClassShape) -> TypeId;
    fn function(&self, shape: FunctionShape) -> TypeId;
    fn type_var(&self, shape: TypeVarShape) -> TypeId;
    fn module(&self, name: Atom) -> TypeId;

    /// Build a union: flattens nested unions, deduplicates preserving
    /// first-occurrence order, drops `Never` members, collapses
    /// singletons, absorbs literals whose base is also a member.
    fn union(&self, members: Vec<TypeId>) -> TypeId;
    fn union2(&self, left: TypeId, right: TypeId) -> TypeId;
    fn overloaded(&self, signatures: Vec<TypeId>) -> TypeId;

    fn none_with_conditions(&self, conditions: Option<ConditionListId>) -> TypeId;
    fn intern_conditions(&self, conditions: Vec<Condition>) -> ConditionListId;

    fn literal_bool(&self, value: bool) -> TypeId;
    fn literal_int(&self, value: i64) -> TypeId;
    fn literal_str(&self, value: &str) -> TypeId;

    /// Fresh nominal identity for embedder-defined or synthesized classes.
    fn fresh_def_id(&self) -> DefId;

    /// Deterministic identity for a synthesized intersection class:
    /// repeated synthesis from the same origin yields the same `DefId`.
    fn intersection_def_id(&self, key: (Atom, pyty_common::Span, Atom)) -> DefId;

    /// Tie the knot of a recursive type alias: `alias` must carry
    /// `TypeVarFlags::RECURSIVE_ALIAS`.
    fn set_alias_target(&self, alias: TypeVarShapeId, target: TypeId);
    fn alias_target(&self, alias: TypeVarShapeId) -> Option<TypeId>;
}
