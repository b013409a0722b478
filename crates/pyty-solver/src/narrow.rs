//! Narrowing operations.
//!
//! A `NarrowOp` is the AST-free residue of a test expression: the checker
//! layer extracts one from the parse tree, wraps it in a
//! `NarrowingCallback`, and the callback is applied to the reference's
//! pre-edge type on every control-flow edge the test dominates. Callbacks
//! are pure values: applying one twice to the same type yields the same
//! type, and clones are interchangeable.

use pyty_common::{Atom, CancellationToken, Span};
use tracing::{trace, trace_span};

use crate::builtins::Builtins;
use crate::context::TypeVarContext;
use crate::db::TypeDatabase;
use crate::limits::MAX_ENUM_LITERAL_EXPANSION;
use crate::queries::{
    class_shape_of, conditions_of, enumerate_literal_members, fixed_tuple_len, is_none_instance,
    lookup_member, map_subtypes, map_subtypes_expand_type_vars, to_instance, tuple_args_of,
    typed_dict_members, typevar_shape_id_of, union_members, with_conditions, with_narrowed_entries,
};
use crate::relate::{apply_bindings, AssignCheck};
use crate::solve::ConstraintSolver;
use crate::types::{
    ClassFlags, ClassShape, FunctionFlags, LiteralValue, NarrowedEntry, TypeId, TypeKey,
};

/// Where a test expression occurred; keys synthesized intersection
/// classes so repeated narrowing of one expression reuses one identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NarrowOrigin {
    pub module: Atom,
    pub span: Span,
}

/// The AST-free form of a narrowing predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum NarrowOp {
    /// `x is None`, `x == None`.
    IsNone { is_operator: bool },
    /// `x[i] is None` for a fixed-length tuple reference.
    TupleEntryIsNone { index: usize },
    /// `type(x) is Y`.
    ClassIs { class: TypeId },
    /// `x is L` / `x == L` for a literal `L`.
    LiteralEq { literal: TypeId, is_operator: bool },
    /// `x[k] == L` for a string key: TypedDict discriminator.
    TdKeyEq { key: Atom, literal: TypeId },
    /// `x[i] == L` for an integer key: tuple discriminator.
    TupleEntryEq { index: usize, literal: TypeId },
    /// `len(x) == n`.
    LenEq { length: usize },
    /// `x.m == L` / `x.m is L`: member discriminator.
    MemberEq { member: Atom, literal: TypeId },
    /// `x.m is None`.
    MemberIsNone { member: Atom },
    /// `x in C` for a supported container type `C`.
    In { container: TypeId },
    /// `"k" in td` for TypedDict operands.
    TdHasKey { key: Atom },
    /// `isinstance(x, F)` / `issubclass(x, F)`.
    IsInstance {
        filters: Vec<TypeId>,
        /// True for `issubclass`: the subject is a class object.
        instantiable_check: bool,
        origin: NarrowOrigin,
    },
    /// `callable(x)`.
    IsCallable { origin: NarrowOrigin },
    /// A user-defined `TypeGuard[G]` / `StrictTypeGuard[G]` call.
    TypeGuard { guarded: TypeId, is_strict: bool },
    /// Truthiness of the reference itself (also `bool(x)`).
    Truthy,
}

/// A narrowing callback: `Type -> Type` for one control-flow edge.
#[derive(Clone, Debug, PartialEq)]
pub struct NarrowingCallback {
    pub op: NarrowOp,
    pub positive: bool,
}

impl NarrowingCallback {
    pub fn new(op: NarrowOp, positive: bool) -> Self {
        NarrowingCallback { op, positive }
    }

    /// Refine `ty` along this edge. Pure: the result depends only on the
    /// input type.
    pub fn apply(&self, ctx: &NarrowingContext<'_>, ty: TypeId) -> TypeId {
        ctx.narrow(ty, &self.op, self.positive)
    }
}

/// Applies narrowing operations to types. Holds no per-callback state.
pub struct NarrowingContext<'a> {
    pub db: &'a dyn TypeDatabase,
    pub builtins: &'a Builtins,
    pub cancel: &'a CancellationToken,
}

impl<'a> NarrowingContext<'a> {
    pub fn new(
        db: &'a dyn TypeDatabase,
        builtins: &'a Builtins,
        cancel: &'a CancellationToken,
    ) -> Self {
        NarrowingContext {
            db,
            builtins,
            cancel,
        }
    }

    fn relation(&self) -> AssignCheck<'a> {
        AssignCheck::new(self.db, self.builtins, self.cancel)
    }

    fn solver(&self) -> ConstraintSolver<'a> {
        ConstraintSolver::new(self.db, self.builtins, self.cancel)
    }

    /// Dispatch a narrowing operation.
    pub fn narrow(&self, ty: TypeId, op: &NarrowOp, positive: bool) -> TypeId {
        if self.cancel.is_cancelled() {
            return ty;
        }
        let _span = trace_span!("narrow", ty = ty.0, positive).entered();
        match op {
            NarrowOp::IsNone { .. } => self.narrow_is_none(ty, positive),
            NarrowOp::TupleEntryIsNone { index } => {
                self.narrow_tuple_entry_is_none(ty, *index, positive)
            }
            NarrowOp::ClassIs { class } => self.narrow_class_is(ty, *class, positive),
            NarrowOp::LiteralEq {
                literal,
                is_operator,
            } => self.narrow_literal_eq(ty, *literal, *is_operator, positive),
            NarrowOp::TdKeyEq { key, literal } => self.narrow_td_key_eq(ty, *key, *literal, positive),
            NarrowOp::TupleEntryEq { index, literal } => {
                self.narrow_tuple_entry_eq(ty, *index, *literal, positive)
            }
            NarrowOp::LenEq { length } => self.narrow_len_eq(ty, *length, positive),
            NarrowOp::MemberEq { member, literal } => {
                self.narrow_member_eq(ty, *member, *literal, positive)
            }
            NarrowOp::MemberIsNone { member } => self.narrow_member_is_none(ty, *member, positive),
            NarrowOp::In { container } => self.narrow_in(ty, *container, positive),
            NarrowOp::TdHasKey { key } => self.narrow_td_has_key(ty, *key, positive),
            NarrowOp::IsInstance {
                filters,
                instantiable_check,
                origin,
            } => self.narrow_isinstance(ty, filters, *instantiable_check, *origin, positive),
            NarrowOp::IsCallable { origin } => self.narrow_callable(ty, *origin, positive),
            NarrowOp::TypeGuard { guarded, is_strict } => {
                self.narrow_type_guard(ty, *guarded, *is_strict, positive)
            }
            NarrowOp::Truthy => self.narrow_truthy(ty, positive),
        }
    }

    fn narrow_is_none(&self, ty: TypeId, positive: bool) -> TypeId {
        map_subtypes_expand_type_vars(self.db, ty, |expanded, unexpanded| {
            if expanded.is_any_or_unknown() {
                // `Any` stays `Any` in both branches.
                return Some(unexpanded);
            }
            let none = is_none_instance(self.db, expanded);
            if positive {
                if none {
                    return Some(expanded);
                }
                // An `object`-typed value may be None; the narrowed None
                // keeps the subtype's provenance.
                if let Some(shape) = class_shape_of(self.db, expanded) {
                    if shape.def_id == self.builtins.object_def && !shape.is_instantiable() {
                        return Some(self.db.none_with_conditions(conditions_of(self.db, expanded)));
                    }
                }
                None
            } else if none {
                None
            } else {
                Some(unexpanded)
            }
        })
    }

    fn narrow_tuple_entry_is_none(&self, ty: TypeId, index: usize, positive: bool) -> TypeId {
        let relation = self.relation();
        map_subtypes_expand_type_vars(self.db, ty, |expanded, unexpanded| {
            let Some(args) = tuple_args_of(self.db, expanded) else {
                return Some(unexpanded);
            };
            if args.iter().any(|arg| arg.is_unbounded) || index >= args.len() {
                return Some(unexpanded);
            }
            let entry = args[index].ty;
            if positive {
                if entry.is_any_or_unknown() || relation.is_assignable(entry, TypeId::NONE) {
                    Some(unexpanded)
                } else {
                    None
                }
            } else if is_none_instance(self.db, entry) {
                None
            } else {
                Some(unexpanded)
            }
        })
    }

    fn narrow_class_is(&self, ty: TypeId, class: TypeId, positive: bool) -> TypeId {
        let Some(filter_shape) = class_shape_of(self.db, class) else {
            return ty;
        };
        map_subtypes_expand_type_vars(self.db, ty, |expanded, unexpanded| {
            if expanded.is_any_or_unknown() {
                return if positive {
                    Some(to_instance(self.db, class))
                } else {
                    Some(unexpanded)
                };
            }
            let Some(shape) = class_shape_of(self.db, expanded) else {
                return if positive { None } else { Some(unexpanded) };
            };
            if shape.is_instantiable() {
                return Some(unexpanded);
            }
            let same = shape.def_id == filter_shape.def_id;
            if positive {
                if same {
                    // Retain the subtype: it carries the more precise
                    // specialisation of the exact same generic class.
                    return Some(expanded);
                }
                if crate::queries::derives_from(self.db, &filter_shape, shape.def_id) {
                    let narrowed = to_instance(self.db, class);
                    return Some(with_conditions(
                        self.db,
                        narrowed,
                        conditions_of(self.db, expanded),
                    ));
                }
                None
            } else {
                // `type(x) is not Y` eliminates only an exact, final
                // match; a non-final class leaves subclasses possible.
                if same && shape.flags.contains(ClassFlags::FINAL) {
                    None
                } else {
                    Some(unexpanded)
                }
            }
        })
    }

    fn narrow_literal_eq(
        &self,
        ty: TypeId,
        literal: TypeId,
        is_operator: bool,
        positive: bool,
    ) -> TypeId {
        let Some(literal_shape) = class_shape_of(self.db, literal) else {
            return ty;
        };
        let Some(literal_value) = literal_shape.literal.clone() else {
            return ty;
        };
        map_subtypes_expand_type_vars(self.db, ty, |expanded, unexpanded| {
            if expanded.is_any_or_unknown() {
                return Some(unexpanded);
            }
            match class_shape_of(self.db, expanded) {
                Some(shape) if shape.def_id == literal_shape.def_id && !shape.is_instantiable() => {
                    match &shape.literal {
                        Some(value) => {
                            let matches = *value == literal_value;
                            if positive == matches {
                                Some(expanded)
                            } else {
                                None
                            }
                        }
                        None => {
                            if positive {
                                Some(with_conditions(
                                    self.db,
                                    literal,
                                    conditions_of(self.db, expanded),
                                ))
                            } else {
                                // A finitely enumerable class narrows to
                                // "every other literal".
                                match enumerate_literal_members(self.db, self.builtins, expanded) {
                                    Some(all) if all.len() <= MAX_ENUM_LITERAL_EXPANSION => {
                                        let rest: Vec<TypeId> = all
                                            .into_iter()
                                            .filter(|&member| {
                                                crate::queries::literal_of(self.db, member)
                                                    != Some(literal_value.clone())
                                            })
                                            .collect();
                                        if rest.is_empty() {
                                            None
                                        } else {
                                            Some(self.db.union(rest))
                                        }
                                    }
                                    _ => Some(unexpanded),
                                }
                            }
                        }
                    }
                }
                _ => {
                    // A different class can still be `==`-equal via
                    // `__eq__`, but never `is`-identical.
                    if positive && (is_operator || is_none_instance(self.db, expanded)) {
                        None
                    } else {
                        Some(unexpanded)
                    }
                }
            }
        })
    }

    fn narrow_td_key_eq(&self, ty: TypeId, key: Atom, literal: TypeId, positive: bool) -> TypeId {
        let relation = self.relation();
        map_subtypes(self.db, ty, |member| {
            let Some(shape) = class_shape_of(self.db, member) else {
                return Some(member);
            };
            if !shape.flags.contains(ClassFlags::TYPED_DICT) {
                return Some(member);
            }
            let members = typed_dict_members(self.db, &shape, true);
            let Some(entry) = members.iter().find(|entry| entry.name == key) else {
                return Some(member);
            };
            if !self.is_literal_union(entry.value_type) {
                return Some(member);
            }
            if positive {
                relation
                    .is_assignable(entry.value_type, literal)
                    .then_some(member)
            } else if relation.is_assignable(literal, entry.value_type) {
                // The entry is definitely this literal: eliminated.
                None
            } else {
                Some(member)
            }
        })
    }

    fn narrow_tuple_entry_eq(
        &self,
        ty: TypeId,
        index: usize,
        literal: TypeId,
        positive: bool,
    ) -> TypeId {
        let relation = self.relation();
        map_subtypes_expand_type_vars(self.db, ty, |expanded, unexpanded| {
            let Some(args) = tuple_args_of(self.db, expanded) else {
                return Some(unexpanded);
            };
            if args.iter().any(|arg| arg.is_unbounded) || index >= args.len() {
                return Some(unexpanded);
            }
            let entry = args[index].ty;
            if !self.is_literal_union(entry) {
                return Some(unexpanded);
            }
            if positive {
                relation
                    .is_assignable(entry, literal)
                    .then_some(unexpanded)
            } else if relation.is_assignable(literal, entry) {
                None
            } else {
                Some(unexpanded)
            }
        })
    }

    fn narrow_len_eq(&self, ty: TypeId, length: usize, positive: bool) -> TypeId {
        map_subtypes_expand_type_vars(self.db, ty, |expanded, unexpanded| {
            match fixed_tuple_len(self.db, expanded) {
                Some(len) => {
                    if (len == length) == positive {
                        Some(unexpanded)
                    } else {
                        None
                    }
                }
                // Unbounded tuples and non-tuples admit either length.
                None => Some(unexpanded),
            }
        })
    }

    fn narrow_member_eq(&self, ty: TypeId, member: Atom, literal: TypeId, positive: bool) -> TypeId {
        let relation = self.relation();
        map_subtypes_expand_type_vars(self.db, ty, |expanded, unexpanded| {
            if expanded.is_any_or_unknown() {
                return Some(unexpanded);
            }
            let Some(shape) = class_shape_of(self.db, expanded) else {
                return Some(unexpanded);
            };
            let Some(member_type) = self.member_value_type(&shape, member) else {
                return Some(unexpanded);
            };
            if !self.is_literal_union(member_type) {
                return Some(unexpanded);
            }
            if positive {
                relation
                    .is_assignable(member_type, literal)
                    .then_some(unexpanded)
            } else if relation.is_assignable(literal, member_type) {
                None
            } else {
                Some(unexpanded)
            }
        })
    }

    fn narrow_member_is_none(&self, ty: TypeId, member: Atom, positive: bool) -> TypeId {
        let relation = self.relation();
        map_subtypes_expand_type_vars(self.db, ty, |expanded, unexpanded| {
            let Some(shape) = class_shape_of(self.db, expanded) else {
                return Some(unexpanded);
            };
            let Some(raw) = lookup_member(self.db, &shape, member) else {
                return Some(unexpanded);
            };
            // Descriptor and property members, and member types without a
            // definite None-ness, preclude narrowing.
            if self.is_property(raw) {
                return Some(unexpanded);
            }
            if raw == TypeId::NEVER
                || is_none_instance(self.db, raw)
                || crate::queries::contains_any_or_unknown(self.db, raw)
            {
                return Some(unexpanded);
            }
            if positive {
                relation
                    .is_assignable(raw, TypeId::NONE)
                    .then_some(unexpanded)
            } else {
                Some(unexpanded)
            }
        })
    }

    fn narrow_in(&self, ty: TypeId, container: TypeId, positive: bool) -> TypeId {
        if !positive {
            return ty;
        }
        let Some(element) = self.container_element_type(container) else {
            return ty;
        };
        let elements = union_members(self.db, element);
        let relation = self.relation();
        map_subtypes_expand_type_vars(self.db, ty, |expanded, unexpanded| {
            if expanded.is_any_or_unknown() {
                return Some(unexpanded);
            }
            // A bare `type` subject is effectively `type[Unknown]`;
            // narrowing it against class-object elements would discard
            // information we do not have.
            if let Some(shape) = class_shape_of(self.db, expanded) {
                if shape.def_id == self.builtins.type_def && shape.type_args.is_none() {
                    return Some(unexpanded);
                }
            }
            let mut matched: Vec<TypeId> = Vec::new();
            for &element_subtype in &elements {
                if element_subtype.is_any_or_unknown() {
                    return Some(unexpanded);
                }
                if relation.is_assignable(expanded, element_subtype) {
                    // The element fits inside this subtype: the value is
                    // that element.
                    matched.push(element_subtype);
                } else if relation.is_assignable(element_subtype, expanded) {
                    matched.push(expanded);
                }
            }
            if matched.is_empty() {
                None
            } else {
                Some(self.db.union(matched))
            }
        })
    }

    fn narrow_td_has_key(&self, ty: TypeId, key: Atom, positive: bool) -> TypeId {
        map_subtypes(self.db, ty, |member| {
            let Some(shape) = class_shape_of(self.db, member) else {
                return Some(member);
            };
            if !shape.flags.contains(ClassFlags::TYPED_DICT) {
                return Some(member);
            }
            let members = typed_dict_members(self.db, &shape, true);
            let entry = members.iter().find(|entry| entry.name == key);
            if positive {
                match entry {
                    Some(entry) if entry.is_required || entry.is_provided => Some(member),
                    Some(_) => Some(self.mark_key_provided(member, &shape, key)),
                    None => {
                        if shape.flags.contains(ClassFlags::FINAL) {
                            // A final TypedDict cannot grow keys.
                            None
                        } else {
                            Some(self.mark_key_provided(member, &shape, key))
                        }
                    }
                }
            } else {
                match entry {
                    Some(entry) if entry.is_required || entry.is_provided => None,
                    _ => Some(member),
                }
            }
        })
    }

    fn mark_key_provided(&self, member: TypeId, shape: &ClassShape, key: Atom) -> TypeId {
        let mut delta = shape.narrowed_entries.clone().unwrap_or_default();
        match delta.iter_mut().find(|entry| entry.name == key) {
            Some(entry) => entry.is_provided = true,
            None => delta.push(NarrowedEntry {
                name: key,
                is_provided: true,
            }),
        }
        with_narrowed_entries(self.db, member, delta)
    }

    fn narrow_isinstance(
        &self,
        ty: TypeId,
        filters: &[TypeId],
        instantiable_check: bool,
        origin: NarrowOrigin,
        positive: bool,
    ) -> TypeId {
        // Two-pass convention: intersection synthesis only when the plain
        // pass filtered everything out.
        let mut any_substitutions: Vec<TypeId> = Vec::new();
        let first = self.isinstance_pass(
            ty,
            filters,
            instantiable_check,
            origin,
            positive,
            false,
            &mut any_substitutions,
        );
        if positive && first == TypeId::NEVER {
            let mut subs = Vec::new();
            let second = self.isinstance_pass(
                ty,
                filters,
                instantiable_check,
                origin,
                positive,
                true,
                &mut subs,
            );
            // Everything filtered out but Any substitutions were seen:
            // those stand in for the filtered type.
            if second == TypeId::NEVER && !subs.is_empty() {
                return self.db.union(subs);
            }
            return second;
        }
        first
    }

    #[allow(clippy::too_many_arguments)]
    fn isinstance_pass(
        &self,
        ty: TypeId,
        filters: &[TypeId],
        instantiable_check: bool,
        origin: NarrowOrigin,
        positive: bool,
        allow_synthesis: bool,
        any_substitutions: &mut Vec<TypeId>,
    ) -> TypeId {
        let relation = self.relation();
        map_subtypes_expand_type_vars(self.db, ty, |expanded, unexpanded| {
            let expanded = crate::queries::transform_possible_recursive_alias(self.db, expanded);

            if expanded.is_any_or_unknown() {
                if positive {
                    let substituted: Vec<TypeId> = filters
                        .iter()
                        .map(|&filter| {
                            if instantiable_check {
                                filter
                            } else {
                                to_instance(self.db, filter)
                            }
                        })
                        .collect();
                    let substitution = self.db.union(substituted);
                    any_substitutions.push(substitution);
                    return Some(substitution);
                }
                return Some(unexpanded);
            }

            match self.db.lookup(expanded) {
                Some(TypeKey::None { .. }) if !instantiable_check => {
                    let matches_none = filters.iter().any(|&filter| {
                        matches!(
                            self.db.lookup(filter),
                            Some(TypeKey::None {
                                instantiable: true,
                                ..
                            })
                        )
                    });
                    if positive == matches_none {
                        Some(unexpanded)
                    } else {
                        None
                    }
                }
                Some(TypeKey::Function(_)) | Some(TypeKey::Overloaded(_))
                    if !instantiable_check =>
                {
                    let callable_filter = filters.iter().any(|&filter| {
                        class_shape_of(self.db, filter).is_some_and(|shape| {
                            shape.flags.contains(ClassFlags::PROTOCOL)
                                && shape.field(self.db.intern_string("__call__")).is_some()
                        })
                    });
                    if positive == callable_filter {
                        Some(unexpanded)
                    } else {
                        None
                    }
                }
                Some(TypeKey::Module(_)) if !instantiable_check => {
                    if positive {
                        None
                    } else {
                        Some(unexpanded)
                    }
                }
                Some(TypeKey::Class(_)) => {
                    let subject_shape = class_shape_of(self.db, expanded).unwrap();
                    if subject_shape.is_instantiable() != instantiable_check {
                        // isinstance over a class object (or issubclass
                        // over an instance) matches the `type` filter
                        // rules.
                        return self.narrow_type_filter_mismatch(
                            expanded,
                            unexpanded,
                            filters,
                            positive,
                        );
                    }
                    let subject_instance = to_instance(self.db, expanded);
                    self.narrow_class_against_filters(
                        &relation,
                        subject_instance,
                        unexpanded,
                        filters,
                        instantiable_check,
                        origin,
                        positive,
                        allow_synthesis,
                    )
                }
                _ => Some(unexpanded),
            }
        })
    }

    /// An instance subject meeting an `issubclass`-style situation (or a
    /// class-object subject under `isinstance`): only the `type` filter
    /// can say anything.
    fn narrow_type_filter_mismatch(
        &self,
        expanded: TypeId,
        unexpanded: TypeId,
        filters: &[TypeId],
        positive: bool,
    ) -> Option<TypeId> {
        let has_type_filter = filters.iter().any(|&filter| {
            class_shape_of(self.db, filter)
                .is_some_and(|shape| shape.def_id == self.builtins.type_def)
        });
        let subject_is_class_object = class_shape_of(self.db, expanded)
            .is_some_and(|shape| shape.is_instantiable());
        let matches = has_type_filter && subject_is_class_object;
        if positive == matches {
            Some(unexpanded)
        } else {
            None
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn narrow_class_against_filters(
        &self,
        relation: &AssignCheck<'_>,
        subject_instance: TypeId,
        unexpanded: TypeId,
        filters: &[TypeId],
        instantiable_check: bool,
        origin: NarrowOrigin,
        positive: bool,
        allow_synthesis: bool,
    ) -> Option<TypeId> {
        let subject_shape = class_shape_of(self.db, subject_instance)?;
        let subject_conditions = conditions_of(self.db, subject_instance);
        let mut kept: Vec<TypeId> = Vec::new();
        let mut saw_superclass = false;
        let mut indeterminate = false;

        for &filter in filters {
            let filter_instance = to_instance(self.db, filter);
            let Some(filter_shape) = class_shape_of(self.db, filter_instance) else {
                // `type(None)` as a filter never matches an instance
                // subject here (handled in the None arm).
                continue;
            };

            if crate::queries::derives_from_any(self.db, subject_instance)
                || crate::queries::derives_from_any(self.db, filter_instance)
            {
                indeterminate = true;
                continue;
            }

            let filter_is_superclass = crate::queries::derives_from(
                self.db,
                &subject_shape,
                filter_shape.def_id,
            ) || filter_shape.def_id == self.builtins.object_def
                || (filter_shape.flags.contains(ClassFlags::PROTOCOL)
                    && relation.is_assignable(filter_instance, subject_instance))
                || (filter_shape.def_id == self.builtins.dict_def
                    && subject_shape.flags.contains(ClassFlags::TYPED_DICT));

            let filter_is_subclass = crate::queries::derives_from(
                self.db,
                &filter_shape,
                subject_shape.def_id,
            ) || (subject_shape.flags.contains(ClassFlags::PROTOCOL)
                && relation.is_assignable(subject_instance, filter_instance));

            if filter_is_superclass {
                saw_superclass = true;
                if positive {
                    kept.push(unexpanded);
                }
                continue;
            }
            if filter_is_subclass && positive {
                // Keep the filter, specialised so the subject's type
                // arguments survive the narrowing.
                let specialized = self.specialize_filter(filter_instance, subject_instance);
                let specialized = with_conditions(self.db, specialized, subject_conditions);
                let result = if instantiable_check {
                    crate::queries::to_instantiable(self.db, specialized).unwrap_or(specialized)
                } else {
                    specialized
                };
                kept.push(result);
                continue;
            }
            if positive && allow_synthesis {
                let intersection = self.synthesize_intersection(
                    &subject_shape,
                    &filter_shape,
                    subject_conditions,
                    origin,
                );
                let result = if instantiable_check {
                    crate::queries::to_instantiable(self.db, intersection).unwrap_or(intersection)
                } else {
                    intersection
                };
                kept.push(result);
            }
        }

        if positive {
            if kept.is_empty() {
                if indeterminate {
                    return Some(unexpanded);
                }
                return None;
            }
            Some(self.db.union(kept))
        } else {
            // Negative narrowing eliminates a subtype only when a filter
            // definitely matches it; indeterminate relations retain it.
            if saw_superclass && !indeterminate {
                None
            } else {
                Some(unexpanded)
            }
        }
    }

    /// Infer a specialisation of `filter` (a subclass of the subject)
    /// that preserves the subject's type arguments.
    fn specialize_filter(&self, filter_instance: TypeId, subject_instance: TypeId) -> TypeId {
        let Some(filter_shape) = class_shape_of(self.db, filter_instance) else {
            return filter_instance;
        };
        if filter_shape.type_params.is_empty() || filter_shape.type_args.is_some() {
            return filter_instance;
        }
        let scopes: Vec<_> = filter_shape
            .type_params
            .iter()
            .filter_map(|&param| {
                typevar_shape_id_of(self.db, param)
                    .and_then(|id| self.db.typevar_shape(id).scope_id)
            })
            .collect();
        let mut ctx = TypeVarContext::with_scopes(scopes);
        if !self.solver().populate_context_from_expected_type(
            filter_instance,
            subject_instance,
            &mut ctx,
            None,
        ) {
            return filter_instance;
        }
        let args: Vec<TypeId> = filter_shape
            .type_params
            .iter()
            .map(|&param| {
                let solved = apply_bindings(self.db, param, &ctx);
                if solved == param {
                    TypeId::UNKNOWN
                } else {
                    solved
                }
            })
            .collect();
        crate::queries::specialize(self.db, filter_instance, args)
    }

    /// Build `<subclass of S and F>` with an MRO covering both sides.
    fn synthesize_intersection(
        &self,
        subject_shape: &ClassShape,
        filter_shape: &ClassShape,
        conditions: Option<crate::types::ConditionListId>,
        origin: NarrowOrigin,
    ) -> TypeId {
        let subject_name = self.db.resolve_atom(subject_shape.name);
        let filter_name = self.db.resolve_atom(filter_shape.name);
        let display_name = format!(
            "<subclass of {} and {}>",
            short(&subject_name),
            short(&filter_name)
        );
        trace!(display = %display_name, "synthesizing intersection class");
        let def_id = self
            .db
            .intersection_def_id((origin.module, origin.span, filter_shape.name));

        let subject_instance = self.db.class(ClassShape {
            flags: subject_shape.flags & !ClassFlags::INSTANTIABLE,
            conditions: None,
            ..subject_shape.clone()
        });
        let filter_instance = self.db.class(ClassShape {
            flags: filter_shape.flags & !ClassFlags::INSTANTIABLE,
            conditions: None,
            ..filter_shape.clone()
        });
        let mut mro = vec![subject_instance];
        mro.extend(subject_shape.mro.iter().copied());
        mro.push(filter_instance);
        mro.extend(filter_shape.mro.iter().copied());
        let mut seen = rustc_hash::FxHashSet::default();
        mro.retain(|&entry| seen.insert(entry));

        self.db.class(ClassShape {
            def_id,
            name: self.db.intern_string(&display_name),
            flags: ClassFlags::SYNTHESIZED,
            type_params: Vec::new(),
            type_args: None,
            tuple_args: None,
            literal: None,
            td_entries: None,
            narrowed_entries: None,
            mro,
            fields: Vec::new(),
            conditions,
        })
    }

    fn narrow_callable(&self, ty: TypeId, origin: NarrowOrigin, positive: bool) -> TypeId {
        let first = self.callable_pass(ty, origin, positive, false);
        if positive && first == TypeId::NEVER {
            return self.callable_pass(ty, origin, positive, true);
        }
        first
    }

    fn callable_pass(
        &self,
        ty: TypeId,
        origin: NarrowOrigin,
        positive: bool,
        allow_synthesis: bool,
    ) -> TypeId {
        let call_name = self.db.intern_string("__call__");
        map_subtypes_expand_type_vars(self.db, ty, |expanded, unexpanded| {
            let callable = match self.db.lookup(expanded) {
                Some(TypeKey::Function(_)) | Some(TypeKey::Overloaded(_)) => Some(true),
                Some(TypeKey::None { .. }) | Some(TypeKey::Module(_)) => Some(false),
                Some(TypeKey::Intrinsic(_)) => None,
                Some(TypeKey::Class(shape_id)) => {
                    let shape = self.db.class_shape(shape_id);
                    if shape.is_instantiable() {
                        Some(true)
                    } else {
                        Some(lookup_member(self.db, &shape, call_name).is_some())
                    }
                }
                _ => None,
            };
            match callable {
                None => Some(unexpanded),
                Some(is_callable) => {
                    if positive == is_callable {
                        Some(unexpanded)
                    } else if positive && allow_synthesis {
                        // Synthesize a hypothetical callable subclass for
                        // a non-callable instance.
                        let shape = class_shape_of(self.db, expanded)?;
                        if shape.flags.contains(ClassFlags::FINAL) {
                            return None;
                        }
                        Some(self.synthesize_callable_subclass(&shape, origin))
                    } else {
                        None
                    }
                }
            }
        })
    }

    fn synthesize_callable_subclass(&self, shape: &ClassShape, origin: NarrowOrigin) -> TypeId {
        let name = self.db.resolve_atom(shape.name);
        let display = format!("<callable subclass of {}>", short(&name));
        let call_field = self.db.function(crate::types::FunctionShape {
            params: Vec::new(),
            return_type: TypeId::UNKNOWN,
            flags: FunctionFlags::SYNTHESIZED,
            type_guard: None,
            param_spec: None,
        });
        let base_instance = self.db.class(ClassShape {
            conditions: None,
            ..shape.clone()
        });
        let mut mro = vec![base_instance];
        mro.extend(shape.mro.iter().copied());
        let call_atom = self.db.intern_string("__call__");
        self.db.class(ClassShape {
            def_id: self
                .db
                .intersection_def_id((origin.module, origin.span, call_atom)),
            name: self.db.intern_string(&display),
            flags: ClassFlags::SYNTHESIZED,
            type_params: Vec::new(),
            type_args: None,
            tuple_args: None,
            literal: None,
            td_entries: None,
            narrowed_entries: None,
            mro,
            fields: vec![(call_atom, call_field)],
            conditions: shape.conditions,
        })
    }

    fn narrow_type_guard(
        &self,
        ty: TypeId,
        guarded: TypeId,
        is_strict: bool,
        positive: bool,
    ) -> TypeId {
        let relation = self.relation();
        if positive {
            if !is_strict {
                return guarded;
            }
            // Strict guards intersect pointwise with the declared type.
            let guard_subtypes = union_members(self.db, guarded);
            return map_subtypes_expand_type_vars(self.db, ty, |expanded, unexpanded| {
                let mut matched: Vec<TypeId> = Vec::new();
                for &guard in &guard_subtypes {
                    if relation.is_assignable(guard, expanded) {
                        matched.push(unexpanded);
                    } else if relation.is_assignable(expanded, guard) {
                        matched.push(guard);
                    }
                }
                if matched.is_empty() {
                    None
                } else {
                    Some(self.db.union(matched))
                }
            });
        }
        if !is_strict {
            return ty;
        }
        // Strict negative: drop subtypes wholly contained in the guard.
        map_subtypes_expand_type_vars(self.db, ty, |expanded, unexpanded| {
            if relation.is_assignable(guarded, expanded) {
                None
            } else {
                Some(unexpanded)
            }
        })
    }

    fn narrow_truthy(&self, ty: TypeId, positive: bool) -> TypeId {
        map_subtypes_expand_type_vars(self.db, ty, |expanded, unexpanded| {
            match self.truthiness(expanded) {
                Truthiness::AlwaysTruthy => positive.then_some(unexpanded),
                Truthiness::AlwaysFalsy => (!positive).then_some(unexpanded),
                Truthiness::Either => {
                    // A plain bool splits into its literal halves.
                    if let Some(shape) = class_shape_of(self.db, expanded) {
                        if shape.def_id == self.builtins.bool_def && shape.literal.is_none() {
                            return Some(if positive {
                                self.builtins.true_literal
                            } else {
                                self.builtins.false_literal
                            });
                        }
                    }
                    Some(unexpanded)
                }
            }
        })
    }

    fn truthiness(&self, ty: TypeId) -> Truthiness {
        match self.db.lookup(ty) {
            Some(TypeKey::None { .. }) => Truthiness::AlwaysFalsy,
            Some(TypeKey::Function(_)) | Some(TypeKey::Overloaded(_)) | Some(TypeKey::Module(_)) => {
                Truthiness::AlwaysTruthy
            }
            Some(TypeKey::Class(shape_id)) => {
                let shape = self.db.class_shape(shape_id);
                if shape.is_instantiable() {
                    return Truthiness::AlwaysTruthy;
                }
                if let Some(literal) = &shape.literal {
                    return match literal {
                        LiteralValue::Bool(value) => Truthiness::from_bool(*value),
                        LiteralValue::Int(value) => Truthiness::from_bool(*value != 0),
                        LiteralValue::Str(atom) | LiteralValue::Bytes(atom) => {
                            Truthiness::from_bool(!self.db.resolve_atom(*atom).is_empty())
                        }
                        LiteralValue::EnumMember(_) => Truthiness::AlwaysTruthy,
                    };
                }
                if let Some(len) = fixed_tuple_len(self.db, ty) {
                    return Truthiness::from_bool(len != 0);
                }
                Truthiness::Either
            }
            _ => Truthiness::Either,
        }
    }

    /// Element type a container exposes to `in` narrowing.
    fn container_element_type(&self, container: TypeId) -> Option<TypeId> {
        let shape = class_shape_of(self.db, container)?;
        if shape.is_instantiable() {
            return None;
        }
        if shape.def_id == self.builtins.tuple_def {
            let args = shape.tuple_args.as_ref()?;
            let elements: Vec<TypeId> = args.iter().map(|arg| arg.ty).collect();
            if elements.is_empty() {
                return None;
            }
            return Some(self.db.union(elements));
        }
        if self
            .builtins
            .sequence_container_defs()
            .contains(&shape.def_id)
            || self
                .builtins
                .mapping_container_defs()
                .contains(&shape.def_id)
        {
            return shape.type_args.as_ref().and_then(|args| args.first().copied());
        }
        None
    }

    fn member_value_type(&self, shape: &ClassShape, member: Atom) -> Option<TypeId> {
        let raw = lookup_member(self.db, shape, member)?;
        if let Some(TypeKey::Function(function_id)) = self.db.lookup(raw) {
            let function = self.db.function_shape(function_id);
            if function.flags.contains(FunctionFlags::PROPERTY) {
                return Some(function.return_type);
            }
            return None;
        }
        Some(raw)
    }

    fn is_property(&self, member_type: TypeId) -> bool {
        matches!(
            self.db.lookup(member_type),
            Some(TypeKey::Function(function_id))
                if self
                    .db
                    .function_shape(function_id)
                    .flags
                    .contains(FunctionFlags::PROPERTY)
        )
    }

    /// A literal, or a union whose members are all literal-valued.
    fn is_literal_union(&self, ty: TypeId) -> bool {
        union_members(self.db, ty)
            .iter()
            .all(|&member| crate::queries::literal_of(self.db, member).is_some())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Truthiness {
    AlwaysTruthy,
    AlwaysFalsy,
    Either,
}

impl Truthiness {
    fn from_bool(truthy: bool) -> Self {
        if truthy {
            Truthiness::AlwaysTruthy
        } else {
            Truthiness::AlwaysFalsy
        }
    }
}

fn short(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

#[cfg(test)]
#[path = "tests/narrow_tests.rs"]
mod tests;
