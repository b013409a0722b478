//! Classification helpers and subtype traversal.
//!
//! Small pure queries over a `&dyn TypeDatabase`. The narrowing and
//! solving engines are written against these instead of matching on
//! `TypeKey` directly, which keeps the match surface in one place.

use std::sync::Arc;

use crate::db::TypeDatabase;
use crate::recursion::{RecursionGuard, RecursionResult};
use crate::types::{
    ClassFlags, ClassShape, ConditionListId, DefId, LiteralValue, NarrowedEntry, TupleArg, TypeId,
    TypeKey, TypeVarFlags, TypeVarShape, TypeVarShapeId,
};

/// Members of a union, or a singleton list for any other type.
pub fn union_members(db: &dyn TypeDatabase, ty: TypeId) -> Vec<TypeId> {
    match db.lookup(ty) {
        Some(TypeKey::Union(list)) => db.type_list(list).to_vec(),
        _ => vec![ty],
    }
}

pub fn for_each_subtype(db: &dyn TypeDatabase, ty: TypeId, mut f: impl FnMut(TypeId)) {
    match db.lookup(ty) {
        Some(TypeKey::Union(list)) => {
            for &member in db.type_list(list).iter() {
                f(member);
            }
        }
        _ => f(ty),
    }
}

/// Map every subtype; `None` drops the subtype. Rebuilds the union only
/// when something changed, preserving flatness.
pub fn map_subtypes(
    db: &dyn TypeDatabase,
    ty: TypeId,
    mut f: impl FnMut(TypeId) -> Option<TypeId>,
) -> TypeId {
    let members = union_members(db, ty);
    let mut mapped: Vec<TypeId> = Vec::with_capacity(members.len());
    let mut changed = false;
    for &member in &members {
        match f(member) {
            Some(new) => {
                if new != member {
                    changed = true;
                }
                mapped.push(new);
            }
            None => changed = true,
        }
    }
    if !changed {
        return ty;
    }
    db.union(mapped)
}

/// Map subtypes, expanding TypeVars to their bound (or constraint union)
/// first. `f` receives the expanded subtype and the unexpanded original.
pub fn map_subtypes_expand_type_vars(
    db: &dyn TypeDatabase,
    ty: TypeId,
    mut f: impl FnMut(TypeId, TypeId) -> Option<TypeId>,
) -> TypeId {
    map_subtypes(db, ty, |member| {
        let expanded = expand_type_var(db, member);
        if expanded != member {
            let mut results = Vec::new();
            let mut dropped = false;
            for_each_subtype(db, expanded, |sub| match f(sub, member) {
                Some(new) => results.push(new),
                None => dropped = true,
            });
            if results.is_empty() {
                None
            } else if !dropped && db.union(results.clone()) == expanded {
                // Nothing was narrowed away: keep the original TypeVar.
                Some(member)
            } else {
                Some(db.union(results))
            }
        } else {
            f(member, member)
        }
    })
}

/// Expand a TypeVar to its bound or constraint union; identity otherwise.
pub fn expand_type_var(db: &dyn TypeDatabase, ty: TypeId) -> TypeId {
    let Some(TypeKey::TypeVar(shape_id)) = db.lookup(ty) else {
        return ty;
    };
    let shape = db.typevar_shape(shape_id);
    if shape.flags.contains(TypeVarFlags::RECURSIVE_ALIAS) {
        return ty;
    }
    if !shape.constraints.is_empty() {
        let mut members = Vec::with_capacity(shape.constraints.len());
        for (index, &constraint) in shape.constraints.iter().enumerate() {
            members.push(conditioned(db, constraint, shape_id, index as u32));
        }
        return db.union(members);
    }
    shape.bound.unwrap_or(TypeId::UNKNOWN)
}

fn conditioned(
    db: &dyn TypeDatabase,
    ty: TypeId,
    type_var: TypeVarShapeId,
    constraint_index: u32,
) -> TypeId {
    let condition = crate::types::Condition {
        type_var,
        constraint_index,
    };
    let merged = match conditions_of(db, ty) {
        Some(existing) => {
            let mut all = db.condition_list(existing).to_vec();
            all.push(condition);
            all
        }
        None => vec![condition],
    };
    let list = db.intern_conditions(merged);
    with_conditions(db, ty, Some(list))
}

/// Resolve a recursive-alias placeholder to its aliased type; identity
/// for everything else. The target may itself be an alias placeholder,
/// so the chain is followed under a recursion guard: a cycle of
/// placeholders (an alias defined in terms of itself with no structure
/// in between) resolves to `Unknown`.
pub fn transform_possible_recursive_alias(db: &dyn TypeDatabase, ty: TypeId) -> TypeId {
    let mut guard = RecursionGuard::new(crate::limits::MAX_TYPE_RECURSION_COUNT);
    let mut current = ty;
    loop {
        let Some(TypeKey::TypeVar(shape_id)) = db.lookup(current) else {
            return current;
        };
        let shape = db.typevar_shape(shape_id);
        if !shape.flags.contains(TypeVarFlags::RECURSIVE_ALIAS) {
            return current;
        }
        match guard.enter(shape_id) {
            RecursionResult::Entered => {}
            RecursionResult::Cycle | RecursionResult::DepthExceeded => return TypeId::UNKNOWN,
        }
        current = db.alias_target(shape_id).unwrap_or(TypeId::UNKNOWN);
    }
}

pub fn class_shape_of(db: &dyn TypeDatabase, ty: TypeId) -> Option<Arc<ClassShape>> {
    match db.lookup(ty)? {
        TypeKey::Class(shape_id) => Some(db.class_shape(shape_id)),
        _ => None,
    }
}

pub fn typevar_shape_of(db: &dyn TypeDatabase, ty: TypeId) -> Option<Arc<TypeVarShape>> {
    match db.lookup(ty)? {
        TypeKey::TypeVar(shape_id) => Some(db.typevar_shape(shape_id)),
        _ => None,
    }
}

pub fn typevar_shape_id_of(db: &dyn TypeDatabase, ty: TypeId) -> Option<TypeVarShapeId> {
    match db.lookup(ty)? {
        TypeKey::TypeVar(shape_id) => Some(shape_id),
        _ => None,
    }
}

pub fn literal_of(db: &dyn TypeDatabase, ty: TypeId) -> Option<LiteralValue> {
    class_shape_of(db, ty)?.literal.clone()
}

pub fn is_none_instance(db: &dyn TypeDatabase, ty: TypeId) -> bool {
    matches!(
        db.lookup(ty),
        Some(TypeKey::None {
            instantiable: false,
            ..
        })
    )
}

pub fn is_class_instance(db: &dyn TypeDatabase, ty: TypeId) -> bool {
    class_shape_of(db, ty).is_some_and(|shape| !shape.is_instantiable())
}

pub fn is_instantiable(db: &dyn TypeDatabase, ty: TypeId) -> bool {
    match db.lookup(ty) {
        Some(TypeKey::Class(shape_id)) => db.class_shape(shape_id).is_instantiable(),
        Some(TypeKey::None { instantiable, .. }) => instantiable,
        Some(TypeKey::TypeVar(shape_id)) => db.typevar_shape(shape_id).instantiable,
        _ => false,
    }
}

pub fn is_function_like(db: &dyn TypeDatabase, ty: TypeId) -> bool {
    matches!(
        db.lookup(ty),
        Some(TypeKey::Function(_)) | Some(TypeKey::Overloaded(_))
    )
}

pub fn is_tuple_class(db: &dyn TypeDatabase, ty: TypeId) -> bool {
    class_shape_of(db, ty).is_some_and(|shape| shape.flags.contains(ClassFlags::TUPLE))
}

pub fn is_typed_dict(db: &dyn TypeDatabase, ty: TypeId) -> bool {
    class_shape_of(db, ty).is_some_and(|shape| shape.flags.contains(ClassFlags::TYPED_DICT))
}

pub fn tuple_args_of(db: &dyn TypeDatabase, ty: TypeId) -> Option<Vec<TupleArg>> {
    class_shape_of(db, ty)?.tuple_args.clone()
}

/// Fixed tuple length, unless the tuple has an unbounded element.
pub fn fixed_tuple_len(db: &dyn TypeDatabase, ty: TypeId) -> Option<usize> {
    let args = tuple_args_of(db, ty)?;
    if args.iter().any(|arg| arg.is_unbounded) {
        return None;
    }
    Some(args.len())
}

/// Strip the literal value from a single class instance.
pub fn strip_literal(db: &dyn TypeDatabase, ty: TypeId) -> TypeId {
    let Some(shape) = class_shape_of(db, ty) else {
        return ty;
    };
    if shape.literal.is_none() {
        return ty;
    }
    let mut base = (*shape).clone();
    base.literal = None;
    db.class(base)
}

/// Strip literal values from every subtype.
pub fn strip_literals(db: &dyn TypeDatabase, ty: TypeId) -> TypeId {
    map_subtypes(db, ty, |member| Some(strip_literal(db, member)))
}

/// Convert to instance form. Identity for types that already are
/// instances.
pub fn to_instance(db: &dyn TypeDatabase, ty: TypeId) -> TypeId {
    match db.lookup(ty) {
        Some(TypeKey::Class(shape_id)) => {
            let shape = db.class_shape(shape_id);
            if !shape.is_instantiable() {
                return ty;
            }
            let mut instance = (*shape).clone();
            instance.flags.remove(ClassFlags::INSTANTIABLE);
            db.class(instance)
        }
        Some(TypeKey::None {
            instantiable: true,
            conditions,
        }) => db.none_with_conditions(conditions),
        Some(TypeKey::TypeVar(shape_id)) => {
            let shape = db.typevar_shape(shape_id);
            if !shape.instantiable {
                return ty;
            }
            let mut instance = (*shape).clone();
            instance.instantiable = false;
            db.type_var(instance)
        }
        Some(TypeKey::Union(_)) => map_subtypes(db, ty, |member| Some(to_instance(db, member))),
        _ => ty,
    }
}

/// Convert to instantiable form. `None` when the type has no class-object
/// counterpart (functions, modules).
pub fn to_instantiable(db: &dyn TypeDatabase, ty: TypeId) -> Option<TypeId> {
    match db.lookup(ty)? {
        TypeKey::Intrinsic(_) => Some(ty),
        TypeKey::Class(shape_id) => {
            let shape = db.class_shape(shape_id);
            if shape.is_instantiable() {
                return Some(ty);
            }
            let mut class = (*shape).clone();
            class.flags.insert(ClassFlags::INSTANTIABLE);
            // Literal instances widen to their class object.
            class.literal = None;
            Some(db.class(class))
        }
        TypeKey::None { conditions, .. } => Some(db.intern(TypeKey::None {
            instantiable: true,
            conditions,
        })),
        TypeKey::TypeVar(shape_id) => {
            let shape = db.typevar_shape(shape_id);
            if shape.instantiable {
                return Some(ty);
            }
            let mut instantiable = (*shape).clone();
            instantiable.instantiable = true;
            Some(db.type_var(instantiable))
        }
        TypeKey::Union(list) => {
            let members = db.type_list(list);
            let mut converted = Vec::with_capacity(members.len());
            for &member in members.iter() {
                converted.push(to_instantiable(db, member)?);
            }
            Some(db.union(converted))
        }
        TypeKey::Module(_) | TypeKey::Function(_) | TypeKey::Overloaded(_) => None,
    }
}

/// Replace a class's explicit type arguments.
pub fn specialize(db: &dyn TypeDatabase, ty: TypeId, args: Vec<TypeId>) -> TypeId {
    let Some(shape) = class_shape_of(db, ty) else {
        return ty;
    };
    let mut specialized = (*shape).clone();
    specialized.type_args = Some(args);
    db.class(specialized)
}

pub fn conditions_of(db: &dyn TypeDatabase, ty: TypeId) -> Option<ConditionListId> {
    match db.lookup(ty)? {
        TypeKey::Class(shape_id) => db.class_shape(shape_id).conditions,
        TypeKey::None { conditions, .. } => conditions,
        _ => None,
    }
}

/// Attach (replace) narrowing provenance on a class or `None` type.
/// Identity for types that cannot carry conditions.
pub fn with_conditions(
    db: &dyn TypeDatabase,
    ty: TypeId,
    conditions: Option<ConditionListId>,
) -> TypeId {
    match db.lookup(ty) {
        Some(TypeKey::Class(shape_id)) => {
            let shape = db.class_shape(shape_id);
            if shape.conditions == conditions {
                return ty;
            }
            let mut updated = (*shape).clone();
            updated.conditions = conditions;
            db.class(updated)
        }
        Some(TypeKey::None { instantiable, .. }) => db.intern(TypeKey::None {
            instantiable,
            conditions,
        }),
        _ => ty,
    }
}

/// Replace the TypedDict narrowing delta.
pub fn with_narrowed_entries(
    db: &dyn TypeDatabase,
    ty: TypeId,
    entries: Vec<NarrowedEntry>,
) -> TypeId {
    let Some(shape) = class_shape_of(db, ty) else {
        return ty;
    };
    let mut updated = (*shape).clone();
    updated.narrowed_entries = if entries.is_empty() {
        None
    } else {
        Some(entries)
    };
    db.class(updated)
}

/// A TypedDict entry as seen through the narrowing delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypedDictMember {
    pub name: pyty_common::Atom,
    pub value_type: TypeId,
    pub is_required: bool,
    pub is_provided: bool,
}

/// Declared TypedDict entries merged with the narrowing delta. A key
/// absent from the delta inherits its declared required-ness.
pub fn typed_dict_members(
    db: &dyn TypeDatabase,
    shape: &ClassShape,
    allow_narrowed: bool,
) -> Vec<TypedDictMember> {
    let declared = shape.td_entries.as_deref().unwrap_or(&[]);
    let mut members: Vec<TypedDictMember> = declared
        .iter()
        .map(|entry| TypedDictMember {
            name: entry.name,
            value_type: entry.value_type,
            is_required: entry.required,
            is_provided: entry.required,
        })
        .collect();
    if allow_narrowed {
        if let Some(narrowed) = &shape.narrowed_entries {
            for delta in narrowed {
                match members.iter_mut().find(|member| member.name == delta.name) {
                    Some(member) => member.is_provided |= delta.is_provided,
                    None => members.push(TypedDictMember {
                        name: delta.name,
                        value_type: TypeId::UNKNOWN,
                        is_required: false,
                        is_provided: delta.is_provided,
                    }),
                }
            }
        }
    }
    members
}

/// Whether `shape` is `def_id` itself or derives from it.
pub fn derives_from(db: &dyn TypeDatabase, shape: &ClassShape, def_id: DefId) -> bool {
    if shape.def_id == def_id {
        return true;
    }
    shape.mro.iter().any(|&ancestor| {
        class_shape_of(db, ancestor).is_some_and(|ancestor_shape| ancestor_shape.def_id == def_id)
    })
}

/// The MRO entry (or the class itself) matching `def_id`.
pub fn mro_entry(db: &dyn TypeDatabase, ty: TypeId, def_id: DefId) -> Option<TypeId> {
    let shape = class_shape_of(db, ty)?;
    if shape.def_id == def_id {
        return Some(ty);
    }
    shape.mro.iter().copied().find(|&ancestor| {
        class_shape_of(db, ancestor).is_some_and(|ancestor_shape| ancestor_shape.def_id == def_id)
    })
}

/// Member lookup through the MRO: own fields first, then ancestors.
pub fn lookup_member(
    db: &dyn TypeDatabase,
    shape: &ClassShape,
    name: pyty_common::Atom,
) -> Option<TypeId> {
    if let Some(ty) = shape.field(name) {
        return Some(ty);
    }
    for &ancestor in &shape.mro {
        if let Some(ancestor_shape) = class_shape_of(db, ancestor) {
            if let Some(ty) = ancestor_shape.field(name) {
                return Some(ty);
            }
        }
    }
    None
}

/// Whether the class's ancestry passes through `Any`/`Unknown` (an
/// unresolved import in a base-class list).
pub fn derives_from_any(db: &dyn TypeDatabase, ty: TypeId) -> bool {
    if ty.is_any_or_unknown() {
        return true;
    }
    class_shape_of(db, ty)
        .is_some_and(|shape| shape.mro.iter().any(|ancestor| ancestor.is_any_or_unknown()))
}

/// Whether any part of the type is `Unknown`.
pub fn is_partly_unknown(db: &dyn TypeDatabase, ty: TypeId) -> bool {
    if ty.is_unknown() {
        return true;
    }
    match db.lookup(ty) {
        Some(TypeKey::Union(list)) => db
            .type_list(list)
            .iter()
            .any(|&member| is_partly_unknown(db, member)),
        Some(TypeKey::Class(shape_id)) => {
            let shape = db.class_shape(shape_id);
            shape
                .type_args
                .iter()
                .flatten()
                .any(|&arg| is_partly_unknown(db, arg))
                || shape
                    .tuple_args
                    .iter()
                    .flatten()
                    .any(|arg| is_partly_unknown(db, arg.ty))
        }
        _ => false,
    }
}

/// Whether any part of the type is `Any` or `Unknown`.
pub fn contains_any_or_unknown(db: &dyn TypeDatabase, ty: TypeId) -> bool {
    if ty.is_any_or_unknown() {
        return true;
    }
    match db.lookup(ty) {
        Some(TypeKey::Union(list)) => db
            .type_list(list)
            .iter()
            .any(|&member| contains_any_or_unknown(db, member)),
        Some(TypeKey::Class(shape_id)) => {
            let shape = db.class_shape(shape_id);
            shape
                .type_args
                .iter()
                .flatten()
                .any(|&arg| contains_any_or_unknown(db, arg))
                || shape
                    .tuple_args
                    .iter()
                    .flatten()
                    .any(|arg| contains_any_or_unknown(db, arg.ty))
        }
        _ => false,
    }
}

/// Whether any TypeVar inside `ty` (union members, class type arguments,
/// tuple elements, function parameters and returns) satisfies `pred`.
pub fn any_type_var(
    db: &dyn TypeDatabase,
    ty: TypeId,
    pred: &mut dyn FnMut(&TypeVarShape) -> bool,
) -> bool {
    any_type_var_bounded(db, ty, pred, 0)
}

fn any_type_var_bounded(
    db: &dyn TypeDatabase,
    ty: TypeId,
    pred: &mut dyn FnMut(&TypeVarShape) -> bool,
    depth: u32,
) -> bool {
    if depth > crate::limits::MAX_TYPE_RECURSION_COUNT {
        return false;
    }
    match db.lookup(ty) {
        Some(TypeKey::TypeVar(shape_id)) => pred(&db.typevar_shape(shape_id)),
        Some(TypeKey::Union(list)) => db
            .type_list(list)
            .iter()
            .any(|&member| any_type_var_bounded(db, member, pred, depth + 1)),
        Some(TypeKey::Class(shape_id)) => {
            let shape = db.class_shape(shape_id);
            shape
                .type_args
                .iter()
                .flatten()
                .any(|&arg| any_type_var_bounded(db, arg, pred, depth + 1))
                || shape
                    .tuple_args
                    .iter()
                    .flatten()
                    .any(|arg| any_type_var_bounded(db, arg.ty, pred, depth + 1))
        }
        Some(TypeKey::Function(shape_id)) => {
            let shape = db.function_shape(shape_id);
            shape
                .params
                .iter()
                .any(|param| any_type_var_bounded(db, param.ty, pred, depth + 1))
                || any_type_var_bounded(db, shape.return_type, pred, depth + 1)
        }
        _ => false,
    }
}

/// Enumerate the finite literal space of a class: the two bool literals,
/// or every member of an enum. `None` for classes with unbounded literal
/// spaces.
pub fn enumerate_literal_members(
    db: &dyn TypeDatabase,
    builtins: &crate::builtins::Builtins,
    ty: TypeId,
) -> Option<Vec<TypeId>> {
    let shape = class_shape_of(db, ty)?;
    if shape.def_id == builtins.bool_def {
        return Some(vec![builtins.true_literal, builtins.false_literal]);
    }
    if shape.flags.contains(ClassFlags::ENUM) {
        // Enum members are the non-callable, non-dunder fields; each
        // becomes a literal-valued instance of the enum class.
        let mut members = Vec::new();
        for &(field_name, field_ty) in &shape.fields {
            if is_function_like(db, field_ty) {
                continue;
            }
            let name = db.resolve_atom(field_name);
            if name.starts_with("__") && name.ends_with("__") {
                continue;
            }
            let mut literal = (*shape).clone();
            literal.literal = Some(LiteralValue::EnumMember(field_name));
            literal.flags.remove(ClassFlags::INSTANTIABLE);
            literal.conditions = None;
            members.push(db.class(literal));
        }
        return Some(members);
    }
    None
}
