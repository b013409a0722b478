//! Interned type storage.
//!
//! `TypeInterner` owns the key table and the shape pools. It is
//! interior-mutable behind an `RwLock` so the engines can take `&dyn
//! TypeDatabase` everywhere; a single evaluator instance is
//! single-threaded (see the concurrency model), the lock just keeps the
//! storage honest.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use pyty_common::{Atom, Interner, Span};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::builtins::{self, Builtins};
use crate::db::TypeDatabase;
use crate::types::{
    ClassFlags, ClassShape, ClassShapeId, Condition, ConditionListId, DefId, FunctionShape,
    FunctionShapeId, IntrinsicKind, LiteralValue, TypeId, TypeKey, TypeListId, TypeVarShape,
    TypeVarShapeId,
};

#[derive(Default)]
struct Inner {
    keys: Vec<Option<TypeKey>>,
    ids: FxHashMap<TypeKey, TypeId>,

    type_lists: Vec<Arc<[TypeId]>>,
    type_list_ids: FxHashMap<Arc<[TypeId]>, TypeListId>,

    class_shapes: Vec<Arc<ClassShape>>,
    class_shape_ids: FxHashMap<Arc<ClassShape>, ClassShapeId>,

    function_shapes: Vec<Arc<FunctionShape>>,
    function_shape_ids: FxHashMap<Arc<FunctionShape>, FunctionShapeId>,

    typevar_shapes: Vec<Arc<TypeVarShape>>,
    typevar_shape_ids: FxHashMap<Arc<TypeVarShape>, TypeVarShapeId>,

    condition_lists: Vec<Arc<[Condition]>>,
    condition_list_ids: FxHashMap<Arc<[Condition]>, ConditionListId>,

    intersection_defs: FxHashMap<(Atom, Span, Atom), DefId>,
    alias_targets: FxHashMap<TypeVarShapeId, TypeId>,
}

/// In-memory implementation of [`TypeDatabase`].
pub struct TypeInterner {
    strings: Interner,
    inner: RwLock<Inner>,
    next_def: AtomicU32,
    builtins: Builtins,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self::with_strings(Interner::new())
    }

    /// Build an interner sharing the given string table (typically the
    /// parse arena's interner, so member-name atoms line up).
    pub fn with_strings(strings: Interner) -> Self {
        let mut inner = Inner::default();
        inner.keys.resize(TypeId::FIRST_USER as usize, None);

        let mut seed = |id: TypeId, key: TypeKey| {
            inner.keys[id.0 as usize] = Some(key.clone());
            inner.ids.insert(key, id);
        };
        seed(TypeId::ANY, TypeKey::Intrinsic(IntrinsicKind::Any));
        seed(TypeId::UNKNOWN, TypeKey::Intrinsic(IntrinsicKind::Unknown));
        seed(TypeId::NEVER, TypeKey::Intrinsic(IntrinsicKind::Never));
        seed(
            TypeId::NONE,
            TypeKey::None {
                instantiable: false,
                conditions: None,
            },
        );
        seed(
            TypeId::NONE_TYPE,
            TypeKey::None {
                instantiable: true,
                conditions: None,
            },
        );

        let mut interner = TypeInterner {
            strings,
            inner: RwLock::new(inner),
            next_def: AtomicU32::new(0),
            builtins: Builtins::placeholder(),
        };
        interner.builtins = builtins::install(&interner);
        interner
    }

    /// Well-known builtin types, installed at construction.
    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    /// The shared string table.
    pub fn strings(&self) -> &Interner {
        &self.strings
    }

    fn intern_type_list(&self, members: Vec<TypeId>) -> TypeListId {
        let arc: Arc<[TypeId]> = members.into();
        let mut inner = self.inner.write().unwrap();
        if let Some(&id) = inner.type_list_ids.get(&arc) {
            return id;
        }
        let id = TypeListId(inner.type_lists.len() as u32);
        inner.type_lists.push(arc.clone());
        inner.type_list_ids.insert(arc, id);
        id
    }

    fn intern_class_shape(&self, shape: ClassShape) -> ClassShapeId {
        let mut inner = self.inner.write().unwrap();
        if let Some(&id) = inner.class_shape_ids.get(&shape) {
            return id;
        }
        let arc = Arc::new(shape);
        let id = ClassShapeId(inner.class_shapes.len() as u32);
        inner.class_shapes.push(arc.clone());
        inner.class_shape_ids.insert(arc, id);
        id
    }

    fn intern_function_shape(&self, shape: FunctionShape) -> FunctionShapeId {
        let mut inner = self.inner.write().unwrap();
        if let Some(&id) = inner.function_shape_ids.get(&shape) {
            return id;
        }
        let arc = Arc::new(shape);
        let id = FunctionShapeId(inner.function_shapes.len() as u32);
        inner.function_shapes.push(arc.clone());
        inner.function_shape_ids.insert(arc, id);
        id
    }

    fn intern_typevar_shape(&self, shape: TypeVarShape) -> TypeVarShapeId {
        let mut inner = self.inner.write().unwrap();
        if let Some(&id) = inner.typevar_shape_ids.get(&shape) {
            return id;
        }
        let arc = Arc::new(shape);
        let id = TypeVarShapeId(inner.typevar_shapes.len() as u32);
        inner.typevar_shapes.push(arc.clone());
        inner.typevar_shape_ids.insert(arc, id);
        id
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeDatabase for TypeInterner {
    fn intern(&self, key: TypeKey) -> TypeId {
        {
            let inner = self.inner.read().unwrap();
            if let Some(&id) = inner.ids.get(&key) {
                return id;
            }
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(&id) = inner.ids.get(&key) {
            return id;
        }
        let id = TypeId(inner.keys.len() as u32);
        inner.keys.push(Some(key.clone()));
        inner.ids.insert(key, id);
        id
    }

    fn lookup(&self, id: TypeId) -> Option<TypeKey> {
        self.inner
            .read()
            .unwrap()
            .keys
            .get(id.0 as usize)
            .and_then(|key| key.clone())
    }

    fn intern_string(&self, s: &str) -> Atom {
        self.strings.intern(s)
    }

    fn resolve_atom(&self, atom: Atom) -> Arc<str> {
        self.strings.resolve(atom)
    }

    fn type_list(&self, id: TypeListId) -> Arc<[TypeId]> {
        self.inner.read().unwrap().type_lists[id.0 as usize].clone()
    }

    fn class_shape(&self, id: ClassShapeId) -> Arc<ClassShape> {
        self.inner.read().unwrap().class_shapes[id.0 as usize].clone()
    }

    fn function_shape(&self, id: FunctionShapeId) -> Arc<FunctionShape> {
        self.inner.read().unwrap().function_shapes[id.0 as usize].clone()
    }

    fn typevar_shape(&self, id: TypeVarShapeId) -> Arc<TypeVarShape> {
        self.inner.read().unwrap().typevar_shapes[id.0 as usize].clone()
    }

    fn condition_list(&self, id: ConditionListId) -> Arc<[Condition]> {
        self.inner.read().unwrap().condition_lists[id.0 as usize].clone()
    }

    fn class(&self, mut shape: ClassShape) -> TypeId {
        // A literal-valued instance is never instantiable (the literal
        // describes a value, not a class object).
        if shape.literal.is_some() && shape.flags.contains(ClassFlags::INSTANTIABLE) {
            shape.literal = None;
        }
        let id = self.intern_class_shape(shape);
        self.intern(TypeKey::Class(id))
    }

    fn function(&self, shape: FunctionShape) -> TypeId {
        let id = self.intern_function_shape(shape);
        self.intern(TypeKey::Function(id))
    }

    fn type_var(&self, shape: TypeVarShape) -> TypeId {
        let id = self.intern_typevar_shape(shape);
        self.intern(TypeKey::TypeVar(id))
    }

    fn module(&self, name: Atom) -> TypeId {
        self.intern(TypeKey::Module(name))
    }

    fn union(&self, members: Vec<TypeId>) -> TypeId {
        let mut flat: Vec<TypeId> = Vec::with_capacity(members.len());
        let mut seen: FxHashSet<TypeId> = FxHashSet::default();
        let mut push_member = |flat: &mut Vec<TypeId>, seen: &mut FxHashSet<TypeId>, id: TypeId| {
            if id != TypeId::NEVER && seen.insert(id) {
                flat.push(id);
            }
        };
        for member in members {
            match self.lookup(member) {
                Some(TypeKey::Union(list)) => {
                    for &sub in self.type_list(list).iter() {
                        push_member(&mut flat, &mut seen, sub);
                    }
                }
                _ => push_member(&mut flat, &mut seen, member),
            }
        }

        // Absorb literal members whose literal-stripped base is also a
        // member (`Literal[1] | int` is just `int`).
        if flat.len() > 1 {
            let stripped: Vec<Option<TypeId>> = flat
                .iter()
                .map(|&member| match self.lookup(member) {
                    Some(TypeKey::Class(shape_id)) => {
                        let shape = self.class_shape(shape_id);
                        shape.literal.as_ref()?;
                        let mut base = (*shape).clone();
                        base.literal = None;
                        Some(self.class(base))
                    }
                    _ => None,
                })
                .collect();
            let flat_set = seen;
            let filtered: Vec<TypeId> = flat
                .iter()
                .zip(&stripped)
                .filter_map(|(&member, base)| match base {
                    Some(base) if flat_set.contains(base) => None,
                    _ => Some(member),
                })
                .collect();
            flat = filtered;
        }

        match flat.len() {
            0 => TypeId::NEVER,
            1 => flat[0],
            _ => {
                let list = self.intern_type_list(flat);
                self.intern(TypeKey::Union(list))
            }
        }
    }

    fn union2(&self, left: TypeId, right: TypeId) -> TypeId {
        if left == right {
            return left;
        }
        self.union(vec![left, right])
    }

    fn overloaded(&self, signatures: Vec<TypeId>) -> TypeId {
        let list = self.intern_type_list(signatures);
        self.intern(TypeKey::Overloaded(list))
    }

    fn none_with_conditions(&self, conditions: Option<ConditionListId>) -> TypeId {
        self.intern(TypeKey::None {
            instantiable: false,
            conditions,
        })
    }

    fn intern_conditions(&self, mut conditions: Vec<Condition>) -> ConditionListId {
        conditions.sort_unstable();
        conditions.dedup();
        let arc: Arc<[Condition]> = conditions.into();
        let mut inner = self.inner.write().unwrap();
        if let Some(&id) = inner.condition_list_ids.get(&arc) {
            return id;
        }
        let id = ConditionListId(inner.condition_lists.len() as u32);
        inner.condition_lists.push(arc.clone());
        inner.condition_list_ids.insert(arc, id);
        id
    }

    fn literal_bool(&self, value: bool) -> TypeId {
        if value {
            self.builtins.true_literal
        } else {
            self.builtins.false_literal
        }
    }

    fn literal_int(&self, value: i64) -> TypeId {
        let shape_id = match self.lookup(self.builtins.int_instance) {
            Some(TypeKey::Class(id)) => id,
            _ => return TypeId::UNKNOWN,
        };
        let mut shape = (*self.class_shape(shape_id)).clone();
        shape.literal = Some(LiteralValue::Int(value));
        self.class(shape)
    }

    fn literal_str(&self, value: &str) -> TypeId {
        let atom = self.intern_string(value);
        let shape_id = match self.lookup(self.builtins.str_instance) {
            Some(TypeKey::Class(id)) => id,
            _ => return TypeId::UNKNOWN,
        };
        let mut shape = (*self.class_shape(shape_id)).clone();
        shape.literal = Some(LiteralValue::Str(atom));
        self.class(shape)
    }

    fn fresh_def_id(&self) -> DefId {
        DefId(self.next_def.fetch_add(1, Ordering::Relaxed))
    }

    fn intersection_def_id(&self, key: (Atom, Span, Atom)) -> DefId {
        {
            let inner = self.inner.read().unwrap();
            if let Some(&def) = inner.intersection_defs.get(&key) {
                return def;
            }
        }
        let def = self.fresh_def_id();
        let mut inner = self.inner.write().unwrap();
        *inner.intersection_defs.entry(key).or_insert(def)
    }

    fn set_alias_target(&self, alias: TypeVarShapeId, target: TypeId) {
        self.inner
            .write()
            .unwrap()
            .alias_targets
            .insert(alias, target);
    }

    fn alias_target(&self, alias: TypeVarShapeId) -> Option<TypeId> {
        self.inner.read().unwrap().alias_targets.get(&alias).copied()
    }
}

#[cfg(test)]
#[path = "tests/intern_tests.rs"]
mod tests;
