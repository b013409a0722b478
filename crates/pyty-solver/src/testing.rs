//! Shared fixtures for the solver unit tests.

use pyty_common::CancellationToken;

use crate::builtins::Builtins;
use crate::db::TypeDatabase;
use crate::intern::TypeInterner;
use crate::narrow::NarrowingContext;
use crate::relate::AssignCheck;
use crate::solve::ConstraintSolver;
use crate::types::{
    ClassFlags, ClassShape, FunctionFlags, FunctionShape, LiteralValue, ParamCategory, ParamInfo,
    ScopeId, TupleArg, TypeGuardInfo, TypedDictEntry, TypeId, TypeVarFlags, TypeVarShape, Variance,
};

pub(crate) struct Fixture {
    pub db: TypeInterner,
    pub cancel: CancellationToken,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture {
            db: TypeInterner::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn builtins(&self) -> &Builtins {
        self.db.builtins()
    }

    pub fn relation(&self) -> AssignCheck<'_> {
        AssignCheck::new(&self.db, self.db.builtins(), &self.cancel)
    }

    pub fn solver(&self) -> ConstraintSolver<'_> {
        ConstraintSolver::new(&self.db, self.db.builtins(), &self.cancel)
    }

    pub fn narrowing(&self) -> NarrowingContext<'_> {
        NarrowingContext::new(&self.db, self.db.builtins(), &self.cancel)
    }

    fn bare_shape(&self, name: &str) -> ClassShape {
        ClassShape {
            def_id: self.db.fresh_def_id(),
            name: self.db.intern_string(name),
            flags: ClassFlags::empty(),
            type_params: Vec::new(),
            type_args: None,
            tuple_args: None,
            literal: None,
            td_entries: None,
            narrowed_entries: None,
            mro: vec![self.builtins().object_instance],
            fields: Vec::new(),
            conditions: None,
        }
    }

    /// A plain instance class deriving from `object`.
    pub fn class(&self, name: &str) -> TypeId {
        self.db.class(self.bare_shape(name))
    }

    pub fn class_deriving(&self, name: &str, base: TypeId) -> TypeId {
        let mut shape = self.bare_shape(name);
        let base_shape = crate::queries::class_shape_of(&self.db, base).unwrap();
        let mut mro = vec![base];
        mro.extend(base_shape.mro.iter().copied());
        shape.mro = mro;
        self.db.class(shape)
    }

    pub fn final_class(&self, name: &str) -> TypeId {
        let mut shape = self.bare_shape(name);
        shape.flags |= ClassFlags::FINAL;
        self.db.class(shape)
    }

    pub fn class_with_fields(&self, name: &str, fields: Vec<(&str, TypeId)>) -> TypeId {
        let mut shape = self.bare_shape(name);
        shape.fields = fields
            .into_iter()
            .map(|(field, ty)| (self.db.intern_string(field), ty))
            .collect();
        shape.fields.sort_by_key(|&(atom, _)| atom);
        self.db.class(shape)
    }

    pub fn generic_class(&self, name: &str, params: Vec<TypeId>, args: Option<Vec<TypeId>>) -> TypeId {
        let mut shape = self.bare_shape(name);
        shape.type_params = params;
        shape.type_args = args;
        self.db.class(shape)
    }

    pub fn tuple_of(&self, elements: &[TypeId]) -> TypeId {
        let shape = crate::queries::class_shape_of(&self.db, self.builtins().tuple_instance).unwrap();
        let mut tuple = (*shape).clone();
        tuple.tuple_args = Some(
            elements
                .iter()
                .map(|&ty| TupleArg {
                    ty,
                    is_unbounded: false,
                })
                .collect(),
        );
        self.db.class(tuple)
    }

    pub fn unbounded_tuple(&self, element: TypeId) -> TypeId {
        let shape = crate::queries::class_shape_of(&self.db, self.builtins().tuple_instance).unwrap();
        let mut tuple = (*shape).clone();
        tuple.tuple_args = Some(vec![TupleArg {
            ty: element,
            is_unbounded: true,
        }]);
        self.db.class(tuple)
    }

    pub fn specialized(&self, base: TypeId, args: Vec<TypeId>) -> TypeId {
        crate::queries::specialize(&self.db, base, args)
    }

    pub fn typed_dict(&self, name: &str, entries: Vec<(&str, TypeId, bool)>, is_final: bool) -> TypeId {
        let mut shape = self.bare_shape(name);
        shape.flags |= ClassFlags::TYPED_DICT;
        if is_final {
            shape.flags |= ClassFlags::FINAL;
        }
        shape.td_entries = Some(
            entries
                .into_iter()
                .map(|(key, value_type, required)| TypedDictEntry {
                    name: self.db.intern_string(key),
                    value_type,
                    required,
                })
                .collect(),
        );
        self.db.class(shape)
    }

    pub fn enum_class(&self, name: &str, members: Vec<&str>) -> TypeId {
        let mut shape = self.bare_shape(name);
        shape.flags |= ClassFlags::ENUM | ClassFlags::FINAL;
        shape.fields = members
            .into_iter()
            .map(|member| (self.db.intern_string(member), TypeId::UNKNOWN))
            .collect();
        shape.fields.sort_by_key(|&(atom, _)| atom);
        self.db.class(shape)
    }

    pub fn enum_member(&self, enum_class: TypeId, member: &str) -> TypeId {
        let shape = crate::queries::class_shape_of(&self.db, enum_class).unwrap();
        let mut literal = (*shape).clone();
        literal.literal = Some(LiteralValue::EnumMember(self.db.intern_string(member)));
        self.db.class(literal)
    }

    pub fn type_var(&self, name: &str, scope: ScopeId) -> TypeId {
        self.db.type_var(TypeVarShape {
            name: self.db.intern_string(name),
            scope_id: Some(scope),
            bound: None,
            constraints: Vec::new(),
            variance: Variance::Invariant,
            flags: TypeVarFlags::empty(),
            synthesized_index: None,
            instantiable: false,
        })
    }

    pub fn bounded_type_var(&self, name: &str, scope: ScopeId, bound: TypeId) -> TypeId {
        self.db.type_var(TypeVarShape {
            name: self.db.intern_string(name),
            scope_id: Some(scope),
            bound: Some(bound),
            constraints: Vec::new(),
            variance: Variance::Invariant,
            flags: TypeVarFlags::empty(),
            synthesized_index: None,
            instantiable: false,
        })
    }

    pub fn constrained_type_var(&self, name: &str, scope: ScopeId, constraints: Vec<TypeId>) -> TypeId {
        self.db.type_var(TypeVarShape {
            name: self.db.intern_string(name),
            scope_id: Some(scope),
            bound: None,
            constraints,
            variance: Variance::Invariant,
            flags: TypeVarFlags::empty(),
            synthesized_index: None,
            instantiable: false,
        })
    }

    pub fn variant_type_var(&self, name: &str, scope: ScopeId, variance: Variance) -> TypeId {
        self.db.type_var(TypeVarShape {
            name: self.db.intern_string(name),
            scope_id: Some(scope),
            bound: None,
            constraints: Vec::new(),
            variance,
            flags: TypeVarFlags::empty(),
            synthesized_index: None,
            instantiable: false,
        })
    }

    pub fn guard_function(&self, guarded: TypeId, is_strict: bool) -> TypeId {
        self.db.function(FunctionShape {
            params: vec![ParamInfo {
                category: ParamCategory::Simple,
                name: None,
                ty: TypeId::ANY,
                has_default: false,
            }],
            return_type: self.builtins().bool_instance,
            flags: FunctionFlags::empty(),
            type_guard: Some(TypeGuardInfo { guarded, is_strict }),
            param_spec: None,
        })
    }

    pub fn union(&self, members: Vec<TypeId>) -> TypeId {
        self.db.union(members)
    }

    pub fn display(&self, ty: TypeId) -> String {
        crate::display::format_type(&self.db, ty)
    }
}
