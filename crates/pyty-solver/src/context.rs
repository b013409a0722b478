//! Per-solve type-variable bindings.
//!
//! A `TypeVarContext` lives for one assignability or call-matching task:
//! created by the caller, mutated by the solver, optionally sealed with
//! `lock`, and discarded (or cloned for rollback) when the task ends.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::types::{FunctionFlags, ParamInfo, ScopeId, TypeId, TypeVarShapeId};

/// Bounds recorded for one type variable.
///
/// `narrow` only ever widens and `wide` only ever tightens across solver
/// calls; the solver verifies `narrow <: wide` before writing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeVarBinding {
    pub narrow: Option<TypeId>,
    pub wide: Option<TypeId>,
    /// Keep literal values in future bounds for this variable.
    pub retain_literals: bool,
}

/// A parameter list captured for a ParamSpec.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParamSpecBinding {
    pub params: Vec<ParamInfo>,
    pub flags: FunctionFlags,
    pub scope_id: Option<ScopeId>,
    /// Forwarded ParamSpec, when the captured list ends in `*args: P.args,
    /// **kwargs: P.kwargs`.
    pub param_spec: Option<TypeId>,
}

#[derive(Clone, Debug, Default)]
pub struct TypeVarContext {
    solve_for_scopes: FxHashSet<ScopeId>,
    bindings: FxHashMap<TypeVarShapeId, TypeVarBinding>,
    param_specs: FxHashMap<TypeVarShapeId, ParamSpecBinding>,
    locked: bool,
}

impl TypeVarContext {
    pub fn new(scope: ScopeId) -> Self {
        let mut context = TypeVarContext::default();
        context.solve_for_scopes.insert(scope);
        context
    }

    pub fn with_scopes(scopes: impl IntoIterator<Item = ScopeId>) -> Self {
        let mut context = TypeVarContext::default();
        context.solve_for_scopes.extend(scopes);
        context
    }

    pub fn add_solve_for_scope(&mut self, scope: ScopeId) {
        self.solve_for_scopes.insert(scope);
    }

    pub fn has_solve_for_scope(&self, scope: ScopeId) -> bool {
        self.solve_for_scopes.contains(&scope)
    }

    pub fn solve_for_scopes(&self) -> impl Iterator<Item = ScopeId> + '_ {
        self.solve_for_scopes.iter().copied()
    }

    pub fn get(&self, type_var: TypeVarShapeId) -> Option<&TypeVarBinding> {
        self.bindings.get(&type_var)
    }

    pub fn get_param_spec(&self, type_var: TypeVarShapeId) -> Option<&ParamSpecBinding> {
        self.param_specs.get(&type_var)
    }

    /// Replace a binding. Silently does nothing when locked; the solver
    /// treats a locked context as validate-only.
    pub fn set(
        &mut self,
        type_var: TypeVarShapeId,
        narrow: Option<TypeId>,
        wide: Option<TypeId>,
        retain_literals: bool,
    ) {
        if self.locked {
            return;
        }
        self.bindings.insert(
            type_var,
            TypeVarBinding {
                narrow,
                wide,
                retain_literals,
            },
        );
    }

    pub fn set_param_spec(&mut self, type_var: TypeVarShapeId, binding: ParamSpecBinding) {
        if self.locked {
            return;
        }
        self.param_specs.insert(type_var, binding);
    }

    /// Seal the context: all further writes become no-ops.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.param_specs.is_empty()
    }

    pub fn bound_type_vars(&self) -> impl Iterator<Item = TypeVarShapeId> + '_ {
        self.bindings.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_context_refuses_writes() {
        let mut context = TypeVarContext::new(ScopeId(1));
        let tv = TypeVarShapeId(0);
        context.set(tv, Some(TypeId::ANY), None, false);
        context.lock();
        context.set(tv, Some(TypeId::NEVER), None, false);
        assert_eq!(context.get(tv).unwrap().narrow, Some(TypeId::ANY));
    }

    #[test]
    fn scope_membership() {
        let context = TypeVarContext::with_scopes([ScopeId(1), ScopeId(7)]);
        assert!(context.has_solve_for_scope(ScopeId(7)));
        assert!(!context.has_solve_for_scope(ScopeId(2)));
    }
}
