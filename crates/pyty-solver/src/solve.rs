//! The constraint solver.
//!
//! `assign_type_var` maintains a pair of monotone bounds per type
//! variable: the narrow bound only widens, the wide bound only tightens,
//! and `narrow <: wide` is checked before every write. Constrained
//! TypeVars bypass bound maintenance and instead map source subtypes onto
//! their closed constraint set. A failed call leaves the context
//! untouched.

use pyty_common::{CancellationToken, DiagnosticAddendum};
use tracing::{trace, trace_span};

use crate::builtins::Builtins;
use crate::context::{ParamSpecBinding, TypeVarContext};
use crate::db::TypeDatabase;
use crate::display::format_type;
use crate::limits::{MAX_SUBTYPES_FOR_INFERRED_TYPE, MAX_TYPE_RECURSION_COUNT};
use crate::queries::{
    class_shape_of, conditions_of, derives_from_any, is_partly_unknown, literal_of, strip_literals,
    to_instantiable, typevar_shape_id_of, union_members,
};
use crate::relate::{apply_bindings, AssignCheck};
use crate::types::{
    ParamCategory, ScopeId, TupleArg, TypeId, TypeKey, TypeVarFlags, TypeVarShape, TypeVarShapeId,
    Variance,
};

bitflags::bitflags! {
    /// Behaviour flags threaded through assignability and the solver.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AssignFlags: u16 {
        const DEFAULT = 0;
        /// Source TypeVars bind instead of destination TypeVars; bound
        /// updates land on the wide bound.
        const REVERSE_TYPE_VAR_MATCHING = 1 << 0;
        /// Compare TypeVars by their expansions instead of binding them.
        const SKIP_SOLVE_TYPE_VARS      = 1 << 1;
        /// Accept bindings for TypeVars outside the solve-for scopes.
        const IGNORE_TYPE_VAR_SCOPE     = 1 << 2;
        /// Permit the narrow bound to tighten (wide-bound update mode).
        const ALLOW_TYPE_VAR_NARROWING  = 1 << 3;
        /// Keep literal values in inferred bounds.
        const RETAIN_LITERALS_FOR_TYPE_VAR = 1 << 4;
        /// Solving backwards from an expected type.
        const POPULATING_EXPECTED_TYPE  = 1 << 5;
        /// Type arguments in an invariant position: require mutual
        /// assignability.
        const ENFORCE_INVARIANCE        = 1 << 6;
    }
}

/// The bounds-maintenance engine. Cheap to construct; all state lives in
/// the `TypeVarContext` passed to each call.
pub struct ConstraintSolver<'a> {
    pub db: &'a dyn TypeDatabase,
    pub builtins: &'a Builtins,
    pub cancel: &'a CancellationToken,
}

impl<'a> ConstraintSolver<'a> {
    pub fn new(
        db: &'a dyn TypeDatabase,
        builtins: &'a Builtins,
        cancel: &'a CancellationToken,
    ) -> Self {
        ConstraintSolver {
            db,
            builtins,
            cancel,
        }
    }

    fn relation(&self) -> AssignCheck<'a> {
        AssignCheck::new(self.db, self.builtins, self.cancel)
    }

    /// Update `ctx` so that `src` is assignable to the TypeVar `dest`.
    ///
    /// Returns false (and leaves the context unchanged) when no update
    /// can reconcile the new source with the existing bounds.
    pub fn assign_type_var(
        &self,
        dest: TypeId,
        src: TypeId,
        mut diag: Option<&mut DiagnosticAddendum>,
        ctx: &mut TypeVarContext,
        flags: AssignFlags,
        recursion: u32,
    ) -> bool {
        if self.cancel.is_cancelled() || recursion > MAX_TYPE_RECURSION_COUNT {
            return true;
        }
        let Some(shape_id) = typevar_shape_id_of(self.db, dest) else {
            return false;
        };
        let tv = self.db.typevar_shape(shape_id);
        let _span = trace_span!("assign_type_var", dest = dest.0, src = src.0).entered();

        if flags.contains(AssignFlags::SKIP_SOLVE_TYPE_VARS) {
            let relation = self.relation();
            let dest_concrete = relation.concretize(dest, Some(ctx));
            let src_concrete = relation.concretize(src, None);
            return relation.assign(
                dest_concrete,
                src_concrete,
                diag,
                None,
                None,
                flags.difference(AssignFlags::SKIP_SOLVE_TYPE_VARS),
                recursion + 1,
            );
        }

        // Scope check: a TypeVar not owned by this solve never binds.
        let in_scope = tv
            .scope_id
            .is_some_and(|scope| ctx.has_solve_for_scope(scope));
        if !in_scope {
            if src.is_any_or_unknown() || derives_from_any(self.db, src) {
                return true;
            }
            if flags
                .intersects(AssignFlags::REVERSE_TYPE_VAR_MATCHING | AssignFlags::IGNORE_TYPE_VAR_SCOPE)
            {
                let relation = self.relation();
                let dest_concrete = relation.concretize(dest, None);
                let src_concrete = relation.concretize(src, None);
                return relation.assign(
                    dest_concrete,
                    src_concrete,
                    diag,
                    None,
                    None,
                    AssignFlags::DEFAULT,
                    recursion + 1,
                );
            }
            if !tv.is_synthesized() {
                if let Some(diag) = diag.as_deref_mut() {
                    diag.add_message(format!(
                        "type variable \"{}\" is bound to a scope this assignment cannot solve for",
                        self.db.resolve_atom(tv.name)
                    ));
                }
            }
            return false;
        }

        // A variadic TypeVar packages a plain source into a one-element
        // unpacked tuple.
        let mut src = src;
        if tv.is_variadic() && !crate::queries::is_tuple_class(self.db, src) {
            src = self.synthesize_tuple(vec![TupleArg {
                ty: src,
                is_unbounded: false,
            }]);
        }

        // A bare `type` source assigned to an instantiable TypeVar
        // carries no class information; treat it as `Any`.
        if tv.instantiable {
            if let Some(shape) = class_shape_of(self.db, src) {
                if shape.def_id == self.builtins.type_def
                    && !shape.is_instantiable()
                    && shape.type_args.is_none()
                {
                    src = TypeId::ANY;
                }
            }
        }

        if tv.is_constrained() {
            return self.assign_constrained(&tv, shape_id, src, diag, ctx, recursion);
        }
        self.assign_unconstrained(&tv, shape_id, src, diag, ctx, flags, recursion)
    }

    fn assign_constrained(
        &self,
        tv: &TypeVarShape,
        shape_id: TypeVarShapeId,
        src: TypeId,
        mut diag: Option<&mut DiagnosticAddendum>,
        ctx: &mut TypeVarContext,
        recursion: u32,
    ) -> bool {
        let relation = self.relation();

        // A source TypeVar that satisfies the destination's constraints
        // under a fresh context binds as itself (e.g. AnyStr to AnyStr).
        if let Some(src_shape_id) = typevar_shape_id_of(self.db, src) {
            let src_tv = self.db.typevar_shape(src_shape_id);
            let compatible = src_tv.constraints.iter().all(|&src_constraint| {
                tv.constraints.iter().any(|&dest_constraint| {
                    relation.assign(
                        dest_constraint,
                        src_constraint,
                        None,
                        None,
                        None,
                        AssignFlags::DEFAULT,
                        recursion + 1,
                    )
                })
            });
            if compatible && !src_tv.constraints.is_empty() {
                return self.commit_constrained(shape_id, src, diag, ctx, recursion);
            }
        }

        // Map each source subtype onto the narrowest accepting constraint.
        let mut chosen: Option<usize> = None;
        let mut conditional_choices: Vec<usize> = Vec::new();
        for subtype in union_members(self.db, src) {
            let accepting: Vec<usize> = tv
                .constraints
                .iter()
                .enumerate()
                .filter(|&(_, &constraint)| {
                    relation.assign(
                        constraint,
                        subtype,
                        None,
                        None,
                        None,
                        AssignFlags::DEFAULT,
                        recursion + 1,
                    )
                })
                .map(|(index, _)| index)
                .collect();
            let narrowest = accepting.iter().copied().find(|&candidate| {
                !accepting.iter().any(|&other| {
                    other != candidate
                        && relation.assign(
                            tv.constraints[candidate],
                            tv.constraints[other],
                            None,
                            None,
                            None,
                            AssignFlags::DEFAULT,
                            recursion + 1,
                        )
                        && !relation.assign(
                            tv.constraints[other],
                            tv.constraints[candidate],
                            None,
                            None,
                            None,
                            AssignFlags::DEFAULT,
                            recursion + 1,
                        )
                })
            });
            let Some(index) = narrowest else {
                continue;
            };
            // Conditioned subtypes (residues of another constrained
            // TypeVar) may each pick their own constraint; unconditional
            // subtypes must agree.
            if conditions_of(self.db, subtype).is_some() {
                conditional_choices.push(index);
                continue;
            }
            match chosen {
                None => chosen = Some(index),
                Some(existing) if existing == index => {}
                Some(existing) => {
                    if let Some(diag) = diag.as_deref_mut() {
                        diag.add_message(format!(
                            "type \"{}\" matches both constraint \"{}\" and constraint \"{}\" of \"{}\"",
                            format_type(self.db, src),
                            format_type(self.db, tv.constraints[existing]),
                            format_type(self.db, tv.constraints[index]),
                            self.db.resolve_atom(tv.name),
                        ));
                    }
                    return false;
                }
            }
        }

        let selected = chosen.or_else(|| {
            // No per-subtype match: accept a constraint that takes the
            // union as a whole.
            tv.constraints.iter().enumerate().find_map(|(index, &constraint)| {
                relation
                    .assign(
                        constraint,
                        src,
                        None,
                        None,
                        None,
                        AssignFlags::DEFAULT,
                        recursion + 1,
                    )
                    .then_some(index)
            })
        });
        let selected = match (selected, conditional_choices.first()) {
            (Some(index), _) => index,
            (None, Some(&index)) => index,
            (None, None) => {
                if let Some(diag) = diag.as_deref_mut() {
                    diag.add_message(format!(
                        "type \"{}\" satisfies no constraint of \"{}\"",
                        format_type(self.db, src),
                        self.db.resolve_atom(tv.name),
                    ));
                }
                return false;
            }
        };

        let binding = crate::queries::with_conditions(
            self.db,
            tv.constraints[selected],
            Some(self.db.intern_conditions(vec![crate::types::Condition {
                type_var: shape_id,
                constraint_index: selected as u32,
            }])),
        );
        self.commit_constrained(shape_id, binding, diag, ctx, recursion)
    }

    fn commit_constrained(
        &self,
        shape_id: TypeVarShapeId,
        new_binding: TypeId,
        mut diag: Option<&mut DiagnosticAddendum>,
        ctx: &mut TypeVarContext,
        recursion: u32,
    ) -> bool {
        let relation = self.relation();
        let retain = ctx.get(shape_id).is_some_and(|b| b.retain_literals);
        let resolved = match ctx.get(shape_id).and_then(|binding| binding.narrow) {
            None => new_binding,
            Some(current) => {
                if relation.assign(
                    current,
                    new_binding,
                    None,
                    None,
                    None,
                    AssignFlags::DEFAULT,
                    recursion + 1,
                ) {
                    current
                } else if relation.assign(
                    new_binding,
                    current,
                    None,
                    None,
                    None,
                    AssignFlags::DEFAULT,
                    recursion + 1,
                ) {
                    // The new binding is wider: widen to it.
                    new_binding
                } else {
                    if let Some(diag) = diag.as_deref_mut() {
                        diag.add_message(format!(
                            "constraint binding \"{}\" is incompatible with previous binding \"{}\"",
                            format_type(self.db, new_binding),
                            format_type(self.db, current),
                        ));
                    }
                    return false;
                }
            }
        };
        ctx.set(shape_id, Some(resolved), None, retain);
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn assign_unconstrained(
        &self,
        tv: &TypeVarShape,
        shape_id: TypeVarShapeId,
        src: TypeId,
        mut diag: Option<&mut DiagnosticAddendum>,
        ctx: &mut TypeVarContext,
        flags: AssignFlags,
        recursion: u32,
    ) -> bool {
        let relation = self.relation();
        let current = ctx.get(shape_id).cloned().unwrap_or_default();

        let retain = flags.contains(AssignFlags::RETAIN_LITERALS_FOR_TYPE_VAR)
            || current.retain_literals
            || tv
                .bound
                .is_some_and(|bound| literal_of(self.db, bound).is_some());

        let mut adj_src = if retain {
            src
        } else {
            strip_literals(self.db, src)
        };

        if tv.instantiable {
            match to_instantiable(self.db, adj_src) {
                Some(converted) => adj_src = converted,
                None => {
                    if let Some(diag) = diag.as_deref_mut() {
                        diag.add_message(format!(
                            "type \"{}\" is not effectively instantiable",
                            format_type(self.db, src)
                        ));
                    }
                    return false;
                }
            }
        }

        let update_wide = flags
            .intersects(AssignFlags::REVERSE_TYPE_VAR_MATCHING | AssignFlags::ALLOW_TYPE_VAR_NARROWING);

        let (new_narrow, new_wide) = if update_wide {
            let new_wide = match current.wide {
                None => adj_src,
                Some(wide) if wide == adj_src => wide,
                Some(wide) => {
                    let src_concrete = relation.concretize(adj_src, None);
                    if relation.assign(
                        wide,
                        src_concrete,
                        None,
                        None,
                        None,
                        AssignFlags::DEFAULT,
                        recursion + 1,
                    ) {
                        // The new source is tighter: adopt it.
                        adj_src
                    } else if relation.assign(
                        adj_src,
                        wide,
                        None,
                        None,
                        None,
                        AssignFlags::DEFAULT,
                        recursion + 1,
                    ) {
                        wide
                    } else {
                        if let Some(diag) = diag.as_deref_mut() {
                            diag.add_message(format!(
                                "type \"{}\" is incompatible with wide bound \"{}\" of \"{}\"",
                                format_type(self.db, adj_src),
                                format_type(self.db, wide),
                                self.db.resolve_atom(tv.name),
                            ));
                        }
                        return false;
                    }
                }
            };
            if let Some(narrow) = current.narrow {
                if !relation.assign(
                    new_wide,
                    narrow,
                    None,
                    None,
                    None,
                    AssignFlags::DEFAULT,
                    recursion + 1,
                ) {
                    self.report_bound_conflict(diag.as_deref_mut(), tv, narrow, new_wide);
                    return false;
                }
            }
            (current.narrow, Some(new_wide))
        } else {
            let new_narrow = match current.narrow {
                None => adj_src,
                Some(narrow) => {
                    if relation.assign(
                        narrow,
                        adj_src,
                        None,
                        None,
                        None,
                        AssignFlags::DEFAULT,
                        recursion + 1,
                    ) {
                        // Prefer a fully-known source over a partly
                        // unknown existing bound.
                        if is_partly_unknown(self.db, narrow)
                            && !is_partly_unknown(self.db, adj_src)
                            && relation.assign(
                                adj_src,
                                narrow,
                                None,
                                None,
                                None,
                                AssignFlags::DEFAULT,
                                recursion + 1,
                            )
                        {
                            adj_src
                        } else {
                            narrow
                        }
                    } else {
                        if ctx.is_locked() {
                            if let Some(diag) = diag.as_deref_mut() {
                                diag.add_message(format!(
                                    "type \"{}\" cannot widen locked bound \"{}\"",
                                    format_type(self.db, adj_src),
                                    format_type(self.db, narrow),
                                ));
                            }
                            return false;
                        }
                        if tv.is_variadic() {
                            if let Some(diag) = diag.as_deref_mut() {
                                diag.add_message(format!(
                                    "variadic type variable \"{}\" does not accept widening",
                                    self.db.resolve_atom(tv.name),
                                ));
                            }
                            return false;
                        }
                        let combined = self.db.union2(narrow, adj_src);
                        let width = union_members(self.db, combined).len();
                        if width > MAX_SUBTYPES_FOR_INFERRED_TYPE && tv.bound.is_some() {
                            // Pathological union: widen to object.
                            trace!(
                                type_var = %self.db.resolve_atom(tv.name),
                                width,
                                "widening pathological union to object"
                            );
                            self.builtins.object_instance
                        } else {
                            combined
                        }
                    }
                }
            };
            if let Some(wide) = current.wide {
                let within = new_narrow == wide
                    || union_members(self.db, new_narrow).contains(&wide)
                    || relation.assign(
                        wide,
                        new_narrow,
                        None,
                        None,
                        None,
                        AssignFlags::DEFAULT,
                        recursion + 1,
                    );
                if !within {
                    self.report_bound_conflict(diag.as_deref_mut(), tv, new_narrow, wide);
                    return false;
                }
            }
            (Some(new_narrow), current.wide)
        };

        // The declared upper bound must accept the surviving binding.
        if let Some(bound) = tv.bound {
            let surviving = new_narrow.or(new_wide);
            if let Some(surviving) = surviving {
                let concrete = relation.concretize(surviving, Some(ctx));
                let ok = if tv.flags.contains(TypeVarFlags::SYNTHESIZED_SELF) {
                    // The Self bound may itself bind other in-scope
                    // TypeVars; reuse the ambient context.
                    relation.assign(
                        bound,
                        concrete,
                        None,
                        Some(ctx),
                        None,
                        flags,
                        recursion + 1,
                    )
                } else {
                    relation.assign(
                        bound,
                        concrete,
                        None,
                        None,
                        None,
                        AssignFlags::DEFAULT,
                        recursion + 1,
                    )
                };
                if !ok {
                    if !tv.is_synthesized() {
                        if let Some(diag) = diag.as_deref_mut() {
                            diag.add_message(format!(
                                "type \"{}\" is not assignable to the bound \"{}\" of \"{}\"",
                                format_type(self.db, concrete),
                                format_type(self.db, bound),
                                self.db.resolve_atom(tv.name),
                            ));
                        }
                    }
                    return false;
                }
            }
        }

        ctx.set(shape_id, new_narrow, new_wide, retain);
        true
    }

    fn report_bound_conflict(
        &self,
        diag: Option<&mut DiagnosticAddendum>,
        tv: &TypeVarShape,
        narrow: TypeId,
        wide: TypeId,
    ) {
        if let Some(diag) = diag {
            diag.add_message(format!(
                "narrow bound \"{}\" of \"{}\" is not within wide bound \"{}\"",
                format_type(self.db, narrow),
                self.db.resolve_atom(tv.name),
                format_type(self.db, wide),
            ));
        }
    }

    /// Bind a parameter specification. Accepted sources: another
    /// ParamSpec, a function type, or `Any`/`Unknown`.
    pub fn assign_param_spec(
        &self,
        dest: TypeId,
        src: TypeId,
        mut diag: Option<&mut DiagnosticAddendum>,
        ctx: &mut TypeVarContext,
        recursion: u32,
    ) -> bool {
        if self.cancel.is_cancelled() || recursion > MAX_TYPE_RECURSION_COUNT {
            return true;
        }
        let Some(shape_id) = typevar_shape_id_of(self.db, dest) else {
            return false;
        };
        let tv = self.db.typevar_shape(shape_id);
        if !tv.is_param_spec() {
            return false;
        }

        let new_binding = match self.db.lookup(src) {
            Some(TypeKey::TypeVar(src_id)) => {
                let src_tv = self.db.typevar_shape(src_id);
                if !src_tv.is_param_spec() {
                    return false;
                }
                ParamSpecBinding {
                    params: Vec::new(),
                    flags: Default::default(),
                    scope_id: src_tv.scope_id,
                    param_spec: Some(src),
                }
            }
            Some(TypeKey::Function(function_id)) => {
                let shape = self.db.function_shape(function_id);
                ParamSpecBinding {
                    params: shape.params.clone(),
                    flags: shape.flags,
                    scope_id: tv.scope_id,
                    param_spec: shape.param_spec,
                }
            }
            Some(TypeKey::Intrinsic(_)) if src.is_any_or_unknown() => ParamSpecBinding {
                params: vec![
                    crate::types::ParamInfo {
                        category: ParamCategory::VarPositional,
                        name: None,
                        ty: TypeId::ANY,
                        has_default: false,
                    },
                    crate::types::ParamInfo {
                        category: ParamCategory::VarKeyword,
                        name: None,
                        ty: TypeId::ANY,
                        has_default: false,
                    },
                ],
                flags: Default::default(),
                scope_id: tv.scope_id,
                param_spec: None,
            },
            _ => {
                if let Some(diag) = diag.as_deref_mut() {
                    diag.add_message(format!(
                        "expected a function or parameter specification for \"{}\", found \"{}\"",
                        self.db.resolve_atom(tv.name),
                        format_type(self.db, src),
                    ));
                }
                return false;
            }
        };

        if let Some(existing) = ctx.get_param_spec(shape_id) {
            if !self.param_lists_equivalent(&existing.params, &new_binding.params, recursion)
                || existing.param_spec != new_binding.param_spec
            {
                if let Some(diag) = diag.as_deref_mut() {
                    diag.add_message(format!(
                        "parameter specification \"{}\" was already bound to a different signature",
                        self.db.resolve_atom(tv.name),
                    ));
                }
                return false;
            }
            return true;
        }

        ctx.set_param_spec(shape_id, new_binding);
        true
    }

    /// Function-equivalence over parameter lists (return types ignored).
    fn param_lists_equivalent(
        &self,
        left: &[crate::types::ParamInfo],
        right: &[crate::types::ParamInfo],
        recursion: u32,
    ) -> bool {
        if left.len() != right.len() {
            return false;
        }
        let relation = self.relation();
        left.iter().zip(right).all(|(a, b)| {
            a.category == b.category
                && a.has_default == b.has_default
                && relation.assign(
                    a.ty,
                    b.ty,
                    None,
                    None,
                    None,
                    AssignFlags::DEFAULT,
                    recursion + 1,
                )
                && relation.assign(
                    b.ty,
                    a.ty,
                    None,
                    None,
                    None,
                    AssignFlags::DEFAULT,
                    recursion + 1,
                )
        })
    }

    /// Infer type arguments for `target` that make it assignable to
    /// `expected`, writing them into `ctx`.
    pub fn populate_context_from_expected_type(
        &self,
        target: TypeId,
        expected: TypeId,
        ctx: &mut TypeVarContext,
        live_scopes: Option<&[ScopeId]>,
    ) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let expected = crate::queries::transform_possible_recursive_alias(self.db, expected);
        let Some(target_shape) = class_shape_of(self.db, target) else {
            return false;
        };
        if target_shape.type_params.is_empty() {
            return false;
        }
        let Some(expected_shape) = class_shape_of(self.db, expected) else {
            return false;
        };

        // Same generic class: copy the specialisation directly, honoring
        // declared variance.
        if expected_shape.def_id == target_shape.def_id {
            let Some(expected_args) = &expected_shape.type_args else {
                return false;
            };
            for (&param, &arg) in target_shape.type_params.iter().zip(expected_args) {
                let Some(param_id) = typevar_shape_id_of(self.db, param) else {
                    return false;
                };
                let variance = self
                    .db
                    .typevar_shape(param_id)
                    .variance;
                match variance {
                    Variance::Covariant => ctx.set(param_id, Some(arg), None, false),
                    Variance::Contravariant => ctx.set(param_id, None, Some(arg), false),
                    Variance::Invariant => ctx.set(param_id, Some(arg), Some(arg), false),
                }
            }
            return true;
        }

        // Otherwise: specialise the target over synthetic TypeVars, run a
        // reverse assignability pass against the expected type, and
        // project the synthetic bindings back.
        let synth_scope = ScopeId(u32::MAX - 1);
        let mut synth_vars: Vec<TypeVarShapeId> = Vec::new();
        let mut synth_args: Vec<TypeId> = Vec::new();
        for (index, _) in target_shape.type_params.iter().enumerate() {
            let name = self
                .db
                .intern_string(&format!("__expected_type_{index}"));
            let synthetic = self.db.type_var(TypeVarShape {
                name,
                scope_id: Some(synth_scope),
                bound: None,
                constraints: Vec::new(),
                variance: Variance::Invariant,
                flags: TypeVarFlags::SYNTHESIZED,
                synthesized_index: Some(index as u32),
                instantiable: false,
            });
            synth_vars.push(typevar_shape_id_of(self.db, synthetic).unwrap());
            synth_args.push(synthetic);
        }
        let specialized_target = crate::queries::specialize(self.db, target, synth_args);

        let mut synth_ctx = TypeVarContext::new(synth_scope);
        let relation = self.relation();
        if !relation.assign(
            expected,
            specialized_target,
            None,
            None,
            Some(&mut synth_ctx),
            AssignFlags::REVERSE_TYPE_VAR_MATCHING | AssignFlags::POPULATING_EXPECTED_TYPE,
            0,
        ) {
            return false;
        }

        for (index, &param) in target_shape.type_params.iter().enumerate() {
            let Some(param_id) = typevar_shape_id_of(self.db, param) else {
                return false;
            };
            let Some(binding) = synth_ctx.get(synth_vars[index]) else {
                return false;
            };
            let Some(mut value) = binding.narrow.or(binding.wide) else {
                return false;
            };
            value = apply_bindings(self.db, value, &synth_ctx);
            // A binding still mentioning a synthetic or a dead outer
            // TypeVar cannot be projected.
            let mut escaped = false;
            crate::queries::any_type_var(self.db, value, &mut |shape| {
                let dead = match shape.scope_id {
                    Some(scope) if scope == synth_scope => true,
                    Some(scope) => {
                        live_scopes.is_some_and(|live| !live.contains(&scope))
                    }
                    None => false,
                };
                if dead {
                    escaped = true;
                }
                false
            });
            if escaped {
                return false;
            }
            let variance = self.db.typevar_shape(param_id).variance;
            match variance {
                Variance::Covariant => ctx.set(param_id, Some(value), None, false),
                Variance::Contravariant => ctx.set(param_id, None, Some(value), false),
                Variance::Invariant => ctx.set(param_id, Some(value), Some(value), false),
            }
        }
        true
    }

    fn synthesize_tuple(&self, args: Vec<TupleArg>) -> TypeId {
        let Some(shape) = class_shape_of(self.db, self.builtins.tuple_instance) else {
            return TypeId::UNKNOWN;
        };
        let mut tuple = (*shape).clone();
        tuple.tuple_args = Some(args);
        self.db.class(tuple)
    }
}

#[cfg(test)]
#[path = "tests/solve_tests.rs"]
mod tests;
