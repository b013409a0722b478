//! The assignability relation and concretisation.
//!
//! `AssignCheck::assign` is the judgment the rest of the evaluator calls
//! back into: the solver uses it to validate bounds, narrowing uses it to
//! filter subtypes, and it in turn delegates TypeVar destinations to the
//! solver. Recursion is bounded two ways: a threaded counter caps the
//! depth, and a pair-keyed `RecursionGuard` detects cycles through
//! recursive aliases. Both degrade to a conservative success so every
//! judgment terminates.

use std::cell::RefCell;

use pyty_common::{CancellationToken, DiagnosticAddendum};
use tracing::trace;

use crate::builtins::Builtins;
use crate::context::TypeVarContext;
use crate::db::TypeDatabase;
use crate::display::format_type;
use crate::limits::MAX_TYPE_RECURSION_COUNT;
use crate::queries::{
    class_shape_of, derives_from_any, expand_type_var, lookup_member, mro_entry,
    transform_possible_recursive_alias, typed_dict_members, typevar_shape_of,
};
use crate::recursion::{RecursionGuard, RecursionResult};
use crate::solve::{AssignFlags, ConstraintSolver};
use crate::types::{ClassFlags, ClassShape, ParamCategory, TypeId, TypeKey, Variance};

/// The assignability capability: `assign(dest, src)` decides whether a
/// value of type `src` may be used where `dest` is expected, binding
/// in-scope type variables along the way.
pub struct AssignCheck<'a> {
    pub db: &'a dyn TypeDatabase,
    pub builtins: &'a Builtins,
    pub cancel: &'a CancellationToken,
    /// Pairs currently on the judgment stack. A pair re-entered before it
    /// is left can only come from a cyclic type; flags are part of the
    /// key so invariance enforcement (same pair, narrowed flags) is not
    /// mistaken for one.
    visiting: RefCell<RecursionGuard<(TypeId, TypeId, u16)>>,
}

impl<'a> AssignCheck<'a> {
    pub fn new(
        db: &'a dyn TypeDatabase,
        builtins: &'a Builtins,
        cancel: &'a CancellationToken,
    ) -> Self {
        AssignCheck {
            db,
            builtins,
            cancel,
            visiting: RefCell::new(RecursionGuard::new(MAX_TYPE_RECURSION_COUNT)),
        }
    }

    fn solver(&self) -> ConstraintSolver<'a> {
        ConstraintSolver::new(self.db, self.builtins, self.cancel)
    }

    /// Plain assignability with no contexts, no diagnostics.
    pub fn is_assignable(&self, dest: TypeId, src: TypeId) -> bool {
        self.assign(dest, src, None, None, None, AssignFlags::DEFAULT, 0)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn assign(
        &self,
        dest: TypeId,
        src: TypeId,
        diag: Option<&mut DiagnosticAddendum>,
        dest_ctx: Option<&mut TypeVarContext>,
        src_ctx: Option<&mut TypeVarContext>,
        flags: AssignFlags,
        recursion: u32,
    ) -> bool {
        // Cancellation and the depth bound both degrade to success; the
        // caller is responsible for discarding a cancelled task's context.
        if self.cancel.is_cancelled() || recursion > MAX_TYPE_RECURSION_COUNT {
            return true;
        }

        let dest = transform_possible_recursive_alias(self.db, dest);
        let src = transform_possible_recursive_alias(self.db, src);

        // Cycle detection: a recursive alias leads the walk back to a
        // pair it has not finished deciding. Such a pair holds
        // coinductively.
        let key = (dest, src, flags.bits());
        match self.visiting.borrow_mut().enter(key) {
            RecursionResult::Entered => {}
            RecursionResult::Cycle | RecursionResult::DepthExceeded => return true,
        }
        let ok = self.assign_guarded(dest, src, diag, dest_ctx, src_ctx, flags, recursion);
        self.visiting.borrow_mut().leave(key);
        ok
    }

    #[allow(clippy::too_many_arguments)]
    fn assign_guarded(
        &self,
        dest: TypeId,
        src: TypeId,
        mut diag: Option<&mut DiagnosticAddendum>,
        mut dest_ctx: Option<&mut TypeVarContext>,
        mut src_ctx: Option<&mut TypeVarContext>,
        flags: AssignFlags,
        recursion: u32,
    ) -> bool {
        if dest == src {
            // Still record the binding for an in-scope TypeVar dest so
            // later calls see a bound.
            if typevar_shape_of(self.db, dest).is_none() {
                return true;
            }
        }

        if flags.contains(AssignFlags::ENFORCE_INVARIANCE) {
            let inner = flags.difference(AssignFlags::ENFORCE_INVARIANCE);
            return self.assign(
                dest,
                src,
                diag.as_deref_mut(),
                dest_ctx.as_deref_mut(),
                src_ctx.as_deref_mut(),
                inner,
                recursion + 1,
            ) && self.assign(src, dest, None, None, None, inner, recursion + 1);
        }

        if dest.is_any_or_unknown() || src.is_never() {
            return true;
        }

        // TypeVar destination: delegate to the solver.
        if let Some(dest_tv) = typevar_shape_of(self.db, dest) {
            if !flags.contains(AssignFlags::REVERSE_TYPE_VAR_MATCHING) {
                if dest_tv.is_param_spec() {
                    if let Some(ctx) = dest_ctx.as_deref_mut() {
                        return self.solver().assign_param_spec(
                            dest,
                            src,
                            diag.as_deref_mut(),
                            ctx,
                            recursion + 1,
                        );
                    }
                }
                if let Some(ctx) = dest_ctx.as_deref_mut() {
                    return self.solver().assign_type_var(
                        dest,
                        src,
                        diag.as_deref_mut(),
                        ctx,
                        flags,
                        recursion + 1,
                    );
                }
                if dest == src {
                    return true;
                }
                // No context: compare against the TypeVar's expansion.
                let expanded = expand_type_var(self.db, dest);
                if expanded == dest {
                    return false;
                }
                return self.assign(
                    expanded,
                    src,
                    diag,
                    None,
                    src_ctx.as_deref_mut(),
                    flags,
                    recursion + 1,
                );
            }
        }

        // TypeVar source.
        if typevar_shape_of(self.db, src).is_some() {
            if dest == src {
                return true;
            }
            if flags.contains(AssignFlags::REVERSE_TYPE_VAR_MATCHING) {
                if let Some(ctx) = src_ctx.as_deref_mut() {
                    // Reverse matching: the source TypeVar binds, with the
                    // destination flowing into its wide bound.
                    return self.solver().assign_type_var(
                        src,
                        dest,
                        diag.as_deref_mut(),
                        ctx,
                        flags,
                        recursion + 1,
                    );
                }
            }
            let expanded = expand_type_var(self.db, src);
            if expanded != src {
                return self.assign(
                    dest,
                    expanded,
                    diag,
                    dest_ctx.as_deref_mut(),
                    None,
                    flags,
                    recursion + 1,
                );
            }
            return false;
        }

        if src.is_any_or_unknown() {
            return true;
        }

        // In reverse mode a destination TypeVar does not bind; compare
        // against its expansion instead.
        if flags.contains(AssignFlags::REVERSE_TYPE_VAR_MATCHING) {
            if typevar_shape_of(self.db, dest).is_some() {
                let expanded = expand_type_var(self.db, dest);
                if expanded == dest {
                    return false;
                }
                return self.assign(
                    expanded,
                    src,
                    diag,
                    None,
                    src_ctx.as_deref_mut(),
                    flags,
                    recursion + 1,
                );
            }
        }

        // Union source: every member must be accepted.
        if let Some(TypeKey::Union(list)) = self.db.lookup(src) {
            let members = self.db.type_list(list);
            let ok = members.iter().all(|&member| {
                self.assign(
                    dest,
                    member,
                    None,
                    dest_ctx.as_deref_mut(),
                    src_ctx.as_deref_mut(),
                    flags,
                    recursion + 1,
                )
            });
            if !ok {
                self.report(diag, dest, src);
            }
            return ok;
        }

        // Union destination: some member must accept the source.
        if let Some(TypeKey::Union(list)) = self.db.lookup(dest) {
            let members = self.db.type_list(list);
            let ok = members.iter().any(|&member| {
                self.assign(
                    member,
                    src,
                    None,
                    dest_ctx.as_deref_mut(),
                    src_ctx.as_deref_mut(),
                    flags,
                    recursion + 1,
                )
            });
            if !ok {
                self.report(diag, dest, src);
            }
            return ok;
        }

        // `object` accepts every value, including class objects, modules
        // and functions.
        if let Some(dest_shape) = class_shape_of(self.db, dest) {
            if dest_shape.def_id == self.builtins.object_def && !dest_shape.is_instantiable() {
                return true;
            }
        }

        let ok = self.assign_concrete(dest, src, dest_ctx, src_ctx, flags, recursion);
        if !ok {
            self.report(diag, dest, src);
        }
        ok
    }

    fn assign_concrete(
        &self,
        dest: TypeId,
        src: TypeId,
        mut dest_ctx: Option<&mut TypeVarContext>,
        mut src_ctx: Option<&mut TypeVarContext>,
        flags: AssignFlags,
        recursion: u32,
    ) -> bool {
        match (self.db.lookup(dest), self.db.lookup(src)) {
            (Some(TypeKey::None { .. }), Some(TypeKey::None { .. })) => {
                // Conditions are provenance, not identity; instance vs
                // instantiable must agree.
                crate::queries::is_instantiable(self.db, dest)
                    == crate::queries::is_instantiable(self.db, src)
            }
            (Some(TypeKey::Module(dest_name)), Some(TypeKey::Module(src_name))) => {
                dest_name == src_name
            }
            (Some(TypeKey::Class(dest_id)), Some(TypeKey::Class(src_id))) => {
                let dest_shape = self.db.class_shape(dest_id);
                let src_shape = self.db.class_shape(src_id);
                self.assign_class(
                    &dest_shape,
                    &src_shape,
                    dest,
                    src,
                    dest_ctx.as_deref_mut(),
                    src_ctx.as_deref_mut(),
                    flags,
                    recursion,
                )
            }
            (Some(TypeKey::Class(dest_id)), Some(TypeKey::Function(_)))
            | (Some(TypeKey::Class(dest_id)), Some(TypeKey::Overloaded(_))) => {
                // A protocol with `__call__` accepts callables.
                let dest_shape = self.db.class_shape(dest_id);
                if dest_shape.flags.contains(ClassFlags::PROTOCOL) {
                    let call = self.db.intern_string("__call__");
                    if let Some(member) = lookup_member(self.db, &dest_shape, call) {
                        return self.assign(
                            member,
                            src,
                            None,
                            dest_ctx,
                            src_ctx,
                            flags,
                            recursion + 1,
                        );
                    }
                }
                false
            }
            (Some(TypeKey::Function(dest_id)), Some(TypeKey::Function(src_id))) => {
                self.assign_function(dest_id, src_id, dest_ctx, src_ctx, flags, recursion)
            }
            (Some(TypeKey::Function(_)), Some(TypeKey::Overloaded(list))) => {
                // Some overload must satisfy the destination signature.
                self.db.type_list(list).iter().any(|&signature| {
                    self.assign(
                        dest,
                        signature,
                        None,
                        dest_ctx.as_deref_mut(),
                        src_ctx.as_deref_mut(),
                        flags,
                        recursion + 1,
                    )
                })
            }
            (Some(TypeKey::Overloaded(list)), _) => {
                // Every destination signature must be satisfiable.
                self.db.type_list(list).iter().all(|&signature| {
                    self.assign(
                        signature,
                        src,
                        None,
                        dest_ctx.as_deref_mut(),
                        src_ctx.as_deref_mut(),
                        flags,
                        recursion + 1,
                    )
                })
            }
            _ => false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn assign_class(
        &self,
        dest_shape: &ClassShape,
        src_shape: &ClassShape,
        dest: TypeId,
        src: TypeId,
        mut dest_ctx: Option<&mut TypeVarContext>,
        mut src_ctx: Option<&mut TypeVarContext>,
        flags: AssignFlags,
        recursion: u32,
    ) -> bool {
        if dest_shape.is_instantiable() != src_shape.is_instantiable() {
            // A class object is an instance of `type` (and of `object`,
            // handled earlier).
            return !dest_shape.is_instantiable()
                && dest_shape.def_id == self.builtins.type_def
                && src_shape.is_instantiable();
        }

        if dest_shape.is_instantiable() {
            // Compare `type[A]` against `type[B]` through their instance
            // forms.
            let dest_instance = crate::queries::to_instance(self.db, dest);
            let src_instance = crate::queries::to_instance(self.db, src);
            return self.assign(
                dest_instance,
                src_instance,
                None,
                dest_ctx,
                src_ctx,
                flags,
                recursion + 1,
            );
        }

        // Literal destinations accept exactly that literal.
        if let Some(dest_literal) = &dest_shape.literal {
            return dest_shape.def_id == src_shape.def_id
                && src_shape.literal.as_ref() == Some(dest_literal);
        }

        // TypedDict-to-TypedDict is structural over entries.
        if dest_shape.flags.contains(ClassFlags::TYPED_DICT)
            && src_shape.flags.contains(ClassFlags::TYPED_DICT)
        {
            return self.assign_typed_dict(dest_shape, src_shape, flags, recursion);
        }

        // Any TypedDict is a `dict` at runtime.
        if dest_shape.def_id == self.builtins.dict_def
            && src_shape.flags.contains(ClassFlags::TYPED_DICT)
        {
            return true;
        }

        // Protocols are structural.
        if dest_shape.flags.contains(ClassFlags::PROTOCOL)
            && !crate::queries::derives_from(self.db, src_shape, dest_shape.def_id)
        {
            return self.assign_protocol(dest_shape, src_shape, flags, recursion);
        }

        // Tuples compare element-wise.
        if dest_shape.flags.contains(ClassFlags::TUPLE)
            && src_shape.flags.contains(ClassFlags::TUPLE)
        {
            if let (Some(dest_args), Some(src_args)) = (&dest_shape.tuple_args, &src_shape.tuple_args)
            {
                return self.assign_tuple(dest_args, src_args, dest_ctx, src_ctx, flags, recursion);
            }
            // A bare `tuple` destination accepts any tuple.
            if dest_shape.tuple_args.is_none() {
                return true;
            }
        }

        // Nominal: find the destination class in the source's ancestry.
        let Some(ancestor) = mro_entry(self.db, src, dest_shape.def_id) else {
            return derives_from_any(self.db, src);
        };
        let src_args = if ancestor == src {
            src_shape.type_args.clone()
        } else {
            // Ancestor arguments may mention the source's own type
            // parameters; substitute the source's actual arguments.
            class_shape_of(self.db, ancestor)
                .and_then(|shape| shape.type_args.clone())
                .map(|args| self.substitute_own_params(src_shape, args))
        };

        let (Some(dest_args), Some(src_args)) = (&dest_shape.type_args, &src_args) else {
            // Unspecialised on either side matches conservatively.
            return true;
        };

        for (i, (&dest_arg, &src_arg)) in dest_args.iter().zip(src_args.iter()).enumerate() {
            let variance = dest_shape
                .type_params
                .get(i)
                .and_then(|&param| typevar_shape_of(self.db, param))
                .map_or(Variance::Invariant, |shape| shape.variance);
            let ok = match variance {
                Variance::Covariant => self.assign(
                    dest_arg,
                    src_arg,
                    None,
                    dest_ctx.as_deref_mut(),
                    src_ctx.as_deref_mut(),
                    flags,
                    recursion + 1,
                ),
                Variance::Contravariant => self.assign(
                    src_arg,
                    dest_arg,
                    None,
                    src_ctx.as_deref_mut(),
                    dest_ctx.as_deref_mut(),
                    flags,
                    recursion + 1,
                ),
                Variance::Invariant => self.assign(
                    dest_arg,
                    src_arg,
                    None,
                    dest_ctx.as_deref_mut(),
                    src_ctx.as_deref_mut(),
                    flags | AssignFlags::ENFORCE_INVARIANCE,
                    recursion + 1,
                ),
            };
            if !ok {
                return false;
            }
        }
        true
    }

    fn substitute_own_params(&self, shape: &ClassShape, args: Vec<TypeId>) -> Vec<TypeId> {
        let Some(own_args) = &shape.type_args else {
            return args;
        };
        if shape.type_params.is_empty() {
            return args;
        }
        let scopes: Vec<_> = shape
            .type_params
            .iter()
            .filter_map(|&param| {
                typevar_shape_of(self.db, param).and_then(|tv| tv.scope_id)
            })
            .collect();
        let mut ctx = TypeVarContext::with_scopes(scopes);
        for (&param, &arg) in shape.type_params.iter().zip(own_args) {
            if let Some(shape_id) = crate::queries::typevar_shape_id_of(self.db, param) {
                ctx.set(shape_id, Some(arg), None, true);
            }
        }
        args.into_iter()
            .map(|arg| apply_bindings(self.db, arg, &ctx))
            .collect()
    }

    fn assign_typed_dict(
        &self,
        dest_shape: &ClassShape,
        src_shape: &ClassShape,
        flags: AssignFlags,
        recursion: u32,
    ) -> bool {
        let src_members = typed_dict_members(self.db, src_shape, true);
        for dest_entry in typed_dict_members(self.db, dest_shape, false) {
            let Some(src_entry) = src_members
                .iter()
                .find(|member| member.name == dest_entry.name)
            else {
                if dest_entry.is_required {
                    return false;
                }
                continue;
            };
            if dest_entry.is_required && !(src_entry.is_required || src_entry.is_provided) {
                return false;
            }
            if !self.assign(
                dest_entry.value_type,
                src_entry.value_type,
                None,
                None,
                None,
                flags,
                recursion + 1,
            ) {
                return false;
            }
        }
        true
    }

    fn assign_protocol(
        &self,
        dest_shape: &ClassShape,
        src_shape: &ClassShape,
        flags: AssignFlags,
        recursion: u32,
    ) -> bool {
        let mut names: Vec<pyty_common::Atom> =
            dest_shape.fields.iter().map(|&(name, _)| name).collect();
        for &ancestor in &dest_shape.mro {
            if let Some(ancestor_shape) = class_shape_of(self.db, ancestor) {
                if ancestor_shape.def_id == self.builtins.object_def {
                    continue;
                }
                names.extend(ancestor_shape.fields.iter().map(|&(name, _)| name));
            }
        }
        names.sort_unstable();
        names.dedup();
        for name in names {
            let Some(expected) = lookup_member(self.db, dest_shape, name) else {
                continue;
            };
            let Some(actual) = lookup_member(self.db, src_shape, name) else {
                return false;
            };
            if !self.assign(expected, actual, None, None, None, flags, recursion + 1) {
                return false;
            }
        }
        true
    }

    fn assign_tuple(
        &self,
        dest_args: &[crate::types::TupleArg],
        src_args: &[crate::types::TupleArg],
        mut dest_ctx: Option<&mut TypeVarContext>,
        mut src_ctx: Option<&mut TypeVarContext>,
        flags: AssignFlags,
        recursion: u32,
    ) -> bool {
        let dest_unbounded = dest_args.iter().any(|arg| arg.is_unbounded);
        let src_unbounded = src_args.iter().any(|arg| arg.is_unbounded);

        if dest_unbounded {
            // tuple[T, ...] accepts any tuple whose elements fit T.
            let element = dest_args[0].ty;
            return src_args.iter().all(|arg| {
                self.assign(
                    element,
                    arg.ty,
                    None,
                    dest_ctx.as_deref_mut(),
                    src_ctx.as_deref_mut(),
                    flags,
                    recursion + 1,
                )
            });
        }
        if src_unbounded || dest_args.len() != src_args.len() {
            return false;
        }
        dest_args.iter().zip(src_args).all(|(dest_arg, src_arg)| {
            self.assign(
                dest_arg.ty,
                src_arg.ty,
                None,
                dest_ctx.as_deref_mut(),
                src_ctx.as_deref_mut(),
                flags,
                recursion + 1,
            )
        })
    }

    fn assign_function(
        &self,
        dest_id: crate::types::FunctionShapeId,
        src_id: crate::types::FunctionShapeId,
        mut dest_ctx: Option<&mut TypeVarContext>,
        mut src_ctx: Option<&mut TypeVarContext>,
        flags: AssignFlags,
        recursion: u32,
    ) -> bool {
        let dest_shape = self.db.function_shape(dest_id);
        let src_shape = self.db.function_shape(src_id);

        let src_var_positional = src_shape
            .params
            .iter()
            .any(|param| param.category == ParamCategory::VarPositional);

        let dest_positional: Vec<_> = dest_shape
            .params
            .iter()
            .filter(|param| param.category == ParamCategory::Simple)
            .collect();
        let src_positional: Vec<_> = src_shape
            .params
            .iter()
            .filter(|param| param.category == ParamCategory::Simple)
            .collect();

        for (i, dest_param) in dest_positional.iter().enumerate() {
            let Some(src_param) = src_positional.get(i) else {
                if src_var_positional {
                    continue;
                }
                return false;
            };
            // Parameters are contravariant.
            if !self.assign(
                src_param.ty,
                dest_param.ty,
                None,
                src_ctx.as_deref_mut(),
                dest_ctx.as_deref_mut(),
                flags,
                recursion + 1,
            ) {
                return false;
            }
        }
        // Extra source parameters must be defaulted or variadic.
        if src_positional.len() > dest_positional.len()
            && src_positional[dest_positional.len()..]
                .iter()
                .any(|param| !param.has_default)
        {
            return false;
        }

        self.assign(
            dest_shape.return_type,
            src_shape.return_type,
            None,
            dest_ctx,
            src_ctx,
            flags,
            recursion + 1,
        )
    }

    /// Replace in-scope TypeVars with their solved bounds, and
    /// out-of-context TypeVars with their declared expansion.
    pub fn concretize(&self, ty: TypeId, ctx: Option<&TypeVarContext>) -> TypeId {
        self.concretize_bounded(ty, ctx, 0)
    }

    fn concretize_bounded(&self, ty: TypeId, ctx: Option<&TypeVarContext>, depth: u32) -> TypeId {
        if depth > MAX_TYPE_RECURSION_COUNT {
            return ty;
        }
        crate::queries::map_subtypes(self.db, ty, |member| {
            let Some(shape_id) = crate::queries::typevar_shape_id_of(self.db, member) else {
                return Some(member);
            };
            let shape = self.db.typevar_shape(shape_id);
            if shape.is_param_spec() {
                return Some(member);
            }
            if let Some(binding) = ctx.and_then(|ctx| ctx.get(shape_id)) {
                if let Some(bound) = binding.narrow.or(binding.wide) {
                    return Some(self.concretize_bounded(bound, ctx, depth + 1));
                }
            }
            let expanded = expand_type_var(self.db, member);
            if expanded == member {
                Some(member)
            } else {
                Some(self.concretize_bounded(expanded, ctx, depth + 1))
            }
        })
    }

    fn report(&self, diag: Option<&mut DiagnosticAddendum>, dest: TypeId, src: TypeId) {
        if let Some(diag) = diag {
            let message = format!(
                "type \"{}\" is not assignable to type \"{}\"",
                format_type(self.db, src),
                format_type(self.db, dest)
            );
            trace!(dest = dest.0, src = src.0, "assignability mismatch");
            diag.add_message(message);
        }
    }
}

/// Substitute solved narrow bounds into `ty`, recursing through class and
/// tuple specialisations and function signatures. Used when projecting
/// expected-type inference results.
pub fn apply_bindings(db: &dyn TypeDatabase, ty: TypeId, ctx: &TypeVarContext) -> TypeId {
    apply_bindings_bounded(db, ty, ctx, 0)
}

fn apply_bindings_bounded(
    db: &dyn TypeDatabase,
    ty: TypeId,
    ctx: &TypeVarContext,
    depth: u32,
) -> TypeId {
    if depth > MAX_TYPE_RECURSION_COUNT {
        return ty;
    }
    match db.lookup(ty) {
        Some(TypeKey::TypeVar(shape_id)) => match ctx.get(shape_id) {
            Some(binding) => binding
                .narrow
                .or(binding.wide)
                .map(|bound| apply_bindings_bounded(db, bound, ctx, depth + 1))
                .unwrap_or(ty),
            None => ty,
        },
        Some(TypeKey::Union(list)) => {
            let members = db
                .type_list(list)
                .iter()
                .map(|&member| apply_bindings_bounded(db, member, ctx, depth + 1))
                .collect();
            db.union(members)
        }
        Some(TypeKey::Class(shape_id)) => {
            let shape = db.class_shape(shape_id);
            let mut updated = (*shape).clone();
            let mut changed = false;
            if let Some(args) = &mut updated.type_args {
                for arg in args.iter_mut() {
                    let new = apply_bindings_bounded(db, *arg, ctx, depth + 1);
                    changed |= new != *arg;
                    *arg = new;
                }
            }
            if let Some(args) = &mut updated.tuple_args {
                for arg in args.iter_mut() {
                    let new = apply_bindings_bounded(db, arg.ty, ctx, depth + 1);
                    changed |= new != arg.ty;
                    arg.ty = new;
                }
            }
            if changed {
                db.class(updated)
            } else {
                ty
            }
        }
        Some(TypeKey::Function(shape_id)) => {
            let shape = db.function_shape(shape_id);
            let mut updated = (*shape).clone();
            let mut changed = false;
            for param in updated.params.iter_mut() {
                let new = apply_bindings_bounded(db, param.ty, ctx, depth + 1);
                changed |= new != param.ty;
                param.ty = new;
            }
            let new_ret = apply_bindings_bounded(db, updated.return_type, ctx, depth + 1);
            changed |= new_ret != updated.return_type;
            updated.return_type = new_ret;
            if changed {
                db.function(updated)
            } else {
                ty
            }
        }
        _ => ty,
    }
}

#[cfg(test)]
#[path = "tests/relate_tests.rs"]
mod tests;
