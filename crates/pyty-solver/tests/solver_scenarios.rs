//! End-to-end constraint-solving scenarios against the public API.

use pyty_common::{CancellationToken, DiagnosticAddendum};
use pyty_solver::db::TypeDatabase;
use pyty_solver::queries::{specialize, typevar_shape_id_of, union_members};
use pyty_solver::types::{ScopeId, TypeId, TypeVarFlags, TypeVarShape, Variance};
use pyty_solver::{AssignFlags, ConstraintSolver, TypeInterner, TypeVarContext};

struct Harness {
    db: TypeInterner,
    cancel: CancellationToken,
}

impl Harness {
    fn new() -> Self {
        Harness {
            db: TypeInterner::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn solver(&self) -> ConstraintSolver<'_> {
        ConstraintSolver::new(&self.db, self.db.builtins(), &self.cancel)
    }

    fn type_var(&self, name: &str, scope: ScopeId, bound: Option<TypeId>, constraints: Vec<TypeId>) -> TypeId {
        self.db.type_var(TypeVarShape {
            name: self.db.intern_string(name),
            scope_id: Some(scope),
            bound,
            constraints,
            variance: Variance::Invariant,
            flags: TypeVarFlags::empty(),
            synthesized_index: None,
            instantiable: false,
        })
    }

    fn narrow_of(&self, ctx: &TypeVarContext, tv: TypeId) -> Option<TypeId> {
        ctx.get(typevar_shape_id_of(&self.db, tv).unwrap())
            .and_then(|binding| binding.narrow)
    }
}

/// Spec scenario: `AnyStr` constrained by `{str, bytes}` rejects the
/// union `str | bytes` because its unconditional subtypes select
/// different constraints.
#[test]
fn constrained_type_var_rejects_str_or_bytes() {
    let harness = Harness::new();
    let builtins = harness.db.builtins();
    let scope = ScopeId(1);
    let any_str = harness.type_var(
        "AnyStr",
        scope,
        None,
        vec![builtins.str_instance, builtins.bytes_instance],
    );

    let mut ctx = TypeVarContext::new(scope);
    let mut diag = DiagnosticAddendum::new();
    let ok = harness.solver().assign_type_var(
        any_str,
        harness.db.union(vec![builtins.str_instance, builtins.bytes_instance]),
        Some(&mut diag),
        &mut ctx,
        AssignFlags::DEFAULT,
        0,
    );
    assert!(!ok);
    assert!(ctx.is_empty());
    let lines = diag.display_lines();
    assert!(!lines.is_empty());

    // Each half on its own is accepted.
    let mut fresh = TypeVarContext::new(scope);
    assert!(harness.solver().assign_type_var(
        any_str,
        builtins.str_instance,
        None,
        &mut fresh,
        AssignFlags::DEFAULT,
        0
    ));
}

/// Spec scenario: repeated covariant assignments widen the narrow bound
/// to a union, and a pathological union against a bounded TypeVar
/// degrades to `object`.
#[test]
fn bounded_type_var_widens_then_degrades() {
    let harness = Harness::new();
    let builtins = harness.db.builtins();
    let scope = ScopeId(2);
    let tv = harness.type_var("T", scope, Some(builtins.object_instance), vec![]);
    let solver = harness.solver();
    let mut ctx = TypeVarContext::new(scope);

    let list_int = specialize(
        &harness.db,
        builtins.list_instance,
        vec![builtins.int_instance],
    );
    let tuple_int = specialize(
        &harness.db,
        builtins.tuple_instance,
        vec![builtins.int_instance],
    );

    assert!(solver.assign_type_var(tv, list_int, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert_eq!(harness.narrow_of(&ctx, tv), Some(list_int));

    assert!(solver.assign_type_var(tv, tuple_int, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert_eq!(
        harness.narrow_of(&ctx, tv),
        Some(harness.db.union(vec![list_int, tuple_int]))
    );

    // Push the union past the pathological threshold.
    for i in 0..pyty_solver::limits::MAX_SUBTYPES_FOR_INFERRED_TYPE {
        let distinct = harness.db.literal_int(i as i64);
        let _ = solver.assign_type_var(
            tv,
            specialize(&harness.db, builtins.list_instance, vec![distinct]),
            None,
            &mut ctx,
            AssignFlags::RETAIN_LITERALS_FOR_TYPE_VAR,
            0,
        );
    }
    assert_eq!(harness.narrow_of(&ctx, tv), Some(builtins.object_instance));
}

/// Constraint monotonicity: between calls the narrow bound only widens;
/// a call that would break the invariant fails and leaves the context
/// unchanged.
#[test]
fn narrow_bound_is_monotone() {
    let harness = Harness::new();
    let builtins = harness.db.builtins();
    let scope = ScopeId(3);
    let tv = harness.type_var("T", scope, Some(builtins.int_instance), vec![]);
    let solver = harness.solver();
    let mut ctx = TypeVarContext::new(scope);

    assert!(solver.assign_type_var(tv, builtins.bool_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    let first = harness.narrow_of(&ctx, tv).unwrap();

    // A source violating the declared bound fails without touching the
    // recorded binding.
    assert!(!solver.assign_type_var(tv, builtins.str_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert_eq!(harness.narrow_of(&ctx, tv), Some(first));

    assert!(solver.assign_type_var(tv, builtins.int_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    let second = harness.narrow_of(&ctx, tv).unwrap();
    // The bound widened from bool to cover int.
    assert!(union_members(&harness.db, second).contains(&builtins.int_instance) || second == builtins.int_instance);
}

/// Scope isolation: a TypeVar whose scope the context does not solve for
/// never mutates the context.
#[test]
fn foreign_scope_type_vars_never_bind() {
    let harness = Harness::new();
    let builtins = harness.db.builtins();
    let tv = harness.type_var("T", ScopeId(40), None, vec![]);
    let mut ctx = TypeVarContext::new(ScopeId(41));

    assert!(!harness.solver().assign_type_var(
        tv,
        builtins.int_instance,
        None,
        &mut ctx,
        AssignFlags::DEFAULT,
        0
    ));
    assert!(ctx.is_empty());

    // Unless the scope check is explicitly bypassed.
    assert!(harness.solver().assign_type_var(
        tv,
        builtins.int_instance,
        None,
        &mut ctx,
        AssignFlags::IGNORE_TYPE_VAR_SCOPE,
        0
    ));
    assert!(ctx.is_empty());
}

/// A locked context performs no writes; assignments validate only.
#[test]
fn locked_context_is_validate_only() {
    let harness = Harness::new();
    let builtins = harness.db.builtins();
    let scope = ScopeId(5);
    let tv = harness.type_var("T", scope, None, vec![]);
    let solver = harness.solver();
    let mut ctx = TypeVarContext::new(scope);

    assert!(solver.assign_type_var(tv, builtins.int_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    ctx.lock();
    assert!(solver.assign_type_var(tv, builtins.bool_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert!(!solver.assign_type_var(tv, builtins.str_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert_eq!(harness.narrow_of(&ctx, tv), Some(builtins.int_instance));
}

/// Cancellation degrades to conservative success without touching the
/// context; the caller is expected to discard the task's context.
#[test]
fn cancellation_is_conservative() {
    let harness = Harness::new();
    let builtins = harness.db.builtins();
    let scope = ScopeId(6);
    let tv = harness.type_var("T", scope, None, vec![]);
    let mut ctx = TypeVarContext::new(scope);

    harness.cancel.cancel();
    assert!(harness.solver().assign_type_var(
        tv,
        builtins.str_instance,
        None,
        &mut ctx,
        AssignFlags::DEFAULT,
        0
    ));
    assert!(ctx.is_empty());
}

/// Expected-type population copies a same-class specialisation through
/// declared variance.
#[test]
fn expected_type_population() {
    let harness = Harness::new();
    let builtins = harness.db.builtins();
    let scope = ScopeId(7);
    let param = harness.db.type_var(TypeVarShape {
        name: harness.db.intern_string("T"),
        scope_id: Some(scope),
        bound: None,
        constraints: Vec::new(),
        variance: Variance::Invariant,
        flags: TypeVarFlags::empty(),
        synthesized_index: None,
        instantiable: false,
    });

    let list_generic = {
        let shape = pyty_solver::queries::class_shape_of(&harness.db, builtins.list_instance).unwrap();
        let mut generic = (*shape).clone();
        generic.type_params = vec![param];
        harness.db.class(generic)
    };
    let expected = specialize(&harness.db, list_generic, vec![builtins.int_instance]);

    let mut ctx = TypeVarContext::new(scope);
    assert!(harness.solver().populate_context_from_expected_type(
        list_generic,
        expected,
        &mut ctx,
        None
    ));
    let shape_id = typevar_shape_id_of(&harness.db, param).unwrap();
    let binding = ctx.get(shape_id).unwrap();
    assert_eq!(binding.narrow, Some(builtins.int_instance));
    assert_eq!(binding.wide, Some(builtins.int_instance));
}
