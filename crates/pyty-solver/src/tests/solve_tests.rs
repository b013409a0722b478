use pyty_common::DiagnosticAddendum;

use crate::context::TypeVarContext;
use crate::db::TypeDatabase;
use crate::limits::MAX_SUBTYPES_FOR_INFERRED_TYPE;
use crate::queries::typevar_shape_id_of;
use crate::solve::AssignFlags;
use crate::testing::Fixture;
use crate::types::{ScopeId, TypeId, Variance};

fn narrow_of(fixture: &Fixture, ctx: &TypeVarContext, tv: TypeId) -> Option<TypeId> {
    let shape_id = typevar_shape_id_of(&fixture.db, tv).unwrap();
    ctx.get(shape_id).and_then(|binding| binding.narrow)
}

fn wide_of(fixture: &Fixture, ctx: &TypeVarContext, tv: TypeId) -> Option<TypeId> {
    let shape_id = typevar_shape_id_of(&fixture.db, tv).unwrap();
    ctx.get(shape_id).and_then(|binding| binding.wide)
}

#[test]
fn first_assignment_sets_the_narrow_bound() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let scope = ScopeId(1);
    let tv = fixture.type_var("T", scope);
    let mut ctx = TypeVarContext::new(scope);

    assert!(solver.assign_type_var(tv, builtins.int_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert_eq!(narrow_of(&fixture, &ctx, tv), Some(builtins.int_instance));
}

#[test]
fn literals_are_stripped_unless_retained() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let scope = ScopeId(1);
    let tv = fixture.type_var("T", scope);
    let one = fixture.db.literal_int(1);

    let mut ctx = TypeVarContext::new(scope);
    assert!(solver.assign_type_var(tv, one, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert_eq!(narrow_of(&fixture, &ctx, tv), Some(builtins.int_instance));

    let mut retained = TypeVarContext::new(scope);
    assert!(solver.assign_type_var(
        tv,
        one,
        None,
        &mut retained,
        AssignFlags::RETAIN_LITERALS_FOR_TYPE_VAR,
        0
    ));
    assert_eq!(narrow_of(&fixture, &retained, tv), Some(one));
}

#[test]
fn narrow_bound_widens_to_a_union() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let scope = ScopeId(1);
    let tv = fixture.type_var("T", scope);
    let mut ctx = TypeVarContext::new(scope);

    assert!(solver.assign_type_var(tv, builtins.int_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert!(solver.assign_type_var(tv, builtins.str_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert_eq!(
        narrow_of(&fixture, &ctx, tv),
        Some(fixture.union(vec![builtins.int_instance, builtins.str_instance]))
    );
}

#[test]
fn narrower_source_keeps_the_existing_bound() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let scope = ScopeId(1);
    let tv = fixture.type_var("T", scope);
    let mut ctx = TypeVarContext::new(scope);

    assert!(solver.assign_type_var(tv, builtins.int_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    // bool fits inside int: the bound must not shrink.
    assert!(solver.assign_type_var(tv, builtins.bool_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert_eq!(narrow_of(&fixture, &ctx, tv), Some(builtins.int_instance));
}

#[test]
fn known_source_replaces_partly_unknown_bound() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let scope = ScopeId(1);
    let tv = fixture.type_var("T", scope);
    let mut ctx = TypeVarContext::new(scope);

    let list = fixture.generic_class("builtins.list", vec![], None);
    let list_unknown = fixture.specialized(list, vec![TypeId::UNKNOWN]);
    let list_int = fixture.specialized(list, vec![builtins.int_instance]);

    assert!(solver.assign_type_var(tv, list_unknown, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert!(solver.assign_type_var(tv, list_int, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert_eq!(narrow_of(&fixture, &ctx, tv), Some(list_int));
}

#[test]
fn scope_isolation_never_mutates_the_context() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let tv = fixture.type_var("T", ScopeId(9));
    let mut ctx = TypeVarContext::new(ScopeId(1));
    let mut diag = DiagnosticAddendum::new();

    assert!(!solver.assign_type_var(
        tv,
        builtins.int_instance,
        Some(&mut diag),
        &mut ctx,
        AssignFlags::DEFAULT,
        0
    ));
    assert!(ctx.is_empty());
    assert!(!diag.is_empty());
}

#[test]
fn out_of_scope_accepts_any_sources() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let tv = fixture.type_var("T", ScopeId(9));
    let mut ctx = TypeVarContext::new(ScopeId(1));

    assert!(solver.assign_type_var(tv, TypeId::ANY, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert!(solver.assign_type_var(tv, TypeId::UNKNOWN, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert!(ctx.is_empty());
}

#[test]
fn locked_context_validates_but_never_writes() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let scope = ScopeId(1);
    let tv = fixture.type_var("T", scope);
    let mut ctx = TypeVarContext::new(scope);

    assert!(solver.assign_type_var(tv, builtins.int_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    ctx.lock();

    // Compatible source: validates.
    assert!(solver.assign_type_var(tv, builtins.bool_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    // Widening would be required: refused.
    assert!(!solver.assign_type_var(tv, builtins.str_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert_eq!(narrow_of(&fixture, &ctx, tv), Some(builtins.int_instance));
}

#[test]
fn contravariant_mode_tightens_the_wide_bound() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let scope = ScopeId(1);
    let tv = fixture.type_var("T", scope);
    let mut ctx = TypeVarContext::new(scope);

    assert!(solver.assign_type_var(
        tv,
        builtins.int_instance,
        None,
        &mut ctx,
        AssignFlags::REVERSE_TYPE_VAR_MATCHING,
        0
    ));
    assert_eq!(wide_of(&fixture, &ctx, tv), Some(builtins.int_instance));

    // bool tightens int.
    assert!(solver.assign_type_var(
        tv,
        builtins.bool_instance,
        None,
        &mut ctx,
        AssignFlags::REVERSE_TYPE_VAR_MATCHING,
        0
    ));
    assert_eq!(wide_of(&fixture, &ctx, tv), Some(builtins.bool_instance));

    // str is unrelated to bool: refused.
    assert!(!solver.assign_type_var(
        tv,
        builtins.str_instance,
        None,
        &mut ctx,
        AssignFlags::REVERSE_TYPE_VAR_MATCHING,
        0
    ));
    assert_eq!(wide_of(&fixture, &ctx, tv), Some(builtins.bool_instance));
}

#[test]
fn declared_bound_rejects_incompatible_sources() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let scope = ScopeId(1);
    let tv = fixture.bounded_type_var("T", scope, builtins.int_instance);
    let mut ctx = TypeVarContext::new(scope);
    let mut diag = DiagnosticAddendum::new();

    assert!(solver.assign_type_var(tv, builtins.bool_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert!(!solver.assign_type_var(
        tv,
        builtins.str_instance,
        Some(&mut diag),
        &mut ctx,
        AssignFlags::DEFAULT,
        0
    ));
    // The failed call left the binding as it was.
    assert_eq!(narrow_of(&fixture, &ctx, tv), Some(builtins.bool_instance));
    assert!(!diag.is_empty());
}

#[test]
fn constrained_type_var_rejects_mixed_unconditional_sources() {
    // AnyStr with `str | bytes`: two unconditional subtypes map to
    // different constraints.
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let scope = ScopeId(1);
    let any_str = fixture.constrained_type_var(
        "AnyStr",
        scope,
        vec![builtins.str_instance, builtins.bytes_instance],
    );
    let mut ctx = TypeVarContext::new(scope);
    let mut diag = DiagnosticAddendum::new();

    let str_or_bytes = fixture.union(vec![builtins.str_instance, builtins.bytes_instance]);
    assert!(!solver.assign_type_var(
        any_str,
        str_or_bytes,
        Some(&mut diag),
        &mut ctx,
        AssignFlags::DEFAULT,
        0
    ));
    assert!(ctx.is_empty());
    assert!(!diag.is_empty());
}

#[test]
fn constrained_type_var_selects_the_narrowest_constraint() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let scope = ScopeId(1);
    // Constraints where one is a supertype of the other: the narrower
    // one wins for a bool source.
    let tv = fixture.constrained_type_var(
        "T",
        scope,
        vec![builtins.int_instance, builtins.bool_instance],
    );
    let mut ctx = TypeVarContext::new(scope);

    assert!(solver.assign_type_var(tv, builtins.bool_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    let narrow = narrow_of(&fixture, &ctx, tv).unwrap();
    // The binding is the bool constraint (conditions attached).
    assert_eq!(
        crate::queries::strip_literal(&fixture.db, crate::queries::with_conditions(&fixture.db, narrow, None)),
        builtins.bool_instance
    );
}

#[test]
fn constrained_type_var_accepts_a_matching_type_var_source() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let dest = fixture.constrained_type_var(
        "AnyStr",
        ScopeId(1),
        vec![builtins.str_instance, builtins.bytes_instance],
    );
    let src = fixture.constrained_type_var(
        "AnyStr",
        ScopeId(2),
        vec![builtins.str_instance, builtins.bytes_instance],
    );
    let mut ctx = TypeVarContext::new(ScopeId(1));

    assert!(solver.assign_type_var(dest, src, None, &mut ctx, AssignFlags::DEFAULT, 0));
    assert_eq!(narrow_of(&fixture, &ctx, dest), Some(src));
}

#[test]
fn pathological_union_widens_to_object() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let scope = ScopeId(1);
    let tv = fixture.bounded_type_var("T", scope, builtins.object_instance);
    let mut ctx = TypeVarContext::new(scope);

    // Distinct literal-retaining classes keep the union growing.
    for i in 0..=MAX_SUBTYPES_FOR_INFERRED_TYPE {
        let class = fixture.class(&format!("m.C{i}"));
        assert!(solver.assign_type_var(tv, class, None, &mut ctx, AssignFlags::DEFAULT, 0));
    }
    assert_eq!(narrow_of(&fixture, &ctx, tv), Some(builtins.object_instance));
}

#[test]
fn variadic_refuses_widening() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let scope = ScopeId(1);
    let tv = fixture.db.type_var(crate::types::TypeVarShape {
        name: fixture.db.intern_string("Ts"),
        scope_id: Some(scope),
        bound: None,
        constraints: Vec::new(),
        variance: Variance::Invariant,
        flags: crate::types::TypeVarFlags::VARIADIC,
        synthesized_index: None,
        instantiable: false,
    });
    let mut ctx = TypeVarContext::new(scope);

    assert!(solver.assign_type_var(tv, builtins.int_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
    // The bound is now tuple[int]; a str source would need a widened
    // union and variadic TypeVars refuse that.
    assert!(!solver.assign_type_var(tv, builtins.str_instance, None, &mut ctx, AssignFlags::DEFAULT, 0));
}

#[test]
fn populate_context_copies_same_class_specialization() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let scope = ScopeId(1);

    let covariant = fixture.variant_type_var("T_co", scope, Variance::Covariant);
    let box_class = fixture.generic_class("m.Box", vec![covariant], None);
    let expected = fixture.specialized(box_class, vec![builtins.int_instance]);

    let mut ctx = TypeVarContext::new(scope);
    assert!(solver.populate_context_from_expected_type(box_class, expected, &mut ctx, None));
    assert_eq!(narrow_of(&fixture, &ctx, covariant), Some(builtins.int_instance));
    assert_eq!(wide_of(&fixture, &ctx, covariant), None);
}

#[test]
fn populate_context_infers_through_a_base_class() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let base_scope = ScopeId(21);
    let sub_scope = ScopeId(22);

    // class Container[T_c]; class Sub[T_s](Container[T_s])
    let base_param = fixture.variant_type_var("T_c", base_scope, Variance::Invariant);
    let container = fixture.generic_class("m.Container", vec![base_param], None);

    let sub_param = fixture.variant_type_var("T_s", sub_scope, Variance::Invariant);
    let container_of_sub_param = fixture.specialized(container, vec![sub_param]);
    let sub = {
        let mut shape = (*crate::queries::class_shape_of(&fixture.db, fixture.class("m.Sub"))
            .unwrap())
        .clone();
        shape.type_params = vec![sub_param];
        shape.mro = vec![container_of_sub_param, builtins.object_instance];
        fixture.db.class(shape)
    };

    let expected = fixture.specialized(container, vec![builtins.int_instance]);
    let mut ctx = TypeVarContext::new(sub_scope);
    assert!(solver.populate_context_from_expected_type(sub, expected, &mut ctx, None));
    assert_eq!(narrow_of(&fixture, &ctx, sub_param), Some(builtins.int_instance));
}

#[test]
fn param_spec_binds_a_function_signature_once() {
    let fixture = Fixture::new();
    let solver = fixture.solver();
    let builtins = fixture.builtins();
    let scope = ScopeId(1);
    let param_spec = fixture.db.type_var(crate::types::TypeVarShape {
        name: fixture.db.intern_string("P"),
        scope_id: Some(scope),
        bound: None,
        constraints: Vec::new(),
        variance: Variance::Invariant,
        flags: crate::types::TypeVarFlags::PARAM_SPEC,
        synthesized_index: None,
        instantiable: false,
    });
    let mut ctx = TypeVarContext::new(scope);

    let takes_int = fixture.db.function(crate::types::FunctionShape {
        params: vec![crate::types::ParamInfo {
            category: crate::types::ParamCategory::Simple,
            name: None,
            ty: builtins.int_instance,
            has_default: false,
        }],
        return_type: TypeId::NONE,
        flags: Default::default(),
        type_guard: None,
        param_spec: None,
    });
    let takes_str = fixture.db.function(crate::types::FunctionShape {
        params: vec![crate::types::ParamInfo {
            category: crate::types::ParamCategory::Simple,
            name: None,
            ty: builtins.str_instance,
            has_default: false,
        }],
        return_type: TypeId::NONE,
        flags: Default::default(),
        type_guard: None,
        param_spec: None,
    });

    assert!(solver.assign_param_spec(param_spec, takes_int, None, &mut ctx, 0));
    // Re-binding with the same signature is fine; a different one is not.
    assert!(solver.assign_param_spec(param_spec, takes_int, None, &mut ctx, 0));
    assert!(!solver.assign_param_spec(param_spec, takes_str, None, &mut ctx, 0));
    // A non-function source is rejected.
    assert!(!solver.assign_param_spec(param_spec, builtins.int_instance, None, &mut ctx, 0));
    // Any is always accepted against the existing binding? No: Any
    // produces the (*args, **kwargs) form, which differs.
    let mut fresh = TypeVarContext::new(scope);
    assert!(solver.assign_param_spec(param_spec, TypeId::ANY, None, &mut fresh, 0));
}
