use pyty_common::Span;

use crate::db::TypeDatabase;
use crate::queries::union_members;
use crate::testing::Fixture;
use crate::types::{TypeId, TypeKey};

#[test]
fn sentinels_are_seeded() {
    let fixture = Fixture::new();
    assert!(matches!(
        fixture.db.lookup(TypeId::ANY),
        Some(TypeKey::Intrinsic(_))
    ));
    assert!(matches!(
        fixture.db.lookup(TypeId::NONE),
        Some(TypeKey::None {
            instantiable: false,
            ..
        })
    ));
    assert!(fixture.db.lookup(TypeId::INVALID).is_none());
}

#[test]
fn interning_is_structural() {
    let fixture = Fixture::new();
    let a = fixture.db.literal_int(42);
    let b = fixture.db.literal_int(42);
    let c = fixture.db.literal_int(43);
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn union_flattens_and_deduplicates() {
    let fixture = Fixture::new();
    let int = fixture.builtins().int_instance;
    let string = fixture.builtins().str_instance;
    let inner = fixture.union(vec![int, TypeId::NONE]);
    let outer = fixture.union(vec![string, inner, int]);

    let members = union_members(&fixture.db, outer);
    assert_eq!(members, vec![string, int, TypeId::NONE]);
    // No member is itself a union.
    for member in members {
        assert!(!matches!(fixture.db.lookup(member), Some(TypeKey::Union(_))));
    }
}

#[test]
fn union_collapses_singletons_and_drops_never() {
    let fixture = Fixture::new();
    let int = fixture.builtins().int_instance;
    assert_eq!(fixture.union(vec![int, TypeId::NEVER]), int);
    assert_eq!(fixture.union(vec![TypeId::NEVER]), TypeId::NEVER);
    assert_eq!(fixture.union(vec![]), TypeId::NEVER);
}

#[test]
fn union_absorbs_literals_into_their_base() {
    let fixture = Fixture::new();
    let int = fixture.builtins().int_instance;
    let one = fixture.db.literal_int(1);
    let str_lit = fixture.db.literal_str("a");

    let combined = fixture.union(vec![one, int, str_lit]);
    let members = union_members(&fixture.db, combined);
    assert_eq!(members, vec![int, str_lit]);
}

#[test]
fn union2_shortcuts_identical_sides() {
    let fixture = Fixture::new();
    let int = fixture.builtins().int_instance;
    assert_eq!(fixture.db.union2(int, int), int);
}

#[test]
fn intersection_identity_is_deterministic() {
    let fixture = Fixture::new();
    let module = fixture.db.intern_string("mod");
    let filter = fixture.db.intern_string("Filter");
    let span = Span::new(10, 30);
    let a = fixture.db.intersection_def_id((module, span, filter));
    let b = fixture.db.intersection_def_id((module, span, filter));
    let c = fixture
        .db
        .intersection_def_id((module, Span::new(40, 50), filter));
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn bool_literals_are_the_builtin_ones() {
    let fixture = Fixture::new();
    assert_eq!(fixture.db.literal_bool(true), fixture.builtins().true_literal);
    assert_eq!(
        fixture.db.literal_bool(false),
        fixture.builtins().false_literal
    );
}

#[test]
fn literal_class_shapes_are_never_instantiable() {
    let fixture = Fixture::new();
    let one = fixture.db.literal_int(1);
    let instantiable = crate::queries::to_instantiable(&fixture.db, one).unwrap();
    // Widening to the class object drops the literal.
    assert_eq!(fixture.display(instantiable), "type[int]");
}

#[test]
fn alias_chains_resolve_and_self_cycles_degrade() {
    let fixture = Fixture::new();
    let builtins = fixture.builtins();
    let alias = |name: &str| {
        fixture.db.type_var(crate::types::TypeVarShape {
            name: fixture.db.intern_string(name),
            scope_id: None,
            bound: None,
            constraints: Vec::new(),
            variance: crate::types::Variance::Invariant,
            flags: crate::types::TypeVarFlags::RECURSIVE_ALIAS,
            synthesized_index: None,
            instantiable: false,
        })
    };
    let shape_id = |ty| crate::queries::typevar_shape_id_of(&fixture.db, ty).unwrap();

    // B = int; A = B: the chain resolves through both placeholders.
    let b = alias("B");
    fixture.db.set_alias_target(shape_id(b), builtins.int_instance);
    let a = alias("A");
    fixture.db.set_alias_target(shape_id(a), b);
    assert_eq!(
        crate::queries::transform_possible_recursive_alias(&fixture.db, a),
        builtins.int_instance
    );

    // C = C: a pure placeholder cycle has no structure to resolve to.
    let c = alias("C");
    fixture.db.set_alias_target(shape_id(c), c);
    assert_eq!(
        crate::queries::transform_possible_recursive_alias(&fixture.db, c),
        TypeId::UNKNOWN
    );
}

#[test]
fn display_formats() {
    let fixture = Fixture::new();
    let builtins = fixture.builtins();
    let optional_int = fixture.union(vec![builtins.int_instance, TypeId::NONE]);
    assert_eq!(fixture.display(optional_int), "int | None");

    let pair = fixture.tuple_of(&[builtins.int_instance, builtins.str_instance]);
    assert_eq!(fixture.display(pair), "tuple[int, str]");

    assert_eq!(fixture.display(fixture.db.literal_str("circle")), "Literal['circle']");
    assert_eq!(fixture.display(fixture.db.literal_bool(true)), "Literal[True]");
}
