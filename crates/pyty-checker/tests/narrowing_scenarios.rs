//! End-to-end narrowing scenarios: parse-tree test expressions through
//! guard extraction and type-level narrowing.

use pyty_ast::{BinaryOperator, NodeArena, NodeIndex};
use pyty_checker::{FlowAnalyzer, NodeTypeMap};
use pyty_common::{CancellationToken, Interner};
use pyty_solver::db::TypeDatabase;
use pyty_solver::display::format_type;
use pyty_solver::queries::specialize;
use pyty_solver::types::{ClassFlags, ClassShape, TypedDictEntry, TypeId};
use pyty_solver::{NarrowingContext, TypeInterner};

struct World {
    db: TypeInterner,
    arena: NodeArena,
    types: NodeTypeMap,
    cancel: CancellationToken,
}

impl World {
    fn new() -> Self {
        let strings = Interner::new();
        World {
            db: TypeInterner::with_strings(strings.clone()),
            arena: NodeArena::new(strings),
            types: NodeTypeMap::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Narrow `declared` along both edges of `test` for `reference`.
    fn narrow_both(&self, reference: NodeIndex, test: NodeIndex, declared: TypeId) -> (TypeId, TypeId) {
        let analyzer = FlowAnalyzer {
            db: &self.db,
            builtins: self.db.builtins(),
            cancel: &self.cancel,
            arena: &self.arena,
            types: &self.types,
            module_name: self.db.intern_string("m"),
        };
        let narrowing = NarrowingContext::new(&self.db, self.db.builtins(), &self.cancel);
        let positive = analyzer
            .narrowing_callback_for(reference, test, true, 0)
            .map_or(declared, |callback| callback.apply(&narrowing, declared));
        let negative = analyzer
            .narrowing_callback_for(reference, test, false, 0)
            .map_or(declared, |callback| callback.apply(&narrowing, declared));
        (positive, negative)
    }

    fn display(&self, ty: TypeId) -> String {
        format_type(&self.db, ty)
    }

    fn plain_class(&self, name: &str, fields: Vec<(&str, TypeId)>) -> TypeId {
        let mut sorted: Vec<_> = fields
            .into_iter()
            .map(|(field, ty)| (self.db.intern_string(field), ty))
            .collect();
        sorted.sort_by_key(|&(atom, _)| atom);
        self.db.class(ClassShape {
            def_id: self.db.fresh_def_id(),
            name: self.db.intern_string(name),
            flags: ClassFlags::empty(),
            type_params: Vec::new(),
            type_args: None,
            tuple_args: None,
            literal: None,
            td_entries: None,
            narrowed_entries: None,
            mro: vec![self.db.builtins().object_instance],
            fields: sorted,
            conditions: None,
        })
    }

    fn typed_dict(&self, name: &str, entries: Vec<(&str, TypeId, bool)>, is_final: bool) -> TypeId {
        let mut flags = ClassFlags::TYPED_DICT;
        if is_final {
            flags |= ClassFlags::FINAL;
        }
        self.db.class(ClassShape {
            def_id: self.db.fresh_def_id(),
            name: self.db.intern_string(name),
            flags,
            type_params: Vec::new(),
            type_args: None,
            tuple_args: None,
            literal: None,
            td_entries: Some(
                entries
                    .into_iter()
                    .map(|(key, value_type, required)| TypedDictEntry {
                        name: self.db.intern_string(key),
                        value_type,
                        required,
                    })
                    .collect(),
            ),
            narrowed_entries: None,
            mro: vec![self.db.builtins().object_instance],
            fields: Vec::new(),
            conditions: None,
        })
    }

    fn tuple_of(&self, elements: &[TypeId]) -> TypeId {
        let base = self.db.builtins().tuple_instance;
        let shape = pyty_solver::queries::class_shape_of(&self.db, base).unwrap();
        let mut tuple = (*shape).clone();
        tuple.tuple_args = Some(
            elements
                .iter()
                .map(|&ty| pyty_solver::types::TupleArg {
                    ty,
                    is_unbounded: false,
                })
                .collect(),
        );
        self.db.class(tuple)
    }
}

/// `x: int | None`, `x is None`: positive narrows to `None`, negative to
/// `int`.
#[test]
fn optional_is_none() {
    let mut world = World::new();
    let builtins = world.db.builtins();
    let declared = world
        .db
        .union(vec![builtins.int_instance, TypeId::NONE]);

    let reference = world.arena.name("x");
    let subject = world.arena.name("x");
    let none = world.arena.none();
    let test = world.arena.binary(BinaryOperator::Is, subject, none);

    let (positive, negative) = world.narrow_both(reference, test, declared);
    assert_eq!(world.display(positive), "None");
    assert_eq!(world.display(negative), "int");
}

/// `x: tuple[int, str] | tuple[None, str]`, `x[0] is None`.
#[test]
fn tuple_entry_discriminates_the_union() {
    let mut world = World::new();
    let builtins = world.db.builtins();
    let int_str = world.tuple_of(&[builtins.int_instance, builtins.str_instance]);
    let none_str = world.tuple_of(&[TypeId::NONE, builtins.str_instance]);
    let declared = world.db.union(vec![int_str, none_str]);

    let reference = world.arena.name("x");
    let base = world.arena.name("x");
    let zero = world.arena.number(0);
    let subject = world.arena.index(base, zero);
    let none = world.arena.none();
    let test = world.arena.binary(BinaryOperator::Is, subject, none);

    let (positive, negative) = world.narrow_both(reference, test, declared);
    assert_eq!(world.display(positive), "tuple[None, str]");
    assert_eq!(world.display(negative), "tuple[int, str]");
}

/// `x: Circle | Square` with literal `kind` fields, `x.kind == "circle"`.
#[test]
fn member_discriminator_selects_the_variant() {
    let mut world = World::new();
    let circle_kind = world.db.literal_str("circle");
    let square_kind = world.db.literal_str("square");
    let circle = world.plain_class("m.Circle", vec![("kind", circle_kind)]);
    let square = world.plain_class("m.Square", vec![("kind", square_kind)]);
    let declared = world.db.union(vec![circle, square]);

    let reference = world.arena.name("x");
    let receiver = world.arena.name("x");
    let subject = world.arena.member(receiver, "kind");
    let value = world.arena.string("circle");
    let test = world.arena.binary(BinaryOperator::Equals, subject, value);

    let (positive, negative) = world.narrow_both(reference, test, declared);
    assert_eq!(world.display(positive), "Circle");
    assert_eq!(world.display(negative), "Square");
}

/// `x: Movie | Book` TypedDicts, `"director" in x`: Movie survives
/// as-is, Book survives with the key marked provided; a final Book is
/// eliminated.
#[test]
fn typed_dict_key_presence_marks_the_entry() {
    let mut world = World::new();
    let builtins = world.db.builtins();
    let movie = world.typed_dict(
        "m.Movie",
        vec![
            ("title", builtins.str_instance, true),
            ("director", builtins.str_instance, true),
        ],
        false,
    );
    let book = world.typed_dict("m.Book", vec![("title", builtins.str_instance, true)], false);
    let declared = world.db.union(vec![movie, book]);

    let reference = world.arena.name("x");
    let key = world.arena.string("director");
    let subject = world.arena.name("x");
    let test = world.arena.binary(BinaryOperator::In, key, subject);
    world.types.insert(subject, declared);

    let (positive, _) = world.narrow_both(reference, test, declared);
    let members = pyty_solver::queries::union_members(&world.db, positive);
    assert_eq!(members.len(), 2);
    assert!(members.contains(&movie));
    let narrowed_book = members.into_iter().find(|&member| member != movie).unwrap();
    let shape = pyty_solver::queries::class_shape_of(&world.db, narrowed_book).unwrap();
    let director = world.db.intern_string("director");
    let entries = pyty_solver::queries::typed_dict_members(&world.db, &shape, true);
    assert!(entries
        .iter()
        .any(|entry| entry.name == director && entry.is_provided && !entry.is_required));

    // The final variant is dropped instead.
    let final_book =
        world.typed_dict("m.FinalBook", vec![("title", builtins.str_instance, true)], true);
    let with_final = world.db.union(vec![movie, final_book]);
    let key = world.arena.string("director");
    let subject = world.arena.name("x");
    let test = world.arena.binary(BinaryOperator::In, key, subject);
    world.types.insert(subject, with_final);
    let (positive, _) = world.narrow_both(reference, test, with_final);
    assert_eq!(positive, movie);
}

/// The `in` corpus: literal containers intersect with the reference's
/// subtypes.
#[test]
fn containment_against_literal_tuples() {
    let mut world = World::new();
    let builtins = world.db.builtins();
    // x: int | str | None, x in (1, 2, "a")
    let declared = world.db.union(vec![
        builtins.int_instance,
        builtins.str_instance,
        TypeId::NONE,
    ]);
    let container = world.tuple_of(&[
        world.db.literal_int(1),
        world.db.literal_int(2),
        world.db.literal_str("a"),
    ]);

    let reference = world.arena.name("x");
    let subject = world.arena.name("x");
    let container_expr = world.arena.tuple_expr(vec![]);
    world.types.insert(container_expr, container);
    let test = world
        .arena
        .binary(BinaryOperator::In, subject, container_expr);

    let (positive, negative) = world.narrow_both(reference, test, declared);
    assert_eq!(world.display(positive), "Literal[1] | Literal[2] | Literal['a']");
    // The negative branch does not narrow containment.
    assert_eq!(negative, declared);
}

#[test]
fn containment_against_a_frozenset() {
    let mut world = World::new();
    let builtins = world.db.builtins();
    // val: str | None, val in container: frozenset[str]
    let declared = world.db.union(vec![builtins.str_instance, TypeId::NONE]);
    let container = specialize(
        &world.db,
        builtins.frozenset_instance,
        vec![builtins.str_instance],
    );

    let reference = world.arena.name("val");
    let subject = world.arena.name("val");
    let container_expr = world.arena.name("container");
    world.types.insert(container_expr, container);
    let test = world
        .arena
        .binary(BinaryOperator::In, subject, container_expr);

    let (positive, negative) = world.narrow_both(reference, test, declared);
    assert_eq!(world.display(positive), "str");
    assert_eq!(negative, declared);
}

#[test]
fn not_in_narrows_the_else_branch() {
    let mut world = World::new();
    let builtins = world.db.builtins();
    // y: int | None, if y not in z: ... else: <- y is Never here
    let declared = world.db.union(vec![builtins.int_instance, TypeId::NONE]);
    let container = specialize(
        &world.db,
        builtins.dict_instance,
        vec![builtins.str_instance, builtins.str_instance],
    );

    let reference = world.arena.name("y");
    let subject = world.arena.name("y");
    let container_expr = world.arena.name("z");
    world.types.insert(container_expr, container);
    let test = world
        .arena
        .binary(BinaryOperator::NotIn, subject, container_expr);

    let (positive, negative) = world.narrow_both(reference, test, declared);
    assert_eq!(positive, declared);
    assert_eq!(negative, TypeId::NEVER);
}

/// isinstance against a subclass filter preserves type arguments via
/// expected-type inference, and the callback is pure.
#[test]
fn isinstance_end_to_end() {
    let mut world = World::new();
    let builtins = world.db.builtins();
    let declared = world.db.union(vec![builtins.int_instance, TypeId::NONE]);

    let reference = world.arena.name("x");
    let arg = world.arena.name("x");
    let filter_expr = world.arena.name("int");
    let int_object =
        pyty_solver::queries::to_instantiable(&world.db, builtins.int_instance).unwrap();
    world.types.insert(filter_expr, int_object);
    let test = world.arena.call_name("isinstance", vec![arg, filter_expr]);

    let (positive, negative) = world.narrow_both(reference, test, declared);
    assert_eq!(world.display(positive), "int");
    assert_eq!(world.display(negative), "None");

    // Purity: a second application of the same callback agrees.
    let (positive_again, negative_again) = world.narrow_both(reference, test, declared);
    assert_eq!(positive, positive_again);
    assert_eq!(negative, negative_again);
}

/// Exhaustiveness across the dispatcher: no value is dropped from both
/// branches.
#[test]
fn branches_cover_the_declared_type() {
    let mut world = World::new();
    let builtins = world.db.builtins();
    let declared = world.db.union(vec![
        builtins.int_instance,
        builtins.str_instance,
        TypeId::NONE,
    ]);

    let reference = world.arena.name("x");
    let subject = world.arena.name("x");
    let none = world.arena.none();
    let test = world.arena.binary(BinaryOperator::Is, subject, none);

    let (positive, negative) = world.narrow_both(reference, test, declared);
    let rejoined = world.db.union(vec![positive, negative]);
    let relation = pyty_solver::relate::AssignCheck::new(
        &world.db,
        world.db.builtins(),
        &world.cancel,
    );
    assert!(relation.is_assignable(rejoined, declared));
    assert!(relation.is_assignable(declared, rejoined));
}
