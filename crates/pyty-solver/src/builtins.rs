//! Well-known builtin types.
//!
//! The evaluator proper never resolves names; the handful of builtin
//! classes it must recognize structurally (`object`, `type`, the literal
//! carriers, the container classes of `in` narrowing) are interned once at
//! construction and handed to the engines as a `Builtins` value.

use pyty_common::Atom;

use crate::db::TypeDatabase;
use crate::intern::TypeInterner;
use crate::types::{ClassFlags, ClassShape, DefId, LiteralValue, TypeId};

/// Handles to the builtin types the engines special-case.
#[derive(Clone, Debug)]
pub struct Builtins {
    pub object_def: DefId,
    pub object_instance: TypeId,
    pub object_class: TypeId,

    pub type_def: DefId,
    pub type_instance: TypeId,
    pub type_class: TypeId,

    pub bool_def: DefId,
    pub bool_instance: TypeId,
    pub int_def: DefId,
    pub int_instance: TypeId,
    pub str_def: DefId,
    pub str_instance: TypeId,
    pub bytes_def: DefId,
    pub bytes_instance: TypeId,

    pub tuple_def: DefId,
    pub tuple_instance: TypeId,
    pub dict_def: DefId,
    pub dict_instance: TypeId,
    pub list_def: DefId,
    pub list_instance: TypeId,
    pub set_def: DefId,
    pub set_instance: TypeId,
    pub frozenset_def: DefId,
    pub frozenset_instance: TypeId,
    pub deque_def: DefId,
    pub deque_instance: TypeId,
    pub defaultdict_def: DefId,
    pub defaultdict_instance: TypeId,
    pub ordered_dict_def: DefId,
    pub ordered_dict_instance: TypeId,

    pub true_literal: TypeId,
    pub false_literal: TypeId,
}

impl Builtins {
    pub(crate) fn placeholder() -> Self {
        let invalid = TypeId::INVALID;
        let def = DefId(u32::MAX);
        Builtins {
            object_def: def,
            object_instance: invalid,
            object_class: invalid,
            type_def: def,
            type_instance: invalid,
            type_class: invalid,
            bool_def: def,
            bool_instance: invalid,
            int_def: def,
            int_instance: invalid,
            str_def: def,
            str_instance: invalid,
            bytes_def: def,
            bytes_instance: invalid,
            tuple_def: def,
            tuple_instance: invalid,
            dict_def: def,
            dict_instance: invalid,
            list_def: def,
            list_instance: invalid,
            set_def: def,
            set_instance: invalid,
            frozenset_def: def,
            frozenset_instance: invalid,
            deque_def: def,
            deque_instance: invalid,
            defaultdict_def: def,
            defaultdict_instance: invalid,
            ordered_dict_def: def,
            ordered_dict_instance: invalid,
            true_literal: invalid,
            false_literal: invalid,
        }
    }

    /// Sequence-like containers whose first type argument is the element
    /// type for `in` narrowing.
    pub fn sequence_container_defs(&self) -> [DefId; 5] {
        [
            self.list_def,
            self.set_def,
            self.frozenset_def,
            self.deque_def,
            self.tuple_def,
        ]
    }

    /// Mapping containers whose first type argument (the key type) drives
    /// `in` narrowing.
    pub fn mapping_container_defs(&self) -> [DefId; 3] {
        [self.dict_def, self.defaultdict_def, self.ordered_dict_def]
    }
}

fn simple_class(
    db: &TypeInterner,
    name: Atom,
    def_id: DefId,
    flags: ClassFlags,
    mro: Vec<TypeId>,
) -> TypeId {
    db.class(ClassShape {
        def_id,
        name,
        flags: flags | ClassFlags::BUILTIN,
        type_params: Vec::new(),
        type_args: None,
        tuple_args: None,
        literal: None,
        td_entries: None,
        narrowed_entries: None,
        mro,
        fields: Vec::new(),
        conditions: None,
    })
}

fn instantiable(db: &TypeInterner, instance: TypeId) -> TypeId {
    let Some(crate::types::TypeKey::Class(shape_id)) = db.lookup(instance) else {
        return TypeId::INVALID;
    };
    let mut shape = (*db.class_shape(shape_id)).clone();
    shape.flags |= ClassFlags::INSTANTIABLE;
    db.class(shape)
}

pub(crate) fn install(db: &TypeInterner) -> Builtins {
    let name = |s: &str| db.intern_string(s);

    let object_def = db.fresh_def_id();
    let object_instance = simple_class(db, name("builtins.object"), object_def, ClassFlags::empty(), vec![]);
    let object_class = instantiable(db, object_instance);

    let class = |qualname: &str, flags: ClassFlags, mro: Vec<TypeId>| {
        let def = db.fresh_def_id();
        let instance = simple_class(db, name(qualname), def, flags, mro);
        (def, instance)
    };

    let (type_def, type_instance) = class("builtins.type", ClassFlags::empty(), vec![object_instance]);
    let type_class = instantiable(db, type_instance);

    let (int_def, int_instance) = class("builtins.int", ClassFlags::empty(), vec![object_instance]);
    let (bool_def, bool_instance) = class(
        "builtins.bool",
        ClassFlags::FINAL,
        vec![int_instance, object_instance],
    );
    let (str_def, str_instance) = class("builtins.str", ClassFlags::empty(), vec![object_instance]);
    let (bytes_def, bytes_instance) =
        class("builtins.bytes", ClassFlags::empty(), vec![object_instance]);

    let (tuple_def, tuple_instance) = class(
        "builtins.tuple",
        ClassFlags::TUPLE,
        vec![object_instance],
    );
    let (dict_def, dict_instance) = class("builtins.dict", ClassFlags::empty(), vec![object_instance]);
    let (list_def, list_instance) = class("builtins.list", ClassFlags::empty(), vec![object_instance]);
    let (set_def, set_instance) = class("builtins.set", ClassFlags::empty(), vec![object_instance]);
    let (frozenset_def, frozenset_instance) =
        class("builtins.frozenset", ClassFlags::empty(), vec![object_instance]);
    let (deque_def, deque_instance) = class(
        "collections.deque",
        ClassFlags::empty(),
        vec![object_instance],
    );
    let (defaultdict_def, defaultdict_instance) = class(
        "collections.defaultdict",
        ClassFlags::empty(),
        vec![dict_instance, object_instance],
    );
    let (ordered_dict_def, ordered_dict_instance) = class(
        "collections.OrderedDict",
        ClassFlags::empty(),
        vec![dict_instance, object_instance],
    );

    let bool_literal = |value: bool| {
        let Some(crate::types::TypeKey::Class(shape_id)) = db.lookup(bool_instance) else {
            return TypeId::INVALID;
        };
        let mut shape = (*db.class_shape(shape_id)).clone();
        shape.literal = Some(LiteralValue::Bool(value));
        db.class(shape)
    };
    let true_literal = bool_literal(true);
    let false_literal = bool_literal(false);

    Builtins {
        object_def,
        object_instance,
        object_class,
        type_def,
        type_instance,
        type_class,
        bool_def,
        bool_instance,
        int_def,
        int_instance,
        str_def,
        str_instance,
        bytes_def,
        bytes_instance,
        tuple_def,
        tuple_instance,
        dict_def,
        dict_instance,
        list_def,
        list_instance,
        set_def,
        set_instance,
        frozenset_def,
        frozenset_instance,
        deque_def,
        deque_instance,
        defaultdict_def,
        defaultdict_instance,
        ordered_dict_def,
        ordered_dict_instance,
        true_literal,
        false_literal,
    }
}
