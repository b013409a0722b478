//! Type representation for the evaluator.
//!
//! Types are lightweight `TypeId` handles into an interning table; the
//! structure lives in `TypeKey` and the shape pools. Structurally
//! identical types intern to the same `TypeId`, so equality is a `u32`
//! comparison.

use pyty_common::Atom;
use serde::Serialize;

/// A lightweight handle to an interned type. Equality is O(1).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Default)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Internal placeholder - no valid type.
    pub const INVALID: TypeId = TypeId(0);

    /// The dynamic type: an explicitly-unchecked set of values.
    pub const ANY: TypeId = TypeId(1);

    /// An implicitly-unknown type (missing annotation, unresolved import).
    /// Behaves like `Any` in the relation but is tracked separately so
    /// inference can prefer known types over unknown ones.
    pub const UNKNOWN: TypeId = TypeId(2);

    /// The empty set of values.
    pub const NEVER: TypeId = TypeId(3);

    /// The `None` instance.
    pub const NONE: TypeId = TypeId(4);

    /// The instantiable form of `None` (`type[None]`).
    pub const NONE_TYPE: TypeId = TypeId(5);

    /// First id handed out for interned user types.
    pub const FIRST_USER: u32 = 16;

    pub fn is_intrinsic(self) -> bool {
        self.0 < Self::FIRST_USER
    }

    pub fn is_any(self) -> bool {
        self == Self::ANY
    }

    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }

    pub fn is_any_or_unknown(self) -> bool {
        self == Self::ANY || self == Self::UNKNOWN
    }

    pub fn is_never(self) -> bool {
        self == Self::NEVER
    }
}

/// Interned list of types (union members, overload signatures, MROs).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TypeListId(pub u32);

/// Interned class shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ClassShapeId(pub u32);

/// Interned function shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionShapeId(pub u32);

/// Interned type-variable shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeVarShapeId(pub u32);

/// Interned condition list (constrained-TypeVar provenance).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ConditionListId(pub u32);

/// Nominal identity of a class definition. All specialisations of one
/// generic class share a `DefId`; synthesized intersection classes get a
/// deterministic `DefId` keyed by their origin.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DefId(pub u32);

/// Identity of a type-variable solve scope (a generic function or class
/// definition site). Assigned by the embedder's binder.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(pub u32);

/// The structural interning key. Two types with equal keys are the same
/// type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKey {
    /// `Any`, `Unknown`, `Never`.
    Intrinsic(IntrinsicKind),

    /// The `None` singleton, instance or instantiable, optionally carrying
    /// narrowing provenance.
    None {
        instantiable: bool,
        conditions: Option<ConditionListId>,
    },

    /// A module object, identified by its fully-qualified name.
    Module(Atom),

    /// A class: instance or class-object depending on
    /// `ClassFlags::INSTANTIABLE`.
    Class(ClassShapeId),

    /// A single function signature.
    Function(FunctionShapeId),

    /// An overloaded function: ordered list of `Function` types.
    Overloaded(TypeListId),

    /// A type variable (including ParamSpecs and variadic TypeVars).
    TypeVar(TypeVarShapeId),

    /// A union. The member list is flat (no nested unions), deduplicated,
    /// and order-preserving.
    Union(TypeListId),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IntrinsicKind {
    Any,
    Unknown,
    Never,
}

/// Literal values carried by class instances.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    Bool(bool),
    Int(i64),
    Str(Atom),
    Bytes(Atom),
    /// An enum member, identified by name; the owning enum is the shape's
    /// `def_id`.
    EnumMember(Atom),
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ClassFlags: u16 {
        /// Class-qua-class (`type[C]`) rather than an instance of `C`.
        const INSTANTIABLE      = 1 << 0;
        const BUILTIN           = 1 << 1;
        const FINAL             = 1 << 2;
        const PROTOCOL          = 1 << 3;
        const TYPED_DICT        = 1 << 4;
        const TUPLE             = 1 << 5;
        const ENUM              = 1 << 6;
        /// Matches the class or any subclass (isinstance residue).
        const INCLUDE_SUBCLASSES = 1 << 7;
        /// Synthesized by the evaluator (intersection classes).
        const SYNTHESIZED       = 1 << 8;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FunctionFlags: u16 {
        const SYNTHESIZED = 1 << 0;
        const ASYNC       = 1 << 1;
        const OVERLOAD    = 1 << 2;
        /// A property getter; member access yields the return type.
        const PROPERTY    = 1 << 3;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TypeVarFlags: u16 {
        /// Binds a whole parameter list rather than a single type.
        const PARAM_SPEC       = 1 << 0;
        /// Binds a sequence of types (variadic generics).
        const VARIADIC         = 1 << 1;
        const SYNTHESIZED      = 1 << 2;
        /// The synthesized `Self` type.
        const SYNTHESIZED_SELF = 1 << 3;
        /// Placeholder for a recursive type alias; the aliased type is
        /// registered lazily so the cycle can be tied after interning.
        const RECURSIVE_ALIAS  = 1 << 4;
    }
}

/// Declared variance of a type parameter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Variance {
    Invariant,
    Covariant,
    Contravariant,
}

/// One element of a tuple specialisation. `is_unbounded` marks the
/// `tuple[T, ...]` form and is exclusive with fixed-length narrowing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TupleArg {
    pub ty: TypeId,
    pub is_unbounded: bool,
}

/// A declared TypedDict entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypedDictEntry {
    pub name: Atom,
    pub value_type: TypeId,
    pub required: bool,
}

/// Narrowing delta over the declared TypedDict entries. A key absent from
/// the delta inherits its declared required-ness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NarrowedEntry {
    pub name: Atom,
    pub is_provided: bool,
}

/// A class shape: instance or class-object depending on flags.
///
/// `def_id` carries nominal identity; everything else is the
/// specialisation and narrowing state. Literal-valued shapes must not be
/// instantiable - `TypeInterner::class` enforces this.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassShape {
    pub def_id: DefId,
    /// Fully-qualified name (`builtins.int`, `mymod.Circle`).
    pub name: Atom,
    pub flags: ClassFlags,
    /// Declared type parameters, as `TypeVar` types.
    pub type_params: Vec<TypeId>,
    /// Explicit specialisation; `None` for the unspecialised class.
    pub type_args: Option<Vec<TypeId>>,
    /// Tuple specialisation; set only for tuple classes.
    pub tuple_args: Option<Vec<TupleArg>>,
    pub literal: Option<LiteralValue>,
    /// Declared TypedDict entries; set only for TypedDict classes.
    pub td_entries: Option<Vec<TypedDictEntry>>,
    /// Narrowing delta over `td_entries`.
    pub narrowed_entries: Option<Vec<NarrowedEntry>>,
    /// Linearised proper ancestors, ending with `object` (the class
    /// itself is not listed). Entries are instance-form class types.
    pub mro: Vec<TypeId>,
    /// Declared members, sorted by atom.
    pub fields: Vec<(Atom, TypeId)>,
    /// Constrained-TypeVar provenance attached by narrowing.
    pub conditions: Option<ConditionListId>,
}

impl ClassShape {
    pub fn is_instantiable(&self) -> bool {
        self.flags.contains(ClassFlags::INSTANTIABLE)
    }

    pub fn field(&self, name: Atom) -> Option<TypeId> {
        self.fields
            .binary_search_by_key(&name, |(field, _)| *field)
            .ok()
            .map(|i| self.fields[i].1)
    }
}

/// Parameter category at a declaration site.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParamCategory {
    Simple,
    /// `*args`
    VarPositional,
    /// `**kwargs`
    VarKeyword,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParamInfo {
    pub category: ParamCategory,
    pub name: Option<Atom>,
    pub ty: TypeId,
    pub has_default: bool,
}

/// A user-defined type-guard return annotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeGuardInfo {
    pub guarded: TypeId,
    pub is_strict: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionShape {
    pub params: Vec<ParamInfo>,
    pub return_type: TypeId,
    pub flags: FunctionFlags,
    pub type_guard: Option<TypeGuardInfo>,
    /// `ParamSpec` the parameter list is bound to, if any.
    pub param_spec: Option<TypeId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeVarShape {
    pub name: Atom,
    /// Definition site. A TypeVar without a scope is out of scope for
    /// every solve and never binds.
    pub scope_id: Option<ScopeId>,
    pub bound: Option<TypeId>,
    /// A non-empty list makes this a constrained TypeVar; the solution
    /// set is exactly these types.
    pub constraints: Vec<TypeId>,
    pub variance: Variance,
    pub flags: TypeVarFlags,
    /// Ordinal for synthesized TypeVars (expected-type population).
    pub synthesized_index: Option<u32>,
    /// `type[T]` rather than `T`.
    pub instantiable: bool,
}

impl TypeVarShape {
    pub fn is_param_spec(&self) -> bool {
        self.flags.contains(TypeVarFlags::PARAM_SPEC)
    }

    pub fn is_variadic(&self) -> bool {
        self.flags.contains(TypeVarFlags::VARIADIC)
    }

    pub fn is_synthesized(&self) -> bool {
        self.flags
            .intersects(TypeVarFlags::SYNTHESIZED | TypeVarFlags::SYNTHESIZED_SELF)
    }

    pub fn is_constrained(&self) -> bool {
        !self.constraints.is_empty()
    }
}

/// Provenance of a constrained-TypeVar narrowing residue: which
/// constraint of which TypeVar produced the annotated type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Condition {
    pub type_var: TypeVarShapeId,
    pub constraint_index: u32,
}
