//! Hard limits that bound recursive type computations.

/// Maximum recursion depth threaded through the solver and the relation.
/// Exceeding it yields a conservative answer (assignability succeeds) so
/// cyclic recursive aliases always terminate.
pub const MAX_TYPE_RECURSION_COUNT: u32 = 20;

/// Maximum recursion depth for narrowing-callback construction.
pub const MAX_NARROWING_RECURSION: u32 = 20;

/// A union wider than this is considered pathological: when a bounded
/// TypeVar's narrow bound would exceed it, the solver widens the bound to
/// `object` instead of accumulating subtypes.
pub const MAX_SUBTYPES_FOR_INFERRED_TYPE: usize = 64;

/// Enums wider than this are not expanded into literal unions in
/// negative narrowing; the chance of the residue being useful is too
/// small for the cost of building it.
pub const MAX_ENUM_LITERAL_EXPANSION: usize = 100;
