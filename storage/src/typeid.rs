//! Stable structural type identifiers used to discriminate mutation variants
//! when (de)serializing the persisted log, per storage.md §6: the trailing
//! `"": "<TypeID>"` field in each mutation object.
//!
//! This is deliberately *not* Rust's `std::any::TypeId`, which is neither
//! stable across compilations nor across process versions. Instead it is a
//! 128-bit hash of the mutation's declared name and field names, computed
//! with two differently-seeded `DefaultHasher`s to fill the full width.

use std::hash::{Hash, Hasher};

/// A stable 128-bit structural type identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId128(pub u128);

impl std::fmt::Display for TypeId128 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl std::str::FromStr for TypeId128 {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u128::from_str_radix(s, 16).map(TypeId128)
    }
}

/// Computes the `TypeID` for a reflected mutation shape: its variant name
/// (e.g. `"UsersUpdated"`) plus the ordered names of its fields (e.g.
/// `["us", "data"]`). Two mutation shapes with the same name and field
/// names hash identically, which is the forward-compatibility property the
/// spec asks for: renaming a field changes the `TypeID`, reordering
/// unrelated containers in the schema does not.
/// Implemented by a schema's closed `Mutation` enum so the persister can
/// stamp each mutation with its structural `TypeID` on the wire (the
/// trailing `"": "<TypeID>"` field storage.md §6 requires). A schema author
/// writes one match arm per variant, naming the same fields that appear in
/// the variant's own definition.
pub trait ReflectedMutation {
    fn type_id(&self) -> TypeId128;
}

pub fn mutation_type_id(variant_name: &str, field_names: &[&str]) -> TypeId128 {
    let mut low_hasher = std::collections::hash_map::DefaultHasher::new();
    0xA5A5_u64.hash(&mut low_hasher);
    variant_name.hash(&mut low_hasher);
    for name in field_names {
        name.hash(&mut low_hasher);
    }
    let low = low_hasher.finish();

    let mut high_hasher = std::collections::hash_map::DefaultHasher::new();
    0x5A5A_5A5A_u64.hash(&mut high_hasher);
    field_names.len().hash(&mut high_hasher);
    variant_name.hash(&mut high_hasher);
    for name in field_names.iter().rev() {
        name.hash(&mut high_hasher);
    }
    let high = high_hasher.finish();

    TypeId128(((high as u128) << 64) | low as u128)
}
