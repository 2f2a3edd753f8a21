//! This module provides deterministic `HashMap` and `HashSet` variants. The hashing data
//! structures in the standard library are not deterministic:
//!
//! > By default, HashMap uses a hashing algorithm selected to provide
//! > resistance against HashDoS attacks. The algorithm is randomly seeded, and a
//! > reasonable best-effort is made to generate this seed from a high quality,
//! > secure source of randomness provided by the host without blocking the program.
//!
//! `HashMap<K, V, S>` does not have a `new` method for a non-default hasher; use
//! `HashMap::default()` instead. `FxBuildHasher` is re-exported for containers that take an
//! explicit hasher parameter, such as the entity table's `IndexMap`.

pub use rustc_hash::{FxBuildHasher, FxHashMap as HashMap, FxHashSet as HashSet};
