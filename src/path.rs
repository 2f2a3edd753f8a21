/*!

An [`EntityPath`] is a hierarchical, separator-delimited address: an ordered sequence of
segments plus an absolute/relative flag. Paths are pure values; nothing in this module
touches shared state. The storage core itself addresses entities by id — paths are the
addressing algebra used by collaborators that arrange entities hierarchically (tree
components, templates).

A path is *absolute* if its string form starts with the separator, *relative* otherwise.
Two distinguished paths exist: the *empty* path (relative, depth 0, canonical form `""`)
and the *root* path (absolute, depth 0, canonical form `"/"`). Every other canonical form
ends with a trailing separator:

```rust
use holon::EntityPath;

let path = EntityPath::from("/a/b");
assert_eq!(path.to_string(), "/a/b/");
assert_eq!(path.depth(), 2);
assert!(path.is_absolute());
```

*/

use std::convert::Infallible;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::HolonError;

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// The literal segment representing the root of an absolute path.
pub const ROOT_MARKER: &str = "/";

/// A hierarchical entity address. Equality is structural: two paths are equal iff their
/// canonical string forms are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityPath {
    absolute: bool,
    /// Segments excluding the root marker.
    segments: Vec<String>,
}

impl EntityPath {
    /// The empty path: relative, depth 0, canonical form `""`.
    #[must_use]
    pub fn empty() -> Self {
        EntityPath {
            absolute: false,
            segments: Vec::new(),
        }
    }

    /// The root path: absolute, depth 0, canonical form `"/"`.
    #[must_use]
    pub fn root() -> Self {
        EntityPath {
            absolute: true,
            segments: Vec::new(),
        }
    }

    /// Parses a string into a path. A leading separator makes the path absolute;
    /// consecutive and trailing separators are insignificant. `"/"` parses to the root
    /// path and `""` parses to the empty path. Parsing never fails.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        EntityPath {
            absolute: input.starts_with(SEPARATOR),
            segments: input
                .split(SEPARATOR)
                .filter(|segment| !segment.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.absolute && self.segments.is_empty()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.absolute && self.segments.is_empty()
    }

    #[must_use]
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    #[must_use]
    pub fn is_relative(&self) -> bool {
        !self.absolute
    }

    /// The number of segments excluding the root marker.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The last segment: the root marker for the root path, `""` for the empty path.
    #[must_use]
    pub fn name(&self) -> &str {
        if self.is_root() {
            return ROOT_MARKER;
        }
        self.segments.last().map_or("", String::as_str)
    }

    /// The ordered segment strings, with the root marker as a literal first element for
    /// absolute paths.
    #[must_use]
    pub fn segments(&self) -> Vec<&str> {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        if self.absolute {
            segments.push(ROOT_MARKER);
        }
        segments.extend(self.segments.iter().map(String::as_str));
        segments
    }

    /// Concatenates this path's segments with `other`'s.
    ///
    /// The empty path is the identity on either side. Joining onto the root path
    /// re-anchors `other` as absolute. Otherwise the result carries this path's
    /// absoluteness — joining never makes an absolute receiver relative.
    #[must_use]
    pub fn join(&self, other: &EntityPath) -> EntityPath {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        EntityPath {
            absolute: self.absolute,
            segments,
        }
    }

    /// Parses `path` and joins it after this path.
    #[must_use]
    pub fn append(&self, path: &str) -> EntityPath {
        self.join(&EntityPath::parse(path))
    }

    /// Parses `path` and joins this path after it.
    #[must_use]
    pub fn prepend(&self, path: &str) -> EntityPath {
        EntityPath::parse(path).join(self)
    }

    /// Computes the suffix of `other` that extends beyond this path, as a relative path.
    ///
    /// `other` must literally begin with all of this path's segments and be strictly
    /// deeper. Fails with an argument error if either operand is the empty path, if one
    /// path is absolute and the other relative, if `other` does not start with this
    /// path's full segment sequence, or if the two paths are equal.
    pub fn relativize(&self, other: &EntityPath) -> Result<EntityPath, HolonError> {
        if self.is_empty() || other.is_empty() {
            return Err(HolonError::Argument(
                "relativize is undefined for the empty path".to_string(),
            ));
        }
        if self.absolute != other.absolute {
            return Err(HolonError::Argument(format!(
                "cannot relativize '{other}' against '{self}': one path is absolute and the other relative"
            )));
        }
        if other.segments.len() <= self.segments.len()
            || !other.segments.starts_with(&self.segments)
        {
            return Err(HolonError::Argument(format!(
                "'{other}' does not extend '{self}'"
            )));
        }
        Ok(EntityPath {
            absolute: false,
            segments: other.segments[self.segments.len()..].to_vec(),
        })
    }
}

impl Display for EntityPath {
    /// Renders the canonical form: a trailing separator after every segment, a single
    /// separator for the root path, the empty string for the empty path.
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.absolute {
            write!(f, "{SEPARATOR}")?;
        }
        for segment in &self.segments {
            write!(f, "{segment}{SEPARATOR}")?;
        }
        Ok(())
    }
}

impl From<&str> for EntityPath {
    fn from(input: &str) -> Self {
        EntityPath::parse(input)
    }
}

impl FromStr for EntityPath {
    type Err = Infallible;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Ok(EntityPath::parse(input))
    }
}
