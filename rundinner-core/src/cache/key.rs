use crate::Coordinate;

/// How coordinate pairs map onto cache keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyMode {
    /// `(a, b)` and `(b, a)` share a key. Walking routes are symmetric
    /// enough for this to hold.
    #[default]
    Symmetric,
    /// Origin and destination are kept apart.
    Directional,
}

/// A quantised origin/destination pair.
///
/// # Examples
///
/// ```
/// use rundinner_core::{CacheKey, Coordinate, KeyMode};
///
/// # fn main() -> Result<(), rundinner_core::CoordinateError> {
/// let a = Coordinate::new(48.137_1, 11.575_4)?;
/// let b = Coordinate::new(48.150_0, 11.580_0)?;
/// assert_eq!(
///     CacheKey::new(a, b, KeyMode::Symmetric),
///     CacheKey::new(b, a, KeyMode::Symmetric),
/// );
/// assert_ne!(
///     CacheKey::new(a, b, KeyMode::Directional),
///     CacheKey::new(b, a, KeyMode::Directional),
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    from: (i64, i64),
    to: (i64, i64),
    mode: KeyModeTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum KeyModeTag {
    Symmetric,
    Directional,
}

impl CacheKey {
    /// Normalise a pair.
    #[must_use]
    pub fn new(origin: Coordinate, destination: Coordinate, mode: KeyMode) -> Self {
        let a = origin.quantised();
        let b = destination.quantised();
        match mode {
            KeyMode::Symmetric => Self {
                from: a.min(b),
                to: a.max(b),
                mode: KeyModeTag::Symmetric,
            },
            KeyMode::Directional => Self {
                from: a,
                to: b,
                mode: KeyModeTag::Directional,
            },
        }
    }

    /// Stable text form used as the persistent primary key.
    #[must_use]
    pub fn storage_key(&self) -> String {
        let prefix = match self.mode {
            KeyModeTag::Symmetric => "s",
            KeyModeTag::Directional => "d",
        };
        format!(
            "{prefix}:{},{}|{},{}",
            self.from.0, self.from.1, self.to.0, self.to.1
        )
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.storage_key())
    }
}
