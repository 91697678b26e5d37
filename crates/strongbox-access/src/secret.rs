//! In-memory-only secret slots.

use std::fmt;

/// Holds key material that must never be persisted.
///
/// Fields of this type are marked `#[serde(skip)]`, so a serialized and
/// re-read object always comes back locked.
#[derive(Clone)]
pub struct Transient<T>(Option<T>);

impl<T> Transient<T> {
    pub const fn empty() -> Self {
        Self(None)
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.0.as_mut()
    }

    pub fn set(&mut self, value: T) {
        self.0 = Some(value);
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

impl<T> Default for Transient<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> fmt::Debug for Transient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Transient(<set>)"),
            None => f.write_str("Transient(<empty>)"),
        }
    }
}
