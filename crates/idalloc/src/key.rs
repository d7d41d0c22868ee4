use std::borrow::Cow;
use std::fmt;

/// Counter backing range ID allocation.
pub const RANGE_ID_GENERATOR: CounterKey = CounterKey::from_static(b"\x00\x00meta-range-id-gen");

/// Counter backing node ID allocation.
pub const NODE_ID_GENERATOR: CounterKey = CounterKey::from_static(b"\x00\x00meta-node-id-gen");

/// Opaque identity of a persisted counter in the backing store.
///
/// The allocator never interprets the bytes; it only hands them to the store.
/// Whether a key is valid is the store's call (for example,
/// [`MemoryStore`](crate::MemoryStore) rejects the empty key).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey(Cow<'static, [u8]>);

impl CounterKey {
    /// Creates a key from owned bytes.
    ///
    /// # Example
    /// ```
    /// use idalloc::CounterKey;
    ///
    /// let key = CounterKey::new("range-id");
    /// assert_eq!(key.as_bytes(), b"range-id");
    /// ```
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Cow::Owned(bytes.into()))
    }

    /// Creates a key that borrows static bytes, usable in `const` context.
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self(Cow::Borrowed(bytes))
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns `true` for the zero-length key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&'static str> for CounterKey {
    fn from(value: &'static str) -> Self {
        Self::from_static(value.as_bytes())
    }
}

impl From<Vec<u8>> for CounterKey {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl AsRef<[u8]> for CounterKey {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"")?;
        for &b in self.as_bytes() {
            fmt::Display::fmt(&b.escape_ascii(), f)?;
        }
        f.write_str("\"")
    }
}

impl fmt::Debug for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CounterKey({self})")
    }
}
