//! Value Module
//!
//! Defines the value contract stored by the cache and the immutable byte view.

use std::fmt;
use std::sync::Arc;

// == Value Contract ==
/// Anything that can report its own size in bytes.
///
/// Values are immutable once stored; the engine only ever reads `len()` for
/// capacity accounting.
pub trait Value: Send + Sync + fmt::Debug {
    /// Size of the value in bytes.
    fn len(&self) -> usize;

    /// Returns true if the value is zero bytes long.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// == Byte View ==
/// Read-only view over a byte buffer.
///
/// Construction copies the input and every read hands out a fresh copy, so cached
/// bytes can never be mutated through an alias held by a caller.
#[derive(Clone, PartialEq, Eq)]
pub struct ByteView {
    bytes: Arc<[u8]>,
}

impl ByteView {
    // == Constructor ==
    /// Creates a view holding a copy of `bytes`.
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: Arc::from(bytes),
        }
    }

    // == Length ==
    /// Returns the number of bytes in the view.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the view holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    // == Byte Slice ==
    /// Returns a copy of the underlying bytes.
    pub fn byte_slice(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    // == As String ==
    /// Returns the bytes as text, replacing invalid UTF-8 sequences.
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl Default for ByteView {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl Value for ByteView {
    fn len(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteView").field("len", &self.len()).finish()
    }
}

impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.bytes))
    }
}

impl From<&[u8]> for ByteView {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::from(bytes),
        }
    }
}

impl From<&str> for ByteView {
    fn from(text: &str) -> Self {
        Self::new(text.as_bytes())
    }
}

impl From<String> for ByteView {
    fn from(text: String) -> Self {
        Self::from(text.into_bytes())
    }
}

// == Cache Value ==
/// A value as held by the store engine.
///
/// The façade only hands out `Bytes`; anything else reaching it is a type mismatch.
#[derive(Clone, Debug)]
pub enum CacheValue {
    /// Immutable byte buffer
    Bytes(ByteView),
    /// Any other size-reporting value
    Opaque(Arc<dyn Value>),
}

impl CacheValue {
    /// Wraps an arbitrary value.
    pub fn opaque(value: impl Value + 'static) -> Self {
        CacheValue::Opaque(Arc::new(value))
    }

    /// Returns the byte view if this is a `Bytes` value.
    pub fn as_bytes(&self) -> Option<&ByteView> {
        match self {
            CacheValue::Bytes(view) => Some(view),
            CacheValue::Opaque(_) => None,
        }
    }
}

impl Value for CacheValue {
    fn len(&self) -> usize {
        match self {
            CacheValue::Bytes(view) => view.len(),
            CacheValue::Opaque(value) => value.len(),
        }
    }
}

impl From<ByteView> for CacheValue {
    fn from(view: ByteView) -> Self {
        CacheValue::Bytes(view)
    }
}
