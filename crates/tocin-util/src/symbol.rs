//! String interning.
//!
//! A [`Symbol`] is a 4-byte handle into a process-wide table.
//! Identifiers and keywords repeat thousands of times in a compilation;
//! interning makes their comparison an integer compare and their
//! storage a single allocation.
//!
//! Entries are byte strings, not `str`: string-literal values may carry
//! non-UTF-8 bytes verbatim (the lexer passes them through inside
//! quotes). [`Symbol::as_bytes`] is the exact value; [`Symbol::as_str`]
//! is the lossy textual view used for display.

use std::fmt;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::OnceLock;

/// An interned string.
///
/// # Examples
///
/// ```
/// use tocin_util::Symbol;
///
/// let a = Symbol::intern("main");
/// let b = Symbol::intern("main");
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "main");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u32);

impl Symbol {
    /// Intern a string, returning its symbol. Thread-safe.
    pub fn intern(string: &str) -> Symbol {
        Symbol::intern_bytes(string.as_bytes())
    }

    /// Intern a byte string. Equal byte sequences always map to the
    /// same symbol; the bytes need not be valid UTF-8.
    pub fn intern_bytes(bytes: &[u8]) -> Symbol {
        with_interner(|interner| interner.intern(bytes))
    }

    /// Textual view of this symbol. Non-UTF-8 bytes render as the
    /// replacement character; use [`Symbol::as_bytes`] for the exact
    /// value.
    pub fn as_str(self) -> &'static str {
        with_interner(|interner| interner.get(self).text)
    }

    /// The exact interned bytes.
    pub fn as_bytes(self) -> &'static [u8] {
        with_interner(|interner| interner.get(self).bytes)
    }

    /// Raw index, for serialization and debugging.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy)]
struct Entry {
    bytes: &'static [u8],
    /// Lossy rendering, shared with `bytes` when they are valid UTF-8.
    text: &'static str,
}

/// The table itself. Entries are leaked on first intern; the set of
/// unique strings in a compilation is bounded, so the leak is a wash
/// against reference counting.
#[derive(Default)]
struct Interner {
    names: FxHashMap<&'static [u8], u32>,
    entries: Vec<Entry>,
}

impl Interner {
    fn intern(&mut self, bytes: &[u8]) -> Symbol {
        if let Some(&idx) = self.names.get(bytes) {
            return Symbol(idx);
        }
        let owned: &'static [u8] = Box::leak(bytes.to_vec().into_boxed_slice());
        let text: &'static str = match std::str::from_utf8(owned) {
            Ok(text) => text,
            Err(_) => Box::leak(
                String::from_utf8_lossy(owned)
                    .into_owned()
                    .into_boxed_str(),
            ),
        };
        let idx = self.entries.len() as u32;
        self.entries.push(Entry { bytes: owned, text });
        self.names.insert(owned, idx);
        Symbol(idx)
    }

    fn get(&self, symbol: Symbol) -> Entry {
        self.entries[symbol.0 as usize]
    }
}

fn with_interner<R>(f: impl FnOnce(&mut Interner) -> R) -> R {
    static INTERNER: OnceLock<RwLock<Interner>> = OnceLock::new();
    let lock = INTERNER.get_or_init(|| RwLock::new(Interner::default()));
    f(&mut lock.write())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_string_same_symbol() {
        let a = Symbol::intern("hello");
        let b = Symbol::intern("hello");
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_strings_distinct_symbols() {
        let a = Symbol::intern("hello");
        let b = Symbol::intern("world");
        assert_ne!(a, b);
    }

    #[test]
    fn test_round_trip() {
        let s = Symbol::intern("a_rather_long_identifier");
        assert_eq!(s.as_str(), "a_rather_long_identifier");
        assert_eq!(s.as_bytes(), b"a_rather_long_identifier");
    }

    #[test]
    fn test_empty_string() {
        let s = Symbol::intern("");
        assert!(s.is_empty());
        assert_eq!(s.as_str(), "");
    }

    #[test]
    fn test_display() {
        let s = Symbol::intern("display_me");
        assert_eq!(format!("{s}"), "display_me");
    }

    #[test]
    fn test_non_utf8_bytes_kept_verbatim() {
        let raw = b"ab\xff\xfecd";
        let s = Symbol::intern_bytes(raw);
        assert_eq!(s.as_bytes(), raw);
        // The textual view is lossy but well-formed.
        assert!(s.as_str().contains('\u{fffd}'));
    }

    #[test]
    fn test_str_and_bytes_interning_agree() {
        let a = Symbol::intern("same");
        let b = Symbol::intern_bytes(b"same");
        assert_eq!(a, b);
    }
}
