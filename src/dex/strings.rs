//! Interned strings.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::LazyLock;

use super::intern::{leak, pointer_identity, InternTable};

pub struct StringData {
    text: Box<str>,
    id: u32,
}

/// An interned string. Identity is the pointer; ordering is the spelling.
#[derive(Clone, Copy)]
pub struct DexString(&'static StringData);

pointer_identity!(DexString);

static STRINGS: LazyLock<InternTable<Box<str>, DexString>> = LazyLock::new(InternTable::new);
static NEXT_STRING_ID: AtomicU32 = AtomicU32::new(0);

impl DexString {
    /// Intern `s`, creating it if needed.
    pub fn make(s: &str) -> DexString {
        STRINGS.make(
            s,
            || Box::from(s),
            || {
                DexString(leak(StringData {
                    text: Box::from(s),
                    id: NEXT_STRING_ID.fetch_add(1, AtomicOrdering::Relaxed),
                }))
            },
        )
    }

    /// Look up `s` without creating it.
    pub fn get(s: &str) -> Option<DexString> {
        STRINGS.get(s)
    }

    pub fn as_str(&self) -> &'static str {
        let data: &'static StringData = self.0;
        &data.text
    }

    /// Sequence number assigned when the string was first interned.
    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn len(&self) -> usize {
        self.0.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.text.is_empty()
    }

    /// Number of UTF-16 code units, as counted in the string_data_item header.
    pub fn utf16_len(&self) -> usize {
        self.0.text.encode_utf16().count()
    }

    /// Number of interned strings in the process.
    pub fn table_size() -> usize {
        STRINGS.len()
    }
}

impl PartialOrd for DexString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DexString {
    fn cmp(&self, other: &Self) -> Ordering {
        if self == other {
            return Ordering::Equal;
        }
        // UTF-16 code unit order, matching the string_ids sort of the container.
        self.0.text.encode_utf16().cmp(other.0.text.encode_utf16())
    }
}

impl fmt::Display for DexString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.text)
    }
}

impl fmt::Debug for DexString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0.text)
    }
}
