//! Stable 32-bit identifier for a message template.
//!
//! Computed from the template text, never from the rendered message, so
//! every call of the same log statement shares one fingerprint.

use std::fmt;

/// Jenkins one-at-a-time hash over the UTF-16 code units of `template`.
pub fn compute(template: &str) -> u32 {
    let mut hash: u32 = 0;
    for unit in template.encode_utf16() {
        hash = hash.wrapping_add(u32::from(unit));
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 15);
    hash
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u32);

impl Fingerprint {
    pub fn of(template: &str) -> Self {
        Fingerprint(compute(template))
    }
}

/// Eight lower-case hex digits.
impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
