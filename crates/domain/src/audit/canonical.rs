//! Deterministic byte encoding of audit records.
//!
//! Every field is written in a fixed order as `name`, a presence byte and,
//! when present, a big-endian length prefix followed by the bytes. Absent
//! optional fields therefore encode differently from empty strings, and no
//! field boundary can be shifted by choosing field contents.

use sha2::{Digest, Sha256};

use super::{AuditValue, AuditValues};

const ENCODING_VERSION: &str = "sentinel.audit.v1";

const ABSENT: u8 = 0x00;
const PRESENT: u8 = 0x01;

const TAG_NULL: u8 = b'n';
const TAG_BOOL: u8 = b'b';
const TAG_INTEGER: u8 = b'i';
const TAG_TEXT: u8 = b's';
const TAG_TEXT_LIST: u8 = b'l';

/// Accumulates the canonical form and hashes it.
pub(super) struct CanonicalEncoder {
    hasher: Sha256,
}

impl CanonicalEncoder {
    pub(super) fn new() -> Self {
        let mut encoder = Self {
            hasher: Sha256::new(),
        };
        encoder.text("version", Some(ENCODING_VERSION));
        encoder
    }

    pub(super) fn text(&mut self, name: &str, value: Option<&str>) -> &mut Self {
        self.name(name);
        match value {
            Some(value) => {
                self.hasher.update([PRESENT]);
                self.bytes(value.as_bytes());
            }
            None => self.hasher.update([ABSENT]),
        }
        self
    }

    pub(super) fn integer(&mut self, name: &str, value: u64) -> &mut Self {
        self.name(name);
        self.hasher.update([PRESENT]);
        self.hasher.update(value.to_be_bytes());
        self
    }

    pub(super) fn values(&mut self, name: &str, values: Option<&AuditValues>) -> &mut Self {
        self.name(name);
        let Some(values) = values else {
            self.hasher.update([ABSENT]);
            return self;
        };

        self.hasher.update([PRESENT]);
        self.length(values.len());
        for (key, value) in values.iter() {
            self.bytes(key.as_bytes());
            self.value(value);
        }
        self
    }

    pub(super) fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    fn value(&mut self, value: &AuditValue) {
        match value {
            AuditValue::Null => self.hasher.update([TAG_NULL]),
            AuditValue::Bool(flag) => {
                self.hasher.update([TAG_BOOL, u8::from(*flag)]);
            }
            AuditValue::Integer(number) => {
                self.hasher.update([TAG_INTEGER]);
                self.hasher.update(number.to_be_bytes());
            }
            AuditValue::Text(text) => {
                self.hasher.update([TAG_TEXT]);
                self.bytes(text.as_bytes());
            }
            AuditValue::TextList(items) => {
                self.hasher.update([TAG_TEXT_LIST]);
                self.length(items.len());
                for item in items {
                    self.bytes(item.as_bytes());
                }
            }
        }
    }

    fn name(&mut self, name: &str) {
        self.bytes(name.as_bytes());
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.length(bytes.len());
        self.hasher.update(bytes);
    }

    fn length(&mut self, length: usize) {
        self.hasher.update((length as u64).to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::CanonicalEncoder;
    use crate::AuditValues;

    fn digest(build: impl FnOnce(&mut CanonicalEncoder)) -> String {
        let mut encoder = CanonicalEncoder::new();
        build(&mut encoder);
        encoder.finish()
    }

    #[test]
    fn absent_and_empty_text_differ() {
        let absent = digest(|encoder| {
            encoder.text("resource_id", None);
        });
        let empty = digest(|encoder| {
            encoder.text("resource_id", Some(""));
        });

        assert_ne!(absent, empty);
    }

    #[test]
    fn field_boundaries_cannot_shift() {
        let left = digest(|encoder| {
            encoder.text("a", Some("xy")).text("b", Some("z"));
        });
        let right = digest(|encoder| {
            encoder.text("a", Some("x")).text("b", Some("yz"));
        });

        assert_ne!(left, right);
    }

    #[test]
    fn absent_values_differ_from_empty_values() {
        let absent = digest(|encoder| {
            encoder.values("new_values", None);
        });
        let empty = AuditValues::new();
        let present = digest(|encoder| {
            encoder.values("new_values", Some(&empty));
        });

        assert_ne!(absent, present);
    }

    #[test]
    fn digest_is_lowercase_hex_sha256() {
        let value = digest(|_| {});
        assert_eq!(value.len(), 64);
        assert!(
            value
                .chars()
                .all(|character| character.is_ascii_hexdigit() && !character.is_ascii_uppercase())
        );
    }
}
