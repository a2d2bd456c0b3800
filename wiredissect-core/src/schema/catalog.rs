//! Static identifier-to-descriptor tables.

use super::FieldDescriptor;

/// Maps a field identifier (register address, option tag) to its descriptor.
///
/// Catalogs are built at compile time and never mutated, so they can be
/// shared freely between threads. A missing identifier is not an error:
/// callers fall back to an opaque rendering.
#[derive(Debug)]
pub struct FieldCatalog<K: 'static> {
    name: &'static str,
    entries: &'static [(K, FieldDescriptor)],
}

impl<K: Copy + PartialEq> FieldCatalog<K> {
    pub const fn new(name: &'static str, entries: &'static [(K, FieldDescriptor)]) -> Self {
        Self { name, entries }
    }

    /// Catalog name, used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Look up the descriptor for `id`.
    #[inline]
    pub fn find(&self, id: K) -> Option<&'static FieldDescriptor> {
        let entries: &'static [(K, FieldDescriptor)] = self.entries;
        entries.iter().find(|(k, _)| *k == id).map(|(_, d)| d)
    }

    /// All `(id, descriptor)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &'static FieldDescriptor)> {
        let entries: &'static [(K, FieldDescriptor)] = self.entries;
        entries.iter().map(|(k, d)| (*k, d))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataKind, FieldSize};

    static CATALOG: FieldCatalog<u8> = FieldCatalog::new(
        "test",
        &[
            (0x01, FieldDescriptor::new("t.id", "Id", DataKind::UInt32)),
            (
                0x02,
                FieldDescriptor::new("t.name", "Name", DataKind::String)
                    .with_size(FieldSize::LengthPrefixed(1)),
            ),
        ],
    );

    #[test]
    fn test_find() {
        assert_eq!(CATALOG.find(0x01).map(|d| d.name), Some("t.id"));
        assert_eq!(
            CATALOG.find(0x02).map(|d| d.size),
            Some(FieldSize::LengthPrefixed(1))
        );
        assert!(CATALOG.find(0x03).is_none());
    }

    #[test]
    fn test_iter_in_order() {
        let ids: Vec<u8> = CATALOG.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![0x01, 0x02]);
        assert_eq!(CATALOG.len(), 2);
        assert_eq!(CATALOG.name(), "test");
    }
}
