//! Symbol table: fixed-size bucketed hash table over interned symbols
//! (spec §4.3).
//!
//! Interning guarantees `same?(intern(s), intern(t))` iff `s == t`
//! byte-for-byte (§8 universal invariant): every bucket is searched by byte
//! content before a new symbol is allocated.

use schola_core::{Heap, HeapObject, HostError, SymbolId};

const BUCKET_COUNT: usize = 389;

fn hash(name: &[u8]) -> usize {
    let mut h: u32 = 0;
    for &b in name {
        h = h.wrapping_mul(37).wrapping_add(b as u32);
    }
    (h as usize) % BUCKET_COUNT
}

/// A fixed 389-bucket hash table of interned symbol `HeapId`s.
pub struct SymbolTable {
    buckets: Vec<Vec<SymbolId>>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            buckets: (0..BUCKET_COUNT).map(|_| Vec::new()).collect(),
        }
    }

    /// Intern `name`, returning the existing symbol if one with equal byte
    /// content is already present, otherwise allocating a new one.
    pub fn intern(&mut self, heap: &mut Heap, name: &[u8]) -> Result<SymbolId, HostError> {
        let bucket = hash(name);
        for &id in &self.buckets[bucket] {
            if let HeapObject::Symbol(existing) = heap.object(id)
                && existing.as_slice() == name
            {
                return Ok(id);
            }
        }
        let id = heap.allocate(HeapObject::Symbol(name.to_vec()))?;
        self.buckets[bucket].push(id);
        Ok(id)
    }

    /// The symbol table is itself traced by the collector (§4.3): every
    /// interned id is a GC root.
    pub fn roots(&self) -> impl Iterator<Item = schola_core::Value> + '_ {
        self.buckets
            .iter()
            .flatten()
            .map(|&id| schola_core::Value::Symbol(id))
    }
}

pub fn name_of(heap: &Heap, id: SymbolId) -> &[u8] {
    match heap.object(id) {
        HeapObject::Symbol(bytes) => bytes,
        _ => panic!("SymbolId {id} does not name a Symbol heap object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_equal_names_gives_identity() {
        let mut heap = Heap::new();
        let mut table = SymbolTable::new();
        let a = table.intern(&mut heap, b"foo").unwrap();
        let b = table.intern(&mut heap, b"foo").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn interning_different_names_gives_distinct_ids() {
        let mut heap = Heap::new();
        let mut table = SymbolTable::new();
        let a = table.intern(&mut heap, b"foo").unwrap();
        let b = table.intern(&mut heap, b"bar").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn hash_collisions_still_resolve_by_content() {
        let mut heap = Heap::new();
        let mut table = SymbolTable::new();
        // Pad the intended collision bucket with unrelated symbols first.
        for i in 0..10 {
            table.intern(&mut heap, format!("sym{i}").as_bytes()).unwrap();
        }
        let a = table.intern(&mut heap, b"same-name").unwrap();
        let b = table.intern(&mut heap, b"same-name").unwrap();
        assert_eq!(a, b);
        assert_eq!(name_of(&heap, a), b"same-name");
    }
}
