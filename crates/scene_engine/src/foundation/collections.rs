//! Specialized collection types

pub use slotmap::{new_key_type, SlotMap};

/// Map of items keyed by small integer ids that are recycled on removal
///
/// Ids are handed out starting from a base value; a removed id goes back on
/// a free list and is reused by the next insertion. State ids and program ids
/// are allocated this way so they stay compact enough to participate in sort
/// keys.
#[derive(Debug)]
pub struct IdMap<T> {
    items: Vec<Option<T>>,
    free_indices: Vec<usize>,
    base: u32,
}

impl<T> IdMap<T> {
    /// Create a new id map whose first id is `base`
    pub fn with_base(base: u32) -> Self {
        Self {
            items: Vec::new(),
            free_indices: Vec::new(),
            base,
        }
    }

    /// Insert an item and return its id
    pub fn insert(&mut self, item: T) -> u32 {
        let index = if let Some(index) = self.free_indices.pop() {
            self.items[index] = Some(item);
            index
        } else {
            self.items.push(Some(item));
            self.items.len() - 1
        };
        self.base + index as u32
    }

    /// Remove an item by id
    pub fn remove(&mut self, id: u32) -> Option<T> {
        let index = self.index_of(id)?;
        let item = self.items.get_mut(index)?.take()?;
        self.free_indices.push(index);
        Some(item)
    }

    /// Get an item by id
    pub fn get(&self, id: u32) -> Option<&T> {
        self.items.get(self.index_of(id)?)?.as_ref()
    }

    /// Get a mutable reference to an item by id
    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        let index = self.index_of(id)?;
        self.items.get_mut(index)?.as_mut()
    }

    /// Number of live items
    pub fn len(&self) -> usize {
        self.items.len() - self.free_indices.len()
    }

    /// Whether the map holds no live items
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over live `(id, item)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        let base = self.base;
        self.items
            .iter()
            .enumerate()
            .filter_map(move |(index, item)| item.as_ref().map(|item| (base + index as u32, item)))
    }

    fn index_of(&self, id: u32) -> Option<usize> {
        id.checked_sub(self.base).map(|index| index as usize)
    }
}

impl<T> Default for IdMap<T> {
    fn default() -> Self {
        Self::with_base(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_base() {
        let mut map = IdMap::with_base(1);
        assert_eq!(map.insert("a"), 1);
        assert_eq!(map.insert("b"), 2);
        assert_eq!(map.get(2), Some(&"b"));
        assert_eq!(map.get(0), None);
    }

    #[test]
    fn test_removed_ids_are_reused() {
        let mut map = IdMap::with_base(1);
        let a = map.insert("a");
        let _b = map.insert("b");
        assert_eq!(map.remove(a), Some("a"));
        assert_eq!(map.len(), 1);
        assert_eq!(map.insert("c"), a);
        assert_eq!(map.get(a), Some(&"c"));
    }

    #[test]
    fn test_double_remove_is_harmless() {
        let mut map = IdMap::with_base(0);
        let a = map.insert(7);
        assert_eq!(map.remove(a), Some(7));
        assert_eq!(map.remove(a), None);
        assert!(map.is_empty());
        // Freed exactly once, so the next two inserts get distinct ids
        let x = map.insert(1);
        let y = map.insert(2);
        assert_ne!(x, y);
    }
}
