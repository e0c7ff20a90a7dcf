//! Name-to-id table for one dispatch proxy.

use std::collections::HashMap;

use crate::types::DispId;

/// First id handed out; [`DISPID_VALUE`](crate::types::DISPID_VALUE) (0) is
/// reserved for the object itself.
const FIRST_DISPID: DispId = 1;

/// Bidirectional mapping between member names and [`DispId`]s.
///
/// Ids are allocated in resolution order and the table only grows, so a name
/// keeps its id for the lifetime of the owning proxy and an id is never reused
/// for another name.
#[derive(Debug, Default)]
pub struct MemberTable {
    ids: HashMap<String, DispId>,
    names: Vec<String>,
}

impl MemberTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `name`, allocating one on first sight.
    pub fn resolve(&mut self, name: &str) -> DispId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = FIRST_DISPID + self.names.len() as DispId;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    /// Id for `name` without allocating.
    pub fn id(&self, name: &str) -> Option<DispId> {
        self.ids.get(name).copied()
    }

    /// Name previously resolved to `id`.
    pub fn name(&self, id: DispId) -> Option<&str> {
        let slot = usize::try_from(id.checked_sub(FIRST_DISPID)?).ok()?;
        self.names.get(slot).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// `(id, name)` pairs in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = (DispId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (FIRST_DISPID + i as DispId, name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ids_are_stable() {
        let mut table = MemberTable::new();
        let text = table.resolve("text");
        let arr = table.resolve("arr");
        assert_eq!(text, 1);
        assert_eq!(arr, 2);
        assert_eq!(table.resolve("text"), text);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_reverse_lookup() {
        let mut table = MemberTable::new();
        table.resolve("a");
        table.resolve("b");
        assert_eq!(table.name(2), Some("b"));
        assert_eq!(table.name(0), None);
        assert_eq!(table.name(-1), None);
        assert_eq!(table.name(3), None);
        assert_eq!(table.id("a"), Some(1));
        assert_eq!(table.id("c"), None);
    }

    #[test]
    fn test_iter_in_resolution_order() {
        let mut table = MemberTable::new();
        for name in ["z", "y", "x"] {
            table.resolve(name);
        }
        let pairs: Vec<_> = table.iter().collect();
        assert_eq!(pairs, vec![(1, "z"), (2, "y"), (3, "x")]);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let mut table = MemberTable::new();
        assert_ne!(table.resolve("Text"), table.resolve("text"));
    }
}
