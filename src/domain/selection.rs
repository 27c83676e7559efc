//! Selection types for mask picking

use std::collections::BTreeSet;

use super::mask::MaskId;

/// What a primary click does
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionMode {
    /// Clicks hit-test existing masks
    #[default]
    Select,
    /// Clicks ask the segmentation service for a new mask at the point
    Generate,
}

/// Pointer button that triggered a press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

/// Modifier flags carried by pointer events
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modifiers {
    /// Add to the selection instead of replacing it (shift)
    pub extend: bool,
    /// Remove from the selection (alt, or a secondary click)
    pub remove: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        extend: false,
        remove: false,
    };

    pub fn extend() -> Self {
        Self {
            extend: true,
            remove: false,
        }
    }

    pub fn remove() -> Self {
        Self {
            extend: false,
            remove: true,
        }
    }
}

/// Set of mask ids chosen by the user, iterated in id order
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct SelectionSet {
    ids: BTreeSet<MaskId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: MaskId) -> bool {
        self.ids.contains(&id)
    }

    /// Returns true if the id was not already selected
    pub fn insert(&mut self, id: MaskId) -> bool {
        self.ids.insert(id)
    }

    /// Returns true if the id was selected
    pub fn remove(&mut self, id: MaskId) -> bool {
        self.ids.remove(&id)
    }

    /// Flip membership, returning whether the id is now selected
    pub fn toggle(&mut self, id: MaskId) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    /// Make `id` the only selected mask
    pub fn replace(&mut self, id: MaskId) {
        self.ids.clear();
        self.ids.insert(id);
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Drop every id for which `keep` returns false
    pub fn retain(&mut self, keep: impl FnMut(&MaskId) -> bool) {
        self.ids.retain(keep);
    }

    pub fn is_single(&self, id: MaskId) -> bool {
        self.ids.len() == 1 && self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = MaskId> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<MaskId> for SelectionSet {
    fn from_iter<T: IntoIterator<Item = MaskId>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Observable interaction phase, derived from hover and selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPhase<'a> {
    Idle,
    Hovering(MaskId),
    Selected(&'a SelectionSet),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_pair_restores_state() {
        let mut set: SelectionSet = [MaskId(1), MaskId(5)].into_iter().collect();
        let before = set.clone();
        assert!(set.toggle(MaskId(3)));
        assert!(!set.toggle(MaskId(3)));
        assert_eq!(set, before);
    }

    #[test]
    fn test_replace_and_single() {
        let mut set = SelectionSet::new();
        set.insert(MaskId(1));
        set.insert(MaskId(2));
        set.replace(MaskId(9));
        assert!(set.is_single(MaskId(9)));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![MaskId(9)]);
    }
}
