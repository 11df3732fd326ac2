// src/services/selection.rs

//! Per-group and per-item selection state.
//!
//! A group's `selected` flag is derived: toggling an item recomputes it as
//! the AND over the group's known items, while `select_group` sets it
//! directly. Items registered later start unselected and leave the flag
//! alone until the next item toggle.

use serde::{Deserialize, Serialize};

/// Selection state of one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSelection {
    pub selected: bool,
    /// Known item titles in discovery order
    pub items: Vec<(String, bool)>,
}

impl GroupSelection {
    pub fn is_selected(&self, title: &str) -> bool {
        self.items
            .iter()
            .any(|(known, selected)| known == title && *selected)
    }

    /// Whether a download run should process the item with this title.
    pub fn admits(&self, title: &str) -> bool {
        self.selected || self.is_selected(title)
    }

    fn recompute(&mut self) {
        self.selected = !self.items.is_empty() && self.items.iter().all(|(_, s)| *s);
    }

    fn set(&mut self, title: &str, value: bool) {
        match self.items.iter_mut().find(|(known, _)| known == title) {
            Some(entry) => entry.1 = value,
            None => self.items.push((title.to_string(), value)),
        }
    }
}

/// Ordered selection state across all groups of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionModel {
    groups: Vec<(String, GroupSelection)>,
}

impl SelectionModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, group: &str) -> &mut GroupSelection {
        let idx = match self.groups.iter().position(|(name, _)| name == group) {
            Some(idx) => idx,
            None => {
                self.groups
                    .push((group.to_string(), GroupSelection::default()));
                self.groups.len() - 1
            }
        };
        &mut self.groups[idx].1
    }

    /// Add an empty entry for a group not seen before.
    pub fn ensure_group(&mut self, group: &str) {
        self.entry(group);
    }

    /// Record item titles discovered in a group. New titles start unselected;
    /// already known titles keep their state.
    pub fn register_items<I, S>(&mut self, group: &str, titles: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self.entry(group);
        for title in titles {
            let title = title.as_ref();
            if !entry.items.iter().any(|(known, _)| known == title) {
                entry.items.push((title.to_string(), false));
            }
        }
    }

    pub fn select_all(&mut self, value: bool) {
        for (_, group) in &mut self.groups {
            for item in &mut group.items {
                item.1 = value;
            }
            group.selected = value;
        }
    }

    /// Set every item currently known in `group`, and the group flag itself.
    pub fn select_group(&mut self, group: &str, value: bool) {
        let entry = self.entry(group);
        for item in &mut entry.items {
            item.1 = value;
        }
        entry.selected = value;
    }

    /// Set one item and recompute the group flag.
    pub fn select_item(&mut self, group: &str, title: &str, value: bool) {
        let entry = self.entry(group);
        entry.set(title, value);
        entry.recompute();
    }

    pub fn group(&self, group: &str) -> Option<&GroupSelection> {
        self.groups
            .iter()
            .find(|(name, _)| name == group)
            .map(|(_, selection)| selection)
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    /// Selected titles per group, in discovery order. Groups without any
    /// selected title are omitted.
    pub fn selected_items(&self) -> Vec<(String, Vec<String>)> {
        self.groups
            .iter()
            .filter_map(|(name, group)| {
                let titles: Vec<String> = group
                    .items
                    .iter()
                    .filter(|(_, selected)| *selected)
                    .map(|(title, _)| title.clone())
                    .collect();
                (!titles.is_empty()).then(|| (name.clone(), titles))
            })
            .collect()
    }

    pub fn has_selection(&self) -> bool {
        self.groups
            .iter()
            .any(|(_, group)| group.items.iter().any(|(_, selected)| *selected))
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> SelectionModel {
        let mut model = SelectionModel::new();
        model.register_items("Week 1", ["a", "b", "c"]);
        model.register_items("Week 2", ["d"]);
        model
    }

    #[test]
    fn test_new_items_start_unselected() {
        let model = model();
        assert!(!model.group("Week 1").unwrap().selected);
        assert!(!model.has_selection());
        assert!(model.selected_items().is_empty());
    }

    #[test]
    fn test_select_group_covers_only_known_items() {
        let mut model = model();
        model.select_group("Week 1", true);
        model.register_items("Week 1", ["late"]);

        let group = model.group("Week 1").unwrap();
        assert!(group.selected);
        assert!(group.is_selected("a"));
        assert!(!group.is_selected("late"));
        assert_eq!(
            model.selected_items(),
            vec![("Week 1".to_string(), vec!["a".into(), "b".into(), "c".into()])]
        );
    }

    #[test]
    fn test_group_flag_is_and_over_items() {
        let mut model = model();
        model.select_item("Week 1", "a", true);
        model.select_item("Week 1", "b", true);
        assert!(!model.group("Week 1").unwrap().selected);

        model.select_item("Week 1", "c", true);
        assert!(model.group("Week 1").unwrap().selected);

        model.select_item("Week 1", "b", false);
        assert!(!model.group("Week 1").unwrap().selected);
    }

    #[test]
    fn test_empty_group_is_not_selected() {
        let mut model = SelectionModel::new();
        model.ensure_group("Empty");
        model.register_items("Empty", Vec::<String>::new());
        model.select_all(false);
        assert!(!model.group("Empty").unwrap().selected);
    }

    #[test]
    fn test_select_all_and_order() {
        let mut model = model();
        model.select_all(true);
        let names: Vec<_> = model.selected_items().into_iter().map(|(g, _)| g).collect();
        assert_eq!(names, vec!["Week 1", "Week 2"]);

        model.select_all(false);
        assert!(!model.has_selection());
        assert!(!model.group("Week 2").unwrap().selected);
    }

    #[test]
    fn test_admits_follows_group_flag_or_item() {
        let mut model = model();
        model.select_item("Week 1", "b", true);
        let group = model.group("Week 1").unwrap();
        assert!(group.admits("b"));
        assert!(!group.admits("a"));

        model.select_group("Week 2", true);
        assert!(model.group("Week 2").unwrap().admits("unseen"));
    }
}
