// src/manifest/diff.rs

//! Differences between manifests
//!
//! Actions are matched across manifests by their identity key: the action
//! kind plus the value of the kind's key attribute. Matching actions that
//! are [`Action::different`] form a change; unmatched ones are additions or
//! removals.

use std::collections::BTreeMap;

use super::{ActionFilter, Manifest};
use crate::actions::{Action, ActionKey, ActionKind};

/// `(origin, destination)`; one side is `None` for additions and removals
pub type ActionPair<'a> = (Option<&'a Action>, Option<&'a Action>);

type KeyedActions<'a> = BTreeMap<(ActionKind, ActionKey), &'a Action>;

fn keyed<'a>(actions: impl Iterator<Item = &'a Action>) -> KeyedActions<'a> {
    // A repeated key keeps the last action.
    actions.map(|a| ((a.kind, a.key()), a)).collect()
}

/// The three ordered lists of a manifest comparison
///
/// Each list is in the order its entries should be executed: additions and
/// changes by the destination's canonical action order, removals by the
/// reverse of the origin's.
#[derive(Debug, Clone, Default)]
pub struct ManifestDifference<'a> {
    pub added: Vec<ActionPair<'a>>,
    pub changed: Vec<ActionPair<'a>>,
    pub removed: Vec<ActionPair<'a>>,
}

impl<'a> ManifestDifference<'a> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }

    /// Additions, then changes, then removals
    pub fn iter(&self) -> impl Iterator<Item = &ActionPair<'a>> {
        self.added
            .iter()
            .chain(self.changed.iter())
            .chain(self.removed.iter())
    }
}

/// Actions sharing one identity key whose contents disagree
#[derive(Debug, Clone)]
pub struct DuplicateGroup<'a> {
    pub kind: ActionKind,
    pub key: ActionKey,
    pub actions: Vec<&'a Action>,
}

/// Per-manifest unique actions plus the actions common to all
#[derive(Debug, Clone, Default)]
pub struct Comm<'a> {
    /// One list per input manifest, in input order
    pub unique: Vec<Vec<&'a Action>>,
    /// Actions (taken from the first manifest) identical in every manifest
    pub common: Vec<&'a Action>,
}

impl Manifest {
    /// What it takes to get from `origin` to `self`
    ///
    /// `origin_exclude` filters the origin's actions and `self_exclude` this
    /// manifest's. License actions present on both sides are always reported
    /// as changed so their text is redelivered.
    pub fn difference<'a>(
        &'a self,
        origin: &'a Manifest,
        origin_exclude: &[ActionFilter<'_>],
        self_exclude: &[ActionFilter<'_>],
    ) -> ManifestDifference<'a> {
        let sdict = keyed(self.gen_actions(self_exclude));
        let odict = keyed(origin.gen_actions(origin_exclude));

        let mut added: Vec<ActionPair<'a>> = sdict
            .iter()
            .filter(|(k, _)| !odict.contains_key(*k))
            .map(|(_, &a)| (None, Some(a)))
            .collect();
        let mut removed: Vec<ActionPair<'a>> = odict
            .iter()
            .filter(|(k, _)| !sdict.contains_key(*k))
            .map(|(_, &a)| (Some(a), None))
            .collect();
        let mut changed: Vec<ActionPair<'a>> = odict
            .iter()
            .filter_map(|(k, &old)| {
                let new = *sdict.get(k)?;
                (old.different(new) || k.0 == ActionKind::License).then_some((Some(old), Some(new)))
            })
            .collect();

        let dest = |p: &ActionPair<'a>| p.1;
        let src = |p: &ActionPair<'a>| p.0;
        added.sort_by(|a, b| cmp_side(dest(a), dest(b)));
        changed.sort_by(|a, b| cmp_side(dest(a), dest(b)));
        removed.sort_by(|a, b| cmp_side(src(b), src(a)));

        ManifestDifference {
            added,
            changed,
            removed,
        }
    }

    /// [`difference`](Self::difference) flattened into one list
    pub fn combined_difference<'a>(
        &'a self,
        origin: &'a Manifest,
        origin_exclude: &[ActionFilter<'_>],
        self_exclude: &[ActionFilter<'_>],
    ) -> Vec<ActionPair<'a>> {
        let diff = self.difference(origin, origin_exclude, self_exclude);
        let mut out = diff.added;
        out.extend(diff.changed);
        out.extend(diff.removed);
        out
    }

    /// Line-oriented rendering of the difference, `self` being the newer side
    ///
    /// Additions are prefixed `+ `, removals `- `, changes shown as
    /// `old -> new`.
    pub fn humanized_differences(
        &self,
        other: &Manifest,
        origin_exclude: &[ActionFilter<'_>],
        self_exclude: &[ActionFilter<'_>],
    ) -> String {
        let mut out = String::new();
        for pair in self.combined_difference(other, origin_exclude, self_exclude) {
            let line = match pair {
                (None, Some(dest)) => format!("+ {}\n", dest),
                (Some(src), None) => format!("- {}\n", src),
                (Some(src), Some(dest)) => format!("{} -> {}\n", src, dest),
                (None, None) => continue,
            };
            out.push_str(&line);
        }
        out
    }

    /// Compare any number of manifests, like comm(1)
    pub fn comm<'a>(manifests: &[&'a Manifest]) -> Comm<'a> {
        let dicts: Vec<KeyedActions<'a>> = manifests
            .iter()
            .map(|m| keyed(m.actions().iter()))
            .collect();

        let Some((first, rest)) = dicts.split_first() else {
            return Comm::default();
        };

        let common_keys: Vec<&(ActionKind, ActionKey)> = first
            .keys()
            .filter(|k| rest.iter().all(|d| d.contains_key(*k)))
            .filter(|k| {
                dicts
                    .windows(2)
                    .all(|w| !w[0][*k].different(w[1][*k]))
            })
            .collect();

        let unique = dicts
            .iter()
            .map(|d| {
                d.iter()
                    .filter(|(k, _)| !common_keys.contains(k))
                    .map(|(_, &a)| a)
                    .collect()
            })
            .collect();
        let common = common_keys.iter().map(|k| first[*k]).collect();

        Comm { unique, common }
    }

    /// Actions that claim the same identity but disagree in content
    ///
    /// Actions are grouped by key in manifest order; each adjacent pair
    /// within a group that is [`Action::different`] contributes both members.
    pub fn duplicates(&self, excludes: &[ActionFilter<'_>]) -> Vec<DuplicateGroup<'_>> {
        let mut acts: Vec<(ActionKind, ActionKey, &Action)> = self
            .gen_actions(excludes)
            .map(|a| (a.kind, a.key(), a))
            .collect();
        acts.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

        let mut groups = Vec::new();
        for chunk in acts.chunk_by(|a, b| a.0 == b.0 && a.1 == b.1) {
            let mut dups: Vec<&Action> = Vec::new();
            for pair in chunk.windows(2) {
                let (a, b) = (pair[0].2, pair[1].2);
                if a.different(b) {
                    for act in [a, b] {
                        if !dups.iter().any(|d| d.is_same_instance(act)) {
                            dups.push(act);
                        }
                    }
                }
            }
            if !dups.is_empty() {
                groups.push(DuplicateGroup {
                    kind: chunk[0].0,
                    key: chunk[0].1.clone(),
                    actions: dups,
                });
            }
        }
        groups
    }
}

fn cmp_side(a: Option<&Action>, b: Option<&Action>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp_order(b),
        _ => std::cmp::Ordering::Equal,
    }
}
