//! Range Reconciler
//! Carries user edits from a previously generated template into a fresh one.
//!
//! The fresh template is the structural truth: its fixed text and its ranges
//! are kept as generated, and surviving old text is applied into its ranges
//! one key at a time. Which old range feeds which new range is decided by
//! exact key equality first, then by a [`RangePolicy`] supplied by the
//! generator that produced both templates.

use crate::template::{reindent, TemplateBuffer, TemplateKey, TemplateResult};


/// Generation-specific matching rules, injected into the [`Reconciler`]
pub trait RangePolicy<K> {
    /// Can the old range `old_key` stand in for the new range `new_key`?
    fn can_substitute(&self, old_key: &K, new_key: &K) -> bool;

    /// Can the old range `other_key` be folded into the range for `key`?
    fn can_merge(&self, key: &K, other_key: &K) -> bool;

    /// Combine two range bodies for `key`. `line_prefix` is the indentation
    /// of the range, for bodies joined line-wise.
    fn merge_code(&self, _key: &K, code: &str, other_code: &str, line_prefix: &str) -> String {
        format!("{}\n{}{}", code, line_prefix, other_code)
    }
}

/// A [`RangePolicy`] made from a pair of predicates
pub struct FnPolicy<S, M> {
    substitute: S,
    merge: M,
}

impl<S, M> FnPolicy<S, M> {
    pub fn new(substitute: S, merge: M) -> Self {
        Self { substitute, merge }
    }
}

impl<K, S, M> RangePolicy<K> for FnPolicy<S, M>
where
    S: Fn(&K, &K) -> bool,
    M: Fn(&K, &K) -> bool,
{
    fn can_substitute(&self, old_key: &K, new_key: &K) -> bool {
        (self.substitute)(old_key, new_key)
    }

    fn can_merge(&self, key: &K, other_key: &K) -> bool {
        (self.merge)(key, other_key)
    }
}

/// Where the text of one new range came from
#[derive(Debug, Clone, PartialEq)]
pub enum RangeOutcome<K> {
    /// Old text for the same key
    Kept { key: K },
    /// Old text from another key the policy accepted as a stand-in
    Substituted { key: K, from: K },
    /// Old text from a kept or substituted key plus folded-in ranges
    Merged { key: K, from: Vec<K> },
    /// No old text survived; the generator's placeholder stays
    Generated { key: K },
}

/// An old range whose text did not survive
#[derive(Debug, Clone, PartialEq)]
pub struct DiscardedEdit<K> {
    pub key: K,
    pub code: String,
    /// False when the text was still the generator's placeholder
    pub edited: bool,
}

#[derive(Debug, Clone)]
pub struct Reconciliation<K> {
    pub buffer: TemplateBuffer<K>,
    /// One entry per range of the new buffer, in range order
    pub outcomes: Vec<RangeOutcome<K>>,
    pub discarded: Vec<DiscardedEdit<K>>,
}

impl<K: TemplateKey> Reconciliation<K> {
    /// Discarded ranges that held user edits, the ones worth warning about
    pub fn lost_edits(&self) -> impl Iterator<Item = &DiscardedEdit<K>> {
        self.discarded.iter().filter(|d| d.edited)
    }
}

pub struct Reconciler<P> {
    policy: P,
}

impl<P> Reconciler<P> {
    pub fn new(policy: P) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Merge `old` (with user edits) into the freshly generated `new`.
    pub fn reconcile<K>(
        &self,
        old: &TemplateBuffer<K>,
        new: TemplateBuffer<K>,
    ) -> TemplateResult<Reconciliation<K>>
    where
        K: TemplateKey,
        P: RangePolicy<K>,
    {
        let old_ranges = old.editable_ranges();
        // Old keys that still exist in the new buffer keep their own text and
        // are never folded into another range. They may still be copied into
        // a substitute.
        let exact: Vec<bool> = old_ranges
            .iter()
            .map(|r| new.contains_key(&r.key))
            .collect();
        let mut used = exact.clone();

        let mut plan: Vec<(K, Option<String>, RangeOutcome<K>)> = Vec::new();
        for range in new.editable_ranges() {
            let key = &range.key;
            let primary = old_ranges
                .iter()
                .position(|r| r.key == *key)
                .or_else(|| {
                    old_ranges
                        .iter()
                        .position(|r| self.policy.can_substitute(&r.key, key))
                });

            let Some(primary) = primary else {
                plan.push((key.clone(), None, RangeOutcome::Generated { key: key.clone() }));
                continue;
            };
            used[primary] = true;

            let source = &old_ranges[primary];
            let mut code = reindent(
                old.code_for_key(&source.key).unwrap_or_default(),
                source.indent_level,
                range.indent_level,
                new.indent_string(),
            );
            let mut merged = vec![source.key.clone()];
            for (i, other) in old_ranges.iter().enumerate() {
                if i == primary || exact[i] || used[i] || !self.policy.can_merge(key, &other.key) {
                    continue;
                }
                used[i] = true;
                let other_code = reindent(
                    old.code_for_key(&other.key).unwrap_or_default(),
                    other.indent_level,
                    range.indent_level,
                    new.indent_string(),
                );
                let line_prefix = new.indent_string().repeat(range.indent_level);
                code = self.policy.merge_code(key, &code, &other_code, &line_prefix);
                merged.push(other.key.clone());
            }

            let outcome = if merged.len() > 1 {
                RangeOutcome::Merged { key: key.clone(), from: merged }
            } else if source.key == *key {
                RangeOutcome::Kept { key: key.clone() }
            } else {
                log::debug!("substituting {:?} for {:?}", source.key, key);
                RangeOutcome::Substituted {
                    key: key.clone(),
                    from: source.key.clone(),
                }
            };
            plan.push((key.clone(), Some(code), outcome));
        }

        let mut buffer = new;
        let mut outcomes = Vec::with_capacity(plan.len());
        for (key, code, outcome) in plan {
            if let Some(code) = code {
                buffer.set_code(&key, &code)?;
            }
            outcomes.push(outcome);
        }

        let discarded: Vec<DiscardedEdit<K>> = old_ranges
            .iter()
            .zip(&used)
            .filter(|(_, used)| !**used)
            .map(|(range, _)| DiscardedEdit {
                key: range.key.clone(),
                code: old.code_for_key(&range.key).unwrap_or_default().to_string(),
                edited: old.is_edited(&range.key),
            })
            .collect();
        for edit in discarded.iter().filter(|d| d.edited) {
            log::warn!("edit discarded for {:?}", edit.key);
        }

        log::debug!(
            "reconciled {} ranges, {} discarded",
            outcomes.len(),
            discarded.len()
        );
        Ok(Reconciliation {
            buffer,
            outcomes,
            discarded,
        })
    }
}
