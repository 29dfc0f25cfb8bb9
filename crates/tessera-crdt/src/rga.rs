//! RGA - Replicated Growable Array for ordered sequences.
//!
//! Elements live in an arena keyed by their creation timestamp. Each element
//! records its anchor: the element it was inserted immediately after, or the
//! head of the list. The anchors form a forest rooted at the head; siblings
//! are ordered newest first (by timestamp), and the list is the depth-first
//! pre-order walk of that forest.
//!
//! Because a replica always stamps an insert above every timestamp it has
//! observed, a fresh element lands directly after its anchor, and concurrent
//! inserts at the same anchor end up in the same order everywhere.
//!
//! Removal only marks the element as a tombstone. Tombstones stay in the
//! arena forever since later inserts may be anchored on them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{
    DeltaCrdt, EnvHandle, Environment, Error, Lattice, Result, Timestamp, VersionVector,
};

/// A node in the RGA arena.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Element<T> {
    /// The element this one was inserted after; `None` is the head.
    pub anchor: Option<Timestamp>,
    /// The payload (None once removed).
    pub value: Option<T>,
    /// Timestamp of the removal, if any.
    pub removed: Option<Timestamp>,
}

impl<T> Element<T> {
    pub fn is_tombstone(&self) -> bool {
        self.removed.is_some()
    }
}

/// Replicated Growable Array - an ordered list CRDT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Rga<T> {
    /// All elements, tombstones included, keyed by id.
    #[serde(with = "crate::codec::entries")]
    elements: BTreeMap<Timestamp, Element<T>>,
    #[serde(skip)]
    env: EnvHandle,
}

impl<T> Default for Rga<T> {
    fn default() -> Self {
        Self {
            elements: BTreeMap::new(),
            env: EnvHandle::detached(),
        }
    }
}

impl<T: Clone> Rga<T> {
    /// Create an empty sequence writing through `env`.
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self {
            elements: BTreeMap::new(),
            env: EnvHandle::new(env),
        }
    }

    /// Insert `value` so that it becomes the element at `index`.
    ///
    /// `index` may equal `len()` to append.
    pub fn insert_at(&mut self, index: usize, value: T) -> Result<Rga<T>> {
        let env = self.env.writable()?;
        let visible = self.visible_ids();
        if index > visible.len() {
            return Err(Error::OutOfRange {
                index,
                len: visible.len(),
            });
        }
        let anchor = index.checked_sub(1).map(|i| visible[i].clone());
        let id = env.new_timestamp()?;
        tracing::trace!(%id, index, "rga insert");

        let element = Element {
            anchor,
            value: Some(value),
            removed: None,
        };
        self.elements.insert(id.clone(), element.clone());

        let mut delta = Rga::default();
        delta.elements.insert(id, element);
        Ok(delta)
    }

    /// Append `value` at the end.
    pub fn push(&mut self, value: T) -> Result<Rga<T>> {
        let len = self.len();
        self.insert_at(len, value)
    }

    /// Remove the visible element at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<Rga<T>> {
        let env = self.env.writable()?;
        let visible = self.visible_ids();
        let id = match visible.get(index) {
            Some(id) => (*id).clone(),
            None => {
                return Err(Error::OutOfRange {
                    index,
                    len: visible.len(),
                })
            }
        };
        let ts = env.new_timestamp()?;
        tracing::trace!(%id, %ts, index, "rga remove");

        let mut delta = Rga::default();
        if let Some(element) = self.elements.get_mut(&id) {
            element.value = None;
            element.removed = Some(ts);
            delta.elements.insert(id, element.clone());
        }
        Ok(delta)
    }

    /// Clone the visible values into a Vec.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T> Rga<T> {
    /// All visible values in order.
    pub fn get(&self) -> Vec<&T> {
        self.iter().collect()
    }

    /// The visible value at `index`.
    pub fn get_at(&self, index: usize) -> Result<&T> {
        let mut values = self.iter();
        let len_hint = self.len();
        values.nth(index).ok_or(Error::OutOfRange {
            index,
            len: len_hint,
        })
    }

    /// Iterate over visible values in order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order()
            .into_iter()
            .filter_map(move |id| self.elements.get(id).and_then(|e| e.value.as_ref()))
    }

    /// Number of visible elements.
    pub fn len(&self) -> usize {
        self.visible_ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an element by id, tombstones included.
    pub fn element(&self, id: &Timestamp) -> Option<&Element<T>> {
        self.elements.get(id)
    }

    /// Ids of the visible elements in list order.
    fn visible_ids(&self) -> Vec<&Timestamp> {
        self.order()
            .into_iter()
            .filter(|id| self.elements.get(*id).map_or(false, |e| e.value.is_some()))
            .collect()
    }

    /// Ids of every element reachable from the head, in list order.
    ///
    /// Elements whose anchor has not arrived yet are unreachable and stay
    /// invisible until a later merge delivers the anchor.
    fn order(&self) -> Vec<&Timestamp> {
        // Ascending ids per anchor; popping from the stack visits newest first.
        let mut children: BTreeMap<Option<&Timestamp>, Vec<&Timestamp>> = BTreeMap::new();
        for (id, element) in &self.elements {
            children.entry(element.anchor.as_ref()).or_default().push(id);
        }

        let mut order = Vec::with_capacity(self.elements.len());
        let mut stack = children.get(&None).cloned().unwrap_or_default();
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(kids) = children.get(&Some(id)) {
                stack.extend(kids.iter().copied());
            }
        }
        order
    }
}

impl<T: Clone + PartialEq> Lattice for Rga<T> {
    fn bottom() -> Self {
        Self::default()
    }

    /// Union of elements by id; a tombstone from either side wins
    fn join_assign(&mut self, other: &Self) {
        for (id, theirs) in &other.elements {
            match self.elements.get_mut(id) {
                Some(mine) => {
                    if let Some(removed) = &theirs.removed {
                        mine.value = None;
                        if mine.removed.as_ref().map_or(true, |r| r < removed) {
                            mine.removed = Some(removed.clone());
                        }
                    }
                }
                None => {
                    self.elements.insert(id.clone(), theirs.clone());
                }
            }
        }
    }
}

impl<T: Clone + PartialEq> DeltaCrdt for Rga<T> {
    fn env(&self) -> &EnvHandle {
        &self.env
    }

    fn env_mut(&mut self) -> &mut EnvHandle {
        &mut self.env
    }

    fn frontier(&self) -> VersionVector {
        self.elements
            .iter()
            .flat_map(|(id, element)| std::iter::once(id).chain(element.removed.as_ref()))
            .collect()
    }

    /// Elements created after `vv`, plus older elements removed after `vv`
    fn generate_delta(&self, vv: &VersionVector) -> Self {
        let elements = self
            .elements
            .iter()
            .filter(|(id, element)| {
                !vv.dominates(id)
                    || element.removed.as_ref().map_or(false, |r| !vv.dominates(r))
            })
            .map(|(id, element)| (id.clone(), element.clone()))
            .collect();
        Self {
            elements,
            env: EnvHandle::detached(),
        }
    }
}
