//! Array mutators.
//!
//! Each mutator runs as one unit and reports the change as the events that,
//! applied one after another to the old array, produce the new one. Indices
//! in those events are therefore positions in the array as it looks after
//! the preceding events. `sort` and `reverse` report a single coarse event.

use std::cmp::Ordering;
use std::ops::{Bound, RangeBounds};

use deepstate_path::PathStep;

use crate::{ChangeEvent, Datum, NodeId, ObservableTree, ObserveError, Slot};

fn clamp_range(range: impl RangeBounds<usize>, len: usize) -> (usize, usize) {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    }
    .min(len);
    let end = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    }
    .min(len);
    (start, end.max(start))
}

/// Resolves a possibly negative start offset against `len`.
fn resolve_start(start: isize, len: usize) -> usize {
    if start < 0 {
        len.saturating_sub(start.unsigned_abs())
    } else {
        start.unsigned_abs().min(len)
    }
}

impl ObservableTree {
    /// Appends items, returning the new length.
    pub fn push(
        &mut self,
        node: NodeId,
        items: impl IntoIterator<Item = Datum>,
    ) -> Result<usize, ObserveError> {
        let len = self.items(node)?.len();
        let mut events = Vec::new();
        let mut slots = Vec::new();
        for (offset, item) in items.into_iter().enumerate() {
            let index = len + offset;
            slots.push(self.adopt(item.clone(), PathStep::Index(index), node));
            events.push(ChangeEvent::insert(PathStep::Index(index), item, node));
        }
        let items = self.items_mut(node)?;
        items.extend(slots);
        let len = items.len();
        if !events.is_empty() {
            self.dispatch(node, events);
        }
        Ok(len)
    }

    /// Removes the last element.
    pub fn pop(&mut self, node: NodeId) -> Result<Option<Datum>, ObserveError> {
        let items = self.items_mut(node)?;
        let Some(slot) = items.pop() else {
            return Ok(None);
        };
        let index = items.len();
        let old = self.release_slot(slot);
        self.dispatch(
            node,
            vec![ChangeEvent::delete(PathStep::Index(index), old.clone(), node)],
        );
        Ok(Some(old))
    }

    /// Removes the first element.
    pub fn shift(&mut self, node: NodeId) -> Result<Option<Datum>, ObserveError> {
        if self.items(node)?.is_empty() {
            return Ok(None);
        }
        Ok(self.splice_at(node, 0, 1, Vec::new())?.pop())
    }

    /// Prepends items, returning the new length.
    pub fn unshift(
        &mut self,
        node: NodeId,
        items: impl IntoIterator<Item = Datum>,
    ) -> Result<usize, ObserveError> {
        self.splice_at(node, 0, 0, items.into_iter().collect())?;
        self.len(node)
    }

    /// Inserts one element before `index`; `index == len` appends.
    pub fn insert(
        &mut self,
        node: NodeId,
        index: usize,
        value: impl Into<Datum>,
    ) -> Result<(), ObserveError> {
        let len = self.items(node)?.len();
        if index > len {
            return Err(ObserveError::IndexOutOfRange { index, len });
        }
        self.splice_at(node, index, 0, vec![value.into()])?;
        Ok(())
    }

    /// Removes the element at `index`, shifting the rest down.
    pub fn remove(&mut self, node: NodeId, index: usize) -> Result<Datum, ObserveError> {
        let len = self.items(node)?.len();
        if index >= len {
            return Err(ObserveError::IndexOutOfRange { index, len });
        }
        self.splice_at(node, index, 1, Vec::new())?
            .pop()
            .ok_or(ObserveError::IndexOutOfRange { index, len })
    }

    /// Removes `delete_count` elements from `start` (negative counts from the
    /// end, `None` removes the rest) and inserts `items` in their place.
    /// Returns the removed elements.
    pub fn splice(
        &mut self,
        node: NodeId,
        start: isize,
        delete_count: Option<usize>,
        items: Vec<Datum>,
    ) -> Result<Vec<Datum>, ObserveError> {
        let len = self.items(node)?.len();
        let start = resolve_start(start, len);
        let delete_count = delete_count.unwrap_or(len - start);
        self.splice_at(node, start, delete_count, items)
    }

    pub(crate) fn splice_at(
        &mut self,
        node: NodeId,
        start: usize,
        delete_count: usize,
        items: Vec<Datum>,
    ) -> Result<Vec<Datum>, ObserveError> {
        let len = self.items(node)?.len();
        let start = start.min(len);
        let delete_count = delete_count.min(len - start);
        let mut slots = Vec::with_capacity(items.len());
        for (offset, item) in items.iter().enumerate() {
            slots.push(self.adopt(item.clone(), PathStep::Index(start + offset), node));
        }
        let removed: Vec<_> = self
            .items_mut(node)?
            .splice(start..start + delete_count, slots)
            .collect();
        self.restamp(node)?;
        let removed: Vec<Datum> = removed
            .into_iter()
            .map(|slot| self.release_slot(slot))
            .collect();

        let overlap = delete_count.min(items.len());
        let mut events = Vec::with_capacity(delete_count.max(items.len()));
        let mut added = items.into_iter();
        let mut dropped = removed.iter().cloned();
        for (offset, (value, old)) in added
            .by_ref()
            .take(overlap)
            .zip(dropped.by_ref().take(overlap))
            .enumerate()
        {
            events.push(ChangeEvent::update(PathStep::Index(start + offset), value, old, node));
        }
        for old in dropped {
            events.push(ChangeEvent::delete(PathStep::Index(start + overlap), old, node));
        }
        for (offset, value) in added.enumerate() {
            events.push(ChangeEvent::insert(
                PathStep::Index(start + overlap + offset),
                value,
                node,
            ));
        }
        if !events.is_empty() {
            self.dispatch(node, events);
        }
        Ok(removed)
    }

    /// Overwrites the elements in `range` with `value`. Elements already
    /// equal to a leaf `value` are left alone.
    pub fn fill(
        &mut self,
        node: NodeId,
        value: impl Into<Datum>,
        range: impl RangeBounds<usize>,
    ) -> Result<(), ObserveError> {
        let value = value.into();
        let (from, to) = clamp_range(range, self.items(node)?.len());
        let mut events = Vec::new();
        for index in from..to {
            let unchanged = matches!(
                self.items(node)?.get(index),
                Some(Slot::Leaf(current)) if *current == value
            );
            if unchanged {
                continue;
            }
            let slot = self.adopt(value.clone(), PathStep::Index(index), node);
            let previous = std::mem::replace(&mut self.items_mut(node)?[index], slot);
            let old = self.release_slot(previous);
            events.push(ChangeEvent::update(PathStep::Index(index), value.clone(), old, node));
        }
        if !events.is_empty() {
            self.dispatch(node, events);
        }
        Ok(())
    }

    /// Sorts the elements with `compare`, which sees plain values.
    pub fn sort<F>(&mut self, node: NodeId, mut compare: F) -> Result<(), ObserveError>
    where
        F: FnMut(&Datum, &Datum) -> Ordering,
    {
        let slots = std::mem::take(self.items_mut(node)?);
        let mut keyed: Vec<(Datum, Slot)> = slots
            .into_iter()
            .map(|slot| (self.snapshot_slot(&slot), slot))
            .collect();
        keyed.sort_by(|a, b| compare(&a.0, &b.0));
        *self.items_mut(node)? = keyed.into_iter().map(|(_, slot)| slot).collect();
        self.restamp(node)?;
        self.dispatch(node, vec![ChangeEvent::shuffle(node)]);
        Ok(())
    }

    pub fn reverse(&mut self, node: NodeId) -> Result<(), ObserveError> {
        self.items_mut(node)?.reverse();
        self.restamp(node)?;
        self.dispatch(node, vec![ChangeEvent::reverse(node)]);
        Ok(())
    }
}
