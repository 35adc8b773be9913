//! Ordered containers owned by the daemon.
//!
//! [`OrderedList`] is the single generic sequence behind both the job table and
//! the outbound message queue. Position is meaningful: for jobs it is the
//! scheduling and display order.

mod jobs;

use thiserror::Error;

pub use jobs::{JobTable, StateFilter};

/// Errors raised by positional operations on an [`OrderedList`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A position fell outside `[0, len)`.
    #[error("position {position} is out of range for {len} entries")]
    OutOfRange {
        /// Offending position.
        position: usize,
        /// Current length.
        len: usize,
    },
    /// A move was requested for zero entries.
    #[error("cannot move an empty range")]
    EmptyRange,
}

/// A growable ordered sequence of owned items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedList<T> {
    items: Vec<T>,
}

impl<T> Default for OrderedList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> OrderedList<T> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends an item at the tail and returns its position.
    pub fn append(&mut self, item: T) -> usize {
        self.items.push(item);
        self.items.len() - 1
    }

    /// Item at `position`, if any.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&T> {
        self.items.get(position)
    }

    /// Mutable item at `position`, if any.
    pub fn get_mut(&mut self, position: usize) -> Option<&mut T> {
        self.items.get_mut(position)
    }

    /// Removes and returns the item at `position`, shifting later items down.
    pub fn remove(&mut self, position: usize) -> Option<T> {
        (position < self.items.len()).then(|| self.items.remove(position))
    }

    /// Position of the first item matching `predicate`.
    pub fn position<P>(&self, predicate: P) -> Option<usize>
    where
        P: FnMut(&T) -> bool,
    {
        self.items.iter().position(predicate)
    }

    /// Keeps only the items matching `predicate`, preserving order.
    pub fn retain<P>(&mut self, predicate: P)
    where
        P: FnMut(&T) -> bool,
    {
        self.items.retain(predicate);
    }

    /// Iterates in order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterates mutably in order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    /// Relocates `count` contiguous items starting at `start` so the first of
    /// them lands at `destination`.
    ///
    /// The relative order inside the moved block and inside the displaced
    /// items is preserved. Every touched position must lie in `[0, len)`.
    pub fn move_range(
        &mut self,
        start: usize,
        count: usize,
        destination: usize,
    ) -> Result<(), RegistryError> {
        if count == 0 {
            return Err(RegistryError::EmptyRange);
        }
        let len = self.items.len();
        let check = |position: usize| {
            if position < len {
                Ok(())
            } else {
                Err(RegistryError::OutOfRange { position, len })
            }
        };
        check(start)?;
        check(start.saturating_add(count - 1))?;
        check(destination)?;
        check(destination.saturating_add(count - 1))?;

        if destination < start {
            if let Some(window) = self.items.get_mut(destination..start + count) {
                window.rotate_right(count);
            }
        } else if destination > start
            && let Some(window) = self.items.get_mut(start..destination + count)
        {
            window.rotate_left(count);
        }
        Ok(())
    }
}

impl<'a, T> IntoIterator for &'a OrderedList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn list_of(len: usize) -> OrderedList<usize> {
        let mut list = OrderedList::new();
        for item in 0..len {
            list.append(item);
        }
        list
    }

    fn contents(list: &OrderedList<usize>) -> Vec<usize> {
        list.iter().copied().collect()
    }

    #[rstest]
    fn append_returns_tail_position() {
        let mut list = OrderedList::new();
        assert_eq!(list.append('a'), 0);
        assert_eq!(list.append('b'), 1);
        assert_eq!(list.get(1), Some(&'b'));
        assert_eq!(list.get(2), None);
    }

    #[rstest]
    #[case::forward_single(2, 1, 4, vec![0, 1, 3, 4, 2])]
    #[case::backward_single(3, 1, 0, vec![3, 0, 1, 2, 4])]
    #[case::forward_block(0, 2, 3, vec![2, 3, 4, 0, 1])]
    #[case::backward_block(3, 2, 1, vec![0, 3, 4, 1, 2])]
    #[case::in_place(2, 1, 2, vec![0, 1, 2, 3, 4])]
    fn move_range_preserves_relative_order(
        #[case] start: usize,
        #[case] count: usize,
        #[case] destination: usize,
        #[case] expected: Vec<usize>,
    ) {
        let mut list = list_of(5);
        list.move_range(start, count, destination).expect("move");
        assert_eq!(contents(&list), expected);
    }

    #[rstest]
    #[case::start(5, 1, 0)]
    #[case::destination(0, 1, 5)]
    #[case::block_tail(3, 3, 0)]
    #[case::landing_tail(0, 2, 4)]
    fn move_range_rejects_out_of_range(
        #[case] start: usize,
        #[case] count: usize,
        #[case] destination: usize,
    ) {
        let mut list = list_of(5);
        let error = list
            .move_range(start, count, destination)
            .expect_err("must fail");
        assert!(matches!(error, RegistryError::OutOfRange { len: 5, .. }));
        assert_eq!(contents(&list), vec![0, 1, 2, 3, 4]);
    }

    #[rstest]
    fn move_range_rejects_empty_blocks() {
        let mut list = list_of(3);
        assert_eq!(list.move_range(0, 0, 1), Err(RegistryError::EmptyRange));
    }

    #[rstest]
    fn remove_shifts_later_items() {
        let mut list = list_of(4);
        assert_eq!(list.remove(1), Some(1));
        assert_eq!(contents(&list), vec![0, 2, 3]);
        assert_eq!(list.remove(3), None);
    }
}
