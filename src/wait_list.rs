//! Holds the [`WaitList`] type and methods
//!
//! Tasks are kept in an arena (the scheduler's task table) and lists are
//! threaded through it by slot index. Every task has exactly one [`Link`], so
//! it can be a member of at most one list at a time. The link records which
//! list that is, and every list operation checks it.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

/// Which list a task's link currently belongs to
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Membership {
    /// Not on any list
    None,
    /// On the scheduler's ready queue
    Ready,
    /// On the alarm clock's sleep queue
    Sleeping,
    /// On some synchronisation primitive's list of waiters
    Waiting,
}

/// The intrusive part of a task
#[derive(Copy, Clone, Debug)]
pub(crate) struct Link {
    prev: Option<usize>,
    next: Option<usize>,
    list: Membership,
}

impl Link {
    /// An unlinked link
    pub(crate) const fn new() -> Link {
        Link {
            prev: None,
            next: None,
            list: Membership::None,
        }
    }

    /// Which list are we on?
    #[cfg(test)]
    pub(crate) fn membership(&self) -> Membership {
        self.list
    }
}

/// Something that can find the [`Link`] for a given slot
pub(crate) trait Links {
    /// Get the link for the item in `slot`
    fn link(&self, slot: usize) -> &Link;

    /// Get the link for the item in `slot`, mutably
    fn link_mut(&mut self, slot: usize) -> &mut Link;
}

/// A doubly-linked list of slots, kept in whatever order the caller's
/// comparison function imposes
pub(crate) struct WaitList {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    kind: Membership,
}

impl WaitList {
    /// Make an empty list, whose members will be tagged with `kind`
    pub(crate) const fn new(kind: Membership) -> WaitList {
        WaitList {
            head: None,
            tail: None,
            len: 0,
            kind,
        }
    }

    /// How many items are on the list?
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Look at the first item, without removing it
    pub(crate) fn front(&self) -> Option<usize> {
        self.head
    }

    /// Insert `slot` before the first member that it `precedes`
    ///
    /// `precedes(table, a, b)` must return true when `a` has to come before
    /// `b`. Members that `slot` does not strictly precede stay in front of it,
    /// which keeps items that compare equal in first-in, first-out order.
    pub(crate) fn insert_ordered<T, F>(&mut self, table: &mut T, slot: usize, precedes: F)
    where
        T: Links,
        F: Fn(&T, usize, usize) -> bool,
    {
        assert_eq!(
            table.link(slot).list,
            Membership::None,
            "task is already on a list"
        );

        let mut cursor = self.head;
        while let Some(member) = cursor {
            if precedes(table, slot, member) {
                break;
            }
            cursor = table.link(member).next;
        }

        let prev = match cursor {
            Some(member) => table.link(member).prev,
            None => self.tail,
        };

        {
            let link = table.link_mut(slot);
            link.prev = prev;
            link.next = cursor;
            link.list = self.kind;
        }
        match prev {
            Some(p) => table.link_mut(p).next = Some(slot),
            None => self.head = Some(slot),
        }
        match cursor {
            Some(n) => table.link_mut(n).prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.len += 1;
    }

    /// Remove and return the first item
    pub(crate) fn pop_front<T: Links>(&mut self, table: &mut T) -> Option<usize> {
        let slot = self.head?;
        self.remove(table, slot);
        Some(slot)
    }

    /// Unlink `slot`, which must be on this list
    pub(crate) fn remove<T: Links>(&mut self, table: &mut T, slot: usize) {
        let Link { prev, next, list } = *table.link(slot);
        assert_eq!(list, self.kind, "task is not on this list");

        match prev {
            Some(p) => table.link_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => table.link_mut(n).prev = prev,
            None => self.tail = prev,
        }
        *table.link_mut(slot) = Link::new();
        self.len -= 1;
    }

    /// Walk the list from front to back
    pub(crate) fn iter<'a, T: Links>(&self, table: &'a T) -> Iter<'a, T> {
        Iter {
            table,
            cursor: self.head,
        }
    }
}

/// Iterates over the slots on a [`WaitList`]
pub(crate) struct Iter<'a, T> {
    table: &'a T,
    cursor: Option<usize>,
}

impl<T: Links> Iterator for Iter<'_, T> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let slot = self.cursor?;
        self.cursor = self.table.link(slot).next;
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An arena of (key, link) pairs
    struct Arena(Vec<(u32, Link)>);

    impl Arena {
        fn new(keys: &[u32]) -> Arena {
            Arena(keys.iter().map(|k| (*k, Link::new())).collect())
        }

        fn key(&self, slot: usize) -> u32 {
            self.0[slot].0
        }
    }

    impl Links for Arena {
        fn link(&self, slot: usize) -> &Link {
            &self.0[slot].1
        }

        fn link_mut(&mut self, slot: usize) -> &mut Link {
            &mut self.0[slot].1
        }
    }

    /// Larger keys first
    fn descending(arena: &Arena, a: usize, b: usize) -> bool {
        arena.key(a) > arena.key(b)
    }

    fn build(keys: &[u32]) -> (Arena, WaitList) {
        let mut arena = Arena::new(keys);
        let mut list = WaitList::new(Membership::Ready);
        for slot in 0..keys.len() {
            list.insert_ordered(&mut arena, slot, descending);
        }
        (arena, list)
    }

    #[test]
    fn keeps_descending_order() {
        let (arena, list) = build(&[3, 9, 1, 7]);
        let keys: Vec<u32> = list.iter(&arena).map(|s| arena.key(s)).collect();
        assert_eq!(keys, [9, 7, 3, 1]);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn equal_keys_are_fifo() {
        // slots 1, 2 and 4 share a key, and must come out in that order
        let (arena, list) = build(&[1, 5, 5, 8, 5]);
        let slots: Vec<usize> = list.iter(&arena).collect();
        assert_eq!(slots, [3, 1, 2, 4, 0]);
    }

    #[test]
    fn pop_and_remove_relink_neighbours() {
        let (mut arena, mut list) = build(&[4, 3, 2, 1]);
        list.remove(&mut arena, 1);
        assert_eq!(list.pop_front(&mut arena), Some(0));
        assert_eq!(list.pop_front(&mut arena), Some(2));
        assert_eq!(arena.link(2).membership(), Membership::None);
        assert_eq!(list.front(), Some(3));
        assert_eq!(list.pop_front(&mut arena), Some(3));
        assert_eq!(list.pop_front(&mut arena), None);
        assert_eq!(list.len(), 0);
        assert_eq!(list.front(), None);
    }

    #[test]
    fn unlinked_items_can_be_reinserted() {
        let (mut arena, mut list) = build(&[2, 6]);
        let first = list.pop_front(&mut arena).unwrap();
        list.insert_ordered(&mut arena, first, descending);
        let slots: Vec<usize> = list.iter(&arena).collect();
        assert_eq!(slots, [1, 0]);
    }

    #[test]
    #[should_panic(expected = "already on a list")]
    fn double_insert_is_fatal() {
        let (mut arena, mut list) = build(&[2, 6]);
        list.insert_ordered(&mut arena, 0, descending);
    }

    #[test]
    #[should_panic(expected = "not on this list")]
    fn removing_from_the_wrong_list_is_fatal() {
        let (mut arena, _ready) = build(&[2, 6]);
        let mut sleeping = WaitList::new(Membership::Sleeping);
        sleeping.remove(&mut arena, 0);
    }
}

// End of File
