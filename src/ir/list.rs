//! Doubly linked entry list stored in an arena.
//!
//! Entries refer to each other (`TRY` to its catch chain, `TARGET` to its
//! branch) by [`EntryId`]. Ids are stable for the life of the list and are
//! never reused after removal, so a stale id resolves to nothing instead of
//! to an unrelated entry.

use super::entry::MethodItemEntry;
use super::instruction::IRInstruction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u32);

impl EntryId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct Node {
    entry: MethodItemEntry,
    prev: Option<EntryId>,
    next: Option<EntryId>,
}

#[derive(Debug, Clone, Default)]
pub struct IRList {
    nodes: Vec<Option<Node>>,
    head: Option<EntryId>,
    tail: Option<EntryId>,
    len: usize,
}

impl IRList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn first(&self) -> Option<EntryId> {
        self.head
    }

    pub fn last(&self) -> Option<EntryId> {
        self.tail
    }

    pub fn contains(&self, id: EntryId) -> bool {
        matches!(self.nodes.get(id.index()), Some(Some(_)))
    }

    pub fn get(&self, id: EntryId) -> Option<&MethodItemEntry> {
        self.nodes.get(id.index())?.as_ref().map(|n| &n.entry)
    }

    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut MethodItemEntry> {
        self.nodes.get_mut(id.index())?.as_mut().map(|n| &mut n.entry)
    }

    pub fn next(&self, id: EntryId) -> Option<EntryId> {
        self.nodes.get(id.index())?.as_ref()?.next
    }

    pub fn prev(&self, id: EntryId) -> Option<EntryId> {
        self.nodes.get(id.index())?.as_ref()?.prev
    }

    fn alloc(&mut self, entry: MethodItemEntry) -> EntryId {
        let id = EntryId(self.nodes.len() as u32);
        self.nodes.push(Some(Node {
            entry,
            prev: None,
            next: None,
        }));
        self.len += 1;
        id
    }

    fn node_mut(&mut self, id: EntryId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())?.as_mut()
    }

    pub fn push_back(&mut self, entry: MethodItemEntry) -> EntryId {
        let id = self.alloc(entry);
        match self.tail {
            Some(tail) => {
                if let Some(n) = self.node_mut(tail) {
                    n.next = Some(id);
                }
                if let Some(n) = self.node_mut(id) {
                    n.prev = Some(tail);
                }
            }
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        id
    }

    pub fn push_front(&mut self, entry: MethodItemEntry) -> EntryId {
        match self.head {
            Some(head) => self.insert_before(head, entry),
            None => self.push_back(entry),
        }
    }

    /// Insert before `anchor`; an unknown anchor appends.
    pub fn insert_before(&mut self, anchor: EntryId, entry: MethodItemEntry) -> EntryId {
        if !self.contains(anchor) {
            return self.push_back(entry);
        }
        let id = self.alloc(entry);
        let prev = self.prev(anchor);
        if let Some(n) = self.node_mut(id) {
            n.prev = prev;
            n.next = Some(anchor);
        }
        if let Some(n) = self.node_mut(anchor) {
            n.prev = Some(id);
        }
        match prev {
            Some(p) => {
                if let Some(n) = self.node_mut(p) {
                    n.next = Some(id);
                }
            }
            None => self.head = Some(id),
        }
        id
    }

    /// Insert after `anchor`; an unknown anchor appends.
    pub fn insert_after(&mut self, anchor: EntryId, entry: MethodItemEntry) -> EntryId {
        match self.next(anchor) {
            Some(next) => self.insert_before(next, entry),
            None => self.push_back(entry),
        }
    }

    pub fn remove(&mut self, id: EntryId) -> Option<MethodItemEntry> {
        let node = self.nodes.get_mut(id.index())?.take()?;
        match node.prev {
            Some(p) => {
                if let Some(n) = self.node_mut(p) {
                    n.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(nx) => {
                if let Some(n) = self.node_mut(nx) {
                    n.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }
        self.len -= 1;
        Some(node.entry)
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    /// Ids in list order.
    pub fn ids(&self) -> Vec<EntryId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn instructions(&self) -> impl Iterator<Item = &IRInstruction> + '_ {
        self.iter().filter_map(|(_, e)| e.as_insn())
    }

    /// Visit every instruction mutably, in order.
    pub fn for_each_insn_mut(&mut self, mut f: impl FnMut(&mut IRInstruction)) {
        for id in self.ids() {
            if let Some(insn) = self.get_mut(id).and_then(|e| e.as_insn_mut()) {
                f(insn);
            }
        }
    }

    /// Remove every entry matching `pred`; returns how many were removed.
    pub fn remove_if(&mut self, mut pred: impl FnMut(&MethodItemEntry) -> bool) -> usize {
        let doomed: Vec<EntryId> = self
            .iter()
            .filter(|(_, e)| pred(e))
            .map(|(id, _)| id)
            .collect();
        for id in &doomed {
            self.remove(*id);
        }
        doomed.len()
    }
}

pub struct Iter<'a> {
    list: &'a IRList,
    cursor: Option<EntryId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (EntryId, &'a MethodItemEntry);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = self.list.nodes.get(id.index())?.as_ref()?;
        self.cursor = node.next;
        Some((id, &node.entry))
    }
}

impl FromIterator<MethodItemEntry> for IRList {
    fn from_iter<I: IntoIterator<Item = MethodItemEntry>>(iter: I) -> Self {
        let mut list = IRList::new();
        for entry in iter {
            list.push_back(entry);
        }
        list
    }
}
