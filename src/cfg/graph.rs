//! Blocks, edges and the graph container.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::dex::DexType;
use crate::ir::{IRInstruction, MethodItemEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeType {
    /// Unconditional flow: fallthrough, explicit goto, or a branch's
    /// not-taken side.
    Goto,
    /// Taken side of an `if-*`, or one `switch` case.
    Branch,
    /// Exceptional flow into a handler.
    Throw,
    /// Synthetic edge into the ghost exit block.
    Ghost,
}

/// Handler order of a throw edge: `index` 0 is tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrowInfo {
    pub catch_type: Option<DexType>,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub(crate) id: EdgeId,
    pub(crate) src: BlockId,
    pub(crate) target: BlockId,
    pub(crate) kind: EdgeType,
    pub(crate) case_key: Option<i32>,
    pub(crate) throw_info: Option<ThrowInfo>,
}

impl Edge {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn src(&self) -> BlockId {
        self.src
    }

    pub fn target(&self) -> BlockId {
        self.target
    }

    pub fn kind(&self) -> EdgeType {
        self.kind
    }

    pub fn case_key(&self) -> Option<i32> {
        self.case_key
    }

    pub fn throw_info(&self) -> Option<ThrowInfo> {
        self.throw_info
    }
}

/// A basic block. Entries are instructions plus the positions, debug and
/// source-block entries between them; gotos, targets and try/catch markers
/// are expressed as edges instead.
#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) id: BlockId,
    pub(crate) entries: Vec<MethodItemEntry>,
    pub(crate) preds: Vec<EdgeId>,
    pub(crate) succs: Vec<EdgeId>,
}

impl Block {
    pub(crate) fn new(id: BlockId, entries: Vec<MethodItemEntry>) -> Self {
        Self {
            id,
            entries,
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn entries(&self) -> &[MethodItemEntry] {
        &self.entries
    }

    pub fn preds(&self) -> &[EdgeId] {
        &self.preds
    }

    pub fn succs(&self) -> &[EdgeId] {
        &self.succs
    }

    /// Instructions with their entry index.
    pub fn instructions(&self) -> impl DoubleEndedIterator<Item = (usize, &IRInstruction)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_insn().map(|insn| (i, insn)))
    }

    pub fn first_insn(&self) -> Option<(usize, &IRInstruction)> {
        self.instructions().next()
    }

    pub fn last_insn(&self) -> Option<(usize, &IRInstruction)> {
        self.instructions().next_back()
    }

    pub fn num_opcodes(&self) -> usize {
        self.instructions()
            .filter(|(_, insn)| !insn.opcode().is_internal())
            .count()
    }

    pub fn has_insns(&self) -> bool {
        self.first_insn().is_some()
    }

    pub fn may_throw(&self) -> bool {
        self.instructions().any(|(_, insn)| insn.may_throw())
    }

    /// Starts with a `move-result*` that belongs to the previous block's
    /// last instruction.
    pub fn starts_with_move_result(&self) -> bool {
        self.first_insn()
            .is_some_and(|(_, insn)| insn.opcode().is_move_result_any())
    }
}

/// Location of an entry in an editable CFG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnPos {
    pub block: BlockId,
    pub index: usize,
}

impl InsnPos {
    pub fn new(block: BlockId, index: usize) -> Self {
        Self { block, index }
    }
}

/// Control-flow graph of one method body.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    pub(crate) blocks: BTreeMap<BlockId, Block>,
    pub(crate) edges: Vec<Option<Edge>>,
    pub(crate) entry: BlockId,
    pub(crate) exit: Option<BlockId>,
    pub(crate) ghost_exit: bool,
    pub(crate) editable: bool,
    pub(crate) next_block: u32,
}

impl ControlFlowGraph {
    pub(crate) fn empty(editable: bool) -> Self {
        Self {
            blocks: BTreeMap::new(),
            edges: Vec::new(),
            entry: BlockId(0),
            exit: None,
            ghost_exit: false,
            editable,
            next_block: 0,
        }
    }

    pub fn editable(&self) -> bool {
        self.editable
    }

    pub fn entry_block(&self) -> BlockId {
        self.entry
    }

    /// The unique exit block, or the ghost exit when there are several.
    /// Computed by [`ControlFlowGraph::calculate_exit_block`].
    pub fn exit_block(&self) -> Option<BlockId> {
        self.exit
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.iter().flatten().count()
    }

    /// Blocks in id order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.blocks.values()
    }

    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.keys().copied().collect()
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(&id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0 as usize)?.as_ref()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().flatten()
    }

    pub fn succ_edges(&self, b: BlockId) -> Vec<&Edge> {
        self.block(b)
            .map(|blk| blk.succs.iter().filter_map(|e| self.edge(*e)).collect())
            .unwrap_or_default()
    }

    pub fn pred_edges(&self, b: BlockId) -> Vec<&Edge> {
        self.block(b)
            .map(|blk| blk.preds.iter().filter_map(|e| self.edge(*e)).collect())
            .unwrap_or_default()
    }

    /// Distinct successor blocks in edge order.
    pub fn succ_blocks(&self, b: BlockId) -> Vec<BlockId> {
        let mut seen = BTreeSet::new();
        self.succ_edges(b)
            .into_iter()
            .map(|e| e.target)
            .filter(|t| seen.insert(*t))
            .collect()
    }

    /// Distinct predecessor blocks in edge order.
    pub fn pred_blocks(&self, b: BlockId) -> Vec<BlockId> {
        let mut seen = BTreeSet::new();
        self.pred_edges(b)
            .into_iter()
            .map(|e| e.src)
            .filter(|s| seen.insert(*s))
            .collect()
    }

    pub fn get_succ_edge_of_type(&self, b: BlockId, kind: EdgeType) -> Option<&Edge> {
        self.succ_edges(b).into_iter().find(|e| e.kind == kind)
    }

    pub fn get_succ_edges_of_type(&self, b: BlockId, kind: EdgeType) -> Vec<&Edge> {
        self.succ_edges(b)
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    /// Throw edges of `b` in handler order.
    pub fn throw_edges(&self, b: BlockId) -> Vec<&Edge> {
        let mut edges = self.get_succ_edges_of_type(b, EdgeType::Throw);
        edges.sort_by_key(|e| e.throw_info.map_or(0, |t| t.index));
        edges
    }

    /// Handler list of `b`: (catch type, handler block) in handler order.
    pub fn catch_list(&self, b: BlockId) -> Vec<(Option<DexType>, BlockId)> {
        self.throw_edges(b)
            .into_iter()
            .map(|e| (e.throw_info.and_then(|t| t.catch_type), e.target))
            .collect()
    }

    /// Instructions of every block, in block id order.
    pub fn instructions(&self) -> impl Iterator<Item = (InsnPos, &IRInstruction)> + '_ {
        self.blocks.values().flat_map(|b| {
            b.instructions()
                .map(move |(i, insn)| (InsnPos::new(b.id, i), insn))
        })
    }

    pub fn num_opcodes(&self) -> usize {
        self.blocks.values().map(|b| b.num_opcodes()).sum()
    }

    pub fn insn(&self, pos: InsnPos) -> Option<&IRInstruction> {
        self.block(pos.block)?.entries.get(pos.index)?.as_insn()
    }

    pub fn insn_mut(&mut self, pos: InsnPos) -> Option<&mut IRInstruction> {
        self.block_mut(pos.block)?
            .entries
            .get_mut(pos.index)?
            .as_insn_mut()
    }

    /// First instruction matching `pred`, in block id order.
    pub fn find_insn(&self, mut pred: impl FnMut(&IRInstruction) -> bool) -> Option<InsnPos> {
        self.instructions()
            .find(|(_, insn)| pred(insn))
            .map(|(pos, _)| pos)
    }

    /// Visit every instruction mutably.
    pub fn for_each_insn_mut(&mut self, mut f: impl FnMut(&mut IRInstruction)) {
        for block in self.blocks.values_mut() {
            for entry in block.entries.iter_mut() {
                if let Some(insn) = entry.as_insn_mut() {
                    f(insn);
                }
            }
        }
    }

    /// Visit every entry of every block mutably.
    pub fn for_each_entry_mut(&mut self, mut f: impl FnMut(&mut MethodItemEntry)) {
        for block in self.blocks.values_mut() {
            for entry in block.entries.iter_mut() {
                f(entry);
            }
        }
    }

    /// Blocks reachable from the entry along any edge.
    pub fn reachable_blocks(&self) -> BTreeSet<BlockId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([self.entry]);
        while let Some(b) = queue.pop_front() {
            if !self.blocks.contains_key(&b) || !seen.insert(b) {
                continue;
            }
            for succ in self.succ_blocks(b) {
                queue.push_back(succ);
            }
        }
        seen
    }

    pub(crate) fn new_block(&mut self, entries: Vec<MethodItemEntry>) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.blocks.insert(id, Block::new(id, entries));
        id
    }

    pub(crate) fn add_edge(
        &mut self,
        src: BlockId,
        target: BlockId,
        kind: EdgeType,
        case_key: Option<i32>,
        throw_info: Option<ThrowInfo>,
    ) -> EdgeId {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Some(Edge {
            id,
            src,
            target,
            kind,
            case_key,
            throw_info,
        }));
        if let Some(b) = self.blocks.get_mut(&src) {
            b.succs.push(id);
        }
        if let Some(b) = self.blocks.get_mut(&target) {
            b.preds.push(id);
        }
        id
    }

    pub(crate) fn remove_edge(&mut self, id: EdgeId) {
        let Some(edge) = self.edges.get_mut(id.0 as usize).and_then(|e| e.take()) else {
            return;
        };
        if let Some(b) = self.blocks.get_mut(&edge.src) {
            b.succs.retain(|e| *e != id);
        }
        if let Some(b) = self.blocks.get_mut(&edge.target) {
            b.preds.retain(|e| *e != id);
        }
    }

    /// Point an existing edge at a different target.
    pub(crate) fn set_edge_target(&mut self, id: EdgeId, target: BlockId) {
        let Some(old) = self.edge(id).map(|e| e.target) else {
            return;
        };
        if let Some(b) = self.blocks.get_mut(&old) {
            b.preds.retain(|e| *e != id);
        }
        if let Some(Some(edge)) = self.edges.get_mut(id.0 as usize) {
            edge.target = target;
        }
        if let Some(b) = self.blocks.get_mut(&target) {
            b.preds.push(id);
        }
    }

    /// Move an existing edge to a different source.
    pub(crate) fn set_edge_src(&mut self, id: EdgeId, src: BlockId) {
        let Some(old) = self.edge(id).map(|e| e.src) else {
            return;
        };
        if let Some(b) = self.blocks.get_mut(&old) {
            b.succs.retain(|e| *e != id);
        }
        if let Some(Some(edge)) = self.edges.get_mut(id.0 as usize) {
            edge.src = src;
        }
        if let Some(b) = self.blocks.get_mut(&src) {
            b.succs.push(id);
        }
    }

    pub(crate) fn remove_block(&mut self, id: BlockId) {
        let Some(block) = self.blocks.get(&id) else {
            return;
        };
        let edges: Vec<EdgeId> = block.preds.iter().chain(block.succs.iter()).copied().collect();
        for e in edges {
            self.remove_edge(e);
        }
        self.blocks.remove(&id);
        if self.exit == Some(id) {
            self.exit = None;
            self.ghost_exit = false;
        }
    }
}
