//! Monotonic fixpoint iteration over a graph, in WTO order.
//!
//! ```text
//!   for component in wto:
//!     Vertex(n)      entry(n) = ⊔ edge(p -> n, exit(p));  exit(n) = node(n, entry(n))
//!     Scc(head, cs)  repeat { analyze head; analyze cs } until entry(head) stabilizes
//! ```
//!
//! Predecessors that have not been analyzed yet contribute bottom. From the
//! second iteration of a component onward the head's entry state is widened
//! instead of joined.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use tracing::trace;

use super::domain::AbstractDomain;
use super::wto::{Wto, WtoComponent};
use crate::cfg::{BlockId, ControlFlowGraph};

/// The shape of graph an analysis runs over.
pub trait GraphInterface {
    type Node: Copy + Ord + Debug;

    fn entry(&self) -> Self::Node;

    fn successors(&self, n: Self::Node) -> Vec<Self::Node>;

    fn predecessors(&self, n: Self::Node) -> Vec<Self::Node>;
}

impl GraphInterface for ControlFlowGraph {
    type Node = BlockId;

    fn entry(&self) -> BlockId {
        self.entry_block()
    }

    fn successors(&self, n: BlockId) -> Vec<BlockId> {
        self.succ_blocks(n)
    }

    fn predecessors(&self, n: BlockId) -> Vec<BlockId> {
        self.pred_blocks(n)
    }
}

/// Node of the reversed CFG. `Exit` joins every block control can leave
/// from, plus one block of each region that never exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackwardNode {
    Exit,
    Block(BlockId),
}

/// A CFG seen with its edges reversed, rooted at a virtual exit node.
pub struct Backwards<'a> {
    cfg: &'a ControlFlowGraph,
    exit_preds: Vec<BlockId>,
}

impl<'a> Backwards<'a> {
    pub fn new(cfg: &'a ControlFlowGraph) -> Self {
        let mut exit_preds: Vec<BlockId> = cfg
            .blocks()
            .filter(|b| b.succs().is_empty())
            .map(|b| b.id())
            .collect();

        // Infinite loops never reach a sink; root each such region at its
        // last block so that it is still analyzed.
        let mut seen: BTreeSet<BlockId> = BTreeSet::new();
        let mark = |root: BlockId, seen: &mut BTreeSet<BlockId>| {
            let mut work = vec![root];
            while let Some(b) = work.pop() {
                if seen.insert(b) {
                    work.extend(cfg.pred_blocks(b));
                }
            }
        };
        for b in &exit_preds {
            mark(*b, &mut seen);
        }
        for b in cfg.reverse_postorder().into_iter().rev() {
            if !seen.contains(&b) {
                exit_preds.push(b);
                mark(b, &mut seen);
            }
        }
        Self { cfg, exit_preds }
    }
}

impl GraphInterface for Backwards<'_> {
    type Node = BackwardNode;

    fn entry(&self) -> BackwardNode {
        BackwardNode::Exit
    }

    fn successors(&self, n: BackwardNode) -> Vec<BackwardNode> {
        match n {
            BackwardNode::Exit => self.exit_preds.iter().map(|b| BackwardNode::Block(*b)).collect(),
            BackwardNode::Block(b) => self
                .cfg
                .pred_blocks(b)
                .into_iter()
                .map(BackwardNode::Block)
                .collect(),
        }
    }

    fn predecessors(&self, n: BackwardNode) -> Vec<BackwardNode> {
        match n {
            BackwardNode::Exit => Vec::new(),
            BackwardNode::Block(b) => {
                let mut preds: Vec<BackwardNode> = self
                    .cfg
                    .succ_blocks(b)
                    .into_iter()
                    .map(BackwardNode::Block)
                    .collect();
                if self.exit_preds.contains(&b) {
                    preds.push(BackwardNode::Exit);
                }
                preds
            }
        }
    }
}

/// Transfer functions of an analysis.
pub trait FixpointAnalyzer<G: GraphInterface> {
    type Domain: AbstractDomain;

    /// Update `state` from the node's entry state to its exit state.
    fn analyze_node(&self, node: G::Node, state: &mut Self::Domain);

    /// State flowing along `src -> target`, given the exit state of `src`.
    fn analyze_edge(&self, _src: G::Node, _target: G::Node, exit_state: &Self::Domain) -> Self::Domain {
        exit_state.clone()
    }
}

pub struct MonotonicFixpointIterator<'g, G: GraphInterface, A: FixpointAnalyzer<G>> {
    graph: &'g G,
    analyzer: A,
    entry_states: BTreeMap<G::Node, A::Domain>,
    exit_states: BTreeMap<G::Node, A::Domain>,
    widening_delay: u32,
}

impl<'g, G: GraphInterface, A: FixpointAnalyzer<G>> MonotonicFixpointIterator<'g, G, A> {
    pub fn new(graph: &'g G, analyzer: A) -> Self {
        Self {
            graph,
            analyzer,
            entry_states: BTreeMap::new(),
            exit_states: BTreeMap::new(),
            widening_delay: 2,
        }
    }

    /// Iterations of a component that join before widening starts.
    pub fn with_widening_delay(mut self, delay: u32) -> Self {
        self.widening_delay = delay;
        self
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    /// Run to a fixpoint with `init` as the state at the graph's entry.
    pub fn run(&mut self, init: A::Domain) {
        self.entry_states.clear();
        self.exit_states.clear();
        let graph = self.graph;
        let wto = Wto::new(graph.entry(), |n| graph.successors(n));
        for component in wto.components() {
            self.analyze_component(component, &init);
        }
        trace!(
            target: "dexopt::analysis",
            nodes = self.exit_states.len(),
            "Fixpoint reached"
        );
    }

    pub fn entry_state_at(&self, n: G::Node) -> A::Domain {
        self.entry_states.get(&n).cloned().unwrap_or_else(A::Domain::bottom)
    }

    pub fn exit_state_at(&self, n: G::Node) -> A::Domain {
        self.exit_states.get(&n).cloned().unwrap_or_else(A::Domain::bottom)
    }

    fn compute_entry(&self, n: G::Node, init: &A::Domain) -> A::Domain {
        let mut state = if n == self.graph.entry() {
            init.clone()
        } else {
            A::Domain::bottom()
        };
        for p in self.graph.predecessors(n) {
            if let Some(exit) = self.exit_states.get(&p) {
                state.join_with(&self.analyzer.analyze_edge(p, n, exit));
            }
        }
        state
    }

    fn analyze_vertex(&mut self, n: G::Node, entry: A::Domain) {
        let mut exit = entry.clone();
        self.analyzer.analyze_node(n, &mut exit);
        self.entry_states.insert(n, entry);
        self.exit_states.insert(n, exit);
    }

    fn analyze_component(&mut self, component: &WtoComponent<G::Node>, init: &A::Domain) {
        match component {
            WtoComponent::Vertex(n) => {
                let entry = self.compute_entry(*n, init);
                self.analyze_vertex(*n, entry);
            }
            WtoComponent::Scc { head, components } => {
                let mut current = self.compute_entry(*head, init);
                let mut iteration = 0u32;
                loop {
                    self.analyze_vertex(*head, current.clone());
                    for c in components {
                        self.analyze_component(c, init);
                    }
                    let next = self.compute_entry(*head, init);
                    if next.leq(&current) {
                        break;
                    }
                    if iteration < self.widening_delay {
                        current.join_with(&next);
                    } else {
                        current.widen_with(&next);
                    }
                    iteration += 1;
                }
            }
        }
    }
}
