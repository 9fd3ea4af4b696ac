//! Weak topological ordering (Bourdoncle, 1993).
//!
//! A WTO lists the nodes reachable from a root so that every strongly
//! connected component appears as a nested `(head components..)` group.
//! Iterating components in order and re-running each group until its head
//! stabilizes visits every node after its non-back-edge predecessors.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WtoComponent<N> {
    Vertex(N),
    Scc { head: N, components: Vec<WtoComponent<N>> },
}

impl<N: Copy> WtoComponent<N> {
    pub fn head_node(&self) -> N {
        match self {
            WtoComponent::Vertex(n) => *n,
            WtoComponent::Scc { head, .. } => *head,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wto<N> {
    components: Vec<WtoComponent<N>>,
}

struct Builder<'a, N, F> {
    succs: &'a F,
    dfn: BTreeMap<N, u32>,
    stack: Vec<N>,
    num: u32,
}

const DONE: u32 = u32::MAX;

impl<N, F> Builder<'_, N, F>
where
    N: Copy + Ord,
    F: Fn(N) -> Vec<N>,
{
    fn dfn(&self, n: N) -> u32 {
        self.dfn.get(&n).copied().unwrap_or(0)
    }

    fn visit(&mut self, v: N, partition: &mut Vec<WtoComponent<N>>) -> u32 {
        self.stack.push(v);
        self.num += 1;
        self.dfn.insert(v, self.num);
        let mut head = self.num;
        let mut is_loop = false;
        for w in (self.succs)(v) {
            let min = match self.dfn(w) {
                0 => self.visit(w, partition),
                d => d,
            };
            if min <= head {
                head = min;
                is_loop = true;
            }
        }
        if head == self.dfn(v) {
            self.dfn.insert(v, DONE);
            let mut element = self.stack.pop();
            if is_loop {
                while let Some(e) = element {
                    if e == v {
                        break;
                    }
                    self.dfn.insert(e, 0);
                    element = self.stack.pop();
                }
                let component = self.component(v);
                partition.push(component);
            } else {
                partition.push(WtoComponent::Vertex(v));
            }
        }
        head
    }

    fn component(&mut self, v: N) -> WtoComponent<N> {
        let mut partition = Vec::new();
        for w in (self.succs)(v) {
            if self.dfn(w) == 0 {
                self.visit(w, &mut partition);
            }
        }
        partition.reverse();
        WtoComponent::Scc {
            head: v,
            components: partition,
        }
    }
}

impl<N: Copy + Ord> Wto<N> {
    pub fn new<F>(root: N, succs: F) -> Self
    where
        F: Fn(N) -> Vec<N>,
    {
        let mut builder = Builder {
            succs: &succs,
            dfn: BTreeMap::new(),
            stack: Vec::new(),
            num: 0,
        };
        let mut components = Vec::new();
        builder.visit(root, &mut components);
        components.reverse();
        Self { components }
    }

    pub fn components(&self) -> &[WtoComponent<N>] {
        &self.components
    }

    /// Nodes in WTO order, heads before their bodies.
    pub fn nodes(&self) -> Vec<N> {
        fn walk<N: Copy>(cs: &[WtoComponent<N>], out: &mut Vec<N>) {
            for c in cs {
                match c {
                    WtoComponent::Vertex(n) => out.push(*n),
                    WtoComponent::Scc { head, components } => {
                        out.push(*head);
                        walk(components, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.components, &mut out);
        out
    }
}

impl<N: fmt::Display> fmt::Display for Wto<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_all<N: fmt::Display>(
            f: &mut fmt::Formatter<'_>,
            cs: &[WtoComponent<N>],
        ) -> fmt::Result {
            for (i, c) in cs.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                match c {
                    WtoComponent::Vertex(n) => write!(f, "{}", n)?,
                    WtoComponent::Scc { head, components } => {
                        write!(f, "({}", head)?;
                        if !components.is_empty() {
                            write!(f, " ")?;
                            write_all(f, components)?;
                        }
                        write!(f, ")")?;
                    }
                }
            }
            Ok(())
        }
        write_all(f, &self.components)
    }
}
