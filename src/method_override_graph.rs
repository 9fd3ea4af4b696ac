//! Method override graph.
//!
//! An edge `child -> parent` records that `child` overrides `parent`:
//! `child` is declared in a subtype of `parent`'s class with the same name
//! and prototype, and `parent` is visible to it. Interface methods are
//! parents of the class methods that implement them, including methods a
//! class inherits from a superclass that does not itself implement the
//! interface.
//!
//! Nodes live in an ordered map keyed by method; edges are method handles,
//! so the graph never owns the methods it relates.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use tracing::debug;

use crate::dex::hierarchy::collect_interfaces;
use crate::dex::type_util::same_package;
use crate::dex::{DexClass, DexMethod, DexProto, DexString};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    /// Methods this one overrides directly.
    pub parents: BTreeSet<DexMethod>,
    /// Methods overriding this one directly.
    pub children: BTreeSet<DexMethod>,
    pub is_interface: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: BTreeMap<DexMethod, Node>,
}

impl Graph {
    pub fn get_node(&self, m: DexMethod) -> Option<&Node> {
        self.nodes.get(&m)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&DexMethod, &Node)> + '_ {
        self.nodes.iter()
    }

    fn add_edge(&mut self, child: DexMethod, parent: DexMethod) {
        if child == parent {
            return;
        }
        self.node_mut(child).parents.insert(parent);
        self.node_mut(parent).children.insert(child);
    }

    fn node_mut(&mut self, m: DexMethod) -> &mut Node {
        self.nodes.entry(m).or_insert_with(|| Node {
            is_interface: m.class_type().class().is_some_and(|c| c.is_interface()),
            ..Node::default()
        })
    }
}

fn can_override(child: DexMethod, parent: DexMethod) -> bool {
    let access = parent.access();
    if access.is_private() || parent.is_static() || !parent.is_virtual() {
        return false;
    }
    if access.is_package_private() {
        return same_package(child.class_type(), parent.class_type());
    }
    true
}

/// Nearest virtual method named (name, proto) in the superclasses of `cls`.
fn find_in_superclasses(cls: DexClass, name: DexString, proto: DexProto) -> Option<DexMethod> {
    let mut current = cls.super_class().and_then(|t| t.class());
    while let Some(c) = current {
        if let Some(m) = c.find_vmethod(name, proto) {
            return Some(m);
        }
        current = c.super_class().and_then(|t| t.class());
    }
    None
}

/// The method `cls` dispatches (name, proto) to, looking through its
/// superclasses but not its interfaces.
fn resolve_in_class_chain(cls: DexClass, name: DexString, proto: DexProto) -> Option<DexMethod> {
    cls.find_vmethod(name, proto)
        .or_else(|| find_in_superclasses(cls, name, proto))
}

fn class_edges(cls: DexClass) -> Vec<(DexMethod, DexMethod)> {
    let mut edges = Vec::new();
    if !cls.is_interface() {
        for m in cls.vmethods() {
            if let Some(parent) = find_in_superclasses(cls, m.name(), m.proto()) {
                if can_override(m, parent) {
                    edges.push((m, parent));
                }
            }
        }
    }
    let mut interfaces = BTreeSet::new();
    collect_interfaces(cls, &mut interfaces);
    for intf in interfaces {
        let Some(intf_cls) = intf.class() else { continue };
        for im in intf_cls.vmethods() {
            let implementor = if cls.is_interface() {
                cls.find_vmethod(im.name(), im.proto())
            } else {
                resolve_in_class_chain(cls, im.name(), im.proto())
            };
            if let Some(imp) = implementor {
                edges.push((imp, im));
            }
        }
    }
    edges
}

/// Build the graph over every class of `scope`, one task per class.
pub fn build_graph(scope: &[DexClass]) -> Graph {
    let per_class: Vec<Vec<(DexMethod, DexMethod)>> =
        scope.par_iter().map(|cls| class_edges(*cls)).collect();
    let mut graph = Graph::default();
    for cls in scope {
        for m in cls.vmethods() {
            graph.node_mut(m);
        }
    }
    for (child, parent) in per_class.into_iter().flatten() {
        graph.add_edge(child, parent);
    }
    debug!(target: "dexopt::method_override_graph", nodes = graph.len(), "Built override graph");
    graph
}

fn transitive(
    graph: &Graph,
    m: DexMethod,
    include_interfaces: bool,
    next: impl Fn(&Node) -> &BTreeSet<DexMethod>,
) -> Vec<DexMethod> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![m];
    while let Some(cur) = stack.pop() {
        let Some(node) = graph.get_node(cur) else { continue };
        for &n in next(node) {
            if seen.insert(n) {
                stack.push(n);
            }
        }
    }
    seen.remove(&m);
    seen.into_iter()
        .filter(|n| include_interfaces || !graph.get_node(*n).is_some_and(|node| node.is_interface))
        .collect()
}

/// Every method overriding `m`, transitively, in method order (class,
/// then name, then prototype).
pub fn get_overriding_methods(graph: &Graph, m: DexMethod, include_interfaces: bool) -> Vec<DexMethod> {
    transitive(graph, m, include_interfaces, |n| &n.children)
}

/// Every method `m` overrides, transitively, in method order. Interface
/// methods are not grouped: `Lp/A;.run` precedes `Lp/I;.run`.
pub fn get_overridden_methods(graph: &Graph, m: DexMethod, include_interfaces: bool) -> Vec<DexMethod> {
    transitive(graph, m, include_interfaces, |n| &n.parents)
}

/// Whether a call to `m` may dispatch elsewhere, or a call elsewhere may
/// dispatch to `m`.
pub fn is_true_virtual(graph: &Graph, m: DexMethod) -> bool {
    if !m.is_virtual() {
        return false;
    }
    if m.is_abstract() || m.class_type().class().is_some_and(|c| c.is_interface()) {
        return true;
    }
    graph
        .get_node(m)
        .is_some_and(|n| !n.parents.is_empty() || !n.children.is_empty())
}

/// Virtual methods of `scope` that could be called directly.
pub fn get_non_true_virtuals(graph: &Graph, scope: &[DexClass]) -> BTreeSet<DexMethod> {
    scope
        .iter()
        .flat_map(|cls| cls.vmethods())
        .filter(|m| !m.is_external() && !is_true_virtual(graph, *m))
        .collect()
}

pub fn all_overriding_methods(
    graph: &Graph,
    m: DexMethod,
    mut pred: impl FnMut(DexMethod) -> bool,
    include_interfaces: bool,
) -> bool {
    get_overriding_methods(graph, m, include_interfaces)
        .into_iter()
        .all(|o| pred(o))
}

pub fn any_overriding_methods(
    graph: &Graph,
    m: DexMethod,
    mut pred: impl FnMut(DexMethod) -> bool,
    include_interfaces: bool,
) -> bool {
    get_overriding_methods(graph, m, include_interfaces)
        .into_iter()
        .any(|o| pred(o))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::{ClassCreator, DexType, ACC_ABSTRACT, ACC_INTERFACE, ACC_PUBLIC};
    use crate::ir::method_from_string;

    fn class(name: &str, sup: Option<&str>, intfs: &[&str], access: crate::dex::DexAccessFlags, methods: &[&str]) -> DexClass {
        let mut creator = ClassCreator::new(DexType::make(name)).set_access(access);
        if let Some(s) = sup {
            creator = creator.set_super(DexType::make(s));
        }
        for i in intfs {
            creator = creator.add_interface(DexType::make(i));
        }
        for m in methods {
            creator = creator.add_method(method_from_string(m).unwrap());
        }
        creator.create().unwrap()
    }

    fn mref(desc: &str) -> DexMethod {
        crate::dex::DexMethodRef::make_from_descriptor(desc)
            .unwrap()
            .as_def()
            .unwrap()
    }

    #[test]
    fn test_class_chain_and_interfaces() {
        let intf = class(
            "Lmog/tests/I;",
            None,
            &[],
            ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT,
            &[r#"(method (public abstract) "Lmog/tests/I;.run:()V")"#],
        );
        let a = class(
            "Lmog/tests/A;",
            None,
            &[],
            ACC_PUBLIC,
            &[
                r#"(method (public) "Lmog/tests/A;.run:()V" ((return-void)))"#,
                r#"(method (public) "Lmog/tests/A;.solo:()V" ((return-void)))"#,
            ],
        );
        // B implements I through the run() it inherits from A.
        let b = class("Lmog/tests/B;", Some("Lmog/tests/A;"), &["Lmog/tests/I;"], ACC_PUBLIC, &[]);
        let c = class(
            "Lmog/tests/C;",
            Some("Lmog/tests/B;"),
            &[],
            ACC_PUBLIC,
            &[r#"(method (public) "Lmog/tests/C;.run:()V" ((return-void)))"#],
        );
        let scope = vec![intf, a, b, c];
        let graph = build_graph(&scope);

        let i_run = mref("Lmog/tests/I;.run:()V");
        let a_run = mref("Lmog/tests/A;.run:()V");
        let c_run = mref("Lmog/tests/C;.run:()V");
        let solo = mref("Lmog/tests/A;.solo:()V");

        assert_eq!(get_overriding_methods(&graph, a_run, false), vec![c_run]);
        assert_eq!(get_overriding_methods(&graph, i_run, true), vec![a_run, c_run]);
        assert_eq!(get_overridden_methods(&graph, c_run, true), vec![a_run, i_run]);
        assert_eq!(get_overridden_methods(&graph, c_run, false), vec![a_run]);
        assert!(is_true_virtual(&graph, a_run));
        assert!(is_true_virtual(&graph, i_run));
        assert!(!is_true_virtual(&graph, solo));
        assert_eq!(get_non_true_virtuals(&graph, &scope).into_iter().collect::<Vec<_>>(), vec![solo]);
        assert!(all_overriding_methods(&graph, a_run, |m| !m.is_abstract(), true));
        assert!(!any_overriding_methods(&graph, solo, |_| true, true));
    }

    #[test]
    fn test_transitive_results_follow_method_order() {
        // Z is declared before A in scope and reached first from the leaf.
        let z = class(
            "Lmog/tests/order/Z;",
            None,
            &[],
            ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT,
            &[r#"(method (public abstract) "Lmog/tests/order/Z;.go:()V")"#],
        );
        let a = class(
            "Lmog/tests/order/A;",
            None,
            &["Lmog/tests/order/Z;"],
            ACC_PUBLIC,
            &[r#"(method (public) "Lmog/tests/order/A;.go:()V" ((return-void)))"#],
        );
        let m = class(
            "Lmog/tests/order/M;",
            Some("Lmog/tests/order/A;"),
            &[],
            ACC_PUBLIC,
            &[r#"(method (public) "Lmog/tests/order/M;.go:()V" ((return-void)))"#],
        );
        let graph = build_graph(&[z, m, a]);
        let z_go = mref("Lmog/tests/order/Z;.go:()V");
        let a_go = mref("Lmog/tests/order/A;.go:()V");
        let m_go = mref("Lmog/tests/order/M;.go:()V");
        assert_eq!(get_overridden_methods(&graph, m_go, true), vec![a_go, z_go]);
        assert_eq!(get_overriding_methods(&graph, z_go, true), vec![a_go, m_go]);
        let again = build_graph(&[a, m, z]);
        assert_eq!(get_overridden_methods(&again, m_go, true), vec![a_go, z_go]);
    }

    #[test]
    fn test_package_private_not_overridden_across_packages() {
        let base = class(
            "Lmog/tests/p1/Base;",
            None,
            &[],
            ACC_PUBLIC,
            &[r#"(method () "Lmog/tests/p1/Base;.hidden:()V" ((return-void)))"#],
        );
        let sub = class(
            "Lmog/tests/p2/Sub;",
            Some("Lmog/tests/p1/Base;"),
            &[],
            ACC_PUBLIC,
            &[r#"(method (public) "Lmog/tests/p2/Sub;.hidden:()V" ((return-void)))"#],
        );
        let graph = build_graph(&[base, sub]);
        let base_hidden = mref("Lmog/tests/p1/Base;.hidden:()V");
        assert!(get_overriding_methods(&graph, base_hidden, true).is_empty());
    }
}
