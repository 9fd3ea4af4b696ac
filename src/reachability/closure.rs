//! The transitive closure.
//!
//! Rounds alternate between a parallel phase and a serial one. In the
//! parallel phase a work queue visits each newly marked object, gathers its
//! references and marks them in turn. The serial phase resolves what the
//! parallel phase cannot decide locally: which overriders of an invoked
//! virtual method can be dispatched to, given the classes known to be
//! instantiable so far. Whatever it marks seeds the next round.

use std::collections::BTreeSet;
use std::io;

use tracing::{debug, trace, warn};

use super::graph::ReachabilityGraph;
use super::objects::{ReachableAspects, ReachableObject, ReachableObjects};
use super::references::{class_named_by_string, CallKind, References};
use super::returning::compute_returning_methods;
use super::roots::compute_roots;
use super::{IgnoreSets, ReachabilityOptions};
use crate::concurrent::{resolve_num_threads, workqueue_run, ConcurrentSet, WorkerState};
use crate::dex::hierarchy::{collect_interfaces, super_chain};
use crate::dex::{build_class_scope, resolve_field, resolve_method, DexClass, DexMethod, DexStore, DexType};
use crate::method_override_graph::{self as mog, Graph};

enum Task {
    Visit(ReachableObject),
    /// Walk a marked method's body now that it can be entered.
    Body(DexMethod),
}

struct Closure<'a> {
    options: &'a ReachabilityOptions,
    ignore: &'a IgnoreSets,
    reachables: ReachableObjects,
    callable: ConcurrentSet<DexMethod>,
    bodies: ConcurrentSet<DexMethod>,
    directly_instantiable: ConcurrentSet<DexClass>,
    invoked_virtual_bases: ConcurrentSet<DexMethod>,
    instance_receivers: ConcurrentSet<DexClass>,
}

/// Whether `m` overrides a method of an external class; such methods can
/// be called by the framework once their class exists.
fn overrides_external(m: DexMethod) -> bool {
    let Some(cls) = m.class_type().class() else {
        return false;
    };
    let chain = super_chain(cls.get_type());
    let mut supers: BTreeSet<DexType> = chain.iter().skip(1).copied().collect();
    for ty in &chain {
        if let Some(c) = ty.class() {
            collect_interfaces(c, &mut supers);
        }
    }
    supers.into_iter().any(|ty| {
        ty.class()
            .is_some_and(|c| c.is_external() && c.find_vmethod(m.name(), m.proto()).is_some())
    })
}

impl Closure<'_> {
    fn mark(&self, obj: ReachableObject, retainer: ReachableObject) -> bool {
        if let Some(graph) = &self.reachables.graph {
            graph.record(obj, retainer);
        }
        self.reachables.mark(obj)
    }

    fn push(&self, worker: &WorkerState<'_, Task>, obj: ReachableObject, retainer: ReachableObject) {
        if self.mark(obj, retainer) {
            worker.push_task(Task::Visit(obj));
        }
    }

    fn push_type(&self, worker: &WorkerState<'_, Task>, ty: DexType, retainer: ReachableObject) {
        if let Some(cls) = ty.class() {
            self.push(worker, ReachableObject::Class(cls), retainer);
        }
    }

    /// Record `m` as callable; returns whether its body still has to be
    /// walked.
    fn become_callable(&self, m: DexMethod) -> bool {
        self.callable.insert(m) && self.reachables.marked_method(m) && !self.bodies.contains(&m)
    }

    fn can_enter(&self, m: DexMethod) -> bool {
        !self.options.cfg_gathering_check_instance_callable
            || m.is_static()
            || self.callable.contains(&m)
    }

    fn handle(&self, worker: &WorkerState<'_, Task>, task: Task) {
        match task {
            Task::Visit(obj) => self.visit(worker, obj),
            Task::Body(m) => {
                if self.can_enter(m) {
                    self.visit_body(worker, m);
                }
            }
        }
    }

    fn visit(&self, worker: &WorkerState<'_, Task>, obj: ReachableObject) {
        trace!(target: "dexopt::reachability", object = %obj, "Visit");
        let mut refs = References::default();
        match obj {
            ReachableObject::Seed => return,
            ReachableObject::Class(cls) => self.gather_class(worker, cls, &mut refs),
            ReachableObject::Method(m) => {
                refs.add_type(m.class_type());
                refs.add_proto(m.proto());
                if let Some(annos) = m.annotations() {
                    refs.add_annotations(&annos, self.ignore);
                }
                for annos in m.param_annotations().values() {
                    refs.add_annotations(annos, self.ignore);
                }
                if self.can_enter(m) {
                    self.visit_body(worker, m);
                }
            }
            ReachableObject::Field(f) => {
                refs.add_type(f.class_type());
                refs.add_type(f.field_type());
                if let Some(annos) = f.annotations() {
                    refs.add_annotations(&annos, self.ignore);
                }
            }
            ReachableObject::Anno(ty) => refs.add_type(ty),
        }
        self.push_refs(worker, obj, None, refs);
    }

    fn gather_class(&self, worker: &WorkerState<'_, Task>, cls: DexClass, refs: &mut References) {
        if cls.is_external() {
            return;
        }
        let this = ReachableObject::Class(cls);
        if let Some(sup) = cls.super_class() {
            refs.add_type(sup);
        }
        for intf in cls.interfaces().iter() {
            refs.add_type(intf);
        }
        if let Some(annos) = cls.annotations() {
            refs.add_annotations(&annos, self.ignore);
        }
        if let Some(clinit) = cls.clinit() {
            self.push(worker, ReachableObject::Method(clinit), this);
        }
        for m in cls.vmethods() {
            if overrides_external(m) {
                self.push(worker, ReachableObject::Method(m), this);
                if !m.is_abstract() && self.become_callable(m) {
                    worker.push_task(Task::Body(m));
                }
            }
        }
    }

    fn visit_body(&self, worker: &WorkerState<'_, Task>, m: DexMethod) {
        if !self.bodies.insert(m) {
            return;
        }
        let mut refs = References::default();
        if let Some(code) = m.code() {
            refs.add_code(&code, self.options.cfg_gathering());
        }
        self.push_refs(worker, ReachableObject::Method(m), Some(m), refs);
    }

    fn push_refs(
        &self,
        worker: &WorkerState<'_, Task>,
        retainer: ReachableObject,
        caller: Option<DexMethod>,
        refs: References,
    ) {
        for ty in refs.types {
            self.push_type(worker, ty, retainer);
        }
        for ty in refs.annos {
            self.push(worker, ReachableObject::Anno(ty), retainer);
        }
        let read_strings = caller.is_some_and(|m| !self.ignore.string_literals.contains(&m.class_type()));
        if read_strings {
            for s in refs.strings {
                if let Some(ty) = class_named_by_string(s) {
                    self.push_type(worker, ty, retainer);
                }
            }
        }
        for ty in refs.new_instances {
            if let Some(cls) = ty.class() {
                self.directly_instantiable.insert(cls);
            }
        }
        for ty in refs.instance_receivers {
            if let Some(cls) = ty.class() {
                self.instance_receivers.insert(cls);
            }
        }
        for (fref, search) in refs.fields {
            match resolve_field(fref, search) {
                Some(f) => self.push(worker, ReachableObject::Field(f), retainer),
                None => {
                    self.push_type(worker, fref.class_type(), retainer);
                    self.push_type(worker, fref.field_type(), retainer);
                }
            }
        }
        for (mref, search, kind) in refs.methods {
            let Some(callee) = resolve_method(mref, search, caller) else {
                self.push_type(worker, mref.class_type(), retainer);
                continue;
            };
            self.push(worker, ReachableObject::Method(callee), retainer);
            match kind {
                CallKind::Virtual => {
                    self.invoked_virtual_bases.insert(callee);
                }
                CallKind::Direct if !callee.is_static() => {
                    if self.become_callable(callee) {
                        worker.push_task(Task::Body(callee));
                    }
                }
                _ => {}
            }
        }
    }

    /// Classes instantiated by reachable code or kept, with every supertype.
    fn instantiable(&self, kept: &BTreeSet<DexClass>) -> BTreeSet<DexClass> {
        let concrete_kept = kept
            .iter()
            .copied()
            .filter(|c| !c.is_interface() && !c.is_abstract());
        let mut out = BTreeSet::new();
        for cls in self.directly_instantiable.to_ordered_keys().into_iter().chain(concrete_kept) {
            for ty in super_chain(cls.get_type()) {
                let Some(c) = ty.class() else { continue };
                if !out.insert(c) {
                    continue;
                }
                let mut intfs = BTreeSet::new();
                collect_interfaces(c, &mut intfs);
                out.extend(intfs.into_iter().filter_map(|t| t.class()));
            }
        }
        out
    }

    /// Mark the dispatch targets of every invoked virtual method whose
    /// class qualifies. Returns the tasks for the next round.
    fn resolve_dispatch(&self, graph: &Graph, instantiable: &BTreeSet<DexClass>) -> Vec<Task> {
        let mut next = Vec::new();
        for base in self.invoked_virtual_bases.to_ordered_keys() {
            let retainer = ReachableObject::Method(base);
            let targets = std::iter::once(base).chain(mog::get_overriding_methods(graph, base, true));
            for target in targets {
                let Some(cls) = target.class_type().class() else { continue };
                if cls.is_external() {
                    continue;
                }
                let dispatchable = if self.options.cfg_gathering_check_instantiable {
                    instantiable.contains(&cls)
                } else {
                    self.reachables.marked_class(cls)
                };
                if !dispatchable {
                    continue;
                }
                let obj = ReachableObject::Method(target);
                if self.mark(obj, retainer) {
                    next.push(Task::Visit(obj));
                }
                if !target.is_abstract() && self.become_callable(target) {
                    next.push(Task::Body(target));
                }
            }
        }
        next
    }
}

/// Mark everything reachable from the roots of `stores`.
///
/// Fails only if a worker thread cannot be spawned.
pub fn compute_reachable_objects(
    stores: &[DexStore],
    ignore_sets: &IgnoreSets,
    options: &ReachabilityOptions,
) -> io::Result<(ReachableObjects, ReachableAspects)> {
    let scope = build_class_scope(stores);
    let roots = compute_roots(&scope, options);
    let graph = mog::build_graph(&scope);

    let mut reachables = ReachableObjects::new();
    if options.record_graph {
        reachables.graph = Some(ReachabilityGraph::new());
    }
    let closure = Closure {
        options,
        ignore: ignore_sets,
        reachables,
        callable: ConcurrentSet::new(),
        bodies: ConcurrentSet::new(),
        directly_instantiable: ConcurrentSet::new(),
        invoked_virtual_bases: ConcurrentSet::new(),
        instance_receivers: ConcurrentSet::new(),
    };
    for m in &roots.callable {
        closure.callable.insert(*m);
    }
    let mut seeds: Vec<Task> = roots
        .objects
        .iter()
        .filter(|obj| closure.mark(**obj, ReachableObject::Seed))
        .map(|obj| Task::Visit(*obj))
        .collect();
    debug!(target: "dexopt::reachability", roots = seeds.len(), "Computed roots");

    let num_threads = resolve_num_threads(options.num_threads);
    let mut rounds = 0;
    while !seeds.is_empty() {
        rounds += 1;
        let handled = workqueue_run(seeds, num_threads, |worker, task| closure.handle(worker, task))?;
        let instantiable = closure.instantiable(&roots.classes);
        seeds = closure.resolve_dispatch(&graph, &instantiable);
        debug!(
            target: "dexopt::reachability",
            round = rounds,
            handled,
            classes = closure.reachables.num_marked_classes(),
            methods = closure.reachables.num_marked_methods(),
            fields = closure.reachables.num_marked_fields(),
            next = seeds.len(),
            "Closure round"
        );
    }

    let instantiable_types = closure.instantiable(&roots.classes);
    let Closure {
        reachables,
        callable,
        directly_instantiable,
        invoked_virtual_bases,
        instance_receivers,
        ..
    } = closure;

    let directly_instantiable_types: BTreeSet<DexClass> = directly_instantiable.into_ordered().into_iter().collect();
    if options.cfg_gathering_check_instantiable {
        let assumed = roots
            .classes
            .iter()
            .filter(|c| !c.is_interface() && !c.is_abstract() && !directly_instantiable_types.contains(c))
            .count();
        if assumed > 0 {
            warn!(
                target: "dexopt::reachability",
                count = assumed,
                "Kept classes assumed instantiable without a reachable new-instance"
            );
        }
    }

    let callable_instance_methods: BTreeSet<DexMethod> = callable
        .into_ordered()
        .into_iter()
        .filter(|m| !m.is_static() && reachables.marked_method(*m))
        .collect();
    let uninstantiable_dependencies: BTreeSet<DexClass> = instance_receivers
        .into_ordered()
        .into_iter()
        .filter(|c| !c.is_external() && reachables.marked_class(*c) && !instantiable_types.contains(c))
        .collect();
    let returning_methods = if options.cfg_gathering_check_returning {
        compute_returning_methods(&reachables.methods(), &graph)
    } else {
        BTreeSet::new()
    };

    let aspects = ReachableAspects {
        instantiable_types,
        directly_instantiable_types,
        callable_instance_methods,
        returning_methods,
        uninstantiable_dependencies,
        invoked_virtual_bases: invoked_virtual_bases.into_ordered().into_iter().collect(),
        tracks_instantiable: options.cfg_gathering_check_instantiable,
        tracks_callable: options.cfg_gathering_check_instance_callable,
        tracks_returning: options.cfg_gathering_check_returning,
    };
    debug!(
        target: "dexopt::reachability",
        rounds,
        classes = reachables.num_marked_classes(),
        methods = reachables.num_marked_methods(),
        fields = reachables.num_marked_fields(),
        instantiable = aspects.instantiable_types.len(),
        callable = aspects.callable_instance_methods.len(),
        "Computed reachable objects"
    );
    Ok((reachables, aspects))
}
