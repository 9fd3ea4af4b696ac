//! Removal and rewriting of what the closure did not mark.
//!
//! Every sweep walks the scope in store order and classes in member order,
//! so its effect does not depend on how the closure was scheduled.

use std::collections::BTreeSet;

use tracing::{debug, trace, warn};

use super::objects::{ReachableAspects, ReachableObjects};
use super::returning::ReturnOracle;
use super::ReachabilityOptions;
use crate::cfg::{ControlFlowGraph, EdgeType, InsnPos};
use crate::dex::{build_class_scope, DexClass, DexMethod, DexStore, DexType, ACC_ABSTRACT, ACC_FINAL};
use crate::ir::code::frame_size_of;
use crate::ir::{IRCode, IRInstruction, IROpcode, Reg};
use crate::method_override_graph::{build_graph, Graph};
use crate::walk::{self, Reducible};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub classes_removed: usize,
    pub methods_removed: usize,
    pub fields_removed: usize,
}

/// Remove unmarked classes, then unmarked members of the classes left.
/// With `remove_pub` unset, public members of surviving classes stay even
/// when unmarked. Anything the configuration keeps stays regardless.
pub fn sweep(stores: &mut [DexStore], reachables: &ReachableObjects, remove_pub: bool) -> SweepStats {
    let mut stats = SweepStats::default();
    for store in stores.iter_mut() {
        let removed = store.remove_classes(|cls| {
            !cls.is_external() && !reachables.marked_class(cls) && cls.rstate().can_delete()
        });
        for cls in &removed {
            trace!(target: "dexopt::reachability", class = %cls, "Removed class");
            for m in cls.all_methods() {
                m.release_code();
            }
        }
        stats.classes_removed += removed.len();
    }

    for cls in build_class_scope(stores) {
        if cls.is_external() {
            continue;
        }
        let (methods, fields) = cls.retain_members(
            |m| reachables.marked_method(m) || !m.rstate().can_delete() || (!remove_pub && m.access().is_public()),
            |f| reachables.marked_field(f) || !f.rstate().can_delete() || (!remove_pub && f.access().is_public()),
        );
        for m in &methods {
            trace!(target: "dexopt::reachability", method = %m, "Removed method");
            m.release_code();
        }
        stats.methods_removed += methods.len();
        stats.fields_removed += fields.len();
    }
    debug!(
        target: "dexopt::reachability",
        classes = stats.classes_removed,
        methods = stats.methods_removed,
        fields = stats.fields_removed,
        "Swept"
    );
    stats
}

/// Make every marked concrete class that cannot be instantiated abstract.
/// A class instantiated only through its subclasses also becomes abstract
/// when it declares abstract methods. Returns the classes changed.
pub fn mark_classes_abstract(
    stores: &[DexStore],
    reachables: &ReachableObjects,
    aspects: &ReachableAspects,
) -> BTreeSet<DexClass> {
    let mut changed = BTreeSet::new();
    for cls in build_class_scope(stores) {
        if cls.is_external() || cls.is_interface() || cls.is_abstract() {
            continue;
        }
        if !reachables.marked_class(cls)
            || aspects.directly_instantiable_types.contains(&cls)
            || cls.rstate().is_root()
        {
            continue;
        }
        if aspects.is_instantiable(cls) && !cls.vmethods().iter().any(|m| m.is_abstract()) {
            continue;
        }
        cls.set_abstract();
        changed.insert(cls);
    }
    debug!(target: "dexopt::reachability", count = changed.len(), "Marked classes abstract");
    changed
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepCodeStats {
    pub new_instances: usize,
    pub instance_ofs: usize,
    pub check_casts: usize,
    pub instance_accesses: usize,
    pub non_returning_invokes: usize,
    pub blocks_removed: usize,
    pub classes_abstracted: usize,
    /// Constructors left with no way to return.
    pub throw_only_ctors: BTreeSet<DexMethod>,
}

impl Reducible for SweepCodeStats {
    fn reduce(&mut self, other: Self) {
        self.new_instances += other.new_instances;
        self.instance_ofs += other.instance_ofs;
        self.check_casts += other.check_casts;
        self.instance_accesses += other.instance_accesses;
        self.non_returning_invokes += other.non_returning_invokes;
        self.blocks_removed += other.blocks_removed;
        self.classes_abstracted += other.classes_abstracted;
        self.throw_only_ctors.extend(other.throw_only_ctors);
    }
}

#[derive(Debug, Clone, Copy)]
enum Rewrite {
    NewInstance(InsnPos),
    InstanceOf(InsnPos, Reg),
    CheckCast(InsnPos, Reg),
    InstanceAccess(InsnPos),
    NonReturning(InsnPos),
}

struct CodeSweeper<'a> {
    aspects: &'a ReachableAspects,
    oracle: ReturnOracle<'a>,
    fold_types: bool,
    cut_calls: bool,
}

fn next_insn(cfg: &ControlFlowGraph, pos: InsnPos) -> Option<InsnPos> {
    let block = cfg.block(pos.block)?;
    if let Some((i, _)) = block.instructions().find(|(i, _)| *i > pos.index) {
        return Some(InsnPos::new(pos.block, i));
    }
    let succ = cfg.get_succ_edge_of_type(pos.block, EdgeType::Goto)?.target();
    cfg.block(succ)?
        .first_insn()
        .map(|(i, _)| InsnPos::new(succ, i))
}

/// Whether the normal path out of the instruction at `pos` is already
/// `const v 0; throw v`.
fn followed_by_throw_null(cfg: &ControlFlowGraph, pos: InsnPos) -> bool {
    let anchor = cfg.move_result_of(pos).unwrap_or(pos);
    let Some(first) = next_insn(cfg, anchor) else {
        return false;
    };
    let Some(second) = next_insn(cfg, first) else {
        return false;
    };
    match (cfg.insn(first), cfg.insn(second)) {
        (Some(c), Some(t)) => {
            c.opcode() == IROpcode::Const
                && c.literal() == Some(0)
                && t.opcode().is_throw()
                && c.dest().is_some()
                && t.srcs().first().copied() == c.dest()
        }
        _ => false,
    }
}

impl CodeSweeper<'_> {
    fn uninstantiable(&self, ty: Option<DexType>) -> bool {
        ty.is_some_and(|t| self.aspects.is_uninstantiable_type(t))
    }

    fn next_rewrite(&self, method: DexMethod, cfg: &ControlFlowGraph) -> Option<Rewrite> {
        for (pos, insn) in cfg.instructions() {
            let op = insn.opcode();
            if self.fold_types {
                match op {
                    IROpcode::NewInstance if self.uninstantiable(insn.get_type()) => {
                        return Some(Rewrite::NewInstance(pos));
                    }
                    IROpcode::InstanceOf | IROpcode::CheckCast if self.uninstantiable(insn.get_type()) => {
                        let dest = cfg
                            .move_result_of(pos)
                            .and_then(|p| cfg.insn(p))
                            .and_then(|i| i.dest());
                        if let Some(dest) = dest {
                            return Some(if op == IROpcode::InstanceOf {
                                Rewrite::InstanceOf(pos, dest)
                            } else {
                                Rewrite::CheckCast(pos, dest)
                            });
                        }
                    }
                    _ if op.is_ifield_op() && self.uninstantiable(insn.get_field().map(|f| f.class_type())) => {
                        return Some(Rewrite::InstanceAccess(pos));
                    }
                    IROpcode::InvokeVirtual
                    | IROpcode::InvokeInterface
                    | IROpcode::InvokeDirect
                    | IROpcode::InvokeSuper
                        if self.uninstantiable(insn.get_method().map(|m| m.class_type())) =>
                    {
                        return Some(Rewrite::InstanceAccess(pos));
                    }
                    _ => {}
                }
            }
            if self.cut_calls
                && op.is_invoke()
                && self.oracle.call_never_returns(method, insn)
                && !followed_by_throw_null(cfg, pos)
            {
                return Some(Rewrite::NonReturning(pos));
            }
        }
        None
    }

    fn sweep_method(&self, method: DexMethod, code: &mut IRCode) -> SweepCodeStats {
        let mut stats = SweepCodeStats::default();
        let built_here = !code.editable_cfg_built();
        if built_here {
            if let Err(error) = code.build_cfg(true) {
                warn!(target: "dexopt::reachability", method = %method, error = %error, "Cannot build CFG");
                return stats;
            }
        }
        let mut tmp: Option<Reg> = None;
        let mut changed = false;
        loop {
            let Some(rewrite) = code.cfg().and_then(|cfg| self.next_rewrite(method, cfg)) else {
                break;
            };
            let needs_tmp = matches!(
                rewrite,
                Rewrite::NewInstance(_) | Rewrite::InstanceAccess(_) | Rewrite::NonReturning(_)
            );
            let reg = match tmp {
                Some(r) => r,
                None if needs_tmp => {
                    let r = code.allocate_temp();
                    tmp = Some(r);
                    r
                }
                None => 0,
            };
            let Some(cfg) = code.cfg_mut() else { break };
            let applied = match rewrite {
                Rewrite::NewInstance(pos) => {
                    stats.new_instances += 1;
                    cfg.insert_throw_null(pos, reg)
                }
                Rewrite::InstanceAccess(pos) => {
                    stats.instance_accesses += 1;
                    cfg.insert_throw_null(pos, reg)
                }
                Rewrite::InstanceOf(pos, dest) => {
                    stats.instance_ofs += 1;
                    cfg.replace_insns(pos, vec![IRInstruction::new(IROpcode::Const).with_dest(dest).with_literal(0)])
                }
                Rewrite::CheckCast(pos, dest) => {
                    stats.check_casts += 1;
                    cfg.replace_insns(pos, vec![IRInstruction::new(IROpcode::Const).with_dest(dest).with_literal(0)])
                }
                Rewrite::NonReturning(pos) => {
                    stats.non_returning_invokes += 1;
                    cfg.insert_throw_null_after(pos, reg)
                }
            };
            if let Err(error) = applied {
                warn!(target: "dexopt::reachability", method = %method, error = %error, "Rewrite skipped");
                break;
            }
            trace!(target: "dexopt::reachability", method = %method, rewrite = ?rewrite, "Rewrote");
            changed = true;
        }
        if changed {
            if let Some(cfg) = code.cfg_mut() {
                stats.blocks_removed += cfg.remove_unreachable_blocks().unwrap_or(0);
            }
            let returns = code.instructions().any(|insn| insn.opcode().is_return());
            if !returns && method.is_constructor() && !method.is_static() {
                stats.throw_only_ctors.insert(method);
            }
        }
        if built_here {
            code.clear_cfg();
        }
        stats
    }
}

/// Rewrite code that touches objects which cannot exist, and cut short
/// calls that never return. Type-based rewrites need the instantiable
/// refinement; call cutting needs the returning one.
pub fn sweep_code(stores: &[DexStore], options: &ReachabilityOptions, aspects: &ReachableAspects) -> SweepCodeStats {
    let fold_types = options.cfg_gathering_check_instantiable && aspects.tracks_instantiable;
    let cut_calls = options.cfg_gathering_check_returning && aspects.tracks_returning;
    if !fold_types && !cut_calls {
        return SweepCodeStats::default();
    }
    let scope = build_class_scope(stores);
    let graph = if cut_calls { build_graph(&scope) } else { Graph::default() };
    let analyzed: BTreeSet<DexMethod> = scope
        .iter()
        .flat_map(|cls| cls.all_methods())
        .filter(|m| m.has_code())
        .collect();
    let sweeper = CodeSweeper {
        aspects,
        oracle: ReturnOracle::new(&aspects.returning_methods, &analyzed, &graph),
        fold_types,
        cut_calls,
    };
    let mut stats: SweepCodeStats = walk::parallel::reduce_code(&scope, |m, code| sweeper.sweep_method(m, code));

    for ctor in std::mem::take(&mut stats.throw_only_ctors) {
        let Some(cls) = ctor.class_type().class() else { continue };
        if cls.is_interface() || cls.is_abstract() || aspects.is_instantiable(cls) || cls.rstate().is_root() {
            continue;
        }
        cls.set_abstract();
        stats.classes_abstracted += 1;
    }
    debug!(
        target: "dexopt::reachability",
        new_instances = stats.new_instances,
        instance_ofs = stats.instance_ofs,
        check_casts = stats.check_casts,
        instance_accesses = stats.instance_accesses,
        non_returning_invokes = stats.non_returning_invokes,
        blocks_removed = stats.blocks_removed,
        classes_abstracted = stats.classes_abstracted,
        "Swept code"
    );
    stats
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UncallableStats {
    /// Methods turned abstract.
    pub abstracted: usize,
    /// Bodies replaced by `throw null`.
    pub throw_bodies: usize,
}

fn throw_null_body(code: &IRCode) -> IRCode {
    let params = code.get_param_instructions();
    let tmp = frame_size_of(params.iter());
    IRCode::from_instructions(params.into_iter().chain([
        IRInstruction::new(IROpcode::Const).with_dest(tmp).with_literal(0),
        IRInstruction::new(IROpcode::Throw).with_src(tmp),
    ]))
}

/// Strip the bodies of non-final virtual methods nothing can call. In an
/// abstract class the method becomes abstract; elsewhere its body becomes
/// `throw null`. Needs the callable refinement.
pub fn sweep_uncallable_virtual_methods(stores: &[DexStore], aspects: &ReachableAspects) -> UncallableStats {
    let mut stats = UncallableStats::default();
    if !aspects.tracks_callable {
        return stats;
    }
    for cls in build_class_scope(stores) {
        if cls.is_external() {
            continue;
        }
        let abstract_class = cls.is_abstract() || cls.is_interface();
        for m in cls.vmethods() {
            if m.is_abstract() || m.access().is_final() || m.is_external() || !m.rstate().can_delete() {
                continue;
            }
            if aspects.is_callable(m) || !m.has_code() {
                continue;
            }
            if abstract_class {
                m.release_code();
                let mut access = m.access();
                access.insert(ACC_ABSTRACT);
                access.remove(ACC_FINAL);
                m.set_access(access);
                stats.abstracted += 1;
            } else {
                let body = m.code().map(|code| throw_null_body(&code));
                if let Some(body) = body {
                    m.set_code(Some(body));
                    stats.throw_bodies += 1;
                }
            }
            trace!(target: "dexopt::reachability", method = %m, "Uncallable");
        }
    }
    debug!(
        target: "dexopt::reachability",
        abstracted = stats.abstracted,
        throw_bodies = stats.throw_bodies,
        "Swept uncallable virtual methods"
    );
    stats
}
