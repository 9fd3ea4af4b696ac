//! Linear-scan allocation.
//!
//! Instructions are numbered along the layout order of the CFG. A
//! register's interval is the hull of every point it is defined, used, or
//! live across a block boundary. Intervals are scanned from the end of the
//! method backward; a register returns to the free pool once every
//! interval holding it starts after the current one ends.
//!
//! Freed slots remember the use shape of the register that released them
//! (narrow or wide, and the narrowest operand it appeared in), and a
//! register takes a slot freed by its own shape before any other. Expiry is
//! strict: a source read by the instruction defining a register still holds
//! its slot there, so the frame of `add-int v2 v0 v1` keeps three registers.
//!
//! No spill decisions are made. Parameters get no interval and always end
//! up at the top of the frame.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::constraints::{collect_reg_info, RegInfo};
use super::error::AllocResult;
use super::finalize::Assignment;
use crate::analysis::Liveness;
use crate::cfg::ControlFlowGraph;
use crate::ir::Reg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: u32,
    pub end: u32,
}

impl Interval {
    fn extend(&mut self, point: u32) {
        self.start = self.start.min(point);
        self.end = self.end.max(point);
    }
}

/// Live intervals of every non-parameter register of `cfg`.
pub fn live_intervals(cfg: &ControlFlowGraph, params: &BTreeSet<Reg>) -> BTreeMap<Reg, Interval> {
    let liveness = Liveness::run(cfg);
    let mut intervals: BTreeMap<Reg, Interval> = BTreeMap::new();
    let mut touch = |reg: Reg, point: u32| {
        if params.contains(&reg) {
            return;
        }
        intervals
            .entry(reg)
            .or_insert(Interval { start: point, end: point })
            .extend(point);
    };

    let mut point = 0u32;
    for b in cfg.linear_order() {
        let Some(block) = cfg.block(b) else { continue };
        point += 1;
        for r in liveness.live_in(b).regs() {
            touch(r, point);
        }
        let mut first = true;
        for (_, insn) in block.instructions() {
            // A pseudo result is written by its producer.
            if first || !insn.opcode().is_move_result_pseudo() {
                point += 1;
            }
            first = false;
            for &s in insn.srcs() {
                touch(s, point);
            }
            if let Some(d) = insn.dest() {
                touch(d, point);
            }
        }
        point += 1;
        for r in liveness.live_out(b).regs() {
            touch(r, point);
        }
    }
    intervals
}

/// Narrowest operand field a register appears in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum OperandBits {
    Four,
    Eight,
    Sixteen,
}

/// How a register is used: its width and its tightest operand field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct UseShape {
    wide: bool,
    bits: OperandBits,
}

impl UseShape {
    fn of(info: Option<&RegInfo>) -> Self {
        let Some(info) = info else {
            return Self {
                wide: false,
                bits: OperandBits::Sixteen,
            };
        };
        let bits = match info.max_vreg {
            0..=15 => OperandBits::Four,
            16..=255 => OperandBits::Eight,
            _ => OperandBits::Sixteen,
        };
        Self {
            wide: info.width == 2,
            bits,
        }
    }

    fn width(self) -> u8 {
        if self.wide {
            2
        } else {
            1
        }
    }
}

/// Free slots, each tagged with the shape of the register that released it.
#[derive(Debug, Default)]
struct FreePool {
    slots: BTreeMap<Reg, UseShape>,
}

impl FreePool {
    fn release(&mut self, color: Reg, shape: UseShape) {
        for i in 0..u32::from(shape.width()) {
            self.slots.insert(color + i, shape);
        }
    }

    fn fits(&self, c: Reg, width: u8) -> bool {
        (0..u32::from(width)).all(|i| self.slots.contains_key(&(c + i)))
    }

    /// Lowest run of free slots for `shape`, preferring slots its own shape
    /// released. A wide register only takes two adjacent slots.
    fn take(&mut self, shape: UseShape) -> Option<Reg> {
        let width = shape.width();
        let same_shape = |c: Reg| (0..u32::from(width)).all(|i| self.slots.get(&(c + i)) == Some(&shape));
        let c = self
            .slots
            .keys()
            .copied()
            .find(|&c| same_shape(c))
            .or_else(|| self.slots.keys().copied().find(|&c| self.fits(c, width)))?;
        for i in 0..u32::from(width) {
            self.slots.remove(&(c + i));
        }
        Some(c)
    }
}

pub(crate) fn allocate(method: &str, cfg: &ControlFlowGraph) -> AllocResult<Assignment> {
    let infos = collect_reg_info(method, cfg)?;
    let params: BTreeSet<Reg> = infos
        .iter()
        .filter(|(_, info)| info.is_param)
        .map(|(r, _)| *r)
        .collect();
    let intervals = live_intervals(cfg, &params);

    let mut order: Vec<(Reg, Interval)> = intervals.into_iter().collect();
    order.sort_by(|(ra, a), (rb, b)| {
        b.end.cmp(&a.end).then(b.start.cmp(&a.start)).then(ra.cmp(rb))
    });

    let shape_of = |r: Reg| UseShape::of(infos.get(&r));
    let mut colors: BTreeMap<Reg, Reg> = BTreeMap::new();
    let mut active: Vec<(Reg, Interval)> = Vec::new();
    let mut free = FreePool::default();
    let mut top: Reg = 0;
    let mut reused = 0usize;

    for (reg, cur) in order {
        let shape = shape_of(reg);
        active.retain(|(r, a)| {
            if a.start > cur.end {
                if let Some(&c) = colors.get(r) {
                    free.release(c, shape_of(*r));
                }
                false
            } else {
                true
            }
        });
        let color = match free.take(shape) {
            Some(c) => {
                reused += 1;
                c
            }
            None => {
                let c = top;
                top += u32::from(shape.width());
                c
            }
        };
        colors.insert(reg, color);
        active.push((reg, cur));
    }

    debug!(target: "dexopt::regalloc", method, frame = top, reused, "Linear scan");
    Ok(Assignment::new(colors, BTreeMap::new(), infos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ircode_from_string;

    #[test]
    fn test_use_and_def_share_a_point() {
        let code =
            ircode_from_string("((load-param v0) (const v1 5) (add-int v2 v0 v1) (return v2))")
                .unwrap();
        let cfg = ControlFlowGraph::build(code.list(), true).unwrap();
        let params: BTreeSet<Reg> = [0].into_iter().collect();
        let iv = live_intervals(&cfg, &params);
        assert!(!iv.contains_key(&0));
        assert_eq!(iv[&1].end, iv[&2].start);
    }

    fn shape(wide: bool, bits: OperandBits) -> UseShape {
        UseShape { wide, bits }
    }

    fn assign(src: &str) -> Assignment {
        let code = ircode_from_string(src).unwrap();
        let cfg = ControlFlowGraph::build(code.list(), true).unwrap();
        allocate("LRa/tests/Scan;.m:()V", &cfg).unwrap()
    }

    #[test]
    fn test_wide_takes_adjacent_free_slots() {
        let narrow = shape(false, OperandBits::Sixteen);
        let wide = shape(true, OperandBits::Sixteen);
        let mut free = FreePool::default();
        free.release(0, narrow);
        free.release(2, wide);
        assert_eq!(free.take(wide), Some(2));
        assert_eq!(free.take(wide), None);
        assert_eq!(free.take(narrow), Some(0));
    }

    #[test]
    fn test_pool_prefers_slots_of_the_same_shape() {
        let nibble = shape(false, OperandBits::Four);
        let wide = shape(true, OperandBits::Sixteen);
        let mut free = FreePool::default();
        free.release(0, wide);
        free.release(5, nibble);
        assert_eq!(free.take(nibble), Some(5));
        // Nothing of its own shape left: the lowest slot will do.
        assert_eq!(free.take(nibble), Some(0));
        assert_eq!(free.take(wide), None);
        assert_eq!(free.take(shape(false, OperandBits::Eight)), Some(1));
    }

    #[test]
    fn test_source_keeps_slot_at_defining_instruction() {
        let a = assign("((const v0 1) (add-int/lit v1 v0 2) (return v1))");
        assert_ne!(a.color(0), a.color(1));
    }

    #[test]
    fn test_wide_dest_never_takes_narrow_source_slot() {
        let a = assign("((const v0 1) (int-to-long v1 v0) (return-wide v1))");
        let (narrow, wide) = (a.color(0).unwrap(), a.color(1).unwrap());
        assert!(narrow < wide || narrow >= wide + 2);
    }
}
