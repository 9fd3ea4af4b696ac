//! Register allocation.
//!
//! Maps the symbolic registers of a method onto a DEX frame so that every
//! instruction has an encoding.
//!
//! ```text
//!   symbolic IR ─▶ constraints ─▶ interference ─▶ coalesce ─▶ color ─┐
//!                                     ▲                              │
//!                                     └──────── split ◀── spills ◀───┤
//!                                                                    ▼
//!   symbolic IR ─▶ live intervals ─▶ linear scan ──────────────▶ finalize
//! ```
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`constraints`] | operand caps, register kinds |
//! | [`interference`] | interference graph, conservative coalescing |
//! | [`graph_coloring`] | simplify/select and the spill loop |
//! | [`spill`] | live-range splitting |
//! | [`linear_scan`] | the faster, spill-free allocator |
//! | [`finalize`] | frame layout, parameter placement, legality |
//!
//! Both allocators run on an editable CFG and leave it in place.

pub mod constraints;
pub mod error;
pub mod finalize;
pub mod graph_coloring;
pub mod interference;
pub mod linear_scan;
pub mod spill;

#[cfg(test)]
mod tests;

pub use constraints::{RegInfo, RegisterType, MAX_REG};
pub use error::{AllocError, AllocResult};
pub use finalize::{check_cfg_legality, check_legality, Assignment};
pub use interference::InterferenceGraph;

use tracing::debug;

use crate::dex::DexMethod;
use crate::ir::IRCode;
use crate::walk::Reducible;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocConfig {
    pub use_linear_scan: bool,
    /// Rounds of live-range splitting before giving up.
    pub max_spill_rounds: u32,
}

impl Default for AllocConfig {
    fn default() -> Self {
        Self {
            use_linear_scan: false,
            max_spill_rounds: 8,
        }
    }
}

/// Counters of one or more allocations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    pub methods: usize,
    pub spill_rounds: usize,
    pub spilled: usize,
    pub coalesced: usize,
    pub moves_inserted: usize,
    pub moves_elided: usize,
    pub param_moves: usize,
    pub range_windows: usize,
}

impl Reducible for AllocStats {
    fn reduce(&mut self, other: Self) {
        self.methods += other.methods;
        self.spill_rounds += other.spill_rounds;
        self.spilled += other.spilled;
        self.coalesced += other.coalesced;
        self.moves_inserted += other.moves_inserted;
        self.moves_elided += other.moves_elided;
        self.param_moves += other.param_moves;
        self.range_windows += other.range_windows;
    }
}

/// Allocate registers for `code`, whose editable CFG must be built.
///
/// On success every register of the body is physical, parameters occupy
/// the top of the frame and `code.registers_size()` is the frame size.
pub fn allocate(method: &str, code: &mut IRCode, config: &AllocConfig) -> AllocResult<AllocStats> {
    if !code.editable_cfg_built() {
        return Err(AllocError::NoCfg(method.to_string()));
    }
    let mut stats = AllocStats {
        methods: 1,
        ..AllocStats::default()
    };
    let Some(cfg) = code.cfg_mut() else {
        return Err(AllocError::NoCfg(method.to_string()));
    };
    let assignment = if config.use_linear_scan {
        linear_scan::allocate(method, cfg)?
    } else {
        graph_coloring::allocate(method, cfg, config, &mut stats)?
    };
    let registers_size = finalize::finalize(method, cfg, &assignment, &mut stats)?;
    check_cfg_legality(method, cfg, registers_size)?;
    code.set_registers_size(registers_size);
    debug!(
        target: "dexopt::regalloc",
        method,
        registers_size,
        spilled = stats.spilled,
        coalesced = stats.coalesced,
        "Allocated"
    );
    Ok(stats)
}

/// Allocate the body of `method`, building and clearing its CFG around
/// the allocation. Methods without code are left alone.
pub fn allocate_method(method: DexMethod, config: &AllocConfig) -> AllocResult<AllocStats> {
    let name = method.to_string();
    let Some(mut code) = method.code() else {
        return Ok(AllocStats::default());
    };
    code.build_cfg(true).map_err(error::cfg_err(&name))?;
    let result = allocate(&name, &mut code, config);
    code.clear_cfg();
    result
}
