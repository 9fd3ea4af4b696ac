//! Tests for the fixpoint iterator and the bundled analyses.

#[cfg(test)]
#[allow(clippy::module_inception)]
mod tests {
    use std::collections::BTreeMap;

    use crate::analysis::*;
    use crate::cfg::{BlockId, ControlFlowGraph, InsnPos};
    use crate::ir::{ircode_from_string, IROpcode};

    fn cfg_of(src: &str) -> ControlFlowGraph {
        let code = ircode_from_string(src).unwrap();
        ControlFlowGraph::build(code.list(), true).unwrap()
    }

    const LOOP: &str = "(
      (load-param v0)
      (const v1 0)
      (:head)
      (if-ge v1 v0 :out)
      (add-int/lit v1 v1 1)
      (goto :head)
      (:out)
      (return v1)
    )";

    #[test]
    fn test_bitset_ops() {
        let mut a: BitSet = [1, 5, 70].into_iter().collect();
        assert!(a.contains(70));
        assert!(!a.contains(64));
        assert!(!a.insert(5));
        let b: BitSet = [5, 200].into_iter().collect();
        assert!(a.union_with(&b));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 5, 70, 200]);
        a.subtract_with(&b);
        assert_eq!(a.len(), 2);
        assert!(a.remove(1));
        assert!(!a.remove(1));
        assert!(a.is_subset(&[70, 3].into_iter().collect()));
    }

    #[test]
    fn test_wto_nests_loops() {
        let mut succs: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        succs.insert(1, vec![2]);
        succs.insert(2, vec![3, 4]);
        succs.insert(3, vec![2]);
        succs.insert(4, vec![]);
        let wto = Wto::new(1, |n| succs.get(&n).cloned().unwrap_or_default());
        assert_eq!(wto.to_string(), "1 (2 3) 4");
        assert_eq!(wto.nodes(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_wto_of_cfg_loop() {
        let cfg = cfg_of(LOOP);
        let wto = Wto::new(cfg.entry_block(), |b| cfg.succ_blocks(b));
        assert_eq!(wto.to_string(), "B0 (B1 B2) B3");
    }

    #[test]
    fn test_constant_domain_lattice() {
        let mut a = ConstantDomain::Value(3);
        assert!(ConstantDomain::bottom().leq(&a));
        a.join_with(&ConstantDomain::Bottom);
        assert_eq!(a, ConstantDomain::Value(3));
        a.join_with(&ConstantDomain::Value(4));
        assert_eq!(a, ConstantDomain::Top);
        assert!(!ConstantDomain::Top.leq(&ConstantDomain::Value(1)));
    }

    #[test]
    fn test_liveness_through_loop() {
        let cfg = cfg_of(LOOP);
        let live = Liveness::run(&cfg);
        let head = BlockId(1);
        let live_in: Vec<_> = live.live_in(head).regs().collect();
        assert_eq!(live_in, vec![0, 1]);
        // v0 is still needed by the next test of the loop condition.
        let body_out: Vec<_> = live.live_out(BlockId(2)).regs().collect();
        assert_eq!(body_out, vec![0, 1]);
        let exit_in: Vec<_> = live.live_in(BlockId(3)).regs().collect();
        assert_eq!(exit_in, vec![1]);
        assert!(live.live_in(BlockId(0)).is_bottom());
    }

    #[test]
    fn test_liveness_per_insn() {
        let cfg = cfg_of("((load-param v0) (const v1 1) (add-int v2 v0 v1) (return v2))");
        let live = Liveness::run(&cfg);
        let per = live.live_out_per_insn(&cfg, BlockId(0));
        let sets: Vec<Vec<u32>> = per.iter().map(|(_, s)| s.regs().collect()).collect();
        assert_eq!(sets, vec![vec![0], vec![0, 1], vec![2], vec![]]);
    }

    #[test]
    fn test_liveness_in_infinite_loop() {
        let cfg = cfg_of(
            "(
              (load-param v0)
              (:top)
              (add-int/lit v0 v0 1)
              (goto :top)
            )",
        );
        let live = Liveness::run(&cfg);
        let body_in: Vec<_> = live.live_in(BlockId(1)).regs().collect();
        assert_eq!(body_in, vec![0]);
    }

    #[test]
    fn test_reaching_defs_merge_at_join() {
        let cfg = cfg_of(
            "(
              (load-param v0)
              (if-eqz v0 :zero)
              (const v1 1)
              (goto :join)
              (:zero)
              (const v1 2)
              (:join)
              (return v1)
            )",
        );
        let defs = ReachingDefinitions::run(&cfg);
        let ret = cfg.find_insn(|i| i.opcode() == IROpcode::Return).unwrap();
        let reaching = defs.defs_of(&cfg, ret, 1);
        assert_eq!(reaching.len(), 2);
        for pos in &reaching {
            assert_eq!(cfg.insn(*pos).unwrap().opcode(), IROpcode::Const);
        }
        let param = defs.defs_of(&cfg, ret, 0);
        assert_eq!(param.into_iter().collect::<Vec<_>>(), vec![InsnPos::new(BlockId(0), 0)]);
    }

    #[test]
    fn test_reaching_defs_loop_carried() {
        let cfg = cfg_of(LOOP);
        let defs = ReachingDefinitions::run(&cfg);
        let test = cfg.find_insn(|i| i.opcode() == IROpcode::IfGe).unwrap();
        let ops: Vec<_> = defs
            .defs_of(&cfg, test, 1)
            .into_iter()
            .map(|p| cfg.insn(p).unwrap().opcode())
            .collect();
        assert_eq!(ops, vec![IROpcode::Const, IROpcode::AddIntLit]);
    }

    #[test]
    fn test_monitor_counts() {
        let cfg = cfg_of(
            "(
              (load-param-object v0)
              (monitor-enter v0)
              (monitor-exit v0)
              (return-void)
            )",
        );
        let counts = MonitorCounts::run(&cfg);
        assert_eq!(counts.exit_count(BlockId(0)), MonitorCount::Value(0));
        assert!(counts.find_mismatches(&cfg).is_empty());

        let cfg = cfg_of(
            "(
              (load-param-object v0)
              (load-param v1)
              (if-eqz v1 :skip)
              (monitor-enter v0)
              (:skip)
              (return-void)
            )",
        );
        let counts = MonitorCounts::run(&cfg);
        let ret = cfg.find_insn(|i| i.opcode() == IROpcode::ReturnVoid).unwrap();
        assert_eq!(counts.entry_count(ret.block), MonitorCount::Top);
        assert_eq!(counts.find_mismatches(&cfg), vec![ret]);
    }
}
