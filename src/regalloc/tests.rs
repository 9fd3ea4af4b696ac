//! Tests for the register allocators and frame finalization.

#[cfg(test)]
#[allow(clippy::module_inception)]
mod tests {
    use crate::cfg::InsnPos;
    use crate::ir::lower::is_range_contiguous;
    use crate::ir::{ircode_from_string, method_from_string, IRCode, IROpcode};
    use crate::regalloc::*;

    const ADD_CONST: &str = "((load-param v0) (const v1 5) (add-int v2 v0 v1) (return v2))";
    const WIDE_ADD: &str = "(
      (load-param-wide v0)
      (const-wide v2 4294967296)
      (add-long v4 v0 v2)
      (return-wide v4)
    )";

    fn linear_scan() -> AllocConfig {
        AllocConfig {
            use_linear_scan: true,
            ..AllocConfig::default()
        }
    }

    fn run(src: &str, config: &AllocConfig) -> (IRCode, AllocStats) {
        let mut code = ircode_from_string(src).unwrap();
        code.build_cfg(true).unwrap();
        let stats = allocate("LRa/tests/T;.m:()V", &mut code, config).unwrap();
        (code, stats)
    }

    fn max_reg(code: &IRCode) -> u32 {
        code.instructions()
            .flat_map(|insn| insn.dest().into_iter().chain(insn.srcs().iter().copied()))
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_linear_scan_basic_frame() {
        let (mut code, stats) = run(ADD_CONST, &linear_scan());
        assert_eq!(stats.methods, 1);
        assert_eq!(code.registers_size(), 3);
        let params = code.get_param_instructions();
        assert_eq!(params[0].dest(), Some(2));
        assert!(max_reg(&code) < 16);
        code.clear_cfg();
        check_legality("LRa/tests/T;.m:()V", &code).unwrap();
    }

    #[test]
    fn test_graph_coloring_basic_frame() {
        let (code, _) = run(ADD_CONST, &AllocConfig::default());
        assert!(code.registers_size() <= 3);
        let params = code.get_param_instructions();
        assert_eq!(params[0].dest(), Some(code.registers_size() - 1));
        check_legality("LRa/tests/T;.m:()V", &code).unwrap();
    }

    #[test]
    fn test_wide_param_takes_top_pair() {
        for config in [AllocConfig::default(), linear_scan()] {
            let (code, _) = run(WIDE_ADD, &config);
            let size = code.registers_size();
            let params = code.get_param_instructions();
            assert_eq!(params[0].dest(), Some(size - 2));
            assert!(max_reg(&code) + 1 < 16);
            for insn in code.instructions() {
                if let Some(d) = insn.dest() {
                    assert!(d + 1 < size || !insn.dest_is_wide());
                }
            }
            check_legality("LRa/tests/T;.m:()V", &code).unwrap();
        }
    }

    #[test]
    fn test_wide_result_never_half_overlaps_its_sources() {
        let programs = [
            WIDE_ADD,
            "(
              (load-param-wide v0)
              (const v2 1)
              (const-wide v3 9)
              (add-long v5 v0 v3)
              (add-int/lit v2 v2 1)
              (sub-long v7 v5 v0)
              (return-wide v7)
            )",
        ];
        for src in programs {
            let (code, _) = run(src, &AllocConfig::default());
            for insn in code.instructions().filter(|i| i.dest_is_wide() && i.opcode() != IROpcode::LoadParamWide) {
                let d = insn.dest().unwrap();
                for (i, &s) in insn.srcs().iter().enumerate() {
                    if insn.src_is_wide(i) {
                        assert!(d == s || d + 2 <= s || s + 2 <= d, "{}", insn);
                    }
                }
            }
            check_legality("LRa/tests/T;.m:()V", &code).unwrap();
        }
    }

    fn twenty_live_values() -> String {
        let field = "\"LRa/tests/Pressure;.f:I\"";
        let mut body = String::from("((load-param-object v0)\n");
        for i in 1..=20 {
            body.push_str(&format!("(iget v0 {})\n(move-result-pseudo v{})\n", field, i));
        }
        for i in 1..=20 {
            body.push_str(&format!("(iput v{} v0 {})\n", i, field));
        }
        body.push_str("(return-void))");
        body
    }

    #[test]
    fn test_spills_when_nibble_registers_run_out() {
        let (code, stats) = run(&twenty_live_values(), &AllocConfig::default());
        assert!(stats.spilled >= 4, "{:?}", stats);
        assert!(stats.spill_rounds >= 1);
        assert!(stats.moves_inserted >= stats.spilled);
        check_legality("LRa/tests/T;.m:()V", &code).unwrap();
        let gets = code
            .instructions()
            .filter(|insn| insn.opcode() == IROpcode::Iget)
            .count();
        assert_eq!(gets, 20);
    }

    #[test]
    fn test_spill_limit_is_reported() {
        let config = AllocConfig {
            max_spill_rounds: 0,
            ..AllocConfig::default()
        };
        let mut code = ircode_from_string(&twenty_live_values()).unwrap();
        code.build_cfg(true).unwrap();
        let err = allocate("LRa/tests/T;.m:()V", &mut code, &config).unwrap_err();
        assert!(matches!(err, AllocError::SpillLimit { rounds: 0, .. }));
    }

    #[test]
    fn test_check_cast_operand_lands_in_result() {
        let src = r#"(
          (load-param-object v0)
          (check-cast v0 "LRa/tests/Cast;")
          (move-result-pseudo-object v1)
          (return-object v1)
        )"#;
        for config in [AllocConfig::default(), linear_scan()] {
            let (code, _) = run(src, &config);
            let cfg = code.cfg().unwrap();
            let (pos, insn) = cfg
                .instructions()
                .find(|(_, insn)| insn.opcode() == IROpcode::CheckCast)
                .map(|(pos, insn)| (pos, insn.clone()))
                .unwrap();
            let pseudo: InsnPos = cfg.move_result_of(pos).unwrap();
            assert_eq!(cfg.insn(pseudo).unwrap().dest(), Some(insn.src(0)));
            check_legality("LRa/tests/T;.m:()V", &code).unwrap();
        }
    }

    #[test]
    fn test_range_invoke_gets_contiguous_operands() {
        let src = r#"(
          (const v1 1)
          (const v2 2)
          (const v3 3)
          (const v4 4)
          (const v5 5)
          (const v6 6)
          (invoke-static (v1 v2 v3 v4 v5 v6) "LRa/tests/R;.six:(IIIIII)V")
          (return-void)
        )"#;
        for config in [AllocConfig::default(), linear_scan()] {
            let (code, _) = run(src, &config);
            let invoke = code
                .instructions()
                .find(|insn| insn.opcode().is_invoke())
                .cloned()
                .unwrap();
            assert!(is_range_contiguous(&invoke));
            check_legality("LRa/tests/T;.m:()V", &code).unwrap();
        }
    }

    #[test]
    fn test_coalesced_moves_are_elided() {
        let src = "((load-param v0) (const v1 3) (move v2 v1) (add-int v3 v0 v2) (return v3))";
        let (code, stats) = run(src, &AllocConfig::default());
        assert!(stats.coalesced >= 1);
        assert_eq!(stats.moves_elided, stats.coalesced);
        assert!(code.instructions().all(|insn| !insn.opcode().is_move()));
    }

    #[test]
    fn test_type_conflict_fails() {
        let mut code =
            ircode_from_string("((load-param-object v0) (add-int/lit v1 v0 1) (return v1))")
                .unwrap();
        code.build_cfg(true).unwrap();
        let err = allocate("LRa/tests/T;.m:()V", &mut code, &AllocConfig::default());
        assert!(matches!(err, Err(AllocError::TypeConflict { reg: 0, .. })));
    }

    #[test]
    fn test_requires_editable_cfg() {
        let mut code = ircode_from_string(ADD_CONST).unwrap();
        let err = allocate("LRa/tests/T;.m:()V", &mut code, &AllocConfig::default());
        assert!(matches!(err, Err(AllocError::NoCfg(_))));
    }

    #[test]
    fn test_allocate_method_round_trips_body() {
        let m = method_from_string(
            r#"(method (public static) "LRa/tests/M;.f:(I)I" (
              (load-param v0)
              (const v1 5)
              (add-int v2 v0 v1)
              (return v2)
            ))"#,
        )
        .unwrap();
        let stats = allocate_method(m, &linear_scan()).unwrap();
        assert_eq!(stats.methods, 1);
        let code = m.code().unwrap();
        assert!(!code.cfg_built());
        assert_eq!(code.registers_size(), 3);
        check_legality("LRa/tests/M;.f:(I)I", &code).unwrap();
    }

    #[test]
    fn test_stats_reduce() {
        use crate::walk::Reducible;
        let mut a = AllocStats {
            methods: 1,
            spilled: 2,
            ..AllocStats::default()
        };
        a.reduce(AllocStats {
            methods: 1,
            coalesced: 3,
            ..AllocStats::default()
        });
        assert_eq!((a.methods, a.spilled, a.coalesced), (2, 2, 3));
    }
}
