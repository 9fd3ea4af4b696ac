//! End-to-end register allocation: frame layout, encodability and
//! unchanged behavior under both allocators.

mod common;

use common::interp::{run, Outcome};
use dexopt::ir::{ircode_from_string, lower_code, IRCode, IROpcode};
use dexopt::regalloc::{allocate, check_legality, AllocConfig};

const METHOD: &str = "Lit/regalloc/T;.m:()V";

const ADD_CONST: &str = "(
  (load-param v0)
  (const v1 5)
  (add-int v2 v0 v1)
  (return v2)
)";

const WIDE_ADD: &str = "(
  (load-param-wide v0)
  (const-wide v2 4294967296)
  (add-long v4 v0 v2)
  (return-wide v4)
)";

const SUM_BELOW: &str = "(
  (load-param v0)
  (const v1 0)
  (const v2 0)
  (:loop)
  (if-ge v2 v0 :end)
  (add-int v1 v1 v2)
  (add-int/lit v2 v2 1)
  (goto :loop)
  (:end)
  (return v1)
)";

fn configs() -> [AllocConfig; 2] {
    [
        AllocConfig::default(),
        AllocConfig {
            use_linear_scan: true,
            ..AllocConfig::default()
        },
    ]
}

fn allocated(src: &str, config: &AllocConfig) -> IRCode {
    let mut code = ircode_from_string(src).unwrap();
    code.build_cfg(true).unwrap();
    allocate(METHOD, &mut code, config).unwrap();
    code.clear_cfg();
    code
}

fn max_reg(code: &IRCode) -> u32 {
    code.instructions()
        .flat_map(|insn| insn.dest().into_iter().chain(insn.srcs().iter().copied()))
        .max()
        .unwrap_or(0)
}

/// Twenty values live at once, each consumed by a 4-bit `neg-int`. The
/// accumulator sits above the registers the negations write.
fn twenty_negations() -> String {
    let mut body = String::from("((load-param v0)\n(move v50 v0)\n");
    for i in 1..=20 {
        body.push_str(&format!("(const v{} {})\n", i, i));
    }
    for i in 1..=20 {
        body.push_str(&format!("(neg-int v{} v{})\n(add-int v50 v50 v{})\n", 20 + i, i, 20 + i));
    }
    body.push_str("(return v50))");
    body
}

fn assert_same_behavior(src: &str, inputs: &[&[i64]], configs: &[AllocConfig]) {
    let original = ircode_from_string(src).unwrap();
    for config in configs {
        let code = allocated(src, config);
        check_legality(METHOD, &code).unwrap();
        assert!(lower_code(&code).is_ok());
        for args in inputs {
            assert_eq!(
                run(&code, args),
                run(&original, args),
                "{:?} on {:?}",
                config,
                args
            );
        }
    }
}

#[test]
fn test_linear_scan_basic() {
    let config = AllocConfig {
        use_linear_scan: true,
        ..AllocConfig::default()
    };
    let code = allocated(ADD_CONST, &config);
    assert_eq!(code.registers_size(), 3);
    assert_eq!(code.get_param_instructions()[0].dest(), Some(2));
    assert!(max_reg(&code) < 16);
    assert_eq!(run(&code, &[37]), Ok(Outcome::Return(Some(42))));
    assert_same_behavior(ADD_CONST, &[&[0], &[-5], &[i32::MAX as i64]], &configs());
}

#[test]
fn test_wide_param_on_top() {
    for config in configs() {
        let code = allocated(WIDE_ADD, &config);
        let top = code.registers_size();
        assert_eq!(code.get_param_instructions()[0].dest(), Some(top - 2));
        assert!(max_reg(&code) < 16);
        let wide_regs: Vec<u32> = code
            .instructions()
            .filter(|insn| insn.dest_is_wide())
            .filter_map(|insn| insn.dest())
            .collect();
        assert!(wide_regs.iter().all(|r| r + 1 < top));
    }
    assert_same_behavior(WIDE_ADD, &[&[5], &[-1]], &configs());
    assert_eq!(
        run(&ircode_from_string(WIDE_ADD).unwrap(), &[5]),
        Ok(Outcome::Return(Some(4_294_967_301)))
    );
}

#[test]
fn test_many_live_values_stay_correct() {
    let src = twenty_negations();
    assert_eq!(
        run(&ircode_from_string(&src).unwrap(), &[1000]),
        Ok(Outcome::Return(Some(1000 - 210)))
    );
    // Linear scan never splits, so only the coloring allocator can fit
    // every operand into four bits here.
    let coloring = AllocConfig::default();
    assert_same_behavior(&src, &[&[0], &[1000], &[-7]], &[coloring]);
    let mut code = ircode_from_string(&src).unwrap();
    code.build_cfg(true).unwrap();
    let stats = allocate(METHOD, &mut code, &coloring).unwrap();
    code.clear_cfg();
    assert!(stats.spilled >= 4, "{:?}", stats);
    for insn in code.instructions().filter(|i| i.opcode() == IROpcode::NegInt) {
        assert!(insn.src(0) < 16 && insn.dest().unwrap() < 16, "{}", insn);
    }
}

#[test]
fn test_loop_keeps_behavior() {
    assert_same_behavior(SUM_BELOW, &[&[0], &[1], &[5], &[10]], &configs());
    assert_eq!(
        run(&ircode_from_string(SUM_BELOW).unwrap(), &[5]),
        Ok(Outcome::Return(Some(10)))
    );
}
