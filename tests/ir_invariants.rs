//! Interning, body well-formedness and CFG round trips over a handful of
//! representative method shapes.

mod common;

use dexopt::cfg::{BlockId, ControlFlowGraph};
use dexopt::dex::{DexMethodRef, DexProto, DexString, DexType, DexTypeList};
use dexopt::ir::{check_ir, ircode_from_string, to_s_expr};

const PROGRAMS: &[&str] = &[
    "((load-param v0) (const v1 5) (add-int v2 v0 v1) (return v2))",
    "(
      (load-param v0)
      (if-eqz v0 :zero)
      (const v1 1)
      (goto :out)
      (:zero)
      (const v1 2)
      (:out)
      (return v1)
    )",
    "(
      (load-param v0)
      (switch v0 (:a :b))
      (const v1 0)
      (return v1)
      (:a 1)
      (const v1 10)
      (return v1)
      (:b 2)
      (const v1 20)
      (return v1)
    )",
    "(
      (load-param-object v0)
      (.try_start c0)
      (invoke-virtual (v0) \"Lit/inv/T;.a:()V\")
      (invoke-virtual (v0) \"Lit/inv/T;.b:()V\")
      (.try_end c0)
      (return-void)
      (.catch (c0) \"Ljava/lang/RuntimeException;\")
      (move-exception v1)
      (throw v1)
    )",
    "(
      (load-param-object v0)
      (.try_start c0)
      (check-cast v0 \"Lit/inv/Cast;\")
      (move-result-pseudo-object v1)
      (.try_end c0)
      (return-object v1)
      (.catch (c0))
      (const v2 0)
      (return-object v2)
    )",
    "(
      (load-param v0)
      (const v1 0)
      (:loop)
      (if-ge v1 v0 :end)
      (add-int/lit v1 v1 1)
      (goto :loop)
      (:end)
      (return v1)
    )",
];

/// Instructions of a block, which identify it independently of layout.
fn signature(cfg: &ControlFlowGraph, b: BlockId) -> Vec<String> {
    cfg.block(b)
        .map(|blk| blk.instructions().map(|(_, insn)| insn.to_string()).collect())
        .unwrap_or_default()
}

/// Blocks and edges named by block contents, sorted, so two graphs compare
/// equal exactly when they match up to block numbering and layout.
fn canonical(cfg: &ControlFlowGraph) -> (Vec<Vec<String>>, Vec<String>) {
    let mut blocks: Vec<Vec<String>> = cfg.block_ids().into_iter().map(|b| signature(cfg, b)).collect();
    blocks.sort();
    let mut edges: Vec<String> = cfg
        .edges()
        .map(|e| {
            format!(
                "{:?} -{:?}:{:?}-> {:?}",
                signature(cfg, e.src()),
                e.kind(),
                e.case_key(),
                signature(cfg, e.target())
            )
        })
        .collect();
    edges.sort();
    (blocks, edges)
}

#[test]
fn test_interning_is_stable() {
    let s = DexString::make("it/invariants/hello");
    assert_eq!(s, DexString::make("it/invariants/hello"));
    assert_eq!(DexString::get("it/invariants/hello"), Some(s));

    let ty = DexType::make("Lit/invariants/T;");
    assert_eq!(DexType::get("Lit/invariants/T;"), Some(ty));
    let proto = DexProto::make(DexType::make("V"), DexTypeList::make(vec![ty]));
    assert_eq!(proto, DexProto::make(DexType::make("V"), DexTypeList::make(vec![ty])));

    let m = DexMethodRef::make_from_descriptor("Lit/invariants/T;.m:(Lit/invariants/T;)V").unwrap();
    assert_eq!(
        m,
        DexMethodRef::make_from_descriptor("Lit/invariants/T;.m:(Lit/invariants/T;)V").unwrap()
    );
    assert_eq!(m.proto(), proto);
}

#[test]
fn test_parsed_bodies_are_well_formed() {
    for src in PROGRAMS {
        let code = ircode_from_string(src).unwrap();
        check_ir("Lit/inv/T;.m:()V", &code).unwrap();
    }
}

#[test]
fn test_cfg_round_trip() {
    for src in PROGRAMS {
        let code = ircode_from_string(src).unwrap();
        let first = ControlFlowGraph::build(code.list(), true).unwrap();
        let linear = first.linearize();
        let second = ControlFlowGraph::build(&linear, true).unwrap();
        assert_eq!(first.num_blocks(), second.num_blocks(), "{}", src);
        assert_eq!(first.num_edges(), second.num_edges(), "{}", src);
        assert_eq!(canonical(&first), canonical(&second), "{}", src);
        assert_eq!(to_s_expr(&second.linearize()), to_s_expr(&linear));
    }
}

#[test]
fn test_clear_cfg_keeps_body_checkable() {
    for src in PROGRAMS {
        let mut code = ircode_from_string(src).unwrap();
        code.build_cfg(true).unwrap();
        code.clear_cfg();
        check_ir("Lit/inv/T;.m:()V", &code).unwrap();
        code.build_cfg(false).unwrap();
        code.clear_cfg();
        check_ir("Lit/inv/T;.m:()V", &code).unwrap();
    }
}
