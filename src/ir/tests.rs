//! Tests for the IR, the assembler and encoding selection.

#[cfg(test)]
#[allow(clippy::module_inception)]
mod tests {
    use crate::dex::DexMethodRef;
    use crate::ir::*;

    fn insns(code: &IRCode) -> Vec<IRInstruction> {
        code.instructions().cloned().collect()
    }

    #[test]
    fn test_assemble_straight_line() {
        let code = ircode_from_string(
            "(
              (load-param v0)
              (const v1 5)
              (add-int v2 v0 v1)
              (return v2)
            )",
        )
        .unwrap();
        assert_eq!(code.registers_size(), 3);
        assert_eq!(code.count_opcodes(), 3);
        assert_eq!(code.param_words(), 1);
        let all = insns(&code);
        assert_eq!(all[1].opcode(), IROpcode::Const);
        assert_eq!(all[1].literal(), Some(5));
        assert_eq!(all[2].srcs(), &[0, 1]);
        assert_eq!(all[2].dest(), Some(2));
    }

    #[test]
    fn test_wide_registers_size_frame() {
        let code = ircode_from_string(
            "((load-param-wide v0) (const-wide v2 7) (add-long v4 v0 v2) (return-wide v4))",
        )
        .unwrap();
        assert_eq!(code.registers_size(), 6);
        assert_eq!(code.param_words(), 2);
    }

    #[test]
    fn test_labels_become_targets() {
        let code = ircode_from_string(
            "(
              (load-param v0)
              (if-eqz v0 :zero)
              (const v1 1)
              (return v1)
              (:zero)
              (const v1 0)
              (return v1)
            )",
        )
        .unwrap();
        let list = code.list();
        let branch = list
            .iter()
            .find(|(_, e)| e.as_insn().is_some_and(|i| i.opcode() == IROpcode::IfEqz))
            .map(|(id, _)| id)
            .unwrap();
        let targets: Vec<_> = list
            .iter()
            .filter_map(|(_, e)| match e {
                MethodItemEntry::Target(t) => Some(*t),
                _ => None,
            })
            .collect();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].src, branch);
        assert_eq!(targets[0].kind, BranchTargetKind::Simple);
    }

    #[test]
    fn test_switch_cases_carry_keys() {
        let code = ircode_from_string(
            "(
              (load-param v0)
              (switch v0 (:a :b))
              (return-void)
              (:a 1)
              (return-void)
              (:b 7)
              (return-void)
            )",
        )
        .unwrap();
        let keys: Vec<_> = code
            .list()
            .iter()
            .filter_map(|(_, e)| match e {
                MethodItemEntry::Target(BranchTarget {
                    kind: BranchTargetKind::Multi(k),
                    ..
                }) => Some(*k),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec![1, 7]);
    }

    #[test]
    fn test_try_and_catch_are_linked() {
        let code = ircode_from_string(
            "(
              (load-param-object v0)
              (.try_start c0)
              (invoke-virtual (v0) \"Lir/tests/Try;.run:()V\")
              (.try_end c0)
              (return-void)
              (.catch (c0 c1) \"Ljava/lang/RuntimeException;\")
              (return-void)
              (.catch (c1))
              (return-void)
            )",
        )
        .unwrap();
        let list = code.list();
        let catches: Vec<_> = list
            .iter()
            .filter_map(|(id, e)| match e {
                MethodItemEntry::Catch(c) => Some((id, *c)),
                _ => None,
            })
            .collect();
        assert_eq!(catches.len(), 2);
        assert_eq!(catches[0].1.next, Some(catches[1].0));
        assert_eq!(catches[1].1.catch_type, None);
        for (_, e) in list.iter() {
            if let MethodItemEntry::Try(t) = e {
                assert_eq!(t.catch_start, catches[0].0);
            }
        }
        assert!(check_ir("Lir/tests/Try;.m", &code).is_ok());
    }

    #[test]
    fn test_printer_is_stable() {
        let input = "(
              (load-param v0)
              (.pos \"Lir/tests/P;.m:(I)V\" \"P.java\" 3)
              (.src_block \"Lir/tests/P;.m:(I)V\" 0 (1.0 0.5))
              (if-nez v0 :out)
              (const-string \"hi\")
              (move-result-pseudo-object v1)
              (:out)
              (return-void)
            )";
        let once = to_s_expr(ircode_from_string(input).unwrap().list());
        let twice = to_s_expr(ircode_from_string(&once).unwrap().list());
        assert_eq!(once, twice);
        assert!(once.contains("(const-string \"hi\")"));
        assert!(once.contains("(if-nez v0 :L0)"));
    }

    #[test]
    fn test_named_positions_keep_parents() {
        let code = ircode_from_string(
            "(
              (.pos:outer \"Lir/tests/Q;.a:()V\" \"Q.java\" 10)
              (.pos:inner \"Lir/tests/Q;.b:()V\" \"Q.java\" 20 outer)
              (return-void)
            )",
        )
        .unwrap();
        let positions: Vec<_> = code
            .list()
            .iter()
            .filter_map(|(_, e)| match e {
                MethodItemEntry::Position(p) => Some(p.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(positions[1].parent.as_ref().map(|p| p.line), Some(10));
        let printed = to_s_expr(code.list());
        assert!(printed.contains("(.pos:dbg0"));
        assert!(printed.contains("20 dbg0)"));
    }

    #[test]
    fn test_assembler_errors() {
        assert!(matches!(
            ircode_from_string("((goto :nowhere))"),
            Err(AssemblerError::UndefinedLabel(_))
        ));
        assert!(matches!(
            ircode_from_string("((frobnicate v0))"),
            Err(AssemblerError::UnknownOpcode(_))
        ));
        assert!(matches!(
            ircode_from_string("((const v0))"),
            Err(AssemblerError::BadOperand { .. })
        ));
        assert!(ircode_from_string("((return-void)").is_err());
    }

    #[test]
    fn test_method_from_string() {
        let m = method_from_string(
            "(method (public static) \"Lir/tests/M;.twice:(I)I\"
               ((load-param v0) (add-int v1 v0 v0) (return v1)))",
        )
        .unwrap();
        assert!(m.is_static());
        assert!(!m.is_virtual());
        assert_eq!(m.code().map(|c| c.count_opcodes()), Some(2));
    }

    #[test]
    fn test_default_encoding_folds_back() {
        for &op in IROpcode::ALL {
            if let Some(dex) = op.default_dex_opcode() {
                assert_eq!(IROpcode::from_dex(dex), op, "{}", op);
            } else {
                assert!(op.is_internal(), "{}", op);
            }
        }
    }

    #[test]
    fn test_every_dex_opcode_folds() {
        for &dex in DexOpcode::ALL {
            let op = IROpcode::from_dex(dex);
            assert!(!op.is_internal(), "{}", dex);
        }
        assert_eq!(
            IROpcode::from_dex(DexOpcode::AddLong2Addr),
            IROpcode::AddLong
        );
        assert_eq!(IROpcode::from_dex(DexOpcode::IgetChar), IROpcode::IgetChar);
        assert_eq!(IROpcode::from_dex(DexOpcode::IfLez), IROpcode::IfLez);
        assert_eq!(IROpcode::from_dex(DexOpcode::IntToShort), IROpcode::IntToShort);
    }

    #[test]
    fn test_format_widths() {
        assert_eq!(Format::F12x.dest_width(), Some(4));
        assert_eq!(Format::F22x.src_width(0), Some(16));
        assert_eq!(Format::F35c.src_width(4), Some(4));
        assert_eq!(Format::F35c.src_width(5), None);
        assert_eq!(Format::F3rc.src_width(200), Some(16));
        assert_eq!(Format::F22cS.tag(), "f22c_s");
        assert_eq!(DexOpcode::CheckCast.format(), Format::F21cS);
        assert_eq!(DexOpcode::from_byte(0x90), Some(DexOpcode::AddInt));
        assert_eq!(DexOpcode::from_byte(0x3e), None);
    }

    #[test]
    fn test_instruction_bit_widths() {
        let mv = IRInstruction::new(IROpcode::Move).with_dest(0).with_src(1);
        assert_eq!(mv.dest_bit_width(), 16);
        assert_eq!(mv.src_bit_width(0), 16);

        let small = IRInstruction::new(IROpcode::AddIntLit)
            .with_dest(0)
            .with_src(1)
            .with_literal(3);
        assert_eq!(small.dest_bit_width(), 8);
        let large = small.clone().with_literal(1000);
        assert_eq!(large.dest_bit_width(), 4);

        let inst = IRInstruction::new(IROpcode::InstanceOf).with_src(0);
        assert_eq!(pseudo_dest_bit_width(&inst), 4);
        assert_eq!(inst.src_bit_width(0), 4);
        let cast = IRInstruction::new(IROpcode::CheckCast).with_src(0);
        assert_eq!(pseudo_dest_bit_width(&cast), 8);
        assert_eq!(cast.src_bit_width(0), 8);
        let param = IRInstruction::new(IROpcode::LoadParamWide).with_dest(0);
        assert_eq!(param.dest_bit_width(), 16);
    }

    #[test]
    fn test_invoke_source_widths_follow_proto() {
        let m = DexMethodRef::make_from_descriptor("Lir/tests/W;.f:(JI)V").unwrap();
        let virt = IRInstruction::new(IROpcode::InvokeVirtual)
            .with_srcs([0, 1, 3])
            .with_method(m);
        assert!(!virt.src_is_wide(0));
        assert!(virt.src_is_wide(1));
        assert!(!virt.src_is_wide(2));
        assert_eq!(virt.src_words(), 4);
        let stat = IRInstruction::new(IROpcode::InvokeStatic)
            .with_srcs([0, 2])
            .with_method(m);
        assert!(stat.src_is_wide(0));
        assert_eq!(stat.src_words(), 3);
    }

    #[test]
    fn test_select_smallest_encoding() {
        let mv = |d, s| IRInstruction::new(IROpcode::Move).with_dest(d).with_src(s);
        assert_eq!(select_dex_opcode(&mv(1, 2)), Some(DexOpcode::Move));
        assert_eq!(select_dex_opcode(&mv(200, 2)), Some(DexOpcode::MoveFrom16));
        assert_eq!(select_dex_opcode(&mv(300, 2)), Some(DexOpcode::Move16));

        let c = |d, lit| IRInstruction::new(IROpcode::Const).with_dest(d).with_literal(lit);
        assert_eq!(select_dex_opcode(&c(0, 3)), Some(DexOpcode::Const4));
        assert_eq!(select_dex_opcode(&c(20, 3)), Some(DexOpcode::Const16));
        assert_eq!(select_dex_opcode(&c(0, 1000)), Some(DexOpcode::Const16));
        assert_eq!(select_dex_opcode(&c(0, 0x10000)), Some(DexOpcode::ConstHigh16));
        assert_eq!(select_dex_opcode(&c(0, 0x12345)), Some(DexOpcode::Const));
        assert_eq!(select_dex_opcode(&c(300, 1)), None);

        let add = |d, a, b| {
            IRInstruction::new(IROpcode::AddInt)
                .with_dest(d)
                .with_srcs([a, b])
        };
        assert_eq!(select_dex_opcode(&add(1, 1, 2)), Some(DexOpcode::AddInt2Addr));
        assert_eq!(select_dex_opcode(&add(1, 2, 3)), Some(DexOpcode::AddInt));
        assert_eq!(select_dex_opcode(&add(20, 20, 3)), Some(DexOpcode::AddInt));
        assert_eq!(select_dex_opcode(&add(256, 1, 2)), None);
    }

    #[test]
    fn test_select_range_invoke() {
        let m = DexMethodRef::make_from_descriptor("Lir/tests/R;.f:(IIIIII)V").unwrap();
        let contiguous = IRInstruction::new(IROpcode::InvokeStatic)
            .with_srcs(10..16)
            .with_method(m);
        assert_eq!(
            select_dex_opcode(&contiguous),
            Some(DexOpcode::InvokeStaticRange)
        );
        let scattered = IRInstruction::new(IROpcode::InvokeStatic)
            .with_srcs([0, 2, 4, 6, 8, 10])
            .with_method(m);
        assert_eq!(select_dex_opcode(&scattered), None);

        let small = DexMethodRef::make_from_descriptor("Lir/tests/R;.g:(II)V").unwrap();
        let high = IRInstruction::new(IROpcode::InvokeStatic)
            .with_srcs([20, 30])
            .with_method(small);
        assert_eq!(select_dex_opcode(&high), None);
        let low = IRInstruction::new(IROpcode::InvokeStatic)
            .with_srcs([2, 9])
            .with_method(small);
        assert_eq!(select_dex_opcode(&low), Some(DexOpcode::InvokeStatic));
    }

    #[test]
    fn test_check_cast_needs_same_register() {
        let cast = IRInstruction::new(IROpcode::CheckCast)
            .with_src(3)
            .with_type(crate::dex::DexType::make("Lir/tests/Cast;"));
        assert_eq!(
            select_dex_opcode_with_result(&cast, Some(3)),
            Some(DexOpcode::CheckCast)
        );
        assert_eq!(select_dex_opcode_with_result(&cast, Some(4)), None);
    }

    #[test]
    fn test_lower_folds_pseudo_results() {
        let code = ircode_from_string(
            "(
              (load-param-object v0)
              (instance-of v0 \"Lir/tests/L;\")
              (move-result-pseudo v1)
              (return v1)
            )",
        )
        .unwrap();
        let lowered = lower_code(&code).unwrap();
        let dex: Vec<_> = lowered
            .iter()
            .filter_map(|(_, e)| match e {
                MethodItemEntry::DexOpcode(d) => Some(d.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(dex.len(), 2);
        assert_eq!(dex[0].opcode, DexOpcode::InstanceOf);
        assert_eq!(dex[0].dest, Some(1));
        assert_eq!(dex[1].opcode, DexOpcode::Return);
    }

    #[test]
    fn test_checker_rejects_broken_bodies() {
        let missing_pseudo = ircode_from_string(
            "((load-param-object v0) (check-cast v0 \"Lir/tests/K;\") (return-void))",
        )
        .unwrap();
        assert!(check_ir("m", &missing_pseudo).is_err());

        let late_param =
            ircode_from_string("((const v0 0) (load-param v1) (return-void))").unwrap();
        let err = check_ir("Lir/tests/K;.late", &late_param).unwrap_err();
        assert_eq!(err.method, "Lir/tests/K;.late");
        assert!(err.insn.unwrap().contains("load-param"));

        let mut small_frame = ircode_from_string("((const v5 0) (return v5))").unwrap();
        small_frame.set_registers_size(5);
        assert!(check_ir("m", &small_frame).is_err());

        let stray_result = ircode_from_string("((move-result v0) (return v0))").unwrap();
        assert!(check_ir("m", &stray_result).is_err());
    }

    #[test]
    fn test_list_insert_and_remove() {
        let mut list = IRList::new();
        let a = list.push_back(MethodItemEntry::Opcode(IRInstruction::new(IROpcode::Nop)));
        let c = list.push_back(MethodItemEntry::Opcode(IRInstruction::new(IROpcode::ReturnVoid)));
        let b = list.insert_after(a, MethodItemEntry::Fallthrough);
        let z = list.push_front(MethodItemEntry::Fallthrough);
        assert_eq!(list.ids(), vec![z, a, b, c]);
        assert!(list.remove(b).is_some());
        assert!(list.remove(b).is_none());
        assert_eq!(list.next(a), Some(c));
        assert_eq!(list.prev(c), Some(a));
        assert_eq!(list.len(), 3);
        assert_eq!(list.remove_if(|e| matches!(e, MethodItemEntry::Fallthrough)), 1);
        assert_eq!(list.first(), Some(a));
        assert_eq!(list.last(), Some(c));
    }

    #[test]
    fn test_temps_grow_the_frame() {
        let mut code = ircode_from_string("((return-void))").unwrap();
        assert_eq!(code.registers_size(), 0);
        assert_eq!(code.allocate_temp(), 0);
        assert_eq!(code.allocate_wide_temp(), 1);
        assert_eq!(code.registers_size(), 3);
    }
}
