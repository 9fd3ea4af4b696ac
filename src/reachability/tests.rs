//! Tests for marking, the refinements and the sweeps.

#[cfg(test)]
#[allow(clippy::module_inception)]
mod tests {
    use std::collections::BTreeSet;

    use crate::dex::{
        build_class_scope, ClassCreator, DexAccessFlags, DexClass, DexMethod, DexMethodRef, DexStore,
        DexStoresVector, DexType, ACC_ABSTRACT, ACC_PUBLIC,
    };
    use crate::ir::{method_from_string, IROpcode};
    use crate::reachability::*;

    fn class(name: &str, sup: Option<&str>, access: DexAccessFlags, methods: &[&str]) -> DexClass {
        let mut creator = ClassCreator::new(DexType::make(name)).set_access(access);
        if let Some(s) = sup {
            creator = creator.set_super(DexType::make(s));
        }
        for m in methods {
            creator = creator.add_method(method_from_string(m).unwrap());
        }
        creator.create().unwrap()
    }

    fn stores(classes: Vec<DexClass>) -> DexStoresVector {
        let mut store = DexStore::new("classes");
        store.add_classes(classes);
        vec![store]
    }

    fn def(desc: &str) -> DexMethod {
        DexMethodRef::make_from_descriptor(desc).unwrap().as_def().unwrap()
    }

    fn ty_class(desc: &str) -> DexClass {
        DexType::make(desc).class().unwrap()
    }

    fn refined() -> ReachabilityOptions {
        ReachabilityOptions {
            cfg_gathering_check_instantiable: true,
            cfg_gathering_check_instance_callable: true,
            num_threads: 2,
            ..ReachabilityOptions::default()
        }
    }

    fn opcodes(m: DexMethod) -> Vec<IROpcode> {
        m.code().unwrap().instructions().map(|insn| insn.opcode()).collect()
    }

    /// A (kept) calls into B; C is never mentioned.
    fn unreferenced_class_program(pkg: &str, body: &str) -> DexStoresVector {
        let a = class(
            &format!("L{}/A;", pkg),
            None,
            ACC_PUBLIC,
            &[&format!("(method (public static) \"L{}/A;.main:()V\" ({}))", pkg, body)],
        );
        let b = class(
            &format!("L{}/B;", pkg),
            None,
            ACC_PUBLIC,
            &[
                &format!("(method (public static) \"L{}/B;.helper:()V\" ((return-void)))", pkg),
                &format!("(method (public static) \"L{}/B;.unused:()V\" ((return-void)))", pkg),
            ],
        );
        let c = class(
            &format!("L{}/C;", pkg),
            None,
            ACC_PUBLIC,
            &[&format!("(method (public static) \"L{}/C;.f:()V\" ((return-void)))", pkg)],
        );
        a.rstate().set_root();
        def(&format!("L{}/A;.main:()V", pkg)).rstate().set_root();
        stores(vec![a, b, c])
    }

    #[test]
    fn test_unreferenced_class_is_swept() {
        let mut stores = unreferenced_class_program(
            "reach/tests/keep",
            r#"(invoke-static () "Lreach/tests/keep/B;.helper:()V") (return-void)"#,
        );
        let (reachables, aspects) =
            compute_reachable_objects(&stores, &IgnoreSets::default(), &ReachabilityOptions::default()).unwrap();

        let a = ty_class("Lreach/tests/keep/A;");
        let b = ty_class("Lreach/tests/keep/B;");
        assert_eq!(reachables.classes(), vec![a, b]);
        assert!(reachables.marked_method(def("Lreach/tests/keep/B;.helper:()V")));
        assert!(!reachables.marked_method(def("Lreach/tests/keep/B;.unused:()V")));
        assert_eq!(aspects.instantiable_types, [a].into_iter().collect());

        let stats = sweep(&mut stores, &reachables, true);
        assert_eq!(stats.classes_removed, 1);
        assert_eq!(stats.methods_removed, 1);
        assert_eq!(build_class_scope(&stores), vec![a, b]);
        assert_eq!(b.all_methods(), vec![def("Lreach/tests/keep/B;.helper:()V")]);
    }

    #[test]
    fn test_new_instance_makes_class_instantiable() {
        let stores = unreferenced_class_program(
            "reach/tests/keepb",
            r#"(new-instance "Lreach/tests/keepb/B;") (move-result-pseudo-object v0) (return-void)"#,
        );
        let (_, aspects) =
            compute_reachable_objects(&stores, &IgnoreSets::default(), &ReachabilityOptions::default()).unwrap();
        let a = ty_class("Lreach/tests/keepb/A;");
        let b = ty_class("Lreach/tests/keepb/B;");
        assert_eq!(aspects.instantiable_types, [a, b].into_iter().collect());
        assert_eq!(aspects.directly_instantiable_types, [b].into_iter().collect());
    }

    #[test]
    fn test_public_members_survive_without_remove_pub() {
        let mut stores = unreferenced_class_program(
            "reach/tests/pub",
            r#"(invoke-static () "Lreach/tests/pub/B;.helper:()V") (return-void)"#,
        );
        let (reachables, _) =
            compute_reachable_objects(&stores, &IgnoreSets::default(), &ReachabilityOptions::default()).unwrap();
        let stats = sweep(&mut stores, &reachables, false);
        assert_eq!(stats.methods_removed, 0);
        assert_eq!(stats.classes_removed, 1);
        assert!(def("Lreach/tests/pub/B;.unused:()V").has_code());
    }

    fn ctor(cls: &str, sup: Option<&str>) -> String {
        match sup {
            Some(s) => format!(
                "(method (public constructor) \"{}.<init>:()V\" ((load-param-object v0) (invoke-direct (v0) \"{}.<init>:()V\") (return-void)))",
                cls, s
            ),
            None => format!(
                "(method (public constructor) \"{}.<init>:()V\" ((load-param-object v0) (return-void)))",
                cls
            ),
        }
    }

    fn concrete_foo(cls: &str) -> String {
        format!("(method (public) \"{}.foo:()V\" ((load-param-object v0) (return-void)))", cls)
    }

    fn abstract_foo(cls: &str) -> String {
        format!("(method (public abstract) \"{}.foo:()V\")", cls)
    }

    fn main_creating(pkg: &str, created: &str, called: &str) -> DexClass {
        let body = format!(
            r#"(method (public static) "L{pkg}/Main;.run:()V" (
              (new-instance "{created}")
              (move-result-pseudo-object v0)
              (invoke-direct (v0) "{created}.<init>:()V")
              (invoke-virtual (v0) "{called}.foo:()V")
              (return-void)
            ))"#,
            pkg = pkg,
            created = created,
            called = called,
        );
        let main = class(&format!("L{}/Main;", pkg), None, ACC_PUBLIC, &[&body]);
        def(&format!("L{}/Main;.run:()V", pkg)).rstate().set_root();
        main
    }

    #[test]
    fn test_abstract_dispatch_reaches_implementation() {
        let base = "Lreach/tests/callable/Base;";
        let sub = "Lreach/tests/callable/Sub;";
        let base_cls = class(base, None, ACC_PUBLIC | ACC_ABSTRACT, &[&ctor(base, None), &abstract_foo(base)]);
        let sub_cls = class(sub, Some(base), ACC_PUBLIC, &[&ctor(sub, Some(base)), &concrete_foo(sub)]);
        let main = main_creating("reach/tests/callable", sub, base);
        let stores = stores(vec![base_cls, sub_cls, main]);

        let (reachables, aspects) = compute_reachable_objects(&stores, &IgnoreSets::default(), &refined()).unwrap();
        let base_foo = def("Lreach/tests/callable/Base;.foo:()V");
        let sub_foo = def("Lreach/tests/callable/Sub;.foo:()V");
        assert!(reachables.marked_method(base_foo));
        assert!(reachables.marked_method(sub_foo));
        assert!(aspects.callable_instance_methods.contains(&sub_foo));
        assert!(!aspects.callable_instance_methods.contains(&base_foo));
        assert!(aspects.is_instantiable(sub_cls));
        assert!(aspects.invoked_virtual_bases.contains(&base_foo));

        let abstracted = mark_classes_abstract(&stores, &reachables, &aspects);
        assert_eq!(abstracted, [main].into_iter().collect());
        assert!(base_cls.is_abstract());
        assert!(!sub_cls.is_abstract());
        assert_eq!(sweep_uncallable_virtual_methods(&stores, &aspects), UncallableStats::default());
    }

    #[test]
    fn test_dispatch_keeps_every_override() {
        let base = "Lreach/tests/override/Base;";
        let sub = "Lreach/tests/override/Sub;";
        let subsub = "Lreach/tests/override/SubSub;";
        let base_cls = class(base, None, ACC_PUBLIC, &[&ctor(base, None), &concrete_foo(base)]);
        let sub_cls = class(sub, Some(base), ACC_PUBLIC | ACC_ABSTRACT, &[&ctor(sub, Some(base)), &abstract_foo(sub)]);
        let subsub_cls = class(subsub, Some(sub), ACC_PUBLIC, &[&ctor(subsub, Some(sub)), &concrete_foo(subsub)]);
        let main = main_creating("reach/tests/override", subsub, base);
        let mut stores = stores(vec![base_cls, sub_cls, subsub_cls, main]);

        let (reachables, aspects) = compute_reachable_objects(&stores, &IgnoreSets::default(), &refined()).unwrap();
        let foos = [
            def("Lreach/tests/override/Base;.foo:()V"),
            def("Lreach/tests/override/Sub;.foo:()V"),
            def("Lreach/tests/override/SubSub;.foo:()V"),
        ];
        for foo in foos {
            assert!(reachables.marked_method(foo), "{} not marked", foo);
        }
        assert!(aspects.callable_instance_methods.contains(&foos[0]));
        assert!(aspects.callable_instance_methods.contains(&foos[2]));

        sweep(&mut stores, &reachables, true);
        mark_classes_abstract(&stores, &reachables, &aspects);
        assert!(!base_cls.is_abstract());
        assert!(sub_cls.is_abstract());
        assert!(!subsub_cls.is_abstract());
        for foo in foos {
            assert!(foo.class_type().class().unwrap().all_methods().contains(&foo));
        }
        assert!(foos[0].has_code() && foos[2].has_code());
    }

    fn widget_program(pkg: &str) -> (DexStoresVector, DexMethod) {
        let widget = format!("L{}/Widget;", pkg);
        let helper = format!("L{}/Helper;", pkg);
        let draw = format!(
            "(method (public) \"{w}.draw:()V\" ((load-param-object v0) (invoke-static () \"{h}.h:()V\") (return-void)))",
            w = widget,
            h = helper
        );
        let widget_cls = class(&widget, None, ACC_PUBLIC, &[&ctor(&widget, None), &draw]);
        let helper_cls = class(
            &helper,
            None,
            ACC_PUBLIC,
            &[&format!("(method (public static) \"{}.h:()V\" ((return-void)))", helper)],
        );
        let run = format!(
            "(method (public static) \"L{pkg}/Main;.run:({w})V\" ((load-param-object v0) (invoke-virtual (v0) \"{w}.draw:()V\") (return-void)))",
            pkg = pkg,
            w = widget
        );
        let main = class(&format!("L{}/Main;", pkg), None, ACC_PUBLIC, &[&run]);
        let run_def = def(&format!("L{}/Main;.run:({})V", pkg, widget));
        run_def.rstate().set_root();
        (stores(vec![widget_cls, helper_cls, main]), def(&format!("{}.draw:()V", widget)))
    }

    #[test]
    fn test_uncallable_body_is_not_walked() {
        let (stores, draw) = widget_program("reach/tests/unc");
        let (reachables, aspects) = compute_reachable_objects(&stores, &IgnoreSets::default(), &refined()).unwrap();
        assert!(reachables.marked_method(draw));
        assert!(!aspects.is_callable(draw));
        assert!(!reachables.marked_class(ty_class("Lreach/tests/unc/Helper;")));
        assert!(aspects
            .uninstantiable_dependencies
            .contains(&ty_class("Lreach/tests/unc/Widget;")));

        let stats = sweep_uncallable_virtual_methods(&stores, &aspects);
        assert_eq!(stats.throw_bodies, 1);
        assert_eq!(
            opcodes(draw),
            vec![IROpcode::LoadParamObject, IROpcode::Const, IROpcode::Throw]
        );
    }

    #[test]
    fn test_uncallable_in_abstracted_class_becomes_abstract() {
        let (stores, draw) = widget_program("reach/tests/unc2");
        let (reachables, aspects) = compute_reachable_objects(&stores, &IgnoreSets::default(), &refined()).unwrap();
        let abstracted = mark_classes_abstract(&stores, &reachables, &aspects);
        assert!(abstracted.contains(&ty_class("Lreach/tests/unc2/Widget;")));
        let stats = sweep_uncallable_virtual_methods(&stores, &aspects);
        assert_eq!(stats.abstracted, 1);
        assert!(draw.is_abstract());
        assert!(!draw.has_code());
    }

    #[test]
    fn test_sweep_code_folds_uninstantiable_types() {
        let ghost = "Lreach/tests/sc/Ghost;";
        let ghost_cls = class(ghost, None, ACC_PUBLIC, &[&ctor(ghost, None)]);
        let field = crate::dex::DexFieldRef::make_from_descriptor("Lreach/tests/sc/Ghost;.f:I").unwrap();
        ghost_cls.add_field(field.make_concrete(ACC_PUBLIC, None));
        let is_ghost = r#"(method (public static) "Lreach/tests/sc/Main;.isGhost:(Ljava/lang/Object;)Z" (
          (load-param-object v0)
          (instance-of v0 "Lreach/tests/sc/Ghost;")
          (move-result-pseudo v1)
          (return v1)
        ))"#;
        let get = r#"(method (public static) "Lreach/tests/sc/Main;.get:(Lreach/tests/sc/Ghost;)I" (
          (load-param-object v0)
          (iget v0 "Lreach/tests/sc/Ghost;.f:I")
          (move-result-pseudo v1)
          (return v1)
        ))"#;
        let main = class("Lreach/tests/sc/Main;", None, ACC_PUBLIC, &[is_ghost, get]);
        let is_ghost = def("Lreach/tests/sc/Main;.isGhost:(Ljava/lang/Object;)Z");
        let get = def("Lreach/tests/sc/Main;.get:(Lreach/tests/sc/Ghost;)I");
        is_ghost.rstate().set_root();
        get.rstate().set_root();
        let stores = stores(vec![ghost_cls, main]);

        let options = refined();
        let (reachables, aspects) = compute_reachable_objects(&stores, &IgnoreSets::default(), &options).unwrap();
        assert!(reachables.marked_class(ghost_cls));
        assert!(!aspects.is_instantiable(ghost_cls));

        let stats = sweep_code(&stores, &options, &aspects);
        assert_eq!(stats.instance_ofs, 1);
        assert_eq!(stats.instance_accesses, 1);
        assert_eq!(
            opcodes(is_ghost),
            vec![IROpcode::LoadParamObject, IROpcode::Const, IROpcode::Return]
        );
        let get_ops = opcodes(get);
        assert!(get_ops.ends_with(&[IROpcode::Const, IROpcode::Throw]));
        assert!(!get_ops.contains(&IROpcode::Return));

        assert_eq!(sweep_code(&stores, &options, &aspects), SweepCodeStats::default());
    }

    #[test]
    fn test_call_to_non_returning_method_is_cut() {
        let util = class(
            "Lreach/tests/ret/Util;",
            None,
            ACC_PUBLIC,
            &[r#"(method (public static) "Lreach/tests/ret/Util;.fail:()V" ((const v0 0) (throw v0)))"#],
        );
        let main = class(
            "Lreach/tests/ret/Main;",
            None,
            ACC_PUBLIC,
            &[r#"(method (public static) "Lreach/tests/ret/Main;.run:()I" (
              (invoke-static () "Lreach/tests/ret/Util;.fail:()V")
              (const v0 1)
              (return v0)
            ))"#],
        );
        let run = def("Lreach/tests/ret/Main;.run:()I");
        let fail = def("Lreach/tests/ret/Util;.fail:()V");
        run.rstate().set_root();
        let stores = stores(vec![util, main]);

        let options = ReachabilityOptions {
            cfg_gathering_check_returning: true,
            ..ReachabilityOptions::default()
        };
        let (_, aspects) = compute_reachable_objects(&stores, &IgnoreSets::default(), &options).unwrap();
        assert!(!aspects.is_returning(fail));
        assert!(!aspects.is_returning(run));

        let stats = sweep_code(&stores, &options, &aspects);
        assert_eq!(stats.non_returning_invokes, 1);
        assert_eq!(
            opcodes(run),
            vec![IROpcode::InvokeStatic, IROpcode::Const, IROpcode::Throw]
        );
        assert_eq!(sweep_code(&stores, &options, &aspects).non_returning_invokes, 0);
    }

    #[test]
    fn test_closure_is_idempotent_and_sweep_monotone() {
        let mut stores = unreferenced_class_program(
            "reach/tests/idem",
            r#"(invoke-static () "Lreach/tests/idem/B;.helper:()V") (return-void)"#,
        );
        let options = ReachabilityOptions::default();
        let (first, first_aspects) = compute_reachable_objects(&stores, &IgnoreSets::default(), &options).unwrap();
        let (again, again_aspects) = compute_reachable_objects(&stores, &IgnoreSets::default(), &options).unwrap();
        assert_eq!(first.classes(), again.classes());
        assert_eq!(first.methods(), again.methods());
        assert_eq!(first_aspects, again_aspects);

        let before: BTreeSet<DexClass> = build_class_scope(&stores).into_iter().collect();
        sweep(&mut stores, &first, true);
        let after: BTreeSet<DexClass> = build_class_scope(&stores).into_iter().collect();
        assert!(after.is_subset(&before));

        let (second, _) = compute_reachable_objects(&stores, &IgnoreSets::default(), &options).unwrap();
        assert_eq!(second.classes(), first.classes());
        assert_eq!(second.methods(), first.methods());
        assert_eq!(sweep(&mut stores, &second, true), SweepStats::default());
    }

    #[test]
    fn test_thread_count_does_not_change_result() {
        let base = "Lreach/tests/det/Base;";
        let sub = "Lreach/tests/det/Sub;";
        let base_cls = class(base, None, ACC_PUBLIC, &[&ctor(base, None), &concrete_foo(base)]);
        let sub_cls = class(sub, Some(base), ACC_PUBLIC, &[&ctor(sub, Some(base)), &concrete_foo(sub)]);
        let main = main_creating("reach/tests/det", sub, base);
        let stores = stores(vec![base_cls, sub_cls, main]);

        let single = ReachabilityOptions {
            num_threads: 1,
            ..refined()
        };
        let many = ReachabilityOptions {
            num_threads: 4,
            ..refined()
        };
        let (r1, a1) = compute_reachable_objects(&stores, &IgnoreSets::default(), &single).unwrap();
        let (r2, a2) = compute_reachable_objects(&stores, &IgnoreSets::default(), &many).unwrap();
        assert_eq!(r1.classes(), r2.classes());
        assert_eq!(r1.methods(), r2.methods());
        assert_eq!(r1.fields(), r2.fields());
        assert_eq!(a1, a2);
    }

    #[test]
    fn test_graph_explains_marking() {
        let stores = unreferenced_class_program(
            "reach/tests/why",
            r#"(invoke-static () "Lreach/tests/why/B;.helper:()V") (return-void)"#,
        );
        let options = ReachabilityOptions {
            record_graph: true,
            ..ReachabilityOptions::default()
        };
        let (reachables, _) = compute_reachable_objects(&stores, &IgnoreSets::default(), &options).unwrap();
        let b = ReachableObject::Class(ty_class("Lreach/tests/why/B;"));
        let path = reachables.explain(b).unwrap();
        assert_eq!(
            path,
            vec![
                b,
                ReachableObject::Method(def("Lreach/tests/why/B;.helper:()V")),
                ReachableObject::Method(def("Lreach/tests/why/A;.main:()V")),
                ReachableObject::Seed,
            ]
        );
        assert!(reachables.graph().unwrap().dump().contains("CLASS Lreach/tests/why/B; <-"));
    }

    #[test]
    fn test_root_annotation_keeps_class() {
        use crate::dex::{AnnotationVisibility, DexAnnotation, DexAnnotationSet};
        let keep = DexType::make("Lreach/tests/anno/Keep;");
        let mut annos = DexAnnotationSet::new();
        annos.add(DexAnnotation::new(keep, AnnotationVisibility::Build));
        let kept = ClassCreator::new(DexType::make("Lreach/tests/anno/Kept;"))
            .set_access(ACC_PUBLIC)
            .set_annotations(annos)
            .create()
            .unwrap();
        let other = class("Lreach/tests/anno/Other;", None, ACC_PUBLIC, &[]);
        let stores = stores(vec![kept, other]);
        let options = ReachabilityOptions {
            root_annotations: [keep].into_iter().collect(),
            ..ReachabilityOptions::default()
        };
        let (reachables, _) = compute_reachable_objects(&stores, &IgnoreSets::default(), &options).unwrap();
        assert_eq!(reachables.classes(), vec![kept]);
    }
}
