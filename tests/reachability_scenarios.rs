//! Reachability through the pass pipeline: keep rules, dispatch through
//! abstract classes, and the sweep invariants.

mod common;

use common::{abstract_foo, class, concrete_foo, ctor, def, main_creating, short_names, stores};
use dexopt::dex::{build_class_scope, DexClass, DexStoresVector, DexType, ACC_ABSTRACT, ACC_PUBLIC};
use dexopt::pass::{PassInfo, PassManager};
use dexopt::reachability::{compute_reachable_objects, sweep, IgnoreSets, ReachabilityOptions};
use dexopt::PipelineConfig;

const REFINED: &str = r#"
passes = ["RemoveUnreachablePass"]

[global]
jobs = 2

[RemoveUnreachablePass]
cfg_gathering_check_instantiable = true
cfg_gathering_check_instance_callable = true
"#;

fn run_pipeline(toml: &str, stores: &mut DexStoresVector) -> Vec<PassInfo> {
    let config = PipelineConfig::parse_toml(toml).unwrap();
    let mut mgr = PassManager::from_config(config).unwrap();
    mgr.run_passes(stores).unwrap()
}

fn ty_class(desc: &str) -> DexClass {
    DexType::make(desc).class().unwrap()
}

/// A (kept) with a root `m` calling into B, and C unreferenced.
fn keep_program(pkg: &str, instantiate_b: bool) -> DexStoresVector {
    let body = if instantiate_b {
        format!(
            r#"((new-instance "L{pkg}/B;") (move-result-pseudo-object v0) (invoke-static () "L{pkg}/B;.helper:()V") (return-void))"#
        )
    } else {
        format!(r#"((invoke-static () "L{pkg}/B;.helper:()V") (return-void))"#)
    };
    let a = class(
        &format!("L{}/A;", pkg),
        None,
        ACC_PUBLIC,
        &[format!("(method (public static) \"L{}/A;.m:()V\" {})", pkg, body)],
    );
    let b = class(
        &format!("L{}/B;", pkg),
        None,
        ACC_PUBLIC,
        &[format!("(method (public static) \"L{}/B;.helper:()V\" ((return-void)))", pkg)],
    );
    let c = class(
        &format!("L{}/C;", pkg),
        None,
        ACC_PUBLIC,
        &[format!("(method (public static) \"L{}/C;.f:()V\" ((return-void)))", pkg)],
    );
    a.rstate().set_root();
    def(&format!("L{}/A;.m:()V", pkg)).rstate().set_root();
    stores(vec![a, b, c])
}

#[test]
fn test_reachability_with_keep() {
    for (pkg, instantiate_b) in [("it/keep/plain", false), ("it/keep/new", true)] {
        let mut program = keep_program(pkg, instantiate_b);
        let (reachables, aspects) =
            compute_reachable_objects(&program, &IgnoreSets::default(), &ReachabilityOptions::default()).unwrap();
        let a = ty_class(&format!("L{}/A;", pkg));
        let b = ty_class(&format!("L{}/B;", pkg));
        assert_eq!(reachables.classes(), vec![a, b]);
        let mut expected = vec![a];
        if instantiate_b {
            expected.push(b);
        }
        assert_eq!(aspects.instantiable_types.iter().copied().collect::<Vec<_>>(), expected);

        let infos = run_pipeline(r#"passes = ["RemoveUnreachablePass"]"#, &mut program);
        assert_eq!(infos[0].metrics["classes_removed"], 1);
        assert_eq!(short_names(&build_class_scope(&program), pkg), vec!["A;", "B;"]);
    }
}

#[test]
fn test_flow_sensitive_callability() {
    let pkg = "it/callable";
    let base = "Lit/callable/Base;";
    let sub = "Lit/callable/Sub;";
    // Base declares an abstract method but is not flagged abstract, and
    // only its subclass is ever created.
    let base_cls = class(base, None, ACC_PUBLIC, &[ctor(base, None), abstract_foo(base)]);
    let sub_cls = class(sub, Some(base), ACC_PUBLIC, &[ctor(sub, Some(base)), concrete_foo(sub)]);
    let main = main_creating(pkg, sub, base);
    let mut program = stores(vec![base_cls, sub_cls, main]);
    assert!(!base_cls.is_abstract());

    let infos = run_pipeline(REFINED, &mut program);
    assert_eq!(infos[0].metrics["classes_removed"], 0);
    // Base and Main.
    assert_eq!(infos[0].metrics["classes_abstracted"], 2);
    let base_foo = def("Lit/callable/Base;.foo:()V");
    let sub_foo = def("Lit/callable/Sub;.foo:()V");
    assert!(base_cls.all_methods().contains(&base_foo));
    assert!(sub_cls.all_methods().contains(&sub_foo));
    assert!(sub_foo.has_code());
    assert!(base_cls.is_abstract());
    assert!(!sub_cls.is_abstract());
}

#[test]
fn test_abstract_override_in_the_middle() {
    let pkg = "it/override";
    let base = "Lit/override/Base;";
    let sub = "Lit/override/Sub;";
    let subsub = "Lit/override/SubSub;";
    let base_cls = class(base, None, ACC_PUBLIC, &[ctor(base, None), concrete_foo(base)]);
    let sub_cls = class(
        sub,
        Some(base),
        ACC_PUBLIC | ACC_ABSTRACT,
        &[ctor(sub, Some(base)), abstract_foo(sub)],
    );
    let subsub_cls = class(subsub, Some(sub), ACC_PUBLIC, &[ctor(subsub, Some(sub)), concrete_foo(subsub)]);
    let main = main_creating(pkg, subsub, base);
    let mut program = stores(vec![base_cls, sub_cls, subsub_cls, main]);

    run_pipeline(REFINED, &mut program);
    for cls in [base, sub, subsub] {
        let foo = def(&format!("{}.foo:()V", cls));
        assert!(ty_class(cls).all_methods().contains(&foo), "{} lost", foo);
    }
    assert!(!base_cls.is_abstract());
    assert!(sub_cls.is_abstract());
    assert!(!subsub_cls.is_abstract());
    assert!(def("Lit/override/SubSub;.foo:()V").has_code());
    assert!(def("Lit/override/Base;.foo:()V").has_code());
}

#[test]
fn test_marking_is_idempotent_and_sweeps_shrink() {
    let pkg = "it/inv";
    let mut program = keep_program(pkg, false);
    let options = ReachabilityOptions::default();
    let (first, _) = compute_reachable_objects(&program, &IgnoreSets::default(), &options).unwrap();
    let (second, _) = compute_reachable_objects(&program, &IgnoreSets::default(), &options).unwrap();
    assert_eq!(first.classes(), second.classes());
    assert_eq!(first.methods(), second.methods());
    assert_eq!(first.fields(), second.fields());

    let mut previous = build_class_scope(&program);
    for _ in 0..3 {
        let (reachables, _) = compute_reachable_objects(&program, &IgnoreSets::default(), &options).unwrap();
        sweep(&mut program, &reachables, true);
        let now = build_class_scope(&program);
        assert!(now.iter().all(|c| previous.contains(c)));
        previous = now;
    }
}

#[test]
fn test_pipeline_output_is_deterministic() {
    let toml = r#"
        passes = ["RemoveUnreachablePass", "RegAllocPass"]

        [global]
        jobs = 4
        legacy_order = false

        [RemoveUnreachablePass]
        cfg_gathering_check_instantiable = true
        cfg_gathering_check_instance_callable = true
        cfg_gathering_check_returning = true
    "#;
    let mut outputs = Vec::new();
    for pkg in ["it/det/one", "it/det/two"] {
        let base = format!("L{}/Base;", pkg);
        let sub = format!("L{}/Sub;", pkg);
        let mut classes = vec![
            class(&base, None, ACC_PUBLIC, &[ctor(&base, None), concrete_foo(&base)]),
            class(&sub, Some(&base), ACC_PUBLIC, &[ctor(&sub, Some(&base)), concrete_foo(&sub)]),
            main_creating(pkg, &sub, &base),
        ];
        for i in 0..8 {
            let name = format!("L{}/Unused{};", pkg, i);
            classes.push(class(&name, None, ACC_PUBLIC, &[ctor(&name, None)]));
        }
        let mut program = stores(classes);
        run_pipeline(toml, &mut program);
        let ordered = dexopt::dex::ordered_classes(&program, false);
        outputs.push(short_names(&ordered, pkg));
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], vec!["Base;", "Main;", "Sub;"]);
}
