//! Tests for the pass pipeline.

#[cfg(test)]
#[allow(clippy::module_inception)]
mod tests {
    use std::collections::BTreeSet;

    use crate::config::{ConfigError, PipelineConfig};
    use crate::dex::{ClassCreator, DexClass, DexMethodRef, DexStore, DexStoresVector, DexType, ACC_PUBLIC};
    use crate::ir::method_from_string;
    use crate::method_override_graph::Graph;
    use crate::pass::property::{apply_interactions, interactions, verify_pipeline};
    use crate::pass::registry::{base_name, is_registered};
    use crate::pass::*;
    use crate::regalloc::check_legality;

    #[derive(Default)]
    struct CountingPass {
        interactions: PropertyInteractions,
        fail: bool,
        keeps_graph: bool,
    }

    impl Pass for CountingPass {
        fn name(&self) -> &str {
            "CountingPass"
        }

        fn get_property_interactions(&self) -> PropertyInteractions {
            self.interactions.clone()
        }

        fn preserved_analyses(&self) -> Vec<std::any::TypeId> {
            if self.keeps_graph {
                vec![std::any::TypeId::of::<Graph>()]
            } else {
                Vec::new()
            }
        }

        fn run_pass(
            &mut self,
            _stores: &mut DexStoresVector,
            _config: &PipelineConfig,
            mgr: &mut PassManager,
        ) -> PassResult<()> {
            mgr.incr_metric("runs", 1);
            mgr.incr_metric("runs", 1);
            let saw_graph = mgr.get_analysis::<Graph>().is_some();
            mgr.set_metric("saw_graph", saw_graph as i64);
            if self.fail {
                return Err(PassError::Io(std::io::Error::other("pass failure")));
            }
            Ok(())
        }
    }

    fn counting(instance: &str) -> (String, Box<dyn Pass>) {
        (instance.to_string(), Box::new(CountingPass::default()))
    }

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.global.jobs = 2;
        config
    }

    fn class(name: &str, methods: &[&str]) -> DexClass {
        let mut creator = ClassCreator::new(DexType::make(name)).set_access(ACC_PUBLIC);
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

    fn one_method_program(pkg: &str) -> DexStoresVector {
        stores(vec![class(
            &format!("L{}/A;", pkg),
            &[&format!(
                "(method (public static) \"L{}/A;.f:()I\" ((const v0 1) (return v0)))",
                pkg
            )],
        )])
    }

    #[test]
    fn test_interactions_update_established_set() {
        let before = PropertyName::initial();
        let after = apply_interactions(
            &before,
            &interactions([
                (PropertyName::HasSourceBlocks, Interaction::Establishes),
                (PropertyName::NoInitClassInstructions, Interaction::Destroys),
            ]),
        );
        assert!(after.contains(&PropertyName::HasSourceBlocks));
        assert!(!after.contains(&PropertyName::NoInitClassInstructions));
        // Unmentioned: positive ones are destroyed, negative ones survive.
        assert!(!after.contains(&PropertyName::DexLimitsObeyed));
        assert!(after.contains(&PropertyName::NoWriteBarrierInstructions));
        assert!(after.contains(&PropertyName::NoUnreachableInstructions));

        let kept = apply_interactions(
            &before,
            &interactions([(PropertyName::DexLimitsObeyed, Interaction::Requires)]),
        );
        assert!(kept.contains(&PropertyName::DexLimitsObeyed));
    }

    #[test]
    fn test_verify_pipeline() {
        let needs_blocks = interactions([(PropertyName::HasSourceBlocks, Interaction::Requires)]);
        let adds_blocks = interactions([(PropertyName::HasSourceBlocks, Interaction::Establishes)]);
        let err = verify_pipeline(&[("Late".to_string(), needs_blocks.clone())]).unwrap_err();
        assert!(matches!(
            err,
            PassError::UnsatisfiedRequirement { ref pass, property: PropertyName::HasSourceBlocks } if pass == "Late"
        ));
        let states = verify_pipeline(&[
            ("Early".to_string(), adds_blocks),
            ("Late".to_string(), needs_blocks),
        ])
        .unwrap();
        assert_eq!(states.len(), 2);
        assert!(states[1].contains(&PropertyName::HasSourceBlocks));
    }

    #[test]
    fn test_property_names() {
        for p in PropertyName::ALL {
            assert_eq!(PropertyName::from_name(p.as_str()), Some(p));
        }
        assert_eq!(PropertyName::from_name("Sparkles"), None);
        assert_eq!(PropertyName::RegistersAllocated.to_string(), "RegistersAllocated");
    }

    #[test]
    fn test_registry() {
        let names = registered_passes();
        for builtin in ["MethodOverrideGraphAnalysisPass", "RegAllocPass", "RemoveUnreachablePass"] {
            assert!(names.iter().any(|n| n == builtin));
        }
        assert_eq!(base_name("RegAllocPass#final"), "RegAllocPass");
        assert_eq!(create_pass("RegAllocPass#final").unwrap().name(), "RegAllocPass");
        assert!(create_pass("NoSuchPass").is_none());

        assert!(register_pass("RegistryTestPass", || Box::new(CountingPass::default())));
        assert!(!register_pass("RegistryTestPass", || Box::new(CountingPass::default())));
        assert!(is_registered("RegistryTestPass#alias"));
    }

    #[test]
    fn test_unknown_pass_in_pipeline() {
        let config = PipelineConfig::new(["RegAllocPass", "Frobnicate"]);
        let err = PassManager::from_config(config).unwrap_err();
        assert!(matches!(err, PassError::UnknownPass(ref n) if n == "Frobnicate"));
    }

    #[test]
    fn test_option_binding() {
        let mut config = PipelineConfig::new(["RegAllocPass", "RegAllocPass#final"]);
        config.set_pass_option("RegAllocPass#final", "use_linear_scan", true);
        let mgr = PassManager::from_config(config.clone()).unwrap();
        let docs = mgr.options_doc("RegAllocPass").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name, "use_linear_scan");

        config.set_pass_option("RegAllocPass", "max_spill_rounds", "many");
        let err = PassManager::from_config(config).unwrap_err();
        assert!(matches!(err, PassError::Config(ConfigError::Type { .. })));
    }

    #[test]
    fn test_analysis_is_invalidated_by_later_pass() {
        let passes = vec![
            (
                "MethodOverrideGraphAnalysisPass".to_string(),
                create_pass("MethodOverrideGraphAnalysisPass").unwrap(),
            ),
            counting("CountingPass"),
            counting("CountingPass#again"),
        ];
        let mut mgr = PassManager::with_passes(passes, config()).unwrap();
        let mut stores = one_method_program("pass/tests/analysis");
        let infos = mgr.run_passes(&mut stores).unwrap();

        assert_eq!(infos.len(), 3);
        assert!(infos[0].metrics.contains_key("nodes"));
        assert_eq!(infos[1].metrics["saw_graph"], 1);
        assert_eq!(infos[1].metrics["runs"], 2);
        assert_eq!(infos[2].metrics["saw_graph"], 0);
        assert_eq!((infos[1].repeat, infos[2].repeat), (0, 1));
        assert_eq!(infos[2].name, "CountingPass#again");
        assert_eq!(infos[2].order, 2);
    }

    #[test]
    fn test_preserved_analysis_survives_pass() {
        let keeper: Box<dyn Pass> = Box::new(CountingPass {
            keeps_graph: true,
            ..CountingPass::default()
        });
        let passes = vec![
            (
                "MethodOverrideGraphAnalysisPass".to_string(),
                create_pass("MethodOverrideGraphAnalysisPass").unwrap(),
            ),
            ("CountingPass#keep".to_string(), keeper),
            counting("CountingPass#after"),
            counting("CountingPass#last"),
        ];
        let mut mgr = PassManager::with_passes(passes, config()).unwrap();
        let mut stores = one_method_program("pass/tests/preserve");
        let infos = mgr.run_passes(&mut stores).unwrap();
        let saw: Vec<i64> = infos[1..].iter().map(|i| i.metrics["saw_graph"]).collect();
        assert_eq!(saw, vec![1, 1, 0]);
    }

    #[test]
    fn test_second_run_starts_fresh() {
        let passes = vec![
            (
                "MethodOverrideGraphAnalysisPass".to_string(),
                create_pass("MethodOverrideGraphAnalysisPass").unwrap(),
            ),
            counting("CountingPass"),
        ];
        let mut mgr = PassManager::with_passes(passes, config()).unwrap();
        let mut stores = one_method_program("pass/tests/rerun");
        let first = mgr.run_passes(&mut stores).unwrap();
        let second = mgr.run_passes(&mut stores).unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(mgr.pass_infos().len(), 2);
        assert_eq!(second[1].metrics["runs"], 2);
        assert_eq!(second[1].metrics["saw_graph"], 1);
        assert_eq!(
            first.iter().map(|i| (&i.name, i.order)).collect::<Vec<_>>(),
            second.iter().map(|i| (&i.name, i.order)).collect::<Vec<_>>()
        );
        assert!(mgr.get_analysis::<Graph>().is_none());
    }

    #[test]
    fn test_failing_pass_aborts_run() {
        let failing: Box<dyn Pass> = Box::new(CountingPass {
            fail: true,
            ..CountingPass::default()
        });
        let passes = vec![("CountingPass#bad".to_string(), failing), counting("CountingPass")];
        let mut mgr = PassManager::with_passes(passes, config()).unwrap();
        let mut stores = one_method_program("pass/tests/fail");
        let err = mgr.run_passes(&mut stores).unwrap_err();
        assert!(matches!(err, PassError::PassFailed { ref pass, .. } if pass == "CountingPass#bad"));
        assert_eq!(mgr.pass_infos().len(), 1);
    }

    #[test]
    fn test_unsatisfied_requirement_is_reported_before_running() {
        let needy: Box<dyn Pass> = Box::new(CountingPass {
            interactions: interactions([(PropertyName::HasSourceBlocks, Interaction::Requires)]),
            ..CountingPass::default()
        });
        let mut mgr = PassManager::with_passes(vec![("CountingPass".to_string(), needy)], config()).unwrap();
        let mut stores = one_method_program("pass/tests/unsat");
        assert!(matches!(
            mgr.run_passes(&mut stores),
            Err(PassError::UnsatisfiedRequirement { .. })
        ));
        assert!(mgr.pass_infos().is_empty());
    }

    #[test]
    fn test_false_property_claim_is_caught() {
        let liar: Box<dyn Pass> = Box::new(CountingPass {
            interactions: interactions([(PropertyName::HasSourceBlocks, Interaction::Establishes)]),
            ..CountingPass::default()
        });
        let mut mgr = PassManager::with_passes(vec![("CountingPass".to_string(), liar)], config()).unwrap();
        let mut stores = one_method_program("pass/tests/liar");
        let err = mgr.run_passes(&mut stores).unwrap_err();
        assert!(matches!(
            err,
            PassError::PropertyCheck {
                property: PropertyName::HasSourceBlocks,
                ..
            }
        ));
    }

    #[test]
    fn test_unreachable_checker_names_first_dead_instruction() {
        use crate::pass::checkers::NoUnreachableChecker;
        let dead = class(
            "Lpass/tests/dead/A;",
            &["(method (public static) \"Lpass/tests/dead/A;.f:()I\" ((const v0 1) (return v0) (const v1 2) (return v1)))"],
        );
        let live = class(
            "Lpass/tests/dead/B;",
            &["(method (public static) \"Lpass/tests/dead/B;.f:()I\" ((const v0 1) (return v0)))"],
        );
        let problems = NoUnreachableChecker.check(&[dead, live]);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("Lpass/tests/dead/A;.f:()I: unreachable (const v1"), "{}", problems[0]);
        assert!(NoUnreachableChecker.check(&[live]).is_empty());
    }

    #[test]
    fn test_with_passes_rejects_mismatched_instance() {
        let err = PassManager::with_passes(vec![counting("Other#x")], config()).unwrap_err();
        assert!(matches!(err, PassError::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_remove_unreachable_then_allocate() {
        let a = class(
            "Lpass/tests/full/A;",
            &[r#"(method (public static) "Lpass/tests/full/A;.main:()V" (
              (invoke-static () "Lpass/tests/full/B;.helper:()V")
              (return-void)
            ))"#],
        );
        let b = class(
            "Lpass/tests/full/B;",
            &[
                r#"(method (public static) "Lpass/tests/full/B;.helper:()V" ((const v0 7) (return-void)))"#,
                r#"(method (public static) "Lpass/tests/full/B;.unused:()V" ((return-void)))"#,
            ],
        );
        let c = class("Lpass/tests/full/C;", &[]);
        a.rstate().set_root();
        DexMethodRef::make_from_descriptor("Lpass/tests/full/A;.main:()V")
            .unwrap()
            .as_def()
            .unwrap()
            .rstate()
            .set_root();
        let mut stores = stores(vec![a, b, c]);

        let mut config = PipelineConfig::new(["RemoveUnreachablePass", "RegAllocPass"]);
        config.global.jobs = 2;
        let mut mgr = PassManager::from_config(config).unwrap();
        let infos = mgr.run_passes(&mut stores).unwrap();

        assert_eq!(infos[0].metrics["classes_removed"], 1);
        assert_eq!(infos[0].metrics["methods_removed"], 1);
        assert_eq!(infos[1].metrics["methods"], 2);
        assert!(mgr.established().contains(&PropertyName::RegistersAllocated));
        let remaining: BTreeSet<DexClass> = crate::dex::build_class_scope(&stores).into_iter().collect();
        assert_eq!(remaining, [a, b].into_iter().collect());
        for m in b.all_methods().into_iter().chain(a.all_methods()) {
            let code = m.code().unwrap();
            assert!(check_legality(&m.to_string(), &code).is_ok());
        }
    }
}
