//! Passes that ship with the core.

use std::any::TypeId;
use std::collections::BTreeSet;
use std::path::Path;

use tracing::{info, warn};

use crate::config::{ConfigBinder, PipelineConfig};
use crate::dex::{build_class_scope, DexStoresVector, DexType};
use crate::method_override_graph::{build_graph, Graph};
use crate::reachability::{
    compute_reachable_objects, mark_classes_abstract, sweep, sweep_code, sweep_uncallable_virtual_methods,
    IgnoreSets, ReachabilityOptions,
};
use crate::regalloc::error::cfg_err;
use crate::regalloc::{allocate, AllocConfig, AllocError, AllocStats};
use crate::walk;

use super::error::PassResult;
use super::property::{interactions, Interaction, PropertyInteractions, PropertyName};
use super::{Pass, PassManager};

/// Register allocation over every method body.
#[derive(Debug, Default)]
pub struct RegAllocPass {
    config: AllocConfig,
}

impl RegAllocPass {
    pub const NAME: &'static str = "RegAllocPass";

    pub fn alloc_config(&self) -> &AllocConfig {
        &self.config
    }
}

impl Pass for RegAllocPass {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn bind_config(&mut self, binder: &mut ConfigBinder<'_>) {
        let defaults = AllocConfig::default();
        binder.bind(
            "use_linear_scan",
            defaults.use_linear_scan,
            &mut self.config.use_linear_scan,
            "Allocate with linear scan instead of graph coloring",
        );
        binder.bind(
            "max_spill_rounds",
            defaults.max_spill_rounds,
            &mut self.config.max_spill_rounds,
            "Rounds of live-range splitting before a method fails",
        );
    }

    fn get_property_interactions(&self) -> PropertyInteractions {
        interactions([
            (PropertyName::DexLimitsObeyed, Interaction::Preserves),
            (PropertyName::HasSourceBlocks, Interaction::Preserves),
            (PropertyName::NoResolvablePureRefs, Interaction::Preserves),
            (PropertyName::NoInitClassInstructions, Interaction::Requires),
            (PropertyName::NoWriteBarrierInstructions, Interaction::Requires),
            (PropertyName::NoUnreachableInstructions, Interaction::Preserves),
            (PropertyName::RegistersAllocated, Interaction::Establishes),
        ])
    }

    fn preserved_analyses(&self) -> Vec<TypeId> {
        vec![TypeId::of::<Graph>()]
    }

    fn run_pass(
        &mut self,
        stores: &mut DexStoresVector,
        _config: &PipelineConfig,
        mgr: &mut PassManager,
    ) -> PassResult<()> {
        let scope = build_class_scope(stores);
        let config = self.config;
        let (stats, errors): (AllocStats, Vec<AllocError>) = walk::parallel::reduce_code(&scope, |m, code| {
            let name = m.to_string();
            if let Err(e) = code.build_cfg(true).map_err(cfg_err(&name)) {
                return (AllocStats::default(), vec![e]);
            }
            let result = allocate(&name, code, &config);
            code.clear_cfg();
            match result {
                Ok(stats) => (stats, Vec::new()),
                Err(e) => (AllocStats::default(), vec![e]),
            }
        });
        if let Some(e) = errors.into_iter().next() {
            return Err(e.into());
        }
        mgr.set_metric("methods", stats.methods as i64);
        mgr.set_metric("spill_rounds", stats.spill_rounds as i64);
        mgr.set_metric("spilled", stats.spilled as i64);
        mgr.set_metric("coalesced", stats.coalesced as i64);
        mgr.set_metric("moves_inserted", stats.moves_inserted as i64);
        mgr.set_metric("moves_elided", stats.moves_elided as i64);
        mgr.set_metric("param_moves", stats.param_moves as i64);
        mgr.set_metric("range_windows", stats.range_windows as i64);
        Ok(())
    }
}

/// Whole-program reachability followed by the sweeps.
#[derive(Debug)]
pub struct RemoveUnreachablePass {
    remove_pub: bool,
    check_instantiable: bool,
    check_instance_callable: bool,
    check_returning: bool,
    relaxed_keep_class_members: bool,
    emit_graph_on_run: bool,
    graph_path: String,
    ignore_string_literals: Vec<String>,
    ignore_system_annos: Vec<String>,
}

impl Default for RemoveUnreachablePass {
    fn default() -> Self {
        Self {
            remove_pub: true,
            check_instantiable: false,
            check_instance_callable: false,
            check_returning: false,
            relaxed_keep_class_members: false,
            emit_graph_on_run: false,
            graph_path: "reachability-graph.txt".to_string(),
            ignore_string_literals: Vec::new(),
            ignore_system_annos: Vec::new(),
        }
    }
}

fn existing_types(descriptors: &[String]) -> BTreeSet<DexType> {
    descriptors.iter().filter_map(|d| DexType::get(d)).collect()
}

impl RemoveUnreachablePass {
    pub const NAME: &'static str = "RemoveUnreachablePass";

    pub fn reachability_options(&self, config: &PipelineConfig) -> ReachabilityOptions {
        ReachabilityOptions {
            cfg_gathering_check_instantiable: self.check_instantiable,
            cfg_gathering_check_instance_callable: self.check_instance_callable,
            cfg_gathering_check_returning: self.check_returning,
            relaxed_keep_class_members: self.relaxed_keep_class_members,
            root_annotations: config
                .global
                .root_annotations
                .iter()
                .map(|d| DexType::make(d))
                .collect(),
            num_threads: config.global.jobs,
            record_graph: self.emit_graph_on_run,
        }
    }
}

impl Pass for RemoveUnreachablePass {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn bind_config(&mut self, binder: &mut ConfigBinder<'_>) {
        let d = Self::default();
        binder.bind(
            "remove_pub",
            d.remove_pub,
            &mut self.remove_pub,
            "Remove unmarked public members of surviving classes",
        );
        binder.bind(
            "cfg_gathering_check_instantiable",
            d.check_instantiable,
            &mut self.check_instantiable,
            "Only dispatch virtual calls into instantiable classes",
        );
        binder.bind(
            "cfg_gathering_check_instance_callable",
            d.check_instance_callable,
            &mut self.check_instance_callable,
            "Only walk instance method bodies that can be called",
        );
        binder.bind(
            "cfg_gathering_check_returning",
            d.check_returning,
            &mut self.check_returning,
            "Cut code after calls that never return",
        );
        binder.bind(
            "relaxed_keep_class_members",
            d.relaxed_keep_class_members,
            &mut self.relaxed_keep_class_members,
            "Kept classes do not keep their constructors",
        );
        binder.bind(
            "emit_graph_on_run",
            d.emit_graph_on_run,
            &mut self.emit_graph_on_run,
            "Record why each object is reachable and write it out",
        );
        binder.bind(
            "graph_path",
            d.graph_path,
            &mut self.graph_path,
            "Where emit_graph_on_run writes the graph",
        );
        binder.bind(
            "ignore_string_literals",
            d.ignore_string_literals,
            &mut self.ignore_string_literals,
            "Classes whose string literals never name a class",
        );
        binder.bind(
            "ignore_system_annos",
            d.ignore_system_annos,
            &mut self.ignore_system_annos,
            "Annotation types that never retain anything",
        );
    }

    fn get_property_interactions(&self) -> PropertyInteractions {
        interactions([
            (PropertyName::DexLimitsObeyed, Interaction::Preserves),
            (PropertyName::HasSourceBlocks, Interaction::Preserves),
            (PropertyName::NoResolvablePureRefs, Interaction::Preserves),
            (PropertyName::NoUnreachableInstructions, Interaction::Preserves),
        ])
    }

    fn run_pass(
        &mut self,
        stores: &mut DexStoresVector,
        config: &PipelineConfig,
        mgr: &mut PassManager,
    ) -> PassResult<()> {
        let options = self.reachability_options(config);
        let ignore = IgnoreSets {
            string_literals: existing_types(&self.ignore_string_literals),
            system_annos: existing_types(&self.ignore_system_annos),
        };
        let (reachables, aspects) = compute_reachable_objects(stores, &ignore, &options)?;
        mgr.set_metric("marked_classes", reachables.num_marked_classes() as i64);
        mgr.set_metric("marked_methods", reachables.num_marked_methods() as i64);
        mgr.set_metric("marked_fields", reachables.num_marked_fields() as i64);

        let swept = sweep(stores, &reachables, self.remove_pub);
        mgr.set_metric("classes_removed", swept.classes_removed as i64);
        mgr.set_metric("methods_removed", swept.methods_removed as i64);
        mgr.set_metric("fields_removed", swept.fields_removed as i64);

        if options.cfg_gathering() {
            let abstracted = mark_classes_abstract(stores, &reachables, &aspects);
            let code = sweep_code(stores, &options, &aspects);
            let uncallable = sweep_uncallable_virtual_methods(stores, &aspects);
            mgr.set_metric("classes_abstracted", (abstracted.len() + code.classes_abstracted) as i64);
            mgr.set_metric("new_instances_removed", code.new_instances as i64);
            mgr.set_metric("instance_ofs_folded", code.instance_ofs as i64);
            mgr.set_metric("check_casts_folded", code.check_casts as i64);
            mgr.set_metric("instance_accesses_removed", code.instance_accesses as i64);
            mgr.set_metric("non_returning_invokes", code.non_returning_invokes as i64);
            mgr.set_metric("blocks_removed", code.blocks_removed as i64);
            mgr.set_metric("methods_made_abstract", uncallable.abstracted as i64);
            mgr.set_metric("methods_made_throwing", uncallable.throw_bodies as i64);
        }

        if let Some(graph) = reachables.graph() {
            let path = Path::new(&self.graph_path);
            std::fs::write(path, graph.dump())?;
            info!(
                target: "dexopt::reachability",
                path = %path.display(),
                objects = graph.len(),
                "Wrote reachability graph"
            );
        } else if self.emit_graph_on_run {
            warn!(target: "dexopt::reachability", "No reachability graph was recorded");
        }
        Ok(())
    }
}

/// Builds the method-override graph and stores it for later passes.
#[derive(Debug, Default)]
pub struct MethodOverrideGraphAnalysisPass;

impl MethodOverrideGraphAnalysisPass {
    pub const NAME: &'static str = "MethodOverrideGraphAnalysisPass";
}

impl Pass for MethodOverrideGraphAnalysisPass {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn get_property_interactions(&self) -> PropertyInteractions {
        interactions(PropertyName::ALL.into_iter().map(|p| (p, Interaction::Preserves)))
    }

    fn is_analysis(&self) -> bool {
        true
    }

    fn run_pass(
        &mut self,
        stores: &mut DexStoresVector,
        _config: &PipelineConfig,
        mgr: &mut PassManager,
    ) -> PassResult<()> {
        let scope = build_class_scope(stores);
        let graph = build_graph(&scope);
        mgr.set_metric("nodes", graph.len() as i64);
        mgr.set_analysis(graph);
        Ok(())
    }
}
