//! Runs a pipeline of passes.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::concurrent::{unordered_erase_if, UnorderedMap, UnorderedSet};
use crate::config::{ConfigBinder, ConfigError, OptionDoc, PipelineConfig};
use crate::dex::{build_class_scope, DexStoresVector};
use crate::ir::check_ir;
use crate::walk;

use super::checkers::{default_checkers, PropertyChecker};
use super::error::{PassError, PassResult};
use super::property::{apply_interactions, verify_pipeline, PropertyName};
use super::registry::{base_name, create_pass};
use super::Pass;

/// What one pass instance did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassInfo {
    /// Instance name as written in the pipeline.
    pub name: String,
    /// Position in the pipeline.
    pub order: usize,
    /// Earlier instances of the same pass.
    pub repeat: usize,
    pub metrics: BTreeMap<String, i64>,
    pub elapsed: Duration,
}

struct PipelineEntry {
    instance: String,
    pass: Box<dyn Pass>,
    options: Vec<OptionDoc>,
}

pub struct PassManager {
    pipeline: Vec<PipelineEntry>,
    config: PipelineConfig,
    infos: Vec<PassInfo>,
    current: Option<usize>,
    analyses: UnorderedMap<TypeId, Box<dyn Any + Send + Sync>>,
    checkers: Vec<Box<dyn PropertyChecker>>,
    established: BTreeSet<PropertyName>,
    pool: Arc<rayon::ThreadPool>,
}

impl std::fmt::Debug for PassManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassManager")
            .field("pipeline", &self.instance_names())
            .field("analyses", &self.analyses.len())
            .field("established", &self.established)
            .finish()
    }
}

impl PassManager {
    /// Build the pipeline named by `config.passes` from the registry.
    pub fn from_config(config: PipelineConfig) -> PassResult<Self> {
        let mut passes = Vec::with_capacity(config.passes.len());
        for instance in &config.passes {
            let pass = create_pass(instance).ok_or_else(|| PassError::UnknownPass(instance.clone()))?;
            passes.push((instance.clone(), pass));
        }
        Self::with_passes(passes, config)
    }

    /// Build a pipeline from pass instances the caller made. `config.passes`
    /// is ignored.
    pub fn with_passes(passes: Vec<(String, Box<dyn Pass>)>, config: PipelineConfig) -> PassResult<Self> {
        let mut pipeline = Vec::with_capacity(passes.len());
        for (instance, mut pass) in passes {
            if base_name(&instance) != pass.name() {
                return Err(ConfigError::Invalid(format!(
                    "instance {} does not name pass {}",
                    instance,
                    pass.name()
                ))
                .into());
            }
            let mut binder = ConfigBinder::new(&instance, config.pass_table(&instance));
            pass.bind_config(&mut binder);
            let options = binder.finish()?;
            pipeline.push(PipelineEntry {
                instance,
                pass,
                options,
            });
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.global.num_threads())
            .thread_name(|i| format!("dexopt-worker-{}", i))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("cannot start thread pool: {}", e)))?;
        Ok(Self {
            pipeline,
            config,
            infos: Vec::new(),
            current: None,
            analyses: UnorderedMap::new(),
            checkers: default_checkers(),
            established: PropertyName::initial(),
            pool: Arc::new(pool),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn instance_names(&self) -> Vec<String> {
        self.pipeline.iter().map(|e| e.instance.clone()).collect()
    }

    /// Documentation of the options bound by an instance.
    pub fn options_doc(&self, instance: &str) -> Option<&[OptionDoc]> {
        self.pipeline
            .iter()
            .find(|e| e.instance == instance)
            .map(|e| e.options.as_slice())
    }

    /// Properties that hold after the last pass that ran.
    pub fn established(&self) -> &BTreeSet<PropertyName> {
        &self.established
    }

    pub fn add_checker(&mut self, checker: Box<dyn PropertyChecker>) {
        self.checkers.push(checker);
    }

    /// Check the pipeline's property requirements without running it.
    pub fn verify(&self) -> PassResult<()> {
        let pipeline: Vec<_> = self
            .pipeline
            .iter()
            .map(|e| (e.instance.clone(), e.pass.get_property_interactions()))
            .collect();
        verify_pipeline(&pipeline).map(|_| ())
    }

    /// Run every pass in order. A failing pass or checker aborts the run.
    pub fn run_passes(&mut self, stores: &mut DexStoresVector) -> PassResult<Vec<PassInfo>> {
        crate::logging::init_logging(&self.config.global.log_level)?;
        self.verify()?;
        self.established = PropertyName::initial();
        self.infos.clear();
        self.analyses.clear();
        let mut pipeline = std::mem::take(&mut self.pipeline);
        let result = self.run_pipeline(&mut pipeline, stores);
        self.pipeline = pipeline;
        self.current = None;
        result.map(|()| self.infos.clone())
    }

    fn run_pipeline(&mut self, pipeline: &mut [PipelineEntry], stores: &mut DexStoresVector) -> PassResult<()> {
        let config = self.config.clone();
        let pool = Arc::clone(&self.pool);
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        for (order, entry) in pipeline.iter_mut().enumerate() {
            let repeat = seen.entry(entry.pass.name().to_string()).or_default();
            self.current = Some(self.infos.len());
            self.infos.push(PassInfo {
                name: entry.instance.clone(),
                order,
                repeat: *repeat,
                ..PassInfo::default()
            });
            *repeat += 1;

            info!(target: "dexopt::pass", pass = %entry.instance, order, "Running pass");
            let start = Instant::now();
            let pass = &mut entry.pass;
            let outcome = pool.install(|| pass.run_pass(stores, &config, self));
            let elapsed = start.elapsed();
            if let Err(e) = outcome {
                error!(target: "dexopt::pass", pass = %entry.instance, error = %e, "Pass failed");
                return Err(PassError::PassFailed {
                    pass: entry.instance.clone(),
                    source: Box::new(e),
                });
            }
            if let Some(info) = self.infos.last_mut() {
                info.elapsed = elapsed;
            }

            if !entry.pass.is_analysis() {
                let preserved: UnorderedSet<TypeId> = entry.pass.preserved_analyses().into_iter().collect();
                let dropped = unordered_erase_if(&mut self.analyses, |ty, _| !preserved.contains(ty));
                if dropped > 0 {
                    debug!(target: "dexopt::pass", pass = %entry.instance, dropped, "Invalidated analyses");
                }
            }
            self.established = apply_interactions(&self.established, &entry.pass.get_property_interactions());
            pool.install(|| self.run_checkers(&entry.instance, stores))?;

            if let Some(info) = self.infos.last() {
                for (key, value) in &info.metrics {
                    debug!(target: "dexopt::pass", pass = %info.name, metric = %key, value, "Metric");
                }
            }
            info!(
                target: "dexopt::pass",
                pass = %entry.instance,
                elapsed_ms = elapsed.as_millis() as u64,
                "Finished pass"
            );
        }
        Ok(())
    }

    fn run_checkers(&self, pass: &str, stores: &DexStoresVector) -> PassResult<()> {
        let global = &self.config.global;
        if !global.run_property_checkers && !global.run_ir_checker {
            return Ok(());
        }
        let scope = build_class_scope(stores);
        if global.run_property_checkers {
            for checker in &self.checkers {
                let property = checker.property();
                if !self.established.contains(&property) {
                    continue;
                }
                let problems = checker.check(&scope);
                if !problems.is_empty() {
                    return Err(PassError::PropertyCheck {
                        pass: pass.to_string(),
                        property,
                        message: problems.join("; "),
                    });
                }
            }
        }
        if global.run_ir_checker {
            let errors = walk::parallel::reduce_code(&scope, |m, code| match check_ir(&m.to_string(), code) {
                Ok(()) => Vec::new(),
                Err(e) => vec![e],
            });
            if let Some(error) = errors.into_iter().next() {
                return Err(PassError::IrCheck {
                    pass: pass.to_string(),
                    error,
                });
            }
        }
        Ok(())
    }

    pub fn set_analysis<T: Any + Send + Sync>(&mut self, result: T) {
        self.analyses.insert(TypeId::of::<T>(), Box::new(result));
    }

    /// The stored result of an analysis, if it is still valid.
    pub fn get_analysis<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.analyses.get(&TypeId::of::<T>())?.downcast_ref::<T>()
    }

    fn current_info(&mut self) -> Option<&mut PassInfo> {
        let index = self.current?;
        self.infos.get_mut(index)
    }

    /// Add to a metric of the running pass.
    pub fn incr_metric(&mut self, key: &str, delta: i64) {
        if let Some(info) = self.current_info() {
            *info.metrics.entry(key.to_string()).or_default() += delta;
        }
    }

    pub fn set_metric(&mut self, key: &str, value: i64) {
        if let Some(info) = self.current_info() {
            info.metrics.insert(key.to_string(), value);
        }
    }

    /// A metric of the running pass; 0 when unset.
    pub fn get_metric(&self, key: &str) -> i64 {
        self.current
            .and_then(|i| self.infos.get(i))
            .and_then(|info| info.metrics.get(key).copied())
            .unwrap_or(0)
    }

    /// Pipeline position and repeat count of the running pass.
    pub fn current_pass_info(&self) -> Option<&PassInfo> {
        self.infos.get(self.current?)
    }

    /// Records of every pass run so far.
    pub fn pass_infos(&self) -> &[PassInfo] {
        &self.infos
    }
}
