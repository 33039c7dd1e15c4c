//! Concurrency-scaled experiment runner.
//!
//! For every worker count 1..=N, the coordinator carves one fresh prefix
//! per worker, runs the workers concurrently, joins them all, tears the
//! prefixes down, and publishes the level's timings as one workbook sheet.
//! Levels run strictly one after another; only workers within a level
//! overlap.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::ipam::{AddressSpace, Prefix};
use crate::report::{self, Workbook};
use crate::scenario::{self, ScenarioKind, ScenarioReport};
use crate::utils::progress::create_progress_bar;
use crate::{LoadtestError, Result};

/// Everything one worker measured: its scenario reports in run order plus
/// total wall-clock seconds across all three.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub prefix: String,
    pub scenarios: IndexMap<ScenarioKind, ScenarioReport>,
    pub total_duration: f64,
}

/// Run all three scenarios, in fixed order, against one exclusively owned
/// prefix.
pub async fn run_worker(space: Arc<dyn AddressSpace>, prefix: Prefix) -> Result<WorkerReport> {
    info!("testing with {}", prefix.prefix);
    let start = Instant::now();

    let mut scenarios = IndexMap::new();
    for kind in ScenarioKind::ALL {
        let scenario_report = scenario::run(kind, space.as_ref(), &prefix)
            .await
            .map_err(|e| scenario_context(e, kind, &prefix.prefix))?;
        scenarios.insert(kind, scenario_report);
    }

    let report = WorkerReport {
        prefix: prefix.prefix.clone(),
        scenarios,
        total_duration: start.elapsed().as_secs_f64(),
    };
    info!("finished with {}", prefix.prefix);
    Ok(report)
}

/// Prepend block and scenario context so a fatal error is reproducible
/// from the log line alone.
fn scenario_context(e: LoadtestError, kind: ScenarioKind, cidr: &str) -> LoadtestError {
    let context = |msg: String| format!("scenario {} on {}: {}", kind, cidr, msg);
    match e {
        LoadtestError::Network(msg) => LoadtestError::Network(context(msg)),
        LoadtestError::Api(msg) => LoadtestError::Api(context(msg)),
        other => LoadtestError::Other(context(other.to_string())),
    }
}

/// Coordinator for the whole sweep of concurrency levels.
pub struct Experiment {
    space: Arc<dyn AddressSpace>,
    parent_prefix: String,
    prefix_length: u8,
    max_workers: usize,
}

impl Experiment {
    pub fn new(
        space: Arc<dyn AddressSpace>,
        parent_prefix: impl Into<String>,
        prefix_length: u8,
        max_workers: usize,
    ) -> Self {
        Experiment {
            space,
            parent_prefix: parent_prefix.into(),
            prefix_length,
            max_workers,
        }
    }

    /// Run every concurrency level and return the assembled workbook.
    ///
    /// The worker-report map is carried across levels without being reset,
    /// so level L's sheet holds every block measured in levels 1..=L.
    pub async fn run(&self) -> Result<Workbook> {
        let mut workbook = Workbook::new(format!(
            "IPAM load test of {} in /{} blocks",
            self.parent_prefix, self.prefix_length
        ));
        let mut worker_data: IndexMap<String, WorkerReport> = IndexMap::new();

        for level in 1..=self.max_workers {
            println!("starting the {} worker scenario", level);
            self.run_level(level, &mut worker_data).await?;
            report::add_level_sheet(&mut workbook, level, &worker_data);
        }

        Ok(workbook)
    }

    async fn run_level(
        &self,
        level: usize,
        worker_data: &mut IndexMap<String, WorkerReport>,
    ) -> Result<()> {
        // Provisioning stays sequential so concurrent carves never race
        // the parent prefix's own free-space accounting.
        let mut prefixes = Vec::with_capacity(level);
        for worker_id in 1..=level {
            let prefix = self
                .space
                .carve_child_prefix(&self.parent_prefix, self.prefix_length)
                .await?;
            println!(
                "  starting worker {} of {} with {}",
                worker_id, level, prefix.prefix
            );
            prefixes.push(prefix);
        }

        // One task per prefix; each sends exactly one report back, tagged
        // by its block's CIDR so completion order never matters.
        let (tx, mut rx) = mpsc::channel::<(String, Result<WorkerReport>)>(level);
        for prefix in &prefixes {
            let tx = tx.clone();
            let space = Arc::clone(&self.space);
            let prefix = prefix.clone();
            tokio::spawn(async move {
                let cidr = prefix.prefix.clone();
                let result = run_worker(space, prefix).await;
                let _ = tx.send((cidr, result)).await;
            });
        }
        drop(tx);

        // Join barrier: drain exactly `level` reports, tearing each block
        // down as its worker finishes. A failed worker is recorded and the
        // drain continues, so the level can never hang on one failure and
        // every block still gets deleted exactly once.
        let mut remaining: HashMap<String, Prefix> = prefixes
            .into_iter()
            .map(|prefix| (prefix.prefix.clone(), prefix))
            .collect();
        let mut failure: Option<LoadtestError> = None;
        let bar = create_progress_bar(level as u64, &format!("{} workers", level));

        for _ in 0..level {
            let (cidr, result) = rx
                .recv()
                .await
                .ok_or_else(|| LoadtestError::Other("worker channel closed early".into()))?;

            if let Some(prefix) = remaining.remove(&cidr) {
                self.space.delete_prefix(&prefix).await?;
            }

            match result {
                Ok(report) => {
                    worker_data.insert(cidr, report);
                }
                Err(e) => {
                    error!("worker on {} failed: {}", cidr, e);
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
