//! Parallel execution of the task graph.
//!
//! The runner performs a parallel topological traversal: a pool of rayon
//! workers executes task bodies as soon as all their dependencies have
//! completed, and a result channel feeds completions back to the scheduler
//! loop. Each node in the requested set executes at most once per run by
//! construction, which is what makes destructive tasks such as `clean` safe
//! to list as a dependency of every pipeline task.
//!
//! Failure policy: a failing task body marks the task as failed and its
//! dependents as skipped; sibling tasks keep running. The run as a whole
//! reports failures through [`RunReport`] rather than aborting.

mod report;

#[cfg(feature = "server")]
pub mod http;
#[cfg(feature = "live")]
pub mod watch;

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

use indicatif::ProgressStyle;
use petgraph::graph::NodeIndex;
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::config::BuildContext;
use crate::error::RunnerError;
use crate::graph::TaskGraph;
use crate::pipeline::failure_reporter;

pub use report::{RunReport, TaskOutcome, TaskStatus};

/// Resolve a goal task by name and run it together with its transitive
/// dependencies.
pub fn run_goal(
    graph: &TaskGraph,
    ctx: &BuildContext,
    goal: &str,
) -> Result<RunReport, RunnerError> {
    let index = graph.resolve(goal)?;
    let nodes = graph.closure(index);

    run_nodes(graph, ctx, &nodes)
}

/// Run an explicit set of nodes. Watch mode calls this with the dirty
/// subgraph; `clean` is deliberately absent from that set, so output wiping
/// happens at most once per process.
pub fn run_nodes(
    graph: &TaskGraph,
    ctx: &BuildContext,
    nodes: &HashSet<NodeIndex>,
) -> Result<RunReport, RunnerError> {
    graph.validate()?;

    let total = nodes.len() as u64;
    if total == 0 {
        return Ok(RunReport::default());
    }

    // Dependencies only count when they are part of this run.
    let mut dependency_counts: HashMap<NodeIndex, usize> = nodes
        .iter()
        .map(|&index| {
            let count = graph
                .dependencies(index)
                .filter(|dep| nodes.contains(dep))
                .count();
            (index, count)
        })
        .collect();

    let s = Instant::now();

    let root_span = tracing::span!(Level::INFO, "tasks");
    root_span.pb_set_length(total);
    root_span.pb_set_style(
        &ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("invalid progress bar template")
            .progress_chars("=>-"),
    );
    root_span.pb_set_message("Running tasks...");
    let _enter = root_span.enter();

    let mut report = RunReport::default();
    let mut blocked: HashSet<NodeIndex> = HashSet::new();
    let mut completed = 0u64;

    // The scheduler loop blocks on the result channel, so it must stay on
    // the calling thread; a plain `rayon::scope` would migrate it into the
    // pool and starve the task bodies on a one-thread pool.
    rayon::in_place_scope(|scope| -> Result<(), RunnerError> {
        let (tx, rx) = channel::<(NodeIndex, anyhow::Result<()>, Duration)>();

        let spawn = |index: NodeIndex| {
            let node = &graph.graph[index];
            let name = node.name;
            let body = node.body.clone();
            let ctx = ctx.clone();
            let tx = tx.clone();
            let parent = root_span.clone();

            scope.spawn(move |_| {
                let span = tracing::span!(parent: &parent, Level::INFO, "task", name);
                let _enter = span.enter();

                let start = Instant::now();
                let result = match body {
                    Some(body) => body(&ctx),
                    None => Ok(()),
                };

                // The receiver only goes away when the scheduler bails out.
                let _ = tx.send((index, result, start.elapsed()));
            });
        };

        for &index in nodes {
            if dependency_counts[&index] == 0 {
                spawn(index);
            }
        }

        while completed < total {
            let (index, result, duration) =
                rx.recv().map_err(|_| RunnerError::ChannelClosed)?;

            completed += 1;
            root_span.pb_inc(1);

            let name = graph.graph[index].name;
            match result {
                Ok(()) => {
                    tracing::debug!(task = name, ?duration, "done");
                    report.push(name, TaskStatus::Done, duration);
                }
                Err(err) => {
                    failure_reporter(name)(&err);
                    blocked.insert(index);
                    report.push(name, TaskStatus::Failed, duration);
                }
            }

            // Unlock dependents; ready nodes whose dependencies failed are
            // skipped in place, which may in turn unlock further nodes.
            let mut ready: Vec<NodeIndex> = Vec::new();
            let mut unlock = |counts: &mut HashMap<NodeIndex, usize>,
                              ready: &mut Vec<NodeIndex>,
                              done: NodeIndex| {
                for dependent in graph.dependents(done) {
                    if let Some(count) = counts.get_mut(&dependent) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push(dependent);
                        }
                    }
                }
            };

            unlock(&mut dependency_counts, &mut ready, index);

            while let Some(next) = ready.pop() {
                let is_blocked = graph
                    .dependencies(next)
                    .filter(|dep| nodes.contains(dep))
                    .any(|dep| blocked.contains(&dep));

                if is_blocked {
                    let name = graph.graph[next].name;
                    tracing::warn!(task = name, "skipped: dependency failed");

                    blocked.insert(next);
                    completed += 1;
                    root_span.pb_inc(1);
                    report.push(name, TaskStatus::Skipped, Duration::ZERO);

                    unlock(&mut dependency_counts, &mut ready, next);
                } else {
                    spawn(next);
                }
            }
        }

        Ok(())
    })?;

    root_span.pb_set_message("Done");
    tracing::info!("finished {} tasks {}", total, crate::io::as_overhead(s));

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::config::{Config, Profile};

    fn ctx() -> BuildContext {
        BuildContext::new(Profile::Dev, &Config::default())
    }

    #[test]
    fn shared_dependency_runs_exactly_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let mut graph = TaskGraph::new();
        graph
            .add_task("clean", &[], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        graph.add_task("sass", &["clean"], |_| Ok(())).unwrap();
        graph.add_task("js", &["clean"], |_| Ok(())).unwrap();
        graph.add_composite("build", &["sass", "js"]).unwrap();

        let report = run_goal(&graph, &ctx(), "build").unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(report.failures(), 0);
        assert_eq!(report.outcomes.len(), 4);
    }

    #[test]
    fn failure_skips_dependents_but_not_siblings() {
        let sibling_ran = Arc::new(AtomicUsize::new(0));
        let counter = sibling_ran.clone();

        let mut graph = TaskGraph::new();
        graph
            .add_task("broken", &[], |_| anyhow::bail!("boom"))
            .unwrap();
        graph
            .add_task("downstream", &["broken"], |_| Ok(()))
            .unwrap();
        graph
            .add_task("sibling", &[], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        graph
            .add_composite("build", &["downstream", "sibling"])
            .unwrap();

        let report = run_goal(&graph, &ctx(), "build").unwrap();

        assert_eq!(sibling_ran.load(Ordering::SeqCst), 1);
        assert_eq!(report.status_of("broken"), Some(TaskStatus::Failed));
        assert_eq!(report.status_of("downstream"), Some(TaskStatus::Skipped));
        assert_eq!(report.status_of("sibling"), Some(TaskStatus::Done));
        // the composite goal depends on a skipped task, so it is skipped too
        assert_eq!(report.status_of("build"), Some(TaskStatus::Skipped));
        assert_eq!(report.failures(), 1);
    }

    #[test]
    fn unknown_goal_is_an_error() {
        let graph = TaskGraph::new();
        let err = run_goal(&graph, &ctx(), "nope").unwrap_err();
        assert!(matches!(err, RunnerError::Graph(_)));
    }

    #[test]
    fn cycle_is_reported_not_executed() {
        // Cycles cannot be built through the public API since dependencies
        // must pre-exist, so wire one at the petgraph level.
        let mut graph = TaskGraph::new();
        let a = graph.add_task("a", &[], |_| Ok(())).unwrap();
        let b = graph.add_task("b", &["a"], |_| Ok(())).unwrap();
        graph.graph.add_edge(b, a, ());

        let nodes = HashSet::from([a, b]);
        let err = run_nodes(&graph, &ctx(), &nodes).unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Graph(crate::error::GraphError::Cycle(_))
        ));
    }
}
