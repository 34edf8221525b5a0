//! # Timely Engine
//!
//! Runs a [`DataflowJob`] on timely/differential dataflow inside the current
//! process.
//!
//! Each job gets a fresh `timely::execute` with `workers` threads. Every
//! worker feeds its share of each input (`skip(index).step_by(peers)`), the
//! plan is rendered into Differential collections, and the distinct output
//! is collected into a shared buffer once the probe reports completion.
//! Joins and `distinct` exchange data between workers by key, so each
//! output tuple is produced by exactly one worker.

use differential_dataflow::operators::{Join, Threshold};
use differential_dataflow::Collection;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use timely::dataflow::operators::{Inspect, Probe, ToStream};
use timely::dataflow::{ProbeHandle, Scope};
use tracing::{debug, trace};

use super::{DataflowEngine, DataflowError, DataflowJob, SinkBinding};
use crate::ir::PlanNode;
use crate::value::Tuple;

/// In-process dataflow engine
pub struct TimelyEngine {
    workers: usize,
    sinks: Mutex<HashMap<String, Vec<Tuple>>>,
}

impl TimelyEngine {
    /// Create an engine; `workers == 0` uses every available core
    pub fn new(workers: usize) -> Self {
        let workers = if workers == 0 { num_cpus::get() } else { workers };
        TimelyEngine {
            workers,
            sinks: Mutex::new(HashMap::new()),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Sinks written and not yet read
    pub fn pending_sinks(&self) -> usize {
        self.sinks.lock().len()
    }
}

impl Default for TimelyEngine {
    fn default() -> Self {
        TimelyEngine::new(1)
    }
}

impl DataflowEngine for TimelyEngine {
    fn submit(&self, job: DataflowJob) -> Result<(), DataflowError> {
        job.validate()?;

        let DataflowJob {
            graph,
            sources,
            sink,
        } = job;
        let sources: Arc<HashMap<String, Vec<Tuple>>> = Arc::new(
            sources
                .into_iter()
                .map(|(name, relation)| (name, relation.to_vec()))
                .collect(),
        );
        let plan = Arc::new(graph);
        let results = Arc::new(Mutex::new(Vec::new()));
        let results_clone = Arc::clone(&results);

        let config = timely::Config::process(self.workers);
        let guards = timely::execute(config, move |worker| {
            let index = worker.index();
            let peers = worker.peers();
            let mut probe = ProbeHandle::new();
            let results = Arc::clone(&results_clone);

            let rendered = worker.dataflow::<(), _, _>(|scope| {
                let mut inputs = HashMap::new();
                for (name, rows) in sources.iter() {
                    let local: Vec<(Tuple, (), isize)> = rows
                        .iter()
                        .skip(index)
                        .step_by(peers)
                        .map(|t| (t.clone(), (), 1))
                        .collect();
                    inputs.insert(name.clone(), Collection::new(local.to_stream(scope)));
                }

                render(&plan, &inputs).map(|collection| {
                    collection
                        .distinct()
                        .inner
                        .inspect(move |(data, _time, _diff)| {
                            results.lock().push(data.clone());
                        })
                        .probe_with(&mut probe);
                })
            });
            rendered?;

            while !probe.done() {
                worker.step();
            }
            Ok::<(), DataflowError>(())
        })
        .map_err(DataflowError::Worker)?;

        for outcome in guards.join() {
            outcome.map_err(DataflowError::Worker)??;
        }

        let tuples = std::mem::take(&mut *results.lock());
        debug!(sink = %sink, tuples = tuples.len(), workers = self.workers, "dataflow_job_done");
        self.sinks.lock().insert(sink.name, tuples);
        Ok(())
    }

    fn open_for_read(
        &self,
        sink: &SinkBinding,
    ) -> Result<Box<dyn Iterator<Item = Tuple> + Send>, DataflowError> {
        let tuples = self
            .sinks
            .lock()
            .remove(&sink.name)
            .ok_or_else(|| DataflowError::UnknownSink(sink.name.clone()))?;
        trace!(sink = %sink, tuples = tuples.len(), "sink_opened");
        Ok(Box::new(tuples.into_iter()))
    }
}

/// Render a plan into a Differential collection
fn render<G>(
    node: &PlanNode,
    inputs: &HashMap<String, Collection<G, Tuple>>,
) -> Result<Collection<G, Tuple>, DataflowError>
where
    G: Scope<Timestamp = ()>,
{
    let collection = match node {
        PlanNode::Input { binding, .. } => inputs
            .get(binding)
            .cloned()
            .ok_or_else(|| DataflowError::UnknownBinding(binding.clone()))?,

        PlanNode::Filter { input, filter } => {
            let filter = filter.clone();
            render(input, inputs)?.filter(move |t| filter.matches(t))
        }

        PlanNode::Match { input, pattern } => {
            let pattern = pattern.clone();
            render(input, inputs)?.flat_map(move |t| pattern.apply(&t))
        }

        PlanNode::Join {
            left,
            right,
            left_keys,
            right_keys,
            right_keep,
        } => {
            let (lk, rk, keep) = (left_keys.clone(), right_keys.clone(), right_keep.clone());
            let left = render(left, inputs)?.map(move |t| (t.project(&lk), t));
            let right = render(right, inputs)?.map(move |t| (t.project(&rk), t.project(&keep)));
            left.join(&right).map(|(_key, (l, r))| l.concat(&r))
        }

        PlanNode::Antijoin {
            left,
            right,
            left_keys,
            right_keys,
        } => {
            let (lk, rk) = (left_keys.clone(), right_keys.clone());
            let left = render(left, inputs)?.map(move |t| (t.project(&lk), t));
            let right = render(right, inputs)?
                .map(move |t| t.project(&rk))
                .distinct();
            left.antijoin(&right).map(|(_key, t)| t)
        }

        PlanNode::Builtin { input, call } => {
            let call = call.clone();
            render(input, inputs)?.flat_map(move |t| call.apply(&t))
        }

        PlanNode::Substitute { input, template } => {
            let template = template.clone();
            render(input, inputs)?.flat_map(move |t| template.instantiate(&t))
        }
    };
    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Term;
    use crate::ir::{ConstantFilter, Pattern, Template};
    use crate::value::Relation;

    fn rel(rows: &[&[i64]]) -> Relation {
        rows.iter().map(|r| Tuple::ints(r)).collect()
    }

    fn edges() -> Relation {
        rel(&[&[1, 2], &[2, 3], &[3, 4]])
    }

    #[test]
    fn test_filter_and_match() {
        let engine = TimelyEngine::new(1);
        let plan = PlanNode::Match {
            input: Box::new(PlanNode::Filter {
                input: Box::new(PlanNode::input("edge", 2)),
                filter: ConstantFilter::new(2, vec![(0, Term::int(2))]).unwrap(),
            }),
            pattern: Pattern::new(vec![Term::int(2), Term::var("Y")]),
        };
        let job = DataflowJob::new(plan, SinkBinding::named("out")).bind("edge", edges());
        let out = engine.run(job).unwrap();
        assert_eq!(out, rel(&[&[3]]));
    }

    #[test]
    fn test_join_two_hop() {
        // two_hop(X, Z) :- edge(X, Y), edge(Y, Z)
        let plan = PlanNode::Substitute {
            input: Box::new(PlanNode::Join {
                left: Box::new(PlanNode::input("edge", 2)),
                right: Box::new(PlanNode::input("edge", 2)),
                left_keys: vec![1],
                right_keys: vec![0],
                right_keep: vec![1],
            }),
            template: Template::new(
                vec![Term::var("X"), Term::var("Z")],
                vec!["X".to_string(), "Y".to_string(), "Z".to_string()],
            ),
        };
        for workers in [1, 3] {
            let engine = TimelyEngine::new(workers);
            let job = DataflowJob::new(plan.clone(), SinkBinding::named("two_hop"))
                .bind("edge", edges());
            let out = engine.run(job).unwrap();
            assert_eq!(out, rel(&[&[1, 3], &[2, 4]]), "workers = {workers}");
        }
    }

    #[test]
    fn test_antijoin() {
        let plan = PlanNode::Antijoin {
            left: Box::new(PlanNode::input("node", 1)),
            right: Box::new(PlanNode::input("blocked", 1)),
            left_keys: vec![0],
            right_keys: vec![0],
        };
        let engine = TimelyEngine::new(2);
        let job = DataflowJob::new(plan, SinkBinding::named("open"))
            .bind("node", rel(&[&[1], &[2], &[3]]))
            .bind("blocked", rel(&[&[2]]));
        assert_eq!(engine.run(job).unwrap(), rel(&[&[1], &[3]]));
    }

    #[test]
    fn test_cross_product_on_empty_keys() {
        let plan = PlanNode::Join {
            left: Box::new(PlanNode::input("a", 1)),
            right: Box::new(PlanNode::input("b", 1)),
            left_keys: vec![],
            right_keys: vec![],
            right_keep: vec![0],
        };
        let engine = TimelyEngine::new(1);
        let job = DataflowJob::new(plan, SinkBinding::named("ab"))
            .bind("a", rel(&[&[1], &[2]]))
            .bind("b", rel(&[&[7]]));
        assert_eq!(engine.run(job).unwrap(), rel(&[&[1, 7], &[2, 7]]));
    }

    #[test]
    fn test_mismatched_join_keys_are_rejected() {
        let plan = PlanNode::Join {
            left: Box::new(PlanNode::input("a", 2)),
            right: Box::new(PlanNode::input("b", 1)),
            left_keys: vec![0, 1],
            right_keys: vec![0],
            right_keep: vec![],
        };
        let engine = TimelyEngine::new(1);
        let job = DataflowJob::new(plan, SinkBinding::named("bad"))
            .bind("a", rel(&[&[1, 2]]))
            .bind("b", rel(&[&[1]]));
        assert!(matches!(
            engine.submit(job),
            Err(DataflowError::InvalidPlan(_))
        ));
        assert_eq!(engine.pending_sinks(), 0);
    }

    #[test]
    fn test_unknown_sink_and_binding() {
        let engine = TimelyEngine::new(1);
        assert!(matches!(
            engine.open_for_read(&SinkBinding::named("nope")),
            Err(DataflowError::UnknownSink(_))
        ));
        let job = DataflowJob::new(PlanNode::input("missing", 1), SinkBinding::named("x"));
        assert!(matches!(
            engine.submit(job),
            Err(DataflowError::UnknownBinding(_))
        ));
    }

    #[test]
    fn test_sink_is_drained_once() {
        let engine = TimelyEngine::new(1);
        let job = DataflowJob::new(PlanNode::input("a", 1), SinkBinding::named("once"))
            .bind("a", rel(&[&[1]]));
        engine.submit(job).unwrap();
        assert_eq!(engine.pending_sinks(), 1);
        assert_eq!(engine.open_for_read(&SinkBinding::named("once")).unwrap().count(), 1);
        assert!(engine.open_for_read(&SinkBinding::named("once")).is_err());
    }
}
