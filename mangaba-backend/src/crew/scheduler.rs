//! Task scheduler
//!
//! Executes a DAG of tasks to completion: prerequisites always finish before
//! their dependents start, mutually independent tasks run concurrently, and
//! every task runs at most once. Cycle detection is a precondition check, so
//! a bad graph is rejected before any agent is called.

use crate::agents::Agent;
use crate::config::AgentConfig;
use crate::crew::task::{Task, TaskId, TaskOutcome, TaskStats};
use crate::error::MangabaError;
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CrewConfig {
    /// Tasks started per scheduling round.
    pub max_concurrent_tasks: usize,
    /// Wall clock limit for one agent call; 0 disables the limit.
    pub task_timeout_secs: u64,
}

impl Default for CrewConfig {
    fn default() -> Self {
        CrewConfig {
            max_concurrent_tasks: 5,
            task_timeout_secs: 300,
        }
    }
}

impl From<&AgentConfig> for CrewConfig {
    fn from(config: &AgentConfig) -> Self {
        CrewConfig {
            max_concurrent_tasks: config.max_concurrent_tasks,
            task_timeout_secs: config.task_timeout_secs,
        }
    }
}

/// Coordinator that owns the agents and the task arena.
pub struct Crew {
    agents: HashMap<String, Arc<Agent>>,
    tasks: Vec<Task>,
    /// One slot per task, written exactly once.
    outcomes: Vec<Option<TaskOutcome>>,
    config: CrewConfig,
}

impl Crew {
    pub fn new(config: CrewConfig) -> Self {
        Crew {
            agents: HashMap::new(),
            tasks: Vec::new(),
            outcomes: Vec::new(),
            config,
        }
    }

    pub fn add_agent(&mut self, agent: Arc<Agent>) -> Result<(), MangabaError> {
        let name = agent.name().to_string();
        if self.agents.contains_key(&name) {
            return Err(MangabaError::DuplicateAgent(name));
        }
        self.agents.insert(name, agent);
        Ok(())
    }

    pub fn agent(&self, name: &str) -> Option<&Arc<Agent>> {
        self.agents.get(name)
    }

    /// Append a task to the arena. Dependencies must reference tasks that
    /// already exist, so the graph can only point backwards.
    pub fn add_task(
        &mut self,
        description: impl Into<String>,
        agent_name: &str,
        priority: i32,
        deps: &[TaskId],
    ) -> Result<TaskId, MangabaError> {
        if !self.agents.contains_key(agent_name) {
            return Err(MangabaError::UnknownAgent(agent_name.to_string()));
        }
        for dep in deps {
            if dep.0 >= self.tasks.len() {
                return Err(MangabaError::UnknownTask(dep.0));
            }
        }

        let id = TaskId(self.tasks.len());
        self.tasks.push(Task {
            id,
            description: description.into(),
            agent_name: agent_name.to_string(),
            priority,
            deps: deps.to_vec(),
            created_at: Utc::now(),
        });
        self.outcomes.push(None);
        Ok(id)
    }

    pub fn outcome(&self, id: TaskId) -> Option<&TaskOutcome> {
        self.outcomes.get(id.0).and_then(|slot| slot.as_ref())
    }

    pub fn stats(&self) -> TaskStats {
        let mut stats = TaskStats {
            total: self.tasks.len(),
            ..TaskStats::default()
        };
        for outcome in self.outcomes.iter().flatten() {
            match outcome {
                TaskOutcome::Completed { .. } => stats.completed += 1,
                TaskOutcome::Failed { .. } => stats.failed += 1,
                TaskOutcome::Skipped { .. } => stats.skipped += 1,
            }
        }
        stats
    }

    /// Run every task to a deterministic outcome.
    ///
    /// Re-running is a no-op for tasks that already have an outcome: nothing
    /// executes twice. Failures are contained: a failed task marks its
    /// transitive dependents `Skipped` and leaves unrelated branches alone.
    pub async fn run(&mut self) -> Result<BTreeMap<TaskId, TaskOutcome>, MangabaError> {
        self.check_cycles()?;
        let batch_cap = self.config.max_concurrent_tasks.max(1);

        loop {
            self.propagate_skips();

            let mut ready: Vec<usize> = (0..self.tasks.len())
                .filter(|&i| {
                    self.outcomes[i].is_none()
                        && self.tasks[i].deps.iter().all(|dep| {
                            self.outcomes[dep.0]
                                .as_ref()
                                .is_some_and(|outcome| outcome.is_completed())
                        })
                })
                .collect();
            if ready.is_empty() {
                break;
            }

            // Preferred start order: priority first, insertion order on ties.
            ready.sort_by(|&a, &b| {
                self.tasks[b]
                    .priority
                    .cmp(&self.tasks[a].priority)
                    .then(a.cmp(&b))
            });
            ready.truncate(batch_cap);

            log::info!("[CREW] Starting batch of {} task(s)", ready.len());

            let timeout_secs = self.config.task_timeout_secs;
            let batch: Vec<_> = ready
                .iter()
                .map(|&i| {
                    let task = &self.tasks[i];
                    let agent = self.agents[&task.agent_name].clone();
                    let dep_results: Vec<String> = task
                        .deps
                        .iter()
                        .filter_map(|dep| {
                            self.outcomes[dep.0]
                                .as_ref()
                                .and_then(|outcome| outcome.result())
                                .map(str::to_string)
                        })
                        .collect();
                    (i, agent, task.description.clone(), dep_results)
                })
                .collect();

            let results = join_all(batch.into_iter().map(
                |(i, agent, description, dep_results)| async move {
                    let outcome =
                        execute_one(agent, &description, &dep_results, timeout_secs).await;
                    (i, outcome)
                },
            ))
            .await;

            for (i, outcome) in results {
                // The slot is write-once; a batch never contains a task twice.
                if self.outcomes[i].is_none() {
                    match &outcome {
                        TaskOutcome::Completed { .. } => {
                            log::info!("[CREW] {} completed", self.tasks[i].id)
                        }
                        TaskOutcome::Failed { error } => {
                            log::warn!("[CREW] {} failed: {}", self.tasks[i].id, error)
                        }
                        TaskOutcome::Skipped { .. } => {}
                    }
                    self.outcomes[i] = Some(outcome);
                }
            }
        }

        log::info!("[CREW] Run finished: {}", self.stats());
        Ok(self.outcome_map())
    }

    /// Mark tasks whose prerequisites failed or were skipped. One forward
    /// pass suffices because a dependency's index is always lower than its
    /// dependent's.
    fn propagate_skips(&mut self) {
        for i in 0..self.tasks.len() {
            if self.outcomes[i].is_some() {
                continue;
            }
            let failed_dep = self.tasks[i].deps.iter().copied().find(|dep| {
                matches!(
                    self.outcomes[dep.0],
                    Some(TaskOutcome::Failed { .. }) | Some(TaskOutcome::Skipped { .. })
                )
            });
            if let Some(failed_dependency) = failed_dep {
                log::warn!(
                    "[CREW] Skipping {} ({} did not complete)",
                    self.tasks[i].id,
                    failed_dependency
                );
                self.outcomes[i] = Some(TaskOutcome::Skipped { failed_dependency });
            }
        }
    }

    /// Kahn's algorithm over the depends-on relation. `add_task` only allows
    /// backward edges, so this can only fail for hand-built graphs, but the
    /// precondition is checked regardless.
    fn check_cycles(&self) -> Result<(), MangabaError> {
        let n = self.tasks.len();
        let mut indegree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for task in &self.tasks {
            for dep in &task.deps {
                indegree[task.id.0] += 1;
                dependents[dep.0].push(task.id.0);
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut visited = 0usize;
        while let Some(i) = queue.pop_front() {
            visited += 1;
            for &dependent in &dependents[i] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if visited < n {
            let stuck: Vec<String> = (0..n)
                .filter(|&i| indegree[i] > 0)
                .map(|i| self.tasks[i].id.to_string())
                .collect();
            return Err(MangabaError::CyclicDependency(stuck.join(", ")));
        }
        Ok(())
    }

    fn outcome_map(&self) -> BTreeMap<TaskId, TaskOutcome> {
        self.tasks
            .iter()
            .filter_map(|task| {
                self.outcomes[task.id.0]
                    .clone()
                    .map(|outcome| (task.id, outcome))
            })
            .collect()
    }
}

async fn execute_one(
    agent: Arc<Agent>,
    description: &str,
    dep_results: &[String],
    timeout_secs: u64,
) -> TaskOutcome {
    let result = if timeout_secs > 0 {
        match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            agent.execute(description, dep_results),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MangabaError::Timeout { secs: timeout_secs }),
        }
    } else {
        agent.execute(description, dep_results).await
    };

    match result {
        Ok(result) => TaskOutcome::Completed { result },
        Err(e) => TaskOutcome::Failed {
            error: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{GenerationBackend, GenerationOptions, Provider};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records every prompt and answers with a canned reply per agent call.
    struct RecordingBackend {
        calls: Mutex<Vec<String>>,
        fail_for: Option<String>,
    }

    impl RecordingBackend {
        fn new() -> Arc<Self> {
            Arc::new(RecordingBackend {
                calls: Mutex::new(Vec::new()),
                fail_for: None,
            })
        }

        fn failing_for(task_marker: &str) -> Arc<Self> {
            Arc::new(RecordingBackend {
                calls: Mutex::new(Vec::new()),
                fail_for: Some(task_marker.to_string()),
            })
        }
    }

    #[async_trait]
    impl GenerationBackend for RecordingBackend {
        fn provider(&self) -> Provider {
            Provider::Gemini
        }

        async fn generate(
            &self,
            prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, MangabaError> {
            self.calls.lock().push(prompt.to_string());
            if let Some(marker) = &self.fail_for {
                if prompt.contains(marker.as_str()) {
                    return Err(MangabaError::Backend {
                        provider: "gemini",
                        message: format!("scripted failure for {}", marker),
                    });
                }
            }
            let task_line = prompt
                .lines()
                .find(|line| line.starts_with("Task: "))
                .unwrap_or("Task: ?");
            Ok(format!("result of <{}>", &task_line[6..]))
        }
    }

    fn crew_with(backend: Arc<RecordingBackend>, agent_names: &[&str]) -> Crew {
        let mut crew = Crew::new(CrewConfig {
            max_concurrent_tasks: 5,
            task_timeout_secs: 0,
        });
        for name in agent_names {
            crew.add_agent(Arc::new(Agent::builder(*name, backend.clone()).build()))
                .unwrap();
        }
        crew
    }

    #[tokio::test]
    async fn test_dependency_results_reach_dependent_prompt() {
        let backend = RecordingBackend::new();
        let mut crew = crew_with(backend.clone(), &["researcher", "writer"]);

        let research = crew.add_task("investigate", "researcher", 0, &[]).unwrap();
        crew.add_task("summarize", "writer", 0, &[research])
            .unwrap();

        let outcomes = crew.run().await.unwrap();
        assert_eq!(
            outcomes[&research].result().unwrap(),
            "result of <investigate>"
        );

        let calls = backend.calls.lock();
        // The writer's prompt carries the researcher's result verbatim.
        assert!(calls[1].contains("result of <investigate>"));
    }

    #[tokio::test]
    async fn test_priority_orders_independent_tasks_when_bounded() {
        let backend = RecordingBackend::new();
        let mut crew = Crew::new(CrewConfig {
            max_concurrent_tasks: 1,
            task_timeout_secs: 0,
        });
        crew.add_agent(Arc::new(Agent::builder("solo", backend.clone()).build()))
            .unwrap();

        crew.add_task("low", "solo", 1, &[]).unwrap();
        crew.add_task("high", "solo", 3, &[]).unwrap();
        crew.add_task("mid", "solo", 2, &[]).unwrap();
        crew.add_task("low-too", "solo", 1, &[]).unwrap();

        crew.run().await.unwrap();

        let order: Vec<String> = backend
            .calls
            .lock()
            .iter()
            .map(|p| p.lines().find(|l| l.starts_with("Task: ")).unwrap()[6..].to_string())
            .collect();
        assert_eq!(order, vec!["high", "mid", "low", "low-too"]);
    }

    #[tokio::test]
    async fn test_rerun_executes_nothing_twice() {
        let backend = RecordingBackend::new();
        let mut crew = crew_with(backend.clone(), &["agent"]);
        let first = crew.add_task("one", "agent", 0, &[]).unwrap();
        crew.add_task("two", "agent", 0, &[first]).unwrap();

        let first_outcomes = crew.run().await.unwrap();
        let second_outcomes = crew.run().await.unwrap();

        assert_eq!(backend.calls.lock().len(), 2);
        assert_eq!(first_outcomes, second_outcomes);
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_any_execution() {
        let backend = RecordingBackend::new();
        let mut crew = crew_with(backend.clone(), &["agent"]);
        let a = crew.add_task("a", "agent", 0, &[]).unwrap();
        let b = crew.add_task("b", "agent", 0, &[a]).unwrap();
        // add_task cannot express a forward edge; close the cycle by hand.
        crew.tasks[a.0].deps.push(b);

        let result = crew.run().await;
        assert!(matches!(result, Err(MangabaError::CyclicDependency(_))));
        assert!(backend.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failure_skips_dependents_but_not_siblings() {
        let backend = RecordingBackend::failing_for("doomed");
        let mut crew = crew_with(backend.clone(), &["agent"]);

        let doomed = crew.add_task("doomed", "agent", 0, &[]).unwrap();
        let dependent = crew.add_task("dependent", "agent", 0, &[doomed]).unwrap();
        let grandchild = crew
            .add_task("grandchild", "agent", 0, &[dependent])
            .unwrap();
        let unrelated = crew.add_task("unrelated", "agent", 0, &[]).unwrap();

        let outcomes = crew.run().await.unwrap();

        assert!(matches!(
            outcomes[&doomed],
            TaskOutcome::Failed { .. }
        ));
        assert_eq!(
            outcomes[&dependent],
            TaskOutcome::Skipped {
                failed_dependency: doomed
            }
        );
        assert_eq!(
            outcomes[&grandchild],
            TaskOutcome::Skipped {
                failed_dependency: dependent
            }
        );
        assert!(outcomes[&unrelated].is_completed());

        // The skipped tasks never reached the backend.
        let calls = backend.calls.lock();
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn test_every_task_has_an_outcome() {
        let backend = RecordingBackend::failing_for("doomed");
        let mut crew = crew_with(backend.clone(), &["agent"]);
        let doomed = crew.add_task("doomed", "agent", 0, &[]).unwrap();
        crew.add_task("child", "agent", 0, &[doomed]).unwrap();
        crew.add_task("other", "agent", 1, &[]).unwrap();

        let outcomes = crew.run().await.unwrap();
        assert_eq!(outcomes.len(), 3);

        let stats = crew.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn test_unknown_agent_rejected_at_add() {
        let backend = RecordingBackend::new();
        let mut crew = crew_with(backend, &["agent"]);
        assert!(matches!(
            crew.add_task("task", "ghost", 0, &[]),
            Err(MangabaError::UnknownAgent(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_dependency_rejected_at_add() {
        let backend = RecordingBackend::new();
        let mut crew = crew_with(backend, &["agent"]);
        assert!(matches!(
            crew.add_task("task", "agent", 0, &[TaskId(7)]),
            Err(MangabaError::UnknownTask(7))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_agent_rejected() {
        let backend = RecordingBackend::new();
        let mut crew = crew_with(backend.clone(), &["agent"]);
        let result = crew.add_agent(Arc::new(Agent::builder("agent", backend).build()));
        assert!(matches!(result, Err(MangabaError::DuplicateAgent(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_only_that_branch() {
        struct StallingBackend;

        #[async_trait]
        impl GenerationBackend for StallingBackend {
            fn provider(&self) -> Provider {
                Provider::Gemini
            }

            async fn generate(
                &self,
                prompt: &str,
                _options: &GenerationOptions,
            ) -> Result<String, MangabaError> {
                if prompt.contains("stall") {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                Ok("fast".to_string())
            }
        }

        let backend: Arc<dyn GenerationBackend> = Arc::new(StallingBackend);
        let mut crew = Crew::new(CrewConfig {
            max_concurrent_tasks: 5,
            task_timeout_secs: 10,
        });
        crew.add_agent(Arc::new(Agent::builder("agent", backend).build()))
            .unwrap();

        let stalled = crew.add_task("stall forever", "agent", 0, &[]).unwrap();
        let child = crew.add_task("child", "agent", 0, &[stalled]).unwrap();
        let other = crew.add_task("quick", "agent", 0, &[]).unwrap();

        let outcomes = crew.run().await.unwrap();
        assert!(matches!(outcomes[&stalled], TaskOutcome::Failed { .. }));
        assert!(matches!(outcomes[&child], TaskOutcome::Skipped { .. }));
        assert!(outcomes[&other].is_completed());
    }
}
