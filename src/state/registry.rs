//! Actor-serialized agent state.
//!
//! # Responsibilities
//! - Own the framework/executor/task tables on a single consumer task
//! - Serve lookups and projections as queued commands with oneshot replies
//! - Track the agent's recovery state
//!
//! All access goes through the command queue, so each lookup observes one
//! consistent snapshot of the tables for its own duration. No ordering is
//! guaranteed across independent calls beyond queue order, and no locks are
//! held anywhere.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::api::types::{
    ContainerId, ContainerSummary, ExecutorInfo, FrameworkInfo, Task, TaskStatus,
};

/// The registry actor is gone; only possible during shutdown.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("agent state unavailable")]
pub struct RegistryError;

/// Executor resolved from the tables, with everything a lifecycle call
/// needs in one snapshot.
#[derive(Debug, Clone)]
pub struct ResolvedExecutor {
    pub executor: ExecutorInfo,
    pub framework: FrameworkInfo,
    pub container_id: ContainerId,
    pub user: Option<String>,
}

/// Whether an executor owning `executor_container` is addressed by `target`:
/// either exactly, or as the parent `target` hangs beneath. The two clauses
/// are deliberately separate so each stays testable on its own.
pub fn matches_exact_or_parent(executor_container: &ContainerId, target: &ContainerId) -> bool {
    if executor_container == target {
        return true;
    }
    match &target.parent {
        Some(parent) => executor_container == parent.as_ref(),
        None => false,
    }
}

struct ExecutorEntry {
    info: ExecutorInfo,
    container_id: ContainerId,
    user: Option<String>,
    tasks: HashMap<String, Task>,
}

struct FrameworkEntry {
    info: FrameworkInfo,
    executors: HashMap<String, ExecutorEntry>,
}

enum Command {
    RegisterExecutor {
        framework: FrameworkInfo,
        executor: ExecutorInfo,
        container_id: ContainerId,
        user: Option<String>,
        reply: oneshot::Sender<()>,
    },
    RecordTaskStatus {
        framework_id: String,
        executor_id: String,
        status: TaskStatus,
        reply: oneshot::Sender<bool>,
    },
    ResolveParent {
        parent: ContainerId,
        reply: oneshot::Sender<Option<ResolvedExecutor>>,
    },
    ResolveContainer {
        id: ContainerId,
        reply: oneshot::Sender<Option<ResolvedExecutor>>,
    },
    Frameworks {
        reply: oneshot::Sender<Vec<FrameworkInfo>>,
    },
    Executors {
        reply: oneshot::Sender<Vec<ExecutorInfo>>,
    },
    Tasks {
        reply: oneshot::Sender<Vec<Task>>,
    },
    Containers {
        reply: oneshot::Sender<Vec<ContainerSummary>>,
    },
}

/// Cheap cloneable handle onto the registry actor.
#[derive(Clone)]
pub struct Registry {
    tx: mpsc::Sender<Command>,
    recovered: Arc<AtomicBool>,
}

impl Registry {
    /// Spawn the actor. The agent starts unrecovered and answers 503 until
    /// [`Registry::mark_recovered`] is called.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(run_actor(rx));
        Self {
            tx,
            recovered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mark_recovered(&self) {
        self.recovered.store(true, Ordering::SeqCst);
        tracing::info!("Agent state recovery complete");
    }

    pub fn recovered(&self) -> bool {
        self.recovered.load(Ordering::SeqCst)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).await.map_err(|_| RegistryError)?;
        rx.await.map_err(|_| RegistryError)
    }

    pub async fn register_executor(
        &self,
        framework: FrameworkInfo,
        executor: ExecutorInfo,
        container_id: ContainerId,
        user: Option<String>,
    ) -> Result<(), RegistryError> {
        self.request(|reply| Command::RegisterExecutor {
            framework,
            executor,
            container_id,
            user,
            reply,
        })
        .await
    }

    /// Record a task status update; false when the executor is unknown.
    pub async fn record_task_status(
        &self,
        framework_id: String,
        executor_id: String,
        status: TaskStatus,
    ) -> Result<bool, RegistryError> {
        self.request(|reply| Command::RecordTaskStatus {
            framework_id,
            executor_id,
            status,
            reply,
        })
        .await
    }

    /// Find the executor whose container is `parent` (launch resolution).
    pub async fn resolve_parent(
        &self,
        parent: &ContainerId,
    ) -> Result<Option<ResolvedExecutor>, RegistryError> {
        let parent = parent.clone();
        self.request(|reply| Command::ResolveParent { parent, reply })
            .await
    }

    /// Find the executor addressed by `id` exactly or through its parent
    /// (wait/kill resolution).
    pub async fn resolve_container(
        &self,
        id: &ContainerId,
    ) -> Result<Option<ResolvedExecutor>, RegistryError> {
        let id = id.clone();
        self.request(|reply| Command::ResolveContainer { id, reply })
            .await
    }

    pub async fn frameworks(&self) -> Result<Vec<FrameworkInfo>, RegistryError> {
        self.request(|reply| Command::Frameworks { reply }).await
    }

    pub async fn executors(&self) -> Result<Vec<ExecutorInfo>, RegistryError> {
        self.request(|reply| Command::Executors { reply }).await
    }

    pub async fn tasks(&self) -> Result<Vec<Task>, RegistryError> {
        self.request(|reply| Command::Tasks { reply }).await
    }

    pub async fn containers(&self) -> Result<Vec<ContainerSummary>, RegistryError> {
        self.request(|reply| Command::Containers { reply }).await
    }
}

async fn run_actor(mut rx: mpsc::Receiver<Command>) {
    let mut frameworks: HashMap<String, FrameworkEntry> = HashMap::new();

    while let Some(command) = rx.recv().await {
        match command {
            Command::RegisterExecutor {
                framework,
                executor,
                container_id,
                user,
                reply,
            } => {
                let framework_key = framework
                    .id
                    .as_ref()
                    .map(|id| id.value.clone())
                    .unwrap_or_else(|| framework.name.clone());
                let executor_key = executor
                    .executor_id
                    .as_ref()
                    .map(|id| id.value.clone())
                    .unwrap_or_default();

                let entry = frameworks
                    .entry(framework_key)
                    .or_insert_with(|| FrameworkEntry {
                        info: framework.clone(),
                        executors: HashMap::new(),
                    });
                entry.info = framework;

                // A re-subscribe replaces the executor but keeps its tasks.
                let tasks = entry
                    .executors
                    .remove(&executor_key)
                    .map(|previous| previous.tasks)
                    .unwrap_or_default();
                entry.executors.insert(
                    executor_key,
                    ExecutorEntry {
                        info: executor,
                        container_id,
                        user,
                        tasks,
                    },
                );

                let _ = reply.send(());
            }
            Command::RecordTaskStatus {
                framework_id,
                executor_id,
                status,
                reply,
            } => {
                let recorded = record_task_status(
                    &mut frameworks,
                    &framework_id,
                    &executor_id,
                    status,
                );
                let _ = reply.send(recorded);
            }
            Command::ResolveParent { parent, reply } => {
                let resolved = scan(&frameworks, |entry| entry.container_id == parent);
                let _ = reply.send(resolved);
            }
            Command::ResolveContainer { id, reply } => {
                let resolved = scan(&frameworks, |entry| {
                    matches_exact_or_parent(&entry.container_id, &id)
                });
                let _ = reply.send(resolved);
            }
            Command::Frameworks { reply } => {
                let _ = reply.send(frameworks.values().map(|f| f.info.clone()).collect());
            }
            Command::Executors { reply } => {
                let _ = reply.send(
                    frameworks
                        .values()
                        .flat_map(|f| f.executors.values().map(|e| e.info.clone()))
                        .collect(),
                );
            }
            Command::Tasks { reply } => {
                let _ = reply.send(
                    frameworks
                        .values()
                        .flat_map(|f| {
                            f.executors
                                .values()
                                .flat_map(|e| e.tasks.values().cloned())
                        })
                        .collect(),
                );
            }
            Command::Containers { reply } => {
                let _ = reply.send(
                    frameworks
                        .values()
                        .flat_map(|f| {
                            let framework_id = f.info.id.clone();
                            f.executors.values().map(move |e| ContainerSummary {
                                framework_id: framework_id.clone(),
                                executor_id: e.info.executor_id.clone(),
                                container_id: Some(e.container_id.clone()),
                            })
                        })
                        .collect(),
                );
            }
        }
    }
}

/// Scan every framework's executors for the first match. The tables are
/// small (a handful of executors per agent), so a linear scan is fine.
fn scan(
    frameworks: &HashMap<String, FrameworkEntry>,
    matches: impl Fn(&ExecutorEntry) -> bool,
) -> Option<ResolvedExecutor> {
    for framework in frameworks.values() {
        for executor in framework.executors.values() {
            if matches(executor) {
                return Some(ResolvedExecutor {
                    executor: executor.info.clone(),
                    framework: framework.info.clone(),
                    container_id: executor.container_id.clone(),
                    user: executor.user.clone(),
                });
            }
        }
    }
    None
}

fn record_task_status(
    frameworks: &mut HashMap<String, FrameworkEntry>,
    framework_id: &str,
    executor_id: &str,
    status: TaskStatus,
) -> bool {
    let Some(framework) = frameworks.get_mut(framework_id) else {
        return false;
    };
    let Some(executor) = framework.executors.get_mut(executor_id) else {
        return false;
    };
    let Some(task_id) = status.task_id.clone() else {
        return false;
    };

    let task = executor
        .tasks
        .entry(task_id.value.clone())
        .or_insert_with(|| Task {
            task_id: Some(task_id),
            executor_id: executor.info.executor_id.clone(),
            framework_id: framework.info.id.clone(),
            ..Default::default()
        });
    task.state = status.state;

    true
}
