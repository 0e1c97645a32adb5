//! Basic continuable runner
//!
//! Drives continuables through pauses, step-backs, calls and answers. Each
//! public operation runs a loop: a step-back re-enters the continuation taken
//! before the previous pause, a call runs the continuable named by the call
//! target, and an answer re-runs the calling continuation with the value
//! delivered to its call site.

use crate::config::{BasicRuntimeConfig, RuntimeSettings};
use crate::context::{CallState, ContinuationContext};
use crate::error::{ContinuationError, EngineResult};
use crate::instrument::{ContinuationsTransformer, InstrumentConfig};
use crate::interpreter::{Completion, Interpreter};
use crate::loader::{ClassBytesProvider, ContinuableClassLoader};
use crate::manager::ContinuationManager;
use crate::natives::NativeRegistry;
use crate::scope::ExecutionScope;
use crate::value::{ObjectRef, Value};
use parking_lot::RwLock;
use rewind_bytecode::SuspendKind;
use std::sync::Arc;

/// Resolves the value passed to a call into the continuable to run
pub trait CallTargetRetriever: Send + Sync {
    /// The continuable to run for `target`, or `None` to leave the call pending
    fn call_target(
        &self,
        loader: &ContinuableClassLoader,
        target: &Value,
        call_state: &CallState,
    ) -> EngineResult<Option<ObjectRef>>;
}

/// Treats a string target as a class name to instantiate and any other
/// object as the continuable itself
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassCallTargetRetriever;

impl CallTargetRetriever for ClassCallTargetRetriever {
    fn call_target(
        &self,
        loader: &ContinuableClassLoader,
        target: &Value,
        _call_state: &CallState,
    ) -> EngineResult<Option<ObjectRef>> {
        let object = match target.as_object()? {
            Some(object) => object,
            None => return Ok(None),
        };
        match object.as_string() {
            Some(class_name) => Ok(Some(loader.instantiate_named(&class_name)?)),
            None => Ok(Some(object)),
        }
    }
}

/// Result of one runner operation
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Id of the paused continuation to resume next, `None` once nothing paused
    pub id: Option<String>,
    /// The context that was active last; a pending call is reached through it
    pub last_context: Option<Arc<ContinuationContext>>,
    /// The continuable that ran last
    pub continuable: Option<ObjectRef>,
}

/// Where one pass of the run loop starts
struct Entry {
    object: Option<ObjectRef>,
    run_id: Option<String>,
    resume: bool,
    answer: Option<Value>,
}

/// Runs continuables loaded through a [`ContinuableClassLoader`]
pub struct BasicContinuableRunner {
    loader: ContinuableClassLoader,
    natives: NativeRegistry,
    config: Arc<BasicRuntimeConfig>,
    manager: Arc<ContinuationManager>,
    retriever: RwLock<Arc<dyn CallTargetRetriever>>,
}

impl BasicContinuableRunner {
    /// Create a runner over a class source, instrumentation names and runtime settings
    pub fn new(
        provider: Arc<dyn ClassBytesProvider>,
        instrument: Arc<dyn InstrumentConfig>,
        settings: RuntimeSettings,
    ) -> Self {
        let config = Arc::new(BasicRuntimeConfig::new(settings));
        let manager = Arc::new(ContinuationManager::new(config.clone()));
        config.attach(&manager);
        Self {
            loader: ContinuableClassLoader::new(provider, ContinuationsTransformer::new(instrument)),
            natives: NativeRegistry::with_builtins(),
            config,
            manager,
            retriever: RwLock::new(Arc::new(ClassCallTargetRetriever)),
        }
    }

    /// The class loader
    pub fn loader(&self) -> &ContinuableClassLoader {
        &self.loader
    }

    /// The context manager
    pub fn manager(&self) -> &Arc<ContinuationManager> {
        &self.manager
    }

    /// Native methods, for registering application natives before running
    pub fn natives_mut(&mut self) -> &mut NativeRegistry {
        &mut self.natives
    }

    /// Whether resuming clones the paused continuation
    pub fn clone_continuations(&self, clone: bool) {
        self.config.set_clone_continuations(clone);
    }

    /// Replace the call target retriever
    pub fn set_call_target_retriever(&self, retriever: Arc<dyn CallTargetRetriever>) {
        *self.retriever.write() = retriever;
    }

    /// Instantiate `class_name` and run its entry method
    pub fn start(&self, class_name: &str) -> EngineResult<RunOutcome> {
        let object = self.loader.instantiate_named(class_name)?;
        self.start_object(object)
    }

    /// Run the entry method of an existing continuable
    pub fn start_object(&self, object: ObjectRef) -> EngineResult<RunOutcome> {
        self.execute(Entry {
            object: Some(object),
            run_id: None,
            resume: false,
            answer: None,
        })
    }

    /// Resume a paused continuation
    pub fn resume(&self, id: &str) -> EngineResult<RunOutcome> {
        self.execute(Entry {
            object: None,
            run_id: Some(id.to_string()),
            resume: true,
            answer: None,
        })
    }

    /// Resume a continuation that issued a call, delivering `value` to it
    pub fn answer(&self, id: &str, value: Value) -> EngineResult<RunOutcome> {
        self.execute(Entry {
            object: None,
            run_id: Some(id.to_string()),
            resume: true,
            answer: Some(value),
        })
    }

    /// Run a registered context as it is, without the resume protocol
    pub fn run(&self, id: &str) -> EngineResult<RunOutcome> {
        self.execute(Entry {
            object: None,
            run_id: Some(id.to_string()),
            resume: false,
            answer: None,
        })
    }

    fn execute(&self, entry: Entry) -> EngineResult<RunOutcome> {
        let Entry {
            mut object,
            mut run_id,
            mut resume,
            mut answer,
        } = entry;
        let mut scope = ExecutionScope::new(self.config.clone());
        let mut result = None;

        loop {
            if let Some(id) = run_id.take() {
                let context = if resume {
                    self.manager.resume_context(&id)?
                } else {
                    self.manager.get_context(&id)
                };
                object = match context {
                    Some(context) => {
                        if let Some(value) = answer.take() {
                            context.set_call_answer(Some(value));
                        }
                        let continuable = context.continuable().clone();
                        scope.set_active(context);
                        Some(continuable)
                    }
                    None => {
                        tracing::debug!(id = %id, "runner: no continuation to run");
                        None
                    }
                };
            }

            let current = match object.clone() {
                Some(current) => current,
                None => break,
            };

            result = None;
            let completion = Interpreter::new(&self.loader, &self.natives, &mut scope).run_entry(&current)?;
            scope.clear_active();

            let suspension = match completion {
                Completion::Return(_) => break,
                Completion::Throw(exception) => {
                    let message = exception
                        .get_field("message")
                        .filter(|m| !m.is_null())
                        .map(|m| m.to_string())
                        .unwrap_or_default();
                    return Err(ContinuationError::UncaughtException {
                        class: exception.class_name().to_string(),
                        message,
                    });
                }
                Completion::Suspend(suspension) => suspension,
            };

            let context = suspension.context;
            match suspension.kind {
                SuspendKind::Pause => {
                    self.manager.add_context(context.clone());
                    tracing::debug!(id = %context.id(), "runner: paused");
                    result = Some(context.id());
                    break;
                }
                SuspendKind::StepBack => {
                    self.manager.add_context(context.clone());
                    match context.step_back_id() {
                        Some(id) => {
                            tracing::debug!(from = %context.id(), to = %id, "runner: step back");
                            run_id = Some(id);
                            resume = true;
                            object = None;
                        }
                        None => tracing::debug!(id = %context.id(), "runner: step back restarts"),
                    }
                }
                SuspendKind::Call => {
                    self.manager.add_context(context.clone());
                    let call_state = CallState::new(context.id(), None);
                    context.set_created_call_state(Some(call_state.clone()));

                    let target = suspension.value.unwrap_or(Value::NULL);
                    let retriever = self.retriever.read().clone();
                    object = retriever.call_target(&self.loader, &target, &call_state)?;
                    tracing::debug!(id = %context.id(), target = %target, "runner: call");
                    if object.is_none() {
                        break;
                    }
                }
                SuspendKind::Answer => {
                    match context.active_call_state() {
                        Some(call_state) => {
                            tracing::debug!(
                                id = %context.id(),
                                caller = %call_state.continuation_id,
                                "runner: answer"
                            );
                            answer = Some(suspension.value.unwrap_or(Value::NULL));
                            run_id = Some(call_state.continuation_id);
                            resume = true;
                            object = None;
                        }
                        None => {
                            tracing::debug!(id = %context.id(), "runner: answer without a caller");
                            break;
                        }
                    }
                }
            }
        }

        Ok(RunOutcome {
            id: result,
            last_context: scope.last(),
            continuable: object,
        })
    }
}

impl std::fmt::Debug for BasicContinuableRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicContinuableRunner")
            .field("loaded", &self.loader.loaded_count())
            .field("contexts", &self.manager.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::BasicInstrumentConfig;
    use crate::loader::MemoryClassProvider;
    use rustc_hash::FxHashMap;

    fn runner() -> BasicContinuableRunner {
        BasicContinuableRunner::new(
            Arc::new(MemoryClassProvider::new()),
            Arc::new(BasicInstrumentConfig::default()),
            RuntimeSettings::default(),
        )
    }

    #[test]
    fn test_unknown_id_runs_nothing() {
        let runner = runner();
        let outcome = runner.resume("missing").unwrap();
        assert!(outcome.id.is_none());
        assert!(outcome.continuable.is_none());
        assert!(outcome.last_context.is_none());
    }

    #[test]
    fn test_class_retriever() {
        let runner = runner();
        let state = CallState::new("caller", None);
        let retriever = ClassCallTargetRetriever;

        let none = retriever.call_target(runner.loader(), &Value::NULL, &state).unwrap();
        assert!(none.is_none());

        let object = ObjectRef::new_instance("app/Target", true, FxHashMap::default());
        let same = retriever
            .call_target(runner.loader(), &Value::object(object.clone()), &state)
            .unwrap()
            .unwrap();
        assert!(ObjectRef::ptr_eq(&same, &object));

        let built = retriever
            .call_target(runner.loader(), &Value::string("rt/Exception"), &state)
            .unwrap()
            .unwrap();
        assert_eq!(built.class_name(), "rt/Exception");
    }

    #[test]
    fn test_missing_class_fails_start() {
        let runner = runner();
        assert!(matches!(
            runner.start("app/Nope"),
            Err(ContinuationError::ClassNotFound(_))
        ));
    }
}
