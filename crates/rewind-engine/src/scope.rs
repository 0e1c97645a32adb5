//! Execution scope
//!
//! Carries the runtime policy, the active context and the last context
//! through one run of the engine. Instrumented code reaches it through the
//! interpreter rather than through thread-locals.

use crate::config::RuntimeConfig;
use crate::context::ContinuationContext;
use crate::error::{ContinuationError, EngineResult};
use crate::value::ObjectRef;
use std::sync::{Arc, Weak};

/// Per-run state shared by the runner and the interpreter
pub struct ExecutionScope {
    config: Arc<dyn RuntimeConfig>,
    active: Option<Arc<ContinuationContext>>,
    last: Option<Weak<ContinuationContext>>,
}

impl ExecutionScope {
    /// Create a scope with no active context
    pub fn new(config: Arc<dyn RuntimeConfig>) -> Self {
        Self {
            config,
            active: None,
            last: None,
        }
    }

    /// The runtime policy
    pub fn config(&self) -> &Arc<dyn RuntimeConfig> {
        &self.config
    }

    /// Context of the executing continuable
    pub fn active(&self) -> Option<Arc<ContinuationContext>> {
        self.active.clone()
    }

    /// Make `context` the active one
    pub fn set_active(&mut self, context: Arc<ContinuationContext>) {
        self.last = Some(Arc::downgrade(&context));
        self.active = Some(context);
    }

    /// Forget the active context
    pub fn clear_active(&mut self) {
        self.active = None;
    }

    /// The context that was active most recently, while it is alive
    pub fn last(&self) -> Option<Arc<ContinuationContext>> {
        self.last.as_ref().and_then(Weak::upgrade)
    }

    /// Clear the active context if it is `context`
    pub fn deactivate(&mut self, context: &Arc<ContinuationContext>) {
        if matches!(&self.active, Some(active) if Arc::ptr_eq(active, context)) {
            self.active = None;
        }
    }

    /// Context for `executing` as its entry method starts
    ///
    /// An active context of the same class is kept and its expiry clock
    /// restarted. Otherwise a new context is created; it inherits the call
    /// state of the last context, preferring the call that context created
    /// over the one it was answering to.
    pub fn create_or_reset(&mut self, executing: &ObjectRef) -> EngineResult<Arc<ContinuationContext>> {
        if let Some(active) = self.active.clone() {
            if active.continuable().class_name() == executing.class_name() {
                active.reset_start();
                self.set_active(active.clone());
                return Ok(active);
            }
        }

        let manager = self
            .config
            .continuation_manager(executing)
            .ok_or_else(|| ContinuationError::MissingManager(executing.class_name().to_string()))?;
        let context = ContinuationContext::new(&manager, executing.clone());
        if let Some(last) = self.last() {
            let inherited = last.created_call_state().or_else(|| last.active_call_state());
            if inherited.is_some() {
                context.set_active_call_state(inherited);
            }
        }
        self.set_active(context.clone());
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BasicRuntimeConfig;
    use crate::context::CallState;
    use crate::manager::ContinuationManager;
    use rustc_hash::FxHashMap;

    fn scope() -> (ExecutionScope, Arc<ContinuationManager>) {
        let config = Arc::new(BasicRuntimeConfig::default());
        let manager = Arc::new(ContinuationManager::new(config.clone()));
        config.attach(&manager);
        (ExecutionScope::new(config), manager)
    }

    fn object(class: &str) -> ObjectRef {
        ObjectRef::new_instance(class, true, FxHashMap::default())
    }

    #[test]
    fn test_same_class_keeps_context() {
        let (mut scope, _manager) = scope();
        let first = scope.create_or_reset(&object("app/A")).unwrap();
        let again = scope.create_or_reset(&object("app/A")).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let other = scope.create_or_reset(&object("app/B")).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert!(Arc::ptr_eq(&scope.active().unwrap(), &other));
    }

    #[test]
    fn test_call_state_is_inherited() {
        let (mut scope, _manager) = scope();
        let caller = scope.create_or_reset(&object("app/Caller")).unwrap();
        caller.set_created_call_state(Some(CallState::new(caller.id(), None)));
        scope.clear_active();

        let callee = scope.create_or_reset(&object("app/Callee")).unwrap();
        assert_eq!(callee.active_call_state().unwrap().continuation_id, caller.id());
        // Kept alive by `caller`, so still reachable as the last context.
        assert!(scope.last().is_some());
    }

    #[test]
    fn test_missing_manager() {
        let config = Arc::new(BasicRuntimeConfig::default());
        let mut scope = ExecutionScope::new(config);
        assert!(matches!(
            scope.create_or_reset(&object("app/A")),
            Err(ContinuationError::MissingManager(_))
        ));
    }

    #[test]
    fn test_deactivate_only_matching() {
        let (mut scope, _manager) = scope();
        let a = scope.create_or_reset(&object("app/A")).unwrap();
        scope.clear_active();
        let b = scope.create_or_reset(&object("app/B")).unwrap();
        scope.deactivate(&a);
        assert!(scope.active().is_some());
        scope.deactivate(&b);
        assert!(scope.active().is_none());
    }
}
