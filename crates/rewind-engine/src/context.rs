//! Continuation context
//!
//! One suspended execution: the continuable object, its mirrored locals, the
//! saved operands, the resume label and the linkage used by call/answer and
//! tree teardown.

use crate::error::{ContinuationError, EngineResult};
use crate::manager::ContinuationManager;
use crate::stack::ContinuationStack;
use crate::value::{CloneMap, ObjectRef, Value};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Fresh process-unique id: random high part, monotonic low part
fn generate_id() -> String {
    let sequence = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:016x}{:08x}", rand::random::<u64>(), sequence as u32)
}

/// Links a call continuation to the continuation that issued the call
#[derive(Debug, Clone)]
pub struct CallState {
    /// Id of the calling continuation
    pub continuation_id: String,
    /// Optional payload handed to the call target
    pub state: Option<Value>,
}

impl CallState {
    /// Create a call state for `continuation_id`
    pub fn new(continuation_id: impl Into<String>, state: Option<Value>) -> Self {
        Self {
            continuation_id: continuation_id.into(),
            state,
        }
    }
}

#[derive(Debug)]
struct ContextState {
    id: String,
    label: i32,
    paused: bool,
    parent_id: Option<String>,
    related_ids: Vec<String>,
    created_call_state: Option<CallState>,
    active_call_state: Option<CallState>,
    call_answer: Option<Value>,
    start: Instant,
}

/// Saved state of one continuable execution
pub struct ContinuationContext {
    manager: Weak<ContinuationManager>,
    continuable: ObjectRef,
    local_vars: ContinuationStack,
    local_stack: ContinuationStack,
    state: RwLock<ContextState>,
}

impl std::fmt::Debug for ContinuationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ContinuationContext")
            .field("id", &state.id)
            .field("continuable", &self.continuable)
            .field("label", &state.label)
            .field("paused", &state.paused)
            .field("parent_id", &state.parent_id)
            .finish()
    }
}

impl ContinuationContext {
    /// Create a fresh context for `continuable`, owned by `manager`
    pub fn new(manager: &Arc<ContinuationManager>, continuable: ObjectRef) -> Arc<Self> {
        let context = Arc::new(Self {
            manager: Arc::downgrade(manager),
            continuable,
            local_vars: ContinuationStack::new(),
            local_stack: ContinuationStack::new(),
            state: RwLock::new(ContextState {
                id: generate_id(),
                label: -1,
                paused: false,
                parent_id: None,
                related_ids: Vec::new(),
                created_call_state: None,
                active_call_state: None,
                call_answer: None,
                start: Instant::now(),
            }),
        });
        tracing::debug!(id = %context.id(), class = %context.continuable.class_name(), "context: created");
        context
    }

    /// Current id
    pub fn id(&self) -> String {
        self.state.read().id.clone()
    }

    /// Replace the id with a fresh one; returns the new id
    pub fn reset_id(&self) -> String {
        let id = generate_id();
        self.state.write().id = id.clone();
        id
    }

    /// Restart the expiry clock
    pub fn reset_start(&self) {
        self.state.write().start = Instant::now();
    }

    /// When the context was created or last reset
    pub fn start(&self) -> Instant {
        self.state.read().start
    }

    /// The suspended object
    pub fn continuable(&self) -> &ObjectRef {
        &self.continuable
    }

    /// Mirrored local variables
    pub fn local_vars(&self) -> &ContinuationStack {
        &self.local_vars
    }

    /// Saved operand stack
    pub fn local_stack(&self) -> &ContinuationStack {
        &self.local_stack
    }

    /// Resume label, `-1` when there is none
    pub fn label(&self) -> i32 {
        self.state.read().label
    }

    /// Set the resume label
    pub fn set_label(&self, label: i32) {
        self.state.write().label = label;
    }

    /// Drop the resume label
    pub fn clear_label(&self) {
        self.set_label(-1);
    }

    /// Whether the context is suspended and may be resumed
    pub fn is_paused(&self) -> bool {
        self.state.read().paused
    }

    /// Mark the context as suspended or running
    pub fn set_paused(&self, paused: bool) {
        self.state.write().paused = paused;
    }

    /// Id of the context this one was cloned from
    pub fn parent_id(&self) -> Option<String> {
        self.state.read().parent_id.clone()
    }

    /// The parent, if it is still registered
    pub fn parent_context(&self) -> Option<Arc<ContinuationContext>> {
        let parent = self.parent_id()?;
        self.manager.upgrade()?.get_context(&parent)
    }

    /// Ids of the contexts cloned from this one
    pub fn related_ids(&self) -> Vec<String> {
        self.state.read().related_ids.clone()
    }

    /// Record a child context
    pub fn add_related_id(&self, id: impl Into<String>) {
        self.state.write().related_ids.push(id.into());
    }

    /// Call state set when this context issued a call
    pub fn created_call_state(&self) -> Option<CallState> {
        self.state.read().created_call_state.clone()
    }

    /// Record the call this context issued
    pub fn set_created_call_state(&self, call_state: Option<CallState>) {
        self.state.write().created_call_state = call_state;
    }

    /// Call state this context answers to
    pub fn active_call_state(&self) -> Option<CallState> {
        self.state.read().active_call_state.clone()
    }

    /// Set the call state this context answers to
    pub fn set_active_call_state(&self, call_state: Option<CallState>) {
        self.state.write().active_call_state = call_state;
    }

    /// Answer delivered to this context's call
    pub fn call_answer(&self) -> Option<Value> {
        self.state.read().call_answer.clone()
    }

    /// Deliver the answer to this context's call
    pub fn set_call_answer(&self, answer: Option<Value>) {
        self.state.write().call_answer = answer;
    }

    /// Whether the context outlived `duration`
    pub fn is_expired(&self, duration: std::time::Duration) -> bool {
        self.start().elapsed() > duration
    }

    /// Id of the continuation a step-back returns to: the parent's parent
    pub fn step_back_id(&self) -> Option<String> {
        self.parent_context()?.parent_id()
    }

    /// The owning manager, while it exists
    pub fn manager(&self) -> Option<Arc<ContinuationManager>> {
        self.manager.upgrade()
    }

    /// Register with the owning manager
    pub fn register(self: &Arc<Self>) {
        if let Some(manager) = self.manager.upgrade() {
            manager.add_context(self.clone());
        }
    }

    /// Unregister this context only
    pub fn remove(&self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.remove_context(&self.id());
        }
    }

    /// Unregister this context, its descendants and its ancestors
    pub fn remove_context_tree(&self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.remove_context_tree(&self.id());
        }
    }

    /// Deep copy with a cloned continuable
    ///
    /// The continuable is cloned first, then the captured locals and operands
    /// are cloned through the same identity table, so every captured
    /// reference to the old continuable points at the new one. The clone gets
    /// a fresh id, this context as parent and is not paused.
    pub fn clone_context(self: &Arc<Self>) -> EngineResult<Arc<ContinuationContext>> {
        if !self.continuable.is_cloneable() {
            return Err(ContinuationError::CloneNotSupported(
                self.continuable.class_name().to_string(),
            ));
        }

        let mut map = CloneMap::new();
        let continuable = self.continuable.deep_clone(&mut map)?;
        let local_vars = self.local_vars.clone_with(&mut map)?;
        let local_stack = self.local_stack.clone_with(&mut map)?;

        let state = self.state.read();
        let clone = Arc::new(Self {
            manager: self.manager.clone(),
            continuable,
            local_vars,
            local_stack,
            state: RwLock::new(ContextState {
                id: generate_id(),
                label: state.label,
                paused: false,
                parent_id: Some(state.id.clone()),
                related_ids: Vec::new(),
                created_call_state: state.created_call_state.clone(),
                active_call_state: state.active_call_state.clone(),
                call_answer: None,
                start: state.start,
            }),
        });
        let parent = state.id.clone();
        drop(state);

        self.add_related_id(clone.id());
        tracing::debug!(parent = %parent, id = %clone.id(), "context: cloned");
        Ok(clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BasicRuntimeConfig;
    use rustc_hash::FxHashMap;
    use std::time::Duration;

    fn manager() -> Arc<ContinuationManager> {
        let config = Arc::new(BasicRuntimeConfig::default());
        let manager = Arc::new(ContinuationManager::new(config.clone()));
        config.attach(&manager);
        manager
    }

    fn continuable(cloneable: bool) -> ObjectRef {
        let mut fields = FxHashMap::default();
        fields.insert("count".to_string(), Value::Int(3));
        ObjectRef::new_instance("app/Flow", cloneable, fields)
    }

    #[test]
    fn test_fresh_context() {
        let manager = manager();
        let ctx = ContinuationContext::new(&manager, continuable(true));
        assert_eq!(ctx.label(), -1);
        assert!(!ctx.is_paused());
        assert!(ctx.parent_id().is_none());
        assert!(!ctx.is_expired(Duration::from_secs(60)));
    }

    #[test]
    fn test_ids_are_unique_and_reset() {
        let manager = manager();
        let a = ContinuationContext::new(&manager, continuable(true));
        let b = ContinuationContext::new(&manager, continuable(true));
        assert_ne!(a.id(), b.id());

        let old = a.id();
        let new = a.reset_id();
        assert_ne!(old, new);
        assert_eq!(a.id(), new);
    }

    #[test]
    fn test_clone_rebinds_self_references() {
        let manager = manager();
        let original = continuable(true);
        let ctx = ContinuationContext::new(&manager, original.clone());
        ctx.local_vars().store_reference(0, Some(original.clone()));
        ctx.local_vars().store_int(1, 5);
        ctx.local_stack().push_reference(Some(original.clone()));
        ctx.set_label(2);
        ctx.set_paused(true);

        let clone = ctx.clone_context().unwrap();
        assert_ne!(clone.id(), ctx.id());
        assert_eq!(clone.parent_id(), Some(ctx.id()));
        assert_eq!(ctx.related_ids(), vec![clone.id()]);
        assert_eq!(clone.label(), 2);
        assert!(!clone.is_paused());

        let cloned_obj = clone.continuable().clone();
        assert!(!ObjectRef::ptr_eq(&cloned_obj, &original));
        let this = clone.local_vars().get_reference(0).unwrap();
        assert!(ObjectRef::ptr_eq(&this, &cloned_obj));
        let operand = clone.local_stack().pop_reference().unwrap();
        assert!(ObjectRef::ptr_eq(&operand, &cloned_obj));

        clone.local_vars().store_int(1, 9);
        assert_eq!(ctx.local_vars().get_int(1), 5);
        cloned_obj.set_field("count", Value::Int(7));
        assert_eq!(original.get_field("count").unwrap().as_int().unwrap(), 3);
    }

    #[test]
    fn test_clone_requires_cloneable_continuable() {
        let manager = manager();
        let ctx = ContinuationContext::new(&manager, continuable(false));
        match ctx.clone_context() {
            Err(ContinuationError::CloneNotSupported(class)) => assert_eq!(class, "app/Flow"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_step_back_id_is_grandparent() {
        let manager = manager();
        let root = ContinuationContext::new(&manager, continuable(true));
        root.register();
        let child = root.clone_context().unwrap();
        child.register();
        let grandchild = child.clone_context().unwrap();
        grandchild.register();

        assert_eq!(grandchild.step_back_id(), Some(root.id()));
        assert_eq!(child.step_back_id(), None);
        assert_eq!(grandchild.parent_context().unwrap().id(), child.id());
    }

    #[test]
    fn test_call_state_accessors() {
        let manager = manager();
        let ctx = ContinuationContext::new(&manager, continuable(true));
        ctx.set_created_call_state(Some(CallState::new("abc", Some(Value::Int(1)))));
        assert_eq!(ctx.created_call_state().unwrap().continuation_id, "abc");
        ctx.set_call_answer(Some(Value::string("yes")));
        assert_eq!(ctx.call_answer().unwrap().to_string(), "yes");
    }
}
