//! Registry of live continuation contexts
//!
//! Contexts are keyed by id in a `DashMap`, so registration, lookup and
//! removal are safe from any thread. Expired contexts are dropped lazily on
//! lookup and by an occasional purge on a worker thread.

use crate::config::RuntimeConfig;
use crate::context::ContinuationContext;
use crate::error::EngineResult;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;

/// Owns the live contexts of one runtime
pub struct ContinuationManager {
    contexts: DashMap<String, Arc<ContinuationContext>>,
    config: Arc<dyn RuntimeConfig>,
    // Serializes tree teardowns against each other.
    tree_lock: Mutex<()>,
}

impl std::fmt::Debug for ContinuationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuationManager")
            .field("contexts", &self.contexts.len())
            .finish()
    }
}

impl ContinuationManager {
    /// Create an empty manager governed by `config`
    pub fn new(config: Arc<dyn RuntimeConfig>) -> Self {
        Self {
            contexts: DashMap::new(),
            config,
            tree_lock: Mutex::new(()),
        }
    }

    /// The runtime policy
    pub fn config(&self) -> &Arc<dyn RuntimeConfig> {
        &self.config
    }

    /// Register a context under its current id
    pub fn add_context(&self, context: Arc<ContinuationContext>) {
        let id = context.id();
        tracing::trace!(id = %id, "manager: context registered");
        self.contexts.insert(id, context);
    }

    /// Unregister a context; unknown ids are ignored
    pub fn remove_context(&self, id: &str) {
        if self.contexts.remove(id).is_some() {
            tracing::trace!(id = %id, "manager: context removed");
        }
    }

    /// Look up a context, dropping it if it has expired
    pub fn get_context(&self, id: &str) -> Option<Arc<ContinuationContext>> {
        let context = self.contexts.get(id).map(|entry| entry.value().clone())?;
        if self.is_expired(&context) {
            self.contexts.remove(id);
            tracing::debug!(id = %id, "manager: context expired");
            return None;
        }
        Some(context)
    }

    /// Whether `context` outlived the configured duration
    pub fn is_expired(&self, context: &ContinuationContext) -> bool {
        context.is_expired(self.config.continuation_duration())
    }

    /// Whether `id` resolves to a live context
    pub fn contains(&self, id: &str) -> bool {
        self.get_context(id).is_some()
    }

    /// Number of registered contexts, expired ones included
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Prepare a paused context for execution
    ///
    /// Unknown, expired and running contexts yield `None`. When the policy
    /// clones, the original stays registered and paused and a registered
    /// clone is returned. Otherwise the context is taken out, given a new id
    /// and registered again, so the old id no longer resolves.
    pub fn resume_context(self: &Arc<Self>, id: &str) -> EngineResult<Option<Arc<ContinuationContext>>> {
        self.maybe_purge();

        let Some(context) = self.get_context(id) else {
            return Ok(None);
        };
        if !context.is_paused() {
            return Ok(None);
        }

        if self.config.clone_continuations(context.continuable()) {
            let clone = context.clone_context()?;
            self.add_context(clone.clone());
            tracing::debug!(from = %id, id = %clone.id(), "manager: resumed as clone");
            return Ok(Some(clone));
        }

        // Whoever removes the entry owns the resume.
        if self.contexts.remove(id).is_none() {
            return Ok(None);
        }
        let new_id = context.reset_id();
        context.set_paused(false);
        self.add_context(context.clone());
        tracing::debug!(from = %id, id = %new_id, "manager: resumed in place");
        Ok(Some(context))
    }

    /// Remove a context, everything cloned from it and its ancestors
    pub fn remove_context_tree(&self, id: &str) {
        let _guard = self.tree_lock.lock();
        let mut pending = vec![id.to_string()];
        let mut removed = 0usize;
        while let Some(next) = pending.pop() {
            let Some((_, context)) = self.contexts.remove(&next) else {
                continue;
            };
            removed += 1;
            pending.extend(context.related_ids());
            if let Some(parent) = context.parent_id() {
                pending.push(parent);
            }
        }
        tracing::debug!(root = %id, removed, "manager: context tree removed");
    }

    /// Remove every expired context now; returns how many were removed
    ///
    /// Works on a snapshot of the ids, so concurrent registration is fine.
    pub fn purge_now(&self) -> usize {
        let duration = self.config.continuation_duration();
        let ids: Vec<String> = self.contexts.iter().map(|entry| entry.key().clone()).collect();
        let mut purged = 0;
        for id in ids {
            let removed = self
                .contexts
                .remove_if(&id, |_, context| context.is_expired(duration));
            if removed.is_some() {
                purged += 1;
            }
        }
        if purged > 0 {
            tracing::debug!(purged, "manager: purged expired contexts");
        }
        purged
    }

    /// Purge on a worker thread with probability (frequency + 1) / scale
    ///
    /// A draw in `0..scale` purges when it is at most `frequency`.
    fn maybe_purge(self: &Arc<Self>) {
        let scale = self.config.purge_scale();
        if scale == 0 {
            return;
        }
        let draw = rand::thread_rng().gen_range(0..scale);
        if draw > self.config.purge_frequency() {
            return;
        }

        let manager = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("rewind-purge".to_string())
            .spawn(move || {
                manager.purge_now();
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "manager: could not start purge worker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BasicRuntimeConfig, RuntimeSettings};
    use crate::value::{ObjectRef, Value};
    use rustc_hash::FxHashMap;
    use std::time::Duration;

    fn setup(settings: RuntimeSettings) -> (Arc<BasicRuntimeConfig>, Arc<ContinuationManager>) {
        let config = Arc::new(BasicRuntimeConfig::new(settings));
        let manager = Arc::new(ContinuationManager::new(config.clone()));
        config.attach(&manager);
        (config, manager)
    }

    fn paused(manager: &Arc<ContinuationManager>) -> Arc<ContinuationContext> {
        let obj = ObjectRef::new_instance("app/Flow", true, FxHashMap::default());
        let ctx = ContinuationContext::new(manager, obj);
        ctx.local_vars().store(1, Value::Int(4));
        ctx.set_paused(true);
        manager.add_context(ctx.clone());
        ctx
    }

    fn no_purge() -> RuntimeSettings {
        RuntimeSettings {
            purge_scale: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_frequency_still_purges() {
        // One draw out of a scale of one always lands on zero.
        let (_, manager) = setup(RuntimeSettings {
            duration_ms: 0,
            purge_frequency: 0,
            purge_scale: 1,
            ..Default::default()
        });
        paused(&manager);
        paused(&manager);
        std::thread::sleep(Duration::from_millis(2));

        assert!(manager.resume_context("missing").unwrap().is_none());
        for _ in 0..200 {
            if manager.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(manager.is_empty());
    }

    #[test]
    fn test_add_get_remove() {
        let (_, manager) = setup(no_purge());
        let ctx = paused(&manager);
        let id = ctx.id();
        assert!(manager.contains(&id));
        manager.remove_context(&id);
        assert!(manager.get_context(&id).is_none());
        manager.remove_context(&id);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_resume_clones() {
        let (_, manager) = setup(no_purge());
        let ctx = paused(&manager);
        let id = ctx.id();

        let first = manager.resume_context(&id).unwrap().unwrap();
        let second = manager.resume_context(&id).unwrap().unwrap();
        assert_ne!(first.id(), second.id());
        assert_ne!(first.id(), id);
        assert!(ctx.is_paused());
        assert_eq!(manager.len(), 3);
        assert_eq!(first.local_vars().get_int(1), 4);
    }

    #[test]
    fn test_resume_reuses_and_invalidates() {
        let (config, manager) = setup(no_purge());
        config.set_clone_continuations(false);
        let ctx = paused(&manager);
        let id = ctx.id();

        let resumed = manager.resume_context(&id).unwrap().unwrap();
        assert!(Arc::ptr_eq(&resumed, &ctx));
        assert_ne!(resumed.id(), id);
        assert!(!resumed.is_paused());
        assert!(manager.get_context(&id).is_none());
        assert!(manager.get_context(&resumed.id()).is_some());

        // Not paused any more, so it can't be resumed again.
        assert!(manager.resume_context(&resumed.id()).unwrap().is_none());
    }

    #[test]
    fn test_unknown_id_is_none() {
        let (_, manager) = setup(no_purge());
        assert!(manager.resume_context("nope").unwrap().is_none());
    }

    #[test]
    fn test_expiry_and_purge() {
        let (_, manager) = setup(RuntimeSettings {
            duration_ms: 20,
            purge_scale: 0,
            ..Default::default()
        });
        let a = paused(&manager);
        let b = paused(&manager);
        std::thread::sleep(Duration::from_millis(40));

        assert!(manager.resume_context(&a.id()).unwrap().is_none());
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.purge_now(), 1);
        assert!(manager.get_context(&b.id()).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_remove_context_tree() {
        let (_, manager) = setup(no_purge());
        let root = paused(&manager);
        let child = manager.resume_context(&root.id()).unwrap().unwrap();
        child.set_paused(true);
        let grandchild = manager.resume_context(&child.id()).unwrap().unwrap();
        let other = paused(&manager);

        manager.remove_context_tree(&child.id());
        assert!(manager.get_context(&root.id()).is_none());
        assert!(manager.get_context(&child.id()).is_none());
        assert!(manager.get_context(&grandchild.id()).is_none());
        assert!(manager.get_context(&other.id()).is_some());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_concurrent_registration() {
        let (_, manager) = setup(RuntimeSettings::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let ctx = paused(&manager);
                        let resumed = manager.resume_context(&ctx.id()).unwrap();
                        assert!(resumed.is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(manager.len(), 8 * 50 * 2);
    }
}
