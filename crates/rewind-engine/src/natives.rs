//! Native method registry
//!
//! Methods flagged `NATIVE` are dispatched by key `owner.name:descriptor`,
//! where `owner` is the declaring class. Instance natives receive the
//! receiver as their first argument.

use crate::builtins::{CONTINUABLE_OBJECT_CLASS, STRINGS_CLASS};
use crate::error::{ContinuationError, EngineResult};
use crate::types::{OBJECT_CLASS, STRING_CLASS, THROWABLE_CLASS};
use crate::value::{ObjectRef, Value};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Native method implementation
pub type NativeFn = Arc<dyn Fn(&[Value]) -> EngineResult<Option<Value>> + Send + Sync>;

/// Registry of native method implementations
pub struct NativeRegistry {
    handlers: FxHashMap<String, NativeFn>,
}

impl std::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeRegistry")
            .field("count", &self.handlers.len())
            .finish()
    }
}

/// Dispatch key of a native method
pub fn native_key(owner: &str, name: &str, descriptor: &str) -> String {
    format!("{}.{}:{}", owner, name, descriptor)
}

fn arg(args: &[Value], index: usize) -> EngineResult<&Value> {
    args.get(index)
        .ok_or_else(|| ContinuationError::Execution(format!("native argument {} missing", index)))
}

fn string_arg(args: &[Value], index: usize) -> EngineResult<Option<Arc<str>>> {
    Ok(arg(args, index)?.as_object()?.and_then(|o| o.as_string()))
}

fn bool_value(b: bool) -> Option<Value> {
    Some(Value::Int(i32::from(b)))
}

fn same_string(a: &Value, b: &Value) -> EngineResult<bool> {
    let a = a.as_object()?;
    let b = b.as_object()?;
    Ok(match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            ObjectRef::ptr_eq(&a, &b) || matches!((a.as_string(), b.as_string()), (Some(x), Some(y)) if x == y)
        }
        _ => false,
    })
}

impl NativeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            handlers: FxHashMap::default(),
        }
    }

    /// Create a registry holding the natives of the built-in classes
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtins();
        registry
    }

    /// Register a native method
    pub fn register(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        handler: impl Fn(&[Value]) -> EngineResult<Option<Value>> + Send + Sync + 'static,
    ) {
        self.handlers
            .insert(native_key(owner, name, descriptor), Arc::new(handler));
    }

    /// Look up a handler by key
    pub fn get(&self, key: &str) -> Option<NativeFn> {
        self.handlers.get(key).cloned()
    }

    /// Check if a handler is registered
    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn register_builtins(&mut self) {
        self.register(OBJECT_CLASS, "toString", "()Lrt/String;", |args| {
            Ok(Some(Value::string(arg(args, 0)?.to_string())))
        });

        self.register(STRING_CLASS, "length", "()I", |args| {
            let len = string_arg(args, 0)?.map_or(0, |s| s.chars().count());
            Ok(Some(Value::Int(len as i32)))
        });
        self.register(STRING_CLASS, "concat", "(Lrt/String;)Lrt/String;", |args| {
            let a = arg(args, 0)?.to_string();
            let b = arg(args, 1)?.to_string();
            Ok(Some(Value::string(a + &b)))
        });
        self.register(STRING_CLASS, "equals", "(Lrt/Object;)Z", |args| {
            Ok(bool_value(same_string(arg(args, 0)?, arg(args, 1)?)?))
        });

        self.register(THROWABLE_CLASS, "getMessage", "()Lrt/String;", |args| {
            let this = arg(args, 0)?.as_object()?;
            Ok(Some(
                this.and_then(|t| t.get_field("message"))
                    .unwrap_or(Value::NULL),
            ))
        });

        self.register(STRINGS_CLASS, "concat", "(Lrt/String;Lrt/String;)Lrt/String;", |args| {
            let a = arg(args, 0)?.to_string();
            let b = arg(args, 1)?.to_string();
            Ok(Some(Value::string(a + &b)))
        });
        self.register(STRINGS_CLASS, "ofInt", "(I)Lrt/String;", |args| {
            Ok(Some(Value::string(arg(args, 0)?.as_int()?.to_string())))
        });
        self.register(STRINGS_CLASS, "ofLong", "(J)Lrt/String;", |args| {
            Ok(Some(Value::string(arg(args, 0)?.as_long()?.to_string())))
        });
        self.register(STRINGS_CLASS, "ofDouble", "(D)Lrt/String;", |args| {
            Ok(Some(Value::string(arg(args, 0)?.as_double()?.to_string())))
        });
        self.register(STRINGS_CLASS, "ofBoolean", "(Z)Lrt/String;", |args| {
            let text = if arg(args, 0)?.as_int()? != 0 { "true" } else { "false" };
            Ok(Some(Value::string(text)))
        });
        self.register(STRINGS_CLASS, "of", "(Lrt/Object;)Lrt/String;", |args| {
            Ok(Some(Value::string(arg(args, 0)?.to_string())))
        });
        self.register(STRINGS_CLASS, "length", "(Lrt/String;)I", |args| {
            let len = string_arg(args, 0)?.map_or(0, |s| s.chars().count());
            Ok(Some(Value::Int(len as i32)))
        });
        self.register(STRINGS_CLASS, "equals", "(Lrt/Object;Lrt/Object;)Z", |args| {
            Ok(bool_value(same_string(arg(args, 0)?, arg(args, 1)?)?))
        });

        // Reached only when the calling method was not rewritten.
        for (name, descriptor) in [
            ("pause", "()V"),
            ("stepBack", "()V"),
            ("call", "(Lrt/Object;)Lrt/Object;"),
            ("answer", "()V"),
            ("answer", "(Lrt/Object;)V"),
        ] {
            let method = format!("{}.{}", CONTINUABLE_OBJECT_CLASS, name);
            self.register(CONTINUABLE_OBJECT_CLASS, name, descriptor, move |_| {
                Err(ContinuationError::NotInstrumented(method.clone()))
            });
        }
    }
}

impl Default for NativeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
