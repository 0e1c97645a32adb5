//! Class loading with load-time instrumentation
//!
//! Bytes come from a [`ClassBytesProvider`]. Continuable classes are run
//! through the [`ContinuationsTransformer`] before they are decoded, verified
//! and linked into [`RuntimeClass`] values. Built-in classes always win over
//! provider classes of the same name.

use crate::builtins::builtin_bytes;
use crate::error::{ContinuationError, EngineResult};
use crate::instrument::ContinuationsTransformer;
use crate::types::OBJECT_CLASS;
use crate::value::{ObjectRef, Value};
use dashmap::DashMap;
use rewind_bytecode::{
    class_flags, method_flags, verify_class, ClassFile, Insn, Label, MethodDef, MethodDescriptor,
    StackKind, FieldType,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File extension of class files on disk
pub const CLASS_FILE_EXTENSION: &str = "rwc";

/// Supplies raw class bytes by internal name
pub trait ClassBytesProvider: Send + Sync {
    /// Bytes of `name`, `None` if unknown
    fn class_bytes(&self, name: &str) -> Option<Vec<u8>>;
}

/// In-memory class bytes
#[derive(Default)]
pub struct MemoryClassProvider {
    classes: DashMap<String, Vec<u8>>,
}

impl MemoryClassProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Register encoded class bytes under `name`
    pub fn insert(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.classes.insert(name.into(), bytes);
    }

    /// Encode and register a class
    pub fn insert_class(&self, class: &ClassFile) {
        self.insert(class.name.clone(), class.encode());
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether no class is registered
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ClassBytesProvider for MemoryClassProvider {
    fn class_bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.classes.get(name).map(|bytes| bytes.value().clone())
    }
}

/// Class files under a directory, `app/Flow` read from `<root>/app/Flow.rwc`
pub struct DirectoryClassProvider {
    root: PathBuf,
}

impl DirectoryClassProvider {
    /// Read classes below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path a class is read from
    pub fn class_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, CLASS_FILE_EXTENSION))
    }

    /// The root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ClassBytesProvider for DirectoryClassProvider {
    fn class_bytes(&self, name: &str) -> Option<Vec<u8>> {
        let path = self.class_path(name);
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::trace!(path = %path.display(), error = %e, "loader: class file unavailable");
                None
            }
        }
    }
}

/// Exception table entry with instruction indices
#[derive(Debug, Clone)]
pub struct ResolvedHandler {
    /// First covered instruction
    pub start: usize,
    /// End of the covered range (exclusive)
    pub end: usize,
    /// Handler entry
    pub handler: usize,
    /// Caught class, `None` catches everything
    pub catch_type: Option<String>,
}

/// Decoded, executable method body
#[derive(Debug, Clone)]
pub struct MethodCode {
    /// Instructions with inline labels
    pub insns: Vec<Insn>,
    /// Label positions in `insns`
    pub labels: FxHashMap<Label, usize>,
    /// Exception table
    pub handlers: Vec<ResolvedHandler>,
}

impl MethodCode {
    /// Index of a placed label
    pub fn target(&self, label: Label) -> EngineResult<usize> {
        self.labels
            .get(&label)
            .copied()
            .ok_or_else(|| ContinuationError::Execution(format!("unplaced label {}", label.0)))
    }
}

/// A linked method
#[derive(Debug)]
pub struct RuntimeMethod {
    /// Declaring class
    pub owner: String,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Parsed descriptor
    pub signature: MethodDescriptor,
    /// Method flags
    pub flags: u16,
    /// Local slots
    pub max_locals: u16,
    /// Body, `None` for native and abstract methods
    pub code: Option<MethodCode>,
}

impl RuntimeMethod {
    fn link(owner: &str, def: &MethodDef, class: &ClassFile) -> EngineResult<Self> {
        let signature = MethodDescriptor::parse(&def.descriptor)
            .map_err(|e| ContinuationError::Execution(format!("{}.{}: {}", owner, def.name, e)))?;
        let code = if def.is_native() || def.is_abstract() {
            None
        } else {
            let body = def.body(&class.constants)?;
            let labels = body.label_positions();
            let position = |label: &Label| {
                labels.get(label).copied().ok_or_else(|| {
                    ContinuationError::Execution(format!(
                        "{}.{}: handler label {} is not placed",
                        owner, def.name, label.0
                    ))
                })
            };
            let mut handlers = Vec::with_capacity(body.handlers.len());
            for block in &body.handlers {
                handlers.push(ResolvedHandler {
                    start: position(&block.start)?,
                    end: position(&block.end)?,
                    handler: position(&block.handler)?,
                    catch_type: block.catch_type.clone(),
                });
            }
            Some(MethodCode {
                insns: body.insns,
                labels,
                handlers,
            })
        };
        Ok(Self {
            owner: owner.to_string(),
            name: def.name.clone(),
            descriptor: def.descriptor.clone(),
            signature,
            flags: def.flags,
            max_locals: def.max_locals,
            code,
        })
    }

    /// Check if the method is static
    pub fn is_static(&self) -> bool {
        self.flags & method_flags::STATIC != 0
    }

    /// Check if the method is native
    pub fn is_native(&self) -> bool {
        self.flags & method_flags::NATIVE != 0
    }

    /// `owner.name:descriptor`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}:{}", self.owner, self.name, self.descriptor)
    }
}

fn method_key(name: &str, descriptor: &str) -> String {
    format!("{}{}", name, descriptor)
}

/// A linked class
#[derive(Debug)]
pub struct RuntimeClass {
    /// Internal name
    pub name: String,
    /// Linked super class
    pub super_class: Option<Arc<RuntimeClass>>,
    /// Directly implemented interfaces
    pub interfaces: Vec<String>,
    /// Class flags
    pub flags: u32,
    ancestors: FxHashSet<String>,
    fields: Vec<(String, StackKind)>,
    methods: FxHashMap<String, Arc<RuntimeMethod>>,
    cloneable: bool,
}

impl RuntimeClass {
    /// Find a method declared here or inherited
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<Arc<RuntimeMethod>> {
        let key = method_key(name, descriptor);
        let mut class = Some(self);
        while let Some(current) = class {
            if let Some(method) = current.methods.get(&key) {
                return Some(method.clone());
            }
            class = current.super_class.as_deref();
        }
        None
    }

    /// Whether this class is `name` or extends or implements it
    pub fn is_subclass_of(&self, name: &str) -> bool {
        self.ancestors.contains(name)
    }

    /// Whether the entry method was rewritten
    pub fn is_instrumented(&self) -> bool {
        self.flags & class_flags::INSTRUMENTED != 0
    }

    /// Whether instances support the clone contract
    pub fn is_cloneable(&self) -> bool {
        self.cloneable
    }

    /// Whether this is an interface
    pub fn is_interface(&self) -> bool {
        self.flags & class_flags::INTERFACE != 0
    }

    /// Instance fields, inherited ones first
    pub fn fields(&self) -> &[(String, StackKind)] {
        &self.fields
    }
}

/// Loads, instruments and links classes
pub struct ContinuableClassLoader {
    provider: Arc<dyn ClassBytesProvider>,
    transformer: ContinuationsTransformer,
    classes: DashMap<String, Arc<RuntimeClass>>,
}

impl ContinuableClassLoader {
    /// Create a loader over `provider`
    pub fn new(provider: Arc<dyn ClassBytesProvider>, transformer: ContinuationsTransformer) -> Self {
        Self {
            provider,
            transformer,
            classes: DashMap::new(),
        }
    }

    /// The load-time transformer
    pub fn transformer(&self) -> &ContinuationsTransformer {
        &self.transformer
    }

    /// Number of linked classes
    pub fn loaded_count(&self) -> usize {
        self.classes.len()
    }

    /// Load and link a class and its super types
    pub fn load(&self, name: &str) -> EngineResult<Arc<RuntimeClass>> {
        let mut chain = Vec::new();
        self.load_with_chain(name, &mut chain)
    }

    fn load_with_chain(&self, name: &str, chain: &mut Vec<String>) -> EngineResult<Arc<RuntimeClass>> {
        if let Some(class) = self.classes.get(name) {
            return Ok(class.value().clone());
        }
        if chain.iter().any(|c| c == name) {
            return Err(ContinuationError::Execution(format!(
                "circular class hierarchy: {} -> {}",
                chain.join(" -> "),
                name
            )));
        }

        let class = self.define(name)?;
        chain.push(name.to_string());
        let linked = self.link(class, chain);
        chain.pop();
        let linked = Arc::new(linked?);

        // Another thread may have linked it meanwhile; keep the first one.
        let entry = self.classes.entry(name.to_string()).or_insert(linked);
        Ok(entry.value().clone())
    }

    fn define(&self, name: &str) -> EngineResult<ClassFile> {
        if let Some(bytes) = builtin_bytes(name) {
            return Ok(ClassFile::decode(&bytes)?);
        }

        let bytes = self
            .provider
            .class_bytes(name)
            .ok_or_else(|| ContinuationError::ClassNotFound(name.to_string()))?;
        let bytes = match self.transformer.transform(self, &bytes)? {
            Some(transformed) => transformed,
            None => bytes,
        };
        let class = ClassFile::decode(&bytes)?;
        if class.name != name {
            return Err(ContinuationError::Execution(format!(
                "class file for {} declares {}",
                name, class.name
            )));
        }
        verify_class(&class)?;
        tracing::debug!(class = %name, instrumented = class.flags & class_flags::INSTRUMENTED != 0, "loader: class defined");
        Ok(class)
    }

    fn link(&self, class: ClassFile, chain: &mut Vec<String>) -> EngineResult<RuntimeClass> {
        let super_class = match &class.super_name {
            Some(super_name) => Some(self.load_with_chain(super_name, chain)?),
            None => None,
        };

        let mut ancestors = FxHashSet::default();
        ancestors.insert(class.name.clone());
        ancestors.insert(OBJECT_CLASS.to_string());
        if let Some(parent) = &super_class {
            ancestors.extend(parent.ancestors.iter().cloned());
        }
        for interface in &class.interfaces {
            let linked = self.load_with_chain(interface, chain)?;
            ancestors.extend(linked.ancestors.iter().cloned());
        }

        let mut fields = super_class
            .as_ref()
            .map(|parent| parent.fields.clone())
            .unwrap_or_default();
        for field in &class.fields {
            let kind = FieldType::parse(&field.descriptor)
                .map_err(|e| ContinuationError::Execution(format!("{}.{}: {}", class.name, field.name, e)))?
                .stack_kind();
            fields.retain(|(name, _)| name != &field.name);
            fields.push((field.name.clone(), kind));
        }

        let mut methods = FxHashMap::default();
        for def in &class.methods {
            let method = RuntimeMethod::link(&class.name, def, &class)?;
            methods.insert(method_key(&def.name, &def.descriptor), Arc::new(method));
        }

        let cloneable = class.is_cloneable()
            || super_class.as_ref().map_or(false, |parent| parent.cloneable);

        Ok(RuntimeClass {
            name: class.name,
            super_class,
            interfaces: class.interfaces,
            flags: class.flags,
            ancestors,
            fields,
            methods,
            cloneable,
        })
    }

    /// Allocate an instance with zeroed fields
    pub fn instantiate(&self, class: &RuntimeClass) -> EngineResult<ObjectRef> {
        if class.flags & (class_flags::INTERFACE | class_flags::ABSTRACT) != 0 {
            return Err(ContinuationError::Execution(format!(
                "cannot instantiate abstract type {}",
                class.name
            )));
        }
        let fields = class
            .fields
            .iter()
            .map(|(name, kind)| (name.clone(), Value::zero(*kind)))
            .collect();
        Ok(ObjectRef::new_instance(class.name.clone(), class.cloneable, fields))
    }

    /// Load and instantiate a class by name
    pub fn instantiate_named(&self, name: &str) -> EngineResult<ObjectRef> {
        let class = self.load(name)?;
        self.instantiate(&class)
    }

    /// Whether an object of class `from` can be used as a `to`
    pub fn is_assignable(&self, from: &str, to: &str) -> EngineResult<bool> {
        if from == to || to == OBJECT_CLASS {
            return Ok(true);
        }
        if from.starts_with('[') || to.starts_with('[') {
            return Ok(false);
        }
        Ok(self.load(from)?.is_subclass_of(to))
    }
}

impl ClassBytesProvider for ContinuableClassLoader {
    fn class_bytes(&self, name: &str) -> Option<Vec<u8>> {
        builtin_bytes(name).or_else(|| self.provider.class_bytes(name))
    }
}
