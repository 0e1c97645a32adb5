//! Runtime values and heap objects
//!
//! Values are typed by storage category, mirroring the instruction set.
//! Heap objects are shared through [`ObjectRef`] (an `Arc`) and guard their
//! mutable state with a `parking_lot::Mutex`, so a paused continuable may be
//! resumed on another thread.
//!
//! # Cloning
//!
//! Deep cloning is identity-aware: a [`CloneMap`] records every object that
//! has already been cloned (old identity -> new object), so shared
//! references stay shared and cycles terminate. Seeding the map with
//! `continuable -> clone` before cloning captured state rebinds every
//! captured reference to the continuable to its clone.

use crate::error::{ContinuationError, EngineResult};
use crate::types::STRING_CLASS;
use parking_lot::{Mutex, MutexGuard};
use rewind_bytecode::StackKind;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// A value held in a local, an operand slot, a field or an array element
#[derive(Clone, Debug)]
pub enum Value {
    /// 32-bit integer (also boolean, byte, char, short)
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Reference, `None` is null
    Ref(Option<ObjectRef>),
}

impl Value {
    /// The null reference
    pub const NULL: Value = Value::Ref(None);

    /// Zero value of a category
    pub fn zero(kind: StackKind) -> Self {
        match kind {
            StackKind::Int => Value::Int(0),
            StackKind::Long => Value::Long(0),
            StackKind::Float => Value::Float(0.0),
            StackKind::Double => Value::Double(0.0),
            StackKind::Object => Value::NULL,
        }
    }

    /// Allocate a string and wrap it
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::Ref(Some(ObjectRef::new_string(s)))
    }

    /// Wrap an object reference
    pub fn object(obj: ObjectRef) -> Self {
        Value::Ref(Some(obj))
    }

    /// Storage category
    pub fn kind(&self) -> StackKind {
        match self {
            Value::Int(_) => StackKind::Int,
            Value::Long(_) => StackKind::Long,
            Value::Float(_) => StackKind::Float,
            Value::Double(_) => StackKind::Double,
            Value::Ref(_) => StackKind::Object,
        }
    }

    /// Whether this is the null reference
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Ref(None))
    }

    fn mismatch(&self, expected: &str) -> ContinuationError {
        ContinuationError::Execution(format!("expected {}, found {:?}", expected, self.kind()))
    }

    /// Read as int
    pub fn as_int(&self) -> EngineResult<i32> {
        match self {
            Value::Int(v) => Ok(*v),
            _ => Err(self.mismatch("int")),
        }
    }

    /// Read as long
    pub fn as_long(&self) -> EngineResult<i64> {
        match self {
            Value::Long(v) => Ok(*v),
            _ => Err(self.mismatch("long")),
        }
    }

    /// Read as float
    pub fn as_float(&self) -> EngineResult<f32> {
        match self {
            Value::Float(v) => Ok(*v),
            _ => Err(self.mismatch("float")),
        }
    }

    /// Read as double
    pub fn as_double(&self) -> EngineResult<f64> {
        match self {
            Value::Double(v) => Ok(*v),
            _ => Err(self.mismatch("double")),
        }
    }

    /// Read as a possibly-null reference
    pub fn as_object(&self) -> EngineResult<Option<ObjectRef>> {
        match self {
            Value::Ref(r) => Ok(r.clone()),
            _ => Err(self.mismatch("reference")),
        }
    }

    /// Reference identity for references, value equality otherwise
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Ref(None), Value::Ref(None)) => true,
            (Value::Ref(Some(a)), Value::Ref(Some(b))) => ObjectRef::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Deep-clone through `map`; primitives are copied
    pub fn deep_clone(&self, map: &mut CloneMap) -> EngineResult<Value> {
        match self {
            Value::Ref(Some(obj)) => Ok(Value::Ref(Some(obj.deep_clone(map)?))),
            other => Ok(other.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Ref(None) => f.write_str("null"),
            Value::Ref(Some(obj)) => match obj.as_string() {
                Some(s) => f.write_str(&s),
                None => write!(f, "{}@{:x}", obj.class_name(), obj.identity()),
            },
        }
    }
}

/// Typed array storage
#[derive(Clone, Debug)]
pub enum ArrayData {
    /// int, boolean, byte, char and short elements
    Int(Vec<i32>),
    /// long elements
    Long(Vec<i64>),
    /// float elements
    Float(Vec<f32>),
    /// double elements
    Double(Vec<f64>),
    /// reference elements
    Ref(Vec<Option<ObjectRef>>),
}

impl ArrayData {
    /// Zero-filled array of `len` elements of `kind`
    pub fn zeroed(kind: StackKind, len: usize) -> Self {
        match kind {
            StackKind::Int => ArrayData::Int(vec![0; len]),
            StackKind::Long => ArrayData::Long(vec![0; len]),
            StackKind::Float => ArrayData::Float(vec![0.0; len]),
            StackKind::Double => ArrayData::Double(vec![0.0; len]),
            StackKind::Object => ArrayData::Ref(vec![None; len]),
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Int(v) => v.len(),
            ArrayData::Long(v) => v.len(),
            ArrayData::Float(v) => v.len(),
            ArrayData::Double(v) => v.len(),
            ArrayData::Ref(v) => v.len(),
        }
    }

    /// Whether the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read an element; `None` when out of bounds
    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            ArrayData::Int(v) => v.get(index).map(|x| Value::Int(*x)),
            ArrayData::Long(v) => v.get(index).map(|x| Value::Long(*x)),
            ArrayData::Float(v) => v.get(index).map(|x| Value::Float(*x)),
            ArrayData::Double(v) => v.get(index).map(|x| Value::Double(*x)),
            ArrayData::Ref(v) => v.get(index).map(|x| Value::Ref(x.clone())),
        }
    }

    /// Write an element; `Ok(false)` when out of bounds
    pub fn set(&mut self, index: usize, value: Value) -> EngineResult<bool> {
        if index >= self.len() {
            return Ok(false);
        }
        match self {
            ArrayData::Int(v) => v[index] = value.as_int()?,
            ArrayData::Long(v) => v[index] = value.as_long()?,
            ArrayData::Float(v) => v[index] = value.as_float()?,
            ArrayData::Double(v) => v[index] = value.as_double()?,
            ArrayData::Ref(v) => v[index] = value.as_object()?,
        }
        Ok(true)
    }
}

/// Mutable state of a heap object
#[derive(Clone, Debug)]
pub enum ObjectData {
    /// Class instance with named fields
    Instance(FxHashMap<String, Value>),
    /// Immutable string
    Str(Arc<str>),
    /// Array
    Array(ArrayData),
}

/// A heap-allocated object
pub struct HeapObject {
    class_name: String,
    cloneable: bool,
    data: Mutex<ObjectData>,
}

/// Shared reference to a heap object
#[derive(Clone)]
pub struct ObjectRef(Arc<HeapObject>);

impl ObjectRef {
    /// Allocate a class instance
    pub fn new_instance(
        class_name: impl Into<String>,
        cloneable: bool,
        fields: FxHashMap<String, Value>,
    ) -> Self {
        Self::alloc(class_name.into(), cloneable, ObjectData::Instance(fields))
    }

    /// Allocate a string
    pub fn new_string(value: impl Into<Arc<str>>) -> Self {
        Self::alloc(STRING_CLASS.to_string(), false, ObjectData::Str(value.into()))
    }

    /// Allocate an array; `descriptor` is the array type, e.g. `[I`
    pub fn new_array(descriptor: impl Into<String>, data: ArrayData) -> Self {
        Self::alloc(descriptor.into(), true, ObjectData::Array(data))
    }

    fn alloc(class_name: String, cloneable: bool, data: ObjectData) -> Self {
        ObjectRef(Arc::new(HeapObject {
            class_name,
            cloneable,
            data: Mutex::new(data),
        }))
    }

    /// Internal class name (array descriptor for arrays)
    pub fn class_name(&self) -> &str {
        &self.0.class_name
    }

    /// Whether instances of this object's class may be cloned
    pub fn is_cloneable(&self) -> bool {
        self.0.cloneable
    }

    /// Identity comparison
    pub fn ptr_eq(a: &ObjectRef, b: &ObjectRef) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Stable identity for the lifetime of the object
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Lock the object's state
    pub fn lock(&self) -> MutexGuard<'_, ObjectData> {
        self.0.data.lock()
    }

    /// String contents, if this is a string
    pub fn as_string(&self) -> Option<Arc<str>> {
        match &*self.lock() {
            ObjectData::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Read an instance field
    pub fn get_field(&self, name: &str) -> Option<Value> {
        match &*self.lock() {
            ObjectData::Instance(fields) => fields.get(name).cloned(),
            _ => None,
        }
    }

    /// Write an instance field; returns `false` if the field doesn't exist
    pub fn set_field(&self, name: &str, value: Value) -> bool {
        match &mut *self.lock() {
            ObjectData::Instance(fields) => match fields.get_mut(name) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Deep-clone this object through `map`
    ///
    /// Strings are immutable and returned as-is. Instances of classes
    /// without the clone contract fail with
    /// [`ContinuationError::CloneNotSupported`].
    pub fn deep_clone(&self, map: &mut CloneMap) -> EngineResult<ObjectRef> {
        if let Some(done) = map.get(self) {
            return Ok(done);
        }

        // Snapshot under the lock, clone children without holding it.
        let snapshot = self.lock().clone();
        let shallow = match snapshot {
            ObjectData::Str(_) => return Ok(self.clone()),
            ObjectData::Instance(_) if !self.is_cloneable() => {
                return Err(ContinuationError::CloneNotSupported(self.class_name().to_string()))
            }
            other => other,
        };

        let copy = Self::alloc(
            self.0.class_name.clone(),
            self.0.cloneable,
            ObjectData::Instance(FxHashMap::default()),
        );
        map.substitute(self, copy.clone());

        let cloned = match shallow {
            ObjectData::Instance(fields) => {
                let mut out = FxHashMap::default();
                for (name, value) in fields {
                    out.insert(name, value.deep_clone(map)?);
                }
                ObjectData::Instance(out)
            }
            ObjectData::Array(ArrayData::Ref(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(match item {
                        Some(obj) => Some(obj.deep_clone(map)?),
                        None => None,
                    });
                }
                ObjectData::Array(ArrayData::Ref(out))
            }
            primitive => primitive,
        };
        *copy.lock() = cloned;
        Ok(copy)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({}@{:x})", self.class_name(), self.identity())
    }
}

/// Identity substitution table used while deep-cloning
#[derive(Default)]
pub struct CloneMap {
    clones: FxHashMap<usize, ObjectRef>,
    // Keeps originals alive so identities can't be reused mid-clone.
    originals: Vec<ObjectRef>,
}

impl CloneMap {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `original` to `replacement` for the rest of this clone
    pub fn substitute(&mut self, original: &ObjectRef, replacement: ObjectRef) {
        self.clones.insert(original.identity(), replacement);
        self.originals.push(original.clone());
    }

    /// Replacement recorded for `original`
    pub fn get(&self, original: &ObjectRef) -> Option<ObjectRef> {
        self.clones.get(&original.identity()).cloned()
    }

    /// Number of recorded substitutions
    pub fn len(&self) -> usize {
        self.clones.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.clones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(class: &str, cloneable: bool, fields: &[(&str, Value)]) -> ObjectRef {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        ObjectRef::new_instance(class, cloneable, fields)
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let inner = instance("app/Box", true, &[("n", Value::Int(1))]);
        let outer = instance("app/Holder", true, &[("box", Value::object(inner.clone()))]);

        let copy = outer.deep_clone(&mut CloneMap::new()).unwrap();
        let copied_inner = copy.get_field("box").unwrap().as_object().unwrap().unwrap();
        assert!(!ObjectRef::ptr_eq(&inner, &copied_inner));

        copied_inner.set_field("n", Value::Int(2));
        assert_eq!(inner.get_field("n").unwrap().as_int().unwrap(), 1);
    }

    #[test]
    fn test_self_reference_rebinds_to_clone() {
        let obj = instance("app/Node", true, &[("me", Value::NULL)]);
        obj.set_field("me", Value::object(obj.clone()));

        let copy = obj.deep_clone(&mut CloneMap::new()).unwrap();
        let me = copy.get_field("me").unwrap().as_object().unwrap().unwrap();
        assert!(ObjectRef::ptr_eq(&me, &copy));
    }

    #[test]
    fn test_shared_reference_stays_shared() {
        let shared = instance("app/Box", true, &[]);
        let arr = ObjectRef::new_array(
            "[Lapp/Box;",
            ArrayData::Ref(vec![Some(shared.clone()), Some(shared)]),
        );
        let copy = arr.deep_clone(&mut CloneMap::new()).unwrap();
        let guard = copy.lock();
        match &*guard {
            ObjectData::Array(ArrayData::Ref(items)) => {
                let a = items[0].as_ref().unwrap();
                let b = items[1].as_ref().unwrap();
                assert!(ObjectRef::ptr_eq(a, b));
            }
            _ => panic!("expected reference array"),
        }
    }

    #[test]
    fn test_seeded_substitution() {
        let continuable = instance("app/Flow", true, &[]);
        let replacement = instance("app/Flow", true, &[]);
        let mut map = CloneMap::new();
        map.substitute(&continuable, replacement.clone());

        let cloned = Value::object(continuable).deep_clone(&mut map).unwrap();
        assert!(cloned.same(&Value::object(replacement)));
    }

    #[test]
    fn test_clone_not_supported_names_class() {
        let obj = instance("app/Socket", false, &[]);
        let err = obj.deep_clone(&mut CloneMap::new()).unwrap_err();
        assert!(err.to_string().contains("app/Socket"));
    }

    #[test]
    fn test_strings_are_shared() {
        let s = ObjectRef::new_string("hi");
        let copy = s.deep_clone(&mut CloneMap::new()).unwrap();
        assert!(ObjectRef::ptr_eq(&s, &copy));
        assert_eq!(Value::object(copy).to_string(), "hi");
    }
}
