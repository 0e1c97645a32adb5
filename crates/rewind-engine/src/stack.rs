//! Typed continuation stack
//!
//! Heterogeneous storage for captured locals and operands. Each logical index
//! maps to a `(position, kind)` pair pointing into one of five typed arrays.
//! Storing a value of a different kind under an index allocates a fresh
//! position in the new kind's array; the old position is left behind.
//!
//! Used two ways by a continuation context:
//! - locals: random access through `store_*` / `get_*` by local index
//! - operands: `push_*` / `pop_*` against an implicit height

use crate::defaults::{INITIAL_INT_CAPACITY, INITIAL_MAPPING_CAPACITY, INITIAL_WIDE_CAPACITY};
use crate::error::EngineResult;
use crate::value::{CloneMap, ObjectRef, Value};
use parking_lot::Mutex;
use rewind_bytecode::StackKind;

/// Round a required length up to the next multiple of ten past `index`
fn grown_len(index: usize) -> usize {
    ((index + 1) / 10 + 1) * 10
}

fn ensure_len<T: Clone>(values: &mut Vec<T>, index: usize, fill: T) {
    if index >= values.len() {
        values.resize(grown_len(index), fill);
    }
}

#[derive(Clone)]
struct StackInner {
    position_mapping: Vec<Option<usize>>,
    type_mapping: Vec<Option<StackKind>>,
    height: usize,

    ints: Vec<i32>,
    longs: Vec<i64>,
    floats: Vec<f32>,
    doubles: Vec<f64>,
    refs: Vec<Option<ObjectRef>>,

    int_top: usize,
    long_top: usize,
    float_top: usize,
    double_top: usize,
    ref_top: usize,
}

impl StackInner {
    fn new() -> Self {
        Self {
            position_mapping: vec![None; INITIAL_MAPPING_CAPACITY],
            type_mapping: vec![None; INITIAL_MAPPING_CAPACITY],
            height: 0,
            ints: vec![0; INITIAL_INT_CAPACITY],
            longs: vec![0; INITIAL_WIDE_CAPACITY],
            floats: vec![0.0; INITIAL_WIDE_CAPACITY],
            doubles: vec![0.0; INITIAL_WIDE_CAPACITY],
            refs: vec![None; INITIAL_WIDE_CAPACITY],
            int_top: 0,
            long_top: 0,
            float_top: 0,
            double_top: 0,
            ref_top: 0,
        }
    }

    fn kind_at(&self, index: usize) -> Option<StackKind> {
        self.type_mapping.get(index).copied().flatten()
    }

    /// Position of `index` if it currently holds `kind`
    fn position_of(&self, index: usize, kind: StackKind) -> Option<usize> {
        if self.kind_at(index) != Some(kind) {
            return None;
        }
        self.position_mapping.get(index).copied().flatten()
    }

    fn map_index(&mut self, index: usize, position: usize, kind: StackKind) {
        ensure_len(&mut self.position_mapping, index, None);
        ensure_len(&mut self.type_mapping, index, None);
        self.position_mapping[index] = Some(position);
        self.type_mapping[index] = Some(kind);
    }

    /// Position to write `kind` at `index`, allocating one if the index held
    /// another kind (or nothing)
    fn slot_for(&mut self, index: usize, kind: StackKind) -> usize {
        if let Some(position) = self.position_of(index, kind) {
            return position;
        }
        let top = match kind {
            StackKind::Int => &mut self.int_top,
            StackKind::Long => &mut self.long_top,
            StackKind::Float => &mut self.float_top,
            StackKind::Double => &mut self.double_top,
            StackKind::Object => &mut self.ref_top,
        };
        let position = *top;
        *top += 1;
        self.map_index(index, position, kind);
        match kind {
            StackKind::Int => ensure_len(&mut self.ints, position, 0),
            StackKind::Long => ensure_len(&mut self.longs, position, 0),
            StackKind::Float => ensure_len(&mut self.floats, position, 0.0),
            StackKind::Double => ensure_len(&mut self.doubles, position, 0.0),
            StackKind::Object => ensure_len(&mut self.refs, position, None),
        }
        position
    }

    fn store(&mut self, index: usize, value: Value) {
        let position = self.slot_for(index, value.kind());
        match value {
            Value::Int(v) => self.ints[position] = v,
            Value::Long(v) => self.longs[position] = v,
            Value::Float(v) => self.floats[position] = v,
            Value::Double(v) => self.doubles[position] = v,
            Value::Ref(r) => self.refs[position] = r,
        }
    }

    fn get(&self, index: usize, kind: StackKind) -> Value {
        let Some(position) = self.position_of(index, kind) else {
            return Value::zero(kind);
        };
        match kind {
            StackKind::Int => Value::Int(self.ints.get(position).copied().unwrap_or(0)),
            StackKind::Long => Value::Long(self.longs.get(position).copied().unwrap_or(0)),
            StackKind::Float => Value::Float(self.floats.get(position).copied().unwrap_or(0.0)),
            StackKind::Double => {
                Value::Double(self.doubles.get(position).copied().unwrap_or(0.0))
            }
            StackKind::Object => Value::Ref(self.refs.get(position).cloned().flatten()),
        }
    }
}

/// Typed, growable, internally synchronized slot store
pub struct ContinuationStack {
    inner: Mutex<StackInner>,
}

impl ContinuationStack {
    /// Create a stack with the initial capacities
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StackInner::new()),
        }
    }

    /// Kind currently held at `index`, `None` if never written
    pub fn get_type(&self, index: usize) -> Option<StackKind> {
        self.inner.lock().kind_at(index)
    }

    /// Number of pushed operands
    pub fn height(&self) -> usize {
        self.inner.lock().height
    }

    /// Store a value of any kind at `index`
    pub fn store(&self, index: usize, value: Value) {
        self.inner.lock().store(index, value);
    }

    /// Read `index` as `kind`; zero or null when absent or of another kind
    pub fn get(&self, index: usize, kind: StackKind) -> Value {
        self.inner.lock().get(index, kind)
    }

    /// Push a value of any kind
    pub fn push(&self, value: Value) {
        let mut inner = self.inner.lock();
        let index = inner.height;
        inner.height += 1;
        inner.store(index, value);
    }

    /// Pop the top operand as `kind`; zero or null on an empty stack
    pub fn pop(&self, kind: StackKind) -> Value {
        let mut inner = self.inner.lock();
        if inner.height == 0 {
            return Value::zero(kind);
        }
        inner.height -= 1;
        let index = inner.height;
        inner.get(index, kind)
    }

    /// Store an int
    pub fn store_int(&self, index: usize, value: i32) {
        self.store(index, Value::Int(value));
    }

    /// Store a long
    pub fn store_long(&self, index: usize, value: i64) {
        self.store(index, Value::Long(value));
    }

    /// Store a float
    pub fn store_float(&self, index: usize, value: f32) {
        self.store(index, Value::Float(value));
    }

    /// Store a double
    pub fn store_double(&self, index: usize, value: f64) {
        self.store(index, Value::Double(value));
    }

    /// Store a reference
    pub fn store_reference(&self, index: usize, value: Option<ObjectRef>) {
        self.store(index, Value::Ref(value));
    }

    /// Read an int
    pub fn get_int(&self, index: usize) -> i32 {
        match self.get(index, StackKind::Int) {
            Value::Int(v) => v,
            _ => 0,
        }
    }

    /// Read a long
    pub fn get_long(&self, index: usize) -> i64 {
        match self.get(index, StackKind::Long) {
            Value::Long(v) => v,
            _ => 0,
        }
    }

    /// Read a float
    pub fn get_float(&self, index: usize) -> f32 {
        match self.get(index, StackKind::Float) {
            Value::Float(v) => v,
            _ => 0.0,
        }
    }

    /// Read a double
    pub fn get_double(&self, index: usize) -> f64 {
        match self.get(index, StackKind::Double) {
            Value::Double(v) => v,
            _ => 0.0,
        }
    }

    /// Read a reference
    pub fn get_reference(&self, index: usize) -> Option<ObjectRef> {
        match self.get(index, StackKind::Object) {
            Value::Ref(r) => r,
            _ => None,
        }
    }

    /// Push an int
    pub fn push_int(&self, value: i32) {
        self.push(Value::Int(value));
    }

    /// Push a long
    pub fn push_long(&self, value: i64) {
        self.push(Value::Long(value));
    }

    /// Push a float
    pub fn push_float(&self, value: f32) {
        self.push(Value::Float(value));
    }

    /// Push a double
    pub fn push_double(&self, value: f64) {
        self.push(Value::Double(value));
    }

    /// Push a reference
    pub fn push_reference(&self, value: Option<ObjectRef>) {
        self.push(Value::Ref(value));
    }

    /// Pop an int
    pub fn pop_int(&self) -> i32 {
        match self.pop(StackKind::Int) {
            Value::Int(v) => v,
            _ => 0,
        }
    }

    /// Pop a long
    pub fn pop_long(&self) -> i64 {
        match self.pop(StackKind::Long) {
            Value::Long(v) => v,
            _ => 0,
        }
    }

    /// Pop a float
    pub fn pop_float(&self) -> f32 {
        match self.pop(StackKind::Float) {
            Value::Float(v) => v,
            _ => 0.0,
        }
    }

    /// Pop a double
    pub fn pop_double(&self) -> f64 {
        match self.pop(StackKind::Double) {
            Value::Double(v) => v,
            _ => 0.0,
        }
    }

    /// Pop a reference
    pub fn pop_reference(&self) -> Option<ObjectRef> {
        match self.pop(StackKind::Object) {
            Value::Ref(r) => r,
            _ => None,
        }
    }

    /// Add `delta` to the int at `index`; a slot that isn't an int counts as 0
    pub fn increment_int(&self, index: usize, delta: i32) {
        let mut inner = self.inner.lock();
        let current = match inner.get(index, StackKind::Int) {
            Value::Int(v) => v,
            _ => 0,
        };
        inner.store(index, Value::Int(current.wrapping_add(delta)));
    }

    /// Deep copy; references are cloned through `map`
    ///
    /// Seed `map` with `original continuable -> clone` first so captured
    /// references to the continuable are rebound to its clone.
    pub fn clone_with(&self, map: &mut CloneMap) -> EngineResult<ContinuationStack> {
        let mut copy = self.inner.lock().clone();
        for slot in copy.refs.iter_mut() {
            if let Some(obj) = slot.take() {
                *slot = Some(obj.deep_clone(map)?);
            }
        }
        Ok(ContinuationStack {
            inner: Mutex::new(copy),
        })
    }

    /// Log the full slot layout at trace level
    pub fn trace_state(&self) {
        let inner = self.inner.lock();
        tracing::trace!(
            height = inner.height,
            positions = ?inner.position_mapping,
            types = ?inner.type_mapping,
            ints = ?&inner.ints[..inner.int_top.min(inner.ints.len())],
            longs = ?&inner.longs[..inner.long_top.min(inner.longs.len())],
            references = inner.ref_top,
            "continuation stack"
        );
    }
}

impl Default for ContinuationStack {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContinuationStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ContinuationStack")
            .field("height", &inner.height)
            .field("types", &inner.type_mapping)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    #[test]
    fn test_store_and_get_each_kind() {
        let stack = ContinuationStack::new();
        stack.store_int(0, 7);
        stack.store_long(1, -3);
        stack.store_float(2, 1.5);
        stack.store_double(3, 2.25);
        stack.store_reference(4, Some(ObjectRef::new_string("x")));

        assert_eq!(stack.get_int(0), 7);
        assert_eq!(stack.get_long(1), -3);
        assert_eq!(stack.get_float(2), 1.5);
        assert_eq!(stack.get_double(3), 2.25);
        assert_eq!(stack.get_reference(4).unwrap().as_string().unwrap().as_ref(), "x");
        assert_eq!(stack.get_type(3), Some(StackKind::Double));
        assert_eq!(stack.get_type(9), None);
    }

    #[test]
    fn test_out_of_range_reads_are_zero() {
        let stack = ContinuationStack::new();
        assert_eq!(stack.get_int(500), 0);
        assert!(stack.get_reference(500).is_none());
        assert_eq!(stack.get_type(500), None);
        assert_eq!(stack.pop_long(), 0);
    }

    #[test]
    fn test_kind_change_reallocates() {
        let stack = ContinuationStack::new();
        stack.store_int(2, 10);
        stack.store_double(2, 4.0);
        assert_eq!(stack.get_type(2), Some(StackKind::Double));
        assert_eq!(stack.get_double(2), 4.0);
        assert_eq!(stack.get_int(2), 0);

        stack.store_int(2, 11);
        assert_eq!(stack.get_int(2), 11);
    }

    #[test]
    fn test_growth_past_initial_capacity() {
        let stack = ContinuationStack::new();
        for i in 0..40 {
            stack.store_long(i, i as i64 * 100);
        }
        stack.store_int(123, 5);
        assert_eq!(stack.get_long(39), 3900);
        assert_eq!(stack.get_int(123), 5);
        assert_eq!(grown_len(123), 130);
        assert_eq!(grown_len(9), 20);
    }

    #[test]
    fn test_push_pop_mixed() {
        let stack = ContinuationStack::new();
        stack.push_int(1);
        stack.push_double(2.0);
        stack.push_reference(None);
        assert_eq!(stack.height(), 3);
        assert!(stack.pop_reference().is_none());
        assert_eq!(stack.pop_double(), 2.0);
        assert_eq!(stack.pop_int(), 1);
        assert_eq!(stack.height(), 0);
    }

    #[test]
    fn test_increment_int() {
        let stack = ContinuationStack::new();
        stack.store_int(1, 5);
        stack.increment_int(1, -1);
        assert_eq!(stack.get_int(1), 4);
        stack.increment_int(3, 2);
        assert_eq!(stack.get_int(3), 2);
    }

    #[test]
    fn test_clone_rebinds_continuable() {
        let owner = ObjectRef::new_instance("app/Flow", true, FxHashMap::default());
        let other = ObjectRef::new_instance("app/Data", true, FxHashMap::default());
        let stack = ContinuationStack::new();
        stack.store_reference(0, Some(owner.clone()));
        stack.store_reference(1, Some(other.clone()));
        stack.store_int(2, 9);

        let owner_clone = owner.deep_clone(&mut CloneMap::new()).unwrap();
        let mut map = CloneMap::new();
        map.substitute(&owner, owner_clone.clone());
        let copy = stack.clone_with(&mut map).unwrap();

        assert!(ObjectRef::ptr_eq(&copy.get_reference(0).unwrap(), &owner_clone));
        assert!(!ObjectRef::ptr_eq(&copy.get_reference(1).unwrap(), &other));
        copy.store_int(2, 1);
        assert_eq!(stack.get_int(2), 9);
    }
}
