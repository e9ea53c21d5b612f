use crate::chunk::Chunk;
use crate::value::Value;
use flood_core::symbol::hash_name;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Host function callable from scripts. Methods receive their receiver as
/// the first argument.
pub type NativeFn = Rc<dyn Fn(&mut Heap, &[Value]) -> Result<Value, String>>;

/// Generation-checked handle into the heap slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ObjRef {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjKind {
    Function,
    List,
    Native,
    String,
}

impl ObjKind {
    pub fn name(self) -> &'static str {
        match self {
            ObjKind::Function => "function",
            ObjKind::List => "list",
            ObjKind::Native => "native",
            ObjKind::String => "string",
        }
    }
}

impl fmt::Display for ObjKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub arity: usize,
    pub chunk: Chunk,
}

pub struct Native {
    pub name: String,
    pub arity: usize,
    pub code: NativeFn,
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Native")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringObj {
    pub chars: String,
    pub hash: u32,
}

impl StringObj {
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

#[derive(Debug)]
pub enum Object {
    Function(Function),
    List(Vec<Value>),
    Native(Native),
    String(StringObj),
}

impl Object {
    pub fn kind(&self) -> ObjKind {
        match self {
            Object::Function(_) => ObjKind::Function,
            Object::List(_) => ObjKind::List,
            Object::Native(_) => ObjKind::Native,
            Object::String(_) => ObjKind::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Color {
    White,
    Gray,
    Black,
}

#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) color: Color,
    pub(crate) object: Object,
}

#[derive(Debug, Default)]
pub(crate) struct Slot {
    pub(crate) generation: u32,
    pub(crate) entry: Option<Entry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("stale object reference (slot {index}, generation {generation})")]
    Stale { index: u32, generation: u32 },
    #[error("expected {expected}, found {found}")]
    WrongKind { expected: ObjKind, found: ObjKind },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub alloc_count: usize,
    pub live: usize,
    pub peak_live: usize,
    pub gc_runs: usize,
    pub last_freed: usize,
    pub last_live: usize,
}

/// Slab owning every heap object. Freed slots are recycled with a bumped
/// generation so old handles are detected instead of aliasing new objects.
#[derive(Debug, Default)]
pub struct Heap {
    pub(crate) slots: Vec<Slot>,
    pub(crate) free: Vec<u32>,
    pub(crate) stats: HeapStats,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, object: Object) -> ObjRef {
        let entry = Entry {
            color: Color::White,
            object,
        };
        self.stats.alloc_count += 1;
        self.stats.live += 1;
        self.stats.peak_live = self.stats.peak_live.max(self.stats.live);
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return ObjRef {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        ObjRef {
            index,
            generation: 0,
        }
    }

    pub fn alloc_string(&mut self, text: &str) -> ObjRef {
        self.alloc(Object::String(StringObj {
            chars: text.to_string(),
            hash: hash_name(text),
        }))
    }

    pub fn get(&self, obj: ObjRef) -> Result<&Object, HeapError> {
        self.entry(obj).map(|entry| &entry.object)
    }

    pub fn get_mut(&mut self, obj: ObjRef) -> Result<&mut Object, HeapError> {
        self.slots
            .get_mut(obj.index())
            .filter(|slot| slot.generation == obj.generation)
            .and_then(|slot| slot.entry.as_mut())
            .map(|entry| &mut entry.object)
            .ok_or(stale(obj))
    }

    pub fn kind(&self, obj: ObjRef) -> Result<ObjKind, HeapError> {
        self.get(obj).map(Object::kind)
    }

    pub fn is_live(&self, obj: ObjRef) -> bool {
        self.entry(obj).is_ok()
    }

    pub fn function(&self, obj: ObjRef) -> Result<&Function, HeapError> {
        match self.get(obj)? {
            Object::Function(function) => Ok(function),
            other => Err(wrong_kind(ObjKind::Function, other)),
        }
    }

    pub fn list(&self, obj: ObjRef) -> Result<&Vec<Value>, HeapError> {
        match self.get(obj)? {
            Object::List(elements) => Ok(elements),
            other => Err(wrong_kind(ObjKind::List, other)),
        }
    }

    pub fn list_mut(&mut self, obj: ObjRef) -> Result<&mut Vec<Value>, HeapError> {
        match self.get_mut(obj)? {
            Object::List(elements) => Ok(elements),
            other => Err(wrong_kind(ObjKind::List, other)),
        }
    }

    pub fn string(&self, obj: ObjRef) -> Result<&StringObj, HeapError> {
        match self.get(obj)? {
            Object::String(string) => Ok(string),
            other => Err(wrong_kind(ObjKind::String, other)),
        }
    }

    pub fn native(&self, obj: ObjRef) -> Result<&Native, HeapError> {
        match self.get(obj)? {
            Object::Native(native) => Ok(native),
            other => Err(wrong_kind(ObjKind::Native, other)),
        }
    }

    pub fn live_count(&self) -> usize {
        self.stats.live
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    pub(crate) fn entry(&self, obj: ObjRef) -> Result<&Entry, HeapError> {
        self.slots
            .get(obj.index())
            .filter(|slot| slot.generation == obj.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(stale(obj))
    }
}

fn stale(obj: ObjRef) -> HeapError {
    HeapError::Stale {
        index: obj.index,
        generation: obj.generation,
    }
}

fn wrong_kind(expected: ObjKind, found: &Object) -> HeapError {
    HeapError::WrongKind {
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_returns_typed_objects() {
        let mut heap = Heap::new();
        let list = heap.alloc(Object::List(vec![Value::Num(1.0)]));
        let text = heap.alloc_string("hello");
        assert_eq!(heap.list(list).unwrap(), &vec![Value::Num(1.0)]);
        assert_eq!(heap.string(text).unwrap().len(), 5);
        assert_eq!(heap.string(text).unwrap().hash, hash_name("hello"));
        assert_eq!(heap.kind(list).unwrap(), ObjKind::List);
        assert_eq!(heap.live_count(), 2);
    }

    #[test]
    fn typed_accessor_rejects_wrong_kind() {
        let mut heap = Heap::new();
        let text = heap.alloc_string("x");
        let err = heap.list(text).unwrap_err();
        assert_eq!(
            err,
            HeapError::WrongKind {
                expected: ObjKind::List,
                found: ObjKind::String
            }
        );
        assert_eq!(err.to_string(), "expected list, found string");
    }

    #[test]
    fn list_mut_updates_in_place() {
        let mut heap = Heap::new();
        let list = heap.alloc(Object::List(Vec::new()));
        heap.list_mut(list).unwrap().push(Value::Bool(true));
        assert_eq!(heap.list(list).unwrap().len(), 1);
    }

    #[test]
    fn stats_track_allocations() {
        let mut heap = Heap::new();
        heap.alloc_string("a");
        heap.alloc_string("b");
        let stats = heap.stats();
        assert_eq!(stats.alloc_count, 2);
        assert_eq!(stats.live, 2);
        assert_eq!(stats.peak_live, 2);
        assert_eq!(stats.gc_runs, 0);
    }
}
