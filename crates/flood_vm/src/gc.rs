//! Tri-color mark and sweep over the heap slab.

use crate::heap::{Color, Heap, ObjRef, Object};
use crate::value::Value;
use tracing::debug;

/// Everything the collector treats as reachable by definition.
#[derive(Debug, Default, Clone, Copy)]
pub struct Roots<'a> {
    pub stack: &'a [Value],
    pub globals: &'a [Value],
    pub frames: &'a [ObjRef],
    pub pinned: &'a [Value],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcReport {
    pub marked: usize,
    pub freed: usize,
    pub live: usize,
}

impl Heap {
    pub fn collect(&mut self, roots: &Roots<'_>) -> GcReport {
        let mut gray = Vec::new();
        let values = roots
            .stack
            .iter()
            .chain(roots.globals)
            .chain(roots.pinned)
            .filter_map(|value| value.as_obj());
        for obj in values.chain(roots.frames.iter().copied()) {
            self.shade(obj, &mut gray);
        }

        let mut marked = 0;
        while let Some(obj) = gray.pop() {
            marked += 1;
            self.blacken(obj, &mut gray);
        }

        let (freed, live) = self.sweep();
        self.stats.gc_runs += 1;
        self.stats.last_freed = freed;
        self.stats.last_live = live;
        self.stats.live = live;
        debug!(marked, freed, live, "gc cycle");
        GcReport {
            marked,
            freed,
            live,
        }
    }

    /// White to gray. Stale handles are ignored.
    fn shade(&mut self, obj: ObjRef, gray: &mut Vec<ObjRef>) {
        let Some(slot) = self.slots.get_mut(obj.index()) else {
            return;
        };
        if slot.generation != obj.generation {
            return;
        }
        if let Some(entry) = slot.entry.as_mut() {
            if entry.color == Color::White {
                entry.color = Color::Gray;
                gray.push(obj);
            }
        }
    }

    fn blacken(&mut self, obj: ObjRef, gray: &mut Vec<ObjRef>) {
        let children: Vec<ObjRef> = match self.entry(obj) {
            Ok(entry) => match &entry.object {
                Object::Function(function) => function
                    .chunk
                    .constants
                    .iter()
                    .filter_map(|value| value.as_obj())
                    .collect(),
                Object::List(elements) => elements.iter().filter_map(|value| value.as_obj()).collect(),
                Object::Native(_) | Object::String(_) => Vec::new(),
            },
            Err(_) => return,
        };
        if let Some(entry) = self.slots[obj.index()].entry.as_mut() {
            entry.color = Color::Black;
        }
        for child in children {
            self.shade(child, gray);
        }
    }

    fn sweep(&mut self) -> (usize, usize) {
        let mut freed = 0;
        let mut live = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(entry) = slot.entry.as_mut() else {
                continue;
            };
            if entry.color == Color::White {
                slot.entry = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                freed += 1;
            } else {
                entry.color = Color::White;
                live += 1;
            }
        }
        (freed, live)
    }
}
