use crate::heap::{Heap, ObjKind};
use crate::value::{type_name, Value};
use crate::vm::Vm;
use std::time::{SystemTime, UNIX_EPOCH};

/// Global natives in slot order.
pub(crate) fn install(vm: &mut Vm) {
    vm.define_native("clock", 0, clock);
    vm.define_native("type", 1, type_of);
    vm.define_method(ObjKind::List, "push", 1, list_push);
    vm.define_method(ObjKind::List, "pop", 0, list_pop);
    vm.define_method(ObjKind::List, "len", 0, list_len);
}

fn clock(_heap: &mut Heap, _args: &[Value]) -> Result<Value, String> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| err.to_string())?;
    Ok(Value::Num(elapsed.as_secs_f64()))
}

fn type_of(heap: &mut Heap, args: &[Value]) -> Result<Value, String> {
    let [value] = args else {
        return Err("type expects 1 argument".to_string());
    };
    let name = type_name(heap, *value);
    Ok(Value::Obj(heap.alloc_string(name)))
}

fn list_push(heap: &mut Heap, args: &[Value]) -> Result<Value, String> {
    let [Value::Obj(list), value] = args else {
        return Err("push expects a list receiver and 1 argument".to_string());
    };
    heap.list_mut(*list).map_err(|err| err.to_string())?.push(*value);
    Ok(Value::Nil)
}

fn list_pop(heap: &mut Heap, args: &[Value]) -> Result<Value, String> {
    let [Value::Obj(list)] = args else {
        return Err("pop expects a list receiver".to_string());
    };
    heap.list_mut(*list)
        .map_err(|err| err.to_string())?
        .pop()
        .ok_or_else(|| "pop from empty list".to_string())
}

fn list_len(heap: &mut Heap, args: &[Value]) -> Result<Value, String> {
    let [Value::Obj(list)] = args else {
        return Err("len expects a list receiver".to_string());
    };
    let len = heap.list(*list).map_err(|err| err.to_string())?.len();
    Ok(Value::Num(len as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Object;

    #[test]
    fn push_pop_len_round_trip() {
        let mut heap = Heap::new();
        let list = Value::Obj(heap.alloc(Object::List(Vec::new())));
        assert_eq!(list_push(&mut heap, &[list, Value::Num(4.0)]), Ok(Value::Nil));
        assert_eq!(list_push(&mut heap, &[list, Value::Bool(true)]), Ok(Value::Nil));
        assert_eq!(list_len(&mut heap, &[list]), Ok(Value::Num(2.0)));
        assert_eq!(list_pop(&mut heap, &[list]), Ok(Value::Bool(true)));
        assert_eq!(list_pop(&mut heap, &[list]), Ok(Value::Num(4.0)));
        assert_eq!(list_pop(&mut heap, &[list]), Err("pop from empty list".to_string()));
    }

    #[test]
    fn type_allocates_a_fresh_string() {
        let mut heap = Heap::new();
        let Ok(Value::Obj(name)) = type_of(&mut heap, &[Value::Num(1.0)]) else {
            panic!("expected string");
        };
        assert_eq!(heap.string(name).unwrap().chars, "number");
        let Ok(Value::Obj(again)) = type_of(&mut heap, &[Value::Nil]) else {
            panic!("expected string");
        };
        assert_eq!(heap.string(again).unwrap().chars, "null");
        assert_ne!(name, again);
    }

    #[test]
    fn clock_is_positive() {
        let mut heap = Heap::new();
        let Ok(Value::Num(seconds)) = clock(&mut heap, &[]) else {
            panic!("expected number");
        };
        assert!(seconds > 0.0);
    }
}
