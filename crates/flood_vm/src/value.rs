use crate::heap::{Heap, ObjRef, Object};
use std::collections::HashSet;

/// A VM value. Heap objects are referenced by slab index, so copying a value
/// never copies the object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Num(f64),
    Obj(ObjRef),
}

impl Value {
    pub fn as_obj(self) -> Option<ObjRef> {
        match self {
            Value::Obj(obj) => Some(obj),
            _ => None,
        }
    }
}

pub fn type_name(heap: &Heap, value: Value) -> &'static str {
    match value {
        Value::Nil => "null",
        Value::Bool(_) => "bool",
        Value::Num(_) => "number",
        Value::Obj(obj) => heap.kind(obj).map(|kind| kind.name()).unwrap_or("freed"),
    }
}

/// The form `print` writes. Lists are walked with an explicit work stack,
/// so nesting depth is bounded by the heap rather than the native stack.
pub fn display(heap: &Heap, value: Value) -> String {
    let mut out = String::new();
    let mut open_lists: HashSet<ObjRef> = HashSet::new();
    let mut work = vec![Piece::Value(value)];

    while let Some(piece) = work.pop() {
        let value = match piece {
            Piece::Text(text) => {
                out.push_str(text);
                continue;
            }
            Piece::Close(list) => {
                out.push(']');
                open_lists.remove(&list);
                continue;
            }
            Piece::Value(value) => value,
        };
        match value {
            Value::Nil => out.push_str("null"),
            Value::Bool(flag) => out.push_str(if flag { "true" } else { "false" }),
            Value::Num(number) => out.push_str(&format_number(number)),
            Value::Obj(obj) => match heap.get(obj) {
                Err(_) => out.push_str("<freed>"),
                Ok(Object::Function(function)) => out.push_str(&format!("<function {}>", function.name)),
                Ok(Object::Native(native)) => out.push_str(&format!("<native {}>", native.name)),
                Ok(Object::String(string)) => out.push_str(&string.chars),
                Ok(Object::List(elements)) => {
                    // a list already being printed is a cycle
                    if !open_lists.insert(obj) {
                        out.push_str("...");
                        continue;
                    }
                    out.push('[');
                    work.push(Piece::Close(obj));
                    for (index, element) in elements.iter().enumerate().rev() {
                        work.push(Piece::Value(*element));
                        if index > 0 {
                            work.push(Piece::Text(", "));
                        }
                    }
                }
            },
        }
    }
    out
}

enum Piece {
    Value(Value),
    Text(&'static str),
    Close(ObjRef),
}

/// Formats like C's `%.14g`.
pub fn format_number(number: f64) -> String {
    const PRECISION: i32 = 14;
    if number.is_nan() {
        return "nan".to_string();
    }
    if number.is_infinite() {
        return if number > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if number == 0.0 {
        return if number.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, number);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let mantissa = trim_fraction(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    } else {
        let decimals = (PRECISION - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{number:.decimals$}")).to_string()
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}
