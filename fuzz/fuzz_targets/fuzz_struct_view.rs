#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_core::native::{NativeStructView, StructDefinition};
use tessera_core::objects::Value;

// Fuzz struct definitions and field access.
//
// The input splits at the first `|`: the left side is parsed as a field
// list; the right side drives accesses, three bytes each:
//   byte 0  bits [1:0] – operation (0=get, 1=set, 2=get element, 3=set element)
//   byte 1  – field index (wrapped to the field count)
//   byte 2  – element index / value payload
//
// Accesses may fail (null pointers, bad indices) but must never panic or
// touch memory outside the view.
fuzz_target!(|data: &[u8]| {
    let split = data.iter().position(|&b| b == b'|').unwrap_or(data.len());
    let Ok(text) = std::str::from_utf8(&data[..split]) else {
        return;
    };
    let Ok(def) = StructDefinition::parse(text) else {
        return;
    };
    if def.fields().is_empty() || def.size() > 4096 {
        return;
    }
    let Ok(view) = NativeStructView::new(def.clone()) else {
        return;
    };

    let ops = data.get(split + 1..).unwrap_or_default();
    for chunk in ops.chunks_exact(3).take(256) {
        let field = &def.fields()[usize::from(chunk[1]) % def.fields().len()];
        let name = field.name();
        let payload = chunk[2];
        match chunk[0] & 0x3 {
            0 => {
                let _ = view.get(name);
            }
            1 => {
                let _ = view.set(name, &Value::Integer(i64::from(payload)));
            }
            2 => {
                let _ = view.get_element(name, usize::from(payload));
            }
            _ => {
                let _ = view.set_element(name, usize::from(payload), &Value::from("x"));
            }
        }
    }

    let _ = view.clone_view();
    let _ = view.field_values();
});
