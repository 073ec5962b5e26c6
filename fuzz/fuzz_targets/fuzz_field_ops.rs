#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_core::objects::{AssociativeArray, Value};

// Fuzz random field and list operations on an `AssociativeArray` and check
// that the zone ordering survives every step.
//
// Each operation is encoded in two bytes:
//   byte 0  bits [2:0] – operation selector
//           bits [7:3] – value payload
//   byte 1  bits [3:0] – key index (integers -2..14 or names k0-k15)
//           bit  [4]   – string key instead of integer key
//           bits [7:5] – span length for ranged operations
fuzz_target!(|data: &[u8]| {
    let array = AssociativeArray::new();
    const MAX_OPS: usize = 256;

    for chunk in data.chunks_exact(2).take(MAX_OPS) {
        let op = chunk[0] & 0x7;
        let payload = i64::from(chunk[0] >> 3);
        let key_idx = chunk[1] & 0xf;
        let span = i64::from(chunk[1] >> 5);

        let key = if chunk[1] & 0x10 != 0 {
            Value::from(format!("k{key_idx}"))
        } else {
            Value::Integer(i64::from(key_idx) - 2)
        };
        let index = i64::from(key_idx) - 2;

        match op {
            0 => {
                let _ = array.set(&key, Value::Integer(payload));
            }
            1 => {
                let _ = array.set(&key, Value::from(format!("text{payload}")));
            }
            2 => {
                let _ = array.remove(&key);
            }
            3 => {
                let _ = array.append(Value::Integer(payload));
            }
            4 => {
                let _ = array.insert_at(index, vec![Value::Integer(payload); span as usize + 1]);
            }
            5 => {
                let _ = array.remove_span(index, span);
            }
            6 => {
                let _ = array.delete_range(index, index + span);
            }
            _ => {
                let _ = array.pop();
            }
        }
        assert!(array.check_invariants());
    }

    let _ = array.list_values();
    let _ = array.clone_array();
});
