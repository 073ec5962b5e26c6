#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_core::objects::{AssociativeArray, Value};
use tessera_core::ObjectRef;

// Fuzz reference juggling across a small object graph.
//
// Each byte is one operation:
//   bits [1:0] – 0=clone a handle, 1=drop a handle, 2=link two objects, 3=unlink
//   bits [4:2] – first handle index
//   bits [7:5] – second handle index
//
// Cycles formed by linking are broken by unlinking before the end; the
// final sweep clears every object so no teardown is left pending.
fuzz_target!(|data: &[u8]| {
    let roots: Vec<ObjectRef> = (0..4).map(|_| AssociativeArray::create()).collect();
    let mut handles: Vec<ObjectRef> = roots.clone();

    for &byte in data.iter().take(512) {
        let a = usize::from((byte >> 2) & 0x7);
        let b = usize::from(byte >> 5);
        match byte & 0x3 {
            0 => {
                if let Some(h) = handles.get(a % handles.len().max(1)).cloned() {
                    handles.push(h);
                }
            }
            1 => {
                if handles.len() > roots.len() {
                    let i = a % handles.len();
                    handles.swap_remove(i.max(roots.len()).min(handles.len() - 1));
                }
            }
            2 => {
                let (from, to) = (&roots[a % roots.len()], &roots[b % roots.len()]);
                if let Some(array) = from.downcast_ref::<AssociativeArray>() {
                    let _ = array.set(&Value::from(format!("r{}", b % roots.len())), Value::Object(to.clone()));
                }
            }
            _ => {
                let from = &roots[a % roots.len()];
                if let Some(array) = from.downcast_ref::<AssociativeArray>() {
                    let _ = array.remove(&Value::from(format!("r{}", b % roots.len())));
                }
            }
        }
        assert!(roots.iter().all(|r| !r.is_destroyed()));
    }

    for root in &roots {
        if let Some(array) = root.downcast_ref::<AssociativeArray>() {
            array.clear();
        }
    }
    drop(handles);
    assert!(roots.iter().all(|r| r.ref_count() == 1));
});
