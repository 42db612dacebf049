#![no_main]

//! Arbitrary status codes and reported lengths from the foreign side must
//! never cause an out-of-bounds read or an unbalanced release.

use std::cell::Cell;

use libfuzzer_sys::fuzz_target;
use mobiconvert_gateway::{ConversionGateway, ConversionProvider};

struct Scripted {
    status: i32,
    reported_len: i64,
    payload: Vec<u8>,
    write_pointer: bool,
    allocated: Cell<Option<(usize, usize)>>,
    releases: Cell<u32>,
}

impl ConversionProvider for Scripted {
    unsafe fn invoke(&self, _: *const u8, _: i64, output: *mut *mut u8, output_len: *mut i64) -> i32 {
        if self.write_pointer {
            let boxed: Box<[u8]> = self.payload.clone().into_boxed_slice();
            let len = boxed.len();
            let ptr = Box::into_raw(boxed) as *mut u8;
            self.allocated.set(Some((ptr as usize, len)));
            unsafe { *output = ptr };
        }
        unsafe { *output_len = self.reported_len };
        self.status
    }

    unsafe fn release(&self, buffer: *mut u8) {
        let (ptr, len) = self.allocated.take().expect("release without allocation");
        assert_eq!(ptr, buffer as usize);
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(buffer, len)) });
        self.releases.set(self.releases.get() + 1);
    }

    unsafe fn allocation_size(&self, _buffer: *const u8) -> Option<usize> {
        Some(self.payload.len())
    }
}

fuzz_target!(|input: (i32, i64, bool, Vec<u8>)| {
    let (status, reported_len, write_pointer, payload) = input;
    let gateway = ConversionGateway::new(Scripted {
        status,
        reported_len,
        payload,
        write_pointer,
        allocated: Cell::new(None),
        releases: Cell::new(0),
    });

    if let Ok(bytes) = gateway.convert(b"input") {
        assert!(bytes.len() <= gateway.provider().payload.len());
    }
    assert_eq!(gateway.provider().releases.get(), u32::from(write_pointer));
});
