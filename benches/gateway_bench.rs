use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use mobiconvert_gateway::fingerprint::Fingerprint;
use mobiconvert_gateway::{ConversionGateway, ConversionProvider, GatewayOptions};
use std::hint::black_box;
use std::ptr;

/// Copies the input into a `malloc` buffer, standing in for the native call.
struct CopyLibrary;

impl ConversionProvider for CopyLibrary {
    unsafe fn invoke(
        &self,
        input: *const u8,
        input_len: i64,
        output: *mut *mut u8,
        output_len: *mut i64,
    ) -> i32 {
        let len = input_len as usize;
        unsafe {
            let out = libc::malloc(len.max(1)) as *mut u8;
            if out.is_null() {
                return 1;
            }
            ptr::copy_nonoverlapping(input, out, len);
            *output = out;
            *output_len = input_len;
        }
        0
    }

    unsafe fn release(&self, buffer: *mut u8) {
        unsafe { libc::free(buffer.cast()) };
    }
}

fn bench_gateway(c: &mut Criterion) {
    // `malloc` gives no portable size query; the copy length is known-good.
    let options = GatewayOptions {
        trust_unverified_len: true,
        ..GatewayOptions::default()
    };
    let gateway = ConversionGateway::with_options(CopyLibrary, options);
    let mut group = c.benchmark_group("gateway");

    for size in [1usize << 10, 1 << 16, 1 << 20] {
        let input = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("convert_{size}"), |b| {
            b.iter(|| gateway.convert(black_box(&input)).unwrap())
        });
        group.bench_function(format!("fingerprint_{size}"), |b| {
            b.iter(|| Fingerprint::of(black_box(&input)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_gateway);
criterion_main!(benches);
