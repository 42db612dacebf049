//! File job tests

use mobiconvert_gateway::job::{FileJob, convert_file};
use mobiconvert_gateway::{ConversionGateway, ConversionProvider, GatewayError};
use std::fs;
use std::slice;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

/// Reverses the input; fails with status 5 when the input starts with `!`.
#[derive(Default)]
struct ReverseLibrary {
    releases: AtomicUsize,
    lengths: std::sync::Mutex<Vec<(usize, usize)>>,
}

impl ConversionProvider for ReverseLibrary {
    unsafe fn invoke(
        &self,
        input: *const u8,
        input_len: i64,
        output: *mut *mut u8,
        output_len: *mut i64,
    ) -> i32 {
        let bytes = unsafe { slice::from_raw_parts(input, input_len as usize) };
        if bytes.first() == Some(&b'!') {
            return 5;
        }
        let reversed: Box<[u8]> = bytes.iter().rev().copied().collect();
        let len = reversed.len();
        let ptr = Box::into_raw(reversed) as *mut u8;
        self.lengths.lock().unwrap().push((ptr as usize, len));
        unsafe {
            *output = ptr;
            *output_len = len as i64;
        }
        0
    }

    unsafe fn release(&self, buffer: *mut u8) {
        let mut lengths = self.lengths.lock().unwrap();
        let index = lengths
            .iter()
            .position(|(p, _)| *p == buffer as usize)
            .expect("released pointer was allocated here");
        let (_, len) = lengths.swap_remove(index);
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(buffer, len)) });
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    unsafe fn allocation_size(&self, buffer: *const u8) -> Option<usize> {
        let lengths = self.lengths.lock().unwrap();
        lengths
            .iter()
            .find(|(p, _)| *p == buffer as usize)
            .map(|(_, len)| *len)
    }
}

#[test]
fn test_convert_file_writes_output() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("test.azw3");
    let output = dir.path().join("test.epub");
    fs::write(&input, b"abcdef").unwrap();

    let gateway = ConversionGateway::new(ReverseLibrary::default());
    let report = convert_file(&gateway, &input, &output).expect("job should succeed");

    assert_eq!(fs::read(&output).unwrap(), b"fedcba");
    assert_eq!(report.output, b"fedcba");
    assert_eq!(gateway.provider().releases.load(Ordering::SeqCst), 1);
}

#[test]
fn test_missing_input_is_io_error() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("missing.azw3");
    let output = dir.path().join("missing.epub");

    let gateway = ConversionGateway::new(ReverseLibrary::default());
    match convert_file(&gateway, &input, &output) {
        Err(GatewayError::Io { path, .. }) => assert_eq!(path, input),
        other => panic!("expected Io error, got {other:?}"),
    }
    assert!(!output.exists());
}

#[test]
fn test_failed_conversion_writes_nothing() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("bad.azw3");
    let output = dir.path().join("bad.epub");
    fs::write(&input, b"!corrupt").unwrap();

    let gateway = ConversionGateway::new(ReverseLibrary::default());
    let err = convert_file(&gateway, &input, &output).unwrap_err();

    assert!(matches!(err, GatewayError::ConversionFailed(5)));
    assert_eq!(err.code(), 2);
    assert!(!output.exists());
}

#[test]
fn test_unwritable_output_is_io_error() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("book.azw3");
    fs::write(&input, b"xyz").unwrap();
    let output = dir.path().join("no-such-dir").join("book.epub");

    let gateway = ConversionGateway::new(ReverseLibrary::default());
    match convert_file(&gateway, &input, &output) {
        Err(GatewayError::Io { path, .. }) => assert_eq!(path, output),
        other => panic!("expected Io error, got {other:?}"),
    }
    // Buffer was still released after the copy.
    assert_eq!(gateway.provider().releases.load(Ordering::SeqCst), 1);
}

#[test]
fn test_file_job_default_output_and_timeout() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("novel.azw3");
    fs::write(&input, b"123").unwrap();

    let job = FileJob::new(&input, None).with_timeout(std::time::Duration::from_secs(5));
    assert_eq!(job.output, dir.path().join("novel.epub"));

    let gateway = Arc::new(ConversionGateway::new(ReverseLibrary::default()));
    let report = job.run(&gateway).expect("job should succeed");

    assert_eq!(report.output, b"321");
    assert_eq!(fs::read(&job.output).unwrap(), b"321");
}
