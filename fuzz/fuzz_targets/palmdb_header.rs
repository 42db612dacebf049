#![no_main]

use libfuzzer_sys::fuzz_target;
use mobiconvert_gateway::metadata::PalmDbHeader;
use mobiconvert_gateway::validation::InputValidator;

fuzz_target!(|data: &[u8]| {
    if let Some(header) = PalmDbHeader::parse(data) {
        let _ = header.to_string();
        let _ = header.is_ebook();
    }
    let _ = InputValidator::with_limits(1 << 20, true).validate(data);
});
