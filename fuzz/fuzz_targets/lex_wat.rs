#![no_main]

use libfuzzer_sys::fuzz_target;

use watmod::wat::Lexer;

fuzz_target!(|data: &[u8]| {
    let source = String::from_utf8_lossy(data);

    // Every token must lie inside the source, and the lexer must stop after
    // its first error.
    for result in Lexer::new(&source) {
        match result {
            Ok(token) => assert!(token.span.end <= source.len()),
            Err(_) => break,
        }
    }
});
