#![no_main]

use libfuzzer_sys::fuzz_target;

use watmod::wat::parse;

fuzz_target!(|data: &[u8]| {
    let source = String::from_utf8_lossy(data);

    // Whatever the outcome, a successful parse must be internally consistent.
    if let Ok(module) = parse(&source) {
        assert_eq!(module.type_uses.len() as u32, module.function_count());
        for &type_index in &module.type_uses {
            assert!((type_index as usize) < module.types.len());
        }
        for export in &module.export_funcs {
            assert!(export.func_index < module.function_count());
        }
    }
});
