#![no_main]
use libfuzzer_sys::fuzz_target;

use tessera::Tessera;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let val = format!("{{% {} %}}", s);
        let mut env = Tessera::default();
        let _ = env.add_raw_template("fuzzing.html", &val);
    }
});
