#![no_main]
use libfuzzer_sys::fuzz_target;

use tessera::{context, Tessera};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let mut env = Tessera::default();
        env.set_debug(true);
        if env.add_raw_template("fuzzing.html", s).is_ok() {
            let mut context = context! { name => "Bob", items => &[1, 2, 3] };
            let _ = env.render("fuzzing.html", &mut context);
        }
    }
});
