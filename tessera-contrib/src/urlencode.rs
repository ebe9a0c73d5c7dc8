use std::borrow::Cow;

use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tessera::{Args, TesseraResult};

/// What Python's `quote` never escapes
const ALWAYS_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

/// Same as Python `quote` with its default `safe="/"`
const DEFAULT_ENCODE_SET: &AsciiSet = &ALWAYS_SAFE.remove(b'/');

/// Percent-encodes reserved URI characters. The argument lists the characters that
/// shouldn't be escaped, `/` by default.
///
/// ```text
/// {{ url|urlencode }}
/// {{ url|urlencode:"" }}
/// ```
pub fn urlencode(val: Cow<'_, str>, args: Args) -> TesseraResult<String> {
    let encoded = match args.get::<String>(0)? {
        Some(safe) => {
            // `remove` returns an owned copy of the set
            let set = safe
                .bytes()
                .filter(u8::is_ascii)
                .fold(ALWAYS_SAFE.remove(b'_'), |set, b| set.remove(b));
            percent_encode(val.as_bytes(), &set).to_string()
        }
        None => percent_encode(val.as_bytes(), DEFAULT_ENCODE_SET).to_string(),
    };
    Ok(encoded)
}
