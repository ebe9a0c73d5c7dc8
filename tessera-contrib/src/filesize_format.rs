use tessera::{Args, TesseraResult};

/// Formats a number of bytes into a human-readable file size string.
/// Uses binary units (KiB, MiB, GiB, etc.) unless the argument is `False`.
pub fn filesizeformat(val: u64, args: Args) -> TesseraResult<String> {
    let binary = args.get::<bool>(0)?.unwrap_or(true);

    if binary {
        Ok(humansize::format_size(val, humansize::BINARY))
    } else {
        Ok(humansize::format_size(val, humansize::DECIMAL))
    }
}
