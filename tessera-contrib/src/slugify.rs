use std::borrow::Cow;

use tessera::Args;

/// Lowercases, transliterates to ASCII and joins the words with `-`.
pub fn slugify(val: Cow<'_, str>, _: Args) -> String {
    slug::slugify(val)
}
