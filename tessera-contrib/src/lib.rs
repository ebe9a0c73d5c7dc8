//! Filters that need third party crates, packaged as a [`Library`].
//!
//! ```text
//! let mut env = Tessera::default();
//! env.register_library("contrib", tessera_contrib::library());
//! // {% load contrib %}{{ title|slugify }}
//! ```
#[allow(unused_imports)]
use tessera::{FilterMeta, Library};

#[cfg(feature = "filesize")]
mod filesize_format;
#[cfg(feature = "json")]
mod json;
#[cfg(feature = "slug")]
mod slugify;
#[cfg(feature = "urlencode")]
mod urlencode;

#[cfg(feature = "filesize")]
pub use filesize_format::filesizeformat;
#[cfg(feature = "json")]
pub use json::json_script;
#[cfg(feature = "slug")]
pub use slugify::slugify;
#[cfg(feature = "urlencode")]
pub use urlencode::urlencode;

/// Every filter enabled by the crate features.
pub fn library() -> Library {
    #[allow(unused_mut)]
    let mut lib = Library::new();
    #[cfg(feature = "slug")]
    lib.register_filter_with("slugify", slugify, FilterMeta::new().safe());
    #[cfg(feature = "urlencode")]
    lib.register_filter("urlencode", urlencode);
    #[cfg(feature = "json")]
    lib.register_filter("json_script", json_script);
    #[cfg(feature = "filesize")]
    lib.register_filter_with("filesizeformat", filesizeformat, FilterMeta::new().safe());
    lib
}
