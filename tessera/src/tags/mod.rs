//! The built-in tags. Each one is a compiler function turning the tag's token (and
//! whatever body it consumes from the parser) into a [`Node`](crate::nodes::Node).
pub mod conditionals;
pub mod inheritance;
pub mod loops;
pub mod output;
pub mod scope;

use crate::parser::StoredTag;

pub(crate) fn builtins() -> Vec<(&'static str, StoredTag)> {
    vec![
        ("autoescape", StoredTag::new(output::do_autoescape)),
        ("block", StoredTag::new(inheritance::do_block)),
        ("comment", StoredTag::new(output::do_comment)),
        ("cycle", StoredTag::new(loops::do_cycle)),
        ("extends", StoredTag::new(inheritance::do_extends)),
        ("filter", StoredTag::new(output::do_filter)),
        ("firstof", StoredTag::new(output::do_firstof)),
        ("for", StoredTag::new(loops::do_for)),
        ("if", StoredTag::new(conditionals::do_if)),
        ("ifchanged", StoredTag::new(loops::do_ifchanged)),
        ("ifequal", StoredTag::new(conditionals::do_ifequal)),
        ("ifnotequal", StoredTag::new(conditionals::do_ifequal)),
        ("include", StoredTag::new(inheritance::do_include)),
        ("load", StoredTag::new(scope::do_load)),
        ("spaceless", StoredTag::new(output::do_spaceless)),
        ("templatetag", StoredTag::new(output::do_templatetag)),
        ("verbatim", StoredTag::new(output::do_verbatim)),
        ("widthratio", StoredTag::new(output::do_widthratio)),
        ("with", StoredTag::new(scope::do_with)),
    ]
}
