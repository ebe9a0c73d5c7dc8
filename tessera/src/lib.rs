mod args;
mod context;
mod delimiters;
mod errors;
pub mod filter_expression;
mod filters;
pub mod lexer;
mod library;
pub mod loader;
pub mod nodes;
pub mod parser;
mod reporting;
pub mod safe;
pub mod smartif;
pub mod tags;
mod template;
mod tessera;
mod utils;
pub mod value;
pub mod variable;

pub use crate::tessera::{Environment, Tessera};
pub use args::{ArgFromValue, Args};
pub use context::{Context, Frame, RenderContext, StateKey};
pub use delimiters::Delimiters;
pub use errors::{Error, ErrorKind, ReportError, TesseraResult};
pub use filter_expression::FilterExpression;
pub use filters::{Arity, Filter, FilterMeta, StoredFilter};
pub use lexer::{Lexer, Token, TokenKind};
pub use library::Library;
pub use loader::{LoadedTemplate, Loader, MemoryLoader, Origin};
#[cfg(feature = "glob_fs")]
pub use loader::GlobLoader;
pub use nodes::{CustomNode, Node, NodeList, NodeType};
pub use parser::{NoHooks, ParseHooks, Parser, SourceHooks, StoredTag};
pub use template::Template;
pub use utils::{escape_html, Span};
pub use value::number::Number;
pub use value::{Key, Map, StringKind, Value};

#[cfg(feature = "fast_hash")]
pub(crate) use ahash::{AHashMap as HashMap, AHashSet as HashSet};
#[cfg(not(feature = "fast_hash"))]
pub(crate) use std::collections::{HashMap, HashSet};

#[cfg(test)]
mod snapshot_tests;
