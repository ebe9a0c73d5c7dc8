use crate::args::ArgFromValue;
use crate::errors::{Error, TesseraResult};
use crate::filters::{Filter, FilterMeta, StoredFilter};
use crate::lexer::Token;
use crate::nodes::Node;
use crate::parser::{Parser, StoredTag};
use crate::value::FunctionResult;
use crate::HashMap;

/// A named bundle of tags and filters, made available to a template by `{% load %}`.
#[derive(Debug, Clone, Default)]
pub struct Library {
    tags: HashMap<String, StoredTag>,
    filters: HashMap<String, StoredFilter>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tag<F>(&mut self, name: &str, tag: F)
    where
        F: Fn(&mut Parser, Token) -> TesseraResult<Node> + Sync + Send + 'static,
    {
        self.tags.insert(name.to_string(), StoredTag::new(tag));
    }

    /// Registers a filter with the default metadata: unsafe output, optional argument.
    pub fn register_filter<Func, Arg, Res>(&mut self, name: &str, filter: Func)
    where
        Func: Filter<Arg, Res> + for<'a> Filter<<Arg as ArgFromValue<'a>>::Output, Res>,
        Arg: for<'a> ArgFromValue<'a>,
        Res: FunctionResult,
    {
        self.register_filter_with(name, filter, FilterMeta::new());
    }

    pub fn register_filter_with<Func, Arg, Res>(&mut self, name: &str, filter: Func, meta: FilterMeta)
    where
        Func: Filter<Arg, Res> + for<'a> Filter<<Arg as ArgFromValue<'a>>::Output, Res>,
        Arg: for<'a> ArgFromValue<'a>,
        Res: FunctionResult,
    {
        self.filters
            .insert(name.to_string(), StoredFilter::new(filter, meta));
    }

    pub fn tags(&self) -> impl Iterator<Item = (&str, &StoredTag)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn filters(&self) -> impl Iterator<Item = (&str, &StoredFilter)> {
        self.filters.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn filter(&self, name: &str) -> Option<&StoredFilter> {
        self.filters.get(name)
    }

    pub fn tag(&self, name: &str) -> Option<&StoredTag> {
        self.tags.get(name)
    }

    /// Adds everything from `other`, overriding on name collisions.
    pub fn merge(&mut self, other: &Library) {
        for (name, tag) in &other.tags {
            self.tags.insert(name.clone(), tag.clone());
        }
        for (name, filter) in &other.filters {
            self.filters.insert(name.clone(), filter.clone());
        }
    }

    /// A library with only the given tags and filters, for `{% load a b from label %}`.
    pub(crate) fn subset(&self, label: &str, names: &[String]) -> TesseraResult<Library> {
        let mut subset = Library::new();
        for name in names {
            let mut found = false;
            if let Some(tag) = self.tags.get(name) {
                subset.tags.insert(name.clone(), tag.clone());
                found = true;
            }
            if let Some(filter) = self.filters.get(name) {
                subset.filters.insert(name.clone(), filter.clone());
                found = true;
            }
            if !found {
                return Err(Error::syntax(format!(
                    "'{name}' is not a valid tag or filter in tag library '{label}'"
                )));
            }
        }
        Ok(subset)
    }
}
