use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::context::Context;
use crate::errors::TesseraResult;
use crate::lexer::Lexer;
use crate::loader::Origin;
use crate::nodes::NodeList;
use crate::parser::Parser;
use crate::tessera::Environment;

/// What compiling a source produces. It doesn't point back at the environment, which
/// is what lets the environment cache it.
#[derive(Debug)]
pub(crate) struct Compiled {
    source: String,
    origin: Origin,
    nodelist: NodeList,
}

impl Compiled {
    pub(crate) fn new(name: &str, source: &str, origin: Origin, env: &Arc<Environment>) -> TesseraResult<Self> {
        let tokens = Lexer::new(source, env.delimiters)
            .with_spans(env.debug)
            .tokenize();
        debug!(template = name, tokens = tokens.len(), debug = env.debug, "compiling template");

        let mut parser = Parser::new(tokens, env.clone(), origin.clone());
        let nodelist = parser
            .parse(&[])
            .map_err(|e| e.with_source(&origin.name, source))?;

        Ok(Self {
            source: source.to_string(),
            origin,
            nodelist,
        })
    }
}

/// A compiled template, ready to be rendered any number of times.
///
/// It keeps a handle on the environment it was compiled with so `{% include %}` and
/// `{% extends %}` can find other templates at render time.
#[derive(Clone)]
pub struct Template {
    pub name: String,
    compiled: Arc<Compiled>,
    pub(crate) env: Arc<Environment>,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("origin", &self.compiled.origin)
            .field("nodes", &self.compiled.nodelist.len())
            .finish()
    }
}

impl Template {
    pub(crate) fn new(
        name: &str,
        source: &str,
        origin: Origin,
        env: Arc<Environment>,
    ) -> TesseraResult<Self> {
        let compiled = Compiled::new(name, source, origin, &env)?;
        Ok(Self::from_compiled(name, Arc::new(compiled), env))
    }

    pub(crate) fn from_compiled(name: &str, compiled: Arc<Compiled>, env: Arc<Environment>) -> Self {
        Self {
            name: name.to_string(),
            compiled,
            env,
        }
    }

    pub(crate) fn compiled(&self) -> &Arc<Compiled> {
        &self.compiled
    }

    /// Renders the template with the given context.
    ///
    /// The context has as many frames afterwards as it had before, even if rendering
    /// failed halfway through.
    pub fn render(&self, context: &mut Context) -> TesseraResult<String> {
        let depth = context.depth();
        let res = context.in_render_state(self.env.clone(), |context| self.render_nodelist(context));
        context.truncate(depth);
        res
    }

    /// Renders with a context built out of anything that serializes to a map.
    pub fn render_data<T: Serialize + ?Sized>(&self, data: &T) -> TesseraResult<String> {
        let mut context = Context::from_serialize(data)?;
        self.render(&mut context)
    }

    /// Renders the nodes in the current render state, which `{% extends %}` shares with
    /// the whole inheritance chain.
    pub(crate) fn render_nodelist(&self, context: &mut Context) -> TesseraResult<String> {
        self.compiled
            .nodelist
            .render(context)
            .map_err(|e| e.with_source(&self.compiled.origin.name, &self.compiled.source))
    }

    pub fn nodelist(&self) -> &NodeList {
        &self.compiled.nodelist
    }

    pub fn origin(&self) -> &Origin {
        &self.compiled.origin
    }

    pub fn source(&self) -> &str {
        &self.compiled.source
    }
}
