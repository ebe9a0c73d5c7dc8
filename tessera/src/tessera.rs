use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::args::ArgFromValue;
use crate::context::Context;
use crate::delimiters::Delimiters;
use crate::errors::{Error, TesseraResult};
use crate::filters::{self, Filter, FilterMeta, StoredFilter};
use crate::lexer::Token;
use crate::library::Library;
use crate::loader::{LoadedTemplate, Loader, Origin};
use crate::nodes::Node;
use crate::parser::{Parser, StoredTag};
use crate::tags::{self, inheritance::is_not_found};
use crate::template::{Compiled, Template};
use crate::value::FunctionResult;
use crate::HashMap;

/// Default template name used for `Tessera::render_str`, `Tessera::one_off` and
/// `Tessera::from_string`.
const ONE_OFF_TEMPLATE_NAME: &str = "__tessera_one_off";

/// Everything a template needs at compile and render time: the registries, settings and
/// a way of finding other templates.
///
/// Compiled templates hold an `Arc` to the environment they were compiled with. The
/// environment only caches what they were compiled into, so the two never point at each
/// other.
#[derive(Clone)]
pub struct Environment {
    pub(crate) debug: bool,
    pub(crate) string_if_invalid: String,
    pub(crate) delimiters: Delimiters,
    pub(crate) filters: HashMap<String, StoredFilter>,
    pub(crate) tags: HashMap<String, StoredTag>,
    pub(crate) libraries: HashMap<String, Library>,
    pub(crate) loader: Option<Arc<dyn Loader>>,
    /// Templates added with `Tessera::add_raw_template`
    pub(crate) sources: HashMap<String, String>,
    pub(crate) cache: TemplateCache,
}

#[derive(Clone)]
enum Cached {
    /// Compiled against this environment
    Compiled(Arc<Compiled>),
    /// Handed out as is by the loader
    Loaded(Arc<Template>),
}

/// Every template found by name so far, so each source is loaded and compiled once per
/// environment. Cloning gives an empty cache: a changed environment recompiles.
#[derive(Default)]
pub(crate) struct TemplateCache(Mutex<HashMap<String, Cached>>);

impl TemplateCache {
    fn get(&self, name: &str) -> Option<Cached> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn insert(&self, name: &str, entry: Cached) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), entry);
    }

    pub(crate) fn clear(&mut self) {
        self.0.get_mut().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Clone for TemplateCache {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            debug: false,
            string_if_invalid: String::new(),
            delimiters: Delimiters::default(),
            filters: filters::builtins()
                .into_iter()
                .map(|(name, f)| (name.to_string(), f))
                .collect(),
            tags: tags::builtins()
                .into_iter()
                .map(|(name, t)| (name.to_string(), t))
                .collect(),
            libraries: HashMap::new(),
            loader: None,
            sources: HashMap::new(),
            cache: TemplateCache::default(),
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut filters: Vec<_> = self.filters.keys().collect();
        filters.sort_unstable();
        let mut tags: Vec<_> = self.tags.keys().collect();
        tags.sort_unstable();
        let mut templates: Vec<_> = self.sources.keys().collect();
        templates.sort_unstable();

        f.debug_struct("Environment")
            .field("debug", &self.debug)
            .field("string_if_invalid", &self.string_if_invalid)
            .field("delimiters", &self.delimiters)
            .field("filters", &filters)
            .field("tags", &tags)
            .field("templates", &templates)
            .field("compiled", &self.cache.len())
            .field("has_loader", &self.loader.is_some())
            .finish()
    }
}

impl Environment {
    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn delimiters(&self) -> Delimiters {
        self.delimiters
    }

    /// What failed lookups render as. A `%s` in it is replaced by the expression text.
    pub fn string_if_invalid(&self) -> &str {
        &self.string_if_invalid
    }

    /// The template with that name, looking at the raw templates first and then asking
    /// the loader.
    ///
    /// Each name is loaded and compiled once; later calls, renders included, reuse it.
    pub fn get_template(self: &Arc<Self>, name: &str) -> TesseraResult<Arc<Template>> {
        let entry = match self.cache.get(name) {
            Some(entry) => entry,
            None => {
                let entry = self.load(name)?;
                self.cache.insert(name, entry.clone());
                entry
            }
        };
        Ok(match entry {
            Cached::Compiled(compiled) => {
                Arc::new(Template::from_compiled(name, compiled, self.clone()))
            }
            Cached::Loaded(template) => template,
        })
    }

    fn load(self: &Arc<Self>, name: &str) -> TesseraResult<Cached> {
        if let Some(source) = self.sources.get(name) {
            let compiled = Compiled::new(name, source, Origin::new(name), self)?;
            return Ok(Cached::Compiled(Arc::new(compiled)));
        }

        let Some(ref loader) = self.loader else {
            return Err(Error::template_not_found(name));
        };
        match loader.load_template_source(name)? {
            Some((LoadedTemplate::Source(source), origin)) => {
                debug!(template = name, origin = %origin, "loader found template source");
                let compiled = Compiled::new(name, &source, origin, self)?;
                Ok(Cached::Compiled(Arc::new(compiled)))
            }
            Some((LoadedTemplate::Compiled(template), origin)) => {
                debug!(template = name, origin = %origin, "loader found compiled template");
                Ok(Cached::Loaded(template))
            }
            None => Err(Error::template_not_found(name)),
        }
    }

    /// The first of `names` that exists. Errors other than a missing template are
    /// returned straight away.
    pub fn select_template(self: &Arc<Self>, names: &[String]) -> TesseraResult<Arc<Template>> {
        if names.is_empty() {
            return Err(Error::message("No template names provided"));
        }
        for name in names {
            match self.get_template(name) {
                Ok(template) => return Ok(template),
                Err(e) if is_not_found(&e) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::template_not_found(names.join(", ")))
    }
}

/// The main entry point: configure it, add templates and render them.
#[derive(Clone, Default)]
pub struct Tessera {
    env: Arc<Environment>,
}

impl Tessera {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle on the current settings and registries.
    pub fn environment(&self) -> Arc<Environment> {
        self.env.clone()
    }

    fn env_mut(&mut self) -> &mut Environment {
        let env = Arc::make_mut(&mut self.env);
        env.cache.clear();
        env
    }

    /// Compiles every raw template again so they see the latest environment.
    ///
    /// Templates that don't compile anymore stay out of the cache; asking for them later
    /// returns the compilation error.
    fn recompile(&self) {
        for name in self.env.sources.keys() {
            if let Err(e) = self.env.get_template(name) {
                warn!(template = %name, error = %e.kind, "template no longer compiles");
            }
        }
    }

    /// Turns on debug mode: tokens and nodes record where they come from so errors
    /// can point at the template source. Rendering output is the same either way.
    pub fn set_debug(&mut self, debug: bool) {
        self.env_mut().debug = debug;
        self.recompile();
    }

    /// Sets what failed variable lookups render as, `""` by default.
    ///
    /// ```
    /// # use tessera::{Tessera, Context};
    /// let mut env = Tessera::default();
    /// env.set_string_if_invalid("[missing %s]");
    /// let out = env.render_str("{{ user.name }}", &mut Context::new()).unwrap();
    /// assert_eq!(out, "[missing user.name]");
    /// ```
    pub fn set_string_if_invalid(&mut self, placeholder: impl Into<String>) {
        self.env_mut().string_if_invalid = placeholder.into();
        self.recompile();
    }

    /// Set custom delimiters for template syntax.
    ///
    /// Returns an error if any delimiter is not 2 characters or if start delimiters conflict.
    /// Raw templates already added are compiled again with the new delimiters.
    ///
    /// ```
    /// use tessera::{Tessera, Delimiters};
    ///
    /// let mut env = Tessera::new();
    /// env.set_delimiters(Delimiters {
    ///     block_start: "<%",
    ///     block_end: "%>",
    ///     variable_start: "<<",
    ///     variable_end: ">>",
    ///     comment_start: "<#",
    ///     comment_end: "#>",
    /// }).unwrap();
    /// env.add_raw_template("example", "<< name >>").unwrap();
    /// ```
    pub fn set_delimiters(&mut self, delimiters: Delimiters) -> TesseraResult<()> {
        delimiters.validate()?;
        self.env_mut().delimiters = delimiters;
        self.recompile();
        Ok(())
    }

    /// Where to look for templates that weren't added with `add_raw_template`, and for
    /// libraries `{% load %}` can't find in the registered ones.
    pub fn set_loader(&mut self, loader: impl Loader + 'static) {
        self.env_mut().loader = Some(Arc::new(loader));
        self.recompile();
    }

    /// Register a filter with the default metadata: unsafe output, optional argument.
    ///
    /// If a filter with that name already exists, it will be overwritten
    ///
    /// ```
    /// # use tessera::{Tessera, Args};
    /// let mut env = Tessera::default();
    /// env.register_filter("double", |x: i64, _: Args| x * 2);
    /// ```
    pub fn register_filter<Func, Arg, Res>(&mut self, name: &str, filter: Func)
    where
        Func: Filter<Arg, Res> + for<'a> Filter<<Arg as ArgFromValue<'a>>::Output, Res>,
        Arg: for<'a> ArgFromValue<'a>,
        Res: FunctionResult,
    {
        self.register_filter_with(name, filter, FilterMeta::new());
    }

    /// Register a filter along with what the renderer needs to know about it.
    pub fn register_filter_with<Func, Arg, Res>(&mut self, name: &str, filter: Func, meta: FilterMeta)
    where
        Func: Filter<Arg, Res> + for<'a> Filter<<Arg as ArgFromValue<'a>>::Output, Res>,
        Arg: for<'a> ArgFromValue<'a>,
        Res: FunctionResult,
    {
        self.env_mut()
            .filters
            .insert(name.to_string(), StoredFilter::new(filter, meta));
        self.recompile();
    }

    /// Register a tag compiler: it gets the parser and the tag token and returns the node.
    ///
    /// If a tag with that name already exists, it will be overwritten
    pub fn register_tag<F>(&mut self, name: &str, tag: F)
    where
        F: Fn(&mut Parser, Token) -> TesseraResult<Node> + Sync + Send + 'static,
    {
        self.env_mut()
            .tags
            .insert(name.to_string(), StoredTag::new(tag));
        self.recompile();
    }

    /// Makes a library available to `{% load name %}`.
    pub fn register_library(&mut self, name: &str, library: Library) {
        self.env_mut().libraries.insert(name.to_string(), library);
        self.recompile();
    }

    /// Adds the tags and filters of a library to every template, without needing `{% load %}`.
    pub fn register_from(&mut self, library: &Library) {
        let env = self.env_mut();
        for (name, tag) in library.tags() {
            env.tags.insert(name.to_string(), tag.clone());
        }
        for (name, filter) in library.filters() {
            env.filters.insert(name.to_string(), filter.clone());
        }
        self.recompile();
    }

    /// Add a single template to the Tessera instance.
    ///
    /// This will error if the template is not valid.
    ///
    /// ```
    /// # use tessera::Tessera;
    /// let mut env = Tessera::default();
    /// env.add_raw_template("new.html", "Blabla").unwrap();
    /// ```
    pub fn add_raw_template(&mut self, name: &str, content: &str) -> TesseraResult<()> {
        self.add_raw_templates([(name, content)])
    }

    /// Add all the templates given to the Tessera instance.
    ///
    /// Nothing is added if one of them fails to compile.
    ///
    /// ```
    /// # use tessera::Tessera;
    /// let mut env = Tessera::default();
    /// env.add_raw_templates(vec![
    ///     ("new.html", "blabla"),
    ///     ("new2.html", "hello"),
    /// ]).unwrap();
    /// ```
    pub fn add_raw_templates<I, N, C>(&mut self, templates: I) -> TesseraResult<()>
    where
        I: IntoIterator<Item = (N, C)>,
        N: AsRef<str>,
        C: AsRef<str>,
    {
        let mut env = (*self.env).clone();
        let mut names = Vec::new();
        for (name, content) in templates {
            env.sources
                .insert(name.as_ref().to_string(), content.as_ref().to_string());
            names.push(name.as_ref().to_string());
        }

        let env = Arc::new(env);
        for name in &names {
            env.get_template(name)?;
        }
        self.env = env;
        self.recompile();
        Ok(())
    }

    /// The names of the raw templates, sorted.
    pub fn template_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.env.sources.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Get a template by name: a raw template if there is one with that name, otherwise
    /// whatever the loader has.
    pub fn get_template(&self, name: &str) -> TesseraResult<Arc<Template>> {
        self.env.get_template(name)
    }

    /// Renders a template given a [`Context`].
    ///
    /// ```
    /// # use tessera::{Tessera, Context};
    /// let mut env = Tessera::default();
    /// env.add_raw_template("info", "My age is {{ age }}.").unwrap();
    ///
    /// let mut context = Context::new();
    /// context.insert("age", &18);
    ///
    /// let output = env.render("info", &mut context).unwrap();
    /// assert_eq!(output, "My age is 18.");
    /// ```
    pub fn render(&self, name: &str, context: &mut Context) -> TesseraResult<String> {
        self.get_template(name)?.render(context)
    }

    /// Compiles a template that isn't stored anywhere.
    ///
    /// It can still include and extend the named templates. Errors mention the
    /// `__tessera_one_off` name.
    pub fn from_string(&self, source: &str) -> TesseraResult<Template> {
        Template::new(
            ONE_OFF_TEMPLATE_NAME,
            source,
            Origin::new(ONE_OFF_TEMPLATE_NAME),
            self.env.clone(),
        )
    }

    /// Compiles then renders a one-off template with this instance's filters, tags and
    /// templates.
    ///
    /// ```
    /// # use tessera::{Tessera, context};
    /// let env = Tessera::new();
    /// let result = env
    ///     .render_str("Hello {{ name }}!", &mut context! { name => "world" })
    ///     .unwrap();
    /// assert_eq!(result, "Hello world!");
    /// ```
    pub fn render_str(&self, input: &str, context: &mut Context) -> TesseraResult<String> {
        self.from_string(input)?.render(context)
    }

    /// Renders a one off template (for example a template coming from a user input) given
    /// a `Context`, without any custom filters or tags.
    ///
    /// ```
    /// # use tessera::{Context, Tessera};
    /// let mut context = Context::new();
    /// context.insert("greeting", &"hello");
    /// let result = Tessera::one_off("{{ greeting }} world", &context, true).unwrap();
    /// assert_eq!(result, "hello world");
    /// ```
    pub fn one_off(input: &str, context: &Context, autoescape: bool) -> TesseraResult<String> {
        let mut ctx = Context::new();
        for (key, value) in context.flatten() {
            ctx.insert_value(key, value);
        }
        ctx.set_autoescape(autoescape);
        Tessera::default().render_str(input, &mut ctx)
    }
}

impl fmt::Debug for Tessera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tessera").field("env", &self.env).finish()
    }
}
