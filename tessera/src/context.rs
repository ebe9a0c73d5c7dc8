use std::any::Any;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::errors::{Error, TesseraResult};
use crate::tessera::Environment;
use crate::value::Value;
use crate::HashMap;

pub type Frame = BTreeMap<Cow<'static, str>, Value>;

static NEXT_NODE_ID: AtomicUsize = AtomicUsize::new(1);

/// Identifies a piece of tag-private render state: which node owns it and which slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    node: usize,
    slot: &'static str,
}

impl StateKey {
    /// A key that no other node uses. Tags call it once at compile time and store it.
    pub fn fresh(slot: &'static str) -> Self {
        Self {
            node: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            slot,
        }
    }

    /// A key shared by every node, for state that is per render rather than per node.
    pub const fn shared(slot: &'static str) -> Self {
        Self { node: 0, slot }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum FrameKind {
    /// Pushed for each template render
    Render,
    /// Pushed for each `{% for %}` render
    Loop,
}

struct StateFrame {
    kind: FrameKind,
    values: HashMap<StateKey, Box<dyn Any + Send>>,
}

impl StateFrame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            values: HashMap::new(),
        }
    }
}

/// Tag-private state, invisible to variable lookups.
///
/// Template-level state (eg the position of a `{% cycle %}`) lives in the innermost
/// render frame so it doesn't leak between renders or into included templates.
/// Loop-level state (eg what `{% ifchanged %}` saw last) lives in the innermost frame,
/// which is the enclosing loop if there is one.
pub struct RenderContext {
    frames: Vec<StateFrame>,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            frames: vec![StateFrame::new(FrameKind::Render)],
        }
    }
}

impl RenderContext {
    pub(crate) fn push(&mut self) {
        self.frames.push(StateFrame::new(FrameKind::Render));
    }

    pub(crate) fn push_loop(&mut self) {
        self.frames.push(StateFrame::new(FrameKind::Loop));
    }

    /// The root frame is never popped.
    pub(crate) fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn render_frame(&self) -> Option<&StateFrame> {
        self.frames.iter().rev().find(|f| f.kind == FrameKind::Render)
    }

    fn render_frame_mut(&mut self) -> Option<&mut StateFrame> {
        self.frames
            .iter_mut()
            .rev()
            .find(|f| f.kind == FrameKind::Render)
    }

    pub fn get<T: Any>(&self, key: &StateKey) -> Option<&T> {
        self.render_frame()?.values.get(key)?.downcast_ref()
    }

    pub fn get_mut<T: Any>(&mut self, key: &StateKey) -> Option<&mut T> {
        self.render_frame_mut()?.values.get_mut(key)?.downcast_mut()
    }

    pub fn insert<T: Any + Send>(&mut self, key: StateKey, value: T) {
        if let Some(frame) = self.render_frame_mut() {
            frame.values.insert(key, Box::new(value));
        }
    }

    pub fn loop_get<T: Any>(&self, key: &StateKey) -> Option<&T> {
        self.frames.last()?.values.get(key)?.downcast_ref()
    }

    pub fn loop_insert<T: Any + Send>(&mut self, key: StateKey, value: T) {
        if let Some(frame) = self.frames.last_mut() {
            frame.values.insert(key, Box::new(value));
        }
    }
}

/// The data a template is rendered with.
///
/// It is a stack of frames: lookups go from the innermost frame to the root one and
/// writes only touch the innermost frame. Tags like `{% with %}` and `{% for %}` push a
/// frame for their body and pop it afterwards.
pub struct Context {
    scopes: Vec<Frame>,
    autoescape: bool,
    render_context: RenderContext,
    pub(crate) env: Option<Arc<Environment>>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            scopes: vec![Frame::new()],
            autoescape: true,
            render_context: RenderContext::default(),
            env: None,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("scopes", &self.scopes)
            .field("autoescape", &self.autoescape)
            .finish()
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.scopes == other.scopes && self.autoescape == other.autoescape
    }
}

impl Context {
    /// Initializes an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes something that implements Serialize and creates a context with it.
    /// Meant to be used if you have a hashmap or a struct and don't want to insert values
    /// one by one in the context.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> TesseraResult<Self> {
        let val = Value::try_from_serializable(value)?;
        let type_name = val.name();

        match val.into_map() {
            Some(map) => {
                let mut context = Context::new();
                for (key, value) in map.iter() {
                    context.insert_value(key.to_string(), value.clone());
                }
                Ok(context)
            }
            None => Err(Error::message(format!(
                "from_serialize requires a struct or map, got {type_name}"
            ))),
        }
    }

    /// Converts the `val` parameter to `Value` and insert it into the innermost frame.
    ///
    /// ```rust
    /// # use tessera::Context;
    /// let mut context = tessera::Context::new();
    /// context.insert("number_users", &42);
    /// ```
    pub fn insert<S: Into<Cow<'static, str>>, T: Serialize + ?Sized>(&mut self, key: S, val: &T) {
        self.insert_value(key, Value::from_serializable(val));
    }

    /// In case you already have a `Value` you want to insert
    pub fn insert_value<S: Into<Cow<'static, str>>>(&mut self, key: S, val: Value) {
        if let Some(frame) = self.scopes.last_mut() {
            frame.insert(key.into(), val);
        }
    }

    /// Sets a value in the innermost frame only.
    pub fn set<S: Into<Cow<'static, str>>>(&mut self, key: S, val: Value) {
        self.insert_value(key, val);
    }

    /// Sets a value in the innermost frame that already has the key, or in the
    /// innermost frame if none does.
    pub fn set_upward<S: Into<Cow<'static, str>>>(&mut self, key: S, val: Value) {
        let key = key.into();
        match self.scopes.iter_mut().rev().find(|f| f.contains_key(&key)) {
            Some(frame) => {
                frame.insert(key, val);
            }
            None => self.insert_value(key, val),
        }
    }

    /// Remove a key from the innermost frame that has it.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.scopes
            .iter_mut()
            .rev()
            .find(|f| f.contains_key(key))?
            .remove(key)
    }

    /// Appends all the visible data of the `source` parameter to the innermost frame
    /// of `self`, overwriting existing keys.
    pub fn extend(&mut self, source: Context) {
        for frame in source.scopes {
            for (key, value) in frame {
                self.insert_value(key, value);
            }
        }
    }

    /// Checks if a value exists for given key in any frame.
    pub fn contains_key(&self, key: &str) -> bool {
        self.scopes.iter().any(|f| f.contains_key(key))
    }

    /// Returns the value at the given key, looking from the innermost frame outwards
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|f| f.get(key))
    }

    /// Pushes an empty frame.
    pub fn push(&mut self) {
        self.scopes.push(Frame::new());
    }

    /// Pushes a frame with some values already in it.
    pub fn push_frame(&mut self, frame: Frame) {
        self.scopes.push(frame);
    }

    /// Removes the innermost frame. The root frame can't be popped.
    pub fn pop(&mut self) -> TesseraResult<Frame> {
        if self.scopes.len() <= 1 {
            return Err(Error::context_pop());
        }
        self.scopes.pop().ok_or_else(Error::context_pop)
    }

    /// How many frames are on the data stack, the root one included.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Drops frames until only `depth` are left. The root frame always stays.
    pub(crate) fn truncate(&mut self, depth: usize) {
        self.scopes.truncate(depth.max(1));
    }

    /// Runs `f` with `frame` pushed, popping it afterwards even if `f` fails.
    pub fn scoped<R>(
        &mut self,
        frame: Frame,
        f: impl FnOnce(&mut Context) -> TesseraResult<R>,
    ) -> TesseraResult<R> {
        self.push_frame(frame);
        let res = f(self);
        self.pop()?;
        res
    }

    /// Merges every frame into one map, inner frames winning.
    pub fn flatten(&self) -> Frame {
        let mut out = Frame::new();
        for frame in &self.scopes {
            for (key, value) in frame {
                out.insert(key.clone(), value.clone());
            }
        }
        out
    }

    pub fn autoescape(&self) -> bool {
        self.autoescape
    }

    pub fn set_autoescape(&mut self, autoescape: bool) {
        self.autoescape = autoescape;
    }

    pub fn render_context(&self) -> &RenderContext {
        &self.render_context
    }

    pub fn render_context_mut(&mut self) -> &mut RenderContext {
        &mut self.render_context
    }

    /// Runs `f` with a fresh loop frame on the render context.
    pub(crate) fn in_loop_state<R>(
        &mut self,
        f: impl FnOnce(&mut Context) -> TesseraResult<R>,
    ) -> TesseraResult<R> {
        self.render_context.push_loop();
        let res = f(self);
        self.render_context.pop();
        res
    }

    /// Runs `f` with a fresh template render frame and the given environment.
    pub(crate) fn in_render_state<R>(
        &mut self,
        env: Arc<Environment>,
        f: impl FnOnce(&mut Context) -> TesseraResult<R>,
    ) -> TesseraResult<R> {
        let previous_env = self.env.replace(env);
        self.render_context.push();
        let res = f(self);
        self.render_context.pop();
        self.env = previous_env;
        res
    }
}

/// Creates a context from key value pairs
///
/// Example:
/// ```rust
/// # use tessera::context;
/// let ctx = context! {
///     name => "Brian",
///     age => &24
/// };
/// ```
/// Expands to:
/// ```text
/// let ctx = {
///     let mut context = Context::new();
///     context.insert("name", "Brian");
///     context.insert("age", &24);
///     context
/// };
/// ```
#[macro_export]
macro_rules! context {
    (
        $(
            $key:ident $(=> $value:expr)? $(,)*
        )*
    ) => {
        {
            let mut context = $crate::Context::new();
            $(
                context.insert(stringify!($key), $($value)?);
            )*
            context
        }
    };
}
