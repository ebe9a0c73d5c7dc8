use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tessera::{
    context, Args, Error, ErrorKind, Library, LoadedTemplate, Loader, MemoryLoader, Node, Origin,
    Parser, Template, Tessera, TesseraResult, Token,
};

fn memory_loader(templates: &[(&str, &str)]) -> MemoryLoader {
    templates.iter().copied().collect()
}

#[test]
fn templates_come_from_the_loader() {
    let mut env = Tessera::default();
    env.set_loader(memory_loader(&[
        ("base.html", "<h1>{% block title %}Base{% endblock %}</h1>{% block body %}{% endblock %}"),
        ("page.html", "{% extends 'base.html' %}{% block body %}{% include 'part.html' %}{% endblock %}"),
        ("part.html", "part of {{ name }}"),
    ]));
    let out = env.render("page.html", &mut context! { name => "Bob" }).unwrap();
    assert_eq!(out, "<h1>Base</h1>part of Bob");

    let err = env.render("nope.html", &mut context! {}).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TemplateNotFound("nope.html".to_string()));
}

#[test]
fn missing_include_is_a_render_error() {
    let mut env = Tessera::default();
    env.add_raw_template("page.html", "a{% include 'nope.html' %}b").unwrap();
    let err = env.render("page.html", &mut context! {}).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TemplateNotFound(ref n) if n == "nope.html"));
}

#[test]
fn missing_parent_is_a_render_error() {
    let mut env = Tessera::default();
    env.add_raw_template("page.html", "{% extends 'nope.html' %}").unwrap();
    let err = env.render("page.html", &mut context! {}).unwrap_err();
    assert_eq!(err.to_string(), "Template 'nope.html' not found");
}

#[test]
fn circular_extends_are_detected() {
    let mut env = Tessera::default();
    env.add_raw_templates(vec![
        ("a.html", "{% extends 'b.html' %}"),
        ("b.html", "{% extends 'c.html' %}"),
        ("c.html", "{% extends 'a.html' %}"),
    ])
    .unwrap();
    let err = env.render("a.html", &mut context! {}).unwrap_err();
    match err.kind {
        ErrorKind::CircularExtend {
            tpl,
            inheritance_chain,
        } => {
            assert_eq!(tpl, "a.html");
            assert_eq!(inheritance_chain, vec!["a.html", "b.html", "c.html", "a.html"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn block_super_goes_up_the_chain() {
    let mut env = Tessera::default();
    env.add_raw_templates(vec![
        ("grandparent", "{% block a %}1{% endblock %}|{% block b %}x{% endblock %}"),
        ("parent", "{% extends 'grandparent' %}{% block a %}{{ block.super }}2{% endblock %}"),
        (
            "child",
            "{% extends 'parent' %}{% block a %}{{ block.super }}3{% endblock %}{% block b %}{{ block.super }}y{% endblock %}",
        ),
    ])
    .unwrap();
    assert_eq!(env.render("child", &mut context! {}).unwrap(), "123|xy");
    assert_eq!(env.render("parent", &mut context! {}).unwrap(), "12|x");
}

#[test]
fn block_super_only_renders_when_used() {
    let mut env = Tessera::default();
    env.add_raw_templates(vec![
        ("base", "{% block a %}{% cycle 'x' 'y' as c %}{% endblock %}|{% cycle c %}"),
        ("unused", "{% extends 'base' %}{% block a %}{% if false %}{{ block.super }}{% endif %}{% endblock %}"),
        ("twice", "{% extends 'base' %}{% block a %}{{ block.super }}{{ block.super|upper }}{% endblock %}"),
        ("broken_base", "{% block a %}{% include 'nowhere.html' %}{% endblock %}"),
        ("skips_broken", "{% extends 'broken_base' %}{% block a %}{% if false %}{{ block.super }}{% endif %}ok{% endblock %}"),
    ])
    .unwrap();
    assert_eq!(env.render("unused", &mut context! {}).unwrap(), "|x");
    assert_eq!(env.render("twice", &mut context! {}).unwrap(), "xX|y");
    assert_eq!(env.render("skips_broken", &mut context! {}).unwrap(), "ok");
}

#[test]
fn blocks_inside_blocks() {
    let mut env = Tessera::default();
    env.add_raw_templates(vec![
        ("base", "{% block outer %}[{% block inner %}base{% endblock %}]{% endblock %}"),
        ("child", "{% extends 'base' %}{% block inner %}child{% endblock %}"),
        ("other", "{% extends 'base' %}{% block outer %}<{% block inner %}other{% endblock %}>{% endblock %}"),
    ])
    .unwrap();
    assert_eq!(env.render("child", &mut context! {}).unwrap(), "[child]");
    assert_eq!(env.render("other", &mut context! {}).unwrap(), "<other>");
}

#[test]
fn extends_with_a_variable_name() {
    let mut env = Tessera::default();
    env.add_raw_templates(vec![
        ("one", "1{% block a %}{% endblock %}"),
        ("two", "2{% block a %}{% endblock %}"),
        ("child", "{% extends parent %}{% block a %}!{% endblock %}"),
    ])
    .unwrap();
    assert_eq!(env.render("child", &mut context! { parent => "one" }).unwrap(), "1!");
    assert_eq!(env.render("child", &mut context! { parent => "two" }).unwrap(), "2!");
}

#[test]
fn include_sees_the_current_context_unless_only() {
    let mut env = Tessera::default();
    env.add_raw_templates(vec![
        ("greet", "{{ greeting|default:'hi' }} {{ name }}"),
        (
            "page",
            "{% with greeting='hello' %}{% include 'greet' %}{% endwith %}/{% include 'greet' only %}/{% include 'greet' with name='Alice' %}",
        ),
    ])
    .unwrap();
    let out = env.render("page", &mut context! { name => "Bob" }).unwrap();
    assert_eq!(out, "hello Bob/hi /hi Alice");
}

#[test]
fn include_keeps_autoescape_setting() {
    let mut env = Tessera::default();
    env.add_raw_templates(vec![
        ("part", "{{ html }}"),
        ("page", "{% include 'part' %}|{% autoescape off %}{% include 'part' with html=html only %}{% endautoescape %}"),
    ])
    .unwrap();
    let out = env.render("page", &mut context! { html => "<b>" }).unwrap();
    assert_eq!(out, "&lt;b&gt;|<b>");
}

#[derive(Debug)]
struct CompiledLoader {
    template: Arc<Template>,
    calls: Mutex<Vec<String>>,
}

impl Loader for CompiledLoader {
    fn load_template_source(&self, name: &str) -> TesseraResult<Option<(LoadedTemplate, Origin)>> {
        self.calls.lock().unwrap().push(name.to_string());
        if name == "compiled.html" {
            Ok(Some((
                LoadedTemplate::Compiled(self.template.clone()),
                Origin::new(name),
            )))
        } else {
            Ok(None)
        }
    }
}

#[test]
fn loader_can_hand_out_compiled_templates() {
    let template = Arc::new(
        Tessera::default()
            .from_string("precompiled {{ name|upper }}")
            .unwrap(),
    );
    let loader = Arc::new(CompiledLoader {
        template,
        calls: Mutex::new(Vec::new()),
    });
    let mut env = Tessera::default();
    env.set_loader(SharedLoader(loader.clone()));
    env.add_raw_template("page", "{% include 'compiled.html' %}").unwrap();
    assert_eq!(
        env.render("page", &mut context! { name => "bob" }).unwrap(),
        "precompiled BOB"
    );
    // Raw templates never reach the loader
    assert_eq!(*loader.calls.lock().unwrap(), vec!["compiled.html"]);
}

#[derive(Default)]
struct CountingLoader {
    loads: AtomicUsize,
}

impl Loader for CountingLoader {
    fn load_template_source(&self, name: &str) -> TesseraResult<Option<(LoadedTemplate, Origin)>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let source = match name {
            "part.html" => "part {{ n }}",
            "base.html" => "[{% block body %}{% endblock %}]",
            _ => return Ok(None),
        };
        Ok(Some((LoadedTemplate::Source(source.to_string()), Origin::new(name))))
    }
}

struct SharedCounter(Arc<CountingLoader>);

impl Loader for SharedCounter {
    fn load_template_source(&self, name: &str) -> TesseraResult<Option<(LoadedTemplate, Origin)>> {
        self.0.load_template_source(name)
    }
}

#[test]
fn loaded_templates_are_compiled_once() {
    let loader = Arc::new(CountingLoader::default());
    let mut env = Tessera::default();
    env.set_loader(SharedCounter(loader.clone()));
    env.add_raw_template(
        "main.html",
        "{% extends 'base.html' %}{% block body %}{% include 'part.html' %}{% endblock %}",
    )
    .unwrap();
    let template = env.get_template("main.html").unwrap();
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);

    for n in 0..3 {
        assert_eq!(
            template.render(&mut context! { n => &n }).unwrap(),
            format!("[part {n}]")
        );
    }
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);

    // A new environment starts over
    env.set_debug(true);
    env.render("main.html", &mut context! { n => &0 }).unwrap();
    assert_eq!(loader.loads.load(Ordering::SeqCst), 4);
}

struct SharedLoader(Arc<CompiledLoader>);

impl Loader for SharedLoader {
    fn load_template_source(&self, name: &str) -> TesseraResult<Option<(LoadedTemplate, Origin)>> {
        self.0.load_template_source(name)
    }
}

struct FailingLoader;

impl Loader for FailingLoader {
    fn load_template_source(&self, name: &str) -> TesseraResult<Option<(LoadedTemplate, Origin)>> {
        Err(Error::message(format!("backend down while loading {name}")))
    }
}

#[test]
fn loader_errors_are_not_template_not_found() {
    let mut env = Tessera::default();
    env.set_loader(FailingLoader);
    let err = env.render("x.html", &mut context! {}).unwrap_err();
    assert_eq!(err.to_string(), "backend down while loading x.html");
}

fn shout(val: String, _: Args) -> String {
    format!("{}!", val.to_uppercase())
}

fn do_hello(_: &mut Parser, token: Token) -> TesseraResult<Node> {
    let bits = token.split_contents();
    let who = bits.get(1).cloned().unwrap_or_else(|| "world".to_string());
    Ok(Node::Text(format!("hello {who}")))
}

fn library() -> Library {
    let mut lib = Library::new();
    lib.register_filter("shout", shout);
    lib.register_tag("hello", do_hello);
    lib
}

#[test]
fn load_makes_library_tags_and_filters_available() {
    let mut env = Tessera::default();
    env.register_library("greetings", library());
    env.add_raw_template("page", "{% load greetings %}{% hello %}, {{ name|shout }}")
        .unwrap();
    assert_eq!(
        env.render("page", &mut context! { name => "bob" }).unwrap(),
        "hello world, BOB!"
    );

    let err = env
        .add_raw_template("other", "{{ name|shout }}")
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid filter: 'shout'");
}

#[test]
fn load_from_only_takes_some_names() {
    let mut env = Tessera::default();
    env.register_library("greetings", library());
    env.add_raw_template("ok", "{% load hello from greetings %}{% hello you %}")
        .unwrap();
    assert_eq!(env.render("ok", &mut context! {}).unwrap(), "hello you");

    let err = env
        .add_raw_template("bad", "{% load hello from greetings %}{{ a|shout }}")
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid filter: 'shout'");

    let err = env
        .add_raw_template("bad", "{% load nope from greetings %}")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "'nope' is not a valid tag or filter in tag library 'greetings'"
    );
}

#[test]
fn unknown_library() {
    let mut env = Tessera::default();
    env.register_library("greetings", library());
    env.register_library("extra", Library::new());
    let err = env.add_raw_template("bad", "{% load nope %}").unwrap_err();
    assert_eq!(
        err.to_string(),
        "'nope' is not a registered tag library. Must be one of:\nextra\ngreetings"
    );
}

#[test]
fn libraries_can_come_from_the_loader() {
    let mut loader = MemoryLoader::new();
    loader.insert("page", "{% load lazy %}{% hello lazy %}");
    loader.insert_library("lazy", library());
    let mut env = Tessera::default();
    env.set_loader(loader);
    assert_eq!(env.render("page", &mut context! {}).unwrap(), "hello lazy");
}

#[cfg(feature = "glob_fs")]
#[test]
fn glob_loader_reads_files() {
    use std::fs;
    use tessera::GlobLoader;

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    fs::create_dir(root.join("pages")).unwrap();
    fs::write(root.join("base.html"), "<main>{% block main %}{% endblock %}</main>").unwrap();
    fs::write(
        root.join("pages").join("index.html"),
        "{% extends 'base.html' %}{% block main %}Hi {{ name }}{% endblock %}",
    )
    .unwrap();

    let mut env = Tessera::default();
    env.set_loader(GlobLoader::new(&format!("{}/**/*.html", root.display())).unwrap());
    let out = env
        .render("pages/index.html", &mut context! { name => "Bob" })
        .unwrap();
    assert_eq!(out, "<main>Hi Bob</main>");
}
