//! Errors caught when compiling templates
use crate::snapshot_tests::utils::split_multi_templates;
use crate::Tessera;

fn compile_error(tpl: &str) -> String {
    let mut env = Tessera::default();
    let err = env.add_raw_template("tpl.html", tpl).unwrap_err();
    assert!(err.is_syntax_error(), "{err}");
    err.to_string()
}

#[test]
fn compile_error_messages() {
    let tests = [
        ("{% if %}{% endif %}", "Unexpected end of expression in if tag."),
        ("{% if a b %}{% endif %}", "Unused 'b' at end of if expression."),
        ("{% if a and %}{% endif %}", "Unexpected end of expression in if tag."),
        ("{% if or a %}{% endif %}", "Not expecting 'or' in this position in if tag."),
        (
            "{% for a in %}{% endfor %}",
            "'for' statements should have at least four words: for a in",
        ),
        (
            "{% for a on b %}{% endfor %}",
            "'for' statements should use the format 'for x in y': for a on b",
        ),
        ("{% endfor %}", "Invalid block tag: 'endfor'"),
        (
            "{% if a %}x{% endfor %}",
            "Invalid block tag: 'endfor', expected 'elif', 'else' or 'endif'",
        ),
        ("{% if a %}", "Unclosed tag 'if'. Looking for one of: elif, else, endif"),
        ("{% comment %}", "Unclosed tag 'comment'. Looking for one of: endcomment"),
        ("{{ name|nope }}", "Invalid filter: 'nope'"),
        ("{{ name|default }}", "default requires 2 arguments, 1 provided"),
        ("{{ name|upper:1 }}", "upper requires 1 arguments, 2 provided"),
        (
            "{{ _private }}",
            "Variables and attributes may not begin with underscores: '_private'",
        ),
        ("{{ }}", "Empty variable tag"),
        ("{% %}", "Empty block tag"),
        (
            "{% block a %}{% endblock %}{% block a %}{% endblock %}",
            "'block' tag with name 'a' appears more than once",
        ),
        (
            "{% block a %}{% endblock b %}",
            "Invalid block tag: 'endblock', expected 'endblock' or 'endblock a'",
        ),
        (
            "{{ a }}{% extends 'base.html' %}",
            "'extends 'base.html'' must be the first tag in the template.",
        ),
        ("{% cycle %}", "'cycle' tag requires at least two arguments"),
        ("{% cycle a %}", "No named cycles in template. 'a' is not defined"),
        (
            "{% cycle a b as c loud %}",
            "Only 'silent' flag is allowed after cycle's name, not 'loud'.",
        ),
        (
            "{% filter escape %}{% endfilter %}",
            "\"filter escape\" is not permitted.  Use the \"autoescape\" tag instead.",
        ),
        ("{% autoescape maybe %}{% endautoescape %}", "'autoescape' argument should be 'on' or 'off'"),
        ("{% with %}{% endwith %}", "'with' expected at least one variable assignment"),
        ("{% firstof %}", "'firstof' statement requires at least one argument"),
        ("{% widthratio a b %}", "widthratio takes at least three arguments"),
        (
            "{% include 'a.html' only only %}",
            "The 'only' option was specified more than once.",
        ),
        ("{% include 'a.html' with %}", "\"with\" in 'include' tag needs at least one keyword argument."),
        ("{% ifequal a %}{% endifequal %}", "'ifequal' takes two arguments"),
        ("{% verbatim %}{{ a }}", "Unclosed tag 'verbatim'. Looking for one of: endverbatim"),
    ];

    for (tpl, expected) in tests {
        assert_eq!(compile_error(tpl), expected, "{tpl}");
    }
}

#[test]
fn compile_errors_in_debug_mode_point_at_the_tag() {
    let mut env = Tessera::default();
    env.set_debug(true);
    let err = env
        .add_raw_template("tpl.html", "<p>\n  {% for x in items %}{{ x|nope }}{% endfor %}\n</p>")
        .unwrap_err();
    insta::assert_snapshot!(err, @r"
    error: Invalid filter: 'nope'
     --> tpl.html:2:22
      |
    2 |   {% for x in items %}{{ x|nope }}{% endfor %}
      |                       ^^^^^^^^^^^^
    ");
}

#[test]
fn one_broken_template_rejects_all_of_them() {
    let body = r#"
$$ base.html
{% block content %}{% endblock %}
$$ broken.html
{% extends "base.html" %}{% block content %}{% if %}{% endif %}{% endblock %}
"#;
    let tpls = split_multi_templates(body);
    let mut env = Tessera::default();
    let err = env.add_raw_templates(tpls).unwrap_err();
    insta::assert_snapshot!(err, @"Unexpected end of expression in if tag.");
    assert!(env.template_names().is_empty());
}
