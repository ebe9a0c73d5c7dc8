use serde::Serialize;

use crate::snapshot_tests::utils::{create_multi_templates, normalize_line_endings};
use crate::{Context, Tessera};

#[derive(Debug, Serialize)]
pub struct Product {
    name: String,
}
impl Product {
    pub fn new() -> Product {
        Product {
            name: "Moto G".to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Review {
    title: String,
    paragraphs: Vec<String>,
}
impl Review {
    pub fn new() -> Review {
        Review {
            title: "My review".to_owned(),
            paragraphs: vec!["A".to_owned(), "B".to_owned(), "C".to_owned()],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct YearData {
    id: usize,
    year: Option<usize>,
}

fn get_context() -> Context {
    let mut context = Context::new();
    context.insert("name", &"Bob");
    context.insert("description", &"<p>I should be escaped by default</p>");
    context.insert("some_html", &"<p>Some HTML chars & more</p>");
    context.insert("age", &18);
    context.insert("some_bool", &true);
    context.insert("product", &Product::new());
    context.insert("vectors", &vec![vec![0, 3, 6], vec![1, 4, 7]]);
    context.insert("pairs", &vec![(1, "a"), (2, "b")]);
    context.insert("numbers", &vec![1, 2, 3]);
    context.insert("empty", &Vec::<usize>::new());
    context.insert("reviews", &vec![Review::new(), Review::new()]);
    context.insert("to", &"&");
    context.insert("malicious", &"<html>");
    let years = [
        Some(2015),
        Some(2015),
        Some(2016),
        Some(2017),
        Some(2018),
        None,
        Some(2018),
    ];
    let year_data: Vec<_> = years
        .iter()
        .enumerate()
        .map(|(id, year)| YearData {
            id: id + 1,
            year: *year,
        })
        .collect();
    context.insert("year_data", &year_data);
    context
}

fn render(tpl: &str) -> String {
    let out = Tessera::default()
        .render_str(&normalize_line_endings(tpl), &mut get_context())
        .unwrap();
    normalize_line_endings(&out)
}

#[test]
fn render_variables() {
    insta::assert_snapshot!(
        render("{{ name }} is {{ age }}. {{ product.name }} {{ numbers.1 }} [{{ missing }}|{{ missing.deeper }}|{{ reviews.0.paragraphs.2 }}]"),
        @"Bob is 18. Moto G 2 [||C]"
    );
}

#[test]
fn render_autoescaping() {
    let tpl = r#"{{ description }}
{{ description|safe }}
{% autoescape off %}{{ malicious }} {{ malicious|escape }}{% endautoescape %}
{{ to|upper }} {{ "<b>" }}"#;
    insta::assert_snapshot!(render(tpl), @r"
    &lt;p&gt;I should be escaped by default&lt;/p&gt;
    <p>I should be escaped by default</p>
    <html> &lt;html&gt;
    &amp; <b>
    ");
}

#[test]
fn render_safe_propagation() {
    // `lower` keeps safe input safe, `upper` doesn't
    insta::assert_snapshot!(
        render("{{ some_html|safe|lower }} {{ some_html|safe|upper }}"),
        @"<p>some html chars & more</p> &lt;P&gt;SOME HTML CHARS &amp; MORE&lt;/P&gt;"
    );
}

#[test]
fn render_for_loops() {
    insta::assert_snapshot!(
        render("{% for n in numbers %}{{ forloop.counter }}:{{ n }}{% if not forloop.last %}, {% endif %}{% endfor %}"),
        @"1:1, 2:2, 3:3"
    );
    insta::assert_snapshot!(
        render("{% for n in numbers reversed %}{{ n }}{{ forloop.revcounter0 }}{% endfor %}"),
        @"322110"
    );
    insta::assert_snapshot!(
        render("{% for n in empty %}{{ n }}{% empty %}nothing{% endfor %}|{% for n in missing %}{{ n }}{% endfor %}|"),
        @"nothing||"
    );
    insta::assert_snapshot!(
        render("{% for v in vectors %}{% for i in v %}{{ forloop.parentloop.counter0 }}{{ i }},{% endfor %}{% endfor %}"),
        @"00,03,06,11,14,17,"
    );
}

#[test]
fn render_for_loops_unpacking() {
    insta::assert_snapshot!(
        render("{% for num, letter in pairs %}{{ num }}-{{ letter }};{% endfor %} {% for k, v in product %}{{ k }}={{ v }}{% endfor %}"),
        @"1-a;2-b; name=Moto G"
    );
}

#[test]
fn render_for_loop_variables_dont_leak() {
    insta::assert_snapshot!(
        render("{% for name in numbers %}{% endfor %}{{ name }}[{{ forloop.counter }}]"),
        @"Bob[]"
    );
}

#[test]
fn render_cycle() {
    insta::assert_snapshot!(
        render("{% for n in numbers %}{% cycle 'odd' 'even' %}{% if not forloop.last %} {% endif %}{% endfor %}"),
        @"odd even odd"
    );
    insta::assert_snapshot!(
        render("{% for n in numbers %}{% cycle 'a' 'b' as c silent %}{{ c }}{% endfor %}"),
        @"aba"
    );
    insta::assert_snapshot!(
        render("{% cycle malicious 'x' as c %}|{% cycle c %}|{% cycle c %}"),
        @"&lt;html&gt;|x|&lt;html&gt;"
    );
}

#[test]
fn render_ifchanged() {
    insta::assert_snapshot!(
        render("{% for d in year_data %}{% ifchanged %}{{ d.year }}{% endifchanged %},{% endfor %}"),
        @"2015,,2016,2017,2018,,2018,"
    );
    insta::assert_snapshot!(
        render("{% for n in numbers %}{% ifchanged forloop.first %}new{% else %}same{% endifchanged %};{% endfor %}"),
        @"new;new;same;"
    );
}

#[test]
fn render_if() {
    let tpl = "{% if age > 17 and name == 'Bob' %}adult{% endif %}\
{% if 2 in numbers %} has2{% endif %}\
{% if 'x' not in name %} nox{% endif %}\
{% if not some_bool or empty %} no{% else %} yes{% endif %}\
{% if missing > 1 %} bad{% elif product.name %} moto{% endif %}\
{% if some_bool and not missing or 0 %} precedence{% endif %}";
    insta::assert_snapshot!(render(tpl), @"adult has2 nox yes moto precedence");
}

#[test]
fn render_ifequal() {
    insta::assert_snapshot!(
        render("{% ifequal name 'Bob' %}yes{% else %}no{% endifequal %} {% ifnotequal age 18 %}!{% else %}18{% endifnotequal %} {% ifequal missing nope %}both missing{% endifequal %}"),
        @"yes 18 both missing"
    );
}

#[test]
fn render_with() {
    insta::assert_snapshot!(
        render("{% with n=product.name a=age %}{{ n }} {{ a }}{% endwith %} {% with name as other %}{{ other }}{% endwith %}[{{ n }}]"),
        @"Moto G 18 Bob[]"
    );
}

#[test]
fn render_firstof() {
    insta::assert_snapshot!(
        render("{% firstof missing empty name %} {% firstof missing 'x<' %} {% firstof malicious as m %}{{ m }}"),
        @"Bob x< &lt;html&gt;"
    );
}

#[test]
fn render_filter_tag() {
    insta::assert_snapshot!(
        render("{% filter upper %}{{ name }} & co{% endfilter %} {% filter lower|cut:' ' %}A B {{ malicious }}{% endfilter %}"),
        @"BOB & CO ab&lt;html&gt;"
    );
}

#[test]
fn render_spaceless() {
    let tpl = "{% spaceless %}\n<p>\n  <a href=\"{{ name }}\">Foo</a>\n</p>\n{% endspaceless %}";
    insta::assert_snapshot!(render(tpl), @r#"<p><a href="Bob">Foo</a></p>"#);
}

#[test]
fn render_widthratio() {
    insta::assert_snapshot!(
        render("{% widthratio 175 200 100 %} {% widthratio age 0 100 %} {% widthratio 50 100 30 as w %}[{{ w }}] [{% widthratio 'a' 100 30 %}]"),
        @"88 0 [15] []"
    );
}

#[test]
fn render_literal_output() {
    insta::assert_snapshot!(
        render("{% templatetag openblock %} {% templatetag closevariable %} {% verbatim %}{{ name }}{% if %}{% endverbatim %}"),
        @"{% }} {{ name }}{% if %}"
    );
    insta::assert_snapshot!(
        render("a{# inline #}b{% comment 'a note' %}{{ name }}{% if %}{% endcomment %}c"),
        @"abc"
    );
}

#[test]
fn render_filters() {
    insta::assert_snapshot!(
        render("{{ name|lower }} {{ numbers|join:', ' }} {{ reviews|length }} {{ missing|default:'none' }} {{ age|add:2 }} {{ numbers|length|pluralize }} {{ 'long text'|truncatechars:5 }}"),
        @"bob 1, 2, 3 2 none 20 s long…"
    );
}

#[test]
fn render_inheritance() {
    let body = r#"
$$ base.html
<title>{% block title %}Base{% endblock %}</title>{% block content %}{% endblock content %}<footer>{% block footer %}(c) {{ name }}{% endblock %}</footer>
$$ middle.html
{% extends "base.html" %}
{% block title %}Middle - {{ block.super }}{% endblock %}
$$ child.html
{% extends "middle.html" %}
{% block title %}Child | {{ block.super }}{% endblock %}
{% block content %}<p>{{ description }}</p>{% endblock %}
"#;
    let (env, name) = create_multi_templates(body);
    let out = env.render(&name, &mut get_context()).unwrap();
    insta::assert_snapshot!(
        out,
        @"<title>Child | Middle - Base</title><p>&lt;p&gt;I should be escaped by default&lt;/p&gt;</p><footer>(c) Bob</footer>"
    );
}

#[test]
fn render_inheritance_super_without_parent() {
    let body = r#"
$$ base.html
[{% block title %}{{ block.super }}Base{% endblock %}]
$$ child.html
{% extends "base.html" %}
{% block title %}{{ block.super }}!{% endblock %}
"#;
    let (env, name) = create_multi_templates(body);
    let out = env.render(&name, &mut get_context()).unwrap();
    insta::assert_snapshot!(out, @"[Base!]");
}

#[test]
fn render_include() {
    let body = r#"
$$ item.html
<li>{{ item }}{% if extra %} ({{ extra }}){% endif %}</li>
$$ list.html
<ul>{% for item in numbers %}{% include "item.html" %}{% endfor %}</ul>{% include "item.html" with item="solo" extra=name only %}
"#;
    let (env, name) = create_multi_templates(body);
    let out = env.render(&name, &mut get_context()).unwrap();
    insta::assert_snapshot!(out, @"<ul><li>1</li><li>2</li><li>3</li></ul><li>solo (Bob)</li>");
}

#[test]
fn render_include_with_dynamic_names() {
    let body = r#"
$$ a.html
A{{ name }}
$$ page.html
{% for tpl in templates %}{% include tpl %}{% endfor %}|{% include fallbacks %}
"#;
    let (env, name) = create_multi_templates(body);
    let mut context = get_context();
    context.insert("templates", &["a.html", "a.html"]);
    context.insert("fallbacks", &["missing.html", "a.html"]);
    insta::assert_snapshot!(env.render(&name, &mut context).unwrap(), @"ABobABob|ABob");
}

#[test]
fn render_errors() {
    let tests = [
        ("{% include 'missing.html' %}", "Template 'missing.html' not found"),
        (
            "{{ age|divisibleby:0 }}",
            "Filter `divisibleby` failed: integer division or modulo by zero",
        ),
        (
            "{% for a, b in numbers %}{% endfor %}",
            "Need 2 values to unpack in for loop; got 1.",
        ),
        (
            "{% extends missing %}",
            "Invalid template name in 'extends' tag: ''. Got this from the 'missing' variable.",
        ),
    ];
    for (tpl, expected) in tests {
        let err = Tessera::default()
            .render_str(tpl, &mut get_context())
            .unwrap_err();
        assert_eq!(err.to_string(), expected, "{tpl}");
    }
}

#[test]
fn render_circular_extends_error() {
    let body = r#"
$$ a.html
{% extends "b.html" %}
$$ b.html
{% extends "a.html" %}
"#;
    let (env, name) = create_multi_templates(body);
    let err = env.render(&name, &mut get_context()).unwrap_err();
    insta::assert_snapshot!(err, @r#"Circular extend detected for template 'b.html'. Inheritance chain: `["b.html", "a.html", "b.html"]`"#);
}
