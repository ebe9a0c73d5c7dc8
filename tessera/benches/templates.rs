use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use serde_derive::Serialize;

use tessera::{Context, Tessera};

#[derive(Serialize)]
struct DataWrapper {
    i: usize,
    v: String,
}

impl DataWrapper {
    fn new(i: usize) -> DataWrapper {
        DataWrapper {
            i,
            v: "Meta
Before we get to the details, two important notes about the ownership system.
Rust has a focus on safety and speed. It accomplishes these goals through many ‘zero-cost abstractions’, which means that in Rust, abstractions cost as little as possible in order to make them work. The ownership system is a prime example of a zero cost abstraction. All of the analysis we’ll talk about in this guide is done at compile time. You do not pay any run-time cost for any of these features.
However, this system does have a certain cost: learning curve. Many new users to Rust experience something we like to call ‘fighting with the borrow checker’, where the Rust compiler refuses to compile a program that the author thinks is valid. This often happens because the programmer’s mental model of how ownership should work doesn’t match the actual rules that Rust implements. You probably will experience similar things at first. There is good news, however: more experienced Rust developers report that once they work with the rules of the ownership system for a period of time, they fight the borrow checker less and less.
With that in mind, let’s learn about borrowing.".into(),
        }
    }
}

#[derive(Serialize)]
struct BigObject {
    field_a: DataWrapper,
    field_b: DataWrapper,
    field_c: DataWrapper,
    field_d: DataWrapper,
    field_e: DataWrapper,
    field_f: DataWrapper,
}

impl BigObject {
    fn new(i: usize) -> BigObject {
        BigObject {
            field_a: DataWrapper::new(i),
            field_b: DataWrapper::new(i),
            field_c: DataWrapper::new(i),
            field_d: DataWrapper::new(i),
            field_e: DataWrapper::new(i),
            field_f: DataWrapper::new(i),
        }
    }
}

#[derive(Serialize)]
struct Team {
    name: String,
    score: u8,
}

static BIG_TABLE_TEMPLATE: &str = "
<table>
{% for row in table %}
<tr>{% for col in row %}<td>{{ col }}</td>{% endfor %}</tr>
{% endfor %}
</table>
";

static TEAMS_TEMPLATE: &str = r#"
<html>
  <head>
    <title>{{ year }}</title>
  </head>
  <body>
    <h1>CSL {{ year }}</h1>
    <ul>
    {% for team in teams %}
      <li class="{% cycle 'odd' 'even' %}{% if forloop.first %} champion{% endif %}">
      <b>{{ team.name|title }}</b>: {{ team.score }}
      </li>
    {% endfor %}
    </ul>
  </body>
</html>
"#;

static BASE_TEMPLATE: &str = r#"<html>
<head><title>{% block title %}Site{% endblock %}</title></head>
<body>
{% block content %}{% endblock %}
<footer>{% include "footer.html" %}</footer>
</body>
</html>"#;

static PAGE_TEMPLATE: &str = r#"{% extends "base.html" %}
{% block title %}{{ title }} | {{ block.super }}{% endblock %}
{% block content %}
<h1>{{ title|upper }}</h1>
<div>{{ content|safe }}</div>
<p>{{ description|truncatechars:30 }}</p>
<ul>{% for item in items %}<li>{{ forloop.counter }}. {{ item|lower }}</li>{% empty %}<li>Nothing</li>{% endfor %}</ul>
{% if show_ad and items|length > 3 %}<aside>ad</aside>{% endif %}
{% endblock %}"#;

fn teams() -> Vec<Team> {
    [("Jiangsu", 43), ("Beijing", 27), ("Guangzhou", 22), ("Shandong", 12)]
        .into_iter()
        .map(|(name, score)| Team {
            name: name.into(),
            score,
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("compile-page", |b| {
        let env = Tessera::default();
        b.iter(|| black_box(env.from_string(black_box(PAGE_TEMPLATE))).unwrap());
    });

    c.bench_function("big-context", |b| {
        const NUM_OBJECTS: usize = 100;
        let objects: Vec<_> = (0..NUM_OBJECTS).map(BigObject::new).collect();

        let mut env = Tessera::default();
        env.add_raw_template(
            "big_loop.html",
            "{% for object in objects %}{% if object.field_a.i < 4 %}{{ object.field_a.i }}{% endif %}{% endfor %}",
        )
        .unwrap();
        let mut context = Context::new();
        context.insert("objects", &objects);
        let rendering = env.render("big_loop.html", &mut context).unwrap();
        assert_eq!(&rendering[..], "0123");
        b.iter(|| env.render("big_loop.html", &mut context));
    });

    c.bench_function("big-table", |b| {
        let length = 100;
        let table: Vec<Vec<usize>> = (0..length).map(|_| (0..length).collect()).collect();

        let mut env = Tessera::default();
        env.add_raw_template("big-table.html", BIG_TABLE_TEMPLATE)
            .unwrap();
        let mut ctx = Context::new();
        ctx.insert("table", &table);

        b.iter(|| {
            let res = env.render("big-table.html", &mut ctx);
            black_box(res).unwrap();
        })
    });

    c.bench_function("teams", |b| {
        let mut env = Tessera::default();
        env.add_raw_template("teams.html", TEAMS_TEMPLATE).unwrap();
        let mut ctx = Context::new();
        ctx.insert("year", &2015);
        ctx.insert("teams", &teams());

        b.iter(|| {
            let res = env.render("teams.html", &mut ctx);
            black_box(res).unwrap();
        })
    });

    c.bench_function("inheritance", |b| {
        let items = vec!["Hello World"; 20];
        let mut env = Tessera::default();
        env.add_raw_templates(vec![
            ("base.html", BASE_TEMPLATE),
            ("page.html", PAGE_TEMPLATE),
            ("footer.html", "Made with {{ title }}"),
        ])
        .unwrap();
        let mut ctx = Context::new();
        ctx.insert("description", &"Some description that is long enough to be truncated");
        ctx.insert("content", &"<a>Some HTML</a>");
        ctx.insert("title", &"Tessera");
        ctx.insert("items", &items);
        ctx.insert("show_ad", &true);

        b.iter(|| {
            let res = env.render("page.html", &mut ctx);
            black_box(res).unwrap();
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
