//! End-to-end rendering tests: templates in, text out.
//!
//! Each case renders through the public [`Engine`] API against a fresh or
//! prepared environment.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;

use atpl::{Adapter, Engine, Environment, Error, Functions, HostObject, TypeRegistry, Value};
use chrono::NaiveDate;
use indexmap::IndexMap;
use pretty_assertions::assert_eq;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn render(template: &str) -> String {
    Engine::new()
        .render(template, &mut Environment::new())
        .unwrap_or_else(|e| panic!("render of {template:?} failed: {e}"))
}

fn render_env(template: &str, env: &mut Environment) -> String {
    Engine::new()
        .render(template, env)
        .unwrap_or_else(|e| panic!("render of {template:?} failed: {e}"))
}

fn eval(expr: &str) -> Value {
    Engine::new()
        .evaluate(expr, &Environment::new())
        .unwrap_or_else(|e| panic!("evaluation of {expr:?} failed: {e}"))
}

// ── Host objects ──────────────────────────────────────────────────────────────

#[derive(Debug)]
struct User {
    name: String,
    age: i64,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Adapter for User {
    fn property(&self, name: &str) -> Option<Value> {
        match name {
            "Name" => Some(Value::from(self.name.as_str())),
            "Age" => Some(Value::Int(self.age)),
            _ => None,
        }
    }

    fn invoke(&self, name: &str, args: &[Value]) -> Result<Option<Value>, String> {
        match name {
            "Greet" => {
                let whom = args.first().map(Value::to_string).unwrap_or_default();
                Ok(Some(Value::Str(format!("{} greets {whom}", self.name))))
            }
            _ => Ok(None),
        }
    }
}

impl HostObject for User {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn adapter(&self) -> Option<&dyn Adapter> {
        Some(self)
    }

    fn compare(&self, other: &Value) -> Option<Ordering> {
        other.to_int().ok().map(|n| self.age.cmp(&n))
    }
}

#[derive(Debug)]
struct Team(Vec<&'static str>);

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "team of {}", self.0.len())
    }
}

impl HostObject for Team {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn items(&self) -> Option<Vec<Value>> {
        Some(self.0.iter().map(|&s| Value::from(s)).collect())
    }
}

// ── Expression properties ─────────────────────────────────────────────────────

#[test]
fn precedence_and_grouping() {
    assert_eq!(eval("2+3*4"), Value::Int(14));
    assert_eq!(eval("(2+3)*4"), Value::Int(20));
}

#[test]
fn negation() {
    assert_eq!(eval("!true"), Value::Bool(false));
    assert_eq!(eval("!!true"), Value::Bool(true));
}

#[test]
fn relational() {
    assert_eq!(eval("1<2"), Value::Bool(true));
    assert_eq!(eval("\"b\">\"a\""), Value::Bool(true));
    assert_eq!(eval("null==\"\""), Value::Bool(true));
}

#[test]
fn independent_arguments() {
    let mut fns = Functions::new();
    fns.register("pair", |args: &[Value]| {
        Ok(Value::Str(
            args.iter().map(Value::to_string).collect::<Vec<_>>().join("|"),
        ))
    });
    let engine = Engine::new().with_functions(fns);
    let v = engine.evaluate("pair(1+1, 2+2)", &Environment::new()).unwrap();
    assert_eq!(v, Value::from("2|4"));
}

// ── Directives ────────────────────────────────────────────────────────────────

#[test]
fn set_then_interpolate() {
    assert_eq!(render("@[SET:x=5]@[=x*x]"), "25");
}

#[test]
fn if_else_endif() {
    assert_eq!(render("@[IF:false]A@[ELSE]B@[ENDIF]"), "B");
    assert_eq!(render("@[IF:false]@[IF:true]X@[ENDIF]@[ENDIF]"), "");
}

#[test]
fn while_counts() {
    assert_eq!(
        render("@[SET:i=0]@[WHILE:i<3]@[=i]@[SET:i=i+1]@[ENDWHILE]"),
        "012"
    );
}

#[test]
fn nested_loops() {
    let out = render(
        "@[FOREACH:row IN range(1, 3)]\
         @[FOREACH:col IN range(1, 4)]@[=row*col] @[ENDFOREACH]\n\
         @[ENDFOREACH]",
    );
    assert_eq!(out, "1 2 3 \n2 4 6 \n");
}

#[test]
fn while_inside_foreach() {
    let out = render(
        "@[FOREACH:n IN list(1, 3)]\
         @[SET:i=0]@[WHILE:i<n]*@[SET:i=i+1]@[ENDWHILE];\
         @[ENDFOREACH]",
    );
    assert_eq!(out, "*;***;");
}

#[test]
fn foreach_binds_each_element_once() {
    let mut env = Environment::new();
    env.set("names", Value::List(vec!["ann".into(), "bob".into(), "cy".into()]));
    let out = render_env(
        "@[FOREACH:n IN names]@[=n]@[IF:n<>\"cy\"], @[ENDIF]@[ENDFOREACH]",
        &mut env,
    );
    assert_eq!(out, "ann, bob, cy");
}

#[test]
fn foreach_over_empty() {
    let mut env = Environment::new();
    env.set("none", Value::List(vec![]));
    assert_eq!(render_env("[@[FOREACH:x IN none]@[=x]@[ENDFOREACH]]", &mut env), "[]");
    assert!(!env.contains("x"));
}

#[test]
fn foreach_over_map_entries() {
    let mut prices = IndexMap::new();
    prices.insert("tea".to_owned(), Value::Int(3));
    prices.insert("cake".to_owned(), Value::Int(5));
    let mut env = Environment::new();
    env.set("prices", prices);
    let out = render_env(
        "@[FOREACH:p IN prices]@[=p->Key]=@[=p->Value];@[ENDFOREACH]",
        &mut env,
    );
    assert_eq!(out, "tea=3;cake=5;");
}

#[test]
fn list_dumps_environment() {
    assert_eq!(
        render("@[SET:a=1]@[SET:b=\"two\"]@[SET:c=true]@[LIST]"),
        "a: 1, b: two, c: true"
    );
}

#[test]
fn list_inside_false_branch() {
    let mut env = Environment::new();
    env.set("a", 1);
    assert_eq!(render_env("@[IF:false]hidden@[LIST]@[ENDIF]", &mut env), "a: 1");
}

#[test]
fn backslashes_pass_through_literals() {
    assert_eq!(render(r#"@[="a\b"]"#), r"a\b");
    assert_eq!(render(r#"path=@[="C:\dir\"];"#), r"path=C:\dir\;");
    assert_eq!(render(r#"@[="12ab"->Matches("\d+")]"#), "true");
    assert_eq!(render(r##"@[="a1b22"->Replace("\d", "#")]"##), "a#b##");
}

#[test]
fn multi_line_document() {
    let mut env = Environment::new();
    env.set("title", "Report");
    env.set("rows", Value::List(vec![1.into(), 2.into()]));
    let template = "\
<h1>@[=title->HtmlEncoded]</h1>
<ul>
@[FOREACH:r IN rows]  <li>row @[=r]</li>
@[ENDFOREACH]</ul>
@[IF:rows->Count > 1]plural@[ELSE]single@[ENDIF]
";
    let expected = "\
<h1>Report</h1>
<ul>
  <li>row 1</li>
  <li>row 2</li>
</ul>
plural
";
    assert_eq!(render_env(template, &mut env), expected);
}

#[test]
fn rerender_is_identical() {
    let engine = Engine::new();
    let mut env = Environment::new();
    env.set("xs", Value::List(vec![1.into(), 2.into(), 3.into()]));
    let template = "@[FOREACH:x IN xs]@[=x*2],@[ENDFOREACH]@[=strlen(\"abc\")]";
    let first = engine.render(template, &mut env.clone()).unwrap();
    let second = engine.render(template, &mut env.clone()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, "2,4,6,3");
}

// ── Adapters and host objects ─────────────────────────────────────────────────

#[test]
fn builtin_adapters() {
    let mut env = Environment::new();
    env.set(
        "when",
        NaiveDate::from_ymd_opt(2023, 12, 25)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap(),
    );
    env.set("big", 1234567);
    let out = render_env(
        "@[=when->Year]/@[=when->Month]/@[=when->Day] @[=when->ShortTime] \
         @[=when->DayOfWeek] @[=big->NumberFormat] @[=\"a b\"->UrlEncoded]",
        &mut env,
    );
    assert_eq!(out, "2023/12/25 08:30 Monday 1,234,567 a+b");
}

#[test]
fn host_object_adapter() {
    let mut env = Environment::new();
    env.set(
        "user",
        Value::object(User {
            name: "Ada".into(),
            age: 36,
        }),
    );
    let out = render_env(
        "@[=user] (@[=user->Age]) says @[=user->Greet(\"you\")]; \
         @[IF:user > 30]senior@[ENDIF]@[=user->Missing]",
        &mut env,
    );
    assert_eq!(out, "Ada (36) says Ada greets you; senior");
}

#[test]
fn host_object_iteration() {
    let mut env = Environment::new();
    env.set("team", Value::object(Team(vec!["x", "y"])));
    assert_eq!(
        render_env("@[=team]: @[FOREACH:m IN team]<@[=m]>@[ENDFOREACH]", &mut env),
        "team of 2: <x><y>"
    );
}

#[test]
fn registered_type_fields() {
    let mut types = TypeRegistry::new();
    types.register_field::<Team>("Size", |t| Value::Int(t.0.len() as i64));
    let engine = Engine::new().with_types(types);
    let mut env = Environment::new();
    env.set("team", Value::object(Team(vec!["x", "y", "z"])));
    let out = engine
        .render("@[=team->Size]|@[=team->Unknown]|", &mut env)
        .unwrap();
    assert_eq!(out, "3||");
}

// ── Hooks ─────────────────────────────────────────────────────────────────────

#[test]
fn hook_can_mutate_environment() {
    let engine = Engine::new();
    let mut env = Environment::new();
    let mut hook = |d: &str, _: usize, env: &mut Environment| -> Result<String, String> {
        if let Some(name) = d.strip_prefix("load:") {
            env.set(name, "loaded");
        }
        Ok(String::new())
    };
    let out = engine
        .render_with_hook("@[load:page]@[=page]", &mut env, &mut hook)
        .unwrap();
    assert_eq!(out, "loaded");
}

#[test]
fn delegated_rendering() {
    let engine = Engine::new();
    let mut hook = |d: &str, _: usize, _: &mut Environment| -> Result<String, String> {
        Ok(format!("{{{d}}}"))
    };
    let out = engine
        .render_delegated("x@[=1+1]y@[LIST]", &mut Environment::new(), &mut hook)
        .unwrap();
    assert_eq!(out, "x{=1+1}y{LIST}");
}

// ── Failures ──────────────────────────────────────────────────────────────────

#[test]
fn evaluation_failure_aborts_render() {
    let err = Engine::new()
        .render("partial @[=1/0] output", &mut Environment::new())
        .unwrap_err();
    assert!(err.is_arithmetic());
    assert!(matches!(&err, Error::Evaluation { expression, .. } if expression == "1/0"));
}

#[test]
fn structural_failures() {
    for template in ["@[ENDIF]", "@[IF:1]", "@[FOREACH:x IN list(1)]@[ENDWHILE]", "@[=1"] {
        let err = Engine::new()
            .render(template, &mut Environment::new())
            .unwrap_err();
        assert!(err.is_structural(), "{template:?} gave {err}");
    }
}

#[test]
fn error_source_chain() {
    use std::error::Error as _;
    let err = Engine::new()
        .render("@[=(1+2]", &mut Environment::new())
        .unwrap_err();
    assert_eq!(err.to_string(), "cannot evaluate `(1+2`: unmatched parenthesis");
    assert_eq!(err.source().map(|e| e.to_string()).as_deref(), Some("unmatched parenthesis"));
}
