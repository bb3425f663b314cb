//! Template functions (global functions available in templates)

use minijinja::value::{Rest, ValueKind};
use minijinja::{Error, ErrorKind, State, Value};
use std::cell::Cell;

use crate::definitions::DEFINITIONS_TEMPLATE;
use crate::filters::{compile_regex, invalid, plain_string, to_json};

/// Maximum nesting of `tpl` evaluations
const MAX_TPL_DEPTH: usize = 10;

/// Top-level names handed to strings evaluated with `tpl_ctx`
const TPL_CONTEXT_NAMES: &[&str] = &["values", "chart", "versions", "machine_type", "template"];

thread_local! {
    // Nested `tpl` calls render through fresh states on the same thread
    static TPL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Abort the render with a message
///
/// Usage: {{ fail("endpoint must be set") }}
pub fn fail(message: String) -> Result<Value, Error> {
    Err(invalid(message))
}

/// Build a mapping from alternating keys and values
///
/// Usage: {{ dict("hardwareAddr", mac, "driver", "virtio_net") }}
pub fn dict(args: Vec<Value>) -> Result<Value, Error> {
    if args.len() % 2 != 0 {
        return Err(invalid("dict expects key/value pairs"));
    }

    let mut map = serde_json::Map::new();
    for pair in args.chunks(2) {
        let key = pair[0]
            .as_str()
            .ok_or_else(|| invalid(format!("dict keys must be strings, got {}", pair[0].kind())))?;
        map.insert(key.to_string(), to_json(&pair[1])?);
    }
    Ok(Value::from_serialize(&map))
}

pub fn list(args: Vec<Value>) -> Value {
    Value::from(args)
}

/// Usage: {{ get(values, "clusterDomain", "cluster.local") }}
pub fn get(obj: Value, key: String, default: Option<Value>) -> Value {
    match obj.get_attr(&key) {
        Ok(v) if !v.is_undefined() && !v.is_none() => v,
        _ => default.unwrap_or(Value::UNDEFINED),
    }
}

fn as_map(dict: &Value, func: &str) -> Result<serde_json::Map<String, serde_json::Value>, Error> {
    match dict.kind() {
        ValueKind::Map => match to_json(dict)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(invalid(format!("{func} expects a mapping"))),
        },
        ValueKind::Undefined | ValueKind::None => Ok(serde_json::Map::new()),
        other => Err(invalid(format!("{func} expects a mapping, got {other}"))),
    }
}

/// Copy of a mapping with one key set
///
/// Usage: {% set link = set(link, "mtu", 9000) %}
pub fn set(dict: Value, key: String, val: Value) -> Result<Value, Error> {
    let mut map = as_map(&dict, "set")?;
    map.insert(key, to_json(&val)?);
    Ok(Value::from_serialize(&map))
}

/// Copy of a mapping without one key
pub fn unset(dict: Value, key: String) -> Result<Value, Error> {
    let mut map = as_map(&dict, "unset")?;
    map.shift_remove(&key);
    Ok(Value::from_serialize(&map))
}

/// Walk nested keys, falling back to the last argument
///
/// Usage: {{ dig(link, "spec", "hardwareAddr", "") }}
pub fn dig(obj: Value, keys_and_default: Rest<Value>) -> Result<Value, Error> {
    let Some((default, keys)) = keys_and_default.split_last() else {
        return Err(invalid("dig expects at least a default value"));
    };

    let mut current = obj;
    for key in keys {
        let next = if let Some(name) = key.as_str() {
            current.get_attr(name)
        } else {
            current.get_item(key)
        };
        match next {
            Ok(v) if !v.is_undefined() && !v.is_none() => current = v,
            _ => return Ok(default.clone()),
        }
    }
    Ok(current)
}

fn is_blank(value: &Value) -> bool {
    value.is_undefined() || value.is_none() || value.as_str().is_some_and(str::is_empty)
}

/// First argument that is neither missing nor an empty string
///
/// Usage: {{ coalesce(values.hostname, discovered_hostname(), "node") }}
pub fn coalesce(args: Vec<Value>) -> Value {
    args.into_iter()
        .find(|v| !is_blank(v))
        .unwrap_or(Value::UNDEFINED)
}

/// Usage: {{ ternary("controlplane", "worker", values.isControlPlane) }}
pub fn ternary(true_val: Value, false_val: Value, condition: Value) -> Value {
    if condition.is_true() { true_val } else { false_val }
}

pub fn tostring(value: Value) -> String {
    plain_string(&value)
}

/// Integer conversion; numeric strings and floats are accepted, floats truncate
pub fn toint(value: Value) -> Result<i64, Error> {
    if let Some(n) = value.as_i64() {
        return Ok(n);
    }
    if let Some(s) = value.as_str() {
        let s = s.trim();
        return s
            .parse::<i64>()
            .or_else(|_| s.parse::<f64>().map(|f| f as i64))
            .map_err(|_| invalid(format!("toint: cannot convert '{s}'")));
    }
    match value.kind() {
        ValueKind::Number => f64::try_from(value.clone())
            .map(|f| f as i64)
            .map_err(|_| invalid(format!("toint: cannot convert {value}"))),
        ValueKind::Bool => Ok(i64::from(value.is_true())),
        ValueKind::Undefined | ValueKind::None => Ok(0),
        other => Err(invalid(format!("toint: cannot convert a {other}"))),
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value.as_str() {
        Some(s) => s.trim().parse().ok(),
        None => f64::try_from(value.clone()).ok(),
    }
}

/// Printf-style formatting
///
/// Supports `%s`, `%v`, `%d`, `%f`, `%.Nf` and `%%`.
///
/// Usage: {{ printf("%s/%d", address, prefix) }}
pub fn printf(format: String, args: Vec<Value>) -> Result<String, Error> {
    let mut out = String::with_capacity(format.len() + args.len() * 8);
    let mut chars = format.chars().peekable();
    let mut args = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut precision: Option<usize> = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(*d);
                chars.next();
            }
            precision = Some(digits.parse().unwrap_or(0));
        }

        let Some(verb) = chars.next() else {
            out.push('%');
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }

        let arg = args
            .next()
            .ok_or_else(|| invalid(format!("printf: missing argument for %{verb}")))?;

        match verb {
            's' | 'v' => out.push_str(&plain_string(arg)),
            'd' => match arg.as_i64() {
                Some(n) => out.push_str(&n.to_string()),
                None => out.push_str(&toint(arg.clone())?.to_string()),
            },
            'f' => {
                let f = as_float(arg)
                    .ok_or_else(|| invalid(format!("printf: %f expects a number, got {arg}")))?;
                out.push_str(&format!("{:.*}", precision.unwrap_or(6), f));
            }
            other => return Err(invalid(format!("printf: unsupported verb %{other}"))),
        }
    }

    Ok(out)
}

/// Usage: {% if regex_match("^(eno|eth|enp|enx|ens)", link.id) %}
pub fn regex_match(pattern: String, text: String) -> Result<bool, Error> {
    Ok(compile_regex(&pattern)?.is_match(&text))
}

/// List membership
///
/// Usage: {% if has(discovered_default_addresses(), address) %}
pub fn has(haystack: Value, needle: Value) -> Result<bool, Error> {
    if is_blank(&haystack) {
        return Ok(false);
    }
    if haystack.kind() != ValueKind::Seq {
        return Err(invalid(format!("has expects a list, got {}", haystack.kind())));
    }
    Ok(haystack.try_iter()?.any(|item| item == needle))
}

/// Call a named block (macro) by name; the result is its rendered text
///
/// Names resolve in the caller's scope first, then in the shared definitions
/// module, so blocks can include sibling blocks.
///
/// Usage: {{ include("machine_network") | nindent(2) }}
pub fn include(state: &State, name: String, args: Rest<Value>) -> Result<String, Error> {
    let not_found = || {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("include: no named block `{name}`"),
        )
    };

    if let Some(block) = state.lookup(&name).filter(|v| !v.is_undefined()) {
        return Ok(plain_string(&block.call(state, &args[..])?));
    }

    // Macros only run against the state that defined them
    let definitions = state
        .env()
        .get_template(DEFINITIONS_TEMPLATE)
        .map_err(|_| not_found())?;
    let module = definitions.eval_to_state(())?;
    let block = module
        .lookup(&name)
        .filter(|v| !v.is_undefined())
        .ok_or_else(not_found)?;
    Ok(plain_string(&block.call(&module, &args[..])?))
}

/// Render a string as a template with an explicit context
///
/// Usage: {{ tpl(values.hostnameTemplate, {"index": 3}) }}
pub fn tpl(state: &State, template: String, context: Value) -> Result<String, Error> {
    if !template.contains("{{") && !template.contains("{%") {
        return Ok(template);
    }
    evaluate(state, &template, context)
}

/// Render a string as a template with the current top-level context
///
/// Usage: {{ tpl_ctx(values.hostnameTemplate) }}
pub fn tpl_ctx(state: &State, template: String) -> Result<String, Error> {
    if !template.contains("{{") && !template.contains("{%") {
        return Ok(template);
    }

    let mut ctx = serde_json::Map::new();
    for name in TPL_CONTEXT_NAMES {
        if let Some(v) = state.lookup(name).filter(|v| !v.is_undefined()) {
            ctx.insert((*name).to_string(), to_json(&v)?);
        }
    }
    evaluate(state, &template, Value::from_serialize(&ctx))
}

fn evaluate(state: &State, template: &str, context: Value) -> Result<String, Error> {
    let level = TPL_DEPTH.with(|d| {
        d.set(d.get() + 1);
        d.get()
    });

    let result = if level > MAX_TPL_DEPTH {
        Err(invalid(format!(
            "tpl nested deeper than {MAX_TPL_DEPTH} levels; a value probably refers to itself"
        )))
    } else {
        state.env().render_str(template, context).map_err(|e| {
            let preview: String = template.chars().take(60).collect();
            invalid(format!("tpl: {e} (in \"{preview}\")"))
        })
    };

    TPL_DEPTH.with(|d| d.set(d.get() - 1));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::{Environment, context};

    fn env() -> Environment<'static> {
        let mut env = Environment::new();
        env.add_function("dict", dict);
        env.add_function("set", set);
        env.add_function("unset", unset);
        env.add_function("dig", dig);
        env.add_function("include", include);
        env.add_function("tpl", tpl);
        env.add_function("tpl_ctx", tpl_ctx);
        env.add_function("printf", printf);
        env.add_function("has", has);
        env.add_function("coalesce", coalesce);
        env.add_filter("tojson", crate::filters::tojson);
        env
    }

    #[test]
    fn test_fail() {
        let err = fail("endpoint must be set".into()).unwrap_err();
        assert!(err.to_string().contains("endpoint must be set"));
    }

    #[test]
    fn test_dict_and_set() {
        let env = env();
        let out = env
            .render_str(
                r#"{% set d = dict("a", 1, "b", 2) %}{{ set(d, "c", 3) | tojson }} {{ unset(d, "a") | tojson }}"#,
                (),
            )
            .unwrap();
        assert_eq!(out, r#"{"a":1,"b":2,"c":3} {"b":2}"#);
        assert!(dict(vec![Value::from("a")]).is_err());
        assert!(set(Value::from(1), "a".into(), Value::from(2)).is_err());
    }

    #[test]
    fn test_get_and_dig() {
        let obj = Value::from_serialize(serde_json::json!({"spec": {"hardwareAddr": "aa:bb"}}));
        assert_eq!(get(obj.clone(), "missing".into(), Some(Value::from("x"))), Value::from("x"));

        let out = env()
            .render_str(
                r#"{{ dig(link, "spec", "hardwareAddr", "none") }}/{{ dig(link, "spec", "driver", "none") }}"#,
                context! { link => obj },
            )
            .unwrap();
        assert_eq!(out, "aa:bb/none");
    }

    #[test]
    fn test_coalesce_and_ternary() {
        assert_eq!(
            coalesce(vec![Value::UNDEFINED, Value::from(""), Value::from("cp-1")]),
            Value::from("cp-1")
        );
        assert!(coalesce(vec![Value::from(())]).is_undefined());
        assert_eq!(ternary(Value::from("a"), Value::from("b"), Value::from(false)), Value::from("b"));
    }

    #[test]
    fn test_toint() {
        assert_eq!(toint(Value::from("42")).unwrap(), 42);
        assert_eq!(toint(Value::from("4.7")).unwrap(), 4);
        assert_eq!(toint(Value::from(true)).unwrap(), 1);
        assert!(toint(Value::from("disk")).is_err());
    }

    #[test]
    fn test_printf() {
        let args = vec![Value::from("eth0"), Value::from(24), Value::from(0.5)];
        assert_eq!(
            printf("%s/%d %.2f %%".into(), args).unwrap(),
            "eth0/24 0.50 %"
        );
        assert_eq!(printf("%f".into(), vec![Value::from(1)]).unwrap(), "1.000000");
        assert!(printf("%s %s".into(), vec![Value::from("a")]).is_err());
        assert!(printf("%q".into(), vec![Value::from("a")]).is_err());
    }

    #[test]
    fn test_regex_match_and_has() {
        assert!(regex_match("^(eno|eth|enp|enx|ens)".into(), "enp3s0".into()).unwrap());
        assert!(!regex_match("^(eno|eth|enp|enx|ens)".into(), "bond0".into()).unwrap());

        let list = Value::from(vec![Value::from("10.0.0.5/24")]);
        assert!(has(list.clone(), Value::from("10.0.0.5/24")).unwrap());
        assert!(!has(list, Value::from("10.0.0.6/24")).unwrap());
        assert!(!has(Value::UNDEFINED, Value::from("x")).unwrap());
    }

    #[test]
    fn test_include_macro() {
        let out = env()
            .render_str(
                r#"{% macro nic(name) %}iface={{ name }}{% endmacro %}{{ include("nic", "eth0") }}"#,
                (),
            )
            .unwrap();
        assert_eq!(out, "iface=eth0");

        let err = env().render_str(r#"{{ include("missing") }}"#, ()).unwrap_err();
        assert!(err.to_string().contains("no named block"));
    }

    #[test]
    fn test_tpl() {
        let out = env()
            .render_str(
                r#"{{ tpl(values.name, {"index": 3}) }}|{{ tpl_ctx(values.greeting) }}"#,
                context! { values => context! { name => "node-{{ index }}", greeting => "hi {{ values.user }}", user => "ops" } },
            )
            .unwrap();
        assert_eq!(out, "node-3|hi ops");
    }

    #[test]
    fn test_tpl_recursion_limit() {
        let err = env()
            .render_str(
                "{{ tpl_ctx(values.again) }}",
                context! { values => context! { again => "{{ tpl_ctx(values.again) }}" } },
            )
            .unwrap_err();
        assert!(format!("{err:#}").contains("nested deeper"));
    }
}
