//! Template filters
//!
//! Pure helpers: serialization, encoding, string shaping and version checks.
//! Malformed input is an `InvalidOperation` error that aborts the render.

use base64::Engine as _;
use minijinja::value::Kwargs;
use minijinja::{Error, ErrorKind, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use semver::{Version, VersionReq};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Mutex;

pub(crate) fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

pub(crate) fn to_json(value: &Value) -> Result<JsonValue, Error> {
    serde_json::to_value(value).map_err(|e| invalid(e.to_string()))
}

/// Display form of a value: strings unquoted, everything else as rendered
pub(crate) fn plain_string(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None if value.is_undefined() || value.is_none() => String::new(),
        None => value.to_string(),
    }
}

/// Serialize a value as block YAML without the document marker
///
/// Usage: {{ values.machine.network | toyaml | nindent(4) }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let json = to_json(&value)?;
    let yaml = serde_yaml::to_string(&json).map_err(|e| invalid(e.to_string()))?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Usage: {{ values.nameservers | tojson }}
pub fn tojson(value: Value) -> Result<String, Error> {
    serde_json::to_string(&to_json(&value)?).map_err(|e| invalid(e.to_string()))
}

pub fn tojson_pretty(value: Value) -> Result<String, Error> {
    serde_json::to_string_pretty(&to_json(&value)?).map_err(|e| invalid(e.to_string()))
}

/// Parse a YAML document; an empty string is an empty mapping
///
/// Usage: {% set extra = values.extraPatch | fromyaml %}
pub fn fromyaml(text: String) -> Result<Value, Error> {
    if text.trim().is_empty() {
        return Ok(Value::from_serialize(serde_json::Map::new()));
    }
    let parsed: JsonValue =
        serde_yaml::from_str(&text).map_err(|e| invalid(format!("fromyaml: {e}")))?;
    Ok(Value::from_serialize(&parsed))
}

/// Parse a JSON document
pub fn fromjson(text: String) -> Result<Value, Error> {
    let parsed: JsonValue =
        serde_json::from_str(&text).map_err(|e| invalid(format!("fromjson: {e}")))?;
    Ok(Value::from_serialize(&parsed))
}

#[must_use]
pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

pub fn b64decode(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.trim().as_bytes())
        .map_err(|e| invalid(format!("b64decode: {e}")))?;
    String::from_utf8(decoded).map_err(|e| invalid(format!("b64decode: {e}")))
}

/// Usage: {{ values.clusterName | quote }}
#[must_use]
pub fn quote(value: Value) -> String {
    let s = plain_string(&value);
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[must_use]
pub fn squote(value: Value) -> String {
    format!("'{}'", plain_string(&value).replace('\'', "''"))
}

/// Indent every non-empty line and start with a newline
///
/// Usage: {{ values.kubelet | toyaml | nindent(6) }}
#[must_use]
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Indent every non-empty line; blank lines stay blank
#[must_use]
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fail the render when a value is missing or an empty string
///
/// Usage: {{ values.endpoint | required("endpoint is required") }}
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined()
        || value.is_none()
        || value.as_str().is_some_and(str::is_empty);
    if missing {
        Err(invalid(message.unwrap_or_else(|| "required value is missing".to_string())))
    } else {
        Ok(value)
    }
}

/// True for undefined, none, empty strings and empty containers
pub fn empty(value: Value) -> bool {
    if value.is_undefined() || value.is_none() {
        return true;
    }
    if let Some(s) = value.as_str() {
        return s.is_empty();
    }
    value.len() == Some(0)
}

/// Usage: {% if values | haskey("floatingIP") %}
pub fn haskey(value: Value, key: String) -> bool {
    value.get_attr(&key).is_ok_and(|v| !v.is_undefined())
}

pub fn keys(value: Value) -> Result<Vec<String>, Error> {
    let json = to_json(&value)?;
    match json {
        JsonValue::Object(map) => Ok(map.keys().cloned().collect()),
        JsonValue::Null => Ok(Vec::new()),
        other => Err(invalid(format!(
            "keys: expected a mapping, got {}",
            cairn_core::values::kind_name(&other)
        ))),
    }
}

/// Deep merge `overlay` onto `base`; the overlay wins on conflicts
///
/// Usage: {{ values.kubelet | merge({"extraArgs": {"rotate-server-certificates": true}}) | toyaml }}
pub fn merge(base: Value, overlay: Value) -> Result<Value, Error> {
    let mut merged = to_json(&base)?;
    cairn_core::deep_merge(&mut merged, &to_json(&overlay)?);
    Ok(Value::from_serialize(&merged))
}

/// Hex SHA-256 of a string
pub fn sha256sum(value: String) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Keep the first `length` characters
pub fn trunc(value: String, length: usize) -> String {
    value.chars().take(length).collect()
}

pub fn trimprefix(value: String, prefix: String) -> String {
    value.strip_prefix(&prefix).unwrap_or(&value).to_string()
}

pub fn trimsuffix(value: String, suffix: String) -> String {
    value.strip_suffix(&suffix).unwrap_or(&value).to_string()
}

/// Split on case changes and separators into lowercase words
fn words(value: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in value.chars() {
        if c == '_' || c == '-' || c == ' ' || c == '.' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Usage: {{ "podSubnets" | snakecase }} -> pod_subnets
pub fn snakecase(value: String) -> String {
    words(&value).join("_")
}

pub fn kebabcase(value: String) -> String {
    words(&value).join("-")
}

/// Usage: {{ "pod_subnets" | camelcase }} -> podSubnets
pub fn camelcase(value: String) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, word) in words(&value).iter().enumerate() {
        let mut chars = word.chars();
        if i == 0 {
            out.push_str(word);
        } else if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

const MIB: f64 = 1_048_576.0;
const GIB: f64 = 1_073_741_824.0;
const TIB: f64 = 1_099_511_627_776.0;

/// Render a byte count with two decimals
///
/// Below 1 MiB the value is still shown in MB, so anything non-zero is a
/// fraction of a megabyte. Below 1 TiB the unit is GB, so 2^30 bytes renders
/// "1.00 GB" rather than switching to TB at 2^30. Only 2^40 and above is TB.
///
/// Usage: {{ disk.size | human_size }}
pub fn human_size(bytes: Value) -> Result<String, Error> {
    let bytes = match bytes.as_str() {
        Some(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(format!("human_size: '{s}' is not a number")))?,
        None => f64::try_from(bytes.clone())
            .map_err(|_| invalid(format!("human_size: {bytes} is not a number")))?,
    };

    Ok(if bytes < MIB {
        format!("{:.2} MB", bytes / MIB)
    } else if bytes < TIB {
        format!("{:.2} GB", bytes / GIB)
    } else {
        format!("{:.2} TB", bytes / TIB)
    })
}

static REGEX_CACHE: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

pub(crate) fn compile_regex(pattern: &str) -> Result<Regex, Error> {
    let mut cache = REGEX_CACHE.lock().unwrap_or_else(|p| p.into_inner());
    if let Some(re) = cache.get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern).map_err(|e| invalid(format!("invalid regex '{pattern}': {e}")))?;
    cache.insert(pattern.to_string(), re.clone());
    Ok(re)
}

/// Replace every match; `$1` style group references work in the replacement
///
/// Usage: {{ link.hardwareAddr | regex_replace(":", "") }}
pub fn regex_replace(value: String, pattern: String, replacement: String) -> Result<String, Error> {
    Ok(compile_regex(&pattern)?
        .replace_all(&value, replacement.as_str())
        .into_owned())
}

/// Stringify every element of a list
///
/// Optional kwargs: `prefix`, `suffix`, `skip_empty` (drops none and "").
///
/// Usage: {{ values.certSANs | tostrings(prefix="san-") | join(",") }}
pub fn tostrings(value: Value, kwargs: Kwargs) -> Result<Vec<String>, Error> {
    let prefix: String = kwargs.get::<Option<String>>("prefix")?.unwrap_or_default();
    let suffix: String = kwargs.get::<Option<String>>("suffix")?.unwrap_or_default();
    let skip_empty: bool = kwargs.get::<Option<bool>>("skip_empty")?.unwrap_or(false);
    kwargs.assert_all_used()?;

    let items: Vec<Value> = match value.try_iter() {
        Ok(iter) if value.as_str().is_none() => iter.collect(),
        _ => vec![value],
    };

    Ok(items
        .iter()
        .map(plain_string)
        .filter(|s| !(skip_empty && s.is_empty()))
        .map(|s| format!("{prefix}{s}{suffix}"))
        .collect())
}

/// Check a version against a semver requirement; `v` prefixes and two-part
/// versions are accepted
///
/// Usage: {% if versions.kubernetes | semver_match(">=1.30") %}
pub fn semver_match(version: Value, constraint: String) -> Result<bool, Error> {
    let raw = version
        .as_str()
        .ok_or_else(|| invalid("semver_match: version must be a string"))?;
    let cleaned = raw.trim().trim_start_matches('v');

    let parsed = Version::parse(cleaned).or_else(|_| {
        let core = cleaned.split(['-', '+']).next().unwrap_or(cleaned);
        let parts: Vec<u64> = core
            .split('.')
            .map(|p| p.parse::<u64>())
            .collect::<Result<_, _>>()
            .map_err(|_| invalid(format!("semver_match: invalid version '{raw}'")))?;
        match parts.as_slice() {
            [major, minor, patch, ..] => Ok(Version::new(*major, *minor, *patch)),
            [major, minor] => Ok(Version::new(*major, *minor, 0)),
            [major] => Ok(Version::new(*major, 0, 0)),
            [] => Err(invalid(format!("semver_match: invalid version '{raw}'"))),
        }
    })?;

    let req = VersionReq::parse(constraint.trim())
        .map_err(|e| invalid(format!("semver_match: invalid constraint '{constraint}': {e}")))?;
    Ok(req.matches(&parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::Environment;

    fn env() -> Environment<'static> {
        let mut env = Environment::new();
        env.add_filter("tostrings", tostrings);
        env.add_filter("regex_replace", regex_replace);
        env.add_filter("merge", merge);
        env.add_filter("toyaml", toyaml);
        env.add_filter("human_size", human_size);
        env
    }

    #[test]
    fn test_toyaml() {
        let value = Value::from_serialize(serde_json::json!({
            "hostname": "cp-1",
            "nameservers": ["1.1.1.1"]
        }));
        assert_eq!(toyaml(value).unwrap(), "hostname: cp-1\nnameservers:\n- 1.1.1.1");
    }

    #[test]
    fn test_fromyaml_fromjson() {
        let value = fromyaml("a: 1\nb: [x]\n".to_string()).unwrap();
        assert_eq!(value.get_attr("a").unwrap(), Value::from(1));

        assert_eq!(fromyaml("  \n".to_string()).unwrap().len(), Some(0));
        assert!(fromyaml("a: [".to_string()).is_err());

        let value = fromjson(r#"["10.0.0.1/24"]"#.to_string()).unwrap();
        assert_eq!(value.len(), Some(1));
        assert!(fromjson("{".to_string()).is_err());
    }

    #[test]
    fn test_b64() {
        let encoded = b64encode("machine token".to_string());
        assert_eq!(b64decode(encoded).unwrap(), "machine token");
        assert!(b64decode("%%%".to_string()).is_err());
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote(Value::from("lab")), "\"lab\"");
        assert_eq!(quote(Value::from(6443)), "\"6443\"");
        assert_eq!(squote(Value::from("it's")), "'it''s'");
    }

    #[test]
    fn test_indent() {
        assert_eq!(nindent("a: 1\nb: 2".to_string(), 4), "\n    a: 1\n    b: 2");
        assert_eq!(indent("a\n\nb".to_string(), 2), "  a\n\n  b");
    }

    #[test]
    fn test_required_and_empty() {
        assert!(required(Value::from("x"), None).is_ok());
        assert!(required(Value::UNDEFINED, None).is_err());
        let err = required(Value::from(""), Some("endpoint is required".into())).unwrap_err();
        assert!(err.to_string().contains("endpoint is required"));

        assert!(empty(Value::UNDEFINED));
        assert!(empty(Value::from_serialize(Vec::<i32>::new())));
        assert!(!empty(Value::from(0)));
    }

    #[test]
    fn test_merge_uses_value_semantics() {
        let result = env()
            .render_str(
                "{{ base | merge(over) | toyaml }}",
                minijinja::context! {
                    base => serde_json::json!({"a": {"x": 1, "y": 2}, "l": [1, 2]}),
                    over => serde_json::json!({"a": {"y": 3}, "l": [9]}),
                },
            )
            .unwrap();
        assert_eq!(result, "a:\n  x: 1\n  y: 3\nl:\n- 9");
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(snakecase("podSubnets".into()), "pod_subnets");
        assert_eq!(kebabcase("PodSubnets".into()), "pod-subnets");
        assert_eq!(camelcase("pod_subnets".into()), "podSubnets");
        assert_eq!(camelcase("service-subnets".into()), "serviceSubnets");
        assert_eq!(trunc("controlplane".into(), 7), "control");
        assert_eq!(trimprefix("v1.7".into(), "v".into()), "1.7");
        assert_eq!(trimsuffix("eth0.100".into(), ".100".into()), "eth0");
    }

    #[test]
    fn test_human_size_boundaries() {
        let size = |n: u64| human_size(Value::from(n)).unwrap();
        assert_eq!(size(1_048_575), "1.00 MB");
        assert_eq!(size(1_048_576), "0.00 GB");
        assert_eq!(size(1_073_741_823), "1.00 GB");
        assert_eq!(size(1_073_741_824), "1.00 GB");
        assert_eq!(size(1 << 40), "1.00 TB");
        assert_eq!(size(512_110_190_592), "476.94 GB");
        assert_eq!(human_size(Value::from("1099511627776")).unwrap(), "1.00 TB");
        assert!(human_size(Value::from("big")).is_err());
    }

    #[test]
    fn test_regex_replace() {
        let out = regex_replace("00:11:22:aa".into(), ":".into(), "".into()).unwrap();
        assert_eq!(out, "001122aa");
        let out = regex_replace("eth0".into(), r"^eth(\d+)$".into(), "net$1".into()).unwrap();
        assert_eq!(out, "net0");
        assert!(regex_replace("x".into(), "(".into(), "".into()).is_err());
    }

    #[test]
    fn test_tostrings() {
        let env = env();
        let out = env
            .render_str(r#"{{ [80, "", 443] | tostrings(prefix="p", skip_empty=true) | join(",") }}"#, ())
            .unwrap();
        assert_eq!(out, "p80,p443");
        let out = env.render_str(r#"{{ "solo" | tostrings | join(",") }}"#, ()).unwrap();
        assert_eq!(out, "solo");
    }

    #[test]
    fn test_semver_match() {
        assert!(semver_match(Value::from("v1.30.3"), ">=1.30".into()).unwrap());
        assert!(!semver_match(Value::from("1.29"), ">=1.30".into()).unwrap());
        assert!(semver_match(Value::from("1.31.0"), "<1.32".into()).unwrap());
        assert!(semver_match(Value::from("x.y"), ">=1".into()).is_err());
    }
}
