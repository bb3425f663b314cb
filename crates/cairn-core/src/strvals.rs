//! Parser for inline value assignments (`--set key1=val1,key2=val2`)

use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};
use crate::values::{SetKind, SetSpec};

/// One step of a key path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Apply one assignment list to `root`
pub fn apply(root: &mut JsonValue, spec: &SetSpec) -> Result<()> {
    if !root.is_object() {
        *root = JsonValue::Object(serde_json::Map::new());
    }

    match spec.kind {
        SetKind::Literal => {
            let (key, value) = split_assignment(&spec.raw)?;
            let segments = parse_key(key)?;
            assign(root, &segments, JsonValue::String(value.to_string()), &spec.raw)
        }
        SetKind::Json => apply_json(root, &spec.raw),
        SetKind::Plain | SetKind::String | SetKind::File => {
            for entry in split_unescaped(&spec.raw, ',', true) {
                if entry.is_empty() {
                    continue;
                }
                let (key, raw_value) = split_assignment(&entry)?;
                let segments = parse_key(key)?;
                let value = match spec.kind {
                    SetKind::File => read_file_value(raw_value, &entry)?,
                    kind => typed_value(raw_value, kind == SetKind::String),
                };
                assign(root, &segments, value, &entry)?;
            }
            Ok(())
        }
    }
}

/// `--set-json` values may contain commas, so each value is consumed by a
/// JSON stream deserializer instead of splitting on commas.
fn apply_json(root: &mut JsonValue, raw: &str) -> Result<()> {
    let mut rest = raw;

    while !rest.is_empty() {
        let eq = find_unescaped(rest, '=')
            .ok_or_else(|| CoreError::value_parse(raw, "missing '=' in assignment"))?;
        let key = &rest[..eq];
        let after = &rest[eq + 1..];

        let mut stream = serde_json::Deserializer::from_str(after).into_iter::<JsonValue>();
        let value = match stream.next() {
            Some(Ok(value)) => value,
            Some(Err(e)) => {
                return Err(CoreError::value_parse(raw, format!("invalid JSON for '{key}': {e}")));
            }
            None => return Err(CoreError::value_parse(raw, format!("missing JSON value for '{key}'"))),
        };
        let consumed = stream.byte_offset();

        let segments = parse_key(key)?;
        assign(root, &segments, value, raw)?;

        rest = after[consumed..].trim_start();
        if let Some(stripped) = rest.strip_prefix(',') {
            rest = stripped;
        } else if !rest.is_empty() {
            return Err(CoreError::value_parse(
                raw,
                format!("unexpected trailing input '{rest}'"),
            ));
        }
    }

    Ok(())
}

fn split_assignment(entry: &str) -> Result<(&str, &str)> {
    let eq = find_unescaped(entry, '=')
        .ok_or_else(|| CoreError::value_parse(entry, "missing '=' in assignment"))?;
    Ok((&entry[..eq], &entry[eq + 1..]))
}

fn read_file_value(path: &str, entry: &str) -> Result<JsonValue> {
    let path = unescape(path);
    let bytes = std::fs::read(&path)
        .map_err(|e| CoreError::value_parse(entry, format!("cannot read '{path}': {e}")))?;
    Ok(JsonValue::String(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Convert a raw value to JSON, honouring `{a,b}` list syntax
fn typed_value(raw: &str, force_string: bool) -> JsonValue {
    if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        if inner.is_empty() {
            return JsonValue::Array(vec![]);
        }
        return JsonValue::Array(
            split_unescaped(inner, ',', false)
                .iter()
                .map(|item| scalar(item, force_string))
                .collect(),
        );
    }
    scalar(raw, force_string)
}

fn scalar(raw: &str, force_string: bool) -> JsonValue {
    let value = unescape(raw);
    if force_string {
        return JsonValue::String(value);
    }
    match value.as_str() {
        "true" => JsonValue::Bool(true),
        "false" => JsonValue::Bool(false),
        "null" => JsonValue::Null,
        s if is_plain_integer(s) => s
            .parse::<i64>()
            .map(|n| JsonValue::Number(n.into()))
            .unwrap_or(JsonValue::String(value)),
        _ => JsonValue::String(value),
    }
}

/// Integers without a leading zero; `007` and `1.5` stay strings
fn is_plain_integer(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    digits == "0" || !digits.starts_with('0')
}

/// Largest list index an assignment may address; lists are padded up to it
pub const MAX_INDEX: usize = 65536;

/// Parse a dotted key path with optional `[N]` indices
pub fn parse_key(key: &str) -> Result<Vec<Segment>> {
    if key.is_empty() {
        return Err(CoreError::value_parse(key, "empty key"));
    }

    let mut segments = Vec::new();
    for part in split_unescaped(key, '.', false) {
        let part = part.as_str();
        let (name, mut indices) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };

        if name.is_empty() {
            return Err(CoreError::value_parse(key, "empty key segment"));
        }
        segments.push(Segment::Key(unescape(name)));

        while !indices.is_empty() {
            let close = indices
                .find(']')
                .ok_or_else(|| CoreError::value_parse(key, "unclosed '[' in key"))?;
            let index = indices[1..close].parse::<usize>().map_err(|_| {
                CoreError::value_parse(key, format!("invalid list index '{}'", &indices[1..close]))
            })?;
            if index > MAX_INDEX {
                return Err(CoreError::value_parse(
                    key,
                    format!("list index {index} exceeds the maximum of {MAX_INDEX}"),
                ));
            }
            segments.push(Segment::Index(index));
            indices = &indices[close + 1..];
            if !indices.is_empty() && !indices.starts_with('[') {
                return Err(CoreError::value_parse(key, "unexpected characters after ']'"));
            }
        }
    }

    Ok(segments)
}

/// Write `value` at `segments` below `root`, creating containers as needed
pub fn assign(root: &mut JsonValue, segments: &[Segment], value: JsonValue, input: &str) -> Result<()> {
    let Some((first, rest)) = segments.split_first() else {
        *root = value;
        return Ok(());
    };

    match first {
        Segment::Key(key) => {
            if !root.is_object() {
                *root = JsonValue::Object(serde_json::Map::new());
            }
            let map = root
                .as_object_mut()
                .ok_or_else(|| CoreError::value_parse(input, "expected a mapping"))?;
            if rest.is_empty() {
                map.insert(key.clone(), value);
                return Ok(());
            }
            let child = map.entry(key.clone()).or_insert(JsonValue::Null);
            assign(child, rest, value, input)
        }
        Segment::Index(index) => {
            if !root.is_array() {
                *root = JsonValue::Array(vec![]);
            }
            let items = root
                .as_array_mut()
                .ok_or_else(|| CoreError::value_parse(input, "expected a list"))?;
            if items.len() <= *index {
                items.resize(index + 1, JsonValue::Null);
            }
            assign(&mut items[*index], rest, value, input)
        }
    }
}

/// Split on `sep` unless escaped with a backslash (or nested in `{}` when
/// `respect_braces` is set). Escapes are kept for the caller to resolve.
fn split_unescaped(input: &str, sep: char, respect_braces: bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '{' if respect_braces => {
                depth += 1;
                current.push(c);
            }
            '}' if respect_braces => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c == sep && depth == 0 => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn find_unescaped(input: &str, target: char) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == target {
            return Some(idx);
        }
    }
    None
}

fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
