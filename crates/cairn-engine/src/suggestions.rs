//! Fuzzy "did you mean" hints for template errors
//!
//! Names are compared with Levenshtein distance (`strsim`); only candidates
//! within [`MAX_SUGGESTION_DISTANCE`] edits are offered.

use serde_json::Value as JsonValue;

/// Maximum edit distance for a candidate to be suggested
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Filters registered by the engine, plus the MiniJinja builtins people reach for
pub const AVAILABLE_FILTERS: &[&str] = &[
    "toyaml",
    "tojson",
    "tojson_pretty",
    "fromyaml",
    "fromjson",
    "b64encode",
    "b64decode",
    "quote",
    "squote",
    "nindent",
    "indent",
    "required",
    "empty",
    "haskey",
    "keys",
    "merge",
    "sha256",
    "trunc",
    "trimprefix",
    "trimsuffix",
    "snakecase",
    "kebabcase",
    "camelcase",
    "human_size",
    "regex_replace",
    "tostrings",
    "semver_match",
    // builtins
    "default",
    "upper",
    "lower",
    "title",
    "replace",
    "trim",
    "join",
    "first",
    "last",
    "length",
    "reverse",
    "sort",
    "unique",
    "map",
    "select",
    "reject",
    "selectattr",
    "rejectattr",
    "dictsort",
    "items",
    "int",
    "float",
    "string",
    "list",
    "bool",
    "urlencode",
];

/// Global functions registered by the engine
pub const AVAILABLE_FUNCTIONS: &[&str] = &[
    "fail",
    "dict",
    "list",
    "get",
    "set",
    "unset",
    "dig",
    "coalesce",
    "ternary",
    "tostring",
    "toint",
    "printf",
    "regex_match",
    "has",
    "include",
    "tpl",
    "tpl_ctx",
    "lookup",
    "discovered_hostname",
    "discovered_machine_type",
    "discovered_disks",
    "discovered_system_disk",
    "discovered_default_gateway",
    "discovered_default_link_name",
    "discovered_default_link",
    "discovered_default_addresses",
    "discovered_node_addresses",
    "discovered_resolvers",
    "discovered_physical_links",
    "predictable_link_name",
    // builtins
    "range",
    "namespace",
];

/// Top-level names every template can see
pub const CONTEXT_VARIABLES: &[&str] = &["values", "chart", "versions", "machine_type", "template"];

/// Candidates closest to `input`, best first
pub fn closest_matches<'a>(input: &str, candidates: &[&'a str], max_results: usize) -> Vec<&'a str> {
    let mut scored: Vec<(usize, &str)> = candidates
        .iter()
        .map(|c| (strsim::levenshtein(input, c), *c))
        .filter(|(d, _)| *d > 0 && *d <= MAX_SUGGESTION_DISTANCE)
        .collect();
    scored.sort_by_key(|(d, _)| *d);
    scored.truncate(max_results);
    scored.into_iter().map(|(_, c)| c).collect()
}

fn did_you_mean(matches: &[&str]) -> Option<String> {
    if matches.is_empty() {
        return None;
    }
    let quoted: Vec<String> = matches.iter().map(|m| format!("`{m}`")).collect();
    Some(format!("Did you mean {}?", quoted.join(" or ")))
}

/// Hint for an undefined top-level name or `values.` path
pub fn suggest_undefined(expression: &str, values: Option<&JsonValue>) -> Option<String> {
    let root = expression.split(['.', '[']).next().unwrap_or(expression);

    if root == "value" || root == "Values" {
        return Some(format!(
            "Did you mean `{}`? Values are reached through `values`.",
            expression.replacen(root, "values", 1)
        ));
    }

    if root == "values" {
        return values.and_then(|v| suggest_values_path(expression, v));
    }

    if let Some(hint) = did_you_mean(&closest_matches(root, CONTEXT_VARIABLES, 1)) {
        return Some(hint);
    }
    did_you_mean(&closest_matches(root, AVAILABLE_FUNCTIONS, 2))
}

/// Walk `values.a.b.c` until it breaks and offer the keys that do exist there
pub fn suggest_values_path(expression: &str, values: &JsonValue) -> Option<String> {
    let path = expression.strip_prefix("values.")?;
    let mut current = values;
    let mut walked = vec!["values"];

    for part in path.split('.') {
        match current.get(part) {
            Some(next) => {
                walked.push(part);
                current = next;
            }
            None => {
                let available: Vec<&str> = current.as_object()?.keys().map(String::as_str).collect();
                let prefix = walked.join(".");
                let matches = closest_matches(part, &available, 3);
                return Some(if matches.is_empty() {
                    format!(
                        "Key `{part}` not found in `{prefix}`. Available keys: {}",
                        available.join(", ")
                    )
                } else {
                    let quoted: Vec<String> =
                        matches.iter().map(|m| format!("`{prefix}.{m}`")).collect();
                    format!("Key `{part}` not found. Did you mean {}?", quoted.join(" or "))
                });
            }
        }
    }
    None
}

pub fn suggest_unknown_filter(name: &str) -> String {
    did_you_mean(&closest_matches(name, AVAILABLE_FILTERS, 3)).unwrap_or_else(|| {
        format!("Unknown filter `{name}`. Common filters: toyaml, tojson, quote, default, nindent")
    })
}

pub fn suggest_unknown_function(name: &str) -> String {
    did_you_mean(&closest_matches(name, AVAILABLE_FUNCTIONS, 3))
        .unwrap_or_else(|| format!("Unknown function `{name}`. Named blocks are called by their macro name."))
}

/// Hint for looping over something that is not a sequence
pub fn suggest_iteration_fix(type_name: &str) -> String {
    match type_name {
        "map" | "object" => "Mappings iterate with `| items`: `{% for key, value in obj | items %}`".to_string(),
        "string" => "Strings iterate character by character. Split the string first.".to_string(),
        "none" | "undefined" => {
            "The value is empty. Guard it with `{% if ... %}` or use `| default([])`".to_string()
        }
        other => format!("A `{other}` is not iterable. Use a list or `| items` for mappings"),
    }
}

/// First name quoted with backticks or quotes in an error message
pub fn extract_quoted_name(msg: &str) -> Option<String> {
    for quote in ['`', '\'', '"'] {
        if let Some(start) = msg.find(quote) {
            let rest = &msg[start + 1..];
            if let Some(end) = rest.find(quote) {
                return Some(rest[..end].to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_closest_matches() {
        assert_eq!(closest_matches("toyml", AVAILABLE_FILTERS, 3)[0], "toyaml");
        assert_eq!(
            closest_matches("discovered_hostnam", AVAILABLE_FUNCTIONS, 1),
            vec!["discovered_hostname"]
        );
        assert!(closest_matches("zzzzzzzzzz", AVAILABLE_FILTERS, 3).is_empty());
    }

    #[test]
    fn test_suggest_values_typo() {
        let hint = suggest_undefined("value.cluster", None).unwrap();
        assert!(hint.contains("`values.cluster`"));
    }

    #[test]
    fn test_suggest_values_path() {
        let values = json!({"cluster": {"name": "demo", "endpoint": "https://10.0.0.1:6443"}});
        let hint = suggest_values_path("values.cluster.nme", &values).unwrap();
        assert!(hint.contains("`values.cluster.name`"));

        let hint = suggest_values_path("values.cluster.zzzzzzzz", &values).unwrap();
        assert!(hint.contains("Available keys: name, endpoint"));

        assert!(suggest_values_path("values.cluster.name", &values).is_none());
    }

    #[test]
    fn test_suggest_context_variable() {
        let hint = suggest_undefined("versoins", None).unwrap();
        assert!(hint.contains("`versions`"));
    }

    #[test]
    fn test_suggest_unknown_filter() {
        assert!(suggest_unknown_filter("humansize").contains("`human_size`"));
        assert!(suggest_unknown_filter("qqqqqqqqq").contains("Common filters"));
    }

    #[test]
    fn test_extract_quoted_name() {
        assert_eq!(extract_quoted_name("unknown filter `toyml`"), Some("toyml".to_string()));
        assert_eq!(extract_quoted_name("no name here"), None);
    }
}
