//! PromQL lexing
//!
//! Just enough of PromQL to tell which metric names an expression reads and
//! whether it filters on labels. String literals are blanked before anything
//! else is matched, so quoted braces, escaped quotes and operators inside
//! label values never count.

use once_cell::sync::Lazy;
use regex::Regex;

// Double/single quoted with escapes, or raw backtick strings
static RE_STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|`[^`]*`"#).expect("valid regex"));
static RE_SELECTOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^}]*\}|\[[^\]]*\]").expect("valid regex"));
static RE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z0-9_:]+").expect("valid regex"));
static RE_MATCHER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\{[^}]*\b[a-zA-Z_]\w*\s*(?:=~|!~|!=|=)\s*""#).expect("valid regex"));
static RE_REGEX_META: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.*|+?\[(]").expect("valid regex"));

/// Replace every string literal with `""`
pub fn blank_strings(promql: &str) -> String {
    RE_STRING.replace_all(promql, "\"\"").into_owned()
}

/// Identifiers outside selectors, ranges and strings, in order of appearance.
///
/// Function names and keywords are included; callers compare against the
/// discovered metric names.
pub fn identifiers(promql: &str) -> Vec<String> {
    let blanked = blank_strings(promql);
    let bare = RE_SELECTOR.replace_all(&blanked, " ");
    RE_TOKEN
        .find_iter(&bare)
        .map(|m| m.as_str())
        .filter(|token| !token.starts_with(|c: char| c.is_ascii_digit()))
        .map(String::from)
        .collect()
}

/// `{...}` block holding at least one `=`, `!=`, `=~` or `!~` matcher
pub fn has_label_matcher(promql: &str) -> bool {
    RE_MATCHER.is_match(&blank_strings(promql))
}

/// Whether a label value needs `=~` rather than `=`
pub fn is_regex_value(value: &str) -> bool {
    RE_REGEX_META.is_match(value)
}
