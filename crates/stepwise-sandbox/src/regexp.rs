//! Regular expressions: `/pattern/flags` literals compiled onto the `regex`
//! crate, the `RegExp` methods and the regex-aware `String` methods.
//!
//! Offsets seen by scripts are character offsets; the crate works in bytes,
//! so every match is converted on the way out. Look-around and
//! backreferences have no equivalent and fail at compile time.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use regex::{Captures, Regex, RegexBuilder};

use crate::interpreter::{throw, Completion, Interpreter, MAX_STRING_LENGTH};
use crate::value::*;

const FLAGS: &str = "dgimsuy";

#[derive(Debug)]
pub struct JsRegex {
    source: String,
    flags: String,
    regex: Regex,
}

/// One match. `index` and `end` are character offsets into the subject.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RegexMatch {
    pub(crate) index: usize,
    pub(crate) end: usize,
    pub(crate) text: String,
    /// Groups `1..`; `None` where a group did not take part in the match.
    pub(crate) groups: Vec<Option<String>>,
    pub(crate) named: Vec<(String, Option<String>)>,
}

/// The non-index properties of a match array.
#[derive(Debug)]
pub(crate) struct MatchExtras {
    index: usize,
    input: Arc<str>,
    groups: Value,
}

pub(crate) type MatchExtrasTable = Mutex<HashMap<usize, (ArrayRef, MatchExtras)>>;

impl JsRegex {
    pub fn new(source: &str, flags: &str) -> Result<Self, String> {
        for (i, flag) in flags.char_indices() {
            if !FLAGS.contains(flag) || flags[..i].contains(flag) {
                return Err(format!("Invalid flags supplied to RegExp constructor '{flags}'"));
            }
        }
        let regex = RegexBuilder::new(&translate(source))
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .build()
            .map_err(|err| format!("Invalid regular expression: /{source}/{flags}: {}", describe(&err)))?;
        Ok(Self {
            source: source.to_string(),
            flags: flags.to_string(),
            regex,
        })
    }

    pub fn is_global(&self) -> bool {
        self.flags.contains('g')
    }

    fn is_sticky(&self) -> bool {
        self.flags.contains('y')
    }

    /// Whether matching reads and advances `lastIndex`.
    fn tracks_last_index(&self) -> bool {
        self.is_global() || self.is_sticky()
    }

    pub(crate) fn property(&self, key: &str, last_index: usize) -> Option<Value> {
        Some(match key {
            "source" => Value::String(self.display_source().to_string()),
            "flags" => Value::String(self.flags.clone()),
            "global" => Value::Bool(self.is_global()),
            "ignoreCase" => Value::Bool(self.flags.contains('i')),
            "multiline" => Value::Bool(self.flags.contains('m')),
            "sticky" => Value::Bool(self.is_sticky()),
            "lastIndex" => Value::Number(last_index as f64),
            _ => return None,
        })
    }

    fn display_source(&self) -> &str {
        if self.source.is_empty() {
            "(?:)"
        } else {
            &self.source
        }
    }

    /// First match starting at or after character offset `from`. Sticky
    /// expressions only match exactly at `from`.
    pub(crate) fn match_from(&self, text: &str, from: usize) -> Option<RegexMatch> {
        let start = byte_offset(text, from)?;
        let captures = self.regex.captures_at(text, start)?;
        if self.is_sticky() && captures.get(0).map(|m| m.start()) != Some(start) {
            return None;
        }
        Some(self.to_match(text, &captures))
    }

    /// Every non-overlapping match, left to right.
    pub(crate) fn match_all(&self, text: &str) -> Vec<RegexMatch> {
        self.regex
            .captures_iter(text)
            .map(|captures| self.to_match(text, &captures))
            .collect()
    }

    fn to_match(&self, text: &str, captures: &Captures<'_>) -> RegexMatch {
        let (start, end, matched) = captures
            .get(0)
            .map_or((0, 0, ""), |m| (m.start(), m.end(), m.as_str()));
        let groups = (1..captures.len())
            .map(|i| captures.get(i).map(|m| m.as_str().to_string()))
            .collect();
        let named = self
            .regex
            .capture_names()
            .flatten()
            .map(|name| (name.to_string(), captures.name(name).map(|m| m.as_str().to_string())))
            .collect();
        RegexMatch {
            index: char_count(text, start),
            end: char_count(text, end),
            text: matched.to_string(),
            groups,
            named,
        }
    }
}

impl fmt::Display for JsRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.display_source(), self.flags)
    }
}

/// Last line of a `regex` error, which names the unsupported construct.
fn describe(err: &regex::Error) -> String {
    let text = err.to_string();
    let last = text.lines().rev().find(|line| !line.trim().is_empty()).unwrap_or_default();
    last.trim().trim_start_matches("error: ").to_string()
}

/// Rewrite script regex syntax into the `regex` crate's dialect.
fn translate(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len() + 8);
    let mut in_class = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '\\' => {
                let Some(&next) = chars.get(i) else {
                    out.push_str("\\\\");
                    break;
                };
                i += 1;
                match next {
                    // ASCII classes, as scripts expect
                    'd' => out.push_str(if in_class { "0-9" } else { "[0-9]" }),
                    'D' => out.push_str(if in_class { "\\D" } else { "[^0-9]" }),
                    'w' => out.push_str(if in_class { "A-Za-z0-9_" } else { "[A-Za-z0-9_]" }),
                    'W' => out.push_str(if in_class { "\\W" } else { "[^A-Za-z0-9_]" }),
                    '0' => out.push_str("\\x00"),
                    '/' => out.push('/'),
                    'u' if chars.get(i) == Some(&'{') => {
                        let hex: String = chars[i + 1..].iter().take_while(|c| **c != '}').collect();
                        i += hex.chars().count() + 2;
                        out.push_str(&format!("\\x{{{hex}}}"));
                    }
                    'u' => {
                        let hex: String = chars[i..].iter().take(4).collect();
                        i += hex.chars().count();
                        out.push_str(&format!("\\x{{{hex}}}"));
                    }
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
            }
            '[' if !in_class => {
                let negated = chars.get(i) == Some(&'^');
                if negated {
                    i += 1;
                }
                if chars.get(i) == Some(&']') {
                    // `[]` never matches, `[^]` matches anything
                    i += 1;
                    out.push_str(if negated { "[\\s\\S]" } else { "[^\\s\\S]" });
                } else {
                    in_class = true;
                    out.push_str(if negated { "[^" } else { "[" });
                }
            }
            ']' if in_class => {
                in_class = false;
                out.push(']');
            }
            '[' | '&' | '~' if in_class => {
                out.push('\\');
                out.push(c);
            }
            '(' if !in_class && chars.get(i) == Some(&'?') && chars.get(i + 1) == Some(&'<') => {
                if matches!(chars.get(i + 2), Some('=') | Some('!')) {
                    out.push('(');
                } else {
                    out.push_str("(?P<");
                    i += 2;
                }
            }
            '{' if !in_class => match repetition_len(&chars[i..]) {
                Some(len) => {
                    out.push('{');
                    out.extend(&chars[i..i + len]);
                    i += len;
                }
                None => out.push_str("\\{"),
            },
            '}' if !in_class => out.push_str("\\}"),
            other => out.push(other),
        }
    }
    out
}

/// Length of `n}`, `n,}` or `n,m}` at the start of `rest`, closing brace
/// included.
fn repetition_len(rest: &[char]) -> Option<usize> {
    let digits = |from: usize| rest[from..].iter().take_while(|c| c.is_ascii_digit()).count();
    let first = digits(0);
    if first == 0 {
        return None;
    }
    let mut at = first;
    if rest.get(at) == Some(&',') {
        at += 1;
        at += digits(at);
    }
    (rest.get(at) == Some(&'}')).then_some(at + 1)
}

fn byte_offset(text: &str, chars: usize) -> Option<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .nth(chars)
}

fn char_count(text: &str, byte: usize) -> usize {
    text.get(..byte).map_or(0, |prefix| prefix.chars().count())
}

/// The `RegExp` behind `value`, if it is one.
pub(crate) fn regex_of(value: &Value) -> Option<Arc<JsRegex>> {
    let Value::Object(obj) = value else {
        return None;
    };
    match &lock(obj).internal {
        Some(Internal::RegExp { regex, .. }) => Some(regex.clone()),
        _ => None,
    }
}

fn last_index(obj: &ObjectRef) -> usize {
    match lock(obj).internal {
        Some(Internal::RegExp { last_index, .. }) => last_index,
        _ => 0,
    }
}

fn set_last_index(obj: &ObjectRef, index: usize) {
    if let Some(Internal::RegExp { last_index, .. }) = &mut lock(obj).internal {
        *last_index = index;
    }
}

fn optional_string(value: &Option<String>) -> Value {
    value.clone().map_or(Value::Undefined, Value::String)
}

/// Substitute `$&`, `` $` ``, `$'`, `$n`, `$<name>` and `$$` in a
/// replacement template.
pub(crate) fn expand_replacement(template: &str, found: &RegexMatch, subject: &[char]) -> String {
    let t: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    while i < t.len() {
        if t[i] != '$' || i + 1 == t.len() {
            out.push(t[i]);
            i += 1;
            continue;
        }
        match t[i + 1] {
            '$' => {
                out.push('$');
                i += 2;
            }
            '&' => {
                out.push_str(&found.text);
                i += 2;
            }
            '`' => {
                out.extend(&subject[..found.index.min(subject.len())]);
                i += 2;
            }
            '\'' => {
                out.extend(&subject[found.end.min(subject.len())..]);
                i += 2;
            }
            '<' if !found.named.is_empty() => match t[i + 2..].iter().position(|c| *c == '>') {
                Some(close) => {
                    let name: String = t[i + 2..i + 2 + close].iter().collect();
                    if let Some((_, Some(value))) = found.named.iter().find(|(key, _)| *key == name) {
                        out.push_str(value);
                    }
                    i += close + 3;
                }
                None => {
                    out.push('$');
                    i += 1;
                }
            },
            d if d.is_ascii_digit() => {
                let one = d as usize - '0' as usize;
                let two = t
                    .get(i + 2)
                    .filter(|c| c.is_ascii_digit())
                    .map(|c| one * 10 + (*c as usize - '0' as usize))
                    .filter(|n| (1..=found.groups.len()).contains(n));
                match two {
                    Some(n) => {
                        out.push_str(found.groups[n - 1].as_deref().unwrap_or_default());
                        i += 3;
                    }
                    None if (1..=found.groups.len()).contains(&one) => {
                        out.push_str(found.groups[one - 1].as_deref().unwrap_or_default());
                        i += 2;
                    }
                    None => {
                        out.push('$');
                        i += 1;
                    }
                }
            }
            _ => {
                out.push('$');
                i += 1;
            }
        }
    }
    out
}

impl Interpreter {
    /// A fresh `RegExp` object. Each distinct pattern compiles once per
    /// execution.
    pub(crate) fn regexp_value(&self, pattern: &str, flags: &str) -> Completion<Value> {
        let key = format!("/{pattern}/{flags}");
        let cached = lock(&self.regexes).get(&key).cloned();
        let regex = match cached {
            Some(regex) => regex,
            None => {
                let regex = match JsRegex::new(pattern, flags) {
                    Ok(regex) => Arc::new(regex),
                    Err(message) => return throw("SyntaxError", message),
                };
                lock(&self.regexes).insert(key, regex.clone());
                regex
            }
        };
        Ok(Value::internal(Internal::RegExp { regex, last_index: 0 }))
    }

    /// `new RegExp(pattern, flags)`; `pattern` may itself be a `RegExp`.
    pub(crate) fn construct_regexp(&self, args: &[Value]) -> Completion<Value> {
        let pattern = args.first().cloned().unwrap_or_default();
        let flags = match args.get(1) {
            None | Some(Value::Undefined) => None,
            Some(flags) => Some(to_string(flags)),
        };
        match (regex_of(&pattern), &pattern) {
            (Some(regex), _) => {
                let flags = flags.unwrap_or_else(|| regex.flags.clone());
                self.regexp_value(&regex.source, &flags)
            }
            (None, Value::Undefined) => self.regexp_value("", &flags.unwrap_or_default()),
            (None, other) => self.regexp_value(&to_string(other), &flags.unwrap_or_default()),
        }
    }

    /// One `exec` step: honours and advances `lastIndex` for `g` and `y`.
    fn regexp_exec(&self, obj: &ObjectRef, regex: &JsRegex, text: &str) -> Option<RegexMatch> {
        if !regex.tracks_last_index() {
            return regex.match_from(text, 0);
        }
        let found = regex.match_from(text, last_index(obj));
        set_last_index(obj, found.as_ref().map_or(0, |m| m.end));
        found
    }

    pub(crate) fn regexp_method(&self, obj: &ObjectRef, this: &Value, name: &str, args: &[Value]) -> Completion<Value> {
        let Some(regex) = regex_of(this) else {
            return throw("TypeError", format!("{name} called on an incompatible receiver"));
        };
        let text = to_string(&args.first().cloned().unwrap_or_default());
        match name {
            "test" => Ok(Value::Bool(self.regexp_exec(obj, &regex, &text).is_some())),
            "exec" => Ok(match self.regexp_exec(obj, &regex, &text) {
                Some(found) => self.match_array(&found, &Arc::from(text.as_str())),
                None => Value::Null,
            }),
            "toString" => Ok(Value::String(regex.to_string())),
            other => throw("TypeError", format!("{other} is not a function")),
        }
    }

    /// `[match, ...groups]` carrying `index`, `input` and `groups`.
    fn match_array(&self, found: &RegexMatch, input: &Arc<str>) -> Value {
        let mut items = vec![Value::String(found.text.clone())];
        items.extend(found.groups.iter().map(optional_string));
        let array = Arc::new(Mutex::new(items));
        let groups = if found.named.is_empty() {
            Value::Undefined
        } else {
            Value::object(
                found
                    .named
                    .iter()
                    .map(|(name, value)| (name.clone(), optional_string(value)))
                    .collect(),
            )
        };
        let extras = MatchExtras {
            index: found.index,
            input: input.clone(),
            groups,
        };
        lock(&self.array_extras).insert(Arc::as_ptr(&array) as usize, (array.clone(), extras));
        Value::Array(array)
    }

    pub(crate) fn array_extra(&self, array: &ArrayRef, key: &str) -> Option<Value> {
        if !matches!(key, "index" | "input" | "groups") {
            return None;
        }
        let table = lock(&self.array_extras);
        let (_, extras) = table.get(&(Arc::as_ptr(array) as usize))?;
        Some(match key {
            "index" => Value::Number(extras.index as f64),
            "input" => Value::String(extras.input.to_string()),
            _ => extras.groups.clone(),
        })
    }

    /// `split`, `replace`, `replaceAll`, `match`, `matchAll` and `search`
    /// with a regular expression. `None` leaves the call to the plain
    /// string implementation.
    pub(crate) async fn string_regex_method(&self, s: &str, name: &str, args: &[Value]) -> Completion<Option<Value>> {
        let first = args.first().cloned().unwrap_or_default();
        let pattern = match (regex_of(&first), name) {
            (Some(_), _) => first,
            (None, "match" | "matchAll" | "search") => {
                let source = match &first {
                    Value::Undefined => String::new(),
                    other => to_string(other),
                };
                self.regexp_value(&source, if name == "matchAll" { "g" } else { "" })?
            }
            (None, _) => return Ok(None),
        };
        let (Value::Object(obj), Some(regex)) = (&pattern, regex_of(&pattern)) else {
            return Ok(None);
        };

        let value = match name {
            "match" if !regex.is_global() => match self.regexp_exec(obj, &regex, s) {
                Some(found) => self.match_array(&found, &Arc::from(s)),
                None => Value::Null,
            },
            "match" => {
                set_last_index(obj, 0);
                let found = regex.match_all(s);
                if found.is_empty() {
                    Value::Null
                } else {
                    Value::array(found.into_iter().map(|m| Value::String(m.text)).collect())
                }
            }
            "matchAll" => {
                if !regex.is_global() {
                    return throw(
                        "TypeError",
                        "String.prototype.matchAll called with a non-global RegExp argument",
                    );
                }
                let input: Arc<str> = Arc::from(s);
                Value::array(
                    regex
                        .match_all(s)
                        .iter()
                        .map(|found| self.match_array(found, &input))
                        .collect(),
                )
            }
            "search" => Value::Number(regex.match_from(s, 0).map_or(-1.0, |m| m.index as f64)),
            "split" => {
                let limit = match args.get(1) {
                    None | Some(Value::Undefined) => usize::MAX,
                    Some(other) => to_number(other).max(0.0) as usize,
                };
                Value::array(split(&regex, s, limit))
            }
            "replace" | "replaceAll" => {
                if name == "replaceAll" && !regex.is_global() {
                    return throw("TypeError", "replaceAll must be called with a global RegExp");
                }
                let matches = if regex.is_global() {
                    set_last_index(obj, 0);
                    regex.match_all(s)
                } else {
                    self.regexp_exec(obj, &regex, s).into_iter().collect()
                };
                let replacement = args.get(1).cloned().unwrap_or_default();
                Value::String(self.replace_matches(s, &matches, &replacement).await?)
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    /// Splice replacements for `matches` into `s`. `replacement` is a
    /// template string or a function receiving the match details.
    pub(crate) async fn replace_matches(
        &self,
        s: &str,
        matches: &[RegexMatch],
        replacement: &Value,
    ) -> Completion<String> {
        let chars: Vec<char> = s.chars().collect();
        let template = match replacement {
            Value::Function(_) => None,
            other => Some(to_string(other)),
        };
        let mut out = String::with_capacity(s.len());
        let mut last = 0;
        for found in matches {
            out.extend(&chars[last.min(found.index)..found.index]);
            let substitute = match &template {
                Some(template) => expand_replacement(template, found, &chars),
                None => {
                    let mut call_args = vec![Value::String(found.text.clone())];
                    call_args.extend(found.groups.iter().map(optional_string));
                    call_args.push(Value::Number(found.index as f64));
                    call_args.push(Value::string(s));
                    if !found.named.is_empty() {
                        call_args.push(Value::object(
                            found
                                .named
                                .iter()
                                .map(|(name, value)| (name.clone(), optional_string(value)))
                                .collect(),
                        ));
                    }
                    to_string(&self.call(replacement, Value::Undefined, call_args).await?)
                }
            };
            out.push_str(&substitute);
            if out.len() > MAX_STRING_LENGTH {
                return throw("RangeError", "Invalid string length");
            }
            last = found.end;
        }
        out.extend(&chars[last.min(chars.len())..]);
        Ok(out)
    }
}

/// `String.prototype.split` with a regular expression separator. Captured
/// groups are spliced into the result.
fn split(regex: &JsRegex, s: &str, limit: usize) -> Vec<Value> {
    let chars: Vec<char> = s.chars().collect();
    if chars.is_empty() {
        return if regex.match_from(s, 0).is_some() {
            Vec::new()
        } else {
            vec![Value::string("")]
        };
    }
    let slice = |from: usize, to: usize| Value::String(chars[from..to].iter().collect());
    let mut parts = Vec::new();
    let mut last = 0;
    for found in regex.match_all(s) {
        if found.index >= chars.len() {
            break;
        }
        // an empty match where the previous piece ended splits nothing
        if found.end == last {
            continue;
        }
        parts.push(slice(last, found.index));
        parts.extend(found.groups.iter().map(optional_string));
        last = found.end;
        if parts.len() >= limit {
            parts.truncate(limit);
            return parts;
        }
    }
    parts.push(slice(last, chars.len()));
    parts.truncate(limit);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(values: Vec<Value>) -> Vec<String> {
        values.iter().map(to_string).collect()
    }

    #[test]
    fn translates_script_classes_to_ascii() {
        assert_eq!(translate(r"\d+\w"), "[0-9]+[A-Za-z0-9_]");
        assert_eq!(translate(r"[\d.]"), "[0-9.]");
        assert_eq!(translate(r"a\/b"), "a/b");
        assert_eq!(translate(r"(?<year>\d{4})"), "(?P<year>[0-9]{4})");
        assert_eq!(translate("{name}"), "\\{name\\}");
        assert_eq!(translate("[^]"), "[\\s\\S]");
        assert_eq!(translate(r"é\u{1F600}"), "\\x{00e9}\\x{1F600}");
    }

    #[test]
    fn matches_report_character_offsets() {
        let regex = JsRegex::new("b+", "").unwrap();
        let found = regex.match_from("ééabb", 0).unwrap();
        assert_eq!((found.index, found.end), (2, 4));
        assert_eq!(found.text, "bb");
        assert!(regex.match_from("ééabb", 5).is_none());
    }

    #[test]
    fn sticky_matches_only_at_the_offset() {
        let regex = JsRegex::new("a", "y").unwrap();
        assert!(regex.match_from("ba", 0).is_none());
        assert!(regex.match_from("ba", 1).is_some());
    }

    #[test]
    fn named_groups_are_reported() {
        let regex = JsRegex::new(r"(?<key>\w+)=(\d+)?", "").unwrap();
        let found = regex.match_from("a=", 0).unwrap();
        assert_eq!(found.groups, vec![Some("a".to_string()), None]);
        assert_eq!(found.named, vec![("key".to_string(), Some("a".to_string()))]);
    }

    #[test]
    fn unsupported_constructs_are_rejected() {
        let err = JsRegex::new("(?=a)b", "").unwrap_err();
        assert!(err.starts_with("Invalid regular expression: /(?=a)b/: "), "{err}");
        assert!(JsRegex::new(r"(a)\1", "").is_err());
        assert!(JsRegex::new("a", "gg").is_err());
        assert!(JsRegex::new("a", "x").is_err());
    }

    #[test]
    fn displays_like_a_literal() {
        assert_eq!(JsRegex::new("a/b", "gi").unwrap().to_string(), "/a/b/gi");
        assert_eq!(JsRegex::new("", "").unwrap().to_string(), "/(?:)/");
    }

    #[test]
    fn expands_replacement_templates() {
        let subject: Vec<char> = "x=1;".chars().collect();
        let found = RegexMatch {
            index: 0,
            end: 3,
            text: "x=1".to_string(),
            groups: vec![Some("x".to_string()), Some("1".to_string())],
            named: vec![("k".to_string(), Some("x".to_string()))],
        };
        assert_eq!(expand_replacement("$2:$1 [$&] $$ $<k> $'", &found, &subject), "1:x [x=1] $ x ;");
        assert_eq!(expand_replacement("$3$0", &found, &subject), "$3$0");
    }

    #[test]
    fn splits_on_patterns() {
        let comma = JsRegex::new(r"\s*,\s*", "").unwrap();
        assert_eq!(texts(split(&comma, "a , b,c", usize::MAX)), ["a", "b", "c"]);
        let empty = JsRegex::new("", "").unwrap();
        assert_eq!(texts(split(&empty, "abc", usize::MAX)), ["a", "b", "c"]);
        let grouped = JsRegex::new("(-)", "").unwrap();
        assert_eq!(texts(split(&grouped, "a-b", usize::MAX)), ["a", "-", "b"]);
        assert_eq!(texts(split(&comma, "a,b,c", 2)), ["a", "b"]);
    }
}
