// Classification of raw inputs into runtime values.
use std::rc::Rc;

use crate::kernel::error::{Error, Result};
use crate::kernel::memory::{Memory, ScopeId};
use crate::kernel::routine::Routine;
use crate::kernel::text::{is_quoted, quote, split_top_level, unquote};
use crate::kernel::values::{Data, ObjectRef, Payload};

/// Anything a value can be built from: source text, host scalars, or pieces
/// of the executable tree.
#[derive(Clone, Debug)]
pub enum Raw {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Raw>),
    Callable(Rc<dyn Routine>),
    Object(ObjectRef),
    Value(Data),
}

impl From<&str> for Raw {
    fn from(s: &str) -> Self {
        Raw::Text(s.to_string())
    }
}
impl From<String> for Raw {
    fn from(s: String) -> Self {
        Raw::Text(s)
    }
}
impl From<i64> for Raw {
    fn from(n: i64) -> Self {
        Raw::Int(n)
    }
}
impl From<i32> for Raw {
    fn from(n: i32) -> Self {
        Raw::Int(n.into())
    }
}
impl From<f64> for Raw {
    fn from(n: f64) -> Self {
        Raw::Float(n)
    }
}
impl From<bool> for Raw {
    fn from(b: bool) -> Self {
        Raw::Bool(b)
    }
}
impl From<Vec<Raw>> for Raw {
    fn from(items: Vec<Raw>) -> Self {
        Raw::List(items)
    }
}
impl From<Data> for Raw {
    fn from(d: Data) -> Self {
        Raw::Value(d)
    }
}
impl From<ObjectRef> for Raw {
    fn from(o: ObjectRef) -> Self {
        Raw::Object(o)
    }
}
impl From<Rc<dyn Routine>> for Raw {
    fn from(r: Rc<dyn Routine>) -> Self {
        Raw::Callable(r)
    }
}

/// Whether an unbound bare name may become an `Unresolved` placeholder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deferral {
    Allow,
    Deny,
}

enum Outcome {
    Matched(Payload),
    Pass(Raw),
}

type Rule = fn(&mut Memory, ScopeId, Raw) -> Result<Outcome>;

// order matters: the first rule to match wins
const RULES: [(&str, Rule); 7] = [
    ("string", string_literal),
    ("integer", integer),
    ("float", float),
    ("list", list),
    ("callable", callable),
    ("object", object),
    ("boolean", boolean),
];

const ESCAPES: [(&str, char); 9] = [
    ("\\0", '\0'),
    ("\\n", '\n'),
    ("\\r", '\r'),
    ("\\t", '\t'),
    ("\\v", '\x0b'),
    ("\\\\", '\\'),
    ("'", '\''),
    ("\"", '"'),
    ("\\a", '\x07'),
];

pub(crate) fn coerce(memory: &mut Memory, scope: ScopeId, raw: Raw, deferral: Deferral) -> Result<Data> {
    let mut raw = match raw {
        Raw::Value(data) => return Ok(Data::bound(data.payload, scope, data.name)),
        Raw::Text(text) => Raw::Text(substitute(memory, text)),
        other => other,
    };
    for (label, rule) in RULES {
        match rule(memory, scope, raw)? {
            Outcome::Matched(payload) => {
                tracing::trace!(rule = label, "coerced");
                return Ok(Data::bound(payload, scope, ""));
            }
            Outcome::Pass(rest) => raw = rest,
        }
    }
    match raw {
        Raw::Text(text) => adopt(memory, scope, &text, deferral),
        other => Err(Error::UnknownType(format!("{other:?}"))),
    }
}

/// Keyword and escape-token rewrite. A failed `input` read leaves the text as is.
fn substitute(memory: &mut Memory, text: String) -> String {
    let replacement = match text.as_str() {
        "input" => match memory.read_input() {
            Ok(line) => Some(quote(&line)),
            Err(err) => {
                tracing::debug!(%err, "input substitution skipped");
                None
            }
        },
        "space" => Some(quote(" ")),
        "none" => Some(quote("")),
        token => ESCAPES
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, c)| quote(&c.to_string())),
    };
    replacement.unwrap_or(text)
}

fn string_literal(_: &mut Memory, _: ScopeId, raw: Raw) -> Result<Outcome> {
    Ok(match raw {
        Raw::Text(t) if is_quoted(&t) => Outcome::Matched(Payload::Str(unquote(&t).to_string())),
        other => Outcome::Pass(other),
    })
}

fn integer(_: &mut Memory, _: ScopeId, raw: Raw) -> Result<Outcome> {
    Ok(match raw {
        Raw::Int(n) => Outcome::Matched(Payload::Int(n)),
        Raw::Text(t) => match t.trim().parse::<i64>() {
            Ok(n) => Outcome::Matched(Payload::Int(n)),
            Err(_) => Outcome::Pass(Raw::Text(t)),
        },
        other => Outcome::Pass(other),
    })
}

fn float(_: &mut Memory, _: ScopeId, raw: Raw) -> Result<Outcome> {
    Ok(match raw {
        Raw::Float(n) => Outcome::Matched(Payload::Float(n)),
        Raw::Text(t) => {
            let s = t.trim();
            let numeric = s.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | '.'));
            match s.parse::<f64>() {
                Ok(n) if numeric => Outcome::Matched(Payload::Float(n)),
                _ => Outcome::Pass(Raw::Text(t)),
            }
        }
        other => Outcome::Pass(other),
    })
}

fn list(memory: &mut Memory, scope: ScopeId, raw: Raw) -> Result<Outcome> {
    let items = match raw {
        Raw::List(items) => items,
        Raw::Text(t) => {
            let s = t.trim();
            if !(s.starts_with('[') && s.ends_with(']') && s.len() >= 2) {
                return Ok(Outcome::Pass(Raw::Text(t)));
            }
            let inner = s[1..s.len() - 1].trim();
            if inner.is_empty() {
                Vec::new()
            } else {
                split_top_level(inner, ',')
                    .into_iter()
                    .map(|part| Raw::Text(part.trim().to_string()))
                    .collect()
            }
        }
        other => return Ok(Outcome::Pass(other)),
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(match item {
            // already a value: kept with its own scope and name
            Raw::Value(data) => data,
            other => coerce(memory, scope, other, Deferral::Deny)?,
        });
    }
    Ok(Outcome::Matched(Payload::List(out)))
}

fn callable(_: &mut Memory, _: ScopeId, raw: Raw) -> Result<Outcome> {
    Ok(match raw {
        Raw::Callable(r) => Outcome::Matched(Payload::Callable(r)),
        other => Outcome::Pass(other),
    })
}

fn object(_: &mut Memory, _: ScopeId, raw: Raw) -> Result<Outcome> {
    Ok(match raw {
        Raw::Object(obj) => {
            let members = obj.routine.as_ref().map(|r| r.scope()).or(obj.members);
            Outcome::Matched(Payload::Object(ObjectRef { members, ..obj }))
        }
        other => Outcome::Pass(other),
    })
}

fn boolean(memory: &mut Memory, scope: ScopeId, raw: Raw) -> Result<Outcome> {
    Ok(match raw {
        Raw::Bool(b) => Outcome::Matched(Payload::Bool(b)),
        Raw::Text(t) if t.contains(['=', '>', '<']) => {
            Outcome::Matched(Payload::Bool(memory.evaluate_boolean(scope, &t)?))
        }
        other => Outcome::Pass(other),
    })
}

/// Last resort: take over an existing binding by value, or defer the name.
fn adopt(memory: &mut Memory, scope: ScopeId, text: &str, deferral: Deferral) -> Result<Data> {
    let name = text.trim_start();
    if memory.contains(scope, name) {
        let found = memory.resolve(scope, name)?;
        return Ok(Data::bound(found.payload, scope, found.name));
    }
    match deferral {
        Deferral::Allow => Ok(Data::bound(Payload::Unresolved, scope, name)),
        Deferral::Deny => Err(Error::UnknownType(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::config::Config;
    use crate::kernel::input::ScriptedLines;
    use crate::kernel::values::Kind;
    use anyhow::Result;

    fn scripted(lines: &[&str]) -> Memory {
        Memory::with_input(Config::default(), Box::new(ScriptedLines::new(lines.iter().copied())))
    }

    #[test]
    fn classification_order() -> Result<()> {
        let mut mem = Memory::default();
        let g = mem.global();
        let cases = [
            ("'5'", Kind::Str),
            ("5", Kind::Int),
            (" 12 ", Kind::Int),
            ("5.0", Kind::Float),
            ("-.5", Kind::Float),
            ("[1, 'a']", Kind::List),
            ("1 < 2", Kind::Bool),
            ("inf", Kind::Unresolved),
        ];
        for (src, kind) in cases {
            assert_eq!(mem.coerce(g, src, Deferral::Allow)?.kind(), kind, "{src}");
        }
        assert_eq!(mem.coerce(g, 2.5, Deferral::Deny)?.as_float(), Some(2.5));
        assert_eq!(mem.coerce(g, true, Deferral::Deny)?.as_bool(), Some(true));
        assert_eq!(mem.coerce(g, "1 < 2", Deferral::Deny)?.as_bool(), Some(true));
        Ok(())
    }

    #[test]
    fn escape_tokens_become_characters() -> Result<()> {
        let mut mem = Memory::default();
        let g = mem.global();
        let tokens = [
            ("\\0", "\0"),
            ("\\n", "\n"),
            ("\\r", "\r"),
            ("\\t", "\t"),
            ("\\v", "\u{b}"),
            ("\\\\", "\\"),
            ("'", "'"),
            ("\"", "\""),
            ("\\a", "\u{7}"),
        ];
        for (token, expected) in tokens {
            assert_eq!(mem.coerce(g, token, Deferral::Deny)?.as_str(), Some(expected), "{token}");
        }
        // only the exact token is rewritten
        assert_eq!(mem.coerce(g, "'\\n'", Deferral::Deny)?.as_str(), Some("\\n"));
        assert_eq!(mem.coerce(g, "space", Deferral::Deny)?.as_str(), Some(" "));
        assert_eq!(mem.coerce(g, "none", Deferral::Deny)?.as_str(), Some(""));
        Ok(())
    }

    #[test]
    fn input_reads_one_line() -> Result<()> {
        let mut mem = scripted(&["hello", "it's 42"]);
        let g = mem.global();
        assert_eq!(mem.coerce(g, "input", Deferral::Deny)?.as_str(), Some("hello"));
        assert_eq!(mem.coerce(g, "input", Deferral::Deny)?.as_str(), Some("it's 42"));
        // source exhausted: falls through to name classification
        let spent = mem.coerce(g, "input", Deferral::Allow)?;
        assert_eq!(spent.kind(), Kind::Unresolved);
        assert_eq!(spent.name(), "input");
        Ok(())
    }

    #[test]
    fn noninteractive_skips_input() -> Result<()> {
        let cfg = Config { prompts_noninteractive: true, ..Config::default() };
        let mut mem = Memory::with_input(cfg, Box::new(ScriptedLines::new(["never read"])));
        let g = mem.global();
        mem.bind(g, "input", "'bound'")?;
        assert_eq!(mem.coerce(g, "input", Deferral::Deny)?.as_str(), Some("bound"));
        Ok(())
    }

    #[test]
    fn bare_names_adopt_by_value() -> Result<()> {
        let mut mem = Memory::default();
        let g = mem.global();
        mem.bind(g, "x", Raw::List(vec![1.into(), 2.into()]))?;
        let alias = mem.coerce(g, "  x", Deferral::Deny)?;
        assert_eq!(alias.name(), "x");
        assert_eq!(alias.render(), "[1,2]");

        mem.bind(g, "y", "x")?;
        mem.assign(g, "x", "[9]")?;
        assert_eq!(mem.resolve(g, "y")?.render(), "[1,2]");
        assert_eq!(mem.resolve(g, "x")?.render(), "[9]");
        Ok(())
    }

    #[test]
    fn unknown_names_respect_deferral() -> Result<()> {
        let mut mem = Memory::default();
        let g = mem.global();
        let deferred = mem.coerce(g, "later", Deferral::Allow)?;
        assert_eq!(deferred.kind(), Kind::Unresolved);
        assert_eq!(deferred.name(), "later");
        assert!(matches!(mem.coerce(g, "later", Deferral::Deny), Err(Error::UnknownType(n)) if n == "later"));
        // list elements never defer
        assert!(matches!(mem.coerce(g, "[1, later]", Deferral::Allow), Err(Error::UnknownType(_))));
        Ok(())
    }

    #[test]
    fn list_elements_keep_existing_values() -> Result<()> {
        let mut mem = Memory::default();
        let g = mem.global();
        let call = mem.spawn(g)?;
        let outer = mem.coerce(g, "'kept'", Deferral::Deny)?;
        let list = mem.coerce(call, Raw::List(vec![Raw::Value(outer.clone()), "2".into()]), Deferral::Deny)?;
        let items = list.as_list().unwrap_or_default();
        assert_eq!(items[0], outer);
        assert_eq!(items[1].scope(), Some(call));
        Ok(())
    }
}
