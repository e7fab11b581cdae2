// helpers for slicing expression text

/// `'abc'` or `"abc"`; the opening and closing delimiters must match.
pub fn is_quoted(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 2 && matches!(b[0], b'\'' | b'"') && b[b.len() - 1] == b[0]
}

pub fn unquote(s: &str) -> &str {
    &s[1..s.len() - 1]
}

pub fn quote(s: &str) -> String {
    format!("'{s}'")
}

/// Split on `sep` where it is not nested inside brackets, parens or quotes.
pub fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if let Some(q) = in_quote {
            if c == q {
                in_quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => in_quote = Some(c),
            '[' | '(' => depth += 1,
            ']' | ')' => depth -= 1,
            c if c == sep && depth == 0 => {
                out.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

/// `head(inner)` / `head[inner]`: returns the text before the first opener and
/// the text between it and the trailing closer.
pub fn split_suffix(s: &str, open: char, close: char) -> Option<(&str, &str)> {
    if !s.ends_with(close) {
        return None;
    }
    let at = s.find(open)?;
    let inner_end = s.len() - close.len_utf8();
    if at + open.len_utf8() > inner_end {
        return None;
    }
    Some((&s[..at], &s[at + open.len_utf8()..inner_end]))
}

/// Wrap a negative index around `len`; `None` when still out of range.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let at = if index < 0 { index + len } else { index };
    (0..len).contains(&at).then_some(at as usize)
}
