// String literal escape decoding.
//
// `unesc()` in the source mutates a Str payload's backing buffer in
// place, on every print. Decoding once at construction time instead
// keeps Str values immutable; `Node::string` (ast.rs) calls
// `decode_escapes` exactly once, when the literal is built.
//
// The backslash-run is located with a `lazy_static`-cached Regex, the
// same pattern `vm.rs` uses for its own lexical patterns (STR_REGEX,
// LABEL_REGEX).

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{EvalError, EvalResult};

lazy_static! {
    static ref ESCAPE_RUN: Regex = Regex::new(r"\\.").unwrap();
}

pub fn decode_escapes(raw: &str) -> EvalResult<String> {
    if !raw.contains('\\') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut last = 0;
    for m in ESCAPE_RUN.find_iter(raw) {
        out.push_str(&raw[last..m.start()]);
        let escaped = m.as_str().chars().nth(1).unwrap();
        out.push(match escaped {
            't' => '\t',
            'n' => '\n',
            'r' => '\r',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            other => return Err(EvalError::unknown_literal(other)),
        });
        last = m.end();
    }
    out.push_str(&raw[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_plain_text_through() {
        assert_eq!(decode_escapes("hello world").unwrap(), "hello world");
    }

    #[test]
    fn decodes_all_six_sequences() {
        assert_eq!(
            decode_escapes(r#"\t\n\r\\\'\""#).unwrap(),
            "\t\n\r\\\'\""
        );
    }

    #[test]
    fn rejects_unknown_escape() {
        let err = decode_escapes(r"\q").unwrap_err();
        assert_eq!(err.message(), "unknown literal \"\\q\"");
    }
}
