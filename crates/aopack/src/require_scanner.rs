//! Lexical discovery of `require` calls in Lua source
//!
//! This is deliberately not a Lua parser. The scanner walks the text once,
//! tracking a single piece of state: whether the cursor sits inside a `--`
//! line comment. Anything that looks like `require("name")` outside a comment
//! becomes a [`RequireCall`].
//!
//! Accepted call shapes, with optional whitespace (including newlines) between
//! the tokens:
//!
//! ```text
//! require("name")    require('name')    require "name"    require 'name'
//! ```
//!
//! Escape sequences inside the name are decoded the way Lua decodes them, so
//! `require("it\\")` names the module `it\`. A name with an invalid escape is
//! not a loadable string and is ignored.
//!
//! String literals are not tracked, so a `--` inside a string on the same line
//! still hides a later `require`. Calls with computed arguments
//! (`require(prefix .. "x")`) are not static imports and are ignored.

use std::borrow::Cow;

const REQUIRE: &[u8] = b"require";

/// A statically discovered `require` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireCall {
    /// Module name with escape sequences decoded
    pub name: String,
    /// 1-based line of the `require` keyword
    pub line: usize,
}

/// Collect every `require` call that is not commented out, in source order
pub fn scan_requires(source: &str) -> Vec<RequireCall> {
    RequireScanner::new(source).collect()
}

/// Iterator over the `require` calls of one source text
#[derive(Debug)]
pub struct RequireScanner<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    in_comment: bool,
}

impl<'a> RequireScanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            in_comment: false,
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.source.as_bytes()
    }

    /// Whether a `require` keyword starts at `pos` as a whole word
    fn at_require_keyword(&self, pos: usize) -> bool {
        let bytes = self.bytes();
        if !bytes[pos..].starts_with(REQUIRE) {
            return false;
        }
        let before_ok = pos == 0 || !is_ident_byte(bytes[pos - 1]);
        let after_ok = bytes
            .get(pos + REQUIRE.len())
            .is_none_or(|&b| !is_ident_byte(b));
        before_ok && after_ok
    }

    /// Try to read the argument of a call whose keyword ends at `pos`
    ///
    /// Returns the decoded module name and the position just past the closing
    /// quote.
    fn parse_call(&self, mut pos: usize) -> Option<(Cow<'a, str>, usize)> {
        let bytes = self.bytes();

        pos = skip_whitespace(bytes, pos);
        if bytes.get(pos) == Some(&b'(') {
            pos = skip_whitespace(bytes, pos + 1);
        }

        let quote = *bytes.get(pos)?;
        if quote != b'"' && quote != b'\'' {
            return None;
        }

        let start = pos + 1;
        let mut end = start;
        loop {
            match *bytes.get(end)? {
                b if b == quote => break,
                b'\n' => return None,
                b'\\' if bytes.get(end + 1) == Some(&b'z') => {
                    end = skip_whitespace(bytes, end + 2);
                }
                b'\\' => end += 2,
                _ => end += 1,
            }
        }

        let name = unescape(&self.source[start..end])?;
        if name.is_empty() {
            return None;
        }
        Some((name, end + 1))
    }
}

impl Iterator for RequireScanner<'_> {
    type Item = RequireCall;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.bytes();

        while self.pos < bytes.len() {
            let b = bytes[self.pos];

            if b == b'\n' {
                self.line += 1;
                self.in_comment = false;
                self.pos += 1;
                continue;
            }

            if self.in_comment {
                self.pos += 1;
                continue;
            }

            if b == b'-' && bytes.get(self.pos + 1) == Some(&b'-') {
                self.in_comment = true;
                self.pos += 2;
                continue;
            }

            if b == b'r' && self.at_require_keyword(self.pos) {
                let keyword_end = self.pos + REQUIRE.len();
                if let Some((name, end)) = self.parse_call(keyword_end) {
                    let call = RequireCall {
                        name: name.into_owned(),
                        line: self.line,
                    };
                    self.line += bytes[self.pos..end].iter().filter(|&&b| b == b'\n').count();
                    self.pos = end;
                    log::trace!("Found require(\"{}\") on line {}", call.name, call.line);
                    return Some(call);
                }
                self.pos = keyword_end;
                continue;
            }

            self.pos += 1;
        }

        None
    }
}

/// Decode the escape sequences of a Lua short string body
///
/// Returns `None` for escapes Lua rejects, or when the decoded bytes are not
/// UTF-8.
fn unescape(raw: &str) -> Option<Cow<'_, str>> {
    if !raw.contains('\\') {
        return Some(Cow::Borrowed(raw));
    }

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while let Some(&b) = bytes.get(i) {
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }

        let escape = *bytes.get(i + 1)?;
        i += 2;
        match escape {
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            b'\\' | b'"' | b'\'' | b'\n' => out.push(escape),
            b'z' => i = skip_whitespace(bytes, i),
            b'x' => {
                let hex = raw.get(i..i + 2)?;
                if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return None;
                }
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 2;
            }
            b'0'..=b'9' => {
                let digits = bytes[i - 1..]
                    .iter()
                    .take(3)
                    .take_while(|b| b.is_ascii_digit())
                    .count();
                let value: u16 = raw[i - 1..i - 1 + digits].parse().ok()?;
                out.push(u8::try_from(value).ok()?);
                i += digits - 1;
            }
            b'u' => {
                let rest = raw.get(i..)?.strip_prefix('{')?;
                let close = rest.find('}')?;
                let code = u32::from_str_radix(&rest[..close], 16).ok()?;
                let mut buf = [0; 4];
                out.extend_from_slice(char::from_u32(code)?.encode_utf8(&mut buf).as_bytes());
                i += close + 2;
            }
            _ => return None,
        }
    }

    String::from_utf8(out).ok().map(Cow::Owned)
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos).is_some_and(u8::is_ascii_whitespace) {
        pos += 1;
    }
    pos
}
