//! Operation document reader
//!
//! Reads just enough of a GraphQL document to dispatch it: the operation
//! kind, the single root field (with optional alias) and that field's
//! arguments. Nested selection sets are skipped, not interpreted.
//!
//! Argument values may be `$variable` references or scalar literals. List
//! and object literals are rejected; pass those through variables. Variable
//! definitions are read for their default values only; their types are not
//! checked.

use std::str::CharIndices;

use serde_json::{Map, Number, Value};

use crate::utils::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Literal(Value),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RootField {
    pub kind: OperationKind,
    pub operation_name: Option<String>,
    pub name: String,
    pub alias: Option<String>,
    pub arguments: Vec<(String, ArgValue)>,
    /// Declared defaults, e.g. `"q"` for `($q: String = "x")`.
    pub variable_defaults: Map<String, Value>,
}

impl RootField {
    /// Key under which the field's value appears in `data`.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Read every operation in `document` and pick the one to run.
///
/// With several operations, `operation_name` must name one of them.
pub fn parse(document: &str, operation_name: Option<&str>) -> Result<RootField> {
    let mut reader = Reader::new(document);
    let mut operations = Vec::new();

    loop {
        reader.skip_ignored();
        if reader.at_end() {
            break;
        }
        if let Some(field) = reader.definition()? {
            operations.push(field);
        }
    }

    match (operations.len(), operation_name) {
        (0, _) => Err(malformed("document contains no operation")),
        (_, Some(name)) => operations
            .into_iter()
            .find(|op| op.operation_name.as_deref() == Some(name))
            .ok_or_else(|| malformed(format!("unknown operation named '{name}'"))),
        (1, None) => Ok(operations.remove(0)),
        (_, None) => Err(malformed(
            "operationName is required when the document has several operations",
        )),
    }
}

fn malformed(message: impl Into<String>) -> Error {
    Error::MalformedRequest(message.into())
}

fn hex4(chars: &mut CharIndices<'_>) -> Result<u32> {
    let hex: String = chars.by_ref().take(4).map(|(_, h)| h).collect();
    u32::from_str_radix(&hex, 16)
        .ok()
        .filter(|_| hex.len() == 4)
        .ok_or_else(|| malformed(format!("invalid unicode escape '{hex}'")))
}

/// The character after `\u`. A high surrogate must be followed by an
/// escaped low surrogate.
fn unicode_escape(chars: &mut CharIndices<'_>) -> Result<char> {
    let mut code = hex4(chars)?;
    if (0xD800..0xDC00).contains(&code) {
        let low = match (chars.next(), chars.next()) {
            (Some((_, '\\')), Some((_, 'u'))) => hex4(chars)?,
            _ => return Err(malformed("unpaired surrogate in unicode escape")),
        };
        if !(0xDC00..0xE000).contains(&low) {
            return Err(malformed(format!("invalid low surrogate '{low:04X}'")));
        }
        code = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
    }
    char::from_u32(code).ok_or_else(|| malformed(format!("invalid unicode escape '{code:04X}'")))
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn bytes(&self) -> &'a [u8] {
        self.src.as_bytes()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn skip_ignored(&mut self) {
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' | b'\n' | b'\r' | b',' => self.pos += 1,
                b'#' => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                0xEF if self.bytes()[self.pos..].starts_with(&[0xEF, 0xBB, 0xBF]) => self.pos += 3,
                _ => break,
            }
        }
    }

    fn eat(&mut self, b: u8) -> bool {
        self.skip_ignored();
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(malformed(format!(
                "expected '{}' at offset {}",
                b as char, self.pos
            )))
        }
    }

    fn at_name(&mut self) -> bool {
        self.skip_ignored();
        matches!(self.peek(), Some(b) if b == b'_' || b.is_ascii_alphabetic())
    }

    fn name(&mut self) -> Result<String> {
        if !self.at_name() {
            return Err(malformed(format!("expected a name at offset {}", self.pos)));
        }
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b == b'_' || b.is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        Ok(self.src[start..self.pos].to_string())
    }

    /// One top-level definition. Fragments are skipped and yield `None`.
    fn definition(&mut self) -> Result<Option<RootField>> {
        if self.peek() == Some(b'{') {
            return self
                .root_field(OperationKind::Query, None, Map::new())
                .map(Some);
        }

        let keyword = self.name()?;
        let kind = match keyword.as_str() {
            "query" => OperationKind::Query,
            "mutation" => OperationKind::Mutation,
            "subscription" => OperationKind::Subscription,
            "fragment" => {
                self.skip_until(b'{')?;
                self.skip_balanced(b'{', b'}')?;
                return Ok(None);
            }
            other => return Err(malformed(format!("unexpected '{other}'"))),
        };

        let operation_name = if self.at_name() {
            Some(self.name()?)
        } else {
            None
        };

        self.skip_ignored();
        let variable_defaults = if self.peek() == Some(b'(') {
            self.variable_definitions()?
        } else {
            Map::new()
        };
        self.skip_directives()?;
        self.root_field(kind, operation_name, variable_defaults)
            .map(Some)
    }

    /// `($name: Type = default, ...)`, keeping only the defaults.
    fn variable_definitions(&mut self) -> Result<Map<String, Value>> {
        self.expect(b'(')?;
        let mut defaults = Map::new();
        while !self.eat(b')') {
            self.expect(b'$')?;
            let name = self.name()?;
            self.expect(b':')?;
            self.skip_type()?;
            if self.eat(b'=') {
                match self.value()? {
                    ArgValue::Literal(value) => {
                        defaults.insert(name, value);
                    }
                    ArgValue::Variable(var) => {
                        return Err(malformed(format!(
                            "default of '${name}' cannot reference '${var}'"
                        )));
                    }
                }
            }
            self.skip_directives()?;
        }
        Ok(defaults)
    }

    fn skip_type(&mut self) -> Result<()> {
        if self.eat(b'[') {
            self.skip_type()?;
            self.expect(b']')?;
        } else {
            self.name()?;
        }
        self.eat(b'!');
        Ok(())
    }

    fn root_field(
        &mut self,
        kind: OperationKind,
        operation_name: Option<String>,
        variable_defaults: Map<String, Value>,
    ) -> Result<RootField> {
        self.expect(b'{')?;

        let first = self.name()?;
        let (alias, name) = if self.eat(b':') {
            (Some(first), self.name()?)
        } else {
            (None, first)
        };

        self.skip_ignored();
        let arguments = if self.peek() == Some(b'(') {
            self.arguments()?
        } else {
            Vec::new()
        };

        self.skip_directives()?;
        self.skip_ignored();
        if self.peek() == Some(b'{') {
            self.skip_balanced(b'{', b'}')?;
        }

        if !self.eat(b'}') {
            return Err(malformed("only one root field per operation is supported"));
        }

        Ok(RootField {
            kind,
            operation_name,
            name,
            alias,
            arguments,
            variable_defaults,
        })
    }

    fn arguments(&mut self) -> Result<Vec<(String, ArgValue)>> {
        self.expect(b'(')?;
        let mut arguments = Vec::new();
        while !self.eat(b')') {
            let name = self.name()?;
            self.expect(b':')?;
            let value = self.value()?;
            arguments.push((name, value));
        }
        Ok(arguments)
    }

    fn value(&mut self) -> Result<ArgValue> {
        self.skip_ignored();
        match self.peek() {
            Some(b'$') => {
                self.pos += 1;
                Ok(ArgValue::Variable(self.name()?))
            }
            Some(b'"') => Ok(ArgValue::Literal(Value::String(self.string()?))),
            Some(b) if b == b'-' || b.is_ascii_digit() => {
                Ok(ArgValue::Literal(Value::Number(self.number()?)))
            }
            Some(b'[') | Some(b'{') => Err(malformed(
                "list and object literals are not supported; use variables",
            )),
            Some(_) => {
                let word = self.name()?;
                Ok(ArgValue::Literal(match word.as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    "null" => Value::Null,
                    _ => Value::String(word),
                }))
            }
            None => Err(malformed("unexpected end of document")),
        }
    }

    fn number(&mut self) -> Result<Number> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E'))
        {
            self.pos += 1;
        }
        let raw = &self.src[start..self.pos];
        if raw.contains(['.', 'e', 'E']) {
            raw.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .ok_or_else(|| malformed(format!("invalid float '{raw}'")))
        } else {
            raw.parse::<i64>()
                .map(Number::from)
                .map_err(|_| malformed(format!("invalid int '{raw}'")))
        }
    }

    fn string(&mut self) -> Result<String> {
        if self.src[self.pos..].starts_with("\"\"\"") {
            self.pos += 3;
            let rest = &self.src[self.pos..];
            let end = rest
                .find("\"\"\"")
                .ok_or_else(|| malformed("unterminated block string"))?;
            self.pos += end + 3;
            return Ok(rest[..end].to_string());
        }

        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.src[self.pos..].char_indices();
        while let Some((offset, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += offset + 1;
                    return Ok(out);
                }
                '\\' => {
                    let (_, escaped) = chars
                        .next()
                        .ok_or_else(|| malformed("unterminated string"))?;
                    match escaped {
                        '"' => out.push('"'),
                        '\\' => out.push('\\'),
                        '/' => out.push('/'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        'u' => out.push(unicode_escape(&mut chars)?),
                        other => return Err(malformed(format!("invalid escape '\\{other}'"))),
                    }
                }
                '\n' | '\r' => return Err(malformed("unterminated string")),
                _ => out.push(c),
            }
        }
        Err(malformed("unterminated string"))
    }

    fn skip_directives(&mut self) -> Result<()> {
        while self.eat(b'@') {
            self.name()?;
            self.skip_ignored();
            if self.peek() == Some(b'(') {
                self.skip_balanced(b'(', b')')?;
            }
        }
        Ok(())
    }

    fn skip_until(&mut self, target: u8) -> Result<()> {
        while let Some(b) = self.peek() {
            if b == target {
                return Ok(());
            }
            self.pos += 1;
        }
        Err(malformed("unexpected end of document"))
    }

    /// Skip from `open` to its matching `close`, stepping over strings.
    fn skip_balanced(&mut self, open: u8, close: u8) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                None => return Err(malformed("unbalanced brackets")),
                Some(b'"') => {
                    self.string()?;
                    continue;
                }
                Some(b'#') => {
                    self.skip_ignored();
                    continue;
                }
                Some(b) if b == open => depth += 1,
                Some(b) if b == close => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return Ok(());
                    }
                }
                Some(_) => {}
            }
            self.pos += 1;
        }
    }
}
