//! Best-effort recovery of a single clean text value from a raw cell.
//!
//! Source cells arrive in several shapes for the same logical value: a plain
//! string, a list of language variants, or a string holding a dict-like
//! `{lang, text}` object with inconsistent quoting. `normalize` never fails;
//! when nothing structured can be recovered it returns the most literal
//! string available.

use regex::Regex;
use serde_json::{Number, Value};
use std::sync::LazyLock;
use tracing::debug;

/// One raw cell as produced by a batch source.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Text(String),
    Number(Number),
    /// Language variants; only the first element is ever used.
    List(Vec<RawValue>),
}

impl RawValue {
    /// False for `Null` and for lists holding nothing but nulls.
    pub fn is_present(&self) -> bool {
        match self {
            RawValue::Null => false,
            RawValue::List(items) => items.iter().any(|v| !matches!(v, RawValue::Null)),
            _ => true,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            RawValue::Null => Value::Null,
            RawValue::Text(s) => Value::String(s.clone()),
            RawValue::Number(n) => Value::Number(n.clone()),
            RawValue::List(items) => Value::Array(items.iter().map(RawValue::to_json).collect()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<i64> for RawValue {
    fn from(n: i64) -> Self {
        RawValue::Number(n.into())
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(RawValue::Null, Into::into)
    }
}

impl<T: Into<RawValue>> From<Vec<T>> for RawValue {
    fn from(items: Vec<T>) -> Self {
        RawValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Reduce a raw cell to one clean string.
pub fn normalize(value: &RawValue) -> String {
    match value {
        RawValue::Null => String::new(),
        RawValue::List(items) => items.first().map(normalize).unwrap_or_default(),
        RawValue::Text(s) => recover_text(s),
        RawValue::Number(n) => recover_text(&n.to_string()),
    }
}

/// Outcome of one strict parse attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// Parsed to an object carrying a `text` key.
    Text(String),
    /// Parsed, but not to an object with a `text` key.
    NoText,
    /// Not valid in this syntax.
    Invalid,
}

/// A named strict parser; a successful parse ends the cascade.
pub struct StrictParser {
    pub name: &'static str,
    pub parse: fn(&str) -> Parsed,
}

/// A named `&str -> Option<String>` extractor for text no parser accepts.
pub struct Strategy {
    pub name: &'static str,
    pub extract: fn(&str) -> Option<String>,
}

pub const STRICT_PARSERS: &[StrictParser] = &[
    StrictParser {
        name: "json",
        parse: from_json,
    },
    StrictParser {
        name: "python_literal",
        parse: from_python_literal,
    },
    StrictParser {
        name: "requoted_json",
        parse: from_requoted_json,
    },
];

/// Tried in order only when every strict parser fails; first hit wins.
pub const STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "text_pattern",
        extract: from_text_patterns,
    },
    Strategy {
        name: "text_split",
        extract: from_text_split,
    },
];

const TEXT_PATTERNS: [&str; 6] = [
    r#"'text':\s*'([^']*)'"#,
    r#"'text':\s*"([^"]*)""#,
    r#""text":\s*"([^"]*)""#,
    r#""text":\s*'([^']*)'"#,
    r#"\{.*?'text':\s*['"](.+?)['"].*?\}"#,
    r#"\{.*?"text":\s*['"](.+?)['"].*?\}"#,
];

static TEXT_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    TEXT_PATTERNS
        .iter()
        .map(|p| Regex::new(p).expect("text pattern compiles"))
        .collect()
});

static QUOTED_AFTER_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"]:\s*['"](.+?)['"]"#).expect("key pattern compiles"));

/// Stringified scalar -> text, unwrapping `{lang, text}` objects when possible.
pub fn recover_text(raw: &str) -> String {
    let unescaped = raw.replace("\\\"", "\"").replace("\\'", "'");
    if !looks_like_text_object(&unescaped) {
        return unescaped;
    }
    for parser in STRICT_PARSERS {
        match (parser.parse)(&unescaped) {
            Parsed::Text(text) => {
                debug!(parser = parser.name, "recovered text field");
                return text;
            }
            Parsed::NoText => return unescaped,
            Parsed::Invalid => {}
        }
    }
    for strategy in STRATEGIES {
        if let Some(text) = (strategy.extract)(&unescaped) {
            debug!(strategy = strategy.name, "recovered text field");
            return text;
        }
    }
    unescaped
}

fn looks_like_text_object(s: &str) -> bool {
    s.trim().starts_with('{') && (s.contains("text") || s.contains("lang"))
}

fn text_field(value: Option<Value>) -> Parsed {
    match value {
        Some(Value::Object(mut map)) => match map.remove("text") {
            Some(Value::String(s)) => Parsed::Text(s),
            Some(Value::Null) => Parsed::Text(String::new()),
            Some(other) => Parsed::Text(other.to_string()),
            None => Parsed::NoText,
        },
        Some(_) => Parsed::NoText,
        None => Parsed::Invalid,
    }
}

pub fn from_json(s: &str) -> Parsed {
    text_field(serde_json::from_str(s).ok())
}

pub fn from_python_literal(s: &str) -> Parsed {
    text_field(literal::parse(s))
}

/// Blanket `'` -> `"` swap before parsing. Mangles apostrophes inside values,
/// which is why the two parsers above run first.
pub fn from_requoted_json(s: &str) -> Parsed {
    text_field(serde_json::from_str(&s.replace('\'', "\"")).ok())
}

pub fn from_text_patterns(s: &str) -> Option<String> {
    TEXT_REGEXES
        .iter()
        .find_map(|re| re.captures(s).map(|caps| caps[1].to_string()))
}

pub fn from_text_split(s: &str) -> Option<String> {
    let (_, rest) = s.split_once("text")?;
    QUOTED_AFTER_KEY
        .captures(rest)
        .map(|caps| caps[1].to_string())
}

/// Parser for Python repr-style literals: `{'k': "v", 'n': None}`.
mod literal {
    use serde_json::{Map, Number, Value};

    pub(super) fn parse(input: &str) -> Option<Value> {
        let mut p = Parser {
            chars: input.chars().collect(),
            pos: 0,
        };
        let value = p.value()?;
        p.skip_ws();
        (p.pos == p.chars.len()).then_some(value)
    }

    struct Parser {
        chars: Vec<char>,
        pos: usize,
    }

    impl Parser {
        fn peek(&self) -> Option<char> {
            self.chars.get(self.pos).copied()
        }

        fn bump(&mut self) -> Option<char> {
            let c = self.peek()?;
            self.pos += 1;
            Some(c)
        }

        fn skip_ws(&mut self) {
            while self.peek().is_some_and(char::is_whitespace) {
                self.pos += 1;
            }
        }

        fn expect(&mut self, expected: char) -> Option<()> {
            self.skip_ws();
            (self.bump()? == expected).then_some(())
        }

        fn value(&mut self) -> Option<Value> {
            self.skip_ws();
            match self.peek()? {
                '{' => self.dict(),
                '[' | '(' => self.sequence(),
                '\'' | '"' => self.string().map(Value::String),
                _ => self.atom(),
            }
        }

        fn dict(&mut self) -> Option<Value> {
            self.expect('{')?;
            let mut map = Map::new();
            loop {
                self.skip_ws();
                if self.peek() == Some('}') {
                    self.pos += 1;
                    return Some(Value::Object(map));
                }
                let key = match self.value()? {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                self.expect(':')?;
                let value = self.value()?;
                map.insert(key, value);
                self.skip_ws();
                match self.bump()? {
                    ',' => continue,
                    '}' => return Some(Value::Object(map)),
                    _ => return None,
                }
            }
        }

        fn sequence(&mut self) -> Option<Value> {
            let close = match self.bump()? {
                '[' => ']',
                '(' => ')',
                _ => return None,
            };
            let mut items = Vec::new();
            loop {
                self.skip_ws();
                if self.peek() == Some(close) {
                    self.pos += 1;
                    return Some(Value::Array(items));
                }
                items.push(self.value()?);
                self.skip_ws();
                match self.bump()? {
                    ',' => continue,
                    c if c == close => return Some(Value::Array(items)),
                    _ => return None,
                }
            }
        }

        fn string(&mut self) -> Option<String> {
            let quote = self.bump()?;
            let mut out = String::new();
            loop {
                match self.bump()? {
                    c if c == quote => return Some(out),
                    '\\' => match self.bump()? {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        c @ ('\\' | '\'' | '"') => out.push(c),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    },
                    c => out.push(c),
                }
            }
        }

        fn atom(&mut self) -> Option<Value> {
            let start = self.pos;
            while self
                .peek()
                .is_some_and(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'))
            {
                self.pos += 1;
            }
            let word: String = self.chars[start..self.pos].iter().collect();
            match word.as_str() {
                "None" | "null" => Some(Value::Null),
                "True" | "true" => Some(Value::Bool(true)),
                "False" | "false" => Some(Value::Bool(false)),
                _ => word.parse::<Number>().ok().map(Value::Number),
            }
        }
    }
}
