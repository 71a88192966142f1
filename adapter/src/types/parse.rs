//! ClickHouse type-string parser
//!
//! Turns strings such as `Nullable(Decimal(18, 4))`, `Map(String, Array(UInt64))`
//! or `Tuple(id UInt64, name LowCardinality(String))` into a `ClickhouseType`.
//! Anything outside the supported set is reported as `UnsupportedType`.

use std::fmt;

use crate::error::AdapterError;

/// Parsed ClickHouse data type
#[derive(Debug, Clone, PartialEq)]
pub enum ClickhouseType {
    /// `UInt8` .. `UInt256`, width in bits
    UInt(u16),
    /// `Int8` .. `Int256`, width in bits
    Int(u16),
    Float32,
    Float64,
    Decimal {
        precision: u8,
        scale: u8,
    },
    Bool,
    String,
    FixedString(usize),
    Enum {
        bits: u8,
        variants: Vec<(String, i16)>,
    },
    Date,
    Date32,
    DateTime {
        timezone: Option<String>,
    },
    DateTime64 {
        precision: u8,
        timezone: Option<String>,
    },
    Uuid,
    Ipv4,
    Ipv6,
    Nullable(Box<ClickhouseType>),
    LowCardinality(Box<ClickhouseType>),
    Array(Box<ClickhouseType>),
    Map(Box<ClickhouseType>, Box<ClickhouseType>),
    Tuple(Vec<TupleField>),
    AggregateFunction {
        function: String,
        arguments: Vec<ClickhouseType>,
        simple: bool,
    },
}

/// One element of a `Tuple(...)`; unnamed tuples have no field names
#[derive(Debug, Clone, PartialEq)]
pub struct TupleField {
    pub name: Option<String>,
    pub ty: ClickhouseType,
}

impl ClickhouseType {
    /// Parse a type string
    pub fn parse(input: &str) -> Result<Self, AdapterError> {
        let tokens = tokenize(input).ok_or_else(|| AdapterError::unsupported_type(input))?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            input,
        };
        let ty = parser.parse_type()?;
        if parser.pos != parser.tokens.len() {
            return Err(AdapterError::unsupported_type(input));
        }
        Ok(ty)
    }

    /// Strip `Nullable` and `LowCardinality` wrappers
    pub fn base(&self) -> &ClickhouseType {
        match self {
            ClickhouseType::Nullable(inner) | ClickhouseType::LowCardinality(inner) => inner.base(),
            other => other,
        }
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            ClickhouseType::Nullable(_) => true,
            ClickhouseType::LowCardinality(inner) => inner.is_nullable(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str(String),
    LParen,
    RParen,
    Comma,
    Equals,
}

fn tokenize(input: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Equals);
                i += 1;
            }
            '\'' => {
                let mut value = String::new();
                i += 1;
                loop {
                    let c = *chars.get(i)?;
                    i += 1;
                    match c {
                        '\\' => {
                            value.push(*chars.get(i)?);
                            i += 1;
                        }
                        '\'' => break,
                        c => value.push(c),
                    }
                }
                tokens.push(Token::Str(value));
            }
            '`' => {
                let start = i + 1;
                let end = start + chars[start..].iter().position(|&c| c == '`')?;
                tokens.push(Token::Ident(chars[start..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '-')
                {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => return None,
        }
    }

    Some(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    input: &'a str,
}

impl Parser<'_> {
    fn fail<T>(&self) -> Result<T, AdapterError> {
        Err(AdapterError::unsupported_type(self.input))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), AdapterError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            _ => self.fail(),
        }
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn number<T: std::str::FromStr>(&mut self) -> Result<T, AdapterError> {
        match self.next() {
            Some(Token::Number(n)) => n.parse().or_else(|_| self.fail()),
            _ => self.fail(),
        }
    }

    fn string(&mut self) -> Result<String, AdapterError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s),
            _ => self.fail(),
        }
    }

    fn wrapped(&mut self) -> Result<Box<ClickhouseType>, AdapterError> {
        self.expect(Token::LParen)?;
        let inner = self.parse_type()?;
        self.expect(Token::RParen)?;
        Ok(Box::new(inner))
    }

    fn parse_type(&mut self) -> Result<ClickhouseType, AdapterError> {
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            _ => return self.fail(),
        };

        let ty = match name.as_str() {
            "UInt8" => ClickhouseType::UInt(8),
            "UInt16" => ClickhouseType::UInt(16),
            "UInt32" => ClickhouseType::UInt(32),
            "UInt64" => ClickhouseType::UInt(64),
            "UInt128" => ClickhouseType::UInt(128),
            "UInt256" => ClickhouseType::UInt(256),
            "Int8" => ClickhouseType::Int(8),
            "Int16" => ClickhouseType::Int(16),
            "Int32" => ClickhouseType::Int(32),
            "Int64" => ClickhouseType::Int(64),
            "Int128" => ClickhouseType::Int(128),
            "Int256" => ClickhouseType::Int(256),
            "Float32" => ClickhouseType::Float32,
            "Float64" => ClickhouseType::Float64,
            "Bool" | "Boolean" => ClickhouseType::Bool,
            "String" => ClickhouseType::String,
            "Date" => ClickhouseType::Date,
            "Date32" => ClickhouseType::Date32,
            "UUID" => ClickhouseType::Uuid,
            "IPv4" => ClickhouseType::Ipv4,
            "IPv6" => ClickhouseType::Ipv6,
            "Decimal" => {
                self.expect(Token::LParen)?;
                let precision = self.number()?;
                let scale = if self.eat(&Token::Comma) {
                    self.number()?
                } else {
                    0
                };
                self.expect(Token::RParen)?;
                ClickhouseType::Decimal { precision, scale }
            }
            "Decimal32" | "Decimal64" | "Decimal128" | "Decimal256" => {
                let precision = match name.as_str() {
                    "Decimal32" => 9,
                    "Decimal64" => 18,
                    "Decimal128" => 38,
                    _ => 76,
                };
                self.expect(Token::LParen)?;
                let scale = self.number()?;
                self.expect(Token::RParen)?;
                ClickhouseType::Decimal { precision, scale }
            }
            "FixedString" => {
                self.expect(Token::LParen)?;
                let width = self.number()?;
                self.expect(Token::RParen)?;
                ClickhouseType::FixedString(width)
            }
            "Enum8" | "Enum16" | "Enum" => {
                let variants = self.enum_variants()?;
                let bits = match name.as_str() {
                    "Enum8" => 8,
                    "Enum16" => 16,
                    _ if variants.iter().all(|(_, v)| i8::try_from(*v).is_ok()) => 8,
                    _ => 16,
                };
                ClickhouseType::Enum { bits, variants }
            }
            "DateTime" => {
                let timezone = if self.eat(&Token::LParen) {
                    let tz = self.string()?;
                    self.expect(Token::RParen)?;
                    Some(tz)
                } else {
                    None
                };
                ClickhouseType::DateTime { timezone }
            }
            "DateTime64" => {
                self.expect(Token::LParen)?;
                let precision = self.number()?;
                let timezone = if self.eat(&Token::Comma) {
                    Some(self.string()?)
                } else {
                    None
                };
                self.expect(Token::RParen)?;
                ClickhouseType::DateTime64 {
                    precision,
                    timezone,
                }
            }
            "Nullable" => ClickhouseType::Nullable(self.wrapped()?),
            "LowCardinality" => ClickhouseType::LowCardinality(self.wrapped()?),
            "Array" => ClickhouseType::Array(self.wrapped()?),
            "Map" => {
                self.expect(Token::LParen)?;
                let key = self.parse_type()?;
                self.expect(Token::Comma)?;
                let value = self.parse_type()?;
                self.expect(Token::RParen)?;
                ClickhouseType::Map(Box::new(key), Box::new(value))
            }
            "Tuple" => ClickhouseType::Tuple(self.tuple_fields()?),
            "AggregateFunction" | "SimpleAggregateFunction" => {
                self.expect(Token::LParen)?;
                let function = self.function_spec()?;
                let mut arguments = Vec::new();
                while self.eat(&Token::Comma) {
                    arguments.push(self.parse_type()?);
                }
                self.expect(Token::RParen)?;
                ClickhouseType::AggregateFunction {
                    function,
                    arguments,
                    simple: name == "SimpleAggregateFunction",
                }
            }
            _ => return self.fail(),
        };

        Ok(ty)
    }

    fn enum_variants(&mut self) -> Result<Vec<(String, i16)>, AdapterError> {
        self.expect(Token::LParen)?;
        let mut variants = Vec::new();
        loop {
            let label = self.string()?;
            self.expect(Token::Equals)?;
            let value = self.number()?;
            variants.push((label, value));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(variants)
    }

    fn tuple_fields(&mut self) -> Result<Vec<TupleField>, AdapterError> {
        self.expect(Token::LParen)?;
        let mut fields = Vec::new();
        loop {
            // `name Type` when an identifier is directly followed by another identifier
            let name = match (self.peek(), self.peek_at(1)) {
                (Some(Token::Ident(name)), Some(Token::Ident(_))) => {
                    let name = name.clone();
                    self.pos += 1;
                    Some(name)
                }
                _ => None,
            };
            let ty = self.parse_type()?;
            fields.push(TupleField { name, ty });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(fields)
    }

    /// Aggregate function name with optional parameters, e.g. `quantiles(0.5, 0.9)`
    fn function_spec(&mut self) -> Result<String, AdapterError> {
        let mut spec = match self.next() {
            Some(Token::Ident(name)) => name,
            _ => return self.fail(),
        };
        if self.eat(&Token::LParen) {
            let mut params = Vec::new();
            while let Some(token) = self.next() {
                match token {
                    Token::RParen => break,
                    Token::Comma => {}
                    Token::Number(n) | Token::Ident(n) => params.push(n),
                    Token::Str(s) => params.push(format!("'{}'", s)),
                    _ => return self.fail(),
                }
            }
            spec = format!("{}({})", spec, params.join(", "));
        }
        Ok(spec)
    }
}

impl fmt::Display for ClickhouseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClickhouseType::UInt(bits) => write!(f, "UInt{}", bits),
            ClickhouseType::Int(bits) => write!(f, "Int{}", bits),
            ClickhouseType::Float32 => write!(f, "Float32"),
            ClickhouseType::Float64 => write!(f, "Float64"),
            ClickhouseType::Decimal { precision, scale } => {
                write!(f, "Decimal({}, {})", precision, scale)
            }
            ClickhouseType::Bool => write!(f, "Bool"),
            ClickhouseType::String => write!(f, "String"),
            ClickhouseType::FixedString(n) => write!(f, "FixedString({})", n),
            ClickhouseType::Enum { bits, variants } => {
                let items: Vec<String> = variants
                    .iter()
                    .map(|(label, value)| format!("'{}' = {}", label.replace('\'', "\\'"), value))
                    .collect();
                write!(f, "Enum{}({})", bits, items.join(", "))
            }
            ClickhouseType::Date => write!(f, "Date"),
            ClickhouseType::Date32 => write!(f, "Date32"),
            ClickhouseType::DateTime { timezone: None } => write!(f, "DateTime"),
            ClickhouseType::DateTime {
                timezone: Some(tz),
            } => write!(f, "DateTime('{}')", tz),
            ClickhouseType::DateTime64 {
                precision,
                timezone: None,
            } => write!(f, "DateTime64({})", precision),
            ClickhouseType::DateTime64 {
                precision,
                timezone: Some(tz),
            } => write!(f, "DateTime64({}, '{}')", precision, tz),
            ClickhouseType::Uuid => write!(f, "UUID"),
            ClickhouseType::Ipv4 => write!(f, "IPv4"),
            ClickhouseType::Ipv6 => write!(f, "IPv6"),
            ClickhouseType::Nullable(inner) => write!(f, "Nullable({})", inner),
            ClickhouseType::LowCardinality(inner) => write!(f, "LowCardinality({})", inner),
            ClickhouseType::Array(inner) => write!(f, "Array({})", inner),
            ClickhouseType::Map(key, value) => write!(f, "Map({}, {})", key, value),
            ClickhouseType::Tuple(fields) => {
                let items: Vec<String> = fields
                    .iter()
                    .map(|field| match &field.name {
                        Some(name) => format!("{} {}", name, field.ty),
                        None => field.ty.to_string(),
                    })
                    .collect();
                write!(f, "Tuple({})", items.join(", "))
            }
            ClickhouseType::AggregateFunction {
                function,
                arguments,
                simple,
            } => {
                let prefix = if *simple { "Simple" } else { "" };
                write!(f, "{}AggregateFunction({}", prefix, function)?;
                for argument in arguments {
                    write!(f, ", {}", argument)?;
                }
                write!(f, ")")
            }
        }
    }
}
