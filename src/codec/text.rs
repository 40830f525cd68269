//! Object-notation text encoder and descriptor-driven decoder.
//!
//! The decoder never builds a token stream. Containers are split into their
//! top-level elements by a character scanner that tracks string-literal state
//! and bracket nesting, and each element is decoded recursively against the
//! element descriptor.

use super::value::{TypeDescriptor, Value};
use crate::{Error, Result};
use chrono::NaiveDateTime;
use uuid::Uuid;

const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_TIME_MINUTES_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Deepest container nesting the decoder accepts.
pub const MAX_DEPTH: usize = 128;

/// Encodes a value as wire text.
pub fn encode_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::UInt(u) => out.push_str(&u.to_string()),
        Value::Float(f) if f.is_finite() => out.push_str(&f.to_string()),
        // The text form has no spelling for NaN or infinity.
        Value::Float(_) => out.push_str("null"),
        Value::Char(c) => write_string(out, c.encode_utf8(&mut [0u8; 4])),
        Value::Text(s) => write_string(out, s),
        Value::DateTime(dt) => write_string(out, &format_date_time(dt)),
        Value::Uuid(id) => write_string(out, &id.hyphenated().to_string()),
        Value::Seq(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Map(entries) => {
            out.push('{');
            for (i, (key, item)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// ISO-8601 local date-time; the fraction is only written when non-zero.
pub(crate) fn format_date_time(dt: &NaiveDateTime) -> String {
    dt.format(DATE_TIME_FORMAT).to_string()
}

fn parse_date_time(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, DATE_TIME_MINUTES_FORMAT))
        .map_err(|e| Error::FormatError(format!("invalid date-time '{s}': {e}")))
}

/// Decodes wire text into a value shaped by `target`.
///
/// `null` and empty text only decode for optional targets. A `null` record
/// member is dropped so the field keeps its default.
pub fn decode_value(text: &str, target: &TypeDescriptor) -> Result<Value> {
    decode_nested(text, target, 0)
}

fn decode_nested(text: &str, target: &TypeDescriptor, depth: usize) -> Result<Value> {
    match target {
        TypeDescriptor::Opaque(name) => return Err(Error::UnsupportedType(name.to_string())),
        TypeDescriptor::Map { key, .. } if !matches!(**key, TypeDescriptor::Text) => {
            return Err(Error::ConfigurationError(format!(
                "map keys must be text, found {key}"
            )))
        }
        _ => {}
    }

    let text = text.trim();
    if is_null(text) {
        return match target {
            TypeDescriptor::Optional(_) => Ok(Value::Null),
            _ => Err(Error::FormatError(format!("expected {target}, found null"))),
        };
    }
    if depth > MAX_DEPTH && is_container(target) {
        return Err(Error::FormatError(format!(
            "nesting deeper than {MAX_DEPTH} levels"
        )));
    }
    let child = depth + 1;

    match target {
        TypeDescriptor::Bool => match unquote(text) {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(Error::FormatError(format!("invalid boolean '{other}'"))),
        },
        TypeDescriptor::I8 => parse_signed::<i8>(text, target),
        TypeDescriptor::I16 => parse_signed::<i16>(text, target),
        TypeDescriptor::I32 => parse_signed::<i32>(text, target),
        TypeDescriptor::I64 => parse_signed::<i64>(text, target),
        TypeDescriptor::U8 => parse_unsigned::<u8>(text, target),
        TypeDescriptor::U16 => parse_unsigned::<u16>(text, target),
        TypeDescriptor::U32 => parse_unsigned::<u32>(text, target),
        TypeDescriptor::U64 => parse_unsigned::<u64>(text, target),
        TypeDescriptor::F32 => unquote(text)
            .parse::<f32>()
            .map(|f| Value::Float(f64::from(f)))
            .map_err(|e| Error::FormatError(format!("invalid f32 '{text}': {e}"))),
        TypeDescriptor::F64 => unquote(text)
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| Error::FormatError(format!("invalid f64 '{text}': {e}"))),
        TypeDescriptor::Char => {
            let s = parse_string_literal(text)?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Char(c)),
                _ => Err(Error::FormatError(format!(
                    "invalid character value {text}: expected exactly one character"
                ))),
            }
        }
        TypeDescriptor::Text => {
            if text.starts_with('"') {
                parse_string_literal(text).map(Value::Text)
            } else {
                Ok(Value::Text(text.to_string()))
            }
        }
        TypeDescriptor::DateTime => parse_date_time(&string_or_raw(text)?).map(Value::DateTime),
        TypeDescriptor::Uuid => {
            let s = string_or_raw(text)?;
            Uuid::parse_str(&s)
                .map(Value::Uuid)
                .map_err(|e| Error::FormatError(format!("invalid uuid '{s}': {e}")))
        }
        TypeDescriptor::Optional(inner) => decode_nested(text, inner, depth),
        TypeDescriptor::Seq(inner) | TypeDescriptor::Queue(inner) => {
            let items = split_elements(strip_delimiters(text, '[', ']')?)?
                .into_iter()
                .map(|element| decode_nested(element, inner, child))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Seq(items))
        }
        TypeDescriptor::Set(inner) => {
            let mut unique: Vec<Value> = Vec::new();
            for element in split_elements(strip_delimiters(text, '[', ']')?)? {
                let item = decode_nested(element, inner, child)?;
                if !unique.contains(&item) {
                    unique.push(item);
                }
            }
            Ok(Value::Seq(unique))
        }
        TypeDescriptor::Map { value, .. } => {
            let mut entries = Vec::new();
            for (key, raw) in split_members(strip_delimiters(text, '{', '}')?)? {
                let item = decode_nested(raw, value, child)?;
                put(&mut entries, key, item);
            }
            Ok(Value::Map(entries))
        }
        TypeDescriptor::Record(record) => {
            let mut entries = Vec::new();
            for (key, raw) in split_members(strip_delimiters(text, '{', '}')?)? {
                match record.field(&key) {
                    Some(_) if is_null(raw) => {
                        entries.retain(|(k, _)| *k != key);
                    }
                    Some(field) => {
                        let item = decode_nested(raw, &(field.descriptor)(), child)?;
                        put(&mut entries, key, item);
                    }
                    None => {
                        tracing::trace!(record = record.name, key = %key, "Skipping unknown key");
                    }
                }
            }
            Ok(Value::Map(entries))
        }
        TypeDescriptor::Opaque(name) => Err(Error::UnsupportedType(name.to_string())),
    }
}

fn is_null(text: &str) -> bool {
    text.is_empty() || text == "null"
}

fn is_container(target: &TypeDescriptor) -> bool {
    matches!(
        target,
        TypeDescriptor::Seq(_)
            | TypeDescriptor::Queue(_)
            | TypeDescriptor::Set(_)
            | TypeDescriptor::Map { .. }
            | TypeDescriptor::Record(_)
    )
}

fn put(entries: &mut Vec<(String, Value)>, key: String, value: Value) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => entries.push((key, value)),
    }
}

fn parse_signed<T>(text: &str, target: &TypeDescriptor) -> Result<Value>
where
    T: std::str::FromStr + Into<i64>,
    T::Err: std::fmt::Display,
{
    unquote(text)
        .parse::<T>()
        .map(|n| Value::Int(n.into()))
        .map_err(|e| Error::FormatError(format!("invalid {target} '{text}': {e}")))
}

fn parse_unsigned<T>(text: &str, target: &TypeDescriptor) -> Result<Value>
where
    T: std::str::FromStr + Into<u64>,
    T::Err: std::fmt::Display,
{
    unquote(text)
        .parse::<T>()
        .map(|n| Value::UInt(n.into()))
        .map_err(|e| Error::FormatError(format!("invalid {target} '{text}': {e}")))
}

/// Strips one pair of surrounding quotes, if present.
fn unquote(text: &str) -> &str {
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

fn string_or_raw(text: &str) -> Result<String> {
    if text.starts_with('"') {
        parse_string_literal(text)
    } else {
        Ok(text.to_string())
    }
}

/// Parses a quoted string literal, resolving escapes.
fn parse_string_literal(text: &str) -> Result<String> {
    if text.len() < 2 || !text.starts_with('"') || !text.ends_with('"') {
        return Err(Error::FormatError(format!(
            "expected a quoted string, found {text}"
        )));
    }
    let inner = &text[1..text.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| Error::FormatError(format!("dangling escape in {text}")))?;
                match escaped {
                    '"' => out.push('"'),
                    '\\' => out.push('\\'),
                    '/' => out.push('/'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'u' => out.push(parse_unicode_escape(&mut chars, text)?),
                    other => {
                        return Err(Error::FormatError(format!(
                            "invalid escape '\\{other}' in {text}"
                        )))
                    }
                }
            }
            '"' => {
                return Err(Error::FormatError(format!(
                    "unescaped quote inside string {text}"
                )))
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn read_hex4(chars: &mut std::str::Chars<'_>, text: &str) -> Result<u32> {
    let hex: String = chars.by_ref().take(4).collect();
    if hex.len() != 4 {
        return Err(Error::FormatError(format!("truncated \\u escape in {text}")));
    }
    u32::from_str_radix(&hex, 16)
        .map_err(|_| Error::FormatError(format!("invalid \\u escape '{hex}' in {text}")))
}

fn parse_unicode_escape(chars: &mut std::str::Chars<'_>, text: &str) -> Result<char> {
    let first = read_hex4(chars, text)?;
    let code = if (0xD800..0xDC00).contains(&first) {
        if chars.next() != Some('\\') || chars.next() != Some('u') {
            return Err(Error::FormatError(format!("unpaired surrogate in {text}")));
        }
        let second = read_hex4(chars, text)?;
        if !(0xDC00..0xE000).contains(&second) {
            return Err(Error::FormatError(format!("unpaired surrogate in {text}")));
        }
        0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
    } else {
        first
    };
    char::from_u32(code)
        .ok_or_else(|| Error::FormatError(format!("invalid code point {code:#x} in {text}")))
}

/// Returns the trimmed content between `open` and `close`.
fn strip_delimiters(text: &str, open: char, close: char) -> Result<&str> {
    if text.len() >= 2 && text.starts_with(open) && text.ends_with(close) {
        Ok(text[1..text.len() - 1].trim())
    } else {
        Err(Error::FormatError(format!(
            "expected {open}...{close}, found {text}"
        )))
    }
}

/// Byte offsets of every `separator` outside string literals at nesting depth zero.
fn top_level_positions(content: &str, separator: char) -> Result<Vec<usize>> {
    let mut positions = Vec::new();
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in content.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                if closers.pop() != Some(c) {
                    return Err(Error::FormatError(format!(
                        "unbalanced '{c}' in {content}"
                    )));
                }
            }
            c if c == separator && closers.is_empty() => positions.push(i),
            _ => {}
        }
    }

    if in_string {
        return Err(Error::FormatError(format!(
            "unterminated string in {content}"
        )));
    }
    if !closers.is_empty() {
        return Err(Error::FormatError(format!(
            "unclosed container in {content}"
        )));
    }
    Ok(positions)
}

/// Splits container content into its top-level comma-separated elements.
fn split_elements(content: &str) -> Result<Vec<&str>> {
    if content.is_empty() {
        return Ok(Vec::new());
    }
    let mut elements = Vec::new();
    let mut start = 0;
    for pos in top_level_positions(content, ',')? {
        elements.push(content[start..pos].trim());
        start = pos + 1;
    }
    elements.push(content[start..].trim());

    if elements.iter().any(|e| e.is_empty()) {
        return Err(Error::FormatError(format!("empty element in {content}")));
    }
    Ok(elements)
}

/// Splits object content into `(key, raw value)` pairs.
fn split_members(content: &str) -> Result<Vec<(String, &str)>> {
    split_elements(content)?
        .into_iter()
        .map(|member| {
            let colon = top_level_positions(member, ':')?
                .first()
                .copied()
                .ok_or_else(|| Error::FormatError(format!("missing ':' in member {member}")))?;
            let key = parse_string_literal(member[..colon].trim())?;
            let raw = member[colon + 1..].trim();
            if raw.is_empty() {
                return Err(Error::FormatError(format!("missing value for key '{key}'")));
            }
            Ok((key, raw))
        })
        .collect()
}
