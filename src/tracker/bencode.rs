//! Restricted bencode decoder for HTTP scrape responses.
//!
//! Decodes only what a scrape body can contain: byte-strings, non-negative
//! integers, lists, and dictionaries with byte-string keys. Anything else is
//! a malformed response.

use std::collections::HashMap;

use super::ScrapeError;

/// A decoded bencode value borrowing from the response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    /// Byte string (`<len>:<bytes>`)
    Bytes(&'a [u8]),
    /// Non-negative integer (`i<digits>e`)
    Integer(i64),
    /// List (`l…e`)
    List(Vec<Value<'a>>),
    /// Dictionary with byte-string keys (`d<key><value>…e`)
    Dictionary(HashMap<&'a [u8], Value<'a>>),
}

impl<'a> Value<'a> {
    /// Decodes a complete bencode value, rejecting trailing bytes.
    ///
    /// # Errors
    /// - `ScrapeError::MalformedResponse` - Truncated input, unexpected
    ///   terminator, non-digit length prefix, leading-zero integer, unknown
    ///   type byte, or data after the top-level value
    pub fn decode(input: &'a [u8]) -> Result<Value<'a>, ScrapeError> {
        let mut decoder = Decoder { input, pos: 0 };
        let value = decoder.parse_value()?;
        if decoder.pos != input.len() {
            return Err(malformed(format!(
                "{} trailing bytes after top-level value",
                input.len() - decoder.pos
            )));
        }
        Ok(value)
    }

    /// Returns the dictionary entries, or None for other value kinds.
    pub fn as_dict(&self) -> Option<&HashMap<&'a [u8], Value<'a>>> {
        match self {
            Value::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Returns the integer payload, or None for other value kinds.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the byte-string payload, or None for other value kinds.
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

fn malformed(reason: impl Into<String>) -> ScrapeError {
    ScrapeError::MalformedResponse {
        reason: reason.into(),
    }
}

struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn peek(&self) -> Result<u8, ScrapeError> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or_else(|| malformed("truncated input"))
    }

    fn parse_value(&mut self) -> Result<Value<'a>, ScrapeError> {
        match self.peek()? {
            b'i' => self.parse_integer(),
            b'l' => self.parse_list(),
            b'd' => self.parse_dictionary(),
            b'0'..=b'9' => self.parse_bytes().map(Value::Bytes),
            b'e' => Err(malformed("unexpected terminator")),
            other => Err(malformed(format!("unknown type byte 0x{other:02x}"))),
        }
    }

    fn parse_integer(&mut self) -> Result<Value<'a>, ScrapeError> {
        self.pos += 1; // skip 'i'
        let digits_start = self.pos;
        while self.peek()? != b'e' {
            if !self.peek()?.is_ascii_digit() {
                return Err(malformed("non-digit in integer"));
            }
            self.pos += 1;
        }

        let digits = &self.input[digits_start..self.pos];
        self.pos += 1; // skip 'e'

        if digits.is_empty() {
            return Err(malformed("empty integer"));
        }
        if digits.len() > 1 && digits[0] == b'0' {
            return Err(malformed("integer with leading zero"));
        }

        let text = std::str::from_utf8(digits).expect("digits are ASCII");
        let value = text
            .parse::<i64>()
            .map_err(|_| malformed(format!("integer out of range: {text}")))?;
        Ok(Value::Integer(value))
    }

    fn parse_bytes(&mut self) -> Result<&'a [u8], ScrapeError> {
        let length_start = self.pos;
        while self.peek()? != b':' {
            if !self.peek()?.is_ascii_digit() {
                return Err(malformed("non-digit in string length prefix"));
            }
            self.pos += 1;
        }

        let length_text = std::str::from_utf8(&self.input[length_start..self.pos])
            .expect("digits are ASCII");
        let length = length_text
            .parse::<usize>()
            .map_err(|_| malformed(format!("string length out of range: {length_text}")))?;
        self.pos += 1; // skip ':'

        if self.pos + length > self.input.len() {
            return Err(malformed("truncated string"));
        }

        let bytes = &self.input[self.pos..self.pos + length];
        self.pos += length;
        Ok(bytes)
    }

    fn parse_list(&mut self) -> Result<Value<'a>, ScrapeError> {
        self.pos += 1; // skip 'l'
        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.parse_value()?);
        }
        self.pos += 1; // skip 'e'
        Ok(Value::List(items))
    }

    fn parse_dictionary(&mut self) -> Result<Value<'a>, ScrapeError> {
        self.pos += 1; // skip 'd'
        let mut entries = HashMap::new();
        while self.peek()? != b'e' {
            if !self.peek()?.is_ascii_digit() {
                return Err(malformed("dictionary key must be a byte string"));
            }
            let key = self.parse_bytes()?;
            let value = self.parse_value()?;
            entries.insert(key, value);
        }
        self.pos += 1; // skip 'e'
        Ok(Value::Dictionary(entries))
    }
}
