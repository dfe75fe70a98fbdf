//! Opening-tag value type handed to strategies.
//!
//! A [`Token`] is a snapshot of one start tag taken from the streaming
//! parser: its lowercased name and its attributes with character references
//! decoded. Strategies edit the snapshot; [`Token::changes_from`] then lists
//! the attribute edits to apply back onto the live element, so attributes
//! nobody touched keep their source bytes.
//!
//! # Design Decisions
//! - Values are decoded on the way in and re-encoded on the way out, so a
//!   strategy sees `a=1&b=2` where the source wrote `a=1&amp;b=2`
//! - Only `&` and `"` are re-encoded; every value is written double-quoted

use std::borrow::Cow;

/// A single `key="value"` pair on a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Lowercased attribute name.
    pub key: String,
    /// Attribute value with character references decoded.
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One attribute edit to replay on the source element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrChange {
    Remove(String),
    /// Key and already-encoded value.
    Set(String, String),
}

/// An opening tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    name: String,
    attrs: Vec<Attribute>,
}

impl Token {
    pub fn start_tag(name: &str, attrs: Vec<Attribute>) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            attrs,
        }
    }

    /// Build a token from raw `(name, value)` pairs as written in the source.
    pub fn from_source<I, K, V>(name: &str, attrs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let attrs = attrs
            .into_iter()
            .map(|(key, value)| {
                Attribute::new(
                    key.as_ref().to_ascii_lowercase(),
                    decode_char_refs(value.as_ref()).into_owned(),
                )
            })
            .collect();
        Self::start_tag(name, attrs)
    }

    /// Lowercased tag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attrs(&self) -> &[Attribute] {
        &self.attrs
    }

    /// Value of the first attribute with this (lowercase) key.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }

    /// Replace the value of the attribute at `index`.
    pub fn set_attr_value(&mut self, index: usize, value: impl Into<String>) {
        if let Some(attr) = self.attrs.get_mut(index) {
            attr.value = value.into();
        }
    }

    /// Rename the attribute at `index`, keeping its value.
    pub fn rename_attr(&mut self, index: usize, key: impl Into<String>) {
        if let Some(attr) = self.attrs.get_mut(index) {
            attr.key = key.into();
        }
    }

    pub fn push_attr(&mut self, attr: Attribute) {
        self.attrs.push(attr);
    }

    /// Attribute edits that turn `original` into `self`.
    ///
    /// Attributes whose decoded value is unchanged produce no edit.
    pub fn changes_from(&self, original: &Token) -> Vec<AttrChange> {
        let mut changes: Vec<AttrChange> = original
            .attrs
            .iter()
            .filter(|a| self.attr(&a.key).is_none())
            .map(|a| AttrChange::Remove(a.key.clone()))
            .collect();
        for attr in &self.attrs {
            if original.attr(&attr.key) != Some(attr.value.as_str()) {
                changes.push(AttrChange::Set(
                    attr.key.clone(),
                    encode_attr_value(&attr.value).into_owned(),
                ));
            }
        }
        changes
    }
}

/// Decode numeric and the common named character references.
///
/// Unknown or unterminated references are kept as written.
pub fn decode_char_refs(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match rest.find(';').and_then(|semi| Some((semi, lookup(&rest[1..semi])?))) {
            Some((semi, ch)) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn lookup(reference: &str) -> Option<char> {
    if let Some(num) = reference.strip_prefix('#') {
        let code = match num.strip_prefix(&['x', 'X'][..]) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).filter(|c| *c != '\0');
    }
    match reference {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}

/// Escape a value for a double-quoted attribute.
pub fn encode_attr_value(value: &str) -> Cow<'_, str> {
    if !value.contains(&['&', '"'][..]) {
        return Cow::Borrowed(value);
    }
    Cow::Owned(value.replace('&', "&amp;").replace('"', "&quot;"))
}
