//! Message templates with named `{holes}`.
//!
//! The template text is kept alongside its tokens: the text is what the
//! fingerprint is computed from, the tokens are what gets rendered.

use crate::value::Properties;
use std::fmt::{self, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateToken {
    Text(String),
    /// A hole. `raw` is the original `{...}` text, rendered when the
    /// property is missing.
    Property { name: String, raw: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    text: String,
    tokens: Vec<TemplateToken>,
}

impl MessageTemplate {
    /// Parse `text` into literal and property tokens.
    ///
    /// `{{` and `}}` are literal braces, a leading `@` or `$` capture
    /// operator is dropped from hole names, as is any `,alignment` or
    /// `:format` suffix. An unterminated or empty hole stays literal.
    pub fn parse(text: impl Into<String>) -> Self {
        let text = text.into();
        let tokens = tokenize(&text);
        Self { text, tokens }
    }

    /// A template with no holes whose single token is the text itself.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        let tokens = vec![TemplateToken::Text(text.clone())];
        Self { text, tokens }
    }

    /// A template whose fingerprint source (`text`) differs from what is
    /// rendered.
    pub fn with_tokens(text: impl Into<String>, tokens: Vec<TemplateToken>) -> Self {
        Self { text: text.into(), tokens }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[TemplateToken] {
        &self.tokens
    }

    pub fn render_to<W: Write + ?Sized>(&self, properties: &Properties, out: &mut W) -> fmt::Result {
        for token in &self.tokens {
            match token {
                TemplateToken::Text(t) => out.write_str(t)?,
                TemplateToken::Property { name, raw } => match properties.get(name) {
                    Some(value) => write!(out, "{}", value)?,
                    None => out.write_str(raw)?,
                },
            }
        }
        Ok(())
    }

    pub fn render(&self, properties: &Properties) -> String {
        let mut out = String::with_capacity(self.text.len());
        // Writing into a String cannot fail.
        let _ = self.render_to(properties, &mut out);
        out
    }
}

fn tokenize(text: &str) -> Vec<TemplateToken> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        if rest.starts_with("{{") || rest.starts_with("}}") {
            literal.push(c);
            rest = &rest[2..];
            continue;
        }
        if c == '{' {
            if let Some(end) = rest.find('}') {
                let raw = &rest[..=end];
                if let Some(name) = hole_name(&raw[1..raw.len() - 1]) {
                    if !literal.is_empty() {
                        tokens.push(TemplateToken::Text(std::mem::take(&mut literal)));
                    }
                    tokens.push(TemplateToken::Property {
                        name: name.to_string(),
                        raw: raw.to_string(),
                    });
                    rest = &rest[end + 1..];
                    continue;
                }
            }
        }
        literal.push(c);
        rest = &rest[c.len_utf8()..];
    }

    if !literal.is_empty() {
        tokens.push(TemplateToken::Text(literal));
    }
    tokens
}

fn hole_name(inner: &str) -> Option<&str> {
    let inner = inner.strip_prefix(['@', '$']).unwrap_or(inner);
    let name = inner.split([',', ':']).next().unwrap_or("");
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.');
    valid.then_some(name)
}
