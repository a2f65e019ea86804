//! Flag parsing for interactive shell commands.
//!
//! Shell commands take positional arguments plus `--flag` and
//! `--flag=value` options, e.g. `find-all-objects --type-name=dict
//! --max-entries=4`. Double-quoted spans stay together as one token and
//! keep their quotes so data arguments can distinguish text from hex.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};

#[derive(Debug, Default)]
pub struct ShellArgs {
    positionals: Vec<String>,
    flags: HashMap<String, Option<String>>,
}

impl ShellArgs {
    pub fn parse(line: &str) -> Result<Self> {
        let mut args = Self::default();
        for token in tokenize(line)? {
            if let Some(flag) = token.strip_prefix("--") {
                match flag.split_once('=') {
                    Some((name, value)) => {
                        args.flags.insert(name.to_string(), Some(value.to_string()));
                    }
                    None => {
                        args.flags.insert(flag.to_string(), None);
                    }
                }
            } else {
                args.positionals.push(token);
            }
        }
        Ok(args)
    }

    pub fn positional(&self, index: usize) -> Option<&str> {
        self.positionals.get(index).map(String::as_str)
    }

    pub fn require_positional(&self, index: usize, what: &str) -> Result<&str> {
        self.positional(index)
            .ok_or_else(|| anyhow!("missing required argument: {}", what))
    }

    /// A bare boolean flag like `--count`.
    pub fn flag(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.flags.get(name).and_then(|v| v.as_deref())
    }

    pub fn u64_value(&self, name: &str, default: u64) -> Result<u64> {
        match self.value(name) {
            Some(text) => text
                .parse::<u64>()
                .with_context(|| format!("--{} expects an integer, got {:?}", name, text)),
            None => {
                if self.flag(name) {
                    bail!("--{} requires a value", name);
                }
                Ok(default)
            }
        }
    }

    pub fn i64_value(&self, name: &str, default: i64) -> Result<i64> {
        match self.value(name) {
            Some(text) => text
                .parse::<i64>()
                .with_context(|| format!("--{} expects an integer, got {:?}", name, text)),
            None => {
                if self.flag(name) {
                    bail!("--{} requires a value", name);
                }
                Ok(default)
            }
        }
    }

    pub fn hex_value(&self, name: &str) -> Result<Option<u64>> {
        match self.value(name) {
            Some(text) => Ok(Some(parse_hex_u64(text)?)),
            None => Ok(None),
        }
    }
}

fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        bail!("unterminated quote");
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// `DEADBEEF` or `0xDEADBEEF`.
pub fn parse_hex_u64(text: &str) -> Result<u64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).with_context(|| format!("bad hexadecimal value {:?}", text))
}

/// A data argument for raw searches: either a double-quoted text literal
/// (`"spam"`) or hex byte pairs (`DE AD BE EF` with spaces optional).
pub fn parse_data_string(text: &str) -> Result<Vec<u8>> {
    if let Some(inner) = text.strip_prefix('"') {
        let inner = inner.strip_suffix('"').unwrap_or(inner);
        return Ok(inner.as_bytes().to_vec());
    }
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        bail!("hex data must have an even number of digits");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("bad hex byte in {:?}", text))
        })
        .collect()
}
