// src/env.rs

//! Environment variable substitution in configuration values
//!
//! Every string accepted from configuration passes through [`VarSubst`],
//! which replaces `$NAME` and `${NAME}` references with values from the
//! process environment. Backslashes escape the dollar sigil (`\$NAME` is
//! literal), doubled backslashes collapse. An unbound reference is an
//! error naming the variable, never a silent pass-through.

use regex::Regex;
use thiserror::Error;

/// An error raised on attempt to substitute an unbound variable
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("[UNDEFINED ENVIRONMENT VARIABLE] {0}")]
pub struct UnboundVariableError(pub String);

/// Substitution engine, constructed once per top-level operation and
/// threaded through as a parameter
pub struct VarSubst {
    symbol: Regex,
}

impl VarSubst {
    pub fn new() -> Self {
        // Escapes, then `${NAME}` or `$NAME`. An unclosed `${NAME` matches
        // neither alternative and stays literal.
        let symbol = Regex::new(r"(?s)(\\*)\$(?:\{([A-Za-z_]\w*)\}|([A-Za-z_]\w*))")
            .unwrap_or_else(|e| panic!("invalid substitution pattern: {e}"));
        Self { symbol }
    }

    /// Substitute environment variables into `text`
    pub fn process(&self, text: &str) -> Result<String, UnboundVariableError> {
        self.process_with(text, |name| std::env::var(name).ok())
    }

    /// Substitute with an explicit lookup, used by tests and embedders
    pub fn process_with<F>(&self, text: &str, lookup: F) -> Result<String, UnboundVariableError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(caps) = self.symbol.captures(rest) {
            let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
            let escapes = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let name = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or("");

            out.push_str(&rest[..whole.0]);
            // Half of the backslashes survive; an odd count escapes the
            // sigil and leaves the symbol as literal text.
            out.push_str(&escapes[..escapes.len() / 2]);
            if escapes.len() % 2 == 1 {
                let symbol_start = whole.0 + escapes.len();
                out.push_str(&rest[symbol_start..whole.1]);
            } else {
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => return Err(UnboundVariableError(name.to_string())),
                }
            }
            rest = &rest[whole.1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl Default for VarSubst {
    fn default() -> Self {
        Self::new()
    }
}
