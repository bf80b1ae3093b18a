//! Template rendering
//!
//! Two phases:
//! 1. Every per-field variable expression is resolved. JSON objects and
//!    arrays are walked and only their string leaves are resolved.
//! 2. The template is scanned once, left to right:
//!    - `${origin.var}` reads the run context (missing keys render empty)
//!    - `@{name}` takes a resolved per-field variable
//!    - any other `@{...}` goes through the variable resolver
//!
//! Substituted text is never scanned again.

use std::collections::HashMap;
use serde_json::Value;
use thiserror::Error;

use crate::context::RunContext;
use crate::models::VarExprMap;
use crate::variables::VariableResolver;

/// Marker written in place of a field that failed to render
pub const RENDER_ERROR_MARKER: &str = "[[RENDER_ERROR";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Unterminated '{marker}' at offset {offset}")]
    Unterminated { marker: &'static str, offset: usize },
}

impl RenderError {
    /// Fail-open replacement text for the affected field
    pub fn marker(&self) -> String {
        format!("{}: {}]]", RENDER_ERROR_MARKER, self)
    }
}

/// Renders templates against a resolver and a run context
#[derive(Clone, Copy)]
pub struct TemplateRenderer<'a> {
    resolver: &'a VariableResolver,
    context: &'a RunContext,
}

impl<'a> TemplateRenderer<'a> {
    pub fn new(resolver: &'a VariableResolver, context: &'a RunContext) -> Self {
        Self { resolver, context }
    }

    /// Render a template. Every call produces fresh generator output.
    pub fn render(&self, template: &str, vars: &VarExprMap) -> Result<String, RenderError> {
        let resolved = self.resolve_vars(vars);
        self.substitute(template, &resolved, 0)
    }

    /// Render, replacing the output with an error marker on failure
    pub fn render_or_marker(&self, template: &str, vars: &VarExprMap) -> (String, Option<RenderError>) {
        match self.render(template, vars) {
            Ok(rendered) => (rendered, None),
            Err(e) => (e.marker(), Some(e)),
        }
    }

    /// Phase 1: resolve each variable expression
    pub fn resolve_vars(&self, vars: &VarExprMap) -> HashMap<String, String> {
        vars.iter()
            .map(|(name, expr)| (name.clone(), self.resolve_value(expr)))
            .collect()
    }

    fn resolve_value(&self, expr: &str) -> String {
        let trimmed = expr.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(mut value) = serde_json::from_str::<Value>(expr) {
                if value.is_object() || value.is_array() {
                    self.resolve_json(&mut value);
                    if let Ok(compact) = serde_json::to_string(&value) {
                        return compact;
                    }
                }
            }
        }
        self.resolver.resolve(expr)
    }

    fn resolve_json(&self, value: &mut Value) {
        match value {
            Value::String(s) if s.contains("@{") => *s = self.resolver.resolve(s),
            Value::Array(items) => items.iter_mut().for_each(|item| self.resolve_json(item)),
            Value::Object(map) => map.values_mut().for_each(|item| self.resolve_json(item)),
            _ => {}
        }
    }

    /// Phase 2: single left-to-right scan. `base` is the offset of `template`
    /// within the outermost input, for error positions.
    fn substitute(&self, template: &str, vars: &HashMap<String, String>, base: usize) -> Result<String, RenderError> {
        let bytes = template.as_bytes();
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        let mut i = 0;

        while i + 1 < bytes.len() {
            let sigil = bytes[i];
            if (sigil != b'$' && sigil != b'@') || bytes[i + 1] != b'{' {
                i += 1;
                continue;
            }

            out.push_str(&template[last..i]);
            let inner_start = i + 2;

            if sigil == b'$' {
                let close = template[inner_start..].find('}').ok_or(RenderError::Unterminated {
                    marker: "${",
                    offset: base + i,
                })?;
                let inner = &template[inner_start..inner_start + close];
                match inner.split_once('.') {
                    Some((origin, key)) => {
                        out.push_str(&self.context.get(origin.trim(), key.trim()).unwrap_or_default());
                    }
                    None => out.push_str(&template[i..inner_start + close + 1]),
                }
                i = inner_start + close + 1;
            } else {
                let close = find_balanced_close(&bytes[inner_start..]).ok_or(RenderError::Unterminated {
                    marker: "@{",
                    offset: base + i,
                })?;
                let inner = &template[inner_start..inner_start + close];
                match vars.get(inner.trim()) {
                    Some(value) => out.push_str(value),
                    None => {
                        let inner = if inner.contains("@{") || inner.contains("${") {
                            self.substitute(inner, vars, base + inner_start)?
                        } else {
                            inner.to_string()
                        };
                        out.push_str(&self.resolver.resolve(&format!("@{{{}}}", inner)));
                    }
                }
                i = inner_start + close + 1;
            }
            last = i;
        }

        out.push_str(&template[last..]);
        Ok(out)
    }
}

/// Index of the `}` closing an already-opened brace, honoring nesting
fn find_balanced_close(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, b) in bytes.iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' if depth == 0 => return Some(idx),
            b'}' => depth -= 1,
            _ => {}
        }
    }
    None
}
