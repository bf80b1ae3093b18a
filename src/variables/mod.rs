//! Dynamic value resolution
//!
//! Resolves custom converter calls first, then legacy spellings, then the
//! built-in generators. Converter output is final and never re-scanned.

pub mod builtin;
pub mod registry;
pub mod script;

use std::sync::Arc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

pub use registry::{parse_arity, Converter, ConverterRegistry, FnConverter, IdentityConverter};
pub use script::{ScriptConverter, ScriptEngine};

use crate::errors::Result;
use crate::store::CustomVariableSource;

static CUSTOM_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@\{([A-Za-z_][A-Za-z0-9_]*)(?:\(([^()]*)\))?\}").unwrap()
});

/// Piece of input text during resolution
enum Segment {
    /// Still subject to built-in passes
    Open(String),
    /// Converter output; emitted as-is
    Frozen(String),
}

/// Resolves `@{...}` generator expressions
#[derive(Default)]
pub struct VariableResolver {
    registry: ConverterRegistry,
}

impl VariableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// Register a native converter
    pub fn register(&self, converter: Arc<dyn Converter>) {
        self.registry.register(converter);
    }

    /// Reload custom variable definitions from the store
    pub fn reload(&self, source: &dyn CustomVariableSource) -> Result<usize> {
        self.registry.reload(source)
    }

    /// Resolve every generator expression in `raw`. Never fails; anything
    /// that cannot be resolved is left as literal text.
    pub fn resolve(&self, raw: &str) -> String {
        if !raw.contains("@{") {
            return raw.to_string();
        }

        self.apply_custom(raw)
            .into_iter()
            .map(|segment| match segment {
                Segment::Frozen(text) => text,
                Segment::Open(text) => builtin::resolve_builtins(&builtin::translate_legacy(&text)),
            })
            .collect()
    }

    fn apply_custom(&self, raw: &str) -> Vec<Segment> {
        if self.registry.is_empty() {
            return vec![Segment::Open(raw.to_string())];
        }

        let mut segments = Vec::new();
        let mut last = 0;

        for caps in CUSTOM_CALL_RE.captures_iter(raw) {
            let whole = match caps.get(0) {
                Some(m) => m,
                None => continue,
            };
            let converter = match self.registry.get(&caps[1]) {
                Some(converter) => converter,
                None => continue,
            };

            if whole.start() > last {
                segments.push(Segment::Open(raw[last..whole.start()].to_string()));
            }
            last = whole.end();

            let args = split_args(caps.get(2).map(|m| m.as_str()));
            if args.len() != converter.arity() {
                warn!(
                    variable = %converter.name(),
                    expected = converter.arity(),
                    actual = args.len(),
                    "Custom variable arity mismatch, leaving unresolved"
                );
                segments.push(Segment::Frozen(whole.as_str().to_string()));
                continue;
            }

            match converter.generate(&args) {
                Ok(value) => segments.push(Segment::Frozen(value)),
                Err(e) => {
                    warn!(variable = %converter.name(), error = %e, "Custom variable failed, leaving unresolved");
                    segments.push(Segment::Frozen(whole.as_str().to_string()));
                }
            }
        }

        if last < raw.len() {
            segments.push(Segment::Open(raw[last..].to_string()));
        }
        segments
    }
}

fn split_args(args: Option<&str>) -> Vec<String> {
    match args.map(str::trim) {
        None | Some("") => Vec::new(),
        Some(args) => args.split(',').map(|a| a.trim().to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_with_native() -> VariableResolver {
        let resolver = VariableResolver::new();
        resolver.register(Arc::new(FnConverter::new("wrap", 2, |args| {
            Ok(format!("{}{}{}", args[0], args[1], args[0]))
        })));
        resolver.register(Arc::new(FnConverter::new("raw", 0, |_| {
            Ok("@{__uuid}".to_string())
        })));
        resolver
    }

    #[test]
    fn test_plain_text_untouched() {
        let resolver = VariableResolver::new();
        assert_eq!(resolver.resolve("hello"), "hello");
    }

    #[test]
    fn test_custom_converter() {
        let resolver = resolver_with_native();
        assert_eq!(resolver.resolve("<@{wrap(|,x)}>"), "<|x|>");
    }

    #[test]
    fn test_arity_mismatch_left_literal() {
        let resolver = resolver_with_native();
        assert_eq!(resolver.resolve("@{wrap(1)}"), "@{wrap(1)}");
    }

    #[test]
    fn test_custom_output_is_frozen() {
        let resolver = resolver_with_native();
        assert_eq!(resolver.resolve("@{raw()}"), "@{__uuid}");
        assert_eq!(resolver.resolve("@{raw}"), "@{__uuid}");
    }

    #[test]
    fn test_unknown_name_left_for_renderer() {
        let resolver = resolver_with_native();
        assert_eq!(resolver.resolve("@{userId}"), "@{userId}");
    }

    #[test]
    fn test_builtins_and_legacy_mixed() {
        let resolver = resolver_with_native();
        let out = resolver.resolve("@{wrap(a,b)}-@{randomString(4,n)}-@{__randomString(2,u)}");
        let parts: Vec<_> = out.split('-').collect();
        assert_eq!(parts[0], "aba");
        assert!(parts[1].len() == 4 && parts[1].chars().all(|c| c.is_ascii_digit()));
        assert!(parts[2].len() == 2 && parts[2].chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fresh_values_per_call() {
        let resolver = VariableResolver::new();
        let a = resolver.resolve("@{__uuid}");
        let b = resolver.resolve("@{__uuid}");
        assert_ne!(a, b);
    }

    #[test]
    fn test_resolver_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VariableResolver>();
    }
}
