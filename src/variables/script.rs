//! Rune-backed custom converters
//!
//! A converter script exposes `pub fn generate(args)` where `args` is the
//! vector of positional string arguments. A script without that function is
//! treated as the function body.

use std::sync::Arc;
use rune::runtime::{RuntimeContext, Value};
use rune::termcolor::Buffer;
use rune::{Context, Diagnostics, Options, Source, Sources, Unit, Vm};

use super::registry::Converter;
use crate::errors::{PulserunError, Result};

/// Compiles converter scripts against a shared Rune context
pub struct ScriptEngine {
    context: Context,
    runtime: Arc<RuntimeContext>,
}

impl ScriptEngine {
    pub fn new() -> Result<Self> {
        let mut context = Context::with_default_modules()
            .map_err(|e| PulserunError::Script(format!("Failed to create context: {}", e)))?;

        if let Ok(module) = rune_modules::json::module(true) {
            let _ = context.install(module);
        }
        if let Ok(module) = rune_modules::rand::module(true) {
            let _ = context.install(module);
        }
        if let Ok(module) = rune_modules::time::module(true) {
            let _ = context.install(module);
        }

        let runtime = Arc::new(context.runtime()
            .map_err(|e| PulserunError::Script(format!("Failed to create runtime: {}", e)))?);

        Ok(Self { context, runtime })
    }

    /// Compile a script, wrapping a bare body into `generate(args)`
    pub fn compile(&self, script: &str) -> Result<Arc<Unit>> {
        let source = wrap_script(script);

        let mut sources = Sources::new();
        let _ = sources.insert(Source::memory(&source)
            .map_err(|e| PulserunError::Script(format!("Source error: {}", e)))?);

        let mut diagnostics = Diagnostics::new();
        let options = Options::default();

        let result = rune::prepare(&mut sources)
            .with_context(&self.context)
            .with_options(&options)
            .with_diagnostics(&mut diagnostics)
            .build();

        match result {
            Ok(unit) => Ok(Arc::new(unit)),
            Err(e) => {
                let mut buffer = Buffer::no_color();
                let _ = diagnostics.emit(&mut buffer, &sources);
                let detail = String::from_utf8_lossy(buffer.as_slice()).trim().to_string();
                if detail.is_empty() {
                    Err(PulserunError::Script(format!("Compile error: {}", e)))
                } else {
                    Err(PulserunError::Script(format!("Compile error: {}\n{}", e, detail)))
                }
            }
        }
    }

    /// Build a converter from a script
    pub fn converter(&self, name: &str, arity: usize, script: &str) -> Result<ScriptConverter> {
        let unit = self.compile(script)?;
        Ok(ScriptConverter {
            name: name.to_string(),
            arity,
            runtime: self.runtime.clone(),
            unit,
        })
    }
}

fn wrap_script(script: &str) -> String {
    if script.contains("fn generate") {
        script.to_string()
    } else {
        format!("pub fn generate(args) {{\n{}\n}}\n", script)
    }
}

/// Converter whose output comes from a compiled Rune unit
pub struct ScriptConverter {
    name: String,
    arity: usize,
    runtime: Arc<RuntimeContext>,
    unit: Arc<Unit>,
}

impl std::fmt::Debug for ScriptConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptConverter")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

impl Converter for ScriptConverter {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        self.arity
    }

    fn generate(&self, args: &[String]) -> Result<String> {
        let mut vm = Vm::new(self.runtime.clone(), self.unit.clone());
        let output = vm
            .call(rune::Hash::type_hash(["generate"]), (args.to_vec(),))
            .map_err(|e| PulserunError::Script(format!("{}: {}", self.name, e)))?;
        value_to_string(output)
            .ok_or_else(|| PulserunError::Script(format!("{}: generate() must return a string or number", self.name)))
    }
}

fn value_to_string(value: Value) -> Option<String> {
    if let Ok(s) = rune::from_value::<String>(value.clone()) {
        return Some(s);
    }
    if let Ok(i) = rune::from_value::<i64>(value.clone()) {
        return Some(i.to_string());
    }
    if let Ok(f) = rune::from_value::<f64>(value.clone()) {
        return Some(f.to_string());
    }
    if let Ok(b) = rune::from_value::<bool>(value) {
        return Some(b.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_function() {
        let engine = ScriptEngine::new().unwrap();
        let converter = engine
            .converter("upper", 1, "pub fn generate(args) { args[0].to_uppercase() }")
            .unwrap();

        assert_eq!(converter.generate(&["abc".to_string()]).unwrap(), "ABC");
    }

    #[test]
    fn test_bare_body_is_wrapped() {
        let engine = ScriptEngine::new().unwrap();
        let converter = engine.converter("join", 2, r#"args[0] + "-" + args[1]"#).unwrap();

        let out = converter.generate(&["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(out, "a-b");
    }

    #[test]
    fn test_numeric_result() {
        let engine = ScriptEngine::new().unwrap();
        let converter = engine.converter("answer", 0, "42").unwrap();
        assert_eq!(converter.generate(&[]).unwrap(), "42");
    }

    #[test]
    fn test_compile_error() {
        let engine = ScriptEngine::new().unwrap();
        let err = engine.converter("broken", 0, "pub fn generate(args) { let }").unwrap_err();
        assert!(err.to_string().contains("Compile error"));
    }
}
