//! Custom converter registry
//!
//! Converters are looked up by name when a template contains
//! `@{name(arg,...)}`. Native converters registered in code survive reloads;
//! scripted converters are replaced wholesale on every reload.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use super::script::ScriptEngine;
use crate::errors::Result;
use crate::store::{CustomVariableDef, CustomVariableSource};

/// A named transform over positional string arguments
pub trait Converter: Send + Sync {
    fn name(&self) -> &str;

    /// Number of positional arguments the converter expects
    fn arity(&self) -> usize;

    fn generate(&self, args: &[String]) -> Result<String>;
}

type ConverterFn = dyn Fn(&[String]) -> Result<String> + Send + Sync;

/// Converter backed by a native closure
pub struct FnConverter {
    name: String,
    arity: usize,
    func: Box<ConverterFn>,
}

impl FnConverter {
    pub fn new<F>(name: &str, arity: usize, func: F) -> Self
    where
        F: Fn(&[String]) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            arity,
            func: Box::new(func),
        }
    }
}

impl Converter for FnConverter {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        self.arity
    }

    fn generate(&self, args: &[String]) -> Result<String> {
        (self.func)(args)
    }
}

/// Fallback converter: echoes the first argument
#[derive(Debug, Clone)]
pub struct IdentityConverter {
    name: String,
    arity: usize,
}

impl IdentityConverter {
    pub fn new(name: &str, arity: usize) -> Self {
        Self { name: name.to_string(), arity }
    }
}

impl Converter for IdentityConverter {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        self.arity
    }

    fn generate(&self, args: &[String]) -> Result<String> {
        Ok(args.first().cloned().unwrap_or_default())
    }
}

/// Count the parameters declared in a param spec such as `(a, b)` or `a,b`
pub fn parse_arity(param_spec: &str) -> usize {
    let spec = param_spec.trim();
    let spec = spec.strip_prefix('(').unwrap_or(spec);
    let spec = spec.strip_suffix(')').unwrap_or(spec);
    spec.split(',').filter(|p| !p.trim().is_empty()).count()
}

type ConverterMap = HashMap<String, Arc<dyn Converter>>;

#[derive(Default)]
struct Registry {
    native: ConverterMap,
    scripted: ConverterMap,
}

/// Read-mostly converter registry
#[derive(Default)]
pub struct ConverterRegistry {
    inner: RwLock<Registry>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native converter; it replaces any native one of the same name
    pub fn register(&self, converter: Arc<dyn Converter>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.native.insert(converter.name().to_string(), converter);
    }

    /// Look up a converter; scripted definitions shadow native ones
    pub fn get(&self, name: &str) -> Option<Arc<dyn Converter>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .scripted
            .get(name)
            .or_else(|| inner.native.get(name))
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.native.is_empty() && inner.scripted.is_empty()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.native.len() + inner.scripted.len()
    }

    /// Re-read scripted definitions and swap them in.
    ///
    /// A failing source keeps the previous map. A failing script only
    /// degrades that converter to [`IdentityConverter`].
    pub fn reload(&self, source: &dyn CustomVariableSource) -> Result<usize> {
        let defs = source.load_definitions()?;
        let scripted = compile_definitions(&defs);
        let count = scripted.len();

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.scripted = scripted;
        drop(inner);

        info!(converters = count, "Custom variables loaded");
        Ok(count)
    }
}

fn compile_definitions(defs: &[CustomVariableDef]) -> ConverterMap {
    let engine = if defs.iter().any(|d| !d.script.trim().is_empty()) {
        match ScriptEngine::new() {
            Ok(engine) => Some(engine),
            Err(e) => {
                warn!(error = %e, "Script engine unavailable, custom variables fall back to identity");
                None
            }
        }
    } else {
        None
    };

    let mut map = ConverterMap::new();
    for def in defs {
        let arity = parse_arity(&def.param_spec);
        let converter: Arc<dyn Converter> = match (&engine, def.script.trim().is_empty()) {
            (Some(engine), false) => match engine.converter(&def.name, arity, &def.script) {
                Ok(converter) => Arc::new(converter),
                Err(e) => {
                    warn!(variable = %def.name, error = %e, "Custom variable script failed to compile");
                    Arc::new(IdentityConverter::new(&def.name, arity))
                }
            },
            _ => Arc::new(IdentityConverter::new(&def.name, arity)),
        };
        if map.insert(def.name.clone(), converter).is_some() {
            warn!(variable = %def.name, "Duplicate custom variable definition, last one wins");
        }
    }
    map
}
