//! Request materialization
//!
//! Turns a stored test case into a concrete request: endpoint URL, merged
//! headers and body, each rendered with its own variable map.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use super::renderer::{RenderError, TemplateRenderer};
use crate::errors::{PulserunError, Result};
use crate::models::{HeadersDict, TestCase};
use crate::store::DefinitionStore;

/// Header set when a header template cannot be parsed
pub const RENDER_ERROR_HEADER: &str = "X-Render-Error";

/// A fully rendered request ready for the transport
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderedRequest {
    pub tcid: String,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Fail-open rendering diagnostics
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub render_errors: Vec<String>,
}

impl RenderedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Build the concrete request for a test case.
///
/// A missing endpoint or template reference is an error for this item only.
pub fn materialize(
    test: &TestCase,
    store: &dyn DefinitionStore,
    renderer: &TemplateRenderer<'_>,
    environment: Option<&str>,
) -> Result<RenderedRequest> {
    let mut render_errors = Vec::new();

    let endpoint = store.endpoint(&test.endpoint).ok_or_else(|| {
        PulserunError::Definition(format!("Endpoint '{}' not found for {}", test.endpoint, test.tcid))
    })?;
    let base = endpoint.resolve(environment).ok_or_else(|| {
        PulserunError::Definition(format!(
            "Endpoint '{}' has no URL for environment {}",
            endpoint.name,
            environment.unwrap_or("<default>")
        ))
    })?;
    let (url, err) = renderer.render_or_marker(&join_url(base, &test.path), &test.endpoint_vars);
    note(&mut render_errors, "url", err);

    let mut merged = HeadersDict::new();
    if let Some(name) = &test.header_template {
        let template = store.template(name).ok_or_else(|| {
            PulserunError::Definition(format!("Header template '{}' not found for {}", name, test.tcid))
        })?;
        match parse_header_template(&template.content) {
            Ok(headers) => merged.extend(headers),
            Err(e) => {
                let message = format!("invalid header template '{}': {}", name, e);
                merged.insert(RENDER_ERROR_HEADER.to_string(), message.clone());
                render_errors.push(format!("headers: {}", message));
            }
        }
    }
    for (name, value) in &test.headers {
        merged.insert(name.clone(), value.clone());
    }

    let mut headers = Vec::with_capacity(merged.len());
    for (name, value) in merged {
        if name == RENDER_ERROR_HEADER {
            headers.push((name, value));
            continue;
        }
        let (rendered, err) = renderer.render_or_marker(&value, &test.header_vars);
        note(&mut render_errors, &format!("header {}", name), err);
        headers.push((name, rendered));
    }

    let body_source = match (&test.body, &test.body_template) {
        (Some(body), _) => Some(body.clone()),
        (None, Some(name)) => {
            let template = store.template(name).ok_or_else(|| {
                PulserunError::Definition(format!("Body template '{}' not found for {}", name, test.tcid))
            })?;
            Some(template.content)
        }
        (None, None) => None,
    };
    let body = body_source.map(|source| {
        let (rendered, err) = renderer.render_or_marker(&source, &test.body_vars);
        note(&mut render_errors, "body", err);
        rendered
    });

    Ok(RenderedRequest {
        tcid: test.tcid.clone(),
        method: test.method.to_uppercase(),
        url,
        headers,
        body,
        render_errors,
    })
}

fn note(errors: &mut Vec<String>, field: &str, err: Option<RenderError>) {
    if let Some(err) = err {
        errors.push(format!("{}: {}", field, err));
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    if path.starts_with('?') || path.starts_with('#') {
        return format!("{}{}", base, path);
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Header templates are a JSON object of name to value
fn parse_header_template(content: &str) -> std::result::Result<IndexMap<String, String>, String> {
    let value: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let object = value.as_object().ok_or_else(|| "expected a JSON object".to_string())?;
    Ok(object
        .iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::models::{Endpoint, Template};
    use crate::store::Definitions;
    use crate::variables::VariableResolver;
    use std::collections::HashMap;

    fn store() -> Definitions {
        let mut defs = Definitions::default();
        defs.endpoints.push(Endpoint {
            name: "api".to_string(),
            url: Some("http://localhost:8080/".to_string()),
            environments: HashMap::from([("qa".to_string(), "http://qa.local".to_string())]),
        });
        defs.templates.push(Template {
            name: "json-headers".to_string(),
            content: r#"{"Content-Type":"application/json","X-Trace":"@{trace}","X-Retry":3}"#.to_string(),
        });
        defs.templates.push(Template {
            name: "bad-headers".to_string(),
            content: "not json".to_string(),
        });
        defs.templates.push(Template {
            name: "user-body".to_string(),
            content: r#"{"user":"@{user}"}"#.to_string(),
        });
        defs
    }

    fn test_case() -> TestCase {
        TestCase {
            tcid: "T1".to_string(),
            method: "post".to_string(),
            endpoint: "api".to_string(),
            path: "/users/@{id}".to_string(),
            header_template: Some("json-headers".to_string()),
            body_template: Some("user-body".to_string()),
            endpoint_vars: HashMap::from([("id".to_string(), "42".to_string())]),
            header_vars: HashMap::from([("trace".to_string(), "abc".to_string())]),
            body_vars: HashMap::from([("user".to_string(), "alice".to_string())]),
            ..Default::default()
        }
    }

    #[test]
    fn test_materialize() {
        let store = store();
        let resolver = VariableResolver::new();
        let ctx = RunContext::new();
        let renderer = TemplateRenderer::new(&resolver, &ctx);

        let mut test = test_case();
        test.headers.insert("X-Trace".to_string(), "override-@{trace}".to_string());

        let request = materialize(&test, &store, &renderer, None).unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "http://localhost:8080/users/42");
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("X-Trace"), Some("override-abc"));
        assert_eq!(request.header("X-Retry"), Some("3"));
        assert_eq!(request.body.as_deref(), Some(r#"{"user":"alice"}"#));
        assert!(request.render_errors.is_empty());
    }

    #[test]
    fn test_environment_url_and_inline_body() {
        let store = store();
        let resolver = VariableResolver::new();
        let ctx = RunContext::new();
        let renderer = TemplateRenderer::new(&resolver, &ctx);

        let mut test = test_case();
        test.body = Some("inline @{user}".to_string());

        let request = materialize(&test, &store, &renderer, Some("qa")).unwrap();
        assert_eq!(request.url, "http://qa.local/users/42");
        assert_eq!(request.body.as_deref(), Some("inline alice"));
    }

    #[test]
    fn test_bad_header_template_marks_request() {
        let store = store();
        let resolver = VariableResolver::new();
        let ctx = RunContext::new();
        let renderer = TemplateRenderer::new(&resolver, &ctx);

        let mut test = test_case();
        test.header_template = Some("bad-headers".to_string());

        let request = materialize(&test, &store, &renderer, None).unwrap();
        assert!(request.header(RENDER_ERROR_HEADER).is_some());
        assert_eq!(request.render_errors.len(), 1);
    }

    #[test]
    fn test_missing_references() {
        let store = store();
        let resolver = VariableResolver::new();
        let ctx = RunContext::new();
        let renderer = TemplateRenderer::new(&resolver, &ctx);

        let mut test = test_case();
        test.endpoint = "nowhere".to_string();
        assert!(materialize(&test, &store, &renderer, None).is_err());

        let mut test = test_case();
        test.body_template = Some("missing".to_string());
        let err = materialize(&test, &store, &renderer, None).unwrap_err();
        assert!(err.to_string().contains("Body template 'missing'"));
    }

    #[test]
    fn test_unterminated_body_fails_open() {
        let store = store();
        let resolver = VariableResolver::new();
        let ctx = RunContext::new();
        let renderer = TemplateRenderer::new(&resolver, &ctx);

        let mut test = test_case();
        test.body = Some("@{oops".to_string());

        let request = materialize(&test, &store, &renderer, None).unwrap();
        assert!(request.body.as_deref().unwrap().starts_with("[[RENDER_ERROR"));
        assert_eq!(request.render_errors.len(), 1);
    }
}
