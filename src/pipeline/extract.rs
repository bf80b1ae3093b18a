//! Value extraction from response bodies
//!
//! Every extractor returns the first match only:
//! - `Ok(Some(value))` on a match
//! - `Ok(None)` when nothing matched
//! - `Err(message)` for an unparsable body or an invalid expression

use jsonpath_rust::JsonPath;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde_json::Value as JsonValue;

pub type Extracted = std::result::Result<Option<String>, String>;

/// First JSONPath match; strings are unquoted, everything else is compact JSON
pub fn json_path(body: &str, path: &str) -> Extracted {
    let value: JsonValue = serde_json::from_str(body)
        .map_err(|e| format!("Response body is not JSON: {}", e))?;
    json_path_value(&value, path)
}

pub fn json_path_value(value: &JsonValue, path: &str) -> Extracted {
    let results = value
        .query(path)
        .map_err(|e| format!("Invalid JSONPath '{}': {}", path, e))?;
    Ok(results.first().map(|v| json_to_text(v)))
}

fn json_to_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// First regex match: capture group 1 if the pattern has one, else the whole match
pub fn regex_first(body: &str, pattern: &str) -> Extracted {
    let re = Regex::new(pattern).map_err(|e| format!("Invalid regex '{}': {}", pattern, e))?;
    Ok(re.captures(body).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(0))
            .map(|m| m.as_str().to_string())
    }))
}

// ---- XPath (restricted) ----

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

#[derive(Debug)]
enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Concatenated text of this element and its descendants
    fn string_value(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }

    fn first_text(&self) -> Option<&str> {
        self.children.iter().find_map(|n| match n {
            Node::Text(t) => Some(t.as_str()),
            Node::Element(_) => None,
        })
    }

    /// Self followed by every descendant element, document order
    fn descendants_or_self<'a>(&'a self, out: &mut Vec<&'a Element>) {
        out.push(self);
        for child in self.child_elements() {
            child.descendants_or_self(out);
        }
    }
}

fn parse_xml(xml: &str) -> std::result::Result<Element, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // Synthetic document node; the real root becomes its only child
    let mut stack: Vec<Element> = vec![Element::default()];

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                stack.push(Element {
                    name: String::from_utf8_lossy(e.name().as_ref()).to_string(),
                    attrs: e
                        .attributes()
                        .flatten()
                        .map(|a| {
                            (
                                String::from_utf8_lossy(a.key.as_ref()).to_string(),
                                String::from_utf8_lossy(&a.value).to_string(),
                            )
                        })
                        .collect(),
                    children: Vec::new(),
                });
            }
            Ok(Event::Empty(ref e)) => {
                let element = Element {
                    name: String::from_utf8_lossy(e.name().as_ref()).to_string(),
                    attrs: e
                        .attributes()
                        .flatten()
                        .map(|a| {
                            (
                                String::from_utf8_lossy(a.key.as_ref()).to_string(),
                                String::from_utf8_lossy(&a.value).to_string(),
                            )
                        })
                        .collect(),
                    children: Vec::new(),
                };
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Element(element));
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return Err("Unbalanced closing tag".to_string());
                }
                if let Some(element) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Element(element));
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                let text = String::from_utf8_lossy(e.as_ref()).trim().to_string();
                if !text.is_empty() {
                    if let Some(current) = stack.last_mut() {
                        current.children.push(Node::Text(text));
                    }
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(current) = stack.last_mut() {
                    current.children.push(Node::Text(String::from_utf8_lossy(e.as_ref()).to_string()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("Response body is not XML: {}", e)),
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err("Response body is not XML: unclosed element".to_string());
    }
    let document = stack.pop().unwrap_or_default();
    if document.child_elements().next().is_none() {
        return Err("Response body is not XML: no root element".to_string());
    }
    Ok(document)
}

#[derive(Debug, PartialEq)]
enum StepTest {
    Name(String),
    Any,
}

#[derive(Debug, PartialEq)]
struct Step {
    descendant: bool,
    test: StepTest,
    position: Option<usize>,
}

#[derive(Debug, PartialEq)]
enum Terminal {
    Node,
    Attribute(String),
    Text,
}

fn parse_xpath(expr: &str) -> std::result::Result<(Vec<Step>, Terminal), String> {
    let invalid = |why: &str| format!("Invalid XPath '{}': {}", expr, why);
    let mut rest = expr.trim();
    if !rest.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }

    let mut steps = Vec::new();
    let mut terminal = Terminal::Node;

    while !rest.is_empty() {
        if terminal != Terminal::Node {
            return Err(invalid("attribute or text() must be the last step"));
        }
        let descendant = rest.starts_with("//");
        rest = rest.trim_start_matches('/');
        let end = rest.find('/').unwrap_or(rest.len());
        let token = rest[..end].trim();
        rest = &rest[end..];

        if token.is_empty() {
            return Err(invalid("empty step"));
        }
        if let Some(attr) = token.strip_prefix('@') {
            if attr.is_empty() || descendant {
                return Err(invalid("bad attribute step"));
            }
            terminal = Terminal::Attribute(attr.to_string());
            continue;
        }
        if token == "text()" {
            if descendant {
                return Err(invalid("'//text()' is not supported"));
            }
            terminal = Terminal::Text;
            continue;
        }

        let (name, position) = match token.split_once('[') {
            Some((name, pred)) => {
                let n = pred
                    .strip_suffix(']')
                    .and_then(|p| p.trim().parse::<usize>().ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| invalid("only positional predicates [n] are supported"))?;
                (name.trim(), Some(n))
            }
            None => (token, None),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '*')) {
            return Err(invalid("bad element name"));
        }
        let test = if name == "*" { StepTest::Any } else { StepTest::Name(name.to_string()) };
        steps.push(Step { descendant, test, position });
    }

    if steps.is_empty() {
        return Err(invalid("no element step"));
    }
    Ok((steps, terminal))
}

fn select<'a>(context: Vec<&'a Element>, step: &Step) -> Vec<&'a Element> {
    let matches = |e: &Element| match &step.test {
        StepTest::Any => true,
        StepTest::Name(name) => &e.name == name,
    };

    let parents: Vec<&Element> = if step.descendant {
        let mut all = Vec::new();
        for node in context {
            node.descendants_or_self(&mut all);
        }
        all
    } else {
        context
    };

    let mut out = Vec::new();
    for parent in parents {
        let children: Vec<&Element> = parent.child_elements().filter(|e| matches(*e)).collect();
        match step.position {
            Some(n) => out.extend(children.get(n - 1).copied()),
            None => out.extend(children),
        }
    }
    out
}

/// First match of a restricted XPath: `/name`, `//name`, `*`, `[n]`, `@attr`, `text()`
pub fn xpath(body: &str, expr: &str) -> Extracted {
    let (steps, terminal) = parse_xpath(expr)?;
    let document = parse_xml(body)?;

    let mut context = vec![&document];
    for step in &steps {
        context = select(context, step);
        if context.is_empty() {
            return Ok(None);
        }
    }

    Ok(match terminal {
        Terminal::Node => context.first().map(|e| e.string_value()),
        Terminal::Attribute(name) => context.iter().find_map(|e| e.attr(&name)).map(String::from),
        Terminal::Text => context.iter().find_map(|e| e.first_text()).map(String::from),
    })
}
