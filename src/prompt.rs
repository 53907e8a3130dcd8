use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

/// Instruction used when no template file can be read
pub const DEFAULT_INSTRUCTION: &str = "Apply creative effects.";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Instruction text with `{name}` placeholders
///
/// `{{` and `}}` produce literal braces. Rendering is all-or-nothing: if any
/// placeholder has no value, the raw template text is returned instead.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse template text
    pub fn from_text<S: Into<String>>(text: S) -> Self {
        let source = text.into();
        let segments = parse_segments(&source);
        Self { source, segments }
    }

    /// Read a template file, falling back to [`DEFAULT_INSTRUCTION`]
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!("Loaded prompt template from {:?} ({} bytes)", path, text.len());
                Self::from_text(text)
            }
            Err(e) => {
                warn!("Prompt template not found at {:?} ({}), using default instruction", path, e);
                Self::from_text(DEFAULT_INSTRUCTION)
            }
        }
    }

    /// Raw template text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of appearance, without duplicates
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Names used by the template that `vars` does not provide
    pub fn missing(&self, vars: &HashMap<String, String>) -> Vec<String> {
        self.placeholders()
            .into_iter()
            .filter(|name| !vars.contains_key(*name))
            .map(str::to_string)
            .collect()
    }

    /// Substitute `vars` into the template
    pub fn render(&self, vars: &HashMap<String, String>) -> String {
        let missing = self.missing(vars);
        if !missing.is_empty() {
            warn!("Missing key for prompt substitution: {}", missing.join(", "));
            return self.source.clone();
        }

        let mut rendered = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Placeholder(name) => {
                    if let Some(value) = vars.get(name) {
                        rendered.push_str(value);
                    }
                }
            }
        }
        rendered
    }
}

fn parse_segments(source: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for n in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }

                let name = name.trim().to_string();
                if closed && !name.is_empty() {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name));
                } else {
                    // Unterminated or empty braces stay as written
                    literal.push('{');
                    literal.push_str(&name);
                    if closed {
                        literal.push('}');
                    }
                }
            }
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}
