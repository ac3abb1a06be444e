/// Display-text templates for choices and situation descriptions.
///
/// A small placeholder language: `{location}`, `{npc}`, `{route}` and
/// `{player}` are replaced with entity names at materialization time.
/// `{{` and `}}` escape literal braces.
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TextError {
    #[error("text template parse error: {0}")]
    Parse(String),
    #[error("unknown placeholder '{{{0}}}'")]
    UnknownPlaceholder(String),
}

/// Names a placeholder can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Location,
    Npc,
    Route,
    Player,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "location" => Some(Self::Location),
            "npc" => Some(Self::Npc),
            "route" => Some(Self::Route),
            "player" => Some(Self::Player),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextSegment {
    Literal(String),
    Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextTemplate {
    pub segments: Vec<TextSegment>,
}

/// Values substituted into a template. Unbound placeholders render as a
/// neutral noun so text never shows raw braces.
#[derive(Debug, Clone, Default)]
pub struct TextBindings {
    pub location: Option<String>,
    pub npc: Option<String>,
    pub route: Option<String>,
    pub player: Option<String>,
}

impl TextBindings {
    fn value(&self, placeholder: Placeholder) -> &str {
        let (bound, fallback) = match placeholder {
            Placeholder::Location => (&self.location, "this place"),
            Placeholder::Npc => (&self.npc, "someone"),
            Placeholder::Route => (&self.route, "the road"),
            Placeholder::Player => (&self.player, "you"),
        };
        bound.as_deref().unwrap_or(fallback)
    }
}

impl TextTemplate {
    pub fn parse(input: &str) -> Result<TextTemplate, TextError> {
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            match chars[i] {
                '{' if i + 1 < len && chars[i + 1] == '{' => {
                    literal_buf.push('{');
                    i += 2;
                }
                '{' => {
                    if !literal_buf.is_empty() {
                        segments.push(TextSegment::Literal(std::mem::take(&mut literal_buf)));
                    }
                    let start = i + 1;
                    let mut end = start;
                    while end < len && chars[end] != '}' {
                        if chars[end] == '{' {
                            return Err(TextError::Parse(
                                "nested braces are not allowed".to_string(),
                            ));
                        }
                        end += 1;
                    }
                    if end == len {
                        return Err(TextError::Parse("unclosed brace".to_string()));
                    }
                    let name: String = chars[start..end].iter().collect();
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(TextError::Parse("empty braces".to_string()));
                    }
                    let placeholder = Placeholder::parse(name)
                        .ok_or_else(|| TextError::UnknownPlaceholder(name.to_string()))?;
                    segments.push(TextSegment::Placeholder(placeholder));
                    i = end + 1;
                }
                '}' if i + 1 < len && chars[i + 1] == '}' => {
                    literal_buf.push('}');
                    i += 2;
                }
                '}' => {
                    return Err(TextError::Parse("unmatched closing brace".to_string()));
                }
                c => {
                    literal_buf.push(c);
                    i += 1;
                }
            }
        }

        if !literal_buf.is_empty() {
            segments.push(TextSegment::Literal(literal_buf));
        }

        Ok(TextTemplate { segments })
    }

    pub fn render(&self, bindings: &TextBindings) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                TextSegment::Literal(text) => out.push_str(text),
                TextSegment::Placeholder(p) => out.push_str(bindings.value(*p)),
            }
        }
        out
    }
}

/// Parse and render in one step. Text that fails to parse is returned
/// verbatim; templates are linted before they reach the store.
pub fn render_text(input: &str, bindings: &TextBindings) -> String {
    match TextTemplate::parse(input) {
        Ok(template) => template.render(bindings),
        Err(_) => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_literal_only() {
        let t = TextTemplate::parse("Leave quietly").unwrap();
        assert_eq!(t.segments, vec![TextSegment::Literal("Leave quietly".to_string())]);
    }

    #[test]
    fn parse_placeholders() {
        let t = TextTemplate::parse("Talk to {npc} at {location}").unwrap();
        assert_eq!(t.segments.len(), 4);
        assert_eq!(t.segments[1], TextSegment::Placeholder(Placeholder::Npc));
        assert_eq!(t.segments[3], TextSegment::Placeholder(Placeholder::Location));
    }

    #[test]
    fn escaped_braces() {
        let t = TextTemplate::parse("{{literal}}").unwrap();
        assert_eq!(t.segments, vec![TextSegment::Literal("{literal}".to_string())]);
    }

    #[test]
    fn errors() {
        assert!(matches!(TextTemplate::parse("{npc"), Err(TextError::Parse(_))));
        assert!(matches!(TextTemplate::parse("npc}"), Err(TextError::Parse(_))));
        assert!(matches!(TextTemplate::parse("{}"), Err(TextError::Parse(_))));
        assert_eq!(
            TextTemplate::parse("{weather}"),
            Err(TextError::UnknownPlaceholder("weather".to_string()))
        );
    }

    #[test]
    fn render_with_and_without_bindings() {
        let bindings = TextBindings {
            npc: Some("Elena".to_string()),
            ..TextBindings::default()
        };
        assert_eq!(
            render_text("Bargain with {npc} in {location}", &bindings),
            "Bargain with Elena in this place"
        );
    }

    #[test]
    fn render_bad_text_verbatim() {
        assert_eq!(render_text("Oops {", &TextBindings::default()), "Oops {");
    }
}
