use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::RenderError;
use crate::page::Page;

/// Names of the templates every renderer must provide.
pub const TEMPLATE_NAMES: [&str; 2] = ["edit", "view"];

const VIEW_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{{Title}}</title></head>
<body>
<h1>{{Title}}</h1>
<p>[<a href="/edit/{{Title}}">edit</a>]</p>
<div>{{Body}}</div>
</body>
</html>
"#;

const EDIT_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Editing {{Title}}</title></head>
<body>
<h1>Editing {{Title}}</h1>
<form action="/save/{{Title}}" method="POST">
<div><textarea name="body" rows="20" cols="80">{{Body}}</textarea></div>
<div><input type="submit" value="Save"></div>
</form>
</body>
</html>
"#;

/// Turns a [`Page`] and a named template into an HTML document.
pub trait Renderer: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns [`RenderError::UnknownTemplate`] if `name` is not registered.
    fn render(&self, name: &str, page: &Page) -> Result<String, RenderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Title,
    Body,
}

/// A parsed template: literal text interleaved with `{{Title}}` and
/// `{{Body}}` placeholders.
#[derive(Debug, Clone)]
struct Template {
    segments: Vec<Segment>,
}

impl Template {
    fn parse(name: &str, source: &str) -> Result<Self, RenderError> {
        let parse_err = |message: String| RenderError::Parse {
            name: name.to_string(),
            message,
        };

        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| parse_err("unclosed placeholder".into()))?;
            match after[..end].trim() {
                "Title" => segments.push(Segment::Title),
                "Body" => segments.push(Segment::Body),
                other => return Err(parse_err(format!("unknown field {other:?}"))),
            }
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }
        Ok(Self { segments })
    }

    fn execute(&self, page: &Page) -> String {
        let body = page.body_text();
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Title => {
                    html_escape::encode_double_quoted_attribute_to_string(&page.title, &mut out);
                }
                Segment::Body => {
                    html_escape::encode_text_to_string(&body, &mut out);
                }
            }
        }
        out
    }
}

/// The process-wide template set, parsed once at startup and read-only
/// afterwards.
#[derive(Debug, Clone)]
pub struct Templates {
    by_name: HashMap<String, Template>,
}

impl Templates {
    /// The built-in `view` and `edit` templates.
    ///
    /// # Panics
    ///
    /// Cannot panic. The built-in sources are constant and well-formed.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_sources([("view", VIEW_HTML), ("edit", EDIT_HTML)])
            .expect("built-in templates parse")
    }

    /// Parses templates from `(name, source)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Parse`] for an unclosed or unknown placeholder.
    pub fn from_sources<'a>(
        sources: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, RenderError> {
        let by_name: HashMap<String, Template> = sources
            .into_iter()
            .map(|(name, src)| Ok((name.to_string(), Template::parse(name, src)?)))
            .collect::<Result<_, RenderError>>()?;
        Ok(Self { by_name })
    }

    /// Loads `<dir>/view.html` and `<dir>/edit.html`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Load`] if either file cannot be read, or
    /// [`RenderError::Parse`] if either is malformed.
    pub async fn load_dir(dir: &Path) -> Result<Self, RenderError> {
        let mut by_name = HashMap::new();
        for name in TEMPLATE_NAMES {
            let path = dir.join(format!("{name}.html"));
            let source = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| RenderError::Load {
                    name: name.to_string(),
                    source,
                })?;
            debug!(template = name, path = %path.display(), "Loaded template");
            by_name.insert(name.to_string(), Template::parse(name, &source)?);
        }
        Ok(Self { by_name })
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Renderer for Templates {
    fn render(&self, name: &str, page: &Page) -> Result<String, RenderError> {
        let template = self
            .by_name
            .get(name)
            .ok_or_else(|| RenderError::UnknownTemplate(name.to_string()))?;
        Ok(template.execute(page))
    }
}
