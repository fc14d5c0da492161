//! Block markup compiled to HTML email bodies.
//!
//! Tags are written in square brackets and closed with `[/name]`:
//!
//! ```text
//! [heading]Visitor arrived[/heading]
//! [text]{{visitor.name}} is waiting at [bold]{{location.name}}[/bold].[/text]
//! [button href="{{links.visit}}"]Open visit[/button]
//! [divider]
//! ```
//!
//! `[[` produces a literal `[`. Text between tags is copied through, so
//! `{{placeholders}}` survive compilation and are substituted afterwards.

use thiserror::Error;

use super::substitution::escape_html;

const BODY_STYLE: &str =
    "margin:0;padding:24px;font-family:Arial,Helvetica,sans-serif;color:#222222;";
const BUTTON_STYLE: &str = "display:inline-block;padding:10px 18px;background:#1a73e8;\
color:#ffffff;text-decoration:none;border-radius:4px;";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarkupError {
    #[error("unterminated tag at byte {0}")]
    UnterminatedTag(usize),

    #[error("unknown tag [{0}]")]
    UnknownTag(String),

    #[error("unexpected closing tag [/{0}]")]
    UnexpectedClose(String),

    #[error("tag [{0}] is never closed")]
    Unclosed(String),

    #[error("tag [{tag}] requires attribute {attribute}")]
    MissingAttribute { tag: String, attribute: String },

    #[error("malformed attributes in [{0}]")]
    MalformedAttributes(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Heading,
    Subheading,
    Text,
    Section,
    Bold,
    Italic,
    Button,
    Link,
    Divider,
}

impl Tag {
    fn parse(name: &str) -> Result<Self, MarkupError> {
        match name {
            "heading" => Ok(Tag::Heading),
            "subheading" => Ok(Tag::Subheading),
            "text" => Ok(Tag::Text),
            "section" => Ok(Tag::Section),
            "bold" => Ok(Tag::Bold),
            "italic" => Ok(Tag::Italic),
            "button" => Ok(Tag::Button),
            "link" => Ok(Tag::Link),
            "divider" => Ok(Tag::Divider),
            other => Err(MarkupError::UnknownTag(other.to_string())),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Tag::Heading => "heading",
            Tag::Subheading => "subheading",
            Tag::Text => "text",
            Tag::Section => "section",
            Tag::Bold => "bold",
            Tag::Italic => "italic",
            Tag::Button => "button",
            Tag::Link => "link",
            Tag::Divider => "divider",
        }
    }

    fn open(self, attrs: &[(&str, &str)]) -> Result<String, MarkupError> {
        let html = match self {
            Tag::Heading => "<h1>".to_string(),
            Tag::Subheading => "<h2>".to_string(),
            Tag::Text => "<p>".to_string(),
            Tag::Section => "<div class=\"section\">".to_string(),
            Tag::Bold => "<strong>".to_string(),
            Tag::Italic => "<em>".to_string(),
            Tag::Button => format!(
                "<a href=\"{}\" style=\"{}\">",
                escape_html(self.required(attrs, "href")?),
                BUTTON_STYLE
            ),
            Tag::Link => format!(
                "<a href=\"{}\">",
                escape_html(self.required(attrs, "href")?)
            ),
            Tag::Divider => "<hr />".to_string(),
        };
        Ok(html)
    }

    fn close(self) -> &'static str {
        match self {
            Tag::Heading => "</h1>",
            Tag::Subheading => "</h2>",
            Tag::Text => "</p>",
            Tag::Section => "</div>",
            Tag::Bold => "</strong>",
            Tag::Italic => "</em>",
            Tag::Button | Tag::Link => "</a>",
            Tag::Divider => "",
        }
    }

    fn is_void(self) -> bool {
        self == Tag::Divider
    }

    fn required<'a>(self, attrs: &[(&str, &'a str)], key: &str) -> Result<&'a str, MarkupError> {
        attrs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| MarkupError::MissingAttribute {
                tag: self.name().to_string(),
                attribute: key.to_string(),
            })
    }
}

/// Parse `key="value"` pairs
fn parse_attributes<'a>(tag: &str, raw: &'a str) -> Result<Vec<(&'a str, &'a str)>, MarkupError> {
    let malformed = || MarkupError::MalformedAttributes(tag.to_string());
    let mut attrs = Vec::new();
    let mut rest = raw.trim_start();

    while !rest.is_empty() {
        let eq = rest.find('=').ok_or_else(malformed)?;
        let key = rest[..eq].trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(malformed());
        }

        let value_part = rest[eq + 1..].trim_start();
        let value_part = value_part.strip_prefix('"').ok_or_else(malformed)?;
        let end = value_part.find('"').ok_or_else(malformed)?;

        attrs.push((key, &value_part[..end]));
        rest = value_part[end + 1..].trim_start();
    }

    Ok(attrs)
}

/// Compile markup into a complete HTML document
pub fn compile(source: &str) -> Result<String, MarkupError> {
    let mut body = String::with_capacity(source.len() * 2);
    let mut stack: Vec<Tag> = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(open) = rest.find('[') {
        body.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        if let Some(stripped) = after.strip_prefix('[') {
            body.push('[');
            offset += open + 2;
            rest = stripped;
            continue;
        }

        let close = after
            .find(']')
            .ok_or(MarkupError::UnterminatedTag(offset + open))?;
        let raw = after[..close].trim();

        if let Some(name) = raw.strip_prefix('/') {
            let name = name.trim();
            match stack.pop() {
                Some(tag) if tag.name() == name => body.push_str(tag.close()),
                _ => return Err(MarkupError::UnexpectedClose(name.to_string())),
            }
        } else {
            let (name, attr_src) = raw
                .split_once(char::is_whitespace)
                .unwrap_or((raw, ""));
            let tag = Tag::parse(name)?;
            let attrs = parse_attributes(name, attr_src)?;
            body.push_str(&tag.open(&attrs)?);
            if !tag.is_void() {
                stack.push(tag);
            }
        }

        let consumed = open + 1 + close + 1;
        offset += consumed;
        rest = &rest[consumed..];
    }

    body.push_str(rest);

    if let Some(tag) = stack.pop() {
        return Err(MarkupError::Unclosed(tag.name().to_string()));
    }

    Ok(format!(
        "<!DOCTYPE html><html><body style=\"{}\">{}</body></html>",
        BODY_STYLE,
        body.trim()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(html: &str) -> &str {
        let start = html.find("\">").unwrap() + 2;
        let end = html.rfind("</body>").unwrap();
        &html[start..end]
    }

    #[test]
    fn test_compile_blocks() {
        let html = compile("[heading]Hello[/heading][text]Welcome [bold]{{visitor.name}}[/bold][/text][divider]").unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert_eq!(
            body_of(&html),
            "<h1>Hello</h1><p>Welcome <strong>{{visitor.name}}</strong></p><hr />"
        );
    }

    #[test]
    fn test_compile_button_with_href() {
        let html = compile("[button href=\"https://x.test/v?a=1&b=2\"]Open[/button]").unwrap();
        assert!(html.contains("<a href=\"https://x.test/v?a=1&amp;b=2\""));
        assert!(html.contains(">Open</a>"));
    }

    #[test]
    fn test_literal_bracket() {
        let html = compile("[text]Room [[B2][/text]").unwrap();
        assert_eq!(body_of(&html), "<p>Room [B2]</p>");
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(
            compile("[blink]x[/blink]"),
            Err(MarkupError::UnknownTag("blink".to_string()))
        );
    }

    #[test]
    fn test_unclosed_tag() {
        assert_eq!(
            compile("[section][text]x[/text]"),
            Err(MarkupError::Unclosed("section".to_string()))
        );
    }

    #[test]
    fn test_mismatched_close() {
        assert_eq!(
            compile("[text]x[/heading]"),
            Err(MarkupError::UnexpectedClose("heading".to_string()))
        );
    }

    #[test]
    fn test_unterminated_tag() {
        assert!(matches!(
            compile("[text]x[/text"),
            Err(MarkupError::UnterminatedTag(7))
        ));
    }

    #[test]
    fn test_missing_href() {
        assert!(matches!(
            compile("[link]x[/link]"),
            Err(MarkupError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_malformed_attribute() {
        assert!(matches!(
            compile("[button href=x]Go[/button]"),
            Err(MarkupError::MalformedAttributes(_))
        ));
    }
}
