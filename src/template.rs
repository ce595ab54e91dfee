use std::path::{Path, PathBuf};

/// Delimiter between the plain-text part and the HTML part of a template file.
const HTML_PART_DELIMITER: &str = "---HTML_PART---";
const SUBJECT_PREFIX: &str = "Subject:";

/// A fully rendered multipart email, ready to hand to the delivery gateway.
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub subject: String,
    pub plain: String,
    pub html: String,
}

#[derive(thiserror::Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read template file '{0}'.")]
    Io(String, #[source] std::io::Error),
    #[error("Template '{0}' is malformed: {1}")]
    Malformed(String, String),
}

/// Resolves template references from the schedule table against a directory
/// of template files.
///
/// File format: the first line must be `Subject: ...`; the rest of the file is
/// the plain-text body, followed by `---HTML_PART---` and the HTML body.
/// `{name}` and any extra `{key}` placeholders are substituted in all three
/// sections.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl AsRef<Path>) -> TemplateStore {
        TemplateStore {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn resolve(
        &self,
        template_ref: &str,
        name: &str,
        substitutions: &[(&str, &str)],
    ) -> Result<RenderedEmail, TemplateError> {
        let filepath = self.dir.join(template_ref);
        let content = std::fs::read_to_string(&filepath)
            .map_err(|err| TemplateError::Io(template_ref.to_string(), err))?;

        let email = parse_template(template_ref, &content)?;

        Ok(render(email, name, substitutions))
    }
}

fn parse_template(template_ref: &str, content: &str) -> Result<RenderedEmail, TemplateError> {
    let malformed = |reason: &str| {
        TemplateError::Malformed(template_ref.to_string(), reason.to_string())
    };

    let (first_line, rest) = content
        .split_once('\n')
        .ok_or_else(|| malformed("expected a subject line followed by a body"))?;
    let subject = first_line
        .strip_prefix(SUBJECT_PREFIX)
        .ok_or_else(|| malformed("first line must start with 'Subject:'"))?
        .trim();
    if subject.is_empty() {
        return Err(malformed("subject is empty"));
    }

    let (plain, html) = rest
        .split_once(HTML_PART_DELIMITER)
        .ok_or_else(|| malformed("missing '---HTML_PART---' delimiter"))?;
    let plain = plain.trim();
    let html = html.trim();
    if plain.is_empty() || html.is_empty() {
        return Err(malformed("plain and HTML parts must both be present"));
    }

    Ok(RenderedEmail {
        subject: subject.to_string(),
        plain: plain.to_string(),
        html: html.to_string(),
    })
}

fn render(template: RenderedEmail, name: &str, substitutions: &[(&str, &str)]) -> RenderedEmail {
    let apply = |section: String| {
        let mut section = section.replace("{name}", name);
        for (key, value) in substitutions {
            section = section.replace(&format!("{{{}}}", key), value);
        }
        section
    };

    RenderedEmail {
        subject: apply(template.subject),
        plain: apply(template.plain),
        html: apply(template.html),
    }
}
