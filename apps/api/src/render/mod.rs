//! Document rendering: artifact content → block model → laid-out pages → PDF bytes.
//!
//! Rendering is CPU-bound; callers run it on the blocking pool.

pub mod layout;
pub mod metrics;
pub mod pdf;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported content: {0}")]
    Content(String),
}

/// Renders a block document to a binary format.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, document: &RenderDocument) -> Result<Vec<u8>, RenderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Title(String),
    Heading(String),
    Subheading(String),
    Paragraph(String),
    Bullet(String),
}

/// Format-independent document: a title for metadata plus ordered blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderDocument {
    pub title: String,
    pub blocks: Vec<Block>,
}

impl RenderDocument {
    /// Lays out a JSON Resume document. Unknown or empty sections are skipped.
    pub fn from_resume(resume: &Value) -> Result<Self, RenderError> {
        if !resume.is_object() {
            return Err(RenderError::Content(
                "resume content is not a JSON object".to_string(),
            ));
        }

        let mut blocks = Vec::new();
        let name = text_at(resume, "/basics/name").unwrap_or_else(|| "Resume".to_string());
        blocks.push(Block::Title(name));

        if let Some(label) = text_at(resume, "/basics/label") {
            blocks.push(Block::Paragraph(label));
        }
        let location = join_present(
            &[
                text_at(resume, "/basics/location/city"),
                text_at(resume, "/basics/location/region"),
                text_at(resume, "/basics/location/countryCode"),
            ],
            ", ",
        );
        let contact = join_present(
            &[
                text_at(resume, "/basics/email"),
                text_at(resume, "/basics/phone"),
                text_at(resume, "/basics/url"),
                location,
            ],
            "  |  ",
        );
        if let Some(contact) = contact {
            blocks.push(Block::Paragraph(contact));
        }
        if let Some(summary) = text_at(resume, "/basics/summary") {
            blocks.push(Block::Heading("Summary".to_string()));
            blocks.push(Block::Paragraph(summary));
        }

        push_entries(&mut blocks, resume, "work", "Experience", |e| {
            join_present(&[text(e, "position"), text(e, "name")], ", ")
        });
        push_entries(&mut blocks, resume, "volunteer", "Volunteering", |e| {
            join_present(&[text(e, "position"), text(e, "organization")], ", ")
        });
        push_entries(&mut blocks, resume, "education", "Education", |e| {
            let degree = join_present(&[text(e, "studyType"), text(e, "area")], " in ");
            join_present(&[degree, text(e, "institution")], ", ")
        });
        push_entries(&mut blocks, resume, "projects", "Projects", |e| text(e, "name"));
        push_entries(&mut blocks, resume, "awards", "Awards", |e| {
            join_present(&[text(e, "title"), text(e, "awarder")], ", ")
        });
        push_entries(&mut blocks, resume, "certificates", "Certificates", |e| {
            join_present(&[text(e, "name"), text(e, "issuer")], ", ")
        });
        push_entries(&mut blocks, resume, "publications", "Publications", |e| {
            join_present(&[text(e, "name"), text(e, "publisher")], ", ")
        });

        push_keyword_list(&mut blocks, resume, "skills", "Skills", "name");
        push_keyword_list(&mut blocks, resume, "interests", "Interests", "name");
        if let Some(languages) = resume.get("languages").and_then(Value::as_array) {
            let lines: Vec<String> = languages
                .iter()
                .filter_map(|l| join_present(&[text(l, "language"), text(l, "fluency")], ": "))
                .collect();
            if !lines.is_empty() {
                blocks.push(Block::Heading("Languages".to_string()));
                blocks.extend(lines.into_iter().map(Block::Bullet));
            }
        }

        Ok(RenderDocument {
            title: "Resume".to_string(),
            blocks,
        })
    }

    /// Lays out markdown: `#`/`##` headings, `-`/`*` bullets, blank-line paragraphs.
    /// Inline emphasis markers are dropped.
    pub fn from_markdown(title: &str, markdown: &str) -> Self {
        let mut blocks = vec![Block::Title(title.to_string())];
        let mut paragraph: Vec<&str> = Vec::new();

        fn flush(paragraph: &mut Vec<&str>, blocks: &mut Vec<Block>) {
            if !paragraph.is_empty() {
                blocks.push(Block::Paragraph(strip_emphasis(&paragraph.join(" "))));
                paragraph.clear();
            }
        }

        for line in markdown.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                flush(&mut paragraph, &mut blocks);
            } else if let Some(h) = trimmed.strip_prefix("## ") {
                flush(&mut paragraph, &mut blocks);
                blocks.push(Block::Subheading(strip_emphasis(h.trim())));
            } else if let Some(h) = trimmed.strip_prefix("# ") {
                flush(&mut paragraph, &mut blocks);
                blocks.push(Block::Heading(strip_emphasis(h.trim())));
            } else if let Some(item) = trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
            {
                flush(&mut paragraph, &mut blocks);
                blocks.push(Block::Bullet(strip_emphasis(item.trim())));
            } else {
                paragraph.push(trimmed);
            }
        }
        flush(&mut paragraph, &mut blocks);

        RenderDocument {
            title: title.to_string(),
            blocks,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// JSON Resume helpers
// ────────────────────────────────────────────────────────────────────────────

fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn text_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn join_present(parts: &[Option<String>], separator: &str) -> Option<String> {
    let present: Vec<&str> = parts.iter().flatten().map(String::as_str).collect();
    if present.is_empty() {
        None
    } else {
        Some(present.join(separator))
    }
}

fn date_range(entry: &Value) -> Option<String> {
    match (text(entry, "startDate"), text(entry, "endDate")) {
        (Some(start), Some(end)) => Some(format!("{start} - {end}")),
        (Some(start), None) => Some(format!("{start} - present")),
        (None, Some(end)) => Some(end),
        (None, None) => text(entry, "date").or_else(|| text(entry, "releaseDate")),
    }
}

fn push_entries<F>(blocks: &mut Vec<Block>, resume: &Value, key: &str, heading: &str, label: F)
where
    F: Fn(&Value) -> Option<String>,
{
    let Some(entries) = resume.get(key).and_then(Value::as_array) else {
        return;
    };
    if entries.is_empty() {
        return;
    }

    blocks.push(Block::Heading(heading.to_string()));
    for entry in entries {
        let title = join_present(&[label(entry), date_range(entry)], "  ·  ");
        if let Some(title) = title {
            blocks.push(Block::Subheading(title));
        }
        if let Some(body) = text(entry, "summary").or_else(|| text(entry, "description")) {
            blocks.push(Block::Paragraph(body));
        }
        let bullets = entry
            .get("highlights")
            .or_else(|| entry.get("courses"))
            .and_then(Value::as_array);
        for bullet in bullets.into_iter().flatten().filter_map(Value::as_str) {
            blocks.push(Block::Bullet(bullet.trim().to_string()));
        }
    }
}

fn push_keyword_list(
    blocks: &mut Vec<Block>,
    resume: &Value,
    key: &str,
    heading: &str,
    name_key: &str,
) {
    let Some(entries) = resume.get(key).and_then(Value::as_array) else {
        return;
    };
    let lines: Vec<String> = entries
        .iter()
        .filter_map(|entry| {
            let keywords: Vec<&str> = entry
                .get("keywords")
                .and_then(Value::as_array)
                .map(|k| k.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let keywords = (!keywords.is_empty()).then(|| keywords.join(", "));
            join_present(&[text(entry, name_key), keywords], ": ")
        })
        .collect();
    if lines.is_empty() {
        return;
    }
    blocks.push(Block::Heading(heading.to_string()));
    blocks.extend(lines.into_iter().map(Block::Bullet));
}

fn strip_emphasis(text: &str) -> String {
    text.replace("**", "").replace("__", "")
}
