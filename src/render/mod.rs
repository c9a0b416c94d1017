//! Plain-text and HTML rendering of an assembled digest.
//!
//! The text body follows the global digest order; the HTML body lists the
//! same papers grouped by category. Both bodies take the tier summary
//! straight from the digest tally.

use std::fmt::Write;

use thiserror::Error;

use crate::config::PresentationConfig;
use crate::digest::Digest;
use crate::models::ScoredPaper;
use crate::query::DateWindow;

/// Subject prefix for every digest mail.
pub const SUBJECT_PREFIX: &str = "Astro-ph Digest";

/// Authors listed per paper in the text body.
const TEXT_AUTHOR_LIMIT: usize = 15;

/// Authors listed per paper in the HTML body.
const HTML_AUTHOR_LIMIT: usize = 6;

/// Abstract length (characters) in the HTML body.
const HTML_ABSTRACT_LIMIT: usize = 400;

const RULE_WIDTH: usize = 60;

/// Label for institution authors when no institution name is set.
const DEFAULT_INSTITUTION_LABEL: &str = "Institution";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to format digest: {0}")]
    Format(#[from] std::fmt::Error),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Mail-ready digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDigest {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Renders digests with a fixed heading.
#[derive(Debug, Clone)]
pub struct Renderer {
    heading: String,

    /// Label printed before institution authors
    institution: String,
}

impl Renderer {
    pub fn new(presentation: &PresentationConfig) -> Self {
        Self {
            heading: presentation.heading.clone(),
            institution: DEFAULT_INSTITUTION_LABEL.to_string(),
        }
    }

    /// Name the institution whose authors are flagged.
    pub fn with_institution(mut self, name: impl Into<String>) -> Self {
        self.institution = name.into();
        self
    }

    pub fn render(&self, digest: &Digest, window: &DateWindow) -> RenderResult<RenderedDigest> {
        Ok(RenderedDigest {
            subject: subject(digest),
            text: self.render_text(digest, window)?,
            html: self.render_html(digest, window)?,
        })
    }

    fn render_text(&self, digest: &Digest, window: &DateWindow) -> RenderResult<String> {
        let mut out = String::new();
        writeln!(out, "{}", self.heading)?;
        writeln!(out, "{}", window.display())?;
        writeln!(out)?;

        if digest.is_empty() {
            writeln!(out, "0 papers found")?;
            return Ok(out);
        }

        writeln!(out, "{}", digest.summary())?;
        if digest.omitted > 0 {
            writeln!(out, "Showing the top {} papers; {} more not shown.", digest.papers.len(), digest.omitted)?;
        }
        writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;

        for scored in &digest.papers {
            let paper = &scored.paper;
            let title = display_title(scored);
            writeln!(out)?;
            writeln!(out, "[{}] (score {})", scored.tier, scored.score)?;
            writeln!(out, "{title}")?;
            writeln!(out, "{}", "-".repeat(title.chars().count().min(80)))?;
            if !scored.priority_authors.is_empty() {
                writeln!(out, "PRIORITY AUTHOR: {}", scored.priority_authors.join(", "))?;
            } else if scored.is_priority_author {
                writeln!(out, "PRIORITY AUTHOR")?;
            }
            if scored.has_institution_author() {
                writeln!(out, "{}: {}", self.institution, scored.institution_authors.join(", "))?;
            }
            let names: Vec<&str> = paper.author_names().collect();
            writeln!(out, "Authors: {}", author_line(&names, TEXT_AUTHOR_LIMIT, Overflow::EtAl))?;
            writeln!(out, "Category: {}", paper.category)?;
            writeln!(out, "Link: {}", paper.url())?;
            writeln!(out)?;
            writeln!(out, "{}", display_abstract(scored))?;
        }

        Ok(out)
    }

    fn render_html(&self, digest: &Digest, window: &DateWindow) -> RenderResult<String> {
        let mut out = String::new();
        writeln!(out, "<html>")?;
        writeln!(out, "<body>")?;
        writeln!(out, "<h1>{}</h1>", escape_html(&self.heading))?;
        writeln!(out, "<p>Papers from {}</p>", escape_html(&window.display()))?;

        if digest.is_empty() {
            writeln!(out, "<p>0 papers found</p>")?;
        } else {
            writeln!(out, "<p><strong>{}</strong></p>", escape_html(&digest.summary()))?;
            if digest.omitted > 0 {
                writeln!(out, "<p>{} more papers not shown.</p>", digest.omitted)?;
            }
            for group in &digest.categories {
                writeln!(out, "<h2>{}</h2>", escape_html(&group.category))?;
                writeln!(out, "<ul>")?;
                for scored in &group.papers {
                    write_html_paper(&mut out, scored, &self.institution)?;
                }
                writeln!(out, "</ul>")?;
            }
        }

        writeln!(out, "</body>")?;
        writeln!(out, "</html>")?;
        Ok(out)
    }
}

fn write_html_paper(out: &mut String, scored: &ScoredPaper, institution: &str) -> std::fmt::Result {
    let paper = &scored.paper;
    let url = escape_html(&paper.url());

    writeln!(out, "<li>")?;
    writeln!(
        out,
        "<p><strong>[{}]</strong> <a href=\"{url}\">{}</a></p>",
        scored.tier,
        escape_html(display_title(scored))
    )?;
    if !scored.priority_authors.is_empty() {
        writeln!(out, "<p><strong>Priority author: {}</strong></p>", escape_html(&scored.priority_authors.join(", ")))?;
    }
    if scored.has_institution_author() {
        writeln!(
            out,
            "<p><strong>{}:</strong> {}</p>",
            escape_html(institution),
            escape_html(&scored.institution_authors.join(", "))
        )?;
    }
    let names: Vec<&str> = paper.author_names().collect();
    writeln!(out, "<p>{}</p>", escape_html(&author_line(&names, HTML_AUTHOR_LIMIT, Overflow::More)))?;
    writeln!(
        out,
        "<p>{} <a href=\"{url}\">[read more]</a></p>",
        escape_html(&shorten(display_abstract(scored), HTML_ABSTRACT_LIMIT))
    )?;
    writeln!(out, "</li>")
}

/// `Astro-ph Digest: <summary>`, or a "no papers" subject for an empty digest.
pub fn subject(digest: &Digest) -> String {
    if digest.is_empty() {
        format!("{SUBJECT_PREFIX}: no papers found")
    } else {
        format!("{SUBJECT_PREFIX}: {}", digest.summary())
    }
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Cut `text` to at most `limit` characters at a word boundary, marking the
/// cut with `...`.
pub fn shorten(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let head: String = text.chars().take(limit).collect();
    let cut = match head.rfind(' ') {
        Some(idx) if idx > 0 => &head[..idx],
        _ => head.as_str(),
    };
    format!("{}...", cut.trim_end())
}

#[derive(Debug, Clone, Copy)]
enum Overflow {
    /// `A, B et al. (20 authors)`
    EtAl,

    /// `A, B + 18 more`
    More,
}

fn author_line(names: &[&str], limit: usize, overflow: Overflow) -> String {
    if names.is_empty() {
        return "Unknown authors".to_string();
    }
    if names.len() <= limit {
        return names.join(", ");
    }
    let shown = names[..limit].join(", ");
    match overflow {
        Overflow::EtAl => format!("{shown} et al. ({} authors)", names.len()),
        Overflow::More => format!("{shown} + {} more", names.len() - limit),
    }
}

fn display_title(scored: &ScoredPaper) -> &str {
    if scored.paper.title.is_empty() {
        "Untitled"
    } else {
        &scored.paper.title
    }
}

fn display_abstract(scored: &ScoredPaper) -> &str {
    if scored.paper.abstract_text.is_empty() {
        "No abstract available."
    } else {
        &scored.paper.abstract_text
    }
}
