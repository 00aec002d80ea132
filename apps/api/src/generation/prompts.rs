// Prompt templates for the tailoring tasks.
// Any wording change here MUST bump PROMPT_VERSION: every generation record and
// artifact carries it so historical output stays attributable to its template.

use crate::generation::sanitize::sanitize_input;

/// Version stamp for the templates below.
pub const PROMPT_VERSION: &str = "tailor-v1";

pub const DEFAULT_TONE: &str = "professional";
pub const DEFAULT_SENIORITY: &str = "mid";

/// Fixed preamble shared by every task.
const PREAMBLE: &str = "You are a careful career-documents assistant. \
    Use only facts present in the material you are given. \
    Never invent employers, dates, credentials, or metrics.";

const RESUME_TASK: &str = "Task: produce ONE JSON object conforming to JSON Resume v1, \
    tailored to the job description below. \
    Do not include markdown fences or commentary.";

const COVER_LETTER_TASK: &str = "Task: write a concise cover letter in plain Markdown \
    (no code fences), 3-5 paragraphs and under 300 words, \
    referencing the job description and the candidate's experience honestly.";

/// Optional tone/seniority hints supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct PromptOptions<'a> {
    pub tone: Option<&'a str>,
    pub seniority: Option<&'a str>,
}

impl<'a> PromptOptions<'a> {
    fn tone(&self) -> String {
        hint_or(self.tone, DEFAULT_TONE)
    }

    fn seniority(&self) -> String {
        hint_or(self.seniority, DEFAULT_SENIORITY)
    }
}

fn hint_or(hint: Option<&str>, default: &str) -> String {
    match hint.map(sanitize_input) {
        Some(h) if !h.trim().is_empty() => h.trim().to_string(),
        _ => default.to_string(),
    }
}

/// Builds the "tailor resume" instruction. Deterministic for identical inputs.
///
/// The base-resume section is omitted entirely when there is no base resume.
pub fn build_resume_prompt(
    jd_text: &str,
    base_resume_text: Option<&str>,
    options: &PromptOptions<'_>,
) -> String {
    let safe_jd = sanitize_input(jd_text);
    let safe_base = base_resume_text
        .map(sanitize_input)
        .filter(|s| !s.trim().is_empty());

    let mut sections = vec![
        PREAMBLE.to_string(),
        format!("[prompt-version: {PROMPT_VERSION}]"),
        RESUME_TASK.to_string(),
        format!(
            "Tone: {}. Target seniority: {}.",
            options.tone(),
            options.seniority()
        ),
        format!("Job description:\n{safe_jd}"),
    ];
    if let Some(base) = safe_base {
        sections.push(format!(
            "Base resume (use these facts only, do not invent):\n{base}"
        ));
    }
    sections.push("Respond with a single JSON object only.".to_string());

    sections.join("\n\n")
}

/// Builds the "write cover letter" instruction.
///
/// The highlights section is omitted entirely when no highlights are known.
pub fn build_cover_letter_prompt(
    jd_text: &str,
    resume_highlights: Option<&str>,
    options: &PromptOptions<'_>,
) -> String {
    let safe_jd = sanitize_input(jd_text);
    let safe_highlights = resume_highlights
        .map(sanitize_input)
        .filter(|s| !s.trim().is_empty());

    let mut sections = vec![
        PREAMBLE.to_string(),
        format!("[prompt-version: {PROMPT_VERSION}]"),
        COVER_LETTER_TASK.to_string(),
        format!(
            "Tone: {}. Target seniority: {}.",
            options.tone(),
            options.seniority()
        ),
        format!("Job description:\n{safe_jd}"),
    ];
    if let Some(highlights) = safe_highlights {
        sections.push(format!("Candidate highlights:\n{highlights}"));
    }

    sections.join("\n\n")
}
