// System prompts and tool names used by the Anthropic adapter.
// Task framing and user inputs live in generation/prompts.rs.

/// System prompt for structured (tool-call) generation.
pub const STRUCTURED_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST answer by calling the provided tool exactly once. \
    Do NOT include any text outside the tool call. \
    Do NOT include explanations or apologies.";

/// System prompt for free-text markdown generation.
pub const MARKDOWN_SYSTEM: &str = "You are a careful writing assistant. \
    Respond in plain markdown only. \
    Do NOT wrap the answer in code fences. \
    Do NOT add commentary before or after the document.";

pub const RESUME_TOOL_NAME: &str = "emit_resume";

pub const RESUME_TOOL_DESCRIPTION: &str =
    "Emit the tailored resume as a JSON Resume document.";
