// AI generation pipeline.
// Implements: input sanitization, versioned prompts, the generation state machine,
// streaming cover letters, and the stale-generation sweep.
// All generator calls go through llm_client; nothing here talks to a provider directly.

pub mod cover_letter;
pub mod handlers;
pub mod orchestrator;
pub mod prompts;
pub mod reconcile;
pub mod sanitize;
