//! Input sanitization for free text that gets embedded in a prompt.
//!
//! Control characters become a single space, markup metacharacters are
//! entity-escaped, and the result never exceeds `MAX_INPUT_CHARS` characters.
//! Escaping happens inside the length budget: an entity that would not fit is
//! dropped whole rather than cut in half.

/// Hard ceiling on sanitized input length, in characters.
pub const MAX_INPUT_CHARS: usize = 50_000;

/// Normalizes raw user text before it is placed into a prompt. Total and pure.
pub fn sanitize_input(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_INPUT_CHARS));
    let mut budget = MAX_INPUT_CHARS;

    for c in input.chars() {
        let piece: &str = match c {
            '<' => "&lt;",
            '>' => "&gt;",
            c if is_control(c) => " ",
            _ => {
                if budget == 0 {
                    break;
                }
                out.push(c);
                budget -= 1;
                continue;
            }
        };
        // Entities and the replacement space are all ASCII: byte length == char length.
        if piece.len() > budget {
            break;
        }
        out.push_str(piece);
        budget -= piece.len();
    }

    out
}

fn is_control(c: char) -> bool {
    matches!(c, '\u{0000}'..='\u{001F}' | '\u{007F}')
}
