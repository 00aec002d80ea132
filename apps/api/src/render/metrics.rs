//! Static glyph-width table for Helvetica, the base-14 font the renderer embeds by name.
//!
//! Widths are in 1/1000 em (the AFM unit). The table covers ASCII 0x20..=0x7E;
//! anything else falls back to the average lowercase width. Helvetica-Bold is
//! approximated by scaling the regular widths.
//! Index = (char as usize) - 32.

const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, // sp ! " # $ % & '
    333, 333, 389, 584, 278, 333, 278, 278, // ( ) * + , - . /
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // : ; < = > ? @
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    278, 278, 278, 469, 556, 333, // [ \ ] ^ _ `
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a-m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n-z
    334, 260, 334, 584, // { | } ~
];

const FALLBACK_WIDTH: u16 = 556;
const BOLD_FACTOR: f32 = 1.06;

fn glyph_width(c: char) -> u16 {
    let code = c as usize;
    if (32..=126).contains(&code) {
        HELVETICA_WIDTHS[code - 32]
    } else {
        FALLBACK_WIDTH
    }
}

/// Rendered width of `text` in points.
pub fn text_width(text: &str, size_pt: f32, bold: bool) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(glyph_width(c))).sum();
    let width = units as f32 * size_pt / 1000.0;
    if bold {
        width * BOLD_FACTOR
    } else {
        width
    }
}

/// Greedy word wrap at `max_width_pt`. A single word wider than the line is
/// broken between characters.
pub fn wrap_text(text: &str, max_width_pt: f32, size_pt: f32, bold: bool) -> Vec<String> {
    let space = text_width(" ", size_pt, bold);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0.0_f32;

    for word in text.split_whitespace() {
        let word_width = text_width(word, size_pt, bold);

        if word_width > max_width_pt {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let mut pieces = break_word(word, max_width_pt, size_pt, bold);
            // The tail of a broken word can share its line with what follows.
            if let Some(last) = pieces.pop() {
                lines.extend(pieces);
                current_width = text_width(&last, size_pt, bold);
                current = last;
            }
            continue;
        }

        if current.is_empty() {
            current.push_str(word);
            current_width = word_width;
        } else if current_width + space + word_width > max_width_pt {
            lines.push(std::mem::replace(&mut current, word.to_string()));
            current_width = word_width;
        } else {
            current.push(' ');
            current.push_str(word);
            current_width += space + word_width;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn break_word(word: &str, max_width_pt: f32, size_pt: f32, bold: bool) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();
    for c in word.chars() {
        let mut candidate = piece.clone();
        candidate.push(c);
        if !piece.is_empty() && text_width(&candidate, size_pt, bold) > max_width_pt {
            pieces.push(std::mem::take(&mut piece));
        }
        piece.push(c);
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}
