//! Page layout: wraps blocks into lines and flows them onto fixed-size pages.
//!
//! Coordinates are PDF user space (points, origin bottom-left).

use super::metrics::wrap_text;
use super::{Block, RenderDocument};

/// Paper size and margins in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl PageGeometry {
    /// A4 with 20mm margins.
    pub const A4: PageGeometry = PageGeometry {
        width: 595.28,
        height: 841.89,
        margin: 56.69,
    };

    fn text_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::A4
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BlockStyle {
    size: f32,
    bold: bool,
    indent: f32,
    space_before: f32,
    space_after: f32,
}

const BULLET_INDENT: f32 = 14.0;
const LINE_HEIGHT: f32 = 1.35;
pub const BULLET_MARKER: &str = "\u{2022}";

const fn block_style(size: f32, bold: bool, indent: f32, before: f32, after: f32) -> BlockStyle {
    BlockStyle {
        size,
        bold,
        indent,
        space_before: before,
        space_after: after,
    }
}

fn style(block: &Block) -> BlockStyle {
    match block {
        Block::Title(_) => block_style(18.0, true, 0.0, 0.0, 6.0),
        Block::Heading(_) => block_style(13.0, true, 0.0, 10.0, 3.0),
        Block::Subheading(_) => block_style(11.0, true, 0.0, 5.0, 1.0),
        Block::Paragraph(_) => block_style(10.5, false, 0.0, 0.0, 5.0),
        Block::Bullet(_) => block_style(10.5, false, BULLET_INDENT, 0.0, 1.5),
    }
}

fn block_text(block: &Block) -> &str {
    match block {
        Block::Title(t)
        | Block::Heading(t)
        | Block::Subheading(t)
        | Block::Paragraph(t)
        | Block::Bullet(t) => t,
    }
}

/// One line of text at a fixed position.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub bold: bool,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub lines: Vec<PlacedLine>,
}

/// Flows every block onto as many pages as needed. Always returns at least one page.
pub fn paginate(document: &RenderDocument, geometry: &PageGeometry) -> Vec<PageLayout> {
    let top = geometry.height - geometry.margin;
    let bottom = geometry.margin;
    let mut pages = Vec::new();
    let mut page = PageLayout::default();
    let mut cursor = top;

    for block in &document.blocks {
        let style = style(block);
        let width = geometry.text_width() - style.indent;
        let lines = wrap_text(block_text(block), width, style.size, style.bold);
        if lines.is_empty() {
            continue;
        }
        let leading = style.size * LINE_HEIGHT;

        // Space above a block is dropped at the top of a page.
        if cursor < top {
            cursor -= style.space_before;
        }

        for (i, line) in lines.into_iter().enumerate() {
            if cursor - leading < bottom {
                pages.push(std::mem::take(&mut page));
                cursor = top;
            }
            cursor -= leading;

            if matches!(block, Block::Bullet(_)) && i == 0 {
                page.lines.push(PlacedLine {
                    x: geometry.margin + 4.0,
                    y: cursor,
                    size: style.size,
                    bold: false,
                    text: BULLET_MARKER.to_string(),
                });
            }
            page.lines.push(PlacedLine {
                x: geometry.margin + style.indent,
                y: cursor,
                size: style.size,
                bold: style.bold,
                text: line,
            });
        }
        cursor -= style.space_after;
    }

    pages.push(page);
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(blocks: Vec<Block>) -> RenderDocument {
        RenderDocument {
            title: "t".into(),
            blocks,
        }
    }

    #[test]
    fn test_short_document_fits_one_page() {
        let pages = paginate(
            &doc(vec![
                Block::Title("Ada".into()),
                Block::Paragraph("Hello there.".into()),
            ]),
            &PageGeometry::A4,
        );
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].lines.len(), 2);
        assert!(pages[0].lines[0].y > pages[0].lines[1].y);
    }

    #[test]
    fn test_long_document_paginates_within_margins() {
        let blocks = (0..200)
            .map(|i| Block::Bullet(format!("Bullet number {i} with some words")))
            .collect();
        let geometry = PageGeometry::A4;
        let pages = paginate(&doc(blocks), &geometry);

        assert!(pages.len() > 1);
        for page in &pages {
            for line in &page.lines {
                assert!(line.y >= geometry.margin);
                assert!(line.y <= geometry.height - geometry.margin);
            }
        }
        let texts = pages
            .iter()
            .flat_map(|p| &p.lines)
            .filter(|l| l.text != BULLET_MARKER)
            .count();
        assert_eq!(texts, 200);
    }

    #[test]
    fn test_empty_document_has_one_blank_page() {
        let pages = paginate(&doc(vec![]), &PageGeometry::A4);
        assert_eq!(pages, vec![PageLayout::default()]);
    }

    #[test]
    fn test_bullets_get_a_marker_on_first_line_only() {
        let long = "word ".repeat(60);
        let pages = paginate(&doc(vec![Block::Bullet(long)]), &PageGeometry::A4);
        let markers = pages[0].lines.iter().filter(|l| l.text == BULLET_MARKER).count();
        assert_eq!(markers, 1);
        assert!(pages[0].lines.len() > 2);
    }
}
