//! PDF writer on `lopdf`, using the base-14 Helvetica faces with WinAnsiEncoding
//! so no font program has to be embedded.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use super::layout::{paginate, PageGeometry, PageLayout};
use super::{DocumentRenderer, RenderDocument, RenderError};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

const REGULAR_FONT: &str = "F1";
const BOLD_FONT: &str = "F2";

#[derive(Debug, Clone, Default)]
pub struct PdfRenderer {
    geometry: PageGeometry,
}

impl DocumentRenderer for PdfRenderer {
    fn render(&self, document: &RenderDocument) -> Result<Vec<u8>, RenderError> {
        let pages = paginate(document, &self.geometry);

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let regular_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                REGULAR_FONT => regular_id,
                BOLD_FONT => bold_id,
            },
        });

        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
        for page in &pages {
            let page_id = write_page(&mut doc, pages_id, page)?;
            kids.push(page_id.into());
        }

        let page_count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    self.geometry.width.into(),
                    self.geometry.height.into(),
                ],
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(encode_win_ansi(&document.title)),
            "Producer" => Object::string_literal("tailor"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

fn write_page(
    doc: &mut Document,
    pages_id: ObjectId,
    page: &PageLayout,
) -> Result<ObjectId, RenderError> {
    let mut operations = Vec::with_capacity(page.lines.len() * 5);
    for line in &page.lines {
        let font = if line.bold { BOLD_FONT } else { REGULAR_FONT };
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec![font.into(), line.size.into()]));
        operations.push(Operation::new("Td", vec![line.x.into(), line.y.into()]));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(encode_win_ansi(&line.text))],
        ));
        operations.push(Operation::new("ET", vec![]));
    }

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    }))
}

/// Maps text to WinAnsiEncoding bytes. Characters outside the code page become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u8,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '\u{2026}' => 0x85,
            '\u{20ac}' => 0x80,
            '\t' => b' ',
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Block;

    #[test]
    fn test_win_ansi_mapping() {
        assert_eq!(encode_win_ansi("Ab~"), b"Ab~".to_vec());
        assert_eq!(encode_win_ansi("caf\u{e9}"), vec![b'c', b'a', b'f', 0xe9]);
        assert_eq!(encode_win_ansi("\u{2022} \u{2014}"), vec![0x95, b' ', 0x97]);
        assert_eq!(encode_win_ansi("\u{4e2d}"), vec![b'?']);
    }

    #[test]
    fn test_render_produces_loadable_pdf() {
        let document = RenderDocument {
            title: "Resume".into(),
            blocks: vec![
                Block::Title("Ada Lovelace".into()),
                Block::Paragraph("Engineer".into()),
            ],
        };
        let bytes = PdfRenderer::default().render(&document).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));

        let parsed = Document::load_mem(&bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 1);
    }

    #[test]
    fn test_long_document_renders_multiple_pages() {
        let document = RenderDocument {
            title: "Cover Letter".into(),
            blocks: (0..300)
                .map(|i| Block::Paragraph(format!("Paragraph {i} of a very long letter.")))
                .collect(),
        };
        let bytes = PdfRenderer::default().render(&document).unwrap();
        let parsed = Document::load_mem(&bytes).unwrap();
        assert!(parsed.get_pages().len() > 1);
    }
}
