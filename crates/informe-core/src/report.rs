//! Report text layout and PDF encoding.
//!
//! The report is re-encoded to Latin-1 with lossy `?` substitution, wrapped
//! into fixed-width lines of a single 12pt Helvetica block, and paginated
//! onto A4 pages of a self-contained PDF 1.4 document. No markdown parsing,
//! no styling, no file I/O; the caller receives the finished byte buffer.

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const FONT_SIZE: u32 = 12;
const LEADING: u32 = 14;
const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2.0 * MARGIN) / LEADING as f32) as usize;
const WRAP_COLUMNS: usize = 80;

/// Build the download filename for a topic.
///
/// The topic string is interpolated verbatim; callers own any quoting the
/// transport layer needs.
pub fn pdf_filename(topic: &str) -> String {
    format!("informe_{topic}.pdf")
}

/// Encode the report text as a complete PDF document.
///
/// Never fails: characters outside Latin-1 are replaced before layout, and
/// even empty input yields a valid single-page document.
pub fn render_pdf(text: &str) -> Vec<u8> {
    let encoded = encode_latin1(text);
    // wrap_lines yields at least one (possibly empty) line, so every
    // document has at least one page
    let pages: Vec<Vec<u8>> = wrap_lines(&encoded, WRAP_COLUMNS)
        .chunks(LINES_PER_PAGE)
        .map(page_stream)
        .collect();

    assemble_document(&pages)
}

/// Lossy Latin-1 re-encode: every representable character keeps its code
/// point byte, everything else becomes `?`.
fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| {
            let code = c as u32;
            if code <= 0xFF { code as u8 } else { b'?' }
        })
        .collect()
}

/// Split encoded text into display lines wrapped at `width` columns,
/// preferring to break at the last space inside the window.
fn wrap_lines(encoded: &[u8], width: usize) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();

    for raw in encoded.split(|b| *b == b'\n') {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.len() <= width {
            lines.push(raw.to_vec());
            continue;
        }

        let mut rest = raw;
        while rest.len() > width {
            let window = &rest[..width];
            let split = window
                .iter()
                .rposition(|b| *b == b' ')
                .map(|pos| pos + 1)
                .unwrap_or(width);
            lines.push(rest[..split].to_vec());
            rest = &rest[split..];
        }
        lines.push(rest.to_vec());
    }

    lines
}

/// Render one page worth of lines as a PDF content stream.
fn page_stream(lines: &[Vec<u8>]) -> Vec<u8> {
    let start_y = PAGE_HEIGHT - MARGIN - FONT_SIZE as f32;

    let mut stream = Vec::new();
    stream.extend_from_slice(b"BT\n");
    stream.extend_from_slice(format!("/F1 {FONT_SIZE} Tf\n{LEADING} TL\n").as_bytes());
    stream.extend_from_slice(format!("{MARGIN} {start_y} Td\n").as_bytes());

    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            stream.extend_from_slice(b"T*\n");
        }
        stream.push(b'(');
        for byte in line {
            match byte {
                b'(' | b')' | b'\\' => {
                    stream.push(b'\\');
                    stream.push(*byte);
                }
                _ => stream.push(*byte),
            }
        }
        stream.extend_from_slice(b") Tj\n");
    }

    stream.extend_from_slice(b"ET\n");
    stream
}

/// Assemble content streams into the final document: catalog, page tree,
/// one WinAnsi Helvetica font, one page object per stream, xref, trailer.
fn assemble_document(pages: &[Vec<u8>]) -> Vec<u8> {
    let object_count = 3 + 2 * pages.len();
    let mut buffer: Vec<u8> = Vec::new();
    let mut offsets: Vec<usize> = Vec::with_capacity(object_count);

    buffer.extend_from_slice(b"%PDF-1.4\n");

    let write_object = |buffer: &mut Vec<u8>, offsets: &mut Vec<usize>, body: &[u8]| {
        let number = offsets.len() + 1;
        offsets.push(buffer.len());
        buffer.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
        buffer.extend_from_slice(body);
        buffer.extend_from_slice(b"\nendobj\n");
    };

    write_object(
        &mut buffer,
        &mut offsets,
        b"<< /Type /Catalog /Pages 2 0 R >>",
    );

    let kids: Vec<String> = (0..pages.len())
        .map(|index| format!("{} 0 R", 4 + 2 * index))
        .collect();
    write_object(
        &mut buffer,
        &mut offsets,
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages.len()
        )
        .as_bytes(),
    );

    write_object(
        &mut buffer,
        &mut offsets,
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
    );

    for (index, stream) in pages.iter().enumerate() {
        let content_ref = 5 + 2 * index;
        write_object(
            &mut buffer,
            &mut offsets,
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {content_ref} 0 R >>"
            )
            .as_bytes(),
        );

        let mut body = format!("<< /Length {} >>\nstream\n", stream.len()).into_bytes();
        body.extend_from_slice(stream);
        body.extend_from_slice(b"\nendstream");
        write_object(&mut buffer, &mut offsets, &body);
    }

    let xref_offset = buffer.len();
    buffer.extend_from_slice(format!("xref\n0 {}\n", object_count + 1).as_bytes());
    buffer.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        buffer.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    buffer.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            object_count + 1
        )
        .as_bytes(),
    );

    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_a_nonempty_pdf() {
        let bytes = render_pdf("Informe sobre la historia de Roma.");
        assert!(bytes.starts_with(b"%PDF-1.4"));
        assert!(bytes.ends_with(b"%%EOF\n"));
    }

    #[test]
    fn empty_input_still_yields_a_document() {
        let bytes = render_pdf("");
        assert!(bytes.starts_with(b"%PDF-1.4"));
        assert!(!bytes.is_empty());
    }

    #[test]
    fn identical_input_is_deterministic() {
        let text = "Datos clave.\nConclusión final.";
        assert_eq!(render_pdf(text), render_pdf(text));
    }

    #[test]
    fn size_is_monotonic_in_ascii_input_length() {
        let mut previous = 0usize;
        for length in [0usize, 10, 100, 1_000, 10_000] {
            let text = "a".repeat(length);
            let size = render_pdf(&text).len();
            assert!(
                size >= previous,
                "size decreased from {previous} to {size} at length {length}"
            );
            previous = size;
        }
    }

    #[test]
    fn non_latin1_input_is_replaced_not_rejected() {
        let bytes = render_pdf("Informe 🚀 con emojis 🎉 y fin");
        assert!(bytes.starts_with(b"%PDF-1.4"));
        // the emoji must have been substituted inside the content stream
        let body = String::from_utf8_lossy(&bytes);
        assert!(body.contains("? con emojis"));
    }

    #[test]
    fn long_text_spans_multiple_pages() {
        let text = "Una línea con contenido suficiente.\n".repeat(LINES_PER_PAGE * 3);
        let body = String::from_utf8_lossy(&render_pdf(&text)).to_string();
        let page_count = body.matches("/Type /Page ").count();
        assert!(page_count >= 3, "expected >= 3 pages, found {page_count}");
    }

    #[test]
    fn wrapping_prefers_space_boundaries() {
        let encoded = encode_latin1(&format!("{} {}", "a".repeat(70), "b".repeat(30)));
        let lines = wrap_lines(&encoded, 80);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(b" "));
        assert_eq!(lines[1], b"b".repeat(30));
    }

    #[test]
    fn latin1_characters_survive_encoding() {
        let encoded = encode_latin1("año señal");
        assert_eq!(encoded, vec![b'a', 0xF1, b'o', b' ', b's', b'e', 0xF1, b'a', b'l']);
    }

    #[test]
    fn filename_interpolates_topic_verbatim() {
        assert_eq!(pdf_filename("Historia de Roma"), "informe_Historia de Roma.pdf");
        assert_eq!(pdf_filename("x/y"), "informe_x/y.pdf");
    }

    #[test]
    fn parentheses_are_escaped_in_streams() {
        let body = String::from_utf8_lossy(&render_pdf("antes (nota) después")).to_string();
        assert!(body.contains(r"antes \(nota\) despu"));
    }
}
