//! Minimal single-page PDF renderer for the coaching brief.
//!
//! Writes the PDF object graph directly (catalog, page tree, one page, one
//! Helvetica font, one content stream) with a correct xref table. Layout is
//! deliberately plain: the brief's numbers and text, one line at a time.

const PAGE_WIDTH: f64 = 612.0;
const PAGE_HEIGHT: f64 = 792.0;
const MARGIN: f64 = 54.0;
const LEADING: f64 = 16.0;
const WRAP_COLS: usize = 92;

/// Render a list of text lines into PDF bytes.
pub fn render_pdf(title: &str, lines: &[String]) -> Vec<u8> {
    let mut content = String::new();
    content.push_str("BT\n/F1 16 Tf\n");
    content.push_str(&format!(
        "1 0 0 1 {MARGIN} {} Tm\n({}) Tj\n",
        PAGE_HEIGHT - MARGIN,
        escape_text(title)
    ));
    content.push_str("/F1 10 Tf\n");

    let mut y = PAGE_HEIGHT - MARGIN - 2.0 * LEADING;
    for line in lines.iter().flat_map(|l| wrap_line(l, WRAP_COLS)) {
        if y < MARGIN {
            break;
        }
        content.push_str(&format!(
            "1 0 0 1 {MARGIN} {y} Tm\n({}) Tj\n",
            escape_text(&line)
        ));
        y -= LEADING;
    }
    content.push_str("ET\n");

    let objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ),
    ];

    let mut out: Vec<u8> = Vec::with_capacity(2048);
    out.extend_from_slice(b"%PDF-1.4\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );
    out
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\\' => out.push_str("\\\\"),
            '\n' | '\r' => out.push(' '),
            c if c.is_ascii() => out.push(c),
            // Helvetica WinAnsi fallback for anything exotic
            _ => out.push('?'),
        }
    }
    out
}

fn wrap_line(line: &str, cols: usize) -> Vec<String> {
    if line.len() <= cols {
        return vec![line.to_string()];
    }
    let mut wrapped = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        if !current.is_empty() && current.len() + word.len() + 1 > cols {
            wrapped.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        wrapped.push(current);
    }
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_framing() {
        let pdf = render_pdf("Coaching Brief", &["Session score: 74/100".to_string()]);
        let text = String::from_utf8_lossy(&pdf);
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.trim_end().ends_with("%%EOF"));
        assert!(text.contains("/Type /Catalog"));
        assert!(text.contains("startxref"));
        assert!(text.contains("Session score: 74/100"));
    }

    #[test]
    fn test_xref_offsets_point_at_objects() {
        let pdf = render_pdf("T", &["line".to_string()]);
        let text = String::from_utf8_lossy(&pdf).to_string();
        // Every 10-digit xref entry (except the free head) must point at "N 0 obj"
        let xref_start = text.find("xref\n").unwrap();
        for (i, entry) in text[xref_start..]
            .lines()
            .skip(3)
            .take_while(|l| l.ends_with("n "))
            .enumerate()
        {
            let offset: usize = entry[..10].parse().unwrap();
            let expected = format!("{} 0 obj", i + 1);
            assert!(text[offset..].starts_with(&expected), "bad offset for obj {}", i + 1);
        }
    }

    #[test]
    fn test_parens_are_escaped() {
        let pdf = render_pdf("T", &["watch (out) for \\ these".to_string()]);
        let text = String::from_utf8_lossy(&pdf);
        assert!(text.contains("watch \\(out\\) for \\\\ these"));
    }

    #[test]
    fn test_long_lines_wrap() {
        let long = "word ".repeat(60);
        let wrapped = wrap_line(long.trim(), 92);
        assert!(wrapped.len() > 1);
        assert!(wrapped.iter().all(|l| l.len() <= 92));
    }
}
