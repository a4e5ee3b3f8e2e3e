//! Pulls the merged descriptor document out of raw evaluator output.
//!
//! The evaluator interleaves log lines with the document. A document starts
//! at the first line opening with an XML prolog (or a bare project root) and
//! ends at the closing root tag; output describing several modules is wrapped
//! in a `<projects>` element and ends at its closing tag instead.

const PROLOG: &str = "<?xml";
const SINGLE_ROOT_OPEN: &str = "<project";
const MULTI_ROOT_OPEN: &str = "<projects>";
const SINGLE_ROOT_CLOSE: &str = "</project>";
const MULTI_ROOT_CLOSE: &str = "</projects>";

pub fn extract_descriptor_xml(output: &[u8]) -> Option<String> {
    let decoded = String::from_utf8_lossy(output).replace('\u{FFFD}', "");

    let mut lines = Vec::new();
    let mut in_xml = false;
    let mut multi_module = false;

    for line in decoded.lines() {
        let trimmed = line.trim();
        if !in_xml && (trimmed.starts_with(PROLOG) || trimmed.starts_with(SINGLE_ROOT_OPEN)) {
            in_xml = true;
        }
        if !in_xml {
            continue;
        }
        if trimmed.starts_with(MULTI_ROOT_OPEN) {
            multi_module = true;
        }
        lines.push(line);

        let closes = if multi_module {
            trimmed.starts_with(MULTI_ROOT_CLOSE)
        } else {
            trimmed.starts_with(SINGLE_ROOT_CLOSE)
        };
        if closes {
            return Some(lines.join("\n"));
        }
    }

    if lines.is_empty() {
        None
    } else {
        // Truncated output: hand back what was seen so parsing reports it.
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_log_lines_around_single_module_document() {
        let output = b"[INFO] Scanning for projects...\n\
[INFO] Effective POMs, after inheritance, interpolation, and profiles are applied:\n\
\n\
<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<project xmlns=\"http://maven.apache.org/POM/4.0.0\">\n\
  <artifactId>demo</artifactId>\n\
</project>\n\
[INFO] BUILD SUCCESS\n";
        let xml = extract_descriptor_xml(output).expect("xml");
        assert!(xml.starts_with("<?xml"));
        assert!(xml.ends_with("</project>"));
        assert!(!xml.contains("BUILD SUCCESS"));
    }

    #[test]
    fn multi_module_output_ends_at_wrapper_close() {
        let output = b"<?xml version=\"1.0\"?>\n\
<projects>\n\
  <project><artifactId>a</artifactId></project>\n\
  <project><artifactId>b</artifactId></project>\n\
</projects>\n\
[INFO] done\n";
        let xml = extract_descriptor_xml(output).expect("xml");
        assert!(xml.contains("<artifactId>b</artifactId>"));
        assert!(xml.ends_with("</projects>"));
    }

    #[test]
    fn drops_invalid_utf8_bytes() {
        let mut output = b"<?xml version=\"1.0\"?>\n<project><name>caf".to_vec();
        output.push(0xff);
        output.extend_from_slice(b"e</name>\n</project>\n");
        let xml = extract_descriptor_xml(&output).expect("xml");
        assert!(xml.contains("<name>cafe</name>"));
    }

    #[test]
    fn output_without_document_yields_none() {
        assert_eq!(extract_descriptor_xml(b"[ERROR] BUILD FAILURE\n"), None);
    }
}
