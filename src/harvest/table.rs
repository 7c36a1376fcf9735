//! Positional-column parser for `crictl images` style tables.
//!
//! Column boundaries are not fixed; they are inferred from where the
//! column labels sit in the header line.

use tracing::{debug, error, info};

use crate::harvest::traits::{HeaderDiagnostic, ParsedTable, TableParser};
use crate::model::{IgnoreSet, ParsedTableRow, UNTAGGED};

/// Parses header-labelled, whitespace-aligned tables.
#[derive(Debug, Clone)]
pub struct ColumnarTextParser {
    tag_label: String,
    id_label: String,
    size_label: String,
}

impl Default for ColumnarTextParser {
    fn default() -> Self {
        Self::new("TAG", "IMAGE ID", "SIZE")
    }
}

/// Character offsets where the tag, id and size columns start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnLayout {
    tag: usize,
    id: usize,
    size: usize,
}

impl ColumnarTextParser {
    pub fn new(
        tag_label: impl Into<String>,
        id_label: impl Into<String>,
        size_label: impl Into<String>,
    ) -> Self {
        Self {
            tag_label: tag_label.into(),
            id_label: id_label.into(),
            size_label: size_label.into(),
        }
    }

    fn layout(&self, header: &str) -> Result<ColumnLayout, HeaderDiagnostic> {
        let locate = |label: &str| {
            header
                .find(label)
                .map(|byte_idx| header[..byte_idx].chars().count())
                .ok_or_else(|| HeaderDiagnostic::MissingLabel {
                    label: label.to_string(),
                    header: header.to_string(),
                })
        };

        let tag = locate(&self.tag_label)?;
        let id = locate(&self.id_label)?;
        let size = locate(&self.size_label)?;

        if !(tag < id && id < size) {
            return Err(HeaderDiagnostic::MisorderedLabels {
                header: header.to_string(),
                offsets: [tag, id, size],
            });
        }

        Ok(ColumnLayout { tag, id, size })
    }
}

/// Slices `line` by character positions, clamping past-the-end indices.
fn slice_chars(line: &str, start: usize, end: Option<usize>) -> &str {
    let byte_at = |pos: usize| {
        line.char_indices()
            .nth(pos)
            .map_or(line.len(), |(idx, _)| idx)
    };
    let from = byte_at(start);
    let to = end.map_or(line.len(), byte_at);
    if from >= to {
        ""
    } else {
        &line[from..to]
    }
}

impl TableParser for ColumnarTextParser {
    fn parse(&self, text: &str, ignore: &IgnoreSet) -> ParsedTable {
        let mut table = ParsedTable::default();

        let mut lines = text
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty());

        let Some(header) = lines.next() else {
            info!("Runtime output is empty");
            return table;
        };
        let mut data = lines.peekable();
        if data.peek().is_none() {
            info!(header, "Runtime output contains only a header");
            return table;
        }

        let layout = match self.layout(header) {
            Ok(layout) => layout,
            Err(diagnostic) => {
                error!(%diagnostic, "Cannot infer table columns");
                table.diagnostic = Some(diagnostic);
                return table;
            }
        };
        debug!(
            tag = layout.tag,
            id = layout.id,
            size = layout.size,
            "Inferred column offsets"
        );

        for line in data {
            let repository = slice_chars(line, 0, Some(layout.tag)).trim();
            let tag = slice_chars(line, layout.tag, Some(layout.id)).trim();
            let image_id = slice_chars(line, layout.id, Some(layout.size)).trim();
            let size = slice_chars(line, layout.size, None).trim();

            let tag = if tag.is_empty() { UNTAGGED } else { tag };

            if ignore.contains(image_id) {
                info!(image_id, repository, tag, "Skipping ignored image");
                table.ignored += 1;
                continue;
            }

            table.rows.push(ParsedTableRow {
                repository: repository.to_string(),
                tag: tag.to_string(),
                image_id: image_id.to_string(),
                size: size.to_string(),
            });
        }

        info!(
            rows = table.rows.len(),
            ignored = table.ignored,
            "Parsed runtime image table"
        );
        table
    }

    fn parser_name(&self) -> &'static str {
        "columnar"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "REPOSITORY   TAG      IMAGE ID     SIZE";

    fn parse(text: &str, ignore: &IgnoreSet) -> ParsedTable {
        ColumnarTextParser::default().parse(text, ignore)
    }

    #[test]
    fn test_parses_single_row() {
        let text = format!("{}\nnginx        latest   abc123       10MB\n", HEADER);
        let table = parse(&text, &IgnoreSet::new());

        assert_eq!(
            table.rows,
            vec![ParsedTableRow {
                repository: "nginx".into(),
                tag: "latest".into(),
                image_id: "abc123".into(),
                size: "10MB".into(),
            }]
        );
        assert!(table.diagnostic.is_none());
    }

    #[test]
    fn test_ignored_row_is_dropped() {
        let text = format!(
            "{}\nnginx        latest   abc123       10MB\nredis        7        def456       30MB",
            HEADER
        );
        let ignore: IgnoreSet = ["abc123"].into_iter().collect();
        let table = parse(&text, &ignore);

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].repository, "redis");
        assert_eq!(table.ignored, 1);
    }

    #[test]
    fn test_missing_size_label_yields_empty() {
        let text = "REPOSITORY   TAG      IMAGE ID\nnginx        latest   abc123";
        let table = parse(text, &IgnoreSet::new());

        assert!(table.rows.is_empty());
        assert!(matches!(
            table.diagnostic,
            Some(HeaderDiagnostic::MissingLabel { ref label, .. }) if label == "SIZE"
        ));
    }

    #[test]
    fn test_misordered_labels_yield_empty() {
        let text = "REPOSITORY   SIZE     IMAGE ID     TAG\nnginx        10MB     abc123       latest";
        let table = parse(text, &IgnoreSet::new());

        assert!(table.rows.is_empty());
        assert!(matches!(
            table.diagnostic,
            Some(HeaderDiagnostic::MisorderedLabels { .. })
        ));
    }

    #[test]
    fn test_header_only_and_empty_input() {
        assert_eq!(parse("", &IgnoreSet::new()), ParsedTable::default());
        assert_eq!(parse("\n\n  \n", &IgnoreSet::new()), ParsedTable::default());
        assert_eq!(parse(HEADER, &IgnoreSet::new()), ParsedTable::default());
    }

    #[test]
    fn test_empty_tag_becomes_untagged() {
        let text = format!("{}\nbusybox               feed42       1MB", HEADER);
        let table = parse(&text, &IgnoreSet::new());

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].tag, UNTAGGED);
        assert_eq!(table.rows[0].image_id, "feed42");
    }

    #[test]
    fn test_short_line_is_clamped() {
        let text = format!("{}\nalpine       3.19", HEADER);
        let table = parse(&text, &IgnoreSet::new());

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].repository, "alpine");
        assert_eq!(table.rows[0].tag, "3.19");
        assert_eq!(table.rows[0].image_id, "");
        assert_eq!(table.rows[0].size, "");
    }

    #[test]
    fn test_blank_lines_between_rows_are_skipped() {
        let text = format!(
            "\n{}\n\nnginx        latest   abc123       10MB\n   \nredis        7        def456       30MB\n",
            HEADER
        );
        let table = parse(&text, &IgnoreSet::new());
        let repos: Vec<_> = table.rows.iter().map(|r| r.repository.as_str()).collect();
        assert_eq!(repos, vec!["nginx", "redis"]);
    }

    #[test]
    fn test_crictl_layout_with_registry_prefix() {
        let text = "\
IMAGE                                     TAG                 IMAGE ID            SIZE
docker.io/library/nginx                   1.25                a8758716bb6aa       70.5MB
registry.k8s.io/pause                     3.9                 e6f1816883972       322kB
";
        let table = parse(text, &IgnoreSet::new());

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].repository, "registry.k8s.io/pause");
        assert_eq!(table.rows[1].tag, "3.9");
        assert_eq!(table.rows[1].image_id, "e6f1816883972");
        assert_eq!(table.rows[1].size, "322kB");
    }

    #[test]
    fn test_custom_labels() {
        let parser = ColumnarTextParser::new("VERSION", "DIGEST", "BYTES");
        let text = "NAME   VERSION   DIGEST   BYTES\napp    1.0       d1       42";
        let table = parser.parse(text, &IgnoreSet::new());

        assert_eq!(table.rows[0].tag, "1.0");
        assert_eq!(table.rows[0].image_id, "d1");
        assert_eq!(table.rows[0].size, "42");
    }

    #[test]
    fn test_slice_chars_handles_multibyte() {
        assert_eq!(slice_chars("héllo", 1, Some(3)), "él");
        assert_eq!(slice_chars("abc", 5, None), "");
        assert_eq!(slice_chars("abc", 1, Some(10)), "bc");
    }
}
