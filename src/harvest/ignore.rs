//! Loader for the CSV list of image ids excluded from the local inventory.

use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::model::IgnoreSet;

/// Header label of the identifier column.
pub const IMAGE_ID_COLUMN: &str = "IMAGE ID";

/// Loads the ignore list at `path`.
///
/// Never fails: a missing or empty file, or one without an
/// [`IMAGE_ID_COLUMN`] header, yields an empty set and a log entry.
pub fn load_ignore_set(path: &Path) -> IgnoreSet {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Ignore file not found, no images will be ignored");
            return IgnoreSet::new();
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read ignore file");
            return IgnoreSet::new();
        }
    };

    let set = parse_ignore_list(&content);
    info!(path = %path.display(), count = set.len(), "Loaded ignore list");
    set
}

/// Parses CSV text whose first row names an [`IMAGE_ID_COLUMN`] column.
pub fn parse_ignore_list(content: &str) -> IgnoreSet {
    let mut set = IgnoreSet::new();
    let mut rows = content.lines().enumerate();

    let Some((_, header)) = rows.next() else {
        info!("Ignore file is empty");
        return set;
    };

    let header = split_row(header);
    let Some(column) = header.iter().position(|cell| cell == IMAGE_ID_COLUMN) else {
        error!(?header, "Ignore file has no '{}' column", IMAGE_ID_COLUMN);
        return set;
    };

    for (idx, row) in rows {
        let line = idx + 1;
        if row.trim().is_empty() {
            debug!(line, "Skipping empty row in ignore file");
            continue;
        }

        match split_row(row).get(column) {
            Some(id) if !id.is_empty() => {
                set.insert(id);
            }
            Some(_) => warn!(line, row, "Empty image id in ignore file"),
            None => warn!(line, row, "Ignore file row has too few columns"),
        }
    }

    set
}

/// Splits one CSV row. Commas inside double quotes do not separate cells,
/// and `""` inside quotes is a literal quote.
fn split_row(row: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = row.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);

    cells.into_iter().map(|cell| cell.trim().to_string()).collect()
}
