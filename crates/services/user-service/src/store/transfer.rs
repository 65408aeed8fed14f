//! Tabular export and line-oriented import.
//!
//! The format is deliberately loose: only the name column is quoted and
//! nothing is escaped, so names containing commas do not survive a
//! round trip. Such lines shift the email column and are rejected on import
//! rather than stored with a garbled address.

use domain::{UserRecord, UserRole, CSV_DELIMITER, CSV_HEADER};

/// Outcome of an import run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub imported: usize,
    pub errors: Vec<String>,
}

/// One parsed data line.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
    /// 1-based line number in the input, header included
    pub line: usize,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

/// Render records as header + one line per record.
pub fn export_csv<'a>(users: impl IntoIterator<Item = &'a UserRecord>) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');

    for user in users {
        let last_login = user
            .last_login
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        let fields = [
            user.id.to_string(),
            format!("\"{}\"", user.name),
            user.email.clone(),
            user.role.to_string(),
            user.is_active.to_string(),
            user.created_at.to_rfc3339(),
            last_login,
            user.stats.order_count.to_string(),
            format!("{:.2}", user.stats.total_spent),
        ];
        out.push_str(&fields.join(&CSV_DELIMITER.to_string()));
        out.push('\n');
    }

    out
}

/// Parse import text. The first line is a header and is skipped; blank
/// lines are ignored. Each remaining line yields a row or an error message.
pub fn parse_import(text: &str) -> Vec<Result<ImportRow, String>> {
    text.lines()
        .enumerate()
        .skip(1)
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| parse_line(idx + 1, line))
        .collect()
}

fn parse_line(line_no: usize, line: &str) -> Result<ImportRow, String> {
    let fields: Vec<&str> = line.split(CSV_DELIMITER).collect();
    if fields.len() < 3 {
        return Err(format!("Line {}: expected at least 3 fields", line_no));
    }

    let name = unquote(fields[1]);
    let email = unquote(fields[2]);
    if name.is_empty() || email.is_empty() {
        return Err(format!("Line {}: missing name or email", line_no));
    }
    if !email.contains('@') {
        return Err(format!("Line {}: invalid email '{}'", line_no, email));
    }

    let role = fields
        .get(3)
        .map(|r| unquote(r))
        .filter(|r| !r.is_empty())
        .map(|r| UserRole::from(r.as_str()))
        .unwrap_or_default();

    Ok(ImportRow {
        line: line_no,
        name,
        email,
        role,
    })
}

fn unquote(field: &str) -> String {
    field.replace('"', "").trim().to_string()
}
