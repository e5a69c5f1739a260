//! Minimal RFC 4180 CSV text codec.
//!
//! Used for source-store sheets, bulk submission files and the per-record
//! result files written by the integration tool. Rules:
//! - fields containing `,`, `"`, CR or LF are quoted; quotes are doubled
//! - records end with `\n` on write; `\n` and `\r\n` are accepted on read
//! - a leading UTF-8 BOM is ignored on read

/// CSV decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CsvError {
    #[error("unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },
    #[error("unexpected character after closing quote on line {line}")]
    TrailingAfterQuote { line: usize },
}

/// Append one encoded field to `buf`.
pub fn write_field(buf: &mut String, field: &str) {
    let needs_quotes = field.contains([',', '"', '\n', '\r']);
    if needs_quotes {
        buf.push('"');
        for ch in field.chars() {
            if ch == '"' {
                buf.push('"');
            }
            buf.push(ch);
        }
        buf.push('"');
    } else {
        buf.push_str(field);
    }
}

/// Append one encoded record (with trailing newline) to `buf`.
pub fn write_record<I, S>(buf: &mut String, fields: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        write_field(buf, field.as_ref());
    }
    buf.push('\n');
}

/// Decode CSV text into records. Blank trailing lines are skipped.
///
/// # Errors
///
/// Returns [`CsvError`] on an unterminated quote or stray text after a
/// closing quote.
pub fn parse(input: &str) -> Result<Vec<Vec<String>>, CsvError> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut chars = input.chars().peekable();
    let mut line = 1usize;
    let mut quote_line = 0usize;
    let mut in_quotes = false;
    let mut after_quote = false;
    let mut record_started = false;

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => {
                    in_quotes = false;
                    after_quote = true;
                }
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' if field.is_empty() && !after_quote => {
                in_quotes = true;
                quote_line = line;
                record_started = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                after_quote = false;
                record_started = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                if record_started || !field.is_empty() {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                after_quote = false;
                record_started = false;
                line += 1;
            }
            _ if after_quote => return Err(CsvError::TrailingAfterQuote { line }),
            _ => {
                field.push(ch);
                record_started = true;
            }
        }
    }

    if in_quotes {
        return Err(CsvError::UnterminatedQuote { line: quote_line });
    }
    if record_started || !field.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}
