use crate::error::Result;
use chrono::{NaiveDate, NaiveTime};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub const DATE_FORMAT: &str = "%m/%d/%Y";
pub const TIME_FORMAT: &str = "%H:%M:%S";

const OPTIONS_HEADER: &str = "[OPTIONS]";

/// Simulation start/end values written into the `[OPTIONS]` section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateTimeOverrides {
    pub start_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_date: Option<NaiveDate>,
    pub end_time: Option<NaiveTime>,
}

impl DateTimeOverrides {
    pub fn is_empty(&self) -> bool {
        self.start_date.is_none()
            && self.start_time.is_none()
            && self.end_date.is_none()
            && self.end_time.is_none()
    }

    /// Option keys and formatted values, in the order they are applied.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = Vec::with_capacity(4);
        if let Some(date) = self.start_date {
            entries.push(("START_DATE", date.format(DATE_FORMAT).to_string()));
        }
        if let Some(time) = self.start_time {
            entries.push(("START_TIME", time.format(TIME_FORMAT).to_string()));
        }
        if let Some(date) = self.end_date {
            entries.push(("END_DATE", date.format(DATE_FORMAT).to_string()));
        }
        if let Some(time) = self.end_time {
            entries.push(("END_TIME", time.format(TIME_FORMAT).to_string()));
        }
        entries
    }

    pub fn display_summary(&self) -> String {
        if self.is_empty() {
            return "none".to_string();
        }
        self.entries()
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Accepts `MM/DD/YYYY` or `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| format!("Invalid date '{}'. Expected MM/DD/YYYY or YYYY-MM-DD.", s))
}

/// Accepts `HH:MM:SS` or `HH:MM` (24-hour).
pub fn parse_time(s: &str) -> std::result::Result<NaiveTime, String> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| format!("Invalid time '{}'. Expected HH:MM:SS or HH:MM.", s))
}

/// Rewrites the date/time keys of the `[OPTIONS]` section in place.
///
/// Returns `false` without touching the file when there is nothing to apply.
/// The file is replaced atomically so a failed write never leaves a truncated
/// input behind.
pub fn apply_date_overrides(inp_file: &Path, overrides: &DateTimeOverrides) -> Result<bool> {
    if overrides.is_empty() {
        return Ok(false);
    }

    let content = fs::read(inp_file)?;
    let patched = patch_options(&content, overrides);

    let dir = match inp_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let permissions = fs::metadata(inp_file)?.permissions();
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(&patched)?;
    temp.flush()?;
    fs::set_permissions(temp.path(), permissions)?;
    temp.persist(inp_file)?;

    tracing::debug!(file = %inp_file.display(), overrides = %overrides.display_summary(), "applied [OPTIONS] overrides");
    Ok(true)
}

/// Byte-level transform behind [`apply_date_overrides`].
///
/// Lines are only decoded to find headers and keys; every line that is not
/// rewritten is copied through unchanged, whatever its encoding.
pub fn patch_options(content: &[u8], overrides: &DateTimeOverrides) -> Vec<u8> {
    let mut lines: Vec<Vec<u8>> = content
        .split_inclusive(|b| *b == b'\n')
        .map(<[u8]>::to_vec)
        .collect();
    let newline: &[u8] = if lines.iter().any(|line| line.ends_with(b"\r\n")) {
        b"\r\n"
    } else {
        b"\n"
    };

    let (start, mut end) = match find_options_section(&lines) {
        Some(bounds) => bounds,
        None => {
            terminate_last_line(&mut lines, newline);
            let mut header = OPTIONS_HEADER.as_bytes().to_vec();
            header.extend_from_slice(newline);
            lines.push(header);
            (lines.len() - 1, lines.len())
        }
    };

    let mut option_lines: HashMap<String, usize> = HashMap::new();
    let mut insert_at = start + 1;
    for (index, line) in lines.iter().enumerate().take(end).skip(start + 1) {
        let text = line_text(line);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        insert_at = index + 1;
        if text.starts_with(';') {
            continue;
        }
        if let Some(key) = text.split_whitespace().next() {
            option_lines.insert(key.to_uppercase(), index);
        }
    }

    for (key, value) in overrides.entries() {
        match option_lines.get(key) {
            Some(&index) => {
                let rewritten =
                    format_option_line(key, &value, Some(lines[index].as_slice()), newline);
                lines[index] = rewritten;
            }
            None => {
                if insert_at == lines.len() {
                    terminate_last_line(&mut lines, newline);
                }
                lines.insert(insert_at, format_option_line(key, &value, None, newline));
                insert_at += 1;
                end += 1;
            }
        }
    }

    debug_assert!(end <= lines.len());
    lines.concat()
}

fn line_text(line: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(line)
}

/// Header line index and the exclusive end of the section body.
fn find_options_section(lines: &[Vec<u8>]) -> Option<(usize, usize)> {
    let start = lines
        .iter()
        .position(|line| line_text(line).trim().eq_ignore_ascii_case(OPTIONS_HEADER))?;

    let end = lines
        .iter()
        .enumerate()
        .skip(start + 1)
        .find(|(_, line)| {
            let text = line_text(line);
            let text = text.trim();
            text.starts_with('[') && text.ends_with(']')
        })
        .map(|(index, _)| index)
        .unwrap_or(lines.len());

    Some((start, end))
}

fn terminate_last_line(lines: &mut [Vec<u8>], newline: &[u8]) {
    if let Some(last) = lines.last_mut() {
        if !last.ends_with(b"\n") {
            last.extend_from_slice(newline);
        }
    }
}

fn format_option_line(key: &str, value: &str, existing: Option<&[u8]>, newline: &[u8]) -> Vec<u8> {
    let mut line = Vec::new();
    match existing {
        None => {
            line.extend_from_slice(format!("{}    {}", key, value).as_bytes());
            line.extend_from_slice(newline);
        }
        Some(existing) => {
            let terminator_len = existing
                .iter()
                .rev()
                .take_while(|b| matches!(**b, b'\r' | b'\n'))
                .count();
            let (body, terminator) = existing.split_at(existing.len() - terminator_len);
            let leading_len = body.iter().take_while(|b| b.is_ascii_whitespace()).count();
            let separator = if body.contains(&b'\t') { "\t" } else { "    " };

            line.extend_from_slice(&body[..leading_len]);
            line.extend_from_slice(format!("{}{}{}", key, separator, value).as_bytes());
            line.extend_from_slice(terminator);
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn patch(content: &str, overrides: &DateTimeOverrides) -> String {
        String::from_utf8(patch_options(content.as_bytes(), overrides)).unwrap()
    }

    const SAMPLE: &str = "[TITLE]\n;;Project Title/Notes\nExample\n\n[OPTIONS]\n;;Option             Value\nFLOW_UNITS           CFS\nSTART_DATE           01/01/2020\nSTART_TIME           00:00:00\nEND_DATE             01/02/2020\nEND_TIME             06:00:00\n\n[JUNCTIONS]\nJ1 100 5\n";

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("03/07/2024").unwrap(), date(2024, 3, 7));
        assert_eq!(parse_date("2024-03-07").unwrap(), date(2024, 3, 7));
        assert!(parse_date("07.03.2024").is_err());
        assert!(parse_date("13/01/2024").is_err());
    }

    #[test]
    fn test_parse_time_formats() {
        assert_eq!(parse_time("06:30:15").unwrap(), time(6, 30, 15));
        assert_eq!(parse_time("18:05").unwrap(), time(18, 5, 0));
        assert!(parse_time("25:00:00").is_err());
    }

    #[test]
    fn test_entries_are_zero_padded() {
        let overrides = DateTimeOverrides {
            start_date: Some(date(2024, 3, 7)),
            start_time: Some(time(6, 5, 9)),
            end_date: None,
            end_time: None,
        };
        assert_eq!(
            overrides.entries(),
            vec![
                ("START_DATE", "03/07/2024".to_string()),
                ("START_TIME", "06:05:09".to_string()),
            ]
        );
    }

    #[test]
    fn test_existing_keys_are_rewritten() {
        let overrides = DateTimeOverrides {
            start_date: Some(date(2024, 3, 7)),
            end_time: Some(time(23, 0, 0)),
            ..Default::default()
        };
        let patched = patch(SAMPLE, &overrides);

        let expected = SAMPLE
            .replace("START_DATE           01/01/2020", "START_DATE    03/07/2024")
            .replace("END_TIME             06:00:00", "END_TIME    23:00:00");
        assert_eq!(patched, expected);
    }

    #[test]
    fn test_other_content_is_untouched() {
        let overrides = DateTimeOverrides {
            start_time: Some(time(1, 2, 3)),
            ..Default::default()
        };
        let patched = patch(SAMPLE, &overrides);

        let original: Vec<&str> = SAMPLE.lines().collect();
        let rewritten: Vec<&str> = patched.lines().collect();
        assert_eq!(original.len(), rewritten.len());
        for (before, after) in original.iter().zip(&rewritten) {
            if before.starts_with("START_TIME") {
                assert_eq!(*after, "START_TIME    01:02:03");
            } else {
                assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn test_missing_keys_are_inserted_at_section_end() {
        let content = "[OPTIONS]\nFLOW_UNITS CFS\n\n[JUNCTIONS]\nJ1 100 5\n";
        let overrides = DateTimeOverrides {
            end_date: Some(date(2021, 12, 31)),
            ..Default::default()
        };
        let patched = patch(content, &overrides);
        assert_eq!(
            patched,
            "[OPTIONS]\nFLOW_UNITS CFS\nEND_DATE    12/31/2021\n\n[JUNCTIONS]\nJ1 100 5\n"
        );
    }

    #[test]
    fn test_missing_section_is_appended() {
        let content = "[TITLE]\nno options here";
        let overrides = DateTimeOverrides {
            start_date: Some(date(2022, 1, 2)),
            start_time: Some(time(0, 0, 0)),
            ..Default::default()
        };
        let patched = patch(content, &overrides);
        assert_eq!(
            patched,
            "[TITLE]\nno options here\n[OPTIONS]\nSTART_DATE    01/02/2022\nSTART_TIME    00:00:00\n"
        );
    }

    #[test]
    fn test_crlf_and_tabs_are_preserved() {
        let content = "[options]\r\n  START_DATE\t01/01/2000\r\nFLOW_UNITS\tCMS\r\n[END]\r\n";
        let overrides = DateTimeOverrides {
            start_date: Some(date(2010, 5, 6)),
            end_time: Some(time(12, 0, 0)),
            ..Default::default()
        };
        let patched = patch(content, &overrides);
        assert_eq!(
            patched,
            "[options]\r\n  START_DATE\t05/06/2010\r\nFLOW_UNITS\tCMS\r\nEND_TIME    12:00:00\r\n[END]\r\n"
        );
    }

    #[test]
    fn test_comment_lines_are_not_keys() {
        let content = "[OPTIONS]\n;START_DATE 01/01/1999\n";
        let overrides = DateTimeOverrides {
            start_date: Some(date(2000, 2, 3)),
            ..Default::default()
        };
        let patched = patch(content, &overrides);
        assert_eq!(
            patched,
            "[OPTIONS]\n;START_DATE 01/01/1999\nSTART_DATE    02/03/2000\n"
        );
    }

    #[test]
    fn test_unterminated_last_line_in_section() {
        let content = "[OPTIONS]\nFLOW_UNITS CFS";
        let overrides = DateTimeOverrides {
            start_time: Some(time(8, 0, 0)),
            ..Default::default()
        };
        let patched = patch(content, &overrides);
        assert_eq!(patched, "[OPTIONS]\nFLOW_UNITS CFS\nSTART_TIME    08:00:00\n");
    }

    #[test]
    fn test_apply_date_overrides_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let inp = temp_dir.path().join("model.inp");
        fs::write(&inp, SAMPLE).unwrap();

        let overrides = DateTimeOverrides {
            end_date: Some(date(2030, 10, 1)),
            ..Default::default()
        };
        assert!(apply_date_overrides(&inp, &overrides).unwrap());

        let content = fs::read_to_string(&inp).unwrap();
        assert!(content.contains("END_DATE    10/01/2030"));
        assert!(content.contains("START_DATE           01/01/2020"));
    }

    #[test]
    fn test_no_overrides_leaves_file_alone() {
        let temp_dir = TempDir::new().unwrap();
        let inp = temp_dir.path().join("model.inp");
        fs::write(&inp, "not even an inp").unwrap();

        assert!(!apply_date_overrides(&inp, &DateTimeOverrides::default()).unwrap());
        assert_eq!(fs::read_to_string(&inp).unwrap(), "not even an inp");
    }

    #[test]
    fn test_non_utf8_bytes_survive_rewrite() {
        let temp_dir = TempDir::new().unwrap();
        let inp = temp_dir.path().join("model.inp");
        fs::write(
            &inp,
            b"[TITLE]\nZ\xfcrich catchment\n[OPTIONS]\n;; d\xe9bit\nSTART_DATE 01/01/2020\n",
        )
        .unwrap();

        let overrides = DateTimeOverrides {
            start_date: Some(date(2024, 5, 1)),
            ..Default::default()
        };
        assert!(apply_date_overrides(&inp, &overrides).unwrap());

        assert_eq!(
            fs::read(&inp).unwrap(),
            b"[TITLE]\nZ\xfcrich catchment\n[OPTIONS]\n;; d\xe9bit\nSTART_DATE    05/01/2024\n".to_vec()
        );
    }
}
