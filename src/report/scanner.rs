use crate::config::ReportConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::iter::FusedIterator;
use std::path::Path;

/// How a report line is tested against the keywords.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Keyword appears anywhere in the trimmed line
    #[default]
    Contains,
    /// Trimmed line starts with the keyword
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLine {
    Message(String),
    /// More matching lines exist past the limit
    Truncated,
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportLine::Message(text) => f.write_str(text),
            ReportLine::Truncated => f.write_str("..."),
        }
    }
}

/// Collected result of a full scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportScan {
    pub messages: Vec<String>,
    pub truncated: bool,
}

impl ReportScan {
    /// Messages followed by the truncation marker, as shown to the user.
    pub fn display_lines(&self) -> Vec<String> {
        let mut lines = self.messages.clone();
        if self.truncated {
            lines.push(ReportLine::Truncated.to_string());
        }
        lines
    }
}

#[derive(Debug, Clone)]
pub struct ReportScanner {
    keywords: Vec<String>,
    max_messages: usize,
    match_mode: MatchMode,
    case_sensitive: bool,
}

impl ReportScanner {
    pub fn new(config: &ReportConfig) -> Self {
        let case_sensitive = config.case_sensitive;
        let keywords = config
            .keywords
            .iter()
            .map(|k| {
                let k = k.trim();
                if case_sensitive {
                    k.to_string()
                } else {
                    k.to_uppercase()
                }
            })
            .filter(|k| !k.is_empty())
            .collect();

        Self {
            keywords,
            max_messages: config.max_messages,
            match_mode: config.match_mode,
            case_sensitive,
        }
    }

    pub fn is_match(&self, line: &str) -> bool {
        let line = line.trim();
        let candidate = if self.case_sensitive {
            std::borrow::Cow::Borrowed(line)
        } else {
            std::borrow::Cow::Owned(line.to_uppercase())
        };

        self.keywords.iter().any(|keyword| match self.match_mode {
            MatchMode::Contains => candidate.contains(keyword.as_str()),
            MatchMode::Prefix => candidate.starts_with(keyword.as_str()),
        })
    }

    /// Lazily yields matching lines from `path`.
    ///
    /// Each call reopens the file, so the sequence can be restarted. A missing
    /// file gives an empty sequence; other I/O failures end the sequence and
    /// are available from [`ReportLines::error`].
    pub fn lines<P: AsRef<Path>>(&self, path: P) -> ReportLines<'_> {
        let (reader, error) = match File::open(path.as_ref()) {
            Ok(file) => (Some(BufReader::new(file)), None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (None, None),
            Err(e) => (None, Some(e)),
        };

        ReportLines {
            scanner: self,
            reader,
            collected: 0,
            done: false,
            error,
            buf: Vec::new(),
        }
    }

    /// Runs [`lines`](Self::lines) to completion.
    pub fn scan<P: AsRef<Path>>(&self, path: P) -> Result<ReportScan> {
        let mut lines = self.lines(path);
        let mut scan = ReportScan::default();

        for line in lines.by_ref() {
            match line {
                ReportLine::Message(text) => scan.messages.push(text),
                ReportLine::Truncated => scan.truncated = true,
            }
        }

        if let Some(error) = lines.take_error() {
            return Err(error.into());
        }

        Ok(scan)
    }
}

pub struct ReportLines<'a> {
    scanner: &'a ReportScanner,
    reader: Option<BufReader<File>>,
    collected: usize,
    done: bool,
    error: Option<io::Error>,
    buf: Vec<u8>,
}

impl ReportLines<'_> {
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }
}

impl Iterator for ReportLines<'_> {
    type Item = ReportLine;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let Some(reader) = self.reader.as_mut() else {
            self.done = true;
            return None;
        };

        loop {
            self.buf.clear();
            match reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.error = Some(e);
                    self.done = true;
                    return None;
                }
            }

            let text = String::from_utf8_lossy(&self.buf);
            let text = text.trim();
            if text.is_empty() || !self.scanner.is_match(text) {
                continue;
            }

            if self.collected >= self.scanner.max_messages {
                self.done = true;
                return Some(ReportLine::Truncated);
            }

            self.collected += 1;
            return Some(ReportLine::Message(text.to_string()));
        }
    }
}

impl FusedIterator for ReportLines<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn default_scanner() -> ReportScanner {
        ReportScanner::new(&ReportConfig::default())
    }

    fn write_report(dir: &TempDir, lines: &[String]) -> std::path::PathBuf {
        let path = dir.path().join("model.rpt");
        fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    #[test]
    fn test_five_matches_among_hundred_lines() {
        let temp_dir = TempDir::new().unwrap();
        let mut lines: Vec<String> = (0..100).map(|i| format!("  Node J{} depth 0.{}", i, i)).collect();
        lines[5] = "  ERROR 200: one or more errors detected".to_string();
        lines[20] = "WARNING 04: minimum elevation drop used for Conduit C1".to_string();
        lines[41] = "ERROR 211: invalid number at line 41".to_string();
        lines[77] = "  WARNING 02: maximum depth increased for Node J7".to_string();
        lines[98] = "ERROR 205: invalid keyword".to_string();
        let path = write_report(&temp_dir, &lines);

        let scan = default_scanner().scan(&path).unwrap();
        assert_eq!(
            scan.messages,
            vec![
                "ERROR 200: one or more errors detected",
                "WARNING 04: minimum elevation drop used for Conduit C1",
                "ERROR 211: invalid number at line 41",
                "WARNING 02: maximum depth increased for Node J7",
                "ERROR 205: invalid keyword",
            ]
        );
        assert!(!scan.truncated);
    }

    #[test]
    fn test_fifteen_matches_are_truncated() {
        let temp_dir = TempDir::new().unwrap();
        let lines: Vec<String> = (1..=15).map(|i| format!("WARNING {}: something", i)).collect();
        let path = write_report(&temp_dir, &lines);

        let collected: Vec<ReportLine> = default_scanner().lines(&path).collect();
        assert_eq!(collected.len(), 11);
        assert_eq!(collected[0], ReportLine::Message("WARNING 1: something".to_string()));
        assert_eq!(collected[9], ReportLine::Message("WARNING 10: something".to_string()));
        assert_eq!(collected[10], ReportLine::Truncated);

        let scan = default_scanner().scan(&path).unwrap();
        assert_eq!(scan.messages.len(), 10);
        assert!(scan.truncated);
        assert_eq!(scan.display_lines().last().map(String::as_str), Some("..."));
    }

    #[test]
    fn test_exactly_ten_matches_are_not_truncated() {
        let temp_dir = TempDir::new().unwrap();
        let lines: Vec<String> = (1..=10).map(|i| format!("ERROR {}", i)).collect();
        let path = write_report(&temp_dir, &lines);

        let scan = default_scanner().scan(&path).unwrap();
        assert_eq!(scan.messages.len(), 10);
        assert!(!scan.truncated);
    }

    #[test]
    fn test_sequence_is_restartable() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_report(&temp_dir, &["ERROR a".to_string()]);
        let scanner = default_scanner();

        let first: Vec<_> = scanner.lines(&path).collect();
        fs::write(&path, "ERROR a\nERROR b\n").unwrap();
        let second: Vec<_> = scanner.lines(&path).collect();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn test_missing_report_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let scanner = default_scanner();
        let path = temp_dir.path().join("absent.rpt");

        assert_eq!(scanner.lines(&path).count(), 0);
        assert!(scanner.scan(&path).unwrap().messages.is_empty());
    }

    #[test]
    fn test_no_matches_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_report(&temp_dir, &["all good".to_string(), "".to_string()]);

        assert!(default_scanner().scan(&path).unwrap().messages.is_empty());
    }

    #[test]
    fn test_matching_is_case_sensitive_by_default() {
        let scanner = default_scanner();
        assert!(scanner.is_match("  ERROR 200"));
        assert!(scanner.is_match("Continuity WARNING issued"));
        assert!(!scanner.is_match("error 200"));
        assert!(!scanner.is_match("Warning: lower case"));
    }

    #[test]
    fn test_prefix_and_case_insensitive_modes() {
        let config = ReportConfig {
            match_mode: MatchMode::Prefix,
            case_sensitive: false,
            ..ReportConfig::default()
        };
        let scanner = ReportScanner::new(&config);

        assert!(scanner.is_match("  warning 04: low slope"));
        assert!(scanner.is_match("Error 200"));
        assert!(!scanner.is_match("Continuity WARNING issued"));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.rpt");
        fs::write(&path, b"ERROR \xff bad byte\r\n").unwrap();

        let scan = default_scanner().scan(&path).unwrap();
        assert_eq!(scan.messages, vec!["ERROR \u{fffd} bad byte"]);
    }

    #[test]
    fn test_custom_limit() {
        let temp_dir = TempDir::new().unwrap();
        let lines: Vec<String> = (1..=4).map(|i| format!("ERROR {}", i)).collect();
        let path = write_report(&temp_dir, &lines);

        let config = ReportConfig {
            max_messages: 2,
            ..ReportConfig::default()
        };
        let scan = ReportScanner::new(&config).scan(&path).unwrap();
        assert_eq!(scan.messages, vec!["ERROR 1", "ERROR 2"]);
        assert!(scan.truncated);
    }
}
