//! Decoding of journal JSON entries into log records.
//!
//! `journalctl -o json` prints one object per line. Everything that is not
//! such an object (plain `tail` output, foreign JSON) becomes a raw record;
//! parsing never fails.

use hostctl_core::{LogRecord, ParsedLine, Severity};
use serde_json::{Map, Value};

/// systemd unit type suffixes stripped from `_SYSTEMD_UNIT`.
const UNIT_SUFFIXES: &[&str] = &[
    ".service", ".socket", ".timer", ".scope", ".slice", ".mount", ".path", ".target",
];

/// Decode one complete line.
///
/// `fallback_source` names records whose line carries no source of its own;
/// `now_ms` stamps records without a timestamp.
pub fn parse_line(line: &str, fallback_source: &str, now_ms: u64) -> ParsedLine {
    if let Some(record) = parse_journal_entry(line, fallback_source, now_ms) {
        return ParsedLine::Structured(record);
    }
    ParsedLine::Raw(LogRecord::new(now_ms, line, fallback_source, Severity::INFO))
}

fn parse_journal_entry(line: &str, fallback_source: &str, now_ms: u64) -> Option<LogRecord> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let entry: Map<String, Value> = serde_json::from_str(trimmed).ok()?;
    let message = message_text(entry.get("MESSAGE")?);

    let timestamp = entry
        .get("__REALTIME_TIMESTAMP")
        .and_then(as_u64)
        .map_or(now_ms, |micros| micros / 1000);

    let source = entry
        .get("_SYSTEMD_UNIT")
        .and_then(Value::as_str)
        .map(strip_unit_suffix)
        .or_else(|| entry.get("SYSLOG_IDENTIFIER").and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback_source);

    let severity = match entry.get("PRIORITY") {
        Some(Value::String(s)) => Severity::parse_lossy(s),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|p| u8::try_from(p).ok())
            .and_then(Severity::from_priority)
            .unwrap_or_default(),
        _ => Severity::default(),
    };

    Some(LogRecord::new(timestamp, message, source, severity))
}

/// journald renders non-UTF-8 messages as an array of byte values.
fn message_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let bytes: Vec<u8> = items
                .iter()
                .filter_map(Value::as_u64)
                .filter_map(|b| u8::try_from(b).ok())
                .collect();
            String::from_utf8_lossy(&bytes).into_owned()
        }
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn strip_unit_suffix(unit: &str) -> &str {
    UNIT_SUFFIXES
        .iter()
        .find_map(|suffix| unit.strip_suffix(suffix))
        .unwrap_or(unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000_000;

    #[test]
    fn journal_entry_is_structured() {
        let line = r#"{"__REALTIME_TIMESTAMP":"1704067200123456","MESSAGE":"started","_SYSTEMD_UNIT":"php8.2-fpm.service","PRIORITY":"3"}"#;
        let parsed = parse_line(line, "php-fpm", NOW);
        assert!(parsed.is_structured());
        let record = parsed.into_record();
        assert_eq!(record.timestamp, 1_704_067_200_123);
        assert_eq!(record.message, "started");
        assert_eq!(record.source, "php8.2-fpm");
        assert_eq!(record.severity, Severity::ERROR);
    }

    #[test]
    fn plain_text_is_raw_with_full_line() {
        let parsed = parse_line("2024-01-01T00:00:00Z hello", "nginx", NOW);
        assert!(!parsed.is_structured());
        let record = parsed.into_record();
        assert_eq!(record.message, "2024-01-01T00:00:00Z hello");
        assert_eq!(record.source, "nginx");
        assert_eq!(record.timestamp, NOW);
        assert_eq!(record.severity, Severity::INFO);
    }

    #[test]
    fn json_without_message_is_raw() {
        let line = r#"{"level":"info","msg":"hi"}"#;
        let record = parse_line(line, "app", NOW);
        assert!(!record.is_structured());
        assert_eq!(record.into_record().message, line);
    }

    #[test]
    fn missing_fields_fall_back() {
        let line = r#"{"MESSAGE":"x","SYSLOG_IDENTIFIER":"sshd","PRIORITY":"bogus"}"#;
        let record = parse_line(line, "fallback", NOW).into_record();
        assert_eq!(record.timestamp, NOW);
        assert_eq!(record.source, "sshd");
        assert_eq!(record.severity, Severity::INFO);

        let bare = parse_line(r#"{"MESSAGE":"y"}"#, "fallback", NOW).into_record();
        assert_eq!(bare.source, "fallback");
    }

    #[test]
    fn numeric_priority_and_byte_array_message() {
        let line = r#"{"MESSAGE":[104,105,255],"PRIORITY":4,"_SYSTEMD_UNIT":"backup.timer"}"#;
        let record = parse_line(line, "fallback", NOW).into_record();
        assert_eq!(record.message, "hi\u{FFFD}");
        assert_eq!(record.severity, Severity::WARNING);
        assert_eq!(record.source, "backup");
    }

    #[test]
    fn broken_json_is_raw() {
        let record = parse_line(r#"{"MESSAGE": "unterminated"#, "x", NOW);
        assert!(!record.is_structured());
    }
}
