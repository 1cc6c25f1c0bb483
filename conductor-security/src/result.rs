//! ABOUTME: Bottom-up JSON extraction from sandbox stdout/stderr
//! ABOUTME: Scans log lines in reverse for the last structured result blob

use serde_json::Value;

/// Scan `logs` bottom-up for the last line that both starts with `{` and
/// ends with `}` and parses as JSON; return it. If none found, return
/// `{"status": "completed", "raw": <full output>}`.
pub fn extract_result(logs: &str) -> Value {
    for line in logs.lines().rev() {
        let line = line.trim();
        if line.starts_with('{') && line.ends_with('}') {
            if let Ok(value) = serde_json::from_str::<Value>(line) {
                return value;
            }
        }
    }
    serde_json::json!({ "status": "completed", "raw": logs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_last_json_line() {
        let logs = "starting up\n{\"progress\": 1}\n{\"status\": \"ok\", \"count\": 3}\n";
        let result = extract_result(logs);
        assert_eq!(result["status"], "ok");
        assert_eq!(result["count"], 3);
    }

    #[test]
    fn falls_back_to_raw_when_no_json() {
        let logs = "no structured output here\njust text\n";
        let result = extract_result(logs);
        assert_eq!(result["status"], "completed");
        assert_eq!(result["raw"], logs);
    }

    #[test]
    fn ignores_malformed_brace_line() {
        let logs = "{not valid json}\n{\"valid\": true}\n";
        let result = extract_result(logs);
        assert_eq!(result["valid"], true);
    }
}
