//! ABOUTME: Static validation for synthesized agent source: syntax, forbidden ops, import allowlist
//! ABOUTME: Ported from the original generator's `_validate_code`/`_is_approved_import`

use once_cell_like::OnceRegex;
use regex::Regex;

/// Libraries a generated agent body may import. Submodules of an approved
/// root (`googleapiclient.discovery`) are allowed too.
pub const APPROVED_LIBRARIES: &[&str] = &[
    "asyncio", "base_agent", "datetime", "json", "logging", "os", "pathlib", "tempfile", "time",
    "typing", "uuid", "re", "base64", "hashlib", "urllib", "email", "mimetypes", "http",
    "requests", "aiohttp", "tenacity", "schedule", "redis", "boto3", "google.oauth2",
    "googleapiclient", "slack_sdk", "tweepy", "dropbox", "azure.storage", "github", "jira",
    "notion_client", "pandas", "numpy", "sqlalchemy", "pydantic", "shutil", "anthropic",
    "langchain", "langchain_anthropic", "linkedin_api", "salesforce_api", "hubspot", "pipedrive",
    "zoom", "calendly", "dataclasses", "collections", "itertools", "statistics", "math", "csv",
    "html", "xml",
];

const FORBIDDEN_PATTERNS: &[&str] = &[
    r"exec\s*\(",
    r"eval\s*\(",
    r"__import__\s*\(",
    r"subprocess",
    r"os\.system",
    r"globals\s*\(",
    r"locals\s*\(",
    r"compile\s*\(",
    r#"open\s*\([^)]*["']w["']"#,
    r#"open\s*\([^)]*["']a["']"#,
];

const REQUIRED_METHODS: &[&str] = &["__init__", "initialize", "execute", "cleanup"];

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn ok(warnings: Vec<String>) -> Self {
        Self {
            is_valid: true,
            error: None,
            warnings,
        }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
            warnings: vec![],
        }
    }
}

/// Root module of an import path (`foo.bar.baz` -> `foo`).
fn import_root(module: &str) -> &str {
    module.split('.').next().unwrap_or(module)
}

fn is_approved_import(module: &str) -> bool {
    let root = import_root(module);
    APPROVED_LIBRARIES.iter().any(|lib| *lib == root || *lib == module)
}

/// Heuristic "does this parse" check: balanced parens/brackets/braces and at
/// least one non-empty line. A full AST parser is out of scope; this catches
/// the truncation and bracket-mismatch failures the generative path produces.
fn looks_syntactically_complete(code: &str) -> Result<(), String> {
    if code.trim().is_empty() {
        return Err("empty source".to_string());
    }
    let mut stack = Vec::new();
    for ch in code.chars() {
        match ch {
            '(' | '[' | '{' => stack.push(ch),
            ')' => {
                if stack.pop() != Some('(') {
                    return Err("unbalanced parentheses".to_string());
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return Err("unbalanced brackets".to_string());
                }
            }
            '}' => {
                if stack.pop() != Some('{') {
                    return Err("unbalanced braces".to_string());
                }
            }
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err("unterminated block: truncated source".to_string());
    }
    Ok(())
}

fn find_imports(code: &str) -> Vec<String> {
    let import_re = OnceRegex::get(r"^\s*import\s+([\w\.]+)");
    let from_re = OnceRegex::get(r"^\s*from\s+([\w\.]+)\s+import\s");
    let mut modules = Vec::new();
    for line in code.lines() {
        if let Some(caps) = import_re.captures(line) {
            modules.push(caps[1].to_string());
        } else if let Some(caps) = from_re.captures(line) {
            modules.push(caps[1].to_string());
        }
    }
    modules
}

fn has_empty_method_body(code: &str) -> bool {
    let lines: Vec<&str> = code.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if (trimmed.starts_with("def ") || trimmed.starts_with("async def ")) && trimmed.ends_with(':') {
            let indent = line.len() - trimmed.len();
            let body_is_empty = lines[i + 1..]
                .iter()
                .take_while(|l| l.trim().is_empty() || l.len() - l.trim_start().len() > indent)
                .all(|l| l.trim().is_empty());
            if body_is_empty {
                return true;
            }
        }
    }
    false
}

/// Run every §4.2 validation step against a synthesized source artifact.
pub fn validate(code: &str) -> ValidationResult {
    if let Err(reason) = looks_syntactically_complete(code) {
        return ValidationResult::fail(format!("syntax error: {reason}"));
    }

    for pattern in FORBIDDEN_PATTERNS {
        let re = Regex::new(pattern).expect("static pattern is valid regex");
        if re.is_match(code) {
            return ValidationResult::fail(format!("forbidden operation detected: {pattern}"));
        }
    }

    let mut warnings = Vec::new();
    for module in find_imports(code) {
        if !is_approved_import(&module) {
            return ValidationResult::fail(format!("unapproved import: {module}"));
        }
    }

    for method in REQUIRED_METHODS {
        let needle_sync = format!("def {method}");
        let needle_async = format!("async def {method}");
        if !code.contains(&needle_sync) && !code.contains(&needle_async) {
            return ValidationResult::fail(format!("missing required method: {method}"));
        }
    }

    if has_empty_method_body(code) {
        return ValidationResult::fail("required method has an empty body");
    }

    if !code.contains("class ") || !code.contains("SandboxAgent") {
        return ValidationResult::fail("missing class definition or SandboxAgent inheritance");
    }

    ValidationResult::ok(warnings.drain(..).collect())
}

/// Tiny lazy-regex helper so the module doesn't pull in `once_cell` for two
/// patterns; compiles on first use and caches via `std::sync::OnceLock`.
mod once_cell_like {
    use regex::Regex;
    use std::collections::HashMap;
    use std::sync::OnceLock;
    use std::sync::Mutex;

    pub struct OnceRegex;

    impl OnceRegex {
        pub fn get(pattern: &'static str) -> Regex {
            static CACHE: OnceLock<Mutex<HashMap<&'static str, Regex>>> = OnceLock::new();
            let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
            let mut cache = cache.lock().expect("regex cache poisoned");
            cache
                .entry(pattern)
                .or_insert_with(|| Regex::new(pattern).expect("static pattern is valid regex"))
                .clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_forbidden_exec() {
        let code = "class Foo(SandboxAgent):\n    def __init__(self):\n        exec('1+1')\n    def initialize(self):\n        pass\n    def execute(self):\n        pass\n    def cleanup(self):\n        pass\n";
        let result = validate(code);
        assert!(!result.is_valid);
        assert!(result.error.unwrap().contains("forbidden"));
    }

    #[test]
    fn rejects_unapproved_import() {
        let code = "import shutil_evil\nclass Foo(SandboxAgent):\n    def __init__(self):\n        pass\n    def initialize(self):\n        pass\n    def execute(self):\n        pass\n    def cleanup(self):\n        pass\n";
        let result = validate(code);
        assert!(!result.is_valid);
    }

    #[test]
    fn rejects_missing_method() {
        let code = "class Foo(SandboxAgent):\n    def __init__(self):\n        pass\n    def execute(self):\n        pass\n    def cleanup(self):\n        pass\n";
        let result = validate(code);
        assert!(!result.is_valid);
        assert!(result.error.unwrap().contains("initialize"));
    }

    #[test]
    fn rejects_truncated_source() {
        let code = "class Foo(SandboxAgent):\n    def __init__(self):\n        pass\n    def execute(self):\n        items = [1, 2, 3\n";
        let result = validate(code);
        assert!(!result.is_valid);
    }

    #[test]
    fn accepts_well_formed_source() {
        let code = "import asyncio\nclass Foo(SandboxAgent):\n    def __init__(self):\n        pass\n    async def initialize(self):\n        pass\n    async def execute(self):\n        pass\n    async def cleanup(self):\n        pass\n";
        let result = validate(code);
        assert!(result.is_valid, "{:?}", result.error);
    }
}
