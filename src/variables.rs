use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, StackError};

/// parse the contents of a .env file. blank lines and `#` comments are skipped,
/// an optional leading `export ` is ignored, and values may be wrapped
/// in single or double quotes.
pub fn parse_dot_env(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, val)) = line.split_once('=') {
            let val = val.trim();
            let val = unquote(val, '"').or_else(|| unquote(val, '\'')).unwrap_or(val);
            map.insert(key.trim().to_string(), val.to_string());
        }
    }
    map
}

fn unquote(val: &str, quote: char) -> Option<&str> {
    if val.len() >= 2 && val.starts_with(quote) && val.ends_with(quote) {
        Some(&val[1..val.len() - 1])
    } else {
        None
    }
}

pub fn load_dot_env(path: &Path) -> Result<HashMap<String, String>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| StackError::Config(format!("Failed to load .env file {:?}: {}", path, e)))?;
    Ok(parse_dot_env(&contents))
}

/// variables from the process environment whose name starts with `prefix`
pub fn process_vars(prefix: &str) -> HashMap<String, String> {
    std::env::vars().filter(|(k, _)| k.starts_with(prefix)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comments_quotes_and_exports() {
        let contents = r#"
# deployment settings
SITE_ACCOUNT=123456789012
export SITE_REGION="eu-west-1"
SITE_STACK_NAME='my-site'
NOT_A_PAIR
"#;
        let vars = parse_dot_env(contents);
        assert_eq!(vars.len(), 3);
        assert_eq!(vars["SITE_ACCOUNT"], "123456789012");
        assert_eq!(vars["SITE_REGION"], "eu-west-1");
        assert_eq!(vars["SITE_STACK_NAME"], "my-site");
    }

    #[test]
    fn value_may_contain_equals() {
        let vars = parse_dot_env("A=b=c");
        assert_eq!(vars["A"], "b=c");
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = load_dot_env(Path::new("/definitely/not/here/.env")).unwrap_err();
        assert!(matches!(err, StackError::Config(_)));
    }
}
