use super::*;

/// inline code for a lambda function is limited to 4KB by cloudformation.
pub const MAX_INLINE_CODE_LEN: usize = 4096;

/// a lambda function whose code is embedded in the template (ZipFile).
/// we only use this for the small custom resource handlers the site needs.
#[derive(Debug, Clone)]
pub struct InlineFunction {
    pub description: Option<String>,
    pub runtime: String,
    pub handler: String,
    pub role_logical_id: String,
    pub code: String,
    pub memory_size: u32,
    pub timeout: u32,
}

impl InlineFunction {
    pub fn new(runtime: &str, role_logical_id: &str, code: &str) -> Self {
        Self {
            description: None,
            runtime: runtime.to_string(),
            handler: "index.handler".to_string(),
            role_logical_id: role_logical_id.to_string(),
            code: code.to_string(),
            memory_size: 128,
            timeout: 900,
        }
    }
}

impl CfnResource for InlineFunction {
    fn type_string(&self) -> &'static str {
        "AWS::Lambda::Function"
    }

    fn properties(&self) -> Value {
        let mut code = Map::new();
        code.insert("ZipFile".to_string(), Value::String(self.code.clone()));
        let mut map = Map::new();
        map.insert("Code".to_string(), Value::Object(code));
        if let Some(description) = &self.description {
            map.insert("Description".to_string(), Value::String(description.clone()));
        }
        map.insert("Handler".to_string(), Value::String(self.handler.clone()));
        map.insert("MemorySize".to_string(), Value::from(self.memory_size));
        map.insert("Role".to_string(), get_att(&self.role_logical_id, "Arn"));
        map.insert("Runtime".to_string(), Value::String(self.runtime.clone()));
        map.insert("Timeout".to_string(), Value::from(self.timeout));
        Value::Object(map)
    }

    fn validate(&self) -> Result<(), String> {
        if self.code.len() > MAX_INLINE_CODE_LEN {
            return Err(format!("Inline function code is {} bytes, but at most {MAX_INLINE_CODE_LEN} are allowed", self.code.len()));
        }
        if !(128..=10240).contains(&self.memory_size) {
            return Err(format!("memory_size must be between 128 and 10240 MB, found {}", self.memory_size));
        }
        if !(1..=900).contains(&self.timeout) {
            return Err(format!("timeout must be between 1 and 900 seconds, found {}", self.timeout));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_large_inline_code() {
        let func = InlineFunction::new("python3.12", "Role", &"#".repeat(MAX_INLINE_CODE_LEN + 1));
        assert!(func.validate().unwrap_err().contains("at most"));
    }

    #[test]
    fn role_is_referenced_by_arn() {
        let func = InlineFunction::new("python3.12", "HandlerRole", "def handler(e, c): pass");
        assert_eq!(func.properties()["Role"], serde_json::json!({ "Fn::GetAtt": ["HandlerRole", "Arn"] }));
        assert_eq!(func.validate(), Ok(()));
    }
}
