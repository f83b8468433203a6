use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::error::{Result, StackError};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";
pub const MANIFEST_VERSION: &str = "1.0.0";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResource {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none", default)]
    pub deletion_policy: Option<String>,
    #[serde(rename = "UpdateReplacePolicy", skip_serializing_if = "Option::is_none", default)]
    pub update_replace_policy: Option<String>,
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty", default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutput {
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(rename = "Value")]
    pub value: Value,
}

/// the cloudformation document. maps are ordered so that synthesizing
/// the same stack twice produces byte-identical templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTemplate {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: String,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, SavedResource>,
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub outputs: BTreeMap<String, ResourceOutput>,
}

impl Default for SavedTemplate {
    fn default() -> Self {
        Self {
            version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: None,
            resources: Default::default(),
            outputs: Default::default(),
        }
    }
}

impl SavedTemplate {
    pub fn resources_of_type<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = (&'a String, &'a SavedResource)> + 'a {
        self.resources.iter().filter(move |(_, r)| r.ty == ty)
    }

    /// we make it pretty so if a user needs to look at the stack in the console, it looks nice
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A stack name can contain only alphanumeric characters (case sensitive) and hyphens.
/// It must start with an alphabetical character and can't be longer than 128 characters.
pub fn validate_stack_name(stack_name: &str) -> Result<String> {
    let err = || StackError::InvalidStackName(stack_name.to_string());
    let mut chars = stack_name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(err()),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(err());
    }
    if stack_name.len() > 128 {
        return Err(err());
    }
    Ok(stack_name.to_string())
}

/// every `Ref`, `Fn::GetAtt` and `Fn::Sub` variable in `value` that points
/// at a logical id. pseudo parameters (AWS::*) are skipped.
pub fn collect_references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(target)) = map.get("Ref") {
                    if !target.starts_with("AWS::") {
                        out.push(target.clone());
                    }
                    return;
                }
                match map.get("Fn::GetAtt") {
                    Some(Value::Array(parts)) => {
                        if let Some(Value::String(target)) = parts.first() {
                            out.push(target.clone());
                        }
                        return;
                    }
                    Some(Value::String(dotted)) => {
                        let target = dotted.split('.').next().unwrap_or(dotted);
                        out.push(target.to_string());
                        return;
                    }
                    _ => {}
                }
                match map.get("Fn::Sub") {
                    Some(Value::String(template)) => {
                        collect_sub_references(template, &[], out);
                        return;
                    }
                    Some(Value::Array(parts)) => {
                        let locals: Vec<String> = match parts.get(1) {
                            Some(Value::Object(vars)) => vars.keys().cloned().collect(),
                            _ => vec![],
                        };
                        if let Some(Value::String(template)) = parts.first() {
                            collect_sub_references(template, &locals, out);
                        }
                        if let Some(vars) = parts.get(1) {
                            collect_references(vars, out);
                        }
                        return;
                    }
                    _ => {}
                }
            }
            for val in map.values() {
                collect_references(val, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        _ => {}
    }
}

fn collect_sub_references(template: &str, locals: &[String], out: &mut Vec<String>) {
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let end = match after.find('}') {
            Some(e) => e,
            None => break,
        };
        let var = &after[..end];
        rest = &after[end + 1..];
        // ${!Literal} is an escaped, literal ${Literal}
        if var.starts_with('!') || var.starts_with("AWS::") {
            continue;
        }
        let target = var.split('.').next().unwrap_or(var);
        if locals.iter().any(|l| l == target) {
            continue;
        }
        out.push(target.to_string());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackArtifact {
    #[serde(rename = "type")]
    pub ty: String,
    pub environment: String,
    pub template_file: String,
    pub assets_file: String,
}

/// describes every stack written to an output directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudManifest {
    pub version: String,
    pub artifacts: BTreeMap<String, StackArtifact>,
}

impl CloudManifest {
    pub fn new() -> Self {
        Self { version: MANIFEST_VERSION.to_string(), artifacts: Default::default() }
    }

    pub fn template_file_name(stack_name: &str) -> String {
        format!("{stack_name}.template.json")
    }

    pub fn assets_file_name(stack_name: &str) -> String {
        format!("{stack_name}.assets.json")
    }

    /// `aws://account/region`, with `unknown-account`/`unknown-region`
    /// standing in for values that get resolved at deploy time.
    pub fn environment_string(account: Option<&str>, region: Option<&str>) -> String {
        format!(
            "aws://{}/{}",
            account.unwrap_or("unknown-account"),
            region.unwrap_or("unknown-region")
        )
    }

    pub fn add_stack(&mut self, stack_name: &str, environment: String) {
        self.artifacts.insert(stack_name.to_string(), StackArtifact {
            ty: "aws:cloudformation:stack".to_string(),
            environment,
            template_file: Self::template_file_name(stack_name),
            assets_file: Self::assets_file_name(stack_name),
        });
    }

    pub fn write(&self, out_dir: &Path) -> Result<PathBuf> {
        let path = out_dir.join("manifest.json");
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

impl Default for CloudManifest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stack_name_rules() {
        assert!(validate_stack_name("ReactCdkStack").is_ok());
        assert!(validate_stack_name("my-site-1").is_ok());
        assert!(validate_stack_name("1site").is_err());
        assert!(validate_stack_name("my_site").is_err());
        assert!(validate_stack_name("").is_err());
        assert!(validate_stack_name(&format!("a{}", "b".repeat(128))).is_err());
    }

    #[test]
    fn collects_all_kinds_of_references() {
        let value = json!({
            "A": { "Ref": "Bucket" },
            "B": { "Ref": "AWS::Region" },
            "C": [{ "Fn::GetAtt": ["Dist", "DomainName"] }, { "Fn::GetAtt": "Role.Arn" }],
            "D": { "Fn::Sub": "arn:${AWS::Partition}:s3:::${Other}/* ${!Literal} ${Handler.Arn}" },
            "E": { "Fn::Sub": ["${Local}-${Remote}", { "Local": { "Ref": "Inner" } }] },
        });
        let mut refs = vec![];
        collect_references(&value, &mut refs);
        refs.sort();
        assert_eq!(refs, vec!["Bucket", "Dist", "Handler", "Inner", "Other", "Remote", "Role"]);
    }

    #[test]
    fn template_omits_empty_sections() {
        let template = SavedTemplate::default();
        let value = serde_json::to_value(&template).unwrap();
        assert_eq!(value, json!({ "AWSTemplateFormatVersion": "2010-09-09", "Resources": {} }));
    }

    #[test]
    fn environment_string_uses_placeholders() {
        assert_eq!(CloudManifest::environment_string(None, Some("us-east-1")), "aws://unknown-account/us-east-1");
    }
}
