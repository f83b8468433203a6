pub use serde_json::{Map, Value};
use serde::{Serialize, Deserialize};

mod s3_bucket;
pub use s3_bucket::*;
mod access;
pub use access::*;
mod cloudfront;
pub use cloudfront::*;
mod iam;
pub use iam::*;
mod lambda;
pub use lambda::*;

// higher level resources:
mod auto_delete;
pub use auto_delete::*;
mod deployment;
pub use deployment::*;

/// anything that can be rendered as the `Type` + `Properties`
/// of a cloudformation resource.
pub trait CfnResource {
    fn type_string(&self) -> &'static str;
    fn properties(&self) -> Value;
    /// called once per resource right before the template is written.
    /// the error message is wrapped with the resource's logical id by the stack.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// what cloudformation does with the physical resource when it is
/// removed from the stack, or when the stack is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    Destroy,
    #[default]
    Retain,
}

impl RemovalPolicy {
    pub fn as_cfn_str(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "Delete",
            RemovalPolicy::Retain => "Retain",
        }
    }
}

/// { "Ref": logical_id }
pub fn get_ref(logical_id: &str) -> Value {
    let mut map = Map::new();
    map.insert("Ref".to_string(), Value::String(logical_id.to_string()));
    Value::Object(map)
}

/// { "Fn::GetAtt": [logical_id, attribute] }
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    let mut map = Map::new();
    map.insert("Fn::GetAtt".to_string(), Value::Array(vec![
        Value::String(logical_id.to_string()),
        Value::String(attribute.to_string()),
    ]));
    Value::Object(map)
}

/// { "Fn::Sub": template }
pub fn sub(template: &str) -> Value {
    let mut map = Map::new();
    map.insert("Fn::Sub".to_string(), Value::String(template.to_string()));
    Value::Object(map)
}

/// { "Fn::Join": [delimiter, parts] }
pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    let mut map = Map::new();
    map.insert("Fn::Join".to_string(), Value::Array(vec![
        Value::String(delimiter.to_string()),
        Value::Array(parts),
    ]));
    Value::Object(map)
}

/// `{bucket arn}/*`
pub fn bucket_objects_arn(bucket_logical_id: &str) -> Value {
    join("", vec![get_att(bucket_logical_id, "Arn"), Value::String("/*".to_string())])
}

pub(crate) fn string_array<S: AsRef<str>>(items: &[S]) -> Value {
    Value::Array(items.iter().map(|s| Value::String(s.as_ref().to_string())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn intrinsics_render_like_cloudformation_expects() {
        assert_eq!(get_ref("MyBucket"), json!({ "Ref": "MyBucket" }));
        assert_eq!(get_att("MyBucket", "Arn"), json!({ "Fn::GetAtt": ["MyBucket", "Arn"] }));
        assert_eq!(
            bucket_objects_arn("MyBucket"),
            json!({ "Fn::Join": ["", [{ "Fn::GetAtt": ["MyBucket", "Arn"] }, "/*"]] })
        );
    }

    #[test]
    fn removal_policy_maps_to_deletion_policy() {
        assert_eq!(RemovalPolicy::Destroy.as_cfn_str(), "Delete");
        assert_eq!(RemovalPolicy::default().as_cfn_str(), "Retain");
    }
}
