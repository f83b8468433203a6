use super::*;

/// lets cloudfront read a private bucket without making it public.
#[derive(Debug, Clone)]
pub struct OriginAccessIdentity {
    pub comment: String,
}

impl CfnResource for OriginAccessIdentity {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::CloudFrontOriginAccessIdentity"
    }

    fn properties(&self) -> Value {
        let mut config = Map::new();
        config.insert("Comment".to_string(), Value::String(self.comment.clone()));
        let mut map = Map::new();
        map.insert("CloudFrontOriginAccessIdentityConfig".to_string(), Value::Object(config));
        Value::Object(map)
    }

    fn validate(&self) -> Result<(), String> {
        if self.comment.len() > 128 {
            return Err(format!("Origin access identity comment must be at most 128 characters, found {}", self.comment.len()));
        }
        Ok(())
    }
}

/// who is being granted access to the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grantee {
    /// logical id of an origin access identity in the same stack
    OriginAccessIdentity(String),
    /// root principal of the account. None means the account
    /// the stack gets deployed into.
    AccountRoot(Option<String>),
    /// logical id of an IAM role in the same stack
    Role(String),
    Anyone,
}

impl Grantee {
    pub fn principal(&self) -> Value {
        let mut map = Map::new();
        match self {
            Grantee::OriginAccessIdentity(oai_id) => {
                map.insert("CanonicalUser".to_string(), get_att(oai_id, "S3CanonicalUserId"));
            }
            Grantee::AccountRoot(Some(account)) => {
                map.insert("AWS".to_string(), sub(&format!("arn:${{AWS::Partition}}:iam::{account}:root")));
            }
            Grantee::AccountRoot(None) => {
                map.insert("AWS".to_string(), sub("arn:${AWS::Partition}:iam::${AWS::AccountId}:root"));
            }
            Grantee::Role(role_id) => {
                map.insert("AWS".to_string(), get_att(role_id, "Arn"));
            }
            Grantee::Anyone => {
                map.insert("AWS".to_string(), Value::String("*".to_string()));
            }
        }
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    /// identity based policies (on a role) have no principal.
    pub principal: Option<Value>,
    pub resources: Vec<Value>,
}

impl PolicyStatement {
    pub fn allow<S: AsRef<str>>(actions: &[S], resources: Vec<Value>) -> Self {
        Self {
            effect: Effect::Allow,
            actions: actions.iter().map(|a| a.as_ref().to_string()).collect(),
            principal: None,
            resources,
        }
    }

    pub fn with_principal(mut self, grantee: &Grantee) -> Self {
        self.principal = Some(grantee.principal());
        self
    }

    pub fn to_cfn(&self) -> Value {
        let mut map = Map::new();
        let effect = match self.effect {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        };
        map.insert("Effect".to_string(), Value::String(effect.to_string()));
        if self.actions.len() == 1 {
            map.insert("Action".to_string(), Value::String(self.actions[0].clone()));
        } else {
            map.insert("Action".to_string(), string_array(&self.actions));
        }
        if let Some(principal) = &self.principal {
            map.insert("Principal".to_string(), principal.clone());
        }
        if self.resources.len() == 1 {
            map.insert("Resource".to_string(), self.resources[0].clone());
        } else {
            map.insert("Resource".to_string(), Value::Array(self.resources.clone()));
        }
        Value::Object(map)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.actions.is_empty() {
            return Err("Policy statement must have at least one action".to_string());
        }
        if self.resources.is_empty() {
            return Err("Policy statement must have at least one resource".to_string());
        }
        Ok(())
    }
}

pub const BUCKET_READ_ACTIONS: &[&str] = &["s3:GetObject*", "s3:GetBucket*", "s3:List*"];

/// the statement produced by granting read on a bucket:
/// list/get on the bucket itself and on every object in it.
pub fn grant_read(grantee: &Grantee, bucket_logical_id: &str) -> PolicyStatement {
    PolicyStatement::allow(
        BUCKET_READ_ACTIONS,
        vec![get_att(bucket_logical_id, "Arn"), bucket_objects_arn(bucket_logical_id)],
    ).with_principal(grantee)
}

pub fn grant_public_read(bucket_logical_id: &str) -> PolicyStatement {
    PolicyStatement::allow(&["s3:GetObject"], vec![bucket_objects_arn(bucket_logical_id)])
        .with_principal(&Grantee::Anyone)
}

pub fn create_policy_doc(statements: &[PolicyStatement]) -> Value {
    let mut map = Map::new();
    map.insert("Version".to_string(), Value::String("2012-10-17".to_string()));
    map.insert("Statement".to_string(), Value::Array(statements.iter().map(|s| s.to_cfn()).collect()));
    Value::Object(map)
}

#[derive(Debug, Clone)]
pub struct BucketPolicy {
    pub bucket_logical_id: String,
    pub statements: Vec<PolicyStatement>,
}

impl CfnResource for BucketPolicy {
    fn type_string(&self) -> &'static str {
        "AWS::S3::BucketPolicy"
    }

    fn properties(&self) -> Value {
        let mut map = Map::new();
        map.insert("Bucket".to_string(), get_ref(&self.bucket_logical_id));
        map.insert("PolicyDocument".to_string(), create_policy_doc(&self.statements));
        Value::Object(map)
    }

    fn validate(&self) -> Result<(), String> {
        if self.statements.is_empty() {
            return Err("Bucket policy must contain at least one statement".to_string());
        }
        for statement in self.statements.iter() {
            if statement.principal.is_none() {
                return Err("Bucket policy statements must have a principal".to_string());
            }
            statement.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn oai_read_grant_uses_canonical_user() {
        let statement = grant_read(&Grantee::OriginAccessIdentity("OIA1234".into()), "Bucket");
        let rendered = statement.to_cfn();
        assert_eq!(rendered["Principal"], json!({ "CanonicalUser": { "Fn::GetAtt": ["OIA1234", "S3CanonicalUserId"] } }));
        assert_eq!(rendered["Action"], json!(["s3:GetObject*", "s3:GetBucket*", "s3:List*"]));
        assert_eq!(rendered["Resource"].as_array().map(|r| r.len()), Some(2));
    }

    #[test]
    fn account_root_uses_pseudo_parameters_when_unknown() {
        assert_eq!(
            Grantee::AccountRoot(None).principal(),
            json!({ "AWS": { "Fn::Sub": "arn:${AWS::Partition}:iam::${AWS::AccountId}:root" } })
        );
        assert_eq!(
            Grantee::AccountRoot(Some("123456789012".into())).principal(),
            json!({ "AWS": { "Fn::Sub": "arn:${AWS::Partition}:iam::123456789012:root" } })
        );
    }

    #[test]
    fn bucket_policy_requires_principals() {
        let policy = BucketPolicy {
            bucket_logical_id: "Bucket".into(),
            statements: vec![PolicyStatement::allow(&["s3:GetObject"], vec![bucket_objects_arn("Bucket")])],
        };
        assert!(policy.validate().is_err());
        let policy = BucketPolicy {
            bucket_logical_id: "Bucket".into(),
            statements: vec![grant_public_read("Bucket")],
        };
        assert_eq!(policy.validate(), Ok(()));
        assert_eq!(policy.properties()["Bucket"], json!({ "Ref": "Bucket" }));
    }

    #[test]
    fn empty_oai_comment_is_fine_but_long_one_is_not() {
        assert!(OriginAccessIdentity { comment: String::new() }.validate().is_ok());
        assert!(OriginAccessIdentity { comment: "x".repeat(129) }.validate().is_err());
    }
}
