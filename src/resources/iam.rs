use super::*;

pub const LAMBDA_BASIC_EXECUTION_POLICY: &str = "arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

/// an IAM role assumable by a single AWS service,
/// with an optional inline policy.
#[derive(Debug, Clone)]
pub struct Role {
    pub description: Option<String>,
    pub assumed_by_service: String,
    /// managed policy arns, rendered through Fn::Sub so they
    /// may contain pseudo parameters
    pub managed_policy_arns: Vec<String>,
    pub policy_name: String,
    pub statements: Vec<PolicyStatement>,
}

impl Role {
    pub fn for_lambda(description: &str, policy_name: &str, statements: Vec<PolicyStatement>) -> Self {
        Self {
            description: Some(description.to_string()),
            assumed_by_service: "lambda.amazonaws.com".to_string(),
            managed_policy_arns: vec![LAMBDA_BASIC_EXECUTION_POLICY.to_string()],
            policy_name: policy_name.to_string(),
            statements,
        }
    }

    pub fn assume_role_policy_doc(&self) -> Value {
        let mut principal = Map::new();
        principal.insert("Service".to_string(), Value::String(self.assumed_by_service.clone()));

        let mut statement = Map::new();
        statement.insert("Effect".to_string(), Value::String("Allow".to_string()));
        statement.insert("Principal".to_string(), Value::Object(principal));
        statement.insert("Action".to_string(), Value::String("sts:AssumeRole".to_string()));

        let mut map = Map::new();
        map.insert("Version".to_string(), Value::String("2012-10-17".to_string()));
        map.insert("Statement".to_string(), Value::Array(vec![Value::Object(statement)]));
        Value::Object(map)
    }
}

impl CfnResource for Role {
    fn type_string(&self) -> &'static str {
        "AWS::IAM::Role"
    }

    fn properties(&self) -> Value {
        let mut map = Map::new();
        map.insert("AssumeRolePolicyDocument".to_string(), self.assume_role_policy_doc());
        if let Some(description) = &self.description {
            map.insert("Description".to_string(), Value::String(description.clone()));
        }
        if !self.managed_policy_arns.is_empty() {
            let arns = self.managed_policy_arns.iter().map(|a| sub(a)).collect();
            map.insert("ManagedPolicyArns".to_string(), Value::Array(arns));
        }
        if !self.statements.is_empty() {
            let mut policy = Map::new();
            policy.insert("PolicyName".to_string(), Value::String(self.policy_name.clone()));
            policy.insert("PolicyDocument".to_string(), create_policy_doc(&self.statements));
            map.insert("Policies".to_string(), Value::Array(vec![Value::Object(policy)]));
        }
        Value::Object(map)
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(description) = &self.description {
            if description.len() > 1000 {
                return Err("Role description must be at most 1000 characters".to_string());
            }
        }
        if !self.statements.is_empty() && self.policy_name.is_empty() {
            return Err("Inline role policy must have a name".to_string());
        }
        for statement in self.statements.iter() {
            if statement.principal.is_some() {
                return Err("Identity based policy statements cannot have a principal".to_string());
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
    fn lambda_role_is_assumable_by_lambda() {
        let role = Role::for_lambda("test role", "testpolicy", vec![
            PolicyStatement::allow(&["s3:List*"], vec![get_att("Bucket", "Arn")]),
        ]);
        assert_eq!(role.validate(), Ok(()));
        let props = role.properties();
        assert_eq!(props["AssumeRolePolicyDocument"]["Statement"][0]["Principal"], json!({ "Service": "lambda.amazonaws.com" }));
        assert_eq!(props["Policies"][0]["PolicyName"], "testpolicy");
        assert_eq!(props["ManagedPolicyArns"][0], json!({ "Fn::Sub": LAMBDA_BASIC_EXECUTION_POLICY }));
    }

    #[test]
    fn role_statements_cannot_have_principals() {
        let role = Role::for_lambda("r", "p", vec![grant_public_read("Bucket")]);
        assert!(role.validate().is_err());
    }
}
