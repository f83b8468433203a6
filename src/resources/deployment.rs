use std::path::PathBuf;

use serde::Deserialize;

use super::*;

/// the bucket that staged asset archives get uploaded to before deployment.
/// one per account and region, named after both.
pub const DEFAULT_ASSET_BUCKET: &str = "site-assets-${AWS::AccountId}-${AWS::Region}";

pub const DEPLOYMENT_HANDLER_RUNTIME: &str = "python3.12";

/// unpacks every source archive into the destination bucket, removes stale objects,
/// then invalidates the distribution and waits for the invalidation.
pub const DEPLOYMENT_HANDLER_CODE: &str = r#"import io, mimetypes, time, zipfile
import boto3, cfnresponse

s3 = boto3.client('s3')
cloudfront = boto3.client('cloudfront')

def keys_under(bucket, prefix):
    for page in s3.get_paginator('list_objects_v2').paginate(Bucket=bucket, Prefix=prefix):
        for obj in page.get('Contents', []):
            yield obj['Key']

def delete_keys(bucket, keys):
    keys = [{'Key': k} for k in keys]
    for i in range(0, len(keys), 1000):
        s3.delete_objects(Bucket=bucket, Delete={'Objects': keys[i:i + 1000]})

def extract(source_bucket, source_key, dest, prefix):
    body = s3.get_object(Bucket=source_bucket, Key=source_key)['Body'].read()
    written = set()
    with zipfile.ZipFile(io.BytesIO(body)) as archive:
        for name in archive.namelist():
            if name.endswith('/'):
                continue
            key = prefix + name
            content_type = mimetypes.guess_type(name)[0] or 'application/octet-stream'
            s3.put_object(Bucket=dest, Key=key, Body=archive.read(name), ContentType=content_type)
            written.add(key)
    return written

def invalidate(distribution_id, paths):
    res = cloudfront.create_invalidation(DistributionId=distribution_id, InvalidationBatch={
        'Paths': {'Quantity': len(paths), 'Items': paths},
        'CallerReference': str(time.time()),
    })
    cloudfront.get_waiter('invalidation_completed').wait(
        DistributionId=distribution_id, Id=res['Invalidation']['Id'])

def handler(event, context):
    physical_id = event.get('PhysicalResourceId', context.log_stream_name)
    try:
        props = event['ResourceProperties']
        dest = props['DestinationBucketName']
        prefix = props.get('DestinationBucketKeyPrefix', '')
        if event['RequestType'] == 'Delete':
            if str(props.get('RetainOnDelete', 'true')).lower() == 'false':
                delete_keys(dest, list(keys_under(dest, prefix)))
        else:
            written = set()
            for bucket, key in zip(props['SourceBucketNames'], props['SourceObjectKeys']):
                written |= extract(bucket, key, dest, prefix)
            if str(props.get('Prune', 'true')).lower() == 'true':
                delete_keys(dest, [k for k in keys_under(dest, prefix) if k not in written])
            paths = props.get('DistributionPaths', [])
            if props.get('DistributionId') and paths:
                invalidate(props['DistributionId'], paths)
        cfnresponse.send(event, context, cfnresponse.SUCCESS, {}, physical_id)
    except Exception as e:
        print(e)
        cfnresponse.send(event, context, cfnresponse.FAILED, {'Error': str(e)}, physical_id)
"#;

/// what gets uploaded into the site bucket, and which cached paths
/// get invalidated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeploymentProps {
    /// local directories of build output
    pub sources: Vec<PathBuf>,
    pub distribution_paths: Vec<String>,
    /// delete objects in the destination that are not part of the sources
    pub prune: bool,
    /// keep the deployed objects when the deployment resource is removed
    pub retain_on_delete: bool,
    pub destination_key_prefix: Option<String>,
    /// memory of the handler function, in MB
    pub memory_limit: u32,
    /// overrides DEFAULT_ASSET_BUCKET
    pub asset_bucket: Option<String>,
}

impl Default for DeploymentProps {
    fn default() -> Self {
        Self {
            sources: vec![PathBuf::from("../my-react-app/build")],
            distribution_paths: vec!["/*".to_string()],
            prune: true,
            retain_on_delete: true,
            destination_key_prefix: None,
            memory_limit: 128,
            asset_bucket: None,
        }
    }
}

impl DeploymentProps {
    pub fn asset_bucket_name(&self) -> &str {
        self.asset_bucket.as_deref().unwrap_or(DEFAULT_ASSET_BUCKET)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketDeployment {
    pub handler_logical_id: String,
    /// name (or Fn::Sub pattern) of the bucket holding the staged archives
    pub source_bucket: String,
    pub source_object_keys: Vec<String>,
    pub destination_bucket_logical_id: String,
    pub destination_key_prefix: Option<String>,
    pub prune: bool,
    pub retain_on_delete: bool,
    pub distribution_logical_id: Option<String>,
    pub distribution_paths: Vec<String>,
}

impl BucketDeployment {
    pub fn new(
        props: &DeploymentProps,
        handler_logical_id: &str,
        source_object_keys: Vec<String>,
        destination_bucket_logical_id: &str,
        distribution_logical_id: Option<&str>,
    ) -> Self {
        Self {
            handler_logical_id: handler_logical_id.to_string(),
            source_bucket: props.asset_bucket_name().to_string(),
            source_object_keys,
            destination_bucket_logical_id: destination_bucket_logical_id.to_string(),
            destination_key_prefix: props.destination_key_prefix.clone(),
            prune: props.prune,
            retain_on_delete: props.retain_on_delete,
            distribution_logical_id: distribution_logical_id.map(|d| d.to_string()),
            distribution_paths: props.distribution_paths.clone(),
        }
    }
}

impl CfnResource for BucketDeployment {
    fn type_string(&self) -> &'static str {
        "Custom::CDKBucketDeployment"
    }

    fn properties(&self) -> Value {
        let mut map = Map::new();
        map.insert("ServiceToken".to_string(), get_att(&self.handler_logical_id, "Arn"));
        let source_buckets = self.source_object_keys.iter().map(|_| sub(&self.source_bucket)).collect();
        map.insert("SourceBucketNames".to_string(), Value::Array(source_buckets));
        map.insert("SourceObjectKeys".to_string(), string_array(&self.source_object_keys));
        map.insert("DestinationBucketName".to_string(), get_ref(&self.destination_bucket_logical_id));
        if let Some(prefix) = &self.destination_key_prefix {
            map.insert("DestinationBucketKeyPrefix".to_string(), Value::String(prefix.clone()));
        }
        map.insert("Prune".to_string(), Value::Bool(self.prune));
        map.insert("RetainOnDelete".to_string(), Value::Bool(self.retain_on_delete));
        if let Some(distribution) = &self.distribution_logical_id {
            map.insert("DistributionId".to_string(), get_ref(distribution));
            if !self.distribution_paths.is_empty() {
                map.insert("DistributionPaths".to_string(), string_array(&self.distribution_paths));
            }
        }
        Value::Object(map)
    }

    fn validate(&self) -> Result<(), String> {
        if self.source_object_keys.is_empty() {
            return Err("Bucket deployment must have at least one source".to_string());
        }
        if !self.distribution_paths.is_empty() && self.distribution_logical_id.is_none() {
            return Err("Distribution paths cannot be set without a distribution".to_string());
        }
        for path in self.distribution_paths.iter() {
            if !path.starts_with('/') {
                return Err(format!("Distribution path {:?} must start with '/'", path));
            }
        }
        if let Some(prefix) = &self.destination_key_prefix {
            if prefix.starts_with('/') {
                return Err(format!("Destination key prefix {:?} must not start with '/'", prefix));
            }
        }
        Ok(())
    }
}

pub const DEPLOYMENT_DESTINATION_ACTIONS: &[&str] = &[
    "s3:GetObject*", "s3:GetBucket*", "s3:List*", "s3:DeleteObject*", "s3:PutObject*", "s3:Abort*",
];

/// permissions of the deployment handler: read the staged archives and
/// invalidate distributions. the handler is shared by every site in the
/// stack, so each destination bucket grants write access in its own
/// bucket policy, see `deployment_grant`.
pub fn deployment_handler_role(source_bucket: &str) -> Role {
    let source_arn = format!("arn:${{AWS::Partition}}:s3:::{source_bucket}");
    let statements = vec![
        PolicyStatement::allow(
            &["s3:GetObject*", "s3:GetBucket*", "s3:List*"],
            vec![sub(&source_arn), sub(&format!("{source_arn}/*"))],
        ),
        PolicyStatement::allow(
            &["cloudfront:CreateInvalidation", "cloudfront:GetInvalidation"],
            vec![Value::String("*".to_string())],
        ),
    ];
    Role::for_lambda("Role for the site bucket deployment handler", "site-bucket-deployment", statements)
}

pub fn deployment_grant(role_logical_id: &str, bucket_logical_id: &str) -> PolicyStatement {
    PolicyStatement::allow(
        DEPLOYMENT_DESTINATION_ACTIONS,
        vec![get_att(bucket_logical_id, "Arn"), bucket_objects_arn(bucket_logical_id)],
    ).with_principal(&Grantee::Role(role_logical_id.to_string()))
}

pub fn deployment_handler_function(role_logical_id: &str, memory_limit: u32) -> InlineFunction {
    let mut function = InlineFunction::new(DEPLOYMENT_HANDLER_RUNTIME, role_logical_id, DEPLOYMENT_HANDLER_CODE);
    function.description = Some("Uploads site assets and invalidates the distribution".to_string());
    function.memory_size = memory_limit;
    function
}
