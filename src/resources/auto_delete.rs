use super::*;

pub const AUTO_DELETE_HANDLER_RUNTIME: &str = "nodejs18.x";

/// empties the bucket when the custom resource is deleted, so that
/// cloudformation can then delete the bucket itself.
/// buckets that lost the auto delete tag are left alone.
pub const AUTO_DELETE_HANDLER_CODE: &str = r#"const { S3Client, ListObjectVersionsCommand, DeleteObjectsCommand, GetBucketTaggingCommand } = require('@aws-sdk/client-s3');
const response = require('cfn-response');
const s3 = new S3Client({});
const TAG = 'site:auto-delete-objects';

async function isTagged(bucket) {
    const tags = await s3.send(new GetBucketTaggingCommand({ Bucket: bucket }));
    return (tags.TagSet || []).some(t => t.Key === TAG && t.Value === 'true');
}

async function emptyBucket(bucket) {
    let params = { Bucket: bucket };
    while (true) {
        const page = await s3.send(new ListObjectVersionsCommand(params));
        const objects = [...(page.Versions || []), ...(page.DeleteMarkers || [])]
            .map(o => ({ Key: o.Key, VersionId: o.VersionId }));
        if (objects.length > 0) {
            await s3.send(new DeleteObjectsCommand({ Bucket: bucket, Delete: { Objects: objects } }));
        }
        if (!page.IsTruncated) return;
        params = { Bucket: bucket, KeyMarker: page.NextKeyMarker, VersionIdMarker: page.NextVersionIdMarker };
    }
}

exports.handler = async function(event, context) {
    let status = response.SUCCESS;
    const bucket = event.ResourceProperties.BucketName;
    if (event.RequestType === 'Delete') {
        try {
            if (await isTagged(bucket)) {
                await emptyBucket(bucket);
            }
        } catch (err) {
            if (err.name !== 'NoSuchBucket') {
                console.log(err);
                status = response.FAILED;
            }
        }
    }
    await response.send(event, context, status, {}, bucket);
};
"#;

pub const AUTO_DELETE_ACTIONS: &[&str] = &[
    "s3:GetBucket*",
    "s3:List*",
    "s3:DeleteObject*",
];

/// custom resource that empties its bucket on stack deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoDeleteObjects {
    pub handler_logical_id: String,
    pub bucket_logical_id: String,
}

impl CfnResource for AutoDeleteObjects {
    fn type_string(&self) -> &'static str {
        "Custom::S3AutoDeleteObjects"
    }

    fn properties(&self) -> Value {
        let mut map = Map::new();
        map.insert("ServiceToken".to_string(), get_att(&self.handler_logical_id, "Arn"));
        map.insert("BucketName".to_string(), get_ref(&self.bucket_logical_id));
        Value::Object(map)
    }
}

/// the handler role itself has no inline policy. its rights come from
/// a statement in the bucket policy, see `auto_delete_grant`.
pub fn auto_delete_handler_role(bucket_construct_id: &str) -> Role {
    Role::for_lambda(
        &format!("Lambda role for auto-deleting objects in {bucket_construct_id}"),
        "",
        vec![],
    )
}

pub fn auto_delete_grant(role_logical_id: &str, bucket_logical_id: &str) -> PolicyStatement {
    PolicyStatement::allow(
        AUTO_DELETE_ACTIONS,
        vec![get_att(bucket_logical_id, "Arn"), bucket_objects_arn(bucket_logical_id)],
    ).with_principal(&Grantee::Role(role_logical_id.to_string()))
}

pub fn auto_delete_handler_function(role_logical_id: &str, bucket_construct_id: &str) -> InlineFunction {
    let mut function = InlineFunction::new(AUTO_DELETE_HANDLER_RUNTIME, role_logical_id, AUTO_DELETE_HANDLER_CODE);
    function.description = Some(format!("Lambda function for auto-deleting objects in {bucket_construct_id}"));
    function
}
