use std::path::Path;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use static_site_stack::resources::{BucketAccessControl, ObjectOwnership};
use static_site_stack::{synthesize, SavedTemplate, SiteAccess, StackConfig, StackError, SynthesizedStack};

fn build_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<!doctype html><div id=\"root\"></div>").unwrap();
    std::fs::create_dir_all(dir.path().join("static/js")).unwrap();
    std::fs::write(dir.path().join("static/js/main.js"), "console.log('hi')").unwrap();
    dir
}

fn config(build: &Path, access: SiteAccess) -> StackConfig {
    let mut config = StackConfig { access, ..Default::default() };
    config.deployment.sources = vec![build.to_path_buf()];
    config
}

fn synth(access: SiteAccess) -> SynthesizedStack {
    let build = build_dir();
    synthesize(&config(build.path(), access)).unwrap()
}

fn only_of_type<'a>(template: &'a SavedTemplate, ty: &'a str) -> (&'a String, &'a Value) {
    let found: Vec<_> = template.resources_of_type(ty).collect();
    assert_eq!(found.len(), 1, "expected exactly one {ty}");
    let (id, resource) = found[0];
    (id, &resource.properties)
}

#[test]
fn documented_defaults_synthesize_for_both_access_modes() {
    for access in [SiteAccess::Private, SiteAccess::PublicRead] {
        let stack = synth(access);
        assert_eq!(stack.stack_name, "ReactCdkStack");
        assert_eq!(stack.assets.files.len(), 1);
        assert!(stack.template.to_json_pretty().unwrap().contains("AWSTemplateFormatVersion"));
    }
}

#[test]
fn private_bucket_blocks_everything_and_grants_the_identity() {
    let stack = synth(SiteAccess::Private);
    let (bucket_id, bucket) = only_of_type(&stack.template, "AWS::S3::Bucket");
    assert_eq!(bucket["PublicAccessBlockConfiguration"], json!({
        "BlockPublicAcls": true,
        "BlockPublicPolicy": true,
        "IgnorePublicAcls": true,
        "RestrictPublicBuckets": true,
    }));
    assert!(bucket.get("CorsConfiguration").is_none());

    let (oai_id, oai) = only_of_type(&stack.template, "AWS::CloudFront::CloudFrontOriginAccessIdentity");
    assert_eq!(oai["CloudFrontOriginAccessIdentityConfig"]["Comment"], "Created by JG");

    let (_, policy) = only_of_type(&stack.template, "AWS::S3::BucketPolicy");
    assert_eq!(policy["Bucket"], json!({ "Ref": bucket_id }));
    assert_eq!(
        policy["PolicyDocument"]["Statement"][0]["Principal"],
        json!({ "CanonicalUser": { "Fn::GetAtt": [oai_id, "S3CanonicalUserId"] } })
    );

    let (_, dist) = only_of_type(&stack.template, "AWS::CloudFront::Distribution");
    let origin = &dist["DistributionConfig"]["Origins"][0];
    assert_eq!(origin["DomainName"], json!({ "Fn::GetAtt": [bucket_id, "RegionalDomainName"] }));
    assert_eq!(
        origin["S3OriginConfig"]["OriginAccessIdentity"],
        json!({ "Fn::Join": ["", ["origin-access-identity/cloudfront/", { "Ref": oai_id }]] })
    );
}

#[test]
fn public_bucket_allows_public_policy_and_grants_the_account() {
    let stack = synth(SiteAccess::PublicRead);
    let (_, bucket) = only_of_type(&stack.template, "AWS::S3::Bucket");
    let block = &bucket["PublicAccessBlockConfiguration"];
    assert_eq!(block["BlockPublicAcls"], true);
    assert_eq!(block["BlockPublicPolicy"], false);
    assert_eq!(bucket["CorsConfiguration"]["CorsRules"].as_array().map(|r| r.len()), Some(1));
    assert_eq!(stack.template.resources_of_type("AWS::CloudFront::CloudFrontOriginAccessIdentity").count(), 0);

    let (_, policy) = only_of_type(&stack.template, "AWS::S3::BucketPolicy");
    let statements = policy["PolicyDocument"]["Statement"].as_array().unwrap();
    assert_eq!(
        statements[0]["Principal"],
        json!({ "AWS": { "Fn::Sub": "arn:${AWS::Partition}:iam::${AWS::AccountId}:root" } })
    );
    assert!(statements.iter().any(|s| s["Principal"] == json!({ "AWS": "*" }) && s["Action"] == "s3:GetObject"));

    let (_, dist) = only_of_type(&stack.template, "AWS::CloudFront::Distribution");
    assert_eq!(dist["DistributionConfig"]["Origins"][0]["S3OriginConfig"]["OriginAccessIdentity"], "");
}

#[test]
fn distribution_has_one_default_behavior_that_redirects_to_https() {
    for access in [SiteAccess::Private, SiteAccess::PublicRead] {
        let stack = synth(access);
        let (_, dist) = only_of_type(&stack.template, "AWS::CloudFront::Distribution");
        let config = &dist["DistributionConfig"];
        assert!(config["DefaultCacheBehavior"].is_object());
        assert!(config.get("CacheBehaviors").is_none());
        assert_eq!(config["DefaultCacheBehavior"]["ViewerProtocolPolicy"], "redirect-to-https");
        assert_eq!(config["DefaultCacheBehavior"]["Compress"], true);
        assert_eq!(config["Comment"], "reactapp - Cloudfront Distribution");
        assert_eq!(
            config["DefaultCacheBehavior"]["ForwardedValues"]["Headers"],
            json!(["Access-Control-Request-Headers", "Access-Control-Request-Method"])
        );
    }
}

#[test]
fn deployment_targets_the_declared_bucket_and_distribution() {
    let stack = synth(SiteAccess::Private);
    let (bucket_id, _) = only_of_type(&stack.template, "AWS::S3::Bucket");
    let (dist_id, _) = only_of_type(&stack.template, "AWS::CloudFront::Distribution");
    let (deployment_id, deployment) = only_of_type(&stack.template, "Custom::CDKBucketDeployment");
    assert_eq!(deployment["DestinationBucketName"], json!({ "Ref": bucket_id }));
    assert_eq!(deployment["DistributionId"], json!({ "Ref": dist_id }));
    assert_eq!(deployment["DistributionPaths"], json!(["/*"]));
    assert_eq!(&stack.resources.deployment, deployment_id);

    let object_key = &stack.assets.files.values().next().unwrap().destination.object_key;
    assert_eq!(deployment["SourceObjectKeys"], json!([object_key]));
}

#[test]
fn output_is_the_distribution_domain_name() {
    let stack = synth(SiteAccess::Private);
    let output = &stack.template.outputs["CloudfrontURL"];
    assert_eq!(output.value, json!({ "Fn::GetAtt": [stack.resources.distribution, "DomainName"] }));
}

#[test]
fn auto_delete_empties_the_bucket_before_removal() {
    let stack = synth(SiteAccess::Private);
    let (bucket_id, bucket) = only_of_type(&stack.template, "AWS::S3::Bucket");
    assert_eq!(stack.template.resources[bucket_id].deletion_policy.as_deref(), Some("Delete"));
    assert_eq!(bucket["Tags"][0]["Key"], "site:auto-delete-objects");
    let (custom_id, custom) = only_of_type(&stack.template, "Custom::S3AutoDeleteObjects");
    assert_eq!(custom["BucketName"], json!({ "Ref": bucket_id }));
    assert_eq!(stack.template.resources[custom_id].depends_on, vec![stack.resources.bucket_policy.clone()]);
}

#[test]
fn written_artifacts_reference_each_other() {
    let stack = synth(SiteAccess::Private);
    let out = tempfile::tempdir().unwrap();
    let paths = stack.write_to(out.path()).unwrap();
    assert_eq!(paths.len(), 3);
    let manifest: Value = serde_json::from_str(&std::fs::read_to_string(out.path().join("manifest.json")).unwrap()).unwrap();
    let artifact = &manifest["artifacts"]["ReactCdkStack"];
    assert_eq!(artifact["templateFile"], "ReactCdkStack.template.json");
    assert_eq!(artifact["environment"], "aws://unknown-account/unknown-region");
    let template: SavedTemplate = serde_json::from_str(
        &std::fs::read_to_string(out.path().join("ReactCdkStack.template.json")).unwrap()
    ).unwrap();
    assert_eq!(template, stack.template);
}

#[test]
fn synthesis_is_deterministic() {
    let build = build_dir();
    let config = config(build.path(), SiteAccess::Private);
    let a = synthesize(&config).unwrap().template.to_json_pretty().unwrap();
    let b = synthesize(&config).unwrap().template.to_json_pretty().unwrap();
    assert_eq!(a, b);
}

#[test]
fn invalidation_paths_must_start_with_a_slash() {
    let build = build_dir();
    let mut config = config(build.path(), SiteAccess::Private);
    config.deployment.distribution_paths = vec!["index.html".to_string()];
    assert!(matches!(synthesize(&config), Err(StackError::InvalidProperty { .. })));
}

#[test]
fn colliding_construct_ids_are_rejected() {
    let build = build_dir();
    let mut config = config(build.path(), SiteAccess::Private);
    config.distribution_id = config.bucket_id.clone();
    assert!(matches!(synthesize(&config), Err(StackError::DuplicateId(_))));
}

#[test]
fn bad_lifecycle_ordering_is_rejected() {
    let build = build_dir();
    let mut config = config(build.path(), SiteAccess::Private);
    config.bucket.lifecycle_rules[0].expiration_days = Some(10);
    assert!(matches!(synthesize(&config), Err(StackError::InvalidProperty { .. })));
}

#[test]
fn log_delivery_bucket_gets_object_writer_ownership() {
    let build = build_dir();
    let mut config = config(build.path(), SiteAccess::Private);
    config.bucket.access_control = BucketAccessControl::LogDeliveryWrite;
    let stack = synthesize(&config).unwrap();
    let (_, bucket) = only_of_type(&stack.template, "AWS::S3::Bucket");
    assert_eq!(bucket["AccessControl"], "LogDeliveryWrite");
    assert_eq!(bucket["OwnershipControls"], json!({ "Rules": [{ "ObjectOwnership": "ObjectWriter" }] }));

    config.bucket.object_ownership = Some(ObjectOwnership::BucketOwnerEnforced);
    assert!(matches!(synthesize(&config), Err(StackError::InvalidProperty { .. })));
}

#[test]
fn deployed_objects_are_kept_by_default() {
    let stack = synth(SiteAccess::Private);
    let (_, deployment) = only_of_type(&stack.template, "Custom::CDKBucketDeployment");
    assert_eq!(deployment["RetainOnDelete"], true);
    assert_eq!(deployment["Prune"], true);
}

#[test]
fn invalid_stack_names_are_rejected() {
    let build = build_dir();
    let mut config = config(build.path(), SiteAccess::Private);
    config.stack_name = "react_stack".to_string();
    assert!(matches!(synthesize(&config), Err(StackError::InvalidStackName(_))));
}

#[test]
fn scripts_customize_before_declaring() {
    let build = build_dir();
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("site.rhai");
    std::fs::write(&script, r#"
        fn customize(site) {
            site.set_access("public-read");
            site.set_invalidation_paths(["/index.html"]);
            site
        }
    "#).unwrap();
    let mut config = config(build.path(), SiteAccess::Private);
    config.script = Some(script.to_string_lossy().to_string());
    let stack = static_site_stack::synthesize_with_cache(&config, dir.path()).unwrap();
    assert_eq!(stack.resources.origin_access_identity, None);
    let (_, deployment) = only_of_type(&stack.template, "Custom::CDKBucketDeployment");
    assert_eq!(deployment["DistributionPaths"], json!(["/index.html"]));
}

#[test]
fn failing_scripts_surface_as_script_errors() {
    let build = build_dir();
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("site.rhai");
    std::fs::write(&script, "fn customize(site) { throw \"nope\"; }").unwrap();
    let mut config = config(build.path(), SiteAccess::Private);
    config.script = Some(script.to_string_lossy().to_string());
    assert!(matches!(static_site_stack::synthesize_with_cache(&config, dir.path()), Err(StackError::Script(_))));
}
