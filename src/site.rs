//! The static site stack: a bucket holding the build output, a cloudfront
//! distribution in front of it, and a deployment that uploads the build
//! and invalidates the cache.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::assets::{stage_directory, AssetManifest};
use crate::config::{SiteAccess, StackConfig};
use crate::error::Result;
use crate::resources::{
    auto_delete_grant, auto_delete_handler_function, auto_delete_handler_role, deployment_grant,
    deployment_handler_function, deployment_handler_role, get_att, grant_public_read, grant_read,
    AutoDeleteObjects, BucketDeployment, BucketPolicy, Grantee, OriginAccessIdentity, RemovalPolicy,
    S3OriginSource, WebDistribution,
};
use crate::scripting::{run_script, DEFAULT_SCRIPT_CACHE_DIR};
use crate::stack::{ResourceOptions, Stack};
use crate::template::{CloudManifest, SavedTemplate};

pub const AUTO_DELETE_PROVIDER: &str = "Custom::S3AutoDeleteObjectsCustomResourceProvider";
pub const DEPLOYMENT_PROVIDER: &str = "Custom::CDKBucketDeployment";

/// logical ids of everything the site declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteResources {
    pub bucket: String,
    pub origin_access_identity: Option<String>,
    pub bucket_policy: String,
    pub auto_delete: Option<String>,
    pub distribution: String,
    pub deployment: String,
    pub output: String,
}

pub struct StaticSite;

impl StaticSite {
    /// declare the site into `stack`. the asset directories are staged
    /// (fingerprinted) here, so they have to exist.
    pub fn declare(stack: &mut Stack, config: &StackConfig) -> Result<SiteResources> {
        let bucket_path = config.bucket_id.as_str();
        let mut bucket = config.bucket.clone();
        config.access.apply_to(&mut bucket);
        let bucket_auto_delete = bucket.auto_delete_objects;
        let bucket_id = stack.add_with(
            bucket_path,
            bucket,
            ResourceOptions::removal_policy(config.bucket.removal_policy),
        )?;

        let (grantee, oai_id) = match config.access {
            SiteAccess::Private => {
                let oai_id = stack.add(&config.oai_id, OriginAccessIdentity {
                    comment: config.oai_comment.clone(),
                })?;
                (Grantee::OriginAccessIdentity(oai_id.clone()), Some(oai_id))
            }
            SiteAccess::PublicRead => (Grantee::AccountRoot(stack.env().account.clone()), None),
        };
        debug!(access = config.access.as_str(), ?grantee, "granting read on site bucket");

        let mut statements = vec![grant_read(&grantee, &bucket_id)];
        if config.access == SiteAccess::PublicRead {
            statements.push(grant_public_read(&bucket_id));
        }
        let auto_delete_role = if bucket_auto_delete {
            let role_path = format!("{AUTO_DELETE_PROVIDER}/Role");
            let role_id = if stack.contains(&role_path) {
                stack.logical_id(&role_path)
            } else {
                stack.add(&role_path, auto_delete_handler_role(bucket_path))?
            };
            statements.push(auto_delete_grant(&role_id, &bucket_id));
            Some(role_id)
        } else {
            None
        };
        // sites in one stack share a deployment handler per memory size and asset bucket
        let mut provider_path = format!("{DEPLOYMENT_PROVIDER}/MemoryLimit{}", config.deployment.memory_limit);
        if let Some(asset_bucket) = &config.deployment.asset_bucket {
            provider_path = format!("{provider_path}/{asset_bucket}");
        }
        let deployment_role_path = format!("{provider_path}/Role");
        let deployment_role = if stack.contains(&deployment_role_path) {
            stack.logical_id(&deployment_role_path)
        } else {
            stack.add(&deployment_role_path, deployment_handler_role(config.deployment.asset_bucket_name()))?
        };
        statements.push(deployment_grant(&deployment_role, &bucket_id));

        let policy_id = stack.add(&format!("{bucket_path}/Policy"), BucketPolicy {
            bucket_logical_id: bucket_id.clone(),
            statements,
        })?;

        let auto_delete = match auto_delete_role {
            Some(role_id) => {
                let handler_path = format!("{AUTO_DELETE_PROVIDER}/Handler");
                let handler_id = if stack.contains(&handler_path) {
                    stack.logical_id(&handler_path)
                } else {
                    stack.add_with(
                        &handler_path,
                        auto_delete_handler_function(&role_id, bucket_path),
                        ResourceOptions::depends_on(&[role_id.as_str()]),
                    )?
                };
                let id = stack.add_with(
                    &format!("{bucket_path}/AutoDeleteObjectsCustomResource"),
                    AutoDeleteObjects { handler_logical_id: handler_id, bucket_logical_id: bucket_id.clone() },
                    ResourceOptions {
                        removal_policy: Some(RemovalPolicy::Destroy),
                        depends_on: vec![policy_id.clone()],
                    },
                )?;
                Some(id)
            }
            None => None,
        };

        let distribution = WebDistribution::new(config.distribution.clone(), S3OriginSource {
            bucket_logical_id: bucket_id.clone(),
            origin_access_identity: oai_id.clone(),
            origin_path: None,
        });
        let distribution_id = stack.add(&config.distribution_id, distribution)?;

        let mut object_keys = vec![];
        for source in config.deployment.sources.iter() {
            let asset = stage_directory(source)?;
            object_keys.push(asset.object_key.clone());
            stack.add_asset(asset);
        }
        let handler_path = format!("{provider_path}/Handler");
        let handler_id = if stack.contains(&handler_path) {
            stack.logical_id(&handler_path)
        } else {
            stack.add_with(
                &handler_path,
                deployment_handler_function(&deployment_role, config.deployment.memory_limit),
                ResourceOptions::depends_on(&[deployment_role.as_str()]),
            )?
        };
        let deployment = BucketDeployment::new(
            &config.deployment,
            &handler_id,
            object_keys,
            &bucket_id,
            Some(distribution_id.as_str()),
        );
        let mut deployment_deps = vec![policy_id.clone()];
        if let Some(id) = &auto_delete {
            deployment_deps.push(id.clone());
        }
        let deployment_id = stack.add_with(
            &format!("{}/CustomResource", config.deployment_id),
            deployment,
            ResourceOptions { removal_policy: None, depends_on: deployment_deps },
        )?;

        let output = stack.add_output(
            &config.output_id,
            Some("Domain name of the site distribution"),
            get_att(&distribution_id, "DomainName"),
        )?;

        Ok(SiteResources {
            bucket: bucket_id,
            origin_access_identity: oai_id,
            bucket_policy: policy_id,
            auto_delete,
            distribution: distribution_id,
            deployment: deployment_id,
            output,
        })
    }
}

/// everything that gets written to the output directory for one stack.
pub struct SynthesizedStack {
    pub stack_name: String,
    pub resources: SiteResources,
    pub template: SavedTemplate,
    pub assets: AssetManifest,
    pub manifest: CloudManifest,
}

impl SynthesizedStack {
    pub fn template_path(&self, out_dir: &Path) -> PathBuf {
        out_dir.join(CloudManifest::template_file_name(&self.stack_name))
    }

    pub fn write_to(&self, out_dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(out_dir)?;
        let template_path = self.template_path(out_dir);
        std::fs::write(&template_path, self.template.to_json_pretty()?)?;
        let assets_path = out_dir.join(CloudManifest::assets_file_name(&self.stack_name));
        std::fs::write(&assets_path, serde_json::to_string_pretty(&self.assets)?)?;
        let manifest_path = self.manifest.write(out_dir)?;
        info!(stack = %self.stack_name, dir = ?out_dir, "wrote stack artifacts");
        Ok(vec![template_path, assets_path, manifest_path])
    }
}

/// run the config's customization script, if any.
pub fn apply_script(config: &StackConfig, cache_dir: &Path) -> Result<StackConfig> {
    match &config.script {
        Some(source) => {
            let mut customized = run_script(config.clone(), source, cache_dir)?;
            customized.script = None;
            Ok(customized)
        }
        None => Ok(config.clone()),
    }
}

pub fn synthesize(config: &StackConfig) -> Result<SynthesizedStack> {
    synthesize_with_cache(config, Path::new(DEFAULT_SCRIPT_CACHE_DIR))
}

pub fn synthesize_with_cache(config: &StackConfig, script_cache_dir: &Path) -> Result<SynthesizedStack> {
    let config = apply_script(config, script_cache_dir)?;
    let mut stack = Stack::new(&config.stack_name, config.env.clone())?;
    stack.set_description(config.description.clone());
    let resources = StaticSite::declare(&mut stack, &config)?;
    let template = stack.synthesize()?;

    let env = stack.env();
    let mut assets = AssetManifest::new();
    for asset in stack.assets() {
        assets.add(asset, config.deployment.asset_bucket_name(), env.region.as_deref());
    }
    let mut manifest = CloudManifest::new();
    manifest.add_stack(
        stack.name(),
        CloudManifest::environment_string(env.account.as_deref(), env.region.as_deref()),
    );
    Ok(SynthesizedStack {
        stack_name: stack.name().to_string(),
        resources,
        template,
        assets,
        manifest,
    })
}
