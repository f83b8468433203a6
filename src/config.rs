//! Stack configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file,
//! then an optional `.env` file, then `SITE_*` process environment variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, StackError};
use crate::resources::{BlockPublicAccess, BucketProps, CorsRule, DeploymentProps, DistributionProps};
use crate::variables::{load_dot_env, process_vars};

pub const ENV_PREFIX: &str = "SITE_";

/// where the stack gets deployed. Unset values are resolved by
/// cloudformation through pseudo parameters at deploy time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Environment {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl Environment {
    pub fn new(account: Option<&str>, region: Option<&str>) -> Self {
        Self {
            account: account.map(|a| a.to_string()),
            region: region.map(|r| r.to_string()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(account) = &self.account {
            if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
                return Err(StackError::Config(format!("Invalid account id {:?}. Must be 12 digits", account)));
            }
        }
        if let Some(region) = &self.region {
            let valid = !region.is_empty()
                && region.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
            if !valid {
                return Err(StackError::Config(format!("Invalid region {:?}", region)));
            }
        }
        Ok(())
    }
}

/// how visitors reach the bucket contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteAccess {
    /// everything public is blocked, cloudfront reads through an origin access identity.
    #[default]
    Private,
    /// objects are publicly readable, CORS is enabled and the account root
    /// principal gets read access.
    PublicRead,
}

impl SiteAccess {
    /// set the bucket properties this access mode owns.
    pub fn apply_to(&self, bucket: &mut BucketProps) {
        match self {
            SiteAccess::Private => {
                bucket.block_public_access = BlockPublicAccess::BlockAll;
                bucket.public_read_access = false;
                bucket.cors = vec![];
            }
            SiteAccess::PublicRead => {
                bucket.block_public_access = BlockPublicAccess::BlockAcls;
                bucket.public_read_access = true;
                bucket.cors = vec![CorsRule::default()];
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SiteAccess::Private => "private",
            SiteAccess::PublicRead => "public-read",
        }
    }
}

impl FromStr for SiteAccess {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "private" => Ok(SiteAccess::Private),
            "public-read" | "public_read" => Ok(SiteAccess::PublicRead),
            x => Err(StackError::Config(format!("Unknown access mode {:?}. Expected 'private' or 'public-read'", x))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    pub stack_name: String,
    pub description: Option<String>,
    pub env: Environment,
    pub access: SiteAccess,
    pub bucket_id: String,
    pub bucket: BucketProps,
    pub oai_id: String,
    pub oai_comment: String,
    pub distribution_id: String,
    pub distribution: DistributionProps,
    pub deployment_id: String,
    pub deployment: DeploymentProps,
    pub output_id: String,
    /// customization script run before the stack is declared.
    /// either a path, or `gh:owner/repo/path/to/script.rhai`
    pub script: Option<String>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: "ReactCdkStack".to_string(),
            description: None,
            env: Environment::default(),
            access: SiteAccess::Private,
            bucket_id: "CDK-React-UI".to_string(),
            bucket: BucketProps::default(),
            oai_id: "OIA".to_string(),
            oai_comment: "Created by JG".to_string(),
            distribution_id: "reactapp-cf-distribution".to_string(),
            distribution: DistributionProps::default(),
            deployment_id: "reactapp-s3bucketdeployment".to_string(),
            deployment: DeploymentProps::default(),
            output_id: "Cloudfront URL".to_string(),
            script: None,
        }
    }
}

impl StackConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StackError::Config(format!("Failed to read config file {:?}: {}", path, e)))?;
        Self::from_toml_str(&contents)
    }

    /// apply `SITE_*` variables on top of the current values.
    pub fn apply_vars(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        for (key, val) in vars.iter() {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else { continue };
            match name {
                "ACCOUNT" => self.env.account = Some(val.clone()),
                "REGION" => self.env.region = Some(val.clone()),
                "STACK_NAME" => self.stack_name = val.clone(),
                "ACCESS" => self.access = val.parse()?,
                "ASSET_PATH" => self.deployment.sources = vec![PathBuf::from(val)],
                "ASSET_BUCKET" => self.deployment.asset_bucket = Some(val.clone()),
                "SCRIPT" => self.script = Some(val.clone()),
                _ => {
                    debug!(variable = %key, "ignoring unknown variable");
                    continue;
                }
            }
            debug!(variable = %key, "applied config override");
        }
        Ok(())
    }

    pub fn load(config_path: Option<&Path>, env_file: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        if let Some(path) = env_file {
            config.apply_vars(&load_dot_env(path)?)?;
        }
        config.apply_vars(&process_vars(ENV_PREFIX))?;
        config.env.validate()?;
        Ok(config)
    }
}
