use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info};

use crate::assets::StagedAsset;
use crate::config::Environment;
use crate::error::{Result, StackError};
use crate::resources::{CfnResource, RemovalPolicy};
use crate::template::{collect_references, validate_stack_name, ResourceOutput, SavedResource, SavedTemplate};

pub struct Resource {
    /// logical id in the template
    pub name: String,
    pub properties: Box<dyn CfnResource>,
    pub removal_policy: Option<RemovalPolicy>,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
    pub removal_policy: Option<RemovalPolicy>,
    pub depends_on: Vec<String>,
}

impl ResourceOptions {
    pub fn removal_policy(policy: RemovalPolicy) -> Self {
        Self { removal_policy: Some(policy), depends_on: vec![] }
    }

    pub fn depends_on(ids: &[&str]) -> Self {
        Self { removal_policy: None, depends_on: ids.iter().map(|s| s.to_string()).collect() }
    }
}

/// the set of resources that get deployed together as one cloudformation stack.
pub struct Stack {
    name: String,
    env: Environment,
    description: Option<String>,
    resources: Vec<Resource>,
    construct_paths: HashSet<String>,
    outputs: Vec<(String, ResourceOutput)>,
    assets: Vec<StagedAsset>,
}

/// logical ids can only be alphanumeric. the path is hashed into a suffix so that
/// paths that only differ in punctuation still get distinct ids.
pub fn allocate_logical_id(construct_path: &str) -> String {
    let human: String = construct_path
        .split('/')
        .map(|part| part.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>())
        .collect();
    let hash = adler32::RollingAdler32::from_buffer(construct_path.as_bytes()).hash();
    let mut human = human;
    human.truncate(255 - 8);
    format!("{human}{hash:08X}")
}

pub fn verify_logical_id(logical_id: &str) -> Option<String> {
    if logical_id.len() > 255 {
        return Some(format!("Invalid resource name {:?}\nmust be less than 255 characters", logical_id));
    }
    if logical_id.is_empty() {
        return Some(format!("Invalid resource name {:?}\nMust contain at least 1 character", logical_id));
    }
    if !logical_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Some(format!("Invalid resource name {:?}\nMust contain only alphanumeric characters [A-Za-z0-9]", logical_id));
    }
    None
}

impl Stack {
    pub fn new(stack_name: &str, env: Environment) -> Result<Self> {
        let name = validate_stack_name(stack_name)?;
        env.validate()?;
        Ok(Self {
            name,
            env,
            description: None,
            resources: vec![],
            construct_paths: HashSet::new(),
            outputs: vec![],
            assets: vec![],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == logical_id)
    }

    pub fn assets(&self) -> &[StagedAsset] {
        &self.assets
    }

    /// the logical id a construct at this path gets (or already got).
    pub fn logical_id(&self, construct_path: &str) -> String {
        allocate_logical_id(construct_path)
    }

    pub fn contains(&self, construct_path: &str) -> bool {
        self.construct_paths.contains(construct_path)
    }

    pub fn add(&mut self, construct_path: &str, properties: impl CfnResource + 'static) -> Result<String> {
        self.add_with(construct_path, properties, ResourceOptions::default())
    }

    pub fn add_with(
        &mut self,
        construct_path: &str,
        properties: impl CfnResource + 'static,
        options: ResourceOptions,
    ) -> Result<String> {
        if !self.construct_paths.insert(construct_path.to_string()) {
            return Err(StackError::DuplicateId(construct_path.to_string()));
        }
        let name = self.logical_id(construct_path);
        debug!(construct = construct_path, logical_id = %name, ty = properties.type_string(), "declared resource");
        self.push_resource(Resource {
            name: name.clone(),
            properties: Box::new(properties) as _,
            removal_policy: options.removal_policy,
            depends_on: options.depends_on,
        })?;
        Ok(name)
    }

    /// add a resource with an exact logical id, bypassing id allocation.
    pub fn push_resource(&mut self, resource: Resource) -> Result<()> {
        if let Some(err) = verify_logical_id(&resource.name) {
            return Err(StackError::invalid(&resource.name, err));
        }
        if self.resource(&resource.name).is_some() || self.outputs.iter().any(|(id, _)| *id == resource.name) {
            return Err(StackError::DuplicateId(resource.name));
        }
        self.resources.push(resource);
        Ok(())
    }

    /// outputs keep their id (minus punctuation) so they are easy to find
    /// in the console. returns the output's logical id.
    pub fn add_output(&mut self, id: &str, description: Option<&str>, value: Value) -> Result<String> {
        let logical_id: String = id.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        if let Some(err) = verify_logical_id(&logical_id) {
            return Err(StackError::invalid(id, err));
        }
        if self.outputs.iter().any(|(o, _)| *o == logical_id) || self.resource(&logical_id).is_some() {
            return Err(StackError::DuplicateId(id.to_string()));
        }
        self.outputs.push((logical_id.clone(), ResourceOutput {
            description: description.map(|d| d.to_string()),
            value,
        }));
        Ok(logical_id)
    }

    pub fn add_asset(&mut self, asset: StagedAsset) {
        if !self.assets.iter().any(|a| a.fingerprint == asset.fingerprint) {
            self.assets.push(asset);
        }
    }

    fn check_references(&self) -> Result<()> {
        let known: HashSet<&str> = self.resources.iter().map(|r| r.name.as_str()).collect();
        let check = |from: &str, targets: &[String]| -> Result<()> {
            for target in targets {
                if !known.contains(target.as_str()) {
                    return Err(StackError::DanglingReference { from: from.to_string(), target: target.clone() });
                }
            }
            Ok(())
        };
        for resource in self.resources.iter() {
            let mut refs = vec![];
            collect_references(&resource.properties.properties(), &mut refs);
            refs.extend(resource.depends_on.iter().cloned());
            check(&resource.name, &refs)?;
        }
        for (id, output) in self.outputs.iter() {
            let mut refs = vec![];
            collect_references(&output.value, &mut refs);
            check(id, &refs)?;
        }
        Ok(())
    }

    /// validate every resource and render the template.
    pub fn synthesize(&self) -> Result<SavedTemplate> {
        let mut out_template = SavedTemplate {
            description: self.description.clone(),
            ..Default::default()
        };
        for resource in self.resources.iter() {
            resource.properties.validate()
                .map_err(|e| StackError::invalid(&resource.name, e))?;
            let policy = resource.removal_policy.map(|p| p.as_cfn_str().to_string());
            let saved_resource = SavedResource {
                ty: resource.properties.type_string().to_string(),
                properties: resource.properties.properties(),
                deletion_policy: policy.clone(),
                update_replace_policy: policy,
                depends_on: resource.depends_on.clone(),
            };
            out_template.resources.insert(resource.name.clone(), saved_resource);
        }
        for (id, output) in self.outputs.iter() {
            out_template.outputs.insert(id.clone(), output.clone());
        }
        self.check_references()?;
        info!(stack = %self.name, resources = out_template.resources.len(), outputs = out_template.outputs.len(), "synthesized stack");
        Ok(out_template)
    }
}
