use serde::Deserialize;

use super::*;

/// which public access settings are blocked on the bucket.
/// there is no "unset" option. every bucket we declare
/// writes an explicit PublicAccessBlockConfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockPublicAccess {
    #[default]
    BlockAll,
    /// blocks public ACLs, but allows public bucket policies.
    BlockAcls,
    /// nothing is blocked.
    Off,
}

impl BlockPublicAccess {
    pub fn blocks_public_policy(&self) -> bool {
        matches!(self, BlockPublicAccess::BlockAll)
    }

    pub fn configuration(&self) -> Value {
        let (acls, policy) = match self {
            BlockPublicAccess::BlockAll => (true, true),
            BlockPublicAccess::BlockAcls => (true, false),
            BlockPublicAccess::Off => (false, false),
        };
        let mut map = Map::new();
        map.insert("BlockPublicAcls".to_string(), Value::Bool(acls));
        map.insert("BlockPublicPolicy".to_string(), Value::Bool(policy));
        map.insert("IgnorePublicAcls".to_string(), Value::Bool(acls));
        map.insert("RestrictPublicBuckets".to_string(), Value::Bool(policy));
        Value::Object(map)
    }
}

/// canned ACL applied to the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketAccessControl {
    Private,
    PublicRead,
    AuthenticatedRead,
    BucketOwnerRead,
    BucketOwnerFullControl,
    LogDeliveryWrite,
}

impl BucketAccessControl {
    pub fn as_cfn_str(&self) -> &'static str {
        match self {
            BucketAccessControl::Private => "Private",
            BucketAccessControl::PublicRead => "PublicRead",
            BucketAccessControl::AuthenticatedRead => "AuthenticatedRead",
            BucketAccessControl::BucketOwnerRead => "BucketOwnerRead",
            BucketAccessControl::BucketOwnerFullControl => "BucketOwnerFullControl",
            BucketAccessControl::LogDeliveryWrite => "LogDeliveryWrite",
        }
    }

    /// buckets with ACLs disabled only accept the owner-only canned ACLs.
    pub fn needs_object_acls(&self) -> bool {
        !matches!(self, BucketAccessControl::Private | BucketAccessControl::BucketOwnerFullControl)
    }
}

/// who owns objects written into the bucket. new buckets default to
/// BucketOwnerEnforced, which disables ACLs altogether.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectOwnership {
    BucketOwnerEnforced,
    BucketOwnerPreferred,
    ObjectWriter,
}

impl ObjectOwnership {
    pub fn as_cfn_str(&self) -> &'static str {
        match self {
            ObjectOwnership::BucketOwnerEnforced => "BucketOwnerEnforced",
            ObjectOwnership::BucketOwnerPreferred => "BucketOwnerPreferred",
            ObjectOwnership::ObjectWriter => "ObjectWriter",
        }
    }
}

/// physical name of the bucket. When generated, we omit BucketName
/// and cloudformation derives a unique one from the stack + logical id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "Option<String>")]
pub enum PhysicalName {
    #[default]
    GenerateIfNeeded,
    Fixed(String),
}

impl From<Option<String>> for PhysicalName {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(name) if !name.is_empty() => PhysicalName::Fixed(name),
            _ => PhysicalName::GenerateIfNeeded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketEncryption {
    Unencrypted,
    S3Managed,
    KmsManaged,
}

impl BucketEncryption {
    pub fn configuration(&self) -> Option<Value> {
        let algorithm = match self {
            BucketEncryption::Unencrypted => return None,
            BucketEncryption::S3Managed => "AES256",
            BucketEncryption::KmsManaged => "aws:kms",
        };
        let mut by_default = Map::new();
        by_default.insert("SSEAlgorithm".to_string(), Value::String(algorithm.to_string()));
        let mut rule = Map::new();
        rule.insert("ServerSideEncryptionByDefault".to_string(), Value::Object(by_default));
        let mut map = Map::new();
        map.insert("ServerSideEncryptionConfiguration".to_string(), Value::Array(vec![Value::Object(rule)]));
        Some(Value::Object(map))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageClass {
    InfrequentAccess,
    OneZoneInfrequentAccess,
    IntelligentTiering,
    GlacierInstantRetrieval,
    Glacier,
    DeepArchive,
}

impl StorageClass {
    pub fn as_cfn_str(&self) -> &'static str {
        match self {
            StorageClass::InfrequentAccess => "STANDARD_IA",
            StorageClass::OneZoneInfrequentAccess => "ONEZONE_IA",
            StorageClass::IntelligentTiering => "INTELLIGENT_TIERING",
            StorageClass::GlacierInstantRetrieval => "GLACIER_IR",
            StorageClass::Glacier => "GLACIER",
            StorageClass::DeepArchive => "DEEP_ARCHIVE",
        }
    }

    /// S3 refuses transitions into the infrequent access classes
    /// earlier than 30 days after object creation.
    pub fn minimum_transition_days(&self) -> u32 {
        match self {
            StorageClass::InfrequentAccess | StorageClass::OneZoneInfrequentAccess => 30,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Transition {
    pub storage_class: StorageClass,
    pub transition_after_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LifecycleRule {
    pub id: Option<String>,
    pub enabled: bool,
    pub abort_incomplete_multipart_upload_after_days: Option<u32>,
    pub expiration_days: Option<u32>,
    pub transitions: Vec<Transition>,
}

impl Default for LifecycleRule {
    fn default() -> Self {
        Self {
            id: None,
            enabled: true,
            abort_incomplete_multipart_upload_after_days: None,
            expiration_days: None,
            transitions: vec![],
        }
    }
}

impl LifecycleRule {
    pub fn validate(&self) -> Result<(), String> {
        if self.abort_incomplete_multipart_upload_after_days.is_none()
            && self.expiration_days.is_none()
            && self.transitions.is_empty()
        {
            return Err("Lifecycle rule must specify at least one action".to_string());
        }
        if self.abort_incomplete_multipart_upload_after_days == Some(0) {
            return Err("abort_incomplete_multipart_upload_after_days must be at least 1".to_string());
        }
        if self.expiration_days == Some(0) {
            return Err("expiration_days must be at least 1".to_string());
        }
        let mut previous = 0;
        for transition in self.transitions.iter() {
            let days = transition.transition_after_days;
            let min = transition.storage_class.minimum_transition_days();
            if days < min {
                return Err(format!(
                    "Transition to {} must be at least {min} days after creation, found {days}",
                    transition.storage_class.as_cfn_str()
                ));
            }
            if days < previous {
                return Err(format!("Transitions must be in ascending order of days. {days} comes after {previous}"));
            }
            previous = days;
            if let Some(expiration) = self.expiration_days {
                if days >= expiration {
                    return Err(format!(
                        "Transition to {} after {days} days must happen before expiration after {expiration} days",
                        transition.storage_class.as_cfn_str()
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn to_cfn(&self) -> Value {
        let mut map = Map::new();
        if let Some(id) = &self.id {
            map.insert("Id".to_string(), Value::String(id.clone()));
        }
        let status = if self.enabled { "Enabled" } else { "Disabled" };
        map.insert("Status".to_string(), Value::String(status.to_string()));
        if let Some(days) = self.abort_incomplete_multipart_upload_after_days {
            let mut abort = Map::new();
            abort.insert("DaysAfterInitiation".to_string(), Value::from(days));
            map.insert("AbortIncompleteMultipartUpload".to_string(), Value::Object(abort));
        }
        if let Some(days) = self.expiration_days {
            map.insert("ExpirationInDays".to_string(), Value::from(days));
        }
        if !self.transitions.is_empty() {
            let transitions = self.transitions.iter().map(|t| {
                let mut tmap = Map::new();
                tmap.insert("StorageClass".to_string(), Value::String(t.storage_class.as_cfn_str().to_string()));
                tmap.insert("TransitionInDays".to_string(), Value::from(t.transition_after_days));
                Value::Object(tmap)
            }).collect();
            map.insert("Transitions".to_string(), Value::Array(transitions));
        }
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CorsHttpMethod {
    Get,
    Put,
    Head,
    Post,
    Delete,
}

impl CorsHttpMethod {
    pub fn as_cfn_str(&self) -> &'static str {
        match self {
            CorsHttpMethod::Get => "GET",
            CorsHttpMethod::Put => "PUT",
            CorsHttpMethod::Head => "HEAD",
            CorsHttpMethod::Post => "POST",
            CorsHttpMethod::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CorsRule {
    pub allowed_methods: Vec<CorsHttpMethod>,
    pub allowed_origins: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub max_age_seconds: Option<u32>,
}

impl Default for CorsRule {
    fn default() -> Self {
        Self {
            allowed_methods: vec![CorsHttpMethod::Get, CorsHttpMethod::Head],
            allowed_origins: vec!["*".to_string()],
            allowed_headers: vec!["*".to_string()],
            exposed_headers: vec![],
            max_age_seconds: Some(3000),
        }
    }
}

impl CorsRule {
    pub fn to_cfn(&self) -> Value {
        let mut map = Map::new();
        let methods: Vec<&str> = self.allowed_methods.iter().map(|m| m.as_cfn_str()).collect();
        map.insert("AllowedMethods".to_string(), string_array(&methods));
        map.insert("AllowedOrigins".to_string(), string_array(&self.allowed_origins));
        if !self.allowed_headers.is_empty() {
            map.insert("AllowedHeaders".to_string(), string_array(&self.allowed_headers));
        }
        if !self.exposed_headers.is_empty() {
            map.insert("ExposedHeaders".to_string(), string_array(&self.exposed_headers));
        }
        if let Some(age) = self.max_age_seconds {
            map.insert("MaxAge".to_string(), Value::from(age));
        }
        Value::Object(map)
    }
}

pub const AUTO_DELETE_TAG: &str = "site:auto-delete-objects";

/// properties of the S3 bucket holding the site.
/// defaults describe a private website bucket that gets destroyed
/// (contents included) together with the stack.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BucketProps {
    /// owned by the site access mode, see `SiteAccess`.
    #[serde(skip)]
    pub block_public_access: BlockPublicAccess,
    /// owned by the site access mode, see `SiteAccess`.
    #[serde(skip)]
    pub public_read_access: bool,
    /// owned by the site access mode, see `SiteAccess`.
    #[serde(skip)]
    pub cors: Vec<CorsRule>,
    pub access_control: BucketAccessControl,
    /// when unset, ObjectWriter if the ACL needs it, else BucketOwnerEnforced
    pub object_ownership: Option<ObjectOwnership>,
    pub bucket_name: PhysicalName,
    pub removal_policy: RemovalPolicy,
    /// when the stack is deleted, empty the bucket first so that
    /// cloudformation is able to delete it.
    pub auto_delete_objects: bool,
    pub versioned: bool,
    pub encryption: BucketEncryption,
    pub website_index_document: Option<String>,
    pub website_error_document: Option<String>,
    pub lifecycle_rules: Vec<LifecycleRule>,
}

impl Default for BucketProps {
    fn default() -> Self {
        Self {
            block_public_access: BlockPublicAccess::BlockAll,
            public_read_access: false,
            cors: vec![],
            access_control: BucketAccessControl::BucketOwnerFullControl,
            object_ownership: None,
            bucket_name: PhysicalName::GenerateIfNeeded,
            removal_policy: RemovalPolicy::Destroy,
            auto_delete_objects: true,
            versioned: false,
            encryption: BucketEncryption::S3Managed,
            website_index_document: Some("index.html".to_string()),
            website_error_document: None,
            lifecycle_rules: vec![LifecycleRule {
                abort_incomplete_multipart_upload_after_days: Some(90),
                expiration_days: Some(365),
                transitions: vec![Transition {
                    storage_class: StorageClass::InfrequentAccess,
                    transition_after_days: 30,
                }],
                ..Default::default()
            }],
        }
    }
}

/// returns the first problem found with an explicit bucket name, if any.
impl BucketProps {
    pub fn effective_object_ownership(&self) -> ObjectOwnership {
        match self.object_ownership {
            Some(ownership) => ownership,
            None if self.access_control.needs_object_acls() => ObjectOwnership::ObjectWriter,
            None => ObjectOwnership::BucketOwnerEnforced,
        }
    }
}

pub fn verify_bucket_name(bucket_name: &str) -> Option<String> {
    if bucket_name.len() > 63 || bucket_name.len() < 3 {
        return Some(format!("Invalid bucket name {:?}\nMust be between 3 and 63 characters", bucket_name));
    }
    let valid_char_check = |c: char| -> bool {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-'
    };
    if !bucket_name.chars().all(valid_char_check) {
        return Some(format!("Invalid bucket name {:?}\nMay only contain lowercase letters, numbers, dots, and dashes", bucket_name));
    }
    let first_ok = bucket_name.chars().next().map_or(false, |c| c.is_ascii_alphanumeric());
    let last_ok = bucket_name.chars().last().map_or(false, |c| c.is_ascii_alphanumeric());
    if !first_ok || !last_ok {
        return Some(format!("Invalid bucket name {:?}\nFirst and last character must be either lowercase letter, or number", bucket_name));
    }
    if bucket_name.contains("..") {
        return Some(format!("Invalid bucket name {:?}\nMay not contain two consecutive dots", bucket_name));
    }
    None
}

impl CfnResource for BucketProps {
    fn type_string(&self) -> &'static str {
        "AWS::S3::Bucket"
    }

    fn properties(&self) -> Value {
        let mut map = Map::new();
        if let PhysicalName::Fixed(name) = &self.bucket_name {
            map.insert("BucketName".to_string(), Value::String(name.clone()));
        }
        map.insert("AccessControl".to_string(), Value::String(self.access_control.as_cfn_str().to_string()));
        let mut ownership = Map::new();
        ownership.insert("ObjectOwnership".to_string(), Value::String(self.effective_object_ownership().as_cfn_str().to_string()));
        let mut controls = Map::new();
        controls.insert("Rules".to_string(), Value::Array(vec![Value::Object(ownership)]));
        map.insert("OwnershipControls".to_string(), Value::Object(controls));
        if let Some(encryption) = self.encryption.configuration() {
            map.insert("BucketEncryption".to_string(), encryption);
        }
        map.insert("PublicAccessBlockConfiguration".to_string(), self.block_public_access.configuration());
        if self.versioned {
            let mut versioning = Map::new();
            versioning.insert("Status".to_string(), Value::String("Enabled".to_string()));
            map.insert("VersioningConfiguration".to_string(), Value::Object(versioning));
        }
        if !self.cors.is_empty() {
            let mut cors = Map::new();
            cors.insert("CorsRules".to_string(), Value::Array(self.cors.iter().map(|c| c.to_cfn()).collect()));
            map.insert("CorsConfiguration".to_string(), Value::Object(cors));
        }
        if !self.lifecycle_rules.is_empty() {
            let mut lifecycle = Map::new();
            lifecycle.insert("Rules".to_string(), Value::Array(self.lifecycle_rules.iter().map(|r| r.to_cfn()).collect()));
            map.insert("LifecycleConfiguration".to_string(), Value::Object(lifecycle));
        }
        if let Some(index) = &self.website_index_document {
            let mut website = Map::new();
            website.insert("IndexDocument".to_string(), Value::String(index.clone()));
            if let Some(error) = &self.website_error_document {
                website.insert("ErrorDocument".to_string(), Value::String(error.clone()));
            }
            map.insert("WebsiteConfiguration".to_string(), Value::Object(website));
        }
        if self.auto_delete_objects {
            let mut tag = Map::new();
            tag.insert("Key".to_string(), Value::String(AUTO_DELETE_TAG.to_string()));
            tag.insert("Value".to_string(), Value::String("true".to_string()));
            map.insert("Tags".to_string(), Value::Array(vec![Value::Object(tag)]));
        }
        Value::Object(map)
    }

    fn validate(&self) -> Result<(), String> {
        if let PhysicalName::Fixed(name) = &self.bucket_name {
            if let Some(err) = verify_bucket_name(name) {
                return Err(err);
            }
        }
        if self.public_read_access && self.block_public_access.blocks_public_policy() {
            return Err("Cannot grant public read access while public bucket policies are blocked".to_string());
        }
        if self.access_control == BucketAccessControl::PublicRead && self.block_public_access != BlockPublicAccess::Off {
            return Err("Cannot use the PublicRead ACL while public ACLs are blocked".to_string());
        }
        if self.access_control.needs_object_acls()
            && self.effective_object_ownership() == ObjectOwnership::BucketOwnerEnforced
        {
            return Err(format!(
                "Cannot use the {} ACL while object ownership is BucketOwnerEnforced (ACLs are disabled)",
                self.access_control.as_cfn_str()
            ));
        }
        if self.auto_delete_objects && self.removal_policy != RemovalPolicy::Destroy {
            return Err("Cannot use auto_delete_objects unless removal_policy is destroy".to_string());
        }
        if self.website_error_document.is_some() && self.website_index_document.is_none() {
            return Err("website_error_document requires website_index_document".to_string());
        }
        for rule in self.lifecycle_rules.iter() {
            rule.validate()?;
        }
        Ok(())
    }
}
