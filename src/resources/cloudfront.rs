use serde::Deserialize;

use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowedMethods {
    GetHead,
    GetHeadOptions,
    All,
}

impl AllowedMethods {
    pub fn methods(&self) -> &'static [&'static str] {
        match self {
            AllowedMethods::GetHead => &["GET", "HEAD"],
            AllowedMethods::GetHeadOptions => &["GET", "HEAD", "OPTIONS"],
            AllowedMethods::All => &["DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachedMethods {
    GetHead,
    GetHeadOptions,
}

impl CachedMethods {
    pub fn methods(&self) -> &'static [&'static str] {
        match self {
            CachedMethods::GetHead => &["GET", "HEAD"],
            CachedMethods::GetHeadOptions => &["GET", "HEAD", "OPTIONS"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewerProtocolPolicy {
    AllowAll,
    RedirectToHttps,
    HttpsOnly,
}

impl ViewerProtocolPolicy {
    pub fn as_cfn_str(&self) -> &'static str {
        match self {
            ViewerProtocolPolicy::AllowAll => "allow-all",
            ViewerProtocolPolicy::RedirectToHttps => "redirect-to-https",
            ViewerProtocolPolicy::HttpsOnly => "https-only",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case", tag = "forward", content = "names")]
pub enum CookieForward {
    None,
    All,
    Whitelist(Vec<String>),
}

impl CookieForward {
    pub fn to_cfn(&self) -> Value {
        let mut map = Map::new();
        let forward = match self {
            CookieForward::None => "none",
            CookieForward::All => "all",
            CookieForward::Whitelist(names) => {
                map.insert("WhitelistedNames".to_string(), string_array(names));
                "whitelist"
            }
        };
        map.insert("Forward".to_string(), Value::String(forward.to_string()));
        Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ForwardedValues {
    pub query_string: bool,
    pub cookies: CookieForward,
    pub headers: Vec<String>,
}

impl Default for ForwardedValues {
    fn default() -> Self {
        Self {
            query_string: true,
            cookies: CookieForward::None,
            headers: vec![
                "Access-Control-Request-Headers".to_string(),
                "Access-Control-Request-Method".to_string(),
            ],
        }
    }
}

impl ForwardedValues {
    pub fn to_cfn(&self) -> Value {
        let mut map = Map::new();
        map.insert("QueryString".to_string(), Value::Bool(self.query_string));
        map.insert("Cookies".to_string(), self.cookies.to_cfn());
        if !self.headers.is_empty() {
            map.insert("Headers".to_string(), string_array(&self.headers));
        }
        Value::Object(map)
    }
}

/// one cache behavior of an origin. exactly one behavior across the whole
/// distribution must be the default one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Behavior {
    pub is_default_behavior: bool,
    /// required for every non-default behavior
    pub path_pattern: Option<String>,
    pub compress: bool,
    pub allowed_methods: AllowedMethods,
    pub cached_methods: CachedMethods,
    pub forwarded_values: ForwardedValues,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            is_default_behavior: true,
            path_pattern: None,
            compress: true,
            allowed_methods: AllowedMethods::All,
            cached_methods: CachedMethods::GetHeadOptions,
            forwarded_values: Default::default(),
        }
    }
}

impl Behavior {
    fn to_cfn(&self, target_origin_id: &str, viewer_protocol_policy: ViewerProtocolPolicy) -> Value {
        let mut map = Map::new();
        if !self.is_default_behavior {
            if let Some(pattern) = &self.path_pattern {
                map.insert("PathPattern".to_string(), Value::String(pattern.clone()));
            }
        }
        map.insert("AllowedMethods".to_string(), string_array(self.allowed_methods.methods()));
        map.insert("CachedMethods".to_string(), string_array(self.cached_methods.methods()));
        map.insert("Compress".to_string(), Value::Bool(self.compress));
        map.insert("ForwardedValues".to_string(), self.forwarded_values.to_cfn());
        map.insert("TargetOriginId".to_string(), Value::String(target_origin_id.to_string()));
        map.insert("ViewerProtocolPolicy".to_string(), Value::String(viewer_protocol_policy.as_cfn_str().to_string()));
        Value::Object(map)
    }

    fn validate(&self) -> Result<(), String> {
        let allowed = self.allowed_methods.methods();
        if !self.cached_methods.methods().iter().all(|m| allowed.contains(m)) {
            return Err(format!(
                "Cached methods {:?} must be a subset of allowed methods {:?}",
                self.cached_methods.methods(), allowed
            ));
        }
        if !self.is_default_behavior && self.path_pattern.as_deref().map_or(true, str::is_empty) {
            return Err("Non-default behaviors must provide a path_pattern".to_string());
        }
        Ok(())
    }
}

/// an S3 bucket in the same stack used as an origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3OriginSource {
    pub bucket_logical_id: String,
    /// logical id of the origin access identity cloudfront uses to
    /// read the bucket. None means the bucket must be publicly readable.
    pub origin_access_identity: Option<String>,
    pub origin_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginConfig {
    pub s3_origin_source: S3OriginSource,
    pub behaviors: Vec<Behavior>,
}

impl OriginConfig {
    fn to_cfn(&self, origin_id: &str) -> Value {
        let source = &self.s3_origin_source;
        let mut s3_config = Map::new();
        let identity = match &source.origin_access_identity {
            Some(oai_id) => join("", vec![
                Value::String("origin-access-identity/cloudfront/".to_string()),
                get_ref(oai_id),
            ]),
            None => Value::String(String::new()),
        };
        s3_config.insert("OriginAccessIdentity".to_string(), identity);

        let mut map = Map::new();
        map.insert("Id".to_string(), Value::String(origin_id.to_string()));
        map.insert("DomainName".to_string(), get_att(&source.bucket_logical_id, "RegionalDomainName"));
        if let Some(path) = &source.origin_path {
            map.insert("OriginPath".to_string(), Value::String(path.clone()));
        }
        map.insert("S3OriginConfig".to_string(), Value::Object(s3_config));
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PriceClass {
    #[serde(rename = "PriceClass_100")]
    PriceClass100,
    #[serde(rename = "PriceClass_200")]
    PriceClass200,
    #[serde(rename = "PriceClass_All")]
    PriceClassAll,
}

impl PriceClass {
    pub fn as_cfn_str(&self) -> &'static str {
        match self {
            PriceClass::PriceClass100 => "PriceClass_100",
            PriceClass::PriceClass200 => "PriceClass_200",
            PriceClass::PriceClassAll => "PriceClass_All",
        }
    }
}

/// distribution wide settings, plus the default cache behavior of the site origin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DistributionProps {
    pub comment: String,
    pub enabled: bool,
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub default_root_object: Option<String>,
    pub price_class: PriceClass,
    pub http_version: String,
    pub enable_ipv6: bool,
    pub default_behavior: Behavior,
}

impl Default for DistributionProps {
    fn default() -> Self {
        Self {
            comment: "reactapp - Cloudfront Distribution".to_string(),
            enabled: true,
            viewer_protocol_policy: ViewerProtocolPolicy::RedirectToHttps,
            default_root_object: Some("index.html".to_string()),
            price_class: PriceClass::PriceClass100,
            http_version: "http2".to_string(),
            enable_ipv6: true,
            default_behavior: Behavior::default(),
        }
    }
}

/// a cloudfront distribution built from origin configs, where each
/// origin carries its own behaviors.
#[derive(Debug, Clone)]
pub struct WebDistribution {
    pub props: DistributionProps,
    pub origin_configs: Vec<OriginConfig>,
}

impl WebDistribution {
    pub fn new(props: DistributionProps, origin: S3OriginSource) -> Self {
        let mut default_behavior = props.default_behavior.clone();
        default_behavior.is_default_behavior = true;
        Self {
            props,
            origin_configs: vec![OriginConfig { s3_origin_source: origin, behaviors: vec![default_behavior] }],
        }
    }

    pub fn origin_id(index: usize) -> String {
        format!("origin{}", index + 1)
    }
}

impl CfnResource for WebDistribution {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Distribution"
    }

    fn properties(&self) -> Value {
        let policy = self.props.viewer_protocol_policy;
        let mut origins = vec![];
        let mut default_behavior = Value::Null;
        let mut cache_behaviors = vec![];
        for (i, origin_config) in self.origin_configs.iter().enumerate() {
            let origin_id = Self::origin_id(i);
            origins.push(origin_config.to_cfn(&origin_id));
            for behavior in origin_config.behaviors.iter() {
                if behavior.is_default_behavior {
                    default_behavior = behavior.to_cfn(&origin_id, policy);
                } else {
                    cache_behaviors.push(behavior.to_cfn(&origin_id, policy));
                }
            }
        }

        let mut config = Map::new();
        if !self.props.comment.is_empty() {
            config.insert("Comment".to_string(), Value::String(self.props.comment.clone()));
        }
        config.insert("Enabled".to_string(), Value::Bool(self.props.enabled));
        if let Some(root) = &self.props.default_root_object {
            config.insert("DefaultRootObject".to_string(), Value::String(root.clone()));
        }
        config.insert("HttpVersion".to_string(), Value::String(self.props.http_version.clone()));
        config.insert("IPV6Enabled".to_string(), Value::Bool(self.props.enable_ipv6));
        config.insert("PriceClass".to_string(), Value::String(self.props.price_class.as_cfn_str().to_string()));
        config.insert("Origins".to_string(), Value::Array(origins));
        config.insert("DefaultCacheBehavior".to_string(), default_behavior);
        if !cache_behaviors.is_empty() {
            config.insert("CacheBehaviors".to_string(), Value::Array(cache_behaviors));
        }
        let mut certificate = Map::new();
        certificate.insert("CloudFrontDefaultCertificate".to_string(), Value::Bool(true));
        config.insert("ViewerCertificate".to_string(), Value::Object(certificate));

        let mut map = Map::new();
        map.insert("DistributionConfig".to_string(), Value::Object(config));
        Value::Object(map)
    }

    fn validate(&self) -> Result<(), String> {
        if self.origin_configs.is_empty() {
            return Err("Distribution must have at least one origin".to_string());
        }
        if self.props.comment.len() > 128 {
            return Err(format!("Distribution comment must be at most 128 characters, found {}", self.props.comment.len()));
        }
        if !matches!(self.props.http_version.as_str(), "http1.1" | "http2" | "http2and3" | "http3") {
            return Err(format!("Unsupported http_version {:?}", self.props.http_version));
        }
        let mut num_default = 0;
        for origin_config in self.origin_configs.iter() {
            if origin_config.behaviors.is_empty() {
                return Err(format!("Origin {} has no behaviors", origin_config.s3_origin_source.bucket_logical_id));
            }
            for behavior in origin_config.behaviors.iter() {
                behavior.validate()?;
                if behavior.is_default_behavior {
                    num_default += 1;
                }
            }
        }
        if num_default != 1 {
            return Err(format!("Distribution must have exactly one default behavior, found {num_default}"));
        }
        Ok(())
    }
}
