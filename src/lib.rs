//! Declares a static website on AWS as a cloudformation stack: a private (or
//! public read) S3 bucket, a cloudfront distribution in front of it, and a
//! deployment custom resource that uploads the build output and invalidates
//! the cache. The stack's output is the distribution's domain name.

pub mod assets;
pub mod config;
pub mod error;
pub mod resources;
pub mod scripting;
pub mod site;
pub mod stack;
pub mod template;
pub mod variables;

pub use config::{Environment, SiteAccess, StackConfig};
pub use error::{Result, StackError};
pub use site::{synthesize, synthesize_with_cache, SiteResources, StaticSite, SynthesizedStack};
pub use stack::Stack;
pub use template::SavedTemplate;
