//! Customization scripts.
//!
//! A script is a rhai file with a `fn customize(site) { ...; site }` function.
//! It receives the loaded config, can change it through the functions
//! registered below, and must return it. Scripts are either a local path
//! or `gh:owner/repo/path/to/script.rhai`, which is fetched once from the
//! github contents api and cached on disk.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use rhai::{Array, Dynamic, Engine, EvalAltResult, Scope, AST};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::StackConfig;
use crate::error::{Result, StackError};
use crate::resources::PhysicalName;

pub const SCRIPT_FN_NAME: &str = "customize";
pub const DEFAULT_SCRIPT_CACHE_DIR: &str = ".site/scripts";
pub const REGISTRY_PREFIX: &str = "gh:";

#[derive(Deserialize)]
pub struct GitHubResponse {
    pub content: String,
    pub encoding: String,
}

/// the config as seen from inside a script
#[derive(Debug, Clone)]
pub struct ScriptSite(pub StackConfig);

type FnResult<T> = std::result::Result<T, Box<EvalAltResult>>;

fn strings(items: Array) -> FnResult<Vec<String>> {
    items.into_iter()
        .map(|d| d.into_string().map_err(|t| format!("expected an array of strings, found {t}").into()))
        .collect()
}

pub fn build_engine(eng: &mut Engine) {
    eng.set_max_expr_depths(0, 0);
    eng.register_type_with_name::<ScriptSite>("Site");

    eng.register_fn("get_stack_name", |s: &mut ScriptSite| -> String {
        s.0.stack_name.clone()
    });
    eng.register_fn("set_stack_name", |s: &mut ScriptSite, name: &str| {
        s.0.stack_name = name.to_string();
    });
    eng.register_fn("set_description", |s: &mut ScriptSite, desc: &str| {
        s.0.description = Some(desc.to_string());
    });
    eng.register_fn("get_access", |s: &mut ScriptSite| -> String {
        s.0.access.as_str().to_string()
    });
    eng.register_fn("set_access", |s: &mut ScriptSite, access: &str| -> FnResult<()> {
        s.0.access = access.parse().map_err(|e: StackError| e.to_string())?;
        Ok(())
    });
    eng.register_fn("set_region", |s: &mut ScriptSite, region: &str| {
        s.0.env.region = Some(region.to_string());
    });
    eng.register_fn("set_account", |s: &mut ScriptSite, account: &str| {
        s.0.env.account = Some(account.to_string());
    });

    eng.register_fn("set_bucket_name", |s: &mut ScriptSite, name: &str| {
        s.0.bucket.bucket_name = PhysicalName::Fixed(name.to_string());
    });
    eng.register_fn("set_versioned", |s: &mut ScriptSite, versioned: bool| {
        s.0.bucket.versioned = versioned;
    });
    eng.register_fn("set_auto_delete_objects", |s: &mut ScriptSite, auto_delete: bool| {
        s.0.bucket.auto_delete_objects = auto_delete;
    });
    eng.register_fn("set_index_document", |s: &mut ScriptSite, doc: &str| {
        s.0.bucket.website_index_document = Some(doc.to_string());
        s.0.distribution.default_root_object = Some(doc.to_string());
    });
    eng.register_fn("set_error_document", |s: &mut ScriptSite, doc: &str| {
        s.0.bucket.website_error_document = Some(doc.to_string());
    });
    eng.register_fn("clear_lifecycle_rules", |s: &mut ScriptSite| {
        s.0.bucket.lifecycle_rules.clear();
    });

    eng.register_fn("set_oai_comment", |s: &mut ScriptSite, comment: &str| {
        s.0.oai_comment = comment.to_string();
    });
    eng.register_fn("get_comment", |s: &mut ScriptSite| -> String {
        s.0.distribution.comment.clone()
    });
    eng.register_fn("set_comment", |s: &mut ScriptSite, comment: &str| {
        s.0.distribution.comment = comment.to_string();
    });
    eng.register_fn("set_forward_query_string", |s: &mut ScriptSite, forward: bool| {
        s.0.distribution.default_behavior.forwarded_values.query_string = forward;
    });
    eng.register_fn("add_forwarded_header", |s: &mut ScriptSite, header: &str| {
        s.0.distribution.default_behavior.forwarded_values.headers.push(header.to_string());
    });

    eng.register_fn("set_sources", |s: &mut ScriptSite, sources: Array| -> FnResult<()> {
        s.0.deployment.sources = strings(sources)?.into_iter().map(PathBuf::from).collect();
        Ok(())
    });
    eng.register_fn("add_source", |s: &mut ScriptSite, source: &str| {
        s.0.deployment.sources.push(PathBuf::from(source));
    });
    eng.register_fn("get_invalidation_paths", |s: &mut ScriptSite| -> Array {
        s.0.deployment.distribution_paths.iter().map(|p| Dynamic::from(p.clone())).collect()
    });
    eng.register_fn("set_invalidation_paths", |s: &mut ScriptSite, paths: Array| -> FnResult<()> {
        s.0.deployment.distribution_paths = strings(paths)?;
        Ok(())
    });
    eng.register_fn("set_asset_bucket", |s: &mut ScriptSite, bucket: &str| {
        s.0.deployment.asset_bucket = Some(bucket.to_string());
    });
}

/// every segment ends up as a cache directory name, so it must stay inside the cache.
fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains(['\\', ':'])
}

/// `gh:owner/repo/path` => (contents api url, cache path)
pub fn registry_location(source: &str, cache_dir: &Path) -> Option<(String, PathBuf)> {
    let rest = source.strip_prefix(REGISTRY_PREFIX)?;
    if !rest.split('/').all(is_plain_segment) {
        return None;
    }
    let mut parts = rest.splitn(3, '/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let repo = parts.next().filter(|s| !s.is_empty())?;
    let path = parts.next().filter(|s| !s.is_empty())?;
    let url = format!("https://api.github.com/repos/{owner}/{repo}/contents/{path}");
    Some((url, cache_dir.join(owner).join(repo).join(path)))
}

fn download_script(source: &str, url: &str) -> Result<String> {
    info!(%url, "downloading script");
    let body: GitHubResponse = match ureq::get(url).call() {
        Ok(resp) => resp.into_json()
            .map_err(|e| StackError::Script(format!("Unsuccessful response to fetch script {source} from github\n{e}")))?,
        Err(e) => {
            return Err(StackError::Script(format!("Failed to request script {source} from github\n{e}")));
        }
    };
    if body.encoding == "base64" {
        let content = body.content.replace('\n', "");
        let decoded = general_purpose::STANDARD.decode(content)
            .map_err(|e| StackError::Script(format!("Failed to decode script {source}\n{e}")))?;
        Ok(String::from_utf8_lossy(&decoded).to_string())
    } else {
        Ok(body.content)
    }
}

/// find the script and load its text. registry scripts are only downloaded
/// if they are not in the cache yet.
pub fn resolve_script(source: &str, cache_dir: &Path) -> Result<String> {
    let Some((url, path)) = registry_location(source, cache_dir) else {
        if source.starts_with(REGISTRY_PREFIX) {
            return Err(StackError::Script(format!("Invalid script {source:?}. Expected gh:owner/repo/path/to/script.rhai")));
        }
        return std::fs::read_to_string(source)
            .map_err(|e| StackError::Script(format!("Failed to load script '{source}' from file system. {e}")));
    };
    if path.is_file() {
        debug!(?path, "using cached script");
        return std::fs::read_to_string(&path)
            .map_err(|e| StackError::Script(format!("Failed to load cached script {:?}. {e}", path)));
    }
    let script = download_script(source, &url)?;
    // a failed cache write only costs a download next time
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(dir = ?parent, error = %e, "failed to create script cache directory");
        }
    }
    if let Err(e) = std::fs::write(&path, script.as_bytes()) {
        warn!(?path, error = %e, "failed to cache script");
    }
    Ok(script)
}

pub fn compile_script(eng: &Engine, source: &str, script: &str) -> Result<AST> {
    let ast = eng.compile(script)
        .map_err(|e| StackError::Script(format!("Failed to parse script '{source}' as rhai script. {e}")))?;
    let mut has_fn = false;
    for fndef in ast.iter_functions() {
        if fndef.name == SCRIPT_FN_NAME {
            has_fn = true;
            if fndef.params.len() != 1 {
                return Err(StackError::Script(format!(
                    "fn {SCRIPT_FN_NAME}() {{}} was found in '{source}' but it takes {} parameters, expected 1",
                    fndef.params.len()
                )));
            }
        }
    }
    if !has_fn {
        return Err(StackError::Script(format!("Script '{source}' is missing a fn {SCRIPT_FN_NAME}(site) {{}} function")));
    }
    Ok(ast)
}

fn create_scope(config: &StackConfig, source: &str) -> Scope<'static> {
    let mut scope = Scope::new();
    scope.push_constant("SITE_SCRIPT", source.to_string());
    scope.push_constant("SITE_REGION", config.env.region.clone().unwrap_or_default());
    scope.push_constant("SITE_ACCOUNT", config.env.account.clone().unwrap_or_default());
    scope
}

/// run already loaded script text against the config.
pub fn run_script_text(config: StackConfig, source: &str, script: &str) -> Result<StackConfig> {
    let mut eng = Engine::new();
    build_engine(&mut eng);
    let ast = compile_script(&eng, source, script)?;
    let mut scope = create_scope(&config, source);
    let options = rhai::CallFnOptions::default().eval_ast(false);
    match eng.call_fn_with_options::<ScriptSite>(options, &mut scope, &ast, SCRIPT_FN_NAME, (ScriptSite(config),)) {
        Ok(site) => {
            debug!(script = source, "applied customization script");
            Ok(site.0)
        }
        Err(e) => match *e {
            EvalAltResult::ErrorMismatchOutputType(_, _, _) => Err(StackError::Script(format!(
                "Error in script '{source}'. fn {SCRIPT_FN_NAME}(site) {{ }} must return its site parameter"
            ))),
            _ => Err(StackError::Script(format!("Error running script '{source}': {e}"))),
        },
    }
}

pub fn run_script(config: StackConfig, source: &str, cache_dir: &Path) -> Result<StackConfig> {
    let script = resolve_script(source, cache_dir)?;
    run_script_text(config, source, &script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteAccess;

    #[test]
    fn script_can_change_the_config() {
        let script = r#"
            fn customize(site) {
                site.set_stack_name("docs-" + site.get_stack_name());
                site.set_access("public-read");
                site.set_comment("docs");
                site.set_invalidation_paths(["/index.html", "/static/*"]);
                site.set_versioned(true);
                site
            }
        "#;
        let config = run_script_text(StackConfig::default(), "inline", script).unwrap();
        assert_eq!(config.stack_name, "docs-ReactCdkStack");
        assert_eq!(config.access, SiteAccess::PublicRead);
        assert_eq!(config.distribution.comment, "docs");
        assert_eq!(config.deployment.distribution_paths, vec!["/index.html", "/static/*"]);
        assert!(config.bucket.versioned);
    }

    #[test]
    fn missing_customize_fn_is_an_error() {
        let err = run_script_text(StackConfig::default(), "inline", "fn other(x) { x }").unwrap_err();
        assert!(matches!(err, StackError::Script(msg) if msg.contains("missing")));
    }

    #[test]
    fn must_return_the_site() {
        let err = run_script_text(StackConfig::default(), "inline", "fn customize(site) { 1 }").unwrap_err();
        assert!(matches!(err, StackError::Script(msg) if msg.contains("must return")));
    }

    #[test]
    fn runtime_errors_are_script_errors() {
        let script = r#"fn customize(site) { site.set_access("everyone"); site }"#;
        let err = run_script_text(StackConfig::default(), "inline", script).unwrap_err();
        assert!(matches!(err, StackError::Script(_)));
    }

    #[test]
    fn syntax_errors_are_script_errors() {
        let err = run_script_text(StackConfig::default(), "inline", "fn customize(site {").unwrap_err();
        assert!(matches!(err, StackError::Script(msg) if msg.contains("Failed to parse")));
    }

    #[test]
    fn registry_sources_map_to_cache_paths() {
        let (url, path) = registry_location("gh:acme/sites/scripts/docs.rhai", Path::new("/cache")).unwrap();
        assert_eq!(url, "https://api.github.com/repos/acme/sites/contents/scripts/docs.rhai");
        assert_eq!(path, PathBuf::from("/cache/acme/sites/scripts/docs.rhai"));
        assert!(registry_location("gh:acme", Path::new("/cache")).is_none());
        assert!(registry_location("./local.rhai", Path::new("/cache")).is_none());
        assert!(matches!(resolve_script("gh:acme", Path::new("/cache")), Err(StackError::Script(_))));
    }

    #[test]
    fn registry_sources_cannot_leave_the_cache() {
        let cache = Path::new("/cache");
        for source in [
            "gh:../../x",
            "gh:acme/../x",
            "gh:acme/sites/../../evil.rhai",
            "gh:acme/sites/./docs.rhai",
            "gh:acme/sites/scripts//docs.rhai",
            "gh:acme/sites/..\\evil.rhai",
        ] {
            assert!(registry_location(source, cache).is_none(), "{source} should be rejected");
            assert!(matches!(resolve_script(source, cache), Err(StackError::Script(_))));
        }
    }

    #[test]
    fn cached_registry_scripts_are_not_downloaded() {
        let cache = tempfile::tempdir().unwrap();
        let cached = cache.path().join("acme/sites/site.rhai");
        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, r#"fn customize(site) { site.set_region("eu-west-1"); site }"#).unwrap();
        let config = run_script(StackConfig::default(), "gh:acme/sites/site.rhai", cache.path()).unwrap();
        assert_eq!(config.env.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn local_scripts_are_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.rhai");
        std::fs::write(&path, "fn customize(site) { site.add_source(\"./public\"); site }").unwrap();
        let config = run_script(StackConfig::default(), &path.to_string_lossy(), dir.path()).unwrap();
        assert_eq!(config.deployment.sources.len(), 2);
        assert!(run_script(StackConfig::default(), "/no/such/script.rhai", dir.path()).is_err());
    }
}
