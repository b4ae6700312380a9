use crate::engine::Template;
use crate::error::CompileError;
use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};
use tracing::debug;

#[derive(Clone)]
struct CachedTemplate {
    template: Arc<Template>,
    content_hash: u64,
}

/// 缓存编译后的模板程序
static TEMPLATE_CACHE: LazyLock<DashMap<String, CachedTemplate>> = LazyLock::new(DashMap::new);

/// Fetch the compiled template for `name`, recompiling when the content
/// hash changed. Compile failures are returned to the caller and never
/// cached.
pub(crate) fn get_template(name: &str, content: &str) -> Result<Arc<Template>, CompileError> {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    let new_hash = hasher.finish();

    if let Some(cached) = TEMPLATE_CACHE.get(name) {
        if cached.content_hash == new_hash {
            return Ok(cached.template.clone());
        }
    }

    let template = Arc::new(Template::compile(content, &[])?);
    debug!("cache: compiled template {:?}, hash={:x}", name, new_hash);
    TEMPLATE_CACHE.insert(
        name.to_string(),
        CachedTemplate {
            template: template.clone(),
            content_hash: new_hash,
        },
    );
    Ok(template)
}

pub(crate) fn remove(name: &str) {
    TEMPLATE_CACHE.remove(name);
}
