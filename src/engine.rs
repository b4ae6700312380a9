use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::cache;
use crate::compiler;
use crate::error::{CompileError, RenderError, TplError};
use crate::program::Program;
use crate::render;
use crate::resolver::{DefaultResolver, DotResolver};
use crate::serializer::to_value;
use crate::value::Value;

/// A compiled template: parse once, render any number of times.
///
/// Rendering never mutates the template, so a shared reference can be
/// used from many threads at once.
#[derive(Debug)]
pub struct Template {
    program: Program,
    base: HashMap<String, Value>,
    all_vars: BTreeSet<String>,
    loop_vars: BTreeSet<String>,
}

impl Template {
    /// 编译模板。`defaults` 为构造期的基础绑定，后出现的覆盖先出现的；
    /// 渲染时传入的上下文又优先于这些基础绑定。
    pub fn compile(text: &str, defaults: &[Value]) -> Result<Template, CompileError> {
        let compiled = compiler::compile(text)?;
        let mut base = HashMap::new();
        for bindings in defaults {
            match bindings {
                Value::Map(m) => base.extend(m.clone()),
                Value::Null => {}
                other => return Err(CompileError::BadDefaults { kind: other.kind() }),
            }
        }
        debug!(
            "compile: instrs={}, vars={}, loop_vars={}",
            compiled.program.instrs.len(),
            compiled.all_vars.len(),
            compiled.loop_vars.len()
        );
        Ok(Template {
            program: compiled.program,
            base,
            all_vars: compiled.all_vars,
            loop_vars: compiled.loop_vars,
        })
    }

    /// Render with a serde-serializable context and the default attribute
    /// resolver. The context must serialize to a map (or to null for an
    /// empty context, e.g. `&()`).
    pub fn render<T: Serialize>(&self, context: &T) -> Result<String, RenderError> {
        let value = to_value(context).map_err(|e| RenderError::InvalidContext(e.to_string()))?;
        self.render_with(&value, &DefaultResolver)
    }

    /// Render with an explicit `Value` context, which may carry filter
    /// functions, and a caller-supplied attribute resolver.
    pub fn render_with(
        &self,
        context: &Value,
        dots: &dyn DotResolver,
    ) -> Result<String, RenderError> {
        let start = Instant::now();
        let merged = self.merged_context(context)?;
        let out = render::execute(&self.program, &merged, dots)?;
        debug!(
            "render: elapsed_ms={}, output_len={}",
            start.elapsed().as_millis(),
            out.len()
        );
        Ok(out)
    }

    /// Every variable name the template references.
    pub fn all_vars(&self) -> &BTreeSet<String> {
        &self.all_vars
    }

    /// The subset of variables bound by `for` targets.
    pub fn loop_vars(&self) -> &BTreeSet<String> {
        &self.loop_vars
    }

    // Call-time bindings win over construction-time defaults.
    fn merged_context(&self, context: &Value) -> Result<HashMap<String, Value>, RenderError> {
        let mut merged = self.base.clone();
        match context {
            Value::Null => {}
            Value::Map(m) => merged.extend(m.clone()),
            other => {
                return Err(RenderError::InvalidContext(format!(
                    "context must be a map, got {}",
                    other.kind()
                )));
            }
        }
        Ok(merged)
    }
}

/// 渲染命名模板。编译结果按内容哈希缓存，内容不变时直接复用。
pub fn render_template<T: Serialize>(
    name: &str,
    content: &str,
    context: &T,
) -> Result<String, TplError> {
    let template = cache::get_template(name, content)?;
    Ok(template.render(context)?)
}

/// 卸载指定名称的模板缓存
pub fn remove_template(name: &str) {
    cache::remove(name);
}
