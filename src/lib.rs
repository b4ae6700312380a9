//! 轻量级文本模板引擎。模板一次编译为扁平指令序列，之后以不同上下文
//! 反复渲染；支持 `{{ expr }}` 插值、`{% if %}` / `{% for %}` 控制块、
//! `{# comment #}` 注释，以及点号路径与管道过滤器。

mod cache;
mod compiler;
pub mod engine;
pub mod error;
mod expr;
mod program;
mod render;
pub mod resolver;
pub mod serializer;
mod tokenizer;
pub mod value;

pub use engine::{Template, remove_template, render_template};
pub use error::{CompileError, RenderError, TplError};
pub use resolver::{DefaultResolver, DotResolver};
pub use serializer::{SerializeError, to_value};
pub use value::{FilterFn, Value};
