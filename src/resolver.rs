use crate::error::RenderError;
use crate::value::Value;

/// Runtime resolver for dotted access chains such as `user.addr.city`.
/// The compiled program only records the path segments; how each segment
/// is looked up is decided here, at render time.
pub trait DotResolver {
    fn resolve(&self, value: &Value, path: &[String]) -> Result<Value, RenderError>;
}

impl<F> DotResolver for F
where
    F: Fn(&Value, &[String]) -> Result<Value, RenderError>,
{
    fn resolve(&self, value: &Value, path: &[String]) -> Result<Value, RenderError> {
        self(value, path)
    }
}

/// Map-key lookup first, list-index lookup for numeric segments.
pub struct DefaultResolver;

impl DotResolver for DefaultResolver {
    fn resolve(&self, value: &Value, path: &[String]) -> Result<Value, RenderError> {
        let mut current = value;
        for name in path {
            current = match current {
                Value::Map(m) => m.get(name).ok_or_else(|| RenderError::Lookup {
                    name: name.clone(),
                    kind: "map",
                })?,
                Value::List(items) => {
                    let ix: usize = name.parse().map_err(|_| RenderError::Lookup {
                        name: name.clone(),
                        kind: "list",
                    })?;
                    items.get(ix).ok_or_else(|| RenderError::Lookup {
                        name: name.clone(),
                        kind: "list",
                    })?
                }
                other => {
                    return Err(RenderError::Lookup {
                        name: name.clone(),
                        kind: other.kind(),
                    });
                }
            };
        }
        Ok(current.clone())
    }
}
