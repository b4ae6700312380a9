use std::collections::HashMap;

use crate::error::RenderError;
use crate::expr::Expr;
use crate::program::{Instr, Part, Program};
use crate::resolver::DotResolver;
use crate::value::Value;

/// One active `for` block.
struct Frame {
    item: String,
    values: Vec<Value>,
    idx: usize,
}

/// Execute a compiled program against the merged render context.
pub(crate) fn execute(
    program: &Program,
    context: &HashMap<String, Value>,
    dots: &dyn DotResolver,
) -> Result<String, RenderError> {
    let mut out = String::new();
    let mut env: HashMap<String, Value> = HashMap::new();
    let mut frames: Vec<Frame> = Vec::new();
    let mut ip = 0;

    while ip < program.instrs.len() {
        match &program.instrs[ip] {
            Instr::Load { name } => {
                let value = context
                    .get(name)
                    .cloned()
                    .ok_or_else(|| RenderError::MissingVariable(name.clone()))?;
                env.insert(name.clone(), value);
                ip += 1;
            }
            Instr::Emit { parts } => {
                for part in parts {
                    match part {
                        Part::Text(t) => out.push_str(t),
                        Part::Expr(e) => {
                            let value = eval_expr(e, &env, dots)?;
                            out.push_str(&value.to_string());
                        }
                    }
                }
                ip += 1;
            }
            Instr::If { test, exit } => {
                if eval_expr(test, &env, dots)?.is_truthy() {
                    ip += 1;
                } else {
                    ip = *exit;
                }
            }
            Instr::For {
                item,
                collection,
                exit,
            } => {
                let values = match eval_expr(collection, &env, dots)? {
                    Value::List(values) => values,
                    other => {
                        return Err(RenderError::NotIterable { kind: other.kind() });
                    }
                };
                if values.is_empty() {
                    ip = *exit;
                } else {
                    env.insert(item.clone(), values[0].clone());
                    frames.push(Frame {
                        item: item.clone(),
                        values,
                        idx: 0,
                    });
                    ip += 1;
                }
            }
            Instr::Next { back } => {
                let frame = frames.last_mut().expect("loop frame underflow");
                frame.idx += 1;
                if frame.idx < frame.values.len() {
                    env.insert(frame.item.clone(), frame.values[frame.idx].clone());
                    ip = *back;
                } else {
                    frames.pop();
                    ip += 1;
                }
            }
        }
    }
    Ok(out)
}

/// Evaluate base variable, dotted path, then filters left to right.
fn eval_expr(
    expr: &Expr,
    env: &HashMap<String, Value>,
    dots: &dyn DotResolver,
) -> Result<Value, RenderError> {
    let mut value = env
        .get(&expr.base)
        .cloned()
        .ok_or_else(|| RenderError::Unbound(expr.base.clone()))?;
    if !expr.path.is_empty() {
        value = dots.resolve(&value, &expr.path)?;
    }
    for name in &expr.filters {
        let filter = env
            .get(name)
            .ok_or_else(|| RenderError::Unbound(name.clone()))?;
        value = match filter {
            Value::Func(f) => (f.0)(&value).map_err(|message| RenderError::Filter {
                name: name.clone(),
                message,
            })?,
            _ => return Err(RenderError::NotCallable(name.clone())),
        };
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler;
    use crate::resolver::DefaultResolver;

    fn run(text: &str, ctx: &[(&str, Value)]) -> Result<String, RenderError> {
        let compiled = compiler::compile(text).expect("compile failed");
        let map: HashMap<String, Value> = ctx
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        execute(&compiled.program, &map, &DefaultResolver)
    }

    fn int_list(values: &[i64]) -> Value {
        Value::List(values.iter().map(|v| Value::I64(*v)).collect())
    }

    #[test]
    fn test_identity() {
        assert_eq!(run("hello\nworld", &[]).unwrap(), "hello\nworld");
    }

    #[test]
    fn test_interpolation_stringifies() {
        assert_eq!(
            run("n={{ n }}", &[("n", Value::I64(42))]).unwrap(),
            "n=42"
        );
        assert_eq!(run("{{ x }}", &[("x", Value::Null)]).unwrap(), "");
    }

    #[test]
    fn test_if_branches() {
        let text = "a{% if flag %}b{% endif %}c";
        assert_eq!(run(text, &[("flag", Value::Bool(true))]).unwrap(), "abc");
        assert_eq!(run(text, &[("flag", Value::Bool(false))]).unwrap(), "ac");
        assert_eq!(run(text, &[("flag", Value::List(vec![]))]).unwrap(), "ac");
    }

    #[test]
    fn test_for_in_order() {
        let text = "{% for n in nums %}{{ n }},{% endfor %}";
        assert_eq!(
            run(text, &[("nums", int_list(&[3, 1, 2]))]).unwrap(),
            "3,1,2,"
        );
        assert_eq!(run(text, &[("nums", int_list(&[]))]).unwrap(), "");
    }

    #[test]
    fn test_nested_blocks() {
        let text = "{% if a %}{% for b in c %}{{ b }}{% endfor %}{% endif %}";
        let ctx = [("a", Value::Bool(true)), ("c", int_list(&[1, 2, 3]))];
        assert_eq!(run(text, &ctx).unwrap(), "123");
        let ctx = [("a", Value::Bool(false)), ("c", int_list(&[1, 2, 3]))];
        assert_eq!(run(text, &ctx).unwrap(), "");
    }

    #[test]
    fn test_loop_variable_persists_after_loop() {
        let text = "{% for x in xs %}{% endfor %}{{ x }}";
        assert_eq!(run(text, &[("xs", int_list(&[1, 2, 3]))]).unwrap(), "3");
    }

    #[test]
    fn test_loop_variable_before_binding() {
        let text = "{{ x }}{% for x in xs %}{% endfor %}";
        let err = run(text, &[("xs", int_list(&[1]))]).unwrap_err();
        assert_eq!(err, RenderError::Unbound("x".to_string()));
    }

    #[test]
    fn test_missing_variable_is_strict() {
        // The prologue loads every non-loop variable, even ones only used
        // inside branches that are not taken.
        let text = "{% if flag %}{{ y }}{% endif %}";
        let err = run(text, &[("flag", Value::Bool(false))]).unwrap_err();
        assert_eq!(err, RenderError::MissingVariable("y".to_string()));
    }

    #[test]
    fn test_dotted_lookup() {
        let mut obj = HashMap::new();
        obj.insert("y".to_string(), Value::Str("v".to_string()));
        assert_eq!(
            run("{{ obj.y }}", &[("obj", Value::Map(obj))]).unwrap(),
            "v"
        );
    }

    #[test]
    fn test_list_index_lookup() {
        let ctx = [(
            "xs",
            Value::List(vec![
                Value::Str("a".to_string()),
                Value::Str("b".to_string()),
            ]),
        )];
        assert_eq!(run("{{ xs.1 }}", &ctx).unwrap(), "b");
    }

    #[test]
    fn test_filter_applies() {
        let upper = Value::filter(|v| match v {
            Value::Str(s) => Ok(Value::Str(s.to_uppercase())),
            other => Err(format!("upper expects str, got {}", other.kind())),
        });
        let ctx = [("name", Value::Str("ned".to_string())), ("upper", upper)];
        assert_eq!(run("{{ name|upper }}", &ctx).unwrap(), "NED");
    }

    #[test]
    fn test_filter_error_wrapped() {
        let upper = Value::filter(|v| match v {
            Value::Str(s) => Ok(Value::Str(s.to_uppercase())),
            other => Err(format!("upper expects str, got {}", other.kind())),
        });
        let ctx = [("n", Value::I64(1)), ("upper", upper)];
        let err = run("{{ n|upper }}", &ctx).unwrap_err();
        assert_eq!(
            err,
            RenderError::Filter {
                name: "upper".to_string(),
                message: "upper expects str, got int".to_string()
            }
        );
    }

    #[test]
    fn test_filter_must_be_callable() {
        let ctx = [("a", Value::I64(1)), ("f", Value::I64(2))];
        let err = run("{{ a|f }}", &ctx).unwrap_err();
        assert_eq!(err, RenderError::NotCallable("f".to_string()));
    }

    #[test]
    fn test_only_lists_iterate() {
        let err = run("{% for x in n %}{% endfor %}", &[("n", Value::I64(5))]).unwrap_err();
        assert_eq!(err, RenderError::NotIterable { kind: "int" });
    }

    #[test]
    fn test_loop_bound_filter() {
        let double = Value::filter(|v| match v {
            Value::I64(n) => Ok(Value::I64(n * 2)),
            other => Err(format!("double expects int, got {}", other.kind())),
        });
        let ctx = [
            ("n", Value::I64(5)),
            ("fs", Value::List(vec![double])),
        ];
        assert_eq!(run("{% for f in fs %}{{ n|f }}{% endfor %}", &ctx).unwrap(), "10");
    }
}
