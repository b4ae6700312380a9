use std::collections::BTreeSet;
use std::mem;

use crate::error::CompileError;
use crate::expr::{self, Expr};
use crate::program::{FIXME, Instr, Part, Program, ProgramBuilder};
use crate::tokenizer::{self, Token};

/// Result of one compilation pass: the executable program plus every
/// variable name the template references.
pub(crate) struct Compiled {
    pub(crate) program: Program,
    pub(crate) all_vars: BTreeSet<String>,
    pub(crate) loop_vars: BTreeSet<String>,
}

/// One open block on the directive stack.
struct OpenBlock {
    keyword: &'static str,
    at: usize,
}

pub(crate) fn compile(text: &str) -> Result<Compiled, CompileError> {
    Compiler::new().run(text)
}

struct Compiler {
    builder: ProgramBuilder,
    all_vars: BTreeSet<String>,
    loop_vars: BTreeSet<String>,
    buffered: Vec<Part>,
    ops: Vec<OpenBlock>,
}

impl Compiler {
    fn new() -> Self {
        Compiler {
            builder: ProgramBuilder::new(),
            all_vars: BTreeSet::new(),
            loop_vars: BTreeSet::new(),
            buffered: Vec::new(),
            ops: Vec::new(),
        }
    }

    fn run(mut self, text: &str) -> Result<Compiled, CompileError> {
        // The unpacking prologue depends on names discovered during the
        // walk, so its position is reserved up front and filled at the end.
        let vars_section = self.builder.open_section();

        for token in tokenizer::tokenize(text) {
            match token {
                Token::Comment(_) => {}
                Token::Text(t) => self.buffered.push(Part::Text(t.to_string())),
                Token::Var(_) => {
                    let e = self.expr_code(token.inner())?;
                    self.buffered.push(Part::Expr(e));
                }
                Token::Tag(raw) => self.directive(raw, token.inner())?,
            }
        }
        self.flush();

        if let Some(open) = self.ops.last() {
            return Err(CompileError::syntax("Unmatched action tag", open.keyword));
        }

        // Loop variables are bound by their `for` blocks, everything else
        // comes straight from the context.
        let loads: Vec<Instr> = self
            .all_vars
            .difference(&self.loop_vars)
            .map(|name| Instr::Load { name: name.clone() })
            .collect();
        self.builder.fill_section(vars_section, loads);

        let program = self.builder.finalize()?;
        Ok(Compiled {
            program,
            all_vars: self.all_vars,
            loop_vars: self.loop_vars,
        })
    }

    /// Emit the buffered output run as a single instruction.
    fn flush(&mut self) {
        if !self.buffered.is_empty() {
            let parts = mem::take(&mut self.buffered);
            self.builder.push(Instr::Emit { parts });
        }
    }

    /// Translate a dotted/piped expression, registering the names it uses.
    fn expr_code(&mut self, text: &str) -> Result<Expr, CompileError> {
        let e = expr::parse(text)?;
        self.all_vars.insert(e.base.clone());
        for filter in &e.filters {
            self.all_vars.insert(filter.clone());
        }
        Ok(e)
    }

    fn directive(&mut self, raw: &str, body: &str) -> Result<(), CompileError> {
        self.flush();
        let words: Vec<&str> = body.split_whitespace().collect();
        match words.first().copied() {
            Some("if") => {
                if words.len() != 2 {
                    return Err(CompileError::syntax("Don't understand if", raw));
                }
                let test = self.expr_code(words[1])?;
                self.ops.push(OpenBlock {
                    keyword: "if",
                    at: self.builder.pos(),
                });
                self.builder.push(Instr::If { test, exit: FIXME });
                self.builder.enter_block();
            }
            Some("for") => {
                if words.len() != 4 || words[2] != "in" {
                    return Err(CompileError::syntax("Don't understand for", raw));
                }
                expr::validate_name(words[1])?;
                self.all_vars.insert(words[1].to_string());
                self.loop_vars.insert(words[1].to_string());
                let collection = self.expr_code(words[3])?;
                self.ops.push(OpenBlock {
                    keyword: "for",
                    at: self.builder.pos(),
                });
                self.builder.push(Instr::For {
                    item: words[1].to_string(),
                    collection,
                    exit: FIXME,
                });
                self.builder.enter_block();
            }
            Some(word) if word.starts_with("end") => {
                if words.len() != 1 {
                    return Err(CompileError::syntax("Don't understand end", raw));
                }
                let suffix = &word[3..];
                let Some(open) = self.ops.pop() else {
                    return Err(CompileError::syntax("Too many ends", raw));
                };
                if open.keyword != suffix {
                    return Err(CompileError::syntax("Mismatched end tag", suffix));
                }
                if open.keyword == "for" {
                    self.builder.push(Instr::Next { back: open.at + 1 });
                }
                let target = self.builder.pos();
                self.builder.patch_exit(open.at, target);
                self.builder.exit_block();
            }
            _ => return Err(CompileError::syntax("Don't understand tag", raw)),
        }
        Ok(())
    }
}
