use std::fmt;
use std::mem;

use crate::error::CompileError;
use crate::expr::Expr;

/// Placeholder jump target, patched before `finalize`.
pub(crate) const FIXME: usize = usize::MAX;

/// One piece of buffered output inside an `Emit`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Part {
    Text(String),
    Expr(Expr),
}

/// One interpreter instruction.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Instr {
    /// Bind a non-loop variable from the render context into the environment.
    Load { name: String },
    /// Append one flushed run of literal and expression output.
    Emit { parts: Vec<Part> },
    /// Begin an `if` block; a falsy test jumps to `exit`.
    If { test: Expr, exit: usize },
    /// Begin a `for` block, binding `item` to each element of `collection`;
    /// an empty collection jumps to `exit`.
    For {
        item: String,
        collection: Expr,
        exit: usize,
    },
    /// End of a `for` body: advance the innermost loop or fall through.
    Next { back: usize },
}

/// A compiled, executable instruction sequence.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Program {
    pub(crate) instrs: Vec<Instr>,
}

/// Handle for a reserved position whose instructions arrive later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SectionId(usize);

enum Elem {
    Instr(Instr),
    Section(usize),
}

/// Accumulates instructions during compilation. Jump targets reference
/// element positions until `finalize` splices the sections in and remaps
/// every target to a flat instruction index.
pub(crate) struct ProgramBuilder {
    elements: Vec<Elem>,
    sections: Vec<Vec<Instr>>,
    depth: usize,
}

impl ProgramBuilder {
    pub(crate) fn new() -> Self {
        ProgramBuilder {
            elements: Vec::new(),
            sections: Vec::new(),
            depth: 0,
        }
    }

    /// Next element position; block instructions record it for backpatching.
    pub(crate) fn pos(&self) -> usize {
        self.elements.len()
    }

    pub(crate) fn push(&mut self, instr: Instr) {
        self.elements.push(Elem::Instr(instr));
    }

    /// Reserve a position whose instructions are supplied later via
    /// `fill_section`. An unfilled section contributes nothing.
    pub(crate) fn open_section(&mut self) -> SectionId {
        let id = self.sections.len();
        self.sections.push(Vec::new());
        self.elements.push(Elem::Section(id));
        SectionId(id)
    }

    pub(crate) fn fill_section(&mut self, id: SectionId, instrs: Vec<Instr>) {
        self.sections[id.0] = instrs;
    }

    pub(crate) fn enter_block(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn exit_block(&mut self) {
        debug_assert!(self.depth > 0, "exit_block without matching enter_block");
        self.depth -= 1;
    }

    /// Rewrite the pending jump of the block instruction at element `at`.
    pub(crate) fn patch_exit(&mut self, at: usize, target: usize) {
        match &mut self.elements[at] {
            Elem::Instr(Instr::If { exit, .. }) | Elem::Instr(Instr::For { exit, .. }) => {
                *exit = target;
            }
            _ => unreachable!("patch target is not a block instruction"),
        }
    }

    /// Splice sections into place and resolve element positions to flat
    /// instruction indexes. Fails when blocks are still open; the directive
    /// stack reports unbalanced templates before this check can fire.
    pub(crate) fn finalize(mut self) -> Result<Program, CompileError> {
        if self.depth != 0 {
            return Err(CompileError::Unbalanced { open: self.depth });
        }
        let mut instrs = Vec::new();
        // Element position -> flat index, with one extra slot so that jumps
        // past the last element resolve to the program end.
        let mut flat_pos = Vec::with_capacity(self.elements.len() + 1);
        for elem in self.elements {
            flat_pos.push(instrs.len());
            match elem {
                Elem::Instr(instr) => instrs.push(instr),
                Elem::Section(id) => instrs.append(&mut mem::take(&mut self.sections[id])),
            }
        }
        flat_pos.push(instrs.len());
        for instr in &mut instrs {
            match instr {
                Instr::If { exit, .. } | Instr::For { exit, .. } => *exit = flat_pos[*exit],
                Instr::Next { back } => *back = flat_pos[*back],
                _ => {}
            }
        }
        Ok(Program { instrs })
    }
}

// Readable listing for tracing and tests.
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (ix, instr) in self.instrs.iter().enumerate() {
            writeln!(f, "{:04} {}", ix, instr)?;
        }
        Ok(())
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Load { name } => write!(f, "load {}", name),
            Instr::Emit { parts } => {
                f.write_str("emit ")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
            Instr::If { test, exit } => write!(f, "if {} else -> {:04}", test, exit),
            Instr::For {
                item,
                collection,
                exit,
            } => write!(f, "for {} in {} done -> {:04}", item, collection, exit),
            Instr::Next { back } => write!(f, "next -> {:04}", back),
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Part::Text(t) => write!(f, "{:?}", t),
            Part::Expr(e) => write!(f, "{{{}}}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr {
            base: name.to_string(),
            path: vec![],
            filters: vec![],
        }
    }

    fn text(t: &str) -> Instr {
        Instr::Emit {
            parts: vec![Part::Text(t.to_string())],
        }
    }

    #[test]
    fn test_linear_program() {
        let mut b = ProgramBuilder::new();
        b.push(text("a"));
        b.push(text("b"));
        let p = b.finalize().unwrap();
        assert_eq!(p.instrs, vec![text("a"), text("b")]);
    }

    #[test]
    fn test_section_splice_and_remap() {
        // Element layout: [section][if][emit], the if exits past the end.
        let mut b = ProgramBuilder::new();
        let section = b.open_section();
        assert_eq!(b.pos(), 1);
        b.push(Instr::If {
            test: var("flag"),
            exit: FIXME,
        });
        b.enter_block();
        b.push(text("hi"));
        b.exit_block();
        b.patch_exit(1, 3);
        b.fill_section(
            section,
            vec![
                Instr::Load {
                    name: "flag".to_string(),
                },
                Instr::Load {
                    name: "other".to_string(),
                },
            ],
        );

        let p = b.finalize().unwrap();
        // The two loads shift everything after the section by one.
        assert_eq!(p.instrs.len(), 4);
        assert!(matches!(&p.instrs[0], Instr::Load { name } if name == "flag"));
        assert!(matches!(&p.instrs[1], Instr::Load { name } if name == "other"));
        match &p.instrs[2] {
            Instr::If { exit, .. } => assert_eq!(*exit, 4),
            other => panic!("unexpected instruction: {other:?}"),
        }
    }

    #[test]
    fn test_empty_section_vanishes() {
        let mut b = ProgramBuilder::new();
        b.open_section();
        b.push(text("x"));
        let p = b.finalize().unwrap();
        assert_eq!(p.instrs, vec![text("x")]);
    }

    #[test]
    fn test_next_back_remap() {
        let mut b = ProgramBuilder::new();
        let section = b.open_section();
        b.push(Instr::For {
            item: "x".to_string(),
            collection: var("xs"),
            exit: FIXME,
        });
        b.enter_block();
        b.push(text("."));
        b.push(Instr::Next { back: 2 });
        b.patch_exit(1, b.pos());
        b.exit_block();
        b.fill_section(
            section,
            vec![Instr::Load {
                name: "xs".to_string(),
            }],
        );

        let p = b.finalize().unwrap();
        match &p.instrs[1] {
            Instr::For { exit, .. } => assert_eq!(*exit, 4),
            other => panic!("unexpected instruction: {other:?}"),
        }
        match &p.instrs[3] {
            Instr::Next { back } => assert_eq!(*back, 2),
            other => panic!("unexpected instruction: {other:?}"),
        }
    }

    #[test]
    fn test_unbalanced_blocks_rejected() {
        let mut b = ProgramBuilder::new();
        b.push(Instr::If {
            test: var("a"),
            exit: FIXME,
        });
        b.enter_block();
        let err = b.finalize().unwrap_err();
        assert_eq!(err, CompileError::Unbalanced { open: 1 });
    }

    #[test]
    fn test_listing() {
        let mut b = ProgramBuilder::new();
        b.push(Instr::Load {
            name: "n".to_string(),
        });
        b.push(Instr::Emit {
            parts: vec![Part::Text("a".to_string()), Part::Expr(var("n"))],
        });
        let listing = b.finalize().unwrap().to_string();
        assert!(listing.contains("0000 load n"));
        assert!(listing.contains("0001 emit \"a\", {n}"));
    }
}
