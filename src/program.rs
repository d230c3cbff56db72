//! Preprocessor and program image: strips comments, resolves
//! `` `define``/`` `ifdef``/`` `endif`` gating, strips `LABEL:` prefixes into
//! a name→index map, and records source line numbers for diagnostics
//! (spec §3 "Program image", §6 "Program text").

use std::collections::HashMap;

use crate::error::{ErrorKind, SimError, SimResult, Warning};

/// An ordered, preprocessed instruction listing ready for execution.
#[derive(Debug, Clone)]
pub struct Program {
    pub instructions: Vec<String>,
    pub labels: HashMap<String, usize>,
    pub source_line: Vec<usize>,
}

impl Program {
    /// Parses raw program text into a `Program`, plus any non-fatal
    /// warnings raised along the way (missing `end` is the only one this
    /// pass can observe; extension/overwrite warnings belong to the CLI's
    /// file-path handling).
    pub fn parse(text: &str) -> SimResult<(Program, Vec<Warning>)> {
        let mut instructions = Vec::new();
        let mut source_line = Vec::new();
        let mut labels = HashMap::new();
        let mut defines: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut ifdef_active: Option<(String, bool)> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let stripped = strip_comment(raw).trim();
            if stripped.is_empty() {
                continue;
            }

            if let Some(name) = stripped.strip_prefix("`define ") {
                defines.insert(name.trim().to_string());
                continue;
            }
            if let Some(name) = stripped.strip_prefix("`ifdef ") {
                if ifdef_active.is_some() {
                    return Err(SimError::new(
                        line_no,
                        stripped,
                        ErrorKind::ProgramStructure("nested `ifdef` blocks are not supported".into()),
                    ));
                }
                let name = name.trim().to_string();
                let active = defines.contains(&name);
                ifdef_active = Some((name, active));
                continue;
            }
            if stripped == "`endif" {
                if ifdef_active.is_none() {
                    return Err(SimError::new(
                        line_no,
                        stripped,
                        ErrorKind::ProgramStructure("`endif` with no matching `ifdef`".into()),
                    ));
                }
                ifdef_active = None;
                continue;
            }
            if let Some((_, active)) = &ifdef_active {
                if !active {
                    continue;
                }
            }

            let (label, instr) = split_label(stripped);
            if let Some(label) = label {
                labels.insert(label.to_string(), instructions.len());
            }
            if instr.is_empty() {
                continue;
            }
            instructions.push(instr.to_string());
            source_line.push(line_no);
        }

        let mut warnings = Vec::new();
        if instructions.first().map(|s| !s.starts_with("config(")).unwrap_or(true) {
            return Err(SimError::new(
                source_line.first().copied().unwrap_or(0),
                instructions.first().cloned().unwrap_or_default(),
                ErrorKind::ProgramStructure("the first instruction must be config(n=...,q=...)".into()),
            ));
        }
        if instructions.last().map(|s| s != "end").unwrap_or(true) {
            instructions.push("end".to_string());
            source_line.push(source_line.last().copied().unwrap_or(0));
            warnings.push(Warning::MissingEnd);
        }

        Ok((
            Program {
                instructions,
                labels,
                source_line,
            },
            warnings,
        ))
    }

    pub fn line_of(&self, pc: usize) -> usize {
        self.source_line.get(pc).copied().unwrap_or(0)
    }

    pub fn resolve_label(&self, name: &str, line: usize, instr: &str) -> SimResult<usize> {
        self.labels.get(name).copied().ok_or_else(|| {
            SimError::new(
                line,
                instr,
                ErrorKind::ProgramStructure(format!("unknown label \"{name}\"")),
            )
        })
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn split_label(line: &str) -> (Option<&str>, &str) {
    if let Some(colon) = line.find(':') {
        let (label, rest) = line.split_at(colon);
        if label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') && !label.is_empty() {
            return (Some(label), rest[1..].trim());
        }
    }
    (None, line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comments_and_blank_lines() {
        let text = "config(n=256,q=7681) # set up\n\nend\n";
        let (program, warnings) = Program::parse(text).unwrap();
        assert_eq!(program.instructions, vec!["config(n=256,q=7681)", "end"]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn appends_missing_end_with_warning() {
        let text = "config(n=256,q=7681)\nnop\n";
        let (program, warnings) = Program::parse(text).unwrap();
        assert_eq!(program.instructions.last().unwrap(), "end");
        assert_eq!(warnings, vec![Warning::MissingEnd]);
    }

    #[test]
    fn resolves_labels_to_instruction_index() {
        let text = "config(n=256,q=7681)\nLOOP: nop\nif(flag==0) goto LOOP\nend\n";
        let (program, _) = Program::parse(text).unwrap();
        assert_eq!(program.labels.get("LOOP"), Some(&1));
    }

    #[test]
    fn ifdef_gates_undefined_blocks_as_no_ops() {
        let text = "config(n=256,q=7681)\n`ifdef FOO\nnop\n`endif\nend\n";
        let (program, _) = Program::parse(text).unwrap();
        assert_eq!(program.instructions, vec!["config(n=256,q=7681)", "end"]);
    }

    #[test]
    fn ifdef_includes_defined_blocks() {
        let text = "`define FOO\nconfig(n=256,q=7681)\n`ifdef FOO\nnop\n`endif\nend\n";
        let (program, _) = Program::parse(text).unwrap();
        assert_eq!(program.instructions, vec!["config(n=256,q=7681)", "nop", "end"]);
    }

    #[test]
    fn missing_config_first_is_program_structure_error() {
        let text = "nop\nend\n";
        let err = Program::parse(text).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ProgramStructure(_)));
    }

    #[test]
    fn nested_ifdef_is_rejected() {
        let text = "config(n=256,q=7681)\n`ifdef FOO\n`ifdef BAR\nnop\n`endif\n`endif\nend\n";
        let err = Program::parse(text).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ProgramStructure(_)));
    }
}
