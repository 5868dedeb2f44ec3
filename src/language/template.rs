//! Built-in `template` language
//!
//! Plain text with line directives:
//!
//! ```text
//! #-- comment, dropped from the output
//! #include "lib/header.tmpl"
//! #include footer.tmpl
//! ## a literal line starting with '#'
//! ```
//!
//! `#` followed by a letter starts a directive; any directive other than
//! `include` is a syntax error. Other lines are copied verbatim. Includes are
//! expanded at compile time, so the artifact is the final text.

use std::sync::Arc;

use super::{CompileError, CompileUnit, IncludeResolver, LanguageAdapter, Program};
use crate::error::Position;

/// Expanded template text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    text: String,
    includes: Vec<String>,
}

impl Template {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Documents inlined directly by this one, in order of appearance
    pub fn includes(&self) -> &[String] {
        &self.includes
    }
}

pub struct TemplateAdapter;

const INCLUDE: &str = "include";

impl LanguageAdapter for TemplateAdapter {
    fn name(&self) -> &str {
        "template"
    }

    fn tags(&self) -> &[&str] {
        &["tmpl", "txt"]
    }

    fn compile(
        &self,
        unit: &CompileUnit<'_>,
        includes: &dyn IncludeResolver,
    ) -> Result<Program, CompileError> {
        let mut template = Template {
            text: String::with_capacity(unit.source.len()),
            includes: Vec::new(),
        };

        for (index, raw) in unit.source.split_inclusive('\n').enumerate() {
            let line_number = u32::try_from(index + 1).unwrap_or(u32::MAX);
            let line = raw.trim_end_matches(['\n', '\r']);

            if let Some(escaped) = line.strip_prefix("##") {
                template.text.push('#');
                template.text.push_str(escaped);
                template.text.push_str(&raw[line.len()..]);
                continue;
            }
            if line.starts_with("#--") {
                continue;
            }

            let Some(directive) = directive_of(line) else {
                template.text.push_str(raw);
                continue;
            };

            if directive != INCLUDE {
                return Err(CompileError::syntax(
                    format!("unknown directive '#{}'", directive),
                    Position::new(line_number, 1),
                ));
            }

            let operand_column = 1 + INCLUDE.len();
            let name = parse_operand(&line[operand_column..], line_number, operand_column)?;
            let artifact = includes.include(&name, Position::new(line_number, 1))?;
            let included = artifact.program::<Template>().ok_or_else(|| {
                CompileError::preparation(format!(
                    "{} is not a template and cannot be inlined",
                    name
                ))
            })?;

            template.text.push_str(included.text());
            template.includes.push(name);
        }

        Ok(Arc::new(template))
    }
}

fn directive_of(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('#')?;
    if !rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Parse the include target; `offset` is the 0-based column where `rest` starts
fn parse_operand(rest: &str, line: u32, offset: usize) -> Result<String, CompileError> {
    let trimmed = rest.trim_start();
    let start = offset + (rest.len() - trimmed.len());
    let column = u32::try_from(start + 1).unwrap_or(u32::MAX);
    let trimmed = trimmed.trim_end();

    if trimmed.is_empty() {
        return Err(CompileError::syntax(
            "#include requires a document name",
            Position::new(line, column),
        ));
    }

    if let Some(quoted) = trimmed.strip_prefix('"') {
        let name = quoted.strip_suffix('"').ok_or_else(|| {
            CompileError::syntax("unterminated document name", Position::new(line, column))
        })?;
        if name.is_empty() || name.contains('"') {
            return Err(CompileError::syntax(
                "invalid document name",
                Position::new(line, column),
            ));
        }
        return Ok(name.to_string());
    }

    if trimmed.contains(char::is_whitespace) {
        return Err(CompileError::syntax(
            "unexpected text after document name",
            Position::new(line, column),
        ));
    }
    Ok(trimmed.to_string())
}
