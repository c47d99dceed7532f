//! Containerfile stage parser
//!
//! The syntax tree comes from `dockerfile_parser`. This module turns its
//! stages into owned `Stage` values, with the physical line of every FROM
//! and RUN word, exact stage name matching and an error for stages that are
//! used before they are declared.

use common::ParseError;
use dockerfile_parser::{
    BreakableStringComponent, Dockerfile, FromInstruction, Instruction, RunInstruction,
    ShellOrExecExpr, StageParent,
};
use tracing::debug;

use crate::types::{BaseImage, RunCommand, SourceLine, Stage};

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Maps byte offsets of the syntax tree to 1-based line numbers
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(pos, _)| pos + 1))
            .collect();
        LineIndex { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&start| start <= offset)
    }
}

/// Parse Containerfile text into its stages, in source order
pub fn parse(text: &str) -> Result<Vec<Stage>, ParseError> {
    let text = text.strip_prefix(BYTE_ORDER_MARK).unwrap_or(text);
    let dockerfile = Dockerfile::parse(text).map_err(|e| ParseError::Syntax {
        message: e.to_string(),
    })?;

    let lines = LineIndex::new(text);
    let parsed = dockerfile.stages();
    if parsed.stages.is_empty() {
        return Err(ParseError::NoStages);
    }

    let mut stages: Vec<Stage> = Vec::with_capacity(parsed.stages.len());
    for stage in &parsed.stages {
        let Some(Instruction::From(from)) = stage.instructions.first() else {
            return Err(ParseError::Syntax {
                message: format!("stage {} does not start with FROM", stage.index),
            });
        };

        let line = lines.line_of(from.span.start);
        let name = from.alias.as_ref().map(|alias| alias.content.clone());

        // The syntax tree matches stage names case-insensitively
        let parent = match &stage.parent {
            StageParent::Stage(_) => stages
                .iter()
                .find(|earlier| earlier.name.as_deref() == Some(from.image.content.as_str()))
                .map(|earlier| earlier.index),
            StageParent::Image(_) | StageParent::Scratch => None,
        };
        let base = match parent {
            Some(parent) => BaseImage::Stage(parent),
            None => BaseImage::External(from_image(&dockerfile, from)),
        };

        let runs = stage
            .instructions
            .iter()
            .filter_map(|instruction| match instruction {
                Instruction::Run(run) => Some(run_command(&lines, run)),
                _ => None,
            })
            .collect();

        debug!(index = stage.index, name = ?name, base = ?base, line, "Found stage");

        stages.push(Stage {
            index: stages.len(),
            name,
            base,
            line,
            lines: Vec::new(),
            runs,
        });
    }

    attach_source_lines(text, &mut stages);
    check_forward_references(&stages)?;

    debug!(count = stages.len(), "Parsed build stages");
    Ok(stages)
}

/// Follow parent stages until an external image is reached
pub fn resolve_base_image(stages: &[Stage], index: usize) -> &str {
    let mut current = index;
    loop {
        match &stages[current].base {
            BaseImage::External(image) => return image,
            // Parents always precede their children, so this terminates
            BaseImage::Stage(parent) => current = *parent,
        }
    }
}

/// The FROM image with global ARG defaults substituted
fn from_image(dockerfile: &Dockerfile, from: &FromInstruction) -> String {
    let raw = &from.image.content;
    if !raw.contains('$') {
        return raw.clone();
    }

    match from.image_parsed.resolve_vars(dockerfile) {
        Some(resolved) => resolved.to_string(),
        None => {
            debug!(image = %raw, "FROM image uses an undeclared ARG");
            raw.clone()
        }
    }
}

fn run_command(lines: &LineIndex, run: &RunInstruction) -> RunCommand {
    let segments = match &run.expr {
        ShellOrExecExpr::Shell(shell) => shell
            .components
            .iter()
            .filter_map(|component| match component {
                BreakableStringComponent::String(part) => {
                    Some((lines.line_of(part.span.start), part.content.clone()))
                }
                BreakableStringComponent::Comment(_) => None,
            })
            .collect(),
        ShellOrExecExpr::Exec(exec) => exec
            .elements
            .iter()
            .map(|element| (lines.line_of(element.span.start), element.content.clone()))
            .collect(),
    };

    RunCommand {
        line: lines.line_of(run.span.start),
        segments,
    }
}

/// Give every stage the physical lines between its FROM and the next one
fn attach_source_lines(text: &str, stages: &mut [Stage]) {
    let physical: Vec<&str> = text.lines().collect();
    let starts: Vec<usize> = stages.iter().map(|stage| stage.line).collect();

    for (position, stage) in stages.iter_mut().enumerate() {
        let end = starts
            .get(position + 1)
            .map(|next| next - 1)
            .unwrap_or(physical.len());
        stage.lines = physical
            .iter()
            .enumerate()
            .take(end)
            .skip(stage.line)
            .map(|(idx, text)| SourceLine {
                number: idx + 1,
                text: text.to_string(),
            })
            .collect();
    }
}

/// A bare word that names a stage declared at or after its use is an error
fn check_forward_references(stages: &[Stage]) -> Result<(), ParseError> {
    for stage in stages {
        let BaseImage::External(image) = &stage.base else {
            continue;
        };
        if image.contains([':', '/', '@']) {
            continue;
        }
        if stages[stage.index..]
            .iter()
            .any(|later| later.name.as_deref() == Some(image.as_str()))
        {
            return Err(ParseError::UnresolvedStage {
                name: image.clone(),
                line: stage.line,
            });
        }
    }
    Ok(())
}
