//! Pinned package detection
//!
//! Best effort: RUN instructions (shell or exec form) are split into words
//! keeping the physical line of each word, words are grouped into shell
//! commands, and the
//! arguments of `<manager> ... install ...` commands are offered to the
//! manager's driver as pins. Anything not understood is ignored.

use tracing::debug;

use crate::drivers::DriverRegistry;
use crate::types::{PinnedPackage, RunCommand, Stage};

const SEPARATORS: [&str; 5] = ["&&", "||", ";", "|", "&"];
const WRAPPERS: [&str; 4] = ["sudo", "env", "sh", "bash"];

/// A word of a RUN instruction and the physical line it came from
#[derive(Debug, Clone, PartialEq)]
struct Word<'a> {
    line: usize,
    text: &'a str,
}

pub struct PinDetector<'a> {
    registry: &'a DriverRegistry,
}

impl<'a> PinDetector<'a> {
    pub fn new(registry: &'a DriverRegistry) -> Self {
        PinDetector { registry }
    }

    /// All pins of a stage; a package pinned twice keeps its last version
    pub fn detect_pins(&self, stage: &Stage) -> Vec<PinnedPackage> {
        let mut pins: Vec<PinnedPackage> = Vec::new();

        for run in &stage.runs {
            let words = run_words(run);
            for command in split_commands(&words) {
                self.collect_pins(stage.index, command, &mut pins);
            }
        }

        debug!(stage = stage.index, count = pins.len(), "Detected pinned packages");
        pins
    }

    fn collect_pins(&self, stage_index: usize, command: &[Word<'_>], pins: &mut Vec<PinnedPackage>) {
        let mut words = command.iter().skip_while(|word| is_command_prefix(word.text));

        let Some(binary) = words.next() else {
            return;
        };
        let Some(driver) = self.registry.driver_for_binary(binary.text) else {
            return;
        };

        let mut words = words.skip_while(|word| word.text != "install");
        if words.next().is_none() {
            return;
        }

        for word in words.filter(|word| !word.text.starts_with('-')) {
            let Some((package, version)) = driver.parse_pin(word.text) else {
                continue;
            };

            match pins.iter_mut().find(|pin| pin.package == package) {
                Some(existing) => {
                    existing.version = version;
                    existing.line = word.line;
                }
                None => pins.push(PinnedPackage {
                    stage_index,
                    package,
                    version,
                    line: word.line,
                }),
            }
        }
    }
}

/// RUN flags, env assignments and wrappers that come before the real binary
fn is_command_prefix(word: &str) -> bool {
    let binary = word.rsplit('/').next().unwrap_or(word);
    word.starts_with('-')
        || WRAPPERS.iter().any(|wrapper| *wrapper == binary)
        || is_env_assignment(word)
}

fn is_env_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Exec-form elements are split too, so `["sh", "-c", "dnf install ..."]` works
fn run_words(run: &RunCommand) -> Vec<Word<'_>> {
    let mut words = Vec::new();

    for (line, text) in &run.segments {
        for raw in text.split_whitespace() {
            push_word(&mut words, *line, raw);
        }
    }

    words
}

/// Split shell separators glued to a word (`curl=1;`, `(dnf`) into their own words
fn push_word<'a>(words: &mut Vec<Word<'a>>, line: usize, raw: &'a str) {
    let raw = raw.trim_start_matches(['(', '{', '"', '\'']);
    let raw = raw.trim_end_matches([')', '}', '"', '\'']);

    for separator in SEPARATORS {
        if raw != separator {
            if let Some(head) = raw.strip_suffix(separator) {
                let head = head.trim_end_matches([')', '}', '"', '\'']);
                if !head.is_empty() {
                    words.push(Word { line, text: head });
                }
                words.push(Word { line, text: separator });
                return;
            }
        }
    }

    if !raw.is_empty() {
        words.push(Word { line, text: raw });
    }
}

fn split_commands<'w, 'a>(words: &'w [Word<'a>]) -> impl Iterator<Item = &'w [Word<'a>]> {
    words
        .split(|word| SEPARATORS.iter().any(|separator| *separator == word.text))
        .filter(|command| !command.is_empty())
}
