//! Annotated script parsing
//!
//! Test authors configure a script through directives in comment lines:
//!
//! ```text
//! # name: resize-bicubic
//! # frame: 5
//! # access: Sequential
//! # test case: w=640,h=480
//! # test case: {{name: big; vars: w=1920,h=1080; kind: fps; frames: 200; skip: 10}}
//! ```
//!
//! Each `test case` directive yields one [`TestCase`] whose script text has
//! its variables substituted. A script without any yields a single default
//! case with the text untouched.

use std::ops::Range;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::case::{AccessMode, Parameter, TestCase, TestKind};
use crate::common::{Error, Result};

/// Character that starts a directive line
pub const DIRECTIVE_MARKER: char = '#';

const STRUCTURED_OPEN: &str = "{{";
const STRUCTURED_CLOSE: &str = "}}";

/// Parameters of one `test case` directive
#[derive(Debug, Clone, Default, PartialEq)]
struct CaseSpec {
    name: Option<String>,
    image_name: Option<String>,
    kind: TestKind,
    frame_count: u32,
    skip_first: u32,
    variables: Vec<Parameter>,
}

/// A parsed script and its declared parameter variants
#[derive(Debug, Clone)]
pub struct Script {
    name: String,
    path: Option<PathBuf>,
    text: String,
    frame: u32,
    access: AccessMode,
    cases: Vec<CaseSpec>,
}

impl Script {
    /// Read and parse a script file; the display name defaults to the file stem
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut script = Self::parse(&stem, &text)?;
        script.path = Some(path.to_path_buf());
        Ok(script)
    }

    /// Parse script text
    pub fn parse(default_name: &str, text: &str) -> Result<Self> {
        let mut script = Self {
            name: default_name.to_string(),
            path: None,
            text: text.to_string(),
            frame: 0,
            access: AccessMode::default(),
            cases: Vec::new(),
        };

        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            if !line.starts_with(DIRECTIVE_MARKER) {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key
                .trim_start_matches(|c: char| c == DIRECTIVE_MARKER || c == '~')
                .trim()
                .to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "test case" => {
                    let case = if let Some(rest) = value.strip_prefix(STRUCTURED_OPEN) {
                        let inner = rest.strip_suffix(STRUCTURED_CLOSE).ok_or_else(|| {
                            Error::parsing(
                                line_number,
                                "no closing }} found, multiline test cases are not supported",
                            )
                        })?;
                        parse_structured_case(line_number, inner)?
                    } else {
                        CaseSpec {
                            variables: parse_variables(line_number, value)?,
                            ..CaseSpec::default()
                        }
                    };
                    script.cases.push(case);
                }
                "frame" => {
                    script.frame = parse_int(line_number, "frame", value)?;
                }
                "access" => {
                    script.access = value
                        .parse()
                        .map_err(|reason: String| Error::parsing(line_number, reason))?;
                }
                "name" => {
                    if value.is_empty() {
                        return Err(Error::parsing(line_number, "empty script name"));
                    }
                    script.name = value.to_string();
                }
                _ => {}
            }
        }

        Ok(script)
    }

    /// Display name of the script
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the script was read from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Resolve every declared variant into a test case, in declaration order
    pub fn test_cases(&self) -> Vec<TestCase> {
        if self.cases.is_empty() {
            return vec![TestCase {
                name: self.name.clone(),
                image_name: None,
                script_text: self.text.clone(),
                frame: self.frame,
                access: self.access,
                kind: TestKind::Correctness,
                frame_count: 0,
                skip_first: 0,
                parameters: Vec::new(),
            }];
        }

        self.cases
            .iter()
            .map(|case| TestCase {
                name: case.name.clone().unwrap_or_else(|| self.name.clone()),
                image_name: case.image_name.clone(),
                script_text: substitute(&self.text, &case.variables),
                frame: self.frame,
                access: self.access,
                kind: case.kind,
                frame_count: case.frame_count,
                skip_first: case.skip_first,
                parameters: case.variables.clone(),
            })
            .collect()
    }
}

fn parse_structured_case(line: usize, body: &str) -> Result<CaseSpec> {
    let mut case = CaseSpec::default();

    for attribute in body.split(';').filter(|a| !a.trim().is_empty()) {
        let (key, value) = attribute.split_once(':').ok_or_else(|| {
            Error::parsing(line, format!("invalid attribute '{}'", attribute.trim()))
        })?;
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        match key.as_str() {
            "name" => case.name = Some(value.to_string()),
            "img-name" | "image-name" => case.image_name = Some(value.to_string()),
            "vars" | "variables" => case.variables = parse_variables(line, value)?,
            "kind" => case.kind = TestKind::from_directive(value),
            "frames" => case.frame_count = parse_int(line, "frames", value)?,
            "skip" => case.skip_first = parse_int(line, "skip", value)?,
            _ => {
                return Err(Error::parsing(line, format!("unknown attribute '{}'", key)));
            }
        }
    }

    Ok(case)
}

/// Parse a `key=value[,key=value...]` list
fn parse_variables(line: usize, value: &str) -> Result<Vec<Parameter>> {
    let mut parameters = Vec::new();
    for pair in value.split(',').filter(|p| !p.trim().is_empty()) {
        let parsed = pair
            .split_once('=')
            .map(|(name, value)| (name.trim(), value.trim()))
            .filter(|(name, value)| !name.is_empty() && !value.is_empty() && !value.contains('='));

        let Some((name, value)) = parsed else {
            return Err(Error::parsing(
                line,
                format!("invalid parameter pair '{}'", pair.trim()),
            ));
        };
        parameters.push(Parameter {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    if parameters.is_empty() {
        return Err(Error::parsing(line, "test case declares no parameters"));
    }
    Ok(parameters)
}

fn parse_int(line: usize, what: &str, value: &str) -> Result<u32> {
    value.parse().map_err(|_| {
        Error::parsing(
            line,
            format!("invalid {} value '{}', expected a non-negative integer", what, value),
        )
    })
}

/// Bind parameters into script text
///
/// Each parameter replaces the first line assigning a variable of the same
/// name (case-insensitive, surrounding whitespace ignored). Parameters with
/// no such line are declared ahead of the script body, in order.
pub fn substitute(text: &str, parameters: &[Parameter]) -> String {
    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let mut declarations = String::new();
    let mut body = text.to_string();

    for parameter in parameters {
        let assignment = parameter.to_string();
        match find_assignment(&body, &parameter.name) {
            Some(range) => body.replace_range(range, &assignment),
            None => {
                declarations.push_str(&assignment);
                declarations.push_str(newline);
            }
        }
    }

    declarations + &body
}

/// Byte range of the first line assigning `name`, without its terminator
fn find_assignment(text: &str, name: &str) -> Option<Range<usize>> {
    let mut start = 0;
    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
        if assigns(content, name) {
            return Some(start..start + content.len());
        }
        start += line.len();
    }
    None
}

fn assigns(line: &str, name: &str) -> bool {
    let rest = line.trim_start();
    match rest.get(..name.len()) {
        Some(head) if head.eq_ignore_ascii_case(name) => {}
        _ => return false,
    }
    let Some(value) = rest[name.len()..].trim_start().strip_prefix('=') else {
        return false;
    };
    !value.starts_with('=') && !value.trim().is_empty()
}

/// Find script files under `dir` with the given extension, in path order
pub fn discover(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "Scripts directory doesn't exist: {}",
            dir.display()
        )));
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let matches = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension));
        if entry.file_type().is_file() && matches {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}
