//! Decomposition parser: planning text in, task drafts out.
//!
//! Parsing runs in two stages. [`split_sections`] cuts the document at every
//! marker line (`12. ` or `# `/`## `/`### `), then [`parse_section`] extracts
//! the fields of one section. Both stages are pure.
//!
//! The splitter does not tell a top-level numbered item from an unindented
//! nested list using the same numbering, so such sub-lists become tasks of
//! their own. A bare marker (`"1. "`) followed by text takes its title from
//! the first line of that text.

use conductor_core::{Priority, Project, TaskDraft, TaskType};
use std::collections::HashMap;

const TYPE_FIELD: &str = "type:";
const PRIORITY_FIELD: &str = "priority:";
const ESTIMATE_FIELD: &str = "estimate:";
const SKILLS_FIELD: &str = "skills:";
const DEPENDENCIES_FIELD: &str = "dependencies:";

/// Parse a planning document into task drafts, in document order.
///
/// Text without any marker line yields an empty list.
pub fn parse_decomposition(text: &str) -> Vec<TaskDraft> {
    split_sections(text)
        .into_iter()
        .filter_map(|section| parse_section(&section))
        .collect()
}

/// Byte length of the marker at the start of `line`, including the
/// whitespace character that terminates it.
fn marker_len(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();

    let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits > 0 {
        if bytes.get(digits) == Some(&b'.') {
            return whitespace_at(line, digits + 1).map(|ws| digits + 1 + ws);
        }
        return None;
    }

    let hashes = bytes.iter().take_while(|b| **b == b'#').count();
    if (1..=3).contains(&hashes) {
        return whitespace_at(line, hashes).map(|ws| hashes + ws);
    }
    None
}

fn whitespace_at(line: &str, at: usize) -> Option<usize> {
    line.get(at..)?
        .chars()
        .next()
        .filter(|c| c.is_whitespace())
        .map(char::len_utf8)
}

/// Whether `line` opens a new section.
pub fn is_marker_line(line: &str) -> bool {
    marker_len(line).is_some()
}

/// Stage one: split the document into sections, each starting at a marker
/// line. Text before the first marker and whitespace-only sections are
/// dropped.
pub fn split_sections(text: &str) -> Vec<String> {
    let mut sections: Vec<Vec<&str>> = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in text.lines() {
        if is_marker_line(line) {
            if let Some(done) = current.take() {
                sections.push(done);
            }
            current = Some(vec![line]);
        } else if let Some(section) = current.as_mut() {
            section.push(line);
        }
    }
    if let Some(done) = current {
        sections.push(done);
    }

    sections
        .into_iter()
        .map(|lines| lines.join("\n"))
        .filter(|s| !s.trim().is_empty())
        .collect()
}

/// Stage two: extract one draft from a section.
///
/// Field lines (`type:`, `priority:`, `estimate:`, `skills:`,
/// `dependencies:`) never reach the description. A marker line without a
/// title borrows the first body line; a section with nothing but a marker
/// and field lines yields `None`.
pub fn parse_section(section: &str) -> Option<TaskDraft> {
    let mut lines = section.lines();
    let first = lines.next()?;
    let mut title = match marker_len(first) {
        Some(len) => first.get(len..).unwrap_or_default(),
        None => first,
    }
    .trim()
    .to_string();

    let mut metadata = HashMap::new();
    let mut body = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if starts_with_field(trimmed, TYPE_FIELD) || starts_with_field(trimmed, PRIORITY_FIELD) {
            continue;
        }
        if let Some(value) = field_value(trimmed, ESTIMATE_FIELD) {
            if !value.is_empty() {
                metadata.insert("estimate".to_string(), serde_json::json!(value));
            }
        } else if let Some(value) = field_value(trimmed, SKILLS_FIELD) {
            let skills = split_list(value);
            if !skills.is_empty() {
                metadata.insert("requiredSkills".to_string(), serde_json::json!(skills));
            }
        } else if let Some(value) = field_value(trimmed, DEPENDENCIES_FIELD) {
            let titles = split_list(value);
            if !titles.is_empty() {
                metadata.insert("dependsOn".to_string(), serde_json::json!(titles));
            }
        } else {
            body.push(line);
        }
    }

    if title.is_empty() {
        let at = body.iter().position(|l| !l.trim().is_empty())?;
        title = body.remove(at).trim().to_string();
    }

    let description = body.join("\n").trim().to_string();
    let description = if description.is_empty() {
        title.clone()
    } else {
        description
    };

    Some(TaskDraft {
        title,
        description,
        task_type: find_keyword(section, TYPE_FIELD, &TaskType::ALL)
            .unwrap_or_default(),
        priority: find_keyword(section, PRIORITY_FIELD, &Priority::ALL)
            .unwrap_or_default(),
        dependencies: Vec::new(),
        metadata,
    })
}

fn split_list(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"))
        .collect()
}

fn starts_with_field(line: &str, field: &str) -> bool {
    line.get(..field.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(field))
}

fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    if starts_with_field(line, field) {
        line.get(field.len()..).map(str::trim)
    } else {
        None
    }
}

/// First occurrence of `field` (case-insensitive) anywhere in `section`
/// that is followed, after optional whitespace, by one of `keywords`.
fn find_keyword<T: KeywordStr + Copy>(section: &str, field: &str, keywords: &[T]) -> Option<T> {
    let lower = section.to_ascii_lowercase();
    let mut from = 0;
    while let Some(pos) = lower.get(from..).and_then(|s| s.find(field)) {
        let after = from + pos + field.len();
        let rest = lower.get(after..).unwrap_or_default().trim_start();
        if let Some(hit) = keywords.iter().copied().find(|k| rest.starts_with(k.keyword())) {
            return Some(hit);
        }
        from = after;
    }
    None
}

/// Keyword spelling shared by the task-type and priority enums.
trait KeywordStr {
    fn keyword(&self) -> &'static str;
}

impl KeywordStr for TaskType {
    fn keyword(&self) -> &'static str {
        self.as_str()
    }
}

impl KeywordStr for Priority {
    fn keyword(&self) -> &'static str {
        self.as_str()
    }
}

/// Instructional prompt sent to an agent to break a project down.
pub fn decomposition_prompt(project: &Project) -> String {
    let mut prompt = format!(
        "Break down the following project into a structured list of tasks.\n\n\
         Project: {}\n\
         Description: {}\n",
        project.name, project.description
    );
    if let Some(prd) = project.prd.as_deref().filter(|p| !p.trim().is_empty()) {
        prompt.push_str("\nProduct requirements document:\n");
        prompt.push_str(prd);
        prompt.push('\n');
    }
    prompt.push_str(
        "\nCover requirements, design, implementation, test, and deployment work.\n\
         Write each task as a numbered item (\"1. Title\") followed by these lines:\n\
         type: requirement|design|implementation|test|deployment|review\n\
         priority: critical|high|medium|low\n\
         estimate: expected effort, e.g. 2d\n\
         dependencies: titles of tasks that must finish first\n\
         skills: comma-separated skills needed\n\
         and then a short description of the work.\n",
    );
    prompt
}
