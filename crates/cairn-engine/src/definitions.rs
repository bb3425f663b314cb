//! Shared named blocks
//!
//! Every `{% macro %}` found at the top level of any file of a render is
//! copied into one synthetic module. Templates import it on their first line,
//! so a block defined anywhere is callable everywhere. When two files define
//! the same name the one scanned last wins.
//!
//! Macros whose name starts with `_` stay private to the module: other blocks
//! can call them, templates cannot.

use std::ops::Range;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::engine::TemplateSource;

/// Name the shared module is registered under
pub const DEFINITIONS_TEMPLATE: &str = "__definitions__";

static BLOCK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{%[-+]?\s*(macro|endmacro)\b(.*?)[-+]?%\}").expect("valid regex")
});

static IGNORED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{#.*?#\}|\{%[-+]?\s*raw\s*[-+]?%\}.*?\{%[-+]?\s*endraw\s*[-+]?%\}")
        .expect("valid regex")
});

static MACRO_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"));

/// One macro copied from a file
#[derive(Debug, Clone)]
struct Block {
    file: String,
    /// Byte range of the whole `{% macro %}...{% endmacro %}` in the file
    range: Range<usize>,
    /// 1-based line the block starts on in the file
    line: usize,
    text: String,
}

/// Where a block landed in the synthetic module
#[derive(Debug, Clone)]
struct Segment {
    file: String,
    file_line: usize,
    file_offset: usize,
    line: usize,
    offset: usize,
    len: usize,
    lines: usize,
}

/// A position in one of the collected source files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub file: String,
    pub line: Option<usize>,
    pub range: Option<Range<usize>>,
}

/// The synthetic module plus the map back to the files it came from
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    source: String,
    names: Vec<String>,
    segments: Vec<Segment>,
}

impl Definitions {
    /// Collect top-level macros from `sources`, in order
    pub fn collect<'a>(sources: impl IntoIterator<Item = &'a TemplateSource>) -> Self {
        let mut blocks: IndexMap<String, Block> = IndexMap::new();

        for source in sources {
            for (name, block) in scan(&source.name, &source.content) {
                if let Some(previous) = blocks.shift_remove(&name) {
                    tracing::debug!(
                        name,
                        replaced = %previous.file,
                        by = %block.file,
                        "named block redefined"
                    );
                }
                blocks.insert(name, block);
            }
        }

        let mut definitions = Self::default();
        let mut line = 1;
        for (name, block) in blocks {
            let lines = block.text.matches('\n').count() + 1;
            definitions.segments.push(Segment {
                file: block.file,
                file_line: block.line,
                file_offset: block.range.start,
                line,
                offset: definitions.source.len(),
                len: block.text.len(),
                lines,
            });
            definitions.source.push_str(&block.text);
            definitions.source.push('\n');
            line += lines;
            definitions.names.push(name);
        }
        definitions
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names of every shared block, including private ones
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Import statement prepended to templates; no trailing newline so line
    /// numbers of the template stay unchanged
    pub fn import_line(&self) -> String {
        let public: Vec<&str> = self
            .names
            .iter()
            .map(String::as_str)
            .filter(|n| !n.starts_with('_'))
            .collect();
        if public.is_empty() {
            return String::new();
        }
        format!("{{% from \"{DEFINITIONS_TEMPLATE}\" import {} %}}", public.join(", "))
    }

    /// Map a line and byte range of the synthetic module back to a file
    pub fn locate(&self, line: Option<usize>, range: Option<Range<usize>>) -> Option<Located> {
        let segment = match (&range, line) {
            (Some(r), _) => self
                .segments
                .iter()
                .find(|s| r.start >= s.offset && r.start <= s.offset + s.len)?,
            (None, Some(l)) => self
                .segments
                .iter()
                .find(|s| l >= s.line && l < s.line + s.lines)?,
            (None, None) => return None,
        };

        Some(Located {
            file: segment.file.clone(),
            line: line.map(|l| l - segment.line + segment.file_line),
            range: range.map(|r| {
                let start = r.start - segment.offset + segment.file_offset;
                start..start + (r.end - r.start)
            }),
        })
    }
}

fn scan(file: &str, content: &str) -> Vec<(String, Block)> {
    let ignored: Vec<Range<usize>> = IGNORED.find_iter(content).map(|m| m.range()).collect();
    let in_ignored = |pos: usize| ignored.iter().any(|r| r.contains(&pos));

    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut open: Option<(String, usize)> = None;

    for caps in BLOCK_TAG.captures_iter(content) {
        let Some(tag) = caps.get(0) else { continue };
        if in_ignored(tag.start()) {
            continue;
        }

        match &caps[1] {
            "macro" => {
                if depth == 0 {
                    let name = MACRO_NAME
                        .captures(&caps[2])
                        .map(|c| c[1].to_string())
                        .unwrap_or_default();
                    open = Some((name, tag.start()));
                }
                depth += 1;
            }
            _ => {
                depth = depth.saturating_sub(1);
                if depth == 0
                    && let Some((name, start)) = open.take()
                    && !name.is_empty()
                {
                    let range = start..tag.end();
                    found.push((
                        name,
                        Block {
                            file: file.to_string(),
                            line: content[..start].matches('\n').count() + 1,
                            text: content[range.clone()].to_string(),
                            range,
                        },
                    ));
                }
            }
        }
    }
    found
}
