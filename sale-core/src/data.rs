// Data-file reader
//
// The format is one entry per line: whitespace-separated tokens, with quotes
// (`"` or backtick) around tokens that contain spaces and `#` starting a
// comment. An entry indented deeper than the one above it becomes that
// entry's child.

use crate::diagnostic::{Diagnostic, Diagnostics};

/// One entry of a data file: its tokens and the entries nested under it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataNode {
    tokens: Vec<String>,
    children: Vec<DataNode>,
    line: usize,
}

impl DataNode {
    pub fn new(tokens: Vec<String>, line: usize) -> Self {
        Self {
            tokens,
            children: Vec::new(),
            line,
        }
    }

    pub fn size(&self) -> usize {
        self.tokens.len()
    }

    /// Token `index`, or the empty string past the end of the entry.
    pub fn token(&self, index: usize) -> &str {
        self.tokens.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_number(&self, index: usize) -> bool {
        self.value(index).is_some()
    }

    /// Token `index` read as a number. Words such as `inf` or `nan` are not
    /// numbers here even though `f64::from_str` accepts them.
    pub fn value(&self, index: usize) -> Option<f64> {
        let token = self.tokens.get(index)?;
        let first = token.chars().next()?;
        if !(first.is_ascii_digit() || matches!(first, '-' | '+' | '.')) {
            return None;
        }
        token.parse::<f64>().ok().filter(|v| v.is_finite())
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn children(&self) -> std::slice::Iter<'_, DataNode> {
        self.children.iter()
    }

    /// 1-based line of the source file this entry came from.
    pub fn line(&self) -> usize {
        self.line
    }

    /// The tokens written back out, quoted where needed.
    pub fn context(&self) -> String {
        self.tokens
            .iter()
            .map(|t| quote(t))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<'a> IntoIterator for &'a DataNode {
    type Item = &'a DataNode;
    type IntoIter = std::slice::Iter<'a, DataNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.children.iter()
    }
}

fn quote(token: &str) -> String {
    if token.is_empty() || token.contains(char::is_whitespace) || token.starts_with('#') {
        if token.contains('"') {
            format!("`{token}`")
        } else {
            format!("\"{token}\"")
        }
    } else {
        token.to_string()
    }
}

/// A parsed data file: the root-level entries in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFile {
    pub nodes: Vec<DataNode>,
}

impl DataFile {
    /// Parse `text`. Problems are reported to `diagnostics`; whatever could be
    /// read is still returned.
    pub fn parse(text: &str, diagnostics: &mut Diagnostics) -> Self {
        let mut roots = Vec::new();
        // Open entries, shallowest first, with their indentation width.
        let mut stack: Vec<(usize, DataNode)> = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let indent = raw.chars().take_while(|c| c.is_whitespace()).count();
            let tokens = tokenize(raw, line, diagnostics);
            if tokens.is_empty() {
                continue;
            }

            while stack.last().is_some_and(|(depth, _)| *depth >= indent) {
                close_top(&mut stack, &mut roots);
            }
            stack.push((indent, DataNode::new(tokens, line)));
        }
        while !stack.is_empty() {
            close_top(&mut stack, &mut roots);
        }

        Self { nodes: roots }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataNode> {
        self.nodes.iter()
    }
}

impl<'a> IntoIterator for &'a DataFile {
    type Item = &'a DataNode;
    type IntoIter = std::slice::Iter<'a, DataNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

fn close_top(stack: &mut Vec<(usize, DataNode)>, roots: &mut Vec<DataNode>) {
    if let Some((_, node)) = stack.pop() {
        match stack.last_mut() {
            Some((_, parent)) => parent.children.push(node),
            None => roots.push(node),
        }
    }
}

fn tokenize(raw: &str, line: usize, diagnostics: &mut Diagnostics) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = raw.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            break;
        };
        if first == '#' {
            break;
        }

        let mut token = String::new();
        if first == '"' || first == '`' {
            chars.next();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == first {
                    closed = true;
                    break;
                }
                token.push(c);
            }
            if !closed {
                diagnostics.report(Diagnostic::Syntax {
                    line,
                    message: "unterminated quote closed at end of line",
                });
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                token.push(c);
            }
        }
        tokens.push(token);
    }
    tokens
}
