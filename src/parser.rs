/// One stage of a pipeline: an argument vector plus optional file
/// redirections for its standard input/output.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub argv: Vec<String>,
    pub stdin_file: Option<String>,
    pub stdout_file: Option<String>,
}

impl Stage {
    fn new() -> Self {
        Self {
            argv: Vec::new(),
            stdin_file: None,
            stdout_file: None,
        }
    }
}

/// A parsed input line: one or more stages connected by `|`, with a
/// background flag from a trailing `&`.
#[derive(Debug, PartialEq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    pub background: bool,
}

impl Pipeline {
    /// Command text used in job status lines: each stage's argv joined by
    /// spaces, stages joined by " | ". Redirections and `&` are dropped.
    pub fn command_text(&self) -> String {
        self.stages
            .iter()
            .map(|s| s.argv.join(" "))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Parse a shell input line into a pipeline.
///
/// The line protocol is deliberately plain: tokens split on whitespace,
/// `|` separates stages, `< file` / `> file` attach redirections (the
/// glued `>file` form is accepted too), and a trailing `&` marks the
/// job background. No quoting or expansion.
pub fn parse(input: &str) -> Result<Option<Pipeline>, String> {
    let mut tokens: Vec<&str> = input.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut background = false;
    if let Some(&last) = tokens.last() {
        if last == "&" {
            background = true;
            tokens.pop();
        }
    }
    if tokens.is_empty() {
        return Err("syntax error: nothing to run before '&'".to_string());
    }
    if tokens.contains(&"&") {
        return Err("syntax error: '&' is only allowed at the end of a line".to_string());
    }

    let mut stages = Vec::new();
    let mut current = Stage::new();
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i];

        if token == "|" {
            if current.argv.is_empty() {
                return Err("syntax error near '|'".to_string());
            }
            stages.push(std::mem::replace(&mut current, Stage::new()));
        } else if token == "<" {
            i += 1;
            current.stdin_file = Some(expect_filename(i, &tokens, "<")?);
        } else if token == ">" {
            i += 1;
            current.stdout_file = Some(expect_filename(i, &tokens, ">")?);
        } else if let Some(rest) = token.strip_prefix('<') {
            current.stdin_file = Some(rest.to_string());
        } else if let Some(rest) = token.strip_prefix('>') {
            current.stdout_file = Some(rest.to_string());
        } else {
            current.argv.push(token.to_string());
        }

        i += 1;
    }

    if current.argv.is_empty() {
        return Err(if stages.is_empty() {
            "syntax error: empty command".to_string()
        } else {
            "syntax error near '|'".to_string()
        });
    }
    stages.push(current);

    Ok(Some(Pipeline { stages, background }))
}

fn expect_filename(i: usize, tokens: &[&str], operator: &str) -> Result<String, String> {
    match tokens.get(i) {
        Some(&name) if name != "|" && name != "<" && name != ">" => Ok(name.to_string()),
        _ => Err(format!("syntax error: expected filename after '{operator}'")),
    }
}
