//! Docstring sections: description, parameter groups, returns, yields and raises.
//!
//! Works on the raw (dedented) docstring so that type annotations such as
//! `:obj:`int`` are still intact when lines are split.

use std::sync::OnceLock;

use regex::Regex;

use super::scan::{dedent_lines, find_indent, is_empty_line, FenceState};

static PARAMS_HEADER: OnceLock<Regex> = OnceLock::new();
static GROUP_HEADER: OnceLock<Regex> = OnceLock::new();
static RETURNS_HEADER: OnceLock<Regex> = OnceLock::new();
static YIELDS_HEADER: OnceLock<Regex> = OnceLock::new();
static RAISES_HEADER: OnceLock<Regex> = OnceLock::new();
static EXAMPLE_MARKER: OnceLock<Regex> = OnceLock::new();

fn params_header_re() -> &'static Regex {
    PARAMS_HEADER.get_or_init(|| {
        Regex::new(r"^\s*(?:Args?|Arguments?|Params?|Parameters?)\s*:\s*$").expect("args regex should compile")
    })
}

fn group_header_re() -> &'static Regex {
    GROUP_HEADER.get_or_init(|| {
        Regex::new(r"^\s*(Attributes?|Keyword Args|Keyword Arguments|Other Parameters)\s*:\s*$")
            .expect("group regex should compile")
    })
}

fn returns_header_re() -> &'static Regex {
    RETURNS_HEADER.get_or_init(|| {
        Regex::new(r"^\s*Returns?\s*:\s*$").expect("returns regex should compile")
    })
}

fn yields_header_re() -> &'static Regex {
    YIELDS_HEADER.get_or_init(|| {
        Regex::new(r"^\s*Yields?\s*:\s*$").expect("yields regex should compile")
    })
}

fn raises_header_re() -> &'static Regex {
    RAISES_HEADER.get_or_init(|| {
        Regex::new(r"^\s*Raises?\s*:\s*$").expect("raises regex should compile")
    })
}

fn example_marker_re() -> &'static Regex {
    EXAMPLE_MARKER.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:>\s*)?(?:[\w ]*\s)?examples?::?\s*$|^\s*<exampletitle>")
            .expect("example regex should compile")
    })
}

/// A named run of parameter entries. The first group of a docstring has no title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamGroup {
    pub title: Option<String>,
    pub text: String,
}

/// A docstring split into the pieces the signature component shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocstringSections {
    pub description: String,
    pub params: Vec<ParamGroup>,
    pub returns: Option<String>,
    pub return_type: Option<String>,
    pub yields: Option<String>,
    pub yield_type: Option<String>,
    pub raises: Option<String>,
    pub raised_errors: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Section {
    Params(Option<String>),
    Returns,
    Yields,
    Raises,
}

fn section_header(line: &str) -> Option<Section> {
    if params_header_re().is_match(line) {
        return Some(Section::Params(None));
    }
    if let Some(caps) = group_header_re().captures(line) {
        return Some(Section::Params(Some(caps[1].to_string())));
    }
    if returns_header_re().is_match(line) {
        return Some(Section::Returns);
    }
    if yields_header_re().is_match(line) {
        return Some(Section::Yields);
    }
    if raises_header_re().is_match(line) {
        return Some(Section::Raises);
    }
    None
}

/// Whether `line` introduces a worked example.
pub fn is_example_marker(line: &str) -> bool {
    example_marker_re().is_match(line)
}

/// Split a docstring into its sections.
pub fn parse_docstring(text: &str) -> DocstringSections {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut sections = DocstringSections::default();
    let mut description: Vec<&str> = Vec::new();
    let mut fence = FenceState::new();
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx];
        if fence.update(idx, line) {
            description.push(line);
            idx += 1;
            continue;
        }
        let Some(section) = section_header(line) else {
            description.push(line);
            idx += 1;
            continue;
        };

        let end = section_end(&lines, idx + 1, find_indent(line));
        let block = &lines[idx + 1..end];
        match section {
            Section::Params(title) => add_params(&mut sections.params, title, block),
            Section::Returns => {
                let (kind, desc) = typed_block(block);
                sections.return_type = kind.or(sections.return_type.take());
                sections.returns = Some(desc);
            }
            Section::Yields => {
                let (kind, desc) = typed_block(block);
                sections.yield_type = kind.or(sections.yield_type.take());
                sections.yields = Some(desc);
            }
            Section::Raises => {
                let (entries, errors) = raises_block(block);
                sections.raises = Some(entries);
                sections.raised_errors = Some(errors);
            }
        }
        idx = end;
    }

    sections.description = collapse_blank_lines(&description);
    sections
}

/// End of a section body: lines indented deeper than the header, cut before
/// an example marker and without trailing blank lines.
fn section_end(lines: &[&str], start: usize, header_indent: usize) -> usize {
    let mut end = start;
    let mut idx = start;
    while idx < lines.len() {
        let line = lines[idx];
        if is_empty_line(line) {
            idx += 1;
            continue;
        }
        if find_indent(line) <= header_indent || is_example_marker(line) {
            break;
        }
        idx += 1;
        end = idx;
    }
    end
}

fn add_params(groups: &mut Vec<ParamGroup>, title: Option<String>, block: &[&str]) {
    let param_indent = block
        .iter()
        .find(|line| !is_empty_line(line))
        .map_or(0, |line| find_indent(line));

    let mut current = match title {
        Some(title) => start_group(groups, Some(title)),
        None if groups.is_empty() => start_group(groups, None),
        None => 0,
    };

    for line in block {
        let trimmed = line.trim();
        if is_empty_line(line) {
            push_line(&mut groups[current].text, "");
        } else if find_indent(line) == param_indent && trimmed.starts_with("> ") {
            current = start_group(groups, Some(trimmed[2..].trim().to_string()));
        } else if find_indent(line) == param_indent {
            push_line(&mut groups[current].text, &format_param_line(trimmed));
        } else {
            push_line(&mut groups[current].text, line);
        }
    }

    for group in groups.iter_mut() {
        group.text = group.text.trim_matches('\n').to_string();
    }
}

fn start_group(groups: &mut Vec<ParamGroup>, title: Option<String>) -> usize {
    groups.push(ParamGroup {
        title,
        text: String::new(),
    });
    groups.len() - 1
}

fn push_line(text: &mut String, line: &str) {
    if !text.is_empty() {
        text.push('\n');
    }
    text.push_str(line);
}

/// `name (type): description` as a `- **name** (type) -- description` entry.
fn format_param_line(line: &str) -> String {
    let (head, desc) = split_arg_line(line);
    let head = head.trim();
    let (name, kind) = match head.find(" (") {
        Some(pos) if head.ends_with(')') => (&head[..pos], Some(&head[pos + 1..])),
        _ => (head, None),
    };
    let name = name.replace('*', r"\*");
    match kind {
        Some(kind) => format!("- **{}** {} --{}", name, kind, desc),
        None => format!("- **{}** --{}", name, desc),
    }
}

/// Split a parameter line at the first colon outside parentheses, brackets and code spans.
pub fn split_arg_line(line: &str) -> (&str, &str) {
    let mut depth = 0usize;
    let mut in_code = false;
    for (idx, c) in line.char_indices() {
        match c {
            '`' => in_code = !in_code,
            '(' | '[' if !in_code => depth += 1,
            ')' | ']' if !in_code => depth = depth.saturating_sub(1),
            ':' if !in_code && depth == 0 => return (&line[..idx], &line[idx + 1..]),
            _ => {}
        }
    }
    (line, "")
}

/// Split a return line into its type and description.
///
/// The split happens at the first colon outside code spans, brackets and
/// roles. A line with no such colon is a bare type when it is entirely
/// markup, and a bare description otherwise.
pub fn split_return_line(line: &str) -> (Option<&str>, &str) {
    let mut depth = 0usize;
    let mut in_code = false;
    let mut chars = line.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        match c {
            '`' => in_code = !in_code,
            '(' | '[' if !in_code => depth += 1,
            ')' | ']' if !in_code => depth = depth.saturating_sub(1),
            ':' if !in_code && depth == 0 => {
                if let Some(role_len) = role_prefix_len(&line[idx..]) {
                    // skip to the backtick that opens the role's target
                    while chars.peek().is_some_and(|&(next, _)| next < idx + role_len) {
                        chars.next();
                    }
                    continue;
                }
                return (Some(line[..idx].trim()), &line[idx + 1..]);
            }
            _ => {}
        }
    }

    let trimmed = line.trim();
    let starts = trimmed.starts_with('`') || trimmed.starts_with(':') || trimmed.starts_with('[');
    let ends = trimmed.ends_with('`') || trimmed.ends_with(']');
    if starts && ends {
        (Some(trimmed), "")
    } else {
        (None, line)
    }
}

/// Length of a `:role:` prefix directly followed by a backtick.
fn role_prefix_len(text: &str) -> Option<usize> {
    let rest = text.strip_prefix(':')?;
    let name_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(rest.len());
    if name_len == 0 {
        return None;
    }
    rest[name_len..]
        .starts_with(":`")
        .then_some(name_len + 2)
}

/// Type and description of a Returns/Yields block.
fn typed_block(block: &[&str]) -> (Option<String>, String) {
    let lines = dedent_lines(block);
    let Some(first) = lines.iter().position(|line| !line.is_empty()) else {
        return (None, String::new());
    };
    let (kind, desc) = split_return_line(&lines[first]);
    let mut text = vec![desc.trim().to_string()];
    text.extend(lines[first + 1..].iter().cloned());
    let desc = text.join("\n").trim().to_string();
    (kind.map(str::to_string), desc)
}

/// Split a raise line into the error and its description.
pub fn split_raise_line(line: &str) -> (&str, &str) {
    let line = line.trim();
    if line.starts_with('[') {
        if let Some(close) = line.find("](") {
            if let Some(end) = line[close..].find(')') {
                let end = close + end + 1;
                return (&line[..end], trim_desc(&line[end..]));
            }
        }
    }
    let end = line.find(char::is_whitespace).unwrap_or(line.len());
    let error = &line[..end];
    match error.strip_suffix(':') {
        Some(error) => (error, trim_desc(&line[end..])),
        None => match error.rfind("`:") {
            Some(pos) => (&line[..pos + 1], trim_desc(&line[pos + 1..])),
            None => (error, trim_desc(&line[end..])),
        },
    }
}

fn trim_desc(text: &str) -> &str {
    text.trim_start().trim_start_matches(':').trim()
}

fn code_span(error: &str) -> String {
    if error.starts_with('`') || error.starts_with('[') || error.starts_with(':') {
        error.to_string()
    } else {
        format!("`{}`", error)
    }
}

/// Entry list and "A or B" summary of a Raises block.
fn raises_block(block: &[&str]) -> (String, String) {
    let entry_indent = block
        .iter()
        .find(|line| !is_empty_line(line))
        .map_or(0, |line| find_indent(line));
    let mut entries: Vec<String> = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    for line in block {
        if is_empty_line(line) {
            continue;
        }
        if find_indent(line) == entry_indent {
            let (error, desc) = split_raise_line(line);
            let error = code_span(error);
            entries.push(format!("- {} -- {}", error, desc).trim_end().to_string());
            errors.push(error);
        } else if let Some(last) = entries.last_mut() {
            last.push(' ');
            last.push_str(line.trim());
        }
    }

    (entries.join("\n"), errors.join(" or "))
}

/// Squeeze runs of blank prose lines into one. Fenced code keeps its blank lines.
fn collapse_blank_lines(lines: &[&str]) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut fence = FenceState::new();
    for (idx, line) in lines.iter().enumerate() {
        let in_fence = fence.update(idx, line);
        if !in_fence && is_empty_line(line) && out.last().is_none_or(|last| is_empty_line(last)) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|last| is_empty_line(last)) {
        out.pop();
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_arg_line() {
        assert_eq!(split_arg_line("x (:obj:`int`): an int"), ("x (:obj:`int`)", " an int"));
        assert_eq!(split_arg_line("x: an int"), ("x", " an int"));
        assert_eq!(
            split_arg_line("mapping (`Dict[str, int]`, *optional*): a: b"),
            ("mapping (`Dict[str, int]`, *optional*)", " a: b")
        );
        assert_eq!(split_arg_line("no colon"), ("no colon", ""));
    }

    #[test]
    fn test_split_return_line() {
        assert_eq!(
            split_return_line(":obj:`str` or :obj:`bool`: some result"),
            (Some(":obj:`str` or :obj:`bool`"), " some result")
        );
        assert_eq!(
            split_return_line("A :obj:`str` or a :obj:`bool`:"),
            (Some("A :obj:`str` or a :obj:`bool`"), "")
        );
        assert_eq!(
            split_return_line(":class:`IterableDataset`"),
            (Some(":class:`IterableDataset`"), "")
        );
        assert_eq!(split_return_line("`int`"), (Some("`int`"), ""));
        assert_eq!(
            split_return_line("[`BaseModelOutput`] or `tuple(torch.FloatTensor)`: The outputs."),
            (Some("[`BaseModelOutput`] or `tuple(torch.FloatTensor)`"), " The outputs.")
        );
        assert_eq!(
            split_return_line("The sum of a and b."),
            (None, "The sum of a and b.")
        );
    }

    #[test]
    fn test_split_raise_line() {
        assert_eq!(split_raise_line("SomeError some error"), ("SomeError", "some error"));
        assert_eq!(split_raise_line("SomeError: some error"), ("SomeError", "some error"));
        assert_eq!(
            split_raise_line("[SomeError](https://x.y/z): some error"),
            ("[SomeError](https://x.y/z)", "some error")
        );
        assert_eq!(
            split_raise_line("[`HTTPError`](https://x.y) if the hub is down"),
            ("[`HTTPError`](https://x.y)", "if the hub is down")
        );
        assert_eq!(
            split_raise_line("`pa.ArrowInvalid`: if the cast fails"),
            ("`pa.ArrowInvalid`", "if the cast fails")
        );
    }

    #[test]
    fn test_parse_docstring() {
        let doc = r#"Compute things.

Args:
    a (:obj:`str` or :obj:`bool`): some parameter
    b (:obj:`str` or :obj:`bool`):
        Another parameter with the description below

Returns:
    :obj:`str` or :obj:`bool`: some result
    with a second line

Raises:
    ValueError: if a is wrong
    [`HTTPError`](https://x.y) if the hub
        is down

More text after."#;
        let sections = parse_docstring(doc);

        assert_eq!(sections.description, "Compute things.\n\nMore text after.");
        assert_eq!(sections.params.len(), 1);
        assert_eq!(sections.params[0].title, None);
        assert_eq!(
            sections.params[0].text,
            "- **a** (:obj:`str` or :obj:`bool`) -- some parameter\n- **b** (:obj:`str` or :obj:`bool`) --\n        Another parameter with the description below"
        );
        assert_eq!(
            sections.return_type.as_deref(),
            Some(":obj:`str` or :obj:`bool`")
        );
        assert_eq!(
            sections.returns.as_deref(),
            Some("some result\nwith a second line")
        );
        assert_eq!(
            sections.raises.as_deref(),
            Some("- `ValueError` -- if a is wrong\n- [`HTTPError`](https://x.y) -- if the hub is down")
        );
        assert_eq!(
            sections.raised_errors.as_deref(),
            Some("`ValueError` or [`HTTPError`](https://x.y)")
        );
    }

    #[test]
    fn test_parameter_groups() {
        let doc = r#"Args:
    x (`int`): first

Keyword Args:
    y (`str`): second

Parameters:
    z: third
    > Advanced
    w (`bool`):
        fourth"#;
        let sections = parse_docstring(doc);
        assert_eq!(sections.description, "");
        let titles: Vec<Option<&str>> = sections.params.iter().map(|g| g.title.as_deref()).collect();
        assert_eq!(titles, vec![None, Some("Keyword Args"), Some("Advanced")]);
        assert_eq!(sections.params[0].text, "- **x** (`int`) -- first\n- **z** -- third");
        assert_eq!(sections.params[1].text, "- **y** (`str`) -- second");
        assert_eq!(sections.params[2].text, "- **w** (`bool`) --\n        fourth");
    }

    #[test]
    fn test_example_closes_section() {
        let doc = r#"Returns:
    `int`: the value
    Example:

    ```python
    >>> f()
    ```"#;
        let sections = parse_docstring(doc);
        assert_eq!(sections.return_type.as_deref(), Some("`int`"));
        assert_eq!(sections.returns.as_deref(), Some("the value"));
        assert!(sections.description.contains("Example:"));
        assert!(sections.description.contains(">>> f()"));
    }

    #[test]
    fn test_yields_and_variadic_names() {
        let doc = "Args:\n    *args: positional\n    **kwargs: keywords\n\nYields:\n    `str`: each line";
        let sections = parse_docstring(doc);
        assert_eq!(
            sections.params[0].text,
            "- **\\*args** -- positional\n- **\\*\\*kwargs** -- keywords"
        );
        assert_eq!(sections.yield_type.as_deref(), Some("`str`"));
        assert_eq!(sections.yields.as_deref(), Some("each line"));
    }

    #[test]
    fn test_headers_inside_code_are_ignored() {
        let doc = "Text.\n\n```\nArgs:\n    not a section\n```";
        let sections = parse_docstring(doc);
        assert!(sections.params.is_empty());
        assert_eq!(sections.description, doc);
    }

    #[test]
    fn test_blank_lines_inside_code_are_kept() {
        let doc = "Text.\n\n\n\nMore.\n\n```py\nx = 1\n\n\ny = 2\n```";
        let sections = parse_docstring(doc);
        assert_eq!(sections.description, "Text.\n\nMore.\n\n```py\nx = 1\n\n\ny = 2\n```");
    }

    #[test]
    fn test_is_example_marker() {
        assert!(is_example_marker("Example:"));
        assert!(is_example_marker("    Examples::"));
        assert!(is_example_marker("> Example:"));
        assert!(is_example_marker("Generation example::"));
        assert!(!is_example_marker("For example, this is prose."));
    }
}
