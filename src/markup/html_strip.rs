//! Strip site markup from MDX, leaving plain Markdown.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::scan::map_prose;

static DOCSTRING_BLOCK: OnceLock<Regex> = OnceLock::new();
static FIELD_OPEN: OnceLock<Regex> = OnceLock::new();
static COMMENT: OnceLock<Regex> = OnceLock::new();
static COMPONENT_TAG: OnceLock<Regex> = OnceLock::new();
static HEADING_ANCHOR: OnceLock<Regex> = OnceLock::new();
static EMPTY_ANCHOR: OnceLock<Regex> = OnceLock::new();
static BLANK_RUN: OnceLock<Regex> = OnceLock::new();
static PARAM_ENTRY: OnceLock<Regex> = OnceLock::new();

fn docstring_block_re() -> &'static Regex {
    DOCSTRING_BLOCK.get_or_init(|| {
        Regex::new(r"(?s)<docstring>(.*?)</docstring>").expect("docstring regex should compile")
    })
}

fn field_open_re() -> &'static Regex {
    FIELD_OPEN.get_or_init(|| Regex::new(r"<([a-zA-Z0-9]+)>").expect("field regex should compile"))
}

/// `(tag, body)` of each `<tag>body</tag>` field, closed by the first matching
/// closing tag. Tags nested in a body stay part of it.
fn fields(block: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(caps) = field_open_re().captures_at(block, pos) {
        let (Some(open), Some(tag)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let close = format!("</{}>", tag.as_str());
        match block[open.end()..].find(&close) {
            Some(len) => {
                out.push((tag.as_str(), &block[open.end()..open.end() + len]));
                pos = open.end() + len + close.len();
            }
            None => pos = open.end(),
        }
    }
    out
}

fn comment_re() -> &'static Regex {
    COMMENT.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex should compile"))
}

fn component_tag_re() -> &'static Regex {
    COMPONENT_TAG.get_or_init(|| {
        Regex::new(
            r"(?i)</?(?:Tip|ExampleCodeBlock|hfoptions|hfoption|div|span|frameworkcontent|pt|tf|EditOnGithub)(?:\s[^>]*)?/?>",
        )
        .expect("component tag regex should compile")
    })
}

fn heading_anchor_re() -> &'static Regex {
    HEADING_ANCHOR.get_or_init(|| {
        Regex::new(r##"\s*<a id="([^"]+)" href="#[^"]*">¶</a>"##).expect("heading anchor regex should compile")
    })
}

fn empty_anchor_re() -> &'static Regex {
    EMPTY_ANCHOR.get_or_init(|| {
        Regex::new(r#"<a\s+(?:id|name)="[^"]*"\s*>\s*</a>"#).expect("anchor regex should compile")
    })
}

fn blank_run_re() -> &'static Regex {
    BLANK_RUN.get_or_init(|| Regex::new(r"\n(?:[ \t]*\n){2,}").expect("blank run regex should compile"))
}

fn param_entry_re() -> &'static Regex {
    PARAM_ENTRY.get_or_init(|| {
        Regex::new(r"^\s*-\s+\*\*(.+?)\*\*\s*").expect("param entry regex should compile")
    })
}

/// Fields of one `<docstring>` header.
#[derive(Debug, Default)]
struct DocstringHeader {
    name: String,
    anchor: String,
    source: String,
    paramsdesc: String,
    groups: Vec<(String, String)>,
    rettype: String,
    retdesc: String,
    yieldtype: String,
    yielddesc: String,
    raises: String,
}

impl DocstringHeader {
    fn parse(block: &str) -> Self {
        let mut header = Self::default();
        let mut titles: Vec<(String, String)> = Vec::new();
        let mut descs: Vec<(String, String)> = Vec::new();

        for (tag, body) in fields(block) {
            let value = body.trim().to_string();
            match tag {
                "name" => header.name = value,
                "anchor" => header.anchor = value,
                "source" => header.source = value,
                "paramsdesc" => header.paramsdesc = value,
                "rettype" => header.rettype = value,
                "retdesc" => header.retdesc = value,
                "yieldtype" => header.yieldtype = value,
                "yielddesc" => header.yielddesc = value,
                "raises" => header.raises = value,
                tag => {
                    if let Some(n) = tag.strip_prefix("paramsdesc") {
                        match n.strip_suffix("title") {
                            Some(n) => titles.push((n.to_string(), value)),
                            None => descs.push((n.to_string(), value)),
                        }
                    }
                }
            }
        }

        for (n, desc) in descs {
            let title = titles
                .iter()
                .find(|(m, _)| *m == n)
                .map(|(_, title)| title.clone())
                .unwrap_or_default();
            header.groups.push((title, desc));
        }
        header
    }

    fn render(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        let name = self
            .name
            .strip_prefix("class ")
            .unwrap_or(&self.name)
            .trim();
        if self.anchor.is_empty() {
            parts.push(format!("#### {}", name));
        } else {
            parts.push(format!("#### {}[[{}]]", name, self.anchor));
        }
        if !self.source.is_empty() {
            parts.push(format!("[Source]({})", self.source));
        }
        if !self.paramsdesc.is_empty() {
            parts.push("**Parameters:**".to_string());
            parts.push(format_parameters(&self.paramsdesc));
        }
        for (title, desc) in &self.groups {
            parts.push(format!("**{}:**", title));
            parts.push(format_parameters(desc));
        }
        push_typed(&mut parts, "Returns", &self.rettype, &self.retdesc);
        push_typed(&mut parts, "Yields", &self.yieldtype, &self.yielddesc);
        if !self.raises.is_empty() {
            parts.push("**Raises:**".to_string());
            parts.push(self.raises.clone());
        }
        parts.join("\n\n")
    }
}

fn push_typed(parts: &mut Vec<String>, title: &str, kind: &str, desc: &str) {
    if kind.is_empty() && desc.is_empty() {
        return;
    }
    parts.push(format!("**{}:**", title));
    if !kind.is_empty() {
        parts.push(kind.to_string());
    }
    if !desc.is_empty() {
        parts.push(desc.to_string());
    }
}

/// `- **name** (type) -- desc` entries as `name (type) : desc` paragraphs.
fn format_parameters(paramsdesc: &str) -> String {
    let mut entries: Vec<String> = Vec::new();
    for line in paramsdesc.lines() {
        if let Some(caps) = param_entry_re().captures(line) {
            let rest = &line[caps[0].len()..];
            let entry = format!("{} {}", &caps[1], rest);
            let entry = entry.replacen(" --", " :", 1);
            entries.push(entry.trim_end().to_string());
        } else if let Some(last) = entries.last_mut() {
            if !line.trim().is_empty() {
                last.push(' ');
                last.push_str(line.trim());
            }
        }
    }
    entries.join("\n\n")
}

/// Turn a built MDX page back into plain Markdown.
pub fn strip_html(content: &str) -> String {
    let text = docstring_block_re().replace_all(content, |caps: &Captures| {
        format!("\n{}\n", DocstringHeader::parse(&caps[1]).render())
    });

    let text = map_prose(&text, |prose| {
        let prose = comment_re().replace_all(prose, "");
        let prose = heading_anchor_re().replace_all(&prose, "[[$1]]");
        let prose = empty_anchor_re().replace_all(&prose, "");
        component_tag_re().replace_all(&prose, "").into_owned()
    });

    let text = blank_run_re().replace_all(&text, "\n\n");
    let text = text.trim();
    if text.is_empty() {
        String::new()
    } else {
        format!("{}\n", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parameters() {
        let desc = "- **a** (`int`) -- first value\n- **b** --\n  second value\n  on two lines";
        assert_eq!(
            format_parameters(desc),
            "a (`int`) : first value\n\nb : second value on two lines"
        );
    }

    #[test]
    fn test_fields_keep_nested_tags() {
        let block = "<name>f</name><paramsdesc>- **x** -- a <b>bold</b> value</paramsdesc><retdesc>ok</retdesc><rettype>";
        let header = DocstringHeader::parse(block);
        assert_eq!(header.name, "f");
        assert_eq!(header.paramsdesc, "- **x** -- a <b>bold</b> value");
        assert_eq!(header.retdesc, "ok");
        assert_eq!(header.rettype, "");
    }

    #[test]
    fn test_strip_docstring_block() {
        let content = r#"# Models

<div class="docstring">

<docstring><name>class pkg.Foo</name><anchor>pkg.Foo</anchor><source>https://github.com/o/pkg/blob/main/src/pkg/foo.py#L3</source><parameters>[{"name": "x", "val": ": int = 1"}]</parameters><paramsdesc>- **x** (`int`) -- the value</paramsdesc><paramgroups>0</paramgroups><rettype>`str`</rettype><retdesc>the name</retdesc></docstring>
A Foo.

</div>
"#;
        let expected = r#"# Models

#### pkg.Foo[[pkg.Foo]]

[Source](https://github.com/o/pkg/blob/main/src/pkg/foo.py#L3)

**Parameters:**

x (`int`) : the value

**Returns:**

`str`

the name

A Foo.
"#;
        assert_eq!(strip_html(content), expected);
    }

    #[test]
    fn test_parameter_groups_and_raises() {
        let block = "<name>pkg.f</name><anchor>pkg.f</anchor><paramsdesc>- **a** -- one</paramsdesc><paramsdesc1title>Keyword Args</paramsdesc1title><paramsdesc1>- **b** -- two</paramsdesc1><paramgroups>1</paramgroups><raises>- `ValueError` -- bad</raises>";
        let header = DocstringHeader::parse(block);
        assert_eq!(
            header.render(),
            "#### pkg.f[[pkg.f]]\n\n**Parameters:**\n\na : one\n\n**Keyword Args:**\n\nb : two\n\n**Raises:**\n\n- `ValueError` -- bad"
        );
    }

    #[test]
    fn test_strip_component_tags() {
        let content = "<!-- hidden -->\n## Usage <a id=\"usage\" href=\"#usage\">¶</a>\n\n<Tip warning={true}>\n\nCareful.\n\n</Tip>\n\n<a id=\"old\"></a>\n<ExampleCodeBlock anchor=\"x.example\">\n\n```py\n<div>kept</div>\n```\n\n</ExampleCodeBlock>\n";
        assert_eq!(
            strip_html(content),
            "## Usage[[usage]]\n\nCareful.\n\n```py\n<div>kept</div>\n```\n"
        );
    }
}
