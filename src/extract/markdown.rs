// file: src/extract/markdown.rs
// description: markdown to plain text with paragraph boundaries preserved
// reference: https://docs.rs/pulldown-cmark

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

pub struct MarkdownExtractor;

impl MarkdownExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Paragraphs, headings, list items and table rows each end on their own line;
    /// block ends leave a blank line so the splitter can cut there.
    pub fn to_plain_text(&self, content: &str) -> String {
        let parser = Parser::new_ext(content, Options::ENABLE_TABLES);
        let mut plain_text = String::new();
        let mut in_cell = false;

        for event in parser {
            match event {
                Event::Start(Tag::TableCell) => {
                    in_cell = true;
                }
                Event::End(TagEnd::TableCell) => {
                    in_cell = false;
                    plain_text.push_str(" | ");
                }
                Event::End(TagEnd::TableRow) | Event::End(TagEnd::TableHead) => {
                    trim_trailing(&mut plain_text, " | ");
                    plain_text.push('\n');
                }
                Event::End(TagEnd::Item) => {
                    plain_text.push('\n');
                }
                Event::End(TagEnd::Heading(_))
                | Event::End(TagEnd::Paragraph)
                | Event::End(TagEnd::CodeBlock)
                | Event::End(TagEnd::Table)
                | Event::End(TagEnd::List(_)) => {
                    plain_text.push_str("\n\n");
                }
                Event::Text(text) | Event::Code(text) => {
                    plain_text.push_str(&text);
                }
                Event::SoftBreak | Event::HardBreak => {
                    plain_text.push(if in_cell { ' ' } else { '\n' });
                }
                _ => {}
            }
        }

        plain_text
    }
}

impl Default for MarkdownExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_trailing(text: &mut String, suffix: &str) {
    if text.ends_with(suffix) {
        text.truncate(text.len() - suffix.len());
    }
}
