use serde::Serialize;

/// Slack rejects section text longer than this.
pub const SECTION_TEXT_LIMIT: usize = 3_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { block_id: String, text: TextObject },
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
    Divider { block_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn header(mut self, block_id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = TextObject::plain(text);
        self.blocks.push(Block::Header { block_id: block_id.into(), text });
        self
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn divider(mut self, block_id: impl Into<String>) -> Self {
        self.blocks.push(Block::Divider { block_id: block_id.into() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(" "))
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

/// Packs lines into newline-joined chunks that each fit one section block.
/// A single oversized line is truncated rather than dropped.
pub fn chunk_lines(lines: &[String], limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in lines {
        let line = truncate_chars(line, limit);
        let needed = if current.is_empty() { line.len() } else { current.len() + 1 + line.len() };
        if needed > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn truncate_chars(line: &str, limit: usize) -> String {
    if line.len() <= limit {
        return line.to_owned();
    }
    let mut truncated = String::with_capacity(limit);
    for ch in line.chars() {
        if truncated.len() + ch.len_utf8() + '…'.len_utf8() > limit {
            break;
        }
        truncated.push(ch);
    }
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::{chunk_lines, Block, MessageBuilder, TextObject};

    #[test]
    fn message_builder_creates_typed_block_structure() {
        let message = MessageBuilder::new("fallback")
            .header("credit.summary.header.v1", "Credit check")
            .section("credit.summary.list.v1", |section| {
                section.mrkdwn("*Acme* needs attention");
            })
            .divider("credit.summary.divider.v1")
            .context("credit.summary.context.v1", |context| {
                context.plain("checked 1 customer");
            })
            .build();

        assert_eq!(message.blocks.len(), 4);
        assert!(matches!(
            &message.blocks[1],
            Block::Section {
                block_id,
                text: TextObject::Mrkdwn { .. }
            } if block_id == "credit.summary.list.v1"
        ));
        assert!(matches!(
            &message.blocks[3],
            Block::Context { elements, .. } if elements.len() == 1
        ));
    }

    #[test]
    fn blocks_serialize_in_slack_wire_shape() {
        let message = MessageBuilder::new("fallback")
            .header("h", "Title")
            .section("s", |section| {
                section.mrkdwn("*bold*");
            })
            .build();

        let json = serde_json::to_value(&message.blocks).expect("serialize blocks");
        assert_eq!(json[0]["type"], "header");
        assert_eq!(json[0]["text"]["type"], "plain_text");
        assert_eq!(json[1]["type"], "section");
        assert_eq!(json[1]["block_id"], "s");
        assert_eq!(json[1]["text"]["type"], "mrkdwn");
        assert_eq!(json[1]["text"]["text"], "*bold*");
    }

    #[test]
    fn chunking_respects_limit_and_keeps_every_line() {
        let lines =
            (0..10).map(|index| format!("line-{index:02}-{}", "x".repeat(20))).collect::<Vec<_>>();
        let chunks = chunk_lines(&lines, 70);

        assert!(chunks.iter().all(|chunk| chunk.len() <= 70), "{chunks:?}");
        assert_eq!(chunks.join("\n").lines().count(), 10);
    }

    #[test]
    fn oversized_line_is_truncated() {
        let chunks = chunk_lines(&["é".repeat(50)], 21);

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].len() <= 21);
        assert!(chunks[0].ends_with('…'));
    }
}
