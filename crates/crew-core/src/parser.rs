//! Streaming Response Parser
//!
//! Incrementally extracts the four tagged fields of a reasoning step
//! (`<thought>`, `<action>`, `<action_input>`, `<final_answer>`) from a
//! model's token stream. Fragments arrive at arbitrary boundaries, so a tag
//! may be split across calls; a tail of unresolved text is buffered between
//! calls until it can be classified.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The four fields a reasoning step may carry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Thought = 0,
    Action = 1,
    ActionInput = 2,
    FinalAnswer = 3,
}

const FIELDS: [Field; 4] = [
    Field::Thought,
    Field::Action,
    Field::ActionInput,
    Field::FinalAnswer,
];

impl Field {
    fn open_tag(self) -> &'static str {
        match self {
            Field::Thought => "<thought>",
            Field::Action => "<action>",
            Field::ActionInput => "<action_input>",
            Field::FinalAnswer => "<final_answer>",
        }
    }

    fn close_tag(self) -> &'static str {
        match self {
            Field::Thought => "</thought>",
            Field::Action => "</action>",
            Field::ActionInput => "</action_input>",
            Field::FinalAnswer => "</final_answer>",
        }
    }
}

/// Terminal output of the parser for one model call
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedTurn {
    pub thought: Option<String>,
    pub action: Option<String>,
    pub action_input: Map<String, Value>,
    pub final_answer: Option<String>,
}

/// Incremental parser over a streamed response
///
/// Feed fragments with [`process_chunk`](Self::process_chunk); read the
/// result of record with [`get_parsed_data`](Self::get_parsed_data) once the
/// stream ends. [`final_answer_so_far`](Self::final_answer_so_far) peeks at
/// partial final-answer content before its closing tag has arrived, for
/// progress display.
#[derive(Debug, Default)]
pub struct ResponseParser {
    /// Unresolved text carried between calls (at most a partial tag)
    tail: String,
    /// Field currently being filled, if inside one
    state: Option<Field>,
    /// Accumulated content per field
    fields: [String; 4],
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the next fragment of streamed text
    pub fn process_chunk(&mut self, fragment: &str) {
        self.tail.push_str(fragment);
        self.drain();
    }

    /// Partial final-answer content seen so far, if any
    pub fn final_answer_so_far(&self) -> Option<&str> {
        let buf = &self.fields[Field::FinalAnswer as usize];
        if buf.is_empty() { None } else { Some(buf) }
    }

    /// Assemble the parsed fields
    ///
    /// Safe to call at any point; the value of record is the one read after
    /// the last fragment. A field whose closing tag never arrived counts
    /// with the content buffered up to the stream's end.
    pub fn get_parsed_data(&self) -> ParsedTurn {
        ParsedTurn {
            thought: non_empty(&self.fields[Field::Thought as usize]),
            action: tag_value(&self.fields[Field::Action as usize]),
            action_input: parse_action_input(&self.fields[Field::ActionInput as usize]),
            final_answer: tag_value(&self.fields[Field::FinalAnswer as usize]),
        }
    }

    /// Classify as much of the buffered tail as possible
    fn drain(&mut self) {
        loop {
            match self.state {
                None => {
                    // Earliest opening tag wins; text before it is ignored.
                    let mut earliest: Option<(usize, Field)> = None;
                    for field in FIELDS {
                        if let Some(pos) = self.tail.find(field.open_tag()) {
                            if earliest.is_none_or(|(best, _)| pos < best) {
                                earliest = Some((pos, field));
                            }
                        }
                    }
                    if let Some((pos, field)) = earliest {
                        self.tail.drain(..pos + field.open_tag().len());
                        self.state = Some(field);
                        continue;
                    }
                    // Keep only a suffix that could still become an opening tag.
                    let open_tags: Vec<&str> = FIELDS.iter().map(|f| f.open_tag()).collect();
                    let keep = partial_tag_suffix(&self.tail, &open_tags);
                    self.tail.drain(..self.tail.len() - keep);
                    break;
                }
                Some(field) => {
                    if let Some(pos) = self.tail.find(field.close_tag()) {
                        let content: String = self.tail[..pos].to_string();
                        self.fields[field as usize].push_str(&content);
                        self.tail.drain(..pos + field.close_tag().len());
                        self.state = None;
                        continue;
                    }
                    // Flush everything except a possible partial closing tag.
                    let keep = partial_tag_suffix(&self.tail, &[field.close_tag()]);
                    let cut = self.tail.len() - keep;
                    self.fields[field as usize].push_str(&self.tail[..cut]);
                    self.tail.drain(..cut);
                    break;
                }
            }
        }
    }
}

/// Longest suffix of `text` that is a strict prefix of one of `tags`
///
/// Returns the suffix length in bytes (tags are ASCII, so the boundary is
/// always valid).
fn partial_tag_suffix(text: &str, tags: &[&str]) -> usize {
    let mut best = 0;
    for tag in tags {
        let max_len = tag.len().saturating_sub(1).min(text.len());
        for len in (1..=max_len).rev() {
            if text.ends_with(&tag[..len]) {
                best = best.max(len);
                break;
            }
        }
    }
    best
}

fn non_empty(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Field value with the literal-"null" policy applied
///
/// Some models emit the word `null` instead of omitting a tag; treat it the
/// same as an absent field.
fn tag_value(content: &str) -> Option<String> {
    non_empty(content).filter(|value| !value.eq_ignore_ascii_case("null"))
}

/// Parse accumulated `action_input` content as a JSON object
///
/// Malformed or non-object content degrades to an empty mapping so a step
/// with unusable tool arguments never aborts the turn.
fn parse_action_input(content: &str) -> Map<String, Value> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::debug!(kind = %json_kind(&other), "action_input is not a JSON object, ignoring");
            Map::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "action_input is not valid JSON, ignoring");
            Map::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = "<thought>Need the sum first</thought>\n\
        <action>calculator</action>\n\
        <action_input>{\"expression\": \"2+2\"}</action_input>";

    fn parse_whole(text: &str) -> ParsedTurn {
        let mut parser = ResponseParser::new();
        parser.process_chunk(text);
        parser.get_parsed_data()
    }

    fn parse_chars(text: &str) -> ParsedTurn {
        let mut parser = ResponseParser::new();
        for ch in text.chars() {
            parser.process_chunk(&ch.to_string());
        }
        parser.get_parsed_data()
    }

    #[test]
    fn test_extracts_all_fields() {
        let parsed = parse_whole(RESPONSE);
        assert_eq!(parsed.thought.as_deref(), Some("Need the sum first"));
        assert_eq!(parsed.action.as_deref(), Some("calculator"));
        assert_eq!(
            parsed.action_input.get("expression").and_then(Value::as_str),
            Some("2+2")
        );
        assert_eq!(parsed.final_answer, None);
    }

    #[test]
    fn test_fragmentation_invariance() {
        let tagged = format!("{RESPONSE}\n<final_answer>4</final_answer>");
        assert_eq!(parse_whole(&tagged), parse_chars(&tagged));
    }

    #[test]
    fn test_tag_split_across_fragments() {
        let mut parser = ResponseParser::new();
        parser.process_chunk("<fin");
        parser.process_chunk("al_answer>the answ");
        parser.process_chunk("er</final_an");
        parser.process_chunk("swer>");
        let parsed = parser.get_parsed_data();
        assert_eq!(parsed.final_answer.as_deref(), Some("the answer"));
    }

    #[test]
    fn test_action_vs_action_input_tags() {
        let parsed = parse_chars("<action_input>{\"q\": 1}</action_input>");
        assert_eq!(parsed.action, None);
        assert_eq!(parsed.action_input.get("q").and_then(Value::as_i64), Some(1));
    }

    #[test]
    fn test_malformed_action_input_is_empty_map() {
        let parsed = parse_whole("<action>search</action><action_input>not json at all</action_input>");
        assert_eq!(parsed.action.as_deref(), Some("search"));
        assert!(parsed.action_input.is_empty());
    }

    #[test]
    fn test_non_object_action_input_is_empty_map() {
        let parsed = parse_whole("<action_input>[1, 2]</action_input>");
        assert!(parsed.action_input.is_empty());
    }

    #[test]
    fn test_literal_null_means_absent() {
        let parsed = parse_whole("<action>null</action><final_answer>NULL</final_answer>");
        assert_eq!(parsed.action, None);
        assert_eq!(parsed.final_answer, None);
    }

    #[test]
    fn test_missing_fields_are_absent() {
        let parsed = parse_whole("no tags in here");
        assert_eq!(parsed, ParsedTurn::default());
    }

    #[test]
    fn test_interstitial_text_ignored() {
        let parsed = parse_whole("preamble <thought>x</thought> chatter <action>y</action> trailer");
        assert_eq!(parsed.thought.as_deref(), Some("x"));
        assert_eq!(parsed.action.as_deref(), Some("y"));
    }

    #[test]
    fn test_partial_final_answer_peek() {
        let mut parser = ResponseParser::new();
        parser.process_chunk("<final_answer>partial so f");
        assert_eq!(parser.final_answer_so_far(), Some("partial so f"));
        parser.process_chunk("ar</final_answer>");
        assert_eq!(
            parser.get_parsed_data().final_answer.as_deref(),
            Some("partial so far")
        );
    }

    #[test]
    fn test_unclosed_final_answer_counts_at_stream_end() {
        let mut parser = ResponseParser::new();
        parser.process_chunk("<final_answer>42");
        let parsed = parser.get_parsed_data();
        assert_eq!(parsed.final_answer.as_deref(), Some("42"));
    }

    #[test]
    fn test_angle_bracket_inside_field_content() {
        let parsed = parse_chars("<final_answer>use a < b here</final_answer>");
        assert_eq!(parsed.final_answer.as_deref(), Some("use a < b here"));
    }
}
