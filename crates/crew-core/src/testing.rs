//! Scripted provider for deterministic loop tests

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use crate::error::{CrewError, Result};
use crate::message::Message;
use crate::provider::{
    Completion, CompletionStream, GenerationOptions, LlmProvider, StreamChunk,
};

/// Replays canned responses in order, recording every request it sees
///
/// Streaming calls re-chunk the canned text into small fragments so parser
/// consumers see realistic boundaries. An exhausted script fails like a
/// dead transport.
pub(crate) struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub(crate) fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Messages of the i-th request made against this provider
    pub(crate) fn request(&self, index: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[index].clone()
    }

    fn next_response(&self, messages: &[Message]) -> Result<String> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CrewError::Provider("script exhausted".into()))
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let content = self.next_response(messages)?;
        Ok(Completion {
            content,
            model: options.model.clone(),
            usage: None,
        })
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let content = self.next_response(messages)?;
        let chars: Vec<char> = content.chars().collect();
        let mut chunks: Vec<Result<StreamChunk>> = chars
            .chunks(7)
            .map(|fragment| {
                Ok(StreamChunk {
                    delta: fragment.iter().collect(),
                    done: false,
                    usage: None,
                })
            })
            .collect();
        chunks.push(Ok(StreamChunk {
            delta: String::new(),
            done: true,
            usage: None,
        }));
        Ok(Box::pin(stream::iter(chunks)))
    }
}
