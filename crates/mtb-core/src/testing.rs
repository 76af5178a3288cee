//! Test doubles shared by the unit tests of this crate.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Mutex,
};

use async_trait::async_trait;
use tokio::{sync::oneshot, time::Instant};

use crate::{
    domain::{ChatId, ChatRef, MediaKind, MessageId, MessageRef, SourceMessage, UserId},
    errors::Error,
    messaging::port::ChatPlatform,
    replies::{PendingReply, ReplySource},
    Result,
};

/// In-memory chat platform that records every call with its (tokio) timestamp.
#[derive(Default)]
pub(crate) struct FakePlatform {
    messages: Mutex<HashMap<(ChatRef, i32), SourceMessage>>,
    fail_fetch: Mutex<HashSet<i32>>,
    fail_copy: Mutex<HashSet<i32>>,
    fail_peek: Mutex<bool>,
    fail_send: Mutex<bool>,
    next_id: Mutex<i32>,

    pub fetches: Mutex<Vec<(ChatRef, i32)>>,
    pub peeks: Mutex<Vec<(ChatRef, i32)>>,
    pub copies: Mutex<Vec<(i32, ChatId, Option<String>)>>,
    pub sends: Mutex<Vec<(ChatId, String)>>,
    pub edits: Mutex<Vec<(MessageRef, String)>>,
    pub events: Mutex<Vec<(Instant, String)>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1000),
            ..Default::default()
        }
    }

    pub fn with_media(self, chat: ChatRef, id: i32, caption: Option<&str>) -> Self {
        self.messages.lock().unwrap().insert(
            (chat.clone(), id),
            SourceMessage {
                chat,
                id: MessageId(id),
                media: Some(MediaKind::Document),
                caption: caption.map(str::to_string),
            },
        );
        self
    }

    pub fn with_text(self, chat: ChatRef, id: i32) -> Self {
        self.messages.lock().unwrap().insert(
            (chat.clone(), id),
            SourceMessage {
                chat,
                id: MessageId(id),
                media: None,
                caption: None,
            },
        );
        self
    }

    pub fn failing_fetch(self, id: i32) -> Self {
        self.fail_fetch.lock().unwrap().insert(id);
        self
    }

    pub fn failing_copy(self, id: i32) -> Self {
        self.fail_copy.lock().unwrap().insert(id);
        self
    }

    pub fn failing_peeks(self) -> Self {
        *self.fail_peek.lock().unwrap() = true;
        self
    }

    pub fn failing_sends(self) -> Self {
        *self.fail_send.lock().unwrap() = true;
        self
    }

    pub fn fetched_ids(&self) -> Vec<i32> {
        self.fetches.lock().unwrap().iter().map(|(_, id)| *id).collect()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<(Instant, String)> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push((Instant::now(), event));
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn fetch_message(&self, chat: &ChatRef, id: MessageId) -> Result<Option<SourceMessage>> {
        self.fetches.lock().unwrap().push((chat.clone(), id.0));
        self.record(format!("fetch {chat} {}", id.0));
        if self.fail_fetch.lock().unwrap().contains(&id.0) {
            return Err(Error::External(format!("fetch {} failed", id.0)));
        }
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(&(chat.clone(), id.0))
            .cloned())
    }

    async fn peek_message(&self, chat: &ChatRef, id: MessageId) -> Result<()> {
        self.peeks.lock().unwrap().push((chat.clone(), id.0));
        self.record(format!("peek {chat} {}", id.0));
        if *self.fail_peek.lock().unwrap() {
            return Err(Error::External("peek failed".to_string()));
        }
        Ok(())
    }

    async fn copy_message(
        &self,
        source: &SourceMessage,
        destination: ChatId,
        caption: Option<&str>,
    ) -> Result<()> {
        self.record(format!("copy {}", source.id.0));
        if self.fail_copy.lock().unwrap().contains(&source.id.0) {
            return Err(Error::External(format!("copy {} failed", source.id.0)));
        }
        self.copies.lock().unwrap().push((
            source.id.0,
            destination,
            caption.map(str::to_string),
        ));
        Ok(())
    }

    async fn send_text(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.sends.lock().unwrap().push((chat_id, html.to_string()));
        self.record(format!("send {html}"));
        if *self.fail_send.lock().unwrap() {
            return Err(Error::External("send failed".to_string()));
        }
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(*guard),
        })
    }

    async fn edit_text(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.edits.lock().unwrap().push((msg, html.to_string()));
        self.record(format!("edit {html}"));
        Ok(())
    }
}

/// Answers wizard questions from a fixed script; once exhausted, never answers.
#[derive(Default)]
pub(crate) struct ScriptedReplies {
    script: Mutex<VecDeque<String>>,
    parked: Mutex<Vec<oneshot::Sender<String>>>,
}

impl ScriptedReplies {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            script: Mutex::new(answers.iter().map(|s| s.to_string()).collect()),
            parked: Mutex::new(Vec::new()),
        }
    }
}

impl ReplySource for ScriptedReplies {
    fn subscribe(&self, _user: UserId) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        match self.script.lock().unwrap().pop_front() {
            Some(answer) => {
                let _ = tx.send(answer);
            }
            None => self.parked.lock().unwrap().push(tx),
        }
        PendingReply::new(rx)
    }
}
