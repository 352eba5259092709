//! Agent loop launcher.
//!
//! The `ExecutionEngine` trait is the single point where a conversation's
//! agent loop is engaged. `LocalEngine` is the in-process implementation: it
//! keeps a registry of active loops, starts a background task per new
//! conversation and routes later messages to the loop that already exists.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use parley_core::{AgentLoopInfo, ConversationId, EffectiveSettings, InitialMessage, LoopStatus, UserId};

use crate::error::EngineError;
use crate::events::LoopEvent;

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Start a loop for the conversation, or attach to the one already running.
    async fn start_or_resume(
        &self,
        conversation_id: &ConversationId,
        settings: EffectiveSettings,
        user_id: Option<&UserId>,
        initial_message: Option<InitialMessage>,
        replay_json: Option<String>,
    ) -> Result<AgentLoopInfo, EngineError>;

    /// Current info for an active loop, if any.
    fn status(&self, conversation_id: &ConversationId) -> Option<AgentLoopInfo>;
}

enum LoopInput {
    Message(InitialMessage),
    Replay(String),
}

struct ActiveLoop {
    cancel: CancellationToken,
    inbox: mpsc::UnboundedSender<LoopInput>,
    info: AgentLoopInfo,
    generation: u64,
}

/// In-process engine backed by a `DashMap` loop registry.
pub struct LocalEngine {
    loops: Arc<DashMap<ConversationId, ActiveLoop>>,
    event_tx: broadcast::Sender<LoopEvent>,
    next_generation: AtomicU64,
}

impl LocalEngine {
    pub fn new(event_tx: broadcast::Sender<LoopEvent>) -> Self {
        Self {
            loops: Arc::new(DashMap::new()),
            event_tx,
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoopEvent> {
        self.event_tx.subscribe()
    }

    pub fn active_count(&self) -> usize {
        self.loops.len()
    }

    /// Cancel one loop. Returns false when nothing was running.
    pub fn stop(&self, conversation_id: &ConversationId) -> bool {
        if let Some((_, active)) = self.loops.remove(conversation_id) {
            active.cancel.cancel();
            true
        } else {
            false
        }
    }

    /// Cancel every loop and return how many were running.
    pub fn stop_all(&self) -> usize {
        let count = self.loops.len();
        for entry in self.loops.iter() {
            entry.value().cancel.cancel();
        }
        self.loops.clear();
        count
    }
}

#[async_trait]
impl ExecutionEngine for LocalEngine {
    async fn start_or_resume(
        &self,
        conversation_id: &ConversationId,
        settings: EffectiveSettings,
        user_id: Option<&UserId>,
        initial_message: Option<InitialMessage>,
        replay_json: Option<String>,
    ) -> Result<AgentLoopInfo, EngineError> {
        if !settings.has_usable_api_key() {
            return Err(EngineError::InvalidSettings(
                "LLM API key is missing or blank".into(),
            ));
        }

        // The registry guard is released at the end of this statement.
        let (info, inbox, fresh) = match self.loops.entry(conversation_id.clone()) {
            Entry::Occupied(entry) => {
                let active = entry.get();
                let info = AgentLoopInfo {
                    resumed: true,
                    ..active.info.clone()
                };
                (info, active.inbox.clone(), None)
            }
            Entry::Vacant(entry) => {
                let cancel = CancellationToken::new();
                let (tx, rx) = mpsc::unbounded_channel();
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let info = AgentLoopInfo {
                    conversation_id: conversation_id.clone(),
                    status: LoopStatus::Starting,
                    resumed: false,
                    started_at: Utc::now().to_rfc3339(),
                };
                let _ = entry.insert(ActiveLoop {
                    cancel: cancel.clone(),
                    inbox: tx.clone(),
                    info: info.clone(),
                    generation,
                });
                (info, tx, Some((cancel, rx, generation)))
            }
        };

        match fresh {
            Some((cancel, rx, generation)) => {
                info!(
                    conversation_id = %conversation_id,
                    llm_model = %settings.llm_model,
                    agent = %settings.agent,
                    max_iterations = settings.max_iterations,
                    "agent loop started"
                );
                emit(
                    &self.event_tx,
                    LoopEvent::LoopStarted {
                        conversation_id: conversation_id.clone(),
                        user_id: user_id.cloned(),
                        llm_model: settings.llm_model.clone(),
                    },
                );
                let _ = tokio::spawn(run_loop(
                    conversation_id.clone(),
                    rx,
                    cancel,
                    generation,
                    Arc::clone(&self.loops),
                    self.event_tx.clone(),
                ));
            }
            None => {
                info!(conversation_id = %conversation_id, "attached to running agent loop");
                emit(
                    &self.event_tx,
                    LoopEvent::LoopResumed {
                        conversation_id: conversation_id.clone(),
                    },
                );
            }
        }

        if let Some(replay) = replay_json {
            inbox
                .send(LoopInput::Replay(replay))
                .map_err(|_| EngineError::ChannelClosed(conversation_id.clone()))?;
        }
        if let Some(message) = initial_message {
            inbox
                .send(LoopInput::Message(message))
                .map_err(|_| EngineError::ChannelClosed(conversation_id.clone()))?;
        }

        Ok(info)
    }

    fn status(&self, conversation_id: &ConversationId) -> Option<AgentLoopInfo> {
        self.loops.get(conversation_id).map(|active| active.info.clone())
    }
}

async fn run_loop(
    conversation_id: ConversationId,
    mut inbox: mpsc::UnboundedReceiver<LoopInput>,
    cancel: CancellationToken,
    generation: u64,
    loops: Arc<DashMap<ConversationId, ActiveLoop>>,
    event_tx: broadcast::Sender<LoopEvent>,
) {
    if let Some(mut active) = loops.get_mut(&conversation_id) {
        if active.generation == generation {
            active.info.status = LoopStatus::Running;
        }
    }

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            input = inbox.recv() => match input {
                Some(LoopInput::Message(message)) => {
                    debug!(
                        conversation_id = %conversation_id,
                        images = message.image_urls.len(),
                        "message delivered to agent loop"
                    );
                    emit(&event_tx, LoopEvent::MessageReceived {
                        conversation_id: conversation_id.clone(),
                        image_count: message.image_urls.len(),
                        content: message.content,
                    });
                }
                Some(LoopInput::Replay(replay)) => {
                    emit(&event_tx, LoopEvent::ReplayReceived {
                        conversation_id: conversation_id.clone(),
                        bytes: replay.len(),
                    });
                }
                None => break,
            },
        }
    }

    // A stop followed by a restart registers a newer generation under the
    // same id; only remove our own entry.
    let _ = loops.remove_if(&conversation_id, |_, active| active.generation == generation);
    info!(conversation_id = %conversation_id, "agent loop stopped");
    emit(&event_tx, LoopEvent::LoopStopped { conversation_id });
}

fn emit(event_tx: &broadcast::Sender<LoopEvent>, event: LoopEvent) {
    let event_type = event.event_type();
    if event_tx.send(event).is_err() {
        debug!(event_type, "no event receivers");
    }
}
