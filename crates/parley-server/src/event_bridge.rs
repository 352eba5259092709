use tokio::sync::broadcast;
use tracing::{info, warn};

use parley_engine::LoopEvent;

/// Subscribe to the engine's loop events and record each one in the log.
///
/// The task ends when every sender is dropped and returns how many events it saw.
pub fn spawn_event_log(mut rx: broadcast::Receiver<LoopEvent>) -> tokio::task::JoinHandle<u64> {
    tokio::spawn(async move {
        let mut seen = 0u64;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    seen += 1;
                    log_event(&event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "event log lagged, dropped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!(seen, "loop event channel closed");
                    break;
                }
            }
        }
        seen
    })
}

fn log_event(event: &LoopEvent) {
    let conversation_id = event.conversation_id().as_str();
    match event {
        LoopEvent::LoopStarted { llm_model, user_id, .. } => info!(
            event_type = event.event_type(),
            conversation_id,
            llm_model = %llm_model,
            user_id = ?user_id.as_ref().map(|u| u.as_str()),
            "loop event"
        ),
        LoopEvent::MessageReceived { image_count, .. } => info!(
            event_type = event.event_type(),
            conversation_id,
            image_count,
            "loop event"
        ),
        LoopEvent::ReplayReceived { bytes, .. } => info!(
            event_type = event.event_type(),
            conversation_id,
            bytes,
            "loop event"
        ),
        LoopEvent::LoopResumed { .. } | LoopEvent::LoopStopped { .. } => info!(
            event_type = event.event_type(),
            conversation_id,
            "loop event"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ConversationId;

    #[tokio::test]
    async fn counts_events_until_channel_closes() {
        let (tx, rx) = broadcast::channel(16);
        let handle = spawn_event_log(rx);

        let id = ConversationId::from_raw("c1");
        let _ = tx.send(LoopEvent::LoopResumed {
            conversation_id: id.clone(),
        });
        let _ = tx.send(LoopEvent::MessageReceived {
            conversation_id: id.clone(),
            content: "hi".into(),
            image_count: 0,
        });
        let _ = tx.send(LoopEvent::LoopStopped { conversation_id: id });
        drop(tx);

        assert_eq!(handle.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn sees_engine_events() {
        use parley_core::{ApiKey, EffectiveSettings, SessionOverrides, Settings};
        use parley_engine::{ExecutionEngine, LocalEngine};

        let (tx, _rx) = broadcast::channel(16);
        let engine = LocalEngine::new(tx);
        let handle = spawn_event_log(engine.subscribe());

        let settings = EffectiveSettings::resolve(
            Settings {
                llm_api_key: Some(ApiKey::new("sk")),
                ..Settings::default()
            },
            SessionOverrides::default(),
        );
        let _ = engine
            .start_or_resume(&ConversationId::from_raw("c2"), settings, None, None, None)
            .await
            .unwrap();
        assert_eq!(engine.stop_all(), 1);
        drop(engine);

        // loop_started and loop_stopped
        assert_eq!(handle.await.unwrap(), 2);
    }
}
