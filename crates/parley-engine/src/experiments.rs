//! Experiment variant assignment.
//!
//! An assigner sees a new conversation's settings once, before metadata is
//! written, and may hand back a modified copy.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::info;

use parley_core::{ConversationId, EffectiveSettings, UserId};

#[async_trait]
pub trait ExperimentAssigner: Send + Sync {
    async fn assign(
        &self,
        user_id: Option<&UserId>,
        conversation_id: &ConversationId,
        settings: EffectiveSettings,
    ) -> EffectiveSettings;
}

/// Passes settings through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAssigner;

#[async_trait]
impl ExperimentAssigner for NoopAssigner {
    async fn assign(
        &self,
        _user_id: Option<&UserId>,
        _conversation_id: &ConversationId,
        settings: EffectiveSettings,
    ) -> EffectiveSettings {
        settings
    }
}

/// Routes a fixed share of conversations to a variant LLM model.
///
/// Bucketing hashes the conversation id, so a given id always lands in the
/// same bucket regardless of user or process.
#[derive(Clone, Debug)]
pub struct ModelVariantAssigner {
    variant_model: String,
    percent: u8,
}

impl ModelVariantAssigner {
    /// `percent` is clamped to 100.
    pub fn new(variant_model: impl Into<String>, percent: u8) -> Self {
        Self {
            variant_model: variant_model.into(),
            percent: percent.min(100),
        }
    }

    /// Bucket in `0..100`: first eight bytes of SHA-256(id), big-endian, mod 100.
    pub fn bucket(conversation_id: &ConversationId) -> u8 {
        let digest = Sha256::digest(conversation_id.as_str().as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(head) % 100) as u8
    }

    pub fn in_rollout(&self, conversation_id: &ConversationId) -> bool {
        Self::bucket(conversation_id) < self.percent
    }
}

#[async_trait]
impl ExperimentAssigner for ModelVariantAssigner {
    async fn assign(
        &self,
        user_id: Option<&UserId>,
        conversation_id: &ConversationId,
        mut settings: EffectiveSettings,
    ) -> EffectiveSettings {
        if self.in_rollout(conversation_id) {
            info!(
                conversation_id = %conversation_id,
                user_id = user_id.map(UserId::as_str).unwrap_or("anonymous"),
                variant_model = %self.variant_model,
                "conversation assigned to model variant"
            );
            settings.llm_model.clone_from(&self.variant_model);
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{ApiKey, SessionOverrides, Settings};

    fn settings() -> EffectiveSettings {
        EffectiveSettings::resolve(
            Settings {
                llm_model: "base-model".into(),
                llm_api_key: Some(ApiKey::new("sk")),
                ..Settings::default()
            },
            SessionOverrides::default(),
        )
    }

    #[tokio::test]
    async fn noop_passes_through() {
        let out = NoopAssigner
            .assign(None, &ConversationId::from_raw("abc"), settings())
            .await;
        assert_eq!(out.llm_model, "base-model");
    }

    #[tokio::test]
    async fn zero_percent_never_assigns() {
        let assigner = ModelVariantAssigner::new("variant", 0);
        for i in 0..50 {
            let id = ConversationId::from_raw(format!("conv-{i}"));
            let out = assigner.assign(None, &id, settings()).await;
            assert_eq!(out.llm_model, "base-model");
        }
    }

    #[tokio::test]
    async fn full_rollout_always_assigns() {
        let assigner = ModelVariantAssigner::new("variant", 100);
        for i in 0..50 {
            let id = ConversationId::from_raw(format!("conv-{i}"));
            let out = assigner.assign(None, &id, settings()).await;
            assert_eq!(out.llm_model, "variant");
        }
    }

    #[tokio::test]
    async fn assignment_only_touches_model() {
        let assigner = ModelVariantAssigner::new("variant", 100);
        let out = assigner
            .assign(Some(&UserId::from_raw("u1")), &ConversationId::from_raw("x"), settings())
            .await;
        assert_eq!(out.llm_api_key.unwrap().expose(), "sk");
        assert_eq!(out.max_iterations, 100);
    }

    #[test]
    fn bucket_is_deterministic_and_bounded() {
        let id = ConversationId::from_raw("0123456789abcdef0123456789abcdef");
        let first = ModelVariantAssigner::bucket(&id);
        assert_eq!(first, ModelVariantAssigner::bucket(&id));
        for i in 0..200 {
            assert!(ModelVariantAssigner::bucket(&ConversationId::from_raw(format!("{i}"))) < 100);
        }
    }

    #[test]
    fn percent_is_clamped() {
        let assigner = ModelVariantAssigner::new("variant", 250);
        assert!(assigner.in_rollout(&ConversationId::from_raw("any")));
    }
}
