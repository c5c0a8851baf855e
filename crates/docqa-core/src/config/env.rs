use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DOCQA_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("DOCQA_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("DOCQA_EMBEDDING_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.embedding.provider = kind;
            } else {
                tracing::warn!("ignoring invalid DOCQA_EMBEDDING_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("DOCQA_EMBEDDING_MODEL") {
            self.embedding.model = Some(v);
        }
        if let Ok(v) = std::env::var("DOCQA_SESSION_DIR") {
            self.session.dir = v.into();
        }
        if let Ok(v) = std::env::var("DOCQA_RETRIEVAL_TOP_K")
            && let Ok(k) = v.parse::<usize>()
        {
            self.retrieval.top_k = k;
        }
        if let Ok(v) = std::env::var("DOCQA_LLM_TIMEOUT")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.llm_seconds = secs;
        }
        if let Ok(v) = std::env::var("DOCQA_EMBEDDING_TIMEOUT")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.embedding_seconds = secs;
        }
    }
}
