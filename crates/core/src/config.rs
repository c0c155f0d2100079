use crate::error::PipelineError;

/// Tunables for one pipeline instance. Constructed once and passed in
/// explicitly; the core reads no ambient environment state.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Weight of embedding cosine similarity in the fused score. The
    /// keyword weight is its complement.
    pub weight_embedding: f64,
    /// Minimum fused score for an unqualified accept.
    pub confidence_threshold: f64,
    /// Cap on candidates pulled per store strategy.
    pub store_limit: usize,
    /// Pooled cross-source rerank sample size.
    pub rerank_pool: usize,
    /// Candidates kept per source before pooling.
    pub top_k: usize,
    /// Shortest token the store's full-text index covers.
    pub min_indexed_token_len: usize,
    /// Soft-accept multiplier applied to the threshold for the pooled
    /// rerank top. Empirically tuned, deliberately configurable.
    pub soft_rerank_factor: f64,
    /// Soft-accept multiplier applied to the threshold for the store top.
    pub soft_store_factor: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            weight_embedding: 0.75,
            confidence_threshold: 0.62,
            store_limit: 80,
            rerank_pool: 100,
            top_k: 3,
            min_indexed_token_len: 3,
            soft_rerank_factor: 0.9,
            soft_store_factor: 0.8,
        }
    }
}

impl PipelineConfig {
    pub fn weight_keywords(&self) -> f64 {
        1.0 - self.weight_embedding
    }

    /// Rejects nonsensical tunables synchronously, before any retrieval.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(0.0..=1.0).contains(&self.weight_embedding) {
            return Err(PipelineError::InvalidConfig(format!(
                "weight_embedding must be within [0, 1], got {}",
                self.weight_embedding
            )));
        }
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "confidence_threshold must be within (0, 1], got {}",
                self.confidence_threshold
            )));
        }
        for (name, factor) in [
            ("soft_rerank_factor", self.soft_rerank_factor),
            ("soft_store_factor", self.soft_store_factor),
        ] {
            if !(0.0..=1.0).contains(&factor) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {factor}"
                )));
            }
        }
        if self.store_limit == 0 || self.rerank_pool == 0 || self.top_k == 0 {
            return Err(PipelineError::InvalidConfig(
                "store_limit, rerank_pool and top_k must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn keyword_weight_is_complement() {
        let config = PipelineConfig {
            weight_embedding: 0.6,
            ..PipelineConfig::default()
        };
        assert!((config.weight_keywords() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_weight_is_rejected() {
        let config = PipelineConfig {
            weight_embedding: 1.5,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_caps_are_rejected() {
        let config = PipelineConfig {
            rerank_pool: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
