use crate::schema::ArqonConfig;

/// Reject structurally impossible configurations before the snapshot is
/// handed to the rest of the process (§6 "Config loader... produces an
/// immutable config snapshot at startup").
pub fn validate(config: &ArqonConfig) -> anyhow::Result<()> {
    let casil = &config.casil;

    if casil.limits.max_patterns == 0 && !casil.policies.redaction.patterns.is_empty() {
        anyhow::bail!(
            "casil.limits.max_patterns is 0 but casil.policies.redaction.patterns is non-empty"
        );
    }

    if casil.policies.redaction.patterns.len() > casil.limits.max_patterns {
        anyhow::bail!(
            "casil.policies.redaction.patterns has {} entries, exceeding casil.limits.max_patterns ({})",
            casil.policies.redaction.patterns.len(),
            casil.limits.max_patterns
        );
    }

    for pattern in &casil.policies.redaction.patterns {
        regex::Regex::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid redaction pattern {pattern:?}: {e}"))?;
    }

    for glob in casil.scope.include.iter().chain(casil.scope.exclude.iter()) {
        if glob.is_empty() {
            anyhow::bail!("casil.scope include/exclude entries must not be empty");
        }
    }

    if regex::Regex::new(&config.validation.id_grammar).is_err() {
        anyhow::bail!(
            "validation.id_grammar is not a valid regex: {}",
            config.validation.id_grammar
        );
    }

    if config.history.default_read_limit > config.history.max_read_limit {
        anyhow::bail!(
            "history.default_read_limit ({}) exceeds history.max_read_limit ({})",
            config.history.default_read_limit,
            config.history.max_read_limit
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        validate(&ArqonConfig::default()).unwrap();
    }

    #[test]
    fn rejects_pattern_count_over_budget() {
        let mut cfg = ArqonConfig::default();
        cfg.casil.limits.max_patterns = 1;
        cfg.casil.policies.redaction.patterns = vec!["a".into(), "b".into()];
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_malformed_pattern() {
        let mut cfg = ArqonConfig::default();
        cfg.casil.policies.redaction.patterns = vec!["(unclosed".into()];
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_read_limit_inversion() {
        let mut cfg = ArqonConfig::default();
        cfg.history.default_read_limit = 500;
        cfg.history.max_read_limit = 100;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_empty_scope_glob() {
        let mut cfg = ArqonConfig::default();
        cfg.casil.scope.include = vec!["".into()];
        assert!(validate(&cfg).is_err());
    }
}
