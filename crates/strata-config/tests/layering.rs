use figment::Jail;
use pretty_assertions::assert_eq;
use strata_config::{ConfigError, StrataConfig};

#[test]
fn defaults_load_without_files() {
    Jail::expect_with(|_jail| {
        let config = StrataConfig::load().expect("config loads");
        assert_eq!(config.database.path, ".strata/memory.db");
        assert_eq!(config.consolidation.min_observations, 2);
        assert_eq!(config.retry.max_attempts, 3);
        Ok(())
    });
}

#[test]
fn project_file_overrides_defaults() {
    Jail::expect_with(|jail| {
        jail.create_dir(".strata")?;
        jail.create_file(
            ".strata/config.toml",
            r#"
                [database]
                path = "/var/lib/strata/memory.db"

                [consolidation]
                min_entity_age_secs = 0
                max_relationships = 25
            "#,
        )?;

        let config = StrataConfig::load().expect("config loads");
        assert_eq!(config.database.path, "/var/lib/strata/memory.db");
        assert_eq!(config.consolidation.min_entity_age_secs, 0);
        assert_eq!(config.consolidation.max_relationships, 25);
        assert_eq!(config.consolidation.min_observations, 2);
        Ok(())
    });
}

#[test]
fn env_beats_project_file() {
    Jail::expect_with(|jail| {
        jail.create_dir(".strata")?;
        jail.create_file(
            ".strata/config.toml",
            "[resolver]\nnode_budget = 50\n",
        )?;
        jail.set_env("STRATA_RESOLVER__NODE_BUDGET", "75");
        jail.set_env("STRATA_DIRECTORY__BASE_URL", "http://directory.local");

        let config = StrataConfig::load().expect("config loads");
        assert_eq!(config.resolver.node_budget, 75);
        assert!(config.directory.is_configured());
        Ok(())
    });
}

#[test]
fn out_of_range_value_is_rejected() {
    Jail::expect_with(|jail| {
        jail.set_env("STRATA_EMBEDDINGS__DIMENSION", "0");
        let err = StrataConfig::load().expect_err("dimension 0 must fail");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        Ok(())
    });
}
