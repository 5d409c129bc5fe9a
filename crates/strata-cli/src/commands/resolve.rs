use std::sync::Arc;

use strata_config::StrataConfig;
use strata_core::{RealmMembership, RealmRef};
use strata_db::Collaborators;
use strata_db::repos::EntityFilter;
use strata_directory::StaticDirectory;

use crate::bootstrap;
use crate::cli::{GlobalFlags, ResolveArgs};
use crate::output::output;

/// The caller and its visible realms, as described on the command line.
pub fn membership(args: &ResolveArgs) -> RealmMembership {
    let client = RealmRef::client(args.client.as_str());
    let skill_modules = args
        .modules
        .iter()
        .map(|m| RealmRef::skill_module(m.as_str()))
        .collect();
    match &args.synth {
        Some(synth) => RealmMembership {
            own: RealmRef::synth(synth.as_str()),
            synth_class: args
                .synth_class
                .as_deref()
                .map(RealmRef::synth_class),
            skill_modules,
            client: Some(client),
        },
        None => RealmMembership {
            own: client,
            synth_class: None,
            skill_modules,
            client: None,
        },
    }
}

/// The entity filter implied by `--name`, `--kind` and `--limit`.
pub fn filter(args: &ResolveArgs) -> EntityFilter {
    EntityFilter {
        name: args.name.clone(),
        kind: args.kind.clone(),
        include_deleted: false,
        limit: args.limit,
    }
}

/// Handle `strata resolve`.
///
/// Membership comes from the flags, so no directory service is consulted.
pub async fn handle(
    args: &ResolveArgs,
    config: &StrataConfig,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let membership = membership(args);
    let caller = membership.own.clone();
    let directory = Arc::new(StaticDirectory::new().with_membership(membership));
    let svc = bootstrap::open_service(config, Collaborators::from_directory(directory)).await?;

    let set = svc.resolve_realm_memories(&caller, &filter(args)).await?;
    tracing::debug!(caller = %caller, entities = set.entities.len(), "resolved");
    output(&set, flags.format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args() -> ResolveArgs {
        ResolveArgs {
            client: "vervelyn".into(),
            synth: None,
            synth_class: None,
            modules: vec!["seo".into()],
            name: None,
            kind: None,
            limit: None,
        }
    }

    #[test]
    fn client_caller_sees_itself_and_its_modules() {
        let membership = membership(&args());
        assert_eq!(membership.own, RealmRef::client("vervelyn"));
        assert_eq!(
            membership.visible_realms(),
            vec![RealmRef::client("vervelyn"), RealmRef::skill_module("seo")]
        );
    }

    #[test]
    fn synth_caller_inherits_class_and_client() {
        let membership = membership(&ResolveArgs {
            synth: Some("s-1".into()),
            synth_class: Some("24".into()),
            ..args()
        });
        assert_eq!(membership.own, RealmRef::synth("s-1"));
        assert_eq!(membership.visible_realms().len(), 4);
    }

    #[tokio::test]
    async fn resolve_on_an_empty_store_prints_nothing_visible() {
        let mut config = StrataConfig::default();
        config.database.path = ":memory:".into();
        let flags = GlobalFlags {
            format: crate::cli::OutputFormat::Raw,
            quiet: true,
            verbose: false,
            db: None,
            env_file: None,
        };
        handle(&args(), &config, &flags).await.unwrap();
    }
}
