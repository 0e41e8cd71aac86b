use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::filters::{
    AlwaysOffFilter, FeatureFilter, FilterRegistry, RoleAndPermissionFilter, ROLE_AND_PERMISSION,
};
use super::{EvaluationReason, FeatureContext, FeatureDefinition, FeatureEvaluation, FilterConfig};
use crate::error::RepositoryError;
use crate::repository::FeatureRepository;

/// Resolves a flag name plus a request context into an on/off decision.
///
/// Evaluation rules:
/// - unknown flags and flags with `enabled: false` are off, whatever their filters say
/// - otherwise filters run in list order and the first one returning `true` enables
///   the flag; the rest are never invoked
/// - a filter name missing from the registry runs the default filter instead
/// - a filter that fails on its parameters counts as `false` and the chain continues
pub struct FeatureManager {
    repository: Arc<dyn FeatureRepository>,
    filters: FilterRegistry,
    default_filter: Arc<dyn FeatureFilter>,
}

impl FeatureManager {
    pub fn new(
        repository: Arc<dyn FeatureRepository>,
        filters: FilterRegistry,
        default_filter: Arc<dyn FeatureFilter>,
    ) -> Self {
        Self {
            repository,
            filters,
            default_filter,
        }
    }

    /// Built-in filters plus `RoleAndPermission`; unknown filter names evaluate to `false`.
    pub fn with_defaults(repository: Arc<dyn FeatureRepository>) -> Self {
        let filters = FilterRegistry::builtin().register(ROLE_AND_PERMISSION, RoleAndPermissionFilter);
        Self::new(repository, filters, Arc::new(AlwaysOffFilter))
    }

    pub fn repository(&self) -> &Arc<dyn FeatureRepository> {
        &self.repository
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn is_enabled(&self, name: &str, ctx: &FeatureContext) -> bool {
        self.evaluate(name, ctx).enabled
    }

    pub fn evaluate(&self, name: &str, ctx: &FeatureContext) -> FeatureEvaluation {
        match self.repository.get_feature(name) {
            Some(def) => self.evaluate_definition(&def, ctx),
            None => {
                debug!(feature = name, "unknown feature");
                FeatureEvaluation::off(EvaluationReason::NotFound)
            }
        }
    }

    /// Evaluates every flag in one repository snapshot. No flag is left out,
    /// disabled ones map to `false`.
    pub fn get_all_features(&self, ctx: &FeatureContext) -> HashMap<String, bool> {
        self.repository
            .get_all_features()
            .iter()
            .map(|(name, def)| (name.clone(), self.evaluate_definition(def, ctx).enabled))
            .collect()
    }

    pub async fn refresh(&self) -> Result<(), RepositoryError> {
        self.repository.refresh().await
    }

    fn evaluate_definition(&self, def: &FeatureDefinition, ctx: &FeatureContext) -> FeatureEvaluation {
        if !def.enabled {
            return FeatureEvaluation::off(EvaluationReason::Disabled);
        }

        let matched = def
            .filters
            .iter()
            .find(|config| self.apply_filter(def, config, ctx));

        match matched {
            Some(config) => FeatureEvaluation {
                enabled: true,
                reason: EvaluationReason::FilterMatched(config.name.clone()),
            },
            None => FeatureEvaluation::off(EvaluationReason::NoFilterMatched),
        }
    }

    fn apply_filter(&self, def: &FeatureDefinition, config: &FilterConfig, ctx: &FeatureContext) -> bool {
        let filter = match self.filters.get(&config.name) {
            Some(filter) => filter,
            None => {
                debug!(feature = %def.name, filter = %config.name, "filter not registered, using default");
                self.default_filter.as_ref()
            }
        };

        match filter.evaluate(ctx, &config.parameters) {
            Ok(result) => result,
            Err(e) => {
                warn!(feature = %def.name, filter = %config.name, error = %e, "filter failed, treating as false");
                false
            }
        }
    }
}

impl std::fmt::Debug for FeatureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureManager")
            .field("repository", &self.repository.name())
            .field("filters", &self.filters)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::filters::{ALWAYS_ON, ROLE_BASED, TARGETING};
    use crate::evaluation::Parameters;
    use crate::repository::{FileFeatureRepository, InMemoryFeatureRepository};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NONE: [&str; 0] = [];

    fn admin() -> FeatureContext {
        FeatureContext::new("user1", ["admin"], NONE)
    }

    fn manager_with(defs: Vec<FeatureDefinition>) -> FeatureManager {
        let repo = InMemoryFeatureRepository::new();
        for def in defs {
            repo.add_feature(def).unwrap();
        }
        FeatureManager::with_defaults(Arc::new(repo))
    }

    #[test]
    fn test_disabled_feature_always_returns_false() {
        let fm = manager_with(vec![FeatureDefinition::new(
            "DisabledFeature",
            false,
            vec![FilterConfig::new(ALWAYS_ON)],
        )]);

        let result = fm.evaluate("DisabledFeature", &admin());
        assert!(!result.enabled);
        assert_eq!(result.reason, EvaluationReason::Disabled);
    }

    #[test]
    fn test_unknown_feature_returns_false() {
        let fm = manager_with(vec![]);
        let result = fm.evaluate("NoSuchFeature", &admin());
        assert!(!result.enabled);
        assert_eq!(result.reason, EvaluationReason::NotFound);
    }

    #[test]
    fn test_always_on_filter() {
        let fm = manager_with(vec![FeatureDefinition::new(
            "FeatureA",
            true,
            vec![FilterConfig::new(ALWAYS_ON)],
        )]);
        assert!(fm.is_enabled("FeatureA", &admin()));
    }

    #[test]
    fn test_role_based_filter() {
        let fm = manager_with(vec![
            FeatureDefinition::new(
                "FeatureB",
                true,
                vec![FilterConfig::new(ROLE_BASED).with_param("role", "admin")],
            ),
            FeatureDefinition::new(
                "FeatureC",
                true,
                vec![FilterConfig::new(ROLE_BASED).with_param("role", "manager")],
            ),
        ]);

        assert!(fm.is_enabled("FeatureB", &admin()));
        assert!(!fm.is_enabled("FeatureC", &admin()));
    }

    #[test]
    fn test_unknown_filter_falls_back_to_default() {
        let fm = manager_with(vec![FeatureDefinition::new(
            "FeatureD",
            true,
            vec![FilterConfig::new("DoesNotExist")],
        )]);
        assert!(!fm.is_enabled("FeatureD", &admin()));
    }

    #[test]
    fn test_custom_default_filter() {
        let repo = InMemoryFeatureRepository::new();
        repo.add_feature(FeatureDefinition::new(
            "FeatureD",
            true,
            vec![FilterConfig::new("DoesNotExist")],
        ))
        .unwrap();

        let always = |_: &FeatureContext, _: &Parameters| true;
        let fm = FeatureManager::new(Arc::new(repo), FilterRegistry::new(), Arc::new(always));
        assert!(fm.is_enabled("FeatureD", &admin()));
    }

    #[test]
    fn test_later_filter_can_enable() {
        let fm = manager_with(vec![FeatureDefinition::new(
            "FeatureE",
            true,
            vec![
                FilterConfig::new(ROLE_BASED).with_param("role", "admin"),
                FilterConfig::new(ALWAYS_ON),
            ],
        )]);

        let guest = FeatureContext::new("user2", ["guest"], NONE);
        let result = fm.evaluate("FeatureE", &guest);
        assert!(result.enabled);
        assert_eq!(result.reason, EvaluationReason::FilterMatched(ALWAYS_ON.to_string()));
    }

    #[test]
    fn test_first_match_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let recorded = Arc::clone(&calls);

        let registry = FilterRegistry::builtin().register(
            "Recording",
            move |_: &FeatureContext, _: &Parameters| {
                recorded.fetch_add(1, Ordering::SeqCst);
                true
            },
        );

        let repo = InMemoryFeatureRepository::new();
        repo.add_feature(FeatureDefinition::new(
            "FeatureF",
            true,
            vec![FilterConfig::new(ALWAYS_ON), FilterConfig::new("Recording")],
        ))
        .unwrap();
        repo.add_feature(FeatureDefinition::new(
            "FeatureG",
            true,
            vec![FilterConfig::new("Recording"), FilterConfig::new(ALWAYS_ON)],
        ))
        .unwrap();

        let fm = FeatureManager::new(Arc::new(repo), registry, Arc::new(AlwaysOffFilter));

        assert!(fm.is_enabled("FeatureF", &admin()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(fm.is_enabled("FeatureG", &admin()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_malformed_parameter_only_fails_its_filter() {
        let fm = manager_with(vec![
            FeatureDefinition::new(
                "Recovers",
                true,
                vec![
                    FilterConfig::new(TARGETING).with_param("users", 42.0),
                    FilterConfig::new(ALWAYS_ON),
                ],
            ),
            FeatureDefinition::new(
                "StaysOff",
                true,
                vec![FilterConfig::new(ROLE_BASED).with_param("role", vec!["admin"])],
            ),
        ]);

        assert!(fm.is_enabled("Recovers", &admin()));
        assert_eq!(
            fm.evaluate("StaysOff", &admin()).reason,
            EvaluationReason::NoFilterMatched
        );
    }

    #[test]
    fn test_null_and_mixed_parameters_from_document() {
        let document = r#"
features:
  - name: OpenWindow
    filters:
      - name: TimeBased
        parameters:
          start: ~
          end:
  - name: MixedTargets
    filters:
      - name: Targeting
        parameters:
          users: [1001, alice]
      - name: AlwaysOn
"#;
        let defs = crate::repository::parse_document(document).unwrap();
        let fm = manager_with(defs.values().map(|def| FeatureDefinition::clone(def)).collect());

        assert_eq!(
            fm.evaluate("OpenWindow", &admin()).reason,
            EvaluationReason::FilterMatched("TimeBased".to_string())
        );
        assert_eq!(
            fm.evaluate("MixedTargets", &FeatureContext::new("alice", NONE, NONE)).reason,
            EvaluationReason::FilterMatched("AlwaysOn".to_string())
        );
    }

    #[test]
    fn test_get_all_features_matches_is_enabled() {
        let fm = manager_with(vec![
            FeatureDefinition::new("On", true, vec![FilterConfig::new(ALWAYS_ON)]),
            FeatureDefinition::new("Off", false, vec![FilterConfig::new(ALWAYS_ON)]),
            FeatureDefinition::new(
                "Admins",
                true,
                vec![FilterConfig::new(ROLE_BASED).with_param("role", "admin")],
            ),
            FeatureDefinition::new("NoFilters", true, vec![]),
        ]);

        for ctx in [admin(), FeatureContext::new("eve", ["guest"], NONE)] {
            let all = fm.get_all_features(&ctx);
            assert_eq!(all.len(), 4);
            for (name, enabled) in &all {
                assert_eq!(*enabled, fm.is_enabled(name, &ctx), "mismatch for {name}");
            }
        }

        let all = fm.get_all_features(&admin());
        assert!(all["On"]);
        assert!(!all["Off"]);
        assert!(all["Admins"]);
        assert!(!all["NoFilters"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_readers_never_see_partial_refresh() {
        let document: String = std::iter::once("features:\n".to_string())
            .chain((0..50).map(|i| format!("  - name: F{i}\n    filters:\n      - name: AlwaysOn\n")))
            .collect();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, document.as_bytes()).unwrap();

        let repo = Arc::new(FileFeatureRepository::open(file.path()).unwrap());
        let fm = Arc::new(FeatureManager::with_defaults(repo));

        let refresher = {
            let fm = Arc::clone(&fm);
            tokio::spawn(async move {
                for _ in 0..100 {
                    fm.refresh().await.unwrap();
                }
            })
        };

        let ctx = admin();
        while !refresher.is_finished() {
            let all = fm.get_all_features(&ctx);
            assert_eq!(all.len(), 50);
            assert!(all.values().all(|enabled| *enabled));
            assert!(fm.is_enabled("F49", &ctx));
            tokio::task::yield_now().await;
        }
        refresher.await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_delegates_to_repository() {
        let fm = manager_with(vec![FeatureDefinition::new("Kept", true, vec![])]);
        fm.refresh().await.unwrap();
        assert!(fm.repository().get_feature("Kept").is_some());
    }
}
