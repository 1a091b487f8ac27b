//! Effective options: `_default` and per-model overrides cascaded down to single route flags.

use crate::config::{
    Action, Branch, ControllerOverride, MethodTable, OverrideRegistry, RouteOverlay, Setting,
};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Resolved leaf flag. Disabled routes are never registered.
#[derive(Clone, Debug, PartialEq)]
pub enum Flag {
    Off,
    On(RouteOverlay),
}

impl Flag {
    pub fn is_on(&self) -> bool {
        matches!(self, Flag::On(_))
    }

    pub fn overlay(&self) -> Option<&RouteOverlay> {
        match self {
            Flag::On(o) => Some(o),
            Flag::Off => None,
        }
    }
}

/// Start from the built-in `true` and apply each level, broadest first.
/// `false` switches the route off; `true` or an overlay switches it back on,
/// overlays from enabled levels merging on the way down.
pub fn cascade<'a>(levels: impl IntoIterator<Item = Option<&'a Setting>>) -> Flag {
    let mut flag = Flag::On(RouteOverlay::default());
    for setting in levels.into_iter().flatten() {
        flag = match (setting, flag) {
            (Setting::Disabled, _) => Flag::Off,
            (Setting::Enabled, Flag::On(o)) => Flag::On(o),
            (Setting::Enabled, Flag::Off) => Flag::On(RouteOverlay::default()),
            (Setting::Configured(over), Flag::On(o)) => Flag::On(o.merged(over)),
            (Setting::Configured(over), Flag::Off) => Flag::On(over.clone()),
        };
    }
    flag
}

#[derive(Clone, Debug, PartialEq)]
pub struct EffectiveAssociationOptions {
    pub enabled: bool,
    pub methods: IndexMap<Action, Flag>,
}

impl EffectiveAssociationOptions {
    pub fn method(&self, action: Action) -> Flag {
        if !self.enabled {
            return Flag::Off;
        }
        self.methods.get(&action).cloned().unwrap_or(Flag::Off)
    }
}

/// Fully resolved options tree for one model.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectiveOptions {
    pub model: String,
    /// Top-level `'*'`; `false` hides the model entirely.
    pub enabled: bool,
    pub crud: IndexMap<Action, Flag>,
    pub associations_enabled: bool,
    merged: ControllerOverride,
}

impl EffectiveOptions {
    pub fn from_override(model: &str, merged: ControllerOverride) -> Self {
        let enabled = merged.all.as_ref().map(Branch::is_enabled).unwrap_or(true);
        let wildcard = merged.all.as_ref().and_then(Branch::nested);
        let crud = Action::CRUD
            .into_iter()
            .map(|action| {
                let flag = cascade([wildcard.and_then(|w| w.get(action)), merged.methods.get(&action)]);
                (action, flag)
            })
            .collect();
        let associations_enabled = merged.associations.as_ref().map(Branch::is_enabled).unwrap_or(true);
        EffectiveOptions {
            model: model.to_string(),
            enabled,
            crud,
            associations_enabled,
            merged,
        }
    }

    pub fn crud(&self, action: Action) -> Flag {
        if !self.enabled {
            return Flag::Off;
        }
        self.crud.get(&action).cloned().unwrap_or(Flag::Off)
    }

    /// Whether the association named `name` gets any routes.
    pub fn association_enabled(&self, name: &str) -> bool {
        if !self.enabled || !self.associations_enabled {
            return false;
        }
        let Some(assoc) = self.merged.associations.as_ref().and_then(Branch::nested) else {
            return true;
        };
        match assoc.by_name.get(name) {
            Some(branch) => branch.is_enabled(),
            None => assoc.all.as_ref().map(Branch::is_enabled).unwrap_or(true),
        }
    }

    /// Per-method flags of one association, for the given route methods.
    pub fn association(&self, name: &str, actions: &[Action]) -> EffectiveAssociationOptions {
        let enabled = self.association_enabled(name);
        let wildcard = self.merged.all.as_ref().and_then(Branch::nested);
        let assoc = self.merged.associations.as_ref().and_then(Branch::nested);
        let any: Option<&MethodTable> = assoc.and_then(|a| a.all.as_ref()).and_then(Branch::nested);
        let named: Option<&MethodTable> = assoc.and_then(|a| a.by_name.get(name)).and_then(Branch::nested);

        let methods = actions
            .iter()
            .map(|&action| {
                let flag = cascade([
                    wildcard.and_then(|w| w.get(action)),
                    any.and_then(|t| t.all.as_ref()),
                    any.and_then(|t| t.get(action)),
                    named.and_then(|t| t.all.as_ref()),
                    named.and_then(|t| t.get(action)),
                ]);
                (action, flag)
            })
            .collect();
        EffectiveAssociationOptions { enabled, methods }
    }
}

/// Resolves and caches [`EffectiveOptions`] per model name.
#[derive(Debug, Default)]
pub struct OptionResolver {
    registry: OverrideRegistry,
    cache: RwLock<HashMap<String, Arc<EffectiveOptions>>>,
}

impl OptionResolver {
    pub fn new(registry: OverrideRegistry) -> Self {
        OptionResolver {
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &OverrideRegistry {
        &self.registry
    }

    /// `_default` merged with the model's own override, then cascaded.
    pub fn resolve(&self, model: &str) -> Arc<EffectiveOptions> {
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(model)
        {
            return Arc::clone(hit);
        }

        let base = self.registry.default_override().cloned().unwrap_or_default();
        let merged = match self.registry.get(model) {
            Some(over) => base.merge(over),
            None => base,
        };
        let resolved = Arc::new(EffectiveOptions::from_override(model, merged));
        tracing::debug!(model = %model, enabled = resolved.enabled, "resolved controller options");

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(cache.entry(model.to_string()).or_insert(resolved))
    }

    /// Replace all overrides (full reload) and drop cached resolutions.
    pub fn reset(&mut self, registry: OverrideRegistry) {
        self.registry = registry;
        self.cache.get_mut().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn over(v: serde_json::Value) -> ControllerOverride {
        ControllerOverride::from_value(&v).unwrap()
    }

    fn resolver(default: Option<serde_json::Value>, models: &[(&str, serde_json::Value)]) -> OptionResolver {
        let mut registry = OverrideRegistry::default();
        if let Some(d) = default {
            registry.insert(OverrideRegistry::DEFAULT_KEY, over(d));
        }
        for (name, v) in models {
            registry.insert(name, over(v.clone()));
        }
        OptionResolver::new(registry)
    }

    #[test]
    fn everything_enabled_without_overrides() {
        let r = resolver(None, &[]);
        let opts = r.resolve("product");
        assert!(opts.enabled);
        assert!(Action::CRUD.iter().all(|a| opts.crud(*a).is_on()));
        let tags = opts.association("tags", &Action::ONE_TO_MANY);
        assert!(Action::ONE_TO_MANY.iter().all(|a| tags.method(*a).is_on()));
    }

    #[test]
    fn wildcard_false_disables_model() {
        let r = resolver(None, &[("productCategory", json!({ "*": false }))]);
        let opts = r.resolve("productCategory");
        assert!(!opts.enabled);
        assert!(!opts.crud(Action::Index).is_on());
        assert!(!opts.association_enabled("products"));
        assert!(r.resolve("product").enabled);
    }

    #[test]
    fn global_wildcard_method_default_reaches_every_leaf() {
        let r = resolver(Some(json!({ "*": { "destroy": false } })), &[]);
        for model in ["product", "tag"] {
            let opts = r.resolve(model);
            assert!(!opts.crud(Action::Destroy).is_on());
            assert!(opts.crud(Action::Update).is_on());
            let assoc = opts.association("anything", &Action::ONE_TO_MANY);
            assert!(!assoc.method(Action::Destroy).is_on());
            assert!(assoc.method(Action::DestroyMany).is_on());
        }
    }

    #[test]
    fn explicit_association_value_re_enables() {
        let r = resolver(
            Some(json!({ "*": { "destroy": false } })),
            &[("product", json!({ "associations": { "tags": { "destroy": true } } }))],
        );
        let opts = r.resolve("product");
        assert!(opts.association("tags", &Action::ONE_TO_MANY).method(Action::Destroy).is_on());
        assert!(!opts.association("productCategory", &Action::ONE_TO_ONE).method(Action::Destroy).is_on());
    }

    #[test]
    fn model_override_merges_over_default() {
        let r = resolver(
            Some(json!({ "update": false, "count": false })),
            &[("product", json!({ "count": true }))],
        );
        let opts = r.resolve("product");
        assert!(!opts.crud(Action::Update).is_on());
        assert!(opts.crud(Action::Count).is_on());
    }

    #[test]
    fn association_level_cascade() {
        let r = resolver(
            None,
            &[(
                "productCategory",
                json!({ "associations": {
                    "*": { "*": false, "index": true },
                    "tags": { "*": true, "count": false },
                    "products": { "destroy": { "config": { "description": "remove one" } } }
                } }),
            )],
        );
        let opts = r.resolve("productCategory");

        // associations['*']['*'] off, associations['*'][index] on
        let products = opts.association("products", &Action::ONE_TO_MANY);
        assert!(products.method(Action::Index).is_on());
        assert!(!products.method(Action::Create).is_on());
        let destroy = products.method(Action::Destroy);
        assert_eq!(
            destroy.overlay().and_then(|o| o.config.description.as_deref()),
            Some("remove one")
        );

        // associations[name]['*'] beats associations['*'], associations[name][method] beats both
        let tags = opts.association("tags", &Action::ONE_TO_MANY);
        assert!(tags.method(Action::Create).is_on());
        assert!(!tags.method(Action::Count).is_on());
    }

    #[test]
    fn association_switches() {
        let r = resolver(
            None,
            &[
                ("productCategory", json!({ "associations": { "tags": false } })),
                ("tag", json!({ "associations": false })),
                ("product", json!({ "associations": { "*": false, "tags": {} } })),
            ],
        );
        let cat = r.resolve("productCategory");
        assert!(!cat.association_enabled("tags"));
        assert!(cat.association_enabled("products"));
        assert!(!cat.association("tags", &Action::ONE_TO_MANY).method(Action::Index).is_on());

        assert!(!r.resolve("tag").association_enabled("products"));

        let product = r.resolve("product");
        assert!(product.association_enabled("tags"));
        assert!(!product.association_enabled("productCategory"));
    }

    #[test]
    fn resolution_is_cached_until_reset() {
        let mut r = resolver(None, &[]);
        let first = r.resolve("product");
        let second = r.resolve("product");
        assert!(Arc::ptr_eq(&first, &second));

        let mut registry = OverrideRegistry::default();
        registry.insert("product", over(json!({ "*": false })));
        r.reset(registry);
        let third = r.resolve("product");
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(!third.enabled);
    }

    #[test]
    fn cascade_merges_overlays_of_enabled_levels() {
        let broad = Setting::Configured(serde_json::from_value(json!({ "config": { "auth": "token" } })).unwrap());
        let narrow = Setting::Configured(serde_json::from_value(json!({ "handler": "custom" })).unwrap());
        let flag = cascade([Some(&broad), None, Some(&narrow)]);
        let overlay = flag.overlay().unwrap();
        assert_eq!(overlay.handler.as_deref(), Some("custom"));
        assert!(overlay.config.auth.is_some());

        assert_eq!(cascade([Some(&broad), Some(&Setting::Disabled)]), Flag::Off);
        assert!(cascade([Some(&Setting::Disabled), Some(&Setting::Enabled)]).is_on());
    }
}
