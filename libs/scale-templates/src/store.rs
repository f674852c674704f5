use chrono::Utc;
use dashmap::DashMap;
use scale_errors::TemplateStoreError;
use scale_model::Template;
use tracing::{debug, warn};

const BUILTINS_JSON: &str = include_str!("../resources/builtins.json");

/// Concurrent, process-wide registry of templates.
///
/// Built-in templates are seeded lazily on first construction from an
/// embedded JSON resource; they cannot be deleted, only deactivated by
/// clearing `is_active` through a `save` call.
pub struct TemplateStore {
    templates: DashMap<String, Template>,
}

impl TemplateStore {
    /// Creates a store pre-populated with the built-in manufacturer
    /// templates.
    pub fn new() -> Self {
        let store = Self {
            templates: DashMap::new(),
        };
        store.seed_builtins();
        store
    }

    /// Creates an empty store with no built-ins, useful for tests that
    /// want full control over the template set.
    pub fn empty() -> Self {
        Self {
            templates: DashMap::new(),
        }
    }

    fn seed_builtins(&self) {
        let builtins: Vec<Template> = serde_json::from_str(BUILTINS_JSON)
            .expect("embedded builtins.json must deserialize into Template");
        for template in builtins {
            debug!(name = %template.template_name, "seeding builtin template");
            self.templates.insert(template.template_name.clone(), template);
        }
    }

    /// All active templates, ordered by descending effective priority.
    pub fn list(&self) -> Vec<Template> {
        let mut all: Vec<Template> = self
            .templates
            .iter()
            .filter(|e| e.value().is_active)
            .map(|e| e.value().clone())
            .collect();
        all.sort_by(|a, b| {
            b.effective_priority()
                .partial_cmp(&a.effective_priority())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        all
    }

    /// All templates regardless of `is_active`, in insertion-agnostic order.
    pub fn list_all(&self) -> Vec<Template> {
        self.templates.iter().map(|e| e.value().clone()).collect()
    }

    pub fn get(&self, name: &str) -> Result<Template, TemplateStoreError> {
        self.templates
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| TemplateStoreError::NotFound(name.to_string()))
    }

    /// Inserts a new, non-builtin template. Fails if a template with the
    /// same name already exists.
    pub fn save(&self, mut template: Template) -> Result<(), TemplateStoreError> {
        template
            .validate()
            .map_err(TemplateStoreError::ValidationError)?;
        if self.templates.contains_key(&template.template_name) {
            return Err(TemplateStoreError::DuplicateName(
                template.template_name.clone(),
            ));
        }
        let now = Utc::now();
        template.created_at = now;
        template.modified_at = now;
        template.is_builtin = false;
        self.templates
            .insert(template.template_name.clone(), template);
        Ok(())
    }

    /// Replaces an existing non-builtin template's mutable fields.
    pub fn update(&self, template: Template) -> Result<(), TemplateStoreError> {
        template
            .validate()
            .map_err(TemplateStoreError::ValidationError)?;
        let mut entry = self
            .templates
            .get_mut(&template.template_name)
            .ok_or_else(|| TemplateStoreError::NotFound(template.template_name.clone()))?;
        if entry.is_builtin {
            return Err(TemplateStoreError::BuiltinImmutable(
                template.template_name.clone(),
            ));
        }
        let mut template = template;
        template.modified_at = Utc::now();
        template.is_builtin = false;
        *entry.value_mut() = template;
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<(), TemplateStoreError> {
        let is_builtin = self
            .templates
            .get(name)
            .ok_or_else(|| TemplateStoreError::NotFound(name.to_string()))?
            .is_builtin;
        if is_builtin {
            warn!(name, "refused to delete builtin template");
            return Err(TemplateStoreError::BuiltinImmutable(name.to_string()));
        }
        self.templates.remove(name);
        Ok(())
    }

    /// Records a successful or failed use, updating `usage_count`,
    /// `last_used_at`, and an exponentially-smoothed `success_rate`
    /// (alpha = 0.1).
    pub fn bump_usage(&self, name: &str, success: bool) -> Result<(), TemplateStoreError> {
        let mut entry = self
            .templates
            .get_mut(name)
            .ok_or_else(|| TemplateStoreError::NotFound(name.to_string()))?;
        entry.usage_count += 1;
        entry.last_used_at = Some(Utc::now());
        const ALPHA: f64 = 0.1;
        let observed = if success { 1.0 } else { 0.0 };
        entry.success_rate = entry.success_rate + ALPHA * (observed - entry.success_rate);
        Ok(())
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scale_model::{
        CommandSet, ErrorHandling, FramingConfig, LinkLayerConfig, ValidationRules,
    };
    use std::collections::HashMap;

    fn custom_template(name: &str) -> Template {
        Template {
            template_name: name.to_string(),
            display_name: name.to_string(),
            manufacturer: "Acme".to_string(),
            model: None,
            version: "1.0".to_string(),
            author: None,
            communication: LinkLayerConfig::default(),
            commands: CommandSet::default(),
            framing: FramingConfig::default(),
            fields: vec![],
            response_patterns: scale_model::ResponsePatterns::default(),
            validation: ValidationRules::default(),
            error_handling: ErrorHandling::default(),
            priority: 50,
            confidence_threshold: 85.0,
            timeout_ms: 2000,
            max_retries: 3,
            supported_baud_rates: vec![9600],
            environmental_optimization: None,
            tags: HashMap::new(),
            is_active: true,
            is_builtin: false,
            created_at: Utc::now(),
            modified_at: Utc::now(),
            last_used_at: None,
            usage_count: 0,
            success_rate: 0.0,
        }
    }

    #[test]
    fn builtins_are_seeded_and_immutable() {
        let store = TemplateStore::new();
        let all = store.list();
        assert!(all.iter().any(|t| t.template_name == "mettler_toledo_sics"));
        assert!(
            store.delete("mettler_toledo_sics").is_err(),
            "builtin deletion must be rejected"
        );
    }

    #[test]
    fn save_rejects_duplicate_names() {
        let store = TemplateStore::empty();
        store.save(custom_template("dup")).unwrap();
        assert!(store.save(custom_template("dup")).is_err());
    }

    #[test]
    fn list_orders_by_effective_priority_descending() {
        let store = TemplateStore::empty();
        let mut low = custom_template("low");
        low.priority = 10;
        let mut high = custom_template("high");
        high.priority = 90;
        store.save(low).unwrap();
        store.save(high).unwrap();
        let names: Vec<_> = store.list().into_iter().map(|t| t.template_name).collect();
        assert_eq!(names, vec!["high", "low"]);
    }

    #[test]
    fn bump_usage_tracks_count_and_smooths_success_rate() {
        let store = TemplateStore::empty();
        store.save(custom_template("t")).unwrap();
        store.bump_usage("t", true).unwrap();
        let t = store.get("t").unwrap();
        assert_eq!(t.usage_count, 1);
        assert!(t.success_rate > 0.0);
        assert!(t.last_used_at.is_some());
    }

    #[test]
    fn delete_of_unknown_template_fails() {
        let store = TemplateStore::empty();
        assert!(store.delete("nope").is_err());
    }
}
