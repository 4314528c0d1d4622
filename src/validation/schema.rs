//! Rule references, the named-rule registry and form schemas.

use std::collections::HashMap;
use std::fmt;

use super::rules::{self, RuleFn};
use super::ValidationError;

pub const REQUIRED: &str = "required";

/// A rule as written in a schema: a registry name or an inline check.
#[derive(Clone)]
pub enum Rule {
    Named(String),
    Inline(RuleFn),
}

impl Rule {
    pub fn named(name: impl Into<String>) -> Self {
        Rule::Named(name.into())
    }

    pub fn inline(check: RuleFn) -> Self {
        Rule::Inline(check)
    }
}

impl From<&str> for Rule {
    fn from(name: &str) -> Self {
        Rule::Named(name.to_string())
    }
}

impl From<RuleFn> for Rule {
    fn from(check: RuleFn) -> Self {
        Rule::Inline(check)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Rule::Inline(_) => f.write_str("Inline(..)"),
        }
    }
}

/// A rule bound to its check. `name` is kept for named rules so the
/// `required` rule can be told apart.
#[derive(Clone)]
pub struct ResolvedRule {
    pub name: Option<String>,
    pub check: RuleFn,
}

impl ResolvedRule {
    pub fn is_required(&self) -> bool {
        self.name.as_deref() == Some(REQUIRED)
    }
}

impl fmt::Debug for ResolvedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// RULE REGISTRY
// =============================================================================

#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: HashMap<String, RuleFn>,
}

impl RuleRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The parameterless rules of the library, by name.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.insert(REQUIRED, rules::required());
        registry.insert("email", rules::email());
        registry.insert("number", rules::number());
        registry.insert("password", rules::password());
        registry.insert("url", rules::url());
        registry.insert("phone", rules::phone());
        registry
    }

    /// Last writer wins.
    pub fn insert(&mut self, name: impl Into<String>, check: RuleFn) {
        self.rules.insert(name.into(), check);
    }

    pub fn get(&self, name: &str) -> Option<RuleFn> {
        self.rules.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn resolve(&self, rule: &Rule) -> Result<ResolvedRule, ValidationError> {
        match rule {
            Rule::Named(name) => self
                .get(name)
                .map(|check| ResolvedRule {
                    name: Some(name.clone()),
                    check,
                })
                .ok_or_else(|| ValidationError::UnknownRule(name.clone())),
            Rule::Inline(check) => Ok(ResolvedRule {
                name: None,
                check: check.clone(),
            }),
        }
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.rules.keys().collect();
        names.sort();
        f.debug_struct("RuleRegistry").field("rules", &names).finish()
    }
}

// =============================================================================
// SCHEMAS
// =============================================================================

/// Ordered field → rules mapping with every rule already resolved.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, Vec<ResolvedRule>)>,
}

impl Schema {
    /// Resolve named rules now; later registry changes do not affect the schema.
    pub fn resolve<F, S, R>(registry: &RuleRegistry, fields: F) -> Result<Self, ValidationError>
    where
        F: IntoIterator<Item = (S, R)>,
        S: Into<String>,
        R: IntoIterator<Item = Rule>,
    {
        let mut schema = Schema::default();
        for (field, field_rules) in fields {
            let resolved = field_rules
                .into_iter()
                .map(|rule| registry.resolve(&rule))
                .collect::<Result<Vec<_>, _>>()?;
            schema.fields.push((field.into(), resolved));
        }
        Ok(schema)
    }

    pub fn field(mut self, name: impl Into<String>, field_rules: Vec<ResolvedRule>) -> Self {
        self.fields.push((name.into(), field_rules));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[ResolvedRule])> {
        self.fields.iter().map(|(name, r)| (name.as_str(), r.as_slice()))
    }

    pub fn rules_for(&self, field: &str) -> Option<&[ResolvedRule]> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, r)| r.as_slice())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Schema>,
}

impl SchemaRegistry {
    /// `login`, `register`, `campaign`, `reward` and `profile`.
    pub fn builtin(registry: &RuleRegistry) -> Result<Self, ValidationError> {
        let named = |name: &str| Rule::named(name);
        let inline = Rule::Inline;

        let mut schemas = Self::default();
        schemas.insert(
            "login",
            Schema::resolve(
                registry,
                [
                    ("email", vec![named(REQUIRED), named("email")]),
                    ("password", vec![named(REQUIRED), inline(rules::min_length(6))]),
                ],
            )?,
        );
        schemas.insert(
            "register",
            Schema::resolve(
                registry,
                [
                    ("email", vec![named(REQUIRED), named("email")]),
                    ("password", vec![named(REQUIRED), named("password")]),
                    ("confirm_password", vec![named(REQUIRED)]),
                    ("neighborhood", vec![named(REQUIRED)]),
                ],
            )?,
        );
        schemas.insert(
            "campaign",
            Schema::resolve(
                registry,
                [
                    (
                        "title",
                        vec![
                            named(REQUIRED),
                            inline(rules::min_length(3)),
                            inline(rules::max_length(100)),
                        ],
                    ),
                    (
                        "description",
                        vec![
                            named(REQUIRED),
                            inline(rules::min_length(10)),
                            inline(rules::max_length(1000)),
                        ],
                    ),
                    ("neighborhood", vec![named(REQUIRED)]),
                ],
            )?,
        );
        schemas.insert(
            "reward",
            Schema::resolve(
                registry,
                [
                    (
                        "title",
                        vec![
                            named(REQUIRED),
                            inline(rules::min_length(3)),
                            inline(rules::max_length(100)),
                        ],
                    ),
                    (
                        "cost",
                        vec![
                            named(REQUIRED),
                            named("number"),
                            inline(rules::min(1.0)),
                            inline(rules::max(10000.0)),
                        ],
                    ),
                    ("category", vec![named(REQUIRED)]),
                ],
            )?,
        );
        schemas.insert(
            "profile",
            Schema::resolve(
                registry,
                [
                    (
                        "username",
                        vec![
                            named(REQUIRED),
                            inline(rules::min_length(3)),
                            inline(rules::max_length(50)),
                        ],
                    ),
                    ("email", vec![named(REQUIRED), named("email")]),
                ],
            )?,
        );
        Ok(schemas)
    }

    pub fn insert(&mut self, name: impl Into<String>, schema: Schema) {
        self.schemas.insert(name.into(), schema);
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_schemas_resolve() {
        let rules = RuleRegistry::builtin();
        let schemas = SchemaRegistry::builtin(&rules).unwrap();
        assert_eq!(
            schemas.names(),
            vec!["campaign", "login", "profile", "register", "reward"]
        );
        let reward = schemas.get("reward").unwrap();
        assert_eq!(reward.rules_for("cost").unwrap().len(), 4);
        assert!(reward.rules_for("cost").unwrap()[0].is_required());
        assert!(!reward.rules_for("cost").unwrap()[2].is_required());
    }

    #[test]
    fn unknown_named_rule_fails_resolution() {
        let rules = RuleRegistry::builtin();
        let err = Schema::resolve(&rules, [("x", vec![Rule::named("bulgarian_phone")])]).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownRule(name) if name == "bulgarian_phone"));
    }

    #[test]
    fn field_order_is_kept() {
        let rules = RuleRegistry::builtin();
        let schema = Schema::resolve(
            &rules,
            [
                ("b", vec![Rule::from("required")]),
                ("a", vec![Rule::from("email")]),
            ],
        )
        .unwrap();
        let names: Vec<_> = schema.fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
