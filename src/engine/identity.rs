//! Owner identity resolution.
//!
//! Ownership is written inconsistently across documents (`propietarioId` on
//! one, `creadoPor` on another, a legacy uid on a third). The resolver is an
//! ordered list of [`Rule`]s, each pairing an [`Extractor`] that pulls a raw
//! value out of the field map with a [`Validator`] that decides whether that
//! value looks like an owner id. The first rule that yields a valid id wins.
//!
//! Resolved ids found in the alias map are replaced by their canonical id.
//! Documents that only name their owner by email are matched through an
//! [`EmailDirectory`], consulted after every uid rule.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::context::Context;
use crate::di::FromRef;
use crate::store::Fields;

/// A validated owner identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pulls a raw candidate value out of a field map.
pub trait Extractor: Send + Sync {
    /// Field name reported when this extractor wins.
    fn field(&self) -> &str;

    fn extract<'a>(&self, fields: &'a Fields) -> Option<&'a str>;
}

/// Decides whether a raw value is an owner id.
pub trait Validator: Send + Sync {
    fn validate(&self, raw: &str) -> Option<OwnerId>;
}

/// Reads a top-level field, only when it holds a string.
#[derive(Debug, Clone)]
pub struct StringField(String);

impl StringField {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Extractor for StringField {
    fn field(&self) -> &str {
        &self.0
    }

    fn extract<'a>(&self, fields: &'a Fields) -> Option<&'a str> {
        fields.get(&self.0).and_then(JsonValue::as_str)
    }
}

/// Auth-uid shape: after trimming, at least `min_len` ASCII alphanumerics
/// and nothing else.
#[derive(Debug, Clone, Copy)]
pub struct UidShape {
    min_len: usize,
}

impl UidShape {
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }

    pub fn matches(&self, raw: &str) -> bool {
        let value = raw.trim();
        value.len() >= self.min_len && value.chars().all(|c| c.is_ascii_alphanumeric())
    }
}

impl Validator for UidShape {
    fn validate(&self, raw: &str) -> Option<OwnerId> {
        self.matches(raw).then(|| OwnerId(raw.trim().to_string()))
    }
}

/// Known email address -> owner id. Lookups ignore case and surrounding
/// whitespace.
#[derive(Debug, Clone, Default)]
pub struct EmailDirectory(Arc<BTreeMap<String, OwnerId>>);

impl EmailDirectory {
    pub fn new(emails: &BTreeMap<String, String>) -> Self {
        Self(Arc::new(
            emails
                .iter()
                .map(|(email, owner)| (normalize_email(email), OwnerId(owner.trim().to_string())))
                .collect(),
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Validator for EmailDirectory {
    fn validate(&self, raw: &str) -> Option<OwnerId> {
        self.0.get(&normalize_email(raw)).cloned()
    }
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// One extractor + validator pair.
#[derive(Clone)]
pub struct Rule {
    extractor: Arc<dyn Extractor>,
    validator: Arc<dyn Validator>,
}

impl Rule {
    pub fn new(extractor: impl Extractor + 'static, validator: impl Validator + 'static) -> Self {
        Self {
            extractor: Arc::new(extractor),
            validator: Arc::new(validator),
        }
    }
}

/// The outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Canonical owner.
    pub owner: OwnerId,
    /// Field the owner was read from.
    pub field: String,
    /// The id as written in the document, when it was a legacy alias.
    pub aliased_from: Option<OwnerId>,
}

/// Ordered owner resolution strategy.
#[derive(Clone)]
pub struct OwnerResolver {
    rules: Vec<Rule>,
    aliases: Arc<BTreeMap<String, String>>,
}

impl OwnerResolver {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            aliases: Arc::new(BTreeMap::new()),
        }
    }

    /// One [`StringField`] + [`UidShape`] rule per candidate, in order.
    pub fn for_fields<S: AsRef<str>>(candidates: &[S], min_len: usize) -> Self {
        let shape = UidShape::new(min_len);
        Self::new(
            candidates
                .iter()
                .map(|name| Rule::new(StringField::new(name.as_ref()), shape))
                .collect(),
        )
    }

    /// Appends one email rule per field, after the existing rules. An empty
    /// directory adds nothing.
    pub fn with_emails<S: AsRef<str>>(mut self, fields: &[S], directory: EmailDirectory) -> Self {
        if directory.is_empty() {
            return self;
        }
        self.rules.extend(
            fields
                .iter()
                .map(|name| Rule::new(StringField::new(name.as_ref()), directory.clone())),
        );
        self
    }

    /// Legacy id -> canonical id.
    pub fn with_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.aliases = Arc::new(aliases);
        self
    }

    /// First rule yielding a valid id wins. `None` means the document has no
    /// recognisable owner.
    pub fn resolve(&self, fields: &Fields) -> Option<Resolution> {
        self.rules.iter().find_map(|rule| {
            let raw = rule.extractor.extract(fields)?;
            let owner = rule.validator.validate(raw)?;
            Some(self.canonicalize(owner, rule.extractor.field()))
        })
    }

    /// Replaces candidate owner fields holding the legacy id with the
    /// canonical one. Other fields are left alone.
    pub fn rewrite_aliased(&self, mut fields: Fields, resolution: &Resolution) -> Fields {
        let Some(legacy) = &resolution.aliased_from else {
            return fields;
        };

        for rule in &self.rules {
            let name = rule.extractor.field();
            let holds_legacy = fields
                .get(name)
                .and_then(JsonValue::as_str)
                .is_some_and(|v| v.trim() == legacy.as_str());
            if holds_legacy {
                fields.insert(
                    name.to_string(),
                    JsonValue::String(resolution.owner.to_string()),
                );
            }
        }
        fields
    }

    fn canonicalize(&self, owner: OwnerId, field: &str) -> Resolution {
        match self.aliases.get(owner.as_str()) {
            Some(canonical) => Resolution {
                owner: OwnerId(canonical.clone()),
                field: field.to_string(),
                aliased_from: Some(owner),
            },
            None => Resolution {
                owner,
                field: field.to_string(),
                aliased_from: None,
            },
        }
    }
}

impl FromRef<Context> for OwnerResolver {
    fn from_ref(ctx: &Context) -> Self {
        let run = &ctx.config.run;
        let owners = &ctx.config.owners;
        Self::for_fields(&run.candidate_owner_fields, run.min_owner_len)
            .with_emails(&run.candidate_email_fields, EmailDirectory::new(&owners.emails))
            .with_aliases(owners.aliases.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fields_from;
    use serde_json::json;

    const OWNER: &str = "AAAAAAAAAAAAAAAAAAAA";
    const OTHER: &str = "BBBBBBBBBBBBBBBBBBBB";

    fn resolver() -> OwnerResolver {
        OwnerResolver::for_fields(&["ownerRef", "creatorId", "uid"], 20)
    }

    #[test]
    fn test_first_valid_candidate_wins() {
        let fields = fields_from(json!({"creatorId": OTHER, "ownerRef": OWNER}));
        let resolution = resolver().resolve(&fields).unwrap();
        assert_eq!(resolution.owner.as_str(), OWNER);
        assert_eq!(resolution.field, "ownerRef");
    }

    #[test]
    fn test_invalid_candidate_falls_through() {
        let fields = fields_from(json!({"ownerRef": "short", "creatorId": OTHER}));
        let resolution = resolver().resolve(&fields).unwrap();
        assert_eq!(resolution.owner.as_str(), OTHER);
        assert_eq!(resolution.field, "creatorId");
    }

    #[test]
    fn test_value_is_trimmed() {
        let fields = fields_from(json!({"uid": format!("  {}\n", OWNER)}));
        assert_eq!(resolver().resolve(&fields).unwrap().owner.as_str(), OWNER);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        for value in [
            json!("AAAAAAAAAAAAAAAAAAA"),       // 19 chars
            json!("AAAAAAAAAA-AAAAAAAAAA"),     // punctuation
            json!("AAAAAAAAAAAAAAAAAAAÁ"),      // non-ascii
            json!(12345678901234567890u64),     // not a string
            json!(null),
        ] {
            let fields = fields_from(json!({ "ownerRef": value }));
            assert_eq!(resolver().resolve(&fields), None, "{:?}", fields);
        }
        assert_eq!(resolver().resolve(&Fields::new()), None);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let fields = fields_from(json!({"uid": OTHER, "creatorId": OWNER}));
        let r = resolver();
        let first = r.resolve(&fields);
        for _ in 0..10 {
            assert_eq!(r.resolve(&fields), first);
        }
        assert_eq!(first.unwrap().field, "creatorId");
    }

    #[test]
    fn test_alias_is_canonicalized_and_rewritten() {
        let aliases = BTreeMap::from([(OTHER.to_string(), OWNER.to_string())]);
        let r = resolver().with_aliases(aliases);

        let fields = fields_from(json!({"creatorId": OTHER, "uid": OTHER, "note": OTHER}));
        let resolution = r.resolve(&fields).unwrap();
        assert_eq!(resolution.owner.as_str(), OWNER);
        assert_eq!(resolution.aliased_from.as_ref().map(OwnerId::as_str), Some(OTHER));

        let rewritten = r.rewrite_aliased(fields, &resolution);
        assert_eq!(rewritten["creatorId"], json!(OWNER));
        assert_eq!(rewritten["uid"], json!(OWNER));
        // Only candidate owner fields are touched
        assert_eq!(rewritten["note"], json!(OTHER));
    }

    #[test]
    fn test_rewrite_without_alias_is_identity() {
        let fields = fields_from(json!({"ownerRef": OWNER}));
        let r = resolver();
        let resolution = r.resolve(&fields).unwrap();
        assert_eq!(r.rewrite_aliased(fields.clone(), &resolution), fields);
    }

    #[test]
    fn test_email_rules_run_after_uid_rules() {
        let emails = BTreeMap::from([("Ana@Example.com".to_string(), OTHER.to_string())]);
        let r = resolver().with_emails(&["email"], EmailDirectory::new(&emails));

        let by_email = fields_from(json!({"ownerRef": "short", "email": "  ana@example.COM"}));
        let resolution = r.resolve(&by_email).unwrap();
        assert_eq!(resolution.owner.as_str(), OTHER);
        assert_eq!(resolution.field, "email");

        let both = fields_from(json!({"email": "ana@example.com", "uid": OWNER}));
        assert_eq!(r.resolve(&both).unwrap().owner.as_str(), OWNER);

        let unknown = fields_from(json!({"email": "bob@example.com"}));
        assert_eq!(r.resolve(&unknown), None);
    }

    #[test]
    fn test_email_owner_is_canonicalized() {
        let emails = BTreeMap::from([("ana@example.com".to_string(), OTHER.to_string())]);
        let aliases = BTreeMap::from([(OTHER.to_string(), OWNER.to_string())]);
        let r = resolver()
            .with_emails(&["email"], EmailDirectory::new(&emails))
            .with_aliases(aliases);

        let resolution = r.resolve(&fields_from(json!({"email": "ana@example.com"}))).unwrap();
        assert_eq!(resolution.owner.as_str(), OWNER);
        assert_eq!(resolution.aliased_from.as_ref().map(OwnerId::as_str), Some(OTHER));
    }

    #[test]
    fn test_empty_directory_adds_no_rules() {
        let r = resolver().with_emails(&["email"], EmailDirectory::default());
        assert_eq!(r.rules.len(), 3);
    }

    #[test]
    fn test_custom_rules() {
        struct Nested;
        impl Extractor for Nested {
            fn field(&self) -> &str {
                "meta.owner"
            }
            fn extract<'a>(&self, fields: &'a Fields) -> Option<&'a str> {
                fields.get("meta")?.get("owner")?.as_str()
            }
        }

        let r = OwnerResolver::new(vec![Rule::new(Nested, UidShape::new(5))]);
        let fields = fields_from(json!({"meta": {"owner": "abcde"}}));
        assert_eq!(r.resolve(&fields).unwrap().field, "meta.owner");
    }
}
