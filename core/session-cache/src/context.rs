//! Validation contexts and the records persisted for them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::key::{canonicalize, CanonicalKey};

/// Named configuration choices of a test suite (e.g. `ig_version = "2"`).
///
/// Entries are kept sorted by key, so two sets built from the same pairs in a
/// different order compare, hash and serialize identically. Keys are unique;
/// collecting pairs that repeat a key keeps the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuiteOptionSet(BTreeMap<String, String>);

impl SuiteOptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, returning the value it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// JSON object form used for the `suite_options` column.
    pub(crate) fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }

    pub(crate) fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw).map(SuiteOptionSet)
    }
}

impl<K, V> FromIterator<(K, V)> for SuiteOptionSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        SuiteOptionSet(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Identifies which validator session a validation run needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationContext {
    pub test_suite_id: String,
    pub validator_name: String,
    #[serde(default)]
    pub suite_options: SuiteOptionSet,
}

impl ValidationContext {
    pub fn new(
        test_suite_id: impl Into<String>,
        validator_name: impl Into<String>,
        suite_options: SuiteOptionSet,
    ) -> Self {
        Self {
            test_suite_id: test_suite_id.into(),
            validator_name: validator_name.into(),
            suite_options,
        }
    }

    /// Shorthand for [`canonicalize`].
    pub fn canonical_key(&self) -> Result<CanonicalKey> {
        canonicalize(self)
    }
}

/// The unit persisted by the session store: a context plus the opaque id of
/// the external session provisioned for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSessionRecord {
    pub validator_session_id: String,
    #[serde(flatten)]
    pub context: ValidationContext,
}

impl ValidatorSessionRecord {
    pub fn new(context: ValidationContext, validator_session_id: impl Into<String>) -> Self {
        Self {
            validator_session_id: validator_session_id.into(),
            context,
        }
    }
}
