//! Entry point used by the test-execution engine.
//!
//! The resolver only does identity bookkeeping. Creating the external session
//! happens in the caller between [`SessionResolver::resolve_or_prepare`] and
//! [`SessionResolver::record_new_session`], without any lock held, so two
//! workers can both miss and both record. The second write wins and the first
//! external session is orphaned; that is logged, not prevented. Callers that
//! need first-writer-wins use [`SessionResolver::record_new_session_if_absent`].

use tracing::{debug, warn};

use crate::context::{ValidationContext, ValidatorSessionRecord};
use crate::error::Result;
use crate::store::{InsertOutcome, SessionStore, UpsertOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// An equivalent context already has a session; reuse it.
    Found(String),
    /// No cached session. Create one, then call `record_new_session`.
    NotFound,
}

#[derive(Debug, Clone)]
pub struct SessionResolver {
    store: SessionStore,
}

impl SessionResolver {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Looks up a reusable session for `ctx`.
    ///
    /// Storage failures are returned as errors, never as `NotFound`.
    pub fn resolve_or_prepare(&self, ctx: &ValidationContext) -> Result<ResolveOutcome> {
        match self.store.lookup(ctx)? {
            Some(validator_session_id) => {
                debug!(
                    test_suite_id = %ctx.test_suite_id,
                    validator_name = %ctx.validator_name,
                    validator_session_id = %validator_session_id,
                    "Validator session cache hit"
                );
                Ok(ResolveOutcome::Found(validator_session_id))
            }
            None => {
                debug!(
                    test_suite_id = %ctx.test_suite_id,
                    validator_name = %ctx.validator_name,
                    "Validator session cache miss"
                );
                Ok(ResolveOutcome::NotFound)
            }
        }
    }

    /// Records the session the caller just created for `ctx` (last write wins).
    pub fn record_new_session(
        &self,
        ctx: &ValidationContext,
        validator_session_id: &str,
    ) -> Result<()> {
        let record = ValidatorSessionRecord::new(ctx.clone(), validator_session_id);
        if let UpsertOutcome::Replaced { previous } = self.store.upsert(&record)? {
            warn!(
                test_suite_id = %ctx.test_suite_id,
                validator_name = %ctx.validator_name,
                previous_session_id = %previous,
                validator_session_id = %validator_session_id,
                "Replaced cached validator session; previous external session is no longer tracked"
            );
        }
        Ok(())
    }

    /// Records `validator_session_id` unless `ctx` already has a session.
    ///
    /// On `Existing`, the caller should use the returned id and dispose of the
    /// session it created.
    pub fn record_new_session_if_absent(
        &self,
        ctx: &ValidationContext,
        validator_session_id: &str,
    ) -> Result<InsertOutcome> {
        let record = ValidatorSessionRecord::new(ctx.clone(), validator_session_id);
        let outcome = self.store.insert_if_absent(&record)?;
        if let InsertOutcome::Existing(existing) = &outcome {
            debug!(
                test_suite_id = %ctx.test_suite_id,
                validator_name = %ctx.validator_name,
                existing_session_id = %existing,
                offered_session_id = %validator_session_id,
                "Kept existing validator session"
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;

    fn resolver() -> (tempfile::TempDir, SessionResolver) {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = SessionStore::new(temp_dir.path().join("sessions.db")).expect("store init");
        (temp_dir, SessionResolver::new(store))
    }

    fn ctx(options: &[(&str, &str)]) -> ValidationContext {
        ValidationContext::new("basic_suite", "basic_name", options.iter().copied().collect())
    }

    #[test]
    fn miss_then_record_then_hit() {
        let (_dir, resolver) = resolver();
        let context = ctx(&[("ig_version", "1")]);

        assert_eq!(
            resolver.resolve_or_prepare(&context).expect("resolve"),
            ResolveOutcome::NotFound
        );
        resolver.record_new_session(&context, "V1").expect("record");
        assert_eq!(
            resolver.resolve_or_prepare(&context).expect("resolve"),
            ResolveOutcome::Found("V1".to_string())
        );
    }

    #[test]
    fn racing_records_keep_last_writer() {
        let (_dir, resolver) = resolver();
        let context = ctx(&[("ig_version", "1")]);

        // Both workers missed before either recorded.
        assert_eq!(
            resolver.resolve_or_prepare(&context).expect("resolve"),
            ResolveOutcome::NotFound
        );
        resolver.record_new_session(&context, "worker-a").expect("record a");
        resolver.record_new_session(&context, "worker-b").expect("record b");

        assert_eq!(
            resolver.resolve_or_prepare(&context).expect("resolve"),
            ResolveOutcome::Found("worker-b".to_string())
        );
        assert_eq!(resolver.store().count().expect("count"), 1);
    }

    #[test]
    fn conditional_record_keeps_first_writer() {
        let (_dir, resolver) = resolver();
        let context = ctx(&[]);

        let first = resolver
            .record_new_session_if_absent(&context, "worker-a")
            .expect("record a");
        let second = resolver
            .record_new_session_if_absent(&context, "worker-b")
            .expect("record b");

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::Existing("worker-a".to_string()));
        assert_eq!(
            resolver.resolve_or_prepare(&context).expect("resolve"),
            ResolveOutcome::Found("worker-a".to_string())
        );
    }

    #[test]
    fn invalid_context_is_an_error_not_a_miss() {
        let (_dir, resolver) = resolver();
        let context = ValidationContext::new("basic_suite", "", Default::default());
        let err = resolver.resolve_or_prepare(&context).unwrap_err();
        assert!(matches!(err, CacheError::InvalidContext { field: "validator_name" }));
    }
}
