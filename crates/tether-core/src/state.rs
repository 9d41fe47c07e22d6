//! State reconciliation
//!
//! Pure functions for keeping a local copy of a server-held document in
//! step: wholesale replacement, or version-gated incremental patches.
//!
//! The version gate is the whole correctness story for out-of-order
//! delivery: a patch is only applied when it carries exactly the next
//! version (or 0, the forced-resync signal). Anything else is dropped and
//! the caller keeps its current snapshot until a corrective message
//! arrives. Patches are never applied partially - a failing operation
//! leaves the document untouched.

use json_patch::Patch;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A versioned snapshot of the synchronized document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateData {
    /// The tracked document
    pub state: Value,
    /// Version of this snapshot
    pub version: u64,
}

/// An incremental update targeting one specific version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatePatch {
    /// Version the document carries after this patch applies
    pub version: u64,
    /// JSON Patch operations, applied in order
    pub operations: Patch,
}

/// Outcome of applying a patch
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOutcome {
    /// Patch accepted; the new snapshot
    Applied(StateData),
    /// Patch dropped; the current snapshot remains in effect
    Rejected(RejectReason),
}

/// Why a patch was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Patch version is neither `current + 1` nor 0
    StaleVersion { patch: u64, current: u64 },
    /// An operation failed (including a failed `test`); nothing was applied
    FailedOperation(String),
}

/// Replace the tracked document wholesale.
///
/// Used for the initial sync and for forced resyncs; no version check.
pub fn apply_full_state(state: Value, version: u64) -> StateData {
    StateData { state, version }
}

/// Apply a version-gated patch against the current snapshot.
///
/// Valid iff `patch.version == current.version + 1` or `patch.version == 0`
/// (forced resync). The operations run against a copy of the document, so
/// existing holders of `current` stay valid either way.
pub fn apply_patch(current: &StateData, patch: &StatePatch) -> PatchOutcome {
    if !version_allowed(patch.version, current.version) {
        return PatchOutcome::Rejected(RejectReason::StaleVersion {
            patch: patch.version,
            current: current.version,
        });
    }

    let mut doc = current.state.clone();
    match json_patch::patch(&mut doc, &patch.operations) {
        Ok(()) => PatchOutcome::Applied(StateData {
            state: doc,
            version: patch.version,
        }),
        Err(err) => PatchOutcome::Rejected(RejectReason::FailedOperation(err.to_string())),
    }
}

/// A version is acceptable if it is the next one or a reset (0).
fn version_allowed(patch: u64, current: u64) -> bool {
    patch == current + 1 || patch == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ops(value: Value) -> Patch {
        serde_json::from_value(value).unwrap()
    }

    fn snapshot(state: Value, version: u64) -> StateData {
        StateData { state, version }
    }

    #[test]
    fn test_sequential_patch_applies() {
        let current = snapshot(json!({"count": 1}), 3);
        let patch = StatePatch {
            version: 4,
            operations: ops(json!([{"op": "replace", "path": "/count", "value": 2}])),
        };

        match apply_patch(&current, &patch) {
            PatchOutcome::Applied(next) => {
                assert_eq!(next.version, 4);
                assert_eq!(next.state, json!({"count": 2}));
            }
            PatchOutcome::Rejected(reason) => panic!("unexpected rejection: {:?}", reason),
        }
    }

    #[test]
    fn test_stale_patch_rejected_and_state_unchanged() {
        let current = snapshot(json!({"count": 6}), 2);
        let patch = StatePatch {
            version: 2,
            operations: ops(json!([{"op": "replace", "path": "/count", "value": 7}])),
        };

        let outcome = apply_patch(&current, &patch);
        assert_eq!(
            outcome,
            PatchOutcome::Rejected(RejectReason::StaleVersion {
                patch: 2,
                current: 2
            })
        );
        assert_eq!(current, snapshot(json!({"count": 6}), 2));
    }

    #[test]
    fn test_future_patch_rejected() {
        let current = snapshot(json!({"count": 0}), 1);
        let patch = StatePatch {
            version: 5,
            operations: ops(json!([{"op": "replace", "path": "/count", "value": 9}])),
        };

        assert!(matches!(
            apply_patch(&current, &patch),
            PatchOutcome::Rejected(RejectReason::StaleVersion { patch: 5, current: 1 })
        ));
    }

    #[test]
    fn test_version_zero_always_applies() {
        let current = snapshot(json!({"count": 41}), 17);
        let patch = StatePatch {
            version: 0,
            operations: ops(json!([{"op": "replace", "path": "/count", "value": 42}])),
        };

        match apply_patch(&current, &patch) {
            PatchOutcome::Applied(next) => {
                assert_eq!(next.version, 0);
                assert_eq!(next.state, json!({"count": 42}));
            }
            PatchOutcome::Rejected(reason) => panic!("unexpected rejection: {:?}", reason),
        }
    }

    #[test]
    fn test_failing_test_op_aborts_whole_patch() {
        let current = snapshot(json!({"count": 1, "name": "a"}), 1);
        let patch = StatePatch {
            version: 2,
            operations: ops(json!([
                {"op": "replace", "path": "/name", "value": "b"},
                {"op": "test", "path": "/count", "value": 999},
                {"op": "replace", "path": "/count", "value": 2}
            ])),
        };

        assert!(matches!(
            apply_patch(&current, &patch),
            PatchOutcome::Rejected(RejectReason::FailedOperation(_))
        ));
        // Zero fields changed, including the one the first op touched.
        assert_eq!(current.state, json!({"count": 1, "name": "a"}));
    }

    #[test]
    fn test_applied_patch_leaves_input_snapshot_intact() {
        let current = snapshot(json!({"items": [1, 2]}), 1);
        let patch = StatePatch {
            version: 2,
            operations: ops(json!([{"op": "add", "path": "/items/-", "value": 3}])),
        };

        let outcome = apply_patch(&current, &patch);
        assert!(matches!(outcome, PatchOutcome::Applied(_)));
        // The prior snapshot is still valid for anyone holding it.
        assert_eq!(current, snapshot(json!({"items": [1, 2]}), 1));
    }

    #[test]
    fn test_structural_operations() {
        let current = snapshot(json!({"a": {"x": 1}, "b": {}}), 0);
        let patch = StatePatch {
            version: 1,
            operations: ops(json!([
                {"op": "add", "path": "/c", "value": true},
                {"op": "copy", "from": "/a/x", "path": "/b/x"},
                {"op": "move", "from": "/a", "path": "/moved"},
                {"op": "remove", "path": "/c"}
            ])),
        };

        match apply_patch(&current, &patch) {
            PatchOutcome::Applied(next) => {
                assert_eq!(next.state, json!({"b": {"x": 1}, "moved": {"x": 1}}));
                assert_eq!(next.version, 1);
            }
            PatchOutcome::Rejected(reason) => panic!("unexpected rejection: {:?}", reason),
        }
    }

    #[test]
    fn test_full_state_replaces_unconditionally() {
        let next = apply_full_state(json!({"count": 5}), 1);
        assert_eq!(next.state, json!({"count": 5}));
        assert_eq!(next.version, 1);

        // Version can also go backwards - a forced resync.
        let reset = apply_full_state(json!({}), 0);
        assert_eq!(reset.version, 0);
    }

    #[test]
    fn test_documented_example_sequence() {
        let start = snapshot(json!({"count": 0}), 0);

        let synced = apply_full_state(json!({"count": 5}), 1);
        assert_eq!(synced, snapshot(json!({"count": 5}), 1));
        assert_eq!(start.version, 0);

        let patch = StatePatch {
            version: 2,
            operations: ops(json!([{"op": "replace", "path": "/count", "value": 6}])),
        };
        let current = match apply_patch(&synced, &patch) {
            PatchOutcome::Applied(next) => next,
            PatchOutcome::Rejected(reason) => panic!("unexpected rejection: {:?}", reason),
        };
        assert_eq!(current, snapshot(json!({"count": 6}), 2));

        // The same patch again is stale and must be dropped.
        assert!(matches!(
            apply_patch(&current, &patch),
            PatchOutcome::Rejected(RejectReason::StaleVersion { .. })
        ));
        assert_eq!(current, snapshot(json!({"count": 6}), 2));
    }
}
