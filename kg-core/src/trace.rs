//! Trace identifier helpers for the immutable audit trail (§4.17, §4.18).
//!
//! Every `INSTANCE_OF` edge and every integrator checkpoint is keyed by a
//! trace id so a concept's linking history can be replayed.

use uuid::Uuid;

/// Generate a fresh trace id for one auto-linker decision or one
/// integrator run.
pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_ids_are_unique() {
        let a = new_trace_id();
        let b = new_trace_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
