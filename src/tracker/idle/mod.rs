//! Idle detection and reconciliation. The [detector](detector::IdleDetector) turns activity
//! samples into transition events, the [reconciler](reconciler::IdleReconciler) turns those
//! events into frozen intervals awaiting a keep-or-discard decision.

pub mod detector;
pub mod reconciler;
