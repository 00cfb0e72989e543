/// Daily challenge reads and hint accounting.
pub mod challenge_service;
/// Exactly-once completion ledger and statistics.
pub mod completion_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Subscription entitlement reconciliation.
pub mod entitlement_service;
/// Actor-pair generation for new challenges.
pub mod generator;
/// Health check service.
pub mod health_service;
/// Daily `next → active → archived` rotation.
pub mod rotation_service;
/// Storage connection supervisor with reconnect backoff.
pub mod storage_supervisor;
/// Trophy tier evaluation.
pub mod trophy;
