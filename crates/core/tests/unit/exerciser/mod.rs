

/// I/O coherency trial and test scenarios.
pub mod e007;

/// Exerciser enumeration.
pub mod enumerator;
