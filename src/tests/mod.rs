/// Scenario and property suites for the scan engine.
///
/// Test Organization:
/// - Oracle scenarios for inclusive and exclusive scans with data-sharing
///   clauses, run under every execution variant (team, `if(0)`,
///   `if(simd: 0)`, `simdlen(1)`)
/// - Team protocol checks (barrier episodes, error reporting before the body
///   runs, degenerate iteration spaces)
/// - Property tests comparing team execution against a sequential fold

pub mod property_tests;
