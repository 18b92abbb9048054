/*!
# PacketPilot DevKit - test doubles for the agent

Helpers to exercise the accounting and reporting engines without real
interfaces, a real calendar or a real collector:
- Scriptable counter source with injectable read failures
- Settable clock
- Mock collector on top of `wiremock`
- Test harness wiring engines against a temporary directory
*/

pub mod clock;
pub mod collector;
pub mod counters_stub;
pub mod test_utils;

pub use clock::FixedClock;
pub use collector::MockCollector;
pub use counters_stub::ScriptedCounters;
pub use test_utils::TestHarness;
