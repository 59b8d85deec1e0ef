//! Example passes. These exist to exercise the visitor/pass contract (§4.4) end to end, not as
//! the framework's core — an embedder is expected to write their own. Each is deliberately
//! small: a handful of lines of instrumentation bytes around a recognizable instruction shape.

mod context_switch;
pub use context_switch::ContextSwitchPass;

mod frame_extend;
pub use frame_extend::FrameExtendPass;

mod logging;
pub use logging::LoggingPass;

mod nop;
pub use nop::NopPass;

mod null_check;
pub use null_check::NullCheckPass;

mod stack_xor;
pub use stack_xor::StackXorPass;
