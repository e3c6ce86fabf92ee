pub mod mocks;

pub use mocks::ScriptedRecorder;
